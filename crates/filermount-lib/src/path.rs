//! Fully-qualified filer paths.
//!
//! The filer addresses every entry by an absolute, slash-separated name. The
//! mount layer builds these from a parent path and a child name, and splits
//! them back into `(directory, name)` pairs for backend requests.

use std::fmt;

/// An absolute path in the filer namespace, e.g. `/buckets/photos/a.jpg`.
///
/// Always starts with `/` and never ends with one, except for the root itself.
/// `.` and `..` components are resolved lexically and never climb above the
/// root, so a `FullPath` always names something inside the namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FullPath(String);

impl FullPath {
    /// The root path `/`
    pub fn root() -> Self {
        FullPath("/".to_string())
    }

    /// Normalise a path string into a `FullPath`
    pub fn new(path: impl AsRef<str>) -> Self {
        let mut components: Vec<&str> = Vec::new();
        for component in path.as_ref().split('/') {
            match component {
                "" | "." => {}
                ".." => {
                    components.pop();
                }
                name => components.push(name),
            }
        }
        if components.is_empty() {
            return Self::root();
        }
        FullPath(format!("/{}", components.join("/")))
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build the path of a child entry
    pub fn child(&self, name: &str) -> FullPath {
        FullPath::new(format!("{}/{}", self.0, name))
    }

    /// The part of `self` below `ancestor`, if `self` is a strict descendant
    pub fn strip_ancestor(&self, ancestor: &FullPath) -> Option<&str> {
        if ancestor.is_root() {
            return (!self.is_root()).then(|| self.relative());
        }
        self.0
            .strip_prefix(ancestor.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
    }

    /// Split into the parent directory and the last component.
    ///
    /// The root splits into `("/", "")`.
    pub fn dir_and_name(&self) -> (FullPath, String) {
        if self.is_root() {
            return (Self::root(), String::new());
        }
        match self.0.rfind('/') {
            Some(0) => (Self::root(), self.0[1..].to_string()),
            Some(idx) => (FullPath(self.0[..idx].to_string()), self.0[idx + 1..].to_string()),
            None => (Self::root(), self.0.clone()),
        }
    }

    /// Last path component, empty for the root
    pub fn name(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    pub fn parent(&self) -> Option<FullPath> {
        if self.is_root() {
            None
        } else {
            Some(self.dir_and_name().0)
        }
    }

    /// Path relative to the root, without the leading slash
    pub fn relative(&self) -> &str {
        &self.0[1..]
    }
}

impl Default for FullPath {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for FullPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FullPath {
    fn from(path: &str) -> Self {
        FullPath::new(path)
    }
}

impl From<String> for FullPath {
    fn from(path: String) -> Self {
        FullPath::new(path)
    }
}

impl AsRef<str> for FullPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
