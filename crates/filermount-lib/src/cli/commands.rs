use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// filermount - serve a filer namespace as a local filesystem
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Optional log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Config file (default: ~/.config/filermount/config.toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Mount a filer namespace
    ///
    /// Serves SOURCE through a local-directory filer and mounts it at
    /// MOUNTPOINT in the foreground. Ctrl-C unmounts.
    Mount {
        /// Directory backing the filer namespace
        #[arg(value_name = "SOURCE")]
        source: PathBuf,

        /// Where to mount
        #[arg(value_name = "MOUNTPOINT")]
        mount_point: PathBuf,

        /// Mount filesystem in read-only mode
        #[arg(long)]
        read_only: bool,

        /// Serve an empty in-memory namespace instead of SOURCE
        #[arg(long)]
        memory: bool,
    },

    /// Create a bucket or directory through the gateway
    Mkdir {
        #[command(flatten)]
        target: GatewayTarget,
    },

    /// Create an empty object through the gateway
    Put {
        #[command(flatten)]
        target: GatewayTarget,
    },

    /// List a directory through the gateway
    Ls {
        /// Directory backing the filer namespace
        #[arg(value_name = "SOURCE")]
        source: PathBuf,

        /// Directory to list (default: /)
        #[arg(value_name = "DIRECTORY", default_value = "/")]
        directory: String,

        /// Only names starting with this prefix
        #[arg(long, default_value = "")]
        prefix: String,

        /// Start listing after this name
        #[arg(long, default_value = "")]
        start_from: String,

        /// Include the start name itself
        #[arg(long)]
        inclusive: bool,

        /// Maximum number of entries (0 = all)
        #[arg(long, default_value_t = 0)]
        limit: u32,
    },

    /// Delete an object or directory through the gateway
    Rm {
        #[command(flatten)]
        target: GatewayTarget,

        /// Delete directory contents too
        #[arg(long, short)]
        recursive: bool,
    },
}

/// Filer root plus an object key
#[derive(Args, Debug)]
pub struct GatewayTarget {
    /// Directory backing the filer namespace
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Object key, e.g. bucket/dir/name
    #[arg(value_name = "KEY")]
    pub key: String,
}
