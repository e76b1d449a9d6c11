use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use filermount_lib::cli::commands::{Cli, Commands, GatewayTarget};
use filermount_lib::filer::Entry;
use filermount_lib::gateway::object_key;
use filermount_lib::{
    FilerClient, FilerFS, FullPath, InodeToPath, LocalFiler, MemoryFiler, MountConfig, S3Gateway,
};
use log::{error, info};
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = MountConfig::load(cli.config.as_deref())
        .with_context(|| "Failed to load configuration")?;

    // Initialize logger with specified or default log level
    let level = cli
        .log_level
        .clone()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    env_logger::init_from_env(Env::default().filter_or("RUST_LOG", level));

    match cli.command {
        Commands::Mount {
            source,
            mount_point,
            read_only,
            memory,
        } => {
            let config = MountConfig {
                read_only: read_only || config.read_only,
                ..config
            };
            if memory {
                cmd_mount(Arc::new(MemoryFiler::new()), &mount_point, config)?;
            } else {
                let filer = LocalFiler::new(&source)
                    .with_context(|| format!("Failed to open filer root {:?}", source))?;
                cmd_mount(Arc::new(filer), &mount_point, config)?;
            }
        }
        Commands::Mkdir { target } => {
            let (gateway, dir, name) = open_gateway(&target)?;
            gateway.mkdir(&dir, &name, None::<fn(&mut Entry)>)?;
            println!("✓ Created directory {}", dir.child(&name));
        }
        Commands::Put { target } => {
            let (gateway, dir, name) = open_gateway(&target)?;
            gateway.mk_file(&dir, &name, Vec::new())?;
            println!("✓ Created object {}", dir.child(&name));
        }
        Commands::Ls {
            source,
            directory,
            prefix,
            start_from,
            inclusive,
            limit,
        } => {
            let gateway = S3Gateway::new(Arc::new(open_local(&source)?));
            let dir = FullPath::new(object_key(&directory));
            let entries = gateway.list(&dir, &prefix, &start_from, inclusive, limit)?;
            for entry in entries {
                let marker = if entry.is_directory { "/" } else { "" };
                println!("{:>12}  {}{}", entry.size(), entry.name, marker);
            }
        }
        Commands::Rm { target, recursive } => {
            let (gateway, dir, name) = open_gateway(&target)?;
            gateway.rm(&dir, &name, true, recursive)?;
            println!("✓ Deleted {}", dir.child(&name));
        }
    }

    Ok(())
}

fn open_local(source: &Path) -> Result<LocalFiler> {
    LocalFiler::new(source).with_context(|| format!("Failed to open filer root {:?}", source))
}

/// Open the gateway and split the key into its directory and name
fn open_gateway(target: &GatewayTarget) -> Result<(S3Gateway<LocalFiler>, FullPath, String)> {
    let gateway = S3Gateway::new(Arc::new(open_local(&target.source)?));
    let path = FullPath::new(object_key(&target.key));
    if path.is_root() {
        return Err(anyhow::anyhow!("Object key must not be empty"));
    }
    let (dir, name) = path.dir_and_name();
    Ok((gateway, dir, name))
}

/// Mount a filer at `mount_point` and block until it is unmounted
fn cmd_mount<C: FilerClient + 'static>(
    client: Arc<C>,
    mount_point: &Path,
    config: MountConfig,
) -> Result<()> {
    info!(
        "Mounting filer at {:?}{}",
        mount_point,
        if config.read_only { " (read-only)" } else { "" }
    );

    if !mount_point.is_dir() {
        return Err(anyhow::anyhow!(
            "Mount point is not a directory: {:?}",
            mount_point
        ));
    }
    if is_fuse_mounted(mount_point) {
        return Err(anyhow::anyhow!(
            "Directory is already mounted: {:?}\nUnmount with: fusermount -u {:?}",
            mount_point,
            mount_point
        ));
    }

    // Set up signal handler for SIGINT and SIGTERM
    let mp_for_handler = mount_point.to_path_buf();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal, unmounting filesystem");
        match Command::new("fusermount")
            .arg("-u")
            .arg(&mp_for_handler)
            .status()
        {
            Ok(status) if status.success() => {
                info!("Successfully unmounted filesystem")
            }
            Ok(status) => error!("Failed to unmount filesystem, exit code: {}", status),
            Err(e) => error!("Failed to execute unmount command: {}", e),
        }
        std::process::exit(0);
    })
    .with_context(|| "Error setting signal handler")?;

    let read_only = config.read_only;
    let fs = FilerFS::new(client, Arc::new(InodeToPath::new()), mount_point, config);

    println!("✓ Mounting filer at '{}'", mount_point.display());
    if read_only {
        println!("  Read-only");
    }
    println!("  Running in foreground (Ctrl+C to unmount)");

    fs.mount().with_context(|| "Failed to mount filesystem")?;
    info!("Filesystem unmounted");
    Ok(())
}

/// Check whether a path is already a FUSE mount point
fn is_fuse_mounted(path: &Path) -> bool {
    let mounts = std::fs::read_to_string("/proc/mounts").unwrap_or_default();
    let path_str = path.to_string_lossy();
    mounts.lines().any(|line| {
        let mut fields = line.split_whitespace();
        let mount_point = fields.nth(1);
        let fs_type = fields.next();
        mount_point == Some(&*path_str) && fs_type.is_some_and(|t| t.starts_with("fuse"))
    })
}
