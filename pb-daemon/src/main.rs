//! Perfboost Daemon (perfboostd)
//!
//! Privileged service owning the SoC boost control nodes. Clients submit boost
//! requests and power hints over a Unix domain socket; the daemon arbitrates them and
//! writes the winning values to sysfs.
//!
//! # Security Model
//! - **Privilege**: Runs as root for /sys write access only
//! - **Socket**: Unix domain socket, owner/group access (0660)
//! - **Validation**: Names and values are validated again server-side
//! - **Audit**: Peer credential logging (UID/PID) for every connection
//! - **Limits**: Connection limits, message size limits, timeouts
//!
//! # Dry Run
//! `--dry-run` swaps sysfs for an in-memory node set seeded from the config, so a
//! config can be exercised without root and without touching hardware.

mod server;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use pb_core::constants::paths;
use pb_core::{
    load_config, Engine, HintTranslator, MemoryNodes, NodeWriter, Registry, ResourceKind,
    SceneIds, SysfsWriter,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Security Hardening
// ============================================================================

/// Strip loader and resolver variables before anything else runs
fn sanitize_environment() {
    const DANGEROUS_VARS: &[&str] = &[
        "LD_PRELOAD",
        "LD_LIBRARY_PATH",
        "LD_AUDIT",
        "LD_DEBUG",
        "MALLOC_CHECK_",
        "HOSTALIASES",
        "LOCALDOMAIN",
        "RES_OPTIONS",
        "IFS",
    ];

    for var in DANGEROUS_VARS {
        std::env::remove_var(var);
    }
    std::env::set_var("PATH", "/usr/sbin:/usr/bin:/sbin:/bin");
}

fn set_secure_umask() {
    // 0007 keeps the socket group-accessible
    // SAFETY: umask only sets the process file creation mask.
    unsafe { libc::umask(0o007) };
}

/// Disable core dumps and bound the descriptor table
fn set_resource_limits() {
    set_rlimit(libc::RLIMIT_CORE, 0);
    set_rlimit(libc::RLIMIT_NOFILE, 1024);
}

fn set_rlimit(resource: libc::__rlimit_resource_t, value: u64) {
    let limit = libc::rlimit {
        rlim_cur: value as libc::rlim_t,
        rlim_max: value as libc::rlim_t,
    };
    // SAFETY: `limit` is fully initialized and `resource` is an RLIMIT_* constant.
    if unsafe { libc::setrlimit(resource, &limit) } != 0 {
        warn!("Failed to set rlimit for resource {}", resource);
    }
}

fn secure_working_directory() {
    if std::env::set_current_dir("/").is_err() {
        warn!("Could not chdir to /");
    }
}

fn verify_privileges() -> Result<(), &'static str> {
    // SAFETY: geteuid and getuid only return the process's user IDs.
    let euid = unsafe { libc::geteuid() };
    let uid = unsafe { libc::getuid() };

    if euid != 0 {
        return Err("Daemon must run as root (euid=0) to write control nodes");
    }
    if uid != 0 {
        warn!("Running as setuid root - this is not recommended");
    }

    info!("Running as root (uid={}, euid={})", uid, euid);
    Ok(())
}

fn validate_socket_path(path: &str) -> Result<(), String> {
    let p = Path::new(path);

    if !p.is_absolute() {
        return Err("Socket path must be absolute".into());
    }
    if path.contains("..") {
        return Err("Socket path contains path traversal".into());
    }
    if path.contains('\0') {
        return Err("Socket path contains null byte".into());
    }

    let safe_dirs = ["/run/", "/var/run/", "/tmp/"];
    if !safe_dirs.iter().any(|d| path.starts_with(d)) {
        return Err(format!("Socket path must be under {:?}", safe_dirs));
    }

    if let Some(parent) = p.parent() {
        if !parent.exists() {
            return Err(format!("Parent directory does not exist: {:?}", parent));
        }
    }

    if p.symlink_metadata().map(|m| m.file_type().is_symlink()).unwrap_or(false) {
        return Err("Socket path is a symlink - refusing for security".into());
    }

    Ok(())
}

// ============================================================================
// PID File Management
// ============================================================================

fn write_pid_file(path: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    if Path::new(path).exists() {
        if let Ok(content) = std::fs::read_to_string(path) {
            if let Ok(old_pid) = content.trim().parse::<i32>() {
                // SAFETY: signal 0 only probes whether the process exists.
                if unsafe { libc::kill(old_pid, 0) } == 0 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::AddrInUse,
                        format!("Another instance is running (PID {})", old_pid),
                    ));
                }
            }
        }
        let _ = std::fs::remove_file(path);
    }

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o644)
        .open(path)?;

    writeln!(file, "{}", std::process::id())?;
    file.sync_all()?;

    debug!("PID file written: {}", path);
    Ok(())
}

fn cleanup(socket_path: &str, pid_file: Option<&str>) {
    if Path::new(socket_path).exists() {
        if let Err(e) = std::fs::remove_file(socket_path) {
            warn!("Failed to remove socket: {}", e);
        }
    }
    if let Some(pid_file) = pid_file {
        if Path::new(pid_file).exists() {
            if let Err(e) = std::fs::remove_file(pid_file) {
                warn!("Failed to remove PID file: {}", e);
            }
        }
    }
    info!("Cleanup complete");
}

// ============================================================================
// Engine Setup
// ============================================================================

/// In-memory nodes mirroring every path the registry names
///
/// Frequency tables are copied from the live system when readable so selectors
/// resolve the same way they would on the device.
fn dry_run_nodes(registry: &Registry) -> MemoryNodes {
    let nodes = MemoryNodes::new();
    for resource in registry.resources() {
        match &resource.kind {
            ResourceKind::Raw(raw) => {
                nodes.add_node(raw.path.clone());
                if let Some(table) = &raw.freq_table {
                    match std::fs::read_to_string(&table.path) {
                        Ok(content) => nodes.add_node_with_content(table.path.clone(), content),
                        Err(e) => debug!("Frequency table {} unreadable: {}", table.path.display(), e),
                    }
                }
            }
            ResourceKind::Subsystem(subsystem) => {
                for member in &subsystem.members {
                    nodes.add_node(member.path.clone());
                }
            }
        }
    }
    nodes
}

fn load_scene_ids(path: Option<&Path>) -> SceneIds {
    let Some(path) = path else {
        return SceneIds::default();
    };
    match SceneIds::load(path) {
        Ok(ids) => {
            info!("STARTUP: {} scene ids loaded from {}", ids.len(), path.display());
            ids
        }
        Err(e) => {
            warn!("Scene id table unavailable, ids resolve to 0: {}", e);
            SceneIds::default()
        }
    }
}

// ============================================================================
// CLI
// ============================================================================

struct Options {
    socket_path: String,
    config_path: PathBuf,
    dry_run: bool,
}

fn print_help() {
    eprintln!("perfboostd {} - SoC boost arbitration daemon", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    perfboostd [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -c, --config PATH   Config file (default {})", paths::CONFIG_FILE);
    eprintln!("    -s, --socket PATH   Socket path (default {})", paths::SOCKET);
    eprintln!("    -n, --dry-run       Write to in-memory nodes instead of sysfs");
    eprintln!("    -f, --foreground    Run in foreground (always on)");
    eprintln!("    -v, --version       Print version");
    eprintln!("    -h, --help          Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    PERFBOOST_LOG       Log level (trace, debug, info, warn, error)");
}

fn parse_args() -> Option<Options> {
    let args: Vec<String> = std::env::args().collect();
    let mut options = Options {
        socket_path: paths::SOCKET.to_string(),
        config_path: PathBuf::from(paths::CONFIG_FILE),
        dry_run: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                return None;
            }
            "-v" | "--version" => {
                println!("perfboostd {}", VERSION);
                return None;
            }
            "-f" | "--foreground" => {}
            "-n" | "--dry-run" => options.dry_run = true,
            flag @ ("-s" | "--socket" | "-c" | "--config") => {
                i += 1;
                let Some(value) = args.get(i) else {
                    eprintln!("Error: {} requires a path argument", flag);
                    std::process::exit(1);
                };
                if flag == "-s" || flag == "--socket" {
                    options.socket_path = value.clone();
                } else {
                    options.config_path = PathBuf::from(value);
                }
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    Some(options)
}

fn init_logging(log_level: &str) -> bool {
    if Path::new("/run/systemd/journal/socket").exists() {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                use tracing_subscriber::prelude::*;
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(log_level))
                    .init();
                return true;
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(log_level)
        .init();
    false
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // PHASE 0: Panics go to stderr so journald captures them
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        eprintln!("PANIC at {}: {}", location, panic_info);
    }));

    // PHASE 1: Hardening
    sanitize_environment();
    set_secure_umask();
    set_resource_limits();

    // PHASE 2: Arguments
    let Some(options) = parse_args() else {
        return Ok(());
    };
    let config_path = std::fs::canonicalize(&options.config_path).unwrap_or(options.config_path.clone());
    secure_working_directory();

    // PHASE 3: Logging
    let log_level = std::env::var("PERFBOOST_LOG").unwrap_or_else(|_| "info".to_string());
    let use_journald = init_logging(&log_level);

    info!("STARTUP: perfboostd {} starting", VERSION);
    info!("STARTUP: Logging to {}", if use_journald { "systemd journal" } else { "stdout" });

    // PHASE 4: Privilege and socket checks
    if options.dry_run {
        info!("STARTUP: Dry run, control nodes are simulated");
    } else if let Err(e) = verify_privileges() {
        error!("{}", e);
        std::process::exit(1);
    }

    if let Err(e) = validate_socket_path(&options.socket_path) {
        error!("Invalid socket path: {}", e);
        std::process::exit(1);
    }

    // PHASE 5: Config and registry
    let config = load_config(&config_path)?;
    let registry = Arc::new(Registry::from_config(&config)?);
    info!(
        "STARTUP: {} resources, {} scenes from {}",
        registry.len(),
        config.scenes.len(),
        config_path.display()
    );

    // PHASE 6: Engine
    let nodes: Arc<dyn NodeWriter> = if options.dry_run {
        Arc::new(dry_run_nodes(&registry))
    } else {
        Arc::new(SysfsWriter)
    };
    let engine = Arc::new(Engine::new(registry, nodes));

    let disabled_by_flag = Path::new(paths::BOOST_DISABLE_FLAG).exists();
    if disabled_by_flag {
        info!("STARTUP: {} present, boosting disabled", paths::BOOST_DISABLE_FLAG);
    }
    engine.set_engine_enabled(config.boost_enabled && !disabled_by_flag);
    engine.start()?;

    let scene_ids = load_scene_ids(config.scene_ids.as_deref());
    let hints = Arc::new(HintTranslator::new(
        engine.clone(),
        scene_ids,
        config.screen_off_ignore_charging,
    ));

    // PHASE 7: PID file
    let pid_file = (!options.dry_run).then_some(paths::PID_FILE);
    if let Some(pid_file) = pid_file {
        if let Err(e) = write_pid_file(pid_file) {
            error!("Could not write PID file: {}", e);
            engine.stop();
            std::process::exit(1);
        }
    }

    // PHASE 8: Signal handlers
    let signal_engine = engine.clone();
    let signal_socket = options.socket_path.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("SIGNAL: Received SIGINT/SIGTERM - releasing all boosts");
        signal_engine.set_engine_enabled(false);
        signal_engine.stop();
        cleanup(&signal_socket, pid_file);
        info!("SHUTDOWN: Daemon terminated gracefully");
        std::process::exit(0);
    }) {
        warn!("Failed to set signal handler: {}. Boosts may stay applied on shutdown.", e);
    }

    info!("STARTUP: Socket path: {}", options.socket_path);
    info!("STARTUP: PID: {}", std::process::id());
    info!("STARTUP: Boosting {}", if engine.is_enabled() { "enabled" } else { "disabled" });

    // PHASE 9: Serve
    let ctx = Arc::new(server::DaemonContext {
        engine: engine.clone(),
        hints,
    });
    let result = server::run_server(&options.socket_path, ctx).await;

    // PHASE 10: Release everything before exit
    engine.set_engine_enabled(false);
    engine.stop();
    cleanup(&options.socket_path, pid_file);

    if let Err(e) = result {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
