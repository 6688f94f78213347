pub mod cache;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod mirror;
pub mod project;
pub mod protocol;
pub mod types;

use clap::{Parser, Subcommand};

use crate::cli::Client;
use crate::config::Config;
use crate::mirror::{GitCli, MirrorLock};
use crate::types::ProjectPath;

#[derive(Parser)]
#[command(
    name = "metamirror",
    about = "Mirror the project metadata repository and serve project records"
)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon in the foreground
    Daemon,

    /// Stop the running daemon
    Stop,

    /// Show daemon status
    Status,

    /// Refresh the mirror now
    Poll,

    /// Print a project's record as JSON
    Project {
        /// Project path, e.g. /kde/workspace/plasma-desktop
        path: String,
    },

    /// Find projects by directory name and/or repository path
    Find {
        /// Project directory name
        #[arg(long)]
        id: Option<String>,

        /// Value of the record's repopath field
        #[arg(long)]
        repopath: Option<String>,
    },

    /// Check dependencies
    Doctor,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Daemon => cmd_daemon(&cli.config),
        Commands::Stop => cmd_stop(),
        Commands::Status => cmd_status(),
        Commands::Poll => cmd_poll(),
        Commands::Project { path } => cmd_project(&path),
        Commands::Find { id, repopath } => cmd_find(id, repopath),
        Commands::Doctor => cmd_doctor(&cli.config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        if e.to_string().contains("not running") {
            eprintln!();
            eprintln!("Hint: Start the daemon with: metamirror daemon");
        }
        std::process::exit(1);
    }
}

fn cmd_daemon(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    daemon::start(config)?;
    Ok(())
}

fn cmd_stop() -> Result<(), Box<dyn std::error::Error>> {
    let mut client = Client::connect()?;
    client.stop()?;
    println!("Daemon stopped");
    Ok(())
}

fn cmd_status() -> Result<(), Box<dyn std::error::Error>> {
    let mut client = Client::connect()?;
    let status = client.status()?;

    println!("metamirror daemon status");
    println!(
        "  Running:      {}",
        if status.running { "yes" } else { "no" }
    );
    println!("  PID:          {}", status.pid);
    println!("  Version:      {}", status.version);
    println!("  Uptime:       {}", format_duration(status.uptime_secs));
    println!("  Mirror:       {}", status.mirror_path);
    println!(
        "  Revision:     {}",
        status.revision.as_deref().unwrap_or("unknown")
    );
    println!(
        "  Last refresh: {}",
        status
            .last_refresh_secs
            .map(|secs| format!("{} ago", format_duration(secs)))
            .unwrap_or_else(|| "never".to_string())
    );
    println!(
        "  Cache:        {} entries ({} hits, {} loads, {} wipes)",
        status.cached_entries, status.cache_hits, status.cache_loads, status.cache_wipes
    );

    Ok(())
}

fn cmd_poll() -> Result<(), Box<dyn std::error::Error>> {
    println!("Refreshing mirror...");

    let mut client = Client::connect()?;
    let result = client.poll()?;

    print!("{}", result.output);
    if !result.output.ends_with('\n') {
        println!();
    }
    if let Some(revision) = &result.revision {
        println!("Revision: {}", revision);
    }
    if result.cache_reset {
        println!("Cache reset");
    }

    Ok(())
}

fn cmd_project(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    // Validate path format first
    let _ = ProjectPath::parse_absolute(path)
        .map_err(|e| format!("Invalid project path: {}", e))?;

    let mut client = Client::connect()?;
    let result = client.project(path)?;

    println!("{}", serde_json::to_string_pretty(&result.record)?);

    Ok(())
}

fn cmd_find(
    id: Option<String>,
    repopath: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = Client::connect()?;
    let result = client.find(id, repopath)?;

    for project in result.projects {
        println!("{}", project);
    }

    Ok(())
}

fn cmd_doctor(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("metamirror system check\n");

    let git_ok = GitCli::new().is_available();
    println!(
        "[{}] git: {}",
        if git_ok { "OK" } else { "FAIL" },
        if git_ok { "available" } else { "not found" }
    );

    let paths = config.paths();
    let data_ok = paths.root().is_dir();
    println!(
        "[{}] Data dir: {}",
        if data_ok { "OK" } else { "INFO" },
        paths.root().display()
    );

    let mirror_ok = paths.mirror_dir().join(".git").exists();
    println!(
        "[{}] Mirror: {}",
        if mirror_ok { "OK" } else { "INFO" },
        if mirror_ok {
            "cloned".to_string()
        } else {
            format!("not cloned yet ({})", config.remote)
        }
    );

    // Only probe an existing lock file; probing would otherwise create it.
    let lock_path = paths.lock_path();
    if lock_path.exists() {
        let lock_free = matches!(MirrorLock::try_acquire(&lock_path), Ok(Some(_)));
        println!(
            "[INFO] Refresh lock: {}",
            if lock_free {
                "free"
            } else {
                "held (refresh in progress)"
            }
        );
    }

    let daemon_running = daemon::is_daemon_running();
    println!(
        "[{}] Daemon: {}",
        if daemon_running { "OK" } else { "INFO" },
        if daemon_running {
            "running"
        } else {
            "not running"
        }
    );

    if !git_ok {
        std::process::exit(1);
    }

    Ok(())
}

fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}
