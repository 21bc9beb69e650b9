//! Command Line Interface
//!
//! Thin front end over the daemon socket, plus an offline config check.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use pb_core::constants::paths;
use pb_core::{load_config, Registry, ResourceKind};
use pb_protocol::{EngineStatus, HintRequest, POWER_MODES};
use perfboost::DaemonClient;

#[derive(Parser)]
#[command(name = "perfboost")]
#[command(version)]
#[command(about = "Perfboost - SoC boost request control")]
#[command(long_about = "Perfboost - SoC boost request control

Talks to perfboostd, which arbitrates boost requests per resource and writes the
winning value to the kernel control nodes.

EXAMPLES:
    perfboost status                       Show applied values and active requests
    perfboost boost ddr max --for 2000     Hold the DDR floor at max for 2s
    perfboost release ddr                  Withdraw this requester's ask
    perfboost hint launch on               Start the app-launch scene
    perfboost hint mode performance on     Enter performance mode
    perfboost check-config ./perfboost.json")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Daemon socket path
    #[arg(short, long, global = true, default_value = paths::SOCKET)]
    pub socket: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check the daemon is reachable
    Ping,

    /// Assert a boost on a resource
    Boost(BoostArgs),

    /// Withdraw a previously asserted boost
    Release {
        resource: String,
        #[arg(short, long, default_value = "cli")]
        requester: String,
    },

    /// Send a power hint
    #[command(subcommand)]
    Hint(HintCommand),

    /// Report a screen on/off transition
    Screen { state: Switch },

    /// Report charger state
    Charging { state: Switch },

    /// Enable boosting
    Enable,

    /// Disable boosting and release every resource
    Disable,

    /// Look up a scene's numeric id
    SceneId { name: String },

    /// Show engine state
    Status {
        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a config file without contacting the daemon
    CheckConfig {
        #[arg(default_value = paths::CONFIG_FILE)]
        path: PathBuf,
    },
}

#[derive(Args)]
pub struct BoostArgs {
    pub resource: String,

    /// Frequency (Hz), `max`, `min`, `level:N`, or a subsystem scene name
    pub value: String,

    #[arg(short, long, default_value = "cli")]
    pub requester: String,

    /// Expire after this many milliseconds (0 holds until released)
    #[arg(long = "for", value_name = "MS", default_value_t = 0)]
    pub duration_ms: u32,
}

#[derive(Subcommand)]
pub enum HintCommand {
    /// Touch interaction boost
    Interaction {
        /// Duration in ms
        #[arg(long)]
        data: Option<i32>,
    },
    /// App launch boost
    Launch { state: Switch },
    /// Video encode boost
    VideoEncode { state: Switch },
    /// Enter or leave a power mode
    Mode {
        #[arg(value_parser = clap::builder::PossibleValuesParser::new(POWER_MODES))]
        mode: String,
        state: Switch,
    },
    /// Custom named scene
    Custom {
        scene: String,
        /// Duration in ms; 0 or 1 holds, omitted releases
        #[arg(long)]
        data: Option<i32>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    fn on(self) -> bool {
        matches!(self, Switch::On)
    }
}

pub fn run_cli(cli: &Cli) -> anyhow::Result<()> {
    if let Commands::CheckConfig { path } = &cli.command {
        return cmd_check_config(path);
    }

    let mut client = DaemonClient::connect(&cli.socket)?;
    match &cli.command {
        Commands::Ping => {
            println!("{}", client.ping()?);
        }
        Commands::Boost(args) => {
            let applied = client.boost(&args.resource, &args.requester, &args.value, args.duration_ms)?;
            report(applied);
        }
        Commands::Release { resource, requester } => {
            report(client.release(resource, requester)?);
        }
        Commands::Hint(hint) => {
            report(client.hint(to_request(hint))?);
        }
        Commands::Screen { state } => {
            report(client.set_interactive(state.on())?);
        }
        Commands::Charging { state } => {
            client.set_charging(state.on())?;
        }
        Commands::Enable => {
            client.set_enabled(true)?;
            println!("Boosting enabled");
        }
        Commands::Disable => {
            client.set_enabled(false)?;
            println!("Boosting disabled");
        }
        Commands::SceneId { name } => {
            println!("{}", client.scene_id(name)?);
        }
        Commands::Status { json } => {
            let status = client.status()?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }
        Commands::CheckConfig { .. } => {}
    }
    Ok(())
}

fn to_request(hint: &HintCommand) -> HintRequest {
    match hint {
        HintCommand::Interaction { data } => HintRequest::Interaction { data: *data },
        HintCommand::Launch { state } => HintRequest::Launch { active: state.on() },
        HintCommand::VideoEncode { state } => HintRequest::VideoEncode {
            state: i32::from(state.on()),
        },
        HintCommand::Mode { mode, state } => HintRequest::Mode {
            mode: mode.clone(),
            enable: state.on(),
        },
        HintCommand::Custom { scene, data } => HintRequest::Custom {
            scene: scene.clone(),
            data: *data,
        },
    }
}

fn report(applied: bool) {
    if applied {
        println!("applied");
    } else {
        println!("no change");
    }
}

fn print_status(status: &EngineStatus) {
    println!("Perfboost Status");
    println!("================");
    println!("Boosting:    {}", if status.enabled { "enabled" } else { "disabled" });
    println!("Mode:        {}", status.mode);
    println!("Interactive: {}", if status.interactive { "yes" } else { "no" });
    println!();

    for resource in &status.resources {
        let current = resource.current.as_deref().unwrap_or("-");
        match resource.deadline_ms {
            Some(ms) => println!("{:<16} {} (re-evaluates in {} ms)", resource.name, current, ms),
            None => println!("{:<16} {}", resource.name, current),
        }
        for request in resource.requests.iter().rev() {
            let remaining = request
                .remaining_ms
                .map_or_else(|| "held".to_string(), |ms| format!("{} ms", ms));
            println!(
                "    {:<20} {:<12} prio {:<10} {}",
                request.requester, request.value, request.priority, remaining
            );
        }
    }
}

fn cmd_check_config(path: &Path) -> anyhow::Result<()> {
    let config = load_config(path)?;
    let registry = Registry::from_config(&config)?;

    println!("{}: ok", path.display());
    for resource in registry.resources() {
        match &resource.kind {
            ResourceKind::Raw(raw) => {
                println!("  {:<16} raw       {}", resource.name, raw.path.display());
            }
            ResourceKind::Subsystem(subsystem) => {
                let configs: Vec<&str> = subsystem.configs.iter().map(|c| c.name.as_str()).collect();
                println!(
                    "  {:<16} subsystem {} members, configs: {}",
                    resource.name,
                    subsystem.members.len(),
                    configs.join(", ")
                );
            }
        }
    }
    println!("  {} scenes", config.scenes.len());
    Ok(())
}
