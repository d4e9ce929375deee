use std::env;
use std::ffi::OsString;
use std::process;

use clap::{self, Parser, Subcommand};
use tracing::error;

use kaiten::roles::{self, exit_code};
use kaiten::supervisor::signals::install_worker_signals;
use kaiten::{logging, Arena, ArenaHandle, FacilityConfig, Result};

#[derive(clap::Parser)]
#[clap(about = "Conveyor-belt restaurant run by cooperating processes")]
struct Opts {
    #[clap(short = 'c', long = "config", default_value = "kaiten.toml")]
    config: String,
    /// Runs one worker role against an existing facility. Without it the
    /// process becomes the facility itself.
    #[clap(subcommand)]
    role: Option<RoleCmd>,
}

#[derive(Subcommand, Clone, Copy, Debug)]
enum RoleCmd {
    Arrival,
    Service,
    Kitchen,
    Supervisor,
    Cloakroom,
}

impl RoleCmd {
    fn name(self) -> &'static str {
        match self {
            RoleCmd::Arrival => "arrival",
            RoleCmd::Service => "service",
            RoleCmd::Kitchen => "kitchen",
            RoleCmd::Supervisor => "supervisor",
            RoleCmd::Cloakroom => "cloakroom",
        }
    }
}

fn run_role(role: RoleCmd, cfg: &FacilityConfig) -> Result<()> {
    let handle = ArenaHandle::from_env()?;
    let arena = Arena::attach(&handle)?;
    install_worker_signals(&arena)?;
    match role {
        RoleCmd::Arrival => roles::run_arrival_generator(&arena, cfg),
        RoleCmd::Service => roles::run_seating_service(&arena, cfg),
        RoleCmd::Kitchen => roles::run_kitchen(&arena, cfg),
        RoleCmd::Supervisor => roles::run_supervisor(&arena, cfg),
        RoleCmd::Cloakroom => roles::run_cloakroom(&arena, cfg),
    }
}

fn main() {
    let opts: Opts = Opts::parse();
    let cfg = match FacilityConfig::load(&opts.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("cannot load {}: {}", opts.config, e);
            process::exit(2);
        }
    };
    logging::init(&cfg.log_level);

    let code = match opts.role {
        Some(role) => exit_code(role.name(), run_role(role, &cfg)),
        None => {
            let result = env::current_exe().map_err(Into::into).and_then(|program| {
                let base_args: Vec<OsString> = vec!["--config".into(), opts.config.clone().into()];
                roles::run_facility(&cfg, program, base_args)
            });
            match result {
                Ok(()) => 0,
                Err(e) => {
                    error!("facility failed: {}", e);
                    1
                }
            }
        }
    };
    process::exit(code);
}
