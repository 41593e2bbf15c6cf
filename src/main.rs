use clap::{Parser, Subcommand};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use env_logger::Env;
use log::{info, warn, LevelFilter};
use std::env;
use std::path::PathBuf;

use netlab::{config_loader, orchestrator, report, state};

/// VLSM addressing and topology planner for small IPv4 network labs
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a lab from a YAML description and write its plan
    Plan {
        /// Path to the lab description YAML file
        #[arg(short, long)]
        config: PathBuf,

        /// Output directory for the save file and plan.json
        #[arg(short, long, default_value = "netlab_output")]
        output: PathBuf,
    },
    /// Print the devices, cables and subnet tree of a save file
    Show {
        /// Save file to read
        #[arg(short, long, default_value = state::DEFAULT_STATE_FILE)]
        state: PathBuf,
    },
}

/// Start logging at `info`. With RUST_LOG set, its filter is used as is and
/// the lab description cannot change it.
fn init_logging() -> bool {
    let from_env = env::var_os("RUST_LOG").is_some();
    env_logger::Builder::from_env(Env::default().default_filter_or("trace")).init();
    if !from_env {
        log::set_max_level(LevelFilter::Info);
    }
    from_env
}

/// Apply `general.log_level` from the lab description.
fn apply_log_level(level: Option<&str>) {
    let Some(level) = level else {
        return;
    };
    match level.parse::<LevelFilter>() {
        Ok(filter) => log::set_max_level(filter),
        Err(_) => warn!("Ignoring unknown log level '{}'", level),
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let level_from_env = init_logging();

    match args.command {
        Command::Plan { config, output } => {
            info!("Lab description: {:?}", config);
            info!("Output directory: {:?}", output);

            let lab_config = config_loader::load_config(&config)?;
            if !level_from_env {
                apply_log_level(lab_config.general.log_level.as_deref());
            }

            let plan = orchestrator::generate_plan(&lab_config, &output)
                .wrap_err("Failed to generate the lab plan")?;
            for line in report::subnet_tree(&plan.lab) {
                println!("{}", line);
            }

            info!("Save file: {:?}", plan.state_path);
            info!("Plan summary: {:?}", plan.plan_path);
        }
        Command::Show { state: path } => {
            let lab = state::load(&path)
                .wrap_err_with(|| format!("Failed to load '{}'", path.display()))?;
            for line in report::topology_lines(&lab) {
                println!("{}", line);
            }
            println!();
            for line in report::subnet_tree(&lab) {
                println!("{}", line);
            }
        }
    }

    Ok(())
}
