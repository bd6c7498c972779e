use std::env;
use std::io::Write;
use std::time::Instant;

use anyhow::Result;
use log::{self, LevelFilter, debug, info, error};
use env_logger::Builder;
use rasflow::cli::parse;
use rasflow::config::defs::{RunConfig, EXIT_QC_FINISHED, QC_FINISHED_MSG};
use rasflow::utils::command::ProcessLauncher;
use rasflow::pipelines::rasflow::{self as sequencer, RunOutcome};


#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    let args = parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    println!("\n-------------\n RASflow\n-------------\n");

    let dir = env::current_dir()?;
    info!("The current directory is {:?}\n", dir);

    let run_config = match RunConfig::from_args(&args) {
        Ok(run_config) => run_config,
        Err(e) => {
            error!("Configuration failed: {}", e);
            std::process::exit(e.exit_code());
        }
    };
    debug!("Effective configuration: {:?}", run_config.effective);

    // The run log is owned by the sequencer, so it is closed before any exit below
    match sequencer::run(&run_config, &ProcessLauncher).await {
        Ok(RunOutcome::Completed) => {
            println!("Run complete: {} seconds.", run_start.elapsed().as_secs());
            Ok(())
        }
        Ok(RunOutcome::QcFinished) => {
            eprintln!("{}", QC_FINISHED_MSG);
            std::process::exit(EXIT_QC_FINISHED);
        }
        Err(e) => {
            error!("Pipeline failed: {} at {} seconds.", e, run_start.elapsed().as_secs());
            std::process::exit(e.exit_code());
        }
    }
}
