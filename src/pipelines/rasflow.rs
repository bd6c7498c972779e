use log::{info, warn};

use crate::config::defs::{FailurePolicy, PipelineError, Reference, RunConfig, RunMode, Stage, REFERENCE_KEY};
use crate::utils::command::{run_stage, StageInvocation, StageLauncher};
use crate::utils::run_log::RunLog;
use crate::utils::time::ctime_now;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every requested stage ran and the footer was written.
    Completed,
    /// QC-only mode: quality control ran and the workflow stops there.
    QcFinished,
}

/// Runs the workflow described by `config`, one stage at a time.
///
/// The run log is opened here and released on every return path. Only a
/// completed run gets the `Finish time` footer; any error that stops the run
/// leaves an `Abort time` marker instead, and QC-only runs leave neither.
///
/// # Arguments
///
/// * `config` - RunConfig built from the CLI and config file.
/// * `launcher` - Launches each stage and waits for it.
///
/// # Returns
/// RunOutcome, or the error that stopped the run.
pub async fn run<L: StageLauncher + ?Sized>(config: &RunConfig, launcher: &L) -> Result<RunOutcome, PipelineError> {
    let eff = &config.effective;
    println!("Visualization requested: {}", eff.visualize);
    println!("Start RASflow on project: {}", eff.project);

    let mut run_log = RunLog::open(&config.log_file)?;
    info!("Appending running times to {}", run_log.path().display());
    run_log.write_header(&eff.project, &ctime_now())?;

    let mut sequencer = Sequencer { config, launcher, run_log: &mut run_log };
    match sequencer.run_stages().await {
        Ok(RunOutcome::Completed) => {
            run_log.write_footer(&ctime_now())?;
            run_log.close()?;
            Ok(RunOutcome::Completed)
        }
        Ok(RunOutcome::QcFinished) => Ok(RunOutcome::QcFinished),
        Err(e) => {
            if let Err(log_err) = run_log.write_abort(&ctime_now(), &e.to_string()) {
                warn!("Could not record abort in {}: {}", run_log.path().display(), log_err);
            }
            Err(e)
        }
    }
}

struct Sequencer<'a, L: StageLauncher + ?Sized> {
    config: &'a RunConfig,
    launcher: &'a L,
    run_log: &'a mut RunLog,
}

impl<L: StageLauncher + ?Sized> Sequencer<'_, L> {
    async fn run_stages(&mut self) -> Result<RunOutcome, PipelineError> {
        let config = self.config;
        let eff = &config.effective;

        match config.mode {
            RunMode::QualityControlOnly => {
                println!("Starting Quality Control!");
                self.stage(Stage::QualityControl).await?;
                println!("Quality control is done!\n Please check the report and decide whether trimming is needed\n Please remember to turn off the QC in the config file!");
                return Ok(RunOutcome::QcFinished);
            }
            RunMode::TrimOnly => {
                println!("Start Trimming!");
                self.stage(Stage::Trim).await?;
                println!("Trimming is done!");
            }
            RunMode::None => {}
        }

        // Resolved once up front for every mode except QC-only
        let reference: Reference = eff
            .reference
            .ok_or_else(|| PipelineError::MissingRequiredConfig(REFERENCE_KEY.to_string()))?;
        println!("Using {} reference\n", reference);
        println!("Starting to map reads using {} as reference!", reference);
        self.stage(Stage::mapping(reference)).await?;

        if !eff.run_dea {
            println!("DEA is not required and RASflow is done!");
            return Ok(RunOutcome::Completed);
        }

        println!("Starting DEA!");
        self.stage(Stage::dea(reference)).await?;
        println!("DEA is done!");

        if !eff.visualize {
            println!("Visualization is not required and RASflow is done!");
            return Ok(RunOutcome::Completed);
        }

        // Visualization can only be done on gene-level
        if reference == Reference::Transcriptome && !eff.gene_level {
            println!("Sorry! RASflow currently can only visualize on gene-level");
            return Err(PipelineError::PreconditionViolation(
                "visualization of transcriptome-based DEA requires GENE_LEVEL".to_string(),
            ));
        }

        println!("Starting visualization of DEA results!");
        self.stage(Stage::Visualize).await?;
        println!("Visualization is done!");
        println!("RASflow is done!");
        Ok(RunOutcome::Completed)
    }

    /// Runs one stage, records its time, and applies the failure policy.
    async fn stage(&mut self, stage: Stage) -> Result<(), PipelineError> {
        let invocation = StageInvocation::new(stage, &self.config.workflow_dir, &self.config.stage_log_dir);
        let result = run_stage(self.launcher, &invocation).await?;
        self.run_log.write_stage_timing(stage.label(), result.elapsed)?;
        info!("Stage {} finished in {:?} (exit code {:?})", stage, result.elapsed, result.exit_code);

        if !result.succeeded {
            match self.config.failure_policy {
                FailurePolicy::FailFast => {
                    return Err(PipelineError::StageFailure { stage, exit_code: result.exit_code });
                }
                FailurePolicy::Permissive => {
                    warn!(
                        "Stage {} exited with status {:?}; continuing. See {}",
                        stage,
                        result.exit_code,
                        invocation.log_path.display()
                    );
                }
            }
        }
        Ok(())
    }
}
