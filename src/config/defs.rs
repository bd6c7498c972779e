use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use clap::ValueEnum;
use lazy_static::lazy_static;
use serde::Deserialize;
use thiserror::Error;

// External software
pub const SNAKEMAKE_TAG: &str = "snakemake";
pub const NICE_TAG: &str = "nice";
pub const STAGE_NICENESS: i32 = 5;

// Workflow rule files
pub const QUALITY_CONTROL_TAG: &str = "quality_control";
pub const TRIM_TAG: &str = "trim";
pub const QUANTIFY_TRANS_TAG: &str = "quantify_trans";
pub const ALIGN_COUNT_GENOME_TAG: &str = "align_count_genome";
pub const DEA_TRANS_TAG: &str = "dea_trans";
pub const DEA_GENOME_TAG: &str = "dea_genome";
pub const VISUALIZE_TAG: &str = "visualize";
pub const RULES_EXT: &str = "rules";

// Static paths
pub const DEFAULT_CONFIG: &str = "configs/config_main.yaml";
pub const DEFAULT_LOGFILE: &str = "logs/log_running_time.txt";
pub const STAGE_LOG_DIR: &str = "logs";
pub const WORKFLOW_DIR: &str = "workflow";

// Config file keys
pub const PROJECT_KEY: &str = "PROJECT";
pub const REFERENCE_KEY: &str = "REFERENCE";
pub const GENE_LEVEL_KEY: &str = "GENE_LEVEL";

// Exit codes
pub const EXIT_QC_FINISHED: i32 = 1;
pub const EXIT_GENERAL: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_PRECONDITION: i32 = 3;
pub const EXIT_STAGE_FAILURE: i32 = 4;

pub const QC_FINISHED_MSG: &str = "QC finished, exiting the workflow";

lazy_static! {
    pub static ref STAGE_LABELS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert(QUALITY_CONTROL_TAG, "QC");
        m.insert(TRIM_TAG, "trimming");
        m.insert(QUANTIFY_TRANS_TAG, "transcripts quantification");
        m.insert(ALIGN_COUNT_GENOME_TAG, "genome alignment");
        m.insert(DEA_TRANS_TAG, "DEA transcriptome based");
        m.insert(DEA_GENOME_TAG, "DEA genome based");
        m.insert(VISUALIZE_TAG, "visualization");

        m
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reference {
    Transcriptome,
    Genome,
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Transcriptome => write!(f, "transcriptome"),
            Reference::Genome => write!(f, "genome"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    QualityControl,
    Trim,
    QuantifyTrans,
    AlignCountGenome,
    DeaTrans,
    DeaGenome,
    Visualize,
}

impl Stage {
    pub fn tag(&self) -> &'static str {
        match self {
            Stage::QualityControl => QUALITY_CONTROL_TAG,
            Stage::Trim => TRIM_TAG,
            Stage::QuantifyTrans => QUANTIFY_TRANS_TAG,
            Stage::AlignCountGenome => ALIGN_COUNT_GENOME_TAG,
            Stage::DeaTrans => DEA_TRANS_TAG,
            Stage::DeaGenome => DEA_GENOME_TAG,
            Stage::Visualize => VISUALIZE_TAG,
        }
    }

    /// Label used in the run log's timing lines.
    pub fn label(&self) -> &'static str {
        STAGE_LABELS.get(self.tag()).copied().unwrap_or(self.tag())
    }

    pub fn mapping(reference: Reference) -> Stage {
        match reference {
            Reference::Transcriptome => Stage::QuantifyTrans,
            Reference::Genome => Stage::AlignCountGenome,
        }
    }

    pub fn dea(reference: Reference) -> Stage {
        match reference {
            Reference::Transcriptome => Stage::DeaTrans,
            Reference::Genome => Stage::DeaGenome,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Which of the up-front stages an invocation is limited to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    None,
    QualityControlOnly,
    TrimOnly,
}

impl RunMode {
    pub fn from_flags(qc: bool, trim: bool) -> Result<RunMode, PipelineError> {
        match (qc, trim) {
            (true, true) => Err(PipelineError::PreconditionViolation(
                "--qc and --trim are mutually exclusive".to_string(),
            )),
            (true, false) => Ok(RunMode::QualityControlOnly),
            (false, true) => Ok(RunMode::TrimOnly),
            (false, false) => Ok(RunMode::None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log a non-zero stage exit and keep going.
    #[default]
    Permissive,
    FailFast,
}

/// Run parameters after merging CLI overrides with the config file.
/// `reference` is only `None` in QC-only mode.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    pub project: String,
    pub reference: Option<Reference>,
    pub run_dea: bool,
    pub visualize: bool,
    pub gene_level: bool,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: RunMode,
    pub effective: EffectiveConfig,
    pub log_file: PathBuf,
    pub stage_log_dir: PathBuf,
    pub workflow_dir: PathBuf,
    pub failure_policy: FailurePolicy,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing required configuration: {0} (set it on the command line or in the config file)")]
    MissingRequiredConfig(String),

    #[error("Precondition violated: {0}")]
    PreconditionViolation(String),

    #[error("Stage {stage} exited with status {}", describe_exit(.exit_code))]
    StageFailure { stage: Stage, exit_code: Option<i32> },

    #[error("Failed to launch stage {stage}: {reason}")]
    StageLaunch { stage: Stage, reason: String },

    #[error("I/O error: {0}")]
    IOError(String),
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

impl PipelineError {
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::InvalidConfig(_) | PipelineError::MissingRequiredConfig(_) => EXIT_CONFIG,
            PipelineError::PreconditionViolation(_) => EXIT_PRECONDITION,
            PipelineError::StageFailure { .. } => EXIT_STAGE_FAILURE,
            PipelineError::StageLaunch { .. } | PipelineError::IOError(_) => EXIT_GENERAL,
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::IOError(e.to_string())
    }
}
