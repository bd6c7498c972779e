// src/config/loader.rs: config file loading and CLI override resolution

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer};
use serde_yaml::Value;

use crate::cli::Arguments;
use crate::config::defs::{
    EffectiveConfig, FailurePolicy, PipelineError, Reference, RunConfig, RunMode, GENE_LEVEL_KEY,
    PROJECT_KEY, REFERENCE_KEY, STAGE_LOG_DIR, WORKFLOW_DIR,
};

/// The keys of the main config file this driver reads. Everything else in the
/// file belongs to the workflow rules and is ignored here.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ConfigFile {
    #[serde(rename = "PROJECT")]
    pub project: Option<String>,
    #[serde(rename = "REFERENCE")]
    pub reference: Option<Reference>,
    #[serde(rename = "VISUALIZE", default, deserialize_with = "yaml_flag")]
    pub visualize: Option<bool>,
    /// Kept raw: only checked when transcriptome DEA results get visualized.
    #[serde(rename = "GENE_LEVEL", default)]
    pub gene_level: Option<Value>,
}

/// Accepts YAML 1.1 style switches (`True`, `yes`, `off`) next to plain booleans;
/// config files written for the workflow rules use both.
fn value_flag(value: &Value) -> Result<Option<bool>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" => Ok(Some(true)),
            "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(format!("expected a boolean, got {:?}", s)),
        },
        other => Err(format!("expected a boolean, got {:?}", other)),
    }
}

fn yaml_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None => Ok(None),
        Some(value) => value_flag(&value).map_err(D::Error::custom),
    }
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<ConfigFile, PipelineError> {
        let text = fs::read_to_string(path).map_err(|e| {
            PipelineError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        ConfigFile::parse(&text)
            .map_err(|e| PipelineError::InvalidConfig(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(text: &str) -> Result<ConfigFile, serde_yaml::Error> {
        // An empty document deserializes to unit, not a mapping
        if text.trim().is_empty() {
            return Ok(ConfigFile::default());
        }
        serde_yaml::from_str(text)
    }
}

/// Merges command-line overrides with the config file.
///
/// # Arguments
///
/// * `args` - Parsed command-line arguments; present values win.
/// * `file` - Loaded config file; used for anything the CLI leaves unset.
/// * `mode` - Run mode. QC-only runs never reach a reference-dependent stage,
///   so the reference may stay unresolved there.
///
/// # Returns
/// EffectiveConfig for the whole run.
pub fn resolve(args: &Arguments, file: &ConfigFile, mode: RunMode) -> Result<EffectiveConfig, PipelineError> {
    let project = match (&args.project, &file.project) {
        (Some(p), _) => p.clone(),
        (None, Some(p)) => p.clone(),
        (None, None) => return Err(PipelineError::MissingRequiredConfig(PROJECT_KEY.to_string())),
    };
    if project.trim().is_empty() {
        return Err(PipelineError::InvalidConfig("project name is empty".to_string()));
    }

    let reference = args.reference.or(file.reference);
    if reference.is_none() && mode != RunMode::QualityControlOnly {
        return Err(PipelineError::MissingRequiredConfig(REFERENCE_KEY.to_string()));
    }

    // --visualize is a plain switch: only its presence overrides the file
    let visualize = if args.visualize {
        true
    } else {
        file.visualize.unwrap_or(false)
    };

    let gene_level_needed = reference == Some(Reference::Transcriptome) && args.dea && visualize;
    let gene_level = match file.gene_level.as_ref().map(value_flag) {
        None => false,
        Some(Ok(flag)) => flag.unwrap_or(false),
        Some(Err(e)) if gene_level_needed => {
            return Err(PipelineError::InvalidConfig(format!("{}: {}", GENE_LEVEL_KEY, e)));
        }
        Some(Err(e)) => {
            debug!("Ignoring unused {}: {}", GENE_LEVEL_KEY, e);
            false
        }
    };

    Ok(EffectiveConfig {
        project,
        reference,
        run_dea: args.dea,
        visualize,
        gene_level,
    })
}

impl RunConfig {
    /// Builds the run configuration from parsed arguments, loading the config
    /// file they point at. Stage logs and rule files are resolved relative to
    /// the current directory.
    pub fn from_args(args: &Arguments) -> Result<RunConfig, PipelineError> {
        let mode = RunMode::from_flags(args.qc, args.trim)?;
        let file = ConfigFile::load(Path::new(&args.config))?;
        debug!("Loaded config file {}: {:?}", args.config, file);
        let effective = resolve(args, &file, mode)?;

        let failure_policy = if args.fail_fast {
            FailurePolicy::FailFast
        } else {
            FailurePolicy::Permissive
        };

        Ok(RunConfig {
            mode,
            effective,
            log_file: PathBuf::from(&args.logfile),
            stage_log_dir: PathBuf::from(STAGE_LOG_DIR),
            workflow_dir: PathBuf::from(WORKFLOW_DIR),
            failure_policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(project: &str, reference: Reference, visualize: bool) -> ConfigFile {
        ConfigFile {
            project: Some(project.to_string()),
            reference: Some(reference),
            visualize: Some(visualize),
            gene_level: Some(Value::Bool(true)),
        }
    }

    #[test]
    fn test_cli_overrides_config_file() -> Result<(), PipelineError> {
        let file = file_with("from_file", Reference::Genome, false);

        for cli_project in [None, Some("from_cli")] {
            for cli_reference in [None, Some(Reference::Transcriptome)] {
                for cli_visualize in [false, true] {
                    let args = Arguments {
                        project: cli_project.map(str::to_string),
                        reference: cli_reference,
                        visualize: cli_visualize,
                        ..Default::default()
                    };
                    let eff = resolve(&args, &file, RunMode::None)?;

                    assert_eq!(eff.project, cli_project.unwrap_or("from_file"));
                    assert_eq!(eff.reference, Some(cli_reference.unwrap_or(Reference::Genome)));
                    assert_eq!(eff.visualize, cli_visualize);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_visualize_falls_back_to_file() -> Result<(), PipelineError> {
        let file = file_with("demo", Reference::Genome, true);
        let eff = resolve(&Arguments::default(), &file, RunMode::None)?;
        assert!(eff.visualize);
        Ok(())
    }

    #[test]
    fn test_missing_reference_is_config_error() {
        let file = ConfigFile { project: Some("demo".to_string()), ..Default::default() };
        let args = Arguments::default();

        match resolve(&args, &file, RunMode::TrimOnly) {
            Err(PipelineError::MissingRequiredConfig(key)) => assert_eq!(key, REFERENCE_KEY),
            other => panic!("Expected missing REFERENCE, got {:?}", other),
        }

        let eff = resolve(&args, &file, RunMode::QualityControlOnly).unwrap();
        assert_eq!(eff.reference, None);
    }

    #[test]
    fn test_missing_or_empty_project() {
        let file = ConfigFile { reference: Some(Reference::Genome), ..Default::default() };
        assert!(matches!(
            resolve(&Arguments::default(), &file, RunMode::None),
            Err(PipelineError::MissingRequiredConfig(_))
        ));

        let args = Arguments { project: Some("  ".to_string()), ..Default::default() };
        assert!(matches!(resolve(&args, &file, RunMode::None), Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_optional_flags_default_false() -> Result<(), PipelineError> {
        let file = ConfigFile {
            project: Some("demo".to_string()),
            reference: Some(Reference::Transcriptome),
            ..Default::default()
        };
        let eff = resolve(&Arguments::default(), &file, RunMode::None)?;
        assert!(!eff.visualize);
        assert!(!eff.gene_level);
        assert!(!eff.run_dea);
        Ok(())
    }

    #[test]
    fn test_parse_yaml_ignores_workflow_keys() {
        let text = "PROJECT: demo\nREFERENCE: genome\nVISUALIZE: true\nGENE_LEVEL: false\nNCORE: 8\nEND: pair\n";
        let file = ConfigFile::parse(text).unwrap();
        assert_eq!(file.project.as_deref(), Some("demo"));
        assert_eq!(file.reference, Some(Reference::Genome));
        assert_eq!(file.visualize, Some(true));
        assert_eq!(file.gene_level, Some(Value::Bool(false)));

        assert_eq!(ConfigFile::parse("").unwrap(), ConfigFile::default());
    }

    #[test]
    fn test_parse_yaml_capitalized_flags() -> Result<(), PipelineError> {
        let file = ConfigFile::parse("PROJECT: demo\nREFERENCE: transcriptome\nVISUALIZE: True\nGENE_LEVEL: yes\n").unwrap();
        assert_eq!(file.visualize, Some(true));

        let args = Arguments { dea: true, ..Default::default() };
        let eff = resolve(&args, &file, RunMode::None)?;
        assert!(eff.gene_level);

        assert!(ConfigFile::parse("VISUALIZE: maybe\n").is_err());
        Ok(())
    }

    #[test]
    fn test_malformed_gene_level_only_fails_where_consulted() -> Result<(), PipelineError> {
        let file = ConfigFile::parse("PROJECT: demo\nREFERENCE: genome\nVISUALIZE: true\nGENE_LEVEL: maybe\n").unwrap();
        let args = Arguments { dea: true, ..Default::default() };

        let eff = resolve(&args, &file, RunMode::None)?;
        assert!(eff.visualize);

        let args = Arguments { dea: true, reference: Some(Reference::Transcriptome), ..Default::default() };
        match resolve(&args, &file, RunMode::None) {
            Err(PipelineError::InvalidConfig(msg)) => assert!(msg.contains(GENE_LEVEL_KEY), "{}", msg),
            other => panic!("Expected invalid GENE_LEVEL, got {:?}", other),
        }

        // Without DEA there is no visualization, so the key is never read
        let args = Arguments { reference: Some(Reference::Transcriptome), ..Default::default() };
        assert!(resolve(&args, &file, RunMode::None).is_ok());
        Ok(())
    }

    #[test]
    fn test_invalid_reference_value() -> std::io::Result<()> {
        let mut tmp = NamedTempFile::new()?;
        writeln!(tmp, "PROJECT: demo\nREFERENCE: exome")?;
        tmp.flush()?;

        assert!(matches!(ConfigFile::load(tmp.path()), Err(PipelineError::InvalidConfig(_))));
        Ok(())
    }

    #[test]
    fn test_missing_config_file() {
        let result = ConfigFile::load(Path::new("does/not/exist/config_main.yaml"));
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_run_config_from_args() -> std::io::Result<()> {
        let mut tmp = NamedTempFile::new()?;
        writeln!(tmp, "PROJECT: demo\nREFERENCE: transcriptome")?;
        tmp.flush()?;

        let args = Arguments {
            config: tmp.path().to_string_lossy().into_owned(),
            logfile: "logs/run.txt".to_string(),
            trim: true,
            fail_fast: true,
            ..Default::default()
        };
        let config = RunConfig::from_args(&args).unwrap();
        assert_eq!(config.mode, RunMode::TrimOnly);
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.log_file, PathBuf::from("logs/run.txt"));
        assert_eq!(config.effective.reference, Some(Reference::Transcriptome));
        Ok(())
    }
}
