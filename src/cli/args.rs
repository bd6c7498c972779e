use clap::Parser;

use crate::config::defs::{Reference, DEFAULT_CONFIG, DEFAULT_LOGFILE};

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "rasflow", version, about = "Run an RNASeq analysis")]
pub struct Arguments {

    #[arg(long, action, conflicts_with = "trim", help = "Run quality control, then exit")]
    pub qc: bool,

    #[arg(long, action, help = "Run trimming before mapping")]
    pub trim: bool,

    #[arg(long, default_value = DEFAULT_LOGFILE, help = "Log file to append running times to")]
    pub logfile: String,

    #[arg(long, default_value = DEFAULT_CONFIG, help = "Config file to open")]
    pub config: String,

    #[arg(long, help = "Project to run")]
    pub project: Option<String>,

    #[arg(long, value_enum, help = "Reference to use")]
    pub reference: Option<Reference>,

    #[arg(long, action, help = "Perform DEA")]
    pub dea: bool,

    #[arg(long, action, help = "Perform visualization")]
    pub visualize: bool,

    #[arg(long, action, help = "Halt the workflow when a stage exits with a non-zero status")]
    pub fail_fast: bool,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Arguments::try_parse_from(["rasflow"]).unwrap();
        assert_eq!(args.config, DEFAULT_CONFIG);
        assert_eq!(args.logfile, DEFAULT_LOGFILE);
        assert!(args.project.is_none());
        assert!(args.reference.is_none());
        assert!(!args.qc && !args.trim && !args.dea && !args.visualize);
    }

    #[test]
    fn test_qc_and_trim_conflict() {
        assert!(Arguments::try_parse_from(["rasflow", "--qc", "--trim"]).is_err());
    }

    #[test]
    fn test_reference_choices() {
        let args = Arguments::try_parse_from(["rasflow", "--reference", "genome", "--dea"]).unwrap();
        assert_eq!(args.reference, Some(Reference::Genome));
        assert!(args.dea);
        assert!(Arguments::try_parse_from(["rasflow", "--reference", "exome"]).is_err());
    }
}
