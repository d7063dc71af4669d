//! CLI argument parsing for trialctl

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tc")]
#[command(author, version, about = "Change-detection trial controller", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a session against the simulated subject
    Run {
        /// Probability of a correct answer
        #[arg(long)]
        accuracy: Option<f64>,

        /// Probability of not answering inside the response window
        #[arg(long)]
        miss_rate: Option<f64>,

        /// Clock speed-up relative to real time
        #[arg(short, long)]
        speed: Option<f64>,

        /// Fixed random seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show the persisted phase, session count and last completed date
    Status,

    /// Summarize a trial log per block
    Summary {
        /// Trial log (.tsv) to read
        #[arg(required = true)]
        log: PathBuf,
    },

    /// Move the subject to another phase
    SetPhase {
        /// Phase name as persisted (PreTraining, Training, Test, Test1..Test4)
        #[arg(required = true)]
        phase: String,

        /// Session count to start the phase at
        #[arg(long, default_value = "0")]
        count: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from(["tc", "--log-level", "debug", "run", "--speed", "20", "--seed", "3"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Command::Run { speed, seed, accuracy, .. } => {
                assert_eq!(speed, Some(20.0));
                assert_eq!(seed, Some(3));
                assert_eq!(accuracy, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_set_phase_default_count() {
        let cli = Cli::try_parse_from(["tc", "-c", "lab.yml", "set-phase", "Test1"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("lab.yml")));
        match cli.command {
            Command::SetPhase { phase, count } => {
                assert_eq!(phase, "Test1");
                assert_eq!(count, 0);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_summary_requires_log() {
        assert!(Cli::try_parse_from(["tc", "summary"]).is_err());
    }
}
