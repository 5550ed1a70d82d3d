use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "eqindex")]
#[command(about = "eqindex - Daily equal-weighted index of the largest listed companies")]
#[command(version = "0.1.0")]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "config/eqindex.yaml")]
    pub config: PathBuf,

    /// Override the configured log format (pretty, json, compact)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Import this JSON document before running the command. Memory storage
    /// starts empty on every run, so it needs this to build or query.
    #[arg(long, global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a configuration file with all defaults
    Init {
        /// Output path for the new configuration file
        #[arg(short, long, default_value = "eqindex.yaml")]
        output: PathBuf,
    },

    /// Validate the configuration without touching storage
    Validate,

    /// Load stocks and daily observations from a JSON document
    Import {
        /// File holding `{ "stocks": [...], "observations": [...] }`
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Build the index over a date range
    Build {
        #[command(flatten)]
        range: RangeArgs,

        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },

    /// Show the composition of one date
    Composition {
        #[arg(short, long)]
        date: NaiveDate,

        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },

    /// Show composition changes over a date range
    Changes {
        #[command(flatten)]
        range: RangeArgs,

        /// Only list added and removed symbols per date
        #[arg(long)]
        summary: bool,

        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },

    /// Show daily and cumulative returns over a date range
    Performance {
        #[command(flatten)]
        range: RangeArgs,

        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },
}

/// Inclusive date range, `YYYY-MM-DD`
#[derive(Args, Debug, Clone, Copy)]
pub struct RangeArgs {
    #[arg(short, long)]
    pub start: NaiveDate,

    /// Defaults to `start`
    #[arg(short, long)]
    pub end: Option<NaiveDate>,
}

impl RangeArgs {
    pub fn bounds(&self) -> (NaiveDate, NaiveDate) {
        (self.start, self.end.unwrap_or(self.start))
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Aligned columns for terminals
    Table,
    /// Pretty-printed JSON
    Json,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_defaults_end_to_start() {
        let cli = Cli::try_parse_from(["eqindex", "build", "--start", "2024-03-01"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("config/eqindex.yaml"));
        match cli.command {
            Commands::Build { range, output } => {
                let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
                assert_eq!(range.bounds(), (day, day));
                assert_eq!(output, OutputFormat::Table);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_args_after_subcommand() {
        let cli = Cli::try_parse_from([
            "eqindex",
            "changes",
            "-s",
            "2024-03-01",
            "-e",
            "2024-03-29",
            "--summary",
            "--config",
            "/etc/eqindex.yaml",
            "--output",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/eqindex.yaml"));
        assert!(matches!(
            cli.command,
            Commands::Changes { summary: true, output: OutputFormat::Json, .. }
        ));
    }

    #[test]
    fn test_rejects_bad_date() {
        assert!(Cli::try_parse_from(["eqindex", "composition", "--date", "2024-13-01"]).is_err());
    }
}
