use crate::core::track::Condition;
use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;

/// Output format of the race message stream on the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human readable event log plus the final standings table
    Text,
    /// One JSON object per published message
    Json,
    /// Final standings as CSV only
    Csv,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!(
                "Unknown output format '{}', expected one of text, json, csv",
                s
            )),
        }
    }
}

#[derive(Debug, Parser, Clone)]
#[clap(
    version = "0.1.0",
    name = "racesim",
    about = "A tick-driven race simulator with pit stops, crashes and a safety car"
)]
pub struct SimOpts {
    // FLAGS ---------------------------------------------------------------------------------------
    /// Activate debug logging
    #[clap(short, long)]
    pub debug: bool,

    // OPTIONS -------------------------------------------------------------------------------------
    /// Set path to the roster file (JSON array of racer records)
    #[clap(short, long = "roster", default_value = "input/rosters/sample_roster.json")]
    pub roster_path: PathBuf,

    /// Set path to a simulation constants file (OPTIONAL: built-in constants are used if not set)
    #[clap(short = 'k', long = "config")]
    pub config_path: Option<PathBuf>,

    /// Set path to a race parameter file (OPTIONAL: course, condition, laps and lap length, the
    /// options below take precedence)
    #[clap(short = 'p', long = "race-pars")]
    pub race_pars_path: Option<PathBuf>,

    /// Set course identifier, unknown courses fall back to the configured fallback course
    #[clap(short, long)]
    pub course: Option<String>,

    /// Set weather condition (dry, slightly_wet, wet) (OPTIONAL: dry if not set)
    #[clap(short = 'w', long)]
    pub condition: Option<Condition>,

    /// Set total number of laps (OPTIONAL: 10 if not set)
    #[clap(short, long)]
    pub laps: Option<u32>,

    /// Set seed of the random number generator (OPTIONAL: random seed if not set)
    #[clap(short, long)]
    pub seed: Option<u64>,

    /// Set real-time factor, 0 simulates as fast as possible
    #[clap(short = 'f', long, default_value = "0.0")]
    pub realtime_factor: f64,

    /// Set output format (text, json, csv)
    #[clap(short = 'o', long, default_value = "text")]
    pub format: OutputFormat,

    /// Stop the race after this many ticks (OPTIONAL)
    #[clap(short = 'm', long)]
    pub max_ticks: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_short_flags() {
        let opts = SimOpts::parse_from(["racesim"]);
        assert!(opts.race_pars_path.is_none());
        assert!(opts.laps.is_none());
        assert!(opts.condition.is_none());
        assert_eq!(opts.format, OutputFormat::Text);
        assert!(opts.seed.is_none());

        let opts = SimOpts::parse_from([
            "racesim", "-c", "spa", "-w", "wet", "-l", "3", "-s", "42", "-o", "json", "-m", "100",
            "-p", "race.json",
        ]);
        assert_eq!(opts.course.as_deref(), Some("spa"));
        assert_eq!(opts.condition, Some(Condition::Wet));
        assert_eq!(opts.laps, Some(3));
        assert_eq!(opts.race_pars_path, Some(PathBuf::from("race.json")));
        assert_eq!(opts.seed, Some(42));
        assert_eq!(opts.format, OutputFormat::Json);
        assert_eq!(opts.max_ticks, Some(100));
    }
}
