use thiserror::Error;

/// Errors that abort a race before its first tick. Once a race runs, nothing is fatal: every
/// per-tick computation works on clamped or defaulted values.
#[derive(Debug, Error)]
pub enum RaceError {
    #[error("Failed to fetch racers from the roster source: {reason}")]
    RosterFetch { reason: String },

    #[error("No racers found in the roster source")]
    EmptyRoster,
}
