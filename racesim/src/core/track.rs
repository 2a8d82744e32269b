use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Fallback risk weight if a course carries no buckets at all.
const DEFAULT_BUCKET_RISK: f64 = 0.1;

/// Weather condition of a race. The order dry < slightly wet < wet is also the order of the
/// global crash multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Dry,
    SlightlyWet,
    Wet,
}

impl Condition {
    pub const ALL: [Condition; 3] = [Condition::Dry, Condition::SlightlyWet, Condition::Wet];

    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Dry => "dry",
            Condition::SlightlyWet => "slightly_wet",
            Condition::Wet => "wet",
        }
    }
}

impl Default for Condition {
    fn default() -> Self {
        Condition::Dry
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("Unknown weather condition '{0}', expected one of dry, slightly_wet, wet")]
pub struct UnknownCondition(pub String);

impl FromStr for Condition {
    type Err = UnknownCondition;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "dry" => Ok(Condition::Dry),
            "slightly_wet" => Ok(Condition::SlightlyWet),
            "wet" => Ok(Condition::Wet),
            _ => Err(UnknownCondition(s.to_owned())),
        }
    }
}

/// * `name` - Course identifier, e.g. monaco
/// * `risk_buckets` - Crash risk weight of each equally long arc segment of one lap, starting at
/// the finish line
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TrackPars {
    pub name: String,
    pub risk_buckets: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct Track {
    pub name: String,
    pub lap_length: f64,
    risk_buckets: Vec<f64>,
}

impl Track {
    pub fn new(track_pars: &TrackPars, lap_length: f64) -> Track {
        let mut risk_buckets: Vec<f64> = track_pars
            .risk_buckets
            .iter()
            .map(|&w| if w.is_finite() { w.max(0.0) } else { DEFAULT_BUCKET_RISK })
            .collect();

        if risk_buckets.is_empty() {
            log::warn!(
                "Course {} has no risk buckets, using a flat risk of {}",
                track_pars.name,
                DEFAULT_BUCKET_RISK
            );
            risk_buckets.push(DEFAULT_BUCKET_RISK);
        }

        Track {
            name: track_pars.name.to_owned(),
            lap_length,
            risk_buckets,
        }
    }

    pub fn no_buckets(&self) -> usize {
        self.risk_buckets.len()
    }

    /// lap_frac returns the fractional position within the current lap in [0, 1).
    pub fn lap_frac(&self, distance: f64) -> f64 {
        if self.lap_length <= 0.0 || !distance.is_finite() {
            return 0.0;
        }
        (distance % self.lap_length) / self.lap_length
    }

    /// bucket_idx returns the risk bucket a competitor at the given cumulative distance is in.
    pub fn bucket_idx(&self, distance: f64) -> usize {
        let n = self.risk_buckets.len();
        ((self.lap_frac(distance) * n as f64).floor() as usize).min(n - 1)
    }

    /// corner_risk returns the risk weight at the given cumulative distance.
    pub fn corner_risk(&self, distance: f64) -> f64 {
        self.risk_buckets[self.bucket_idx(distance)]
    }
}

/// builtin_courses returns the default course catalog (20 buckets per course).
pub fn builtin_courses() -> Vec<TrackPars> {
    let course = |name: &str, risk_buckets: [f64; 20]| TrackPars {
        name: name.to_owned(),
        risk_buckets: risk_buckets.to_vec(),
    };

    vec![
        course(
            "monaco",
            [
                0.02, 0.05, 0.12, 0.18, 0.25, 0.3, 0.28, 0.22, 0.18, 0.15, 0.14, 0.12, 0.2, 0.25,
                0.3, 0.22, 0.15, 0.1, 0.08, 0.04,
            ],
        ),
        course(
            "silverstone",
            [
                0.04, 0.06, 0.08, 0.12, 0.15, 0.2, 0.18, 0.25, 0.22, 0.18, 0.12, 0.1, 0.08, 0.07,
                0.06, 0.08, 0.1, 0.12, 0.09, 0.05,
            ],
        ),
        course(
            "monza",
            [
                0.01, 0.02, 0.03, 0.02, 0.04, 0.03, 0.02, 0.03, 0.02, 0.01, 0.02, 0.03, 0.02, 0.04,
                0.03, 0.02, 0.01, 0.02, 0.03, 0.01,
            ],
        ),
        course(
            "spa",
            [
                0.03, 0.05, 0.1, 0.18, 0.22, 0.28, 0.25, 0.18, 0.14, 0.12, 0.15, 0.2, 0.26, 0.18,
                0.14, 0.12, 0.1, 0.08, 0.06, 0.04,
            ],
        ),
        course(
            "suzuka",
            [
                0.04, 0.07, 0.12, 0.15, 0.2, 0.18, 0.16, 0.2, 0.18, 0.14, 0.12, 0.1, 0.08, 0.1,
                0.12, 0.14, 0.1, 0.08, 0.06, 0.05,
            ],
        ),
    ]
}
