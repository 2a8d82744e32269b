use crate::core::race::{RacePars, SimConstants};
use crate::pre::roster::RawRacerRecord;
use anyhow::Context;
use serde::de::DeserializeOwned;
use std::fs::OpenOptions;
use std::path::Path;

/// read_json reads a JSON file and decodes it into the requested parameter struct. `what` names
/// the file in error messages.
fn read_json<T: DeserializeOwned>(filepath: &Path, what: &str) -> anyhow::Result<T> {
    let fh = OpenOptions::new()
        .read(true)
        .open(filepath)
        .context(format!(
            "Failed to open {} file {}!",
            what,
            filepath.display()
        ))?;
    let pars = serde_json::from_reader(&fh).context(format!(
        "Failed to parse {} file {}!",
        what,
        filepath.display()
    ))?;
    Ok(pars)
}

/// Read simulation constants (model and scoring parameters) from a JSON file. Missing fields
/// keep their defaults.
pub fn read_sim_constants(filepath: &Path) -> anyhow::Result<SimConstants> {
    read_json(filepath, "simulation constants")
}

/// Read race parameters (course, condition, laps, lap length) from a JSON file.
pub fn read_race_pars(filepath: &Path) -> anyhow::Result<RacePars> {
    read_json(filepath, "race parameter")
}

/// Read a roster, i.e. a JSON array of raw racer records.
pub fn read_roster(filepath: &Path) -> anyhow::Result<Vec<RawRacerRecord>> {
    read_json(filepath, "roster")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::track::Condition;
    use approx::assert_relative_eq;
    use std::path::PathBuf;

    fn input_file(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../input/parameters")
            .join(name)
    }

    #[test]
    fn race_pars_file_is_read() {
        let race_pars = read_race_pars(&input_file("race_pars.json")).unwrap();
        assert_eq!(race_pars.course.as_deref(), Some("spa"));
        assert_eq!(race_pars.condition, Condition::SlightlyWet);
        assert_eq!(race_pars.tot_no_laps, 5);
        assert_relative_eq!(race_pars.lap_length, 1200.0);
    }

    #[test]
    fn missing_file_names_the_file_kind() {
        let err = read_race_pars(&input_file("does_not_exist.json")).unwrap_err();
        assert!(format!("{}", err).contains("race parameter"));
    }
}
