use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::io;

/// FinalStanding is the result of one racer at race end.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FinalStanding {
    pub id: u32,
    pub name: String,
    pub rank: u32,
    pub laps_completed: u32,
    pub retired: bool,
    pub final_score: u32,
    pub best_lap_elapsed: Option<u64>,
    pub price: f64,
}

/// RaceResult is the final-results message, emitted exactly once when a race terminates. Racers
/// are listed in rank order. `abandoned` is set if every racer retired, in which case all final
/// scores are 0.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RaceResult {
    pub tick: u64,
    pub abandoned: bool,
    pub competitors: Vec<FinalStanding>,
}

impl RaceResult {
    /// winner returns the rank 1 racer of a completed race.
    pub fn winner(&self) -> Option<&FinalStanding> {
        if self.abandoned {
            return None;
        }
        self.competitors.iter().find(|s| s.rank == 1)
    }

    /// standings_table returns the final standings formatted as a console table.
    pub fn standings_table(&self) -> String {
        let mut table = String::new();

        // writing into a String cannot fail
        let _ = writeln!(
            &mut table,
            "RESULT: {} after {} ticks",
            if self.abandoned { "Race abandoned" } else { "Final standings" },
            self.tick
        );
        let _ = writeln!(
            &mut table,
            "{:>4}  {:>4}  {:<24} {:>4}  {:>6}  {:>10}  {:>10}",
            "pos", "id", "name", "laps", "points", "best lap", "price"
        );

        for standing in self.competitors.iter() {
            let best_lap = match standing.best_lap_elapsed {
                Some(ms) => format!("{:.3}s", ms as f64 / 1000.0),
                None => "-".to_owned(),
            };
            let pos = if standing.retired {
                "DNF".to_owned()
            } else {
                standing.rank.to_string()
            };

            let _ = writeln!(
                &mut table,
                "{:>4}  {:>4}  {:<24} {:>4}  {:>6}  {:>10}  {:>10.2}",
                pos,
                standing.id,
                standing.name,
                standing.laps_completed,
                standing.final_score,
                best_lap,
                standing.price
            );
        }

        table
    }

    /// print_standings prints the final standings to the console output.
    pub fn print_standings(&self) {
        print!("{}", self.standings_table());
    }

    /// write_standings_csv writes the final standings as CSV (one header row, one row per racer).
    pub fn write_standings_csv<W: io::Write>(&self, writer: W) -> anyhow::Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);

        for standing in self.competitors.iter() {
            csv_writer.serialize(standing)?;
        }
        csv_writer.flush()?;

        Ok(())
    }
}
