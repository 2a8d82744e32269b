#![allow(dead_code)]

use racesim::core::driver::RacerTemplate;
use racesim::core::race::{Race, RacePars, SimConstants, TickOutcome};
use racesim::core::track::Condition;
use racesim::interfaces::messages::{RaceEvent, RaceMessage, RaceSnapshot};
use rand::rngs::mock::StepRng;
use rand::Rng;

/// Generator whose unit floats are always 0.5, i.e. every symmetric noise term is 0.
pub fn half_rng() -> StepRng {
    StepRng::new(1 << 63, 0)
}

pub fn template(id: u32, base_speed: f64) -> RacerTemplate {
    RacerTemplate {
        id,
        name: format!("Racer {}", id),
        handling: 70.0,
        aggression: 60.0,
        tyre_management: 60.0,
        base_speed,
        price: 20.0,
        favourite_courses: vec![
            "monza".to_owned(),
            "spa".to_owned(),
            "suzuka".to_owned(),
            "silverstone".to_owned(),
            "monaco".to_owned(),
        ],
        favourable_conditions: vec![Condition::Wet, Condition::SlightlyWet, Condition::Dry],
    }
}

pub fn roster(n: u32) -> Vec<RacerTemplate> {
    (1..=n).map(|id| template(id, 45.0 + id as f64)).collect()
}

pub fn race_pars(laps: u32) -> RacePars {
    RacePars {
        course: Some("monaco".to_owned()),
        condition: Condition::Dry,
        tot_no_laps: laps,
        lap_length: 1000.0,
    }
}

/// One simulated tick as seen from the outside.
#[derive(Debug)]
pub struct TickRecord {
    pub outcome: TickOutcome,
    pub messages: Vec<RaceMessage>,
}

impl TickRecord {
    pub fn events(&self) -> Vec<&RaceEvent> {
        self.messages
            .iter()
            .filter_map(|m| match m {
                RaceMessage::Event(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    pub fn snapshot(&self) -> &RaceSnapshot {
        self.messages
            .iter()
            .find_map(|m| match m {
                RaceMessage::Snapshot(s) => Some(s),
                _ => None,
            })
            .expect("every tick publishes a snapshot")
    }
}

/// run_to_end ticks the race until it concludes or `max_ticks` were simulated.
pub fn run_to_end<R: Rng>(race: &mut Race<R>, max_ticks: u64) -> Vec<TickRecord> {
    let mut records = Vec::new();

    for _ in 0..max_ticks {
        let mut messages: Vec<RaceMessage> = Vec::new();
        let outcome = race.simulate_tick(&mut messages);
        records.push(TickRecord { outcome, messages });

        if outcome != TickOutcome::Running {
            break;
        }
    }

    records
}

pub fn busy_constants() -> SimConstants {
    SimConstants {
        base_crash: 0.004,
        ..SimConstants::default()
    }
}
