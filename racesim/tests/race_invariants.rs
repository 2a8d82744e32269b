mod common;

use common::{busy_constants, race_pars, roster, run_to_end, TickRecord};
use racesim::core::race::{Race, TickOutcome};
use racesim::core::state_handler::{PitReason, State};
use racesim::core::tireset::MAX_TYRE_WEAR;
use racesim::interfaces::messages::{RaceEvent, RaceMessage, RaceSnapshot, RacerSnapshot};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;

fn simulate(seed: u64) -> Vec<TickRecord> {
    let mut race = Race::new(
        roster(10),
        &race_pars(3),
        &busy_constants(),
        StdRng::seed_from_u64(seed),
    );
    let records = run_to_end(&mut race, 50_000);

    assert!(race.is_concluded(), "race with seed {} did not terminate", seed);
    records
}

fn snapshot_by_id(snapshot: &RaceSnapshot) -> HashMap<u32, &RacerSnapshot> {
    snapshot.competitors.iter().map(|r| (r.id, r)).collect()
}

#[test]
fn every_racer_is_accounted_for() {
    for seed in 1..=3 {
        for record in simulate(seed) {
            let snapshot = record.snapshot();
            assert_eq!(snapshot.competitors.len(), 10);

            let finished = snapshot.competitors.iter().filter(|r| r.finished).count();
            let retired = snapshot.competitors.iter().filter(|r| r.retired).count();
            let active = snapshot
                .competitors
                .iter()
                .filter(|r| !r.finished && !r.retired)
                .count();
            assert_eq!(finished + retired + active, 10);

            for racer in snapshot.competitors.iter() {
                assert!(!(racer.retired && racer.finished));
                if racer.retired {
                    assert_eq!(racer.lifecycle_state, State::Retired);
                    assert!(racer.pit_reason.is_none());
                    assert_eq!(racer.pit_ticks_remaining, 0);
                }
            }
        }
    }
}

#[test]
fn tyre_wear_stays_bounded() {
    for seed in 1..=3 {
        for record in simulate(seed) {
            for racer in record.snapshot().competitors.iter() {
                assert!(racer.tyre_wear >= 0.0 && racer.tyre_wear <= MAX_TYRE_WEAR);
            }
        }
    }
}

#[test]
fn distance_only_shrinks_on_bunching_ticks() {
    for seed in 1..=3 {
        let records = simulate(seed);

        for pair in records.windows(2) {
            let prev = snapshot_by_id(pair[0].snapshot());
            let bunched = pair[1]
                .events()
                .iter()
                .any(|e| matches!(e, RaceEvent::SafetyCar { .. }));

            for racer in pair[1].snapshot().competitors.iter() {
                assert!(racer.distance >= 0.0);

                let before = prev[&racer.id];
                if !bunched {
                    assert!(
                        racer.distance >= before.distance,
                        "racer {} moved backwards at tick {}",
                        racer.id,
                        pair[1].snapshot().tick
                    );
                } else if before.retired || before.finished {
                    assert_eq!(racer.distance, before.distance);
                }
            }
        }
    }
}

#[test]
fn at_most_one_lap_per_tick() {
    for seed in 1..=3 {
        let records = simulate(seed);

        for pair in records.windows(2) {
            let prev = snapshot_by_id(pair[0].snapshot());
            for racer in pair[1].snapshot().competitors.iter() {
                let laps_before = prev[&racer.id].laps_completed;
                assert!(racer.laps_completed >= laps_before);
                assert!(racer.laps_completed - laps_before <= 1);
            }
            for event in pair[1].events() {
                if let RaceEvent::LapComplete { racer_id, lap, .. } = event {
                    assert_eq!(*lap, prev[racer_id].laps_completed + 1);
                }
            }
        }
    }
}

#[test]
fn terminal_states_stick() {
    for seed in 1..=3 {
        let records = simulate(seed);
        let mut terminal: HashMap<u32, (State, u32)> = HashMap::new();

        for record in records.iter() {
            for racer in record.snapshot().competitors.iter() {
                if let Some(&(state, laps)) = terminal.get(&racer.id) {
                    assert_eq!(racer.lifecycle_state, state);
                    assert_eq!(racer.laps_completed, laps);
                } else if racer.retired || racer.finished {
                    terminal.insert(racer.id, (racer.lifecycle_state, racer.laps_completed));
                }
            }

            // no event may refer to an already terminal racer
            for event in record.events() {
                match event {
                    RaceEvent::CrashRetire { .. } | RaceEvent::LapComplete { .. } => {}
                    RaceEvent::FastestLap { .. } => {}
                    e => {
                        if let Some(id) = e.racer_id() {
                            let snapshot = record.snapshot();
                            let racer = snapshot.get_racer(id).unwrap();
                            if matches!(e, RaceEvent::LeadChange { .. }) {
                                assert!(!racer.retired);
                            } else {
                                assert!(!racer.retired && !racer.finished);
                            }
                        }
                    }
                }
            }
        }

        // the race ends with exactly one final-results message
        let no_final = records
            .iter()
            .flat_map(|r| r.messages.iter())
            .filter(|m| matches!(m, RaceMessage::FinalResults(_)))
            .count();
        assert_eq!(no_final, 1);
        assert_ne!(records.last().unwrap().outcome, TickOutcome::Running);
    }
}

#[test]
fn pit_exit_handles_tyres_by_reason() {
    for seed in 1..=3 {
        let records = simulate(seed);
        let mut planned_repairs: HashMap<u32, u32> = HashMap::new();

        for pair in records.windows(2) {
            let prev = snapshot_by_id(pair[0].snapshot());

            for event in pair[1].events() {
                match *event {
                    RaceEvent::CrashPit {
                        racer_id,
                        pit_ticks,
                        ..
                    } => {
                        planned_repairs.insert(racer_id, pit_ticks);
                    }
                    RaceEvent::PitIn {
                        racer_id,
                        pit_ticks,
                        reason: PitReason::Repair,
                        ..
                    } => {
                        assert_eq!(planned_repairs.remove(&racer_id), Some(pit_ticks));
                    }
                    RaceEvent::PitIn {
                        pit_ticks,
                        reason: PitReason::Wear,
                        ..
                    } => {
                        assert_eq!(pit_ticks, busy_constants().pit_stop_ticks);
                    }
                    RaceEvent::PitOut {
                        racer_id,
                        tyre_wear,
                        reason,
                        ..
                    } => match reason {
                        PitReason::Wear => assert_eq!(tyre_wear, 0.0),
                        PitReason::Repair => assert_eq!(tyre_wear, prev[&racer_id].tyre_wear),
                    },
                    _ => {}
                }
            }
        }
    }
}
