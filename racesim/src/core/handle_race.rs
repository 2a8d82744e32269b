use crate::core::race::{Race, RacePars, SimConstants, TickOutcome};
use crate::error::RaceError;
use crate::interfaces::messages::{RaceEvent, RaceSink};
use crate::post::race_result::RaceResult;
use crate::pre::roster::{load_templates, RosterSource};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};

/// StopHandle requests a hard stop of a running race from another thread. The race observes the
/// request at the next tick boundary and halts without publishing a terminal message.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> StopHandle {
        StopHandle::default()
    }

    /// stop is idempotent and can be called at any time.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RaceOutcome {
    Finished(RaceResult),
    Abandoned(RaceResult),
    /// The race was halted by a stop request after the given tick.
    Stopped { tick: u64 },
}

/// prepare_race runs the race-start preamble: fetch the roster, load the templates and set up the
/// race. Both failure cases are published as `race_error` before the error is returned, in which
/// case no race is started.
pub fn prepare_race<R: Rng, S: RaceSink + ?Sized>(
    source: &dyn RosterSource,
    race_pars: &RacePars,
    sim_consts: &SimConstants,
    mut rng: R,
    sink: &mut S,
) -> Result<Race<R>, RaceError> {
    sink.publish_event(RaceEvent::RaceStarting {
        message: "fetching racers...".to_owned(),
    });

    let records = match source.fetch_records() {
        Ok(records) => records,
        Err(e) => {
            log::warn!("Roster fetch failed: {:#}", e);
            sink.publish_event(RaceEvent::RaceError {
                message: "Failed to fetch racers from the roster source.".to_owned(),
            });
            return Err(RaceError::RosterFetch {
                reason: format!("{:#}", e),
            });
        }
    };

    let templates = load_templates(records, &sim_consts.course_ids(), &mut rng);

    if templates.is_empty() {
        log::warn!("Roster source returned no usable racers");
        sink.publish_event(RaceEvent::RaceError {
            message: "No racers found in the roster source.".to_owned(),
        });
        return Err(RaceError::EmptyRoster);
    }

    log::info!("Fetched {} racers", templates.len());
    sink.publish_event(RaceEvent::FetchOk {
        message: format!("fetched {} racers", templates.len()),
        count: templates.len(),
    });

    Ok(Race::new(templates, race_pars, sim_consts, rng))
}

/// run_race publishes the race start and ticks the race until it terminates, a stop is requested
/// or `max_ticks` ticks were simulated. With a real-time factor the ticks are paced at the
/// configured tick period divided by the factor, otherwise the race is simulated as fast as
/// possible.
pub fn run_race<R: Rng, S: RaceSink + ?Sized>(
    race: &mut Race<R>,
    sink: &mut S,
    stop: &StopHandle,
    realtime_factor: Option<f64>,
    max_ticks: Option<u64>,
) -> RaceOutcome {
    let start_event = race.get_race_start_event();
    log::info!("{}", start_event);
    sink.publish_event(start_event);

    let period = realtime_factor
        .filter(|&f| f.is_finite() && f > 0.0)
        .map(|f| Duration::from_secs_f64(race.get_sim_consts().tick_ms as f64 / 1000.0 / f));
    let mut next_fire = Instant::now();

    loop {
        // wait for the timer to fire
        if let Some(period) = period {
            next_fire += period;
            let now = Instant::now();

            if next_fire > now {
                sleep(next_fire - now);
            } else {
                log::warn!("Could not keep up with real-time!");
                next_fire = now;
            }
        }

        if stop.is_stopped() {
            log::info!("Race stopped externally after tick {}", race.cur_tick);
            return RaceOutcome::Stopped {
                tick: race.cur_tick,
            };
        }

        if max_ticks.map_or(false, |max_ticks| race.cur_tick >= max_ticks) {
            log::info!("Tick limit reached after tick {}", race.cur_tick);
            return RaceOutcome::Stopped {
                tick: race.cur_tick,
            };
        }

        match race.simulate_tick(sink) {
            TickOutcome::Running => {}
            TickOutcome::Finished => return RaceOutcome::Finished(race.get_race_result()),
            TickOutcome::Abandoned => return RaceOutcome::Abandoned(race.get_race_result()),
        }
    }
}

/// handle_race creates and simulates a race on the basis of the inserted parameters and returns
/// the outcome for post-processing.
pub fn handle_race<R: Rng, S: RaceSink + ?Sized>(
    source: &dyn RosterSource,
    race_pars: &RacePars,
    sim_consts: &SimConstants,
    rng: R,
    sink: &mut S,
    stop: &StopHandle,
    realtime_factor: Option<f64>,
    max_ticks: Option<u64>,
) -> Result<RaceOutcome, RaceError> {
    let mut race = prepare_race(source, race_pars, sim_consts, rng, sink)?;
    Ok(run_race(&mut race, sink, stop, realtime_factor, max_ticks))
}
