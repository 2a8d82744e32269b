use crate::core::state_handler::{PitReason, State};
use crate::core::track::Condition;
use crate::post::race_result::RaceResult;
use flume::Sender;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete race events. Serialized as `{"type": "<snake_case name>", ...camelCase fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RaceEvent {
    RaceStarting {
        message: String,
    },
    FetchOk {
        message: String,
        count: usize,
    },
    RaceError {
        message: String,
    },
    RaceStart {
        course: String,
        condition: Condition,
        laps: u32,
        tick_ms: u64,
        racers: usize,
    },
    PitPlanned {
        tick: u64,
        racer_id: u32,
        tyre_wear: f64,
    },
    PitIn {
        tick: u64,
        racer_id: u32,
        pit_ticks: u32,
        reason: PitReason,
    },
    PitOut {
        tick: u64,
        racer_id: u32,
        tyre_wear: f64,
        reason: PitReason,
    },
    Recovered {
        tick: u64,
        racer_id: u32,
    },
    CrashRetire {
        tick: u64,
        racer_id: u32,
        crash_prob: f64,
    },
    CrashPit {
        tick: u64,
        racer_id: u32,
        pit_ticks: u32,
        crash_prob: f64,
    },
    CrashMinor {
        tick: u64,
        racer_id: u32,
        crash_prob: f64,
    },
    SafetyCar {
        tick: u64,
        duration: u32,
    },
    SafetyCarEnd {
        tick: u64,
    },
    FastestLap {
        tick: u64,
        racer_id: u32,
        lap_ms: u64,
    },
    LapComplete {
        tick: u64,
        racer_id: u32,
        lap: u32,
        lap_ms: u64,
    },
    LeadChange {
        tick: u64,
        racer_id: u32,
    },
    RaceAbandoned {
        tick: u64,
        message: String,
    },
    RaceEnd {
        tick: u64,
    },
}

impl RaceEvent {
    /// kind returns the wire name of the event type.
    pub fn kind(&self) -> &'static str {
        match self {
            RaceEvent::RaceStarting { .. } => "race_starting",
            RaceEvent::FetchOk { .. } => "fetch_ok",
            RaceEvent::RaceError { .. } => "race_error",
            RaceEvent::RaceStart { .. } => "race_start",
            RaceEvent::PitPlanned { .. } => "pit_planned",
            RaceEvent::PitIn { .. } => "pit_in",
            RaceEvent::PitOut { .. } => "pit_out",
            RaceEvent::Recovered { .. } => "recovered",
            RaceEvent::CrashRetire { .. } => "crash_retire",
            RaceEvent::CrashPit { .. } => "crash_pit",
            RaceEvent::CrashMinor { .. } => "crash_minor",
            RaceEvent::SafetyCar { .. } => "safety_car",
            RaceEvent::SafetyCarEnd { .. } => "safety_car_end",
            RaceEvent::FastestLap { .. } => "fastest_lap",
            RaceEvent::LapComplete { .. } => "lap_complete",
            RaceEvent::LeadChange { .. } => "lead_change",
            RaceEvent::RaceAbandoned { .. } => "race_abandoned",
            RaceEvent::RaceEnd { .. } => "race_end",
        }
    }

    /// racer_id returns the racer the event refers to, if any.
    pub fn racer_id(&self) -> Option<u32> {
        match *self {
            RaceEvent::PitPlanned { racer_id, .. }
            | RaceEvent::PitIn { racer_id, .. }
            | RaceEvent::PitOut { racer_id, .. }
            | RaceEvent::Recovered { racer_id, .. }
            | RaceEvent::CrashRetire { racer_id, .. }
            | RaceEvent::CrashPit { racer_id, .. }
            | RaceEvent::CrashMinor { racer_id, .. }
            | RaceEvent::FastestLap { racer_id, .. }
            | RaceEvent::LapComplete { racer_id, .. }
            | RaceEvent::LeadChange { racer_id, .. } => Some(racer_id),
            _ => None,
        }
    }
}

impl fmt::Display for RaceEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RaceEvent::RaceStarting { message }
            | RaceEvent::FetchOk { message, .. }
            | RaceEvent::RaceError { message } => write!(f, "{}: {}", self.kind(), message),
            RaceEvent::RaceStart {
                course,
                condition,
                laps,
                tick_ms,
                racers,
            } => write!(
                f,
                "race_start: {} racers, {} laps at {} ({}), tick {}ms",
                racers, laps, course, condition, tick_ms
            ),
            RaceEvent::PitPlanned {
                tick,
                racer_id,
                tyre_wear,
            } => write!(f, "[{:5}] #{} pit planned, tyre wear {:.0}", tick, racer_id, tyre_wear),
            RaceEvent::PitIn {
                tick,
                racer_id,
                pit_ticks,
                reason,
            } => write!(
                f,
                "[{:5}] #{} in the pit for {} ticks ({:?})",
                tick, racer_id, pit_ticks, reason
            ),
            RaceEvent::PitOut {
                tick,
                racer_id,
                tyre_wear,
                reason,
            } => write!(
                f,
                "[{:5}] #{} leaves the pit ({:?}), tyre wear {:.2}",
                tick, racer_id, reason, tyre_wear
            ),
            RaceEvent::Recovered { tick, racer_id } => {
                write!(f, "[{:5}] #{} recovered", tick, racer_id)
            }
            RaceEvent::CrashRetire { tick, racer_id, .. } => {
                write!(f, "[{:5}] #{} crashed and retired", tick, racer_id)
            }
            RaceEvent::CrashPit {
                tick,
                racer_id,
                pit_ticks,
                ..
            } => write!(
                f,
                "[{:5}] #{} crashed, heading to the pit for {} ticks of repairs",
                tick, racer_id, pit_ticks
            ),
            RaceEvent::CrashMinor { tick, racer_id, .. } => {
                write!(f, "[{:5}] #{} spun and stopped on track", tick, racer_id)
            }
            RaceEvent::SafetyCar { tick, duration } => {
                write!(f, "[{:5}] SAFETY CAR deployed for {} ticks", tick, duration)
            }
            RaceEvent::SafetyCarEnd { tick } => {
                write!(f, "[{:5}] SAFETY CAR in, race resuming", tick)
            }
            RaceEvent::FastestLap {
                tick,
                racer_id,
                lap_ms,
            } => write!(f, "[{:5}] #{} personal best {}ms", tick, racer_id, lap_ms),
            RaceEvent::LapComplete {
                tick,
                racer_id,
                lap,
                lap_ms,
            } => write!(f, "[{:5}] #{} completed lap {} in {}ms", tick, racer_id, lap, lap_ms),
            RaceEvent::LeadChange { tick, racer_id } => {
                write!(f, "[{:5}] #{} takes the lead", tick, racer_id)
            }
            RaceEvent::RaceAbandoned { tick, message } => {
                write!(f, "[{:5}] race abandoned: {}", tick, message)
            }
            RaceEvent::RaceEnd { tick } => write!(f, "[{:5}] chequered flag", tick),
        }
    }
}

/// Observable state of one racer, published every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RacerSnapshot {
    pub id: u32,
    pub name: String,
    pub distance: f64,
    pub speed: f64,
    pub rank: u32,
    pub laps_completed: u32,
    pub tyre_wear: f64,
    pub lifecycle_state: State,
    pub pit_ticks_remaining: u32,
    pub pit_reason: Option<PitReason>,
    pub retired: bool,
    pub finished: bool,
    pub price: f64,
    pub provisional_score: u32,
    pub best_lap_elapsed: Option<u64>,
}

/// Full race state after one tick, racers in rank order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceSnapshot {
    pub tick: u64,
    pub safety_car_active: bool,
    pub competitors: Vec<RacerSnapshot>,
}

impl RaceSnapshot {
    pub fn get_racer(&self, id: u32) -> Option<&RacerSnapshot> {
        self.competitors.iter().find(|r| r.id == id)
    }
}

/// Everything the simulator publishes. The channel names follow the pub/sub topics of the
/// broadcast layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "payload")]
pub enum RaceMessage {
    #[serde(rename = "race_event")]
    Event(RaceEvent),
    #[serde(rename = "race_update")]
    Snapshot(RaceSnapshot),
    #[serde(rename = "race_finished")]
    FinalResults(RaceResult),
}

/// RaceSink accepts the outbound message stream of a race. Publishing never fails from the
/// simulator's point of view: a sink that cannot deliver has to handle that itself.
pub trait RaceSink {
    fn publish(&mut self, msg: RaceMessage);

    fn publish_event(&mut self, event: RaceEvent) {
        self.publish(RaceMessage::Event(event))
    }
}

impl<S: RaceSink + ?Sized> RaceSink for &mut S {
    fn publish(&mut self, msg: RaceMessage) {
        (**self).publish(msg)
    }
}

/// Collects all messages, e.g. for tests or post-processing.
impl RaceSink for Vec<RaceMessage> {
    fn publish(&mut self, msg: RaceMessage) {
        self.push(msg)
    }
}

/// Forwards the messages over a channel to the broadcast layer (or the CLI).
impl RaceSink for Sender<RaceMessage> {
    fn publish(&mut self, msg: RaceMessage) {
        if self.send(msg).is_err() {
            log::warn!("Race message receiver disconnected, dropping message");
        }
    }
}
