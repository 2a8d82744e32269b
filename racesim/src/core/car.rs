use crate::core::driver::RacerTemplate;
use crate::core::race::{rand_range, round_price, SimConstants};
use crate::core::state_handler::{PitReason, State, StateHandler};
use crate::core::tireset::{Tireset, MAX_TYRE_WEAR};
use crate::core::track::{Condition, Track};
use crate::interfaces::messages::{RaceEvent, RacerSnapshot};
use crate::post::race_result::FinalStanding;
use helpers::general::{clamp, round_to};
use rand::Rng;

/// Position of a racer as of the start of a tick. All reads across racers (neighbor density) go
/// through these entries so that the order of the per-racer pass does not matter.
#[derive(Debug, Clone, Copy)]
pub struct FieldEntry {
    pub id: u32,
    pub distance: f64,
    pub retired: bool,
}

impl From<&Racer> for FieldEntry {
    fn from(racer: &Racer) -> Self {
        FieldEntry {
            id: racer.template.id,
            distance: racer.distance,
            retired: racer.sh.is_retired(),
        }
    }
}

/// Everything a racer needs to know about the race to perform one step.
#[derive(Debug)]
pub struct TickContext<'a> {
    pub tick: u64,
    pub safety_car: bool,
    pub track: &'a Track,
    pub condition: Condition,
    pub tot_no_laps: u32,
    pub sim_consts: &'a SimConstants,
    pub field: &'a [FieldEntry],
}

#[derive(Debug, Clone)]
pub struct Racer {
    pub template: RacerTemplate,
    pub distance: f64,
    pub speed: f64,
    pub rank: u32,
    pub compl_laps: u32,
    /// (ms) Elapsed time in the current lap
    pub cur_lap_ms: u64,
    pub best_lap_ms: Option<u64>,
    pub price: f64,
    pub provisional_score: u32,
    pub final_score: Option<u32>,
    pub finish_tick: Option<u64>,
    pub sh: StateHandler,
    tireset: Tireset,
}

impl Racer {
    pub fn new(template: RacerTemplate) -> Racer {
        Racer {
            price: template.price,
            template,
            distance: 0.0,
            speed: 0.0,
            rank: 0,
            compl_laps: 0,
            cur_lap_ms: 0,
            best_lap_ms: None,
            provisional_score: 0,
            final_score: None,
            finish_tick: None,
            sh: StateHandler::default(),
            tireset: Tireset::new(),
        }
    }

    pub fn tyre_wear(&self) -> f64 {
        self.tireset.wear()
    }

    /// adjust_price multiplies the price by the given factor, rounded to 2 decimals.
    pub fn adjust_price(&mut self, factor: f64) {
        self.price = round_price(self.price * factor);
    }

    // ---------------------------------------------------------------------------------------------
    // STEP ----------------------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    /// step advances the racer by one tick. Returns true if the racer crashed in this tick, the
    /// caller then has to check the safety car trigger.
    pub fn step<R: Rng + ?Sized>(
        &mut self,
        ctx: &TickContext,
        rng: &mut R,
        events: &mut Vec<RaceEvent>,
    ) -> bool {
        match self.sh.get_state() {
            State::Retired | State::Finished => false,
            State::PitEntry => {
                self.step_pit_entry(ctx, events);
                false
            }
            State::InPit => {
                self.step_in_pit(ctx, events);
                false
            }
            State::CrashedOnTrack => {
                self.step_crashed(ctx, rng, events);
                false
            }
            State::OnTrack => {
                // crash check comes first, a crash replaces the movement of this tick
                if !ctx.safety_car {
                    let crash_prob = self.calc_crash_prob(ctx, rng);

                    if rng.gen::<f64>() < crash_prob {
                        self.handle_crash(ctx, crash_prob, rng, events);
                        return true;
                    }
                }

                self.drive(ctx, rng, events);
                false
            }
        }
    }

    fn step_pit_entry(&mut self, ctx: &TickContext, events: &mut Vec<RaceEvent>) {
        let consts = ctx.sim_consts;

        self.speed = (self.template.base_speed * consts.pit_entry_slowdown)
            .round()
            .max(consts.min_speed);
        // laps are only credited on track, so the pit lane must not run past the finish line
        self.distance = (self.distance + self.speed * consts.pit_entry_distance_scale)
            .min(ctx.tot_no_laps as f64 * ctx.track.lap_length);
        self.cur_lap_ms += (consts.tick_ms as f64 * consts.pit_entry_lap_time_frac).round() as u64;

        if self.sh.tick_pit_entry() {
            self.speed = 0.0;
            events.push(RaceEvent::PitIn {
                tick: ctx.tick,
                racer_id: self.template.id,
                pit_ticks: self.sh.get_stall_ticks_remaining(),
                reason: self.sh.get_pit_reason().unwrap_or(PitReason::Wear),
            });
        }
    }

    fn step_in_pit(&mut self, ctx: &TickContext, events: &mut Vec<RaceEvent>) {
        self.speed = 0.0;
        self.cur_lap_ms += ctx.sim_consts.tick_ms;

        if let Some(reason) = self.sh.tick_pit_stall() {
            // repair stops keep the damaged tyres
            if reason == PitReason::Wear {
                self.tireset.reset();
            }

            events.push(RaceEvent::PitOut {
                tick: ctx.tick,
                racer_id: self.template.id,
                tyre_wear: round_to(self.tireset.wear(), 2),
                reason,
            });
        }
    }

    fn step_crashed<R: Rng + ?Sized>(
        &mut self,
        ctx: &TickContext,
        rng: &mut R,
        events: &mut Vec<RaceEvent>,
    ) {
        self.speed = 0.0;
        self.cur_lap_ms += ctx.sim_consts.tick_ms;

        if rng.gen::<f64>() < ctx.sim_consts.recovery_prob {
            self.sh.recover();
            events.push(RaceEvent::Recovered {
                tick: ctx.tick,
                racer_id: self.template.id,
            });
        }
    }

    // ---------------------------------------------------------------------------------------------
    // CRASHES -------------------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    /// calc_crash_prob returns the crash probability for the current tick, clamped to
    /// [0, max_crash_prob].
    pub fn calc_crash_prob<R: Rng + ?Sized>(&self, ctx: &TickContext, rng: &mut R) -> f64 {
        let consts = ctx.sim_consts;
        let t = &self.template;

        let no_neighbors = ctx
            .field
            .iter()
            .filter(|e| {
                e.id != t.id
                    && !e.retired
                    && (e.distance - self.distance).abs() < consts.neighbor_distance
            })
            .count();

        let mut crash_prob = consts.base_crash
            + (100.0 - t.handling) / 100.0 * consts.handling_weight
            + ((t.aggression - 50.0) / 100.0).max(0.0) * consts.aggression_weight
            + clamp(self.tireset.wear() / MAX_TYRE_WEAR, 0.0, 1.0) * consts.tyre_weight
            + ctx.track.corner_risk(self.distance) * consts.corner_weight
            + no_neighbors.min(consts.neighbor_cap) as f64 / consts.neighbor_div
                * consts.neighbor_weight;

        if let Some(idx) = t.course_preference(&ctx.track.name) {
            if let Some(discount) = consts.fav_course_discounts.get(idx) {
                crash_prob *= discount;
            }
        }
        if t.condition_preference(ctx.condition) == Some(0) {
            crash_prob *= consts.fav_condition_discount;
        }

        crash_prob *= consts.condition_mod.get(ctx.condition);
        crash_prob *= 1.0 + rand_range(rng, -consts.crash_noise, consts.crash_noise);

        clamp(crash_prob, 0.0, consts.max_crash_prob)
    }

    fn handle_crash<R: Rng + ?Sized>(
        &mut self,
        ctx: &TickContext,
        crash_prob: f64,
        rng: &mut R,
        events: &mut Vec<RaceEvent>,
    ) {
        let consts = ctx.sim_consts;
        let severity = rng.gen::<f64>();
        let id = self.template.id;

        self.speed = 0.0;
        self.cur_lap_ms += consts.tick_ms;

        if severity < consts.severity_retire {
            log::debug!("#{} crashed and retired (severity {:.3})", id, severity);
            self.sh.retire();
            self.tireset.add_penalty(consts.retire_tyre_penalty);
            self.adjust_price(consts.price_factors.crash_retire);
            events.push(RaceEvent::CrashRetire {
                tick: ctx.tick,
                racer_id: id,
                crash_prob,
            });
        } else if severity < consts.severity_pit {
            let stall_ticks = consts.repair_stall_ticks.sample_ticks(rng);
            log::debug!("#{} crashed, repair stop of {} ticks", id, stall_ticks);
            self.tireset
                .add_penalty(consts.repair_tyre_penalty.sample(rng));
            self.sh
                .act_pit_entry(PitReason::Repair, consts.pit_entry_ticks, stall_ticks);
            events.push(RaceEvent::CrashPit {
                tick: ctx.tick,
                racer_id: id,
                pit_ticks: stall_ticks,
                crash_prob,
            });
        } else {
            log::debug!("#{} crashed and stalled on track", id);
            self.sh.act_crashed();
            self.tireset.add_penalty(consts.minor_tyre_penalty);
            self.adjust_price(consts.price_factors.crash_minor);
            events.push(RaceEvent::CrashMinor {
                tick: ctx.tick,
                racer_id: id,
                crash_prob,
            });
        }
    }

    // ---------------------------------------------------------------------------------------------
    // MOVEMENT ------------------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    /// calc_speed returns the on-track speed for the current tick.
    pub fn calc_speed<R: Rng + ?Sized>(&self, ctx: &TickContext, rng: &mut R) -> f64 {
        let consts = ctx.sim_consts;

        let mut speed = self.template.base_speed
            * (consts.speed_base_factor + self.template.aggression / consts.aggression_speed_div)
            - self.tireset.wear() * consts.wear_speed_penalty;

        if ctx.safety_car {
            speed *= consts.sc_speed_factor;
        }

        speed += rand_range(rng, -consts.speed_noise, consts.speed_noise);
        speed.round().max(consts.min_speed)
    }

    fn drive<R: Rng + ?Sized>(
        &mut self,
        ctx: &TickContext,
        rng: &mut R,
        events: &mut Vec<RaceEvent>,
    ) {
        let consts = ctx.sim_consts;
        let lap_length = ctx.track.lap_length;

        self.speed = self.calc_speed(ctx, rng);
        self.distance += self.speed * consts.distance_scale;
        self.cur_lap_ms += consts.tick_ms;

        // at most one lap is credited per tick
        if self.distance >= (self.compl_laps + 1) as f64 * lap_length
            && self.compl_laps < ctx.tot_no_laps
        {
            self.complete_lap(ctx, events);
        }

        let noise = rand_range(rng, 0.0, consts.tire_config.noise_max);
        self.tireset.drive_tick(
            self.template.aggression,
            self.template.tyre_management,
            noise,
            &consts.tire_config,
        );

        if self.sh.get_state() == State::OnTrack && self.tireset.wear() >= consts.pit_threshold {
            self.sh.act_pit_entry(
                PitReason::Wear,
                consts.pit_entry_ticks,
                consts.pit_stop_ticks,
            );
            events.push(RaceEvent::PitPlanned {
                tick: ctx.tick,
                racer_id: self.template.id,
                tyre_wear: round_to(self.tireset.wear(), 2),
            });
        }
    }

    fn complete_lap(&mut self, ctx: &TickContext, events: &mut Vec<RaceEvent>) {
        let lap_ms = self.cur_lap_ms;
        self.compl_laps += 1;

        if self.best_lap_ms.map_or(true, |best| lap_ms < best) {
            self.best_lap_ms = Some(lap_ms);
            self.adjust_price(ctx.sim_consts.price_factors.personal_best);
            events.push(RaceEvent::FastestLap {
                tick: ctx.tick,
                racer_id: self.template.id,
                lap_ms,
            });
        }

        events.push(RaceEvent::LapComplete {
            tick: ctx.tick,
            racer_id: self.template.id,
            lap: self.compl_laps,
            lap_ms,
        });
        self.cur_lap_ms = 0;

        if self.compl_laps >= ctx.tot_no_laps {
            self.sh.finish();
            self.finish_tick = Some(ctx.tick);
            self.distance = ctx.tot_no_laps as f64 * ctx.track.lap_length;
            log::debug!("#{} finished at tick {}", self.template.id, ctx.tick);
        }
    }

    // ---------------------------------------------------------------------------------------------
    // METHODS (HELPERS) ---------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    pub fn get_snapshot(&self) -> RacerSnapshot {
        RacerSnapshot {
            id: self.template.id,
            name: self.template.name.to_owned(),
            distance: round_to(self.distance, 2),
            speed: self.speed,
            rank: self.rank,
            laps_completed: self.compl_laps,
            tyre_wear: round_to(self.tireset.wear(), 2),
            lifecycle_state: self.sh.get_state(),
            pit_ticks_remaining: self.sh.get_pit_ticks_remaining(),
            pit_reason: self.sh.get_pit_reason(),
            retired: self.sh.is_retired(),
            finished: self.sh.is_finished(),
            price: self.price,
            provisional_score: self.provisional_score,
            best_lap_elapsed: self.best_lap_ms,
        }
    }

    pub fn get_final_standing(&self) -> FinalStanding {
        FinalStanding {
            id: self.template.id,
            name: self.template.name.to_owned(),
            rank: self.rank,
            laps_completed: self.compl_laps,
            retired: self.sh.is_retired(),
            final_score: self.final_score.unwrap_or(self.provisional_score),
            best_lap_elapsed: self.best_lap_ms,
            price: self.price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::track::TrackPars;
    use approx::assert_relative_eq;
    use rand::rngs::mock::StepRng;

    fn template() -> RacerTemplate {
        RacerTemplate {
            id: 1,
            name: "Test Racer".to_owned(),
            handling: 100.0,
            aggression: 50.0,
            tyre_management: 50.0,
            base_speed: 50.0,
            price: 10.0,
            favourite_courses: vec!["monza".to_owned(), "monaco".to_owned()],
            favourable_conditions: vec![Condition::Wet, Condition::Dry, Condition::SlightlyWet],
        }
    }

    fn flat_track() -> Track {
        Track::new(
            &TrackPars {
                name: "monaco".to_owned(),
                risk_buckets: vec![0.0],
            },
            1000.0,
        )
    }

    // StepRng with increment 0 always returns the same value, 1 << 63 maps to 0.5 for f64
    fn half_rng() -> StepRng {
        StepRng::new(1 << 63, 0)
    }

    #[test]
    fn crash_prob_applies_second_favourite_discount() {
        let consts = SimConstants::default();
        let track = flat_track();
        let racer = Racer::new(template());
        let field = [FieldEntry::from(&racer)];
        let ctx = TickContext {
            tick: 1,
            safety_car: false,
            track: &track,
            condition: Condition::Dry,
            tot_no_laps: 10,
            sim_consts: &consts,
            field: &field,
        };

        // only the base term remains, noise is 0 for a centered draw
        let crash_prob = racer.calc_crash_prob(&ctx, &mut half_rng());
        assert_relative_eq!(crash_prob, consts.base_crash * 0.88, epsilon = 1e-12);
    }

    #[test]
    fn neighbor_window_is_exclusive() {
        let consts = SimConstants::default();
        let track = flat_track();
        let mut racer = Racer::new(template());
        racer.distance = 100.0;
        let crash_prob_with = |field: &[FieldEntry]| {
            let ctx = TickContext {
                tick: 1,
                safety_car: false,
                track: &track,
                condition: Condition::Dry,
                tot_no_laps: 10,
                sim_consts: &consts,
                field,
            };
            racer.calc_crash_prob(&ctx, &mut half_rng())
        };
        let entry = |id: u32, distance: f64, retired: bool| FieldEntry {
            id,
            distance,
            retired,
        };

        let alone = crash_prob_with(&[entry(1, 100.0, false)]);
        let at_edge = crash_prob_with(&[
            entry(1, 100.0, false),
            entry(2, 100.0 + consts.neighbor_distance, false),
            entry(3, 105.0, true),
        ]);
        let inside = crash_prob_with(&[
            entry(1, 100.0, false),
            entry(2, 99.0 + consts.neighbor_distance, false),
        ]);

        assert_relative_eq!(at_edge, alone, epsilon = 1e-12);
        assert!(inside > alone);
    }

    #[test]
    fn speed_is_slowed_behind_the_safety_car() {
        let consts = SimConstants::default();
        let track = flat_track();
        let racer = Racer::new(template());
        let mut ctx = TickContext {
            tick: 1,
            safety_car: false,
            track: &track,
            condition: Condition::Dry,
            tot_no_laps: 10,
            sim_consts: &consts,
            field: &[],
        };

        // 50 * (0.6 + 50 / 250) = 40
        assert_relative_eq!(racer.calc_speed(&ctx, &mut half_rng()), 40.0);
        ctx.safety_car = true;
        assert_relative_eq!(racer.calc_speed(&ctx, &mut half_rng()), 18.0);
    }

    #[test]
    fn drive_credits_lap_and_resets_lap_time() {
        let consts = SimConstants::default();
        let track = flat_track();
        let mut racer = Racer::new(template());
        racer.distance = 999.0;
        racer.cur_lap_ms = 12_000;
        let ctx = TickContext {
            tick: 25,
            safety_car: false,
            track: &track,
            condition: Condition::Dry,
            tot_no_laps: 10,
            sim_consts: &consts,
            field: &[],
        };

        let mut events = Vec::new();
        let crashed = racer.step(&ctx, &mut half_rng(), &mut events);

        assert!(!crashed);
        assert_eq!(racer.compl_laps, 1);
        assert_eq!(racer.cur_lap_ms, 0);
        assert_eq!(racer.best_lap_ms, Some(12_500));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind(), "fastest_lap");
        assert_eq!(events[1].kind(), "lap_complete");
        assert_relative_eq!(racer.price, 10.1);
    }

    #[test]
    fn crashed_racer_stays_put_without_recovery() {
        let consts = SimConstants {
            recovery_prob: 0.0,
            ..SimConstants::default()
        };
        let track = flat_track();
        let mut racer = Racer::new(template());
        racer.distance = 420.0;
        racer.sh.act_crashed();
        let ctx = TickContext {
            tick: 3,
            safety_car: false,
            track: &track,
            condition: Condition::Dry,
            tot_no_laps: 10,
            sim_consts: &consts,
            field: &[],
        };

        let mut events = Vec::new();
        racer.step(&ctx, &mut half_rng(), &mut events);

        assert!(events.is_empty());
        assert_eq!(racer.sh.get_state(), State::CrashedOnTrack);
        assert_relative_eq!(racer.distance, 420.0);
        assert_eq!(racer.cur_lap_ms, consts.tick_ms);
    }
}
