use crate::core::car::{FieldEntry, Racer, TickContext};
use crate::core::driver::RacerTemplate;
use crate::core::tireset::TireConfig;
use crate::core::track::{builtin_courses, Condition, Track, TrackPars};
use crate::interfaces::messages::{RaceEvent, RaceMessage, RaceSink, RaceSnapshot};
use crate::post::race_result::RaceResult;
use helpers::general::{argmin, round_to};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// * `course` - Course identifier, falls back to the configured fallback course if unknown
/// * `condition` - Weather condition
/// * `tot_no_laps` - Total number of laps
/// * `lap_length` - Length of one lap in distance units
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RacePars {
    pub course: Option<String>,
    pub condition: Condition,
    pub tot_no_laps: u32,
    pub lap_length: f64,
}

impl Default for RacePars {
    fn default() -> Self {
        RacePars {
            course: None,
            condition: Condition::Dry,
            tot_no_laps: 10,
            lap_length: 1000.0,
        }
    }
}

/// Closed range [min, max] of a randomized model value.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct RangePars {
    pub min: f64,
    pub max: f64,
}

impl RangePars {
    pub const fn new(min: f64, max: f64) -> RangePars {
        RangePars { min, max }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        rand_range(rng, self.min, self.max)
    }

    /// sample_ticks returns a rounded tick count, never below `min`.
    pub fn sample_ticks<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        let lower = self.min.max(0.0);
        self.sample(rng).round().max(lower) as u32
    }
}

/// rand_range returns a uniformly distributed value in [min, max).
pub(crate) fn rand_range<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64) -> f64 {
    min + rng.gen::<f64>() * (max - min)
}

/// Global crash multipliers per weather condition.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ConditionMod {
    pub dry: f64,
    pub slightly_wet: f64,
    pub wet: f64,
}

impl Default for ConditionMod {
    fn default() -> Self {
        ConditionMod {
            dry: 1.0,
            slightly_wet: 1.25,
            wet: 1.6,
        }
    }
}

impl ConditionMod {
    pub fn get(&self, condition: Condition) -> f64 {
        match condition {
            Condition::Dry => self.dry,
            Condition::SlightlyWet => self.slightly_wet,
            Condition::Wet => self.wet,
        }
    }
}

/// Multiplicative price adjustments. Prices are always rounded to 2 decimals afterwards.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PriceFactors {
    pub crash_retire: f64,
    pub crash_minor: f64,
    pub personal_best: f64,
    pub lead_change: f64,
    pub fastest_lap: f64,
}

impl Default for PriceFactors {
    fn default() -> Self {
        PriceFactors {
            crash_retire: 0.5,
            crash_minor: 0.9,
            personal_best: 1.01,
            lead_change: 1.02,
            fastest_lap: 1.05,
        }
    }
}

/// SimConstants contains all model constants of the simulator. Every field has a default, so a
/// configuration file only has to contain the values that should be changed.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SimConstants {
    /// (ms) Fixed tick period, also the lap time credited per full tick
    pub tick_ms: u64,

    // pit stops
    pub pit_threshold: f64,
    pub pit_entry_ticks: u32,
    pub pit_stop_ticks: u32,
    pub pit_entry_slowdown: f64,
    pub pit_entry_distance_scale: f64,
    pub pit_entry_lap_time_frac: f64,
    pub repair_stall_ticks: RangePars,

    // crash model
    pub base_crash: f64,
    pub handling_weight: f64,
    pub aggression_weight: f64,
    pub tyre_weight: f64,
    pub corner_weight: f64,
    pub neighbor_weight: f64,
    pub neighbor_distance: f64,
    pub neighbor_cap: usize,
    pub neighbor_div: f64,
    /// Discounts for the favourite and the second favourite course
    pub fav_course_discounts: Vec<f64>,
    pub fav_condition_discount: f64,
    pub condition_mod: ConditionMod,
    pub crash_noise: f64,
    pub max_crash_prob: f64,
    pub severity_retire: f64,
    pub severity_pit: f64,
    pub retire_tyre_penalty: f64,
    pub minor_tyre_penalty: f64,
    pub repair_tyre_penalty: RangePars,
    pub recovery_prob: f64,

    // safety car
    pub sc_trigger: usize,
    pub sc_duration: RangePars,
    pub sc_speed_factor: f64,
    pub bunching_gap: RangePars,

    // movement
    pub speed_base_factor: f64,
    pub aggression_speed_div: f64,
    pub wear_speed_penalty: f64,
    pub speed_noise: f64,
    pub min_speed: f64,
    pub distance_scale: f64,
    pub tire_config: TireConfig,

    // scoring and prices
    pub points: Vec<u32>,
    pub fastest_lap_bonus: u32,
    pub fastest_lap_top_n: u32,
    pub price_factors: PriceFactors,

    // courses
    pub fallback_course: String,
    pub courses: Vec<TrackPars>,
}

impl Default for SimConstants {
    fn default() -> Self {
        SimConstants {
            tick_ms: 500,
            pit_threshold: 85.0,
            pit_entry_ticks: 4,
            pit_stop_ticks: 6,
            pit_entry_slowdown: 0.35,
            pit_entry_distance_scale: 0.05,
            pit_entry_lap_time_frac: 0.4,
            repair_stall_ticks: RangePars::new(4.0, 8.0),
            base_crash: 0.0002,
            handling_weight: 0.012,
            aggression_weight: 0.012,
            tyre_weight: 0.015,
            corner_weight: 0.03,
            neighbor_weight: 0.005,
            neighbor_distance: 20.0,
            neighbor_cap: 5,
            neighbor_div: 10.0,
            fav_course_discounts: vec![0.78, 0.88],
            fav_condition_discount: 0.85,
            condition_mod: ConditionMod::default(),
            crash_noise: 0.05,
            max_crash_prob: 0.5,
            severity_retire: 0.12,
            severity_pit: 0.5,
            retire_tyre_penalty: 30.0,
            minor_tyre_penalty: 12.0,
            repair_tyre_penalty: RangePars::new(6.0, 20.0),
            recovery_prob: 0.35,
            sc_trigger: 2,
            sc_duration: RangePars::new(8.0, 14.0),
            sc_speed_factor: 0.45,
            bunching_gap: RangePars::new(2.0, 6.0),
            speed_base_factor: 0.6,
            aggression_speed_div: 250.0,
            wear_speed_penalty: 0.12,
            speed_noise: 2.5,
            min_speed: 5.0,
            distance_scale: 0.12,
            tire_config: TireConfig::default(),
            points: vec![25, 18, 15, 12, 10, 8, 6, 4, 2, 1],
            fastest_lap_bonus: 1,
            fastest_lap_top_n: 10,
            price_factors: PriceFactors::default(),
            fallback_course: "monaco".to_owned(),
            courses: builtin_courses(),
        }
    }
}

impl SimConstants {
    /// course_ids returns the identifiers of all configured courses.
    pub fn course_ids(&self) -> Vec<String> {
        self.courses.iter().map(|c| c.name.to_owned()).collect()
    }

    /// resolve_course returns the requested course, the fallback course if it is unknown or not
    /// given, and the first configured course if even the fallback is missing.
    pub fn resolve_course(&self, course: Option<&str>) -> TrackPars {
        if let Some(name) = course {
            if let Some(track_pars) = self.courses.iter().find(|c| c.name == name) {
                return track_pars.to_owned();
            }
            log::warn!(
                "Unknown course {}, falling back to {}",
                name,
                self.fallback_course
            );
        }

        self.courses
            .iter()
            .find(|c| c.name == self.fallback_course)
            .or_else(|| self.courses.first())
            .cloned()
            .unwrap_or_else(|| {
                log::warn!("No courses configured, using the built-in catalog");
                builtin_courses().remove(0)
            })
    }

    /// points_for_rank maps a 1-based rank to the points table, 0 beyond its end.
    pub fn points_for_rank(&self, rank: u32) -> u32 {
        if rank == 0 {
            return 0;
        }
        self.points.get(rank as usize - 1).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SafetyCar {
    pub active: bool,
    pub ticks_left: u32,
}

/// Result of one tick from the race's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Running,
    Finished,
    Abandoned,
}

#[derive(Debug)]
pub struct Race<R: Rng> {
    pub cur_tick: u64,
    pub safety_car: SafetyCar,
    pub track: Track,
    pub condition: Condition,
    pub tot_no_laps: u32,
    sim_consts: SimConstants,
    last_leader: Option<u32>,
    // roster order, never reordered
    racers: Vec<Racer>,
    // racer indices in rank order
    rank_order: Vec<usize>,
    concluded: Option<TickOutcome>,
    rng: R,
}

impl<R: Rng> Race<R> {
    pub fn new(
        templates: Vec<RacerTemplate>,
        race_pars: &RacePars,
        sim_consts: &SimConstants,
        rng: R,
    ) -> Race<R> {
        let track_pars = sim_consts.resolve_course(race_pars.course.as_deref());

        let lap_length = if race_pars.lap_length.is_finite() && race_pars.lap_length > 0.0 {
            race_pars.lap_length
        } else {
            log::warn!(
                "Invalid lap length {}, using {}",
                race_pars.lap_length,
                RacePars::default().lap_length
            );
            RacePars::default().lap_length
        };

        let tot_no_laps = if race_pars.tot_no_laps == 0 {
            log::warn!("A race needs at least one lap, using 1");
            1
        } else {
            race_pars.tot_no_laps
        };

        let racers: Vec<Racer> = templates.into_iter().map(Racer::new).collect();

        let mut race = Race {
            cur_tick: 0,
            safety_car: SafetyCar::default(),
            track: Track::new(&track_pars, lap_length),
            condition: race_pars.condition,
            tot_no_laps,
            sim_consts: sim_consts.to_owned(),
            last_leader: None,
            rank_order: (0..racers.len()).collect(),
            racers,
            concluded: None,
            rng,
        };

        // starting grid, all distances are still 0
        race.update_ranking();

        race
    }

    // ---------------------------------------------------------------------------------------------
    // MAIN METHOD ---------------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    /// simulate_tick advances the race by one tick and publishes the resulting events, the
    /// snapshot and, on termination, the final results. Calling it after the race concluded
    /// publishes nothing and returns the terminal outcome again.
    pub fn simulate_tick<S: RaceSink + ?Sized>(&mut self, sink: &mut S) -> TickOutcome {
        if let Some(outcome) = self.concluded {
            return outcome;
        }

        // increment discretization variable
        self.cur_tick += 1;
        let mut events: Vec<RaceEvent> = Vec::new();

        // safety car countdown
        if self.safety_car.active {
            self.safety_car.ticks_left = self.safety_car.ticks_left.saturating_sub(1);

            if self.safety_car.ticks_left == 0 {
                log::info!(
                    "Safety car withdrawn, race resuming (tick {})",
                    self.cur_tick
                );
                self.safety_car.active = false;
                events.push(RaceEvent::SafetyCarEnd {
                    tick: self.cur_tick,
                });
            }
        }

        // positions as of the end of the previous tick, used for all cross-racer reads
        let field: Vec<FieldEntry> = self.racers.iter().map(FieldEntry::from).collect();

        // per-racer state machines in roster order, nothing is reordered in this pass
        let mut do_bunching = false;

        for idx in 0..self.racers.len() {
            if self.racers[idx].sh.is_terminal() {
                continue;
            }

            let ctx = TickContext {
                tick: self.cur_tick,
                safety_car: self.safety_car.active,
                track: &self.track,
                condition: self.condition,
                tot_no_laps: self.tot_no_laps,
                sim_consts: &self.sim_consts,
                field: &field,
            };

            let crashed = self.racers[idx].step(&ctx, &mut self.rng, &mut events);

            if crashed && self.check_safety_car_trigger(&mut events) {
                do_bunching = true;
            }
        }

        // deferred bunching
        if do_bunching {
            self.apply_bunching();
        }

        self.update_ranking();
        self.update_provisional_scores();
        self.check_leader_change(&mut events);

        for event in events {
            sink.publish_event(event);
        }
        sink.publish(RaceMessage::Snapshot(self.get_snapshot()));

        self.check_termination(sink)
    }

    // ---------------------------------------------------------------------------------------------
    // RACE SIMULATOR PARTS ------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    /// check_safety_car_trigger deploys the safety car if enough racers are stalled on track.
    /// Returns true if it was deployed in this call.
    fn check_safety_car_trigger(&mut self, events: &mut Vec<RaceEvent>) -> bool {
        if self.safety_car.active {
            return false;
        }

        let no_stalled = self.racers.iter().filter(|r| r.sh.is_stalled()).count();

        if no_stalled < self.sim_consts.sc_trigger {
            return false;
        }

        let duration = self.sim_consts.sc_duration.sample_ticks(&mut self.rng).max(1);
        self.safety_car = SafetyCar {
            active: true,
            ticks_left: duration,
        };

        log::info!(
            "Safety car deployed for {} ticks ({} racers stalled, tick {})",
            duration,
            no_stalled,
            self.cur_tick
        );
        events.push(RaceEvent::SafetyCar {
            tick: self.cur_tick,
            duration,
        });

        true
    }

    /// apply_bunching enforces a small gap behind the racer ahead for all racers that are still
    /// racing, in ranking order. Distances are only ever reduced, never below 0.
    fn apply_bunching(&mut self) {
        let racers = &self.racers;
        let mut order: Vec<usize> = (0..racers.len())
            .filter(|&idx| !racers[idx].sh.is_terminal())
            .collect();
        order.sort_by(|&a, &b| compare_for_rank(&racers[a], &racers[b]));

        for pair in order.windows(2) {
            let distance_ahead = self.racers[pair[0]].distance;
            let gap = self.sim_consts.bunching_gap.sample(&mut self.rng);
            let max_distance = (distance_ahead - gap).max(0.0);

            let racer = &mut self.racers[pair[1]];
            if racer.distance > max_distance {
                racer.distance = max_distance;
            }
        }
    }

    /// update_ranking assigns ranks. Running and finished racers rank ahead of retired ones; within
    /// each group by distance descending, equal distances by earlier finish and then lower id.
    fn update_ranking(&mut self) {
        let racers = &self.racers;
        let mut order: Vec<usize> = (0..racers.len()).collect();

        order.sort_by(|&a, &b| compare_for_rank(&racers[a], &racers[b]));

        for (pos, &idx) in order.iter().enumerate() {
            self.racers[idx].rank = pos as u32 + 1;
        }
        self.rank_order = order;
    }

    fn update_provisional_scores(&mut self) {
        for racer in self.racers.iter_mut() {
            racer.provisional_score = self.sim_consts.points_for_rank(racer.rank);
        }
    }

    /// check_leader_change compares the rank 1 racer against the last known leader.
    fn check_leader_change(&mut self, events: &mut Vec<RaceEvent>) {
        let leader_idx = match self.rank_order.first() {
            Some(&idx) => idx,
            None => return,
        };

        let leader = &mut self.racers[leader_idx];
        if leader.sh.is_retired() || self.last_leader == Some(leader.template.id) {
            return;
        }

        self.last_leader = Some(leader.template.id);
        leader.adjust_price(self.sim_consts.price_factors.lead_change);
        events.push(RaceEvent::LeadChange {
            tick: self.cur_tick,
            racer_id: leader.template.id,
        });
    }

    /// check_termination concludes the race if every racer retired (abandoned) or every racer that
    /// did not retire has finished.
    fn check_termination<S: RaceSink + ?Sized>(&mut self, sink: &mut S) -> TickOutcome {
        let no_alive = self.racers.iter().filter(|r| !r.sh.is_retired()).count();

        if no_alive == 0 {
            log::info!("All racers retired, race abandoned (tick {})", self.cur_tick);
            for racer in self.racers.iter_mut() {
                racer.final_score = Some(0);
            }

            sink.publish_event(RaceEvent::RaceAbandoned {
                tick: self.cur_tick,
                message: "All racers retired - race abandoned".to_owned(),
            });
            sink.publish(RaceMessage::FinalResults(self.build_race_result(true)));

            self.concluded = Some(TickOutcome::Abandoned);
            return TickOutcome::Abandoned;
        }

        let all_finished = self
            .racers
            .iter()
            .filter(|r| !r.sh.is_retired())
            .all(|r| r.sh.is_finished());

        if !all_finished {
            return TickOutcome::Running;
        }

        self.award_final_scores();

        sink.publish(RaceMessage::FinalResults(self.build_race_result(false)));
        sink.publish_event(RaceEvent::RaceEnd {
            tick: self.cur_tick,
        });

        self.concluded = Some(TickOutcome::Finished);
        TickOutcome::Finished
    }

    /// award_final_scores maps the final ranks to points and awards the fastest lap bonus.
    fn award_final_scores(&mut self) {
        self.update_ranking();

        for racer in self.racers.iter_mut() {
            racer.final_score = Some(self.sim_consts.points_for_rank(racer.rank));
        }

        // fastest lap among non-retired racers, ties go to the better ranked racer
        let candidates: Vec<usize> = self
            .rank_order
            .iter()
            .copied()
            .filter(|&idx| {
                let racer = &self.racers[idx];
                !racer.sh.is_retired() && racer.best_lap_ms.is_some()
            })
            .collect();
        let best_laps: Vec<u64> = candidates
            .iter()
            .filter_map(|&idx| self.racers[idx].best_lap_ms)
            .collect();

        if let Some(pos) = argmin(&best_laps) {
            let racer = &mut self.racers[candidates[pos]];

            if racer.rank <= self.sim_consts.fastest_lap_top_n {
                racer.final_score = Some(
                    racer.final_score.unwrap_or(0) + self.sim_consts.fastest_lap_bonus,
                );
            }
            racer.adjust_price(self.sim_consts.price_factors.fastest_lap);

            log::info!(
                "Fastest lap: #{} {} with {}ms",
                racer.template.id,
                racer.template.name,
                best_laps[pos]
            );
        }
    }

    // ---------------------------------------------------------------------------------------------
    // METHODS (HELPERS) ---------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    pub fn get_sim_consts(&self) -> &SimConstants {
        &self.sim_consts
    }

    /// get_racers returns all racers in roster order.
    pub fn get_racers(&self) -> &[Racer] {
        &self.racers
    }

    pub fn get_racer(&self, id: u32) -> Option<&Racer> {
        self.racers.iter().find(|r| r.template.id == id)
    }

    /// get_racer_mut gives direct access to a racer, e.g. to force a state between ticks.
    pub fn get_racer_mut(&mut self, id: u32) -> Option<&mut Racer> {
        self.racers.iter_mut().find(|r| r.template.id == id)
    }

    pub fn get_last_leader(&self) -> Option<u32> {
        self.last_leader
    }

    pub fn is_concluded(&self) -> bool {
        self.concluded.is_some()
    }

    pub fn get_race_start_event(&self) -> RaceEvent {
        RaceEvent::RaceStart {
            course: self.track.name.to_owned(),
            condition: self.condition,
            laps: self.tot_no_laps,
            tick_ms: self.sim_consts.tick_ms,
            racers: self.racers.len(),
        }
    }

    /// get_snapshot returns the observable race state, racers in rank order.
    pub fn get_snapshot(&self) -> RaceSnapshot {
        RaceSnapshot {
            tick: self.cur_tick,
            safety_car_active: self.safety_car.active,
            competitors: self
                .rank_order
                .iter()
                .map(|&idx| self.racers[idx].get_snapshot())
                .collect(),
        }
    }

    /// get_race_result returns the final results. Before termination the scores are the
    /// provisional ones.
    pub fn get_race_result(&self) -> RaceResult {
        self.build_race_result(self.concluded == Some(TickOutcome::Abandoned))
    }

    fn build_race_result(&self, abandoned: bool) -> RaceResult {
        RaceResult {
            tick: self.cur_tick,
            abandoned,
            competitors: self
                .rank_order
                .iter()
                .map(|&idx| {
                    let racer = &self.racers[idx];
                    let mut standing = racer.get_final_standing();
                    if abandoned {
                        standing.final_score = 0;
                    }
                    standing
                })
                .collect(),
        }
    }
}

fn compare_for_rank(a: &Racer, b: &Racer) -> Ordering {
    a.sh
        .is_retired()
        .cmp(&b.sh.is_retired())
        .then_with(|| {
            b.distance
                .partial_cmp(&a.distance)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| match (a.finish_tick, b.finish_tick) {
            (Some(ta), Some(tb)) => ta.cmp(&tb),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.template.id.cmp(&b.template.id))
}

/// round_price rounds a price to 2 decimals.
pub(crate) fn round_price(price: f64) -> f64 {
    round_to(price, 2)
}
