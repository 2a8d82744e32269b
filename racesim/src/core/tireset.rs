use helpers::general::clamp;
use serde::{Deserialize, Serialize};

/// Upper bound of the tyre wear scale. A fresh set is at 0.0.
pub const MAX_TYRE_WEAR: f64 = 200.0;

/// Wear model constants. Per on-track tick the wear grows by
///
/// `base + aggression / aggression_div - tyre_management / management_div + noise`
///
/// with noise drawn from [0, noise_max).
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct TireConfig {
    pub base: f64,
    pub aggression_div: f64,
    pub management_div: f64,
    pub noise_max: f64,
}

impl Default for TireConfig {
    fn default() -> Self {
        TireConfig {
            base: 0.25,
            aggression_div: 300.0,
            management_div: 600.0,
            noise_max: 0.15,
        }
    }
}

impl TireConfig {
    /// wear_per_tick returns the deterministic part of the wear increase for one on-track tick.
    pub fn wear_per_tick(&self, aggression: f64, tyre_management: f64) -> f64 {
        self.base + aggression / self.aggression_div - tyre_management / self.management_div
    }
}

#[derive(Debug, Clone, Default)]
pub struct Tireset {
    wear: f64,
}

impl Tireset {
    pub fn new() -> Tireset {
        Tireset::default()
    }

    pub fn wear(&self) -> f64 {
        self.wear
    }

    /// drive_tick increases the wear for one tick spent driving on track. `noise` is the already
    /// sampled random part of the increase.
    pub fn drive_tick(
        &mut self,
        aggression: f64,
        tyre_management: f64,
        noise: f64,
        tire_cfg: &TireConfig,
    ) {
        let wear_inc = tire_cfg.wear_per_tick(aggression, tyre_management) + noise;
        self.wear = clamp(self.wear + wear_inc, 0.0, MAX_TYRE_WEAR);
    }

    /// add_penalty adds extra wear caused by a crash.
    pub fn add_penalty(&mut self, amount: f64) {
        self.wear = clamp(self.wear + amount, 0.0, MAX_TYRE_WEAR);
    }

    /// reset mounts a fresh set of tyres.
    pub fn reset(&mut self) {
        self.wear = 0.0;
    }
}
