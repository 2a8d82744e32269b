use crate::core::track::Condition;
use serde::{Deserialize, Serialize};

/// * `id` - Unique racer id
/// * `name` - Display name, e.g. Max Verstappen
/// * `handling` - [0, 100] Higher values reduce the crash probability
/// * `aggression` - [0, 100] Higher values increase speed, tyre wear and crash probability
/// * `tyre_management` - [0, 100] Higher values reduce the tyre wear
/// * `base_speed` - Base speed factor (unclamped, positive)
/// * `price` - Market price, rounded to 2 decimals
/// * `favourite_courses` - All known course identifiers in order of preference
/// * `favourable_conditions` - All weather conditions in order of preference
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RacerTemplate {
    pub id: u32,
    pub name: String,
    pub handling: f64,
    pub aggression: f64,
    pub tyre_management: f64,
    pub base_speed: f64,
    pub price: f64,
    pub favourite_courses: Vec<String>,
    pub favourable_conditions: Vec<Condition>,
}

impl RacerTemplate {
    /// course_preference returns the priority index of the course (0 = favourite), None if the
    /// course is not in the preference list.
    pub fn course_preference(&self, course: &str) -> Option<usize> {
        self.favourite_courses.iter().position(|c| c == course)
    }

    /// condition_preference returns the priority index of the weather condition.
    pub fn condition_preference(&self, condition: Condition) -> Option<usize> {
        self.favourable_conditions
            .iter()
            .position(|&c| c == condition)
    }
}
