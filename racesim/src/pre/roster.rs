use crate::core::driver::RacerTemplate;
use crate::core::track::Condition;
use crate::pre::read_sim_pars::read_roster;
use helpers::general::{clamp, round_to};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

/// Fallback values that replace attributes which cannot be coerced into a finite number.
pub const DEFAULT_BASE_SPEED: f64 = 50.0;
pub const DEFAULT_ATTRIBUTE: f64 = 50.0;
pub const DEFAULT_PRICE: f64 = 1.0;

/// RawRacerRecord is one competitor record as delivered by a roster source. The fields are kept
/// as raw JSON values since the upstream store does not guarantee their types (numbers, numeric
/// strings and big-number objects such as `{"hex": "0x32"}` are all seen in practice).
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RawRacerRecord {
    pub id: Value,
    pub name: Value,
    #[serde(alias = "speed")]
    pub base_speed: Value,
    pub aggression: Value,
    pub handling: Value,
    pub tyre_management: Value,
    #[serde(alias = "currentPrice")]
    pub price: Value,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoercionFailed {
    #[error("value is missing")]
    Missing,
    #[error("value {0} is not numeric")]
    NotNumeric(String),
    #[error("value is not finite")]
    NotFinite,
}

/// coerce_numeric converts a raw JSON value into a finite number. Accepted are numbers, numeric
/// strings (decimal or 0x-prefixed hex) and objects carrying one of these in a `hex`, `_hex` or
/// `value` field.
pub fn coerce_numeric(raw: &Value) -> Result<f64, CoercionFailed> {
    let x = match raw {
        Value::Null => return Err(CoercionFailed::Missing),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| CoercionFailed::NotNumeric(n.to_string()))?,
        Value::String(s) => parse_numeric_str(s)?,
        Value::Object(map) => {
            let inner = ["hex", "_hex", "value"]
                .iter()
                .find_map(|key| map.get(*key))
                .ok_or_else(|| CoercionFailed::NotNumeric(raw.to_string()))?;

            // nested objects are not unwrapped any further
            if inner.is_object() {
                return Err(CoercionFailed::NotNumeric(raw.to_string()));
            }
            coerce_numeric(inner)?
        }
        Value::Bool(_) | Value::Array(_) => {
            return Err(CoercionFailed::NotNumeric(raw.to_string()))
        }
    };

    if x.is_finite() {
        Ok(x)
    } else {
        Err(CoercionFailed::NotFinite)
    }
}

fn parse_numeric_str(s: &str) -> Result<f64, CoercionFailed> {
    let s = s.trim();

    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u128::from_str_radix(hex, 16)
            .map(|x| x as f64)
            .map_err(|_| CoercionFailed::NotNumeric(s.to_owned()));
    }

    s.parse::<f64>()
        .map_err(|_| CoercionFailed::NotNumeric(s.to_owned()))
}

/// coerce_name returns the display name of a record, `Racer#<id>` if it has none.
pub fn coerce_name(raw: &Value, id: u32) -> String {
    match raw {
        Value::String(s) if !s.trim().is_empty() => s.to_owned(),
        Value::Number(n) => n.to_string(),
        _ => {
            log::warn!("Racer {} has no usable name, using a placeholder", id);
            format!("Racer#{}", id)
        }
    }
}

fn coerce_id(raw: &Value, pos: usize) -> Option<u32> {
    match coerce_numeric(raw) {
        Ok(x) if x >= 0.0 && x <= u32::MAX as f64 && x.fract() == 0.0 => Some(x as u32),
        res => {
            log::warn!(
                "Record {} has an invalid id ({}), assigning a free one",
                pos,
                res.err().map_or_else(|| raw.to_string(), |e| e.to_string())
            );
            None
        }
    }
}

/// resolve_ids returns the racer id of every record, `None` for records that are skipped.
/// Explicit ids are claimed first (first occurrence wins), records without a usable id then get
/// the lowest ids that are still free.
fn resolve_ids(records: &[RawRacerRecord]) -> Vec<Option<u32>> {
    let mut taken = HashSet::new();
    let mut ids = Vec::with_capacity(records.len());
    let mut missing = Vec::new();

    for (pos, record) in records.iter().enumerate() {
        match coerce_id(&record.id, pos) {
            Some(id) if taken.insert(id) => ids.push(Some(id)),
            Some(id) => {
                log::warn!("Skipping record {} with duplicate racer id {}", pos, id);
                ids.push(None);
            }
            None => {
                missing.push(pos);
                ids.push(None);
            }
        }
    }

    let mut next_free = 1;
    for pos in missing {
        while taken.contains(&next_free) {
            next_free += 1;
        }
        taken.insert(next_free);
        ids[pos] = Some(next_free);
    }

    ids
}

fn coerce_attribute(raw: &Value, field: &str, id: u32) -> f64 {
    match coerce_numeric(raw) {
        Ok(x) => clamp(x, 0.0, 100.0),
        Err(e) => {
            log::warn!(
                "Racer {}: {} {}, using {}",
                id,
                field,
                e,
                DEFAULT_ATTRIBUTE
            );
            DEFAULT_ATTRIBUTE
        }
    }
}

fn coerce_base_speed(raw: &Value, id: u32) -> f64 {
    match coerce_numeric(raw) {
        Ok(x) if x > 0.0 => x,
        Ok(x) => {
            log::warn!(
                "Racer {}: base speed {} is not positive, using {}",
                id,
                x,
                DEFAULT_BASE_SPEED
            );
            DEFAULT_BASE_SPEED
        }
        Err(e) => {
            log::warn!(
                "Racer {}: base speed {}, using {}",
                id,
                e,
                DEFAULT_BASE_SPEED
            );
            DEFAULT_BASE_SPEED
        }
    }
}

fn coerce_price(raw: &Value, id: u32) -> f64 {
    match coerce_numeric(raw) {
        Ok(x) if x >= 0.0 => round_to(x, 2),
        res => {
            log::warn!(
                "Racer {}: unusable price ({}), using {}",
                id,
                res.err().map_or_else(|| raw.to_string(), |e| e.to_string()),
                DEFAULT_PRICE
            );
            DEFAULT_PRICE
        }
    }
}

/// load_templates converts raw records into racer templates. Unusable attributes are replaced by
/// their fallback values, records with an already used id are skipped and records without an id
/// get the lowest free one. The preference lists are random permutations of all course ids and
/// all weather conditions.
pub fn load_templates<R: Rng + ?Sized>(
    records: Vec<RawRacerRecord>,
    course_ids: &[String],
    rng: &mut R,
) -> Vec<RacerTemplate> {
    let ids = resolve_ids(&records);
    let mut templates = Vec::with_capacity(records.len());

    for (record, id) in records.iter().zip(ids) {
        let id = match id {
            Some(id) => id,
            None => continue,
        };

        let mut favourite_courses = course_ids.to_vec();
        favourite_courses.shuffle(rng);
        let mut favourable_conditions = Condition::ALL.to_vec();
        favourable_conditions.shuffle(rng);

        templates.push(RacerTemplate {
            id,
            name: coerce_name(&record.name, id),
            handling: coerce_attribute(&record.handling, "handling", id),
            aggression: coerce_attribute(&record.aggression, "aggression", id),
            tyre_management: coerce_attribute(&record.tyre_management, "tyre management", id),
            base_speed: coerce_base_speed(&record.base_speed, id),
            price: coerce_price(&record.price, id),
            favourite_courses,
            favourable_conditions,
        });
    }

    templates
}

/// RosterSource enumerates the competitor records of the upstream store.
pub trait RosterSource {
    fn fetch_records(&self) -> anyhow::Result<Vec<RawRacerRecord>>;
}

/// Roster stored as a JSON array of records in a file.
#[derive(Debug, Clone)]
pub struct JsonFileRoster {
    pub path: PathBuf,
}

impl JsonFileRoster {
    pub fn new<P: Into<PathBuf>>(path: P) -> JsonFileRoster {
        JsonFileRoster { path: path.into() }
    }
}

impl RosterSource for JsonFileRoster {
    fn fetch_records(&self) -> anyhow::Result<Vec<RawRacerRecord>> {
        read_roster(&self.path)
    }
}

/// In-memory roster.
#[derive(Debug, Clone, Default)]
pub struct StaticRoster(pub Vec<RawRacerRecord>);

impl RosterSource for StaticRoster {
    fn fetch_records(&self) -> anyhow::Result<Vec<RawRacerRecord>> {
        Ok(self.0.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn course_ids() -> Vec<String> {
        vec!["monaco".to_owned(), "monza".to_owned(), "spa".to_owned()]
    }

    #[test]
    fn coerce_accepts_numbers_strings_and_big_numbers() {
        assert_relative_eq!(coerce_numeric(&json!(42)).unwrap(), 42.0);
        assert_relative_eq!(coerce_numeric(&json!(" 61.5 ")).unwrap(), 61.5);
        assert_relative_eq!(coerce_numeric(&json!("0x32")).unwrap(), 50.0);
        assert_relative_eq!(
            coerce_numeric(&json!({"type": "BigNumber", "hex": "0x0a"})).unwrap(),
            10.0
        );
        assert_relative_eq!(coerce_numeric(&json!({"_hex": "0x10"})).unwrap(), 16.0);
        assert_relative_eq!(coerce_numeric(&json!({"value": "7"})).unwrap(), 7.0);
    }

    #[test]
    fn coerce_rejects_everything_else() {
        assert_eq!(coerce_numeric(&Value::Null), Err(CoercionFailed::Missing));
        assert!(matches!(
            coerce_numeric(&json!("fast")),
            Err(CoercionFailed::NotNumeric(_))
        ));
        assert!(matches!(
            coerce_numeric(&json!(true)),
            Err(CoercionFailed::NotNumeric(_))
        ));
        assert!(matches!(
            coerce_numeric(&json!({"value": {"hex": "0x1"}})),
            Err(CoercionFailed::NotNumeric(_))
        ));
        assert_eq!(coerce_numeric(&json!("inf")), Err(CoercionFailed::NotFinite));
    }

    #[test]
    fn fallbacks_replace_unusable_fields() {
        let records = vec![RawRacerRecord {
            id: json!(9),
            name: json!({"first": "Nico"}),
            base_speed: json!(-3),
            aggression: json!(250),
            handling: json!("n/a"),
            tyre_management: Value::Null,
            price: json!("-4"),
        }];

        let mut rng = StdRng::seed_from_u64(1);
        let templates = load_templates(records, &course_ids(), &mut rng);
        let t = &templates[0];

        assert_eq!(t.id, 9);
        assert_eq!(t.name, "Racer#9");
        assert_relative_eq!(t.base_speed, DEFAULT_BASE_SPEED);
        assert_relative_eq!(t.aggression, 100.0);
        assert_relative_eq!(t.handling, DEFAULT_ATTRIBUTE);
        assert_relative_eq!(t.tyre_management, DEFAULT_ATTRIBUTE);
        assert_relative_eq!(t.price, DEFAULT_PRICE);
    }

    #[test]
    fn preferences_are_permutations() {
        let records = vec![RawRacerRecord {
            id: json!(1),
            ..RawRacerRecord::default()
        }];

        let mut rng = StdRng::seed_from_u64(7);
        let t = &load_templates(records, &course_ids(), &mut rng)[0];

        let mut courses = t.favourite_courses.to_owned();
        courses.sort();
        assert_eq!(courses, vec!["monaco", "monza", "spa"]);
        assert_eq!(t.favourable_conditions.len(), 3);
        for condition in Condition::ALL.iter() {
            assert!(t.favourable_conditions.contains(condition));
        }
    }

    #[test]
    fn duplicate_and_missing_ids() {
        let records = vec![
            RawRacerRecord {
                id: json!(2),
                ..RawRacerRecord::default()
            },
            RawRacerRecord {
                id: json!("2"),
                ..RawRacerRecord::default()
            },
            RawRacerRecord::default(),
        ];

        let mut rng = StdRng::seed_from_u64(3);
        let templates = load_templates(records, &course_ids(), &mut rng);

        // the second record is a duplicate, the third gets the lowest free id
        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0].id, 2);
        assert_eq!(templates[1].id, 1);
    }

    #[test]
    fn missing_id_never_displaces_an_explicit_one() {
        let records = vec![
            RawRacerRecord {
                id: Value::Null,
                name: json!("No Id"),
                ..RawRacerRecord::default()
            },
            RawRacerRecord {
                id: json!(1),
                name: json!("Explicit One"),
                ..RawRacerRecord::default()
            },
            RawRacerRecord {
                id: json!("fast"),
                name: json!("Bad Id"),
                ..RawRacerRecord::default()
            },
        ];

        let mut rng = StdRng::seed_from_u64(5);
        let templates = load_templates(records, &course_ids(), &mut rng);
        let ids: Vec<(u32, &str)> = templates
            .iter()
            .map(|t| (t.id, t.name.as_str()))
            .collect();

        // roster order is kept
        assert_eq!(ids, vec![(2, "No Id"), (1, "Explicit One"), (3, "Bad Id")]);
    }

    #[test]
    fn record_aliases_are_accepted() {
        let record: RawRacerRecord = serde_json::from_value(json!({
            "id": 4,
            "name": "Alex Albon",
            "speed": "55",
            "tyreManagement": 70,
            "currentPrice": {"hex": "0x0c"}
        }))
        .unwrap();

        assert_relative_eq!(coerce_numeric(&record.base_speed).unwrap(), 55.0);
        assert_relative_eq!(coerce_numeric(&record.tyre_management).unwrap(), 70.0);
        assert_relative_eq!(coerce_numeric(&record.price).unwrap(), 12.0);
        assert_eq!(record.aggression, Value::Null);
    }

    proptest! {
        #[test]
        fn attributes_are_always_clamped(x in proptest::num::f64::ANY) {
            let attr = coerce_attribute(&json!(x), "aggression", 1);
            prop_assert!((0.0..=100.0).contains(&attr));
        }

        #[test]
        fn prices_are_non_negative_with_two_decimals(x in -1e6f64..1e6) {
            let price = coerce_price(&json!(x), 1);
            prop_assert!(price >= 0.0);
            prop_assert!((price * 100.0 - (price * 100.0).round()).abs() < 1e-6);
        }
    }
}
