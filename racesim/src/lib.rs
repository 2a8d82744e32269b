//! A tick-driven race simulator. Competitors are advanced lap by lap through a per-competitor
//! lifecycle (on track, pit entry, pit stall, stalled after a crash, retired, finished), while the
//! race level handles the safety car, ranking, scoring and termination. Every tick produces a
//! snapshot and a set of discrete events that are published to a [`RaceSink`].
//!
//! [`RaceSink`]: interfaces::messages::RaceSink

pub mod core;
pub mod error;
pub mod interfaces;
pub mod post;
pub mod pre;
