//! Pure tutoring rules: similarity scoring, mastery progression, difficulty mapping, escalation
//! triggers, and reply shaping. Nothing here performs I/O.

pub mod difficulty;
pub mod mastery;
pub mod repeat;
pub mod routing;
pub mod shaping;
pub mod signals;
pub mod similarity;
