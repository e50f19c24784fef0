use rand::Rng;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use mentor_config::Mastery;

pub const MIN_LEVEL: f32 = 0.0;
pub const MAX_LEVEL: f32 = 100.0;

/// What the model knows about a student's prior sessions in one subject.
#[derive(Clone, Debug)]
pub struct MasteryHistory {
	pub max_level: f32,
	pub last_session_date: OffsetDateTime,
	/// Companion turns plus completed practice problems since `last_session_date`.
	pub interactions: u32,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct MasteryLevel {
	pub level: f32,
	/// Level the progression started from; `None` for a first session.
	pub previous_level: Option<f32>,
	pub decayed: bool,
}

/// Bonus range for the number of AI interactions since the previous session.
pub fn interaction_bonus(interactions: u32) -> Option<(f32, f32)> {
	match interactions {
		0 => None,
		1..=3 => Some((5.0, 8.0)),
		4..=10 => Some((8.0, 12.0)),
		_ => Some((12.0, 15.0)),
	}
}

pub fn progress<R>(
	history: Option<&MasteryHistory>,
	session_date: OffsetDateTime,
	cfg: &Mastery,
	rng: &mut R,
) -> MasteryLevel
where
	R: Rng,
{
	let Some(history) = history else {
		let level = sample(rng, 0.0, cfg.initial_max);

		return MasteryLevel {
			level: round2(clamp_level(level)),
			previous_level: None,
			decayed: false,
		};
	};

	let mut level = clamp_level(history.max_level);
	let gap_days = (session_date - history.last_session_date).whole_days();
	let decayed = gap_days > cfg.decay_gap_days;

	if decayed {
		level -= sample(rng, cfg.decay_min, cfg.decay_max);
	}

	level += sample(rng, 0.0, cfg.progression_max);

	if let Some((low, high)) = interaction_bonus(history.interactions) {
		level += sample(rng, low, high);
	}

	MasteryLevel {
		level: round2(clamp_level(level)),
		previous_level: Some(round2(clamp_level(history.max_level))),
		decayed,
	}
}

fn sample<R>(rng: &mut R, low: f32, high: f32) -> f32
where
	R: Rng,
{
	if high <= low {
		return low;
	}

	rng.random_range(low..=high)
}

fn clamp_level(level: f32) -> f32 {
	if !level.is_finite() {
		return MIN_LEVEL;
	}

	level.clamp(MIN_LEVEL, MAX_LEVEL)
}

fn round2(value: f32) -> f32 {
	(value * 100.0).round() / 100.0
}
