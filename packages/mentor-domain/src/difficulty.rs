use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Points of movement across the trend window that count as a real change.
pub const TREND_DELTA: f32 = 5.0;

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scale {
	/// 1-3, used to pick practice problems.
	#[default]
	Coarse,
	/// 1-5, used for general scheduling.
	Fine,
}
impl Scale {
	pub fn max(self) -> u8 {
		match self {
			Self::Coarse => 3,
			Self::Fine => 5,
		}
	}
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
	Improving,
	#[default]
	Flat,
	Declining,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TopicReading {
	pub topic: String,
	pub level: f32,
	pub recorded_at: OffsetDateTime,
}

/// Trend over the trailing `window` readings, ordered oldest to newest.
pub fn trend_from_readings(readings: &[f32], window: usize) -> Trend {
	let window = window.max(2);
	let tail = &readings[readings.len().saturating_sub(window)..];

	let (Some(oldest), Some(newest)) = (tail.first(), tail.last()) else {
		return Trend::Flat;
	};

	if tail.len() < 2 {
		return Trend::Flat;
	}

	let delta = newest - oldest;

	if delta > TREND_DELTA {
		Trend::Improving
	} else if delta < -TREND_DELTA {
		Trend::Declining
	} else {
		Trend::Flat
	}
}

pub fn base_difficulty(mastery: f32, scale: Scale) -> u8 {
	let mastery = if mastery.is_finite() { mastery.clamp(0.0, 100.0) } else { 0.0 };

	match scale {
		Scale::Coarse =>
			if mastery < 50.0 {
				1
			} else if mastery <= 75.0 {
				2
			} else {
				3
			},
		Scale::Fine =>
			if mastery <= 30.0 {
				1
			} else if mastery <= 50.0 {
				2
			} else if mastery <= 70.0 {
				3
			} else if mastery <= 85.0 {
				4
			} else {
				5
			},
	}
}

pub fn recommend(mastery: f32, trend: Trend, scale: Scale) -> u8 {
	let base = base_difficulty(mastery, scale);

	match trend {
		Trend::Improving => (base + 1).min(scale.max()),
		Trend::Declining => base.saturating_sub(1).max(1),
		Trend::Flat => base,
	}
}

/// Lowest-scoring topic, considering only the newest reading per topic.
pub fn weakest_topic(readings: &[TopicReading]) -> Option<&TopicReading> {
	let mut latest: HashMap<&str, &TopicReading> = HashMap::new();

	for reading in readings {
		let entry = latest.entry(reading.topic.as_str()).or_insert(reading);

		if reading.recorded_at > entry.recorded_at {
			*entry = reading;
		}
	}

	latest.into_values().min_by(|a, b| {
		a.level.total_cmp(&b.level).then_with(|| a.topic.cmp(&b.topic))
	})
}
