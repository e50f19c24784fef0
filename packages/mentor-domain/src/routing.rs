use regex::Regex;
use serde::{Deserialize, Serialize};

use mentor_config::Escalation;

pub const EXPLICIT_REQUEST: &str = "explicit_request";
pub const INTERACTION_COUNT: &str = "interaction_count";
pub const FRUSTRATION_CUES: &str = "frustration_cues";
pub const NO_PROGRESS: &str = "no_progress";

const EXPLICIT_REQUEST_PATTERNS: [&str; 7] = [
	r"(?i)\b(real|live|actual)\s+(tutor|teacher|person)\b",
	r"(?i)\b(a|an|the|some|to|with|real)\s+human\b",
	r"(?i)\bhuman\s+(tutor|teacher|help|being)\b",
	r"(?i)\b(talk|speak|chat)\s+(to|with)\s+(someone|somebody|anyone|a\s+person|a\s+tutor|my\s+tutor)\b",
	r"(?i)\b(connect|transfer)\s+me\s+(to|with)\b",
	r"(?i)\b(need|want)\s+(a|my)\s+tutor\b",
	r"(?i)\bcan\s+i\s+(get|have|see)\s+(a\s+|my\s+)?tutor\b",
];
const FRUSTRATION_PATTERNS: [&str; 12] = [
	r"(?i)\bstuck\b",
	r"(?i)\bgiv(e|ing)\s+up\b",
	r"(?i)\bhate\b",
	r"(?i)\bimpossible\b",
	r"(?i)\bconfus(ed|ing)\b",
	r"(?i)\bfrustrat(ed|ing)\b",
	r"(?i)\bdon'?t\s+get\s+it\b",
	r"(?i)\b(doesn'?t|does\s+not)\s+make\s+(any\s+)?sense\b",
	r"(?i)\bmakes\s+no\s+sense\b",
	r"(?i)\b(so|too)\s+hard\b",
	r"(?i)\bugh+\b",
	r"!{2,}|\?{2,}",
];

#[derive(
	Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
	#[default]
	Low,
	Medium,
	High,
}
impl Urgency {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Low => "low",
			Self::Medium => "medium",
			Self::High => "high",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"low" => Some(Self::Low),
			"medium" => Some(Self::Medium),
			"high" => Some(Self::High),
			_ => None,
		}
	}
}

/// The shared escalation schema produced by both the deterministic and classifier phases.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct RoutingDecision {
	pub routing_needed: bool,
	pub confidence: f32,
	pub reason: String,
	pub urgency: Urgency,
	pub triggers: Vec<String>,
}
impl RoutingDecision {
	pub fn none(reason: impl Into<String>) -> Self {
		Self {
			routing_needed: false,
			confidence: 0.0,
			reason: reason.into(),
			urgency: Urgency::Low,
			triggers: Vec::new(),
		}
	}

	pub fn is_explicit_request(&self) -> bool {
		self.triggers.iter().any(|trigger| trigger == EXPLICIT_REQUEST)
	}

	/// Keeps confidence and urgency consistent: confidence in `[0, 1]`, and `High` only for
	/// confident or explicitly requested escalations.
	pub fn normalized(mut self, high_urgency_confidence: f32) -> Self {
		self.confidence =
			if self.confidence.is_finite() { self.confidence.clamp(0.0, 1.0) } else { 0.0 };

		if !self.routing_needed {
			self.urgency = Urgency::Low;

			return self;
		}
		if self.is_explicit_request() {
			self.urgency = Urgency::High;
		} else if self.urgency == Urgency::High && self.confidence < high_urgency_confidence {
			self.urgency = Urgency::Medium;
		}

		self
	}
}

/// Inputs every deterministic trigger may look at.
#[derive(Clone, Debug, Default)]
pub struct TriggerContext<'a> {
	pub message: &'a str,
	/// Earlier student messages, oldest first, excluding `message`.
	pub recent_student_messages: &'a [String],
	pub has_active_problem: bool,
	/// Turns on the active problem, including the current one.
	pub turns_on_problem: u32,
	pub problem_attempts: u32,
	pub understanding_improved: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TriggerHit {
	pub name: &'static str,
	pub confidence: f32,
	pub reason: String,
	/// A terminal hit ends evaluation immediately.
	pub terminal: bool,
}

pub trait Trigger
where
	Self: Send + Sync,
{
	fn name(&self) -> &'static str;

	fn evaluate(&self, ctx: &TriggerContext<'_>) -> Option<TriggerHit>;
}

#[derive(Debug, Default)]
pub struct ExplicitRequest;
impl Trigger for ExplicitRequest {
	fn name(&self) -> &'static str {
		EXPLICIT_REQUEST
	}

	fn evaluate(&self, ctx: &TriggerContext<'_>) -> Option<TriggerHit> {
		if !matches_any(&EXPLICIT_REQUEST_PATTERNS, ctx.message) {
			return None;
		}

		Some(TriggerHit {
			name: self.name(),
			confidence: 1.0,
			reason: "Student explicitly asked for a human tutor.".to_string(),
			terminal: true,
		})
	}
}

#[derive(Debug)]
pub struct InteractionCount {
	pub turn_limit: u32,
}
impl Trigger for InteractionCount {
	fn name(&self) -> &'static str {
		INTERACTION_COUNT
	}

	fn evaluate(&self, ctx: &TriggerContext<'_>) -> Option<TriggerHit> {
		if !ctx.has_active_problem || ctx.turns_on_problem <= self.turn_limit {
			return None;
		}

		Some(TriggerHit {
			name: self.name(),
			confidence: 0.8,
			reason: format!(
				"{} turns on the same practice problem without resolution.",
				ctx.turns_on_problem
			),
			terminal: false,
		})
	}
}

#[derive(Debug)]
pub struct FrustrationCues {
	/// How many earlier student messages to scan besides the current one.
	pub window: usize,
}
impl FrustrationCues {
	pub fn count_hits(&self, ctx: &TriggerContext<'_>) -> usize {
		let earlier = ctx.recent_student_messages;
		let start = earlier.len().saturating_sub(self.window);

		earlier[start..]
			.iter()
			.map(String::as_str)
			.chain(std::iter::once(ctx.message))
			.map(frustration_hits)
			.sum()
	}
}
impl Trigger for FrustrationCues {
	fn name(&self) -> &'static str {
		FRUSTRATION_CUES
	}

	fn evaluate(&self, ctx: &TriggerContext<'_>) -> Option<TriggerHit> {
		let hits = self.count_hits(ctx);
		let confidence = match hits {
			0 => return None,
			1 => 0.6,
			_ => 0.85,
		};

		Some(TriggerHit {
			name: self.name(),
			confidence,
			reason: format!("Detected {hits} frustration cue(s) in recent messages."),
			terminal: false,
		})
	}
}

#[derive(Debug)]
pub struct NoProgress {
	pub min_attempts: u32,
}
impl Trigger for NoProgress {
	fn name(&self) -> &'static str {
		NO_PROGRESS
	}

	fn evaluate(&self, ctx: &TriggerContext<'_>) -> Option<TriggerHit> {
		if !ctx.has_active_problem
			|| ctx.problem_attempts < self.min_attempts
			|| ctx.understanding_improved
		{
			return None;
		}

		Some(TriggerHit {
			name: self.name(),
			confidence: 0.75,
			reason: format!(
				"{} attempts on the same problem with no understanding improvement.",
				ctx.problem_attempts
			),
			terminal: false,
		})
	}
}

/// Ordered deterministic phase of the escalation engine.
pub struct TriggerSet {
	triggers: Vec<Box<dyn Trigger>>,
	short_circuit_confidence: f32,
	high_urgency_confidence: f32,
}
impl TriggerSet {
	pub fn new(
		triggers: Vec<Box<dyn Trigger>>,
		short_circuit_confidence: f32,
		high_urgency_confidence: f32,
	) -> Self {
		Self { triggers, short_circuit_confidence, high_urgency_confidence }
	}

	pub fn from_config(cfg: &Escalation) -> Self {
		Self::new(
			vec![
				Box::new(ExplicitRequest),
				Box::new(InteractionCount { turn_limit: cfg.interaction_turn_limit }),
				Box::new(FrustrationCues { window: cfg.frustration_window as usize }),
				Box::new(NoProgress { min_attempts: cfg.no_progress_attempts }),
			],
			cfg.short_circuit_confidence,
			cfg.high_urgency_confidence,
		)
	}

	/// Returns a decision only when a trigger fired with enough confidence to skip the
	/// classifier.
	pub fn evaluate(&self, ctx: &TriggerContext<'_>) -> Option<RoutingDecision> {
		let mut hits = Vec::new();

		for trigger in &self.triggers {
			let Some(hit) = trigger.evaluate(ctx) else { continue };

			if hit.terminal {
				return Some(self.decide(vec![hit]));
			}

			hits.push(hit);
		}

		if hits.is_empty() {
			return None;
		}

		let decision = self.decide(hits);

		if decision.confidence < self.short_circuit_confidence {
			return None;
		}

		Some(decision)
	}

	fn decide(&self, hits: Vec<TriggerHit>) -> RoutingDecision {
		let confidence = hits.iter().map(|hit| hit.confidence).fold(0.0_f32, f32::max);
		let terminal = hits.iter().any(|hit| hit.terminal);
		let urgency = if terminal || confidence >= self.high_urgency_confidence {
			Urgency::High
		} else {
			Urgency::Medium
		};
		let reason = hits.iter().map(|hit| hit.reason.as_str()).collect::<Vec<_>>().join(" ");

		RoutingDecision {
			routing_needed: true,
			confidence,
			reason,
			urgency,
			triggers: hits.iter().map(|hit| hit.name.to_string()).collect(),
		}
	}
}

pub fn is_explicit_request(message: &str) -> bool {
	matches_any(&EXPLICIT_REQUEST_PATTERNS, message)
}

fn frustration_hits(text: &str) -> usize {
	FRUSTRATION_PATTERNS
		.iter()
		.filter_map(|pattern| Regex::new(pattern).ok())
		.map(|re| re.find_iter(text).count())
		.sum()
}

fn matches_any(patterns: &[&str], text: &str) -> bool {
	for pattern in patterns {
		if Regex::new(pattern).map(|re| re.is_match(text)).unwrap_or(false) {
			return true;
		}
	}

	false
}
