use mentor_config::Escalation;
use mentor_domain::{
	difficulty::{self, Scale, Trend},
	repeat,
	routing::{self, RoutingDecision, TriggerContext, TriggerSet, Urgency},
	shaping::{self, ShapeOptions},
	similarity,
};

fn triggers() -> TriggerSet {
	TriggerSet::from_config(&Escalation::default())
}

#[test]
fn explicit_request_routes_with_full_confidence() {
	let ctx =
		TriggerContext { message: "Can I talk to a real tutor please?", ..Default::default() };
	let decision = triggers().evaluate(&ctx).expect("explicit request should route");

	assert!(decision.routing_needed);
	assert_eq!(decision.confidence, 1.0);
	assert_eq!(decision.urgency, Urgency::High);
	assert_eq!(decision.triggers, vec![routing::EXPLICIT_REQUEST.to_string()]);
}

#[test]
fn repeated_frustration_accumulates_across_messages() {
	let history = vec!["this is so confusing".to_string()];
	let ctx = TriggerContext {
		message: "I'm confused, this is confusing",
		recent_student_messages: &history,
		..Default::default()
	};
	let decision = triggers().evaluate(&ctx).expect("frustration should route");

	assert!(decision.routing_needed);
	assert!(decision.triggers.iter().any(|name| name == routing::FRUSTRATION_CUES));
	assert!(decision.confidence >= 0.8);
}

#[test]
fn calm_message_does_not_short_circuit() {
	let ctx = TriggerContext { message: "How do I factor x^2 + 5x + 6?", ..Default::default() };

	assert!(triggers().evaluate(&ctx).is_none());
}

#[test]
fn normalized_decision_keeps_urgency_consistent() {
	let quiet = RoutingDecision { urgency: Urgency::High, ..RoutingDecision::none("nothing") };

	assert_eq!(quiet.normalized(0.8).urgency, Urgency::Low);

	let weak = RoutingDecision {
		routing_needed: true,
		confidence: 0.72,
		reason: "student seems stuck".to_string(),
		urgency: Urgency::High,
		triggers: Vec::new(),
	};

	assert_eq!(weak.normalized(0.8).urgency, Urgency::Medium);
}

#[test]
fn urgency_serializes_as_snake_case() {
	let value = serde_json::to_value(Urgency::Medium).expect("Failed to serialize urgency.");

	assert_eq!(value, serde_json::json!("medium"));
	assert_eq!(Urgency::parse("HIGH"), Some(Urgency::High));
}

#[test]
fn shaped_replies_stay_conversational() {
	let raws = [
		"",
		"Sure.",
		"Subtract 3 from both sides. Then divide by 2. That leaves x on its own. Check it by substituting back. Done.",
		"Think about what the exponent tells you?",
	];

	for raw in raws {
		let shaped = shaping::shape_reply(raw, ShapeOptions::default());
		let count = shaping::split_sentences(&shaped).len();

		assert!((2..=4).contains(&count), "{shaped:?}");
		assert!(shaped.ends_with('?'), "{shaped:?}");
	}
}

#[test]
fn repeats_are_counted_with_normalization() {
	let history = ["Just tell me the answer!", "what's a prime number", "JUST TELL ME THE ANSWER"];

	assert_eq!(repeat::count_repeats("just tell me the answer", history.iter().copied()), 3);
}

#[test]
fn lexical_and_vector_scores_share_a_range() {
	let lexical = similarity::lexical_similarity("area of a circle", "circle area formula", 0.7);
	let cosine = similarity::cosine_similarity(&[1.0, 1.0], &[1.0, 0.0]);

	assert!((0.0..=1.0).contains(&lexical));
	assert!((cosine - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
}

#[test]
fn difficulty_tracks_mastery_and_trend() {
	let trend = difficulty::trend_from_readings(&[30.0, 36.0, 44.0], 3);

	assert_eq!(trend, Trend::Improving);
	assert_eq!(difficulty::recommend(45.0, trend, Scale::Coarse), 2);
	assert_eq!(difficulty::recommend(45.0, Trend::Flat, Scale::Fine), 2);
}
