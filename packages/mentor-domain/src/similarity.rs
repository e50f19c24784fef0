use std::collections::HashSet;

/// Cosine similarity clamped to `[0, 1]`.
///
/// Mismatched dimensions, empty vectors, and zero vectors score `0.0`. Opposing vectors also
/// score `0.0` because retrieval only cares about how related two texts are.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
	if a.is_empty() || a.len() != b.len() {
		return 0.0;
	}

	let mut dot = 0.0_f64;
	let mut norm_a = 0.0_f64;
	let mut norm_b = 0.0_f64;

	for (x, y) in a.iter().zip(b) {
		let (x, y) = (f64::from(*x), f64::from(*y));

		dot += x * y;
		norm_a += x * x;
		norm_b += y * y;
	}

	if norm_a == 0.0 || norm_b == 0.0 {
		return 0.0;
	}

	let cosine = dot / (norm_a.sqrt() * norm_b.sqrt());

	if !cosine.is_finite() {
		return 0.0;
	}

	cosine.clamp(0.0, 1.0) as f32
}

pub fn tokenize_terms(text: &str) -> HashSet<String> {
	let mut normalized = String::with_capacity(text.len());

	for ch in text.chars() {
		if ch.is_alphanumeric() {
			normalized.extend(ch.to_lowercase());
		} else {
			normalized.push(' ');
		}
	}

	let mut out = HashSet::new();

	for token in normalized.split_whitespace() {
		if token.chars().count() < 2 {
			continue;
		}

		out.insert(token.to_string());
	}

	out
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
	if a.is_empty() && b.is_empty() {
		return 0.0;
	}

	let intersection = a.intersection(b).count();
	let union = a.len() + b.len() - intersection;

	if union == 0 {
		return 0.0;
	}

	intersection as f32 / union as f32
}

/// Lexical fallback used when either side has no embedding:
/// `w * jaccard + (1 - w) * min(1, overlap / |query_terms|)`.
pub fn lexical_similarity(query: &str, text: &str, jaccard_weight: f32) -> f32 {
	let query_terms = tokenize_terms(query);

	if query_terms.is_empty() {
		return 0.0;
	}

	let text_terms = tokenize_terms(text);

	if text_terms.is_empty() {
		return 0.0;
	}

	let weight = jaccard_weight.clamp(0.0, 1.0);
	let overlap = query_terms.iter().filter(|term| text_terms.contains(*term)).count();
	let overlap_ratio = (overlap as f32 / query_terms.len() as f32).min(1.0);
	let score = weight * jaccard(&query_terms, &text_terms) + (1.0 - weight) * overlap_ratio;

	score.clamp(0.0, 1.0)
}
