use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

const TUTOR_SUGGESTION_PATTERNS: [&str; 6] = [
	r"(?i)[^.!?]*\b(you\s+(might|may|could|should)\s+(want\s+to\s+)?)(talk|speak|reach\s+out)\s+(to|with)\s+(a|your)\s+(human\s+|real\s+|live\s+)?(tutor|teacher)[^.!?]*[.!?]*",
	r"(?i)[^.!?]*\b(i\s+can|let\s+me|i'?ll|i\s+will)\s+(connect|refer|transfer)\s+you\s+(to|with)\s+(a|your)\s+(human\s+|real\s+|live\s+)?(tutor|teacher)[^.!?]*[.!?]*",
	r"(?i)[^.!?]*\bconsider\s+(booking|scheduling|asking\s+for)\s+(a\s+)?(session|tutor|tutoring)[^.!?]*[.!?]*",
	r"(?i)[^.!?]*\b(ask|contact|message)\s+(a|your)\s+(human\s+|real\s+|live\s+)?(tutor|teacher)\s+for\s+(help|support)[^.!?]*[.!?]*",
	r"(?i)[^.!?]*\ba\s+(human|real|live)\s+tutor\s+(can|could|would|will)\s+help[^.!?]*[.!?]*",
	r"(?i)[^.!?]*\bescalat(e|ed|ing)\s+(this|you)\b[^.!?]*[.!?]*",
];
const FILLERS: [&str; 3] = [
	"Good question, let's work through it together.",
	"Nice, you're asking exactly the right kind of question.",
	"Let's take this one step at a time.",
];
const GUIDING_QUESTIONS: [&str; 4] = [
	"What do you think the next step should be?",
	"Which part of this feels least clear to you?",
	"How would you try the first step on your own?",
	"Can you explain back in your own words what we just did?",
];

#[derive(Clone, Copy, Debug)]
pub struct ShapeOptions {
	pub max_sentences: usize,
	pub min_sentences: usize,
	pub strip_tutor_suggestions: bool,
}
impl Default for ShapeOptions {
	fn default() -> Self {
		Self { max_sentences: 4, min_sentences: 2, strip_tutor_suggestions: false }
	}
}

pub fn split_sentences(text: &str) -> Vec<String> {
	text.unicode_sentences()
		.map(str::trim)
		.filter(|sentence| !sentence.is_empty())
		.map(str::to_string)
		.collect()
}

pub fn strip_tutor_suggestions(text: &str) -> String {
	let mut out = text.to_string();

	for pattern in TUTOR_SUGGESTION_PATTERNS {
		let Ok(re) = Regex::new(pattern) else { continue };

		out = re.replace_all(&out, " ").into_owned();
	}

	out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Enforces the conversational shape of companion replies: between `min_sentences` and
/// `max_sentences` sentences, always ending in a question.
pub fn shape_reply(raw: &str, options: ShapeOptions) -> String {
	let max = options.max_sentences.max(2);
	let min = options.min_sentences.clamp(1, max);
	let cleaned = if options.strip_tutor_suggestions {
		strip_tutor_suggestions(raw)
	} else {
		raw.to_string()
	};
	let mut sentences: Vec<String> =
		split_sentences(&cleaned)
			.into_iter()
			.map(|sentence| terminate(&capitalize(&sentence)))
			.collect();
	let seed = cleaned.len();

	sentences.truncate(max);

	let ends_with_question = sentences.last().map(|last| last.ends_with('?')).unwrap_or(false);

	if !ends_with_question {
		let question = GUIDING_QUESTIONS[seed % GUIDING_QUESTIONS.len()].to_string();

		if sentences.len() >= max {
			sentences.pop();
		}

		sentences.push(question);
	}

	while sentences.len() < min {
		let filler = FILLERS[(seed + sentences.len()) % FILLERS.len()];

		if sentences.iter().any(|sentence| sentence == filler) {
			sentences.insert(0, FILLERS[(seed + sentences.len() + 1) % FILLERS.len()].to_string());
		} else {
			sentences.insert(0, filler.to_string());
		}
	}

	sentences.join(" ")
}

fn capitalize(sentence: &str) -> String {
	let mut chars = sentence.chars();

	match chars.next() {
		Some(first) if first.is_lowercase() => first.to_uppercase().chain(chars).collect(),
		_ => sentence.to_string(),
	}
}

fn terminate(sentence: &str) -> String {
	let trimmed = sentence.trim_end();

	if trimmed.ends_with(['.', '!', '?']) {
		return trimmed.to_string();
	}

	let trimmed = trimmed.trim_end_matches([',', ';', ':', '-']);

	format!("{trimmed}.")
}
