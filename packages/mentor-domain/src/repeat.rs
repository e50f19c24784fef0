use unicode_normalization::UnicodeNormalization;

/// Shorter side must be at least this long for containment to count as a repeat.
pub const MIN_CONTAINMENT_CHARS: usize = 10;

const ANSWER_SEEKING_PATTERNS: [&str; 8] = [
	"give me the answer",
	"just tell me the answer",
	"tell me the answer",
	"what is the answer",
	"do my homework",
	"solve it for me",
	"just solve it",
	"do it for me",
];

/// NFKC, lowercase, punctuation removed, whitespace collapsed.
pub fn normalize_query(text: &str) -> String {
	let folded: String = text
		.nfkc()
		.flat_map(char::to_lowercase)
		.map(|ch| if ch.is_alphanumeric() || ch.is_whitespace() { ch } else { ' ' })
		.collect();

	folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether two already-normalized queries ask the same thing.
pub fn is_repeat_of(a: &str, b: &str) -> bool {
	if a.is_empty() || b.is_empty() {
		return false;
	}
	if a == b {
		return true;
	}

	let (shorter, longer) = if a.chars().count() <= b.chars().count() { (a, b) } else { (b, a) };

	if shorter.chars().count() >= MIN_CONTAINMENT_CHARS && longer.contains(shorter) {
		return true;
	}

	ANSWER_SEEKING_PATTERNS
		.iter()
		.any(|pattern| a.contains(pattern) && b.contains(pattern))
}

/// Number of times `message` has been asked, counting `message` itself.
pub fn count_repeats<'a, I>(message: &str, previous: I) -> usize
where
	I: IntoIterator<Item = &'a str>,
{
	let current = normalize_query(message);

	if current.is_empty() {
		return 0;
	}

	1 + previous.into_iter().filter(|prior| is_repeat_of(&current, &normalize_query(prior))).count()
}
