use regex::Regex;

const STRUGGLE_PATTERNS: [&str; 7] = [
	r"(?i)\bi\s+(?:don'?t|do\s+not)\s+(?:understand|get)\s+(?:how\s+to\s+|what\s+|why\s+)?(?P<concept>[^.?!,]{3,60})",
	r"(?i)\bconfused\s+(?:about|by|with)\s+(?P<concept>[^.?!,]{3,60})",
	r"(?i)\b(?P<concept>[^.?!,]{3,60}?)\s+(?:doesn'?t|does\s+not|don'?t|do\s+not)\s+make\s+(?:any\s+)?sense",
	r"(?i)\bstuck\s+on\s+(?P<concept>[^.?!,]{3,60})",
	r"(?i)\bhelp\s+(?:me\s+)?with\s+(?P<concept>[^.?!,]{3,60})",
	r"(?i)\bwhy\s+(?:is|does|do)\s+(?P<concept>[^.?!,]{3,60})",
	r"(?i)\bi\s+thought\s+(?P<concept>[^.?!,]{3,60})",
];
const LEADING_FILLERS: [&str; 6] = ["the ", "a ", "an ", "this ", "that ", "about "];

/// A concept a student keeps tripping over, pulled from their own wording.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StruggleSignal {
	pub concept: String,
	pub occurrences: usize,
}

/// Scans recent student messages, oldest first, for struggle cues and returns the concept
/// mentioned most often. Later mentions win ties.
pub fn detect_struggle<'a, I>(messages: I) -> Option<StruggleSignal>
where
	I: IntoIterator<Item = &'a str>,
{
	let patterns: Vec<Regex> =
		STRUGGLE_PATTERNS.iter().filter_map(|pattern| Regex::new(pattern).ok()).collect();
	let mut counts: Vec<(String, usize, usize)> = Vec::new();

	for (idx, message) in messages.into_iter().enumerate() {
		for re in &patterns {
			let Some(concept) = re
				.captures(message)
				.and_then(|caps| caps.name("concept"))
				.map(|m| clean_concept(m.as_str()))
			else {
				continue;
			};

			if concept.is_empty() {
				continue;
			}

			match counts.iter_mut().find(|(existing, _, _)| *existing == concept) {
				Some(entry) => {
					entry.1 += 1;
					entry.2 = idx;
				},
				None => counts.push((concept, 1, idx)),
			}

			break;
		}
	}

	counts
		.into_iter()
		.max_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)))
		.map(|(concept, occurrences, _)| StruggleSignal { concept, occurrences })
}

fn clean_concept(raw: &str) -> String {
	let mut concept = raw.trim().to_lowercase();

	loop {
		let Some(rest) = LEADING_FILLERS.iter().find_map(|filler| concept.strip_prefix(filler))
		else {
			break;
		};

		concept = rest.trim_start().to_string();
	}

	concept.split_whitespace().collect::<Vec<_>>().join(" ")
}
