use std::fmt::Write as _;

use crate::{ContextChunk, MasteryContext};

pub(crate) const APOLOGY: &str =
	"I'm sorry, I'm having trouble responding right now. Could you try asking again in a moment?";

pub(crate) const REPEAT_ACKNOWLEDGEMENT: &str =
	"I can see you've asked about this several times, so I've let your tutor know. Let's try a different angle together. Which part feels most confusing right now?";

const COMPANION_GENERAL: &str = "\
You are a patient study companion for a school-age student. Guide the student toward the \
answer with hints and questions; never hand over a final answer to homework. Reply in two \
to four short sentences and always end with a question that checks understanding. If the \
student seems stuck or upset, acknowledge it before continuing.";

const COMPANION_HOMEWORK: &str = "\
You are helping a student with a homework problem they shared, possibly as a photo. Work \
through the problem one step at a time and ask the student to attempt each step. Do not \
solve it for them and do not suggest contacting a tutor. Reply in two to four short \
sentences and always end with a question.";

pub(crate) const CLASSIFIER: &str = "\
You decide whether a tutoring conversation should be handed to a human tutor. Consider \
frustration, repeated failure, confusion that is not resolving, and explicit requests. \
Respond with a JSON object: {\"routing_needed\": bool, \"confidence\": number between 0 and \
1, \"reason\": string, \"urgency\": \"low\" | \"medium\" | \"high\", \"triggers\": [string]}.";

pub(crate) const GENERATOR: &str = "\
You write one practice problem for a student. Match the requested difficulty on a 1 to 5 \
scale. Respond with a JSON object: {\"prompt\": string, \"correct_answer\": string, \
\"solution_steps\": [string]}.";

pub(crate) const GRADER: &str = "\
You grade a student's answer to a practice problem. Accept equivalent forms of the correct \
answer. Respond with a JSON object: {\"is_correct\": bool, \"feedback\": string}. Feedback is \
one or two encouraging sentences and must not reveal the answer when it is wrong.";

pub(crate) const STRUGGLE_REFINER: &str = "\
Name the single concept a student is struggling with, based on their recent messages. \
Respond with a JSON object: {\"concept\": string}. Use a short noun phrase.";

pub(crate) struct CompanionPrompt<'a> {
	pub(crate) homework_help: bool,
	pub(crate) student_name: Option<&'a str>,
	pub(crate) grade_level: Option<&'a str>,
	pub(crate) subject: Option<&'a str>,
	pub(crate) mastery: Option<&'a MasteryContext>,
	pub(crate) chunks: &'a [ContextChunk],
	pub(crate) problem: Option<&'a ProblemState<'a>>,
}

pub(crate) struct ProblemState<'a> {
	pub(crate) prompt: &'a str,
	pub(crate) attempts: i32,
	pub(crate) last_answer: Option<&'a str>,
}

pub(crate) fn companion_system(prompt: &CompanionPrompt<'_>) -> String {
	let mut out =
		String::from(if prompt.homework_help { COMPANION_HOMEWORK } else { COMPANION_GENERAL });

	out.push_str("\n\n## Student\n");

	if let Some(name) = prompt.student_name {
		let _ = writeln!(out, "Name: {name}");
	}
	if let Some(grade) = prompt.grade_level {
		let _ = writeln!(out, "Grade level: {grade}");
	}
	if let Some(subject) = prompt.subject {
		let _ = writeln!(out, "Subject: {subject}");
	}
	if let Some(mastery) = prompt.mastery {
		let _ =
			writeln!(out, "Understanding level: {:.0}/100 ({:?})", mastery.level, mastery.trend);

		if let Some(topic) = mastery.weakest_topic.as_deref() {
			let _ = writeln!(out, "Weakest topic: {topic}");
		}
	}
	if let Some(problem) = prompt.problem {
		out.push_str("\n## Current practice problem\n");

		let _ = writeln!(out, "{}", problem.prompt);
		let _ = writeln!(out, "Attempts so far: {}", problem.attempts);

		if let Some(answer) = problem.last_answer {
			let _ = writeln!(out, "Last answer: {answer}");
		}
	}
	if !prompt.chunks.is_empty() {
		out.push_str("\n## Relevant history\n");

		for chunk in prompt.chunks {
			let _ = writeln!(out, "- [{}] {}", chunk.source.as_str(), chunk.text);
		}
	}

	out
}

pub(crate) fn classifier_user(
	transcript: &[String],
	mastery: Option<f32>,
	problem_attempts: u32,
) -> String {
	let mut out = String::from("Recent student messages, oldest first:\n");

	for line in transcript {
		let _ = writeln!(out, "- {line}");
	}
	match mastery {
		Some(level) => {
			let _ = writeln!(out, "\nUnderstanding level: {level:.0}/100");
		},
		None => out.push_str("\nUnderstanding level: unknown\n"),
	}

	let _ = writeln!(out, "Attempts on the current problem: {problem_attempts}");

	out
}

pub(crate) fn generator_user(
	subject: &str,
	topic: &str,
	difficulty: u8,
	struggle: Option<&str>,
) -> String {
	let mut out = format!("Subject: {subject}\nTopic: {topic}\nDifficulty: {difficulty}\n");

	if let Some(concept) = struggle {
		let _ = writeln!(
			out,
			"The student recently struggled with {concept}. Write a variant that practises the same concept."
		);
	}

	out
}

pub(crate) fn grader_user(prompt: &str, correct_answer: &str, answer: &str) -> String {
	format!("Problem: {prompt}\nCorrect answer: {correct_answer}\nStudent answer: {answer}\n")
}
