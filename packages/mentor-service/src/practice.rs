use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{Error, MentorService, Result, Structured, prompts};
use mentor_domain::{
	difficulty::{self, Scale, Trend},
	signals,
};
use mentor_providers::llm::{ChatMessage, CompletionRequest};
use mentor_storage::models::{PracticeProblem, Role, TurnFilter};

const ANSWER_LABELS: [&str; 3] = ["correct answer:", "answer:", "final answer:"];

#[derive(Clone, Debug, Deserialize)]
pub struct GoalRef {
	pub title: String,
	pub topic: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GenerateProblemRequest {
	pub student_id: Uuid,
	pub subject: String,
	pub topic: Option<String>,
	/// 1-5. Recommended from mastery when absent.
	pub difficulty: Option<u8>,
	pub goal: Option<GoalRef>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GradeRequest {
	pub problem_id: Uuid,
	pub answer: String,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeSource {
	Model,
	StringMatch,
}

#[derive(Clone, Debug, Serialize)]
pub struct GradeResponse {
	pub problem_id: Uuid,
	pub is_correct: bool,
	pub feedback: String,
	pub attempts_count: i32,
	pub completed: bool,
	/// Present once the final attempt was wrong.
	pub correct_answer: Option<String>,
	pub solution_steps: Option<Vec<String>>,
	pub source: GradeSource,
}

#[derive(Debug, Deserialize)]
struct GeneratedProblem {
	prompt: String,
	correct_answer: String,
	#[serde(default)]
	solution_steps: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GradeOutcome {
	is_correct: bool,
	#[serde(default)]
	feedback: String,
}

#[derive(Debug, Deserialize)]
struct RefinedConcept {
	concept: String,
}

impl MentorService {
	pub async fn generate_problem(&self, req: GenerateProblemRequest) -> Result<PracticeProblem> {
		let subject = req.subject.trim();

		if subject.is_empty() {
			return Err(Error::invalid("subject must be non-empty."));
		}
		if let Some(difficulty) = req.difficulty
			&& !(1..=Scale::Fine.max()).contains(&difficulty)
		{
			return Err(Error::invalid("difficulty must be between 1 and 5."));
		}

		let mastery = self.mastery_context(req.student_id, subject).await?;
		let topic = resolve_topic(
			&req,
			mastery.as_ref().and_then(|context| context.weakest_topic.as_deref()),
		)
		.unwrap_or(subject)
		.to_string();
		let difficulty = match req.difficulty {
			Some(difficulty) => difficulty,
			None => {
				let (level, trend) = mastery
					.as_ref()
					.map(|context| (context.level, context.trend))
					.unwrap_or((0.0, Trend::Flat));

				difficulty::recommend(level, trend, Scale::Coarse)
			},
		};
		let struggle = self.struggle_concept(req.student_id, subject).await;
		let completion_req = CompletionRequest {
			messages: vec![
				ChatMessage::system(prompts::GENERATOR),
				ChatMessage::user(prompts::generator_user(
					subject,
					&topic,
					difficulty,
					struggle.as_deref(),
				)),
			],
			..Default::default()
		};
		let generated = match self
			.complete_structured::<GeneratedProblem>(
				&completion_req,
				"practice_generation",
				req.student_id,
			)
			.await?
		{
			Structured::Parsed(generated) => generated,
			Structured::Raw(raw) => problem_from_raw(&raw).ok_or_else(|| Error::Provider {
				message: "Generated problem could not be parsed.".to_string(),
			})?,
		};

		if generated.prompt.trim().is_empty() || generated.correct_answer.trim().is_empty() {
			return Err(Error::Provider {
				message: "Generated problem is missing a prompt or answer.".to_string(),
			});
		}

		let problem = PracticeProblem {
			problem_id: Uuid::new_v4(),
			student_id: req.student_id,
			subject: subject.to_string(),
			topic,
			difficulty: i16::from(difficulty),
			prompt: generated.prompt.trim().to_string(),
			correct_answer: generated.correct_answer.trim().to_string(),
			solution_steps: generated.solution_steps,
			student_answer: None,
			is_correct: None,
			feedback: None,
			attempts_count: 0,
			created_at: crate::now(),
			completed_at: None,
		};

		self.store.save_problem(&problem).await?;
		self.track_event(
			"practice_generated",
			req.student_id,
			json!({
				"problem_id": problem.problem_id,
				"subject": problem.subject,
				"topic": problem.topic,
				"difficulty": problem.difficulty,
				"struggle_concept": struggle,
			}),
		)
		.await;

		Ok(problem)
	}

	pub async fn grade_problem(&self, req: GradeRequest) -> Result<GradeResponse> {
		let answer = req.answer.trim();

		if answer.is_empty() {
			return Err(Error::invalid("answer must be non-empty."));
		}

		let owner = self.load_problem(req.problem_id).await?.student_id;
		let _guard = self.lock_student(owner).await;
		let mut problem = self.load_problem(req.problem_id).await?;

		if problem.completed_at.is_some() {
			return Err(Error::Conflict {
				message: format!("Practice problem {} is already completed.", problem.problem_id),
			});
		}

		let (is_correct, feedback, source) = self.grade_answer(&problem, answer).await;

		problem.attempts_count += 1;
		problem.student_answer = Some(answer.to_string());
		problem.is_correct = Some(is_correct);
		problem.feedback = Some(feedback.clone());

		let out_of_attempts =
			problem.attempts_count >= self.cfg.practice.max_attempts_before_reveal as i32;
		let completed = is_correct || out_of_attempts;

		if completed {
			problem.completed_at = Some(crate::now());
		}

		self.store.update_problem(&problem).await?;
		self.track_event(
			"practice_graded",
			problem.student_id,
			json!({
				"problem_id": problem.problem_id,
				"is_correct": is_correct,
				"attempts_count": problem.attempts_count,
				"source": source,
			}),
		)
		.await;

		let reveal = completed && !is_correct;

		Ok(GradeResponse {
			problem_id: problem.problem_id,
			is_correct,
			feedback,
			attempts_count: problem.attempts_count,
			completed,
			correct_answer: reveal.then(|| problem.correct_answer.clone()),
			solution_steps: reveal.then(|| problem.solution_steps.clone()),
			source,
		})
	}

	async fn load_problem(&self, problem_id: Uuid) -> Result<PracticeProblem> {
		self.store.get_problem(problem_id).await?.ok_or_else(|| Error::NotFound {
			message: format!("Practice problem {problem_id}."),
		})
	}

	/// Model grading first; string comparison when the model is unavailable or unparseable.
	async fn grade_answer(
		&self,
		problem: &PracticeProblem,
		answer: &str,
	) -> (bool, String, GradeSource) {
		let req = CompletionRequest {
			messages: vec![
				ChatMessage::system(prompts::GRADER),
				ChatMessage::user(prompts::grader_user(
					&problem.prompt,
					&problem.correct_answer,
					answer,
				)),
			],
			temperature: Some(self.cfg.practice.grade_temperature),
			..Default::default()
		};

		let graded = self
			.complete_structured::<GradeOutcome>(&req, "practice_grading", problem.student_id)
			.await;

		match graded {
			Ok(Structured::Parsed(outcome)) => {
				let feedback = if outcome.feedback.trim().is_empty() {
					default_feedback(outcome.is_correct).to_string()
				} else {
					outcome.feedback.trim().to_string()
				};

				(outcome.is_correct, feedback, GradeSource::Model)
			},
			Ok(Structured::Raw(_)) | Err(_) => {
				let is_correct = answers_match(answer, &problem.correct_answer);

				tracing::warn!(
					problem_id = %problem.problem_id,
					"Model grading unavailable. Falling back to string comparison."
				);

				(is_correct, default_feedback(is_correct).to_string(), GradeSource::StringMatch)
			},
		}
	}

	async fn struggle_concept(&self, student_id: Uuid, subject: &str) -> Option<String> {
		let filter = TurnFilter {
			subject: Some(subject.to_string()),
			role: Some(Role::Student),
			..Default::default()
		};
		let turns = match self
			.store
			.recent_turns(student_id, &filter, self.cfg.practice.struggle_window)
			.await
		{
			Ok(turns) => turns,
			Err(err) => {
				tracing::warn!(error = %err, "Failed to load turns for struggle detection.");

				return None;
			},
		};
		let signal = signals::detect_struggle(turns.iter().map(|turn| turn.text.as_str()))?;

		if !self.cfg.practice.refine_struggle_with_llm {
			return Some(signal.concept);
		}

		let transcript =
			turns.iter().map(|turn| format!("- {}", turn.text)).collect::<Vec<_>>().join("\n");
		let req = CompletionRequest {
			messages: vec![
				ChatMessage::system(prompts::STRUGGLE_REFINER),
				ChatMessage::user(format!(
					"Detected cue: {}\nRecent messages:\n{transcript}",
					signal.concept
				)),
			],
			temperature: Some(0.0),
			..Default::default()
		};

		let refined = self
			.complete_structured::<RefinedConcept>(&req, "struggle_refinement", student_id)
			.await;

		match refined {
			Ok(Structured::Parsed(refined)) if !refined.concept.trim().is_empty() =>
				Some(refined.concept.trim().to_string()),
			_ => Some(signal.concept),
		}
	}
}

/// Explicit topic, then the goal's topic or title, then the weakest recorded topic.
fn resolve_topic<'a>(req: &'a GenerateProblemRequest, weakest: Option<&'a str>) -> Option<&'a str> {
	crate::non_empty(req.topic.as_deref())
		.or_else(|| {
			req.goal.as_ref().and_then(|goal| {
				crate::non_empty(goal.topic.as_deref())
					.or_else(|| crate::non_empty(Some(goal.title.as_str())))
			})
		})
		.or_else(|| crate::non_empty(weakest))
}

/// Builds a problem from free text laid out as a prompt, optional numbered steps, and an
/// `Answer:` line.
fn problem_from_raw(raw: &str) -> Option<GeneratedProblem> {
	let mut prompt = Vec::new();
	let mut steps = Vec::new();
	let mut answer = None;

	for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
		if let Some(value) = strip_answer_label(line) {
			answer = Some(value.to_string());
		} else if let Some(step) = strip_step_marker(line) {
			steps.push(step.to_string());
		} else if answer.is_none() && steps.is_empty() {
			prompt.push(line);
		}
	}

	let correct_answer = answer.filter(|answer| !answer.is_empty())?;

	if prompt.is_empty() {
		return None;
	}

	Some(GeneratedProblem { prompt: prompt.join(" "), correct_answer, solution_steps: steps })
}

fn strip_answer_label(line: &str) -> Option<&str> {
	ANSWER_LABELS.iter().find_map(|label| {
		let head = line.get(..label.len())?;

		head.eq_ignore_ascii_case(label).then(|| line[label.len()..].trim())
	})
}

fn strip_step_marker(line: &str) -> Option<&str> {
	let digits = line.chars().take_while(char::is_ascii_digit).count();

	if digits > 0 {
		let rest = &line[digits..];

		return rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')).map(str::trim);
	}

	line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")).map(str::trim)
}

/// Normalised equality, also comparing only the right-hand side of `x = 4` style answers.
/// Signs, operators and decimal points are significant.
fn answers_match(answer: &str, correct: &str) -> bool {
	let expected = normalize_answer(correct);

	if expected.is_empty() {
		return false;
	}

	normalize_answer(answer) == expected
		|| normalize_answer(assigned_value(answer)) == normalize_answer(assigned_value(correct))
}

/// Lowercases, drops whitespace and trailing sentence punctuation, and folds typographic
/// minus signs. Everything else is kept.
fn normalize_answer(text: &str) -> String {
	let folded: String = text
		.chars()
		.filter(|ch| !ch.is_whitespace())
		.map(|ch| match ch {
			'\u{2212}' | '\u{2013}' => '-',
			'\u{00d7}' => '*',
			'\u{00f7}' => '/',
			other => other,
		})
		.flat_map(char::to_lowercase)
		.collect();

	folded.trim_end_matches(['.', '!', '?', ',', ';']).to_string()
}

/// The text after the last plain `=`; comparison operators such as `<=` or `!=` are not
/// assignments.
fn assigned_value(text: &str) -> &str {
	let bytes = text.as_bytes();

	text.rmatch_indices('=')
		.find(|(idx, _)| {
			let before = idx.checked_sub(1).map(|prev| bytes[prev]);
			let after = bytes.get(idx + 1).copied();

			!matches!(before, Some(b'<' | b'>' | b'!' | b'=')) && after != Some(b'=')
		})
		.map(|(idx, _)| &text[idx + 1..])
		.unwrap_or(text)
}

fn default_feedback(is_correct: bool) -> &'static str {
	if is_correct {
		"Nice work, that's correct!"
	} else {
		"Not quite yet. Take another look at your steps and try again."
	}
}
