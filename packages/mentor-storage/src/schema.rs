pub fn render_schema() -> String {
	expand_includes(include_str!("../../../sql/init.sql"))
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"tables/001_conversation_turns.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_conversation_turns.sql")),
				"tables/002_session_summaries.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_session_summaries.sql")),
				"tables/003_understanding_snapshots.sql" => out
					.push_str(include_str!("../../../sql/tables/003_understanding_snapshots.sql")),
				"tables/004_practice_problems.sql" =>
					out.push_str(include_str!("../../../sql/tables/004_practice_problems.sql")),
				"tables/005_escalation_events.sql" =>
					out.push_str(include_str!("../../../sql/tables/005_escalation_events.sql")),
				_ => {},
			}

			out.push('\n');

			continue;
		}

		out.push_str(line);
		out.push('\n');
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn includes_every_table() {
		let sql = render_schema();

		for table in [
			"conversation_turns",
			"session_summaries",
			"understanding_snapshots",
			"practice_problems",
			"escalation_events",
		] {
			assert!(sql.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")), "{table}");
		}

		assert!(!sql.contains("\\ir"));
	}
}
