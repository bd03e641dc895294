//! Line scanner for Gherkin feature files.
//!
//! Only the structure step resolution needs is recovered: scenario blocks,
//! their steps, and outline example tables. Descriptions, doc strings and
//! step data tables are skipped.

use serde::Serialize;

/// Parsed feature file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Feature {
	pub name: String,
	pub tags: Vec<String>,
	pub scenarios: Vec<Scenario>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScenarioKind {
	Background,
	Scenario,
	Outline,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scenario {
	pub kind: ScenarioKind,
	pub name: String,
	pub line: usize,
	pub tags: Vec<String>,
	pub steps: Vec<Step>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub examples: Vec<Examples>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
	pub line: usize,
	pub keyword: String,
	pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Examples {
	pub line: usize,
	pub header: Vec<String>,
	pub rows: Vec<ExampleRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExampleRow {
	pub line: usize,
	pub cells: Vec<String>,
}

/// A step with outline placeholders filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteStep {
	pub line: usize,
	pub text: String,
}

/// Scanner failure, positioned at a 1-based line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanError {
	pub line: usize,
	pub message: String,
}

const STEP_KEYWORDS: [&str; 6] = ["Given ", "When ", "Then ", "And ", "But ", "* "];
const BACKGROUND: [&str; 1] = ["Background:"];
const OUTLINE: [&str; 2] = ["Scenario Outline:", "Scenario Template:"];
const SCENARIO: [&str; 2] = ["Scenario:", "Example:"];
const EXAMPLES: [&str; 2] = ["Examples:", "Scenarios:"];

fn strip_keyword<'a>(line: &'a str, keywords: &[&str]) -> Option<&'a str> {
	keywords.iter().find_map(|kw| line.strip_prefix(kw)).map(str::trim)
}

fn parse_row(line: &str) -> Vec<String> {
	let inner = line.trim().trim_start_matches('|');
	let inner = inner.strip_suffix('|').unwrap_or(inner);
	let mut cells = Vec::new();
	let mut cell = String::new();
	let mut chars = inner.chars();
	while let Some(c) = chars.next() {
		match c {
			'\\' => match chars.next() {
				Some('|') => cell.push('|'),
				Some('n') => cell.push('\n'),
				Some(other) => {
					cell.push('\\');
					cell.push(other);
				}
				None => cell.push('\\'),
			},
			'|' => cells.push(std::mem::take(&mut cell).trim().to_string()),
			c => cell.push(c),
		}
	}
	cells.push(cell.trim().to_string());
	cells
}

/// Scans `source` into a [`Feature`].
pub fn parse(source: &str) -> Result<Feature, ScanError> {
	let mut feature = Feature::default();
	let mut pending_tags: Vec<String> = Vec::new();
	let mut in_examples = false;
	let mut doc_string: Option<(&str, usize)> = None;

	for (index, raw) in source.lines().enumerate() {
		let line_no = index + 1;
		let line = raw.trim();

		if let Some((fence, _)) = doc_string {
			if line.starts_with(fence) {
				doc_string = None;
			}
			continue;
		}
		if line.is_empty() || line.starts_with('#') {
			continue;
		}
		if line.starts_with("\"\"\"") || line.starts_with("```") {
			doc_string = Some((&line[..3], line_no));
			continue;
		}
		if line.starts_with('@') {
			pending_tags.extend(line.split_whitespace().take_while(|t| !t.starts_with('#')).map(String::from));
			continue;
		}

		if let Some(name) = line.strip_prefix("Feature:") {
			feature.name = name.trim().to_string();
			feature.tags = std::mem::take(&mut pending_tags);
			continue;
		}
		if line.starts_with("Rule:") {
			pending_tags.clear();
			in_examples = false;
			continue;
		}

		let block = if let Some(name) = strip_keyword(line, &BACKGROUND) {
			Some((ScenarioKind::Background, name))
		} else if let Some(name) = strip_keyword(line, &OUTLINE) {
			Some((ScenarioKind::Outline, name))
		} else {
			strip_keyword(line, &SCENARIO).map(|name| (ScenarioKind::Scenario, name))
		};
		if let Some((kind, name)) = block {
			feature.scenarios.push(Scenario {
				kind,
				name: name.to_string(),
				line: line_no,
				tags: std::mem::take(&mut pending_tags),
				steps: Vec::new(),
				examples: Vec::new(),
			});
			in_examples = false;
			continue;
		}

		if strip_keyword(line, &EXAMPLES).is_some() {
			pending_tags.clear();
			let Some(scenario) = feature.scenarios.last_mut().filter(|s| s.kind == ScenarioKind::Outline) else {
				return Err(ScanError {
					line: line_no,
					message: "Examples outside a Scenario Outline".into(),
				});
			};
			scenario.examples.push(Examples {
				line: line_no,
				header: Vec::new(),
				rows: Vec::new(),
			});
			in_examples = true;
			continue;
		}

		if line.starts_with('|') {
			if !in_examples {
				continue;
			}
			let Some(examples) = feature.scenarios.last_mut().and_then(|s| s.examples.last_mut()) else {
				continue;
			};
			let cells = parse_row(line);
			if examples.header.is_empty() {
				examples.header = cells;
			} else if cells.len() != examples.header.len() {
				return Err(ScanError {
					line: line_no,
					message: format!("example row has {} cells, header has {}", cells.len(), examples.header.len()),
				});
			} else {
				examples.rows.push(ExampleRow { line: line_no, cells });
			}
			continue;
		}

		if let Some(keyword) = STEP_KEYWORDS.iter().find(|kw| line.starts_with(**kw)) {
			if let Some(scenario) = feature.scenarios.last_mut() {
				scenario.steps.push(Step {
					line: line_no,
					keyword: keyword.trim().to_string(),
					text: line[keyword.len()..].trim().to_string(),
				});
				in_examples = false;
			}
		}
	}

	if let Some((fence, line)) = doc_string {
		return Err(ScanError {
			line,
			message: format!("unterminated doc string (missing closing {fence})"),
		});
	}
	Ok(feature)
}

impl Scenario {
	/// Steps as they run: outline steps once per example row with
	/// `<placeholder>` replaced by the row's cell.
	pub fn concrete_steps(&self) -> Vec<ConcreteStep> {
		if self.kind != ScenarioKind::Outline {
			return self
				.steps
				.iter()
				.map(|step| ConcreteStep {
					line: step.line,
					text: step.text.clone(),
				})
				.collect();
		}

		let mut out = Vec::new();
		for examples in &self.examples {
			for row in &examples.rows {
				for step in &self.steps {
					let mut text = step.text.clone();
					for (name, value) in examples.header.iter().zip(&row.cells) {
						text = text.replace(&format!("<{name}>"), value);
					}
					out.push(ConcreteStep { line: step.line, text });
				}
			}
		}
		out
	}
}

impl Feature {
	/// Every concrete step in file order, duplicates removed.
	pub fn concrete_steps(&self) -> Vec<ConcreteStep> {
		let mut out: Vec<ConcreteStep> = Vec::new();
		for step in self.scenarios.iter().flat_map(Scenario::concrete_steps) {
			if !out.contains(&step) {
				out.push(step);
			}
		}
		out
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const LOGIN: &str = r#"@smoke
Feature: Login
  Users sign in with their portal account.

  Background:
    Given I open the portal

  @happy
  Scenario: Valid credentials
    When I sign in as "ada"
    Then I see 3 notifications
    And the banner reads:
      """
      Given this is not a step
      """

  Scenario Outline: Roles
    When I sign in as "<user>"
    Then I see <count> notifications
      | ignored | table |

    Examples:
      | user  | count |
      | grace | 1     |
      | linus | 0     |
"#;

	#[test]
	fn scans_blocks_and_steps() {
		let feature = parse(LOGIN).unwrap();
		assert_eq!(feature.name, "Login");
		assert_eq!(feature.tags, vec!["@smoke"]);
		assert_eq!(feature.scenarios.len(), 3);

		let background = &feature.scenarios[0];
		assert_eq!(background.kind, ScenarioKind::Background);
		assert_eq!(background.steps[0].text, "I open the portal");

		let valid = &feature.scenarios[1];
		assert_eq!(valid.tags, vec!["@happy"]);
		assert_eq!(valid.steps.len(), 3);
		assert_eq!(valid.steps[2].keyword, "And");
		assert_eq!(valid.steps[1].line, 11);
	}

	#[test]
	fn outline_steps_are_expanded_per_row() {
		let feature = parse(LOGIN).unwrap();
		let outline = &feature.scenarios[2];
		assert_eq!(outline.examples[0].header, vec!["user", "count"]);
		assert_eq!(outline.examples[0].rows.len(), 2);

		let texts: Vec<_> = outline.concrete_steps().into_iter().map(|s| s.text).collect();
		assert_eq!(
			texts,
			vec![
				"I sign in as \"grace\"",
				"I see 1 notifications",
				"I sign in as \"linus\"",
				"I see 0 notifications",
			]
		);
	}

	#[test]
	fn doc_string_contents_are_not_steps() {
		let feature = parse(LOGIN).unwrap();
		assert!(feature
			.concrete_steps()
			.iter()
			.all(|s| s.text != "this is not a step"));
	}

	#[test]
	fn unterminated_doc_string_is_an_error() {
		let err = parse("Feature: x\n  Scenario: y\n    Given a\n      \"\"\"\n      text\n").unwrap_err();
		assert_eq!(err.line, 4);
	}

	#[test]
	fn ragged_example_row_is_an_error() {
		let src = "Feature: x\nScenario Outline: y\n  Given <a>\n  Examples:\n    | a | b |\n    | 1 |\n";
		let err = parse(src).unwrap_err();
		assert_eq!(err.line, 6);
	}

	#[test]
	fn examples_without_outline_is_an_error() {
		let err = parse("Feature: x\nScenario: y\n  Given a\n  Examples:\n").unwrap_err();
		assert_eq!(err.line, 4);
	}

	#[test]
	fn escaped_pipes_stay_in_cells() {
		assert_eq!(parse_row(r"| a \| b | c |"), vec!["a | b", "c"]);
	}
}
