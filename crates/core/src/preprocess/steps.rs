//! Step definition discovery and matching.
//!
//! Definition sources are scanned for `Given`/`When`/`Then`/`defineStep`
//! calls whose first argument is a string or regex literal. String
//! arguments are cucumber expressions and are compiled to anchored regexes.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, trace};

use super::feature::ConcreteStep;
use crate::error::{TransformError, UnresolvedStep};

static DEFINE_CALL: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"\b(Given|When|Then|defineStep)\s*\(\s*").expect("step definition call regex"));

/// How a definition was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExpressionKind {
	Cucumber,
	Regex,
}

/// One step definition found in a source file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
	pub keyword: String,
	pub expression: String,
	pub kind: ExpressionKind,
	/// Definition file, relative to the project root
	pub file: PathBuf,
	pub line: usize,
	#[serde(skip)]
	matcher: Regex,
}

impl StepDefinition {
	pub fn matches(&self, text: &str) -> bool {
		self.matcher.is_match(text)
	}

	fn location(&self) -> String {
		format!("{}:{} {:?}", self.file.display(), self.line, self.expression)
	}
}

/// A definition source file and what was found in it.
#[derive(Debug, Clone)]
pub struct DefinitionFile {
	pub path: PathBuf,
	pub source: String,
	pub definitions: Vec<StepDefinition>,
}

/// Expands `{a,b}` alternatives in a glob pattern. Nested groups expand
/// outermost first; a group without a comma is kept literally.
pub fn expand_braces(pattern: &str) -> Vec<String> {
	let Some(open) = pattern.find('{') else {
		return vec![pattern.to_string()];
	};

	let mut depth = 0;
	let mut close = None;
	let mut commas = Vec::new();
	for (i, c) in pattern[open..].char_indices() {
		match c {
			'{' => depth += 1,
			'}' => {
				depth -= 1;
				if depth == 0 {
					close = Some(open + i);
					break;
				}
			}
			',' if depth == 1 => commas.push(open + i),
			_ => {}
		}
	}

	let Some(close) = close else {
		return vec![pattern.to_string()];
	};
	let (prefix, suffix) = (&pattern[..open], &pattern[close + 1..]);
	if commas.is_empty() {
		return expand_braces(suffix)
			.into_iter()
			.map(|rest| format!("{}{rest}", &pattern[..=close]))
			.collect();
	}

	let mut bounds = vec![open];
	bounds.extend(&commas);
	bounds.push(close);
	bounds
		.windows(2)
		.flat_map(|w| expand_braces(&format!("{prefix}{}{suffix}", &pattern[w[0] + 1..w[1]])))
		.collect()
}

/// Compiles a cucumber expression into an anchored regex.
pub fn compile_expression(expression: &str) -> Result<Regex, String> {
	fn flush(out: &mut String, word: &mut String, alternatives: &mut Vec<String>) {
		if alternatives.is_empty() {
			out.push_str(&regex::escape(word));
		} else {
			alternatives.push(std::mem::take(word));
			let alts: Vec<_> = alternatives.drain(..).map(|a| regex::escape(&a)).collect();
			out.push_str(&format!("(?:{})", alts.join("|")));
		}
		word.clear();
	}

	let mut out = String::from("^");
	let mut word = String::new();
	let mut alternatives = Vec::new();
	let mut chars = expression.chars();

	while let Some(c) = chars.next() {
		match c {
			'\\' => match chars.next() {
				Some(escaped) => word.push(escaped),
				None => return Err("trailing backslash".into()),
			},
			'{' => {
				flush(&mut out, &mut word, &mut alternatives);
				let name: String = chars.by_ref().take_while(|c| *c != '}').collect();
				out.push_str(match name.as_str() {
					"string" => r#"("(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*')"#,
					"int" => r"(-?\d+)",
					"float" => r"(-?(?:\d+\.?\d*|\.\d+))",
					"word" => r"([^\s]+)",
					"" => r"(.*)",
					other => return Err(format!("undefined parameter type {{{other}}}")),
				});
			}
			'(' => {
				flush(&mut out, &mut word, &mut alternatives);
				let optional: String = chars.by_ref().take_while(|c| *c != ')').collect();
				out.push_str(&format!("(?:{})?", regex::escape(&optional)));
			}
			'/' => alternatives.push(std::mem::take(&mut word)),
			c if c.is_whitespace() => {
				flush(&mut out, &mut word, &mut alternatives);
				out.push_str(&regex::escape(&c.to_string()));
			}
			c => word.push(c),
		}
	}
	flush(&mut out, &mut word, &mut alternatives);
	out.push('$');

	Regex::new(&out).map_err(|e| e.to_string())
}

fn compile_regex_literal(body: &str, flags: &str) -> Result<Regex, String> {
	let mut prefix = String::new();
	for flag in flags.chars() {
		match flag {
			'i' | 'm' | 's' => prefix.push(flag),
			'g' | 'u' | 'y' | 'd' => {}
			other => return Err(format!("unsupported regex flag {other:?}")),
		}
	}
	let pattern = if prefix.is_empty() { body.to_string() } else { format!("(?{prefix}){body}") };
	Regex::new(&pattern).map_err(|e| e.to_string())
}

/// Reads the literal starting at `rest`: returns (kind, body, flags).
fn read_literal(rest: &str) -> Result<(ExpressionKind, String, String), String> {
	let mut chars = rest.chars();
	let quote = chars.next().ok_or("expected a string or regex literal")?;
	let kind = match quote {
		'"' | '\'' | '`' => ExpressionKind::Cucumber,
		'/' => ExpressionKind::Regex,
		_ => return Err("first argument must be a string or regex literal".into()),
	};

	let mut body = String::new();
	let mut in_class = false;
	loop {
		let Some(c) = chars.next() else {
			return Err("unterminated literal".into());
		};
		match c {
			'\\' => {
				let escaped = chars.next().ok_or("unterminated literal")?;
				if kind == ExpressionKind::Regex || !matches!(escaped, '"' | '\'' | '`') {
					body.push('\\');
				}
				body.push(escaped);
			}
			'\n' if quote != '`' => return Err("unterminated literal".into()),
			'$' if quote == '`' && chars.as_str().starts_with('{') => {
				return Err("template interpolation is not allowed in step expressions".into());
			}
			'[' if kind == ExpressionKind::Regex => {
				in_class = true;
				body.push(c);
			}
			']' if kind == ExpressionKind::Regex => {
				in_class = false;
				body.push(c);
			}
			c if c == quote && !in_class => break,
			c => body.push(c),
		}
	}

	let flags = if kind == ExpressionKind::Regex {
		chars.take_while(|c| c.is_ascii_alphabetic()).collect()
	} else {
		String::new()
	};
	Ok((kind, body, flags))
}

/// Resolves JS string escapes. `\\{` and `\\(` come out as `\{` and `\(`,
/// which the expression compiler treats as literal characters.
fn unescape_js(body: &str) -> String {
	let mut out = String::with_capacity(body.len());
	let mut chars = body.chars();
	while let Some(c) = chars.next() {
		if c != '\\' {
			out.push(c);
			continue;
		}
		match chars.next() {
			Some('n') => out.push('\n'),
			Some('t') => out.push('\t'),
			Some('\\') => out.push('\\'),
			Some(other) => {
				out.push('\\');
				out.push(other);
			}
			None => out.push('\\'),
		}
	}
	out
}

/// Extracts every step definition declared in `source`.
pub fn extract_definitions(file: &Path, source: &str) -> Result<Vec<StepDefinition>, TransformError> {
	let mut out = Vec::new();
	for caps in DEFINE_CALL.captures_iter(source) {
		let (Some(call), Some(keyword)) = (caps.get(0), caps.get(1)) else {
			continue;
		};
		let line = source[..call.start()].matches('\n').count() + 1;
		let invalid = |message: String| TransformError::Definition {
			path: file.to_path_buf(),
			line,
			message,
		};

		let (kind, body, flags) = read_literal(&source[call.end()..]).map_err(invalid)?;
		let (expression, matcher) = match kind {
			ExpressionKind::Cucumber => {
				let expression = unescape_js(&body);
				let matcher = compile_expression(&expression).map_err(invalid)?;
				(expression, matcher)
			}
			ExpressionKind::Regex => {
				let matcher = compile_regex_literal(&body, &flags).map_err(invalid)?;
				(format!("/{body}/{flags}"), matcher)
			}
		};

		trace!(target = "cuke.preprocess", file = %file.display(), line, expression = %expression, "found step definition");
		out.push(StepDefinition {
			keyword: keyword.as_str().to_string(),
			expression,
			kind,
			file: file.to_path_buf(),
			line,
			matcher,
		});
	}
	Ok(out)
}

/// Lists definition files matching `pattern` under `root`, sorted and
/// deduplicated across brace alternatives.
pub fn find_definition_files(root: &Path, pattern: &str) -> Result<Vec<PathBuf>, TransformError> {
	let mut found = BTreeSet::new();
	for alternative in expand_braces(pattern) {
		let full = if Path::new(&alternative).is_absolute() {
			PathBuf::from(&alternative)
		} else {
			root.join(&alternative)
		};
		let full = full.to_string_lossy().into_owned();
		let entries = glob::glob(&full).map_err(|source| TransformError::Pattern {
			pattern: pattern.to_string(),
			source,
		})?;
		for entry in entries {
			let path = entry.map_err(|err| {
				let path = err.path().to_path_buf();
				TransformError::Read { path, source: err.into() }
			})?;
			if path.is_file() {
				found.insert(path);
			}
		}
	}
	debug!(target = "cuke.preprocess", pattern, files = found.len(), "resolved step definition files");
	Ok(found.into_iter().collect())
}

/// Loads and scans every definition file matching `pattern`.
pub async fn load_definitions(root: &Path, pattern: &str) -> Result<Vec<DefinitionFile>, TransformError> {
	let mut files = Vec::new();
	for path in find_definition_files(root, pattern)? {
		let source = tokio::fs::read_to_string(&path)
			.await
			.map_err(|source| TransformError::Read {
				path: path.clone(),
				source,
			})?;
		let display = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
		let definitions = extract_definitions(&display, &source)?;
		files.push(DefinitionFile {
			path: display,
			source,
			definitions,
		});
	}
	Ok(files)
}

/// A feature step and the definition it matched.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedStep {
	pub line: usize,
	pub text: String,
	/// Index into the flattened definition list
	pub definition: usize,
}

/// Matches every step against `definitions`.
///
/// The first step matching more than one definition aborts with
/// [`TransformError::AmbiguousStep`]. Otherwise all unmatched steps are
/// reported together.
pub fn resolve(
	feature_path: &Path,
	steps: &[ConcreteStep],
	definitions: &[&StepDefinition],
) -> Result<Vec<ResolvedStep>, TransformError> {
	let mut resolved = Vec::with_capacity(steps.len());
	let mut unresolved = Vec::new();

	for step in steps {
		let candidates: Vec<usize> = definitions
			.iter()
			.enumerate()
			.filter(|(_, def)| def.matches(&step.text))
			.map(|(i, _)| i)
			.collect();
		match candidates.as_slice() {
			[] => unresolved.push(UnresolvedStep {
				line: step.line,
				text: step.text.clone(),
			}),
			[index] => resolved.push(ResolvedStep {
				line: step.line,
				text: step.text.clone(),
				definition: *index,
			}),
			many => {
				return Err(TransformError::AmbiguousStep {
					path: feature_path.to_path_buf(),
					line: step.line,
					text: step.text.clone(),
					candidates: many.iter().map(|i| definitions[*i].location()).collect(),
				});
			}
		}
	}

	if !unresolved.is_empty() {
		return Err(TransformError::UnresolvedSteps {
			path: feature_path.to_path_buf(),
			steps: unresolved,
		});
	}
	Ok(resolved)
}

#[cfg(test)]
mod tests {
	use std::fs;

	use tempfile::TempDir;

	use super::*;

	fn defs(source: &str) -> Vec<StepDefinition> {
		extract_definitions(Path::new("steps.ts"), source).unwrap()
	}

	#[test]
	fn brace_alternatives_expand() {
		assert_eq!(expand_braces("steps/*.{js,ts}"), vec!["steps/*.js", "steps/*.ts"]);
		assert_eq!(expand_braces("{a,b}/{c,d}.js"), vec!["a/c.js", "a/d.js", "b/c.js", "b/d.js"]);
		assert_eq!(expand_braces("x/{a,{b,c}}.js"), vec!["x/a.js", "x/b.js", "x/c.js"]);
		assert_eq!(expand_braces("plain/*.js"), vec!["plain/*.js"]);
		assert_eq!(expand_braces("odd/{single}.js"), vec!["odd/{single}.js"]);
	}

	#[test]
	fn cucumber_parameters_match() {
		let re = compile_expression("I sign in as {string} with {int} retries").unwrap();
		assert!(re.is_match(r#"I sign in as "ada" with 3 retries"#));
		assert!(re.is_match("I sign in as 'ada' with -1 retries"));
		assert!(!re.is_match("I sign in as ada with 3 retries"));
		assert!(!re.is_match(r#"I sign in as "ada" with 3 retries now"#));

		let re = compile_expression("the total is {float} in {word}").unwrap();
		assert!(re.is_match("the total is 12.50 in EUR"));
		assert!(re.is_match("the total is .5 in EUR"));

		let re = compile_expression("I see {}").unwrap();
		assert!(re.is_match("I see anything at all"));
	}

	#[test]
	fn optional_text_and_alternation() {
		let re = compile_expression("I have {int} cucumber(s) in my belly/stomach").unwrap();
		assert!(re.is_match("I have 1 cucumber in my belly"));
		assert!(re.is_match("I have 4 cucumbers in my stomach"));
		assert!(!re.is_match("I have 4 cucumbers in my head"));
	}

	#[test]
	fn literal_regex_characters_are_escaped() {
		let re = compile_expression("the price is $5.00 (approx) \\{not a param\\}").unwrap();
		assert!(re.is_match("the price is $5.00 approx {not a param}"));
		assert!(re.is_match("the price is $5.00  {not a param}"));
		assert!(!re.is_match("the price is $5X00 approx {not a param}"));
	}

	#[test]
	fn unknown_parameter_type_is_rejected() {
		let err = compile_expression("I pick {color}").unwrap_err();
		assert!(err.contains("{color}"));
	}

	#[test]
	fn extracts_all_literal_forms() {
		let found = defs(
			"import { Given, When, Then } from '@badeball/cypress-cucumber-preprocessor';\n\
			 Given(\"I open the portal\", () => cy.visit('/'));\n\
			 When('I sign in as {string}', (user) => {});\n\
			 Then(`I see {int} notifications`, (n) => {});\n\
			 defineStep(/^the banner reads \"([^\"]*)\"$/i, (t) => {});\n",
		);
		assert_eq!(found.len(), 4);
		assert_eq!(found[0].keyword, "Given");
		assert_eq!(found[0].line, 2);
		assert_eq!(found[3].kind, ExpressionKind::Regex);
		assert!(found[3].matches(r#"THE BANNER READS "hi""#));
		assert!(found[2].matches("I see 2 notifications"));
	}

	#[test]
	fn non_literal_argument_is_a_definition_error() {
		let err = extract_definitions(Path::new("steps.ts"), "\n\nGiven(pattern, () => {});").unwrap_err();
		match err {
			TransformError::Definition { line, .. } => assert_eq!(line, 3),
			other => panic!("unexpected error: {other}"),
		}
	}

	#[test]
	fn interpolated_template_is_rejected() {
		assert!(extract_definitions(Path::new("s.ts"), "Then(`I see ${n}`, () => {})").is_err());
	}

	#[test]
	fn resolve_reports_unresolved_and_ambiguous() {
		let found = defs("Given('I open {}', ()=>{});\nGiven('I open the portal', ()=>{});\nWhen('I wait', ()=>{});");
		let refs: Vec<_> = found.iter().collect();

		let ok = resolve(Path::new("a.feature"), &[ConcreteStep { line: 3, text: "I wait".into() }], &refs).unwrap();
		assert_eq!(ok[0].definition, 2);

		let err = resolve(
			Path::new("a.feature"),
			&[ConcreteStep { line: 5, text: "I open the portal".into() }],
			&refs,
		)
		.unwrap_err();
		assert_eq!(err.code(), "AMBIGUOUS_STEP");

		let err = resolve(
			Path::new("a.feature"),
			&[
				ConcreteStep { line: 4, text: "I fly".into() },
				ConcreteStep { line: 6, text: "I swim".into() },
			],
			&refs,
		)
		.unwrap_err();
		match err {
			TransformError::UnresolvedSteps { steps, .. } => assert_eq!(steps.len(), 2),
			other => panic!("unexpected error: {other}"),
		}
	}

	#[tokio::test]
	async fn loads_definition_files_from_globs() {
		let temp = TempDir::new().unwrap();
		let dir = temp.path().join("cypress/support/stepDefinitions");
		fs::create_dir_all(&dir).unwrap();
		fs::write(dir.join("login.ts"), "Given('I open the portal', () => {});").unwrap();
		fs::write(dir.join("common.js"), "When('I wait {int} ms', () => {});").unwrap();
		fs::write(dir.join("notes.md"), "Given('ignored', () => {});").unwrap();

		let files = load_definitions(temp.path(), "cypress/support/stepDefinitions/*.{js,ts}")
			.await
			.unwrap();
		let names: Vec<_> = files.iter().map(|f| f.path.display().to_string()).collect();
		assert_eq!(
			names,
			vec![
				"cypress/support/stepDefinitions/common.js",
				"cypress/support/stepDefinitions/login.ts",
			]
		);
		assert_eq!(files[1].definitions[0].file, PathBuf::from("cypress/support/stepDefinitions/login.ts"));
	}
}
