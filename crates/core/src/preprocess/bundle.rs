//! Final bundling stage: syntax check, compile-time defines, IIFE output.

use std::ops::Range;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::debug;

use super::lower::lower;
use super::{Module, Plugin, Unit};
use crate::error::TransformError;

/// Output language level stamped on every bundle.
pub const TARGET: &str = "es2018";

/// Concatenates a unit's modules into one IIFE.
#[derive(Debug, Clone)]
pub struct Bundler {
	target: &'static str,
	defines: IndexMap<String, String>,
	root: PathBuf,
}

impl Default for Bundler {
	fn default() -> Self {
		let mut defines = IndexMap::new();
		defines.insert("process.env.NODE_ENV".to_string(), "\"test\"".to_string());
		Self {
			target: TARGET,
			defines,
			root: PathBuf::new(),
		}
	}
}

impl Bundler {
	pub fn new() -> Self {
		Self::default()
	}

	/// Module banners name paths relative to `root`.
	pub fn relative_to(mut self, root: &Path) -> Self {
		self.root = root.to_path_buf();
		self
	}

	fn emit(&self, module: &Module, out: &mut String) -> Result<(), TransformError> {
		let syntax = |err: SyntaxError| TransformError::Syntax {
			path: module.path.clone(),
			line: err.line,
			column: err.column,
			message: err.message,
		};
		let inert = scan(&module.source).map_err(syntax)?;
		let lowered = lower(&module.path, &module.source, &inert).map_err(syntax)?;
		let inert = scan(&lowered).map_err(syntax)?;

		let mut code = lowered;
		for (name, replacement) in &self.defines {
			code = apply_define(&code, name, replacement, &inert);
		}

		let banner = module.path.strip_prefix(&self.root).unwrap_or(&module.path);
		out.push_str(&format!("// {}\n", banner.display()));
		out.push_str(code.trim_end());
		out.push('\n');
		Ok(())
	}
}

#[async_trait]
impl Plugin for Bundler {
	fn name(&self) -> &'static str {
		"bundle"
	}

	async fn transform(&self, unit: Unit) -> Result<Unit, TransformError> {
		let mut out = format!("/* target: {}, format: iife */\n(function () {{\n", self.target);
		for module in &unit.dependencies {
			self.emit(module, &mut out)?;
		}
		let entry = Module {
			path: unit.path.clone(),
			source: unit.source,
		};
		self.emit(&entry, &mut out)?;
		out.push_str("})();\n");

		debug!(target = "cuke.preprocess", path = %unit.path.display(), modules = unit.dependencies.len() + 1, bytes = out.len(), "bundled");
		Ok(Unit {
			path: unit.path,
			source: out,
			dependencies: Vec::new(),
		})
	}
}

/// Replaces `name` with `replacement` where it appears as a whole
/// expression in code, skipping the `inert` string and comment spans.
fn apply_define(code: &str, name: &str, replacement: &str, inert: &[Range<usize>]) -> String {
	let mut out = String::with_capacity(code.len());
	let mut last = 0;

	for (start, _) in code.match_indices(name) {
		let end = start + name.len();
		if start < last || inert.iter().any(|span| span.contains(&start)) {
			continue;
		}
		let before = code[..start].chars().next_back();
		let after = code[end..].chars().next();
		if before.is_some_and(|c| is_ident(c) || c == '.') || after.is_some_and(is_ident) {
			continue;
		}
		out.push_str(&code[last..start]);
		out.push_str(replacement);
		last = end;
	}
	out.push_str(&code[last..]);
	out
}

/// Position of a source error, 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
	pub line: usize,
	pub column: usize,
	pub message: String,
}

#[derive(Clone, Copy)]
enum Open {
	/// `(`, `[`, `{` with their position
	Delim(char, usize, usize),
	/// `${` inside a template literal
	Interpolation,
}

struct Cursor<'a> {
	src: &'a str,
	pos: usize,
	line: usize,
	column: usize,
}

impl Cursor<'_> {
	fn peek(&self) -> Option<char> {
		self.src[self.pos..].chars().next()
	}

	fn peek2(&self) -> Option<char> {
		let mut chars = self.src[self.pos..].chars();
		chars.next();
		chars.next()
	}

	fn bump(&mut self) -> Option<char> {
		let c = self.peek()?;
		self.pos += c.len_utf8();
		if c == '\n' {
			self.line += 1;
			self.column = 1;
		} else {
			self.column += 1;
		}
		Some(c)
	}

	fn error(line: usize, column: usize, message: impl Into<String>) -> SyntaxError {
		SyntaxError {
			line,
			column,
			message: message.into(),
		}
	}
}

pub(super) fn is_ident(c: char) -> bool {
	c.is_alphanumeric() || c == '_' || c == '$'
}

/// Whether a `/` after `prev` starts a regex literal rather than division.
fn regex_allowed(prev: Option<char>, prev_word: &str) -> bool {
	match prev {
		None => true,
		Some(c) if is_ident(c) => {
			matches!(prev_word, "return" | "typeof" | "case" | "do" | "else" | "in" | "of" | "new" | "delete" | "void" | "throw")
		}
		Some(')' | ']' | '}' | '"' | '\'' | '`') => false,
		Some(_) => true,
	}
}

/// Checks delimiter balance and literal termination.
///
/// Returns the byte spans of strings, template text, regex literals and
/// comments: everything that is not code. A template piece span includes
/// the `${` or `}` that delimits it.
pub fn scan(src: &str) -> Result<Vec<Range<usize>>, SyntaxError> {
	let mut cur = Cursor {
		src,
		pos: 0,
		line: 1,
		column: 1,
	};
	let mut stack: Vec<Open> = Vec::new();
	let mut inert = Vec::new();
	let mut prev: Option<char> = None;
	let mut prev_word = String::new();
	let mut gap = false;
	let mut resume_template = None;

	loop {
		if let Some(start) = resume_template.take() {
			let (line, column) = (cur.line, cur.column);
			if scan_template(&mut cur, line, column)? {
				stack.push(Open::Interpolation);
			}
			inert.push(start..cur.pos);
			prev = Some('`');
			continue;
		}

		let Some(c) = cur.peek() else { break };
		let (line, column, start) = (cur.line, cur.column, cur.pos);

		match c {
			'/' if cur.peek2() == Some('/') => {
				while cur.peek().is_some_and(|c| c != '\n') {
					cur.bump();
				}
				inert.push(start..cur.pos);
				gap = true;
				continue;
			}
			'/' if cur.peek2() == Some('*') => {
				cur.bump();
				cur.bump();
				loop {
					match cur.bump() {
						Some('*') if cur.peek() == Some('/') => {
							cur.bump();
							break;
						}
						Some(_) => {}
						None => return Err(Cursor::error(line, column, "unterminated block comment")),
					}
				}
				inert.push(start..cur.pos);
				gap = true;
				continue;
			}
			'/' if regex_allowed(prev, &prev_word) => {
				cur.bump();
				let mut in_class = false;
				loop {
					match cur.bump() {
						Some('\\') => {
							cur.bump();
						}
						Some('[') => in_class = true,
						Some(']') => in_class = false,
						Some('/') if !in_class => break,
						Some('\n') | None => return Err(Cursor::error(line, column, "unterminated regular expression")),
						Some(_) => {}
					}
				}
				while cur.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
					cur.bump();
				}
				inert.push(start..cur.pos);
				prev = Some('/');
				prev_word.clear();
				continue;
			}
			'"' | '\'' => {
				cur.bump();
				loop {
					match cur.bump() {
						Some('\\') => {
							cur.bump();
						}
						Some(q) if q == c => break,
						Some('\n') | None => return Err(Cursor::error(line, column, "unterminated string literal")),
						Some(_) => {}
					}
				}
				inert.push(start..cur.pos);
				prev = Some(c);
				prev_word.clear();
				continue;
			}
			'`' => {
				cur.bump();
				if scan_template(&mut cur, line, column)? {
					stack.push(Open::Interpolation);
				}
				inert.push(start..cur.pos);
				prev = Some('`');
				prev_word.clear();
				continue;
			}
			'(' | '[' | '{' => stack.push(Open::Delim(c, line, column)),
			')' | ']' | '}' => match stack.pop() {
				Some(Open::Interpolation) if c == '}' => {
					cur.bump();
					resume_template = Some(start);
					continue;
				}
				Some(Open::Delim(open, ..)) if closer(open) == c => {}
				Some(Open::Delim(open, open_line, open_column)) => {
					return Err(Cursor::error(
						line,
						column,
						format!("expected `{}` to close `{open}` at {open_line}:{open_column}, found `{c}`", closer(open)),
					));
				}
				Some(Open::Interpolation) => {
					return Err(Cursor::error(line, column, format!("expected `}}` to close template interpolation, found `{c}`")));
				}
				None => return Err(Cursor::error(line, column, format!("unexpected `{c}`"))),
			},
			_ => {}
		}

		cur.bump();
		if is_ident(c) {
			if gap || !prev.is_some_and(is_ident) {
				prev_word.clear();
			}
			prev_word.push(c);
			prev = Some(c);
			gap = false;
		} else if c.is_whitespace() {
			gap = true;
		} else {
			prev = Some(c);
			prev_word.clear();
			gap = false;
		}
	}

	match stack.pop() {
		Some(Open::Delim(open, line, column)) => Err(Cursor::error(line, column, format!("unclosed `{open}`"))),
		Some(Open::Interpolation) => Err(Cursor::error(cur.line, cur.column, "unclosed template interpolation")),
		None => Ok(inert),
	}
}

/// Consumes template text up to the closing backtick (`false`) or the
/// next `${` (`true`).
fn scan_template(cur: &mut Cursor<'_>, line: usize, column: usize) -> Result<bool, SyntaxError> {
	loop {
		match cur.bump() {
			Some('\\') => {
				cur.bump();
			}
			Some('`') => return Ok(false),
			Some('$') if cur.peek() == Some('{') => {
				cur.bump();
				return Ok(true);
			}
			Some(_) => {}
			None => return Err(Cursor::error(line, column, "unterminated template literal")),
		}
	}
}

fn closer(open: char) -> char {
	match open {
		'(' => ')',
		'[' => ']',
		_ => '}',
	}
}

#[cfg(test)]
mod tests {
	use std::path::PathBuf;

	use super::*;

	fn unit(path: &str, source: &str) -> Unit {
		Unit {
			path: PathBuf::from(path),
			source: source.to_string(),
			dependencies: Vec::new(),
		}
	}

	#[test]
	fn balanced_source_passes() {
		let src = r#"
const re = /[(]{2}\//g;
const s = "a ) string";
const t = `tpl ${ fn({ a: [1, 2] }) } and ${'}'} end`;
/* { unclosed in comment */
// ) also fine
if (a / b > 1) { call(c); }
"#;
		assert!(scan(src).is_ok());
	}

	#[test]
	fn reports_position_of_unclosed_delimiter() {
		let err = scan("function f() {\n  if (x) {\n    y();\n}\n").unwrap_err();
		assert_eq!((err.line, err.column), (1, 14));
		assert!(err.message.contains("unclosed `{`"));
	}

	#[test]
	fn reports_mismatched_closer() {
		let err = scan("call(a, [b);").unwrap_err();
		assert_eq!((err.line, err.column), (1, 11));
		assert!(err.message.contains("to close `[` at 1:9"));
	}

	#[test]
	fn reports_unterminated_string() {
		let err = scan("const a = 1;\nconst b = 'oops;\n").unwrap_err();
		assert_eq!((err.line, err.column), (2, 11));
		assert_eq!(err.message, "unterminated string literal");
	}

	#[test]
	fn define_replaced_only_in_code() {
		let src = "if (process.env.NODE_ENV === 'test') {}\nlog('process.env.NODE_ENV');\nmyprocess.env.NODE_ENV;\nprocess.env.NODE_ENV_X;\n// process.env.NODE_ENV\n";
		let inert = scan(src).unwrap();
		let out = apply_define(src, "process.env.NODE_ENV", "\"test\"", &inert);
		assert_eq!(
			out,
			"if (\"test\" === 'test') {}\nlog('process.env.NODE_ENV');\nmyprocess.env.NODE_ENV;\nprocess.env.NODE_ENV_X;\n// process.env.NODE_ENV\n"
		);
	}

	#[tokio::test]
	async fn bundles_dependencies_before_entry() {
		let mut input = unit("cypress/e2e/login.feature", "register(process.env.NODE_ENV);");
		input.dependencies.push(Module {
			path: PathBuf::from("steps/login.ts"),
			source: "Given('x', () => {});\n".into(),
		});

		let out = Bundler::new().transform(input).await.unwrap();
		assert!(out.dependencies.is_empty());
		assert!(out.source.starts_with("/* target: es2018, format: iife */\n(function () {\n"));
		assert!(out.source.ends_with("})();\n"));
		let steps = out.source.find("// steps/login.ts").unwrap();
		let entry = out.source.find("// cypress/e2e/login.feature").unwrap();
		assert!(steps < entry);
		assert!(out.source.contains("register(\"test\");"));
	}

	#[tokio::test]
	async fn banners_are_relative_to_the_root() {
		let mut input = unit("/work/app/cypress/e2e/a.cy.js", "ok();");
		input.dependencies.push(Module {
			path: PathBuf::from("/elsewhere/b.js"),
			source: "b();".into(),
		});
		let out = Bundler::new().relative_to(Path::new("/work/app")).transform(input).await.unwrap();
		assert!(out.source.contains("\n// cypress/e2e/a.cy.js\n"));
		assert!(out.source.contains("\n// /elsewhere/b.js\n"));
	}

	#[tokio::test]
	async fn typescript_modules_are_lowered() {
		let mut input = unit("cypress/e2e/a.feature", "register();");
		input.dependencies.push(Module {
			path: PathBuf::from("steps/portal.ts"),
			source: concat!(
				"import { Given } from '@badeball/cypress-cucumber-preprocessor';\n",
				"export const home: string = `/${process.env.NODE_ENV}`;\n",
				"Given('I open the portal', (): void => cy.visit(home));\n",
			)
			.into(),
		});

		let out = Bundler::new().transform(input).await.unwrap();
		assert!(out.source.contains("const { Given } = globalThis;\nconst home = `/${\"test\"}`;\n"));
		assert!(out.source.contains("Given('I open the portal', () => cy.visit(home));"));
	}

	#[tokio::test]
	async fn unsupported_typescript_is_a_syntax_error() {
		let mut input = unit("a.feature", "register();");
		input.dependencies.push(Module {
			path: PathBuf::from("steps/roles.ts"),
			source: "export enum Role { Admin }\n".into(),
		});
		let err = Bundler::new().transform(input).await.unwrap_err();
		assert_eq!(err.code(), "SYNTAX_ERROR");
		assert!(matches!(err, TransformError::Syntax { line: 1, column: 8, .. }));
	}

	/// Runs the bundle with a stub step API to show it is plain script.
	#[tokio::test]
	#[ignore = "requires node on PATH"]
	async fn lowered_bundle_runs_under_node() {
		let mut input = unit("cypress/e2e/a.feature", "globalThis.registered = true;");
		input.dependencies.push(Module {
			path: PathBuf::from("steps/portal.ts"),
			source: concat!(
				"import { Given, When as AndWhen } from '@badeball/cypress-cucumber-preprocessor';\n",
				"import type { Options } from './types';\n",
				"interface Visit { path: string }\n",
				"export function open(url: string, opts?: Options): Visit { return { path: url }; }\n",
				"Given('I open {string}', (url: string): void => { open(url)!.path; });\n",
				"AndWhen('I wait', async (ms: number = 10) => ms as number);\n",
			)
			.into(),
		});
		let out = Bundler::new().transform(input).await.unwrap();

		let temp = tempfile::TempDir::new().unwrap();
		let script = temp.path().join("bundle.js");
		let stub = "globalThis.steps = []; globalThis.Given = globalThis.When = (text) => steps.push(text);\n";
		std::fs::write(&script, format!("{stub}{}if (steps.length !== 2 || !registered) process.exit(3);\n", out.source)).unwrap();

		let status = tokio::process::Command::new("node").arg(&script).status().await.unwrap();
		assert!(status.success(), "node rejected the bundle:\n{}", out.source);
	}

	#[tokio::test]
	async fn syntax_error_names_the_module() {
		let mut input = unit("spec.cy.ts", "ok();");
		input.dependencies.push(Module {
			path: PathBuf::from("steps/broken.ts"),
			source: "Given('x', () => {\n".into(),
		});
		let err = Bundler::new().transform(input).await.unwrap_err();
		match err {
			TransformError::Syntax { path, line, column, .. } => {
				assert_eq!(path, PathBuf::from("steps/broken.ts"));
				assert_eq!((line, column), (1, 18));
			}
			other => panic!("unexpected error: {other}"),
		}
	}
}
