//! Lowers module syntax and TypeScript annotations to plain script code.
//!
//! The bundle is one IIFE with no module loader, so `import`/`export`
//! declarations cannot survive into it. Named and namespace imports bind to
//! `globalThis`, where the runner installs its step API. Type-only syntax in
//! `.ts` files is erased. Constructs that would need real compilation fail
//! with a [`SyntaxError`] at their position instead of producing a bundle
//! that does not run.

use std::ops::Range;
use std::path::Path;

use super::bundle::{SyntaxError, is_ident};

/// Extensions whose modules get type erasure.
const TYPESCRIPT: [&str; 4] = ["ts", "tsx", "mts", "cts"];

/// Declarations with runtime semantics that erasure cannot express.
const UNSUPPORTED: [&str; 3] = ["enum", "namespace", "declare"];

/// Words after which `(` opens a condition, not a parameter list.
const CONTROL: [&str; 8] = ["if", "for", "while", "switch", "return", "typeof", "await", "with"];

pub(super) fn is_typescript(path: &Path) -> bool {
	path.extension()
		.and_then(|ext| ext.to_str())
		.is_some_and(|ext| TYPESCRIPT.contains(&ext))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
	Word,
	Punct,
	/// String, template piece or regex literal
	Literal,
}

#[derive(Debug, Clone)]
struct Token<'a> {
	kind: Kind,
	text: &'a str,
	span: Range<usize>,
	/// A line break separates this token from the previous one
	line_start: bool,
}

/// Splits the code parts of `src` into tokens; `inert` spans become single
/// literal tokens and comments are dropped.
fn tokenize<'a>(src: &'a str, inert: &[Range<usize>]) -> Vec<Token<'a>> {
	let mut tokens = Vec::new();
	let mut spans = inert.iter().peekable();
	let mut pos = 0;
	let mut line_start = true;

	while pos < src.len() {
		if let Some(span) = spans.next_if(|span| span.start == pos) {
			let text = &src[span.clone()];
			if text.starts_with("//") || text.starts_with("/*") {
				line_start |= text.contains('\n');
			} else {
				tokens.push(Token {
					kind: Kind::Literal,
					text,
					span: span.clone(),
					line_start,
				});
				line_start = false;
			}
			pos = span.end;
			continue;
		}

		let Some(c) = src[pos..].chars().next() else { break };
		if c.is_whitespace() {
			line_start |= c == '\n';
			pos += c.len_utf8();
			continue;
		}

		let start = pos;
		let kind = if is_ident(c) {
			pos += src[pos..].find(|c: char| !is_ident(c)).unwrap_or(src.len() - pos);
			Kind::Word
		} else {
			pos += if src[pos..].starts_with("=>") { 2 } else { c.len_utf8() };
			Kind::Punct
		};
		tokens.push(Token {
			kind,
			text: &src[start..pos],
			span: start..pos,
			line_start,
		});
		line_start = false;
	}
	tokens
}

/// Rewrites `src` so it can run inside the bundle IIFE.
pub(super) fn lower(path: &Path, src: &str, inert: &[Range<usize>]) -> Result<String, SyntaxError> {
	let tokens = tokenize(src, inert);
	let pairs = pair_delimiters(&tokens);
	let mut lowering = Lowering {
		src,
		tokens,
		pairs,
		typescript: is_typescript(path),
		edits: Vec::new(),
	};
	lowering.run()?;
	Ok(lowering.apply())
}

/// For every opening `(`, `[` or `{` token, the index of its closer.
fn pair_delimiters(tokens: &[Token<'_>]) -> Vec<Option<usize>> {
	let mut pairs = vec![None; tokens.len()];
	let mut stack = Vec::new();
	for (i, token) in tokens.iter().enumerate() {
		match token.text {
			"(" | "[" | "{" if token.kind == Kind::Punct => stack.push(i),
			")" | "]" | "}" if token.kind == Kind::Punct => {
				if let Some(open) = stack.pop() {
					pairs[open] = Some(i);
				}
			}
			_ => {}
		}
	}
	pairs
}

struct Lowering<'a> {
	src: &'a str,
	tokens: Vec<Token<'a>>,
	pairs: Vec<Option<usize>>,
	typescript: bool,
	edits: Vec<(Range<usize>, String)>,
}

impl<'a> Lowering<'a> {
	fn text(&self, i: usize) -> &'a str {
		self.tokens.get(i).map_or("", |t| if t.kind == Kind::Literal { "" } else { t.text })
	}

	fn kind(&self, i: usize) -> Option<Kind> {
		self.tokens.get(i).map(|t| t.kind)
	}

	fn start(&self, i: usize) -> usize {
		self.tokens.get(i).map_or(self.src.len(), |t| t.span.start)
	}

	/// End of the last token before index `i`.
	fn end_before(&self, i: usize) -> usize {
		match i.checked_sub(1).and_then(|prev| self.tokens.get(prev)) {
			Some(t) => t.span.end,
			None => 0,
		}
	}

	fn closer(&self, i: usize) -> Option<usize> {
		self.pairs.get(i).copied().flatten()
	}

	fn error(&self, i: usize, message: String) -> SyntaxError {
		let offset = self.start(i);
		let before = &self.src[..offset];
		let line = before.matches('\n').count() + 1;
		let column = before.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
		SyntaxError { line, column, message }
	}

	fn statement_start(&self, i: usize) -> bool {
		i == 0 || self.tokens[i].line_start || matches!(self.text(i - 1), ";" | "{" | "}" | "export")
	}

	/// Whether the token before `i` can end an expression.
	fn after_expression(&self, i: usize) -> bool {
		let Some(prev) = i.checked_sub(1) else { return false };
		match self.kind(prev) {
			Some(Kind::Literal) => true,
			Some(Kind::Word) => !CONTROL.contains(&self.text(prev)),
			Some(Kind::Punct) => matches!(self.text(prev), ")" | "]"),
			None => false,
		}
	}

	fn remove(&mut self, range: Range<usize>) {
		self.replace(range, String::new());
	}

	fn replace(&mut self, range: Range<usize>, with: String) {
		self.edits.push((range, with));
	}

	/// Index just past an optional `;` at `i`.
	fn past_semicolon(&self, i: usize) -> usize {
		if self.text(i) == ";" { i + 1 } else { i }
	}

	fn run(&mut self) -> Result<(), SyntaxError> {
		let mut i = 0;
		while i < self.tokens.len() {
			let keyword = self.kind(i) == Some(Kind::Word) && self.statement_start(i);
			i = match self.text(i) {
				"import" if keyword && !matches!(self.text(i + 1), "(" | ".") => self.import(i)?,
				"export" if keyword => self.export(i),
				_ if self.typescript => self.erase(i)?,
				_ => i + 1,
			};
		}
		Ok(())
	}

	fn apply(mut self) -> String {
		self.edits.sort_by_key(|(range, _)| range.start);
		let mut out = String::with_capacity(self.src.len());
		let mut last = 0;
		for (range, with) in &self.edits {
			// Edits nested in an already erased range are covered by it.
			if range.start < last {
				continue;
			}
			out.push_str(&self.src[last..range.start]);
			out.push_str(with);
			last = range.end;
		}
		out.push_str(&self.src[last..]);
		out
	}

	/// Lowers the import declaration starting at `i`; returns the index after it.
	fn import(&mut self, i: usize) -> Result<usize, SyntaxError> {
		let mut j = i + 1;
		let type_only = self.typescript && self.text(j) == "type" && !matches!(self.text(j + 1), "from" | ",");
		if type_only {
			j += 1;
		}

		let mut bindings = Vec::new();
		if self.kind(j) != Some(Kind::Literal) {
			if self.kind(j) == Some(Kind::Word) && self.text(j) != "from" {
				if !type_only {
					return Err(self.error(
						j,
						format!("default import `{}` needs module resolution, which the bundle does not do", self.text(j)),
					));
				}
				j += 1;
				if self.text(j) == "," {
					j += 1;
				}
			}
			match self.text(j) {
				"*" if self.text(j + 1) == "as" => {
					bindings.push(Binding::Namespace(self.text(j + 2)));
					j += 3;
				}
				"{" => {
					let close = self.closer(j).ok_or_else(|| self.error(j, "unclosed import list".into()))?;
					bindings.extend(self.specifiers(j + 1, close));
					j = close + 1;
				}
				_ => {}
			}
			if self.text(j) != "from" {
				return Err(self.error(j, "expected `from` in import declaration".into()));
			}
			j += 1;
		}
		if self.kind(j) != Some(Kind::Literal) {
			return Err(self.error(j, "expected a module specifier string".into()));
		}
		let end = self.past_semicolon(j + 1);

		let replacement = if type_only { String::new() } else { import_binding(&bindings) };
		self.replace(self.start(i)..self.end_before(end), replacement);
		Ok(end)
	}

	/// Value specifiers between braces; type-only ones are dropped.
	fn specifiers(&self, from: usize, to: usize) -> Vec<Binding<'a>> {
		let mut out = Vec::new();
		let mut j = from;
		while j < to {
			let mut k = j;
			while k < to && self.text(k) != "," {
				k += 1;
			}
			let parts: Vec<&str> = (j..k).map(|n| self.text(n)).collect();
			match parts.as_slice() {
				["type", ..] if self.typescript && parts.len() > 1 && parts[1] != "as" => {}
				[name, "as", local] => out.push(Binding::Named(*name, *local)),
				[name] => out.push(Binding::Named(*name, *name)),
				_ => {}
			}
			j = k + 1;
		}
		out
	}

	/// Lowers the export declaration at `i`; returns the index to resume at.
	fn export(&mut self, i: usize) -> usize {
		match self.text(i + 1) {
			"default" => {
				self.replace(self.start(i)..self.tokens[i + 1].span.end, "void".into());
				i + 2
			}
			"{" => self.drop_export_list(i, i + 1),
			"type" if self.typescript && self.text(i + 2) == "{" => self.drop_export_list(i, i + 2),
			"*" => {
				let mut j = i + 2;
				while j < self.tokens.len() && self.kind(j) != Some(Kind::Literal) && self.text(j) != ";" {
					j += 1;
				}
				let end = self.past_semicolon(j + 1);
				self.remove(self.start(i)..self.end_before(end));
				end
			}
			_ => {
				self.remove(self.start(i)..self.start(i + 1));
				i + 1
			}
		}
	}

	fn drop_export_list(&mut self, i: usize, open: usize) -> usize {
		let mut end = self.closer(open).map_or(open + 1, |close| close + 1);
		if self.text(end) == "from" {
			end += 2;
		}
		let end = self.past_semicolon(end);
		self.remove(self.start(i)..self.end_before(end));
		end
	}

	/// Erases TypeScript-only syntax at `i`; returns the index to resume at.
	fn erase(&mut self, i: usize) -> Result<usize, SyntaxError> {
		let text = self.text(i);
		let word = self.kind(i) == Some(Kind::Word);
		let next_word = self.kind(i + 1) == Some(Kind::Word);

		if word && next_word && self.statement_start(i) {
			if UNSUPPORTED.contains(&text) {
				return Err(self.error(i, format!("TypeScript `{text}` declarations cannot be erased and need a compiler")));
			}
			if text == "type" && matches!(self.text(i + 2), "=" | "<") {
				let mut j = i + 2;
				if self.text(j) == "<" {
					j = self.skip_angles(j).unwrap_or(j + 1);
				}
				let end = self.past_semicolon(self.skip_type(j + 1));
				self.remove(self.start(i)..self.end_before(end));
				return Ok(end);
			}
			if text == "interface" {
				let mut j = i + 2;
				while j < self.tokens.len() && self.text(j) != "{" {
					j += 1;
				}
				let end = self.closer(j).map_or(j, |close| close + 1);
				self.remove(self.start(i)..self.end_before(end));
				return Ok(end);
			}
		}

		match text {
			"(" => self.parameters(i),
			"const" | "let" | "var" if word => self.variable(i),
			"as" | "satisfies" if word && self.after_expression(i) => {
				let end = self.skip_type(i + 1);
				if end > i + 1 {
					self.remove(self.end_before(i)..self.end_before(end));
				}
				return Ok(end);
			}
			"!" if self.after_expression(i)
				&& self.end_before(i) == self.start(i)
				&& !matches!(self.text(i + 1), "=") =>
			{
				self.remove(self.tokens[i].span.clone());
			}
			"<" if self.after_expression(i) && self.end_before(i) == self.start(i) => {
				if let Some(close) = self.skip_angles(i)
					&& self.text(close) == "("
				{
					self.remove(self.start(i)..self.end_before(close));
					return Ok(close);
				}
			}
			_ => {}
		}
		Ok(i + 1)
	}

	/// Erases annotations of the parameter list opened at `i`, if it is one,
	/// and of its return type.
	fn parameters(&mut self, i: usize) {
		let Some(close) = self.closer(i) else { return };

		let prev = self.text(i.wrapping_sub(1));
		let declared = prev == "function"
			|| prev == "catch"
			|| (self.kind(i.wrapping_sub(1)) == Some(Kind::Word) && self.text(i.wrapping_sub(2)) == "function");
		let method = self.kind(i.wrapping_sub(1)) == Some(Kind::Word)
			&& !CONTROL.contains(&prev)
			&& prev != "function"
			&& i >= 2
			&& matches!(self.text(i - 2), "{" | "}" | ";" | "," | "async" | "get" | "set" | "static")
			|| (i >= 1 && self.kind(i - 1) == Some(Kind::Word) && self.tokens[i - 1].line_start && !CONTROL.contains(&prev));

		let mut return_type = None;
		if self.text(close + 1) == ":" {
			let end = self.skip_type(close + 2);
			if self.text(end) == "=>" || (self.text(end) == "{" && (declared || method)) {
				return_type = Some(end);
			}
		}
		let arrow = self.text(close + 1) == "=>" || return_type.is_some_and(|end| self.text(end) == "=>");
		let body_follows = self.text(close + 1) == "{" || return_type.is_some();
		if !(arrow || declared || (method && body_follows)) {
			return;
		}

		let mut j = i + 1;
		while j < close {
			match self.text(j) {
				"(" | "[" | "{" => j = self.closer(j).map_or(j + 1, |c| c + 1),
				"?" if self.text(j + 1) == ":" => {
					let end = self.skip_type(j + 2);
					self.remove(self.start(j)..self.end_before(end));
					j = end;
				}
				":" => {
					let end = self.skip_type(j + 1);
					self.remove(self.start(j)..self.end_before(end));
					j = end;
				}
				_ => j += 1,
			}
		}
		if let Some(end) = return_type {
			self.remove(self.start(close + 1)..self.end_before(end));
		}
	}

	/// Erases the annotation in `const x: T = ...` and its destructuring forms.
	fn variable(&mut self, i: usize) {
		let binding = i + 1;
		let after = match self.text(binding) {
			"{" | "[" => self.closer(binding).map_or(binding + 1, |c| c + 1),
			_ if self.kind(binding) == Some(Kind::Word) => binding + 1,
			_ => return,
		};
		let colon = if self.text(after) == "!" { after + 1 } else { after };
		if self.text(colon) == ":" {
			let end = self.skip_type(colon + 1);
			self.remove(self.start(after)..self.end_before(end));
		}
	}

	/// Index of the token after `<...>` opened at `i`, when the contents look
	/// like type arguments.
	fn skip_angles(&self, i: usize) -> Option<usize> {
		let mut depth = 0usize;
		let mut j = i;
		while j < self.tokens.len() {
			match self.text(j) {
				"<" => depth += 1,
				">" => {
					depth -= 1;
					if depth == 0 {
						return Some(j + 1);
					}
				}
				"(" | "[" | "{" => {
					j = self.closer(j)?;
				}
				";" | "=" | "+" | "-" | "*" | "/" | "%" | "!" | ")" | "]" | "}" => return None,
				_ => {}
			}
			j += 1;
		}
		None
	}

	/// Index of the token after the type starting at `i`.
	fn skip_type(&self, mut i: usize) -> usize {
		if matches!(self.text(i), "|" | "&") {
			i += 1;
		}
		loop {
			while matches!(self.text(i), "keyof" | "typeof" | "readonly" | "unique" | "infer" | "new")
				&& self.kind(i + 1).is_some_and(|k| k != Kind::Punct || matches!(self.text(i + 1), "(" | "[" | "{"))
			{
				i += 1;
			}

			match self.text(i) {
				"(" | "[" | "{" => {
					let Some(close) = self.closer(i) else { return i };
					let function = self.text(i) == "(" && self.text(close + 1) == "=>";
					i = close + 1;
					if function {
						i += 1;
						continue;
					}
				}
				"<" => {
					let Some(after) = self.skip_angles(i) else { return i };
					i = after;
					continue;
				}
				"-" if self.kind(i + 1) == Some(Kind::Word) => i += 2,
				_ if matches!(self.kind(i), Some(Kind::Word | Kind::Literal)) => {
					i += 1;
					while self.text(i) == "." && self.kind(i + 1) == Some(Kind::Word) {
						i += 2;
					}
				}
				_ => return i,
			}

			loop {
				match self.text(i) {
					"<" => match self.skip_angles(i) {
						Some(after) => i = after,
						None => break,
					},
					"[" if !self.tokens[i].line_start => match self.closer(i) {
						Some(close) => i = close + 1,
						None => break,
					},
					_ => break,
				}
			}

			match self.text(i) {
				"|" | "&" | "is" | "extends" => i += 1,
				"?" if self.text(i + 1) != ":" && self.text(i + 1) != "." => i += 1,
				":" if self.conditional_type(i) => i += 1,
				_ => return i,
			}
		}
	}

	/// Whether the `:` at `i` is the else branch of a conditional type.
	fn conditional_type(&self, i: usize) -> bool {
		(0..i).rev().take_while(|&j| !matches!(self.text(j), "," | ")" | "=" | "{" | ";")).any(|j| self.text(j) == "extends")
	}
}

enum Binding<'a> {
	/// `import { name as local }`
	Named(&'a str, &'a str),
	/// `import * as local`
	Namespace(&'a str),
}

/// The statement a lowered import turns into.
fn import_binding(bindings: &[Binding<'_>]) -> String {
	let mut out = Vec::new();
	let mut named = Vec::new();
	for binding in bindings {
		match binding {
			Binding::Namespace(local) => out.push(format!("const {local} = globalThis;")),
			Binding::Named(name, local) if name == local => named.push((*name).to_string()),
			Binding::Named(name, local) => named.push(format!("{name}: {local}")),
		}
	}
	if !named.is_empty() {
		out.push(format!("const {{ {} }} = globalThis;", named.join(", ")));
	}
	out.join(" ")
}
