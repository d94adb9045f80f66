//! Turns a line of input into an ordered list of [`CommandDescriptor`]s.
//!
//! The line is split into clauses on `;` and each clause into stages on `|`.
//! Every stage contributes its leading `NAME=value` assignments, then at most one
//! command invocation. Descriptors of all clauses are returned in one flat list;
//! [`CommandDescriptor::is_piped`] tells which of them feed the next stage and
//! [`CommandDescriptor::ends_clause`] marks where each clause stops.

use crate::error::ParseError;
use crate::lexer::{self, Token, Word};
use std::collections::BTreeSet;

/// Name of a parsed descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandName {
    /// The descriptor is a variable assignment, not a command.
    Assignment,
    /// The descriptor runs the named command.
    Invocation(String),
}

/// File named by a `<`, `>` or `>>` redirection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    pub path: String,
    /// The file name was written in single quotes and is never substituted.
    pub single_quoted: bool,
}

/// One parsed pipeline stage or variable assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub name: CommandName,
    /// For invocations `arguments[0]` is the command name; for assignments the
    /// arguments are exactly `[key, value]`.
    pub arguments: Vec<String>,
    /// Explicit input redirection (`<`).
    pub input_path: Option<RedirectTarget>,
    /// Explicit output redirection (`>` or `>>`).
    pub output_path: Option<RedirectTarget>,
    /// The output redirection appends instead of truncating.
    pub append: bool,
    /// This stage is not the last one of its pipeline.
    pub is_piped: bool,
    /// Last descriptor of its `;`-separated clause.
    pub ends_clause: bool,
    /// Indices of arguments that were written entirely in single quotes.
    pub single_quoted: BTreeSet<usize>,
    /// Indices of arguments that were written entirely in double quotes.
    pub double_quoted: BTreeSet<usize>,
}

impl CommandDescriptor {
    /// A `key=value` assignment.
    pub fn assignment(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: CommandName::Assignment,
            arguments: vec![key.into(), value.into()],
            input_path: None,
            output_path: None,
            append: false,
            is_piped: false,
            ends_clause: false,
            single_quoted: BTreeSet::new(),
            double_quoted: BTreeSet::new(),
        }
    }

    /// An invocation of `words[0]` with the remaining words as arguments.
    ///
    /// Returns `None` for an empty word list.
    pub fn invocation(words: Vec<Word>) -> Option<Self> {
        let name = words.first()?.text.clone();
        let mut single_quoted = BTreeSet::new();
        let mut double_quoted = BTreeSet::new();
        for (index, word) in words.iter().enumerate() {
            if word.single_quoted {
                single_quoted.insert(index);
            }
            if word.double_quoted {
                double_quoted.insert(index);
            }
        }
        Some(Self {
            name: CommandName::Invocation(name),
            arguments: words.into_iter().map(|w| w.text).collect(),
            input_path: None,
            output_path: None,
            append: false,
            is_piped: false,
            ends_clause: false,
            single_quoted,
            double_quoted,
        })
    }

    pub fn is_assignment(&self) -> bool {
        self.name == CommandName::Assignment
    }

    /// The command name, or `None` for an assignment.
    pub fn command_name(&self) -> Option<&str> {
        match &self.name {
            CommandName::Assignment => None,
            CommandName::Invocation(name) => Some(name),
        }
    }

    /// Writes the descriptor back as input text that parses to an equivalent descriptor.
    ///
    /// The pipe to the next stage is not part of the rendering.
    pub fn render(&self) -> String {
        if self.is_assignment() {
            return format!(
                "{}={}",
                self.arguments[0],
                render_bare(&self.arguments[1], false)
            );
        }

        let mut parts: Vec<String> = self
            .arguments
            .iter()
            .enumerate()
            .map(|(index, arg)| {
                if self.single_quoted.contains(&index) {
                    format!("'{}'", arg)
                } else if self.double_quoted.contains(&index) {
                    format!("\"{}\"", arg)
                } else {
                    // A bare `A=b` in command position would read back as an assignment.
                    render_bare(arg, index == 0)
                }
            })
            .collect();
        if let Some(input) = &self.input_path {
            parts.push(format!("< {}", render_target(input)));
        }
        if let Some(output) = &self.output_path {
            let op = if self.append { ">>" } else { ">" };
            parts.push(format!("{} {}", op, render_target(output)));
        }
        parts.join(" ")
    }
}

fn render_target(target: &RedirectTarget) -> String {
    if target.single_quoted {
        format!("'{}'", target.path)
    } else {
        render_bare(&target.path, false)
    }
}

/// Renders text that was not fully quoted so that it tokenizes back to the same
/// text, again without being fully quoted.
///
/// Special characters are quoted one by one and bare text is left alone; a word
/// with no bare character gets an empty `''` or `""` so its quoting stays mixed.
fn render_bare(text: &str, quote_equals: bool) -> String {
    let mut out = String::new();
    let (mut single, mut double, mut bare) = (false, false, false);
    for c in text.chars() {
        match c {
            '"' => {
                out.push_str("'\"'");
                single = true;
            }
            ' ' | '\t' | '\'' | '|' | ';' | '<' | '>' => {
                out.push('"');
                out.push(c);
                out.push('"');
                double = true;
            }
            '=' if quote_equals => {
                out.push_str("\"=\"");
                double = true;
            }
            c => {
                out.push(c);
                bare = true;
            }
        }
    }
    if !bare {
        if !single {
            out.push_str("''");
        }
        if !double {
            out.push_str("\"\"");
        }
    }
    out
}

/// Whether `word` has the shape `identifier=value`.
fn as_assignment(word: &Word) -> Option<(&str, &str)> {
    if word.is_quoted() {
        return None;
    }
    let (key, value) = word.text.split_once('=')?;
    if value.is_empty() || !is_identifier(key) {
        return None;
    }
    Some((key, value))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

struct DescriptorBuilder {
    tokens: Vec<Token>,
    pos: usize,
    strict: bool,
}

impl DescriptorBuilder {
    fn new(tokens: Vec<Token>, strict: bool) -> Self {
        DescriptorBuilder {
            tokens,
            pos: 0,
            strict,
        }
    }

    fn build(mut self) -> Result<Vec<CommandDescriptor>, ParseError> {
        let mut descriptors = Vec::new();
        while self.peek().is_some() {
            self.parse_clause(&mut descriptors)?;
        }
        Ok(descriptors)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Parse a clause: stage ('|' stage)* up to and including the next ';'.
    fn parse_clause(&mut self, out: &mut Vec<CommandDescriptor>) -> Result<(), ParseError> {
        let mut stages: Vec<Vec<CommandDescriptor>> = Vec::new();

        loop {
            let fragment = self.take_fragment();
            let stage = self.parse_stage(fragment)?;
            // Empty fragments (`a || b`, a lone redirection) contribute nothing.
            if !stage.is_empty() {
                stages.push(stage);
            }
            match self.consume() {
                Some(Token::Pipe) => continue,
                _ => break,
            }
        }

        let last = stages.len().saturating_sub(1);
        let mut clause = Vec::new();
        for (index, mut stage) in stages.into_iter().enumerate() {
            if index < last {
                if let Some(feeding) = stage.last_mut() {
                    feeding.is_piped = true;
                }
            }
            clause.extend(stage);
        }
        if let Some(closing) = clause.last_mut() {
            closing.ends_clause = true;
        }
        out.extend(clause);
        Ok(())
    }

    /// Tokens of one stage: everything up to the next `|`, `;` or the end.
    fn take_fragment(&mut self) -> Vec<Token> {
        let mut fragment = Vec::new();
        while let Some(token) = self.peek() {
            if matches!(token, Token::Pipe | Token::Semicolon) {
                break;
            }
            fragment.extend(self.consume());
        }
        fragment
    }

    /// Parse a stage: assignment* (word | redirect)*
    fn parse_stage(&self, fragment: Vec<Token>) -> Result<Vec<CommandDescriptor>, ParseError> {
        let mut descriptors = Vec::new();
        let mut tokens = fragment.into_iter().peekable();

        while let Some(Token::Word(word)) = tokens.peek() {
            let Some((key, value)) = as_assignment(word) else {
                break;
            };
            descriptors.push(CommandDescriptor::assignment(key, value));
            tokens.next();
        }

        let mut words = Vec::new();
        let mut input_path = None;
        let mut output_path = None;
        let mut append = false;

        while let Some(token) = tokens.next() {
            let operator = match token {
                Token::Word(word) => {
                    words.push(word);
                    continue;
                }
                op => op,
            };
            let Some(Token::Word(target)) = tokens.next_if(|t| matches!(t, Token::Word(_))) else {
                let text = operator.operator_text().unwrap_or_default();
                if self.strict {
                    return Err(ParseError::DanglingRedirect(text));
                }
                tracing::debug!(operator = text, "dropping redirection without a file name");
                continue;
            };
            let target = RedirectTarget {
                single_quoted: target.single_quoted,
                path: target.text,
            };
            match operator {
                Token::RedirectIn => input_path = Some(target),
                Token::RedirectAppend => {
                    output_path = Some(target);
                    append = true;
                }
                _ => {
                    output_path = Some(target);
                    append = false;
                }
            }
        }

        if let Some(mut invocation) = CommandDescriptor::invocation(words) {
            invocation.input_path = input_path;
            invocation.output_path = output_path;
            invocation.append = append;
            descriptors.push(invocation);
        }
        Ok(descriptors)
    }
}

/// Parses a full input line into descriptors for all of its clauses and stages.
///
/// In lenient mode (`strict == false`) an unterminated quote closes at the end of
/// the line and a redirection operator without a file name is dropped.
pub fn parse_line(line: &str, strict: bool) -> Result<Vec<CommandDescriptor>, ParseError> {
    let tokens = lexer::split_into_tokens(line, strict)?;
    let descriptors = DescriptorBuilder::new(tokens, strict).build()?;
    tracing::debug!(line, count = descriptors.len(), "parsed line");
    Ok(descriptors)
}
