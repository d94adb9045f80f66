//! A module implementing lexical analysis (tokenization) for a simple shell-like language.
//!
//! The lexer knows two quoting forms. Inside `'...'` every character is literal;
//! inside `"..."` every character is literal too, but the resulting word stays
//! eligible for variable substitution. A quote character of the other kind is an
//! ordinary character while a quote is open. Quote delimiters never end up in the
//! token text.

use crate::error::ParseError;

/// A word together with how it was quoted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Word {
    /// The word with quote delimiters removed.
    pub text: String,
    /// Every character came from single-quoted runs.
    pub single_quoted: bool,
    /// Every character came from double-quoted runs.
    pub double_quoted: bool,
}

impl Word {
    /// An unquoted word.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Whether the word is entirely enclosed in quotes of either kind.
    pub fn is_quoted(&self) -> bool {
        self.single_quoted || self.double_quoted
    }
}

/// Represents a token resulting from lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A word: command name, argument, assignment or redirection target.
    Word(Word),
    /// The pipe operator, `|`.
    Pipe,
    /// The sequencing operator, `;`.
    Semicolon,
    /// Input redirection symbol, `<`.
    RedirectIn,
    /// Output redirection symbol, `>`.
    RedirectOut,
    /// Appending output redirection symbol, `>>`.
    RedirectAppend,
}

impl Token {
    /// The source text of an operator token.
    pub fn operator_text(&self) -> Option<&'static str> {
        match self {
            Token::Word(_) => None,
            Token::Pipe => Some("|"),
            Token::Semicolon => Some(";"),
            Token::RedirectIn => Some("<"),
            Token::RedirectOut => Some(">"),
            Token::RedirectAppend => Some(">>"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
    ReadingSingleQuote,
    ReadingDoubleQuote,
}

/// Accumulates one word and remembers which quoting its characters came from.
#[derive(Default)]
struct WordBuffer {
    text: String,
    single: bool,
    double: bool,
    unquoted: bool,
}

impl WordBuffer {
    fn finish(&mut self) -> Word {
        let buffer = std::mem::take(self);
        Word {
            single_quoted: buffer.single && !buffer.double && !buffer.unquoted,
            double_quoted: buffer.double && !buffer.single && !buffer.unquoted,
            text: buffer.text,
        }
    }
}

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    state: LexingState,
    strict: bool,
    word: WordBuffer,
}

impl LexingFSM {
    /// Creates a new instance of the lexical analysis Finite State Machine.
    fn new(line: &str, strict: bool) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            state: LexingState::Start,
            strict,
            word: WordBuffer::default(),
        }
    }

    /// Performs lexical analysis on the input string and returns a vector of tokens.
    ///
    /// An unterminated quote is closed at the end of the line unless the lexer is
    /// strict, in which case it is an error.
    fn make_tokens(&mut self) -> Result<Vec<Token>, ParseError> {
        let mut out = Vec::new();

        while let Some(ch) = self.read_char() {
            match self.state {
                LexingState::Start => self.handle_start(ch, &mut out),
                LexingState::ReadingWord => self.handle_word(ch, &mut out),
                LexingState::ReadingSingleQuote => self.handle_quoted(ch, '\''),
                LexingState::ReadingDoubleQuote => self.handle_quoted(ch, '"'),
            }
        }

        let open_quote = match self.state {
            LexingState::ReadingSingleQuote => Some('\''),
            LexingState::ReadingDoubleQuote => Some('"'),
            _ => None,
        };
        if let Some(quote) = open_quote {
            if self.strict {
                return Err(ParseError::UnterminatedQuote(quote));
            }
            tracing::debug!(%quote, "closing unterminated quote at end of line");
        }

        if self.state != LexingState::Start {
            out.push(Token::Word(self.word.finish()));
        }

        Ok(out)
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn handle_start(&mut self, ch: char, out: &mut Vec<Token>) {
        match ch {
            ' ' | '\t' => {}
            '\'' => {
                self.word.single = true;
                self.state = LexingState::ReadingSingleQuote;
            }
            '"' => {
                self.word.double = true;
                self.state = LexingState::ReadingDoubleQuote;
            }
            c => {
                if let Some(token) = self.operator(c) {
                    out.push(token);
                } else {
                    self.push_unquoted(c);
                    self.state = LexingState::ReadingWord;
                }
            }
        }
    }

    fn handle_word(&mut self, ch: char, out: &mut Vec<Token>) {
        match ch {
            ' ' | '\t' => {
                out.push(Token::Word(self.word.finish()));
                self.state = LexingState::Start;
            }
            '\'' => {
                self.word.single = true;
                self.state = LexingState::ReadingSingleQuote;
            }
            '"' => {
                self.word.double = true;
                self.state = LexingState::ReadingDoubleQuote;
            }
            c => {
                if let Some(token) = self.operator(c) {
                    out.push(Token::Word(self.word.finish()));
                    out.push(token);
                    self.state = LexingState::Start;
                } else {
                    self.push_unquoted(c);
                }
            }
        }
    }

    fn handle_quoted(&mut self, ch: char, quote: char) {
        if ch == quote {
            self.state = LexingState::ReadingWord;
        } else {
            self.word.text.push(ch);
        }
    }

    /// Recognizes an unquoted operator starting at `ch`, consuming the second `>` of `>>`.
    fn operator(&mut self, ch: char) -> Option<Token> {
        let token = match ch {
            '|' => Token::Pipe,
            ';' => Token::Semicolon,
            '<' => Token::RedirectIn,
            '>' if self.peek_char() == Some('>') => {
                self.read_char();
                Token::RedirectAppend
            }
            '>' => Token::RedirectOut,
            _ => return None,
        };
        Some(token)
    }

    fn push_unquoted(&mut self, ch: char) {
        self.word.unquoted = true;
        self.word.text.push(ch);
    }
}

/// The main entry point function to perform lexical analysis.
///
/// Creates and runs the finite state machine to tokenize the input line.
/// With `strict` set, an unterminated quote is reported instead of being closed
/// implicitly at the end of the line.
pub fn split_into_tokens(line: &str, strict: bool) -> Result<Vec<Token>, ParseError> {
    let mut lexer = LexingFSM::new(line, strict);
    let tokens = lexer.make_tokens()?;
    tracing::trace!(?tokens, "tokenized line");
    Ok(tokens)
}
