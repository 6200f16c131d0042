//! Tokenizer for command lines.
//!
//! Splits a line on runs of whitespace into a [`CommandQueue`], with support
//! for:
//! - Quoted tokens (single or double quotes at the start of a token) that keep
//!   inner whitespace
//! - `\"` and `\\` inside double quotes (`\'` inside single quotes)
//! - Empty tokens written as `""`
//!
//! Quote characters inside a word, and every other backslash, are literal:
//! `O'Brien` and `C:\temp\new` pass through unchanged.

use std::collections::VecDeque;

/// Ordered tokens of one command line, consumed front to back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandQueue {
    tokens: VecDeque<String>,
}

impl CommandQueue {
    /// Removes and returns the front token, or `None` if the queue is empty.
    pub fn pop(&mut self) -> Option<String> {
        self.tokens.pop_front()
    }

    /// Drains every remaining token and joins them with single spaces.
    ///
    /// Returns `None` when nothing is left. Runs of whitespace between
    /// unquoted tokens collapse to one space.
    pub fn rest_joined(&mut self) -> Option<String> {
        if self.tokens.is_empty() {
            return None;
        }
        let joined = self.tokens.drain(..).collect::<Vec<_>>().join(" ");
        Some(joined)
    }

    /// Number of tokens left.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns true if no tokens are left.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for CommandQueue {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            tokens: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Tokenizes a command line.
///
/// Handles:
/// - Whitespace-separated tokens: `select  search   web` → `select`, `search`, `web`
/// - Double-quoted strings: `"my vm"` → `my vm`
/// - Single-quoted strings: `'my vm'` → `my vm`
/// - Escaped quotes: `"say \"hi\""` → `say "hi"`
pub fn tokenize(input: &str) -> CommandQueue {
    let mut tokens = VecDeque::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let token = if c == '"' || c == '\'' {
            chars.next();
            collect_quoted(&mut chars, c)
        } else {
            collect_word(&mut chars)
        };
        tokens.push_back(token);
    }

    CommandQueue { tokens }
}

type Chars<'a> = std::iter::Peekable<std::str::Chars<'a>>;

/// Collects an unquoted word up to the next whitespace.
fn collect_word(chars: &mut Chars<'_>) -> String {
    let mut result = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            break;
        }
        result.push(c);
        chars.next();
    }
    result
}

/// Collects characters up to the closing `quote`.
///
/// Only the quote character and the backslash can be escaped. Text glued to
/// the closing quote stays part of the token. An unterminated quote runs to
/// the end of the line.
fn collect_quoted(chars: &mut Chars<'_>, quote: char) -> String {
    let mut result = String::new();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                Some(&next) if next == quote || next == '\\' => {
                    result.push(next);
                    chars.next();
                }
                _ => result.push('\\'),
            },
            c if c == quote => {
                result.push_str(&collect_word(chars));
                break;
            }
            c => result.push(c),
        }
    }

    result
}
