//! Command-line tokenizer and the parsed [`Command`] type.
//!
//! # Tokenizing rules (for beginners)
//!
//! A command line is split into whitespace-separated tokens, much like a
//! shell would do it, but with a deliberately small rule set:
//!
//! - Runs of spaces and tabs separate tokens; leading and trailing
//!   whitespace is ignored.
//! - A token that *starts* with `'` or `"` is quoted.  Everything up to the
//!   matching closing quote (spaces included) belongs to the token.  The
//!   other quote character has no special meaning inside.
//! - An unterminated quote runs to the end of the line.
//! - Outside quotes a backslash takes the next character literally, so
//!   `my\ disk.img` is a single token.  Inside quotes backslashes are plain
//!   characters.
//!
//! ```text
//! fddload 0 "My Disk.img" 1   →  ["fddload", "0", "My Disk.img", "1"]
//! cdload 1 '/a b/c.iso'       →  ["cdload", "1", "/a b/c.iso"]
//! ```

/// Splits a command line into tokens, honouring quotes and backslash escapes.
///
/// An empty quoted string (`""`) yields an empty token.
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut state = State::Between;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match state {
            State::Between => match c {
                c if is_separator(c) => {}
                '\'' | '"' => state = State::Quoted(c),
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                    state = State::Bare;
                }
                _ => {
                    current.push(c);
                    state = State::Bare;
                }
            },
            State::Bare => match c {
                c if is_separator(c) => {
                    tokens.push(std::mem::take(&mut current));
                    state = State::Between;
                }
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                }
                _ => current.push(c),
            },
            State::Quoted(quote) => {
                if c == quote {
                    state = State::Bare;
                } else {
                    current.push(c);
                }
            }
        }
    }

    if state != State::Between {
        tokens.push(current);
    }
    tokens
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Between,
    Bare,
    Quoted(char),
}

fn is_separator(c: char) -> bool {
    c == ' ' || c == '\t'
}

// ── Command ───────────────────────────────────────────────────────────────────

/// A tokenized command line: a verb followed by zero or more arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    verb: String,
    args: Vec<String>,
}

impl Command {
    /// Parses a single line (without its terminator).
    ///
    /// Returns `None` when the line holds no tokens at all; blank lines are
    /// ignored by the protocol rather than answered.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use emuctl_core::Command;
    ///
    /// let cmd = Command::parse("CDLOAD 0 '/srv/images/dos 6.iso'").unwrap();
    /// assert_eq!(cmd.name(), "cdload");
    /// assert_eq!(cmd.args(), ["0", "/srv/images/dos 6.iso"]);
    /// assert!(Command::parse("   ").is_none());
    /// ```
    pub fn parse(line: &str) -> Option<Self> {
        let mut tokens = tokenize(line).into_iter();
        let verb = tokens.next()?;
        Some(Self {
            verb,
            args: tokens.collect(),
        })
    }

    /// The verb exactly as the client typed it.
    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// The verb folded to lowercase; verbs are case-insensitive.
    pub fn name(&self) -> String {
        self.verb.to_ascii_lowercase()
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns argument `index` (0 = first argument after the verb).
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}
