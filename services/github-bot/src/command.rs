//! Comment command grammar
//!
//! A command addresses the bot by its mention token, names an action and
//! lists its arguments in brackets:
//!
//! ```text
//! @mxnet-label-bot, add [bug, Good First Issue]
//! @mxnet-ci-bot run ci [centos-cpu, clang]
//! ```
//!
//! Arguments are comma separated; internal whitespace is collapsed and case
//! folded to lower case. Everything after the first `]` is ignored.

use std::fmt;

use serde::Serialize;

/// Action requested by a comment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Add labels to the issue
    Add,
    /// Remove labels from the issue
    Remove,
    /// Replace the issue's labels
    Update,
    /// Trigger CI jobs for the pull request
    Trigger,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Add => write!(f, "add"),
            ActionKind::Remove => write!(f, "remove"),
            ActionKind::Update => write!(f, "update"),
            ActionKind::Trigger => write!(f, "trigger"),
        }
    }
}

/// A parsed, not yet validated command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Command {
    pub action: ActionKind,
    pub target_issue: u64,
    pub arguments: Vec<String>,
}

impl Command {
    /// Same command narrowed to a different argument list.
    pub fn with_arguments(&self, arguments: Vec<String>) -> Self {
        Self {
            action: self.action,
            target_issue: self.target_issue,
            arguments,
        }
    }
}

/// Why a comment addressed to the bot is not a valid command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxRejection {
    /// Action phrase is not in the bot's vocabulary
    UnknownAction { phrase: String },
    /// No arguments between the brackets (or no brackets at all)
    EmptyArguments { action: ActionKind },
}

impl fmt::Display for SyntaxRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyntaxRejection::UnknownAction { phrase } if phrase.is_empty() => {
                write!(f, "no action given")
            }
            SyntaxRejection::UnknownAction { phrase } => write!(f, "undefined action '{}'", phrase),
            SyntaxRejection::EmptyArguments { action } => {
                write!(f, "no arguments given for '{}'", action)
            }
        }
    }
}

/// Result of parsing one comment body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// The comment does not mention the bot
    NotAddressed,
    /// A well-formed command with at least one argument
    Parsed {
        action: ActionKind,
        arguments: Vec<String>,
    },
    /// The comment mentions the bot but is not a valid command
    Rejected(SyntaxRejection),
}

impl ParseOutcome {
    /// Attach the target issue to a parsed command.
    pub fn into_command(self, target_issue: u64) -> Option<Command> {
        match self {
            ParseOutcome::Parsed { action, arguments } => Some(Command {
                action,
                target_issue,
                arguments,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Word(&'a str),
    Comma,
    Open,
    Close,
}

/// Split text into words and the `,` `[` `]` delimiters.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut word_start: Option<usize> = None;

    for (index, ch) in text.char_indices() {
        let delimiter = match ch {
            ',' => Some(Token::Comma),
            '[' => Some(Token::Open),
            ']' => Some(Token::Close),
            c if c.is_whitespace() => None,
            _ => {
                if word_start.is_none() {
                    word_start = Some(index);
                }
                continue;
            }
        };

        if let Some(start) = word_start.take() {
            tokens.push(Token::Word(&text[start..index]));
        }
        if let Some(token) = delimiter {
            tokens.push(token);
        }
    }

    if let Some(start) = word_start {
        tokens.push(Token::Word(&text[start..]));
    }

    tokens
}

/// Extract the normalized argument list of the first bracket group.
///
/// `"[sAMpLe LAbEl, another Label]"` becomes `["sample label", "another label"]`.
pub fn parse_argument_list(text: &str) -> Vec<String> {
    let tokens = tokenize(text);
    match tokens.iter().position(|t| *t == Token::Open) {
        Some(open) => collect_arguments(&tokens[open + 1..]),
        None => Vec::new(),
    }
}

fn collect_arguments(tokens: &[Token<'_>]) -> Vec<String> {
    let mut arguments = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for token in tokens {
        match token {
            Token::Word(word) => current.push(word),
            Token::Comma => flush_argument(&mut current, &mut arguments),
            Token::Close => break,
            Token::Open => {}
        }
    }
    flush_argument(&mut current, &mut arguments);

    arguments
}

fn flush_argument(words: &mut Vec<&str>, arguments: &mut Vec<String>) {
    if !words.is_empty() {
        arguments.push(words.join(" ").to_lowercase());
        words.clear();
    }
}

/// Parser for one bot's mention token and action vocabulary
#[derive(Debug, Clone)]
pub struct CommandParser {
    mention: String,
    vocabulary: Vec<(String, ActionKind)>,
}

impl CommandParser {
    pub fn new(mention: impl Into<String>, vocabulary: Vec<(String, ActionKind)>) -> Self {
        let vocabulary = vocabulary
            .into_iter()
            .map(|(phrase, kind)| (normalize_phrase(&phrase), kind))
            .collect();
        Self {
            mention: mention.into(),
            vocabulary,
        }
    }

    pub fn mention(&self) -> &str {
        &self.mention
    }

    /// Parse a comment body. Pure: the same body always yields the same outcome.
    pub fn parse(&self, body: &str) -> ParseOutcome {
        let Some(segment) = self.addressed_segment(body) else {
            return ParseOutcome::NotAddressed;
        };

        let tokens = tokenize(segment);
        let open = tokens.iter().position(|t| *t == Token::Open);
        let phrase_tokens = &tokens[..open.unwrap_or(tokens.len())];

        let phrase = normalize_phrase(
            &phrase_tokens
                .iter()
                .filter_map(|t| match t {
                    Token::Word(word) => Some(*word),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(" "),
        );

        let Some(action) = self.lookup(&phrase) else {
            return ParseOutcome::Rejected(SyntaxRejection::UnknownAction { phrase });
        };

        let arguments = match open {
            Some(open) => collect_arguments(&tokens[open + 1..]),
            None => Vec::new(),
        };
        if arguments.is_empty() {
            return ParseOutcome::Rejected(SyntaxRejection::EmptyArguments { action });
        }

        ParseOutcome::Parsed { action, arguments }
    }

    fn lookup(&self, phrase: &str) -> Option<ActionKind> {
        self.vocabulary
            .iter()
            .find(|(known, _)| known == phrase)
            .map(|(_, kind)| *kind)
    }

    /// Text between the mention and the first `]` after it (inclusive).
    fn addressed_segment<'a>(&self, body: &'a str) -> Option<&'a str> {
        if self.mention.is_empty() {
            return None;
        }
        // ASCII folding keeps byte offsets valid for `body`.
        let folded_body = body.to_ascii_lowercase();
        let folded_mention = self.mention.to_ascii_lowercase();
        let start = folded_body
            .match_indices(&folded_mention)
            .map(|(index, _)| index + self.mention.len())
            .find(|&end| ends_mention(&body[end..]))?;

        let rest = &body[start..];
        Some(match rest.find(']') {
            Some(close) => &rest[..=close],
            None => rest,
        })
    }
}

/// A mention ends at the end of the text, at whitespace, or at the
/// punctuation people put after it. `@bot-dev` and `@botadd` are other handles.
fn ends_mention(rest: &str) -> bool {
    match rest.chars().next() {
        None => true,
        Some(c) => c.is_whitespace() || matches!(c, ',' | ':' | '.'),
    }
}

/// Lower-case, single-spaced, without the punctuation people put after a
/// mention (`@bot, add` / `@bot: add`).
fn normalize_phrase(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| c == ':' || c == ',' || c == '.'))
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
