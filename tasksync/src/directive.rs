//! Scheduling directives embedded in batch file comments
//!
//! A directive is a comment line of the form
//!
//! ```text
//! :: taskbelt DAILY 09:30
//! REM taskbelt MONTHLY 1:02:00 15:02:00
//! ```
//!
//! The comment marker (`REM` or `::`) is followed by the marker token and a
//! keyword. Every value after the keyword produces one trigger, except for
//! `CRON` which takes the remaining five fields as one expression.

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use taskbelt_core::{TimeOfDay, TriggerDescriptor, DEFAULT_MARKER};

use crate::cron;
use crate::error::DirectiveError;

/// Options for directive parsing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserOptions {
    /// Token that must follow the comment marker, compared case-insensitively
    pub marker: String,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_string(),
        }
    }
}

/// A directive line that could not be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// 1-based line number in the file
    pub line_number: usize,
    pub line: String,
    pub error: DirectiveError,
}

/// A directive line that produced triggers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveLine {
    pub line_number: usize,
    /// Tokens after the comment and marker tokens, keyword first
    pub tokens: Vec<String>,
    pub triggers: Vec<TriggerDescriptor>,
}

/// Everything parsed out of one file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDirectives {
    pub directives: Vec<DirectiveLine>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ParsedDirectives {
    /// All triggers in file order
    pub fn triggers(&self) -> Vec<TriggerDescriptor> {
        self.directives
            .iter()
            .flat_map(|d| d.triggers.iter().cloned())
            .collect()
    }

    /// Hash over the successful directive lines, `None` if there are none
    pub fn content_hash(&self) -> Option<String> {
        content_hash(self.directives.iter().map(|d| d.tokens.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }
}

/// SHA-256 over the token lines, each joined with single spaces and the
/// lines joined with `\n`. Lower-case hex.
pub fn content_hash<'a, I>(lines: I) -> Option<String>
where
    I: IntoIterator<Item = &'a [String]>,
{
    let joined: Vec<String> = lines.into_iter().map(|tokens| tokens.join(" ")).collect();
    if joined.is_empty() {
        return None;
    }

    let mut hasher = Sha256::new();
    hasher.update(joined.join("\n").as_bytes());
    Some(format!("{:x}", hasher.finalize()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Hourly,
    Daily,
    Monthly,
    Weekday(Weekday),
    Cron,
}

impl Keyword {
    fn parse(token: &str) -> Option<Self> {
        let keyword = match token.to_ascii_uppercase().as_str() {
            "HOURLY" => Keyword::Hourly,
            "DAILY" => Keyword::Daily,
            "MONTHLY" => Keyword::Monthly,
            "CRON" => Keyword::Cron,
            "MONDAY" => Keyword::Weekday(Weekday::Mon),
            "TUESDAY" => Keyword::Weekday(Weekday::Tue),
            "WEDNESDAY" => Keyword::Weekday(Weekday::Wed),
            "THURSDAY" => Keyword::Weekday(Weekday::Thu),
            "FRIDAY" => Keyword::Weekday(Weekday::Fri),
            "SATURDAY" => Keyword::Weekday(Weekday::Sat),
            "SUNDAY" => Keyword::Weekday(Weekday::Sun),
            _ => return None,
        };
        Some(keyword)
    }
}

fn parse_number(value: &str) -> Result<u8, DirectiveError> {
    value
        .parse::<u8>()
        .map_err(|_| DirectiveError::InvalidNumber(value.to_string()))
}

/// `HH:MM`
fn parse_time(value: &str) -> Result<TimeOfDay, DirectiveError> {
    let parts: Vec<&str> = value.split(':').collect();
    match parts[..] {
        [hour, minute] => Ok(TimeOfDay::new(parse_number(hour)?, parse_number(minute)?)?),
        _ => Err(DirectiveError::invalid_time(value, "expected HH:MM")),
    }
}

/// `D:HH:MM`
fn parse_monthly(value: &str) -> Result<TriggerDescriptor, DirectiveError> {
    let parts: Vec<&str> = value.split(':').collect();
    match parts[..] {
        [day, hour, minute] => {
            let time = TimeOfDay::new(parse_number(hour)?, parse_number(minute)?)?;
            Ok(TriggerDescriptor::monthly(parse_number(day)?, time)?)
        }
        _ => Err(DirectiveError::invalid_time(value, "expected D:HH:MM")),
    }
}

/// Parse the directive body (keyword first). The whole line fails if any
/// value fails; a line never contributes part of its triggers.
pub fn parse_directive(tokens: &[String]) -> Result<Vec<TriggerDescriptor>, DirectiveError> {
    let Some((keyword_token, values)) = tokens.split_first() else {
        return Err(DirectiveError::MissingValue(String::new()));
    };

    let keyword = Keyword::parse(keyword_token)
        .ok_or_else(|| DirectiveError::UnknownKeyword(keyword_token.clone()))?;

    if values.is_empty() {
        return Err(DirectiveError::MissingValue(keyword_token.clone()));
    }

    match keyword {
        Keyword::Cron => cron::expand(&values.join(" ")),
        Keyword::Hourly => values
            .iter()
            .map(|v| Ok(TriggerDescriptor::hourly(parse_number(v)?)?))
            .collect(),
        Keyword::Daily => values
            .iter()
            .map(|v| Ok(TriggerDescriptor::daily(parse_time(v)?)))
            .collect(),
        Keyword::Weekday(day) => values
            .iter()
            .map(|v| Ok(TriggerDescriptor::weekly(day, parse_time(v)?)))
            .collect(),
        Keyword::Monthly => values.iter().map(|v| parse_monthly(v)).collect(),
    }
}

/// Parser for directive lines
#[derive(Debug, Clone, Default)]
pub struct DirectiveParser {
    options: ParserOptions,
}

impl DirectiveParser {
    pub fn new(options: ParserOptions) -> Self {
        Self { options }
    }

    pub fn marker(&self) -> &str {
        &self.options.marker
    }

    /// Body tokens of a directive line, `None` if the line is not a directive
    pub fn directive_tokens(&self, line: &str) -> Option<Vec<String>> {
        let mut tokens = line.split_whitespace();

        let comment = tokens.next()?;
        if !(comment.eq_ignore_ascii_case("REM") || comment == "::") {
            return None;
        }

        let marker = tokens.next()?;
        if !marker.eq_ignore_ascii_case(&self.options.marker) {
            return None;
        }

        Some(tokens.map(str::to_string).collect())
    }

    /// Parse every directive line of a file. Malformed lines become
    /// diagnostics and never stop the remaining lines from being parsed.
    pub fn parse(&self, text: &str) -> ParsedDirectives {
        let mut parsed = ParsedDirectives::default();

        for (index, line) in text.lines().enumerate() {
            let Some(tokens) = self.directive_tokens(line) else {
                continue;
            };

            match parse_directive(&tokens) {
                Ok(triggers) => parsed.directives.push(DirectiveLine {
                    line_number: index + 1,
                    tokens,
                    triggers,
                }),
                Err(error) => parsed.diagnostics.push(Diagnostic {
                    line_number: index + 1,
                    line: line.trim().to_string(),
                    error,
                }),
            }
        }

        parsed
    }
}
