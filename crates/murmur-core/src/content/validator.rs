//! Content admission validator.
//!
//! Pipeline (short-circuits on the first failure):
//! 1. normalize
//! 2. length floor / 3. length ceiling
//! 4. line-break ceiling
//! 5. single-character repetition share
//! 6. short-line spam

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{ContentErrorKind, MurmurError, Result};

use super::normalize::normalize;
use super::sanitize::strip_markup;

/// Thresholds for the validator. Lengths are counted in `char`s.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationOptions {
    #[serde(default = "default_min_length")]
    pub min_length: usize,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default = "default_max_line_breaks")]
    pub max_line_breaks: usize,
    /// Share (in percent) a single character may take of all non-whitespace characters.
    #[serde(default = "default_max_repetition_percent")]
    pub max_repetition_percent: u32,
    #[serde(default = "default_min_average_line_length")]
    pub min_average_line_length: usize,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            min_length: default_min_length(),
            max_length: default_max_length(),
            max_line_breaks: default_max_line_breaks(),
            max_repetition_percent: default_max_repetition_percent(),
            min_average_line_length: default_min_average_line_length(),
        }
    }
}

impl ValidationOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_length == 0 || self.min_length > self.max_length {
            return Err(MurmurError::BadRequest(
                "content.min_length must not exceed content.max_length (> 0)".into(),
            ));
        }
        if !(1..=100).contains(&self.max_repetition_percent) {
            return Err(MurmurError::BadRequest(
                "content.max_repetition_percent must be between 1 and 100".into(),
            ));
        }
        Ok(())
    }
}

fn default_min_length() -> usize {
    5
}
fn default_max_length() -> usize {
    350
}
fn default_max_line_breaks() -> usize {
    5
}
fn default_max_repetition_percent() -> u32 {
    70
}
fn default_min_average_line_length() -> usize {
    2
}

/// Outcome of one validation call. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// `normalized` is the canonical text; submit this, not the original.
    Accepted { normalized: String },
    Rejected {
        kind: ContentErrorKind,
        message: String,
    },
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Accepted { .. })
    }

    pub fn error_kind(&self) -> Option<ContentErrorKind> {
        match self {
            ValidationResult::Accepted { .. } => None,
            ValidationResult::Rejected { kind, .. } => Some(*kind),
        }
    }

    pub fn normalized_message(&self) -> Option<&str> {
        match self {
            ValidationResult::Accepted { normalized } => Some(normalized),
            ValidationResult::Rejected { .. } => None,
        }
    }

    /// Convert into the shared error surface, yielding the canonical text on success.
    pub fn into_result(self) -> Result<String> {
        match self {
            ValidationResult::Accepted { normalized } => Ok(normalized),
            ValidationResult::Rejected { kind, message } => {
                Err(MurmurError::Content { kind, message })
            }
        }
    }

    fn reject(kind: ContentErrorKind, message: impl Into<String>) -> Self {
        ValidationResult::Rejected {
            kind,
            message: message.into(),
        }
    }
}

/// Sanitize markup, then validate.
///
/// A non-empty draft that sanitizes to nothing is `invalid_content` and the
/// validator pipeline is not run.
pub fn admit(raw: &str, opts: &ValidationOptions) -> ValidationResult {
    let clean = strip_markup(raw);
    if clean.is_empty() && !raw.is_empty() {
        return ValidationResult::reject(
            ContentErrorKind::InvalidContent,
            "Message contains invalid content.",
        );
    }
    validate(&clean, opts)
}

/// Run the validator pipeline on already-sanitized text.
pub fn validate(message: &str, opts: &ValidationOptions) -> ValidationResult {
    let normalized = normalize(message);
    let len = normalized.chars().count();

    if len < opts.min_length {
        return ValidationResult::reject(
            ContentErrorKind::TooShort,
            format!("Message must be at least {} characters.", opts.min_length),
        );
    }
    if len > opts.max_length {
        return ValidationResult::reject(
            ContentErrorKind::TooLong,
            format!("Message cannot exceed {} characters.", opts.max_length),
        );
    }

    let line_breaks = normalized.matches('\n').count();
    if line_breaks > opts.max_line_breaks {
        return ValidationResult::reject(
            ContentErrorKind::TooManyLineBreaks,
            format!(
                "Message cannot contain more than {} line breaks.",
                opts.max_line_breaks
            ),
        );
    }

    if let Some(rejected) = check_repetition(&normalized, opts.max_repetition_percent) {
        return rejected;
    }
    if let Some(rejected) = check_short_lines(&normalized, opts.min_average_line_length) {
        return rejected;
    }

    ValidationResult::Accepted { normalized }
}

fn check_repetition(message: &str, max_percent: u32) -> Option<ValidationResult> {
    let mut counts: HashMap<char, usize> = HashMap::new();
    let mut total = 0usize;
    for ch in message.chars().filter(|c| !c.is_whitespace()) {
        *counts.entry(ch).or_insert(0) += 1;
        total += 1;
    }

    if total == 0 {
        return Some(ValidationResult::reject(
            ContentErrorKind::EmptyMessage,
            "Message cannot be empty.",
        ));
    }

    let top = counts.values().copied().max().unwrap_or(0);
    // top / total > max_percent / 100, kept in integers
    if top * 100 > max_percent as usize * total {
        return Some(ValidationResult::reject(
            ContentErrorKind::ExcessiveRepetition,
            "Your message contains too much repetition. Please vary your content.",
        ));
    }
    None
}

fn check_short_lines(message: &str, min_average: usize) -> Option<ValidationResult> {
    let lines: Vec<&str> = message
        .split('\n')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.len() <= 1 {
        return None;
    }

    let chars: usize = lines.iter().map(|l| l.chars().count()).sum();
    // mean < min_average, kept in integers
    let below_average = chars < min_average * lines.len();
    if below_average && lines.len() > 3 {
        return Some(ValidationResult::reject(
            ContentErrorKind::ShortLineSpam,
            "Your message contains too many short lines. Please use normal formatting.",
        ));
    }
    None
}
