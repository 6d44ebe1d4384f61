//! Best-effort structured data extraction from free-text model output.

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;

/// Bracket positions tried as embedded JSON starts. Each attempt scans to the
/// end of its expression, so the cap keeps extraction linear in the reply.
const MAX_CANDIDATE_STARTS: usize = 32;

lazy_static! {
    static ref FENCED_BLOCK: Regex =
        Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").expect("valid fenced block regex");
}

/// Outcome of parsing model output into `T`.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedOutput<T> {
    /// The whole response was valid JSON for `T`.
    Structured(T),
    /// `T` was recovered from a fenced block or an embedded substring.
    ExtractedFallback(T),
    /// Nothing in the response parsed as `T`.
    Unparseable(String),
}

impl<T> ParsedOutput<T> {
    pub fn into_value(self) -> Option<T> {
        match self {
            ParsedOutput::Structured(value) | ParsedOutput::ExtractedFallback(value) => {
                Some(value)
            }
            ParsedOutput::Unparseable(_) => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ParsedOutput::ExtractedFallback(_))
    }
}

/// Parses `text` as `T`, trying in order: the whole text, fenced code blocks,
/// then balanced `[...]` / `{...}` substrings from left to right.
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> ParsedOutput<T> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return ParsedOutput::Unparseable("empty response".to_string());
    }

    let direct_err = match serde_json::from_str::<T>(trimmed) {
        Ok(value) => return ParsedOutput::Structured(value),
        Err(e) => e,
    };

    for captures in FENCED_BLOCK.captures_iter(trimmed) {
        if let Some(block) = captures.get(1) {
            if let Ok(value) = serde_json::from_str::<T>(block.as_str().trim()) {
                return ParsedOutput::ExtractedFallback(value);
            }
        }
    }

    for candidate in balanced_candidates(trimmed) {
        if let Ok(value) = serde_json::from_str::<T>(candidate) {
            return ParsedOutput::ExtractedFallback(value);
        }
    }

    ParsedOutput::Unparseable(direct_err.to_string())
}

/// Yields the balanced bracket substring starting at each of the first
/// [`MAX_CANDIDATE_STARTS`] `[` or `{` characters.
fn balanced_candidates(text: &str) -> impl Iterator<Item = &str> {
    text.char_indices()
        .filter(|(_, c)| *c == '[' || *c == '{')
        .take(MAX_CANDIDATE_STARTS)
        .filter_map(move |(start, _)| balanced_end(&text[start..]).map(|end| &text[start..start + end]))
}

/// Byte length of the balanced bracket expression at the start of `text`,
/// ignoring brackets inside JSON strings.
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}
