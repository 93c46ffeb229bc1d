//! Pulls the code payload out of free-form model output.
//!
//! Models ignore "code only" instructions often enough that the raw response
//! has to be cleaned up. The rules are tried in a fixed order:
//!
//! 1. A markdown fence: the body starts after the first newline following the
//!    opening ```` ``` ```` (which skips a language tag) and runs to the next
//!    fence, or to the end of the text if the fence is never closed. An opener
//!    with no newline after it falls back to the whole text.
//! 2. A `Code:` marker: everything after it, minus leading whitespace.
//! 3. Otherwise the text is returned untouched.

use std::ops::Range;

const FENCE: &str = "```";
const CODE_MARKER: &str = "Code:";

/// Which rule produced an extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Fenced,
    UnterminatedFence,
    Marker,
    Raw,
}

/// The outcome of [`classify`]: the rule that matched and the byte range of
/// the payload inside the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub strategy: Strategy,
    pub range: Range<usize>,
}

impl Extraction {
    fn raw(text: &str) -> Self {
        Self {
            strategy: Strategy::Raw,
            range: 0..text.len(),
        }
    }
}

/// Decide which rule applies to `text` and where its payload lies.
pub fn classify(text: &str) -> Extraction {
    if let Some(opener) = text.find(FENCE) {
        let after_opener = opener + FENCE.len();
        let Some(newline) = text[after_opener..].find('\n') else {
            return Extraction::raw(text);
        };
        let body_start = after_opener + newline + 1;

        return match text[body_start..].find(FENCE) {
            Some(close) => Extraction {
                strategy: Strategy::Fenced,
                range: body_start..body_start + close,
            },
            None => Extraction {
                strategy: Strategy::UnterminatedFence,
                range: body_start..text.len(),
            },
        };
    }

    if let Some(marker) = text.find(CODE_MARKER) {
        let after_marker = &text[marker + CODE_MARKER.len()..];
        let trimmed = after_marker.trim_start_matches([' ', '\n', '\t', '\r']);
        let start = text.len() - trimmed.len();
        return Extraction {
            strategy: Strategy::Marker,
            range: start..text.len(),
        };
    }

    Extraction::raw(text)
}

/// Extract the most plausible code payload from `text`.
pub fn extract(text: &str) -> &str {
    &text[classify(text).range]
}

/// Cap `code` at `max_bytes`, backing off to a char boundary. Never fails.
pub fn truncate(code: &str, max_bytes: usize) -> &str {
    if code.len() <= max_bytes {
        return code;
    }
    let mut end = max_bytes;
    while !code.is_char_boundary(end) {
        end -= 1;
    }
    &code[..end]
}
