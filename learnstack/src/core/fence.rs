//! Extraction of fenced structured blocks from free-form model output.
//!
//! Only the first top-level fence carrying the expected language tag is
//! considered. The opening fence must be followed by a newline and the
//! closing fence must start a line, so inline triple backticks inside the
//! block body do not terminate it early.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

static MARKDOWN_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?msR)```(?i:markdown)[ \t]*$\n?(.*?)^[ \t]*```[ \t]*$").unwrap()
});

static JSON_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?msR)```(?i:json)[ \t]*$\n?(.*?)^[ \t]*```[ \t]*$").unwrap());

/// Language tag a fenced block must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceTag {
    Markdown,
    Json,
}

impl FenceTag {
    fn pattern(self) -> &'static Regex {
        match self {
            FenceTag::Markdown => &MARKDOWN_FENCE,
            FenceTag::Json => &JSON_FENCE,
        }
    }
}

/// A located fence inside a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedBlock<'a> {
    source: &'a str,
    span: Range<usize>,
    inner: Range<usize>,
}

impl<'a> FencedBlock<'a> {
    /// Block body without fence markers, trimmed.
    pub fn inner(&self) -> &'a str {
        self.source[self.inner.clone()].trim()
    }

    /// Response text with the whole fence (markers and body) removed, trimmed.
    pub fn surrounding_text(&self) -> String {
        let before = self.source[..self.span.start].trim_end();
        let after = self.source[self.span.end..].trim_start();
        match (before.is_empty(), after.is_empty()) {
            (true, _) => after.trim_end().to_string(),
            (false, true) => before.trim_start().to_string(),
            (false, false) => format!("{}\n\n{}", before.trim_start(), after.trim_end()),
        }
    }
}

/// Locate the first fenced block tagged `tag`, matching non-greedily.
pub fn extract_fenced_block(text: &str, tag: FenceTag) -> Option<FencedBlock<'_>> {
    let caps = tag.pattern().captures(text)?;
    let whole = caps.get(0)?;
    let body = caps.get(1)?;
    Some(FencedBlock {
        source: text,
        span: whole.range(),
        inner: body.range(),
    })
}
