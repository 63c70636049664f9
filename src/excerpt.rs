//! Snippet (excerpt) generation options.

use std::str::FromStr;

use crate::error::Error;

/// Boundary passages must not cross.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassageBoundary {
    #[default]
    None,
    Sentence,
    Paragraph,
    Zone,
}

impl PassageBoundary {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Sentence => "sentence",
            Self::Paragraph => "paragraph",
            Self::Zone => "zone",
        }
    }
}

impl FromStr for PassageBoundary {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(Self::None),
            "sentence" => Ok(Self::Sentence),
            "paragraph" => Ok(Self::Paragraph),
            "zone" => Ok(Self::Zone),
            other => Err(Error::invalid(format!(
                "passage boundary must be sentence, paragraph or zone, got {other:?}"
            ))),
        }
    }
}

/// HTML stripping applied to documents before highlighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HtmlStripMode {
    None,
    Strip,
    #[default]
    Index,
    Retain,
}

impl HtmlStripMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Strip => "strip",
            Self::Index => "index",
            Self::Retain => "retain",
        }
    }
}

impl FromStr for HtmlStripMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "strip" => Ok(Self::Strip),
            "index" => Ok(Self::Index),
            "retain" => Ok(Self::Retain),
            other => Err(Error::invalid(format!("unknown html strip mode {other:?}"))),
        }
    }
}

pub const DEFAULT_BEFORE_MATCH: &str = "<b>";
pub const DEFAULT_AFTER_MATCH: &str = "</b>";
pub const DEFAULT_CHUNK_SEPARATOR: &str = " ... ";
pub const DEFAULT_LIMIT: u32 = 256;
pub const DEFAULT_AROUND: u32 = 5;
pub const DEFAULT_START_PASSAGE_ID: u32 = 1;

// remove_spaces is always requested
const FLAG_REMOVE_SPACES: u32 = 1;
const FLAG_EXACT_PHRASE: u32 = 2;
const FLAG_SINGLE_PASSAGE: u32 = 4;
const FLAG_USE_BOUNDARIES: u32 = 8;
const FLAG_WEIGHT_ORDER: u32 = 16;
const FLAG_QUERY_MODE: u32 = 32;
const FLAG_FORCE_ALL_WORDS: u32 = 64;
const FLAG_LOAD_FILES: u32 = 128;
const FLAG_ALLOW_EMPTY: u32 = 256;
const FLAG_EMIT_ZONES: u32 = 512;
const FLAG_LOAD_FILES_SCATTERED: u32 = 1024;

/// Highlighting options for [`SearchClient::build_excerpts`](crate::client::SearchClient::build_excerpts).
///
/// Empty strings and zero numbers fall back to the documented defaults when
/// the request is encoded, so `ExcerptOptions { limit: 60, ..Default::default() }`
/// behaves as expected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcerptOptions {
    /// Inserted before each keyword match. Default `<b>`.
    pub before_match: String,
    /// Inserted after each keyword match. Default `</b>`.
    pub after_match: String,
    /// Inserted between passages. Default ` ... `.
    pub chunk_separator: String,
    /// Maximum snippet size in codepoints. Default 256.
    pub limit: u32,
    /// Words of context around each match block. Default 5.
    pub around: u32,
    /// Maximum passages per snippet, 0 for no limit.
    pub limit_passages: u32,
    /// Maximum keywords per snippet, 0 for no limit.
    pub limit_words: u32,
    /// First value of the `%PASSAGE_ID%` macro. Default 1.
    pub start_passage_id: u32,
    pub html_strip_mode: HtmlStripMode,
    pub passage_boundary: PassageBoundary,
    /// Highlight exact phrase matches only.
    pub exact_phrase: bool,
    /// Extract the single best passage.
    pub single_passage: bool,
    /// Also break passages on phrase boundary characters.
    pub use_boundaries: bool,
    /// Order passages by relevance instead of position.
    pub weight_order: bool,
    /// Treat the words as an extended-syntax query.
    pub query_mode: bool,
    /// Ignore `limit` until every keyword is included.
    pub force_all_words: bool,
    /// Treat documents as server-side file names.
    pub load_files: bool,
    /// Like `load_files`, with the files spread over remote agents.
    pub load_files_scattered: bool,
    /// Return an empty string instead of the document head when nothing matches.
    pub allow_empty: bool,
    /// Emit the enclosing zone name before each passage.
    pub emit_zones: bool,
}

impl Default for ExcerptOptions {
    fn default() -> Self {
        Self {
            before_match: DEFAULT_BEFORE_MATCH.to_string(),
            after_match: DEFAULT_AFTER_MATCH.to_string(),
            chunk_separator: DEFAULT_CHUNK_SEPARATOR.to_string(),
            limit: DEFAULT_LIMIT,
            around: DEFAULT_AROUND,
            limit_passages: 0,
            limit_words: 0,
            start_passage_id: DEFAULT_START_PASSAGE_ID,
            html_strip_mode: HtmlStripMode::default(),
            passage_boundary: PassageBoundary::default(),
            exact_phrase: false,
            single_passage: false,
            use_boundaries: false,
            weight_order: false,
            query_mode: false,
            force_all_words: false,
            load_files: false,
            load_files_scattered: false,
            allow_empty: false,
            emit_zones: false,
        }
    }
}

fn or_default(value: &str, default: &'static str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

fn nonzero_or(value: u32, default: u32) -> u32 {
    if value == 0 { default } else { value }
}

impl ExcerptOptions {
    /// Copy with empty/zero fields replaced by defaults.
    pub fn normalized(&self) -> Self {
        Self {
            before_match: or_default(&self.before_match, DEFAULT_BEFORE_MATCH),
            after_match: or_default(&self.after_match, DEFAULT_AFTER_MATCH),
            chunk_separator: or_default(&self.chunk_separator, DEFAULT_CHUNK_SEPARATOR),
            limit: nonzero_or(self.limit, DEFAULT_LIMIT),
            around: nonzero_or(self.around, DEFAULT_AROUND),
            start_passage_id: nonzero_or(self.start_passage_id, DEFAULT_START_PASSAGE_ID),
            ..self.clone()
        }
    }

    /// Boolean options packed into the wire bitmask.
    pub fn flags(&self) -> u32 {
        [
            (true, FLAG_REMOVE_SPACES),
            (self.exact_phrase, FLAG_EXACT_PHRASE),
            (self.single_passage, FLAG_SINGLE_PASSAGE),
            (self.use_boundaries, FLAG_USE_BOUNDARIES),
            (self.weight_order, FLAG_WEIGHT_ORDER),
            (self.query_mode, FLAG_QUERY_MODE),
            (self.force_all_words, FLAG_FORCE_ALL_WORDS),
            (self.load_files, FLAG_LOAD_FILES),
            (self.allow_empty, FLAG_ALLOW_EMPTY),
            (self.emit_zones, FLAG_EMIT_ZONES),
            (self.load_files_scattered, FLAG_LOAD_FILES_SCATTERED),
        ]
        .into_iter()
        .filter(|(on, _)| *on)
        .fold(0, |acc, (_, bit)| acc | bit)
    }
}
