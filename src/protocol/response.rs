//! Response body decoders.
//!
//! Attribute values are decoded according to the schema that precedes the
//! matches, so the `i`-th entry of [`Match::attrs`] always has the type named
//! by `attr_types[i]` of its [`SearchResult`].

use serde::Serialize;

use crate::error::DecodeError;
use crate::protocol::{AttrType, PacketReader, SearchdStatus};

/// One attribute value of a match.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    Uint(u32),
    BigInt(u64),
    Float(f32),
    String(String),
    Multi(Vec<u32>),
    Multi64(Vec<u64>),
}

impl AttrValue {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Uint(v) => Some(u64::from(*v)),
            Self::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

/// One matched document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    pub doc_id: u64,
    pub weight: i32,
    /// Values aligned with the result's attribute names and types.
    pub attrs: Vec<AttrValue>,
}

/// Per-keyword statistics reported with a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordInfo {
    /// Word form after tokenizing and stemming.
    pub word: String,
    /// Documents containing the word.
    pub docs: u32,
    /// Total occurrences.
    pub hits: u32,
}

/// Result set of one query in a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub status: SearchdStatus,
    pub fields: Vec<String>,
    pub attr_names: Vec<String>,
    pub attr_types: Vec<AttrType>,
    pub matches: Vec<Match>,
    /// Matches returned in this result set.
    pub total: u32,
    /// Matches found in the index(es).
    pub total_found: u32,
    /// Query time reported by the daemon, in seconds.
    pub time: f32,
    pub words: Vec<WordInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchResult {
    fn failed(status: SearchdStatus, message: String) -> Self {
        Self {
            status,
            fields: Vec::new(),
            attr_names: Vec::new(),
            attr_types: Vec::new(),
            matches: Vec::new(),
            total: 0,
            total_found: 0,
            time: 0.0,
            words: Vec::new(),
            warning: None,
            error: Some(message),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Position of `name` in the attribute schema.
    pub fn attr_index(&self, name: &str) -> Option<usize> {
        self.attr_names.iter().position(|n| n == name)
    }

    /// Value of attribute `name` on `m`.
    pub fn attr<'m>(&self, m: &'m Match, name: &str) -> Option<&'m AttrValue> {
        self.attr_index(name).and_then(|i| m.attrs.get(i))
    }
}

/// Tokenized form of a query keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Keyword {
    pub tokenized: String,
    pub normalized: String,
    /// Only filled when hit statistics were requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hits: Option<u32>,
}

// Smallest encodings, used to bound counts before allocating.
const MIN_STRING_LEN: usize = 4;
const MIN_ATTR_DEF_LEN: usize = 8;
const MIN_WORD_LEN: usize = 12;

fn decode_attr(r: &mut PacketReader<'_>, attr_type: AttrType) -> Result<AttrValue, DecodeError> {
    Ok(match attr_type {
        AttrType::BigInt => AttrValue::BigInt(r.get_u64()?),
        AttrType::Float => AttrValue::Float(r.get_f32()?),
        AttrType::String => AttrValue::String(r.get_string()?),
        AttrType::Multi => {
            let n = r.get_count(4, "mva values")?;
            let mut vals = Vec::with_capacity(n);
            for _ in 0..n {
                vals.push(r.get_u32()?);
            }
            AttrValue::Multi(vals)
        }
        AttrType::Multi64 => {
            // the count is in 32-bit words; each value spans two of them
            let words = r.get_count(4, "mva64 words")?;
            let mut vals = Vec::with_capacity(words / 2);
            for _ in 0..words / 2 {
                // only the first word of each pair is kept
                let lo = r.get_u32()?;
                let _hi = r.get_u32()?;
                vals.push(u64::from(lo));
            }
            // an odd trailing word belongs to no value; skip it to stay aligned
            if words % 2 == 1 {
                r.get_u32()?;
            }
            AttrValue::Multi64(vals)
        }
        _ => AttrValue::Uint(r.get_u32()?),
    })
}

fn decode_one(r: &mut PacketReader<'_>) -> Result<SearchResult, DecodeError> {
    let code = r.get_u32()?;
    let status = SearchdStatus::from_code(code);
    let mut warning = None;
    match status {
        Some(SearchdStatus::Ok) => {}
        Some(SearchdStatus::Warning) => warning = Some(r.get_string()?),
        Some(s @ (SearchdStatus::Error | SearchdStatus::Retry)) => {
            return Ok(SearchResult::failed(s, r.get_string()?));
        }
        None => {
            let message = r.get_string()?;
            return Ok(SearchResult::failed(
                SearchdStatus::Error,
                format!("unknown status {code}: {message}"),
            ));
        }
    }

    let nfields = r.get_count(MIN_STRING_LEN, "field names")?;
    let mut fields = Vec::with_capacity(nfields);
    for _ in 0..nfields {
        fields.push(r.get_string()?);
    }

    let nattrs = r.get_count(MIN_ATTR_DEF_LEN, "attribute schema")?;
    let mut attr_names = Vec::with_capacity(nattrs);
    let mut attr_types = Vec::with_capacity(nattrs);
    for _ in 0..nattrs {
        attr_names.push(r.get_string()?);
        attr_types.push(AttrType::from_code(r.get_u32()?));
    }

    let count_at = r.offset();
    let count = r.get_u32()? as usize;
    let id64 = r.get_u32()? == 1;
    // doc id + weight, before any attribute payload
    let min_match_len = if id64 { 12 } else { 8 };
    if count.saturating_mul(min_match_len) > r.remaining() {
        return Err(DecodeError {
            offset: count_at,
            wanted: count.saturating_mul(min_match_len),
            remaining: r.remaining(),
            what: "matches",
        });
    }

    let mut matches = Vec::with_capacity(count);
    for _ in 0..count {
        let doc_id = if id64 {
            r.get_u64()?
        } else {
            u64::from(r.get_u32()?)
        };
        let weight = r.get_i32()?;
        let mut attrs = Vec::with_capacity(nattrs);
        for attr_type in &attr_types {
            attrs.push(decode_attr(r, *attr_type)?);
        }
        matches.push(Match {
            doc_id,
            weight,
            attrs,
        });
    }

    let total = r.get_u32()?;
    let total_found = r.get_u32()?;
    let time = r.get_u32()? as f32 / 1000.0;

    let nwords = r.get_count(MIN_WORD_LEN, "word stats")?;
    let mut words = Vec::with_capacity(nwords);
    for _ in 0..nwords {
        words.push(WordInfo {
            word: r.get_string()?,
            docs: r.get_u32()?,
            hits: r.get_u32()?,
        });
    }

    Ok(SearchResult {
        status: status.unwrap_or(SearchdStatus::Ok),
        fields,
        attr_names,
        attr_types,
        matches,
        total,
        total_found,
        time,
        words,
        warning,
        error: None,
    })
}

/// Decode `count` consecutive result sets from a search reply body.
///
/// Per-query ERROR/RETRY statuses produce a result carrying the message and
/// decoding moves on to the next query; a truncated body fails the whole call.
pub fn decode_search_results(
    body: &[u8],
    count: usize,
) -> Result<Vec<SearchResult>, DecodeError> {
    let mut r = PacketReader::new(body);
    let mut results = Vec::with_capacity(count);
    for _ in 0..count {
        results.push(decode_one(&mut r)?);
    }
    Ok(results)
}

/// One snippet per input document, in input order.
pub fn decode_excerpts(body: &[u8], count: usize) -> Result<Vec<String>, DecodeError> {
    let mut r = PacketReader::new(body);
    (0..count).map(|_| r.get_string()).collect()
}

pub fn decode_keywords(body: &[u8], hits: bool) -> Result<Vec<Keyword>, DecodeError> {
    let mut r = PacketReader::new(body);
    let min_len = if hits { 16 } else { 8 };
    let n = r.get_count(min_len, "keywords")?;
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        let tokenized = r.get_string()?;
        let normalized = r.get_string()?;
        let (docs, hits) = if hits {
            (Some(r.get_u32()?), Some(r.get_u32()?))
        } else {
            (None, None)
        };
        out.push(Keyword {
            tokenized,
            normalized,
            docs,
            hits,
        });
    }
    Ok(out)
}

/// Status reply: a `rows x cols` matrix of strings, usually name/value pairs.
pub fn decode_status(body: &[u8]) -> Result<Vec<Vec<String>>, DecodeError> {
    let mut r = PacketReader::new(body);
    let rows = r.get_u32()? as usize;
    let cols = r.get_u32()? as usize;
    let cells = rows.saturating_mul(cols);
    if cells.saturating_mul(MIN_STRING_LEN) > r.remaining() {
        return Err(DecodeError {
            offset: r.offset(),
            wanted: cells.saturating_mul(MIN_STRING_LEN),
            remaining: r.remaining(),
            what: "status matrix",
        });
    }
    let mut out = Vec::with_capacity(rows);
    for _ in 0..rows {
        let mut row = Vec::with_capacity(cols);
        for _ in 0..cols {
            row.push(r.get_string()?);
        }
        out.push(row);
    }
    Ok(out)
}

/// Leading `u32` of a reply (update counts, flush tags).
pub fn decode_u32(body: &[u8]) -> Result<u32, DecodeError> {
    PacketReader::new(body).get_u32()
}
