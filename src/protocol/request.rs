//! Request body encoders.
//!
//! Each encoder builds its whole body in a fresh [`PacketWriter`] and only
//! hands it back once every field has been written, so a validation failure
//! never leaves partial bytes anywhere.

use crate::error::{Error, Result};
use crate::excerpt::ExcerptOptions;
use crate::protocol::{AttrType, PacketWriter};
use crate::query::{Filter, Override, OverrideValue, QueryConfig, RankMode};
use crate::update::{AttributeUpdate, UpdateValue, check_rows};

/// One fully encoded search query, ready to be batched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    body: Vec<u8>,
}

impl SearchRequest {
    pub fn as_bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Advisory retry settings the daemon applies to its own sub-queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryHint {
    pub count: u32,
    pub delay: u32,
}

fn put_filter(w: &mut PacketWriter, filter: &Filter) {
    w.put_str(filter.attr());
    w.put_u32(filter.type_code());
    match filter {
        Filter::Values { values, .. } => {
            w.put_len(values.len());
            for v in values {
                w.put_u64(*v);
            }
        }
        Filter::Range { min, max, .. } => {
            w.put_u64(*min);
            w.put_u64(*max);
        }
        Filter::FloatRange { min, max, .. } => {
            w.put_f32(*min);
            w.put_f32(*max);
        }
    }
    w.put_flag(filter.exclude());
}

fn put_override(w: &mut PacketWriter, ov: &Override) -> Result<()> {
    w.put_str(&ov.attr);
    w.put_u32(ov.attr_type.code());
    w.put_len(ov.values.len());
    for (doc_id, value) in &ov.values {
        w.put_u64(*doc_id);
        match (ov.attr_type, value) {
            (
                AttrType::Integer | AttrType::Timestamp | AttrType::Ordinal | AttrType::Bool,
                OverrideValue::Int(v),
            ) => w.put_u32(*v),
            (AttrType::Float, OverrideValue::Float(v)) => w.put_f32(*v),
            (AttrType::BigInt, OverrideValue::BigInt(v)) => w.put_u64(*v),
            (attr_type, value) => {
                return Err(Error::config(format!(
                    "override {}: doc {doc_id} has {value:?}, which cannot encode as {attr_type:?}",
                    ov.attr
                )));
            }
        }
    }
    Ok(())
}

/// Serialize one query in searchd's fixed field order.
pub fn encode_search(
    q: &QueryConfig,
    query: &str,
    index: &str,
    comment: &str,
    retry: RetryHint,
) -> Result<SearchRequest> {
    let mut w = PacketWriter::with_capacity(256 + query.len());

    w.put_u32(q.offset);
    w.put_u32(q.limit);
    w.put_u32(q.match_mode.code());
    w.put_u32(q.rank_mode.code());
    if q.rank_mode == RankMode::Expr {
        w.put_str(&q.rank_expr);
    }
    w.put_u32(q.sort_mode.code());
    w.put_str(&q.sort_by);
    w.put_str(query);

    w.put_len(q.weights.len());
    for weight in &q.weights {
        w.put_u32(*weight);
    }

    w.put_str(index);

    // id64 range marker
    w.put_u32(1);
    w.put_u64(q.min_id);
    w.put_u64(q.max_id);

    w.put_len(q.filters.len());
    for filter in &q.filters {
        put_filter(&mut w, filter);
    }

    w.put_u32(q.group_func.code());
    w.put_str(&q.group_by);
    w.put_u32(q.max_matches);
    w.put_str(&q.group_sort);

    w.put_u32(q.cutoff);
    w.put_u32(retry.count);
    w.put_u32(retry.delay);

    w.put_str(&q.group_distinct);

    match &q.geo_anchor {
        Some(anchor) => {
            w.put_u32(1);
            w.put_str(&anchor.lat_attr);
            w.put_str(&anchor.lon_attr);
            w.put_f32(anchor.lat);
            w.put_f32(anchor.lon);
        }
        None => w.put_u32(0),
    }

    w.put_len(q.index_weights.len());
    for (name, weight) in &q.index_weights {
        w.put_str(name);
        w.put_u32(*weight);
    }

    w.put_u32(q.max_query_time);

    w.put_len(q.field_weights.len());
    for (name, weight) in &q.field_weights {
        w.put_str(name);
        w.put_u32(*weight);
    }

    w.put_str(comment);

    w.put_len(q.overrides.len());
    for ov in q.overrides.values() {
        put_override(&mut w, ov)?;
    }

    w.put_str(&q.select);

    Ok(SearchRequest {
        body: w.into_inner(),
    })
}

/// Frame queued queries as one multi-query body.
pub fn encode_batch(requests: &[SearchRequest]) -> Vec<u8> {
    let total: usize = requests.iter().map(SearchRequest::len).sum();
    let mut w = PacketWriter::with_capacity(8 + total);
    // client marker
    w.put_u32(0);
    w.put_len(requests.len());
    for req in requests {
        w.put_raw(req.as_bytes());
    }
    w.into_inner()
}

/// Body of an excerpt request. Validates inputs and applies option defaults.
pub fn encode_excerpts<S: AsRef<str>>(
    docs: &[S],
    index: &str,
    words: &str,
    opts: &ExcerptOptions,
) -> Result<Vec<u8>> {
    if docs.is_empty() {
        return Err(Error::invalid("no documents to process"));
    }
    if index.is_empty() {
        return Err(Error::invalid("index name is empty"));
    }
    if words.is_empty() {
        return Err(Error::invalid("no words to highlight"));
    }
    let opts = opts.normalized();

    let mut w = PacketWriter::new();
    // mode
    w.put_u32(0);
    w.put_u32(opts.flags());
    w.put_str(index);
    w.put_str(words);

    w.put_str(&opts.before_match);
    w.put_str(&opts.after_match);
    w.put_str(&opts.chunk_separator);
    w.put_u32(opts.limit);
    w.put_u32(opts.around);
    w.put_u32(opts.limit_passages);
    w.put_u32(opts.limit_words);
    w.put_u32(opts.start_passage_id);
    w.put_str(opts.html_strip_mode.as_str());
    w.put_str(opts.passage_boundary.as_str());

    w.put_len(docs.len());
    for doc in docs {
        w.put_str(doc.as_ref());
    }
    Ok(w.into_inner())
}

/// Body of an attribute update request.
pub fn encode_update(
    index: &str,
    attrs: &[&str],
    rows: &[AttributeUpdate],
) -> Result<Vec<u8>> {
    if index.is_empty() {
        return Err(Error::invalid("index name is empty"));
    }
    let mva = check_rows(attrs, rows)?;

    let mut w = PacketWriter::new();
    w.put_str(index);
    w.put_len(attrs.len());
    for attr in attrs {
        w.put_str(attr);
        w.put_flag(mva);
    }

    w.put_len(rows.len());
    for row in rows {
        w.put_u64(row.doc_id);
        for value in &row.values {
            match value {
                UpdateValue::Int(v) => w.put_u32(*v),
                UpdateValue::Multi(vs) => {
                    w.put_len(vs.len());
                    for v in vs {
                        w.put_u32(*v);
                    }
                }
            }
        }
    }
    Ok(w.into_inner())
}

/// Body of a keyword extraction request.
pub fn encode_keywords(query: &str, index: &str, hits: bool) -> Vec<u8> {
    let mut w = PacketWriter::new();
    w.put_str(query);
    w.put_str(index);
    w.put_flag(hits);
    w.into_inner()
}

/// Body of a status request.
pub fn encode_status() -> Vec<u8> {
    1u32.to_be_bytes().to_vec()
}

/// Body of the persist command: keep the connection open across commands.
pub fn encode_persist() -> Vec<u8> {
    1u32.to_be_bytes().to_vec()
}
