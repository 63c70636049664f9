//! High-level client: query batching plus the auxiliary commands.

use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::excerpt::ExcerptOptions;
use crate::protocol::Command;
use crate::protocol::request::{
    RetryHint, SearchRequest, encode_batch, encode_excerpts, encode_keywords, encode_search,
    encode_status, encode_update,
};
use crate::protocol::response::{
    Keyword, SearchResult, decode_excerpts, decode_keywords, decode_search_results, decode_status,
    decode_u32,
};
use crate::query::QueryConfig;
use crate::update::AttributeUpdate;

/// Index expression that searches every local index.
pub const ALL_INDEXES: &str = "*";

/// Client for one searchd instance.
///
/// Owns a single connection and a queue of pending search requests. Not meant
/// to be shared between threads; create one client per worker instead.
#[derive(Debug)]
pub struct SearchClient {
    config: ClientConfig,
    query: QueryConfig,
    pending: Vec<SearchRequest>,
    conn: Connection,
}

impl Default for SearchClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl SearchClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            query: QueryConfig::default(),
            pending: Vec::new(),
            conn: Connection::new(),
        }
    }

    /// Client configured from `SEARCHD_*` environment variables.
    pub fn with_defaults() -> Self {
        Self::new(ClientConfig::from_env())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Mutable access to the connection settings; takes effect on the next connect.
    pub fn config_mut(&mut self) -> &mut ClientConfig {
        &mut self.config
    }

    pub fn query_config(&self) -> &QueryConfig {
        &self.query
    }

    /// Settings snapshotted by the next [`add_query`](Self::add_query).
    pub fn query_config_mut(&mut self) -> &mut QueryConfig {
        &mut self.query
    }

    pub fn set_query_config(&mut self, query: QueryConfig) -> &mut Self {
        self.query = query;
        self
    }

    /// Number of queued requests.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Warning attached to the last reply or to the last [`query`](Self::query) result.
    pub fn last_warning(&self) -> Option<&str> {
        self.conn.last_warning()
    }

    /// True when the last failure came from the transport, so retrying may help.
    pub fn is_connect_error(&self) -> bool {
        self.conn.is_connect_error()
    }

    /// Connect without switching to persistent mode.
    pub fn connect(&mut self) -> Result<()> {
        self.conn.connect(&self.config)
    }

    /// Open a persistent connection reused by every following command.
    pub fn open(&mut self) -> Result<()> {
        self.conn.open(&self.config)
    }

    pub fn close(&mut self) -> Result<()> {
        self.conn.close()
    }

    fn retry_hint(&self) -> RetryHint {
        RetryHint {
            count: self.config.retry_count,
            delay: self.config.retry_delay,
        }
    }

    /// Encode the current query settings and queue them; returns the queue position.
    ///
    /// An empty `index` searches all indexes. Nothing is queued when encoding fails.
    pub fn add_query(&mut self, query: &str, index: &str, comment: &str) -> Result<usize> {
        let index = if index.is_empty() { ALL_INDEXES } else { index };
        let request = encode_search(&self.query, query, index, comment, self.retry_hint())?;
        self.pending.push(request);
        debug!(position = self.pending.len() - 1, index, "Queued search request");
        Ok(self.pending.len() - 1)
    }

    /// Send every queued request in one round trip and decode one result per request.
    ///
    /// The queue is emptied only when the whole batch decoded; per-query
    /// failures are reported inside the matching [`SearchResult`].
    pub fn run_queries(&mut self) -> Result<Vec<SearchResult>> {
        if self.pending.is_empty() {
            return Err(Error::NoQueries);
        }
        let body = encode_batch(&self.pending);
        let reply = self.conn.request(&self.config, Command::Search, &body)?;
        let results = decode_search_results(&reply, self.pending.len())?;
        self.pending.clear();

        for (i, result) in results.iter().enumerate() {
            if let Some(err) = &result.error {
                debug!(query = i, error = %err, "Query failed");
            }
        }
        Ok(results)
    }

    /// Run a single query, replacing anything queued.
    ///
    /// A result-level error becomes [`Error::Protocol`]; a result-level warning
    /// is kept as [`last_warning`](Self::last_warning).
    pub fn query(&mut self, query: &str, index: &str, comment: &str) -> Result<SearchResult> {
        self.pending.clear();
        self.add_query(query, index, comment)?;
        let mut results = self.run_queries()?;
        if results.is_empty() {
            return Err(Error::Protocol("empty result set".into()));
        }
        let result = results.swap_remove(0);
        if let Some(err) = &result.error {
            return Err(Error::Protocol(err.clone()));
        }
        if let Some(warning) = &result.warning {
            warn!(warning = %warning, "Query returned a warning");
            self.conn.set_warning(Some(warning.clone()));
        }
        Ok(result)
    }

    /// Highlight `words` in each document; one snippet per document, in order.
    pub fn build_excerpts<S: AsRef<str>>(
        &mut self,
        docs: &[S],
        index: &str,
        words: &str,
        opts: &ExcerptOptions,
    ) -> Result<Vec<String>> {
        let body = encode_excerpts(docs, index, words, opts)?;
        let reply = self.conn.request(&self.config, Command::Excerpt, &body)?;
        Ok(decode_excerpts(&reply, docs.len())?)
    }

    /// Overwrite attribute values in place; returns how many documents were updated.
    pub fn update_attributes(
        &mut self,
        index: &str,
        attrs: &[&str],
        rows: &[AttributeUpdate],
    ) -> Result<u32> {
        let body = encode_update(index, attrs, rows)?;
        let reply = self.conn.request(&self.config, Command::Update, &body)?;
        Ok(decode_u32(&reply)?)
    }

    /// Tokenize `query` the way `index` would, optionally with per-keyword statistics.
    pub fn build_keywords(&mut self, query: &str, index: &str, hits: bool) -> Result<Vec<Keyword>> {
        let body = encode_keywords(query, index, hits);
        let reply = self.conn.request(&self.config, Command::Keywords, &body)?;
        Ok(decode_keywords(&reply, hits)?)
    }

    /// Daemon status counters as rows of strings.
    pub fn status(&mut self) -> Result<Vec<Vec<String>>> {
        let reply = self.conn.request(&self.config, Command::Status, &encode_status())?;
        Ok(decode_status(&reply)?)
    }

    /// Force attribute updates to disk; returns the flush tag.
    pub fn flush_attributes(&mut self) -> Result<u32> {
        let reply = self.conn.request(&self.config, Command::FlushAttrs, &[])?;
        if reply.len() != 4 {
            return Err(Error::Protocol(format!(
                "unexpected flush response length {}",
                reply.len()
            )));
        }
        Ok(decode_u32(&reply)?)
    }
}
