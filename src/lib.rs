//! Client for the searchd full-text search daemon.
//!
//! [`SearchClient`] speaks the binary protocol: it batches search queries
//! built from a [`QueryConfig`] and runs the auxiliary commands (excerpts,
//! attribute updates, keywords, status, flush). [`sql`] renders statements for
//! the SQL listener. The `searchd` binary wraps both behind [`run`].
//!
//! Connection settings come from [`ClientConfig`]: defaults, then an optional
//! TOML file, then `SEARCHD_*` environment variables.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod excerpt;
pub mod protocol;
pub mod query;
pub mod sql;
pub mod update;

pub use client::SearchClient;
pub use config::ClientConfig;
pub use error::{DecodeError, Error};
pub use excerpt::ExcerptOptions;
pub use protocol::response::{AttrValue, Keyword, Match, SearchResult, WordInfo};
pub use query::QueryConfig;
pub use update::{AttributeUpdate, UpdateValue};

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use excerpt::{HtmlStripMode, PassageBoundary};

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "searchd",
    version,
    about = "Query and maintain a searchd full-text search daemon"
)]
pub struct Cli {
    /// TOML config file (defaults to the platform config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Daemon host, or a socket path (`/path` or `unix:///path`)
    #[arg(long)]
    pub host: Option<String>,

    /// Binary protocol port
    #[arg(long)]
    pub port: Option<u16>,

    /// Dial and handshake deadline in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<i64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a full-text query
    Query {
        text: String,

        /// Index expression (all indexes when omitted)
        #[arg(long, default_value = "")]
        index: String,

        #[arg(long, default_value_t = 20)]
        limit: i32,

        #[arg(long, default_value_t = 0)]
        offset: i32,

        /// Filter as `attr=v1,v2` (values) or `attr=min..max` (range); repeatable
        #[arg(long = "filter")]
        filters: Vec<String>,

        /// Invert every filter
        #[arg(long, default_value_t = false)]
        exclude: bool,

        /// Select expression
        #[arg(long)]
        select: Option<String>,

        /// Comment logged by the daemon next to the query
        #[arg(long, default_value = "")]
        comment: String,
    },
    /// Show how an index tokenizes a query
    Keywords {
        text: String,

        #[arg(long)]
        index: String,

        /// Include per-keyword document and hit counts
        #[arg(long, default_value_t = false)]
        hits: bool,
    },
    /// Highlight query words in documents
    Excerpts {
        #[arg(long)]
        index: String,

        #[arg(long)]
        words: String,

        /// Documents to highlight
        #[arg(required = true)]
        docs: Vec<String>,

        #[arg(long, default_value_t = excerpt::DEFAULT_LIMIT)]
        limit: u32,

        #[arg(long, default_value_t = excerpt::DEFAULT_AROUND)]
        around: u32,

        /// sentence, paragraph or zone
        #[arg(long, default_value = "")]
        boundary: String,

        /// none, strip, index or retain
        #[arg(long, default_value = "index")]
        html_strip: String,
    },
    /// Update one attribute in place
    Update {
        #[arg(long)]
        index: String,

        #[arg(long)]
        attr: String,

        /// Entries as `doc:value`, or `doc:v1,v2` with --mva
        #[arg(required = true)]
        entries: Vec<String>,

        /// Treat values as multi-valued attribute lists
        #[arg(long, default_value_t = false)]
        mva: bool,
    },
    /// Print daemon status counters
    Status,
    /// Flush attribute updates to disk
    Flush,
    /// Generate shell completions to stdout
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate man page to stdout
    Man,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "searchd", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Man => {
            let man = clap_mangen::Man::new(Cli::command());
            man.render(&mut std::io::stdout())?;
            return Ok(());
        }
        _ => {}
    }

    let config = resolve_config(&cli)?;
    let mut client = SearchClient::new(config);

    match cli.command {
        Commands::Query {
            text,
            index,
            limit,
            offset,
            filters,
            exclude,
            select,
            comment,
        } => {
            let q = client.query_config_mut();
            q.set_limits(offset, limit, query::DEFAULT_MAX_MATCHES as i32, 0)?;
            if let Some(select) = select {
                q.set_select(&select)?;
            }
            for expr in &filters {
                apply_filter(q, expr, exclude)?;
            }
            let result = client
                .query(&text, &index, &comment)
                .with_context(|| format!("query {text:?} failed"))?;
            print_json(&result)
        }
        Commands::Keywords { text, index, hits } => {
            let keywords = client.build_keywords(&text, &index, hits)?;
            print_json(&keywords)
        }
        Commands::Excerpts {
            index,
            words,
            docs,
            limit,
            around,
            boundary,
            html_strip,
        } => {
            let opts = ExcerptOptions {
                limit,
                around,
                passage_boundary: boundary.parse::<PassageBoundary>()?,
                html_strip_mode: html_strip.parse::<HtmlStripMode>()?,
                ..Default::default()
            };
            let snippets = client.build_excerpts(&docs, &index, &words, &opts)?;
            print_json(&snippets)
        }
        Commands::Update {
            index,
            attr,
            entries,
            mva,
        } => {
            let rows = entries
                .iter()
                .map(|e| parse_update_entry(e, mva))
                .collect::<Result<Vec<_>>>()?;
            let updated = client.update_attributes(&index, &[&attr], &rows)?;
            print_json(&serde_json::json!({ "updated": updated }))
        }
        Commands::Status => {
            let rows = client.status()?;
            print_json(&rows)
        }
        Commands::Flush => {
            let tag = client.flush_attributes()?;
            print_json(&serde_json::json!({ "flush_tag": tag }))
        }
        Commands::Completions { .. } | Commands::Man => Ok(()),
    }
}

/// Config file, then environment, then command-line flags.
pub fn resolve_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => match ClientConfig::default_path().filter(|p| p.exists()) {
            Some(path) => ClientConfig::load(&path)?,
            None => ClientConfig::default(),
        },
    };
    config.apply_env();

    if cli.host.is_some() || cli.port.is_some() {
        let host = cli.host.clone().unwrap_or_else(|| config.host.clone());
        let port = cli.port.unwrap_or(config.port);
        config.set_server(&host, port);
    }
    if let Some(ms) = cli.timeout_ms {
        config.set_connect_timeout(ms)?;
    }
    Ok(config)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Apply a `attr=v1,v2` or `attr=min..max` filter expression.
pub fn apply_filter(q: &mut QueryConfig, expr: &str, exclude: bool) -> Result<()> {
    let Some((attr, values)) = expr.split_once('=') else {
        bail!("filter {expr:?} must look like attr=v1,v2 or attr=min..max");
    };
    let attr = attr.trim();
    if let Some((min, max)) = values.split_once("..") {
        if let (Ok(min), Ok(max)) = (min.trim().parse::<u64>(), max.trim().parse::<u64>()) {
            q.set_filter_range(attr, min, max, exclude)?;
            return Ok(());
        }
        let min = min.trim().parse::<f32>().context("range minimum")?;
        let max = max.trim().parse::<f32>().context("range maximum")?;
        q.set_filter_float_range(attr, min, max, exclude)?;
        return Ok(());
    }
    let values = values
        .split(',')
        .map(|v| v.trim().parse::<u64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("filter values for {attr}"))?;
    q.set_filter(attr, &values, exclude)?;
    Ok(())
}

/// Parse `doc:value`, or `doc:v1,v2` when `mva` is set.
pub fn parse_update_entry(entry: &str, mva: bool) -> Result<AttributeUpdate> {
    let Some((doc, value)) = entry.split_once(':') else {
        bail!("update entry {entry:?} must look like doc:value");
    };
    let doc_id = doc.trim().parse::<u64>().context("document id")?;
    let value = if mva {
        let values = value
            .split(',')
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.trim().parse::<u32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("mva values")?;
        UpdateValue::Multi(values)
    } else {
        UpdateValue::Int(value.trim().parse::<u32>().context("attribute value")?)
    };
    Ok(AttributeUpdate {
        doc_id,
        values: vec![value],
    })
}
