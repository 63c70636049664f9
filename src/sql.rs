//! Text helpers for the SQL-flavoured listener.
//!
//! Mutations on real-time indexes (insert, replace, update, delete and index
//! maintenance) go through searchd's SQL listener rather than the binary
//! protocol. This module only produces statement text; sending it is up to the
//! caller's MySQL-compatible driver, pointed at
//! [`ClientConfig::sql_endpoint`](crate::config::ClientConfig::sql_endpoint).
//!
//! Rows are mapped to columns through the [`Row`] trait, so the column list is
//! fixed at compile time:
//!
//! ```
//! use searchd_client::sql::{self, Row, SqlValue};
//!
//! struct Doc {
//!     id: u64,
//!     group_id: u32,
//!     title: String,
//! }
//!
//! impl Row for Doc {
//!     fn columns() -> &'static [&'static str] {
//!         &["id", "group_id", "title"]
//!     }
//!
//!     fn values(&self) -> Vec<SqlValue> {
//!         vec![self.id.into(), self.group_id.into(), self.title.as_str().into()]
//!     }
//! }
//!
//! let doc = Doc { id: 1, group_id: 5, title: "it's here".into() };
//! assert_eq!(
//!     sql::insert("rt", &doc).unwrap(),
//!     r"INSERT INTO rt (id,group_id,title) VALUES (1,5,'it\'s here')"
//! );
//! ```

use crate::error::{Error, Result};

/// Primary key column every index carries.
pub const ID_COLUMN: &str = "id";

/// Escape `text` for use inside a quoted SQL string literal.
///
/// Covers NUL, `\n`, `\r`, `\`, `'`, `"` and Ctrl-Z, the same set
/// `mysql_real_escape_string` handles.
pub fn escape_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    for c in text.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\x1a' => out.push_str("\\Z"),
            c => out.push(c),
        }
    }
    out
}

/// Escape and single-quote `text`.
pub fn quote_str(text: &str) -> String {
    format!("'{}'", escape_string(text))
}

/// One column value ready to be rendered as a literal.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl SqlValue {
    /// Render as a literal: booleans become `Y`/`N`, numbers plain text,
    /// strings and bytes a quoted escaped string.
    ///
    /// Statements are text, so bytes that are not valid UTF-8 are rejected
    /// instead of being replaced.
    pub fn to_literal(&self) -> Result<String> {
        Ok(match self {
            Self::Bool(true) => "Y".to_string(),
            Self::Bool(false) => "N".to_string(),
            Self::Int(v) => v.to_string(),
            Self::UInt(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Text(s) => quote_str(s),
            Self::Bytes(b) => {
                let text = std::str::from_utf8(b).map_err(|e| {
                    Error::invalid(format!(
                        "byte value is not valid UTF-8 at offset {}",
                        e.valid_up_to()
                    ))
                })?;
                quote_str(text)
            }
        })
    }

    /// True for values rendered as quoted strings.
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_) | Self::Bytes(_))
    }

    fn as_id(&self) -> Option<u64> {
        match self {
            Self::UInt(v) => Some(*v),
            Self::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }
}

macro_rules! sql_value_from {
    ($variant:ident as $target:ty: $($src:ty),+) => {
        $(
            impl From<$src> for SqlValue {
                fn from(v: $src) -> Self {
                    Self::$variant(<$target>::from(v))
                }
            }
        )+
    };
}

sql_value_from!(Bool as bool: bool);
sql_value_from!(Int as i64: i8, i16, i32, i64);
sql_value_from!(UInt as u64: u8, u16, u32, u64);
sql_value_from!(Float as f64: f32, f64);
sql_value_from!(Text as String: String, &str);
sql_value_from!(Bytes as Vec<u8>: Vec<u8>, &[u8]);

/// Explicit mapping from a Rust value to index columns.
///
/// `values()` must return one value per entry of `columns()`, in the same order.
pub trait Row {
    fn columns() -> &'static [&'static str];

    fn values(&self) -> Vec<SqlValue>;
}

fn check_name(what: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::invalid(format!("{what} name is empty")));
    }
    Ok(())
}

fn row_values<R: Row>(row: &R) -> Result<Vec<(&'static str, SqlValue)>> {
    let columns = R::columns();
    let values = row.values();
    if columns.is_empty() {
        return Err(Error::invalid("row declares no columns"));
    }
    if columns.len() != values.len() {
        return Err(Error::invalid(format!(
            "row declares {} columns but produced {} values",
            columns.len(),
            values.len()
        )));
    }
    Ok(columns.iter().copied().zip(values).collect())
}

fn write_insert<R: Row>(verb: &str, index: &str, row: &R) -> Result<String> {
    check_name("index", index)?;
    let pairs = row_values(row)?;
    let columns: Vec<&str> = pairs.iter().map(|(c, _)| *c).collect();
    let values = pairs
        .iter()
        .map(|(_, v)| v.to_literal())
        .collect::<Result<Vec<_>>>()?;
    Ok(format!(
        "{verb} INTO {index} ({}) VALUES ({})",
        columns.join(","),
        values.join(",")
    ))
}

/// `INSERT INTO index (cols) VALUES (vals)` for every declared column.
pub fn insert<R: Row>(index: &str, row: &R) -> Result<String> {
    write_insert("INSERT", index, row)
}

/// Same as [`insert`] but overwrites an existing document with the same id.
pub fn replace<R: Row>(index: &str, row: &R) -> Result<String> {
    write_insert("REPLACE", index, row)
}

/// `UPDATE index SET col=val,... WHERE ...` for the listed columns.
///
/// Only numeric columns can be updated in place. Without `where_clause` the
/// row's own `id` column selects the document.
pub fn update<R: Row>(
    index: &str,
    row: &R,
    columns: &[&str],
    where_clause: Option<&str>,
) -> Result<String> {
    check_name("index", index)?;
    if columns.is_empty() {
        return Err(Error::invalid("no columns to update"));
    }
    let pairs = row_values(row)?;
    let lookup = |name: &str| {
        pairs
            .iter()
            .find(|(c, _)| c.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    };

    let mut sets = Vec::with_capacity(columns.len());
    for col in columns {
        let value = lookup(col)
            .ok_or_else(|| Error::invalid(format!("row has no column {col:?}")))?;
        if value.is_text() {
            return Err(Error::invalid(format!(
                "string column {col:?} cannot be updated in place"
            )));
        }
        sets.push(format!("{col}={}", value.to_literal()?));
    }

    let filter = match where_clause {
        Some(w) if !w.trim().is_empty() => w.to_string(),
        Some(_) => return Err(Error::invalid("where clause is empty")),
        None => {
            let id = lookup(ID_COLUMN)
                .and_then(SqlValue::as_id)
                .ok_or_else(|| Error::invalid("row has no integer id column to match on"))?;
            format!("{ID_COLUMN}={id}")
        }
    };
    Ok(format!("UPDATE {index} SET {} WHERE {filter}", sets.join(",")))
}

fn check_id(id: u64) -> Result<()> {
    if id == 0 {
        return Err(Error::invalid("document id must be positive"));
    }
    Ok(())
}

/// `DELETE FROM index WHERE id = N`.
pub fn delete(index: &str, id: u64) -> Result<String> {
    check_name("index", index)?;
    check_id(id)?;
    Ok(format!("DELETE FROM {index} WHERE id = {id}"))
}

/// `DELETE FROM index WHERE id IN (...)`; applies the same id rules as [`delete`].
pub fn delete_many(index: &str, ids: &[u64]) -> Result<String> {
    check_name("index", index)?;
    if ids.is_empty() {
        return Err(Error::invalid("no document ids to delete"));
    }
    let mut list = Vec::with_capacity(ids.len());
    for &id in ids {
        check_id(id)?;
        list.push(id.to_string());
    }
    Ok(format!("DELETE FROM {index} WHERE id IN ({})", list.join(",")))
}

/// Move a disk index into an empty RT index.
pub fn attach_index(disk_index: &str, rt_index: &str) -> Result<String> {
    check_name("disk index", disk_index)?;
    check_name("RT index", rt_index)?;
    Ok(format!("ATTACH INDEX {disk_index} TO RTINDEX {rt_index}"))
}

pub fn flush_rt(rt_index: &str) -> Result<String> {
    check_name("RT index", rt_index)?;
    Ok(format!("FLUSH RTINDEX {rt_index}"))
}

pub fn truncate_rt(rt_index: &str) -> Result<String> {
    check_name("RT index", rt_index)?;
    Ok(format!("TRUNCATE RTINDEX {rt_index}"))
}

pub fn optimize_index(rt_index: &str) -> Result<String> {
    check_name("RT index", rt_index)?;
    Ok(format!("OPTIMIZE INDEX {rt_index}"))
}
