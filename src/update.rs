//! Rows for in-place attribute updates.

use crate::error::{Error, Result};

/// New value for one attribute of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateValue {
    /// Plain integer attribute.
    Int(u32),
    /// Multi-valued attribute, replaced wholesale.
    Multi(Vec<u32>),
}

impl From<u32> for UpdateValue {
    fn from(v: u32) -> Self {
        Self::Int(v)
    }
}

impl From<Vec<u32>> for UpdateValue {
    fn from(v: Vec<u32>) -> Self {
        Self::Multi(v)
    }
}

/// One document's new values, aligned with the attribute name list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeUpdate {
    pub doc_id: u64,
    pub values: Vec<UpdateValue>,
}

impl AttributeUpdate {
    pub fn new<V: Into<UpdateValue>>(doc_id: u64, values: impl IntoIterator<Item = V>) -> Self {
        Self {
            doc_id,
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// Validate a batch against `attrs` and report whether it updates MVAs.
///
/// The mode comes from the first value of the first row; every other value
/// must have the same shape.
pub(crate) fn check_rows(attrs: &[&str], rows: &[AttributeUpdate]) -> Result<bool> {
    if attrs.is_empty() {
        return Err(Error::invalid("no attribute names provided"));
    }
    if let Some(empty) = attrs.iter().position(|a| a.is_empty()) {
        return Err(Error::invalid(format!("attribute name #{empty} is empty")));
    }
    let Some(first) = rows.first() else {
        return Err(Error::invalid("no update values provided"));
    };
    for row in rows {
        if row.values.len() != attrs.len() {
            return Err(Error::invalid(format!(
                "update entry for doc {} has {} values, expected {}",
                row.doc_id,
                row.values.len(),
                attrs.len()
            )));
        }
    }

    let mva = matches!(first.values.first(), Some(UpdateValue::Multi(_)));
    for row in rows {
        if let Some(bad) = row
            .values
            .iter()
            .find(|v| matches!(v, UpdateValue::Multi(_)) != mva)
        {
            let expected = if mva { "multi-valued" } else { "scalar" };
            return Err(Error::invalid(format!(
                "doc {}: expected {expected} values, got {bad:?}",
                row.doc_id
            )));
        }
    }
    Ok(mva)
}
