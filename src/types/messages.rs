//! Table message envelope.
//!
//! Every stream the cache consumes or produces uses the same
//! `{table, action, data}` shape. Bounded depth views reuse it with the table
//! name suffixed by the depth (`orderBookL2` becomes `orderBookL2_25`).

use std::fmt;

use serde::{Deserialize, Serialize};

use super::level::PriceLevel;
use super::trade::Trade;
use crate::error::Error;

/// Operation carried by a table message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Full replacement snapshot
    Partial,
    /// New rows
    Insert,
    /// Changed rows
    Update,
    /// Removed rows
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Partial => "partial",
            Action::Insert => "insert",
            Action::Update => "update",
            Action::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// A decoded table message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMessage<T> {
    /// Table name, suffixed with `_N` for bounded depth views
    pub table: String,
    /// Operation applied to every row in `data`
    pub action: Action,
    /// Rows
    pub data: Vec<T>,
}

/// Market-by-level order book message
pub type MblMessage = TableMessage<PriceLevel>;

/// Trade print message
pub type TradeMessage = TableMessage<Trade>;

impl<T> TableMessage<T> {
    /// Create a new message
    pub fn new(table: impl Into<String>, action: Action, data: Vec<T>) -> Self {
        Self {
            table: table.into(),
            action,
            data,
        }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the message carries no rows
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<T: Serialize> TableMessage<T> {
    /// Encode as a JSON frame for the session layer
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Table name published for a given depth view.
///
/// Depth 0 is the unbounded stream and keeps the base name.
pub fn table_for_depth(table: &str, depth: usize) -> String {
    if depth == 0 {
        table.to_string()
    } else {
        format!("{}_{}", table, depth)
    }
}
