//! Bounded depth ("top-N") views derived from full-depth operations.
//!
//! A [`DepthView`] watches every elementary operation applied to the full
//! book and records what a subscriber holding only the N best levels per
//! side must see:
//!
//! | Full-book op at depth p | Bounded view (p <= N)                         |
//! |-------------------------|-----------------------------------------------|
//! | insert                  | insert, plus delete of the level now at N + 1 |
//! | delete                  | delete, plus insert of the level now at N     |
//! | update                  | update                                        |
//!
//! Operations deeper than N are invisible. The synthetic entries are
//! "makeup" messages: they keep the bounded window exactly N deep without the
//! subscriber ever seeing the full book.
//!
//! `record` must run right after each op is applied, while the ladder still
//! reflects that op and nothing later.

use super::book::OrderBook;
use crate::types::messages::table_for_depth;
use crate::types::{Action, MblMessage, PriceLevel, Side};

/// One elementary operation as applied to the full book
#[derive(Debug, Clone, PartialEq)]
pub struct BookOp {
    /// Operation kind (never `Partial`)
    pub action: Action,
    /// Level as carried by the incoming message
    pub level: PriceLevel,
    /// Depth reported by the book; pre-removal depth for deletes
    pub position: usize,
}

impl BookOp {
    /// Create a new op record
    pub fn new(action: Action, level: PriceLevel, position: usize) -> Self {
        Self {
            action,
            level,
            position,
        }
    }

    fn side(&self) -> Side {
        self.level.side
    }
}

/// Per-depth accumulator of outbound rows
#[derive(Debug, Clone)]
pub struct DepthView {
    depth: usize,
    table: String,
    pending: Vec<(Action, PriceLevel)>,
}

impl DepthView {
    /// Create a view; depth 0 forwards every op unchanged
    pub fn new(base_table: &str, depth: usize) -> Self {
        Self {
            depth,
            table: table_for_depth(base_table, depth),
            pending: Vec::new(),
        }
    }

    /// Depth limit (0 = unbounded)
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Table name published by this view
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Check if nothing is waiting to be published
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    /// Record the bounded-view consequences of one applied op
    pub fn record(&mut self, op: &BookOp, book: &OrderBook) {
        if self.depth == 0 {
            self.pending.push((op.action, op.level.clone()));
            return;
        }
        if op.position > self.depth {
            return;
        }

        match op.action {
            Action::Insert => {
                self.pending.push((Action::Insert, op.level.clone()));
                if let Some(pushed_out) = book.level_at(op.side(), self.depth + 1) {
                    self.pending.push((Action::Delete, pushed_out.clone()));
                }
            }
            Action::Delete => {
                self.pending.push((Action::Delete, op.level.clone()));
                if let Some(pulled_in) = book.level_at(op.side(), self.depth) {
                    self.pending.push((Action::Insert, pulled_in.clone()));
                }
            }
            Action::Update => self.pending.push((Action::Update, op.level.clone())),
            Action::Partial => {}
        }
    }

    /// Drain recorded rows as messages, one per run of equal actions
    pub fn take_messages(&mut self) -> Vec<MblMessage> {
        let mut messages: Vec<MblMessage> = Vec::new();
        for (action, level) in self.pending.drain(..) {
            match messages.last_mut() {
                Some(last) if last.action == action => last.data.push(level),
                _ => messages.push(MblMessage::new(self.table.clone(), action, vec![level])),
            }
        }
        messages
    }

    /// Partial message for this view's slice of the book
    pub fn partial(&self, book: &OrderBook) -> MblMessage {
        MblMessage::new(self.table.clone(), Action::Partial, book.snapshot(self.depth))
    }

    /// Discard anything recorded but not yet taken
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}
