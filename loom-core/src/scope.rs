//! What gets synchronized.
//!
//! Only the `pages` subtree travels between peers. App name, theme and
//! routes are edited through the project backend, and the per-user
//! positioning-mode preference lives in [`LocalOverrides`], outside the
//! synchronized snapshot altogether.

use crate::model::{Document, PositioningMode};
use crate::patch::Operation;
use std::collections::HashMap;

/// Root of the synchronized subtree.
pub const PAGES_POINTER: &str = "/pages";

/// True for `/pages`, `/pages/<n>` and anything below a page.
pub fn is_syncable_pointer(pointer: &str) -> bool {
    match pointer.strip_prefix(PAGES_POINTER) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// The pointer an op is scoped by: its `path`, or `from` when `path` is
/// empty.
pub fn scope_pointer(op: &Operation) -> &str {
    match op.path() {
        "" => op.from_pointer().unwrap_or(""),
        path => path,
    }
}

/// Drops every op outside the synchronized subtree.
pub fn filter_syncable(ops: Vec<Operation>) -> Vec<Operation> {
    ops.into_iter()
        .filter(|op| is_syncable_pointer(scope_pointer(op)))
        .collect()
}

/// Per-user positioning-mode overrides, keyed by page name.
///
/// Merged into a view copy of the document at read time; never written
/// into the synchronized snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalOverrides {
    modes: HashMap<String, PositioningMode>,
}

impl LocalOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&mut self, page: impl Into<String>, mode: PositioningMode) {
        self.modes.insert(page.into(), mode);
    }

    pub fn mode(&self, page: &str) -> Option<PositioningMode> {
        self.modes.get(page).copied()
    }

    pub fn clear(&mut self, page: &str) -> Option<PositioningMode> {
        self.modes.remove(page)
    }

    /// Keeps an override attached to a page across a rename.
    pub fn rename(&mut self, old: &str, new: impl Into<String>) {
        if let Some(mode) = self.modes.remove(old) {
            self.modes.insert(new.into(), mode);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }

    /// View copy of `doc` with every override applied.
    pub fn apply_to(&self, doc: &Document) -> Document {
        let mut view = doc.clone();
        for page in &mut view.pages {
            if let Some(mode) = self.modes.get(&page.name) {
                page.positioning_mode = Some(*mode);
            }
        }
        view
    }
}
