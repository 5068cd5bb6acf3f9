//! # loom-core: Document model and patch engine for Loom
//!
//! Pure, synchronous building blocks shared by every peer editing a Loom
//! project: the UI-tree document, positional widget paths, snapshot-in /
//! snapshot-out tree mutations, JSON-patch diff/apply and the sync-scope
//! filter.
//!
//! ## Data flow
//!
//! ```text
//!  local edit                               inbound patch
//!      │                                         │
//!      ▼                                         ▼
//! ┌──────────┐   ┌──────────┐   ┌────────────────┐   ┌──────────┐
//! │ tree /   │──►│ diff     │──►│ filter_syncable│──►│ apply    │
//! │ pages    │   │ (patch)  │   │ (scope)        │   │ (patch)  │
//! └──────────┘   └──────────┘   └────────────────┘   └────┬─────┘
//!                                        │                │
//!                                        ▼                ▼
//!                                   broadcast      committed snapshot
//! ```
//!
//! ## Modules
//!
//! - [`model`]: `Document`, `Page`, `Widget`, props
//! - [`path`]: `WidgetPath` (`"page"` / `"0.2.1"`)
//! - [`tree`]: body mutations (insert, remove, move, props, mode change)
//! - [`pages`]: page add / remove / rename / update
//! - [`patch`]: RFC 6902 diff and apply
//! - [`scope`]: sync-scope filter and local overrides

pub mod model;
pub mod pages;
pub mod patch;
pub mod path;
pub mod scope;
pub mod tree;

pub use model::{
    Document, Fab, IconDescriptor, Page, Point, PositioningMode, PropValue, Props, Theme, Widget,
    WidgetType,
};
pub use pages::{PageError, PageUpdate};
pub use patch::{apply, apply_value, diff, diff_values, ApplyError, Operation};
pub use path::{PathError, WidgetPath};
pub use scope::{filter_syncable, is_syncable_pointer, LocalOverrides};
pub use tree::{Direction, TreeError};
