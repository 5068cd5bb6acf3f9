//! Positional widget addresses.
//!
//! A path is either the page root (wire sentinel `"page"`) or a
//! dot-separated list of child indices such as `"0.2.1"`: index 0 into the
//! page body, then index 2 into that widget's children, and so on. Paths are
//! positional, so any structural edit may invalidate them. Use
//! [`crate::tree::find_path_by_id`] to re-derive one from a widget id.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Wire sentinel for the page root.
pub const ROOT_SENTINEL: &str = "page";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Empty widget path")]
    Empty,
    #[error("Invalid path segment '{segment}' in '{path}'")]
    InvalidSegment { path: String, segment: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WidgetPath {
    Root,
    Node(Vec<usize>),
}

impl WidgetPath {
    /// Path from raw indices; an empty slice is the root.
    pub fn from_indices(indices: impl Into<Vec<usize>>) -> Self {
        let indices = indices.into();
        if indices.is_empty() {
            WidgetPath::Root
        } else {
            WidgetPath::Node(indices)
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, WidgetPath::Root)
    }

    /// Index chain; empty for the root.
    pub fn indices(&self) -> &[usize] {
        match self {
            WidgetPath::Root => &[],
            WidgetPath::Node(indices) => indices,
        }
    }

    pub fn depth(&self) -> usize {
        self.indices().len()
    }

    /// Path of the `index`-th child of this node.
    pub fn child(&self, index: usize) -> WidgetPath {
        let mut indices = self.indices().to_vec();
        indices.push(index);
        WidgetPath::Node(indices)
    }

    /// Parent path. Top-level widgets have the root as parent; the root has
    /// none.
    pub fn parent(&self) -> Option<WidgetPath> {
        match self {
            WidgetPath::Root => None,
            WidgetPath::Node(indices) => indices
                .split_last()
                .map(|(_, rest)| WidgetPath::from_indices(rest)),
        }
    }

    /// Position of this node among its siblings.
    pub fn last_index(&self) -> Option<usize> {
        self.indices().last().copied()
    }

    /// True when `self` lies strictly below `ancestor`. Compared segment-wise,
    /// so `"1.10"` is not below `"1.1"`.
    pub fn is_strict_descendant_of(&self, ancestor: &WidgetPath) -> bool {
        let (own, theirs) = (self.indices(), ancestor.indices());
        !self.is_root() && own.len() > theirs.len() && own.starts_with(theirs)
    }

    /// Rewrites this path as it reads after the node at `removed` has been
    /// taken out of the tree: a later sibling of `removed` (or anything below
    /// one) shifts left by one. Returns `None` when this path pointed at or
    /// below the removed node.
    pub fn rebase_after_removal(&self, removed: &WidgetPath) -> Option<WidgetPath> {
        if self == removed || self.is_strict_descendant_of(removed) {
            return None;
        }
        let (Some(parent), Some(removed_at)) = (removed.parent(), removed.last_index()) else {
            return Some(self.clone());
        };
        let depth = parent.depth();
        let mut indices = self.indices().to_vec();
        if indices.len() > depth && indices.starts_with(parent.indices()) && indices[depth] > removed_at {
            indices[depth] -= 1;
        }
        Some(WidgetPath::from_indices(indices))
    }
}

impl FromStr for WidgetPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(PathError::Empty);
        }
        if s == ROOT_SENTINEL {
            return Ok(WidgetPath::Root);
        }
        let indices = s
            .split('.')
            .map(|segment| {
                segment.parse::<usize>().map_err(|_| PathError::InvalidSegment {
                    path: s.to_owned(),
                    segment: segment.to_owned(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(WidgetPath::Node(indices))
    }
}

impl fmt::Display for WidgetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WidgetPath::Root => f.write_str(ROOT_SENTINEL),
            WidgetPath::Node(indices) => {
                for (i, index) in indices.iter().enumerate() {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    write!(f, "{index}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> WidgetPath {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(p("page"), WidgetPath::Root);
        assert_eq!(p("0.2.1"), WidgetPath::Node(vec![0, 2, 1]));
        assert_eq!(p("0.2.1").to_string(), "0.2.1");
        assert_eq!(WidgetPath::Root.to_string(), "page");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<WidgetPath>(), Err(PathError::Empty));
        assert!(matches!(
            "0.x".parse::<WidgetPath>(),
            Err(PathError::InvalidSegment { .. })
        ));
        assert!("0..1".parse::<WidgetPath>().is_err());
        assert!("-1".parse::<WidgetPath>().is_err());
    }

    #[test]
    fn test_parent_and_child() {
        assert_eq!(p("3").parent(), Some(WidgetPath::Root));
        assert_eq!(p("3.1").parent(), Some(p("3")));
        assert_eq!(WidgetPath::Root.parent(), None);
        assert_eq!(WidgetPath::Root.child(2), p("2"));
        assert_eq!(p("2").child(0), p("2.0"));
    }

    #[test]
    fn test_descendant_is_segment_wise() {
        assert!(p("1.1.0").is_strict_descendant_of(&p("1.1")));
        assert!(!p("1.10").is_strict_descendant_of(&p("1.1")));
        assert!(!p("1.1").is_strict_descendant_of(&p("1.1")));
        assert!(p("0").is_strict_descendant_of(&WidgetPath::Root));
    }

    #[test]
    fn test_rebase_after_removal() {
        // later sibling shifts left
        assert_eq!(p("2.1").rebase_after_removal(&p("0")), Some(p("1.1")));
        // earlier sibling untouched
        assert_eq!(p("0").rebase_after_removal(&p("1")), Some(p("0")));
        // other subtree untouched
        assert_eq!(p("1.3").rebase_after_removal(&p("0.0")), Some(p("1.3")));
        // removed node and its subtree vanish
        assert_eq!(p("1.0").rebase_after_removal(&p("1")), None);
        assert_eq!(WidgetPath::Root.rebase_after_removal(&p("1")), Some(WidgetPath::Root));
    }
}
