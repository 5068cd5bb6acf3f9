//! Pure tree mutations over a page body.
//!
//! Every function takes a body snapshot and returns a new one; the input is
//! never touched. A path that does not resolve is a silent no-op with a
//! `warn!` diagnostic, never a panic.

use crate::model::{Point, PositioningMode, PropValue, Props, Widget};
use crate::path::WidgetPath;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Cannot move {source_path} into its own descendant {target}")]
    MoveIntoDescendant {
        source_path: WidgetPath,
        target: WidgetPath,
    },
}

/// Sibling reorder direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

// ─── Lookup ─────────────────────────────────────────────────────

/// Widget at `path`, or `None` for the root or an out-of-range index.
pub fn resolve<'a>(body: &'a [Widget], path: &WidgetPath) -> Option<&'a Widget> {
    let (first, rest) = path.indices().split_first()?;
    let mut node = body.get(*first)?;
    for index in rest {
        node = node.children.get(*index)?;
    }
    Some(node)
}

fn resolve_mut<'a>(body: &'a mut [Widget], indices: &[usize]) -> Option<&'a mut Widget> {
    let (first, rest) = indices.split_first()?;
    let mut node = body.get_mut(*first)?;
    for index in rest {
        node = node.children.get_mut(*index)?;
    }
    Some(node)
}

/// The list that holds the children of `parent`: the body itself for the root.
fn siblings_mut<'a>(body: &'a mut Vec<Widget>, parent: &[usize]) -> Option<&'a mut Vec<Widget>> {
    if parent.is_empty() {
        return Some(body);
    }
    resolve_mut(body, parent).map(|widget| &mut widget.children)
}

/// Depth-first search for a widget id.
pub fn find_path_by_id(body: &[Widget], id: &str) -> Option<WidgetPath> {
    fn walk(nodes: &[Widget], id: &str, prefix: &mut Vec<usize>) -> bool {
        for (i, node) in nodes.iter().enumerate() {
            prefix.push(i);
            if node.id == id || walk(&node.children, id, prefix) {
                return true;
            }
            prefix.pop();
        }
        false
    }

    let mut prefix = Vec::new();
    walk(body, id, &mut prefix).then(|| WidgetPath::from_indices(prefix))
}

// ─── Structural edits ───────────────────────────────────────────

fn place_at(widget: &mut Widget, point: Point) {
    widget.set_prop("x", point.x);
    widget.set_prop("y", point.y);
    if widget.is_container() {
        let (width, height) = widget.kind.default_size();
        widget.props.entry("width".to_owned()).or_insert_with(|| width.into());
        widget.props.entry("height".to_owned()).or_insert_with(|| height.into());
    }
}

/// Inserts `widget` under `target` at `index` (clamped to the child count).
///
/// At the root, navigation chrome dropped without a position is appended to
/// the end of the body regardless of `index`. A non-container or unresolved
/// target leaves the body unchanged.
pub fn insert(
    body: &[Widget],
    target: &WidgetPath,
    index: usize,
    mut widget: Widget,
    position: Option<Point>,
) -> Vec<Widget> {
    let mut next = body.to_vec();
    if let Some(point) = position {
        place_at(&mut widget, point);
    }

    match target {
        WidgetPath::Root => {
            if widget.kind.is_navigation_chrome() && position.is_none() {
                next.push(widget);
            } else {
                let at = index.min(next.len());
                next.insert(at, widget);
            }
        }
        WidgetPath::Node(indices) => match resolve_mut(&mut next, indices) {
            Some(parent) if parent.is_container() => {
                let at = index.min(parent.children.len());
                parent.children.insert(at, widget);
            }
            Some(parent) => log::warn!("insert: {target} is a {:?}, not a container", parent.kind),
            None => log::warn!("insert: no widget at {target}"),
        },
    }
    next
}

fn take(body: &mut Vec<Widget>, path: &WidgetPath) -> Option<Widget> {
    let (last, parent) = path.indices().split_last()?;
    let siblings = siblings_mut(body, parent)?;
    (*last < siblings.len()).then(|| siblings.remove(*last))
}

/// Removes the widget at `source`, returning the new body and the removed
/// subtree.
pub fn remove(body: &[Widget], source: &WidgetPath) -> (Vec<Widget>, Option<Widget>) {
    let mut next = body.to_vec();
    let removed = take(&mut next, source);
    if removed.is_none() {
        log::warn!("remove: no widget at {source}");
    }
    (next, removed)
}

/// Moves the widget at `source` to `index` under `target`.
///
/// `target` and `index` are read against the body *before* the removal and
/// rebased afterwards. When dropping into a container with a position, the
/// position is made relative to that container and clamped at zero.
pub fn move_widget(
    body: &[Widget],
    source: &WidgetPath,
    target: &WidgetPath,
    index: usize,
    position: Option<Point>,
) -> Result<Vec<Widget>, TreeError> {
    if target == source || target.is_strict_descendant_of(source) {
        return Err(TreeError::MoveIntoDescendant {
            source_path: source.clone(),
            target: target.clone(),
        });
    }

    let parent = match target {
        WidgetPath::Root => None,
        WidgetPath::Node(_) => match resolve(body, target) {
            Some(parent) if parent.is_container() => Some(parent),
            Some(parent) => {
                log::warn!("move_widget: {target} is a {:?}, not a container", parent.kind);
                return Ok(body.to_vec());
            }
            None => {
                log::warn!("move_widget: no widget at {target}");
                return Ok(body.to_vec());
            }
        },
    };

    let position = match (position, parent) {
        (Some(point), Some(parent)) => {
            let origin = parent.position().unwrap_or(Point::new(0.0, 0.0));
            Some(Point::new(
                (point.x - origin.x).max(0.0),
                (point.y - origin.y).max(0.0),
            ))
        }
        (point, _) => point,
    };

    let (next, removed) = remove(body, source);
    let Some(widget) = removed else {
        return Ok(next);
    };

    // Rebase is infallible here: target is neither source nor below it.
    let target = target.rebase_after_removal(source).unwrap_or(WidgetPath::Root);
    let same_parent = source.parent().as_ref() == Some(&target);
    let index = match source.last_index() {
        Some(from) if same_parent && from < index => index - 1,
        _ => index,
    };
    Ok(insert(&next, &target, index, widget, position))
}

// ─── Property edits ─────────────────────────────────────────────

/// Shallow-merges `partial` into the widget's props.
pub fn update_props(body: &[Widget], path: &WidgetPath, partial: Props) -> Vec<Widget> {
    let mut next = body.to_vec();
    match resolve_mut(&mut next, path.indices()) {
        Some(widget) => widget.props.extend(partial),
        None => log::warn!("update_props: no widget at {path}"),
    }
    next
}

pub fn update_position(body: &[Widget], path: &WidgetPath, point: Point) -> Vec<Widget> {
    let mut partial = Props::new();
    partial.insert("x".to_owned(), point.x.into());
    partial.insert("y".to_owned(), point.y.into());
    update_props(body, path, partial)
}

pub fn update_size(body: &[Widget], path: &WidgetPath, width: f64, height: f64) -> Vec<Widget> {
    let mut partial = Props::new();
    partial.insert("width".to_owned(), width.into());
    partial.insert("height".to_owned(), height.into());
    update_props(body, path, partial)
}

/// Swaps the widget with its previous (`Up`) or next (`Down`) sibling.
/// No-op at either end of the list.
pub fn reorder_sibling(body: &[Widget], path: &WidgetPath, direction: Direction) -> Vec<Widget> {
    let mut next = body.to_vec();
    let Some((last, parent)) = path.indices().split_last() else {
        return next;
    };
    let Some(siblings) = siblings_mut(&mut next, parent) else {
        log::warn!("reorder_sibling: no parent for {path}");
        return next;
    };
    let other = match direction {
        Direction::Up => last.checked_sub(1),
        Direction::Down => Some(last + 1),
    };
    if let Some(other) = other.filter(|&o| o < siblings.len() && *last < siblings.len()) {
        siblings.swap(*last, other);
    }
    next
}

// ─── Mode change ────────────────────────────────────────────────

fn is_text(value: Option<&PropValue>, wanted: &[&str]) -> bool {
    value
        .and_then(PropValue::as_str)
        .is_some_and(|s| wanted.contains(&s))
}

fn adjust_widget(widget: &mut Widget, mode: PositioningMode) {
    match mode {
        PositioningMode::Flex => {
            widget.props.remove("x");
            widget.props.remove("y");
            widget.set_prop("width", "100%");
            widget.set_prop("height", "auto");
        }
        PositioningMode::Absolute => {
            let (width, height) = widget.kind.default_size();
            let props = &mut widget.props;
            if !props.contains_key("width") || is_text(props.get("width"), &["100%", "auto"]) {
                props.insert("width".to_owned(), width.into());
            }
            if !props.contains_key("height") || is_text(props.get("height"), &["auto"]) {
                props.insert("height".to_owned(), height.into());
            }
            props.entry("x".to_owned()).or_insert_with(|| 50.0.into());
            props.entry("y".to_owned()).or_insert_with(|| 50.0.into());
        }
    }
    for child in &mut widget.children {
        adjust_widget(child, mode);
    }
}

/// Rewrites sizing props of every widget for a page switching to `mode`.
pub fn adjust_for_mode_change(body: &[Widget], mode: PositioningMode) -> Vec<Widget> {
    let mut next = body.to_vec();
    for widget in &mut next {
        adjust_widget(widget, mode);
    }
    next
}
