//! Page-level document operations.
//!
//! Pages are identified by their lowercase `name`; every page owns a route
//! `/<name>` in `Document::routes`. The document always keeps at least one
//! page.

use crate::model::{Document, Fab, Page, PositioningMode, Widget};
use crate::tree;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    #[error("A document must keep at least one page")]
    LastPage,
    #[error("Page index {0} out of range")]
    IndexOutOfRange(usize),
    #[error("Page name must not be empty")]
    EmptyName,
    #[error("A page named '{0}' already exists")]
    DuplicateName(String),
}

/// Partial page edit. `None` fields are left alone; `fab: Some(None)`
/// removes the floating action button.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageUpdate {
    pub title: Option<String>,
    pub layout: Option<String>,
    pub background_color: Option<String>,
    pub positioning_mode: Option<PositioningMode>,
    pub fab: Option<Option<Fab>>,
}

pub fn page_index(doc: &Document, name: &str) -> Option<usize> {
    doc.pages.iter().position(|p| p.name == name)
}

fn normalize_name(display_name: &str) -> Result<String, PageError> {
    let trimmed = display_name.trim();
    if trimmed.is_empty() {
        return Err(PageError::EmptyName);
    }
    Ok(trimmed.to_lowercase())
}

fn check_index(doc: &Document, index: usize) -> Result<(), PageError> {
    if index < doc.pages.len() {
        Ok(())
    } else {
        Err(PageError::IndexOutOfRange(index))
    }
}

/// Appends a new page. The name is the lowercased display name, the title
/// the trimmed display name.
pub fn add_page(doc: &Document, display_name: &str) -> Result<Document, PageError> {
    let name = normalize_name(display_name)?;
    if page_index(doc, &name).is_some() {
        return Err(PageError::DuplicateName(name));
    }

    let mut next = doc.clone();
    let page = Page::new(name, display_name.trim());
    let route = page.route();
    if !next.routes.contains(&route) {
        next.routes.push(route);
    }
    log::debug!("Added page '{}'", page.name);
    next.pages.push(page);
    Ok(next)
}

/// Removes the page at `index` together with its route.
pub fn remove_page(doc: &Document, index: usize) -> Result<Document, PageError> {
    check_index(doc, index)?;
    if doc.pages.len() <= 1 {
        return Err(PageError::LastPage);
    }

    let mut next = doc.clone();
    let removed = next.pages.remove(index);
    let route = removed.route();
    next.routes.retain(|r| *r != route);
    log::debug!("Removed page '{}'", removed.name);
    Ok(next)
}

/// Renames the page at `index`, rewriting its route (or adding one when the
/// old route was missing).
pub fn rename_page(doc: &Document, index: usize, new_name: &str) -> Result<Document, PageError> {
    check_index(doc, index)?;
    let name = normalize_name(new_name)?;
    if let Some(existing) = page_index(doc, &name) {
        if existing != index {
            return Err(PageError::DuplicateName(name));
        }
    }

    let mut next = doc.clone();
    let page = &mut next.pages[index];
    let old_route = page.route();
    page.name = name;
    let new_route = page.route();

    if let Some(route) = next.routes.iter_mut().find(|r| **r == old_route) {
        *route = new_route;
    } else if !next.routes.contains(&new_route) {
        next.routes.push(new_route);
    }
    Ok(next)
}

/// Applies a partial edit to the page at `index`. A positioning mode change
/// also rewrites the body through [`tree::adjust_for_mode_change`].
pub fn update_page(doc: &Document, index: usize, update: PageUpdate) -> Result<Document, PageError> {
    check_index(doc, index)?;
    let mut next = doc.clone();
    let page = &mut next.pages[index];

    if let Some(title) = update.title {
        page.title = title;
    }
    if let Some(layout) = update.layout {
        page.layout = Some(layout);
    }
    if let Some(color) = update.background_color {
        page.background_color = Some(color);
    }
    if let Some(fab) = update.fab {
        page.fab = fab;
    }
    if let Some(mode) = update.positioning_mode {
        if page.mode() != mode {
            page.body = tree::adjust_for_mode_change(&page.body, mode);
        }
        page.positioning_mode = Some(mode);
    }
    Ok(next)
}

/// Replaces the body of the page at `index` with `f(body)`.
pub fn update_page_body<F>(doc: &Document, index: usize, f: F) -> Result<Document, PageError>
where
    F: FnOnce(&[Widget]) -> Vec<Widget>,
{
    check_index(doc, index)?;
    let mut next = doc.clone();
    let page = &mut next.pages[index];
    page.body = f(&page.body);
    Ok(next)
}
