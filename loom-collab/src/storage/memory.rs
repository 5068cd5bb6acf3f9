use std::collections::HashMap;
use std::sync::RwLock;

use loom_core::Document;
use uuid::Uuid;

use super::{ProjectStore, StoreError, StoredProject};

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    projects: RwLock<HashMap<String, (String, Document)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.projects.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProjectStore for MemoryStore {
    fn load(&self, id: &str) -> Result<Document, StoreError> {
        let projects = self.projects.read().map_err(|_| StoreError::Poisoned)?;
        projects
            .get(id)
            .map(|(_, doc)| doc.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))
    }

    fn create(&self, name: &str, document: Document) -> Result<StoredProject, StoreError> {
        let id = Uuid::new_v4().to_string();
        let mut projects = self.projects.write().map_err(|_| StoreError::Poisoned)?;
        projects.insert(id.clone(), (name.to_owned(), document.clone()));
        Ok(StoredProject {
            id,
            name: name.to_owned(),
            document,
        })
    }

    fn update(&self, id: &str, document: &Document) -> Result<(), StoreError> {
        let mut projects = self.projects.write().map_err(|_| StoreError::Poisoned)?;
        match projects.get_mut(id) {
            Some((_, doc)) => {
                *doc = document.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(id.to_owned())),
        }
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut projects = self.projects.write().map_err(|_| StoreError::Poisoned)?;
        projects
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))
    }
}
