//! RocksDB project store across reopen.

use loom_collab::storage::{ProjectStore, RocksStore, StoreConfig, StoreError};
use loom_core::model::{Point, Widget, WidgetType};
use loom_core::path::WidgetPath;
use loom_core::{pages, tree, Document};

fn edited(doc: &Document) -> Document {
    let doc = pages::add_page(doc, "Settings").unwrap();
    pages::update_page_body(&doc, 1, |body| {
        tree::insert(
            body,
            &WidgetPath::Root,
            0,
            Widget::new(WidgetType::Column).with_child(Widget::new(WidgetType::Text).with_prop("text", "Hi")),
            Some(Point::new(40.0, 80.0)),
        )
    })
    .unwrap()
}

#[test]
fn test_projects_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();

    let (id, saved) = {
        let store = RocksStore::open(StoreConfig::for_testing(dir.path())).unwrap();
        let created = store.create("Shop", Document::default()).unwrap();
        let doc = edited(&created.document);
        store.update(&created.id, &doc).unwrap();
        (created.id, doc)
    };

    let store = RocksStore::open(StoreConfig::for_testing(dir.path())).unwrap();
    assert_eq!(store.load(&id).unwrap(), saved);
    assert_eq!(store.list_projects().unwrap(), vec![id.clone()]);

    let meta = store.load_metadata(&id).unwrap();
    assert_eq!(meta.revision, 1);
    assert!(meta.compressed_size > 0);
    assert!(meta.snapshot_size > 0);
}

#[test]
fn test_many_projects_crud() {
    let dir = tempfile::tempdir().unwrap();
    let store = RocksStore::open(StoreConfig::for_testing(dir.path())).unwrap();

    let ids: Vec<String> = (0..5)
        .map(|i| store.create(&format!("P{i}"), Document::default()).unwrap().id)
        .collect();
    assert_eq!(store.list_projects().unwrap().len(), 5);

    store.delete(&ids[2]).unwrap();
    assert!(matches!(store.load(&ids[2]), Err(StoreError::NotFound(_))));
    assert_eq!(store.list_projects().unwrap().len(), 4);
    for id in ids.iter().filter(|id| **id != ids[2]) {
        assert_eq!(store.load(id).unwrap(), Document::default());
    }
}
