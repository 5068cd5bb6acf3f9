use criterion::{criterion_group, criterion_main, Criterion};
use loom_core::model::{Document, Point, Widget, WidgetType};
use loom_core::path::WidgetPath;
use loom_core::{apply, diff, filter_syncable, pages, tree};
use std::hint::black_box;

/// One page holding `rows` columns of five text widgets each.
fn populated_doc(rows: usize) -> Document {
    let mut doc = Document::default();
    for i in 0..rows {
        let mut column = Widget::new(WidgetType::Column)
            .with_prop("x", (i * 10) as f64)
            .with_prop("y", (i * 20) as f64);
        for j in 0..5 {
            column = column.with_child(Widget::new(WidgetType::Text).with_prop("text", format!("row {i} item {j}")));
        }
        doc.pages[0].body.push(column);
    }
    doc
}

fn bench_diff_position_change(c: &mut Criterion) {
    let prev = populated_doc(100);
    let path: WidgetPath = "50".parse().unwrap();
    let next = pages::update_page_body(&prev, 0, |body| {
        tree::update_position(body, &path, Point::new(1.0, 2.0))
    })
    .unwrap();

    c.bench_function("diff_position_change_100x5", |b| {
        b.iter(|| black_box(diff(black_box(&prev), black_box(&next)).unwrap()))
    });
}

fn bench_apply_position_change(c: &mut Criterion) {
    let prev = populated_doc(100);
    let path: WidgetPath = "50".parse().unwrap();
    let next = pages::update_page_body(&prev, 0, |body| {
        tree::update_position(body, &path, Point::new(1.0, 2.0))
    })
    .unwrap();
    let ops = diff(&prev, &next).unwrap();

    c.bench_function("apply_position_change_100x5", |b| {
        b.iter(|| black_box(apply(black_box(&prev), black_box(&ops)).unwrap()))
    });
}

fn bench_diff_front_insert(c: &mut Criterion) {
    let prev = populated_doc(100);
    let next = pages::update_page_body(&prev, 0, |body| {
        tree::insert(body, &WidgetPath::Root, 0, Widget::new(WidgetType::Button), None)
    })
    .unwrap();

    c.bench_function("diff_front_insert_100x5", |b| {
        b.iter(|| black_box(filter_syncable(diff(black_box(&prev), black_box(&next)).unwrap())))
    });
}

criterion_group!(
    benches,
    bench_diff_position_change,
    bench_apply_position_change,
    bench_diff_front_insert,
);
criterion_main!(benches);
