//! This bench test simulates reloading a large workspace of linked
//! requirements and test cases from disk.

#![allow(missing_docs)]

use std::path::PathBuf;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use reqsmith::{domain::TestStep, Actor, RecordType, Workspace};
use tempfile::TempDir;

fn actor() -> Actor {
    Actor::new("bench", "bench@example.com", "Bench")
}

/// Generates a large number of interlinked records
fn preseed_workspace(path: PathBuf) {
    let mut workspace = Workspace::init(path).unwrap();
    let actor = actor();
    for _ in 0..99 {
        let ur = workspace
            .create_record(RecordType::UserRequirement, "Requirement", "", Vec::new(), &actor)
            .unwrap();
        let sr = workspace
            .create_record(RecordType::SystemRequirement, "Derived", "", Vec::new(), &actor)
            .unwrap();
        let tc = workspace
            .create_record(
                RecordType::TestCase,
                "Check",
                "",
                vec![TestStep {
                    action: "Do the thing".to_string(),
                    expected: "It happens".to_string(),
                }],
                &actor,
            )
            .unwrap();
        workspace.add_trace_link(ur.id(), sr.id(), &actor).unwrap();
        workspace.add_trace_link(sr.id(), tc.id(), &actor).unwrap();
    }
}

fn load_workspace(c: &mut Criterion) {
    c.bench_function("load workspace", |b| {
        b.iter_batched(
            || {
                let tmp_dir = TempDir::new().unwrap();
                preseed_workspace(tmp_dir.path().to_path_buf());
                tmp_dir
            },
            |tmp_dir| {
                Workspace::new(tmp_dir.path().to_path_buf())
                    .load_all()
                    .unwrap();
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, load_workspace);
criterion_main!(benches);
