//! End-to-end segmentation and verification workflow
//!
//! Tests the complete pipeline on real files in a temp directory:
//! 1. Label a Java file with segment markers
//! 2. Fetch segments and confirm they reconstruct the file
//! 3. Drive a scripted mutation source through verified renaming
//! 4. Reject a structural change at the apply boundary
//! 5. Remove markers and confirm the rename survived

use renameguard::ast::JavaParser;
use renameguard::compare;
use renameguard::project::{atomic_write, ProjectFiles};
use renameguard::refactor::{MutationSource, RefactorEngine, SegmentStatus, SessionReport};
use renameguard::segment;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const WIDGET: &str = "package demo;\n\nimport java.util.List;\n\npublic class Widget {\n    private int count;\n\n    public Widget(int count) {\n        this.count = count;\n    }\n\n    public int tick() {\n        count = count + 1;\n        return count;\n    }\n}\n";

fn setup_project() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("src/demo")).unwrap();
    let path = dir.path().join("src/demo/Widget.java");
    fs::write(&path, WIDGET).unwrap();
    (dir, path)
}

/// Replays a fixed response per propose call, in order.
struct Scripted(Vec<Option<String>>);

impl Scripted {
    fn new(mut responses: Vec<Option<String>>) -> Self {
        responses.reverse();
        Self(responses)
    }
}

impl MutationSource for Scripted {
    fn propose(
        &mut self,
        _segment: &str,
        _standards: &[String],
        _prior_error: Option<&str>,
    ) -> anyhow::Result<Option<String>> {
        Ok(self.0.pop().unwrap_or(None))
    }
}

fn labeled_widget() -> (TempDir, PathBuf, usize) {
    let (dir, path) = setup_project();
    let count = segment::insert_markers(&path).unwrap();
    (dir, path, count)
}

#[test]
fn labeled_segments_reconstruct_the_file() {
    let (_dir, path, count) = labeled_widget();
    // Label 0 plus one segment per file-level declaration.
    assert_eq!(count, 4);

    let segments: Vec<String> = (0..count)
        .map(|label| segment::fetch(&path, label).unwrap())
        .collect();
    assert_eq!(segments.concat(), WIDGET);

    segment::remove_markers(&path).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), WIDGET);
}

#[test]
fn scripted_rename_is_verified_end_to_end() {
    let (_dir, path, count) = labeled_widget();
    let marked = fs::read_to_string(&path).unwrap();

    // Label 0 is skipped outright; segments 1 and 2 are declared compliant
    // and segment 3 renames tick.
    let mut engine = RefactorEngine::new(
        Scripted::new(vec![
            Some("already follows conventions".to_string()),
            Some("already follows conventions".to_string()),
            Some(
                "public int advance() {\n    count = count + 1;\n    return count;\n}"
                    .to_string(),
            ),
        ]),
        Vec::new(),
        3,
    );

    let (text, report) = engine.refactor_file(path.clone(), &marked).unwrap();
    assert_eq!(report.segments.len(), count);
    assert_eq!(report.segments[0].status, SegmentStatus::Unchanged);
    assert_eq!(report.segments[3].status, SegmentStatus::Refactored);
    assert_eq!(report.segments[3].diffs.len(), 1);
    assert_eq!(report.segments[3].diffs[0].before, "tick");
    assert_eq!(report.segments[3].diffs[0].after, "advance");

    atomic_write(&path, &text).unwrap();
    segment::remove_markers(&path).unwrap();

    let final_source = fs::read_to_string(&path).unwrap();
    assert_eq!(final_source, WIDGET.replace("tick", "advance"));

    let mut session = SessionReport::default();
    session.push(report);
    let json = serde_json::to_string_pretty(&session).unwrap();
    assert!(json.contains("\"refactored\""));
    assert!(json.contains("\"advance\""));
}

#[test]
fn structural_change_is_rejected_at_the_apply_boundary() {
    let (_dir, path, _) = labeled_widget();
    let marked = fs::read_to_string(&path).unwrap();

    // Adds a statement to segment 3.
    let bad = "    public int tick() {\n        count = count + 1;\n        count = 0;\n        return count;\n    }\n}";
    let candidate = segment::substitute(&marked, 3, bad).unwrap();

    let original_plain = segment::strip_markers(&marked);
    let candidate_plain = segment::strip_markers(&candidate);

    let mut parser = JavaParser::new().unwrap();
    let left = parser.parse(&original_plain).unwrap();
    let right = parser.parse(&candidate_plain).unwrap();

    let err = compare::compare(&left, &right, &original_plain).unwrap_err();
    assert!(err.is_structural());

    // Nothing was written: the file on disk still carries the old segment.
    assert!(fs::read_to_string(&path).unwrap().contains("tick"));
}

#[test]
fn feedback_retry_recovers_from_a_bad_first_proposal() {
    let (_dir, _path, _) = labeled_widget();
    let marked = fs::read_to_string(&_path).unwrap();

    let mut engine = RefactorEngine::new(
        Scripted::new(vec![
            // First proposal breaks structure, second is a clean rename.
            Some("public int tick() {\n    return count;\n}".to_string()),
            Some(
                "public int advance() {\n    count = count + 1;\n    return count;\n}"
                    .to_string(),
            ),
        ]),
        Vec::new(),
        3,
    );

    let outcome = engine.refactor_segment(&marked, 3).unwrap();
    assert_eq!(outcome.status(), SegmentStatus::Refactored);
}

#[test]
fn project_index_reconciles_an_external_file_rename() {
    let (dir, path, _) = labeled_widget();
    fs::write(dir.path().join("src/demo/Helper.java"), "class Helper { }\n").unwrap();
    fs::write(dir.path().join("notes.txt"), "not java").unwrap();

    let mut files = ProjectFiles::discover(dir.path()).unwrap();
    assert_eq!(files.len(), 2);
    let index = files
        .snapshot()
        .into_iter()
        .find(|(_, p)| p.ends_with(Path::new("Widget.java")))
        .map(|(i, _)| i)
        .unwrap();

    let renamed = path.with_file_name("Gadget.java");
    fs::rename(&path, &renamed).unwrap();

    let update = files.update().unwrap();
    let (updated_index, updated_path) = update.expect("rename should be reconciled");
    assert_eq!(updated_index, index);
    assert!(updated_path.ends_with(Path::new("Gadget.java")));
    assert!(files.path(index).unwrap().ends_with(Path::new("Gadget.java")));
}
