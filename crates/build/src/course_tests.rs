// SPDX-License-Identifier: MIT

//! Classification, target filtering, and operation generation.

use super::*;
use yare::parameterized;

#[parameterized(
    src = { "slides/topic_010.src", FileKind::NotebookSource },
    py = { "slides/topic_020.py", FileKind::NotebookSource },
    md = { "notes/intro.md", FileKind::NotebookSource },
    plantuml_pu = { "img/arch.pu", FileKind::PlantUml },
    plantuml_puml = { "img/arch.puml", FileKind::PlantUml },
    drawio = { "img/flow.drawio", FileKind::DrawIo },
    csv = { "data/table.csv", FileKind::Data },
    no_extension = { "LICENSE", FileKind::Data },
)]
fn classification_by_extension(path: &str, expected: FileKind) {
    assert_eq!(classify(Path::new(path)), expected);
}

#[test]
fn unset_filters_match_everything() {
    let target = OutputTarget::new("/out");
    assert!(target.matches("en", Format::Notebook, Kind::Completed));
    assert!(target.matches("xx", Format::Code, Kind::Speaker));
}

#[test]
fn all_three_filters_must_pass() {
    let target = OutputTarget::new("/out")
        .languages(["en"])
        .formats([Format::Html])
        .kinds([Kind::Completed]);
    assert!(target.matches("en", Format::Html, Kind::Completed));
    assert!(!target.matches("de", Format::Html, Kind::Completed));
    assert!(!target.matches("en", Format::Notebook, Kind::Completed));
    assert!(!target.matches("en", Format::Html, Kind::Speaker));
}

fn ops_for(
    file: &CourseFile,
    target: &OutputTarget,
    languages: &[&str],
) -> Vec<Operation> {
    let languages: Vec<String> = languages.iter().map(|s| s.to_string()).collect();
    file.operations(target, &languages, &ExecutionTable::default(), "cor-test")
}

#[test]
fn data_files_produce_no_operations() {
    let file = CourseFile::new("/course/data/table.csv");
    assert!(ops_for(&file, &OutputTarget::new("/out"), &["en"]).is_empty());
}

#[test]
fn diagrams_render_once_per_target_ignoring_filters() {
    let file = CourseFile::new("/course/img/arch.pu");
    let target = OutputTarget::new("/out").languages(["en"]).formats([Format::Html]);
    let ops = ops_for(&file, &target, &["en", "de"]);

    assert_eq!(ops.len(), 1);
    let op = &ops[0];
    assert_eq!(op.job_type, lectern_core::JobType::Plantuml);
    assert_eq!(op.stage, 0, "diagrams render before any document executes");
    assert_eq!(op.payload.output_file, PathBuf::from("/out/img/arch.svg"));
    assert!(!op.implicit);
}

#[test]
fn notebook_source_generates_filtered_tuples() {
    let file = CourseFile::new("/course/slides/topic_010.src");
    let target = OutputTarget::new("/out")
        .languages(["en"])
        .formats([Format::Notebook])
        .kinds([Kind::Completed]);
    let ops = ops_for(&file, &target, &["en", "de"]);

    assert_eq!(ops.len(), 1);
    let op = &ops[0];
    assert_eq!(
        op.payload.output_file,
        PathBuf::from("/out/en/notebooks/completed/topic_010.ipynb")
    );
    assert_eq!(op.stage, 1);
    assert_eq!(op.payload.extra["language"], serde_json::json!("en"));
    assert_eq!(op.payload.extra["format"], serde_json::json!("notebook"));
    assert_eq!(op.payload.extra["kind"], serde_json::json!("completed"));
}

#[test]
fn code_format_only_pairs_with_completed() {
    let file = CourseFile::new("/course/slides/topic_010.src");
    let target = OutputTarget::new("/out").formats([Format::Code]);
    let ops = ops_for(&file, &target, &["en"]);

    assert_eq!(ops.len(), 1, "code/code_along and code/speaker are ignored");
    assert_eq!(
        ops[0].payload.output_file,
        PathBuf::from("/out/en/code/completed/topic_010.py")
    );
}

#[test]
fn html_completed_pulls_an_implicit_speaker_run() {
    let file = CourseFile::new("/course/slides/topic_010.src");
    let target = OutputTarget::new("/out")
        .languages(["en"])
        .formats([Format::Html])
        .kinds([Kind::Completed]);
    let ops = ops_for(&file, &target, &["en"]);

    assert_eq!(ops.len(), 2);
    let implicit: Vec<&Operation> = ops.iter().filter(|o| o.implicit).collect();
    assert_eq!(implicit.len(), 1);
    let speaker = implicit[0];
    assert_eq!(speaker.payload.extra["kind"], serde_json::json!("speaker"));
    assert!(
        speaker.payload.output_file.starts_with("/out/.cache"),
        "implicit outputs are not user-visible: {}",
        speaker.payload.output_file.display()
    );
    assert!(
        speaker.stage < ops.iter().find(|o| !o.implicit).map(|o| o.stage).unwrap_or(0),
        "cache producer must run in an earlier stage than its consumer"
    );
}

#[test]
fn explicit_speaker_request_needs_no_implicit_run() {
    let file = CourseFile::new("/course/slides/topic_010.src");
    let target = OutputTarget::new("/out")
        .languages(["en"])
        .formats([Format::Html])
        .kinds([Kind::Completed, Kind::Speaker]);
    let ops = ops_for(&file, &target, &["en"]);

    assert_eq!(ops.len(), 2);
    assert!(ops.iter().all(|o| !o.implicit));
}

#[test]
fn operations_share_the_batch_correlation_id() {
    let file = CourseFile::new("/course/slides/topic_010.src");
    let ops = ops_for(&file, &OutputTarget::new("/out"), &["en"]);
    assert!(!ops.is_empty());
    assert!(ops.iter().all(|o| o.payload.correlation_id == "cor-test"));
}

#[test]
fn course_load_round_trips() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("slides")).unwrap();
    std::fs::write(dir.path().join("slides/topic_010.src"), "content").unwrap();
    std::fs::write(dir.path().join("arch.pu"), "@startuml").unwrap();
    let spec = r#"
[course]
name = "rust-basics"
languages = ["en", "de"]

[[section]]
name = "week-1"
files = ["slides/topic_010.src", "arch.pu"]
"#;
    let spec_path = dir.path().join("course.toml");
    std::fs::write(&spec_path, spec).unwrap();

    let course = Course::load(&spec_path).unwrap();
    assert_eq!(course.name, "rust-basics");
    assert_eq!(course.languages, vec!["en", "de"]);
    assert_eq!(course.files.len(), 2);
    assert_eq!(course.files[0].kind, FileKind::NotebookSource);
    assert_eq!(course.files[1].kind, FileKind::PlantUml);

    let lookup = course.file_for_path(&dir.path().join("arch.pu"));
    assert!(lookup.is_some());
}

#[test]
fn course_load_rejects_missing_files() {
    let dir = tempfile::TempDir::new().unwrap();
    let spec = r#"
[course]
name = "broken"
languages = ["en"]

[[section]]
name = "week-1"
files = ["nope.src"]
"#;
    let spec_path = dir.path().join("course.toml");
    std::fs::write(&spec_path, spec).unwrap();

    let err = Course::load(&spec_path).unwrap_err();
    assert!(matches!(err, BuildError::InvalidCourseSpec { .. }), "unexpected: {err}");
}

#[test]
fn course_load_rejects_empty_languages() {
    let dir = tempfile::TempDir::new().unwrap();
    let spec = "[course]\nname = \"empty\"\nlanguages = []\n";
    let spec_path = dir.path().join("course.toml");
    std::fs::write(&spec_path, spec).unwrap();
    assert!(Course::load(&spec_path).is_err());
}
