// SPDX-License-Identifier: MIT

//! Course model: file classification, output targets, operation generation.
//!
//! A course is a set of source files plus the languages it is taught in.
//! Each file classifies into a tagged kind by extension, and each kind
//! knows which operations it contributes for a given output target. The
//! orchestrator never looks inside files; it only schedules operations.

use crate::error::BuildError;
use crate::resolver::ExecutionTable;
use lectern_core::{correlation_id, JobPayload, JobType};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// User-facing output variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    CodeAlong,
    Completed,
    Speaker,
}

impl Kind {
    pub const ALL: [Kind; 3] = [Kind::CodeAlong, Kind::Completed, Kind::Speaker];
}

lectern_core::text_enum! {
    Kind {
        CodeAlong => "code_along",
        Completed => "completed",
        Speaker => "speaker",
    }
}

/// File-format variant of an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    Notebook,
    Html,
    Code,
}

impl Format {
    pub const ALL: [Format; 3] = [Format::Notebook, Format::Html, Format::Code];

    fn extension(&self) -> &'static str {
        match self {
            Format::Notebook => "ipynb",
            Format::Html => "html",
            Format::Code => "py",
        }
    }

    fn dir_name(&self) -> &'static str {
        match self {
            Format::Notebook => "notebooks",
            Format::Html => "html",
            Format::Code => "code",
        }
    }
}

lectern_core::text_enum! {
    Format {
        Notebook => "notebook",
        Html => "html",
        Code => "code",
    }
}

/// The code format only exists for completed outputs; everything else is
/// ignored with a warning at generation time.
pub fn tuple_is_valid(format: Format, kind: Kind) -> bool {
    format != Format::Code || kind == Kind::Completed
}

/// Tagged classification of a course file.
///
/// Each variant carries its operation-generation behavior; there is no
/// dispatch table or hierarchy beyond this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Source document executed into notebooks / html / code extracts.
    NotebookSource,
    /// PlantUML diagram rendered to svg.
    PlantUml,
    /// Draw.io diagram rendered to svg.
    DrawIo,
    /// Anything else: copied through by the driver, no jobs.
    Data,
}

/// Pure extension-based classification.
pub fn classify(path: &Path) -> FileKind {
    match path.extension().and_then(|e| e.to_str()).unwrap_or_default() {
        "src" | "py" | "md" => FileKind::NotebookSource,
        "pu" | "puml" | "plantuml" => FileKind::PlantUml,
        "drawio" => FileKind::DrawIo,
        _ => FileKind::Data,
    }
}

/// Stage of a notebook-source tuple. Diagrams render at stage 0 so their
/// images exist before documents execute; speaker html populates the
/// kernel-execution cache that the other html kinds reuse.
fn tuple_stage(format: Format, kind: Kind) -> u32 {
    match (format, kind) {
        (Format::Notebook, _) | (Format::Code, _) => 1,
        (Format::Html, Kind::Speaker) => 2,
        (Format::Html, _) => 3,
    }
}

const DIAGRAM_STAGE: u32 = 0;

/// One file of the course.
#[derive(Debug, Clone)]
pub struct CourseFile {
    pub path: PathBuf,
    pub kind: FileKind,
}

impl CourseFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let kind = classify(&path);
        Self { path, kind }
    }

    fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string())
    }

    /// Operations this file contributes for `target`, including implicit
    /// cache-populating executions resolved through `table`.
    pub fn operations(
        &self,
        target: &OutputTarget,
        languages: &[String],
        table: &ExecutionTable,
        correlation: &str,
    ) -> Vec<Operation> {
        match self.kind {
            FileKind::Data => Vec::new(),
            FileKind::PlantUml => self.diagram_operations(target, JobType::Plantuml, correlation),
            FileKind::DrawIo => self.diagram_operations(target, JobType::Drawio, correlation),
            FileKind::NotebookSource => {
                self.notebook_operations(target, languages, table, correlation)
            }
        }
    }

    /// Diagrams are language/format/kind-agnostic: one render per target.
    fn diagram_operations(
        &self,
        target: &OutputTarget,
        job_type: JobType,
        correlation: &str,
    ) -> Vec<Operation> {
        let output = target.path.join("img").join(format!("{}.svg", self.stem()));
        let payload = JobPayload::new(&self.path, &output, correlation);
        vec![Operation {
            job_type,
            payload,
            stage: DIAGRAM_STAGE,
            implicit: false,
        }]
    }

    fn notebook_operations(
        &self,
        target: &OutputTarget,
        languages: &[String],
        table: &ExecutionTable,
        correlation: &str,
    ) -> Vec<Operation> {
        let mut requested: HashSet<(String, Format, Kind)> = HashSet::new();
        for language in languages {
            for format in Format::ALL {
                for kind in Kind::ALL {
                    if !tuple_is_valid(format, kind) {
                        if target.matches(language, format, kind) {
                            tracing::warn!(
                                file = %self.path.display(),
                                %format,
                                %kind,
                                "ignoring invalid format/kind combination"
                            );
                        }
                        continue;
                    }
                    if target.matches(language, format, kind) {
                        requested.insert((language.clone(), format, kind));
                    }
                }
            }
        }

        let implicit = table.resolve_implicit(&requested);

        let mut operations = Vec::with_capacity(requested.len() + implicit.len());
        for (language, format, kind) in &requested {
            operations.push(self.tuple_operation(target, language, *format, *kind, false, correlation));
        }
        for (language, format, kind) in &implicit {
            operations.push(self.tuple_operation(target, language, *format, *kind, true, correlation));
        }
        operations.sort_by(|a, b| {
            (a.stage, a.payload.output_file.clone()).cmp(&(b.stage, b.payload.output_file.clone()))
        });
        operations
    }

    fn tuple_operation(
        &self,
        target: &OutputTarget,
        language: &str,
        format: Format,
        kind: Kind,
        implicit: bool,
        correlation: &str,
    ) -> Operation {
        // Implicit executions run for their cache side effect only; their
        // outputs land outside the user-visible tree.
        let base = if implicit { target.path.join(".cache") } else { target.path.clone() };
        let output = base
            .join(language)
            .join(format.dir_name())
            .join(kind.as_str())
            .join(format!("{}.{}", self.stem(), format.extension()));
        let payload = JobPayload::new(&self.path, &output, correlation)
            .with_extra("language", serde_json::Value::String(language.to_string()))
            .with_extra("format", serde_json::Value::String(format.to_string()))
            .with_extra("kind", serde_json::Value::String(kind.to_string()));
        Operation {
            job_type: JobType::Notebook,
            payload,
            stage: tuple_stage(format, kind),
            implicit,
        }
    }
}

/// A configured output directory plus filters. An unset filter means
/// "all"; implicit executions bypass filters entirely.
#[derive(Debug, Clone)]
pub struct OutputTarget {
    pub path: PathBuf,
    pub languages: Option<HashSet<String>>,
    pub formats: Option<HashSet<Format>>,
    pub kinds: Option<HashSet<Kind>>,
}

impl OutputTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), languages: None, formats: None, kinds: None }
    }

    pub fn languages<I: IntoIterator<Item = S>, S: Into<String>>(mut self, langs: I) -> Self {
        self.languages = Some(langs.into_iter().map(Into::into).collect());
        self
    }

    pub fn formats(mut self, formats: impl IntoIterator<Item = Format>) -> Self {
        self.formats = Some(formats.into_iter().collect());
        self
    }

    pub fn kinds(mut self, kinds: impl IntoIterator<Item = Kind>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    /// Whether a tuple passes all three filters.
    pub fn matches(&self, language: &str, format: Format, kind: Kind) -> bool {
        self.languages.as_ref().is_none_or(|l| l.contains(language))
            && self.formats.as_ref().is_none_or(|f| f.contains(&format))
            && self.kinds.as_ref().is_none_or(|k| k.contains(&kind))
    }
}

/// One schedulable unit: a payload for one converter at one stage.
#[derive(Debug, Clone)]
pub struct Operation {
    pub job_type: JobType,
    pub payload: JobPayload,
    pub stage: u32,
    /// Runs for its cache side effect; output is not user-visible.
    pub implicit: bool,
}

#[derive(Debug, Deserialize)]
struct CourseSpecFile {
    course: CourseHeader,
    #[serde(default, rename = "section")]
    sections: Vec<SectionSpec>,
}

#[derive(Debug, Deserialize)]
struct CourseHeader {
    name: String,
    languages: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SectionSpec {
    name: String,
    #[serde(default)]
    files: Vec<PathBuf>,
}

/// A loaded course: the external model the orchestrator consumes.
#[derive(Debug, Clone)]
pub struct Course {
    pub name: String,
    pub root: PathBuf,
    pub languages: Vec<String>,
    pub files: Vec<CourseFile>,
}

impl Course {
    /// Load a course spec (toml) from `path`; file paths resolve relative
    /// to the spec's directory.
    pub fn load(path: &Path) -> Result<Self, BuildError> {
        let text = std::fs::read_to_string(path).map_err(|e| BuildError::InvalidCourseSpec {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let spec: CourseSpecFile =
            toml::from_str(&text).map_err(|e| BuildError::InvalidCourseSpec {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        if spec.course.languages.is_empty() {
            return Err(BuildError::InvalidCourseSpec {
                path: path.to_path_buf(),
                reason: "course must declare at least one language".to_string(),
            });
        }
        let root = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        let mut files = Vec::new();
        for section in &spec.sections {
            for file in &section.files {
                let absolute = root.join(file);
                if !absolute.exists() {
                    return Err(BuildError::InvalidCourseSpec {
                        path: path.to_path_buf(),
                        reason: format!(
                            "section '{}' references missing file {}",
                            section.name,
                            file.display()
                        ),
                    });
                }
                files.push(CourseFile::new(absolute));
            }
        }
        Ok(Self { name: spec.course.name, root, languages: spec.course.languages, files })
    }

    /// The file matching `path`, if the course contains it.
    pub fn file_for_path(&self, path: &Path) -> Option<&CourseFile> {
        self.files.iter().find(|f| f.path == path)
    }

    /// A fresh correlation id for one build batch over this course.
    pub fn new_correlation(&self) -> String {
        correlation_id()
    }
}

#[cfg(test)]
#[path = "course_tests.rs"]
mod tests;
