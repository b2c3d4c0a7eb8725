//! Entities of the course hierarchy.
//!
//! A [`Course`] owns an ordered list of [`Module`]s, each module owns an
//! ordered list of [`Lesson`]s, and each lesson owns its [`Content`]s,
//! [`Question`]s and an optional [`Assignment`]. Every child keeps a
//! back-reference to its container; the [`crate::CourseTree`] keeps those
//! consistent.

use serde::{Deserialize, Serialize};

use crate::id::EntityId;

/// Default duration given to lessons created in the editor.
pub const DEFAULT_LESSON_DURATION: &str = "0m";

// ============================================================================
// Course
// ============================================================================

/// Descriptive fields of a course that the editor does not touch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseMeta {
    /// Long description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Short teaser text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    /// Publication status as reported by the backend (e.g. `draft`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Root of the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    /// Course id.
    pub id: EntityId,
    /// URL slug.
    pub slug: String,
    /// Display title.
    pub title: String,
    /// Other descriptive fields.
    #[serde(default)]
    pub meta: CourseMeta,
    /// Modules ordered by position.
    #[serde(default)]
    pub modules: Vec<Module>,
}

impl Course {
    /// Creates an empty course.
    #[must_use]
    pub fn new(id: EntityId, slug: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id,
            slug: slug.into(),
            title: title.into(),
            meta: CourseMeta::default(),
            modules: Vec::new(),
        }
    }
}

// ============================================================================
// Module
// ============================================================================

/// A chapter of a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    /// Module id.
    pub id: EntityId,
    /// Back-reference to the owning course.
    pub course_id: EntityId,
    /// Display title.
    pub title: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// 1-based position within the course.
    pub position: u32,
    /// Lessons ordered by position.
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

impl Module {
    /// Creates a module with a fresh local id. The position is assigned on insert.
    #[must_use]
    pub fn new(course_id: EntityId, title: impl Into<String>) -> Self {
        Self {
            id: EntityId::local(),
            course_id,
            title: title.into(),
            description: None,
            position: 0,
            lessons: Vec::new(),
        }
    }
}

/// Partial update of a module's own fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModulePatch {
    /// New title.
    #[serde(default)]
    pub title: Option<String>,
    /// New description.
    #[serde(default)]
    pub description: Option<String>,
}

// ============================================================================
// Lesson
// ============================================================================

/// A single lesson of a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct Lesson {
    /// Lesson id.
    pub id: EntityId,
    /// Back-reference to the owning module.
    pub module_id: EntityId,
    /// Display title.
    pub title: String,
    /// Optional summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional rich-text body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Optional main video.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    /// Human duration, e.g. `12m` or `1h 30m`.
    pub duration: String,
    /// 1-based position within the module.
    pub position: u32,
    /// Whether the lesson is part of the free preview.
    #[serde(default)]
    pub is_free: bool,
    /// Whether the lesson is visible to students.
    #[serde(default)]
    pub published: bool,
    /// Attached resources ordered by position.
    #[serde(default)]
    pub contents: Vec<Content>,
    /// Quiz questions ordered by position.
    #[serde(default)]
    pub questions: Vec<Question>,
    /// Optional assignment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment: Option<Assignment>,
    /// Whether contents, questions and assignment have been fetched.
    #[serde(default)]
    pub detail_loaded: bool,
}

impl Lesson {
    /// Creates a lesson with a fresh local id. The position is assigned on insert.
    #[must_use]
    pub fn new(module_id: EntityId, title: impl Into<String>) -> Self {
        Self {
            id: EntityId::local(),
            module_id,
            title: title.into(),
            description: None,
            content: None,
            video_url: None,
            duration: DEFAULT_LESSON_DURATION.to_string(),
            position: 0,
            is_free: false,
            published: false,
            contents: Vec::new(),
            questions: Vec::new(),
            assignment: None,
            // A brand-new lesson has nothing left to fetch.
            detail_loaded: true,
        }
    }
}

/// Partial update of a lesson's own fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonPatch {
    /// New title.
    #[serde(default)]
    pub title: Option<String>,
    /// New summary.
    #[serde(default)]
    pub description: Option<String>,
    /// New rich-text body.
    #[serde(default)]
    pub content: Option<String>,
    /// New video URL.
    #[serde(default)]
    pub video_url: Option<String>,
    /// New duration.
    #[serde(default)]
    pub duration: Option<String>,
    /// New free-preview flag.
    #[serde(default)]
    pub is_free: Option<bool>,
    /// New published flag.
    #[serde(default)]
    pub published: Option<bool>,
}

/// The peer subtrees of a lesson, fetched together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonDetail {
    /// Attached resources.
    pub contents: Vec<Content>,
    /// Quiz questions with their options.
    pub questions: Vec<Question>,
    /// Optional assignment.
    pub assignment: Option<Assignment>,
}

// ============================================================================
// Content
// ============================================================================

/// Kind of an attached resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// A video file.
    Video,
    /// A PDF document.
    Pdf,
    /// Any other document (slides, spreadsheets, ...).
    Document,
    /// A type the editor does not know about, kept verbatim.
    Other(String),
}

impl ContentType {
    /// Parses a content type case-insensitively; unknown values are kept as `Other`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "video" => Self::Video,
            "pdf" => Self::Pdf,
            "document" => Self::Document,
            _ => Self::Other(s.to_string()),
        }
    }

    /// Wire representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Video => "video",
            Self::Pdf => "pdf",
            Self::Document => "document",
            Self::Other(s) => s,
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ContentType {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ContentType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

/// A resource attached to a lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    /// Content id.
    pub id: EntityId,
    /// Back-reference to the owning lesson.
    pub lesson_id: EntityId,
    /// Display title.
    pub title: String,
    /// Resource kind.
    #[serde(rename = "type")]
    pub content_type: ContentType,
    /// Where the resource lives.
    pub url: String,
    /// Size in bytes, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Original file name, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// 1-based position within the lesson.
    pub position: u32,
}

/// Fields needed to attach a new resource to a lesson.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContent {
    /// Display title.
    pub title: String,
    /// Resource kind.
    pub content_type: ContentType,
    /// Where the resource lives.
    pub url: String,
    /// Size in bytes, when known.
    pub size: Option<u64>,
    /// Original file name, when known.
    pub filename: Option<String>,
}

// ============================================================================
// Quiz
// ============================================================================

/// A quiz question of a lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Question id.
    pub id: EntityId,
    /// Back-reference to the owning lesson.
    pub lesson_id: EntityId,
    /// Question text.
    pub text: String,
    /// 1-based position within the lesson.
    pub position: u32,
    /// Answer options ordered by position.
    #[serde(default)]
    pub options: Vec<QuestionOption>,
}

impl Question {
    /// Number of options marked correct.
    #[must_use]
    pub fn correct_count(&self) -> usize {
        self.options.iter().filter(|o| o.is_correct).count()
    }
}

/// An answer option of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    /// Option id.
    pub id: EntityId,
    /// Back-reference to the owning question.
    pub question_id: EntityId,
    /// Option text.
    pub text: String,
    /// Whether this is the right answer.
    pub is_correct: bool,
    /// 1-based position within the question.
    pub position: u32,
}

// ============================================================================
// Assignment
// ============================================================================

/// The (at most one) assignment of a lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Assignment id.
    pub id: EntityId,
    /// Back-reference to the owning lesson.
    pub lesson_id: EntityId,
    /// Display title.
    pub title: String,
    /// Optional instructions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Partial update of an assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentPatch {
    /// New title.
    #[serde(default)]
    pub title: Option<String>,
    /// New instructions.
    #[serde(default)]
    pub description: Option<String>,
}
