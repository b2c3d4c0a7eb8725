//! Wire shapes exchanged with the course backend.
//!
//! Requests are built from the tree ([`ModuleDeepPayload::from_module`],
//! [`PositionsRequest::from_diff`]); responses are explicit records
//! that convert into tree entities, rejecting data that would break the
//! tree's invariants.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TreeError};
use crate::id::EntityId;
use crate::model::{
    Assignment, Content, ContentType, Course, CourseMeta, Lesson, LessonDetail, Module, Question,
    QuestionOption, DEFAULT_LESSON_DURATION,
};
use crate::ordering::normalize;
use crate::reconcile::{ContainerKey, PositionDiff};

// ============================================================================
// Deep upsert request
// ============================================================================

/// A module subtree sent to `POST /courses/{id}/modules/deep`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDeepPayload {
    /// Server id when updating an existing module.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    /// Owning course.
    pub course_id: EntityId,
    /// Display title.
    pub title: String,
    /// Optional summary; empty when there is none.
    #[serde(default)]
    pub description: String,
    /// 1-based position among its siblings.
    pub position: u32,
    /// Lessons in position order.
    #[serde(default)]
    pub lessons: Vec<LessonDeepPayload>,
}

/// A lesson inside a [`ModuleDeepPayload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct LessonDeepPayload {
    /// Server id, absent for new items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    /// Display title.
    pub title: String,
    /// Optional summary.
    #[serde(default)]
    pub description: Option<String>,
    /// Rich-text body.
    #[serde(default)]
    pub content: Option<String>,
    /// Video URL, when the lesson has one.
    #[serde(default)]
    pub video_url: Option<String>,
    /// Duration such as `12m` or `05:30`.
    pub duration: String,
    /// 1-based position among its siblings.
    pub position: u32,
    /// Whether the lesson is a free preview.
    #[serde(default)]
    pub is_free: bool,
    /// Whether the lesson is visible to students.
    #[serde(default)]
    pub published: bool,
    /// Attached resources.
    #[serde(default)]
    pub contents: Vec<ContentPayload>,
    /// Quiz questions.
    #[serde(default)]
    pub questions: Vec<QuestionPayload>,
    /// Assignment, when the lesson has one.
    #[serde(default)]
    pub assignment: Option<AssignmentPayload>,
}

/// A content attachment inside a [`LessonDeepPayload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPayload {
    /// Server id, absent for new items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    /// Display title.
    pub title: String,
    /// Resource kind: `video`, `pdf`, `document` or another value.
    pub content_type: String,
    /// Where the resource lives.
    pub url: String,
    /// Size in bytes, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    /// Original file name, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// 1-based position among its siblings.
    pub position: u32,
}

/// A quiz question inside a [`LessonDeepPayload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionPayload {
    /// Server id, absent for new items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    /// The question asked.
    pub question_text: String,
    /// 1-based position among its siblings.
    pub position: u32,
    /// Answer options.
    #[serde(default)]
    pub options: Vec<OptionPayload>,
}

/// An answer option inside a [`QuestionPayload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionPayload {
    /// Server id, absent for new items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    /// The answer shown.
    pub option_text: String,
    /// Whether this is the correct answer.
    pub is_correct: bool,
    /// 1-based position among its siblings.
    pub position: u32,
}

/// The assignment inside a [`LessonDeepPayload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentPayload {
    /// Display title.
    pub title: String,
    /// Instructions; empty when there are none.
    #[serde(default)]
    pub description: String,
}

impl ModuleDeepPayload {
    /// Serializes a module subtree. Local ids are left out so the backend assigns new ones.
    #[must_use]
    pub fn from_module(module: &Module) -> Self {
        Self {
            id: module.id.server_id(),
            course_id: module.course_id,
            title: module.title.clone(),
            description: module.description.clone().unwrap_or_default(),
            position: module.position,
            lessons: module.lessons.iter().map(LessonDeepPayload::from_lesson).collect(),
        }
    }

    /// Copy of the payload with every id stripped, for structural comparison.
    #[must_use]
    pub fn without_ids(&self) -> Self {
        let mut payload = self.clone();
        payload.id = None;
        for lesson in &mut payload.lessons {
            lesson.id = None;
            for content in &mut lesson.contents {
                content.id = None;
            }
            for question in &mut lesson.questions {
                question.id = None;
                for option in &mut question.options {
                    option.id = None;
                }
            }
        }
        payload
    }
}

impl LessonDeepPayload {
    fn from_lesson(lesson: &Lesson) -> Self {
        Self {
            id: lesson.id.server_id(),
            title: lesson.title.clone(),
            description: lesson.description.clone(),
            content: lesson.content.clone(),
            video_url: lesson.video_url.clone().filter(|url| !url.is_empty()),
            duration: lesson.duration.clone(),
            position: lesson.position,
            is_free: lesson.is_free,
            published: lesson.published,
            contents: lesson
                .contents
                .iter()
                .map(|c| ContentPayload {
                    id: c.id.server_id(),
                    title: c.title.clone(),
                    content_type: c.content_type.to_string(),
                    url: c.url.clone(),
                    file_size: c.size,
                    filename: c.filename.clone(),
                    position: c.position,
                })
                .collect(),
            questions: lesson
                .questions
                .iter()
                .map(|q| QuestionPayload {
                    id: q.id.server_id(),
                    question_text: q.text.clone(),
                    position: q.position,
                    options: q
                        .options
                        .iter()
                        .map(|o| OptionPayload {
                            id: o.id.server_id(),
                            option_text: o.text.clone(),
                            is_correct: o.is_correct,
                            position: o.position,
                        })
                        .collect(),
                })
                .collect(),
            assignment: lesson.assignment.as_ref().map(|a| AssignmentPayload {
                title: a.title.clone(),
                description: a.description.clone().unwrap_or_default(),
            }),
        }
    }
}

// ============================================================================
// Position requests
// ============================================================================

/// One entry of a bulk position update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionItem {
    /// Server id of the item.
    pub id: Uuid,
    /// Its new position.
    pub position: u32,
}

/// Body of `PATCH /courses/{id}/modules/positions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModulePositionsRequest {
    /// Course whose modules are reordered.
    pub course_id: Uuid,
    /// New positions of the moved modules.
    pub modules: Vec<PositionItem>,
}

/// Body of `PATCH /modules/{id}/lessons/positions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonPositionsRequest {
    /// Module whose lessons are reordered.
    pub module_id: Uuid,
    /// New positions of the moved lessons.
    pub lessons: Vec<PositionItem>,
}

/// A bulk position request for either container kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionsRequest {
    /// Module order of a course.
    Modules(ModulePositionsRequest),
    /// Lesson order of a module.
    Lessons(LessonPositionsRequest),
}

fn server_uuid(id: &EntityId) -> Result<Uuid> {
    id.server_id()
        .ok_or_else(|| TreeError::malformed(format!("'{id}' has not been saved yet")))
}

fn position_items(diff: &PositionDiff) -> Result<Vec<PositionItem>> {
    diff.items
        .iter()
        .map(|update| {
            Ok(PositionItem {
                id: server_uuid(&update.id)?,
                position: update.position,
            })
        })
        .collect()
}

impl PositionsRequest {
    /// Builds the request body for a staged diff.
    ///
    /// Fails when the container owner or an item only has a local id.
    pub fn from_diff(diff: &PositionDiff) -> Result<Self> {
        let items = position_items(diff)?;
        Ok(match diff.container {
            ContainerKey::CourseModules(course_id) => Self::Modules(ModulePositionsRequest {
                course_id: server_uuid(&course_id)?,
                modules: items,
            }),
            ContainerKey::ModuleLessons(module_id) => Self::Lessons(LessonPositionsRequest {
                module_id: server_uuid(&module_id)?,
                lessons: items,
            }),
        })
    }
}

// ============================================================================
// Response records
// ============================================================================

/// A course as returned by `GET /courses/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRecord {
    /// Server id.
    pub id: Uuid,
    /// URL slug.
    #[serde(default)]
    pub slug: String,
    /// Display title.
    pub title: String,
    /// Optional summary.
    #[serde(default)]
    pub description: Option<String>,
    /// Short teaser text.
    #[serde(default)]
    pub excerpt: Option<String>,
    /// Publication status, e.g. `draft`.
    #[serde(default)]
    pub status: Option<String>,
}

/// A module row as returned inside [`ModuleDeep`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    /// Server id.
    pub id: Uuid,
    /// Owning course, when the backend includes it.
    #[serde(default)]
    pub course_id: Option<Uuid>,
    /// Display title.
    pub title: String,
    /// Optional summary.
    #[serde(default)]
    pub description: Option<String>,
    /// 1-based position among its siblings.
    pub position: u32,
}

/// A lesson row as returned inside [`LessonDeep`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct LessonRecord {
    /// Server id.
    pub id: Uuid,
    /// Owning module, when the backend includes it.
    #[serde(default)]
    pub module_id: Option<Uuid>,
    /// Display title.
    pub title: String,
    /// Optional summary.
    #[serde(default)]
    pub description: Option<String>,
    /// Rich-text body.
    #[serde(default)]
    pub content: Option<String>,
    /// Video URL, when the lesson has one.
    #[serde(default)]
    pub video_url: Option<String>,
    /// Duration; missing values fall back to the default.
    #[serde(default)]
    pub duration: Option<String>,
    /// 1-based position among its siblings.
    pub position: u32,
    /// Whether the lesson is a free preview.
    #[serde(default)]
    pub is_free: bool,
    /// Whether the lesson is visible to students.
    #[serde(default)]
    pub published: bool,
}

/// A content row as returned by `GET /lessons/{id}/contents`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Server id.
    pub id: Uuid,
    /// Owning lesson, when the backend includes it.
    #[serde(default)]
    pub lesson_id: Option<Uuid>,
    /// Display title.
    pub title: String,
    /// Resource kind: `video`, `pdf`, `document` or another value.
    pub content_type: String,
    /// Where the resource lives.
    pub url: String,
    /// Size in bytes, when known.
    #[serde(default)]
    pub file_size: Option<u64>,
    /// Original file name, when known.
    #[serde(default)]
    pub filename: Option<String>,
    /// 1-based position among its siblings.
    #[serde(default)]
    pub position: u32,
}

/// A question row as returned by `GET /lessons/{id}/questions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
    /// Server id.
    pub id: Uuid,
    /// Owning lesson, when the backend includes it.
    #[serde(default)]
    pub lesson_id: Option<Uuid>,
    /// The question asked.
    pub question_text: String,
    /// 1-based position among its siblings.
    #[serde(default)]
    pub position: u32,
}

/// An option row as returned by `GET /lesson-questions/{id}/options`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionRecord {
    /// Server id.
    pub id: Uuid,
    /// Owning question, when the backend includes it.
    #[serde(default)]
    pub question_id: Option<Uuid>,
    /// The answer shown.
    pub option_text: String,
    /// Whether this is the correct answer.
    pub is_correct: bool,
    /// 1-based position among its siblings.
    #[serde(default)]
    pub position: u32,
}

/// The assignment of a lesson. The backend keys it by lesson id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    /// The lesson this assignment belongs to.
    pub lesson_id: Uuid,
    /// Display title.
    pub title: String,
    /// Optional summary.
    #[serde(default)]
    pub description: Option<String>,
}

/// A question together with its options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionWithOptions {
    /// The question record.
    pub question: QuestionRecord,
    /// Answer options.
    #[serde(default)]
    pub options: Vec<OptionRecord>,
}

/// A lesson subtree as returned inside [`ModuleDeep`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonDeep {
    /// The lesson record.
    pub lesson: LessonRecord,
    /// Attached resources.
    #[serde(default)]
    pub contents: Vec<ContentRecord>,
    /// Quiz questions.
    #[serde(default)]
    pub questions: Vec<QuestionWithOptions>,
    /// Assignment, when the lesson has one.
    #[serde(default)]
    pub assignment: Option<AssignmentRecord>,
}

/// A module subtree as returned by the deep endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDeep {
    /// The module record.
    pub module: ModuleRecord,
    /// Lessons in position order.
    #[serde(default)]
    pub lessons: Vec<LessonDeep>,
}

fn check_parent(kind: &str, child: Uuid, stored: Option<Uuid>, parent: Uuid) -> Result<()> {
    match stored {
        Some(found) if found != parent => Err(TreeError::malformed(format!(
            "{kind} '{child}' references '{found}' but was returned under '{parent}'"
        ))),
        _ => Ok(()),
    }
}

impl CourseRecord {
    /// Converts into an empty [`Course`]; modules are fetched separately.
    #[must_use]
    pub fn into_course(self) -> Course {
        Course {
            id: EntityId::Server(self.id),
            slug: self.slug,
            title: self.title,
            meta: CourseMeta {
                description: self.description,
                excerpt: self.excerpt,
                status: self.status,
            },
            modules: Vec::new(),
        }
    }
}

impl ModuleDeep {
    /// Converts into a [`Module`] of `course_id`, normalizing every sibling group.
    pub fn into_module(self, course_id: Uuid) -> Result<Module> {
        let ModuleDeep { module, lessons } = self;
        check_parent("module", module.id, module.course_id, course_id)?;
        let module_id = EntityId::Server(module.id);
        let mut lessons = lessons
            .into_iter()
            .map(|lesson| lesson.into_lesson(module.id))
            .collect::<Result<Vec<_>>>()?;
        normalize(&mut lessons);
        Ok(Module {
            id: module_id,
            course_id: EntityId::Server(course_id),
            title: module.title,
            description: module.description,
            position: module.position,
            lessons,
        })
    }
}

impl LessonDeep {
    fn into_lesson(self, module_id: Uuid) -> Result<Lesson> {
        let LessonDeep {
            lesson,
            contents,
            questions,
            assignment,
        } = self;
        check_parent("lesson", lesson.id, lesson.module_id, module_id)?;
        let detail = lesson_detail(lesson.id, contents, questions, assignment)?;
        Ok(Lesson {
            id: EntityId::Server(lesson.id),
            module_id: EntityId::Server(module_id),
            title: lesson.title,
            description: lesson.description,
            content: lesson.content,
            video_url: lesson.video_url.filter(|url| !url.is_empty()),
            duration: lesson
                .duration
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| DEFAULT_LESSON_DURATION.to_string()),
            position: lesson.position,
            is_free: lesson.is_free,
            published: lesson.published,
            contents: detail.contents,
            questions: detail.questions,
            assignment: detail.assignment,
            detail_loaded: true,
        })
    }
}

/// Assembles separately fetched records into a [`LessonDetail`].
///
/// Sibling groups are normalized; records that belong to another lesson
/// are rejected.
pub fn lesson_detail(
    lesson_id: Uuid,
    contents: Vec<ContentRecord>,
    questions: Vec<QuestionWithOptions>,
    assignment: Option<AssignmentRecord>,
) -> Result<LessonDetail> {
    let lesson_ref = EntityId::Server(lesson_id);

    let mut contents = contents
        .into_iter()
        .map(|record| {
            check_parent("content", record.id, record.lesson_id, lesson_id)?;
            Ok(Content {
                id: EntityId::Server(record.id),
                lesson_id: lesson_ref,
                title: record.title,
                content_type: ContentType::parse(&record.content_type),
                url: record.url,
                size: record.file_size,
                filename: record.filename,
                position: record.position,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    normalize(&mut contents);

    let mut questions = questions
        .into_iter()
        .map(|QuestionWithOptions { question, options }| {
            check_parent("question", question.id, question.lesson_id, lesson_id)?;
            let question_ref = EntityId::Server(question.id);
            let mut options = options
                .into_iter()
                .map(|record| {
                    check_parent("option", record.id, record.question_id, question.id)?;
                    Ok(QuestionOption {
                        id: EntityId::Server(record.id),
                        question_id: question_ref,
                        text: record.option_text,
                        is_correct: record.is_correct,
                        position: record.position,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            normalize(&mut options);
            Ok(Question {
                id: question_ref,
                lesson_id: lesson_ref,
                text: question.question_text,
                position: question.position,
                options,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    normalize(&mut questions);

    let assignment = assignment
        .map(|record| {
            if record.lesson_id != lesson_id {
                return Err(TreeError::malformed(format!(
                    "assignment of '{}' was returned for lesson '{lesson_id}'",
                    record.lesson_id
                )));
            }
            Ok(Assignment {
                id: lesson_ref,
                lesson_id: lesson_ref,
                title: record.title,
                description: record.description,
            })
        })
        .transpose()?;

    Ok(LessonDetail {
        contents,
        questions,
        assignment,
    })
}
