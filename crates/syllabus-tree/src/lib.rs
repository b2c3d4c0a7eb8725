//! Syllabus course tree
//!
//! In-memory course hierarchy, dense ordering, position reconciliation,
//! payload validation and the wire shapes of the course backend.

pub mod error;
pub mod id;
pub mod model;
pub mod ordering;
pub mod reconcile;
pub mod tree;
pub mod validate;
pub mod wire;

pub use error::{EntityKind, Result, TreeError, ValidationIssue};
pub use id::{EntityId, ParseEntityIdError, LOCAL_ID_PREFIX};
pub use model::{
    Assignment, AssignmentPatch, Content, ContentType, Course, CourseMeta, Lesson, LessonDetail,
    LessonPatch, Module, ModulePatch, NewContent, Question, QuestionOption,
    DEFAULT_LESSON_DURATION,
};
pub use ordering::Positioned;
pub use reconcile::{
    reconcile, ContainerKey, OrderSnapshot, PositionDiff, PositionReconciler, PositionUpdate,
    StagedSync,
};
pub use tree::CourseTree;
pub use validate::{module_issues, validate_module};
pub use wire::{
    lesson_detail, AssignmentRecord, ContentRecord, CourseRecord, LessonDeep, LessonDeepPayload,
    LessonPositionsRequest, LessonRecord, ModuleDeep, ModuleDeepPayload, ModulePositionsRequest,
    ModuleRecord, OptionRecord, PositionItem, PositionsRequest, QuestionRecord,
    QuestionWithOptions,
};
