//! The remote store seam.
//!
//! [`RemoteStore`] is the set of backend operations the editor needs. The
//! production implementation is [`crate::HttpStore`]; [`crate::MemoryStore`]
//! stands in for the backend in tests.

use async_trait::async_trait;
use futures::future::try_join_all;
use syllabus_tree::{
    lesson_detail, AssignmentRecord, ContentRecord, CourseRecord, LessonDetail,
    LessonPositionsRequest, ModuleDeep, ModuleDeepPayload, ModulePositionsRequest, OptionRecord,
    PositionsRequest, QuestionRecord, QuestionWithOptions,
};
use uuid::Uuid;

use crate::error::RemoteFailure;

/// Result of a remote store call.
pub type RemoteResult<T> = std::result::Result<T, RemoteFailure>;

/// Backend operations on a course hierarchy.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// `GET /courses/{id}`
    async fn fetch_course(&self, course_id: Uuid) -> RemoteResult<CourseRecord>;

    /// `GET /courses/{id}/modules/deep`
    async fn fetch_modules_deep(&self, course_id: Uuid) -> RemoteResult<Vec<ModuleDeep>>;

    /// `POST /courses/{id}/modules/deep`
    ///
    /// Creates or updates a module with its whole subtree and returns the
    /// server's canonical version.
    async fn create_or_update_module_deep(
        &self,
        course_id: Uuid,
        payload: &ModuleDeepPayload,
    ) -> RemoteResult<ModuleDeep>;

    /// `PATCH /courses/{id}/modules/positions`
    async fn update_module_positions(&self, request: &ModulePositionsRequest) -> RemoteResult<()>;

    /// `PATCH /modules/{id}/lessons/positions`
    async fn update_lesson_positions(&self, request: &LessonPositionsRequest) -> RemoteResult<()>;

    /// `DELETE /modules/{id}`
    async fn delete_module(&self, module_id: Uuid) -> RemoteResult<()>;

    /// `DELETE /lessons/{id}`
    async fn delete_lesson(&self, lesson_id: Uuid) -> RemoteResult<()>;

    /// `GET /lessons/{id}/contents`
    async fn fetch_lesson_contents(&self, lesson_id: Uuid) -> RemoteResult<Vec<ContentRecord>>;

    /// `GET /lessons/{id}/questions`
    async fn fetch_lesson_questions(&self, lesson_id: Uuid) -> RemoteResult<Vec<QuestionRecord>>;

    /// `GET /lesson-questions/{id}/options`
    async fn fetch_question_options(&self, question_id: Uuid) -> RemoteResult<Vec<OptionRecord>>;

    /// `GET /lessons/{id}/assignment`; `None` when the lesson has no assignment.
    async fn fetch_lesson_assignment(
        &self,
        lesson_id: Uuid,
    ) -> RemoteResult<Option<AssignmentRecord>>;

    /// Sends a bulk position update for either container kind.
    async fn update_positions(&self, request: &PositionsRequest) -> RemoteResult<()> {
        match request {
            PositionsRequest::Modules(body) => self.update_module_positions(body).await,
            PositionsRequest::Lessons(body) => self.update_lesson_positions(body).await,
        }
    }

    /// Fetches contents, questions with their options, and the assignment of a lesson.
    ///
    /// The three lesson-level requests run concurrently; option requests
    /// follow once the questions are known.
    async fn fetch_lesson_detail(&self, lesson_id: Uuid) -> RemoteResult<LessonDetail> {
        let (contents, questions, assignment) = futures::try_join!(
            self.fetch_lesson_contents(lesson_id),
            self.fetch_lesson_questions(lesson_id),
            self.fetch_lesson_assignment(lesson_id),
        )?;

        let questions = try_join_all(questions.into_iter().map(|question| async move {
            let options = self.fetch_question_options(question.id).await?;
            Ok::<_, RemoteFailure>(QuestionWithOptions { question, options })
        }))
        .await?;

        lesson_detail(lesson_id, contents, questions, assignment)
            .map_err(|e| RemoteFailure::decode(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::memory::MemoryStore;

    use super::*;

    #[tokio::test]
    async fn test_fetch_lesson_detail_combines_peer_requests() {
        let store = MemoryStore::new();
        let course = store.seed_course("Rust 101", &[("Basics", &["Hello", "Cargo"])]);
        let lesson_id = store.lesson_ids(course.id)[0];
        store.seed_quiz(lesson_id, "Which keyword declares a binding?", &["let", "var"], 0);
        store.seed_assignment(lesson_id, "Write a hello world");

        let detail = store.fetch_lesson_detail(lesson_id).await.unwrap();

        assert_eq!(detail.questions.len(), 1);
        assert_eq!(detail.questions[0].options.len(), 2);
        assert!(detail.questions[0].options[0].is_correct);
        assert_eq!(detail.assignment.unwrap().title, "Write a hello world");
    }

    #[tokio::test]
    async fn test_update_positions_dispatches_by_container() {
        let store = MemoryStore::new();
        let course = store.seed_course("Rust 101", &[("A", &[]), ("B", &[])]);
        let modules = store.module_ids(course.id);

        let request = PositionsRequest::Modules(ModulePositionsRequest {
            course_id: course.id,
            modules: vec![
                syllabus_tree::PositionItem { id: modules[1], position: 1 },
                syllabus_tree::PositionItem { id: modules[0], position: 2 },
            ],
        });
        store.update_positions(&request).await.unwrap();

        assert_eq!(store.module_ids(course.id), vec![modules[1], modules[0]]);
        assert_eq!(store.calls(), vec!["PATCH module positions"]);
    }
}
