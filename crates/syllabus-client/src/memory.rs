//! An in-memory [`RemoteStore`].
//!
//! [`MemoryStore`] behaves like the course backend: it assigns ids on deep
//! upsert, applies bulk position updates and leaves position gaps behind
//! deletes. It records every call and can be told to fail or stall, which
//! makes it the backing store of the test suites and of the mock HTTP
//! backend in the integration tests.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use syllabus_tree::{
    AssignmentRecord, ContentRecord, CourseRecord, LessonDeep, LessonDeepPayload, LessonRecord,
    LessonPositionsRequest, ModuleDeep, ModuleDeepPayload, ModulePositionsRequest, ModuleRecord,
    OptionRecord, PositionItem, QuestionRecord, QuestionWithOptions, DEFAULT_LESSON_DURATION,
};
use uuid::Uuid;

use crate::error::{FailureKind, RemoteFailure};
use crate::store::{RemoteResult, RemoteStore};

#[derive(Debug, Default)]
struct State {
    courses: Vec<CourseRecord>,
    modules: Vec<ModuleRecord>,
    lessons: Vec<LessonRecord>,
    contents: Vec<ContentRecord>,
    questions: Vec<QuestionRecord>,
    options: Vec<OptionRecord>,
    assignments: Vec<AssignmentRecord>,
    calls: Vec<String>,
    failures: VecDeque<RemoteFailure>,
    delay: Option<Duration>,
}

impl State {
    fn course_module_ids(&self, course_id: Uuid) -> Vec<Uuid> {
        let mut modules: Vec<&ModuleRecord> = self
            .modules
            .iter()
            .filter(|m| m.course_id == Some(course_id))
            .collect();
        modules.sort_by_key(|m| m.position);
        modules.iter().map(|m| m.id).collect()
    }

    fn module_lesson_ids(&self, module_id: Uuid) -> Vec<Uuid> {
        let mut lessons: Vec<&LessonRecord> = self
            .lessons
            .iter()
            .filter(|l| l.module_id == Some(module_id))
            .collect();
        lessons.sort_by_key(|l| l.position);
        lessons.iter().map(|l| l.id).collect()
    }

    fn lesson_deep(&self, lesson: &LessonRecord) -> LessonDeep {
        let mut contents: Vec<ContentRecord> = self
            .contents
            .iter()
            .filter(|c| c.lesson_id == Some(lesson.id))
            .cloned()
            .collect();
        contents.sort_by_key(|c| c.position);
        let mut questions: Vec<QuestionWithOptions> = self
            .questions
            .iter()
            .filter(|q| q.lesson_id == Some(lesson.id))
            .map(|question| QuestionWithOptions {
                question: question.clone(),
                options: self.question_options(question.id),
            })
            .collect();
        questions.sort_by_key(|q| q.question.position);
        LessonDeep {
            lesson: lesson.clone(),
            contents,
            questions,
            assignment: self
                .assignments
                .iter()
                .find(|a| a.lesson_id == lesson.id)
                .cloned(),
        }
    }

    fn question_options(&self, question_id: Uuid) -> Vec<OptionRecord> {
        let mut options: Vec<OptionRecord> = self
            .options
            .iter()
            .filter(|o| o.question_id == Some(question_id))
            .cloned()
            .collect();
        options.sort_by_key(|o| o.position);
        options
    }

    fn module_deep(&self, module_id: Uuid) -> Option<ModuleDeep> {
        let module = self.modules.iter().find(|m| m.id == module_id)?.clone();
        let lessons = self
            .module_lesson_ids(module_id)
            .into_iter()
            .filter_map(|id| self.lessons.iter().find(|l| l.id == id))
            .map(|lesson| self.lesson_deep(lesson))
            .collect();
        Some(ModuleDeep { module, lessons })
    }

    fn remove_lesson_children(&mut self, lesson_id: Uuid) {
        let question_ids: Vec<Uuid> = self
            .questions
            .iter()
            .filter(|q| q.lesson_id == Some(lesson_id))
            .map(|q| q.id)
            .collect();
        self.options
            .retain(|o| !o.question_id.is_some_and(|q| question_ids.contains(&q)));
        self.questions.retain(|q| q.lesson_id != Some(lesson_id));
        self.contents.retain(|c| c.lesson_id != Some(lesson_id));
        self.assignments.retain(|a| a.lesson_id != lesson_id);
    }

    fn remove_lesson(&mut self, lesson_id: Uuid) {
        self.remove_lesson_children(lesson_id);
        self.lessons.retain(|l| l.id != lesson_id);
    }

    fn upsert_lesson(&mut self, module_id: Uuid, payload: &LessonDeepPayload) -> Uuid {
        let lesson_id = payload.id.unwrap_or_else(Uuid::new_v4);
        let record = LessonRecord {
            id: lesson_id,
            module_id: Some(module_id),
            title: payload.title.clone(),
            description: payload.description.clone(),
            content: payload.content.clone(),
            video_url: payload.video_url.clone(),
            duration: Some(payload.duration.clone()),
            position: payload.position,
            is_free: payload.is_free,
            published: payload.published,
        };
        match self.lessons.iter_mut().find(|l| l.id == lesson_id) {
            Some(existing) => *existing = record,
            None => self.lessons.push(record),
        }

        // Peer subtrees are replaced wholesale.
        self.remove_lesson_children(lesson_id);
        for content in &payload.contents {
            self.contents.push(ContentRecord {
                id: content.id.unwrap_or_else(Uuid::new_v4),
                lesson_id: Some(lesson_id),
                title: content.title.clone(),
                content_type: content.content_type.clone(),
                url: content.url.clone(),
                file_size: content.file_size,
                filename: content.filename.clone(),
                position: content.position,
            });
        }
        for question in &payload.questions {
            let question_id = question.id.unwrap_or_else(Uuid::new_v4);
            self.questions.push(QuestionRecord {
                id: question_id,
                lesson_id: Some(lesson_id),
                question_text: question.question_text.clone(),
                position: question.position,
            });
            for option in &question.options {
                self.options.push(OptionRecord {
                    id: option.id.unwrap_or_else(Uuid::new_v4),
                    question_id: Some(question_id),
                    option_text: option.option_text.clone(),
                    is_correct: option.is_correct,
                    position: option.position,
                });
            }
        }
        if let Some(assignment) = &payload.assignment {
            self.assignments.push(AssignmentRecord {
                lesson_id,
                title: assignment.title.clone(),
                description: non_empty(&assignment.description),
            });
        }
        lesson_id
    }
}

fn non_empty(text: &str) -> Option<String> {
    Some(text.to_string()).filter(|t| !t.is_empty())
}

fn not_found(what: &str, id: Uuid) -> RemoteFailure {
    RemoteFailure::from_status(404, format!("{what} {id} not found"))
}

fn apply_positions(
    positions: &[PositionItem],
    owned: &[Uuid],
    mut set: impl FnMut(Uuid, u32),
) -> RemoteResult<()> {
    if let Some(stray) = positions.iter().find(|item| !owned.contains(&item.id)) {
        return Err(RemoteFailure::from_status(
            422,
            format!("{} does not belong to this container", stray.id),
        ));
    }
    for item in positions {
        set(item.id, item.position);
    }
    Ok(())
}

/// In-memory course backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a test panicked mid-call; the data is still usable.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Records a call, applies the configured delay and pops an injected failure.
    async fn enter(&self, call: &str) -> RemoteResult<()> {
        let delay = {
            let mut state = self.lock();
            state.calls.push(call.to_string());
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.lock().failures.pop_front();
        failure.map_or(Ok(()), Err)
    }

    /// Makes the next call fail with `failure`. Failures queue up in order.
    pub fn fail_next(&self, failure: RemoteFailure) {
        self.lock().failures.push_back(failure);
    }

    /// Delays every call by `delay` before it touches the data.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.lock().delay = delay;
    }

    /// Every call received so far, e.g. `"PATCH module positions"`.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Adds a course with modules and lessons, returning the course record.
    pub fn seed_course(&self, title: &str, modules: &[(&str, &[&str])]) -> CourseRecord {
        let mut state = self.lock();
        let course = CourseRecord {
            id: Uuid::new_v4(),
            slug: title.to_lowercase().replace(' ', "-"),
            title: title.to_string(),
            description: None,
            excerpt: None,
            status: Some("draft".to_string()),
        };
        state.courses.push(course.clone());
        for (m, (module_title, lessons)) in modules.iter().enumerate() {
            let module_id = Uuid::new_v4();
            state.modules.push(ModuleRecord {
                id: module_id,
                course_id: Some(course.id),
                title: (*module_title).to_string(),
                description: None,
                position: u32::try_from(m + 1).unwrap_or(u32::MAX),
            });
            for (l, lesson_title) in lessons.iter().enumerate() {
                state.lessons.push(LessonRecord {
                    id: Uuid::new_v4(),
                    module_id: Some(module_id),
                    title: (*lesson_title).to_string(),
                    description: None,
                    content: None,
                    video_url: None,
                    duration: Some(DEFAULT_LESSON_DURATION.to_string()),
                    position: u32::try_from(l + 1).unwrap_or(u32::MAX),
                    is_free: false,
                    published: false,
                });
            }
        }
        course
    }

    /// Adds a question with options to a lesson; `correct` indexes the right option.
    pub fn seed_quiz(&self, lesson_id: Uuid, text: &str, options: &[&str], correct: usize) -> Uuid {
        let mut state = self.lock();
        let position = state
            .questions
            .iter()
            .filter(|q| q.lesson_id == Some(lesson_id))
            .count();
        let question_id = Uuid::new_v4();
        state.questions.push(QuestionRecord {
            id: question_id,
            lesson_id: Some(lesson_id),
            question_text: text.to_string(),
            position: u32::try_from(position + 1).unwrap_or(u32::MAX),
        });
        for (index, option) in options.iter().enumerate() {
            state.options.push(OptionRecord {
                id: Uuid::new_v4(),
                question_id: Some(question_id),
                option_text: (*option).to_string(),
                is_correct: index == correct,
                position: u32::try_from(index + 1).unwrap_or(u32::MAX),
            });
        }
        question_id
    }

    /// Gives a lesson an assignment.
    pub fn seed_assignment(&self, lesson_id: Uuid, title: &str) {
        let mut state = self.lock();
        state.assignments.retain(|a| a.lesson_id != lesson_id);
        state.assignments.push(AssignmentRecord {
            lesson_id,
            title: title.to_string(),
            description: None,
        });
    }

    /// Module ids of a course in stored position order.
    #[must_use]
    pub fn module_ids(&self, course_id: Uuid) -> Vec<Uuid> {
        self.lock().course_module_ids(course_id)
    }

    /// Lesson ids of a course, module by module, in stored position order.
    #[must_use]
    pub fn lesson_ids(&self, course_id: Uuid) -> Vec<Uuid> {
        let state = self.lock();
        state
            .course_module_ids(course_id)
            .into_iter()
            .flat_map(|module_id| state.module_lesson_ids(module_id))
            .collect()
    }

    /// Stored positions of a course's modules, in stored position order.
    #[must_use]
    pub fn module_positions(&self, course_id: Uuid) -> Vec<u32> {
        let state = self.lock();
        state
            .course_module_ids(course_id)
            .iter()
            .filter_map(|id| state.modules.iter().find(|m| m.id == *id))
            .map(|m| m.position)
            .collect()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn fetch_course(&self, course_id: Uuid) -> RemoteResult<CourseRecord> {
        self.enter("GET course").await?;
        self.lock()
            .courses
            .iter()
            .find(|c| c.id == course_id)
            .cloned()
            .ok_or_else(|| not_found("course", course_id))
    }

    async fn fetch_modules_deep(&self, course_id: Uuid) -> RemoteResult<Vec<ModuleDeep>> {
        self.enter("GET modules deep").await?;
        let state = self.lock();
        if !state.courses.iter().any(|c| c.id == course_id) {
            return Err(not_found("course", course_id));
        }
        Ok(state
            .course_module_ids(course_id)
            .into_iter()
            .filter_map(|id| state.module_deep(id))
            .collect())
    }

    async fn create_or_update_module_deep(
        &self,
        course_id: Uuid,
        payload: &ModuleDeepPayload,
    ) -> RemoteResult<ModuleDeep> {
        self.enter("POST module deep").await?;
        let mut state = self.lock();
        if !state.courses.iter().any(|c| c.id == course_id) {
            return Err(not_found("course", course_id));
        }
        if payload.title.trim().is_empty() {
            return Err(RemoteFailure::from_status(400, "title is required"));
        }

        let module_id = payload.id.unwrap_or_else(Uuid::new_v4);
        let record = ModuleRecord {
            id: module_id,
            course_id: Some(course_id),
            title: payload.title.clone(),
            description: non_empty(&payload.description),
            position: payload.position,
        };
        match state.modules.iter_mut().find(|m| m.id == module_id) {
            Some(existing) => *existing = record,
            None => state.modules.push(record),
        }

        let kept: Vec<Uuid> = payload.lessons.iter().filter_map(|l| l.id).collect();
        let stale: Vec<Uuid> = state
            .module_lesson_ids(module_id)
            .into_iter()
            .filter(|id| !kept.contains(id))
            .collect();
        for lesson_id in stale {
            state.remove_lesson(lesson_id);
        }
        for lesson in &payload.lessons {
            state.upsert_lesson(module_id, lesson);
        }

        state
            .module_deep(module_id)
            .ok_or_else(|| RemoteFailure::from_status(500, "module vanished during upsert"))
    }

    async fn update_module_positions(&self, request: &ModulePositionsRequest) -> RemoteResult<()> {
        self.enter("PATCH module positions").await?;
        let mut state = self.lock();
        let owned = state.course_module_ids(request.course_id);
        let modules = &mut state.modules;
        apply_positions(&request.modules, &owned, |id, position| {
            if let Some(module) = modules.iter_mut().find(|m| m.id == id) {
                module.position = position;
            }
        })
    }

    async fn update_lesson_positions(&self, request: &LessonPositionsRequest) -> RemoteResult<()> {
        self.enter("PATCH lesson positions").await?;
        let mut state = self.lock();
        let owned = state.module_lesson_ids(request.module_id);
        let lessons = &mut state.lessons;
        apply_positions(&request.lessons, &owned, |id, position| {
            if let Some(lesson) = lessons.iter_mut().find(|l| l.id == id) {
                lesson.position = position;
            }
        })
    }

    async fn delete_module(&self, module_id: Uuid) -> RemoteResult<()> {
        self.enter("DELETE module").await?;
        let mut state = self.lock();
        if !state.modules.iter().any(|m| m.id == module_id) {
            return Err(not_found("module", module_id));
        }
        for lesson_id in state.module_lesson_ids(module_id) {
            state.remove_lesson(lesson_id);
        }
        state.modules.retain(|m| m.id != module_id);
        Ok(())
    }

    async fn delete_lesson(&self, lesson_id: Uuid) -> RemoteResult<()> {
        self.enter("DELETE lesson").await?;
        let mut state = self.lock();
        if !state.lessons.iter().any(|l| l.id == lesson_id) {
            return Err(not_found("lesson", lesson_id));
        }
        state.remove_lesson(lesson_id);
        Ok(())
    }

    async fn fetch_lesson_contents(&self, lesson_id: Uuid) -> RemoteResult<Vec<ContentRecord>> {
        self.enter("GET lesson contents").await?;
        let state = self.lock();
        let lesson = state
            .lessons
            .iter()
            .find(|l| l.id == lesson_id)
            .ok_or_else(|| not_found("lesson", lesson_id))?;
        Ok(state.lesson_deep(lesson).contents)
    }

    async fn fetch_lesson_questions(&self, lesson_id: Uuid) -> RemoteResult<Vec<QuestionRecord>> {
        self.enter("GET lesson questions").await?;
        let state = self.lock();
        let lesson = state
            .lessons
            .iter()
            .find(|l| l.id == lesson_id)
            .ok_or_else(|| not_found("lesson", lesson_id))?;
        Ok(state
            .lesson_deep(lesson)
            .questions
            .into_iter()
            .map(|q| q.question)
            .collect())
    }

    async fn fetch_question_options(&self, question_id: Uuid) -> RemoteResult<Vec<OptionRecord>> {
        self.enter("GET question options").await?;
        let state = self.lock();
        if !state.questions.iter().any(|q| q.id == question_id) {
            return Err(not_found("question", question_id));
        }
        Ok(state.question_options(question_id))
    }

    async fn fetch_lesson_assignment(
        &self,
        lesson_id: Uuid,
    ) -> RemoteResult<Option<AssignmentRecord>> {
        self.enter("GET lesson assignment").await?;
        Ok(self
            .lock()
            .assignments
            .iter()
            .find(|a| a.lesson_id == lesson_id)
            .cloned())
    }
}

/// A failure as the backend would report a dropped connection.
#[must_use]
pub fn network_failure() -> RemoteFailure {
    RemoteFailure::new(FailureKind::Network, "connection reset by peer")
}
