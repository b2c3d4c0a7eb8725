//! The editable course tree.
//!
//! [`CourseTree`] owns a [`Course`] and is the only way to mutate it, so the
//! ordering and back-reference invariants hold after every operation:
//!
//! - every sibling group is dense and 1-based;
//! - every child points at the container it lives in.
//!
//! Lessons are addressed by id alone; the tree finds the owning module.
//! Nothing here touches the network.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{EntityKind, Result, TreeError};
use crate::id::EntityId;
use crate::model::{
    Assignment, AssignmentPatch, Content, Course, Lesson, LessonDetail, LessonPatch, Module,
    ModulePatch, NewContent, Question, QuestionOption,
};
use crate::ordering::{self, ensure_dense, find, find_mut, insert_after, move_to, normalize};
use crate::reconcile::{ContainerKey, OrderSnapshot, PositionDiff, PositionReconciler, StagedSync};
use crate::wire::{CourseRecord, ModuleDeep, ModuleDeepPayload};

/// Text of the two options a new question starts with.
const SEED_OPTIONS: [&str; 2] = ["Option 1", "Option 2"];

/// A course hierarchy with enforced ordering and back-references.
///
/// # Examples
///
/// ```
/// use syllabus_tree::{CourseTree, Course, EntityId};
///
/// let mut tree = CourseTree::new(Course::new(EntityId::local(), "rust-101", "Rust 101")).unwrap();
/// let intro = tree.insert_module(None, "Intro").unwrap();
/// let setup = tree.insert_module(None, "Setup").unwrap();
/// tree.move_module(&setup, 1).unwrap();
///
/// assert_eq!(tree.module(&setup).unwrap().position, 1);
/// assert_eq!(tree.module(&intro).unwrap().position, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseTree {
    course: Course,
}

impl CourseTree {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Wraps a course, normalizing every sibling group.
    ///
    /// Fails if a child's back-reference does not match its container.
    pub fn new(mut course: Course) -> Result<Self> {
        let mut repaired = normalize(&mut course.modules);
        for module in &mut course.modules {
            repaired |= normalize(&mut module.lessons);
            for lesson in &mut module.lessons {
                repaired |= normalize_lesson(lesson);
            }
        }
        if repaired {
            warn!(course = %course.id, "Course positions were not dense and have been renumbered");
        }
        let tree = Self { course };
        tree.check_invariants()?;
        Ok(tree)
    }

    /// Builds a tree from server responses.
    pub fn from_server(record: CourseRecord, modules: Vec<ModuleDeep>) -> Result<Self> {
        let course_id = record.id;
        let mut course = record.into_course();
        course.modules = modules
            .into_iter()
            .map(|deep| deep.into_module(course_id))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            course = %course.id,
            modules = course.modules.len(),
            "Loaded course tree from server"
        );
        Self::new(course)
    }

    /// The underlying course.
    #[must_use]
    pub const fn course(&self) -> &Course {
        &self.course
    }

    /// Consumes the tree, returning the course.
    #[must_use]
    pub fn into_course(self) -> Course {
        self.course
    }

    /// Course id.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.course.id
    }

    /// Modules in position order.
    #[must_use]
    pub fn modules(&self) -> &[Module] {
        &self.course.modules
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Looks up a module.
    pub fn module(&self, id: &EntityId) -> Result<&Module> {
        find(&self.course.modules, id)
    }

    fn module_mut(&mut self, id: &EntityId) -> Result<&mut Module> {
        find_mut(&mut self.course.modules, id)
    }

    fn lesson_index(&self, id: &EntityId) -> Result<(usize, usize)> {
        self.course
            .modules
            .iter()
            .enumerate()
            .find_map(|(m, module)| {
                module
                    .lessons
                    .iter()
                    .position(|lesson| lesson.id == *id)
                    .map(|l| (m, l))
            })
            .ok_or_else(|| TreeError::not_found(EntityKind::Lesson, id))
    }

    /// Looks up a lesson anywhere in the course.
    pub fn lesson(&self, id: &EntityId) -> Result<&Lesson> {
        let (m, l) = self.lesson_index(id)?;
        Ok(&self.course.modules[m].lessons[l])
    }

    fn lesson_mut(&mut self, id: &EntityId) -> Result<&mut Lesson> {
        let (m, l) = self.lesson_index(id)?;
        Ok(&mut self.course.modules[m].lessons[l])
    }

    /// Id of the module that holds `lesson_id`.
    pub fn module_of(&self, lesson_id: &EntityId) -> Result<EntityId> {
        let (m, _) = self.lesson_index(lesson_id)?;
        Ok(self.course.modules[m].id)
    }

    fn question_mut(&mut self, lesson_id: &EntityId, question_id: &EntityId) -> Result<&mut Question> {
        find_mut(&mut self.lesson_mut(lesson_id)?.questions, question_id)
    }

    // ========================================================================
    // Modules
    // ========================================================================

    /// Inserts an empty module after position `after` (`None` appends).
    pub fn insert_module(&mut self, after: Option<u32>, title: impl Into<String>) -> Result<EntityId> {
        let module = Module::new(self.course.id, title);
        let id = module.id;
        let position = insert_after(&mut self.course.modules, after, module)?;
        debug!(module = %id, position, "Inserted module");
        Ok(id)
    }

    /// Inserts a module that already holds one lesson, returning both ids.
    pub fn insert_module_with_lesson(
        &mut self,
        after: Option<u32>,
        title: impl Into<String>,
        lesson_title: impl Into<String>,
    ) -> Result<(EntityId, EntityId)> {
        let mut module = Module::new(self.course.id, title);
        let mut lesson = Lesson::new(module.id, lesson_title);
        lesson.position = 1;
        let ids = (module.id, lesson.id);
        module.lessons.push(lesson);
        insert_after(&mut self.course.modules, after, module)?;
        Ok(ids)
    }

    /// Applies a partial update to a module.
    pub fn update_module(&mut self, id: &EntityId, patch: ModulePatch) -> Result<()> {
        let module = self.module_mut(id)?;
        if let Some(title) = patch.title {
            module.title = title;
        }
        if let Some(description) = patch.description {
            module.description = Some(description);
        }
        Ok(())
    }

    /// Moves a module to `position` within the course.
    pub fn move_module(&mut self, id: &EntityId, position: u32) -> Result<()> {
        move_to(&mut self.course.modules, id, position)?;
        debug!(module = %id, position, "Moved module");
        Ok(())
    }

    /// Removes a module with its lessons.
    pub fn remove_module(&mut self, id: &EntityId) -> Result<Module> {
        let module = ordering::remove(&mut self.course.modules, id)?;
        debug!(module = %id, lessons = module.lessons.len(), "Removed module");
        Ok(module)
    }

    // ========================================================================
    // Lessons
    // ========================================================================

    /// Inserts a new lesson into `module_id` after position `after` (`None` appends).
    pub fn insert_lesson(
        &mut self,
        module_id: &EntityId,
        after: Option<u32>,
        title: impl Into<String>,
    ) -> Result<EntityId> {
        let module = self.module_mut(module_id)?;
        let lesson = Lesson::new(module.id, title);
        let id = lesson.id;
        let position = insert_after(&mut module.lessons, after, lesson)?;
        debug!(module = %module_id, lesson = %id, position, "Inserted lesson");
        Ok(id)
    }

    /// Applies a partial update to a lesson.
    pub fn update_lesson(&mut self, id: &EntityId, patch: LessonPatch) -> Result<()> {
        let lesson = self.lesson_mut(id)?;
        if let Some(title) = patch.title {
            lesson.title = title;
        }
        if let Some(description) = patch.description {
            lesson.description = Some(description);
        }
        if let Some(content) = patch.content {
            lesson.content = Some(content);
        }
        if let Some(video_url) = patch.video_url {
            lesson.video_url = Some(video_url).filter(|url| !url.is_empty());
        }
        if let Some(duration) = patch.duration {
            lesson.duration = duration;
        }
        if let Some(is_free) = patch.is_free {
            lesson.is_free = is_free;
        }
        if let Some(published) = patch.published {
            lesson.published = published;
        }
        Ok(())
    }

    /// Moves a lesson to `position` within its module.
    pub fn move_lesson(&mut self, id: &EntityId, position: u32) -> Result<()> {
        let (m, _) = self.lesson_index(id)?;
        move_to(&mut self.course.modules[m].lessons, id, position)?;
        debug!(lesson = %id, position, "Moved lesson");
        Ok(())
    }

    /// Removes a lesson from its module.
    pub fn remove_lesson(&mut self, id: &EntityId) -> Result<Lesson> {
        let (m, _) = self.lesson_index(id)?;
        let lesson = ordering::remove(&mut self.course.modules[m].lessons, id)?;
        debug!(lesson = %id, "Removed lesson");
        Ok(lesson)
    }

    // ========================================================================
    // Contents
    // ========================================================================

    /// Attaches a resource to a lesson after position `after` (`None` appends).
    pub fn insert_content(
        &mut self,
        lesson_id: &EntityId,
        after: Option<u32>,
        content: NewContent,
    ) -> Result<EntityId> {
        let lesson = self.lesson_mut(lesson_id)?;
        let content = Content {
            id: EntityId::local(),
            lesson_id: lesson.id,
            title: content.title,
            content_type: content.content_type,
            url: content.url,
            size: content.size,
            filename: content.filename,
            position: 0,
        };
        let id = content.id;
        insert_after(&mut lesson.contents, after, content)?;
        Ok(id)
    }

    /// Detaches a resource from a lesson.
    pub fn remove_content(&mut self, lesson_id: &EntityId, content_id: &EntityId) -> Result<Content> {
        ordering::remove(&mut self.lesson_mut(lesson_id)?.contents, content_id)
    }

    // ========================================================================
    // Quiz
    // ========================================================================

    /// Adds a question seeded with two options, the first one correct.
    pub fn insert_question(
        &mut self,
        lesson_id: &EntityId,
        after: Option<u32>,
        text: impl Into<String>,
    ) -> Result<EntityId> {
        let lesson = self.lesson_mut(lesson_id)?;
        let question_id = EntityId::local();
        let options = SEED_OPTIONS
            .iter()
            .zip(1..)
            .map(|(text, position)| QuestionOption {
                id: EntityId::local(),
                question_id,
                text: (*text).to_string(),
                is_correct: position == 1,
                position,
            })
            .collect();
        let question = Question {
            id: question_id,
            lesson_id: lesson.id,
            text: text.into(),
            position: 0,
            options,
        };
        insert_after(&mut lesson.questions, after, question)?;
        Ok(question_id)
    }

    /// Replaces the text of a question.
    pub fn set_question_text(
        &mut self,
        lesson_id: &EntityId,
        question_id: &EntityId,
        text: impl Into<String>,
    ) -> Result<()> {
        self.question_mut(lesson_id, question_id)?.text = text.into();
        Ok(())
    }

    /// Removes a question with its options.
    pub fn remove_question(&mut self, lesson_id: &EntityId, question_id: &EntityId) -> Result<Question> {
        ordering::remove(&mut self.lesson_mut(lesson_id)?.questions, question_id)
    }

    /// Adds an incorrect option to a question after position `after` (`None` appends).
    pub fn insert_option(
        &mut self,
        lesson_id: &EntityId,
        question_id: &EntityId,
        after: Option<u32>,
        text: impl Into<String>,
    ) -> Result<EntityId> {
        let question = self.question_mut(lesson_id, question_id)?;
        let option = QuestionOption {
            id: EntityId::local(),
            question_id: question.id,
            text: text.into(),
            is_correct: false,
            position: 0,
        };
        let id = option.id;
        insert_after(&mut question.options, after, option)?;
        Ok(id)
    }

    /// Replaces the text of an option.
    pub fn set_option_text(
        &mut self,
        lesson_id: &EntityId,
        question_id: &EntityId,
        option_id: &EntityId,
        text: impl Into<String>,
    ) -> Result<()> {
        let question = self.question_mut(lesson_id, question_id)?;
        find_mut(&mut question.options, option_id)?.text = text.into();
        Ok(())
    }

    /// Marks `option_id` as the only correct option of its question.
    pub fn set_correct_option(
        &mut self,
        lesson_id: &EntityId,
        question_id: &EntityId,
        option_id: &EntityId,
    ) -> Result<()> {
        let question = self.question_mut(lesson_id, question_id)?;
        find(&question.options, option_id)?;
        for option in &mut question.options {
            option.is_correct = option.id == *option_id;
        }
        Ok(())
    }

    /// Removes an option. If it was the correct one, the first remaining option becomes correct.
    pub fn remove_option(
        &mut self,
        lesson_id: &EntityId,
        question_id: &EntityId,
        option_id: &EntityId,
    ) -> Result<QuestionOption> {
        let question = self.question_mut(lesson_id, question_id)?;
        let removed = ordering::remove(&mut question.options, option_id)?;
        if !question.options.iter().any(|o| o.is_correct) {
            if let Some(first) = question.options.first_mut() {
                first.is_correct = true;
            }
        }
        Ok(removed)
    }

    // ========================================================================
    // Assignment
    // ========================================================================

    /// Gives a lesson an assignment. An existing assignment is kept as is.
    pub fn enable_assignment(&mut self, lesson_id: &EntityId, title: impl Into<String>) -> Result<EntityId> {
        let lesson = self.lesson_mut(lesson_id)?;
        let lesson_ref = lesson.id;
        let assignment = lesson.assignment.get_or_insert_with(|| Assignment {
            id: EntityId::local(),
            lesson_id: lesson_ref,
            title: title.into(),
            description: None,
        });
        Ok(assignment.id)
    }

    /// Applies a partial update to a lesson's assignment.
    pub fn update_assignment(&mut self, lesson_id: &EntityId, patch: AssignmentPatch) -> Result<()> {
        let assignment = self
            .lesson_mut(lesson_id)?
            .assignment
            .as_mut()
            .ok_or_else(|| TreeError::not_found(EntityKind::Assignment, lesson_id))?;
        if let Some(title) = patch.title {
            assignment.title = title;
        }
        if let Some(description) = patch.description {
            assignment.description = Some(description);
        }
        Ok(())
    }

    /// Removes a lesson's assignment.
    pub fn remove_assignment(&mut self, lesson_id: &EntityId) -> Result<Assignment> {
        self.lesson_mut(lesson_id)?
            .assignment
            .take()
            .ok_or_else(|| TreeError::not_found(EntityKind::Assignment, lesson_id))
    }

    // ========================================================================
    // Server reconciliation
    // ========================================================================

    /// Replaces the module at `local_id` with the server's canonical version.
    ///
    /// The module keeps its slot in the course; every id in the subtree is
    /// taken from the server.
    pub fn merge_server_module(&mut self, local_id: &EntityId, mut server: Module) -> Result<()> {
        let index = ordering::index_of(&self.course.modules, local_id)?;
        if server.id != *local_id && self.course.modules.iter().any(|m| m.id == server.id) {
            return Err(TreeError::malformed(format!(
                "server module '{}' already exists in course '{}'",
                server.id, self.course.id
            )));
        }
        server.course_id = self.course.id;
        server.position = self.course.modules[index].position;
        normalize(&mut server.lessons);
        for lesson in &mut server.lessons {
            lesson.module_id = server.id;
            normalize_lesson(lesson);
        }
        debug!(
            local = %local_id,
            server = %server.id,
            lessons = server.lessons.len(),
            "Merged server module"
        );
        self.course.modules[index] = server;
        Ok(())
    }

    /// Stores separately fetched contents, questions and assignment of a lesson.
    pub fn replace_lesson_detail(&mut self, lesson_id: &EntityId, detail: LessonDetail) -> Result<()> {
        let lesson = self.lesson_mut(lesson_id)?;
        let LessonDetail {
            mut contents,
            mut questions,
            mut assignment,
        } = detail;
        for content in &mut contents {
            content.lesson_id = lesson.id;
        }
        for question in &mut questions {
            question.lesson_id = lesson.id;
        }
        if let Some(assignment) = &mut assignment {
            assignment.lesson_id = lesson.id;
        }
        lesson.contents = contents;
        lesson.questions = questions;
        lesson.assignment = assignment;
        lesson.detail_loaded = true;
        normalize_lesson(lesson);
        Ok(())
    }

    // ========================================================================
    // Containers and reconciliation
    // ========================================================================

    /// Every reorderable container of the course.
    #[must_use]
    pub fn containers(&self) -> Vec<ContainerKey> {
        std::iter::once(ContainerKey::CourseModules(self.course.id))
            .chain(
                self.course
                    .modules
                    .iter()
                    .map(|module| ContainerKey::ModuleLessons(module.id)),
            )
            .collect()
    }

    fn check_container(&self, container: &ContainerKey) -> Result<()> {
        match container {
            ContainerKey::CourseModules(course_id) if *course_id == self.course.id => Ok(()),
            ContainerKey::CourseModules(course_id) => {
                Err(TreeError::malformed(format!("'{course_id}' is not this course")))
            }
            ContainerKey::ModuleLessons(module_id) => self.module(module_id).map(|_| ()),
        }
    }

    /// Captures the current order of `container`.
    pub fn snapshot(&self, container: ContainerKey) -> Result<OrderSnapshot> {
        self.check_container(&container)?;
        Ok(match container {
            ContainerKey::CourseModules(_) => OrderSnapshot::capture(container, &self.course.modules),
            ContainerKey::ModuleLessons(module_id) => {
                OrderSnapshot::capture(container, &self.module(&module_id)?.lessons)
            }
        })
    }

    /// Records the current order of every container as synced.
    pub fn record_baselines(&self, reconciler: &mut PositionReconciler) {
        reconciler.record(ContainerKey::CourseModules(self.course.id), &self.course.modules);
        for module in &self.course.modules {
            reconciler.record(ContainerKey::ModuleLessons(module.id), &module.lessons);
        }
    }

    /// Stages a position sync of `container` against `reconciler`'s baseline.
    pub fn stage(&self, reconciler: &mut PositionReconciler, container: ContainerKey) -> Result<StagedSync> {
        self.check_container(&container)?;
        Ok(match container {
            ContainerKey::CourseModules(_) => reconciler.stage(container, &self.course.modules),
            ContainerKey::ModuleLessons(module_id) => {
                reconciler.stage(container, &self.module(&module_id)?.lessons)
            }
        })
    }

    /// Diffs `container` against its baseline without staging it.
    pub fn preview(
        &self,
        reconciler: &PositionReconciler,
        container: ContainerKey,
    ) -> Result<PositionDiff> {
        self.check_container(&container)?;
        Ok(match container {
            ContainerKey::CourseModules(_) => reconciler.preview(container, &self.course.modules),
            ContainerKey::ModuleLessons(module_id) => {
                reconciler.preview(container, &self.module(&module_id)?.lessons)
            }
        })
    }

    /// Reverts the order of a container to `snapshot`.
    pub fn restore_order(&mut self, snapshot: &OrderSnapshot) -> Result<()> {
        self.check_container(&snapshot.container)?;
        match snapshot.container {
            ContainerKey::CourseModules(_) => snapshot.restore(&mut self.course.modules),
            ContainerKey::ModuleLessons(module_id) => {
                snapshot.restore(&mut self.module_mut(&module_id)?.lessons);
            }
        }
        debug!(container = %snapshot.container, "Restored container order");
        Ok(())
    }

    // ========================================================================
    // Invariants and payloads
    // ========================================================================

    /// Verifies density and back-references of every sibling group.
    pub fn check_invariants(&self) -> Result<()> {
        let course_id = self.course.id;
        ensure_dense(&self.course.modules, &course_id)?;
        for module in &self.course.modules {
            back_ref(EntityKind::Module, &module.id, &course_id, &module.course_id)?;
            ensure_dense(&module.lessons, &module.id)?;
            for lesson in &module.lessons {
                back_ref(EntityKind::Lesson, &lesson.id, &module.id, &lesson.module_id)?;
                ensure_dense(&lesson.contents, &lesson.id)?;
                for content in &lesson.contents {
                    back_ref(EntityKind::Content, &content.id, &lesson.id, &content.lesson_id)?;
                }
                ensure_dense(&lesson.questions, &lesson.id)?;
                for question in &lesson.questions {
                    back_ref(EntityKind::Question, &question.id, &lesson.id, &question.lesson_id)?;
                    ensure_dense(&question.options, &question.id)?;
                    for option in &question.options {
                        back_ref(EntityKind::Option, &option.id, &question.id, &option.question_id)?;
                    }
                }
                if let Some(assignment) = &lesson.assignment {
                    back_ref(
                        EntityKind::Assignment,
                        &assignment.id,
                        &lesson.id,
                        &assignment.lesson_id,
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Serializes a module subtree for a deep upsert.
    ///
    /// # Errors
    ///
    /// Fails with [`TreeError::DetailNotLoaded`] if a saved lesson's detail was
    /// never fetched, since the upsert would replace it with nothing.
    pub fn to_deep_payload(&self, module_id: &EntityId) -> Result<ModuleDeepPayload> {
        let module = self.module(module_id)?;
        if let Some(lesson) = module
            .lessons
            .iter()
            .find(|l| !l.id.is_local() && !l.detail_loaded)
        {
            return Err(TreeError::DetailNotLoaded { lesson: lesson.id });
        }
        Ok(ModuleDeepPayload::from_module(module))
    }

    /// Server id of the course, if it has been saved.
    #[must_use]
    pub const fn server_id(&self) -> Option<Uuid> {
        self.course.id.server_id()
    }
}

fn normalize_lesson(lesson: &mut Lesson) -> bool {
    let mut changed = normalize(&mut lesson.contents);
    changed |= normalize(&mut lesson.questions);
    for question in &mut lesson.questions {
        changed |= normalize(&mut question.options);
    }
    changed
}

fn back_ref(kind: EntityKind, id: &EntityId, expected: &EntityId, found: &EntityId) -> Result<()> {
    if expected == found {
        return Ok(());
    }
    Err(TreeError::BrokenBackReference {
        kind,
        id: *id,
        expected: expected.to_string(),
        found: found.to_string(),
    })
}
