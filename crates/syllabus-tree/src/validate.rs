//! Local validation of deep-upsert payloads.
//!
//! Everything here runs before a request is built, so an invalid module is
//! never sent. All problems are collected with the path of the offending
//! field and reported together.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, TreeError, ValidationIssue};
use crate::wire::{LessonDeepPayload, ModuleDeepPayload, QuestionPayload};

/// Durations written as unit tokens: `45m`, `1h 30m`, `90 seconds`, or a bare number.
static DURATION_TOKENS: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^(?:\d+\s*(?:hours?|hrs?|h|minutes?|mins?|m|seconds?|secs?|s)?\s*)+$").ok()
});

/// Durations written as a clock: `mm:ss` or `hh:mm:ss`.
static DURATION_CLOCK: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^\d{1,2}:\d{2}(?::\d{2})?$").ok());

static HTTP_URL: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^https?://[^\s/$.?#][^\s]*$").ok());

/// A pattern that failed to compile matches nothing.
fn is_match(pattern: &Lazy<Option<Regex>>, text: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(text))
}

/// Returns `true` if `duration` is a recognizable lesson duration.
#[must_use]
pub fn is_valid_duration(duration: &str) -> bool {
    let duration = duration.trim();
    !duration.is_empty()
        && (is_match(&DURATION_TOKENS, &duration.to_lowercase())
            || is_match(&DURATION_CLOCK, duration))
}

/// Returns `true` if `url` is an absolute http(s) URL.
#[must_use]
pub fn is_http_url(url: &str) -> bool {
    is_match(&HTTP_URL, url.trim())
}

fn blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// Validates a module payload, failing with every issue found.
pub fn validate_module(payload: &ModuleDeepPayload) -> Result<()> {
    let issues = module_issues(payload);
    if issues.is_empty() {
        Ok(())
    } else {
        Err(TreeError::validation(issues))
    }
}

/// Collects the issues of a module payload without failing.
#[must_use]
pub fn module_issues(payload: &ModuleDeepPayload) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if payload.course_id.is_local() {
        issues.push(ValidationIssue::new(
            "course_id",
            "Course must be saved before its modules",
        ));
    }
    if blank(&payload.title) {
        issues.push(ValidationIssue::new("title", "Module title is required"));
    }
    if payload.position < 1 {
        issues.push(ValidationIssue::new("position", "Position must be at least 1"));
    }
    for (index, lesson) in payload.lessons.iter().enumerate() {
        lesson_issues(lesson, &format!("lessons[{index}]"), &mut issues);
    }

    issues
}

fn lesson_issues(lesson: &LessonDeepPayload, path: &str, issues: &mut Vec<ValidationIssue>) {
    if blank(&lesson.title) {
        issues.push(ValidationIssue::new(
            format!("{path}.title"),
            "Lesson title is required",
        ));
    }
    if blank(&lesson.duration) {
        issues.push(ValidationIssue::new(
            format!("{path}.duration"),
            "Duration is required",
        ));
    } else if !is_valid_duration(&lesson.duration) {
        issues.push(ValidationIssue::new(
            format!("{path}.duration"),
            format!("'{}' is not a duration (try 12m, 1h 30m or 05:30)", lesson.duration),
        ));
    }
    if let Some(url) = lesson.video_url.as_deref().filter(|url| !blank(url)) {
        if !is_http_url(url) {
            issues.push(ValidationIssue::new(
                format!("{path}.video_url"),
                "Video URL must be valid",
            ));
        }
    }
    if lesson.position < 1 {
        issues.push(ValidationIssue::new(
            format!("{path}.position"),
            "Position must be at least 1",
        ));
    }

    for (index, content) in lesson.contents.iter().enumerate() {
        let path = format!("{path}.contents[{index}]");
        if blank(&content.title) {
            issues.push(ValidationIssue::new(format!("{path}.title"), "Content title is required"));
        }
        if blank(&content.content_type) {
            issues.push(ValidationIssue::new(format!("{path}.content_type"), "Content type is required"));
        }
        if blank(&content.url) {
            issues.push(ValidationIssue::new(format!("{path}.url"), "Content URL is required"));
        }
    }

    for (index, question) in lesson.questions.iter().enumerate() {
        question_issues(question, &format!("{path}.questions[{index}]"), issues);
    }

    if let Some(assignment) = &lesson.assignment {
        if blank(&assignment.title) {
            issues.push(ValidationIssue::new(
                format!("{path}.assignment.title"),
                "Assignment title is required",
            ));
        }
    }
}

fn question_issues(question: &QuestionPayload, path: &str, issues: &mut Vec<ValidationIssue>) {
    if blank(&question.question_text) {
        issues.push(ValidationIssue::new(
            format!("{path}.question_text"),
            "Question text is required",
        ));
    }
    if question.options.is_empty() {
        issues.push(ValidationIssue::new(
            format!("{path}.options"),
            "At least one option is required",
        ));
        return;
    }
    match question.options.iter().filter(|o| o.is_correct).count() {
        1 => {}
        0 => issues.push(ValidationIssue::new(
            format!("{path}.options"),
            "Each question must have one correct option",
        )),
        n => issues.push(ValidationIssue::new(
            format!("{path}.options"),
            format!("Each question must have exactly one correct option, found {n}"),
        )),
    }
    for (index, option) in question.options.iter().enumerate() {
        if blank(&option.option_text) {
            issues.push(ValidationIssue::new(
                format!("{path}.options[{index}].option_text"),
                "Option text is required",
            ));
        }
    }
}
