//! HTTP implementation of [`RemoteStore`] on top of `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use syllabus_tree::{
    AssignmentRecord, ContentRecord, CourseRecord, LessonPositionsRequest, ModuleDeep,
    ModuleDeepPayload, ModulePositionsRequest, OptionRecord, QuestionRecord,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::envelope::unwrap_envelope;
use crate::error::{FailureKind, RemoteFailure, Result};
use crate::store::{RemoteResult, RemoteStore};

fn transport_failure(err: &reqwest::Error) -> RemoteFailure {
    let kind = if err.is_timeout() {
        FailureKind::Timeout
    } else if err.is_decode() || err.is_body() {
        FailureKind::Decode
    } else {
        FailureKind::Network
    };
    RemoteFailure::new(kind, err.to_string())
}

/// Course backend reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpStore {
    /// Creates a store for the API rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns a `Network` failure if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> RemoteResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| transport_failure(&e))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Creates a store from validated configuration, reading the token from the environment.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            config.api_base_url.trim(),
            config.bearer_token(),
            config.timeout(),
        )?)
    }

    /// The API root every path is appended to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, method: Method, path: &str, builder: RequestBuilder) -> RemoteResult<T> {
        let response = builder.send().await.map_err(|e| {
            warn!(%method, path, error = %e, "Request failed before a response");
            transport_failure(&e)
        })?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| transport_failure(&e))?;
        debug!(%method, path, status, bytes = body.len(), "Response received");
        unwrap_envelope(status, &body)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> RemoteResult<T> {
        self.send(Method::GET, path, self.request(Method::GET, path))
            .await
    }

    async fn with_body<B, T>(&self, method: Method, path: &str, body: &B) -> RemoteResult<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let builder = self.request(method.clone(), path).json(body);
        self.send(method, path, builder).await
    }

    async fn delete(&self, path: &str) -> RemoteResult<()> {
        let _: IgnoredAny = self
            .send(Method::DELETE, path, self.request(Method::DELETE, path))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn fetch_course(&self, course_id: Uuid) -> RemoteResult<CourseRecord> {
        self.get(&format!("courses/{course_id}")).await
    }

    async fn fetch_modules_deep(&self, course_id: Uuid) -> RemoteResult<Vec<ModuleDeep>> {
        self.get(&format!("courses/{course_id}/modules/deep")).await
    }

    async fn create_or_update_module_deep(
        &self,
        course_id: Uuid,
        payload: &ModuleDeepPayload,
    ) -> RemoteResult<ModuleDeep> {
        self.with_body(
            Method::POST,
            &format!("courses/{course_id}/modules/deep"),
            payload,
        )
        .await
    }

    async fn update_module_positions(&self, request: &ModulePositionsRequest) -> RemoteResult<()> {
        let path = format!("courses/{}/modules/positions", request.course_id);
        let _: IgnoredAny = self.with_body(Method::PATCH, &path, request).await?;
        Ok(())
    }

    async fn update_lesson_positions(&self, request: &LessonPositionsRequest) -> RemoteResult<()> {
        let path = format!("modules/{}/lessons/positions", request.module_id);
        let _: IgnoredAny = self.with_body(Method::PATCH, &path, request).await?;
        Ok(())
    }

    async fn delete_module(&self, module_id: Uuid) -> RemoteResult<()> {
        self.delete(&format!("modules/{module_id}")).await
    }

    async fn delete_lesson(&self, lesson_id: Uuid) -> RemoteResult<()> {
        self.delete(&format!("lessons/{lesson_id}")).await
    }

    async fn fetch_lesson_contents(&self, lesson_id: Uuid) -> RemoteResult<Vec<ContentRecord>> {
        self.get(&format!("lessons/{lesson_id}/contents")).await
    }

    async fn fetch_lesson_questions(&self, lesson_id: Uuid) -> RemoteResult<Vec<QuestionRecord>> {
        self.get(&format!("lessons/{lesson_id}/questions")).await
    }

    async fn fetch_question_options(&self, question_id: Uuid) -> RemoteResult<Vec<OptionRecord>> {
        self.get(&format!("lesson-questions/{question_id}/options"))
            .await
    }

    async fn fetch_lesson_assignment(
        &self,
        lesson_id: Uuid,
    ) -> RemoteResult<Option<AssignmentRecord>> {
        match self
            .get::<Option<AssignmentRecord>>(&format!("lessons/{lesson_id}/assignment"))
            .await
        {
            Err(failure) if failure.kind == FailureKind::NotFound => Ok(None),
            other => other,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_base_and_path() {
        let store = HttpStore::new("http://lms.test/api/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(store.base_url(), "http://lms.test/api");
        assert_eq!(
            store.url("/courses/abc/modules/deep"),
            "http://lms.test/api/courses/abc/modules/deep"
        );
        assert_eq!(store.url("lessons/x"), "http://lms.test/api/lessons/x");
    }

    #[test]
    fn test_from_config_rejects_invalid_config() {
        let config = Config {
            api_base_url: "ftp://lms.test".to_string(),
            ..Config::default()
        };
        let err = HttpStore::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("apiBaseUrl"));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_a_network_failure() {
        // Port 1 on loopback is never served in the test environment.
        let store = HttpStore::new("http://127.0.0.1:1/api", None, Duration::from_secs(2)).unwrap();
        let failure = store.fetch_course(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(
            failure.kind,
            FailureKind::Network | FailureKind::Timeout
        ));
        assert!(failure.is_transient());
    }
}
