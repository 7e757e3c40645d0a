use crate::domain::models::{
    CalendarEvent, EventDraft, EventPatch, Note, NoteDraft, NotePatch, SettingsPatch, Subtask,
    SubtaskDraft, SubtaskPatch, Task, TaskDraft, TaskPatch, UserSettings,
};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

/// REST backend surface the client depends on. One method per collection
/// operation; every call carries the bearer token the backend expects.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn list_tasks(&self, access_token: &str) -> Result<Vec<Task>, InfraError>;
    async fn create_task(&self, access_token: &str, draft: &TaskDraft) -> Result<Task, InfraError>;
    async fn update_task(
        &self,
        access_token: &str,
        task_id: &str,
        patch: &TaskPatch,
    ) -> Result<Task, InfraError>;
    async fn delete_task(&self, access_token: &str, task_id: &str) -> Result<(), InfraError>;

    async fn list_subtasks(&self, access_token: &str) -> Result<Vec<Subtask>, InfraError>;
    async fn create_subtask(
        &self,
        access_token: &str,
        draft: &SubtaskDraft,
    ) -> Result<Subtask, InfraError>;
    async fn update_subtask(
        &self,
        access_token: &str,
        subtask_id: &str,
        patch: &SubtaskPatch,
    ) -> Result<Subtask, InfraError>;
    async fn delete_subtask(&self, access_token: &str, subtask_id: &str) -> Result<(), InfraError>;

    async fn list_meetings(&self, access_token: &str) -> Result<Vec<CalendarEvent>, InfraError>;
    async fn create_meeting(
        &self,
        access_token: &str,
        draft: &EventDraft,
    ) -> Result<CalendarEvent, InfraError>;
    async fn update_meeting(
        &self,
        access_token: &str,
        meeting_id: &str,
        patch: &EventPatch,
    ) -> Result<CalendarEvent, InfraError>;
    async fn delete_meeting(&self, access_token: &str, meeting_id: &str) -> Result<(), InfraError>;

    async fn list_appointments(&self, access_token: &str)
    -> Result<Vec<CalendarEvent>, InfraError>;
    async fn create_appointment(
        &self,
        access_token: &str,
        draft: &EventDraft,
    ) -> Result<CalendarEvent, InfraError>;
    async fn update_appointment(
        &self,
        access_token: &str,
        appointment_id: &str,
        patch: &EventPatch,
    ) -> Result<CalendarEvent, InfraError>;
    async fn delete_appointment(
        &self,
        access_token: &str,
        appointment_id: &str,
    ) -> Result<(), InfraError>;

    async fn list_notes(&self, access_token: &str) -> Result<Vec<Note>, InfraError>;
    async fn create_note(&self, access_token: &str, draft: &NoteDraft) -> Result<Note, InfraError>;
    async fn update_note(
        &self,
        access_token: &str,
        note_id: &str,
        patch: &NotePatch,
    ) -> Result<Note, InfraError>;
    async fn delete_note(&self, access_token: &str, note_id: &str) -> Result<(), InfraError>;

    async fn get_settings(&self, access_token: &str) -> Result<UserSettings, InfraError>;
    async fn update_settings(
        &self,
        access_token: &str,
        patch: &SettingsPatch,
    ) -> Result<UserSettings, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestBackendClient {
    client: Client,
    base_url: Url,
}

impl ReqwestBackendClient {
    pub fn new(base_url: &str) -> Result<Self, InfraError> {
        let base_url = Url::parse(base_url.trim())
            .map_err(|error| InfraError::InvalidInput(format!("invalid api base url: {error}")))?;
        Ok(Self {
            client: Client::new(),
            base_url,
        })
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::InvalidInput(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn collection_endpoint(&self, collection: &str) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| InfraError::Api("api base URL cannot be a base".to_string()))?;
            segments.pop_if_empty();
            segments.push(collection);
        }
        Ok(url)
    }

    fn item_endpoint(&self, collection: &str, item_id: &str) -> Result<Url, InfraError> {
        let mut url = self.collection_endpoint(collection)?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| InfraError::Api("api collection URL cannot be a base".to_string()))?;
            segments.push(item_id);
        }
        Ok(url)
    }

    fn api_error(status: reqwest::StatusCode, body: &str) -> InfraError {
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return InfraError::Unauthorized;
        }
        let message = if body.trim().is_empty() {
            format!("http {}", status.as_u16())
        } else {
            format!("http {}; body={body}", status.as_u16())
        };
        InfraError::Api(message)
    }

    async fn read_body(
        response: reqwest::Response,
        context: &str,
    ) -> Result<(reqwest::StatusCode, String), InfraError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Api(format!("failed reading {context} response: {error}")))?;
        Ok((status, body))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        access_token: &str,
        url: Url,
        context: &str,
    ) -> Result<T, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|error| InfraError::Api(format!("network error during {context}: {error}")))?;
        Self::parse_json(response, context).await
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        access_token: &str,
        url: Url,
        payload: &B,
        context: &str,
    ) -> Result<T, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        let response = self
            .client
            .post(url)
            .bearer_auth(access_token)
            .json(payload)
            .send()
            .await
            .map_err(|error| InfraError::Api(format!("network error during {context}: {error}")))?;
        Self::parse_json(response, context).await
    }

    async fn patch_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        access_token: &str,
        url: Url,
        payload: &B,
        context: &str,
    ) -> Result<T, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        let response = self
            .client
            .patch(url)
            .bearer_auth(access_token)
            .json(payload)
            .send()
            .await
            .map_err(|error| InfraError::Api(format!("network error during {context}: {error}")))?;
        Self::parse_json(response, context).await
    }

    async fn delete_item(
        &self,
        access_token: &str,
        url: Url,
        context: &str,
    ) -> Result<(), InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        let response = self
            .client
            .delete(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|error| InfraError::Api(format!("network error during {context}: {error}")))?;
        let (status, body) = Self::read_body(response, context).await?;
        if !status.is_success() {
            return Err(Self::api_error(status, &body));
        }
        Ok(())
    }

    async fn parse_json<T: DeserializeOwned>(
        response: reqwest::Response,
        context: &str,
    ) -> Result<T, InfraError> {
        let (status, body) = Self::read_body(response, context).await?;
        if !status.is_success() {
            return Err(Self::api_error(status, &body));
        }
        serde_json::from_str(&body).map_err(|error| {
            InfraError::Api(format!("invalid {context} payload: {error}; body={body}"))
        })
    }
}

#[async_trait]
impl BackendApi for ReqwestBackendClient {
    async fn list_tasks(&self, access_token: &str) -> Result<Vec<Task>, InfraError> {
        let url = self.collection_endpoint("tasks")?;
        self.get_json(access_token, url, "task list").await
    }

    async fn create_task(&self, access_token: &str, draft: &TaskDraft) -> Result<Task, InfraError> {
        let url = self.collection_endpoint("tasks")?;
        self.post_json(access_token, url, draft, "task create").await
    }

    async fn update_task(
        &self,
        access_token: &str,
        task_id: &str,
        patch: &TaskPatch,
    ) -> Result<Task, InfraError> {
        Self::ensure_non_empty(task_id, "task id")?;
        let url = self.item_endpoint("tasks", task_id)?;
        self.patch_json(access_token, url, patch, "task update").await
    }

    async fn delete_task(&self, access_token: &str, task_id: &str) -> Result<(), InfraError> {
        Self::ensure_non_empty(task_id, "task id")?;
        let url = self.item_endpoint("tasks", task_id)?;
        self.delete_item(access_token, url, "task delete").await
    }

    async fn list_subtasks(&self, access_token: &str) -> Result<Vec<Subtask>, InfraError> {
        let url = self.collection_endpoint("subtasks")?;
        self.get_json(access_token, url, "subtask list").await
    }

    async fn create_subtask(
        &self,
        access_token: &str,
        draft: &SubtaskDraft,
    ) -> Result<Subtask, InfraError> {
        let url = self.collection_endpoint("subtasks")?;
        self.post_json(access_token, url, draft, "subtask create").await
    }

    async fn update_subtask(
        &self,
        access_token: &str,
        subtask_id: &str,
        patch: &SubtaskPatch,
    ) -> Result<Subtask, InfraError> {
        Self::ensure_non_empty(subtask_id, "subtask id")?;
        let url = self.item_endpoint("subtasks", subtask_id)?;
        self.patch_json(access_token, url, patch, "subtask update").await
    }

    async fn delete_subtask(&self, access_token: &str, subtask_id: &str) -> Result<(), InfraError> {
        Self::ensure_non_empty(subtask_id, "subtask id")?;
        let url = self.item_endpoint("subtasks", subtask_id)?;
        self.delete_item(access_token, url, "subtask delete").await
    }

    async fn list_meetings(&self, access_token: &str) -> Result<Vec<CalendarEvent>, InfraError> {
        let url = self.collection_endpoint("meetings")?;
        self.get_json(access_token, url, "meeting list").await
    }

    async fn create_meeting(
        &self,
        access_token: &str,
        draft: &EventDraft,
    ) -> Result<CalendarEvent, InfraError> {
        let url = self.collection_endpoint("meetings")?;
        self.post_json(access_token, url, draft, "meeting create").await
    }

    async fn update_meeting(
        &self,
        access_token: &str,
        meeting_id: &str,
        patch: &EventPatch,
    ) -> Result<CalendarEvent, InfraError> {
        Self::ensure_non_empty(meeting_id, "meeting id")?;
        let url = self.item_endpoint("meetings", meeting_id)?;
        self.patch_json(access_token, url, patch, "meeting update").await
    }

    async fn delete_meeting(&self, access_token: &str, meeting_id: &str) -> Result<(), InfraError> {
        Self::ensure_non_empty(meeting_id, "meeting id")?;
        let url = self.item_endpoint("meetings", meeting_id)?;
        self.delete_item(access_token, url, "meeting delete").await
    }

    async fn list_appointments(
        &self,
        access_token: &str,
    ) -> Result<Vec<CalendarEvent>, InfraError> {
        let url = self.collection_endpoint("appointments")?;
        self.get_json(access_token, url, "appointment list").await
    }

    async fn create_appointment(
        &self,
        access_token: &str,
        draft: &EventDraft,
    ) -> Result<CalendarEvent, InfraError> {
        let url = self.collection_endpoint("appointments")?;
        self.post_json(access_token, url, draft, "appointment create").await
    }

    async fn update_appointment(
        &self,
        access_token: &str,
        appointment_id: &str,
        patch: &EventPatch,
    ) -> Result<CalendarEvent, InfraError> {
        Self::ensure_non_empty(appointment_id, "appointment id")?;
        let url = self.item_endpoint("appointments", appointment_id)?;
        self.patch_json(access_token, url, patch, "appointment update").await
    }

    async fn delete_appointment(
        &self,
        access_token: &str,
        appointment_id: &str,
    ) -> Result<(), InfraError> {
        Self::ensure_non_empty(appointment_id, "appointment id")?;
        let url = self.item_endpoint("appointments", appointment_id)?;
        self.delete_item(access_token, url, "appointment delete").await
    }

    async fn list_notes(&self, access_token: &str) -> Result<Vec<Note>, InfraError> {
        let url = self.collection_endpoint("notes")?;
        self.get_json(access_token, url, "note list").await
    }

    async fn create_note(&self, access_token: &str, draft: &NoteDraft) -> Result<Note, InfraError> {
        let url = self.collection_endpoint("notes")?;
        self.post_json(access_token, url, draft, "note create").await
    }

    async fn update_note(
        &self,
        access_token: &str,
        note_id: &str,
        patch: &NotePatch,
    ) -> Result<Note, InfraError> {
        Self::ensure_non_empty(note_id, "note id")?;
        let url = self.item_endpoint("notes", note_id)?;
        self.patch_json(access_token, url, patch, "note update").await
    }

    async fn delete_note(&self, access_token: &str, note_id: &str) -> Result<(), InfraError> {
        Self::ensure_non_empty(note_id, "note id")?;
        let url = self.item_endpoint("notes", note_id)?;
        self.delete_item(access_token, url, "note delete").await
    }

    async fn get_settings(&self, access_token: &str) -> Result<UserSettings, InfraError> {
        let url = self.collection_endpoint("settings")?;
        self.get_json(access_token, url, "settings read").await
    }

    async fn update_settings(
        &self,
        access_token: &str,
        patch: &SettingsPatch,
    ) -> Result<UserSettings, InfraError> {
        let url = self.collection_endpoint("settings")?;
        self.patch_json(access_token, url, patch, "settings update").await
    }
}
