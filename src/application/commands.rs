use crate::application::bootstrap::bootstrap_workspace;
use crate::application::confirmation::{ConfirmationBroker, PromptNotifier};
use crate::application::mutation::OptimisticMutator;
use crate::application::reminders::ReminderService;
use crate::domain::conflict::{CandidateSlot, Conflict};
use crate::domain::models::{
    CalendarEvent, EventDraft, EventPatch, Note, NoteDraft, NotePatch, Notification,
    SettingsPatch, Subtask, SubtaskDraft, SubtaskPatch, Task, TaskDraft, TaskPatch, UserSettings,
};
use crate::infrastructure::backend_client::{BackendApi, ReqwestBackendClient};
use crate::infrastructure::collection_cache::CacheStore;
use crate::infrastructure::config::{
    read_api_base_url, read_reminder_thresholds, read_timezone,
};
use crate::infrastructure::credential_store::{CredentialStore, KeyringCredentialStore};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::notification_store::{
    NotificationRepository, SqliteNotificationRepository,
};
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    caches: Arc<CacheStore>,
    backend: Arc<dyn BackendApi>,
    credentials: Arc<dyn CredentialStore>,
    notifications: Arc<dyn NotificationRepository>,
    broker: Arc<ConfirmationBroker>,
    reminders: ReminderService,
    mutator: OptimisticMutator,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf, notifier: PromptNotifier) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let config_dir = workspace_root.join("config");

        let base_url = read_api_base_url(&config_dir)?;
        let backend: Arc<dyn BackendApi> = Arc::new(ReqwestBackendClient::new(&base_url)?);
        let credentials: Arc<dyn CredentialStore> = Arc::new(KeyringCredentialStore::default());
        let notifications: Arc<dyn NotificationRepository> =
            Arc::new(SqliteNotificationRepository::new(&bootstrap.database_path));

        Self::with_components(
            workspace_root,
            backend,
            credentials,
            notifications,
            notifier,
        )
    }

    /// Wires the state from pre-built components. Production goes through
    /// [`AppState::new`]; tests substitute in-memory doubles here.
    pub fn with_components(
        workspace_root: PathBuf,
        backend: Arc<dyn BackendApi>,
        credentials: Arc<dyn CredentialStore>,
        notifications: Arc<dyn NotificationRepository>,
        notifier: PromptNotifier,
    ) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let config_dir = workspace_root.join("config");
        let logs_dir = workspace_root.join("logs");

        let tz = read_timezone(&config_dir)?;
        let thresholds = read_reminder_thresholds(&config_dir)?;
        let caches = Arc::new(CacheStore::new());
        let mutator = OptimisticMutator::new(Arc::clone(&caches), Arc::clone(&backend), tz);
        let reminders = ReminderService::new(Arc::clone(&notifications), thresholds);

        Ok(Self {
            config_dir,
            database_path: bootstrap.database_path,
            logs_dir,
            caches,
            backend,
            credentials,
            notifications,
            broker: Arc::new(ConfirmationBroker::new(notifier)),
            reminders,
            mutator,
            log_guard: Mutex::new(()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }

    fn require_access_token(&self) -> Result<String, InfraError> {
        self.credentials.load_token()?.ok_or(InfraError::Unauthorized)
    }
}

/// A rejected session token is cleared rather than retried; the next command
/// surfaces `Unauthorized` immediately and the frontend routes to sign-in.
fn guard_session<T>(state: &AppState, result: Result<T, InfraError>) -> Result<T, InfraError> {
    if let Err(InfraError::Unauthorized) = &result {
        match state.credentials.delete_token() {
            Ok(()) => state.log_info("session", "cleared rejected access token"),
            Err(error) => state.log_error("session", &error.to_string()),
        }
    }
    result
}

pub fn sign_in_impl(state: &AppState, access_token: String) -> Result<(), InfraError> {
    let access_token = access_token.trim();
    if access_token.is_empty() {
        return Err(InfraError::InvalidInput(
            "access_token must not be empty".to_string(),
        ));
    }
    state.credentials.save_token(access_token)?;
    state.log_info("sign_in", "stored access token");
    Ok(())
}

pub fn sign_out_impl(state: &AppState) -> Result<(), InfraError> {
    state.credentials.delete_token()?;
    state.caches.reset_all()?;
    state.log_info("sign_out", "cleared access token and cached collections");
    Ok(())
}

pub async fn list_tasks_impl(state: &AppState) -> Result<Vec<Task>, InfraError> {
    let cache = &state.caches.tasks;
    if cache.is_fresh()? {
        if let Some(rows) = cache.read()? {
            return Ok(rows);
        }
    }
    let access_token = state.require_access_token()?;
    let fetch = cache.begin_fetch()?;
    let rows = guard_session(state, state.backend.list_tasks(&access_token).await)?;
    cache.complete_fetch(fetch, rows.clone())?;
    Ok(rows)
}

pub async fn create_task_impl(state: &AppState, draft: TaskDraft) -> Result<Task, InfraError> {
    let access_token = state.require_access_token()?;
    let created = guard_session(state, state.mutator.create_task(&access_token, draft).await)?;
    state.log_info("create_task", &format!("created task id={}", created.id));
    Ok(created)
}

pub async fn update_task_impl(
    state: &AppState,
    task_id: String,
    patch: TaskPatch,
) -> Result<Task, InfraError> {
    let access_token = state.require_access_token()?;
    guard_session(
        state,
        state.mutator.update_task(&access_token, &task_id, patch).await,
    )
}

pub async fn delete_task_impl(state: &AppState, task_id: String) -> Result<(), InfraError> {
    let access_token = state.require_access_token()?;
    guard_session(state, state.mutator.delete_task(&access_token, &task_id).await)?;
    state.log_info("delete_task", &format!("deleted task id={task_id}"));
    Ok(())
}

pub async fn list_subtasks_impl(state: &AppState) -> Result<Vec<Subtask>, InfraError> {
    let cache = &state.caches.subtasks;
    if cache.is_fresh()? {
        if let Some(rows) = cache.read()? {
            return Ok(rows);
        }
    }
    let access_token = state.require_access_token()?;
    let fetch = cache.begin_fetch()?;
    let rows = guard_session(state, state.backend.list_subtasks(&access_token).await)?;
    cache.complete_fetch(fetch, rows.clone())?;
    Ok(rows)
}

pub async fn create_subtask_impl(
    state: &AppState,
    draft: SubtaskDraft,
) -> Result<Subtask, InfraError> {
    let access_token = state.require_access_token()?;
    guard_session(state, state.mutator.create_subtask(&access_token, draft).await)
}

pub async fn update_subtask_impl(
    state: &AppState,
    subtask_id: String,
    patch: SubtaskPatch,
) -> Result<Subtask, InfraError> {
    let access_token = state.require_access_token()?;
    guard_session(
        state,
        state
            .mutator
            .update_subtask(&access_token, &subtask_id, patch)
            .await,
    )
}

pub async fn delete_subtask_impl(state: &AppState, subtask_id: String) -> Result<(), InfraError> {
    let access_token = state.require_access_token()?;
    guard_session(
        state,
        state.mutator.delete_subtask(&access_token, &subtask_id).await,
    )
}

pub async fn list_meetings_impl(state: &AppState) -> Result<Vec<CalendarEvent>, InfraError> {
    let cache = &state.caches.meetings;
    if cache.is_fresh()? {
        if let Some(rows) = cache.read()? {
            return Ok(rows);
        }
    }
    let access_token = state.require_access_token()?;
    let fetch = cache.begin_fetch()?;
    let rows = guard_session(state, state.backend.list_meetings(&access_token).await)?;
    cache.complete_fetch(fetch, rows.clone())?;
    Ok(rows)
}

pub async fn create_meeting_impl(
    state: &AppState,
    draft: EventDraft,
) -> Result<CalendarEvent, InfraError> {
    let access_token = state.require_access_token()?;
    let created = guard_session(
        state,
        state
            .mutator
            .create_meeting(&access_token, draft, state.broker.as_ref())
            .await,
    )?;
    state.log_info("create_meeting", &format!("created meeting id={}", created.id));
    Ok(created)
}

pub async fn update_meeting_impl(
    state: &AppState,
    meeting_id: String,
    patch: EventPatch,
) -> Result<CalendarEvent, InfraError> {
    let access_token = state.require_access_token()?;
    guard_session(
        state,
        state
            .mutator
            .update_meeting(&access_token, &meeting_id, patch, state.broker.as_ref())
            .await,
    )
}

pub async fn delete_meeting_impl(state: &AppState, meeting_id: String) -> Result<(), InfraError> {
    let access_token = state.require_access_token()?;
    guard_session(
        state,
        state.mutator.delete_meeting(&access_token, &meeting_id).await,
    )
}

pub async fn list_appointments_impl(state: &AppState) -> Result<Vec<CalendarEvent>, InfraError> {
    let cache = &state.caches.appointments;
    if cache.is_fresh()? {
        if let Some(rows) = cache.read()? {
            return Ok(rows);
        }
    }
    let access_token = state.require_access_token()?;
    let fetch = cache.begin_fetch()?;
    let rows = guard_session(state, state.backend.list_appointments(&access_token).await)?;
    cache.complete_fetch(fetch, rows.clone())?;
    Ok(rows)
}

pub async fn create_appointment_impl(
    state: &AppState,
    draft: EventDraft,
) -> Result<CalendarEvent, InfraError> {
    let access_token = state.require_access_token()?;
    guard_session(
        state,
        state
            .mutator
            .create_appointment(&access_token, draft, state.broker.as_ref())
            .await,
    )
}

pub async fn update_appointment_impl(
    state: &AppState,
    appointment_id: String,
    patch: EventPatch,
) -> Result<CalendarEvent, InfraError> {
    let access_token = state.require_access_token()?;
    guard_session(
        state,
        state
            .mutator
            .update_appointment(&access_token, &appointment_id, patch, state.broker.as_ref())
            .await,
    )
}

pub async fn delete_appointment_impl(
    state: &AppState,
    appointment_id: String,
) -> Result<(), InfraError> {
    let access_token = state.require_access_token()?;
    guard_session(
        state,
        state
            .mutator
            .delete_appointment(&access_token, &appointment_id)
            .await,
    )
}

pub async fn list_notes_impl(state: &AppState) -> Result<Vec<Note>, InfraError> {
    let cache = &state.caches.notes;
    if cache.is_fresh()? {
        if let Some(rows) = cache.read()? {
            return Ok(rows);
        }
    }
    let access_token = state.require_access_token()?;
    let fetch = cache.begin_fetch()?;
    let rows = guard_session(state, state.backend.list_notes(&access_token).await)?;
    cache.complete_fetch(fetch, rows.clone())?;
    Ok(rows)
}

pub async fn create_note_impl(state: &AppState, draft: NoteDraft) -> Result<Note, InfraError> {
    let access_token = state.require_access_token()?;
    guard_session(state, state.mutator.create_note(&access_token, draft).await)
}

pub async fn update_note_impl(
    state: &AppState,
    note_id: String,
    patch: NotePatch,
) -> Result<Note, InfraError> {
    let access_token = state.require_access_token()?;
    guard_session(
        state,
        state.mutator.update_note(&access_token, &note_id, patch).await,
    )
}

pub async fn delete_note_impl(state: &AppState, note_id: String) -> Result<(), InfraError> {
    let access_token = state.require_access_token()?;
    guard_session(state, state.mutator.delete_note(&access_token, &note_id).await)
}

/// Pure check against the cached collections; nothing is written and no
/// prompt is raised.
pub fn check_conflict_impl(
    state: &AppState,
    start_time: i64,
    end_time: i64,
    all_day: bool,
    exclude_id: Option<String>,
) -> Result<Option<Conflict>, InfraError> {
    if !all_day && end_time <= start_time {
        return Err(InfraError::InvalidInput(
            "end_time must be after start_time".to_string(),
        ));
    }
    state.mutator.detect_conflict_now(&CandidateSlot {
        start_time,
        end_time,
        all_day,
        exclude_id,
    })
}

pub fn resolve_conflict_prompt_impl(
    state: &AppState,
    prompt_id: String,
    accept: bool,
) -> Result<bool, InfraError> {
    let delivered = state.broker.resolve(&prompt_id, accept)?;
    if delivered {
        state.log_info(
            "resolve_conflict_prompt",
            &format!("prompt_id={prompt_id} accept={accept}"),
        );
    }
    Ok(delivered)
}

pub fn check_reminders_impl(state: &AppState) -> Result<Vec<Notification>, InfraError> {
    let tasks = state.caches.tasks.read()?.unwrap_or_default();
    let meetings = state.caches.meetings.read()?.unwrap_or_default();
    let appointments = state.caches.appointments.read()?.unwrap_or_default();

    let fired = state.reminders.scan(&tasks, &meetings, &appointments)?;
    if !fired.is_empty() {
        state.log_info(
            "check_reminders",
            &format!("fired {} reminder notifications", fired.len()),
        );
    }
    Ok(fired)
}

pub fn list_notifications_impl(state: &AppState) -> Result<Vec<Notification>, InfraError> {
    state.notifications.list()
}

pub fn mark_notification_read_impl(
    state: &AppState,
    notification_id: String,
) -> Result<bool, InfraError> {
    state.notifications.mark_read(notification_id.trim())
}

pub fn clear_notifications_impl(state: &AppState) -> Result<(), InfraError> {
    state.notifications.clear()?;
    state.log_info("clear_notifications", "cleared notification center");
    Ok(())
}

/// Settings bypass the collection caches; the record is small and reads are
/// rare enough that the backend stays the single source of truth.
pub async fn get_settings_impl(state: &AppState) -> Result<UserSettings, InfraError> {
    let access_token = state.require_access_token()?;
    guard_session(state, state.backend.get_settings(&access_token).await)
}

pub async fn update_settings_impl(
    state: &AppState,
    patch: SettingsPatch,
) -> Result<UserSettings, InfraError> {
    let access_token = state.require_access_token()?;
    guard_session(state, state.backend.update_settings(&access_token, &patch).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::confirmation::ConflictPrompt;
    use crate::domain::models::Priority;
    use crate::infrastructure::credential_store::InMemoryCredentialStore;
    use crate::infrastructure::notification_store::InMemoryNotificationRepository;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        fn new() -> Self {
            let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "planwise-command-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self { path }
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[derive(Default)]
    struct SeededBackend {
        tasks: Mutex<Vec<Task>>,
        calls: Mutex<Vec<&'static str>>,
        reject_all: std::sync::atomic::AtomicBool,
    }

    impl SeededBackend {
        fn record(&self, op: &'static str) -> Result<(), InfraError> {
            self.calls.lock().expect("call lock").push(op);
            if self.reject_all.load(Ordering::SeqCst) {
                return Err(InfraError::Unauthorized);
            }
            Ok(())
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().expect("call lock").clone()
        }
    }

    fn sample_task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            title: format!("task {id}"),
            description: None,
            completed: false,
            due_date: None,
            priority: Priority::Medium,
            is_recurring: false,
            parent_task_id: None,
            created_at: 1_704_067_200,
            updated_at: 1_704_067_200,
        }
    }

    fn sample_event(id: &str, start_time: i64, end_time: i64) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            title: format!("event {id}"),
            description: None,
            location: None,
            start_time,
            end_time,
            all_day: false,
            completed: false,
            is_recurring: false,
            recurrence_pattern: None,
            recurrence_interval: None,
            recurrence_end_date: None,
            created_at: 1_704_067_200,
            updated_at: 1_704_067_200,
        }
    }

    #[async_trait]
    impl BackendApi for SeededBackend {
        async fn list_tasks(&self, _access_token: &str) -> Result<Vec<Task>, InfraError> {
            self.record("list_tasks")?;
            Ok(self.tasks.lock().expect("task lock").clone())
        }

        async fn create_task(
            &self,
            _access_token: &str,
            draft: &TaskDraft,
        ) -> Result<Task, InfraError> {
            self.record("create_task")?;
            let mut task = sample_task("srv-tsk-1");
            task.title = draft.title.trim().to_string();
            Ok(task)
        }

        async fn update_task(
            &self,
            _access_token: &str,
            task_id: &str,
            _patch: &TaskPatch,
        ) -> Result<Task, InfraError> {
            self.record("update_task")?;
            Ok(sample_task(task_id))
        }

        async fn delete_task(&self, _access_token: &str, _task_id: &str) -> Result<(), InfraError> {
            self.record("delete_task")
        }

        async fn list_subtasks(&self, _access_token: &str) -> Result<Vec<Subtask>, InfraError> {
            self.record("list_subtasks")?;
            Ok(Vec::new())
        }

        async fn create_subtask(
            &self,
            _access_token: &str,
            draft: &SubtaskDraft,
        ) -> Result<Subtask, InfraError> {
            self.record("create_subtask")?;
            Ok(Subtask {
                id: "srv-sub-1".to_string(),
                task_id: draft.task_id.clone(),
                title: draft.title.trim().to_string(),
                completed: false,
                created_at: 1_704_067_200,
                updated_at: 1_704_067_200,
            })
        }

        async fn update_subtask(
            &self,
            _access_token: &str,
            subtask_id: &str,
            _patch: &SubtaskPatch,
        ) -> Result<Subtask, InfraError> {
            self.record("update_subtask")?;
            Ok(Subtask {
                id: subtask_id.to_string(),
                task_id: "tsk-1".to_string(),
                title: "subtask".to_string(),
                completed: false,
                created_at: 1_704_067_200,
                updated_at: 1_704_067_200,
            })
        }

        async fn delete_subtask(
            &self,
            _access_token: &str,
            _subtask_id: &str,
        ) -> Result<(), InfraError> {
            self.record("delete_subtask")
        }

        async fn list_meetings(
            &self,
            _access_token: &str,
        ) -> Result<Vec<CalendarEvent>, InfraError> {
            self.record("list_meetings")?;
            Ok(Vec::new())
        }

        async fn create_meeting(
            &self,
            _access_token: &str,
            draft: &EventDraft,
        ) -> Result<CalendarEvent, InfraError> {
            self.record("create_meeting")?;
            Ok(sample_event("srv-mtg-1", draft.start_time, draft.end_time))
        }

        async fn update_meeting(
            &self,
            _access_token: &str,
            meeting_id: &str,
            _patch: &EventPatch,
        ) -> Result<CalendarEvent, InfraError> {
            self.record("update_meeting")?;
            Ok(sample_event(meeting_id, 0, 1))
        }

        async fn delete_meeting(
            &self,
            _access_token: &str,
            _meeting_id: &str,
        ) -> Result<(), InfraError> {
            self.record("delete_meeting")
        }

        async fn list_appointments(
            &self,
            _access_token: &str,
        ) -> Result<Vec<CalendarEvent>, InfraError> {
            self.record("list_appointments")?;
            Ok(Vec::new())
        }

        async fn create_appointment(
            &self,
            _access_token: &str,
            draft: &EventDraft,
        ) -> Result<CalendarEvent, InfraError> {
            self.record("create_appointment")?;
            Ok(sample_event("srv-apt-1", draft.start_time, draft.end_time))
        }

        async fn update_appointment(
            &self,
            _access_token: &str,
            appointment_id: &str,
            _patch: &EventPatch,
        ) -> Result<CalendarEvent, InfraError> {
            self.record("update_appointment")?;
            Ok(sample_event(appointment_id, 0, 1))
        }

        async fn delete_appointment(
            &self,
            _access_token: &str,
            _appointment_id: &str,
        ) -> Result<(), InfraError> {
            self.record("delete_appointment")
        }

        async fn list_notes(&self, _access_token: &str) -> Result<Vec<Note>, InfraError> {
            self.record("list_notes")?;
            Ok(Vec::new())
        }

        async fn create_note(
            &self,
            _access_token: &str,
            draft: &NoteDraft,
        ) -> Result<Note, InfraError> {
            self.record("create_note")?;
            Ok(Note {
                id: "srv-nte-1".to_string(),
                title: draft.title.trim().to_string(),
                content: draft.content.clone(),
                created_at: 1_704_067_200,
                updated_at: 1_704_067_200,
            })
        }

        async fn update_note(
            &self,
            _access_token: &str,
            note_id: &str,
            _patch: &NotePatch,
        ) -> Result<Note, InfraError> {
            self.record("update_note")?;
            Ok(Note {
                id: note_id.to_string(),
                title: "note".to_string(),
                content: "body".to_string(),
                created_at: 1_704_067_200,
                updated_at: 1_704_067_200,
            })
        }

        async fn delete_note(&self, _access_token: &str, _note_id: &str) -> Result<(), InfraError> {
            self.record("delete_note")
        }

        async fn get_settings(&self, _access_token: &str) -> Result<UserSettings, InfraError> {
            self.record("get_settings")?;
            Ok(UserSettings {
                theme: "light".to_string(),
                timezone: "UTC".to_string(),
                time_format: "24h".to_string(),
            })
        }

        async fn update_settings(
            &self,
            _access_token: &str,
            patch: &SettingsPatch,
        ) -> Result<UserSettings, InfraError> {
            self.record("update_settings")?;
            Ok(UserSettings {
                theme: patch.theme.clone().unwrap_or_else(|| "light".to_string()),
                timezone: "UTC".to_string(),
                time_format: "24h".to_string(),
            })
        }
    }

    struct Harness {
        _workspace: TempWorkspace,
        state: Arc<AppState>,
        backend: Arc<SeededBackend>,
        credentials: Arc<InMemoryCredentialStore>,
        prompts: Arc<Mutex<Vec<ConflictPrompt>>>,
    }

    fn harness() -> Harness {
        let workspace = TempWorkspace::new();
        let backend = Arc::new(SeededBackend::default());
        let credentials = Arc::new(InMemoryCredentialStore::default());
        let notifications = Arc::new(InMemoryNotificationRepository::default());
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&prompts);
        let notifier: PromptNotifier = Arc::new(move |prompt: &ConflictPrompt| {
            sink.lock().expect("prompt sink").push(prompt.clone());
        });

        let state = AppState::with_components(
            workspace.path.clone(),
            Arc::clone(&backend) as Arc<dyn BackendApi>,
            Arc::clone(&credentials) as Arc<dyn CredentialStore>,
            notifications as Arc<dyn NotificationRepository>,
            notifier,
        )
        .expect("initialize app state");

        Harness {
            _workspace: workspace,
            state: Arc::new(state),
            backend,
            credentials,
            prompts,
        }
    }

    fn signed_in_harness() -> Harness {
        let harness = harness();
        sign_in_impl(&harness.state, "tok-test".to_string()).expect("sign in");
        harness
    }

    #[test]
    fn state_bootstrap_creates_workspace_layout() {
        let harness = harness();
        assert!(harness.state.config_dir().join("app.json").exists());
        assert!(harness.state.config_dir().join("reminders.json").exists());
        assert!(harness.state.database_path().exists());
    }

    #[test]
    fn sign_in_rejects_blank_token_and_stores_trimmed_value() {
        let harness = harness();
        assert!(sign_in_impl(&harness.state, "   ".to_string()).is_err());

        sign_in_impl(&harness.state, "  tok-abc  ".to_string()).expect("sign in");
        assert_eq!(
            harness.credentials.load_token().expect("load"),
            Some("tok-abc".to_string())
        );
    }

    #[test]
    fn sign_out_clears_token_and_caches() {
        let harness = signed_in_harness();
        harness
            .state
            .caches
            .tasks
            .write(vec![sample_task("tsk-1")])
            .expect("seed");
        harness
            .state
            .caches
            .meetings
            .write(vec![sample_event("mtg-1", 100, 200)])
            .expect("seed");

        sign_out_impl(&harness.state).expect("sign out");
        assert_eq!(harness.credentials.load_token().expect("load"), None);
        assert_eq!(harness.state.caches.tasks.read().expect("read"), None);
        assert_eq!(harness.state.caches.meetings.read().expect("read"), None);
    }

    #[tokio::test]
    async fn commands_without_a_session_fail_before_any_network_call() {
        let harness = harness();
        let result = list_tasks_impl(&harness.state).await;
        assert!(matches!(result, Err(InfraError::Unauthorized)));
        assert!(harness.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn list_tasks_fetches_once_then_serves_from_cache() {
        let harness = signed_in_harness();
        harness
            .backend
            .tasks
            .lock()
            .expect("seed lock")
            .push(sample_task("tsk-1"));

        let first = list_tasks_impl(&harness.state).await.expect("first list");
        let second = list_tasks_impl(&harness.state).await.expect("second list");
        assert_eq!(first, second);
        assert_eq!(harness.backend.calls(), vec!["list_tasks"]);
    }

    #[tokio::test]
    async fn mutation_invalidates_cache_so_next_list_refetches() {
        let harness = signed_in_harness();
        list_tasks_impl(&harness.state).await.expect("prime cache");

        create_task_impl(
            &harness.state,
            TaskDraft {
                title: "New".to_string(),
                description: None,
                due_date: None,
                priority: Priority::Low,
                is_recurring: false,
                parent_task_id: None,
            },
        )
        .await
        .expect("create");

        list_tasks_impl(&harness.state).await.expect("relist");
        assert_eq!(
            harness.backend.calls(),
            vec!["list_tasks", "create_task", "list_tasks"]
        );
    }

    #[tokio::test]
    async fn rejected_token_is_cleared_and_not_retried() {
        let harness = signed_in_harness();
        harness.backend.reject_all.store(true, Ordering::SeqCst);

        let result = list_tasks_impl(&harness.state).await;
        assert!(matches!(result, Err(InfraError::Unauthorized)));
        assert_eq!(harness.credentials.load_token().expect("load"), None);
        assert_eq!(harness.backend.calls(), vec!["list_tasks"]);

        // The next command short-circuits on the missing token.
        let retry = list_tasks_impl(&harness.state).await;
        assert!(matches!(retry, Err(InfraError::Unauthorized)));
        assert_eq!(harness.backend.calls(), vec!["list_tasks"]);
    }

    #[test]
    fn check_conflict_reports_overlap_without_mutating() {
        let harness = harness();
        harness
            .state
            .caches
            .meetings
            .write(vec![sample_event("mtg-1", 1_704_099_600, 1_704_103_200)])
            .expect("seed");

        let conflict = check_conflict_impl(&harness.state, 1_704_101_400, 1_704_105_000, false, None)
            .expect("check");
        assert!(conflict.is_some());

        let excluded =
            check_conflict_impl(&harness.state, 1_704_101_400, 1_704_105_000, false, Some("mtg-1".to_string()))
                .expect("check excluded");
        assert!(excluded.is_none());
    }

    #[tokio::test]
    async fn conflicting_meeting_create_waits_for_prompt_resolution() {
        let harness = signed_in_harness();
        harness
            .state
            .caches
            .meetings
            .write(vec![sample_event("mtg-1", 1_704_099_600, 1_704_103_200)])
            .expect("seed");

        let state = Arc::clone(&harness.state);
        let pending = tokio::spawn(async move {
            create_meeting_impl(
                &state,
                EventDraft {
                    title: "Overlapping".to_string(),
                    description: None,
                    location: None,
                    start_time: 1_704_101_400,
                    end_time: 1_704_105_000,
                    all_day: false,
                    is_recurring: false,
                    recurrence_pattern: None,
                    recurrence_interval: None,
                    recurrence_end_date: None,
                },
            )
            .await
        });

        let prompt_id = loop {
            if let Some(prompt) = harness.prompts.lock().expect("prompt sink").first() {
                break prompt.prompt_id.clone();
            }
            tokio::task::yield_now().await;
        };

        let delivered = resolve_conflict_prompt_impl(&harness.state, prompt_id, false)
            .expect("resolve prompt");
        assert!(delivered);

        let result = pending.await.expect("join");
        assert!(matches!(result, Err(InfraError::ConflictDeclined(_))));
        assert!(!harness.backend.calls().contains(&"create_meeting"));
    }

    #[test]
    fn resolving_an_unknown_prompt_reports_undelivered() {
        let harness = harness();
        let delivered = resolve_conflict_prompt_impl(&harness.state, "prompt-999".to_string(), true)
            .expect("resolve");
        assert!(!delivered);
    }

    #[test]
    fn check_reminders_scans_cached_collections_and_persists() {
        let harness = harness();
        let now = Utc::now().timestamp();
        let mut due_task = sample_task("tsk-due");
        due_task.due_date = Some(now + 30 * 60);
        harness.state.caches.tasks.write(vec![due_task]).expect("seed");

        let fired = check_reminders_impl(&harness.state).expect("scan");
        assert!(!fired.is_empty());

        let listed = list_notifications_impl(&harness.state).expect("list");
        assert_eq!(listed.len(), fired.len());

        let again = check_reminders_impl(&harness.state).expect("rescan");
        assert!(again.is_empty());
    }

    #[test]
    fn notification_read_and_clear_flow() {
        let harness = harness();
        let now = Utc::now().timestamp();
        let mut due_task = sample_task("tsk-due");
        due_task.due_date = Some(now + 60);
        harness.state.caches.tasks.write(vec![due_task]).expect("seed");
        let fired = check_reminders_impl(&harness.state).expect("scan");

        assert!(
            mark_notification_read_impl(&harness.state, fired[0].id.clone()).expect("mark read")
        );
        assert!(!mark_notification_read_impl(&harness.state, "ntf-missing".to_string())
            .expect("mark missing"));

        clear_notifications_impl(&harness.state).expect("clear");
        assert!(list_notifications_impl(&harness.state).expect("list").is_empty());
    }

    #[tokio::test]
    async fn settings_round_trip_goes_straight_to_the_backend() {
        let harness = signed_in_harness();
        let settings = get_settings_impl(&harness.state).await.expect("get");
        assert_eq!(settings.theme, "light");

        let updated = update_settings_impl(
            &harness.state,
            SettingsPatch {
                theme: Some("dark".to_string()),
                timezone: None,
                time_format: None,
            },
        )
        .await
        .expect("update");
        assert_eq!(updated.theme, "dark");
        assert_eq!(harness.backend.calls(), vec!["get_settings", "update_settings"]);
    }
}
