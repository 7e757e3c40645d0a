mod application;
mod domain;
mod infrastructure;

use application::bootstrap::bootstrap_workspace;
use application::commands::{
    AppState, check_conflict_impl, check_reminders_impl, clear_notifications_impl,
    create_appointment_impl, create_meeting_impl, create_note_impl, create_subtask_impl,
    create_task_impl, delete_appointment_impl, delete_meeting_impl, delete_note_impl,
    delete_subtask_impl, delete_task_impl, get_settings_impl, list_appointments_impl,
    list_meetings_impl, list_notes_impl, list_notifications_impl, list_subtasks_impl,
    list_tasks_impl, mark_notification_read_impl, resolve_conflict_prompt_impl, sign_in_impl,
    sign_out_impl, update_appointment_impl, update_meeting_impl, update_note_impl,
    update_settings_impl, update_subtask_impl, update_task_impl,
};
use application::confirmation::PromptNotifier;
use domain::conflict::Conflict;
use domain::models::{
    CalendarEvent, EventDraft, EventPatch, Note, NoteDraft, NotePatch, Notification,
    SettingsPatch, Subtask, SubtaskDraft, SubtaskPatch, Task, TaskDraft, TaskPatch, UserSettings,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tauri::{Emitter, Manager};

#[derive(Debug, Serialize)]
struct BootstrapResponse {
    workspace_root: String,
    database_path: String,
}

#[tauri::command]
fn bootstrap(root: Option<String>) -> Result<BootstrapResponse, String> {
    let workspace_root = match root {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir().map_err(|error| error.to_string())?,
    };

    let result = bootstrap_workspace(&workspace_root).map_err(|error| error.to_string())?;
    Ok(BootstrapResponse {
        workspace_root: result.workspace_root.display().to_string(),
        database_path: result.database_path.display().to_string(),
    })
}

#[tauri::command]
fn ping() -> &'static str {
    "pong"
}

#[tauri::command]
fn sign_in(state: tauri::State<'_, AppState>, access_token: String) -> Result<(), String> {
    sign_in_impl(state.inner(), access_token).map_err(|error| state.command_error("sign_in", &error))
}

#[tauri::command]
fn sign_out(state: tauri::State<'_, AppState>) -> Result<(), String> {
    sign_out_impl(state.inner()).map_err(|error| state.command_error("sign_out", &error))
}

#[tauri::command]
async fn list_tasks(state: tauri::State<'_, AppState>) -> Result<Vec<Task>, String> {
    list_tasks_impl(state.inner())
        .await
        .map_err(|error| state.command_error("list_tasks", &error))
}

#[tauri::command]
async fn create_task(state: tauri::State<'_, AppState>, draft: TaskDraft) -> Result<Task, String> {
    create_task_impl(state.inner(), draft)
        .await
        .map_err(|error| state.command_error("create_task", &error))
}

#[tauri::command]
async fn update_task(
    state: tauri::State<'_, AppState>,
    task_id: String,
    patch: TaskPatch,
) -> Result<Task, String> {
    update_task_impl(state.inner(), task_id, patch)
        .await
        .map_err(|error| state.command_error("update_task", &error))
}

#[tauri::command]
async fn delete_task(state: tauri::State<'_, AppState>, task_id: String) -> Result<(), String> {
    delete_task_impl(state.inner(), task_id)
        .await
        .map_err(|error| state.command_error("delete_task", &error))
}

#[tauri::command]
async fn list_subtasks(state: tauri::State<'_, AppState>) -> Result<Vec<Subtask>, String> {
    list_subtasks_impl(state.inner())
        .await
        .map_err(|error| state.command_error("list_subtasks", &error))
}

#[tauri::command]
async fn create_subtask(
    state: tauri::State<'_, AppState>,
    draft: SubtaskDraft,
) -> Result<Subtask, String> {
    create_subtask_impl(state.inner(), draft)
        .await
        .map_err(|error| state.command_error("create_subtask", &error))
}

#[tauri::command]
async fn update_subtask(
    state: tauri::State<'_, AppState>,
    subtask_id: String,
    patch: SubtaskPatch,
) -> Result<Subtask, String> {
    update_subtask_impl(state.inner(), subtask_id, patch)
        .await
        .map_err(|error| state.command_error("update_subtask", &error))
}

#[tauri::command]
async fn delete_subtask(
    state: tauri::State<'_, AppState>,
    subtask_id: String,
) -> Result<(), String> {
    delete_subtask_impl(state.inner(), subtask_id)
        .await
        .map_err(|error| state.command_error("delete_subtask", &error))
}

#[tauri::command]
async fn list_meetings(state: tauri::State<'_, AppState>) -> Result<Vec<CalendarEvent>, String> {
    list_meetings_impl(state.inner())
        .await
        .map_err(|error| state.command_error("list_meetings", &error))
}

#[tauri::command]
async fn create_meeting(
    state: tauri::State<'_, AppState>,
    draft: EventDraft,
) -> Result<CalendarEvent, String> {
    create_meeting_impl(state.inner(), draft)
        .await
        .map_err(|error| state.command_error("create_meeting", &error))
}

#[tauri::command]
async fn update_meeting(
    state: tauri::State<'_, AppState>,
    meeting_id: String,
    patch: EventPatch,
) -> Result<CalendarEvent, String> {
    update_meeting_impl(state.inner(), meeting_id, patch)
        .await
        .map_err(|error| state.command_error("update_meeting", &error))
}

#[tauri::command]
async fn delete_meeting(
    state: tauri::State<'_, AppState>,
    meeting_id: String,
) -> Result<(), String> {
    delete_meeting_impl(state.inner(), meeting_id)
        .await
        .map_err(|error| state.command_error("delete_meeting", &error))
}

#[tauri::command]
async fn list_appointments(
    state: tauri::State<'_, AppState>,
) -> Result<Vec<CalendarEvent>, String> {
    list_appointments_impl(state.inner())
        .await
        .map_err(|error| state.command_error("list_appointments", &error))
}

#[tauri::command]
async fn create_appointment(
    state: tauri::State<'_, AppState>,
    draft: EventDraft,
) -> Result<CalendarEvent, String> {
    create_appointment_impl(state.inner(), draft)
        .await
        .map_err(|error| state.command_error("create_appointment", &error))
}

#[tauri::command]
async fn update_appointment(
    state: tauri::State<'_, AppState>,
    appointment_id: String,
    patch: EventPatch,
) -> Result<CalendarEvent, String> {
    update_appointment_impl(state.inner(), appointment_id, patch)
        .await
        .map_err(|error| state.command_error("update_appointment", &error))
}

#[tauri::command]
async fn delete_appointment(
    state: tauri::State<'_, AppState>,
    appointment_id: String,
) -> Result<(), String> {
    delete_appointment_impl(state.inner(), appointment_id)
        .await
        .map_err(|error| state.command_error("delete_appointment", &error))
}

#[tauri::command]
async fn list_notes(state: tauri::State<'_, AppState>) -> Result<Vec<Note>, String> {
    list_notes_impl(state.inner())
        .await
        .map_err(|error| state.command_error("list_notes", &error))
}

#[tauri::command]
async fn create_note(state: tauri::State<'_, AppState>, draft: NoteDraft) -> Result<Note, String> {
    create_note_impl(state.inner(), draft)
        .await
        .map_err(|error| state.command_error("create_note", &error))
}

#[tauri::command]
async fn update_note(
    state: tauri::State<'_, AppState>,
    note_id: String,
    patch: NotePatch,
) -> Result<Note, String> {
    update_note_impl(state.inner(), note_id, patch)
        .await
        .map_err(|error| state.command_error("update_note", &error))
}

#[tauri::command]
async fn delete_note(state: tauri::State<'_, AppState>, note_id: String) -> Result<(), String> {
    delete_note_impl(state.inner(), note_id)
        .await
        .map_err(|error| state.command_error("delete_note", &error))
}

#[tauri::command]
fn check_conflict(
    state: tauri::State<'_, AppState>,
    start_time: i64,
    end_time: i64,
    all_day: bool,
    exclude_id: Option<String>,
) -> Result<Option<Conflict>, String> {
    check_conflict_impl(state.inner(), start_time, end_time, all_day, exclude_id)
        .map_err(|error| state.command_error("check_conflict", &error))
}

#[tauri::command]
fn resolve_conflict_prompt(
    state: tauri::State<'_, AppState>,
    prompt_id: String,
    accept: bool,
) -> Result<bool, String> {
    resolve_conflict_prompt_impl(state.inner(), prompt_id, accept)
        .map_err(|error| state.command_error("resolve_conflict_prompt", &error))
}

#[tauri::command]
fn check_reminders(state: tauri::State<'_, AppState>) -> Result<Vec<Notification>, String> {
    check_reminders_impl(state.inner())
        .map_err(|error| state.command_error("check_reminders", &error))
}

#[tauri::command]
fn list_notifications(state: tauri::State<'_, AppState>) -> Result<Vec<Notification>, String> {
    list_notifications_impl(state.inner())
        .map_err(|error| state.command_error("list_notifications", &error))
}

#[tauri::command]
fn mark_notification_read(
    state: tauri::State<'_, AppState>,
    notification_id: String,
) -> Result<bool, String> {
    mark_notification_read_impl(state.inner(), notification_id)
        .map_err(|error| state.command_error("mark_notification_read", &error))
}

#[tauri::command]
fn clear_notifications(state: tauri::State<'_, AppState>) -> Result<(), String> {
    clear_notifications_impl(state.inner())
        .map_err(|error| state.command_error("clear_notifications", &error))
}

#[tauri::command]
async fn get_settings(state: tauri::State<'_, AppState>) -> Result<UserSettings, String> {
    get_settings_impl(state.inner())
        .await
        .map_err(|error| state.command_error("get_settings", &error))
}

#[tauri::command]
async fn update_settings(
    state: tauri::State<'_, AppState>,
    patch: SettingsPatch,
) -> Result<UserSettings, String> {
    update_settings_impl(state.inner(), patch)
        .await
        .map_err(|error| state.command_error("update_settings", &error))
}

pub fn run() {
    tauri::Builder::default()
        .setup(|app| {
            let handle = app.handle().clone();
            let notifier: PromptNotifier = Arc::new(move |prompt| {
                let _ = handle.emit("conflict-prompt", prompt.clone());
            });
            let workspace_root = std::env::current_dir()?;
            let app_state = AppState::new(workspace_root, notifier)?;
            app.manage(app_state);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            ping,
            bootstrap,
            sign_in,
            sign_out,
            list_tasks,
            create_task,
            update_task,
            delete_task,
            list_subtasks,
            create_subtask,
            update_subtask,
            delete_subtask,
            list_meetings,
            create_meeting,
            update_meeting,
            delete_meeting,
            list_appointments,
            create_appointment,
            update_appointment,
            delete_appointment,
            list_notes,
            create_note,
            update_note,
            delete_note,
            check_conflict,
            resolve_conflict_prompt,
            check_reminders,
            list_notifications,
            mark_notification_read,
            clear_notifications,
            get_settings,
            update_settings
        ])
        .run(tauri::generate_context!())
        .expect("failed to run tauri app");
}
