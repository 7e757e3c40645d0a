use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecurrencePattern {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CalendarKind {
    Meeting,
    Appointment,
}

impl CalendarKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Meeting => "meeting",
            Self::Appointment => "appointment",
        }
    }
}

/// Shared shape for meetings and appointments. The two live in separate
/// backend collections and caches but are structurally identical, so the
/// conflict scan and the mutation wrapper treat them through one type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: i64,
    pub end_time: i64,
    pub all_day: bool,
    pub completed: bool,
    pub is_recurring: bool,
    pub recurrence_pattern: Option<RecurrencePattern>,
    pub recurrence_interval: Option<u32>,
    pub recurrence_end_date: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl CalendarEvent {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "event.id")?;
        validate_event_fields(
            &self.title,
            self.start_time,
            self.end_time,
            self.all_day,
            self.is_recurring,
            self.recurrence_pattern,
            self.recurrence_interval,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventDraft {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: i64,
    pub end_time: i64,
    pub all_day: bool,
    pub is_recurring: bool,
    pub recurrence_pattern: Option<RecurrencePattern>,
    pub recurrence_interval: Option<u32>,
    pub recurrence_end_date: Option<i64>,
}

impl EventDraft {
    pub fn validate(&self) -> Result<(), String> {
        validate_event_fields(
            &self.title,
            self.start_time,
            self.end_time,
            self.all_day,
            self.is_recurring,
            self.recurrence_pattern,
            self.recurrence_interval,
        )
    }

    /// Materializes the record written to the cache before the backend
    /// answers. The temporary id is replaced by the authoritative one on the
    /// refetch that follows a successful commit.
    pub fn speculative(&self, temp_id: String, now: i64) -> CalendarEvent {
        CalendarEvent {
            id: temp_id,
            title: self.title.trim().to_string(),
            description: normalized_optional(self.description.as_deref()),
            location: normalized_optional(self.location.as_deref()),
            start_time: self.start_time,
            end_time: self.end_time,
            all_day: self.all_day,
            completed: false,
            is_recurring: self.is_recurring,
            recurrence_pattern: self.recurrence_pattern,
            recurrence_interval: self.recurrence_interval,
            recurrence_end_date: self.recurrence_end_date,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub all_day: Option<bool>,
    pub completed: Option<bool>,
    pub is_recurring: Option<bool>,
    pub recurrence_pattern: Option<RecurrencePattern>,
    pub recurrence_interval: Option<u32>,
    pub recurrence_end_date: Option<i64>,
}

impl EventPatch {
    /// A field set to `Some` replaces the stored value; an empty string for
    /// an optional text field clears it.
    pub fn apply(&self, event: &mut CalendarEvent, now: i64) {
        if let Some(title) = self.title.as_deref() {
            let title = title.trim();
            if !title.is_empty() {
                event.title = title.to_string();
            }
        }
        if let Some(description) = self.description.as_deref() {
            event.description = normalized_optional(Some(description));
        }
        if let Some(location) = self.location.as_deref() {
            event.location = normalized_optional(Some(location));
        }
        if let Some(start_time) = self.start_time {
            event.start_time = start_time;
        }
        if let Some(end_time) = self.end_time {
            event.end_time = end_time;
        }
        if let Some(all_day) = self.all_day {
            event.all_day = all_day;
        }
        if let Some(completed) = self.completed {
            event.completed = completed;
        }
        if let Some(is_recurring) = self.is_recurring {
            event.is_recurring = is_recurring;
        }
        if let Some(pattern) = self.recurrence_pattern {
            event.recurrence_pattern = Some(pattern);
        }
        if let Some(interval) = self.recurrence_interval {
            event.recurrence_interval = Some(interval);
        }
        if let Some(end_date) = self.recurrence_end_date {
            event.recurrence_end_date = Some(end_date);
        }
        event.updated_at = now;
    }

    /// The candidate interval a patched event would occupy, for the conflict
    /// scan that runs before the mutation commits.
    pub fn candidate_interval(&self, current: &CalendarEvent) -> (i64, i64, bool) {
        (
            self.start_time.unwrap_or(current.start_time),
            self.end_time.unwrap_or(current.end_time),
            self.all_day.unwrap_or(current.all_day),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub due_date: Option<i64>,
    pub priority: Priority,
    pub is_recurring: bool,
    pub parent_task_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        validate_non_empty(&self.title, "task.title")?;
        if self.parent_task_id.as_deref() == Some(self.id.as_str()) {
            return Err("task.parent_task_id must not reference the task itself".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<i64>,
    pub priority: Priority,
    pub is_recurring: bool,
    pub parent_task_id: Option<String>,
}

impl TaskDraft {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.title, "task.title")
    }

    pub fn speculative(&self, temp_id: String, now: i64) -> Task {
        Task {
            id: temp_id,
            title: self.title.trim().to_string(),
            description: normalized_optional(self.description.as_deref()),
            completed: false,
            due_date: self.due_date,
            priority: self.priority,
            is_recurring: self.is_recurring,
            parent_task_id: normalized_optional(self.parent_task_id.as_deref()),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
    pub due_date: Option<i64>,
    pub priority: Option<Priority>,
    pub is_recurring: Option<bool>,
}

impl TaskPatch {
    pub fn apply(&self, task: &mut Task, now: i64) {
        if let Some(title) = self.title.as_deref() {
            let title = title.trim();
            if !title.is_empty() {
                task.title = title.to_string();
            }
        }
        if let Some(description) = self.description.as_deref() {
            task.description = normalized_optional(Some(description));
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = Some(due_date);
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(is_recurring) = self.is_recurring {
            task.is_recurring = is_recurring;
        }
        task.updated_at = now;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subtask {
    pub id: String,
    pub task_id: String,
    pub title: String,
    pub completed: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Subtask {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "subtask.id")?;
        validate_non_empty(&self.task_id, "subtask.task_id")?;
        validate_non_empty(&self.title, "subtask.title")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubtaskDraft {
    pub task_id: String,
    pub title: String,
}

impl SubtaskDraft {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.task_id, "subtask.task_id")?;
        validate_non_empty(&self.title, "subtask.title")
    }

    pub fn speculative(&self, temp_id: String, now: i64) -> Subtask {
        Subtask {
            id: temp_id,
            task_id: self.task_id.trim().to_string(),
            title: self.title.trim().to_string(),
            completed: false,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubtaskPatch {
    pub title: Option<String>,
    pub completed: Option<bool>,
}

impl SubtaskPatch {
    pub fn apply(&self, subtask: &mut Subtask, now: i64) {
        if let Some(title) = self.title.as_deref() {
            let title = title.trim();
            if !title.is_empty() {
                subtask.title = title.to_string();
            }
        }
        if let Some(completed) = self.completed {
            subtask.completed = completed;
        }
        subtask.updated_at = now;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
}

impl NoteDraft {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.title, "note.title")
    }

    pub fn speculative(&self, temp_id: String, now: i64) -> Note {
        Note {
            id: temp_id,
            title: self.title.trim().to_string(),
            content: self.content.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl NotePatch {
    pub fn apply(&self, note: &mut Note, now: i64) {
        if let Some(title) = self.title.as_deref() {
            let title = title.trim();
            if !title.is_empty() {
                note.title = title.to_string();
            }
        }
        if let Some(content) = self.content.as_deref() {
            note.content = content.to_string();
        }
        note.updated_at = now;
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Task,
    Meeting,
    Appointment,
    Reminder,
    System,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Meeting => "meeting",
            Self::Appointment => "appointment",
            Self::Reminder => "reminder",
            Self::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "task" => Some(Self::Task),
            "meeting" => Some(Self::Meeting),
            "appointment" => Some(Self::Appointment),
            "reminder" => Some(Self::Reminder),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// Client-local only; never synced to the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub read: bool,
    pub created_at: i64,
    pub link: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSettings {
    pub theme: String,
    pub timezone: String,
    pub time_format: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SettingsPatch {
    pub theme: Option<String>,
    pub timezone: Option<String>,
    pub time_format: Option<String>,
}

fn validate_event_fields(
    title: &str,
    start_time: i64,
    end_time: i64,
    all_day: bool,
    is_recurring: bool,
    recurrence_pattern: Option<RecurrencePattern>,
    recurrence_interval: Option<u32>,
) -> Result<(), String> {
    validate_non_empty(title, "event.title")?;
    if !all_day && end_time <= start_time {
        return Err("event.end_time must be after event.start_time".to_string());
    }
    if is_recurring {
        if recurrence_pattern.is_none() {
            return Err("event.recurrence_pattern is required for recurring events".to_string());
        }
        if recurrence_interval.map(|interval| interval == 0).unwrap_or(true) {
            return Err("event.recurrence_interval must be >= 1 for recurring events".to_string());
        }
    }
    Ok(())
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

fn normalized_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}
