use crate::application::confirmation::ConflictGate;
use crate::domain::conflict::{CandidateSlot, detect_conflict};
use crate::domain::models::{
    CalendarEvent, CalendarKind, EventDraft, EventPatch, Note, NoteDraft, NotePatch, Subtask,
    SubtaskDraft, SubtaskPatch, Task, TaskDraft, TaskPatch,
};
use crate::infrastructure::backend_client::BackendApi;
use crate::infrastructure::collection_cache::{CacheStore, CollectionCache};
use crate::infrastructure::error::InfraError;
use chrono::Utc;
use chrono_tz::Tz;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub type EpochProvider = Arc<dyn Fn() -> i64 + Send + Sync>;

static NEXT_TEMP_ID: AtomicU64 = AtomicU64::new(1);

/// Timestamp-derived placeholder id for a record written to the cache before
/// the backend has assigned the real one. Collisions are not defended
/// against; submission rates are human.
fn temp_id(prefix: &str) -> String {
    let sequence = NEXT_TEMP_ID.fetch_add(1, Ordering::Relaxed);
    format!("tmp-{prefix}-{}-{sequence}", Utc::now().timestamp_millis())
}

/// Wraps every create/update/delete against the remote collections with the
/// optimistic protocol: cancel outgoing refetches, snapshot the cache, write
/// the speculative post-mutation collection, then commit. Success marks the
/// cache stale so the next read-through pulls authoritative state; failure
/// restores the exact snapshot. Each invocation is independent; there is no
/// retry and no cross-invocation queue.
pub struct OptimisticMutator {
    caches: Arc<CacheStore>,
    backend: Arc<dyn BackendApi>,
    tz: Tz,
    now_provider: EpochProvider,
}

impl OptimisticMutator {
    pub fn new(caches: Arc<CacheStore>, backend: Arc<dyn BackendApi>, tz: Tz) -> Self {
        Self {
            caches,
            backend,
            tz,
            now_provider: Arc::new(|| Utc::now().timestamp()),
        }
    }

    pub fn with_now_provider(mut self, now_provider: EpochProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    fn now(&self) -> i64 {
        (self.now_provider)()
    }

    pub async fn create_task(
        &self,
        access_token: &str,
        draft: TaskDraft,
    ) -> Result<Task, InfraError> {
        draft.validate().map_err(InfraError::InvalidInput)?;
        let cache = &self.caches.tasks;
        cache.cancel_outgoing()?;
        let snapshot = cache.snapshot()?;

        let mut rows = snapshot.rows().map(|rows| rows.to_vec()).unwrap_or_default();
        rows.push(draft.speculative(temp_id("tsk"), self.now()));
        cache.write(rows)?;

        match self.backend.create_task(access_token, &draft).await {
            Ok(created) => {
                cache.invalidate()?;
                Ok(created)
            }
            Err(error) => {
                cache.restore(snapshot)?;
                Err(error)
            }
        }
    }

    pub async fn update_task(
        &self,
        access_token: &str,
        task_id: &str,
        patch: TaskPatch,
    ) -> Result<Task, InfraError> {
        let task_id = non_empty_id(task_id, "task_id")?;
        let cache = &self.caches.tasks;
        cache.cancel_outgoing()?;
        let snapshot = cache.snapshot()?;

        if let Some(rows) = snapshot.rows() {
            let now = self.now();
            let mut rows = rows.to_vec();
            for task in rows.iter_mut().filter(|task| task.id == task_id) {
                patch.apply(task, now);
            }
            cache.write(rows)?;
        }

        match self.backend.update_task(access_token, &task_id, &patch).await {
            Ok(updated) => {
                cache.invalidate()?;
                Ok(updated)
            }
            Err(error) => {
                cache.restore(snapshot)?;
                Err(error)
            }
        }
    }

    /// Deletes a task and, in the same speculative step, its subtasks. The
    /// backend performs the authoritative cascade; the remote calls here run
    /// the subtask deletes first so the parent never dangles children.
    pub async fn delete_task(&self, access_token: &str, task_id: &str) -> Result<(), InfraError> {
        let task_id = non_empty_id(task_id, "task_id")?;
        let tasks = &self.caches.tasks;
        let subtasks = &self.caches.subtasks;
        tasks.cancel_outgoing()?;
        subtasks.cancel_outgoing()?;
        let tasks_snapshot = tasks.snapshot()?;
        let subtasks_snapshot = subtasks.snapshot()?;

        if let Some(rows) = tasks_snapshot.rows() {
            let mut rows = rows.to_vec();
            rows.retain(|task| task.id != task_id);
            tasks.write(rows)?;
        }
        if let Some(rows) = subtasks_snapshot.rows() {
            let mut rows = rows.to_vec();
            rows.retain(|subtask| subtask.task_id != task_id);
            subtasks.write(rows)?;
        }

        let dependent_ids = subtasks_snapshot
            .rows()
            .unwrap_or_default()
            .iter()
            .filter(|subtask| subtask.task_id == task_id)
            .map(|subtask| subtask.id.clone())
            .collect::<Vec<_>>();

        match self
            .delete_task_remote(access_token, &task_id, &dependent_ids)
            .await
        {
            Ok(()) => {
                tasks.invalidate()?;
                subtasks.invalidate()?;
                Ok(())
            }
            Err(error) => {
                tasks.restore(tasks_snapshot)?;
                subtasks.restore(subtasks_snapshot)?;
                Err(error)
            }
        }
    }

    async fn delete_task_remote(
        &self,
        access_token: &str,
        task_id: &str,
        dependent_ids: &[String],
    ) -> Result<(), InfraError> {
        for subtask_id in dependent_ids {
            self.backend.delete_subtask(access_token, subtask_id).await?;
        }
        self.backend.delete_task(access_token, task_id).await
    }

    pub async fn create_subtask(
        &self,
        access_token: &str,
        draft: SubtaskDraft,
    ) -> Result<Subtask, InfraError> {
        draft.validate().map_err(InfraError::InvalidInput)?;
        let cache = &self.caches.subtasks;
        cache.cancel_outgoing()?;
        let snapshot = cache.snapshot()?;

        let mut rows = snapshot.rows().map(|rows| rows.to_vec()).unwrap_or_default();
        rows.push(draft.speculative(temp_id("sub"), self.now()));
        cache.write(rows)?;

        match self.backend.create_subtask(access_token, &draft).await {
            Ok(created) => {
                cache.invalidate()?;
                Ok(created)
            }
            Err(error) => {
                cache.restore(snapshot)?;
                Err(error)
            }
        }
    }

    pub async fn update_subtask(
        &self,
        access_token: &str,
        subtask_id: &str,
        patch: SubtaskPatch,
    ) -> Result<Subtask, InfraError> {
        let subtask_id = non_empty_id(subtask_id, "subtask_id")?;
        let cache = &self.caches.subtasks;
        cache.cancel_outgoing()?;
        let snapshot = cache.snapshot()?;

        if let Some(rows) = snapshot.rows() {
            let now = self.now();
            let mut rows = rows.to_vec();
            for subtask in rows.iter_mut().filter(|subtask| subtask.id == subtask_id) {
                patch.apply(subtask, now);
            }
            cache.write(rows)?;
        }

        match self
            .backend
            .update_subtask(access_token, &subtask_id, &patch)
            .await
        {
            Ok(updated) => {
                cache.invalidate()?;
                Ok(updated)
            }
            Err(error) => {
                cache.restore(snapshot)?;
                Err(error)
            }
        }
    }

    pub async fn delete_subtask(
        &self,
        access_token: &str,
        subtask_id: &str,
    ) -> Result<(), InfraError> {
        let subtask_id = non_empty_id(subtask_id, "subtask_id")?;
        let cache = &self.caches.subtasks;
        cache.cancel_outgoing()?;
        let snapshot = cache.snapshot()?;

        if let Some(rows) = snapshot.rows() {
            let mut rows = rows.to_vec();
            rows.retain(|subtask| subtask.id != subtask_id);
            cache.write(rows)?;
        }

        match self.backend.delete_subtask(access_token, &subtask_id).await {
            Ok(()) => {
                cache.invalidate()?;
                Ok(())
            }
            Err(error) => {
                cache.restore(snapshot)?;
                Err(error)
            }
        }
    }

    pub async fn create_meeting(
        &self,
        access_token: &str,
        draft: EventDraft,
        gate: &dyn ConflictGate,
    ) -> Result<CalendarEvent, InfraError> {
        self.create_event(access_token, CalendarKind::Meeting, draft, gate)
            .await
    }

    pub async fn create_appointment(
        &self,
        access_token: &str,
        draft: EventDraft,
        gate: &dyn ConflictGate,
    ) -> Result<CalendarEvent, InfraError> {
        self.create_event(access_token, CalendarKind::Appointment, draft, gate)
            .await
    }

    pub async fn update_meeting(
        &self,
        access_token: &str,
        meeting_id: &str,
        patch: EventPatch,
        gate: &dyn ConflictGate,
    ) -> Result<CalendarEvent, InfraError> {
        self.update_event(access_token, CalendarKind::Meeting, meeting_id, patch, gate)
            .await
    }

    pub async fn update_appointment(
        &self,
        access_token: &str,
        appointment_id: &str,
        patch: EventPatch,
        gate: &dyn ConflictGate,
    ) -> Result<CalendarEvent, InfraError> {
        self.update_event(
            access_token,
            CalendarKind::Appointment,
            appointment_id,
            patch,
            gate,
        )
        .await
    }

    pub async fn delete_meeting(
        &self,
        access_token: &str,
        meeting_id: &str,
    ) -> Result<(), InfraError> {
        self.delete_event(access_token, CalendarKind::Meeting, meeting_id)
            .await
    }

    pub async fn delete_appointment(
        &self,
        access_token: &str,
        appointment_id: &str,
    ) -> Result<(), InfraError> {
        self.delete_event(access_token, CalendarKind::Appointment, appointment_id)
            .await
    }

    async fn create_event(
        &self,
        access_token: &str,
        kind: CalendarKind,
        draft: EventDraft,
        gate: &dyn ConflictGate,
    ) -> Result<CalendarEvent, InfraError> {
        draft.validate().map_err(InfraError::InvalidInput)?;
        let candidate = CandidateSlot {
            start_time: draft.start_time,
            end_time: draft.end_time,
            all_day: draft.all_day,
            exclude_id: None,
        };
        // Confirmation happens before any speculative write; a declined
        // prompt leaves the cache untouched.
        self.confirm_if_conflicting(&candidate, gate).await?;

        let cache = self.event_cache(kind);
        cache.cancel_outgoing()?;
        let snapshot = cache.snapshot()?;

        let mut rows = snapshot.rows().map(|rows| rows.to_vec()).unwrap_or_default();
        rows.push(draft.speculative(temp_id(kind.as_str()), self.now()));
        cache.write(rows)?;

        let result = match kind {
            CalendarKind::Meeting => self.backend.create_meeting(access_token, &draft).await,
            CalendarKind::Appointment => self.backend.create_appointment(access_token, &draft).await,
        };
        match result {
            Ok(created) => {
                cache.invalidate()?;
                Ok(created)
            }
            Err(error) => {
                cache.restore(snapshot)?;
                Err(error)
            }
        }
    }

    async fn update_event(
        &self,
        access_token: &str,
        kind: CalendarKind,
        event_id: &str,
        patch: EventPatch,
        gate: &dyn ConflictGate,
    ) -> Result<CalendarEvent, InfraError> {
        let event_id = non_empty_id(event_id, "event_id")?;
        let cache = self.event_cache(kind);

        let current = cache
            .read()?
            .unwrap_or_default()
            .into_iter()
            .find(|event| event.id == event_id);
        if let Some(candidate) = update_candidate(&event_id, current.as_ref(), &patch) {
            if !candidate.all_day && candidate.end_time <= candidate.start_time {
                return Err(InfraError::InvalidInput(
                    "event.end_time must be after event.start_time".to_string(),
                ));
            }
            self.confirm_if_conflicting(&candidate, gate).await?;
        }

        cache.cancel_outgoing()?;
        let snapshot = cache.snapshot()?;
        if let Some(rows) = snapshot.rows() {
            let now = self.now();
            let mut rows = rows.to_vec();
            for event in rows.iter_mut().filter(|event| event.id == event_id) {
                patch.apply(event, now);
            }
            cache.write(rows)?;
        }

        let result = match kind {
            CalendarKind::Meeting => {
                self.backend
                    .update_meeting(access_token, &event_id, &patch)
                    .await
            }
            CalendarKind::Appointment => {
                self.backend
                    .update_appointment(access_token, &event_id, &patch)
                    .await
            }
        };
        match result {
            Ok(updated) => {
                cache.invalidate()?;
                Ok(updated)
            }
            Err(error) => {
                cache.restore(snapshot)?;
                Err(error)
            }
        }
    }

    async fn delete_event(
        &self,
        access_token: &str,
        kind: CalendarKind,
        event_id: &str,
    ) -> Result<(), InfraError> {
        let event_id = non_empty_id(event_id, "event_id")?;
        let cache = self.event_cache(kind);
        cache.cancel_outgoing()?;
        let snapshot = cache.snapshot()?;

        if let Some(rows) = snapshot.rows() {
            let mut rows = rows.to_vec();
            rows.retain(|event| event.id != event_id);
            cache.write(rows)?;
        }

        let result = match kind {
            CalendarKind::Meeting => self.backend.delete_meeting(access_token, &event_id).await,
            CalendarKind::Appointment => {
                self.backend
                    .delete_appointment(access_token, &event_id)
                    .await
            }
        };
        match result {
            Ok(()) => {
                cache.invalidate()?;
                Ok(())
            }
            Err(error) => {
                cache.restore(snapshot)?;
                Err(error)
            }
        }
    }

    pub async fn create_note(
        &self,
        access_token: &str,
        draft: NoteDraft,
    ) -> Result<Note, InfraError> {
        draft.validate().map_err(InfraError::InvalidInput)?;
        let cache = &self.caches.notes;
        cache.cancel_outgoing()?;
        let snapshot = cache.snapshot()?;

        let mut rows = snapshot.rows().map(|rows| rows.to_vec()).unwrap_or_default();
        rows.push(draft.speculative(temp_id("nte"), self.now()));
        cache.write(rows)?;

        match self.backend.create_note(access_token, &draft).await {
            Ok(created) => {
                cache.invalidate()?;
                Ok(created)
            }
            Err(error) => {
                cache.restore(snapshot)?;
                Err(error)
            }
        }
    }

    pub async fn update_note(
        &self,
        access_token: &str,
        note_id: &str,
        patch: NotePatch,
    ) -> Result<Note, InfraError> {
        let note_id = non_empty_id(note_id, "note_id")?;
        let cache = &self.caches.notes;
        cache.cancel_outgoing()?;
        let snapshot = cache.snapshot()?;

        if let Some(rows) = snapshot.rows() {
            let now = self.now();
            let mut rows = rows.to_vec();
            for note in rows.iter_mut().filter(|note| note.id == note_id) {
                patch.apply(note, now);
            }
            cache.write(rows)?;
        }

        match self.backend.update_note(access_token, &note_id, &patch).await {
            Ok(updated) => {
                cache.invalidate()?;
                Ok(updated)
            }
            Err(error) => {
                cache.restore(snapshot)?;
                Err(error)
            }
        }
    }

    pub async fn delete_note(&self, access_token: &str, note_id: &str) -> Result<(), InfraError> {
        let note_id = non_empty_id(note_id, "note_id")?;
        let cache = &self.caches.notes;
        cache.cancel_outgoing()?;
        let snapshot = cache.snapshot()?;

        if let Some(rows) = snapshot.rows() {
            let mut rows = rows.to_vec();
            rows.retain(|note| note.id != note_id);
            cache.write(rows)?;
        }

        match self.backend.delete_note(access_token, &note_id).await {
            Ok(()) => {
                cache.invalidate()?;
                Ok(())
            }
            Err(error) => {
                cache.restore(snapshot)?;
                Err(error)
            }
        }
    }

    pub fn detect_conflict_now(
        &self,
        candidate: &CandidateSlot,
    ) -> Result<Option<crate::domain::conflict::Conflict>, InfraError> {
        let meetings = self.caches.meetings.read()?.unwrap_or_default();
        let appointments = self.caches.appointments.read()?.unwrap_or_default();
        Ok(detect_conflict(candidate, &meetings, &appointments, self.tz))
    }

    async fn confirm_if_conflicting(
        &self,
        candidate: &CandidateSlot,
        gate: &dyn ConflictGate,
    ) -> Result<(), InfraError> {
        if let Some(conflict) = self.detect_conflict_now(candidate)? {
            let accepted = gate.confirm(&conflict).await?;
            if !accepted {
                return Err(InfraError::ConflictDeclined(format!(
                    "candidate interval overlaps {} \"{}\"",
                    conflict.kind.as_str(),
                    conflict.overlapping.title
                )));
            }
        }
        Ok(())
    }

    fn event_cache(&self, kind: CalendarKind) -> &CollectionCache<CalendarEvent> {
        match kind {
            CalendarKind::Meeting => &self.caches.meetings,
            CalendarKind::Appointment => &self.caches.appointments,
        }
    }
}

fn non_empty_id(value: &str, field_name: &str) -> Result<String, InfraError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(InfraError::InvalidInput(format!(
            "{field_name} must not be empty"
        )));
    }
    Ok(value.to_string())
}

/// Candidate interval an edit would occupy. Without a cached current value
/// the interval is only known when the patch carries both bounds; otherwise
/// the conflict scan is skipped and the backend stays authoritative.
fn update_candidate(
    event_id: &str,
    current: Option<&CalendarEvent>,
    patch: &EventPatch,
) -> Option<CandidateSlot> {
    let (start_time, end_time, all_day) = match current {
        Some(current) => patch.candidate_interval(current),
        None => (
            patch.start_time?,
            patch.end_time?,
            patch.all_day.unwrap_or(false),
        ),
    };
    Some(CandidateSlot {
        start_time,
        end_time,
        all_day,
        exclude_id: Some(event_id.to_string()),
    })
}
