use crate::domain::models::{CalendarEvent, CalendarKind, Notification, NotificationKind, Task};
use crate::infrastructure::config::ReminderThresholds;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::notification_store::NotificationRepository;
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_NOTIFICATION_ID: AtomicU64 = AtomicU64::new(1);

fn next_notification_id(now: i64) -> String {
    let sequence = NEXT_NOTIFICATION_ID.fetch_add(1, Ordering::Relaxed);
    format!("ntf-{now}-{sequence}")
}

/// Scans cached tasks and calendar events for deadlines inside a configured
/// lead window and turns each into a persisted notification. One dedupe key
/// per record-and-threshold pair keeps a rescan from refiring what an
/// earlier pass already produced, including across restarts.
pub struct ReminderService {
    notifications: Arc<dyn NotificationRepository>,
    thresholds: ReminderThresholds,
    now_provider: Arc<dyn Fn() -> i64 + Send + Sync>,
}

impl ReminderService {
    pub fn new(notifications: Arc<dyn NotificationRepository>, thresholds: ReminderThresholds) -> Self {
        Self {
            notifications,
            thresholds,
            now_provider: Arc::new(|| Utc::now().timestamp()),
        }
    }

    pub fn with_now_provider(mut self, now_provider: Arc<dyn Fn() -> i64 + Send + Sync>) -> Self {
        self.now_provider = now_provider;
        self
    }

    /// Runs one scan pass. Returns the notifications created by this pass,
    /// in the order they fired.
    pub fn scan(
        &self,
        tasks: &[Task],
        meetings: &[CalendarEvent],
        appointments: &[CalendarEvent],
    ) -> Result<Vec<Notification>, InfraError> {
        let now = (self.now_provider)();
        let mut fired = Vec::new();

        for task in tasks.iter().filter(|task| !task.completed) {
            let Some(due_date) = task.due_date else {
                continue;
            };
            for &lead in &self.thresholds.task_lead_minutes {
                if !within_window(now, due_date, lead) {
                    continue;
                }
                let dedupe_key = format!("task:{}:{lead}", task.id);
                if self.notifications.has_key(&dedupe_key)? {
                    continue;
                }
                let notification = Notification {
                    id: next_notification_id(now),
                    title: "Task due soon".to_string(),
                    message: format!("\"{}\" is due {}", task.title, describe_lead(lead)),
                    kind: NotificationKind::Task,
                    read: false,
                    created_at: now,
                    link: Some(format!("/tasks/{}", task.id)),
                };
                self.notifications.insert(&notification)?;
                self.notifications.record_key(&dedupe_key, now)?;
                fired.push(notification);
            }
        }

        self.scan_events(now, meetings, CalendarKind::Meeting, &mut fired)?;
        self.scan_events(now, appointments, CalendarKind::Appointment, &mut fired)?;
        Ok(fired)
    }

    fn scan_events(
        &self,
        now: i64,
        events: &[CalendarEvent],
        kind: CalendarKind,
        fired: &mut Vec<Notification>,
    ) -> Result<(), InfraError> {
        for event in events.iter().filter(|event| !event.completed) {
            for &lead in &self.thresholds.event_lead_minutes {
                if !within_window(now, event.start_time, lead) {
                    continue;
                }
                let dedupe_key = format!("{}:{}:{lead}", kind.as_str(), event.id);
                if self.notifications.has_key(&dedupe_key)? {
                    continue;
                }
                let notification_kind = match kind {
                    CalendarKind::Meeting => NotificationKind::Meeting,
                    CalendarKind::Appointment => NotificationKind::Appointment,
                };
                let notification = Notification {
                    id: next_notification_id(now),
                    title: match kind {
                        CalendarKind::Meeting => "Meeting starting soon".to_string(),
                        CalendarKind::Appointment => "Appointment starting soon".to_string(),
                    },
                    message: format!("\"{}\" starts {}", event.title, describe_lead(lead)),
                    kind: notification_kind,
                    read: false,
                    created_at: now,
                    link: Some(format!("/calendar/{}/{}", kind.as_str(), event.id)),
                };
                self.notifications.insert(&notification)?;
                self.notifications.record_key(&dedupe_key, now)?;
                fired.push(notification);
            }
        }
        Ok(())
    }
}

/// A reminder fires while `now` sits inside `[deadline - lead, deadline]`.
/// Past-deadline records never fire; a pass that runs after the moment has
/// gone produces nothing rather than a stale alert.
fn within_window(now: i64, deadline: i64, lead_minutes: i64) -> bool {
    now <= deadline && now >= deadline - lead_minutes * 60
}

fn describe_lead(lead_minutes: i64) -> String {
    if lead_minutes >= 60 && lead_minutes % 60 == 0 {
        let hours = lead_minutes / 60;
        if hours % 24 == 0 {
            let days = hours / 24;
            if days == 1 {
                return "within a day".to_string();
            }
            return format!("within {days} days");
        }
        if hours == 1 {
            return "within an hour".to_string();
        }
        return format!("within {hours} hours");
    }
    format!("within {lead_minutes} minutes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Priority;
    use crate::infrastructure::notification_store::InMemoryNotificationRepository;

    const NOW: i64 = 1_704_100_000;

    fn service(thresholds: ReminderThresholds) -> (ReminderService, Arc<InMemoryNotificationRepository>) {
        let repository = Arc::new(InMemoryNotificationRepository::default());
        let service = ReminderService::new(Arc::clone(&repository) as Arc<dyn NotificationRepository>, thresholds)
            .with_now_provider(Arc::new(|| NOW));
        (service, repository)
    }

    fn task_due(id: &str, due_date: Option<i64>, completed: bool) -> Task {
        Task {
            id: id.to_string(),
            title: format!("task {id}"),
            description: None,
            completed,
            due_date,
            priority: Priority::Medium,
            is_recurring: false,
            parent_task_id: None,
            created_at: NOW - 3_600,
            updated_at: NOW - 3_600,
        }
    }

    fn event_at(id: &str, start_time: i64) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            title: format!("event {id}"),
            description: None,
            location: None,
            start_time,
            end_time: start_time + 1_800,
            all_day: false,
            completed: false,
            is_recurring: false,
            recurrence_pattern: None,
            recurrence_interval: None,
            recurrence_end_date: None,
            created_at: NOW - 3_600,
            updated_at: NOW - 3_600,
        }
    }

    #[test]
    fn task_inside_lead_window_fires_once_per_threshold() {
        let (service, _repository) = service(ReminderThresholds {
            task_lead_minutes: vec![24 * 60, 60],
            event_lead_minutes: vec![],
        });
        // Due in 30 minutes: inside both the one-day and one-hour windows.
        let tasks = vec![task_due("tsk-1", Some(NOW + 30 * 60), false)];

        let fired = service.scan(&tasks, &[], &[]).expect("scan");
        assert_eq!(fired.len(), 2);
        assert!(fired.iter().all(|n| n.kind == NotificationKind::Task));
        assert_eq!(fired[0].link.as_deref(), Some("/tasks/tsk-1"));
    }

    #[test]
    fn rescan_does_not_refire() {
        let (service, repository) = service(ReminderThresholds {
            task_lead_minutes: vec![60],
            event_lead_minutes: vec![],
        });
        let tasks = vec![task_due("tsk-1", Some(NOW + 60), false)];

        let first = service.scan(&tasks, &[], &[]).expect("scan");
        assert_eq!(first.len(), 1);
        let second = service.scan(&tasks, &[], &[]).expect("rescan");
        assert!(second.is_empty());
        assert_eq!(repository.list().expect("list").len(), 1);
    }

    #[test]
    fn completed_and_overdue_records_do_not_fire() {
        let (service, _repository) = service(ReminderThresholds {
            task_lead_minutes: vec![60],
            event_lead_minutes: vec![30],
        });
        let tasks = vec![
            task_due("tsk-done", Some(NOW + 60), true),
            task_due("tsk-late", Some(NOW - 1), false),
            task_due("tsk-undated", None, false),
        ];
        let mut past_meeting = event_at("mtg-past", NOW - 600);
        past_meeting.completed = false;

        let fired = service.scan(&tasks, &[past_meeting], &[]).expect("scan");
        assert!(fired.is_empty());
    }

    #[test]
    fn far_future_deadline_stays_quiet() {
        let (service, _repository) = service(ReminderThresholds {
            task_lead_minutes: vec![60],
            event_lead_minutes: vec![],
        });
        let tasks = vec![task_due("tsk-1", Some(NOW + 2 * 60 * 60), false)];
        assert!(service.scan(&tasks, &[], &[]).expect("scan").is_empty());
    }

    #[test]
    fn meetings_and_appointments_fire_with_their_own_kind() {
        let (service, _repository) = service(ReminderThresholds {
            task_lead_minutes: vec![],
            event_lead_minutes: vec![30],
        });
        let meetings = vec![event_at("mtg-1", NOW + 15 * 60)];
        let appointments = vec![event_at("apt-1", NOW + 15 * 60)];

        let fired = service.scan(&[], &meetings, &appointments).expect("scan");
        assert_eq!(fired.len(), 2);
        assert_eq!(fired[0].kind, NotificationKind::Meeting);
        assert_eq!(fired[1].kind, NotificationKind::Appointment);
        assert_eq!(fired[0].link.as_deref(), Some("/calendar/meeting/mtg-1"));
        assert_eq!(fired[1].link.as_deref(), Some("/calendar/appointment/apt-1"));
    }

    #[test]
    fn same_id_in_different_collections_dedupes_independently() {
        let (service, _repository) = service(ReminderThresholds {
            task_lead_minutes: vec![],
            event_lead_minutes: vec![30],
        });
        let meetings = vec![event_at("shared", NOW + 60)];
        let appointments = vec![event_at("shared", NOW + 60)];

        let fired = service.scan(&[], &meetings, &appointments).expect("scan");
        assert_eq!(fired.len(), 2);
    }

    #[test]
    fn lead_description_reads_naturally() {
        assert_eq!(describe_lead(10), "within 10 minutes");
        assert_eq!(describe_lead(60), "within an hour");
        assert_eq!(describe_lead(120), "within 2 hours");
        assert_eq!(describe_lead(24 * 60), "within a day");
        assert_eq!(describe_lead(48 * 60), "within 2 days");
    }
}
