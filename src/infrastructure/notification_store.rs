use crate::domain::models::{Notification, NotificationKind};
use crate::infrastructure::error::InfraError;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

/// Creates the SQLite file and applies the schema. Every statement in the
/// schema is `IF NOT EXISTS`, so this is safe to run on every startup.
pub fn initialize_database(path: &Path) -> Result<(), InfraError> {
    let connection = Connection::open(path)?;
    connection.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Local persistence for the notification subsystem: the notifications
/// themselves plus the per-item-per-threshold dedup keys. Never synced to
/// the backend.
pub trait NotificationRepository: Send + Sync {
    fn list(&self) -> Result<Vec<Notification>, InfraError>;
    fn insert(&self, notification: &Notification) -> Result<(), InfraError>;
    fn mark_read(&self, notification_id: &str) -> Result<bool, InfraError>;
    fn clear(&self) -> Result<(), InfraError>;
    fn has_key(&self, dedupe_key: &str) -> Result<bool, InfraError>;
    fn record_key(&self, dedupe_key: &str, created_at: i64) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteNotificationRepository {
    db_path: PathBuf,
}

impl SqliteNotificationRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }
}

impl NotificationRepository for SqliteNotificationRepository {
    fn list(&self) -> Result<Vec<Notification>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, title, message, kind, read, created_at, link
             FROM notifications
             ORDER BY created_at DESC, id",
        )?;
        let rows = statement.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, bool>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })?;

        let mut notifications = Vec::new();
        for row in rows {
            let (id, title, message, kind_raw, read, created_at, link) = row?;
            let kind = NotificationKind::parse(&kind_raw).ok_or_else(|| {
                InfraError::State(format!("invalid notification kind '{kind_raw}' for {id}"))
            })?;
            notifications.push(Notification {
                id,
                title,
                message,
                kind,
                read,
                created_at,
                link,
            });
        }
        Ok(notifications)
    }

    fn insert(&self, notification: &Notification) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO notifications (id, title, message, kind, read, created_at, link)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO NOTHING",
            params![
                notification.id,
                notification.title,
                notification.message,
                notification.kind.as_str(),
                notification.read,
                notification.created_at,
                notification.link,
            ],
        )?;
        Ok(())
    }

    fn mark_read(&self, notification_id: &str) -> Result<bool, InfraError> {
        let connection = self.connect()?;
        let changed = connection.execute(
            "UPDATE notifications SET read = 1 WHERE id = ?1",
            params![notification_id],
        )?;
        Ok(changed > 0)
    }

    fn clear(&self) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute("DELETE FROM notifications", [])?;
        Ok(())
    }

    fn has_key(&self, dedupe_key: &str) -> Result<bool, InfraError> {
        let connection = self.connect()?;
        let found: Option<String> = connection
            .query_row(
                "SELECT dedupe_key FROM reminder_keys WHERE dedupe_key = ?1",
                params![dedupe_key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn record_key(&self, dedupe_key: &str, created_at: i64) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO reminder_keys (dedupe_key, created_at)
             VALUES (?1, ?2)
             ON CONFLICT(dedupe_key) DO NOTHING",
            params![dedupe_key, created_at],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryNotificationRepository {
    notifications: Mutex<Vec<Notification>>,
    keys: Mutex<HashSet<String>>,
}

impl InMemoryNotificationRepository {
    fn lock_notifications(&self) -> Result<std::sync::MutexGuard<'_, Vec<Notification>>, InfraError> {
        self.notifications
            .lock()
            .map_err(|error| InfraError::State(format!("notification lock poisoned: {error}")))
    }

    fn lock_keys(&self) -> Result<std::sync::MutexGuard<'_, HashSet<String>>, InfraError> {
        self.keys
            .lock()
            .map_err(|error| InfraError::State(format!("reminder key lock poisoned: {error}")))
    }
}

impl NotificationRepository for InMemoryNotificationRepository {
    fn list(&self) -> Result<Vec<Notification>, InfraError> {
        let mut notifications = self.lock_notifications()?.clone();
        notifications.sort_by(|left, right| {
            right
                .created_at
                .cmp(&left.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        Ok(notifications)
    }

    fn insert(&self, notification: &Notification) -> Result<(), InfraError> {
        let mut notifications = self.lock_notifications()?;
        if notifications.iter().all(|existing| existing.id != notification.id) {
            notifications.push(notification.clone());
        }
        Ok(())
    }

    fn mark_read(&self, notification_id: &str) -> Result<bool, InfraError> {
        let mut notifications = self.lock_notifications()?;
        match notifications
            .iter_mut()
            .find(|notification| notification.id == notification_id)
        {
            Some(notification) => {
                notification.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn clear(&self) -> Result<(), InfraError> {
        self.lock_notifications()?.clear();
        Ok(())
    }

    fn has_key(&self, dedupe_key: &str) -> Result<bool, InfraError> {
        Ok(self.lock_keys()?.contains(dedupe_key))
    }

    fn record_key(&self, dedupe_key: &str, _created_at: i64) -> Result<(), InfraError> {
        self.lock_keys()?.insert(dedupe_key.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DB: AtomicUsize = AtomicUsize::new(0);

    struct TempDb {
        path: PathBuf,
    }

    impl TempDb {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DB.fetch_add(1, Ordering::Relaxed);
            let dir = std::env::temp_dir().join(format!(
                "planwise-notification-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            std::fs::create_dir_all(&dir).expect("create temp dir");
            let path = dir.join("planwise.sqlite");
            initialize_database(&path).expect("init db");
            Self { path }
        }
    }

    impl Drop for TempDb {
        fn drop(&mut self) {
            if let Some(parent) = self.path.parent() {
                let _ = std::fs::remove_dir_all(parent);
            }
        }
    }

    fn sample_notification(id: &str, created_at: i64) -> Notification {
        Notification {
            id: id.to_string(),
            title: "Upcoming meeting".to_string(),
            message: "Sprint review starts in 30 min".to_string(),
            kind: NotificationKind::Meeting,
            read: false,
            created_at,
            link: Some("/meetings/mtg-1".to_string()),
        }
    }

    #[test]
    fn sqlite_insert_list_mark_read_clear() {
        let db = TempDb::new();
        let repository = SqliteNotificationRepository::new(&db.path);

        repository.insert(&sample_notification("ntf-1", 100)).expect("insert");
        repository.insert(&sample_notification("ntf-2", 200)).expect("insert");
        // Duplicate id is a no-op.
        repository.insert(&sample_notification("ntf-1", 300)).expect("insert dup");

        let listed = repository.list().expect("list");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "ntf-2");
        assert_eq!(listed[0].created_at, 200);

        assert!(repository.mark_read("ntf-1").expect("mark read"));
        assert!(!repository.mark_read("missing").expect("mark read missing"));
        let listed = repository.list().expect("list");
        assert!(listed.iter().any(|notification| notification.id == "ntf-1" && notification.read));

        repository.clear().expect("clear");
        assert!(repository.list().expect("list").is_empty());
    }

    #[test]
    fn sqlite_dedup_keys_survive_reconnect() {
        let db = TempDb::new();
        {
            let repository = SqliteNotificationRepository::new(&db.path);
            assert!(!repository.has_key("task:tsk-1:60").expect("has key"));
            repository.record_key("task:tsk-1:60", 100).expect("record");
            repository.record_key("task:tsk-1:60", 200).expect("record dup");
        }
        let reopened = SqliteNotificationRepository::new(&db.path);
        assert!(reopened.has_key("task:tsk-1:60").expect("has key"));
    }

    #[test]
    fn in_memory_repository_matches_sqlite_contract() {
        let repository = InMemoryNotificationRepository::default();
        repository.insert(&sample_notification("ntf-1", 100)).expect("insert");
        repository.insert(&sample_notification("ntf-2", 200)).expect("insert");
        let listed = repository.list().expect("list");
        assert_eq!(listed[0].id, "ntf-2");

        assert!(repository.mark_read("ntf-1").expect("mark read"));
        repository.record_key("meeting:mtg-1:30", 100).expect("record");
        assert!(repository.has_key("meeting:mtg-1:30").expect("has key"));
        repository.clear().expect("clear");
        assert!(repository.list().expect("list").is_empty());
        // Dedup keys are independent of the notification list.
        assert!(repository.has_key("meeting:mtg-1:30").expect("has key"));
    }
}
