use crate::domain::conflict::Conflict;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// Decision seam consulted when a mutation hits a calendar conflict. The
/// mutation pipeline suspends on `confirm` and only speculates after an
/// accepting answer; presentation of the question is the caller's business.
#[async_trait]
pub trait ConflictGate: Send + Sync {
    async fn confirm(&self, conflict: &Conflict) -> Result<bool, InfraError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct ConflictPrompt {
    pub prompt_id: String,
    pub conflict: Conflict,
}

/// Invoked when a prompt opens; the Tauri layer forwards it to the webview,
/// tests collect it.
pub type PromptNotifier = Arc<dyn Fn(&ConflictPrompt) + Send + Sync>;

/// Bridges the async mutation pipeline and UI event handlers: `confirm`
/// parks the mutation on a oneshot channel, `resolve` is called from the
/// accept/cancel handler and wakes it up.
pub struct ConfirmationBroker {
    pending: Mutex<HashMap<String, oneshot::Sender<bool>>>,
    next_prompt: AtomicU64,
    notifier: PromptNotifier,
}

impl ConfirmationBroker {
    pub fn new(notifier: PromptNotifier) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            next_prompt: AtomicU64::new(1),
            notifier,
        }
    }

    /// Answers an open prompt. Returns false when the prompt id is unknown,
    /// e.g. already resolved.
    pub fn resolve(&self, prompt_id: &str, accept: bool) -> Result<bool, InfraError> {
        let sender = {
            let mut pending = self.lock_pending()?;
            pending.remove(prompt_id.trim())
        };
        match sender {
            Some(sender) => Ok(sender.send(accept).is_ok()),
            None => Ok(false),
        }
    }

    pub fn pending_count(&self) -> Result<usize, InfraError> {
        Ok(self.lock_pending()?.len())
    }

    fn lock_pending(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, oneshot::Sender<bool>>>, InfraError> {
        self.pending
            .lock()
            .map_err(|error| InfraError::State(format!("confirmation lock poisoned: {error}")))
    }
}

#[async_trait]
impl ConflictGate for ConfirmationBroker {
    async fn confirm(&self, conflict: &Conflict) -> Result<bool, InfraError> {
        let sequence = self.next_prompt.fetch_add(1, Ordering::Relaxed);
        let prompt_id = format!("prompt-{sequence}");
        let (sender, receiver) = oneshot::channel();
        {
            let mut pending = self.lock_pending()?;
            pending.insert(prompt_id.clone(), sender);
        }

        (self.notifier)(&ConflictPrompt {
            prompt_id: prompt_id.clone(),
            conflict: conflict.clone(),
        });

        receiver.await.map_err(|_| {
            InfraError::State(format!("confirmation prompt {prompt_id} was dropped unanswered"))
        })
    }
}
