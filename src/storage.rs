//! Per-user conversation state with ordered, serialized persistence.
//!
//! The store never assumes a storage engine: persistence goes through the
//! [`StateRepository`] trait. What the store itself guarantees is ordering:
//! every durable write issued against one [`UserStateStore`] waits for the
//! completion (not the success) of every previously issued write before it
//! starts. A failed write surfaces to its caller and the chain moves on, so
//! one failure can never wedge subsequent writes.

use crate::error::HubError;
use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{oneshot, RwLock};

/// Enumerated conversation state driving which handler applies to the
/// user's next message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StateTag {
    /// Fresh user, nothing pending.
    #[default]
    First,
    /// A torrent is in flight; status updates apply.
    Waiting,
    /// The bot asked for a torrent file or link.
    AwaitingAttachment,
}

/// State-specific payload attached to a [`UserState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatePayload {
    /// The message the next confirmation should edit in place.
    EditTarget {
        /// Chat holding the message.
        chat_id: i64,
        /// Message to edit.
        message_id: i32,
    },
}

/// One user's persisted conversation record.
///
/// Mutated only through [`UserStateStore::set`]; handlers never patch it in
/// place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UserState {
    /// Conversation state tag.
    pub tag: StateTag,
    /// Optional state-specific payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<StatePayload>,
}

impl UserState {
    /// Shorthand for a payload-free state.
    #[must_use]
    pub const fn new(tag: StateTag) -> Self {
        Self { tag, payload: None }
    }
}

/// Persistence boundary for user state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StateRepository: Send + Sync {
    /// Load the persisted record for `user_id`, if any.
    async fn load(&self, user_id: i64) -> Result<Option<UserState>, HubError>;
    /// Replace the full record for `user_id`.
    async fn store(&self, user_id: i64, state: &UserState) -> Result<(), HubError>;
}

/// Serialized writer: a single-slot queue of durable writes.
///
/// Each operation swaps itself in as the new tail, awaits the previous
/// tail's completion gate, runs, and releases its own gate on every exit
/// path (including being dropped mid-flight).
struct WriteChain {
    tail: StdMutex<Shared<BoxFuture<'static, ()>>>,
}

struct GateGuard(Option<oneshot::Sender<()>>);

impl Drop for GateGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

impl WriteChain {
    fn new() -> Self {
        Self {
            tail: StdMutex::new(futures_util::future::ready(()).boxed().shared()),
        }
    }

    async fn run<T, F, Fut>(&self, op: F) -> Result<T, HubError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, HubError>>,
    {
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let gate: Shared<BoxFuture<'static, ()>> = async move {
            // Resolves on release OR on sender drop, so an abandoned write
            // never blocks the chain.
            let _ = done_rx.await;
        }
        .boxed()
        .shared();

        let prev = {
            let mut tail = self.tail.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            std::mem::replace(&mut *tail, gate)
        };
        prev.await;

        let _release = GateGuard(Some(done_tx));
        op().await
    }
}

/// Per-user state store with totally ordered persistence.
pub struct UserStateStore {
    repo: Arc<dyn StateRepository>,
    chain: WriteChain,
}

impl UserStateStore {
    /// Wrap a repository in the ordered write path.
    pub fn new(repo: Arc<dyn StateRepository>) -> Self {
        Self {
            repo,
            chain: WriteChain::new(),
        }
    }

    /// Return the user's state, creating and persisting the default
    /// [`StateTag::First`] record on first contact.
    ///
    /// # Errors
    ///
    /// Propagates repository load and store failures.
    pub async fn get_or_create(&self, user_id: i64) -> Result<UserState, HubError> {
        if let Some(state) = self.repo.load(user_id).await? {
            return Ok(state);
        }
        let state = UserState::default();
        self.chain
            .run(|| self.repo.store(user_id, &state))
            .await?;
        Ok(state)
    }

    /// Replace the user's full record and persist it, ordered after every
    /// previously issued write on this store.
    ///
    /// # Errors
    ///
    /// Propagates the repository store failure of this write only.
    pub async fn set(&self, user_id: i64, state: UserState) -> Result<(), HubError> {
        self.chain
            .run(|| self.repo.store(user_id, &state))
            .await
    }
}

/// JSON-file repository: one map of user id to state, rewritten atomically
/// via a sibling temp file.
pub struct FileRepository {
    path: PathBuf,
}

impl FileRepository {
    /// Repository backed by the JSON file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read_all(&self) -> Result<HashMap<i64, UserState>, HubError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl StateRepository for FileRepository {
    async fn load(&self, user_id: i64) -> Result<Option<UserState>, HubError> {
        Ok(self.read_all().await?.remove(&user_id))
    }

    async fn store(&self, user_id: i64, state: &UserState) -> Result<(), HubError> {
        let mut all = self.read_all().await?;
        all.insert(user_id, state.clone());
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&all)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// In-memory repository, used by tests and as a no-persistence fallback.
#[derive(Default)]
pub struct MemoryRepository {
    records: RwLock<HashMap<i64, UserState>>,
}

#[async_trait]
impl StateRepository for MemoryRepository {
    async fn load(&self, user_id: i64) -> Result<Option<UserState>, HubError> {
        Ok(self.records.read().await.get(&user_id).cloned())
    }

    async fn store(&self, user_id: i64, state: &UserState) -> Result<(), HubError> {
        self.records.write().await.insert(user_id, state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Repository that records begin/end markers for every durable write
    /// and stalls the first one, to expose interleaving.
    #[derive(Default)]
    struct RecordingRepository {
        events: StdMutex<Vec<String>>,
        stall_first: bool,
        writes: StdMutex<usize>,
        last: StdMutex<Option<UserState>>,
    }

    impl RecordingRepository {
        fn mark(&self, event: impl Into<String>) {
            self.events
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(event.into());
        }
    }

    #[async_trait]
    impl StateRepository for RecordingRepository {
        async fn load(&self, _user_id: i64) -> Result<Option<UserState>, HubError> {
            Ok(self
                .last
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone())
        }

        async fn store(&self, _user_id: i64, state: &UserState) -> Result<(), HubError> {
            let ordinal = {
                let mut writes = self
                    .writes
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                *writes += 1;
                *writes
            };
            self.mark(format!("begin {:?}", state.tag));
            if self.stall_first && ordinal == 1 {
                tokio::time::sleep(Duration::from_millis(30)).await;
            }
            *self
                .last
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(state.clone());
            self.mark(format!("end {:?}", state.tag));
            Ok(())
        }
    }

    #[tokio::test]
    async fn overlapping_sets_persist_in_issue_order() -> Result<(), HubError> {
        let repo = Arc::new(RecordingRepository {
            stall_first: true,
            ..RecordingRepository::default()
        });
        let store = UserStateStore::new(repo.clone());

        let first = store.set(1, UserState::new(StateTag::AwaitingAttachment));
        let second = store.set(1, UserState::new(StateTag::Waiting));
        let (a, b) = tokio::join!(first, second);
        a?;
        b?;

        let events = repo
            .events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        assert_eq!(
            events,
            vec![
                "begin AwaitingAttachment",
                "end AwaitingAttachment",
                "begin Waiting",
                "end Waiting",
            ]
        );
        assert_eq!(repo.load(1).await?, Some(UserState::new(StateTag::Waiting)));
        Ok(())
    }

    #[tokio::test]
    async fn get_or_create_persists_the_default_state() -> Result<(), HubError> {
        let repo = Arc::new(MemoryRepository::default());
        let store = UserStateStore::new(repo.clone());

        let state = store.get_or_create(42).await?;
        assert_eq!(state.tag, StateTag::First);
        assert_eq!(repo.load(42).await?, Some(state));
        Ok(())
    }

    #[tokio::test]
    async fn a_failed_write_does_not_wedge_the_chain() {
        struct FailingOnce {
            inner: MemoryRepository,
            failed: StdMutex<bool>,
        }

        #[async_trait]
        impl StateRepository for FailingOnce {
            async fn load(&self, user_id: i64) -> Result<Option<UserState>, HubError> {
                self.inner.load(user_id).await
            }

            async fn store(&self, user_id: i64, state: &UserState) -> Result<(), HubError> {
                {
                    let mut failed = self
                        .failed
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                    if !*failed {
                        *failed = true;
                        return Err(HubError::CommandError("disk full".to_string()));
                    }
                }
                self.inner.store(user_id, state).await
            }
        }

        let repo = Arc::new(FailingOnce {
            inner: MemoryRepository::default(),
            failed: StdMutex::new(false),
        });
        let store = UserStateStore::new(repo.clone());

        let first = store.set(7, UserState::new(StateTag::Waiting)).await;
        assert!(matches!(first, Err(HubError::CommandError(_))));

        let second = store.set(7, UserState::new(StateTag::First)).await;
        assert!(second.is_ok());
        assert_eq!(
            repo.load(7).await.ok().flatten(),
            Some(UserState::new(StateTag::First))
        );
    }

    #[tokio::test]
    async fn file_repository_round_trips_records() -> Result<(), HubError> {
        let dir = tempfile::tempdir()?;
        let repo = FileRepository::new(dir.path().join("state.json"));

        assert_eq!(repo.load(1).await?, None);

        let state = UserState {
            tag: StateTag::Waiting,
            payload: Some(StatePayload::EditTarget {
                chat_id: 10,
                message_id: 20,
            }),
        };
        repo.store(1, &state).await?;
        assert_eq!(repo.load(1).await?, Some(state));
        Ok(())
    }
}
