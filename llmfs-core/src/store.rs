//! Session registry.
//!
//! The registry lock only guards the id map; each [`Session`] carries its own
//! lock, so a slow backend call on one session never blocks `create`, `close`
//! or work on any other session.

use crate::session::{Session, SessionSettings};
use llmfs_backend::{AskRequest, Backend};
use llmfs_common::util::truncate_with_ellipsis;
use llmfs_common::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Registry {
    sessions: HashMap<u64, Arc<Session>>,
    next_id: u64,
}

/// Concurrency-safe registry of independent sessions.
pub struct SessionStore {
    registry: RwLock<Registry>,
    defaults: RwLock<SessionSettings>,
    backend: Arc<dyn Backend>,
    ask_timeout: Option<Duration>,
}

impl SessionStore {
    /// Create an empty store whose sessions start from `defaults`.
    pub fn new(backend: Arc<dyn Backend>, defaults: SessionSettings) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            defaults: RwLock::new(defaults),
            backend,
            ask_timeout: None,
        }
    }

    /// Bound every backend call by `timeout`.
    pub fn with_ask_timeout(mut self, timeout: Duration) -> Self {
        self.ask_timeout = Some(timeout);
        self
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Replace the template used by later `create` calls.
    pub fn set_defaults(&self, defaults: SessionSettings) {
        *self.defaults.write().unwrap_or_else(|e| e.into_inner()) = defaults;
    }

    pub fn defaults(&self) -> SessionSettings {
        self.defaults
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Register a new session and return its id. Ids are never reused.
    pub fn create(&self) -> u64 {
        let defaults = self.defaults();
        let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
        let id = registry.next_id;
        registry.next_id += 1;
        registry
            .sessions
            .insert(id, Arc::new(Session::new(id, defaults)));
        drop(registry);

        tracing::info!(session_id = id, "Session created");
        id
    }

    pub fn get(&self, id: u64) -> Result<Arc<Session>> {
        self.registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .sessions
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("session {id}")))
    }

    /// Close and unregister a session. Unknown ids are ignored.
    ///
    /// The session is marked closed before the registry lock is released, so
    /// no handle can mutate it once `get` stops finding it.
    pub fn close(&self, id: u64) {
        let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
        let Some(session) = registry.sessions.remove(&id) else {
            return;
        };
        session.close();
        drop(registry);

        tracing::info!(session_id = id, "Session closed");
    }

    /// Clear a session's conversation. Unknown ids are ignored.
    pub fn reset(&self, id: u64) {
        if let Ok(session) = self.get(id) {
            // Only fails if a concurrent close won, which leaves nothing to reset.
            if session.reset().is_ok() {
                tracing::info!(session_id = id, "Session reset");
            }
        }
    }

    /// Ids registered at the time of the call.
    pub fn list_sessions(&self) -> Vec<u64> {
        self.registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .sessions
            .keys()
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .sessions
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Send `prompt` in the context of session `id`.
    ///
    /// On success the exchange is appended to history and the response text
    /// returned. On failure history is untouched, `"Error: ..."` becomes the
    /// session's last result and the error is returned.
    pub async fn ask(&self, id: u64, prompt: &str, cancel: &CancellationToken) -> Result<String> {
        let session = self.get(id)?;
        if session.is_closed() {
            return Err(Error::Closed(id));
        }

        let (history, settings) = session.snapshot();
        let request = AskRequest {
            history,
            prompt: prompt.to_string(),
            model: settings.model,
            temperature: settings.temperature,
            system_prompt: settings.system_prompt,
            thinking_tokens: settings.thinking_tokens,
            prefill: settings.prefill,
        };

        tracing::debug!(
            session_id = id,
            model = %request.model,
            history_len = request.history.len(),
            prompt = %truncate_with_ellipsis(prompt, 80),
            "Asking backend"
        );

        let call = self.backend.ask(request, cancel);
        let outcome = match self.ask_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or(Err(Error::Timeout)),
            None => call.await,
        };

        match outcome {
            Ok(response) => {
                session.record_exchange(prompt, &response.content, response.usage.total())?;
                tracing::info!(
                    session_id = id,
                    tokens = response.usage.total(),
                    latency_ms = response.latency_ms,
                    "Ask completed"
                );
                Ok(response.content)
            }
            Err(e) => {
                tracing::warn!(session_id = id, error = %e, "Ask failed");
                session.set_last_result(format!("Error: {e}"))?;
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.len())
            .field("backend", &self.backend.name())
            .field("ask_timeout", &self.ask_timeout)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use llmfs_backend::{AskResponse, BackendState, Message, MetricsCallback, TokenUsage};
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Backend double: echoes the prompt, fails on demand, or hangs until cancelled.
    pub(crate) struct MockBackend {
        pub fail: bool,
        pub hang: bool,
        pub requests: Mutex<Vec<AskRequest>>,
        state: BackendState,
    }

    impl MockBackend {
        pub fn echo() -> Arc<Self> {
            Arc::new(Self::plain())
        }

        pub fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                ..Self::plain()
            })
        }

        pub fn hanging() -> Arc<Self> {
            Arc::new(Self {
                hang: true,
                ..Self::plain()
            })
        }

        fn plain() -> Self {
            Self {
                fail: false,
                hang: false,
                requests: Mutex::new(Vec::new()),
                state: BackendState::default(),
            }
        }
    }

    #[async_trait]
    impl Backend for MockBackend {
        fn name(&self) -> &str {
            "mock"
        }

        async fn ask(
            &self,
            request: AskRequest,
            cancel: &CancellationToken,
        ) -> Result<AskResponse> {
            self.requests.lock().unwrap().push(request.clone());
            if self.hang {
                cancel.cancelled().await;
                return Err(Error::Cancelled);
            }
            if self.fail {
                return Err(Error::BackendFailure("[mock:test] API error: overloaded".into()));
            }
            let usage = TokenUsage {
                input_tokens: 3,
                output_tokens: 2,
            };
            self.state.record(usage, 1);
            Ok(AskResponse {
                content: format!("{}echo: {}", request.prefill, request.prompt),
                usage,
                latency_ms: 1,
            })
        }

        fn system_prompt(&self) -> String {
            self.state.system_prompt()
        }

        fn set_system_prompt(&self, prompt: &str) {
            self.state.set_system_prompt(prompt);
        }

        fn set_metrics_callback(&self, callback: MetricsCallback) {
            self.state.set_metrics_callback(callback);
        }
    }

    fn store(backend: Arc<MockBackend>) -> SessionStore {
        SessionStore::new(backend, SessionSettings::default())
    }

    #[test]
    fn test_create_assigns_sequential_ids() {
        let store = store(MockBackend::echo());
        assert_eq!(store.create(), 0);
        assert_eq!(store.create(), 1);
        assert_eq!(store.len(), 2);

        let mut ids = store.list_sessions();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_concurrent_create_yields_distinct_ids() {
        let store = Arc::new(store(MockBackend::echo()));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || (0..50).map(|_| store.create()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "id {id} issued twice");
            }
        }
        assert_eq!(seen.len(), 800);
    }

    #[test]
    fn test_close_is_idempotent_and_ids_not_reused() {
        let store = store(MockBackend::echo());
        let id = store.create();
        let session = store.get(id).unwrap();

        store.close(id);
        store.close(id);
        store.close(42);

        assert!(session.is_closed());
        assert!(store.get(id).unwrap_err().is_not_found());
        assert_ne!(store.create(), id);
    }

    #[test]
    fn test_closed_handle_rejects_mutation_once_unregistered() {
        let store = Arc::new(store(MockBackend::echo()));
        for _ in 0..200 {
            let id = store.create();
            let handle = store.get(id).unwrap();

            let closer = {
                let store = store.clone();
                std::thread::spawn(move || store.close(id))
            };
            let mut mutated_after_removal = false;
            loop {
                let removed = store.get(id).is_err();
                let result = handle.set_model("other");
                if removed && result.is_ok() {
                    mutated_after_removal = true;
                }
                if removed {
                    break;
                }
            }
            closer.join().unwrap();

            assert!(!mutated_after_removal, "session {id} mutated after removal");
            assert!(matches!(handle.set_model("x"), Err(Error::Closed(_))));
            assert!(handle.reset().is_err());
        }
    }

    #[test]
    fn test_reset_unknown_is_noop() {
        let store = store(MockBackend::echo());
        store.reset(7);
        assert!(store.is_empty());
    }

    #[test]
    fn test_set_defaults_applies_to_new_sessions_only() {
        let store = store(MockBackend::echo());
        let old = store.create();
        store.set_defaults(SessionSettings {
            model: "claude-opus-4".into(),
            ..SessionSettings::default()
        });
        let new = store.create();

        assert_eq!(store.get(new).unwrap().model(), "claude-opus-4");
        assert_ne!(store.get(old).unwrap().model(), "claude-opus-4");
    }

    #[tokio::test]
    async fn test_ask_appends_exchange() {
        let backend = MockBackend::echo();
        let store = store(backend.clone());
        let id = store.create();
        let cancel = CancellationToken::new();

        let reply = store.ask(id, "hello", &cancel).await.unwrap();
        assert_eq!(reply, "echo: hello");
        store.ask(id, "again", &cancel).await.unwrap();

        let session = store.get(id).unwrap();
        assert_eq!(
            session.history(),
            vec![
                Message::user("hello"),
                Message::assistant("echo: hello"),
                Message::user("again"),
                Message::assistant("echo: again"),
            ]
        );
        assert_eq!(session.total_tokens(), 10);
        assert_eq!(session.last_result(), "echo: again");

        // Second request carried the first exchange as history
        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests[1].history.len(), 2);
    }

    #[tokio::test]
    async fn test_ask_failure_leaves_history_untouched() {
        let store = store(MockBackend::failing());
        let id = store.create();

        let err = store
            .ask(id, "hello", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BackendFailure(_)));

        let session = store.get(id).unwrap();
        assert!(session.history().is_empty());
        assert!(session.last_result().starts_with("Error: "));
        assert!(session.last_result().contains("overloaded"));
    }

    #[tokio::test]
    async fn test_ask_unknown_session() {
        let store = store(MockBackend::echo());
        let err = store
            .ask(3, "hello", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_ask_cancellation_returns_promptly() {
        let store = Arc::new(store(MockBackend::hanging()));
        let id = store.create();
        let cancel = CancellationToken::new();

        let task = {
            let store = store.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { store.ask(id, "hello", &cancel).await })
        };
        tokio::task::yield_now().await;
        cancel.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        let session = store.get(id).unwrap();
        assert!(session.history().is_empty());
        assert_eq!(session.total_tokens(), 0);
    }

    #[tokio::test]
    async fn test_ask_timeout() {
        let store = store(MockBackend::hanging()).with_ask_timeout(Duration::from_millis(20));
        let id = store.create();

        let err = store
            .ask(id, "hello", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout));
        assert_eq!(store.get(id).unwrap().last_result(), "Error: Operation timed out");
    }

    #[tokio::test]
    async fn test_close_during_ask_discards_result() {
        let store = Arc::new(store(MockBackend::hanging()));
        let id = store.create();
        let session = store.get(id).unwrap();
        let cancel = CancellationToken::new();

        let task = {
            let store = store.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { store.ask(id, "hello", &cancel).await })
        };
        tokio::task::yield_now().await;
        store.close(id);
        cancel.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Closed(_) | Error::Cancelled));
        assert_eq!(session.last_result(), "");
    }
}
