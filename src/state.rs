use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::config::Config;
use crate::llm::client::LlmClient;
use crate::orchestrator::TurnOrchestrator;
use crate::search::retriever::VectorRetriever;
use crate::search::vector::VectorStore;
use crate::session::{Session, TurnTicket};

/// A live session plus the task currently working on its newest turn.
#[derive(Default)]
pub struct SessionHandle {
    pub session: Mutex<Session>,
    in_flight: Mutex<Option<(TurnTicket, AbortHandle)>>,
}

impl SessionHandle {
    pub fn new(session: Session) -> Self {
        Self {
            session: Mutex::new(session),
            in_flight: Mutex::new(None),
        }
    }

    /// Abort the task of an earlier turn, if any is still running.
    pub fn cancel_in_flight(&self) {
        if let Some((_, handle)) = self.in_flight.lock().take() {
            handle.abort();
        }
    }

    /// Record the task running the turn for `ticket`.
    ///
    /// Whichever of the tracked and the incoming task belongs to the older
    /// turn is aborted. Returns `false` when the incoming one was.
    pub fn track(&self, ticket: TurnTicket, handle: AbortHandle) -> bool {
        let mut in_flight = self.in_flight.lock();
        match in_flight.as_ref() {
            Some((current, _)) if *current > ticket => {
                handle.abort();
                false
            }
            _ => {
                if let Some((_, previous)) = in_flight.replace((ticket, handle)) {
                    previous.abort();
                }
                true
            }
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub orchestrator: Arc<TurnOrchestrator>,
    pub sessions: Arc<RwLock<HashMap<Uuid, Arc<SessionHandle>>>>,
    pub turn_semaphore: Arc<tokio::sync::Semaphore>,
}

impl AppState {
    /// Build the state with the bundled vector retriever and HTTP generator.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let store = VectorStore::open(&config.corpus_path())?;
        tracing::info!("Loaded {} passages from {}", store.len(), config.corpus_path().display());

        let http_client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(
                config.pipeline.generation_timeout_secs.max(1) + 5,
            ))
            .build()?;

        let retriever = VectorRetriever::new(
            Arc::new(store),
            http_client.clone(),
            config.llm.clone(),
            config.pipeline.top_k,
        );
        let generator = LlmClient::new(http_client, config.llm.clone());
        let orchestrator = TurnOrchestrator::new(
            Arc::new(retriever),
            Arc::new(generator),
            config.pipeline.clone(),
        );

        Ok(Self::with_orchestrator(config, orchestrator))
    }

    /// Build the state around an existing orchestrator.
    pub fn with_orchestrator(config: Config, orchestrator: TurnOrchestrator) -> Self {
        let max_concurrent_turns = config.max_concurrent_turns.max(1);
        Self {
            config,
            orchestrator: Arc::new(orchestrator),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            turn_semaphore: Arc::new(tokio::sync::Semaphore::new(max_concurrent_turns)),
        }
    }

    /// Start a new session, or `None` when the session limit is reached.
    pub fn create_session(&self) -> Option<Uuid> {
        let mut sessions = self.sessions.write();
        if sessions.len() >= self.config.max_sessions {
            return None;
        }
        let session = Session::new();
        let id = session.id;
        sessions.insert(id, Arc::new(SessionHandle::new(session)));
        Some(id)
    }

    pub fn session(&self, id: &Uuid) -> Option<Arc<SessionHandle>> {
        self.sessions.read().get(id).cloned()
    }

    /// End a session, aborting any turn still running for it.
    pub fn remove_session(&self, id: &Uuid) -> bool {
        match self.sessions.write().remove(id) {
            Some(handle) => {
                handle.cancel_in_flight();
                true
            }
            None => false,
        }
    }
}
