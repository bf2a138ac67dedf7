//! Connection Manager
//!
//! Obtains and maintains a live commentary feed for one broadcaster at a
//! time. Callers see `start`, `stop` and a stream of [`CommentaryEvent`]s;
//! seat handling, room resolution, keepalive and bounded retry stay inside.
//!
//! # Handshake
//!
//! ```text
//! Idle ─start─> ConnectingWatch ─open─> WatchSeatPending ─room─> RoomResolved
//!                     ^                                              │
//!                     │ retry delay                                  v
//!                 RetryWait <──── close / error / disconnect ── ConnectingComment
//!                     │                                              │ open
//!                     └─ retries exhausted ─> Idle       CommentLive <┘
//! ```
//!
//! `stop` moves any phase to `Closed`.
//!
//! # Stale handlers
//!
//! Every spawned task carries the generation it was created under. All state
//! mutation happens under one lock after comparing that generation with the
//! live one, so a socket from a superseded session can still deliver frames
//! but they change nothing.

mod driver;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::buffer::{Comment, SharedCommentBuffer};
use crate::config::{BroadcasterMap, CommentaryConfig, ConnectionConfig};
use crate::events::CommentaryEvent;
use crate::preferences::{PreferenceError, PreferenceStore, RenderMode};
use crate::session::{Session, SessionPhase, SessionSnapshot};
use crate::transport::Connector;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Result of [`ConnectionManager::start`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    /// The watch handshake was started
    Started {
        /// Resolved room id
        room_id: String,
        /// Generation of the new session
        generation: u64,
    },
    /// The broadcaster has no commentary room; nothing was opened
    NoRoom,
    /// Called outside a tokio runtime; nothing was opened
    NoRuntime,
}

impl StartOutcome {
    /// Whether a session was started
    #[must_use]
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started { .. })
    }

    /// Status line suitable for the UI, if the feature is unavailable
    #[must_use]
    pub fn status_message(&self) -> Option<&'static str> {
        match self {
            Self::Started { .. } => None,
            Self::NoRoom => Some("No commentary is available for this channel"),
            Self::NoRuntime => Some("Commentary is unavailable"),
        }
    }
}

#[derive(Default)]
struct ManagerState {
    generation: u64,
    session: Option<Session>,
}

impl ManagerState {
    /// The session, if `generation` is still the live one
    fn live(&mut self, generation: u64) -> Option<&mut Session> {
        if self.generation == generation {
            self.session.as_mut()
        } else {
            None
        }
    }

    fn live_ref(&self, generation: u64) -> Option<&Session> {
        if self.generation == generation {
            self.session.as_ref()
        } else {
            None
        }
    }
}

struct Shared {
    connector: Arc<dyn Connector>,
    config: ConnectionConfig,
    rooms: BroadcasterMap,
    buffer: SharedCommentBuffer,
    preferences: PreferenceStore,
    events: broadcast::Sender<CommentaryEvent>,
    state: Mutex<ManagerState>,
}

impl Shared {
    fn emit(&self, event: CommentaryEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn emit_phase(&self, session: &Session) {
        tracing::debug!(
            broadcaster = %session.broadcaster,
            generation = session.generation,
            phase = %session.phase,
            "Commentary phase changed"
        );
        self.emit(CommentaryEvent::PhaseChanged {
            broadcaster: session.broadcaster.clone(),
            generation: session.generation,
            phase: session.phase,
        });
    }
}

/// Owns the commentary session for the current broadcaster
///
/// Dropping the manager stops the session.
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Create a manager
    pub fn new(
        connector: impl Connector,
        config: ConnectionConfig,
        rooms: BroadcasterMap,
        buffer: SharedCommentBuffer,
        preferences: PreferenceStore,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                connector: Arc::new(connector),
                config,
                rooms,
                buffer,
                preferences,
                events,
                state: Mutex::new(ManagerState::default()),
            }),
        }
    }

    /// Create a manager from the loaded configuration
    pub fn from_config(
        connector: impl Connector,
        config: &CommentaryConfig,
        preferences: PreferenceStore,
    ) -> Self {
        let buffer = SharedCommentBuffer::new(
            config.display.lane_count,
            config.display.comment_lifetime,
        );
        Self::new(
            connector,
            config.connection.clone(),
            config.rooms.clone(),
            buffer,
            preferences,
        )
    }

    /// Create a manager that opens real WebSocket connections
    #[cfg(feature = "websocket")]
    pub fn websocket(config: &CommentaryConfig, preferences: PreferenceStore) -> Self {
        Self::from_config(crate::transport::WebSocketConnector::new(), config, preferences)
    }

    /// Start commentary for `broadcaster`
    ///
    /// Any existing session is torn down first. A broadcaster without a room
    /// is not an error: nothing is opened and [`StartOutcome::NoRoom`] is
    /// returned.
    pub fn start(&self, broadcaster: &str) -> StartOutcome {
        self.stop();

        let broadcaster = broadcaster.trim();
        let Some(room_id) = self.shared.rooms.room_for(broadcaster) else {
            tracing::info!(broadcaster = %broadcaster, "No commentary room for broadcaster");
            return StartOutcome::NoRoom;
        };
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!(broadcaster = %broadcaster, "Commentary start outside a tokio runtime");
            return StartOutcome::NoRuntime;
        };

        let mut state = self.shared.state.lock();
        state.generation += 1;
        let generation = state.generation;

        let mut session = Session::new(
            broadcaster,
            room_id,
            generation,
            self.shared.config.default_keep_interval,
        );
        let url = self.shared.config.watch_url(room_id);
        tracing::info!(
            broadcaster = %broadcaster,
            room = %room_id,
            generation,
            "Starting commentary session"
        );
        session.track(runtime.spawn(driver::run_watch(
            Arc::clone(&self.shared),
            generation,
            url,
        )));
        self.shared.emit_phase(&session);
        state.session = Some(session);

        StartOutcome::Started {
            room_id: room_id.to_string(),
            generation,
        }
    }

    /// Tear down the session, if any
    ///
    /// Idempotent. Once this returns no further comment events are emitted
    /// for the old session, even if its sockets still deliver frames.
    pub fn stop(&self) {
        let session = {
            let mut state = self.shared.state.lock();
            state.generation += 1;
            state.session.take()
        };

        if let Some(mut session) = session {
            session.teardown();
            session.phase = SessionPhase::Closed;
            tracing::info!(
                broadcaster = %session.broadcaster,
                generation = session.generation,
                "Commentary session stopped"
            );
            self.shared.emit_phase(&session);
        }
        self.shared.buffer.clear();
    }

    /// Currently displayable comments; expired entries are evicted
    #[must_use]
    pub fn active_comments(&self) -> Vec<Arc<Comment>> {
        self.shared.buffer.active_snapshot(Instant::now())
    }

    /// Change and persist the render mode
    ///
    /// # Errors
    ///
    /// Returns an error if the preference cannot be written; the mode still
    /// changes for this process.
    pub fn set_mode(&self, mode: RenderMode) -> Result<(), PreferenceError> {
        self.shared.preferences.set_mode(mode)
    }

    /// Current render mode
    #[must_use]
    pub fn mode(&self) -> RenderMode {
        self.shared.preferences.mode()
    }

    /// Subscribe to comment and phase events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CommentaryEvent> {
        self.shared.events.subscribe()
    }

    /// Current phase (`Idle` when there is no session)
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.shared
            .state
            .lock()
            .session
            .as_ref()
            .map_or(SessionPhase::Idle, |s| s.phase)
    }

    /// Live generation counter
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.shared.state.lock().generation
    }

    /// Broadcaster of the current session
    #[must_use]
    pub fn broadcaster(&self) -> Option<String> {
        self.shared
            .state
            .lock()
            .session
            .as_ref()
            .map(|s| s.broadcaster.clone())
    }

    /// Snapshot of the current session
    #[must_use]
    pub fn session(&self) -> Option<SessionSnapshot> {
        self.shared.state.lock().session.as_ref().map(Session::snapshot)
    }

    /// The comment buffer shared with sinks and the compositor
    #[must_use]
    pub fn buffer(&self) -> SharedCommentBuffer {
        self.shared.buffer.clone()
    }

    /// The preference store
    #[must_use]
    pub fn preferences(&self) -> &PreferenceStore {
        &self.shared.preferences
    }

    /// Connection settings in effect
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("ConnectionManager")
            .field("generation", &state.generation)
            .field("session", &state.session)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InProcessConnector;

    fn manager(connector: InProcessConnector) -> ConnectionManager {
        let rooms: BroadcasterMap = [("NHK総合", "jk1")].into_iter().collect();
        ConnectionManager::new(
            connector,
            ConnectionConfig::for_testing(),
            rooms,
            SharedCommentBuffer::default(),
            PreferenceStore::in_memory(),
        )
    }

    #[tokio::test]
    async fn test_start_without_room_opens_nothing() {
        let (connector, mut listener) = InProcessConnector::new();
        let manager = manager(connector.clone());

        let outcome = manager.start("テレビ東京");
        assert_eq!(outcome, StartOutcome::NoRoom);
        assert!(outcome.status_message().is_some());

        tokio::task::yield_now().await;
        assert_eq!(connector.attempt_count(), 0);
        assert!(listener.try_accept().is_none());
        assert_eq!(manager.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_start_bumps_generation() {
        let (connector, _listener) = InProcessConnector::new();
        let manager = manager(connector);

        let before = manager.generation();
        let outcome = manager.start("NHK総合");
        assert!(outcome.is_started());
        assert!(manager.generation() > before);
        assert_eq!(manager.broadcaster().as_deref(), Some("NHK総合"));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (connector, _listener) = InProcessConnector::new();
        let manager = manager(connector);

        manager.start("NHK総合");
        manager.stop();
        let after_first = manager.generation();
        manager.stop();

        assert_eq!(manager.phase(), SessionPhase::Idle);
        assert!(manager.session().is_none());
        assert!(manager.generation() > after_first);
    }

    #[test]
    fn test_start_outside_runtime() {
        let (connector, _listener) = InProcessConnector::new();
        let manager = manager(connector);
        assert_eq!(manager.start("NHK総合"), StartOutcome::NoRuntime);
    }

    #[test]
    fn test_mode_forwards_to_preferences() {
        let (connector, _listener) = InProcessConnector::new();
        let manager = manager(connector);

        assert_eq!(manager.mode(), RenderMode::Overlay);
        manager.set_mode(RenderMode::Sidebar).unwrap();
        assert_eq!(manager.mode(), RenderMode::Sidebar);
        assert_eq!(manager.preferences().mode(), RenderMode::Sidebar);
    }
}
