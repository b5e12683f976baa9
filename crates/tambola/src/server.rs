//! Server assembly: wires transport, sessions, the document store, and
//! the game services together, and drives the accept loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tambola_model::{GameStatus, RoomCode};
use tambola_protocol::{Codec, GameEvent, JsonCodec};
use tambola_room::{
    AutoCall, ClaimAdjudicator, NumberCaller, RoomService, TicketDesk,
    ROOMS,
};
use tambola_session::{Authenticator, SessionConfig, SessionManager};
use tambola_store::DocStore;
use tambola_tick::{PollConfig, PollDriver, PollTask, SweepStats};
use tambola_transport::{Listener, WsListener};
use tokio::sync::Mutex;

use crate::handler::handle_connection;
use crate::registry::RoomRegistry;
use crate::TambolaError;

/// Wire protocol version; handshakes with any other version are
/// rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// How often stale disconnected sessions are expired and pruned.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Everything a connection handler needs, shared behind an `Arc`.
pub(crate) struct ServerState<A, C> {
    pub(crate) sessions: Mutex<SessionManager>,
    pub(crate) registry: RoomRegistry,
    pub(crate) rooms: RoomService,
    pub(crate) caller: NumberCaller,
    pub(crate) desk: TicketDesk,
    pub(crate) claims: ClaimAdjudicator,
    pub(crate) auth: A,
    pub(crate) codec: C,
    /// Reference point for envelope timestamps.
    pub(crate) started: Instant,
}

impl<A, C> ServerState<A, C> {
    /// Milliseconds since the server started, for envelope timestamps.
    pub(crate) fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`TambolaServer`].
pub struct TambolaServerBuilder {
    bind_addr: String,
    session_config: SessionConfig,
    poll_config: PollConfig,
}

impl Default for TambolaServerBuilder {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            session_config: SessionConfig::default(),
            poll_config: PollConfig::default(),
        }
    }
}

impl TambolaServerBuilder {
    /// Address to listen on, e.g. `"0.0.0.0:9090"`. Use port 0 to let
    /// the OS pick (handy in tests).
    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    pub fn poll_config(mut self, config: PollConfig) -> Self {
        self.poll_config = config;
        self
    }

    /// Binds the listener and assembles the server.
    pub async fn build<A: Authenticator>(
        self,
        auth: A,
    ) -> Result<TambolaServer<A, JsonCodec>, TambolaError> {
        let listener = WsListener::bind(&self.bind_addr).await?;
        let store = DocStore::new();

        let state = Arc::new(ServerState {
            sessions: Mutex::new(SessionManager::new(
                self.session_config,
            )),
            registry: RoomRegistry::new(),
            rooms: RoomService::new(store.clone()),
            caller: NumberCaller::new(store.clone()),
            desk: TicketDesk::new(store.clone()),
            claims: ClaimAdjudicator::new(store.clone()),
            auth,
            codec: JsonCodec,
            started: Instant::now(),
        });

        Ok(TambolaServer {
            listener,
            state,
            store,
            poll_config: self.poll_config,
        })
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// The game coordinator server.
pub struct TambolaServer<A, C> {
    listener: WsListener,
    state: Arc<ServerState<A, C>>,
    store: DocStore,
    poll_config: PollConfig,
}

impl TambolaServer<(), JsonCodec> {
    pub fn builder() -> TambolaServerBuilder {
        TambolaServerBuilder::default()
    }
}

impl<A, C> TambolaServer<A, C>
where
    A: Authenticator,
    C: Codec,
{
    /// The address the listener is actually bound to.
    pub fn local_addr(
        &self,
    ) -> Result<std::net::SocketAddr, TambolaError> {
        Ok(self.listener.local_addr()?)
    }

    /// Runs the server: spawns the auto-call sweep and accepts
    /// connections until the process exits.
    pub async fn run(mut self) -> Result<(), TambolaError> {
        let sweep = AutoCallSweep {
            store: self.store.clone(),
            caller: self.state.caller.clone(),
            rooms: self.state.rooms.clone(),
            registry: self.state.registry.clone(),
        };
        tokio::spawn(tambola_tick::run(
            PollDriver::new(self.poll_config.clone()),
            sweep,
        ));

        let sessions_state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(SESSION_SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                let mut sessions = sessions_state.sessions.lock().await;
                let expired = sessions.expire_stale();
                if !expired.is_empty() {
                    sessions.cleanup_expired();
                    tracing::debug!(
                        count = expired.len(),
                        "expired stale sessions"
                    );
                }
            }
        });

        tracing::info!(
            addr = %self.local_addr()?,
            version = PROTOCOL_VERSION,
            "tambola server listening"
        );

        loop {
            match self.listener.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        handle_connection(conn, state).await;
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to accept connection");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Auto-call sweep
// ---------------------------------------------------------------------------

/// Visits every room once per sweep and lets the caller decide whether
/// a number is due. Calls and stops are broadcast to subscribers.
struct AutoCallSweep {
    store: DocStore,
    caller: NumberCaller,
    rooms: RoomService,
    registry: RoomRegistry,
}

impl PollTask for AutoCallSweep {
    type Error = TambolaError;

    async fn poll(&mut self) -> Result<SweepStats, Self::Error> {
        let mut stats = SweepStats::default();

        for key in self.store.keys(ROOMS) {
            let code = RoomCode::from(key);
            stats.rooms_polled += 1;

            match self.caller.auto_tick(&code).await {
                Ok(AutoCall::Called(called)) => {
                    stats.numbers_called += 1;
                    self.registry.broadcast(
                        &code,
                        &GameEvent::NumberCalled {
                            room: code.clone(),
                            number: called.number,
                            called_count: called.called_count,
                        },
                    );
                }
                Ok(AutoCall::Skipped) => {}
                Ok(AutoCall::Exhausted) => {
                    let summary = self
                        .rooms
                        .get_room(&code)
                        .ok()
                        .and_then(|room| room.summary);
                    self.registry.broadcast(
                        &code,
                        &GameEvent::StatusChanged {
                            room: code.clone(),
                            status: GameStatus::Stopped,
                            summary,
                        },
                    );
                }
                Err(e) => {
                    stats.room_errors += 1;
                    tracing::warn!(%code, error = %e, "auto-call tick failed");
                }
            }
        }

        Ok(stats)
    }
}
