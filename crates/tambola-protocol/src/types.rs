//! Wire types: everything that travels between clients and the
//! coordinator.
//!
//! Three message families share one envelope: requests (client →
//! server), responses (server → the requesting client), and events
//! (server → every subscriber of a room). All tagging is
//! internally-tagged JSON (`"type"` discriminator) so web clients can
//! switch on a single field.

use serde::{Deserialize, Serialize};

use tambola_model::{
    CallingMode, ClaimId, ClaimStatus, GameStatus, GameSummary,
    LifecycleAction, PlayerId, PrizeRuleConfig, RequestId, Room, RoomCode,
    RuleId, Ticket, TicketId, Winner,
};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// The operation surface. Every variant carries its payload; the caller
/// identity comes from the authenticated session, never from the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientRequest {
    /// First message on a connection: protocol version + auth token.
    /// Presenting a previously issued `reconnect` token resumes a
    /// dropped session instead of starting a fresh one.
    Handshake {
        version: u32,
        token: Option<String>,
        #[serde(default)]
        reconnect: Option<String>,
    },

    /// Keep-alive; also refreshes room presence.
    Heartbeat { client_time: u64 },

    // -- Admin: room setup and lifecycle --
    /// The admin auto-joins the new room under `display_name`.
    CreateRoom {
        name: String,
        display_name: String,
        rules: Vec<PrizeRuleConfig>,
        ticket_price: u64,
        max_tickets_per_player: u32,
        calling_mode: CallingMode,
        auto_call_interval_secs: u64,
    },

    /// Reconfigure a room. Only `Some` fields change; only valid while
    /// the room is idle.
    UpdateRoomConfig {
        room: RoomCode,
        name: Option<String>,
        rules: Option<Vec<PrizeRuleConfig>>,
        ticket_price: Option<u64>,
        max_tickets_per_player: Option<u32>,
        calling_mode: Option<CallingMode>,
        auto_call_interval_secs: Option<u64>,
    },

    SetLifecycle {
        room: RoomCode,
        action: LifecycleAction,
    },

    /// Call the next number: a specific one, or a random draw if `None`.
    CallNumber {
        room: RoomCode,
        number: Option<u8>,
    },

    // -- Players --
    JoinRoom {
        room: RoomCode,
        display_name: String,
    },

    RequestTicket { room: RoomCode },

    ApproveTicketRequest {
        room: RoomCode,
        request: RequestId,
    },

    RejectTicketRequest {
        room: RoomCode,
        request: RequestId,
        reason: String,
    },

    SubmitClaim {
        room: RoomCode,
        ticket: TicketId,
        rule: RuleId,
        numbers: Vec<u8>,
    },

    ApproveClaim {
        room: RoomCode,
        claim: ClaimId,
    },

    RejectClaim {
        room: RoomCode,
        claim: ClaimId,
        reason: String,
    },

    /// Toggle a mark on the caller's own ticket (informational only).
    MarkNumber {
        ticket: TicketId,
        number: u8,
        marked: bool,
    },

    /// Full room snapshot (re-sync after reconnect).
    GetRoom { room: RoomCode },

    Disconnect { reason: String },
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Direct replies to a request, delivered only to the requester.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerResponse {
    HandshakeAck {
        player_id: PlayerId,
        server_time: u64,
        /// Secret for resuming this session after a dropped
        /// connection.
        reconnect_token: String,
    },

    HeartbeatAck {
        client_time: u64,
        server_time: u64,
    },

    RoomCreated { room: RoomCode },

    /// Generic success for operations with no payload to return.
    Ack,

    LifecycleChanged {
        room: RoomCode,
        status: GameStatus,
        /// Present on stop.
        summary: Option<GameSummary>,
    },

    NumberCalled {
        room: RoomCode,
        number: u8,
    },

    /// Reply to both `JoinRoom` and `GetRoom`.
    RoomSnapshot { room: Box<Room> },

    TicketRequested { request: RequestId },

    TicketApproved {
        request: RequestId,
        ticket: Box<Ticket>,
    },

    ClaimSubmitted {
        claim: ClaimId,
        status: ClaimStatus,
    },

    ClaimApproved {
        claim: ClaimId,
        coins_awarded: u64,
    },

    /// `code` is from the coordinator's error taxonomy (gRPC-style
    /// numbering); `message` is human-readable.
    Error { code: u16, message: String },
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Pushed to every connected subscriber of a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GameEvent {
    NumberCalled {
        room: RoomCode,
        number: u8,
        called_count: usize,
    },

    StatusChanged {
        room: RoomCode,
        status: GameStatus,
        summary: Option<GameSummary>,
    },

    WinnerAnnounced {
        room: RoomCode,
        winner: Winner,
    },

    PlayerJoined {
        room: RoomCode,
        player: PlayerId,
        name: String,
    },
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The payload of an envelope: which message family it carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum Payload {
    Request(ClientRequest),
    Response(ServerResponse),
    Event(GameEvent),
}

/// The top-level wire wrapper. Every frame is one JSON envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Per-direction auto-incrementing sequence number.
    pub seq: u64,
    /// Milliseconds since the server started.
    pub timestamp: u64,
    pub payload: Payload,
}

// =========================================================================
// Tests
// =========================================================================
