//! Integration tests for the server, handler, and full connection flow.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tambola::{
    ClientRequest, Envelope, GameEvent, GuestAuthenticator, Payload,
    ServerResponse, TambolaServer, PROTOCOL_VERSION,
};
use tambola_model::{
    CallingMode, GameStatus, LifecycleAction, PlayerId, PrizeRuleConfig,
    RoomCode, RuleId,
};
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Starts a server on a random port and returns the address.
async fn start_server() -> String {
    let server = TambolaServer::builder()
        .bind("127.0.0.1:0")
        .build(GuestAuthenticator)
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    addr
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) =
        tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("should connect");
    ws
}

fn encode_envelope(envelope: &Envelope) -> Message {
    let bytes = serde_json::to_vec(envelope).expect("encode");
    Message::Binary(bytes.into())
}

fn decode_envelope(msg: Message) -> Envelope {
    serde_json::from_slice(&msg.into_data()).expect("decode")
}

async fn send_request(ws: &mut ClientWs, seq: u64, req: ClientRequest) {
    let envelope = Envelope {
        seq,
        timestamp: 0,
        payload: Payload::Request(req),
    };
    ws.send(encode_envelope(&envelope)).await.expect("send");
}

/// Reads frames until a response arrives, skipping pushed events.
async fn recv_response(ws: &mut ClientWs) -> ServerResponse {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a response")
            .expect("stream ended")
            .expect("recv");
        match decode_envelope(msg).payload {
            Payload::Response(resp) => return resp,
            Payload::Event(_) => continue,
            Payload::Request(_) => panic!("server sent a request"),
        }
    }
}

/// Reads frames until an event matching the predicate arrives.
async fn recv_event(
    ws: &mut ClientWs,
    mut pred: impl FnMut(&GameEvent) -> bool,
) -> GameEvent {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for an event")
            .expect("stream ended")
            .expect("recv");
        if let Payload::Event(event) = decode_envelope(msg).payload {
            if pred(&event) {
                return event;
            }
        }
    }
}

/// Sends a handshake and returns the acknowledged player id and
/// reconnect token.
async fn handshake_full(
    ws: &mut ClientWs,
    token: Option<&str>,
) -> (PlayerId, String) {
    let hs = Envelope {
        seq: 0,
        timestamp: 0,
        payload: Payload::Request(ClientRequest::Handshake {
            version: PROTOCOL_VERSION,
            token: token.map(String::from),
            reconnect: None,
        }),
    };
    ws.send(encode_envelope(&hs)).await.expect("send handshake");
    match recv_response(ws).await {
        ServerResponse::HandshakeAck {
            player_id,
            reconnect_token,
            ..
        } => (player_id, reconnect_token),
        other => panic!("expected HandshakeAck, got {other:?}"),
    }
}

async fn handshake(ws: &mut ClientWs, token: Option<&str>) -> PlayerId {
    handshake_full(ws, token).await.0
}

fn topline_rule(coins: u64) -> PrizeRuleConfig {
    PrizeRuleConfig {
        id: RuleId::from("topline"),
        name: "Top Line".into(),
        description: String::new(),
        active: true,
        coins_per_prize: coins,
        percentage_of_pool: None,
        max_prizes: 1,
    }
}

fn create_room_request(name: &str) -> ClientRequest {
    ClientRequest::CreateRoom {
        name: name.into(),
        display_name: "Host".into(),
        rules: vec![topline_rule(50)],
        ticket_price: 10,
        max_tickets_per_player: 2,
        calling_mode: CallingMode::Manual,
        auto_call_interval_secs: 5,
    }
}

// =========================================================================
// Connection and handshake
// =========================================================================

#[tokio::test]
async fn test_handshake_with_token_uses_token_identity() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    let player = handshake(&mut ws, Some("alice")).await;
    assert_eq!(player, PlayerId::from("alice"));
}

#[tokio::test]
async fn test_handshake_without_token_issues_guest_identity() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    let player = handshake(&mut ws, None).await;
    assert!(player.as_str().starts_with("guest_"));
}

#[tokio::test]
async fn test_handshake_version_mismatch_rejected() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    let hs = Envelope {
        seq: 0,
        timestamp: 0,
        payload: Payload::Request(ClientRequest::Handshake {
            version: 999,
            token: Some("alice".into()),
            reconnect: None,
        }),
    };
    ws.send(encode_envelope(&hs)).await.expect("send");

    match recv_response(&mut ws).await {
        ServerResponse::Error { code, message } => {
            assert_eq!(code, 3);
            assert!(message.contains("version"));
        }
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_first_message_must_be_handshake() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    send_request(
        &mut ws,
        0,
        ClientRequest::Heartbeat { client_time: 0 },
    )
    .await;

    match recv_response(&mut ws).await {
        ServerResponse::Error { code, .. } => assert_eq!(code, 9),
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_second_connection_same_identity_rejected() {
    let addr = start_server().await;
    let mut ws1 = connect(&addr).await;
    handshake(&mut ws1, Some("alice")).await;

    let mut ws2 = connect(&addr).await;
    let hs = Envelope {
        seq: 0,
        timestamp: 0,
        payload: Payload::Request(ClientRequest::Handshake {
            version: PROTOCOL_VERSION,
            token: Some("alice".into()),
            reconnect: None,
        }),
    };
    ws2.send(encode_envelope(&hs)).await.expect("send");

    match recv_response(&mut ws2).await {
        ServerResponse::Error { code, .. } => assert_eq!(code, 6),
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_reconnect_resumes_identity_and_rooms() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    let (player, reconnect_token) =
        handshake_full(&mut ws, Some("alice")).await;

    send_request(&mut ws, 1, create_room_request("Sticky")).await;
    let code = match recv_response(&mut ws).await {
        ServerResponse::RoomCreated { room } => room,
        other => panic!("expected RoomCreated, got {other:?}"),
    };

    // Drop the connection, then resume with the token.
    drop(ws);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut ws = connect(&addr).await;
    let hs = Envelope {
        seq: 0,
        timestamp: 0,
        payload: Payload::Request(ClientRequest::Handshake {
            version: PROTOCOL_VERSION,
            token: None,
            reconnect: Some(reconnect_token),
        }),
    };
    ws.send(encode_envelope(&hs)).await.expect("send");
    match recv_response(&mut ws).await {
        ServerResponse::HandshakeAck { player_id, .. } => {
            assert_eq!(player_id, player);
        }
        other => panic!("expected HandshakeAck, got {other:?}"),
    }

    // The resumed session still sees its room.
    send_request(
        &mut ws,
        1,
        ClientRequest::GetRoom { room: code.clone() },
    )
    .await;
    match recv_response(&mut ws).await {
        ServerResponse::RoomSnapshot { room } => {
            assert_eq!(room.code, code);
            assert_eq!(room.admin, player);
        }
        other => panic!("expected RoomSnapshot, got {other:?}"),
    }
}

#[tokio::test]
async fn test_reconnect_with_bogus_token_rejected() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    let hs = Envelope {
        seq: 0,
        timestamp: 0,
        payload: Payload::Request(ClientRequest::Handshake {
            version: PROTOCOL_VERSION,
            token: None,
            reconnect: Some("deadbeef".into()),
        }),
    };
    ws.send(encode_envelope(&hs)).await.expect("send");

    match recv_response(&mut ws).await {
        ServerResponse::Error { code, .. } => assert_eq!(code, 16),
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_heartbeat_echoes_client_time() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws, Some("alice")).await;

    send_request(
        &mut ws,
        1,
        ClientRequest::Heartbeat { client_time: 12345 },
    )
    .await;

    match recv_response(&mut ws).await {
        ServerResponse::HeartbeatAck { client_time, .. } => {
            assert_eq!(client_time, 12345);
        }
        other => panic!("expected HeartbeatAck, got {other:?}"),
    }
}

#[tokio::test]
async fn test_disconnect_closes_connection() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws, Some("alice")).await;

    send_request(
        &mut ws,
        1,
        ClientRequest::Disconnect { reason: "bye".into() },
    )
    .await;

    let result =
        tokio::time::timeout(Duration::from_secs(2), ws.next()).await;
    match result {
        Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {}
        Ok(Some(Err(_))) => {}
        other => panic!("expected close, got {other:?}"),
    }
}

#[tokio::test]
async fn test_garbage_frame_skipped_connection_survives() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws, Some("alice")).await;

    ws.send(Message::Binary(b"not json".to_vec().into()))
        .await
        .expect("send");
    match recv_response(&mut ws).await {
        ServerResponse::Error { code, .. } => assert_eq!(code, 3),
        other => panic!("expected Error, got {other:?}"),
    }

    send_request(
        &mut ws,
        2,
        ClientRequest::Heartbeat { client_time: 7 },
    )
    .await;
    assert!(matches!(
        recv_response(&mut ws).await,
        ServerResponse::HeartbeatAck { client_time: 7, .. }
    ));
}

// =========================================================================
// Rooms and game flow
// =========================================================================

#[tokio::test]
async fn test_get_unknown_room_returns_not_found() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws, Some("alice")).await;

    send_request(
        &mut ws,
        1,
        ClientRequest::GetRoom { room: RoomCode::from("ZZZZZZ") },
    )
    .await;

    match recv_response(&mut ws).await {
        ServerResponse::Error { code, .. } => assert_eq!(code, 5),
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_create_room_and_snapshot() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    let admin = handshake(&mut ws, Some("admin")).await;

    send_request(&mut ws, 1, create_room_request("Friday Night")).await;
    let code = match recv_response(&mut ws).await {
        ServerResponse::RoomCreated { room } => room,
        other => panic!("expected RoomCreated, got {other:?}"),
    };

    send_request(
        &mut ws,
        2,
        ClientRequest::GetRoom { room: code.clone() },
    )
    .await;
    match recv_response(&mut ws).await {
        ServerResponse::RoomSnapshot { room } => {
            assert_eq!(room.code, code);
            assert_eq!(room.admin, admin);
            assert_eq!(room.name, "Friday Night");
            assert_eq!(room.status, GameStatus::Idle);
            // The admin auto-joins.
            assert!(room.players.contains_key(&admin));
        }
        other => panic!("expected RoomSnapshot, got {other:?}"),
    }
}

#[tokio::test]
async fn test_join_broadcasts_player_joined_to_admin() {
    let addr = start_server().await;
    let mut admin_ws = connect(&addr).await;
    handshake(&mut admin_ws, Some("admin")).await;

    send_request(&mut admin_ws, 1, create_room_request("Lobby")).await;
    let code = match recv_response(&mut admin_ws).await {
        ServerResponse::RoomCreated { room } => room,
        other => panic!("expected RoomCreated, got {other:?}"),
    };

    let mut player_ws = connect(&addr).await;
    let player = handshake(&mut player_ws, Some("bob")).await;
    send_request(
        &mut player_ws,
        1,
        ClientRequest::JoinRoom {
            room: code.clone(),
            display_name: "Bob".into(),
        },
    )
    .await;
    match recv_response(&mut player_ws).await {
        ServerResponse::RoomSnapshot { room } => {
            assert!(room.players.contains_key(&player));
        }
        other => panic!("expected RoomSnapshot, got {other:?}"),
    }

    let event = recv_event(&mut admin_ws, |e| {
        matches!(e, GameEvent::PlayerJoined { .. })
    })
    .await;
    match event {
        GameEvent::PlayerJoined { room, player: who, name } => {
            assert_eq!(room, code);
            assert_eq!(who, player);
            assert_eq!(name, "Bob");
        }
        other => panic!("expected PlayerJoined, got {other:?}"),
    }
}

/// Full happy path over the wire: create, join, ticket, start, call
/// every number, claim, approve, winner broadcast.
#[tokio::test]
async fn test_full_game_over_websocket() {
    let addr = start_server().await;
    let mut admin_ws = connect(&addr).await;
    let mut player_ws = connect(&addr).await;
    handshake(&mut admin_ws, Some("admin")).await;
    let player = handshake(&mut player_ws, Some("bob")).await;

    // Room setup.
    send_request(&mut admin_ws, 1, create_room_request("Big Game")).await;
    let code = match recv_response(&mut admin_ws).await {
        ServerResponse::RoomCreated { room } => room,
        other => panic!("expected RoomCreated, got {other:?}"),
    };
    send_request(
        &mut player_ws,
        1,
        ClientRequest::JoinRoom {
            room: code.clone(),
            display_name: "Bob".into(),
        },
    )
    .await;
    recv_response(&mut player_ws).await;

    // Ticket request and approval.
    send_request(
        &mut player_ws,
        2,
        ClientRequest::RequestTicket { room: code.clone() },
    )
    .await;
    let request = match recv_response(&mut player_ws).await {
        ServerResponse::TicketRequested { request } => request,
        other => panic!("expected TicketRequested, got {other:?}"),
    };
    send_request(
        &mut admin_ws,
        2,
        ClientRequest::ApproveTicketRequest {
            room: code.clone(),
            request,
        },
    )
    .await;
    let ticket = match recv_response(&mut admin_ws).await {
        ServerResponse::TicketApproved { ticket, .. } => *ticket,
        other => panic!("expected TicketApproved, got {other:?}"),
    };
    assert_eq!(ticket.owner, player);

    // Start the game.
    send_request(
        &mut admin_ws,
        3,
        ClientRequest::SetLifecycle {
            room: code.clone(),
            action: LifecycleAction::Start,
        },
    )
    .await;
    match recv_response(&mut admin_ws).await {
        ServerResponse::LifecycleChanged { status, .. } => {
            assert_eq!(status, GameStatus::Running);
        }
        other => panic!("expected LifecycleChanged, got {other:?}"),
    }
    recv_event(&mut player_ws, |e| {
        matches!(
            e,
            GameEvent::StatusChanged {
                status: GameStatus::Running,
                ..
            }
        )
    })
    .await;

    // Call every number so any claim's numbers are covered.
    let mut seq = 4;
    for n in 1..=90u8 {
        send_request(
            &mut admin_ws,
            seq,
            ClientRequest::CallNumber {
                room: code.clone(),
                number: Some(n),
            },
        )
        .await;
        seq += 1;
        match recv_response(&mut admin_ws).await {
            ServerResponse::NumberCalled { number, .. } => {
                assert_eq!(number, n);
            }
            other => panic!("expected NumberCalled, got {other:?}"),
        }
    }

    // Claim the top line and approve it.
    let numbers = ticket.grid.row_numbers(0);
    send_request(
        &mut player_ws,
        3,
        ClientRequest::SubmitClaim {
            room: code.clone(),
            ticket: ticket.id.clone(),
            rule: RuleId::from("topline"),
            numbers,
        },
    )
    .await;
    let claim = match recv_response(&mut player_ws).await {
        ServerResponse::ClaimSubmitted { claim, status } => {
            assert!(status.is_pending(), "claim should be pending");
            claim
        }
        other => panic!("expected ClaimSubmitted, got {other:?}"),
    };

    send_request(
        &mut admin_ws,
        seq,
        ClientRequest::ApproveClaim { room: code.clone(), claim },
    )
    .await;
    match recv_response(&mut admin_ws).await {
        ServerResponse::ClaimApproved { coins_awarded, .. } => {
            assert_eq!(coins_awarded, 50);
        }
        other => panic!("expected ClaimApproved, got {other:?}"),
    }

    let event = recv_event(&mut player_ws, |e| {
        matches!(e, GameEvent::WinnerAnnounced { .. })
    })
    .await;
    match event {
        GameEvent::WinnerAnnounced { winner, .. } => {
            assert_eq!(winner.player_id, player);
            assert_eq!(winner.coins_awarded, 50);
        }
        other => panic!("expected WinnerAnnounced, got {other:?}"),
    }
}

#[tokio::test]
async fn test_lifecycle_change_requires_admin() {
    let addr = start_server().await;
    let mut admin_ws = connect(&addr).await;
    handshake(&mut admin_ws, Some("admin")).await;

    send_request(&mut admin_ws, 1, create_room_request("Locked")).await;
    let code = match recv_response(&mut admin_ws).await {
        ServerResponse::RoomCreated { room } => room,
        other => panic!("expected RoomCreated, got {other:?}"),
    };

    let mut player_ws = connect(&addr).await;
    handshake(&mut player_ws, Some("bob")).await;
    send_request(
        &mut player_ws,
        1,
        ClientRequest::JoinRoom {
            room: code.clone(),
            display_name: "Bob".into(),
        },
    )
    .await;
    recv_response(&mut player_ws).await;

    send_request(
        &mut player_ws,
        2,
        ClientRequest::SetLifecycle {
            room: code,
            action: LifecycleAction::Start,
        },
    )
    .await;
    match recv_response(&mut player_ws).await {
        ServerResponse::Error { code, .. } => assert_eq!(code, 7),
        other => panic!("expected Error, got {other:?}"),
    }
}
