//! End-to-end game flows across the room services: setup, ticket
//! issuance, number calling, claims, and payouts on a shared store.

use tambola_model::{
    CallingMode, ClaimStatus, GameStatus, LifecycleAction, PlayerId,
    PrizeClaim, PrizeRuleConfig, Room, RoomCode, RuleId,
};
use tambola_room::{
    ClaimAdjudicator, GameError, NumberCaller, RoomConfig, RoomService,
    TicketDesk, CLAIMS, ROOMS,
};
use tambola_store::DocStore;

struct Game {
    store: DocStore,
    rooms: RoomService,
    caller: NumberCaller,
    desk: TicketDesk,
    claims: ClaimAdjudicator,
    admin: PlayerId,
    code: RoomCode,
}

fn rule(
    id: &str,
    coins: u64,
    pct: Option<u8>,
    max_prizes: u32,
) -> PrizeRuleConfig {
    PrizeRuleConfig {
        id: RuleId::from(id),
        name: id.to_string(),
        description: String::new(),
        active: true,
        coins_per_prize: coins,
        percentage_of_pool: pct,
        max_prizes,
    }
}

async fn new_game(rules: Vec<PrizeRuleConfig>) -> Game {
    let store = DocStore::new();
    let rooms = RoomService::new(store.clone());
    let admin = PlayerId::from("p-admin");
    let code = rooms
        .create_room(
            &admin,
            "Alice",
            RoomConfig {
                name: "Friday Night".into(),
                rules,
                ticket_price: 10,
                max_tickets_per_player: 3,
                calling_mode: CallingMode::Manual,
                auto_call_interval_secs: 5,
            },
        )
        .await
        .unwrap();
    Game {
        caller: NumberCaller::new(store.clone()),
        desk: TicketDesk::new(store.clone()),
        claims: ClaimAdjudicator::new(store.clone()),
        rooms,
        store,
        admin,
        code,
    }
}

impl Game {
    async fn join_with_ticket(
        &self,
        id: &str,
        name: &str,
    ) -> (PlayerId, tambola_model::Ticket) {
        let player = PlayerId::from(id);
        self.rooms
            .join_room(&player, &self.code, name)
            .await
            .unwrap();
        let request = self
            .desk
            .request_ticket(&player, &self.code)
            .await
            .unwrap();
        let ticket = self
            .desk
            .approve_request(&self.admin, &self.code, &request)
            .await
            .unwrap();
        (player, ticket)
    }

    async fn start(&self) {
        self.rooms
            .set_lifecycle(&self.admin, &self.code, LifecycleAction::Start)
            .await
            .unwrap();
    }

    async fn call_all(&self, numbers: impl IntoIterator<Item = u8>) {
        for n in numbers {
            self.caller
                .call_number(&self.admin, &self.code, Some(n))
                .await
                .unwrap();
        }
    }

    fn room(&self) -> Room {
        self.store
            .peek(ROOMS, self.code.as_str())
            .unwrap()
            .unwrap()
    }

    fn claim_doc(&self, id: &tambola_model::ClaimId) -> PrizeClaim {
        self.store.peek(CLAIMS, id.as_str()).unwrap().unwrap()
    }
}

#[tokio::test]
async fn test_full_game_flow_topline_winner() {
    let game = new_game(vec![rule("topline", 50, None, 1)]).await;
    let (player, ticket) = game.join_with_ticket("p-bob", "Bob").await;
    game.start().await;

    // Call exactly the ticket's top row.
    let top_row = ticket.grid.row_numbers(0);
    game.call_all(top_row.iter().copied()).await;

    let claim = game
        .claims
        .submit_claim(
            &player,
            &game.code,
            &ticket.id,
            &RuleId::from("topline"),
            top_row.clone(),
        )
        .await
        .unwrap();
    assert_eq!(claim.status, ClaimStatus::PendingAdminApproval);
    assert!(claim.auto_valid);
    assert_eq!(claim.effectively_claimed, top_row);

    let winner = game
        .claims
        .approve_claim(&game.admin, &game.code, &claim.id)
        .await
        .unwrap();
    assert_eq!(winner.player_id, player);
    assert_eq!(winner.coins_awarded, 50);
    assert_eq!(winner.prize_name, "topline");

    let room = game.room();
    assert_eq!(room.winners.len(), 1);
    let rule = &room.rules[&RuleId::from("topline")];
    assert_eq!(rule.claims.len(), 1);
    assert_eq!(rule.claims[0].player_id, player);

    let stored = game.claim_doc(&claim.id);
    assert_eq!(stored.status, ClaimStatus::Approved);
    assert_eq!(stored.coins_awarded, Some(50));
    assert_eq!(stored.reviewed_by, Some(game.admin.clone()));
}

#[tokio::test]
async fn test_claim_with_uncalled_numbers_auto_rejected() {
    let game = new_game(vec![rule("topline", 50, None, 1)]).await;
    let (player, ticket) = game.join_with_ticket("p-bob", "Bob").await;
    game.start().await;

    // Nothing called yet; the claim fails validation but persists.
    let top_row = ticket.grid.row_numbers(0);
    let claim = game
        .claims
        .submit_claim(
            &player,
            &game.code,
            &ticket.id,
            &RuleId::from("topline"),
            top_row,
        )
        .await
        .unwrap();
    assert_eq!(claim.status, ClaimStatus::RejectedAutoInvalid);
    assert!(!claim.auto_valid);
    assert!(claim.reject_reason.is_some());

    // Auto-rejected claims never reach the admin queue.
    let err = game
        .claims
        .approve_claim(&game.admin, &game.code, &claim.id)
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::AlreadyProcessed { .. }));
}

#[tokio::test]
async fn test_duplicate_claim_same_rule_and_ticket_rejected() {
    let game = new_game(vec![rule("topline", 50, None, 2)]).await;
    let (player, ticket) = game.join_with_ticket("p-bob", "Bob").await;
    game.start().await;
    game.call_all(1..=90).await;

    let top_row = ticket.grid.row_numbers(0);
    game.claims
        .submit_claim(
            &player,
            &game.code,
            &ticket.id,
            &RuleId::from("topline"),
            top_row.clone(),
        )
        .await
        .unwrap();

    let err = game
        .claims
        .submit_claim(
            &player,
            &game.code,
            &ticket.id,
            &RuleId::from("topline"),
            top_row,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::AlreadyExists { .. }));
}

#[tokio::test]
async fn test_winner_cap_flips_second_approval() {
    let game = new_game(vec![rule("topline", 50, None, 1)]).await;
    let (bob, bob_ticket) = game.join_with_ticket("p-bob", "Bob").await;
    let (carol, carol_ticket) =
        game.join_with_ticket("p-carol", "Carol").await;
    game.start().await;
    // With the whole board called, every pattern claim validates.
    game.call_all(1..=90).await;

    let first = game
        .claims
        .submit_claim(
            &bob,
            &game.code,
            &bob_ticket.id,
            &RuleId::from("topline"),
            bob_ticket.grid.row_numbers(0),
        )
        .await
        .unwrap();
    let second = game
        .claims
        .submit_claim(
            &carol,
            &game.code,
            &carol_ticket.id,
            &RuleId::from("topline"),
            carol_ticket.grid.row_numbers(0),
        )
        .await
        .unwrap();
    assert_eq!(second.status, ClaimStatus::PendingAdminApproval);

    game.claims
        .approve_claim(&game.admin, &game.code, &first.id)
        .await
        .unwrap();

    // The cap was reached between submission and review: the second
    // claim flips to rejected_admin and the approval errors.
    let err = game
        .claims
        .approve_claim(&game.admin, &game.code, &second.id)
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::FailedPrecondition(_)));

    let flipped = game.claim_doc(&second.id);
    assert_eq!(flipped.status, ClaimStatus::RejectedAdmin);
    assert!(flipped.reject_reason.is_some());

    let room = game.room();
    assert_eq!(room.winners.len(), 1);
    assert_eq!(room.rules[&RuleId::from("topline")].claims.len(), 1);
}

#[tokio::test]
async fn test_percentage_payout_floors_from_pool() {
    let game = new_game(vec![rule("fullhouse", 500, Some(25), 1)]).await;
    let (bob, bob_ticket) = game.join_with_ticket("p-bob", "Bob").await;
    // Two more tickets to grow the pool to 30.
    let (_carol, _t) = game.join_with_ticket("p-carol", "Carol").await;
    let (_dave, _t2) = game.join_with_ticket("p-dave", "Dave").await;
    game.start().await;
    game.call_all(1..=90).await;

    let claim = game
        .claims
        .submit_claim(
            &bob,
            &game.code,
            &bob_ticket.id,
            &RuleId::from("fullhouse"),
            bob_ticket.grid.numbers(),
        )
        .await
        .unwrap();
    let winner = game
        .claims
        .approve_claim(&game.admin, &game.code, &claim.id)
        .await
        .unwrap();

    // floor(30 * 25 / 100) = 7, not the flat 500.
    assert_eq!(winner.coins_awarded, 7);
}

#[tokio::test]
async fn test_unknown_rule_id_not_found() {
    let game = new_game(vec![rule("topline", 50, None, 1)]).await;
    let (bob, ticket) = game.join_with_ticket("p-bob", "Bob").await;
    game.start().await;

    let err = game
        .claims
        .submit_claim(
            &bob,
            &game.code,
            &ticket.id,
            &RuleId::from("jackpot"),
            vec![1, 2, 3],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::NotFound { what: "rule", .. }));
}

#[tokio::test]
async fn test_claims_closed_while_idle_and_stopped() {
    let game = new_game(vec![rule("topline", 50, None, 1)]).await;
    let (bob, ticket) = game.join_with_ticket("p-bob", "Bob").await;

    // Idle: the game never started.
    let err = game
        .claims
        .submit_claim(
            &bob,
            &game.code,
            &ticket.id,
            &RuleId::from("topline"),
            ticket.grid.row_numbers(0),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::FailedPrecondition(_)));

    game.start().await;
    game.rooms
        .set_lifecycle(&game.admin, &game.code, LifecycleAction::Stop)
        .await
        .unwrap();
    let err = game
        .claims
        .submit_claim(
            &bob,
            &game.code,
            &ticket.id,
            &RuleId::from("topline"),
            ticket.grid.row_numbers(0),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::FailedPrecondition(_)));
}

#[tokio::test]
async fn test_claims_open_while_paused() {
    let game = new_game(vec![rule("topline", 50, None, 1)]).await;
    let (bob, ticket) = game.join_with_ticket("p-bob", "Bob").await;
    game.start().await;
    let top_row = ticket.grid.row_numbers(0);
    game.call_all(top_row.iter().copied()).await;

    game.rooms
        .set_lifecycle(&game.admin, &game.code, LifecycleAction::Pause)
        .await
        .unwrap();

    let claim = game
        .claims
        .submit_claim(
            &bob,
            &game.code,
            &ticket.id,
            &RuleId::from("topline"),
            top_row,
        )
        .await
        .unwrap();
    assert_eq!(claim.status, ClaimStatus::PendingAdminApproval);
}

#[tokio::test]
async fn test_reject_claim_requires_reason_and_is_terminal() {
    let game = new_game(vec![rule("topline", 50, None, 1)]).await;
    let (bob, ticket) = game.join_with_ticket("p-bob", "Bob").await;
    game.start().await;
    let top_row = ticket.grid.row_numbers(0);
    game.call_all(top_row.iter().copied()).await;

    let claim = game
        .claims
        .submit_claim(
            &bob,
            &game.code,
            &ticket.id,
            &RuleId::from("topline"),
            top_row,
        )
        .await
        .unwrap();

    let err = game
        .claims
        .reject_claim(&game.admin, &game.code, &claim.id, "  ")
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::InvalidArgument(_)));

    game.claims
        .reject_claim(&game.admin, &game.code, &claim.id, "miscounted")
        .await
        .unwrap();
    let stored = game.claim_doc(&claim.id);
    assert_eq!(stored.status, ClaimStatus::RejectedAdmin);
    assert_eq!(stored.reject_reason.as_deref(), Some("miscounted"));

    let err = game
        .claims
        .reject_claim(&game.admin, &game.code, &claim.id, "again")
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::AlreadyProcessed { .. }));
}

#[tokio::test]
async fn test_stop_summary_reflects_whole_game() {
    let game = new_game(vec![rule("topline", 50, None, 1)]).await;
    let (bob, ticket) = game.join_with_ticket("p-bob", "Bob").await;
    game.start().await;
    let top_row = ticket.grid.row_numbers(0);
    game.call_all(top_row.iter().copied()).await;

    let claim = game
        .claims
        .submit_claim(
            &bob,
            &game.code,
            &ticket.id,
            &RuleId::from("topline"),
            top_row.clone(),
        )
        .await
        .unwrap();
    game.claims
        .approve_claim(&game.admin, &game.code, &claim.id)
        .await
        .unwrap();

    let (status, summary) = game
        .rooms
        .set_lifecycle(&game.admin, &game.code, LifecycleAction::Stop)
        .await
        .unwrap();
    assert_eq!(status, GameStatus::Stopped);
    let summary = summary.unwrap();
    assert_eq!(summary.numbers_called, top_row.len());
    assert_eq!(summary.winners.len(), 1);
    assert_eq!(summary.player_count, 2);
    assert_eq!(summary.money_collected, 10);
}
