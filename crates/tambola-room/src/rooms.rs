//! Room lifecycle: creation, configuration, membership, and the
//! start/pause/resume/stop state machine.

use tambola_model::{
    CallingMode, GameStatus, GameSummary, LifecycleAction, PlayerId,
    PlayerPresence, PrizeRule, PrizeRuleConfig, Room, RoomCode,
    validate_rule_configs, MAX_AUTO_CALL_SECS, MIN_AUTO_CALL_SECS,
};
use tambola_store::DocStore;

use crate::docs::{load_room, new_room_code, now_ms, ROOMS};
use crate::GameError;

/// Everything an admin supplies to open a room.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub name: String,
    pub rules: Vec<PrizeRuleConfig>,
    pub ticket_price: u64,
    pub max_tickets_per_player: u32,
    pub calling_mode: CallingMode,
    pub auto_call_interval_secs: u64,
}

/// A partial reconfiguration; `None` fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct RoomConfigPatch {
    pub name: Option<String>,
    pub rules: Option<Vec<PrizeRuleConfig>>,
    pub ticket_price: Option<u64>,
    pub max_tickets_per_player: Option<u32>,
    pub calling_mode: Option<CallingMode>,
    pub auto_call_interval_secs: Option<u64>,
}

/// Room lifecycle and membership operations.
///
/// Cheap to clone; all clones share the underlying store.
#[derive(Clone)]
pub struct RoomService {
    store: DocStore,
}

impl RoomService {
    pub fn new(store: DocStore) -> Self {
        Self { store }
    }

    /// Opens a new room with the caller as admin. The admin joins as a
    /// player immediately so they appear in presence lists.
    pub async fn create_room(
        &self,
        admin: &PlayerId,
        admin_name: &str,
        config: RoomConfig,
    ) -> Result<RoomCode, GameError> {
        validate_config(&config)?;

        let code = self
            .store
            .in_transaction(|txn| {
                // Codes are short, so collisions are possible; the
                // absent-key read makes a collision a commit conflict
                // instead of an overwrite.
                let mut code = new_room_code();
                while txn.exists(ROOMS, code.as_str()) {
                    code = new_room_code();
                }

                let now = now_ms();
                let mut room = Room {
                    code: code.clone(),
                    admin: admin.clone(),
                    name: config.name.clone(),
                    status: GameStatus::Idle,
                    called_numbers: Vec::new(),
                    latest_called: None,
                    players: Default::default(),
                    rules: config
                        .rules
                        .iter()
                        .cloned()
                        .map(|c| (c.id.clone(), PrizeRule::from_config(c)))
                        .collect(),
                    winners: Vec::new(),
                    money_collected: 0,
                    ticket_price: config.ticket_price,
                    max_tickets_per_player: config.max_tickets_per_player,
                    calling_mode: config.calling_mode,
                    auto_call_interval_secs: config.auto_call_interval_secs,
                    created_at: now,
                    started_at: None,
                    ended_at: None,
                    last_call_at: None,
                    summary: None,
                };
                room.players.insert(
                    admin.clone(),
                    PlayerPresence {
                        name: admin_name.to_string(),
                        ticket_count: 0,
                        last_seen: now,
                        online: true,
                    },
                );

                txn.put(ROOMS, code.as_str(), &room)?;
                Ok::<_, GameError>(code)
            })
            .await?;

        tracing::info!(%code, admin = %admin, "room created");
        Ok(code)
    }

    /// Reconfigures an idle room. Rules are rebuilt from the new
    /// configs; a room that has started (even if now stopped) keeps its
    /// configuration until a new game is set up.
    pub async fn update_config(
        &self,
        admin: &PlayerId,
        code: &RoomCode,
        patch: RoomConfigPatch,
    ) -> Result<(), GameError> {
        if let Some(rules) = &patch.rules {
            validate_rule_configs(rules)
                .map_err(GameError::InvalidArgument)?;
        }
        if let Some(interval) = patch.auto_call_interval_secs {
            validate_interval(interval)?;
        }
        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                return Err(GameError::InvalidArgument(
                    "room name must not be empty".into(),
                ));
            }
        }
        if patch.max_tickets_per_player == Some(0) {
            return Err(GameError::InvalidArgument(
                "max tickets per player must be at least 1".into(),
            ));
        }

        self.store
            .in_transaction(|txn| {
                let mut room = load_room(txn, code)?;
                require_admin(&room, admin)?;
                if room.status != GameStatus::Idle {
                    return Err(GameError::FailedPrecondition(format!(
                        "room {code} is {}, configuration changes \
                         require idle",
                        room.status
                    )));
                }

                if let Some(name) = patch.name.clone() {
                    room.name = name;
                }
                if let Some(rules) = patch.rules.clone() {
                    room.rules = rules
                        .into_iter()
                        .map(|c| (c.id.clone(), PrizeRule::from_config(c)))
                        .collect();
                }
                if let Some(price) = patch.ticket_price {
                    room.ticket_price = price;
                }
                if let Some(max) = patch.max_tickets_per_player {
                    room.max_tickets_per_player = max;
                }
                if let Some(mode) = patch.calling_mode {
                    room.calling_mode = mode;
                }
                if let Some(interval) = patch.auto_call_interval_secs {
                    room.auto_call_interval_secs = interval;
                }

                txn.put(ROOMS, code.as_str(), &room)?;
                Ok(())
            })
            .await?;

        tracing::info!(%code, "room reconfigured");
        Ok(())
    }

    /// Adds the player to the room, or refreshes their presence if they
    /// already joined (rejoin after disconnect is not an error).
    /// Returns a snapshot of the room as of the join.
    pub async fn join_room(
        &self,
        player: &PlayerId,
        code: &RoomCode,
        display_name: &str,
    ) -> Result<Room, GameError> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(GameError::InvalidArgument(
                "display name must not be empty".into(),
            ));
        }

        let room = self
            .store
            .in_transaction(|txn| {
                let mut room = load_room(txn, code)?;
                let now = now_ms();
                room.players
                    .entry(player.clone())
                    .and_modify(|p| {
                        p.name = display_name.to_string();
                        p.last_seen = now;
                        p.online = true;
                    })
                    .or_insert_with(|| PlayerPresence {
                        name: display_name.to_string(),
                        ticket_count: 0,
                        last_seen: now,
                        online: true,
                    });
                txn.put(ROOMS, code.as_str(), &room)?;
                Ok::<_, GameError>(room)
            })
            .await?;

        tracing::debug!(%code, player = %player, "player joined room");
        Ok(room)
    }

    /// A point-in-time snapshot of the room, for re-sync. No version
    /// tracking; mutations never go through this path.
    pub fn get_room(&self, code: &RoomCode) -> Result<Room, GameError> {
        self.store
            .peek::<Room>(ROOMS, code.as_str())?
            .ok_or_else(|| GameError::NotFound {
                what: "room",
                id: code.to_string(),
            })
    }

    /// Drives the lifecycle state machine. Returns the new status plus,
    /// on stop, the archived game summary.
    pub async fn set_lifecycle(
        &self,
        admin: &PlayerId,
        code: &RoomCode,
        action: LifecycleAction,
    ) -> Result<(GameStatus, Option<GameSummary>), GameError> {
        let (status, summary) = self
            .store
            .in_transaction(|txn| {
                let mut room = load_room(txn, code)?;
                require_admin(&room, admin)?;

                let next = room.status.apply(action).ok_or(
                    GameError::InvalidTransition {
                        action: action_name(action),
                        current: status_name(room.status),
                        required: GameStatus::required_for(action),
                    },
                )?;

                let now = now_ms();
                let mut summary = None;
                match action {
                    LifecycleAction::Start => {
                        room.reset_for_new_game(now);
                    }
                    LifecycleAction::Pause => {
                        // Auto-calling must not fire into a paused game.
                        room.calling_mode = CallingMode::Manual;
                    }
                    LifecycleAction::Resume => {}
                    LifecycleAction::Stop => {
                        summary = Some(stop_in_place(&mut room, now));
                    }
                }
                room.status = next;

                txn.put(ROOMS, code.as_str(), &room)?;
                Ok::<_, GameError>((next, summary))
            })
            .await?;

        tracing::info!(%code, %action, %status, "lifecycle transition");
        Ok((status, summary))
    }

    /// Refreshes a player's presence timestamp. Presence is advisory,
    /// so failures are logged and swallowed rather than surfaced.
    pub async fn touch_presence(
        &self,
        player: &PlayerId,
        code: &RoomCode,
    ) {
        let result = self
            .store
            .in_transaction(|txn| {
                let mut room = load_room(txn, code)?;
                if let Some(presence) = room.players.get_mut(player) {
                    presence.last_seen = now_ms();
                    presence.online = true;
                    txn.put(ROOMS, code.as_str(), &room)?;
                }
                Ok::<_, GameError>(())
            })
            .await;

        if let Err(e) = result {
            tracing::warn!(
                %code,
                player = %player,
                error = %e,
                "presence refresh failed"
            );
        }
    }

    /// Marks a player offline (connection dropped). Soft-fails like
    /// [`touch_presence`](Self::touch_presence).
    pub async fn mark_offline(&self, player: &PlayerId, code: &RoomCode) {
        let result = self
            .store
            .in_transaction(|txn| {
                let mut room = load_room(txn, code)?;
                if let Some(presence) = room.players.get_mut(player) {
                    presence.online = false;
                    presence.last_seen = now_ms();
                    txn.put(ROOMS, code.as_str(), &room)?;
                }
                Ok::<_, GameError>(())
            })
            .await;

        if let Err(e) = result {
            tracing::warn!(
                %code,
                player = %player,
                error = %e,
                "offline mark failed"
            );
        }
    }
}

/// Applies the stop effects in place: archive the summary, stamp the
/// end time, force manual calling. The caller persists the room.
pub(crate) fn stop_in_place(room: &mut Room, now: u64) -> GameSummary {
    let snapshot = room.snapshot_summary(now);
    room.status = GameStatus::Stopped;
    room.ended_at = Some(now);
    room.calling_mode = CallingMode::Manual;
    room.summary = Some(snapshot.clone());
    snapshot
}

pub(crate) fn require_admin(
    room: &Room,
    caller: &PlayerId,
) -> Result<(), GameError> {
    if &room.admin != caller {
        return Err(GameError::PermissionDenied(format!(
            "only the admin of room {} may do this",
            room.code
        )));
    }
    Ok(())
}

fn validate_config(config: &RoomConfig) -> Result<(), GameError> {
    if config.name.trim().is_empty() {
        return Err(GameError::InvalidArgument(
            "room name must not be empty".into(),
        ));
    }
    if config.max_tickets_per_player == 0 {
        return Err(GameError::InvalidArgument(
            "max tickets per player must be at least 1".into(),
        ));
    }
    validate_rule_configs(&config.rules)
        .map_err(GameError::InvalidArgument)?;
    validate_interval(config.auto_call_interval_secs)
}

fn validate_interval(secs: u64) -> Result<(), GameError> {
    if !(MIN_AUTO_CALL_SECS..=MAX_AUTO_CALL_SECS).contains(&secs) {
        return Err(GameError::InvalidArgument(format!(
            "auto-call interval {secs}s outside \
             {MIN_AUTO_CALL_SECS}-{MAX_AUTO_CALL_SECS}s"
        )));
    }
    Ok(())
}

fn action_name(action: LifecycleAction) -> &'static str {
    match action {
        LifecycleAction::Start => "start",
        LifecycleAction::Pause => "pause",
        LifecycleAction::Resume => "resume",
        LifecycleAction::Stop => "stop",
    }
}

fn status_name(status: GameStatus) -> &'static str {
    match status {
        GameStatus::Idle => "idle",
        GameStatus::Running => "running",
        GameStatus::Paused => "paused",
        GameStatus::Stopped => "stopped",
    }
}
