//! The room document and its embedded records.
//!
//! A room is the single source of truth for one game: status, called
//! numbers, players, prize rules, winners, and money collected all live
//! on one document so every mutation is one atomic read-modify-write.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::{ClaimId, GameStatus, PlayerId, RoomCode, RuleId, TicketId};

/// Lower bound for the auto-call interval, seconds.
pub const MIN_AUTO_CALL_SECS: u64 = 2;
/// Upper bound for the auto-call interval, seconds.
pub const MAX_AUTO_CALL_SECS: u64 = 300;

/// How the next number gets picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallingMode {
    /// The admin calls each number explicitly.
    Manual,
    /// A scheduler draws numbers on the configured interval.
    Auto,
}

// ---------------------------------------------------------------------------
// Prize rules
// ---------------------------------------------------------------------------

/// Admin-supplied configuration for one prize rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeRuleConfig {
    pub id: RuleId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub active: bool,
    /// Flat payout in coins, used when no percentage is configured or
    /// the pool is empty.
    pub coins_per_prize: u64,
    /// Payout as a percentage of total money collected (0–100).
    pub percentage_of_pool: Option<u8>,
    /// Winner cap for this rule.
    pub max_prizes: u32,
}

/// A reference to an approved claim, recorded on the winning rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRef {
    pub claim_id: ClaimId,
    pub player_id: PlayerId,
    pub ticket_id: TicketId,
}

/// A configured prize rule plus its recorded winners.
///
/// Invariant: `claims.len() <= max_prizes as usize`. Approvals that
/// would exceed the cap are rejected, never truncated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeRule {
    pub id: RuleId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub active: bool,
    pub coins_per_prize: u64,
    pub percentage_of_pool: Option<u8>,
    pub max_prizes: u32,
    pub claims: Vec<ClaimRef>,
}

impl PrizeRule {
    /// Builds a fresh rule (no claims yet) from its configuration.
    pub fn from_config(config: PrizeRuleConfig) -> Self {
        Self {
            id: config.id,
            name: config.name,
            description: config.description,
            active: config.active,
            coins_per_prize: config.coins_per_prize,
            percentage_of_pool: config.percentage_of_pool,
            max_prizes: config.max_prizes,
            claims: Vec::new(),
        }
    }

    /// Whether another winner can still be recorded.
    pub fn has_capacity(&self) -> bool {
        self.claims.len() < self.max_prizes as usize
    }

    /// The coins a new winner of this rule receives, given the room's
    /// total money collected. Percentage payouts floor to whole coins;
    /// with an empty pool the flat amount applies.
    pub fn payout(&self, money_collected: u64) -> u64 {
        match self.percentage_of_pool {
            Some(pct) if money_collected > 0 => {
                money_collected * u64::from(pct) / 100
            }
            _ => self.coins_per_prize,
        }
    }
}

/// Validates a rule list for room creation or reconfiguration.
///
/// Checks per-rule bounds and the room-wide invariant that active
/// percentage payouts sum to at most 100.
pub fn validate_rule_configs(
    configs: &[PrizeRuleConfig],
) -> Result<(), String> {
    let mut seen: Vec<&RuleId> = Vec::with_capacity(configs.len());
    let mut pct_total: u32 = 0;

    for config in configs {
        if config.id.as_str().is_empty() {
            return Err("rule id must not be empty".to_string());
        }
        if seen.contains(&&config.id) {
            return Err(format!("duplicate rule id '{}'", config.id));
        }
        seen.push(&config.id);

        if config.max_prizes == 0 {
            return Err(format!(
                "rule '{}' must allow at least one winner",
                config.id
            ));
        }
        if let Some(pct) = config.percentage_of_pool {
            if pct > 100 {
                return Err(format!(
                    "rule '{}' percentage {pct} exceeds 100",
                    config.id
                ));
            }
            if config.active {
                pct_total += u32::from(pct);
            }
        }
    }

    if pct_total > 100 {
        return Err(format!(
            "active rule percentages sum to {pct_total}, exceeding 100"
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Players and winners
// ---------------------------------------------------------------------------

/// A player's standing within a room. Created on join, never deleted
/// while the room lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerPresence {
    pub name: String,
    pub ticket_count: u32,
    pub last_seen: u64,
    pub online: bool,
}

/// A winner entry, denormalized onto the room when a claim is approved.
/// Append-only during a game; cleared when a new game starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    pub claim_id: ClaimId,
    pub player_id: PlayerId,
    pub player_name: String,
    pub ticket_id: TicketId,
    pub rule_id: RuleId,
    pub prize_name: String,
    pub coins_awarded: u64,
    pub won_at: u64,
}

/// The archived snapshot computed when a game stops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSummary {
    pub numbers_called: usize,
    pub winners: Vec<Winner>,
    pub player_count: usize,
    pub money_collected: u64,
    pub elapsed_secs: u64,
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// One game room. The whole struct is a single store document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub code: RoomCode,
    pub admin: PlayerId,
    pub name: String,
    pub status: GameStatus,
    /// Numbers called this game, in call order. Set semantics: no
    /// duplicates, every value in 1–90, at most 90 entries.
    pub called_numbers: Vec<u8>,
    pub latest_called: Option<u8>,
    pub players: HashMap<PlayerId, PlayerPresence>,
    /// Rules keyed by id. BTreeMap keeps snapshots deterministic.
    pub rules: BTreeMap<RuleId, PrizeRule>,
    pub winners: Vec<Winner>,
    pub money_collected: u64,
    pub ticket_price: u64,
    pub max_tickets_per_player: u32,
    pub calling_mode: CallingMode,
    pub auto_call_interval_secs: u64,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub ended_at: Option<u64>,
    /// Millis timestamp of the most recent call, manual or auto.
    pub last_call_at: Option<u64>,
    pub summary: Option<GameSummary>,
}

impl Room {
    /// Looks up a rule by id.
    pub fn rule(&self, id: &RuleId) -> Option<&PrizeRule> {
        self.rules.get(id)
    }

    /// Whether `n` has already been called this game.
    pub fn has_called(&self, n: u8) -> bool {
        self.called_numbers.contains(&n)
    }

    /// The uncalled complement of 1–90.
    pub fn uncalled_numbers(&self) -> Vec<u8> {
        (1..=90).filter(|n| !self.has_called(*n)).collect()
    }

    /// Clears per-game state for a fresh start in the same room.
    /// Player presences, rule configurations, and money collected
    /// survive; called numbers, winners, rule claims, and the old
    /// summary do not.
    pub fn reset_for_new_game(&mut self, now: u64) {
        self.called_numbers.clear();
        self.latest_called = None;
        self.winners.clear();
        for rule in self.rules.values_mut() {
            rule.claims.clear();
        }
        self.summary = None;
        self.started_at = Some(now);
        self.ended_at = None;
        self.last_call_at = None;
    }

    /// Computes the archival snapshot for a stopping game.
    pub fn snapshot_summary(&self, now: u64) -> GameSummary {
        let elapsed_secs = self
            .started_at
            .map(|t| now.saturating_sub(t) / 1000)
            .unwrap_or(0);
        GameSummary {
            numbers_called: self.called_numbers.len(),
            winners: self.winners.clone(),
            player_count: self.players.len(),
            money_collected: self.money_collected,
            elapsed_secs,
        }
    }
}
