//! Prize-pattern evaluation.
//!
//! The engine is pure: it looks only at the ticket grid, the numbers the
//! player claims, the numbers actually called, and the rule identifier.
//! It never trusts a player's marked set — "effectively claimed" is
//! recomputed here from authoritative data on every evaluation.
//!
//! Pattern dispatch is by canonical rule id, never by free-text name
//! matching: `"Line 1"`, `"line1"` and `"topline"` all resolve to the
//! same pattern, and an id that resolves to nothing is a hard failure.

use serde::{Deserialize, Serialize};

use crate::ticket::{TICKET_ROWS, TicketGrid};

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

/// The winning patterns the coordinator knows how to adjudicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrizePattern {
    /// Any five called numbers on the ticket.
    EarlyFive,
    /// Every number of the top row.
    TopLine,
    /// Every number of the middle row.
    MiddleLine,
    /// Every number of the bottom row.
    BottomLine,
    /// The outermost numbers of the top and bottom rows.
    FourCorners,
    /// Every number on the ticket.
    FullHouse,
}

impl PrizePattern {
    /// Resolves a rule identifier to a pattern.
    ///
    /// The id is canonicalized first (lowercased, everything but letters
    /// and digits stripped), then matched against the known synonym set.
    pub fn resolve(rule_id: &str) -> Option<Self> {
        let canonical: String = rule_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match canonical.as_str() {
            "earlyfive" | "early5" | "fastfive" | "fast5" | "first5"
            | "firstfive" => Some(Self::EarlyFive),
            "topline" | "firstline" | "line1" | "toprow" => {
                Some(Self::TopLine)
            }
            "middleline" | "secondline" | "line2" | "middlerow" => {
                Some(Self::MiddleLine)
            }
            "bottomline" | "lastline" | "thirdline" | "line3"
            | "bottomrow" => Some(Self::BottomLine),
            "corners" | "fourcorners" | "4corners" => {
                Some(Self::FourCorners)
            }
            "fullhouse" | "fullhousie" | "housie" | "housefull" => {
                Some(Self::FullHouse)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for PrizePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EarlyFive => write!(f, "early five"),
            Self::TopLine => write!(f, "top line"),
            Self::MiddleLine => write!(f, "middle line"),
            Self::BottomLine => write!(f, "bottom line"),
            Self::FourCorners => write!(f, "four corners"),
            Self::FullHouse => write!(f, "full house"),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Why an evaluation judged a claim invalid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ClaimFault {
    /// The rule id does not resolve to any known pattern.
    UnknownRule { rule_id: String },
    /// A claimed number has not been called yet.
    NumberNotCalled { number: u8 },
    /// A claimed number is not on the ticket.
    NumberNotOnTicket { number: u8 },
    /// The effectively claimed set does not complete the pattern.
    PatternIncomplete { missing: Vec<u8> },
    /// Fewer effectively claimed numbers than the pattern needs.
    NotEnoughNumbers { have: usize, need: usize },
}

impl std::fmt::Display for ClaimFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownRule { rule_id } => {
                write!(f, "unknown rule '{rule_id}'")
            }
            Self::NumberNotCalled { number } => {
                write!(f, "number {number} has not been called")
            }
            Self::NumberNotOnTicket { number } => {
                write!(f, "number {number} is not on the ticket")
            }
            Self::PatternIncomplete { missing } => {
                write!(f, "pattern incomplete, missing {missing:?}")
            }
            Self::NotEnoughNumbers { have, need } => {
                write!(f, "only {have} numbers claimed, pattern needs {need}")
            }
        }
    }
}

/// The outcome of evaluating one claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// Whether the claim satisfies the pattern.
    pub valid: bool,
    /// Claimed numbers that are both on the ticket and already called.
    pub effectively_claimed: Vec<u8>,
    /// Populated when `valid` is false.
    pub fault: Option<ClaimFault>,
}

impl Evaluation {
    fn invalid(effectively_claimed: Vec<u8>, fault: ClaimFault) -> Self {
        Self {
            valid: false,
            effectively_claimed,
            fault: Some(fault),
        }
    }

    fn valid(effectively_claimed: Vec<u8>) -> Self {
        Self {
            valid: true,
            effectively_claimed,
            fault: None,
        }
    }
}

/// Evaluates whether `claimed` legitimately completes the pattern named
/// by `rule_id`, given the ticket and the numbers called so far.
///
/// Preconditions short-circuit in order: the rule must resolve, every
/// claimed number must have been called, and every claimed number must
/// be on the ticket. Only then is the pattern itself checked against the
/// effectively-claimed set.
pub fn evaluate(
    grid: &TicketGrid,
    claimed: &[u8],
    called: &[u8],
    rule_id: &str,
) -> Evaluation {
    let Some(pattern) = PrizePattern::resolve(rule_id) else {
        return Evaluation::invalid(
            Vec::new(),
            ClaimFault::UnknownRule {
                rule_id: rule_id.to_string(),
            },
        );
    };

    for &n in claimed {
        if !called.contains(&n) {
            return Evaluation::invalid(
                Vec::new(),
                ClaimFault::NumberNotCalled { number: n },
            );
        }
    }
    for &n in claimed {
        if !grid.contains(n) {
            return Evaluation::invalid(
                Vec::new(),
                ClaimFault::NumberNotOnTicket { number: n },
            );
        }
    }

    // Claimed ∩ called ∩ ticket, deduplicated, original claim order.
    let mut effective: Vec<u8> = Vec::with_capacity(claimed.len());
    for &n in claimed {
        if !effective.contains(&n) {
            effective.push(n);
        }
    }

    let fault = match pattern {
        PrizePattern::EarlyFive => {
            if effective.len() >= 5 {
                None
            } else {
                Some(ClaimFault::NotEnoughNumbers {
                    have: effective.len(),
                    need: 5,
                })
            }
        }
        PrizePattern::TopLine => covers(&effective, grid.row_numbers(0)),
        PrizePattern::MiddleLine => covers(&effective, grid.row_numbers(1)),
        PrizePattern::BottomLine => {
            covers(&effective, grid.row_numbers(TICKET_ROWS - 1))
        }
        PrizePattern::FourCorners => covers(&effective, grid.corners()),
        PrizePattern::FullHouse => covers(&effective, grid.numbers()),
    };

    match fault {
        None => Evaluation::valid(effective),
        Some(fault) => Evaluation::invalid(effective, fault),
    }
}

/// Checks that every number of `target` is effectively claimed.
fn covers(effective: &[u8], target: Vec<u8>) -> Option<ClaimFault> {
    let missing: Vec<u8> = target
        .iter()
        .copied()
        .filter(|n| !effective.contains(n))
        .collect();
    if missing.is_empty() {
        None
    } else {
        Some(ClaimFault::PatternIncomplete { missing })
    }
}
