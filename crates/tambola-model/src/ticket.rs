//! The 3×9 Tambola ticket grid and its generator.
//!
//! A valid ticket has exactly 15 numbers: 5 per row, 1–3 per column,
//! each column drawing only from its reserved band (column 0 → 1–9,
//! column 8 → 80–90, column j → 10j–10j+9 otherwise), all numbers
//! distinct, and column values ascending by row. The generator never
//! returns a grid violating any of these — it re-validates the finished
//! grid and fails loudly instead.

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Rows on a ticket.
pub const TICKET_ROWS: usize = 3;
/// Columns on a ticket.
pub const TICKET_COLS: usize = 9;
/// Numbers on a ticket.
pub const NUMBERS_PER_TICKET: usize = 15;
/// Numbers on each row.
pub const NUMBERS_PER_ROW: usize = 5;

/// Full-regeneration budget before giving up.
const MAX_GENERATION_ATTEMPTS: u32 = 50;

/// No valid ticket could be produced within the retry budget, or a
/// finished grid failed invariant validation.
#[derive(Debug, thiserror::Error)]
#[error("ticket generation failed: {0}")]
pub struct GenerationFailure(pub String);

// ---------------------------------------------------------------------------
// TicketGrid
// ---------------------------------------------------------------------------

/// A 3×9 grid of optional numbers. `None` cells are blanks.
///
/// Immutable once generated — tickets never change after issuance; only
/// the owner's informational `marked` set (stored on the ticket record,
/// not here) is mutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketGrid(pub [[Option<u8>; TICKET_COLS]; TICKET_ROWS]);

impl TicketGrid {
    /// Generates a fresh valid ticket.
    ///
    /// # Errors
    /// Returns [`GenerationFailure`] if no valid grid was produced within
    /// the retry budget. A malformed grid is never returned.
    pub fn generate() -> Result<Self, GenerationFailure> {
        let mut rng = rand::rng();
        for _ in 0..MAX_GENERATION_ATTEMPTS {
            if let Some(grid) = try_generate(&mut rng) {
                grid.validate().map_err(GenerationFailure)?;
                return Ok(grid);
            }
        }
        Err(GenerationFailure(format!(
            "no valid placement in {MAX_GENERATION_ATTEMPTS} attempts"
        )))
    }

    /// The number at `(row, col)`, if any.
    pub fn cell(&self, row: usize, col: usize) -> Option<u8> {
        self.0[row][col]
    }

    /// The non-blank numbers of one row, left to right.
    pub fn row_numbers(&self, row: usize) -> Vec<u8> {
        self.0[row].iter().flatten().copied().collect()
    }

    /// All 15 numbers on the ticket.
    pub fn numbers(&self) -> Vec<u8> {
        self.0
            .iter()
            .flat_map(|row| row.iter().flatten().copied())
            .collect()
    }

    /// Returns `true` if `n` appears anywhere on the ticket.
    pub fn contains(&self, n: u8) -> bool {
        self.0.iter().any(|row| row.contains(&Some(n)))
    }

    /// The corner numbers: the outermost numbers at both ends of the top
    /// and bottom rows, deduplicated. A row with fewer than two numbers
    /// degenerates its pair to a single corner (rows always have five on
    /// a generated ticket, but claims are checked against the data, not
    /// the generator).
    pub fn corners(&self) -> Vec<u8> {
        let mut corners = Vec::with_capacity(4);
        for row in [0, TICKET_ROWS - 1] {
            let nums = self.row_numbers(row);
            if let Some(&first) = nums.first() {
                if !corners.contains(&first) {
                    corners.push(first);
                }
            }
            if let Some(&last) = nums.last() {
                if !corners.contains(&last) {
                    corners.push(last);
                }
            }
        }
        corners
    }

    /// Checks every grid invariant, returning a description of the first
    /// violation found.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = [false; 91];
        let mut total = 0usize;

        for (r, row) in self.0.iter().enumerate() {
            let filled = row.iter().flatten().count();
            if filled != NUMBERS_PER_ROW {
                return Err(format!(
                    "row {r} has {filled} numbers, expected {NUMBERS_PER_ROW}"
                ));
            }
            total += filled;
        }
        if total != NUMBERS_PER_TICKET {
            return Err(format!(
                "{total} numbers on ticket, expected {NUMBERS_PER_TICKET}"
            ));
        }

        for col in 0..TICKET_COLS {
            let band = column_band(col);
            let mut count = 0usize;
            let mut prev: Option<u8> = None;
            for row in 0..TICKET_ROWS {
                let Some(n) = self.0[row][col] else { continue };
                count += 1;
                if !band.contains(&n) {
                    return Err(format!(
                        "column {col} holds {n}, outside band {band:?}"
                    ));
                }
                if seen[n as usize] {
                    return Err(format!("number {n} appears twice"));
                }
                seen[n as usize] = true;
                if let Some(p) = prev {
                    if n <= p {
                        return Err(format!(
                            "column {col} not ascending: {p} then {n}"
                        ));
                    }
                }
                prev = Some(n);
            }
            if count == 0 || count > 3 {
                return Err(format!(
                    "column {col} has {count} numbers, expected 1-3"
                ));
            }
        }
        Ok(())
    }
}

/// The inclusive numeric band reserved for a column.
pub fn column_band(col: usize) -> std::ops::RangeInclusive<u8> {
    match col {
        0 => 1..=9,
        8 => 80..=90,
        j => {
            let lo = (10 * j) as u8;
            lo..=lo + 9
        }
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// One generation attempt: pick per-column counts, place them onto rows,
/// then fill with band numbers. Returns `None` if placement got stuck.
fn try_generate(rng: &mut impl Rng) -> Option<TicketGrid> {
    let counts = column_counts(rng);
    let occupancy = place_rows(rng, &counts)?;

    let mut grid = [[None; TICKET_COLS]; TICKET_ROWS];
    for col in 0..TICKET_COLS {
        let band = column_band(col);
        let mut pool: Vec<u8> = band.collect();
        pool.shuffle(rng);
        let mut picked: Vec<u8> =
            pool.into_iter().take(counts[col] as usize).collect();
        picked.sort_unstable();

        // Occupied rows in ascending row order receive ascending values.
        let mut values = picked.into_iter();
        for row in 0..TICKET_ROWS {
            if occupancy[row][col] {
                grid[row][col] = values.next();
            }
        }
    }
    Some(TicketGrid(grid))
}

/// Draws per-column number counts: each column 1–3, summing to 15.
/// Starts every column at 1 and spreads the remaining 6 randomly.
fn column_counts(rng: &mut impl Rng) -> [u8; TICKET_COLS] {
    let mut counts = [1u8; TICKET_COLS];
    let mut remaining = NUMBERS_PER_TICKET - TICKET_COLS;
    while remaining > 0 {
        let col = rng.random_range(0..TICKET_COLS);
        if counts[col] < 3 {
            counts[col] += 1;
            remaining -= 1;
        }
    }
    counts
}

/// Assigns each column's numbers to rows so every row ends up with
/// exactly five. Greedy: fattest columns first, preferring the rows with
/// the most capacity left (random tie-break). Returns `None` if a row
/// would overflow — the caller regenerates from scratch.
fn place_rows(
    rng: &mut impl Rng,
    counts: &[u8; TICKET_COLS],
) -> Option<[[bool; TICKET_COLS]; TICKET_ROWS]> {
    let mut occupancy = [[false; TICKET_COLS]; TICKET_ROWS];
    let mut capacity = [NUMBERS_PER_ROW as i32; TICKET_ROWS];

    let mut order: Vec<usize> = (0..TICKET_COLS).collect();
    order.shuffle(rng);
    order.sort_by_key(|&c| std::cmp::Reverse(counts[c]));

    for &col in &order {
        let mut rows: Vec<usize> = (0..TICKET_ROWS).collect();
        rows.shuffle(rng);
        rows.sort_by_key(|&r| std::cmp::Reverse(capacity[r]));

        for &row in rows.iter().take(counts[col] as usize) {
            if capacity[row] == 0 {
                return None;
            }
            occupancy[row][col] = true;
            capacity[row] -= 1;
        }
    }

    capacity.iter().all(|&c| c == 0).then_some(occupancy)
}
