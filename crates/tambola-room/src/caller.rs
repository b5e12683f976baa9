//! Number calling: manual admin calls and the scheduled auto-call tick.

use rand::Rng;
use tambola_model::{CallingMode, GameStatus, PlayerId, Room, RoomCode};
use tambola_store::DocStore;

use crate::docs::{load_room, now_ms, ROOMS};
use crate::rooms::{require_admin, stop_in_place};
use crate::GameError;

/// A successfully called number and the running total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalledNumber {
    pub number: u8,
    pub called_count: usize,
}

/// What one auto-call tick did for one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoCall {
    /// A number was drawn and recorded.
    Called(CalledNumber),
    /// Nothing to do: not running, not in auto mode, or the interval
    /// has not elapsed. Never an error.
    Skipped,
    /// All 90 numbers were already called; the room was stopped.
    Exhausted,
}

enum CallAttempt {
    Called(CalledNumber),
    Exhausted,
}

/// Draws numbers and appends them to room state transactionally.
#[derive(Clone)]
pub struct NumberCaller {
    store: DocStore,
}

impl NumberCaller {
    pub fn new(store: DocStore) -> Self {
        Self { store }
    }

    /// Calls a number in a running game: the given one, or a uniform
    /// draw from the uncalled complement if `manual` is `None`.
    ///
    /// When every number has been called, the room is stopped (summary
    /// archived) and the call fails with
    /// [`AllNumbersCalled`](GameError::AllNumbersCalled). The stop
    /// commits even though the call itself fails.
    pub async fn call_number(
        &self,
        caller: &PlayerId,
        code: &RoomCode,
        manual: Option<u8>,
    ) -> Result<CalledNumber, GameError> {
        let attempt = self
            .store
            .in_transaction(|txn| {
                let mut room = load_room(txn, code)?;
                require_admin(&room, caller)?;
                if room.status != GameStatus::Running {
                    return Err(GameError::FailedPrecondition(format!(
                        "room {code} is {}, numbers can only be called \
                         while running",
                        room.status
                    )));
                }

                if room.called_numbers.len() >= 90 {
                    stop_in_place(&mut room, now_ms());
                    txn.put(ROOMS, code.as_str(), &room)?;
                    return Ok(CallAttempt::Exhausted);
                }

                let number = match manual {
                    Some(n) => {
                        if !(1..=90).contains(&n) {
                            return Err(GameError::OutOfRange(n));
                        }
                        if room.has_called(n) {
                            return Err(GameError::DuplicateNumber(n));
                        }
                        n
                    }
                    None => draw(&room),
                };

                Ok(CallAttempt::Called(record_call(
                    txn, &mut room, number,
                )?))
            })
            .await?;

        match attempt {
            CallAttempt::Called(called) => {
                tracing::info!(
                    %code,
                    number = called.number,
                    count = called.called_count,
                    "number called"
                );
                Ok(called)
            }
            CallAttempt::Exhausted => {
                tracing::info!(%code, "board exhausted, room stopped");
                Err(GameError::AllNumbersCalled)
            }
        }
    }

    /// One best-effort liveness tick for one room. Safe to invoke far
    /// more often than the configured interval.
    pub async fn auto_tick(
        &self,
        code: &RoomCode,
    ) -> Result<AutoCall, GameError> {
        let outcome = self
            .store
            .in_transaction(|txn| {
                let mut room = load_room(txn, code)?;
                if room.status != GameStatus::Running
                    || room.calling_mode != CallingMode::Auto
                {
                    return Ok(AutoCall::Skipped);
                }

                let now = now_ms();
                if room.called_numbers.len() >= 90 {
                    stop_in_place(&mut room, now);
                    txn.put(ROOMS, code.as_str(), &room)?;
                    return Ok(AutoCall::Exhausted);
                }

                let due = room
                    .last_call_at
                    .map(|t| {
                        now.saturating_sub(t)
                            >= room.auto_call_interval_secs * 1000
                    })
                    .unwrap_or(true);
                if !due {
                    return Ok(AutoCall::Skipped);
                }

                let number = draw(&room);
                Ok::<_, GameError>(AutoCall::Called(record_call(
                    txn, &mut room, number,
                )?))
            })
            .await?;

        match outcome {
            AutoCall::Called(called) => {
                tracing::info!(
                    %code,
                    number = called.number,
                    count = called.called_count,
                    "auto-called number"
                );
            }
            AutoCall::Exhausted => {
                tracing::info!(%code, "board exhausted, room stopped");
            }
            AutoCall::Skipped => {}
        }
        Ok(outcome)
    }
}

fn draw(room: &Room) -> u8 {
    let uncalled = room.uncalled_numbers();
    uncalled[rand::rng().random_range(0..uncalled.len())]
}

fn record_call(
    txn: &mut tambola_store::Transaction,
    room: &mut Room,
    number: u8,
) -> Result<CalledNumber, GameError> {
    room.called_numbers.push(number);
    room.latest_called = Some(number);
    room.last_call_at = Some(now_ms());
    txn.put(ROOMS, room.code.as_str(), room)?;
    Ok(CalledNumber {
        number,
        called_count: room.called_numbers.len(),
    })
}
