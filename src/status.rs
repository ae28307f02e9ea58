// Raffle View - Display status
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use crate::raffle_state::{Raffle, RawStatus};
use crate::utils::seconds_left;

/// Status as shown to the user
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DisplayStatus {
    GettingReady,
    Open,
    /// Deadline passed, finalize not yet observed
    Finalizing,
    Drawing,
    Settled,
    Canceled,
    Unknown,
}

impl DisplayStatus {
    pub fn label(&self) -> &'static str {
        match self {
            DisplayStatus::GettingReady => "Getting ready",
            DisplayStatus::Open => "Open",
            DisplayStatus::Finalizing => "Finalizing",
            DisplayStatus::Drawing => "Drawing",
            DisplayStatus::Settled => "Settled",
            DisplayStatus::Canceled => "Canceled",
            DisplayStatus::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for DisplayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Map a raffle to its display status at `now` (unix seconds).
///
/// An OPEN raffle whose deadline has passed shows as Finalizing until the
/// indexer or the chain reports the next state.
pub fn resolve_status(raffle: &Raffle, now: u64) -> DisplayStatus {
    match raffle.status {
        Some(RawStatus::FundingPending) => DisplayStatus::GettingReady,
        Some(RawStatus::Open) if raffle.has_deadline_passed(now) => DisplayStatus::Finalizing,
        Some(RawStatus::Open) => DisplayStatus::Open,
        Some(RawStatus::Drawing) => DisplayStatus::Drawing,
        Some(RawStatus::Completed) => DisplayStatus::Settled,
        Some(RawStatus::Canceled) => DisplayStatus::Canceled,
        None => DisplayStatus::Unknown,
    }
}

/// One evaluation of a raffle's live state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusTick {
    pub status: DisplayStatus,
    pub seconds_left: u64,
}

impl StatusTick {
    pub fn evaluate(raffle: &Raffle, now: u64) -> Self {
        Self {
            status: resolve_status(raffle, now),
            seconds_left: seconds_left(raffle.deadline, now),
        }
    }
}

/// Re-evaluates a raffle's status on a fixed interval. The timer task is
/// aborted when the ticker is dropped.
pub struct StatusTicker {
    handle: JoinHandle<()>,
    raffle_tx: watch::Sender<Raffle>,
    tick_rx: watch::Receiver<StatusTick>,
}

impl StatusTicker {
    pub fn spawn<C>(raffle: Raffle, period: Duration, clock: C) -> Self
    where
        C: Fn() -> u64 + Send + 'static,
    {
        let first = StatusTick::evaluate(&raffle, clock());
        let (raffle_tx, mut raffle_rx) = watch::channel(raffle);
        let (tick_tx, tick_rx) = watch::channel(first);

        let handle = tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = timer.tick() => {}
                    changed = raffle_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                let tick = StatusTick::evaluate(&raffle_rx.borrow(), clock());
                let changed = tick_tx.send_if_modified(|current| {
                    if *current == tick {
                        return false;
                    }
                    *current = tick;
                    true
                });
                if changed {
                    debug!(status = %tick.status, seconds_left = tick.seconds_left, "status tick");
                }
            }
        });

        Self {
            handle,
            raffle_tx,
            tick_rx,
        }
    }

    /// Swap in a freshly fetched record
    pub fn update(&self, raffle: Raffle) {
        self.raffle_tx.send_replace(raffle);
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusTick> {
        self.tick_rx.clone()
    }

    pub fn current(&self) -> StatusTick {
        *self.tick_rx.borrow()
    }
}

impl Drop for StatusTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
