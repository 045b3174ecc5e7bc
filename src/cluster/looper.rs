//! Fixed-interval loop driver with an external quit handle.
//!
//! Each periodic engine loop owns a [`Looper`]: the first tick fires
//! immediately, subsequent ticks at the configured interval, and `quit()`
//! stops the loop at its next suspension point. Loopers are independent;
//! quitting one never affects another.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Handle for one periodic loop.
pub struct Looper {
    interval: Duration,
    quit_tx: broadcast::Sender<()>,
    quit: AtomicBool,
}

impl Looper {
    pub fn new(interval: Duration) -> Self {
        let (quit_tx, _) = broadcast::channel(1);
        Self {
            interval,
            quit_tx,
            quit: AtomicBool::new(false),
        }
    }

    /// Stop the loop at its next suspension point. Idempotent, and observed
    /// even when issued before the loop starts ticking.
    pub fn quit(&self) {
        self.quit.store(true, Ordering::SeqCst);
        let _ = self.quit_tx.send(());
    }

    /// Begin ticking. Call once from the task that runs the loop body.
    pub fn ticks(&self) -> Ticks {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Ticks {
            ticker,
            quit_rx: self.quit_tx.subscribe(),
            quit: self.quit.load(Ordering::SeqCst),
        }
    }
}

/// Tick stream side of a [`Looper`].
pub struct Ticks {
    ticker: Interval,
    quit_rx: broadcast::Receiver<()>,
    quit: bool,
}

impl Ticks {
    /// Wait for the next tick. Returns `false` once the looper has quit.
    pub async fn next(&mut self) -> bool {
        if self.quit {
            return false;
        }

        tokio::select! {
            // Quit wins over a pending tick.
            biased;
            _ = self.quit_rx.recv() => {
                self.quit = true;
                false
            }
            _ = self.ticker.tick() => true,
        }
    }
}
