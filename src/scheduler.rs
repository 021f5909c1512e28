/// Fixed-period scheduler: raises the due flag once per interval
///
/// The tick task never touches sensors or the network. Ticks that arrive
/// while a cycle is running collapse into the single pending flag.
use log::debug;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::cycle::DueFlag;

pub struct CycleScheduler {
    handle: JoinHandle<()>,
}

impl CycleScheduler {
    /// Start ticking; the first tick fires one full `period` from now
    pub fn spawn(period: Duration, due: DueFlag) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if due.is_raised() {
                    debug!("Previous cycle still pending, tick absorbed");
                }
                due.raise();
                debug!("Publish interval elapsed, cycle due");
            }
        });
        Self { handle }
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for CycleScheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
