//! Heartbeat negotiation and the pinger/checker tasks.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::protocol::{versions, HeartBeat, HEARTBEAT};
use crate::writer::WriterHandle;

/// Intervals agreed with the server. Zero means disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NegotiatedHeartbeat {
    /// How often the client pings.
    pub outgoing: Duration,
    /// How often the client checks for server traffic.
    pub incoming: Duration,
}

/// Combine the client offer with the server's `heart-beat` header.
///
/// Only 1.1 and 1.2 sessions negotiate. Each direction is the larger of the
/// two sides' values, or zero if either side disabled it.
pub fn negotiate(version: Option<&str>, local: HeartBeat, server: Option<&str>) -> NegotiatedHeartbeat {
    let negotiates = version.map(versions::negotiates_heartbeat).unwrap_or(false);
    let server = match (negotiates, server.and_then(HeartBeat::parse)) {
        (true, Some(server)) => server,
        _ => return NegotiatedHeartbeat::default(),
    };

    let pick = |ours: Duration, theirs: Duration| {
        if ours.is_zero() || theirs.is_zero() {
            Duration::ZERO
        } else {
            ours.max(theirs)
        }
    };

    NegotiatedHeartbeat {
        outgoing: pick(local.outgoing, server.incoming),
        incoming: pick(local.incoming, server.outgoing),
    }
}

/// Last time any server traffic was seen.
#[derive(Debug, Clone)]
pub struct ActivityClock {
    last: Arc<Mutex<Instant>>,
}

impl ActivityClock {
    pub fn new() -> Self {
        Self {
            last: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Record server activity now.
    pub fn touch(&self) {
        *self.last.lock() = Instant::now();
    }

    /// Time since the last recorded activity.
    pub fn elapsed(&self) -> Duration {
        self.last.lock().elapsed()
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue a bare LF every `every`. Stops once the writer is gone.
pub fn spawn_pinger(writer: WriterHandle, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if writer.is_closed() {
                return;
            }
            // A full queue already means traffic is flowing.
            if let Err(e) = writer.try_send(HEARTBEAT) {
                tracing::trace!("Heartbeat ping skipped: {}", e);
            }
        }
    })
}

/// Check server activity every `every`; call `on_dead` once if nothing was
/// seen for more than twice that.
pub fn spawn_checker<F>(clock: ActivityClock, every: Duration, on_dead: F) -> JoinHandle<()>
where
    F: FnOnce(Duration) + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let elapsed = clock.elapsed();
            if elapsed > every * 2 {
                on_dead(elapsed);
                return;
            }
        }
    })
}
