//! Readiness aggregation.
//!
//! A series is a named group of boolean flags. When the last flag of a
//! series turns true the series becomes ready: every bound listener fires
//! once and the listener list is emptied. Listeners bound after that fire
//! immediately. Marking flags on a ready series does nothing until
//! [`reset`](Readiness::reset).
//!
//! There is no timeout; a flag that is never marked keeps its listeners
//! waiting forever.
//!
//! # Example
//!
//! ```
//! use lockstream_client::readiness::Readiness;
//!
//! let readiness = Readiness::new();
//! readiness.declare("identity", &["deviceId", "token"]);
//! readiness.bind_when_ready("identity", || println!("ready")).unwrap();
//!
//! readiness.mark_ready("identity", "deviceId").unwrap();
//! assert!(!readiness.is_ready("identity"));
//! readiness.mark_ready("identity", "token").unwrap();
//! assert!(readiness.is_ready("identity"));
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{LockstreamError, Result};

/// Series used by the device client.
pub mod series {
    /// Device id and token are known.
    pub const IDENTITY: &str = "identity";
    /// First online-status and sensor-data messages arrived.
    pub const STREAM: &str = "stream";
}

/// Flags of the built-in series.
pub mod flags {
    pub const DEVICE_ID: &str = "deviceId";
    pub const TOKEN: &str = "token";
    pub const ONLINE_STATUS: &str = "onlineStatus";
    pub const SENSOR_DATA: &str = "sensorData";
}

/// Listener fired when a series becomes ready.
pub type ReadyCallback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Series {
    /// Flag name and state, in declaration order.
    flags: Vec<(String, bool)>,
    ready: bool,
    listeners: Vec<ReadyCallback>,
}

impl Series {
    fn all_set(&self) -> bool {
        self.flags.iter().all(|(_, set)| *set)
    }
}

/// Shared readiness state.
///
/// Cheap to clone; clones share the same series.
#[derive(Clone, Default)]
pub struct Readiness {
    series: Arc<Mutex<HashMap<String, Series>>>,
}

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Readiness with the `identity` and `stream` series declared.
    pub fn for_device() -> Self {
        let readiness = Self::new();
        readiness.declare(series::IDENTITY, &[flags::DEVICE_ID, flags::TOKEN]);
        readiness.declare(series::STREAM, &[flags::ONLINE_STATUS, flags::SENSOR_DATA]);
        readiness
    }

    /// Declare (or redeclare) a series with all flags false.
    ///
    /// Listeners already waiting on the series are kept. A series with no
    /// flags is ready at once.
    pub fn declare(&self, name: &str, flag_names: &[&str]) {
        let fired = {
            let mut all = self.series.lock();
            let series = all.entry(name.to_string()).or_default();
            series.flags = flag_names.iter().map(|f| (f.to_string(), false)).collect();
            series.ready = false;
            Self::settle(series)
        };
        Self::fire(name, fired);
    }

    /// Set one flag. Fires the series listeners if it was the last one.
    pub fn mark_ready(&self, name: &str, flag: &str) -> Result<()> {
        let fired = {
            let mut all = self.series.lock();
            let series = all
                .get_mut(name)
                .ok_or_else(|| LockstreamError::UnknownSeries(name.to_string()))?;
            let slot = series
                .flags
                .iter_mut()
                .find(|(f, _)| f == flag)
                .ok_or_else(|| LockstreamError::UnknownFlag {
                    series: name.to_string(),
                    flag: flag.to_string(),
                })?;
            slot.1 = true;
            Self::settle(series)
        };
        Self::fire(name, fired);
        Ok(())
    }

    /// Run `callback` once the series is ready, immediately if it already is.
    pub fn bind_when_ready<F>(&self, name: &str, callback: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut all = self.series.lock();
            let series = all
                .get_mut(name)
                .ok_or_else(|| LockstreamError::UnknownSeries(name.to_string()))?;
            if !series.ready {
                series.listeners.push(Box::new(callback));
                return Ok(());
            }
        }
        callback();
        Ok(())
    }

    /// Whether the series is ready. Unknown series are never ready.
    pub fn is_ready(&self, name: &str) -> bool {
        self.series
            .lock()
            .get(name)
            .map(|s| s.ready)
            .unwrap_or(false)
    }

    /// Whether one flag is set.
    pub fn is_flag_set(&self, name: &str, flag: &str) -> bool {
        self.series
            .lock()
            .get(name)
            .and_then(|s| s.flags.iter().find(|(f, _)| f == flag))
            .map(|(_, set)| *set)
            .unwrap_or(false)
    }

    /// Clear every flag so the series has to become ready again.
    pub fn reset(&self, name: &str) -> Result<()> {
        let mut all = self.series.lock();
        let series = all
            .get_mut(name)
            .ok_or_else(|| LockstreamError::UnknownSeries(name.to_string()))?;
        for (_, set) in series.flags.iter_mut() {
            *set = false;
        }
        series.ready = series.flags.is_empty();
        Ok(())
    }

    /// Future that resolves once the series is ready.
    ///
    /// The listener is registered when this is called, not when the future
    /// is first polled.
    pub fn wait_ready(&self, name: &str) -> impl Future<Output = Result<()>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let bound = self.bind_when_ready(name, move || {
            let _ = tx.send(());
        });
        let name = name.to_string();
        async move {
            bound?;
            rx.await
                .map_err(|_| LockstreamError::ReadinessDropped(name))
        }
    }

    /// Mark ready and take listeners if every flag is set.
    fn settle(series: &mut Series) -> Vec<ReadyCallback> {
        if series.ready || !series.all_set() {
            return Vec::new();
        }
        series.ready = true;
        std::mem::take(&mut series.listeners)
    }

    fn fire(name: &str, listeners: Vec<ReadyCallback>) {
        if listeners.is_empty() {
            return;
        }
        tracing::debug!("Series '{}' ready, firing {} listener(s)", name, listeners.len());
        for listener in listeners {
            listener();
        }
    }
}
