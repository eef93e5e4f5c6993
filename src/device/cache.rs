//! Last known device state.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use super::message::SensorMap;

/// Device reachability as reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OnlineStatus {
    /// Nothing received yet.
    #[default]
    Unknown,
    Online,
    Offline,
}

impl OnlineStatus {
    pub fn from_flag(online: bool) -> Self {
        if online {
            OnlineStatus::Online
        } else {
            OnlineStatus::Offline
        }
    }

    #[inline]
    pub fn is_offline(self) -> bool {
        self == OnlineStatus::Offline
    }
}

impl fmt::Display for OnlineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OnlineStatus::Unknown => "unknown",
            OnlineStatus::Online => "online",
            OnlineStatus::Offline => "offline",
        };
        f.write_str(s)
    }
}

/// Online status plus the latest reading of every sensor.
#[derive(Debug, Default)]
pub struct DeviceCache {
    online: OnlineStatus,
    sensors: HashMap<String, Value>,
}

impl DeviceCache {
    pub fn online(&self) -> OnlineStatus {
        self.online
    }

    pub fn set_online(&mut self, status: OnlineStatus) {
        self.online = status;
    }

    /// Overwrite readings present in `update`; others are kept.
    pub fn merge_sensors(&mut self, update: &SensorMap) {
        for (name, value) in update {
            self.sensors.insert(name.clone(), value.clone());
        }
    }

    pub fn sensor(&self, name: &str) -> Option<Value> {
        self.sensors.get(name).cloned()
    }

    /// Readings for `names`. Sensors never reported are left out.
    pub fn sensors(&self, names: &[&str]) -> HashMap<String, Value> {
        names
            .iter()
            .filter_map(|name| {
                self.sensors
                    .get(*name)
                    .map(|value| (name.to_string(), value.clone()))
            })
            .collect()
    }

    pub fn all_sensors(&self) -> HashMap<String, Value> {
        self.sensors.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> SensorMap {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_merge_keeps_untouched_sensors() {
        let mut cache = DeviceCache::default();
        cache.merge_sensors(&map(json!({"lock": 1, "battery": 90})));
        cache.merge_sensors(&map(json!({"battery": 85})));

        assert_eq!(cache.sensor("lock"), Some(json!(1)));
        assert_eq!(cache.sensor("battery"), Some(json!(85)));
        assert_eq!(cache.sensor("door"), None);
        assert_eq!(cache.all_sensors().len(), 2);
    }

    #[test]
    fn test_sensors_subset() {
        let mut cache = DeviceCache::default();
        cache.merge_sensors(&map(json!({"a": 1, "b": 2, "c": 3})));
        let subset = cache.sensors(&["a", "c", "missing"]);
        assert_eq!(subset.len(), 2);
        assert_eq!(subset["c"], json!(3));
    }

    #[test]
    fn test_online_status() {
        let mut cache = DeviceCache::default();
        assert_eq!(cache.online(), OnlineStatus::Unknown);
        assert!(!cache.online().is_offline());
        cache.set_online(OnlineStatus::from_flag(false));
        assert!(cache.online().is_offline());
        assert_eq!(OnlineStatus::Online.to_string(), "online");
    }
}
