//! Outbound lock commands.

use serde::{Deserialize, Serialize};

/// Command codes understood by the lock firmware.
pub mod codes {
    pub const UNLOCK: i64 = 1;
    /// Reported back by the device when a PIN is queried.
    pub const PIN_REPORT: i64 = 3;
    pub const QUERY_LOCK_STATUS: i64 = 8;
}

/// `{ "cmd": n, "content": "..." }` sent to the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCommand {
    pub cmd: i64,
    pub content: String,
}

impl DeviceCommand {
    pub fn new(cmd: i64, content: impl Into<String>) -> Self {
        Self {
            cmd,
            content: content.into(),
        }
    }

    /// Unlock on behalf of `user_id`.
    pub fn unlock(user_id: impl Into<String>) -> Self {
        Self::new(codes::UNLOCK, user_id)
    }

    pub fn query_lock_status() -> Self {
        Self::new(codes::QUERY_LOCK_STATUS, "query lock status")
    }

    /// Set a keypad PIN. `kind` selects which PIN slot the firmware updates.
    pub fn reprogram_keypad(kind: i64, pin: impl ToString) -> Self {
        Self::new(kind, pin.to_string())
    }
}

/// Wire envelope: `{ "msg_id": local id, "body": payload }`.
#[derive(Debug, Serialize)]
pub(crate) struct CommandEnvelope<'a, T: Serialize> {
    pub msg_id: &'a str,
    pub body: &'a T,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;

    #[test]
    fn test_vocabulary() {
        assert_eq!(DeviceCommand::unlock("u7"), DeviceCommand::new(1, "u7"));
        assert_eq!(DeviceCommand::query_lock_status().cmd, 8);
        assert_eq!(
            DeviceCommand::reprogram_keypad(5, 123456),
            DeviceCommand::new(5, "123456")
        );
    }

    #[test]
    fn test_envelope_shape() {
        let command = DeviceCommand::unlock("u7");
        let text = JsonCodec::encode(&CommandEnvelope {
            msg_id: "_12",
            body: &command,
        })
        .unwrap();
        let value = JsonCodec::decode_value(&text).unwrap();
        assert_eq!(value["msg_id"], "_12");
        assert_eq!(value["body"]["cmd"], 1);
        assert_eq!(value["body"]["content"], "u7");
    }
}
