//! Inbound device messages.
//!
//! Every message body is a JSON object `{ "type": n, "data": ... }`.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::codec::JsonCodec;
use crate::error::{LockstreamError, Result};

/// Numeric `type` discriminators.
pub mod kinds {
    pub const ACK: i64 = 0;
    pub const ONLINE_STATUS: i64 = 1;
    pub const SENSOR_DATA: i64 = 2;
    pub const EVENT: i64 = 3;
    pub const COMMAND_DELIVERED: i64 = 4;
    pub const FEEDBACK: i64 = 5;
    pub const COMMAND_SENT: i64 = 6;
}

/// Sensor name to reading.
pub type SensorMap = Map<String, Value>;

/// A decoded message from the realtime stream.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceMessage {
    /// Error or generic acknowledgement.
    Ack(Value),
    OnlineStatus(bool),
    SensorData(SensorMap),
    Event(Value),
    /// The device received a command. Keyed by the server id.
    CommandDelivered { uuid: String },
    /// Device application feedback, shaped like sensor data.
    Feedback(SensorMap),
    /// The server accepted a command and assigned it `uuid`.
    CommandSent { msg_id: String, uuid: String },
    Unknown { kind: i64, data: Value },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: i64,
    #[serde(default)]
    data: Value,
}

impl DeviceMessage {
    /// Decode a message body.
    pub fn parse(body: &str) -> Result<Self> {
        let envelope: Envelope = JsonCodec::decode(body)?;
        Self::from_parts(envelope.kind, envelope.data)
    }

    fn from_parts(kind: i64, data: Value) -> Result<Self> {
        let message = match kind {
            kinds::ACK => DeviceMessage::Ack(data),
            kinds::ONLINE_STATUS => {
                DeviceMessage::OnlineStatus(data.get("online").and_then(Value::as_bool) == Some(true))
            }
            kinds::SENSOR_DATA => DeviceMessage::SensorData(sensor_body(kind, data)?),
            kinds::EVENT => DeviceMessage::Event(data),
            kinds::COMMAND_DELIVERED => DeviceMessage::CommandDelivered {
                uuid: id_field(&data, "uuid")?,
            },
            kinds::FEEDBACK => DeviceMessage::Feedback(sensor_body(kind, data)?),
            kinds::COMMAND_SENT => DeviceMessage::CommandSent {
                msg_id: id_field(&data, "msg_id")?,
                uuid: id_field(&data, "uuid")?,
            },
            _ => DeviceMessage::Unknown { kind, data },
        };
        Ok(message)
    }

    /// The numeric `type` this message was decoded from.
    pub fn kind(&self) -> i64 {
        match self {
            DeviceMessage::Ack(_) => kinds::ACK,
            DeviceMessage::OnlineStatus(_) => kinds::ONLINE_STATUS,
            DeviceMessage::SensorData(_) => kinds::SENSOR_DATA,
            DeviceMessage::Event(_) => kinds::EVENT,
            DeviceMessage::CommandDelivered { .. } => kinds::COMMAND_DELIVERED,
            DeviceMessage::Feedback(_) => kinds::FEEDBACK,
            DeviceMessage::CommandSent { .. } => kinds::COMMAND_SENT,
            DeviceMessage::Unknown { kind, .. } => *kind,
        }
    }
}

fn sensor_body(kind: i64, mut data: Value) -> Result<SensorMap> {
    match data.get_mut("body").map(Value::take) {
        Some(Value::Object(map)) => Ok(map),
        _ => Err(LockstreamError::Protocol(format!(
            "type {} message without an object body",
            kind
        ))),
    }
}

/// String or numeric id field.
fn id_field(data: &Value, name: &str) -> Result<String> {
    match data.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(LockstreamError::Protocol(format!("missing '{}'", name))),
    }
}
