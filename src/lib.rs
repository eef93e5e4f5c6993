//! # lockstream-client
//!
//! Realtime device-control client for networked smart locks.
//!
//! The client logs in to the lock backend, keeps a STOMP session open over
//! WebSocket (or raw TCP), streams the device's online status and sensor
//! readings, and sends commands whose delivery and response are confirmed
//! in two phases.
//!
//! ## Architecture
//!
//! - **protocol**: STOMP text frames, lazy decoding, fragmentation
//! - **transport** / **writer** / **session**: one broker connection with
//!   heartbeats, subscriptions and a batching writer task
//! - **correlation**: outstanding commands by local id, then server id
//! - **readiness**: named flag groups that gate application logic
//! - **events**: named-event dispatcher
//! - **device**: login, reconnect loop, message routing, command API
//!
//! ## Example
//!
//! ```ignore
//! use lockstream_client::device::{DeviceClient, DeviceCommand, DeviceConfig};
//!
//! #[tokio::main]
//! async fn main() -> lockstream_client::Result<()> {
//!     let client = DeviceClient::new(DeviceConfig::new("lock.example:8080"))?;
//!     client.set_device_id("dev-1")?;
//!     client.set_token("subscription-token")?;
//!     client.start()?;
//!
//!     client.wait_ready().await?;
//!     client.issue_command(&DeviceCommand::query_lock_status(), || {}, || {});
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod correlation;
pub mod device;
pub mod error;
pub mod events;
pub mod protocol;
pub mod readiness;
pub mod session;
pub mod transport;
pub mod writer;

pub use device::{DeviceClient, DeviceCommand, DeviceConfig};
pub use error::{LockstreamError, Result};
pub use session::{SessionConfig, StompClient};
