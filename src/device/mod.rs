//! Smart-lock device client.
//!
//! [`DeviceClient`] logs in, keeps a realtime session open, caches the
//! device's online status and sensor readings, and sends commands with
//! two-phase confirmation.

mod auth;
mod cache;
mod command;
mod config;
mod controller;
mod message;

pub use auth::{Authenticator, Credentials, HttpAuthenticator, TokenCache, DEFAULT_TOKEN_TTL};
pub use cache::{DeviceCache, OnlineStatus};
pub use command::{codes, DeviceCommand};
pub use config::{DeviceConfig, DEFAULT_LOGIN_TIMEOUT_MS, DEFAULT_RELOGIN_DELAY_MS};
pub use controller::{
    event_names, Connectivity, ControllerState, DeviceClient, DeviceClientBuilder, DeviceEvent,
};
pub use message::{kinds, DeviceMessage, SensorMap};
