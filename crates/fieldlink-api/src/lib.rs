//! fieldlink-api: Shared wire types
//!
//! Contains the command request/response documents, heartbeat payload, hub
//! session frames and provisioning service documents used across the agent,
//! its network adapters and the CLI.

pub mod events;
pub mod requests;
pub mod responses;
