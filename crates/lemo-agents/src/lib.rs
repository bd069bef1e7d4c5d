//! Lemo Agents - Specialised agents and bidding router
//!
//! This crate provides the `SpecializedAgent` trait, the weather and general
//! agents, the text protocol of the general agent's reasoning loop, and the
//! `AgentManager` that routes each message to the best bidder.

pub mod agent;
pub mod general;
pub mod manager;
pub mod react;
pub mod weather;

// Re-export key types for convenience
pub use agent::{AgentInfo, AgentReply, SpecializedAgent};
pub use general::GeneralAgent;
pub use manager::{AgentChatResult, AgentManager};
pub use weather::WeatherAgent;
