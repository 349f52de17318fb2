//! Permission-queue bot: watches an intake channel for SponsorBlock public
//! user IDs, routes each request into a review track, and finalizes
//! approvals driven by reviewer commands.

pub mod config;
pub mod discord;
pub mod error;
pub mod event;
pub mod extract;
pub mod gateway;
pub mod lifecycle;
pub mod reputation;
pub mod routing;

use crate::config::Config;
use crate::discord::DiscordClient;
use crate::reputation::ReputationClient;

/// Shared application state, constructed once at startup.
pub struct AppState {
    pub config: Config,
    pub discord: DiscordClient,
    pub reputation: ReputationClient,
}

pub fn get_bot_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
