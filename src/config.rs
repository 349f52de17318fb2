use anyhow::{Context, Result};
use std::env;

/// Immutable runtime configuration, loaded once at startup and passed by
/// reference everywhere. Channel and role identifiers are Discord snowflakes
/// kept as strings (the REST API speaks string ids).
#[derive(Clone)]
pub struct Config {
    /// Bot token for the Discord REST API.
    pub token: String,
    /// The bot's own user id; threads it creates carry this as `owner_id`.
    pub application_id: String,
    /// Guild id, used only to compose jump links.
    pub guild_id: String,
    /// Channel watched for new submission messages.
    pub intake_channel_id: String,
    /// Channel receiving the audit embed for every routed request.
    pub audit_channel_id: String,
    /// Review channel for requesters with no usable submissions.
    pub needs_content_channel_id: String,
    /// Review channel for requesters who meet the minimum bar.
    pub meets_minimum_channel_id: String,
    /// Public channel receiving immutable approval records.
    pub approvals_channel_id: String,
    /// Role mentioned in needs-content review threads.
    pub needs_content_role_id: String,
    /// Role mentioned in meets-minimum review threads.
    pub meets_minimum_role_id: String,
    /// Intake messages at or before this snowflake are ignored.
    pub starting_message_id: u64,
    /// Shared secret authenticating the gateway relay's event posts.
    pub relay_secret: String,
    pub port: u16,
    pub reputation_base_url: String,
    pub profile_base_url: String,
}

fn required(name: &'static str) -> Result<String> {
    env::var(name).with_context(|| format!("{name} environment variable is required"))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let token = required("QUEUE_TOKEN")?;
        let application_id = required("APPLICATION_ID")?;
        let guild_id = required("GUILD_ID")?;
        let intake_channel_id = required("INTAKE_CHANNEL_ID")?;
        let audit_channel_id = required("AUDIT_CHANNEL_ID")?;
        let needs_content_channel_id = required("NEEDS_CONTENT_CHANNEL_ID")?;
        let meets_minimum_channel_id = required("MEETS_MINIMUM_CHANNEL_ID")?;
        let approvals_channel_id = required("APPROVALS_CHANNEL_ID")?;
        let needs_content_role_id = required("NEEDS_CONTENT_ROLE_ID")?;
        let meets_minimum_role_id = required("MEETS_MINIMUM_ROLE_ID")?;
        let relay_secret = required("RELAY_SECRET")?;

        let starting_message_id = required("STARTING_MESSAGE_ID")?
            .parse::<u64>()
            .context("STARTING_MESSAGE_ID must be a snowflake")?;

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let reputation_base_url = env::var("REPUTATION_BASE_URL")
            .unwrap_or_else(|_| "https://sponsor.ajay.app".to_string());
        let profile_base_url =
            env::var("PROFILE_BASE_URL").unwrap_or_else(|_| "https://sb.ltn.fi/userid/".to_string());

        Ok(Config {
            token,
            application_id,
            guild_id,
            intake_channel_id,
            audit_channel_id,
            needs_content_channel_id,
            meets_minimum_channel_id,
            approvals_channel_id,
            needs_content_role_id,
            meets_minimum_role_id,
            starting_message_id,
            relay_secret,
            port,
            reputation_base_url,
            profile_base_url,
        })
    }

    /// Jump link to a message in a guild channel.
    pub fn jump_link(&self, channel_id: &str, message_id: &str) -> String {
        format!(
            "https://discord.com/channels/{}/{}/{}",
            self.guild_id, channel_id, message_id
        )
    }

    /// True if an intake message is newer than the configured start marker.
    ///
    /// Snowflakes are monotonic, so a plain numeric comparison orders
    /// messages by creation time. Unparseable ids are treated as old.
    pub fn is_after_start_marker(&self, message_id: &str) -> bool {
        message_id
            .parse::<u64>()
            .map(|id| id > self.starting_message_id)
            .unwrap_or(false)
    }
}
