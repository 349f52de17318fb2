//! Lifecycle orchestration for access requests.
//!
//! A submission moves from observed (a message with a public ID in the
//! intake channel) through classification and routing into a pair of
//! threads, and is finished by a reviewer's approval or by the requester
//! leaving their thread. All durable state lives in platform objects
//! (thread names, archival flags, message history); every handler re-reads
//! what it needs from the platform at the moment of use instead of caching.
//!
//! Multi-step side-effect sequences are deliberately not transactional:
//! the platform offers no cross-operation atomicity, so each step is an
//! independent fallible action whose outcome is collected and logged.

use chrono::Utc;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::discord::{
    ChatApi, CreateMessage, CreateThread, Embed, EmbedAuthor, Message, Modal, ModalRow, TextInput,
    User, THREAD_AUTO_ARCHIVE_MINUTES,
};
use crate::error::QueueError;
use crate::event::{Interaction, InteractionAction, ThreadMembersUpdate};
use crate::extract;
use crate::reputation::{ReputationClient, UserInfo};
use crate::routing::{self, Track};

pub const SUCCESS_REACTION: &str = "✅";

const APPROVE_MODAL_ID: &str = "approve";
const FAST_TRACK_MODAL_ID: &str = "approve-id";

const APPROVAL_MESSAGE: &str = "✅ Your request has been approved: you now have permission to \
                                submit. Thank you for contributing!";

// =============================================================================
// Thread-pair naming
// =============================================================================

/// Compose the review thread's name from the pair it represents.
///
/// The name is the only place the pairing is stored; there is no database.
pub fn pair_thread_name(requester_thread_id: &str, public_id: &str) -> String {
    format!("{requester_thread_id}-{public_id}")
}

/// Recover a thread pair from a review thread's name.
///
/// Accepts only `<snowflake>-<64 lowercase hex>`; anything else is not one
/// of our review threads.
pub fn parse_pair_thread_name(name: &str) -> Option<(&str, &str)> {
    let (requester_thread_id, public_id) = name.split_once('-')?;
    if requester_thread_id.is_empty()
        || !requester_thread_id.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    if !extract::is_public_id(public_id) {
        return None;
    }
    Some((requester_thread_id, public_id))
}

// =============================================================================
// Per-step outcome collection
// =============================================================================

/// Outcomes of a best-effort side-effect sequence.
///
/// A failing step never blocks the following ones; failures are reported
/// together when the sequence finishes.
#[derive(Default)]
struct StepLog {
    outcomes: Vec<(&'static str, Option<QueueError>)>,
}

impl StepLog {
    /// Record one step's result, returning its value on success.
    fn record<T>(&mut self, step: &'static str, result: Result<T, QueueError>) -> Option<T> {
        match result {
            Ok(value) => {
                self.outcomes.push((step, None));
                Some(value)
            }
            Err(error) => {
                self.outcomes.push((step, Some(error)));
                None
            }
        }
    }

    fn finish(self, action: &'static str, public_id: &str) {
        let mut failed = 0usize;
        for (step, error) in &self.outcomes {
            if let Some(error) = error {
                failed += 1;
                warn!(action, step, public_id, error = %error, "lifecycle step failed");
            }
        }
        info!(
            action,
            public_id,
            steps = self.outcomes.len(),
            failed,
            "lifecycle sequence finished"
        );
    }
}

// =============================================================================
// Observed -> Classified -> (Closed-Preapproved | Routed)
// =============================================================================

/// Handle a new message in a guild channel.
///
/// Only non-automated messages in the intake channel that contain a public
/// ID start a submission. A failed reputation lookup abandons the
/// submission with a log entry and no requester-visible output; the
/// upstream issue is transient and not the requester's fault.
pub async fn handle_message_create(
    config: &Config,
    chat: &dyn ChatApi,
    reputation: &ReputationClient,
    message: &Message,
) {
    if message.channel_id != config.intake_channel_id {
        return;
    }
    // Bridge webhooks carry the bot flag but speak for real requesters;
    // only native automated authors are filtered out.
    if message.author.bot && message.webhook_id.is_none() {
        return;
    }
    if !config.is_after_start_marker(&message.id) {
        debug!(message_id = %message.id, "message predates start marker, ignoring");
        return;
    }
    let Some(public_id) = extract::find_public_id(&message.content) else {
        return;
    };

    let info = match reputation.user_info(public_id).await {
        Ok(info) => info,
        Err(error) => {
            warn!(public_id, error = %error, "reputation lookup failed, abandoning submission");
            return;
        }
    };

    let track = routing::classify(&info);
    info!(
        public_id,
        requester = %message.author.id,
        username = %info.username,
        ?track,
        "classified submission"
    );

    match track {
        Track::AlreadyApproved => {
            let reply =
                CreateMessage::text(routing::ALREADY_APPROVED_REPLY).reply_to(&message.id);
            if let Err(error) = chat.create_message(&message.channel_id, &reply).await {
                warn!(public_id, error = %error, "failed to send already-approved reply");
            }
        }
        Track::NeedsContent | Track::MeetsMinimum => {
            route_submission(config, chat, message, public_id, &info, track).await;
        }
    }
}

fn review_route<'c>(config: &'c Config, track: Track) -> Option<(&'c str, &'c str)> {
    match track {
        Track::NeedsContent => Some((
            &config.needs_content_channel_id,
            &config.needs_content_role_id,
        )),
        Track::MeetsMinimum => Some((
            &config.meets_minimum_channel_id,
            &config.meets_minimum_role_id,
        )),
        Track::AlreadyApproved => None,
    }
}

/// Truncated excerpt of the source message for the audit embed.
fn excerpt(content: &str) -> String {
    const MAX_CHARS: usize = 200;
    if content.chars().count() <= MAX_CHARS {
        content.to_string()
    } else {
        let cut: String = content.chars().take(MAX_CHARS).collect();
        format!("{cut}…")
    }
}

fn audit_embed(config: &Config, message: &Message, public_id: &str, info: &UserInfo) -> Embed {
    let mut description = format!(
        "**Username**: {}\n**Segment Count**: {}\n**Ignored Segment Count**: {}",
        info.username, info.segment_count, info.ignored_segment_count
    );
    if !message.content.trim().is_empty() {
        description.push_str(&format!("\n**Message**: {}", excerpt(message.content.trim())));
    }

    Embed {
        author: Some(EmbedAuthor {
            name: format!("Request {public_id}"),
            url: Some(format!("{}{}", config.profile_base_url, public_id)),
            icon_url: message.author.avatar_url(),
        }),
        description: Some(description),
        timestamp: Some(Utc::now().to_rfc3339()),
    }
}

/// Classified -> Routed: the five-step routing choreography.
///
/// Steps fail independently except requester-thread creation: without that
/// thread there is nothing to pair, so review-side steps are skipped.
/// A failure on the review side leaves the requester thread routed but
/// unlinked; that inconsistency is logged and accepted.
async fn route_submission(
    config: &Config,
    chat: &dyn ChatApi,
    message: &Message,
    public_id: &str,
    info: &UserInfo,
    track: Track,
) {
    let Some((review_channel_id, reviewer_role_id)) = review_route(config, track) else {
        return;
    };

    let mut steps = StepLog::default();
    let embed = audit_embed(config, message, public_id, info);
    let jump_link = config.jump_link(&message.channel_id, &message.id);

    steps.record(
        "audit_log",
        chat.create_message(
            &config.audit_channel_id,
            &CreateMessage::embed(embed.clone()).link_button("Jump to message", jump_link.clone()),
        )
        .await,
    );

    let guidance = routing::guidance_message(track, &message.author.mention());

    let requester_thread_id = if message.webhook_id.is_some() {
        // Bridged identities cannot own threads; reply in place instead.
        // Without a requester thread there is no pair to review against,
        // so the review side is skipped for bridged submissions.
        steps.record(
            "guidance_reply",
            chat.create_message(
                &message.channel_id,
                &CreateMessage::text(guidance).reply_to(&message.id),
            )
            .await,
        );
        None
    } else {
        let thread = steps.record(
            "requester_thread",
            chat.create_thread_from_message(
                &message.channel_id,
                &message.id,
                &CreateThread {
                    name: public_id.to_string(),
                    auto_archive_duration: THREAD_AUTO_ARCHIVE_MINUTES,
                },
            )
            .await,
        );
        match thread {
            Some(thread) => {
                steps.record(
                    "guidance_message",
                    chat.create_message(&thread.id, &CreateMessage::text(guidance))
                        .await,
                );
                Some(thread.id)
            }
            None => {
                // Nothing downstream can proceed without the thread.
                steps.finish("route_submission", public_id);
                return;
            }
        }
    };

    if let Some(requester_thread_id) = requester_thread_id {
        let anchor = steps.record(
            "review_anchor",
            chat.create_message(
                review_channel_id,
                &CreateMessage::embed(embed).link_button("Jump to message", jump_link),
            )
            .await,
        );

        if let Some(anchor) = anchor {
            let review_thread = steps.record(
                "review_thread",
                chat.create_thread_from_message(
                    review_channel_id,
                    &anchor.id,
                    &CreateThread {
                        name: pair_thread_name(&requester_thread_id, public_id),
                        auto_archive_duration: THREAD_AUTO_ARCHIVE_MINUTES,
                    },
                )
                .await,
            );

            if let Some(review_thread) = review_thread {
                steps.record(
                    "reviewer_mention",
                    chat.create_message(
                        &review_thread.id,
                        &CreateMessage::text(format!(
                            "<@&{reviewer_role_id}> new permission request from **{}** is ready \
                             for review.",
                            info.username
                        )),
                    )
                    .await,
                );
            }
        }
    }

    steps.finish("route_submission", public_id);
}

// =============================================================================
// Commands and modals
// =============================================================================

/// Dispatch an interaction to the matching command or modal handler.
pub async fn handle_interaction(config: &Config, chat: &dyn ChatApi, interaction: &Interaction) {
    match interaction.action() {
        InteractionAction::Command { name } => match name.as_str() {
            "approve" => handle_approve_command(config, chat, interaction).await,
            "approve-id" => handle_fast_track_command(config, chat, interaction).await,
            other => {
                warn!(command = other, "unrecognized command");
                reject(chat, interaction, &QueueError::ContextRejected).await;
            }
        },
        InteractionAction::ModalSubmit { custom_id, fields } => match custom_id.as_str() {
            APPROVE_MODAL_ID => handle_approve_submit(config, chat, interaction, &fields).await,
            FAST_TRACK_MODAL_ID => {
                handle_fast_track_submit(config, chat, interaction, &fields).await
            }
            other => warn!(custom_id = other, "unrecognized modal submission"),
        },
        InteractionAction::Unsupported => {}
    }
}

/// A thread pair reconstructed from a review thread's name and parent.
struct ReviewPair {
    review_channel_id: String,
    review_thread_id: String,
    requester_thread_id: String,
    public_id: String,
}

/// Validate that an interaction was invoked inside one of our review
/// threads, reconstructing the pair from fresh platform reads.
async fn locate_review_pair(
    config: &Config,
    chat: &dyn ChatApi,
    interaction: &Interaction,
) -> Result<ReviewPair, QueueError> {
    let channel_id = interaction
        .channel_id
        .as_deref()
        .ok_or(QueueError::ContextRejected)?;

    let thread = chat.get_channel(channel_id).await?;
    let parent_id = thread.parent_id.as_deref().ok_or(QueueError::ContextRejected)?;
    if parent_id != config.needs_content_channel_id
        && parent_id != config.meets_minimum_channel_id
    {
        return Err(QueueError::ContextRejected);
    }

    let name = thread.name.as_deref().unwrap_or_default();
    let (requester_thread_id, public_id) =
        parse_pair_thread_name(name).ok_or(QueueError::ContextRejected)?;

    Ok(ReviewPair {
        review_channel_id: parent_id.to_string(),
        review_thread_id: channel_id.to_string(),
        requester_thread_id: requester_thread_id.to_string(),
        public_id: public_id.to_string(),
    })
}

/// Ephemeral, caller-only explanation for a rejected command. No state
/// changes on this path.
async fn reject(chat: &dyn ChatApi, interaction: &Interaction, error: &QueueError) {
    let content = match error {
        QueueError::ContextRejected => {
            "This command cannot be used here: it only works in its designated channel or review \
             thread."
                .to_string()
        }
        QueueError::ValidationFailed(reason) => format!("Invalid input: {reason}"),
        _ => "Something went wrong while handling the command.".to_string(),
    };
    if let Err(error) = chat
        .respond_message(&interaction.id, &interaction.token, &content, true)
        .await
    {
        warn!(error = %error, "failed to send rejection response");
    }
}

async fn handle_approve_command(config: &Config, chat: &dyn ChatApi, interaction: &Interaction) {
    match locate_review_pair(config, chat, interaction).await {
        Ok(_) => {
            let modal = Modal {
                custom_id: APPROVE_MODAL_ID.to_string(),
                title: "Approve request".to_string(),
                components: vec![ModalRow::input(TextInput {
                    kind: 4,
                    custom_id: "comment".to_string(),
                    label: "Comment for the requester (optional)".to_string(),
                    style: 2,
                    required: false,
                    min_length: None,
                    max_length: Some(1000),
                })],
            };
            if let Err(error) = chat
                .respond_modal(&interaction.id, &interaction.token, &modal)
                .await
            {
                warn!(error = %error, "failed to open approval modal");
            }
        }
        Err(error) => reject(chat, interaction, &error).await,
    }
}

async fn handle_fast_track_command(
    config: &Config,
    chat: &dyn ChatApi,
    interaction: &Interaction,
) {
    if interaction.channel_id.as_deref() != Some(config.intake_channel_id.as_str()) {
        reject(chat, interaction, &QueueError::ContextRejected).await;
        return;
    }
    let modal = Modal {
        custom_id: FAST_TRACK_MODAL_ID.to_string(),
        title: "Approve by public user ID".to_string(),
        components: vec![ModalRow::input(TextInput {
            kind: 4,
            custom_id: "public_id".to_string(),
            label: "Public user ID".to_string(),
            style: 1,
            required: true,
            min_length: Some(64),
            max_length: Some(64),
        })],
    };
    if let Err(error) = chat
        .respond_modal(&interaction.id, &interaction.token, &modal)
        .await
    {
        warn!(error = %error, "failed to open fast-track modal");
    }
}

/// Post the immutable approval record into the public approvals channel.
/// Mention side effects are suppressed; the record is for reading, not
/// for pinging.
async fn post_approval_record(
    config: &Config,
    chat: &dyn ChatApi,
    public_id: &str,
    approver: Option<&User>,
) -> Result<Message, QueueError> {
    let approver_text = approver
        .map(User::mention)
        .unwrap_or_else(|| "an unknown reviewer".to_string());
    let content = format!(
        "`{public_id}` approved by {approver_text} <t:{}:f>",
        Utc::now().timestamp()
    );
    chat.create_message(
        &config.approvals_channel_id,
        &CreateMessage::text(content).suppress_mentions(),
    )
    .await
}

/// Routed -> Reviewed -> Approved: finalize an approval from the review
/// thread's modal.
///
/// The pair is reconstructed from the submitting interaction's channel, so
/// no reviewer state is held across the modal round trip. Every step is
/// best-effort; a failure is logged and the remaining steps still run.
async fn handle_approve_submit(
    config: &Config,
    chat: &dyn ChatApi,
    interaction: &Interaction,
    fields: &HashMap<String, String>,
) {
    let pair = match locate_review_pair(config, chat, interaction).await {
        Ok(pair) => pair,
        Err(error) => {
            reject(chat, interaction, &error).await;
            return;
        }
    };

    let mut steps = StepLog::default();

    // Acknowledge inside the interaction deadline before doing the slow work.
    steps.record(
        "ack",
        chat.respond_message(
            &interaction.id,
            &interaction.token,
            "Approval recorded.",
            true,
        )
        .await,
    );

    if let Some(comment) = fields
        .get("comment")
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
    {
        steps.record(
            "relay_comment",
            chat.create_message(
                &pair.requester_thread_id,
                &CreateMessage::text(format!("Note from the review team: {comment}")),
            )
            .await,
        );
    }

    steps.record(
        "approval_message",
        chat.create_message(
            &pair.requester_thread_id,
            &CreateMessage::text(APPROVAL_MESSAGE),
        )
        .await,
    );

    // A thread created from a message shares the message's id, so the
    // requester thread id is also the source message id in the intake
    // channel.
    steps.record(
        "success_reaction",
        chat.create_reaction(
            &config.intake_channel_id,
            &pair.requester_thread_id,
            SUCCESS_REACTION,
        )
        .await,
    );

    steps.record(
        "archive_review_thread",
        chat.archive_thread(&pair.review_thread_id).await,
    );

    // The anchor message in the review channel shares the review thread's
    // id; deleting it removes the pairing anchor.
    steps.record(
        "delete_anchor",
        chat.delete_message(&pair.review_channel_id, &pair.review_thread_id)
            .await,
    );

    steps.record(
        "approval_record",
        post_approval_record(config, chat, &pair.public_id, interaction.invoker()).await,
    );

    steps.finish("approve", &pair.public_id);
}

/// Fast-track approval for an arbitrary public ID, bypassing the thread
/// machinery: just the approval record plus a success acknowledgement.
async fn handle_fast_track_submit(
    config: &Config,
    chat: &dyn ChatApi,
    interaction: &Interaction,
    fields: &HashMap<String, String>,
) {
    if interaction.channel_id.as_deref() != Some(config.intake_channel_id.as_str()) {
        reject(chat, interaction, &QueueError::ContextRejected).await;
        return;
    }

    let public_id = fields.get("public_id").map(|v| v.trim()).unwrap_or_default();
    if !extract::is_public_id(public_id) {
        reject(
            chat,
            interaction,
            &QueueError::ValidationFailed(
                "the public user ID must be exactly 64 lowercase hex characters".to_string(),
            ),
        )
        .await;
        return;
    }

    let mut steps = StepLog::default();
    steps.record(
        "approval_record",
        post_approval_record(config, chat, public_id, interaction.invoker()).await,
    );
    steps.record(
        "ack",
        chat.respond_message(
            &interaction.id,
            &interaction.token,
            &format!("{SUCCESS_REACTION} Approved `{public_id}`."),
            true,
        )
        .await,
    );
    steps.finish("fast_track_approve", public_id);
}

// =============================================================================
// Routed/Reviewed -> Abandoned
// =============================================================================

/// Archive a requester thread when its requester leaves it.
///
/// Fires only for open threads the bot owns under the intake channel, and
/// only when the departing member authored the thread's root message.
/// Reviewer-side artifacts are deliberately left alone on this path.
pub async fn handle_thread_members_update(
    config: &Config,
    chat: &dyn ChatApi,
    update: &ThreadMembersUpdate,
) {
    if update.removed_member_ids.is_empty() {
        return;
    }

    let thread = match chat.get_channel(&update.id).await {
        Ok(thread) => thread,
        Err(error) => {
            warn!(thread = %update.id, error = %error, "failed to read thread on member removal");
            return;
        }
    };

    if thread.parent_id.as_deref() != Some(config.intake_channel_id.as_str()) {
        return;
    }
    if thread.owner_id.as_deref() != Some(config.application_id.as_str()) {
        return;
    }
    if thread.is_archived() {
        return;
    }

    // The thread shares its id with the root message it was created from;
    // that message's author is the requester.
    let root = match chat.get_message(&config.intake_channel_id, &update.id).await {
        Ok(message) => message,
        Err(error) => {
            warn!(thread = %update.id, error = %error, "failed to read thread root message");
            return;
        }
    };

    if !update
        .removed_member_ids
        .iter()
        .any(|id| *id == root.author.id)
    {
        return;
    }

    info!(thread = %update.id, requester = %root.author.id, "requester left their thread, archiving");
    if let Err(error) = chat.archive_thread(&update.id).await {
        warn!(thread = %update.id, error = %error, "failed to archive abandoned thread");
    }
}
