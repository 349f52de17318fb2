//! Inbound gateway events.
//!
//! The relay forwards gateway dispatches as `{"t": "<TYPE>", "d": {...}}`.
//! Payloads are decoded into tagged variants right here at the boundary;
//! nothing downstream ever sees an untyped blob.

use serde::Deserialize;
use std::collections::HashMap;

use crate::discord::{Message, User};

#[derive(Debug)]
pub enum GatewayEvent {
    MessageCreate(Message),
    InteractionCreate(Interaction),
    ThreadMembersUpdate(ThreadMembersUpdate),
    /// A dispatch kind this bot does not consume.
    Ignored { kind: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThreadMembersUpdate {
    /// The thread the membership change happened in.
    pub id: String,
    #[serde(default)]
    pub removed_member_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub token: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub member: Option<Member>,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub data: Option<InteractionData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Member {
    pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InteractionData {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub custom_id: Option<String>,
    #[serde(default)]
    pub components: Vec<SubmittedRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmittedRow {
    #[serde(default)]
    pub components: Vec<SubmittedInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmittedInput {
    pub custom_id: String,
    #[serde(default)]
    pub value: String,
}

const INTERACTION_APPLICATION_COMMAND: u8 = 2;
const INTERACTION_MODAL_SUBMIT: u8 = 5;

/// What an interaction asks the bot to do, one case per interaction kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionAction {
    /// A slash or context-menu command invocation.
    Command { name: String },
    /// A submitted modal form with its flattened field values.
    ModalSubmit {
        custom_id: String,
        fields: HashMap<String, String>,
    },
    /// An interaction kind the bot has no behavior for.
    Unsupported,
}

impl Interaction {
    /// The user who triggered the interaction (guild member or DM user).
    pub fn invoker(&self) -> Option<&User> {
        self.member
            .as_ref()
            .map(|m| &m.user)
            .or(self.user.as_ref())
    }

    pub fn action(&self) -> InteractionAction {
        match (self.kind, &self.data) {
            (INTERACTION_APPLICATION_COMMAND, Some(data)) => InteractionAction::Command {
                name: data.name.clone().unwrap_or_default(),
            },
            (INTERACTION_MODAL_SUBMIT, Some(data)) => {
                let mut fields = HashMap::new();
                for row in &data.components {
                    for input in &row.components {
                        fields.insert(input.custom_id.clone(), input.value.clone());
                    }
                }
                InteractionAction::ModalSubmit {
                    custom_id: data.custom_id.clone().unwrap_or_default(),
                    fields,
                }
            }
            _ => InteractionAction::Unsupported,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    t: Option<String>,
    #[serde(default)]
    d: serde_json::Value,
}

/// Decode one relay-delivered event body.
pub fn decode_event(body: &[u8]) -> Result<GatewayEvent, serde_json::Error> {
    let envelope: Envelope = serde_json::from_slice(body)?;
    let kind = envelope.t.unwrap_or_default();

    match kind.as_str() {
        "MESSAGE_CREATE" => Ok(GatewayEvent::MessageCreate(serde_json::from_value(
            envelope.d,
        )?)),
        "INTERACTION_CREATE" => Ok(GatewayEvent::InteractionCreate(serde_json::from_value(
            envelope.d,
        )?)),
        "THREAD_MEMBERS_UPDATE" => Ok(GatewayEvent::ThreadMembersUpdate(serde_json::from_value(
            envelope.d,
        )?)),
        _ => Ok(GatewayEvent::Ignored { kind }),
    }
}
