//! Shape of a Claude.ai `conversations.json` export.
//!
//! The export is an array of conversation objects:
//!
//! ```json
//! [{
//!   "uuid": "…",
//!   "name": "…",
//!   "created_at": "…",
//!   "updated_at": "…",
//!   "account": { "uuid": "…" },
//!   "chat_messages": [
//!     { "uuid": "…", "text": "…", "sender": "human" | "assistant", "created_at": "…", … }
//!   ]
//! }]
//! ```
//!
//! Only `uuid`, `account.uuid`, `chat_messages`, and per-message `uuid`,
//! `sender`, `text` are interpreted. Every other field is carried through to
//! the database unchanged, so new export fields become new columns.

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ConvertError;

/// A JSON object as it appears in the export.
pub type Record = Map<String, Value>;

/// Sender value that marks an assistant message.
pub const ASSISTANT: &str = "assistant";

/// A conversation with its nested parts pulled out.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitConversation {
    pub id: String,
    pub account_id: String,
    /// Row for the `conversations` table: the original fields without
    /// `account` and `chat_messages`, plus a trailing `account_id`.
    pub row: Record,
    pub messages: Vec<Record>,
}

/// Detaches `account` and `chat_messages` from a raw conversation.
///
/// A missing or malformed `account.uuid` is fatal. A missing message list is
/// treated as empty.
pub fn split_conversation(mut row: Record) -> Result<SplitConversation, ConvertError> {
    let id = row
        .get("uuid")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| ConvertError::MissingField {
            field: "uuid".into(),
            context: "conversation".into(),
        })?;

    let account_id = match row.shift_remove("account") {
        Some(Value::Object(mut account)) => match account.remove("uuid") {
            Some(Value::String(uuid)) => uuid,
            _ => return Err(ConvertError::MissingAccount { conversation: id }),
        },
        _ => return Err(ConvertError::MissingAccount { conversation: id }),
    };

    let messages = match row.shift_remove("chat_messages") {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(message) => Some(message),
                other => {
                    warn!(conversation = %id, "skipping non-object message: {}", other);
                    None
                }
            })
            .collect(),
        None | Some(Value::Null) => Vec::new(),
        Some(other) => {
            warn!(conversation = %id, "chat_messages is not an array: {}", other);
            Vec::new()
        }
    };

    row.insert("account_id".into(), Value::String(account_id.clone()));

    Ok(SplitConversation {
        id,
        account_id,
        row,
        messages,
    })
}

/// Read-only view over one message record.
#[derive(Debug, Clone, Copy)]
pub struct MessageView<'a> {
    record: &'a Record,
}

impl<'a> MessageView<'a> {
    pub fn new(record: &'a Record) -> Self {
        Self { record }
    }

    pub fn uuid(&self, conversation_id: &str) -> Result<&'a str, ConvertError> {
        self.record
            .get("uuid")
            .and_then(Value::as_str)
            .ok_or_else(|| ConvertError::MissingField {
                field: "uuid".into(),
                context: format!("message of conversation {}", conversation_id),
            })
    }

    pub fn sender(&self) -> &'a str {
        self.str_field("sender")
    }

    pub fn text(&self) -> &'a str {
        self.str_field("text")
    }

    pub fn is_assistant(&self) -> bool {
        self.sender() == ASSISTANT
    }

    fn str_field(&self, key: &str) -> &'a str {
        self.record.get(key).and_then(Value::as_str).unwrap_or("")
    }
}

/// Row for the `messages` table: the message plus a trailing `conversation_id`.
pub fn message_row(message: Record, conversation_id: &str) -> Record {
    let mut row = message;
    row.insert(
        "conversation_id".into(),
        Value::String(conversation_id.to_owned()),
    );
    row
}
