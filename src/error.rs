//! User-facing failure conditions of a conversion run.
//!
//! Everything else (I/O, SQLite) travels as an `eyre::Report` with context
//! attached at the call site. These variants carry no source, so their
//! rendered message is exactly what the user sees.

use thiserror::Error;

/// Name of the archive member that holds the conversations.
pub const CONVERSATIONS_MEMBER: &str = "conversations.json";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
    /// Input is neither parseable JSON nor a readable ZIP archive.
    #[error("File is neither a valid ZIP nor a valid JSON file")]
    InvalidInput,

    /// The archive opened fine but lacks the conversations member.
    #[error("No '{name}' file found in the ZIP archive")]
    MissingMember { name: String },

    /// Valid JSON, but the root is not a list of objects.
    #[error("Expected a JSON array of conversation objects")]
    NotAConversationList,

    /// A conversation without a nested `account.uuid`.
    #[error("Conversation {conversation} has no account uuid")]
    MissingAccount { conversation: String },

    /// A required field is absent or has the wrong type.
    #[error("Missing required field '{field}' in {context}")]
    MissingField { field: String, context: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_message_is_exact() {
        assert_eq!(
            ConvertError::InvalidInput.to_string(),
            "File is neither a valid ZIP nor a valid JSON file"
        );
    }

    #[test]
    fn missing_member_names_the_member() {
        let err = ConvertError::MissingMember {
            name: CONVERSATIONS_MEMBER.to_string(),
        };
        assert_eq!(
            err.to_string(),
            "No 'conversations.json' file found in the ZIP archive"
        );
    }
}
