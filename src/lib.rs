//! # claude-to-sqlite
//!
//! Converts a [Claude.ai](https://claude.ai) data export into a SQLite database.
//!
//! ## What it does
//!
//! The export is a ZIP archive holding `conversations.json` (the bare JSON file
//! works too). Every conversation becomes a row in `conversations`, every chat
//! message a row in `messages`. Assistant messages are additionally scanned for
//! `<antArtifact>` blocks, which land in `artifacts` together with the
//! `<antThinking>` note that introduced them.
//!
//! Artifacts are versioned: each time an assistant rewrites the artifact with a
//! given identifier in a conversation, the next row gets the next version, so
//! `conv-calc-1`, `conv-calc-2`, … trace its history.
//!
//! ## Re-running
//!
//! Rows are upserted by primary key. Converting the same export into the same
//! database twice leaves it unchanged; converting a newer export updates it in
//! place. Columns are created on demand, so fields added to the export format
//! later simply show up as new columns.
//!
//! ## Usage
//!
//! ```sh
//! claude-to-sqlite claude.zip claude.db
//! ```
//!
//! Preferences can be persisted in `~/.config/claude-to-sqlite/config.toml`.

pub mod artifacts;
pub mod error;
pub mod importer;
pub mod sequential;
pub mod store;
pub mod utils;
