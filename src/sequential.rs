use eyre::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::artifacts::{VersionTracker, extract_artifacts};
use crate::importer::{MessageView, Record, message_row, split_conversation};
use crate::store::{self, ARTIFACTS, CONVERSATIONS, MESSAGES, Store};
use crate::utils::{ConvertConfig, ConvertStats, load_export};

/// The main entry point for the conversion.
/// Loads the export, writes every row inside one transaction, and reports.
pub fn execute(config: ConvertConfig) -> Result<ConvertStats> {
    let conversations = load_export(&config.export_path)?;
    info!(
        count = conversations.len(),
        path = %config.export_path.display(),
        "loaded export"
    );

    let mut store = Store::open(&config.db_path)?;
    let pb = progress_bar(conversations.len() as u64, config.quiet);

    let stats = convert_in_transaction(conversations, &mut store, &pb)?;

    if !config.quiet {
        eprintln!(
            "Done. {} conversation(s), {} message(s), {} artifact(s).",
            stats.conversations, stats.messages, stats.artifacts
        );
    }

    Ok(stats)
}

// The bar is cleared before any error reaches the caller, so it never
// lingers above the error message.
fn convert_in_transaction(
    conversations: Vec<Record>,
    store: &mut Store,
    pb: &ProgressBar,
) -> Result<ConvertStats> {
    store.begin()?;
    let converted = convert(conversations, store, pb);
    pb.finish_and_clear();
    let stats = converted?;
    store.commit()?;
    Ok(stats)
}

fn progress_bar(total: u64, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)",
    ) {
        bar.set_style(style.progress_chars("=>-"));
    }
    bar
}

/// Writes conversations, their messages, and the artifacts found in assistant
/// messages. Order matters: artifact versions are assigned as tags are met,
/// conversation by conversation, message by message.
pub fn convert(
    conversations: Vec<Record>,
    store: &mut Store,
    pb: &ProgressBar,
) -> Result<ConvertStats> {
    let mut versions = VersionTracker::new();
    let mut stats = ConvertStats::default();

    for raw in conversations {
        let conversation = split_conversation(raw)?;
        let conversation_id = conversation.id.as_str();

        store
            .upsert(&CONVERSATIONS, &conversation.row)
            .wrap_err_with(|| format!("Failed to store conversation {}", conversation_id))?;
        stats.conversations += 1;

        debug!(
            conversation = conversation_id,
            messages = conversation.messages.len(),
            "converting conversation"
        );

        for message in conversation.messages {
            let view = MessageView::new(&message);
            let message_id = view.uuid(conversation_id)?.to_owned();

            let artifacts = if view.is_assistant() {
                extract_artifacts(view.text(), conversation_id, &message_id, &mut versions)
            } else {
                Vec::new()
            };

            store.upsert(&MESSAGES, &message_row(message, conversation_id))?;
            stats.messages += 1;

            let rows = artifacts
                .iter()
                .map(store::to_record)
                .collect::<Result<Vec<_>>>()?;
            stats.artifacts += store.upsert_all(&ARTIFACTS, &rows)?;

            if !rows.is_empty() {
                debug!(
                    message = %message_id,
                    artifacts = rows.len(),
                    "extracted artifacts"
                );
            }
        }

        pb.inc(1);
    }

    Ok(stats)
}
