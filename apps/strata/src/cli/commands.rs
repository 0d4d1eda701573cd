//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use strata_core::{
    Encoded, FillDirection, HistoryChanges, HistoryConfig, HistoryOperation, HistoryTable,
    HoleFill, MessageFlags, MessageId, MessageTags, Peer, PeerId, RenderedEntry, StorageBackend,
    StoreMessage, StrataError, SummaryKey,
};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a message file (100 MB).
const MAX_MESSAGE_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), StrataError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| StrataError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(StrataError::DeserializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve a regular input file, following symlinks and `..`.
fn validate_file_path(path: &Path) -> Result<PathBuf, StrataError> {
    let canonical = path.canonicalize().map_err(|e| {
        StrataError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(StrataError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Read and parse a JSON input file.
fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StrataError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, MAX_MESSAGE_FILE_SIZE)?;
    let contents = std::fs::read(&validated)
        .map_err(|e| StrataError::IoError(format!("Read file: {}", e)))?;
    serde_json::from_slice(&contents).map_err(|e| {
        StrataError::DeserializationError(format!("Parse '{}': {}", path.display(), e))
    })
}

// =============================================================================
// CONTEXT & OUTPUT
// =============================================================================

/// Output switches shared by every command.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json_mode: bool,
    pub quiet: bool,
}

impl Output {
    fn json<T: Serialize>(self, value: &T) -> Result<(), StrataError> {
        let text = serde_json::to_string_pretty(value)
            .map_err(|e| StrataError::SerializationError(e.to_string()))?;
        println!("{}", text);
        Ok(())
    }

    fn confirm(self, message: &str) {
        if !self.quiet {
            println!("{}", message);
        }
    }
}

/// Everything a command needs besides its own arguments.
#[derive(Debug, Clone, Copy)]
pub struct CommandContext<'a> {
    pub db_path: &'a Path,
    pub history: &'a HistoryConfig,
    pub output: Output,
}

impl CommandContext<'_> {
    fn open(&self) -> Result<HistoryTable<StorageBackend>, StrataError> {
        HistoryTable::open(self.db_path, self.history.clone())
    }

    /// Print what a mutation changed.
    fn report(&self, action: &str, changes: &HistoryChanges) -> Result<(), StrataError> {
        if self.output.json_mode {
            return self.output.json(&changes_json(changes));
        }
        let operations: usize = changes.operations_by_peer.values().map(Vec::len).sum();
        self.output.confirm(&format!(
            "{}: {} history operations, {} unsent changes, {} pending action changes",
            action,
            operations,
            changes.unsent.len(),
            changes.pending_actions.len()
        ));
        Ok(())
    }
}

/// Message given on the command line instead of a file.
#[derive(Debug, Clone)]
pub struct InlineMessage {
    pub id: MessageId,
    pub timestamp: i32,
    pub text: String,
    pub tags: u32,
    pub flags: u32,
}

impl From<InlineMessage> for StoreMessage {
    fn from(inline: InlineMessage) -> Self {
        StoreMessage::new(inline.id, inline.timestamp)
            .with_text(inline.text)
            .with_tags(MessageTags(inline.tags))
            .with_flags(MessageFlags(inline.flags))
    }
}

/// Single-bit tag from a bit position.
fn tag_bit(bit: u8) -> Result<MessageTags, StrataError> {
    if bit >= 32 {
        return Err(StrataError::InvalidConfig(format!(
            "tag bit {} out of range 0-31",
            bit
        )));
    }
    Ok(MessageTags::bit(bit))
}

fn changes_json(changes: &HistoryChanges) -> serde_json::Value {
    let operations: BTreeMap<String, &Vec<HistoryOperation>> = changes
        .operations_by_peer
        .iter()
        .map(|(peer, operations)| (peer.to_string(), operations))
        .collect();
    let pending_counts: Vec<serde_json::Value> = changes
        .pending_counts
        .iter()
        .map(|(key, count)| serde_json::json!({ "key": key, "count": count }))
        .collect();
    let summaries: Vec<serde_json::Value> = changes
        .summaries
        .iter()
        .map(|(key, summary)| serde_json::json!({ "key": key, "summary": summary }))
        .collect();

    serde_json::json!({
        "operations": operations,
        "unsent": changes.unsent,
        "pending_actions": changes.pending_actions,
        "pending_counts": pending_counts,
        "summaries": summaries,
    })
}

fn describe(entry: &RenderedEntry) -> String {
    match entry {
        RenderedEntry::Message(message) => {
            let author = message
                .author
                .as_ref()
                .map(|peer| format!(" <{}>", peer.name))
                .unwrap_or_default();
            format!(
                "[{}] message {} ts={} tags={:#x}{} {}",
                message.stable_id.0,
                message.id,
                message.timestamp,
                message.tags.bits(),
                author,
                message.text
            )
        }
        RenderedEntry::Hole(hole) => format!(
            "[{}] hole {}..={} ts={} tags={:#x}",
            hole.stable_id.0,
            hole.min,
            hole.max(),
            hole.max_index.timestamp,
            hole.tags.bits()
        ),
    }
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new database.
pub fn cmd_init(context: &CommandContext<'_>, force: bool) -> Result<(), StrataError> {
    if context.db_path.exists() {
        if !force {
            return Err(StrataError::IoError(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(context.db_path)
            .map_err(|e| StrataError::IoError(format!("Remove database: {}", e)))?;
    }

    let _history = context.open()?;
    tracing::info!(path = %context.db_path.display(), "database initialized");
    context.output.confirm(&format!(
        "Initialized new database at {}",
        context.db_path.display()
    ));
    Ok(())
}

// =============================================================================
// MESSAGE COMMANDS
// =============================================================================

/// Insert messages from a file or one inline message.
pub fn cmd_insert(
    context: &CommandContext<'_>,
    file: Option<&Path>,
    inline: Option<InlineMessage>,
) -> Result<(), StrataError> {
    let messages: Vec<StoreMessage> = match (file, inline) {
        (Some(file), _) => read_json(file)?,
        (None, Some(inline)) => vec![inline.into()],
        (None, None) => {
            return Err(StrataError::InvalidConfig(
                "insert needs --file or --peer and --id".to_string(),
            ));
        }
    };

    tracing::info!(count = messages.len(), "inserting messages");
    let mut history = context.open()?;
    let changes = history.insert(&messages)?;
    context.report(&format!("Inserted {} messages", messages.len()), &changes)
}

/// Replace the message at `previous` with the one in `file`.
pub fn cmd_update(
    context: &CommandContext<'_>,
    previous: MessageId,
    file: &Path,
) -> Result<(), StrataError> {
    let message: StoreMessage = read_json(file)?;
    let mut history = context.open()?;
    let changes = history.update(previous, &message)?;
    context.report(&format!("Updated {}", previous), &changes)
}

pub fn cmd_remove(
    context: &CommandContext<'_>,
    peer_id: PeerId,
    namespace: i32,
    ids: &[i32],
) -> Result<(), StrataError> {
    let ids: Vec<MessageId> = ids
        .iter()
        .map(|id| MessageId::new(peer_id, namespace, *id))
        .collect();
    let mut history = context.open()?;
    let changes = history.remove(&ids)?;
    context.report(&format!("Removed up to {} messages", ids.len()), &changes)
}

// =============================================================================
// HOLE COMMANDS
// =============================================================================

pub fn cmd_hole(context: &CommandContext<'_>, id: MessageId) -> Result<(), StrataError> {
    let mut history = context.open()?;
    let changes = history.add_hole(id)?;
    context.report(&format!("Hole around {}", id), &changes)
}

/// Fill the hole containing `anchor` with the messages in `file`.
pub fn cmd_fill(
    context: &CommandContext<'_>,
    anchor: MessageId,
    file: &Path,
    direction: Option<FillDirection>,
    tag: Option<u8>,
    multiple: bool,
) -> Result<(), StrataError> {
    let messages: Vec<StoreMessage> = read_json(file)?;
    let fill = direction.map_or(HoleFill::complete(), HoleFill::partial);
    let tags = tag.map(tag_bit).transpose()?;

    let mut history = context.open()?;
    let changes = if multiple {
        let tags = tags.ok_or_else(|| {
            StrataError::InvalidConfig("--multiple needs --tag".to_string())
        })?;
        history.fill_multiple_holes(anchor, fill, tags, &messages)?
    } else {
        history.fill_hole(anchor, fill, tags, &messages)?
    };
    context.report(&format!("Filled {} with {} messages", anchor, messages.len()), &changes)
}

// =============================================================================
// READ COMMANDS
// =============================================================================

/// List the full history of a peer, or one tag view of it.
pub fn cmd_list(
    context: &CommandContext<'_>,
    peer_id: PeerId,
    tag: Option<u8>,
) -> Result<(), StrataError> {
    let history = context.open()?;
    let directory = history.peers();
    let entries = match tag {
        Some(bit) => history.debug_list_tag(tag_bit(bit)?, peer_id, &directory)?,
        None => history.debug_list(peer_id, &directory)?,
    };

    if context.output.json_mode {
        return context.output.json(&entries);
    }

    match tag {
        Some(bit) => println!("History of peer {} (tag bit {})", peer_id, bit),
        None => println!("History of peer {}", peer_id),
    }
    println!("====================");
    for entry in &entries {
        println!("{}", describe(entry));
    }
    println!();
    println!("{} entries", entries.len());
    Ok(())
}

pub fn cmd_search(
    context: &CommandContext<'_>,
    query: &str,
    peer_id: Option<PeerId>,
    tags: Option<u32>,
) -> Result<(), StrataError> {
    let history = context.open()?;
    let results = history.search(peer_id, query, tags.map(MessageTags))?;

    if context.output.json_mode {
        return context.output.json(&results);
    }
    for id in &results {
        println!("{}", id);
    }
    context
        .output
        .confirm(&format!("{} matches for {:?}", results.len(), query));
    Ok(())
}

/// Show a tag summary, replacing it first when a snapshot is given.
pub fn cmd_summary(
    context: &CommandContext<'_>,
    peer_id: PeerId,
    namespace: i32,
    tag: u8,
    replace: Option<(i32, i32)>,
) -> Result<(), StrataError> {
    let key = SummaryKey::new(tag_bit(tag)?, peer_id, namespace);
    let mut history = context.open()?;
    if let Some((count, max_id)) = replace {
        history.replace_tag_summary(key, count, max_id)?;
        tracing::info!(tag, count, max_id, "summary replaced");
    }

    let summary = history.tag_summary(key)?;
    if context.output.json_mode {
        return context.output.json(&serde_json::json!({ "key": key, "summary": summary }));
    }
    match summary {
        Some(summary) => println!(
            "Summary tag bit {} of {}:{}: version={} count={} max_id={}",
            tag, peer_id, namespace, summary.version, summary.count, summary.max_id
        ),
        None => println!("No summary for tag bit {} of {}:{}", tag, peer_id, namespace),
    }
    Ok(())
}

pub fn cmd_media(context: &CommandContext<'_>) -> Result<(), StrataError> {
    let history = context.open()?;
    let records = history.media_records()?;

    if context.output.json_mode {
        return context.output.json(&records);
    }
    for record in &records {
        println!(
            "media {}:{} refs={} payload={} bytes (type {})",
            record.id.namespace,
            record.id.id,
            record.reference_count,
            record.payload.len(),
            record.payload.type_tag
        );
    }
    context
        .output
        .confirm(&format!("{} media records", records.len()));
    Ok(())
}

pub fn cmd_unsent(context: &CommandContext<'_>) -> Result<(), StrataError> {
    let history = context.open()?;
    let ids = history.unsent_ids()?;

    if context.output.json_mode {
        return context.output.json(&ids);
    }
    for id in &ids {
        println!("{}", id);
    }
    context
        .output
        .confirm(&format!("{} messages awaiting delivery", ids.len()));
    Ok(())
}

// =============================================================================
// PENDING ACTION COMMANDS
// =============================================================================

pub fn cmd_action_set(
    context: &CommandContext<'_>,
    id: MessageId,
    action_type: u32,
    data_tag: u32,
    data: String,
) -> Result<(), StrataError> {
    let payload = Encoded::from_raw(data_tag, data.into_bytes());
    let mut history = context.open()?;
    let changes = history.set_pending_action(id, action_type, Some(payload))?;
    context.report(&format!("Action {} on {}", action_type, id), &changes)
}

pub fn cmd_action_clear(
    context: &CommandContext<'_>,
    id: MessageId,
    action_type: u32,
) -> Result<(), StrataError> {
    let mut history = context.open()?;
    let changes = history.set_pending_action(id, action_type, None)?;
    context.report(&format!("Cleared action {} on {}", action_type, id), &changes)
}

pub fn cmd_action_list(context: &CommandContext<'_>, action_type: u32) -> Result<(), StrataError> {
    let history = context.open()?;
    let records = history.pending_actions(action_type)?;

    if context.output.json_mode {
        return context.output.json(&records);
    }
    for record in &records {
        println!(
            "{} {}",
            record.id,
            String::from_utf8_lossy(&record.data.bytes)
        );
    }
    context
        .output
        .confirm(&format!("{} pending actions of type {}", records.len(), action_type));
    Ok(())
}

// =============================================================================
// PEER COMMAND
// =============================================================================

pub fn cmd_peer(
    context: &CommandContext<'_>,
    id: PeerId,
    name: String,
) -> Result<(), StrataError> {
    let mut history = context.open()?;
    history.set_peer(&Peer::new(id, name))?;
    context.output.confirm(&format!("Stored peer {}", id));
    Ok(())
}
