//! # Strata CLI Module
//!
//! This module implements the CLI interface for Strata.
//!
//! ## Available Commands
//!
//! - `init` - Initialize a new database
//! - `insert` - Insert messages (inline or from a JSON file)
//! - `update` - Replace a message with one read from a JSON file
//! - `remove` - Remove messages
//! - `hole` - Mark the gap around an id as unknown
//! - `fill` - Fill a hole with fetched messages
//! - `list` - List the history of a peer, or one tag view
//! - `search` - Full-text search
//! - `summary` - Show or replace a tag summary
//! - `action` - Set, clear or list pending actions
//! - `media` - List shared media records
//! - `unsent` - List messages awaiting delivery
//! - `peer` - Store a peer in the directory

mod commands;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use strata_core::{FillDirection, MessageId, PeerId, StrataError};

pub use commands::*;

use crate::config::AppConfig;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Strata - message history storage
///
/// Ordered, gap-aware message histories with tag views, shared media,
/// summaries, pending actions and full-text search.
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress confirmation output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the history database (overrides `[storage] path`)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Path to a strata.toml config file
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// One message slot.
#[derive(Args, Debug, Clone, Copy)]
pub struct Slot {
    /// Conversation id
    #[arg(short, long)]
    pub peer: i64,

    /// Message namespace
    #[arg(short, long, default_value = "0")]
    pub namespace: i32,

    /// Message id
    #[arg(short, long)]
    pub id: i32,
}

impl Slot {
    pub fn message_id(self) -> MessageId {
        MessageId::new(PeerId(self.peer), self.namespace, self.id)
    }
}

/// Fill direction as accepted on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    UpperToLower,
    LowerToUpper,
}

impl From<Direction> for FillDirection {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::UpperToLower => FillDirection::UpperToLower,
            Direction::LowerToUpper => FillDirection::LowerToUpper,
        }
    }
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Insert messages
    Insert {
        /// JSON file holding an array of messages
        #[arg(short, long, conflicts_with_all = ["peer", "id"])]
        file: Option<PathBuf>,

        /// Conversation id (inline message)
        #[arg(short, long, required_unless_present = "file")]
        peer: Option<i64>,

        /// Message namespace (inline message)
        #[arg(short, long, default_value = "0")]
        namespace: i32,

        /// Message id (inline message)
        #[arg(short, long, required_unless_present = "file")]
        id: Option<i32>,

        /// Timestamp (inline message, defaults to the id)
        #[arg(short, long)]
        timestamp: Option<i32>,

        /// Message text (inline message)
        #[arg(long, default_value = "")]
        text: String,

        /// Tag mask (inline message)
        #[arg(long, default_value = "0")]
        tags: u32,

        /// Flag mask (inline message)
        #[arg(long, default_value = "0")]
        flags: u32,
    },

    /// Replace a message
    Update {
        #[command(flatten)]
        previous: Slot,

        /// JSON file holding the replacement message
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Remove messages
    Remove {
        /// Conversation id
        #[arg(short, long)]
        peer: i64,

        /// Message namespace
        #[arg(short, long, default_value = "0")]
        namespace: i32,

        /// Message ids to remove
        #[arg(required = true)]
        ids: Vec<i32>,
    },

    /// Mark the gap around an id as unknown
    Hole {
        #[command(flatten)]
        slot: Slot,
    },

    /// Fill a hole with fetched messages
    Fill {
        /// Anchor inside the hole
        #[command(flatten)]
        anchor: Slot,

        /// JSON file holding an array of fetched messages
        #[arg(short, long)]
        file: PathBuf,

        /// Direction of a partial fill; omitted means the fill is complete
        #[arg(short, long, value_enum)]
        direction: Option<Direction>,

        /// Tag bit (0-31) of the view being filled
        #[arg(long)]
        tag: Option<u8>,

        /// Fill several discontiguous holes of the tag view
        #[arg(long, requires = "tag")]
        multiple: bool,
    },

    /// List the history of a peer
    List {
        /// Conversation id
        #[arg(short, long)]
        peer: i64,

        /// Tag bit (0-31): list that tag view instead of the full history
        #[arg(long)]
        tag: Option<u8>,
    },

    /// Full-text search
    Search {
        /// Query text
        query: String,

        /// Restrict to one conversation
        #[arg(short, long)]
        peer: Option<i64>,

        /// Required tag mask
        #[arg(long)]
        tags: Option<u32>,
    },

    /// Show or replace a tag summary
    Summary {
        /// Conversation id
        #[arg(short, long)]
        peer: i64,

        /// Message namespace
        #[arg(short, long, default_value = "0")]
        namespace: i32,

        /// Tag bit (0-31)
        #[arg(long)]
        tag: u8,

        /// Authoritative count to store
        #[arg(long, requires = "replace_max_id")]
        replace_count: Option<i32>,

        /// Upper id bound of the authoritative snapshot
        #[arg(long, requires = "replace_count")]
        replace_max_id: Option<i32>,
    },

    /// Manage pending actions
    Action {
        #[command(subcommand)]
        command: ActionCommands,
    },

    /// List shared media records
    Media,

    /// List messages awaiting delivery
    Unsent,

    /// Store a peer in the directory
    Peer {
        /// Peer id
        #[arg(short, long)]
        id: i64,

        /// Display name
        #[arg(long)]
        name: String,
    },
}

/// Pending action subcommands.
#[derive(Subcommand, Debug)]
pub enum ActionCommands {
    /// Set the action of a message
    Set {
        #[command(flatten)]
        slot: Slot,

        /// Action type
        #[arg(short = 't', long)]
        action_type: u32,

        /// Payload text
        #[arg(long)]
        data: String,

        /// Payload type tag
        #[arg(long, default_value = "0")]
        data_tag: u32,
    },

    /// Clear the action of a message
    Clear {
        #[command(flatten)]
        slot: Slot,

        /// Action type
        #[arg(short = 't', long)]
        action_type: u32,
    },

    /// List every action of one type
    List {
        /// Action type
        #[arg(short = 't', long)]
        action_type: u32,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), StrataError> {
    let config = AppConfig::resolve(cli.config.as_deref())?;
    let db_path = config.database(cli.database.as_deref());
    let output = Output {
        json_mode: cli.json_mode,
        quiet: cli.quiet,
    };
    let context = CommandContext {
        db_path: &db_path,
        history: &config.history,
        output,
    };

    match cli.command {
        Commands::Init { force } => cmd_init(&context, force),
        Commands::Insert {
            file,
            peer,
            namespace,
            id,
            timestamp,
            text,
            tags,
            flags,
        } => {
            let inline = match (peer, id) {
                (Some(peer), Some(id)) => Some(InlineMessage {
                    id: MessageId::new(PeerId(peer), namespace, id),
                    timestamp: timestamp.unwrap_or(id),
                    text,
                    tags,
                    flags,
                }),
                _ => None,
            };
            cmd_insert(&context, file.as_deref(), inline)
        }
        Commands::Update { previous, file } => {
            cmd_update(&context, previous.message_id(), &file)
        }
        Commands::Remove {
            peer,
            namespace,
            ids,
        } => cmd_remove(&context, PeerId(peer), namespace, &ids),
        Commands::Hole { slot } => cmd_hole(&context, slot.message_id()),
        Commands::Fill {
            anchor,
            file,
            direction,
            tag,
            multiple,
        } => cmd_fill(
            &context,
            anchor.message_id(),
            &file,
            direction.map(FillDirection::from),
            tag,
            multiple,
        ),
        Commands::List { peer, tag } => cmd_list(&context, PeerId(peer), tag),
        Commands::Search { query, peer, tags } => {
            cmd_search(&context, &query, peer.map(PeerId), tags)
        }
        Commands::Summary {
            peer,
            namespace,
            tag,
            replace_count,
            replace_max_id,
        } => {
            let replace = replace_count.zip(replace_max_id);
            cmd_summary(&context, PeerId(peer), namespace, tag, replace)
        }
        Commands::Action { command } => match command {
            ActionCommands::Set {
                slot,
                action_type,
                data,
                data_tag,
            } => cmd_action_set(&context, slot.message_id(), action_type, data_tag, data),
            ActionCommands::Clear { slot, action_type } => {
                cmd_action_clear(&context, slot.message_id(), action_type)
            }
            ActionCommands::List { action_type } => cmd_action_list(&context, action_type),
        },
        Commands::Media => cmd_media(&context),
        Commands::Unsent => cmd_unsent(&context),
        Commands::Peer { id, name } => cmd_peer(&context, PeerId(id), name),
    }
}
