//! # Full-Text Index
//!
//! Inverted index from normalized word tokens to messages.
//!
//! ## Tokenization
//!
//! Text is lowercased and split on every character that is not alphanumeric,
//! so quotes, operators and other punctuation never survive into a token.
//! Runs of CJK ideographs and kana are indexed as overlapping bigrams, since
//! those scripts do not separate words with spaces.
//!
//! ## Matching
//!
//! A query goes through the same tokenizer (capped at [`MAX_QUERY_TOKENS`])
//! and matches a message iff the message holds every query token. There is
//! no query syntax: `AND`, `OR` and quoted phrases are plain words.
//!
//! ## Tables
//!
//! - `TextTokens`: `(token, peer, namespace, id) -> tags at index time`
//! - `TextMessages`: `(peer, namespace, id) -> tokens`, used for removal

use crate::codec::{from_bytes, to_bytes};
use crate::primitives::{MAX_QUERY_TOKENS, MAX_TOKEN_CHARS};
use crate::storage::{KeyBuilder, KeyRange, KeyReader, ScanOrder, StoreRead, Table, Transaction};
use crate::{MessageId, MessageTags, PeerId, StrataError};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// TOKENIZER
// =============================================================================

fn is_cjk(ch: char) -> bool {
    matches!(
        ch,
        '\u{3040}'..='\u{30FF}'
            | '\u{3400}'..='\u{4DBF}'
            | '\u{4E00}'..='\u{9FFF}'
            | '\u{AC00}'..='\u{D7AF}'
            | '\u{F900}'..='\u{FAFF}'
            | '\u{20000}'..='\u{2A6DF}'
    )
}

fn push_token(tokens: &mut Vec<String>, token: String) {
    let token: String = token.chars().take(MAX_TOKEN_CHARS).collect();
    if !token.is_empty() && !tokens.contains(&token) {
        tokens.push(token);
    }
}

fn flush_word(tokens: &mut Vec<String>, word: &mut String) {
    if !word.is_empty() {
        push_token(tokens, std::mem::take(word));
    }
}

fn flush_cjk(tokens: &mut Vec<String>, run: &mut Vec<char>) {
    match run.len() {
        0 => {}
        1 => push_token(tokens, run.iter().collect()),
        _ => {
            for pair in run.windows(2) {
                push_token(tokens, pair.iter().collect());
            }
        }
    }
    run.clear();
}

/// Tokens in order of first appearance, without duplicates.
fn ordered_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut run = Vec::new();

    for ch in text.chars().flat_map(char::to_lowercase) {
        if is_cjk(ch) {
            flush_word(&mut tokens, &mut word);
            run.push(ch);
        } else if ch.is_alphanumeric() {
            flush_cjk(&mut tokens, &mut run);
            word.push(ch);
        } else {
            flush_word(&mut tokens, &mut word);
            flush_cjk(&mut tokens, &mut run);
        }
    }
    flush_word(&mut tokens, &mut word);
    flush_cjk(&mut tokens, &mut run);
    tokens
}

/// Normalized token set of `text`.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    ordered_tokens(text).into_iter().collect()
}

/// Query tokens of `query`, at most [`MAX_QUERY_TOKENS`].
pub fn sanitize_query(query: &str) -> Vec<String> {
    let mut tokens = ordered_tokens(query);
    tokens.truncate(MAX_QUERY_TOKENS);
    tokens
}

// =============================================================================
// INDEX
// =============================================================================

fn token_key(token: &str, id: MessageId) -> Vec<u8> {
    KeyBuilder::new()
        .str(token)
        .i64(id.peer_id.0)
        .i32(id.namespace)
        .i32(id.id)
        .build()
}

fn message_key(id: MessageId) -> Vec<u8> {
    KeyBuilder::new()
        .i64(id.peer_id.0)
        .i32(id.namespace)
        .i32(id.id)
        .build()
}

/// Index `text` for `id`, replacing any previous entry of `id`.
pub(crate) fn add(
    txn: &mut Transaction<'_>,
    id: MessageId,
    text: &str,
    tags: MessageTags,
) -> Result<(), StrataError> {
    remove(txn, id)?;
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return Ok(());
    }
    for token in &tokens {
        txn.set(Table::TextTokens, token_key(token, id), to_bytes(&tags)?);
    }
    let tokens: Vec<String> = tokens.into_iter().collect();
    txn.set(Table::TextMessages, message_key(id), to_bytes(&tokens)?);
    tracing::trace!(%id, tokens = tokens.len(), "text indexed");
    Ok(())
}

/// Purge every token association of `id`.
pub(crate) fn remove(txn: &mut Transaction<'_>, id: MessageId) -> Result<(), StrataError> {
    let Some(bytes) = txn.get(Table::TextMessages, &message_key(id))? else {
        return Ok(());
    };
    let tokens: Vec<String> = from_bytes(&bytes)?;
    for token in &tokens {
        txn.remove(Table::TextTokens, token_key(token, id));
    }
    txn.remove(Table::TextMessages, message_key(id));
    Ok(())
}

fn matches_for_token(
    store: &dyn StoreRead,
    token: &str,
    peer_id: Option<PeerId>,
) -> Result<BTreeMap<MessageId, MessageTags>, StrataError> {
    let mut prefix = KeyBuilder::new().str(token);
    if let Some(peer_id) = peer_id {
        prefix = prefix.i64(peer_id.0);
    }
    store
        .scan(
            Table::TextTokens,
            &KeyRange::prefix(prefix.build()),
            ScanOrder::Ascending,
            None,
        )?
        .into_iter()
        .map(|(key, bytes)| {
            let mut reader = KeyReader::new(&key);
            reader.str()?;
            let id = MessageId::new(PeerId(reader.i64()?), reader.i32()?, reader.i32()?);
            Ok((id, from_bytes(&bytes)?))
        })
        .collect()
}

/// Ids of messages holding every token of `query`, in id order.
pub fn search(
    store: &dyn StoreRead,
    peer_id: Option<PeerId>,
    query: &str,
    tags: Option<MessageTags>,
) -> Result<Vec<MessageId>, StrataError> {
    let tokens = sanitize_query(query);
    let mut candidates: Option<BTreeMap<MessageId, MessageTags>> = None;

    for token in &tokens {
        let found = matches_for_token(store, token, peer_id)?;
        let narrowed: BTreeMap<MessageId, MessageTags> = match candidates {
            None => found,
            Some(previous) => previous
                .into_iter()
                .filter(|(id, _)| found.contains_key(id))
                .collect(),
        };
        let exhausted = narrowed.is_empty();
        candidates = Some(narrowed);
        if exhausted {
            break;
        }
    }

    let results: Vec<MessageId> = candidates
        .unwrap_or_default()
        .into_iter()
        .filter(|(_, indexed)| tags.is_none_or(|wanted| indexed.contains(wanted)))
        .map(|(id, _)| id)
        .collect();
    tracing::debug!(tokens = tokens.len(), results = results.len(), "text search");
    Ok(results)
}

// =============================================================================
// TESTS
// =============================================================================
