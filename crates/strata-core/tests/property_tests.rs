//! # Property-Based Tests
//!
//! Structural invariants of the history table under random operation
//! sequences, checked with proptest.

use proptest::collection::vec;
use proptest::prelude::*;
use strata_core::primitives::OPEN_TIMESTAMP;
use strata_core::{
    Encoded, FillDirection, HistoryConfig, HistoryTable, HoleFill, Media, MediaId, MessageId,
    MessageTags, PeerId, RenderedEntry, StableId, StorageBackend, StoreMessage, SummaryKey,
};

const PEER: PeerId = PeerId(7);

fn id(n: i32) -> MessageId {
    MessageId::new(PEER, 0, n)
}

/// Timestamps grow with ids; a retimed message moves to the odd slot.
fn timestamp(n: i32, retimed: bool) -> i32 {
    2 * n + i32::from(retimed)
}

fn stored(n: i32, tags: MessageTags) -> StoreMessage {
    StoreMessage::new(id(n), timestamp(n, false)).with_tags(tags)
}

#[derive(Debug, Clone)]
enum Op {
    Insert(i32, MessageTags),
    Remove(i32),
    AddHole(i32),
    Retime(i32, bool),
    Fill(i32, HoleFill, Option<MessageTags>, Vec<i32>),
    FillMultiple(i32, HoleFill, MessageTags, Vec<i32>),
}

fn fill_strategy() -> impl Strategy<Value = HoleFill> {
    prop_oneof![
        Just(HoleFill::complete()),
        Just(HoleFill::partial(FillDirection::UpperToLower)),
        Just(HoleFill::partial(FillDirection::LowerToUpper)),
    ]
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (1i32..200).prop_map(|n| Op::Insert(n, MessageTags::empty())),
        2 => (1i32..200).prop_map(Op::Remove),
        2 => (1i32..200).prop_map(Op::AddHole),
        1 => (1i32..200, any::<bool>()).prop_map(|(n, retimed)| Op::Retime(n, retimed)),
        1 => (1i32..200, fill_strategy(), vec(1i32..200, 0..5))
            .prop_map(|(anchor, fill, ids)| Op::Fill(anchor, fill, None, ids)),
    ]
}

/// Tags drawn from the two view bits of [`tagged_config`].
fn tags_strategy() -> impl Strategy<Value = MessageTags> {
    (0u32..4).prop_map(MessageTags)
}

fn view_tag_strategy() -> impl Strategy<Value = MessageTags> {
    (0u8..2).prop_map(MessageTags::bit)
}

fn tagged_op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (1i32..120, tags_strategy()).prop_map(|(n, tags)| Op::Insert(n, tags)),
        2 => (1i32..120).prop_map(Op::Remove),
        2 => (1i32..120).prop_map(Op::AddHole),
        1 => (1i32..120, any::<bool>()).prop_map(|(n, retimed)| Op::Retime(n, retimed)),
        1 => (
            1i32..120,
            fill_strategy(),
            proptest::option::of(view_tag_strategy()),
            vec(1i32..120, 0..5),
        )
            .prop_map(|(anchor, fill, tag, ids)| Op::Fill(anchor, fill, tag, ids)),
        1 => (1i32..120, fill_strategy(), view_tag_strategy(), vec(1i32..120, 0..5))
            .prop_map(|(anchor, fill, tag, ids)| Op::FillMultiple(anchor, fill, tag, ids)),
    ]
}

fn tagged_config() -> HistoryConfig {
    HistoryConfig::new(MessageTags::bit(0) | MessageTags::bit(1), MessageTags::empty())
}

fn fetched(ids: &[i32], tags: MessageTags) -> Vec<StoreMessage> {
    ids.iter().map(|n| stored(*n, tags)).collect()
}

fn apply(history: &mut HistoryTable<StorageBackend>, op: &Op) {
    match op {
        Op::Insert(n, tags) => {
            history.insert(&[stored(*n, *tags)]).expect("insert");
        }
        Op::Remove(n) => {
            history.remove(&[id(*n)]).expect("remove");
        }
        Op::AddHole(n) => {
            history.add_hole(id(*n)).expect("hole");
        }
        Op::Retime(n, retimed) => {
            let current = history
                .message(id(*n), &history.peers())
                .expect("read");
            if let Some(current) = current {
                let message = StoreMessage::new(id(*n), timestamp(*n, *retimed))
                    .with_tags(current.tags);
                history.update(id(*n), &message).expect("update");
            }
        }
        Op::Fill(anchor, fill, tag, ids) => {
            let messages = fetched(ids, tag.unwrap_or_default());
            history
                .fill_hole(id(*anchor), *fill, *tag, &messages)
                .expect("fill");
        }
        Op::FillMultiple(anchor, fill, tag, ids) => {
            history
                .fill_multiple_holes(id(*anchor), *fill, *tag, &fetched(ids, *tag))
                .expect("fill");
        }
    }
}

fn listing(history: &HistoryTable<StorageBackend>) -> Vec<RenderedEntry> {
    history.debug_list(PEER, &history.peers()).expect("list")
}

/// Ordered, non-overlapping, no empty or adjacent holes, holes maximal, and
/// every hole bounded by the timestamp of the message above it.
fn check_sequence(entries: &[RenderedEntry]) -> Result<(), TestCaseError> {
    let mut previous: Option<&RenderedEntry> = None;
    for entry in entries {
        let (lo, hi) = entry.id_range();
        prop_assert!(lo <= hi, "empty entry {:?}", entry);
        if let Some(before) = previous {
            let (_, before_hi) = before.id_range();
            prop_assert!(before_hi < lo, "overlap {:?} / {:?}", before, entry);
            let both_holes = matches!(
                (before, entry),
                (RenderedEntry::Hole(_), RenderedEntry::Hole(_))
            );
            prop_assert!(!both_holes, "adjacent holes {:?} / {:?}", before, entry);
            if matches!(entry, RenderedEntry::Hole(_)) {
                prop_assert_eq!(lo, before_hi + 1);
            }
            if matches!(before, RenderedEntry::Hole(_)) {
                prop_assert_eq!(before_hi, lo - 1);
            }
        } else if matches!(entry, RenderedEntry::Hole(_)) {
            prop_assert_eq!(lo, 1);
        }
        previous = Some(entry);
    }
    if let Some(RenderedEntry::Hole(hole)) = entries.last() {
        prop_assert_eq!(hole.max(), i32::MAX);
        prop_assert_eq!(hole.max_index.timestamp, OPEN_TIMESTAMP);
    }
    for pair in entries.windows(2) {
        if let (RenderedEntry::Hole(hole), RenderedEntry::Message(above)) = (&pair[0], &pair[1]) {
            prop_assert_eq!(hole.max_index.timestamp, above.timestamp, "stale bound {:?}", hole);
        }
    }
    Ok(())
}

/// Kind, id range and stable id of an entry.
fn outline(entry: &RenderedEntry) -> (bool, (i32, i32), StableId) {
    (
        matches!(entry, RenderedEntry::Hole(_)),
        entry.id_range(),
        entry.stable_id(),
    )
}

fn in_view(entry: &RenderedEntry, tag: MessageTags) -> bool {
    match entry {
        RenderedEntry::Message(message) => message.tags.contains(tag),
        RenderedEntry::Hole(hole) => hole.tags.contains(tag),
    }
}

/// Each tag view is the ordered sub-sequence of the primary listing visible
/// under that tag.
fn check_views(history: &HistoryTable<StorageBackend>) -> Result<(), TestCaseError> {
    let primary = listing(history);
    for bit in 0u8..2 {
        let tag = MessageTags::bit(bit);
        let expected: Vec<_> = primary
            .iter()
            .filter(|entry| in_view(entry, tag))
            .map(outline)
            .collect();
        let view: Vec<_> = history
            .debug_list_tag(tag, PEER, &history.peers())
            .expect("list tag")
            .iter()
            .map(outline)
            .collect();
        prop_assert_eq!(view, expected, "view of bit {}", bit);
    }
    Ok(())
}

fn media_for(n: i32) -> Media {
    Media::External {
        id: MediaId::new(0, i64::from(n % 3)),
        payload: Encoded::from_raw(1, vec![(n % 3) as u8]),
    }
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Any operation sequence keeps the primary sequence well formed.
    #[test]
    fn sequence_stays_well_formed(ops in vec(op_strategy(), 1..40)) {
        let mut history = HistoryTable::in_memory(HistoryConfig::default()).expect("history");
        for op in &ops {
            apply(&mut history, op);
            check_sequence(&listing(&history))?;
        }
    }

    /// Tagged inserts and fills keep every tag view a mirror of the primary
    /// sequence.
    #[test]
    fn tag_views_mirror_primary(ops in vec(tagged_op_strategy(), 1..40)) {
        let mut history = HistoryTable::in_memory(tagged_config()).expect("history");
        for op in &ops {
            apply(&mut history, op);
            check_sequence(&listing(&history))?;
            check_views(&history)?;
        }
    }

    /// add_hole twice in a row equals add_hole once.
    #[test]
    fn add_hole_idempotent(ops in vec(op_strategy(), 0..20), at in 1i32..200) {
        let mut history = HistoryTable::in_memory(HistoryConfig::default()).expect("history");
        for op in &ops {
            apply(&mut history, op);
        }

        history.add_hole(id(at)).expect("hole");
        let once = listing(&history);
        let changes = history.add_hole(id(at)).expect("hole");

        prop_assert!(changes.is_empty());
        prop_assert_eq!(once, listing(&history));
    }

    /// Every shared record counts exactly the stored messages referencing it.
    #[test]
    fn media_refcount_matches_references(
        inserts in vec(1i32..60, 1..30),
        removes in vec(1i32..60, 0..30),
    ) {
        let mut history = HistoryTable::in_memory(HistoryConfig::default()).expect("history");
        for n in &inserts {
            history
                .insert(&[StoreMessage::new(id(*n), *n).with_media(media_for(*n))])
                .expect("insert");
        }
        history
            .remove(&removes.iter().map(|n| id(*n)).collect::<Vec<_>>())
            .expect("remove");

        for key in 0i64..3 {
            let media = MediaId::new(0, key);
            let referencing = listing(&history)
                .iter()
                .filter(|entry| match entry {
                    RenderedEntry::Message(message) => {
                        message.media.iter().any(|item| item.id() == Some(media))
                    }
                    RenderedEntry::Hole(_) => false,
                })
                .count();
            let stored = history.media(media).expect("media");
            match stored {
                Some(record) => {
                    prop_assert!(record.reference_count >= 1);
                    prop_assert_eq!(record.reference_count as usize, referencing);
                }
                None => prop_assert_eq!(referencing, 0),
            }
        }
    }

    /// Only authoritative replacement moves a summary version.
    #[test]
    fn summary_version_moves_only_on_replace(
        steps in vec((0u8..3, 1i32..100), 1..40),
    ) {
        let tag = MessageTags::bit(3);
        let config = HistoryConfig::new(tag, tag);
        let mut history = HistoryTable::in_memory(config).expect("history");
        let key = SummaryKey::new(tag, PEER, 0);
        let mut replaces = 0;

        for (kind, n) in steps {
            match kind {
                0 => {
                    history
                        .insert(&[StoreMessage::new(id(n), n).with_tags(tag)])
                        .expect("insert");
                }
                1 => {
                    history.remove(&[id(n)]).expect("remove");
                }
                _ => {
                    history.replace_tag_summary(key, n, n).expect("replace");
                    replaces += 1;
                }
            }
            if let Some(summary) = history.tag_summary(key).expect("summary") {
                prop_assert_eq!(summary.version, replaces);
                prop_assert!(summary.count >= 0);
            }
        }
    }
}
