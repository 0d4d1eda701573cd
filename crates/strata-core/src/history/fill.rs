//! Hole fill resolution.
//!
//! A fill first inserts the fetched messages with the ordinary insert rule,
//! which splits the target hole around them. It then computes a resolution
//! range from the target hole and the fetched ids, and resolves every hole
//! lying fully inside that range:
//!
//! - untagged fill: the hole is dropped from the primary sequence;
//! - tagged fill: only the fill's tag bits are cleared from the hole mask,
//!   so the range stays unknown for every other tag view.

use super::Context;
use super::index::{self, IndexEntry, Space};
use crate::operations::HistoryOperation;
use crate::{FillDirection, HoleFill, MessageId, MessageTags, StoreMessage, StrataError};

/// Which fill operation computes the resolution range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FillScope {
    /// One hole; the range never leaves the target hole.
    Single,
    /// Discontiguous holes of a tag view; the range follows the fetched ids.
    Multiple,
}

/// Resolution id range of a fill.
///
/// `hole` is the target hole `[min, max]` captured before inserting,
/// `fetched` the `[lo, hi]` id span of the fetched messages of that space.
pub(crate) fn fill_range(
    hole: Option<(i32, i32)>,
    fetched: Option<(i32, i32)>,
    fill: HoleFill,
    scope: FillScope,
) -> Option<(i32, i32)> {
    let range = match (hole, fetched, scope) {
        (None, None, _) | (None, Some(_), FillScope::Single) => return None,
        (None, Some(span), FillScope::Multiple) | (Some(span), None, _) => span,
        (Some((min, max)), Some((lo, hi)), FillScope::Single) => {
            if fill.complete {
                (min, max)
            } else {
                match fill.direction {
                    FillDirection::UpperToLower => (lo.max(min), max),
                    FillDirection::LowerToUpper => (min, hi.min(max)),
                }
            }
        }
        (Some((min, max)), Some((lo, hi)), FillScope::Multiple) => {
            if fill.complete {
                (lo.min(min), hi.max(max))
            } else {
                match fill.direction {
                    FillDirection::UpperToLower => (lo, max),
                    FillDirection::LowerToUpper => (min, hi),
                }
            }
        }
    };
    (range.0 <= range.1).then_some(range)
}

/// `[lo, hi]` span of the fetched ids inside `space`.
fn fetched_span(space: Space, messages: &[StoreMessage]) -> Option<(i32, i32)> {
    messages
        .iter()
        .filter(|message| Space::of(message.id) == space)
        .map(|message| message.id.id)
        .fold(None, |span, id| match span {
            None => Some((id, id)),
            Some((lo, hi)) => Some((lo.min(id), hi.max(id))),
        })
}

impl Context<'_> {
    pub(super) fn fill(
        &mut self,
        anchor: MessageId,
        fill: HoleFill,
        tags: Option<MessageTags>,
        scope: FillScope,
        messages: &[StoreMessage],
    ) -> Result<(), StrataError> {
        super::validate(anchor)?;
        let space = Space::of(anchor);

        let target = index::hole_containing(&self.txn, space, anchor.id)?
            .filter(|(_, hole)| tags.is_none_or(|tags| hole.tags.contains(tags)))
            .map(|(max, hole)| (hole.min, max));

        for message in messages {
            self.insert_message(message)?;
        }

        let fetched = fetched_span(space, messages);
        let Some((lo, hi)) = fill_range(target, fetched, fill, scope) else {
            tracing::trace!(%anchor, "fill without target hole");
            return Ok(());
        };
        tracing::trace!(%anchor, lo, hi, tagged = tags.is_some(), "resolve fill range");
        self.resolve_holes(space, lo, hi, tags)
    }

    /// Resolve every hole lying fully inside `[lo, hi]`.
    fn resolve_holes(
        &mut self,
        space: Space,
        lo: i32,
        hi: i32,
        tags: Option<MessageTags>,
    ) -> Result<(), StrataError> {
        for (max, entry) in index::entries_between(&self.txn, space, lo, hi)? {
            let IndexEntry::Hole(hole) = entry else {
                continue;
            };
            if hole.min < lo {
                continue;
            }
            match tags {
                None => self.delete_hole(space, max, hole),
                Some(tags) if hole.tags.intersects(tags) => {
                    index::delete_hole(&mut self.txn, space, max, &hole);
                    let cleared = index::StoredHole {
                        tags: hole.tags.difference(tags),
                        ..hole
                    };
                    index::put_hole(&mut self.txn, space, max, &cleared)?;
                    self.record(
                        space,
                        HistoryOperation::RemoveHole(space.hole(max, &hole)),
                    );
                    self.record(
                        space,
                        HistoryOperation::InsertHole(space.hole(max, &cleared)),
                    );
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE: FillScope = FillScope::Single;
    const MULTIPLE: FillScope = FillScope::Multiple;

    #[test]
    fn single_fill_stays_inside_hole() {
        let hole = Some((100, 500));
        let fetched = Some((50, 300));

        assert_eq!(fill_range(hole, fetched, HoleFill::complete(), SINGLE), Some((100, 500)));
        assert_eq!(
            fill_range(hole, fetched, HoleFill::partial(FillDirection::UpperToLower), SINGLE),
            Some((100, 500))
        );
        assert_eq!(
            fill_range(hole, fetched, HoleFill::partial(FillDirection::LowerToUpper), SINGLE),
            Some((100, 300))
        );
        assert_eq!(
            fill_range(hole, None, HoleFill::partial(FillDirection::LowerToUpper), SINGLE),
            Some((100, 500))
        );
        assert_eq!(fill_range(None, fetched, HoleFill::complete(), SINGLE), None);
    }

    #[test]
    fn multiple_fill_follows_fetched_ids() {
        let hole = Some((100, 500));
        let fetched = Some((50, 700));

        assert_eq!(fill_range(hole, fetched, HoleFill::complete(), MULTIPLE), Some((50, 700)));
        assert_eq!(
            fill_range(hole, fetched, HoleFill::partial(FillDirection::UpperToLower), MULTIPLE),
            Some((50, 500))
        );
        assert_eq!(
            fill_range(hole, fetched, HoleFill::partial(FillDirection::LowerToUpper), MULTIPLE),
            Some((100, 700))
        );
        assert_eq!(fill_range(None, fetched, HoleFill::complete(), MULTIPLE), Some((50, 700)));
    }

    #[test]
    fn inverted_range_resolves_nothing() {
        let hole = Some((100, 200));
        let fetched = Some((300, 400));
        assert_eq!(
            fill_range(hole, fetched, HoleFill::partial(FillDirection::UpperToLower), SINGLE),
            None
        );
    }
}
