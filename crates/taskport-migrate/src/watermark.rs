//! Per-kind high-watermark of business ids seen during a pass.

use std::collections::BTreeMap;

use taskport_store::EntityKind;

/// Maximum id observed per entity kind.
///
/// Kinds with no observations have no entry, so their counters are never touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HighWatermarks {
    max: BTreeMap<EntityKind, i64>,
}

impl HighWatermarks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `id` was read for `kind`.
    pub fn observe(&mut self, kind: EntityKind, id: i64) {
        self.max
            .entry(kind)
            .and_modify(|m| *m = (*m).max(id))
            .or_insert(id);
    }

    /// Highest id seen for `kind`.
    pub fn get(&self, kind: EntityKind) -> Option<i64> {
        self.max.get(&kind).copied()
    }

    /// Fold another tracker in, e.g. one filled by a parallel worker.
    pub fn merge(&mut self, other: &HighWatermarks) {
        for (&kind, &id) in &other.max {
            self.observe(kind, id);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityKind, i64)> + '_ {
        self.max.iter().map(|(&k, &v)| (k, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_max_of_unordered_ids() {
        let mut marks = HighWatermarks::new();
        for id in [3, 7, 1, 9, 4] {
            marks.observe(EntityKind::Task, id);
        }
        assert_eq!(marks.get(EntityKind::Task), Some(9));
        assert_eq!(marks.get(EntityKind::Subtask), None);
    }

    #[test]
    fn test_kinds_are_tracked_separately() {
        let mut marks = HighWatermarks::new();
        marks.observe(EntityKind::Task, 40);
        marks.observe(EntityKind::Subtask, 2);
        assert_eq!(
            marks.iter().collect::<Vec<_>>(),
            [(EntityKind::Task, 40), (EntityKind::Subtask, 2)]
        );
    }

    proptest! {
        #[test]
        fn watermark_independent_of_order(
            ids in prop::collection::vec(1i64..1_000_000, 1..64).prop_shuffle(),
        ) {
            let mut marks = HighWatermarks::new();
            for &id in &ids {
                marks.observe(EntityKind::User, id);
            }
            prop_assert_eq!(marks.get(EntityKind::User), ids.iter().copied().max());
        }

        #[test]
        fn split_then_merge_matches_single_pass(
            ids in prop::collection::vec(1i64..1_000_000, 0..64),
            split in 0usize..64,
        ) {
            let split = split.min(ids.len());
            let (left, right) = ids.split_at(split);

            let mut a = HighWatermarks::new();
            left.iter().for_each(|&id| a.observe(EntityKind::Task, id));
            let mut b = HighWatermarks::new();
            right.iter().for_each(|&id| b.observe(EntityKind::Task, id));
            a.merge(&b);

            let mut whole = HighWatermarks::new();
            ids.iter().for_each(|&id| whole.observe(EntityKind::Task, id));
            prop_assert_eq!(a, whole);
        }
    }
}
