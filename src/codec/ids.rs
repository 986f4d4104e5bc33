use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::context::short_descriptor;

/// Identifier table symbol meaning "first use of an identifier"
pub(crate) const NEW_ID_SYMBOL: u64 = 0;

/// Identifier history shared in lockstep by the encoder, the decoder and the
/// statistics collector.
///
/// An identifier's rank is the number of distinct identifiers used since its
/// last use. Ranks are kept over all identifiers and, separately, over the
/// identifiers defined under each short descriptor.
#[derive(Debug, Default)]
pub(crate) struct IdTracker {
    recent: Recency,
    recent_by_short: HashMap<u8, Recency>,
    /// slot descriptor of each identifier's first use
    definitions: HashMap<u32, u64>,
    max_id: Option<u32>,
}

impl IdTracker {
    pub fn is_known(&self, id: u32) -> bool {
        self.definitions.contains_key(&id)
    }

    pub fn rank(&self, id: u32) -> Option<usize> {
        self.recent.rank(id)
    }

    pub fn by_rank(&self, rank: usize) -> Option<u32> {
        self.recent.by_rank(rank)
    }

    /// Symbol an identifier table codes `id` as: rank + 1, or `NEW_ID_SYMBOL`
    pub fn table_symbol(&self, id: u32) -> u64 {
        self.rank(id).map_or(NEW_ID_SYMBOL, |rank| rank as u64 + 1)
    }

    /// Inverse of `table_symbol` for known identifiers
    pub fn by_table_symbol(&self, symbol: u64) -> Option<u32> {
        let rank = usize::try_from(symbol.checked_sub(1)?).ok()?;
        self.by_rank(rank)
    }

    /// Short descriptor of the defining slot and the rank among identifiers sharing it
    pub fn short_rank(&self, id: u32) -> Option<(u8, usize)> {
        let short = short_descriptor(*self.definitions.get(&id)?);
        let rank = self.recent_by_short.get(&short)?.rank(id)?;
        Some((short, rank))
    }

    pub fn by_short_rank(&self, short: u8, rank: usize) -> Option<u32> {
        self.recent_by_short.get(&short)?.by_rank(rank)
    }

    /// Next identifier in sequence after the largest seen so far
    pub fn next_id(&self) -> u32 {
        self.max_id.map_or(0, |max| max.wrapping_add(1))
    }

    /// Records a use of `id` in the slot `descriptor`
    pub fn touch(&mut self, id: u32, descriptor: u64) {
        let definition = match self.definitions.entry(id) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                self.max_id = Some(self.max_id.map_or(id, |max| max.max(id)));
                *entry.insert(descriptor)
            }
        };
        self.recent.touch(id);
        self.recent_by_short.entry(short_descriptor(definition)).or_default().touch(id);
    }
}

/// Move-to-front list over identifiers.
///
/// Every use takes the next timestamp. The Fenwick tree marks the timestamps
/// that are still some identifier's latest use, so ranks are prefix counts.
#[derive(Debug, Default)]
struct Recency {
    live: Fenwick,
    /// identifier used at each timestamp
    used_at: Vec<u32>,
    last_use: HashMap<u32, usize>,
}

impl Recency {
    fn len(&self) -> usize {
        self.last_use.len()
    }

    fn rank(&self, id: u32) -> Option<usize> {
        let &time = self.last_use.get(&id)?;
        Some(self.len() - self.live.prefix(time + 1))
    }

    fn by_rank(&self, rank: usize) -> Option<u32> {
        if rank >= self.len() {
            return None;
        }
        let time = self.live.find(self.len() - rank)?;
        self.used_at.get(time).copied()
    }

    fn touch(&mut self, id: u32) {
        let time = self.used_at.len();
        if let Some(previous) = self.last_use.insert(id, time) {
            self.live.clear(previous);
        }
        self.used_at.push(id);
        self.live.push_marked();
    }
}

/// Fenwick tree over 0/1 marks that grows one slot at a time
#[derive(Debug, Default)]
struct Fenwick {
    /// `tree[i - 1]` holds the sum of slots `(i - lowbit(i), i]`
    tree: Vec<usize>,
}

impl Fenwick {
    /// Sum of the first `len` slots
    fn prefix(&self, mut len: usize) -> usize {
        let mut sum = 0;
        while len > 0 {
            sum += self.tree[len - 1];
            len &= len - 1;
        }
        sum
    }

    /// Appends a marked slot
    fn push_marked(&mut self) {
        let node = self.tree.len() + 1;
        let low = node & node.wrapping_neg();
        let sum = 1 + self.prefix(node - 1) - self.prefix(node - low);
        self.tree.push(sum);
    }

    /// Unmarks a marked slot
    fn clear(&mut self, slot: usize) {
        let mut node = slot + 1;
        while node <= self.tree.len() {
            self.tree[node - 1] -= 1;
            node += node & node.wrapping_neg();
        }
    }

    /// Slot holding the `nth` mark, counting from 1
    fn find(&self, mut nth: usize) -> Option<usize> {
        let len = self.tree.len();
        let mut pos = 0;
        let mut step = len.checked_ilog2().map_or(0, |bits| 1 << bits);
        while step > 0 {
            if pos + step <= len && self.tree[pos + step - 1] < nth {
                pos += step;
                nth -= self.tree[pos - 1];
            }
            step >>= 1;
        }
        (pos < len).then_some(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_follow_recency() {
        let mut ids = IdTracker::default();
        for id in [5, 6, 7] {
            ids.touch(id, 0);
        }
        assert_eq!(ids.rank(7), Some(0));
        assert_eq!(ids.rank(5), Some(2));

        ids.touch(5, 0);
        assert_eq!(ids.rank(5), Some(0));
        assert_eq!(ids.by_rank(1), Some(7));
        assert_eq!(ids.by_rank(3), None);
        assert_eq!(ids.rank(9), None);
    }

    #[test]
    fn table_symbols() {
        let mut ids = IdTracker::default();
        assert_eq!(ids.table_symbol(3), NEW_ID_SYMBOL);
        ids.touch(3, 0);
        ids.touch(4, 0);
        assert_eq!(ids.table_symbol(3), 2);
        assert_eq!(ids.by_table_symbol(2), Some(3));
        assert_eq!(ids.by_table_symbol(NEW_ID_SYMBOL), None);
        assert_eq!(ids.by_table_symbol(3), None);
    }

    #[test]
    fn next_id_is_sequential() {
        let mut ids = IdTracker::default();
        assert_eq!(ids.next_id(), 0);
        ids.touch(0, 0);
        ids.touch(10, 0);
        ids.touch(4, 0);
        assert_eq!(ids.next_id(), 11);
    }

    #[test]
    fn short_ranks_only_count_matching_definitions() {
        let (a, b) = (0x1_0000_0001, 0x2);
        assert_ne!(short_descriptor(a), short_descriptor(b));

        let mut ids = IdTracker::default();
        ids.touch(1, a);
        ids.touch(2, b);
        ids.touch(3, a);
        // a redefinition keeps the first descriptor
        ids.touch(1, b);

        assert_eq!(ids.short_rank(1), Some((short_descriptor(a), 0)));
        assert_eq!(ids.short_rank(3), Some((short_descriptor(a), 1)));
        assert_eq!(ids.short_rank(2), Some((short_descriptor(b), 0)));
        assert_eq!(ids.by_short_rank(short_descriptor(a), 1), Some(3));
        assert_eq!(ids.by_short_rank(short_descriptor(b), 1), None);
    }

    #[test]
    fn fenwick_counts_and_finds_marks() {
        let mut tree = Fenwick::default();
        for _ in 0..13 {
            tree.push_marked();
        }
        tree.clear(0);
        tree.clear(6);
        tree.clear(12);

        assert_eq!(tree.prefix(13), 10);
        assert_eq!(tree.prefix(7), 5);
        assert_eq!(tree.find(1), Some(1));
        assert_eq!(tree.find(6), Some(7));
        assert_eq!(tree.find(10), Some(11));
        assert_eq!(tree.find(11), None);
    }

    /// Linear move-to-front list the tracker must agree with
    fn naive_ranks(uses: &[(u32, u64)]) -> (Vec<u32>, HashMap<u32, u8>) {
        let mut recent = Vec::new();
        let mut shorts = HashMap::new();
        for &(id, descriptor) in uses {
            recent.retain(|&known| known != id);
            recent.insert(0, id);
            shorts.entry(id).or_insert(short_descriptor(descriptor));
        }
        (recent, shorts)
    }

    #[test]
    fn agrees_with_a_linear_list() {
        let mut state = 0x2545_f491_4f6c_dd1du64;
        let mut uses = Vec::new();
        let mut ids = IdTracker::default();
        for step in 0..3000 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let use_ = ((state % 200) as u32, state >> 40);
            uses.push(use_);
            ids.touch(use_.0, use_.1);
            if step % 97 != 0 {
                continue;
            }

            let (recent, shorts) = naive_ranks(&uses);
            for (rank, &id) in recent.iter().enumerate() {
                assert_eq!(ids.rank(id), Some(rank));
                assert_eq!(ids.by_rank(rank), Some(id));

                let short = shorts[&id];
                let short_rank = recent[..rank].iter().filter(|&&known| shorts[&known] == short).count();
                assert_eq!(ids.short_rank(id), Some((short, short_rank)));
                assert_eq!(ids.by_short_rank(short, short_rank), Some(id));
            }
            assert_eq!(ids.by_rank(recent.len()), None);
        }
    }

    #[test]
    fn long_histories_stay_consistent() {
        let n = 200_000u32;
        let mut ids = IdTracker::default();
        for id in 0..n {
            ids.touch(id, u64::from(id % 5));
        }
        for id in 0..n {
            assert_eq!(ids.rank(id), Some(n as usize - 1));
            ids.touch(id, 0);
        }
        assert_eq!(ids.by_rank(0), Some(n - 1));
        assert_eq!(ids.by_rank(n as usize - 1), Some(0));
        let (short, rank) = ids.short_rank(7).unwrap();
        assert_eq!(ids.by_short_rank(short, rank), Some(7));
    }
}
