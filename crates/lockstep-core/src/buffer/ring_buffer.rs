//! Fixed-capacity ring buffer with a key index.
//!
//! Records are appended until the ring is full; from then on every insert
//! overwrites the logically oldest slot. A hash index maps each key to the
//! slot it was last written to, giving O(1) point lookups for the join.
//!
//! ## Key reuse
//!
//! Re-adding a key does not compact the ring. The older physical slot keeps
//! its stale copy and only the indexed slot is authoritative. Eviction always
//! drops the index entry for the key stored in the physically oldest slot, so
//! when that key was re-added after the slot was written, the newer live copy
//! loses its index entry as well and `get` reports it as missing. Callers that
//! reuse keys inside one ring window should expect this.

use crate::record::LogRecord;
use crate::BufferError;
use std::collections::HashMap;
use tracing::trace;

/// Position of a slot inside the ring.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
struct SlotId(usize);

/// Keyed ring buffer.
#[derive(Debug, Clone)]
pub struct KeyedRingBuffer {
    /// Physical slots, at most `capacity` long
    slots: Vec<LogRecord>,

    /// Key -> slot of the most recent write for that key
    index: HashMap<String, SlotId>,

    /// Oldest live slot, only moves once the ring is full
    head: usize,

    /// Next slot to write
    write_pos: usize,

    capacity: usize,

    stats: RingStats,
}

#[derive(Debug, Clone, Default)]
struct RingStats {
    inserts: u64,
    evictions: u64,
}

impl KeyedRingBuffer {
    /// Create an empty ring with a fixed number of slots.
    pub fn new(capacity: usize) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::ZeroCapacity);
        }

        Ok(Self {
            slots: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            head: 0,
            write_pos: 0,
            capacity,
            stats: RingStats::default(),
        })
    }

    /// Append records in order, evicting the oldest slots as needed.
    pub fn add<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = LogRecord>,
    {
        for record in records {
            self.push(record);
        }
    }

    /// Append a single record. Returns the record it overwrote, if any.
    pub fn push(&mut self, record: LogRecord) -> Option<LogRecord> {
        let mut evicted = None;

        // Full ring: the write position has caught up with the oldest slot.
        if self.is_full() && self.write_pos == self.head {
            let oldest = &self.slots[self.head];
            self.index.remove(&oldest.key);
            trace!(key = %oldest.key, slot = self.head, "Evicting oldest slot");
            self.head = (self.head + 1) % self.capacity;
            self.stats.evictions += 1;
        }

        let slot = self.write_pos;
        let key = record.key.clone();
        if self.slots.len() < self.capacity {
            self.slots.push(record);
        } else {
            evicted = Some(std::mem::replace(&mut self.slots[slot], record));
        }

        // Last write for a key wins
        self.index.insert(key, SlotId(slot));

        self.write_pos = (self.write_pos + 1) % self.capacity;
        self.stats.inserts += 1;

        evicted
    }

    /// Look up the authoritative record for a key (O(1)).
    pub fn get(&self, key: &str) -> Result<&LogRecord, BufferError> {
        self.index
            .get(key)
            .map(|slot| &self.slots[slot.0])
            .ok_or_else(|| BufferError::NotFound(key.to_string()))
    }

    #[cfg(test)]
    fn slot_of(&self, key: &str) -> Option<SlotId> {
        self.index.get(key).copied()
    }

    /// Replace the record for `key` with `combine(existing, incoming)`.
    ///
    /// Absent keys are left alone; nothing is inserted. Returns whether the
    /// update was applied.
    pub fn update<F>(&mut self, key: &str, incoming: &LogRecord, combine: F) -> bool
    where
        F: FnOnce(&LogRecord, &LogRecord) -> LogRecord,
    {
        match self.index.get(key) {
            Some(slot) => {
                let slot = slot.0;
                let combined = combine(&self.slots[slot], incoming);
                self.slots[slot] = combined;
                true
            }
            None => false,
        }
    }

    /// Live records from oldest to newest. Does not drain the ring.
    pub fn flush(&self) -> Vec<LogRecord> {
        if !self.is_full() {
            return self.slots.clone();
        }

        (0..self.slots.len())
            .map(|i| self.slots[(self.head + i) % self.slots.len()].clone())
            .collect()
    }

    /// Indexed keys, sorted lexicographically.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.index.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// The `i`-th oldest slot.
    pub fn get_logical(&self, i: usize) -> Option<&LogRecord> {
        if i >= self.slots.len() {
            return None;
        }
        Some(&self.slots[(self.head + i) % self.capacity])
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if no slot has been written yet.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Check if every slot is occupied.
    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }

    /// Fixed slot count.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get buffer statistics.
    pub fn stats(&self) -> RingBufferStats {
        RingBufferStats {
            len: self.slots.len(),
            capacity: self.capacity,
            indexed_keys: self.index.len(),
            total_inserts: self.stats.inserts,
            total_evictions: self.stats.evictions,
        }
    }
}

/// Ring buffer statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingBufferStats {
    /// Occupied slots
    pub len: usize,
    /// Fixed slot count
    pub capacity: usize,
    /// Keys currently in the index
    pub indexed_keys: usize,
    /// Records ever added
    pub total_inserts: u64,
    /// Slots overwritten after the ring filled up
    pub total_evictions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rec(key: &str, value: i64) -> LogRecord {
        LogRecord::new(key, value)
    }

    fn values(buffer: &KeyedRingBuffer) -> Vec<i64> {
        buffer.flush().iter().map(|r| r.value).collect()
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert_eq!(
            KeyedRingBuffer::new(0).unwrap_err(),
            BufferError::ZeroCapacity
        );
    }

    #[test]
    fn test_empty_flush() {
        let buffer = KeyedRingBuffer::new(5).unwrap();
        assert!(buffer.flush().is_empty());
        assert!(buffer.is_empty());
        assert!(buffer.keys().is_empty());
    }

    #[test]
    fn test_fill_and_evict_sequence() {
        let mut buffer = KeyedRingBuffer::new(5).unwrap();

        buffer.add([rec("a", 1)]);
        assert_eq!(buffer.flush(), vec![rec("a", 1)]);
        assert_eq!(buffer.get("a").unwrap().value, 1);

        buffer.add([rec("b", 2), rec("c", 3), rec("d", 4)]);
        assert_eq!(values(&buffer), vec![1, 2, 3, 4]);
        assert_eq!(buffer.get("c").unwrap().value, 3);

        buffer.add([rec("e", 5)]);
        assert!(buffer.is_full());
        assert_eq!(values(&buffer), vec![1, 2, 3, 4, 5]);
        assert_eq!(buffer.get("e").unwrap().value, 5);

        buffer.add([rec("f", 6)]);
        assert_eq!(
            buffer.flush(),
            vec![rec("b", 2), rec("c", 3), rec("d", 4), rec("e", 5), rec("f", 6)]
        );
        assert_eq!(
            buffer.get("a").unwrap_err(),
            BufferError::NotFound("a".into())
        );

        buffer.add([
            rec("g", 7),
            rec("h", 8),
            rec("i", 9),
            rec("j", 10),
            rec("k", 11),
            rec("l", 12),
        ]);
        assert_eq!(values(&buffer), vec![8, 9, 10, 11, 12]);
        assert!(buffer.get("g").is_err());
        assert_eq!(buffer.keys(), vec!["h", "i", "j", "k", "l"]);
    }

    #[test]
    fn test_push_returns_overwritten_record() {
        let mut buffer = KeyedRingBuffer::new(2).unwrap();
        assert_eq!(buffer.push(rec("a", 1)), None);
        assert_eq!(buffer.push(rec("b", 2)), None);
        assert_eq!(buffer.push(rec("c", 3)), Some(rec("a", 1)));

        let stats = buffer.stats();
        assert_eq!(stats.total_inserts, 3);
        assert_eq!(stats.total_evictions, 1);
        assert_eq!(stats.indexed_keys, 2);
    }

    #[test]
    fn test_key_reuse_last_write_wins() {
        let mut buffer = KeyedRingBuffer::new(4).unwrap();
        buffer.add([rec("a", 1), rec("b", 2), rec("a", 3)]);

        assert_eq!(buffer.get("a").unwrap().value, 3);
        assert_eq!(buffer.slot_of("a"), Some(SlotId(2)));
        // The stale copy stays in the ring
        assert_eq!(values(&buffer), vec![1, 2, 3]);
        assert_eq!(buffer.keys(), vec!["a", "b"]);
    }

    #[test]
    fn test_eviction_of_stale_slot_drops_live_key() {
        let mut buffer = KeyedRingBuffer::new(3).unwrap();
        buffer.add([rec("a", 1), rec("b", 2), rec("a", 3)]);

        // Slot 0 still physically holds the first "a"; evicting it removes
        // the index entry that now points at slot 2.
        buffer.add([rec("c", 4)]);

        assert!(buffer.get("a").is_err());
        assert_eq!(values(&buffer), vec![2, 3, 4]);
        assert_eq!(buffer.keys(), vec!["b", "c"]);
    }

    #[test]
    fn test_update_existing_key() {
        let mut buffer = KeyedRingBuffer::new(3).unwrap();
        buffer.add([rec("a", 1), rec("b", 2)]);

        let applied = buffer.update("a", &rec("a", 10), |old, new| old.sum_with(new));
        assert!(applied);
        assert_eq!(buffer.get("a").unwrap().value, 11);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_update_absent_key_is_noop() {
        let mut buffer = KeyedRingBuffer::new(3).unwrap();
        buffer.add([rec("a", 1)]);

        let applied = buffer.update("z", &rec("z", 10), |old, new| old.sum_with(new));
        assert!(!applied);
        assert!(buffer.get("z").is_err());
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_get_logical_wraps_from_head() {
        let mut buffer = KeyedRingBuffer::new(3).unwrap();
        buffer.add([rec("a", 1), rec("b", 2), rec("c", 3), rec("d", 4)]);

        assert_eq!(buffer.get_logical(0), Some(&rec("b", 2)));
        assert_eq!(buffer.get_logical(2), Some(&rec("d", 4)));
        assert_eq!(buffer.get_logical(3), None);
    }

    #[test]
    fn test_flush_is_idempotent() {
        let mut buffer = KeyedRingBuffer::new(3).unwrap();
        buffer.add((0..7).map(|i| rec(&format!("k{i}"), i)));
        assert_eq!(buffer.flush(), buffer.flush());
    }

    proptest! {
        #[test]
        fn prop_flush_keeps_last_n_distinct(capacity in 1usize..16, extra in 0usize..40) {
            let total = capacity + extra;
            let records: Vec<LogRecord> =
                (0..total).map(|i| rec(&format!("key-{i}"), i as i64)).collect();

            let mut buffer = KeyedRingBuffer::new(capacity).unwrap();
            buffer.add(records.clone());

            prop_assert_eq!(buffer.flush(), records[total - capacity..].to_vec());
            prop_assert_eq!(buffer.len(), capacity);
        }

        #[test]
        fn prop_index_tracks_live_distinct_keys(capacity in 1usize..16, total in 0usize..48) {
            let mut buffer = KeyedRingBuffer::new(capacity).unwrap();
            for i in 0..total {
                buffer.push(rec(&format!("key-{i}"), i as i64));
            }

            let first_live = total.saturating_sub(capacity);
            for i in 0..total {
                let key = format!("key-{i}");
                if i >= first_live {
                    prop_assert_eq!(buffer.get(&key).unwrap().value, i as i64);
                } else {
                    prop_assert!(buffer.get(&key).is_err());
                }
            }
        }
    }
}
