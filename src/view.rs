//! Lock-free single-writer / multi-reader view over a workload database.
//!
//! The view keeps three numbered generations (slots) of the "currently
//! active" rule-id list. The slot at `version % 3` is exposed to readers; the
//! writer stages edits into `(version + 1) % 3`, the slot furthest from being
//! re-exposed, so a committed slot has a two-generation safety margin before
//! it is ever mutated again.
//!
//! Readers resolve the active slot, bump its atomic reader count, sample, and
//! drop the count — they never block on the writer. The writer busy-spins
//! before touching its pending slot until that slot's reader count drains to
//! zero. A reader that leaks its critical section stalls the writer
//! indefinitely; this is a liveness assumption, not a queue.
//!
//! Single-writer discipline is enforced by ownership: [`open`] returns one
//! non-cloneable [`ViewWriter`] whose mutating operations take `&mut self`,
//! and a freely cloneable [`ViewReader`].

use std::cell::UnsafeCell;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::binary::{Database, LoadedRule};
use crate::{Error, Result};

const SLOTS: usize = 3;

struct Shared {
    db: Database,
    slots: [UnsafeCell<Vec<u32>>; SLOTS],
    readers: [AtomicUsize; SLOTS],
    version: AtomicU64,
}

// Safety: slot access follows the generation protocol. Readers dereference
// only the active slot and only while holding its reader count; the unique
// writer mutates only the pending slot and only after that count reaches
// zero. The database itself is immutable after load.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

impl Shared {
    fn active_index(&self) -> usize {
        (self.version.load(Ordering::Acquire) % SLOTS as u64) as usize
    }

    fn pending_index(&self) -> usize {
        ((self.version.load(Ordering::Acquire) + 1) % SLOTS as u64) as usize
    }

    /// Busy-wait until no reader holds `slot`. No backoff; the wait is
    /// unbounded if a reader never releases.
    fn drain_readers(&self, slot: usize) {
        while self.readers[slot].load(Ordering::Acquire) != 0 {
            std::hint::spin_loop();
        }
    }
}

/// Open a workload database and build a view over it, returning the unique
/// writer handle and one reader handle.
pub fn open(path: &Path, seed: u64) -> Result<(ViewWriter, ViewReader)> {
    let db = Database::open(path)?;
    Ok(with_database(db, seed))
}

/// Build a view over an already loaded database.
///
/// All three generations start empty; until the first [`ViewWriter::commit`]
/// readers observe an empty active set.
pub fn with_database(db: Database, seed: u64) -> (ViewWriter, ViewReader) {
    let shared = Arc::new(Shared {
        db,
        slots: std::array::from_fn(|_| UnsafeCell::new(Vec::new())),
        readers: std::array::from_fn(|_| AtomicUsize::new(0)),
        version: AtomicU64::new(0),
    });
    let writer = ViewWriter {
        shared: Arc::clone(&shared),
        rng: StdRng::seed_from_u64(seed),
    };
    let reader = ViewReader { shared };
    (writer, reader)
}

/// The unique mutating handle of a view.
pub struct ViewWriter {
    shared: Arc<Shared>,
    rng: StdRng,
}

impl ViewWriter {
    /// Select up to `count` random rule ids not already staged and add them
    /// to the pending slot. Returns the ids actually added.
    pub fn prepare(&mut self, count: usize) -> Vec<u32> {
        let rule_count = self.shared.db.rule_count() as u32;
        if rule_count == 0 || count == 0 {
            return Vec::new();
        }

        // Draw twice as many candidates as requested; duplicates and
        // already-staged ids are discarded.
        let mut candidates: Vec<u32> = (0..count * 2)
            .map(|_| self.rng.gen_range(0..rule_count))
            .collect();
        candidates.sort_unstable();
        candidates.dedup();
        candidates.shuffle(&mut self.rng);

        let shared = Arc::clone(&self.shared);
        let pending_idx = shared.pending_index();
        shared.drain_readers(pending_idx);
        // Safety: unique writer, reader count drained, and this slot is two
        // commits away from being exposed again.
        let pending = unsafe { &mut *shared.slots[pending_idx].get() };

        let mut added = Vec::with_capacity(count);
        for id in candidates {
            if added.len() == count {
                break;
            }
            if pending.contains(&id) {
                continue;
            }
            pending.push(id);
            added.push(id);
        }
        added
    }

    /// Add caller-chosen rule ids to the pending slot, skipping ids already
    /// staged. Returns the number added, or an error for an unknown id.
    pub fn stage(&mut self, ids: &[u32]) -> Result<usize> {
        let rule_count = self.shared.db.rule_count() as u32;
        if let Some(&bad) = ids.iter().find(|&&id| id >= rule_count) {
            return Err(Error::RuleNotFound(bad));
        }

        let shared = Arc::clone(&self.shared);
        let pending_idx = shared.pending_index();
        shared.drain_readers(pending_idx);
        // Safety: see `prepare`.
        let pending = unsafe { &mut *shared.slots[pending_idx].get() };

        let mut added = 0;
        for &id in ids {
            if !pending.contains(&id) {
                pending.push(id);
                added += 1;
            }
        }
        Ok(added)
    }

    /// Stage every known rule id.
    pub fn set_all(&mut self) {
        let shared = Arc::clone(&self.shared);
        let pending_idx = shared.pending_index();
        shared.drain_readers(pending_idx);
        // Safety: see `prepare`.
        let pending = unsafe { &mut *shared.slots[pending_idx].get() };

        pending.clear();
        pending.extend(0..self.shared.db.rule_count() as u32);
    }

    /// Empty the pending slot.
    pub fn clear(&mut self) {
        let shared = Arc::clone(&self.shared);
        let pending_idx = shared.pending_index();
        shared.drain_readers(pending_idx);
        // Safety: see `prepare`.
        let pending = unsafe { &mut *shared.slots[pending_idx].get() };
        pending.clear();
    }

    /// Advance the version so the pending slot becomes active, then seed the
    /// new pending slot with a copy of the just-activated contents. Edits are
    /// therefore cumulative across commit cycles.
    pub fn commit(&mut self) {
        let shared = Arc::clone(&self.shared);
        let version = shared.version.fetch_add(1, Ordering::AcqRel) + 1;
        let active_idx = (version % SLOTS as u64) as usize;
        let pending_idx = ((version + 1) % SLOTS as u64) as usize;

        shared.drain_readers(pending_idx);
        // Safety: the active slot is only read (readers and this copy); the
        // pending slot is drained and two commits from re-exposure.
        let active = unsafe { &*shared.slots[active_idx].get() };
        let pending = unsafe { &mut *shared.slots[pending_idx].get() };
        pending.clear();
        pending.extend_from_slice(active);

        log::trace!(
            "committed version {version}: {} active rule ids",
            active.len()
        );
    }

    /// Bitmask of which of the three slots currently contain `rule_id`
    /// (bit i set = slot i). Diagnostic only; the writer is the sole mutator,
    /// so its own unsynchronized scan is safe.
    pub fn search(&self, rule_id: u32) -> u8 {
        let mut mask = 0u8;
        for (i, slot) in self.shared.slots.iter().enumerate() {
            // Safety: no thread mutates any slot while the unique writer is
            // inside a `&self` method.
            let ids = unsafe { &*slot.get() };
            if ids.contains(&rule_id) {
                mask |= 1 << i;
            }
        }
        mask
    }

    /// The slot index readers currently resolve to.
    pub fn active_slot(&self) -> usize {
        self.shared.active_index()
    }

    /// The underlying workload database.
    pub fn database(&self) -> &Database {
        &self.shared.db
    }
}

impl std::fmt::Debug for ViewWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewWriter")
            .field("version", &self.shared.version.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// A non-blocking sampling handle. Cheap to clone; arbitrarily many may run
/// concurrently with each other and with the writer.
#[derive(Clone)]
pub struct ViewReader {
    shared: Arc<Shared>,
}

impl ViewReader {
    /// Sample `count` rule ids uniformly with replacement from the active
    /// slot and resolve each to one of its persisted headers.
    ///
    /// Returns an empty vector if the active slot is empty. Sampled ids with
    /// no persisted header are skipped, so fewer than `count` pairs may be
    /// returned.
    pub fn select_headers<'a, R: Rng>(
        &'a self,
        count: usize,
        rng: &mut R,
    ) -> Vec<(&'a [u32], u32)> {
        let shared = &*self.shared;
        let slot = shared.active_index();
        shared.readers[slot].fetch_add(1, Ordering::AcqRel);

        // Safety: the reader count pins this slot; the writer cannot mutate
        // it until the count drops, and the two-generation margin keeps it
        // from being restaged first.
        let active = unsafe { &*shared.slots[slot].get() };

        let mut pairs = Vec::new();
        if !active.is_empty() {
            pairs.reserve(count);
            for _ in 0..count {
                let rule_id = active[rng.gen_range(0..active.len())];
                let header_indices = shared.db.headers_for_rule(rule_id);
                if header_indices.is_empty() {
                    continue;
                }
                let pick = header_indices[rng.gen_range(0..header_indices.len())] as usize;
                if let Ok(header) = shared.db.header(pick) {
                    pairs.push((header, rule_id));
                }
            }
        }

        shared.readers[slot].fetch_sub(1, Ordering::AcqRel);
        pairs
    }

    /// Number of fields per rule and header.
    pub fn field_count(&self) -> usize {
        self.shared.db.field_count()
    }

    /// Number of rules in the database.
    pub fn rule_count(&self) -> usize {
        self.shared.db.rule_count()
    }

    /// Number of persisted headers.
    pub fn header_count(&self) -> usize {
        self.shared.db.header_count()
    }

    /// Rule at `index`.
    pub fn rule(&self, index: usize) -> Result<&LoadedRule> {
        self.shared.db.rule(index)
    }

    /// The underlying workload database.
    pub fn database(&self) -> &Database {
        &self.shared.db
    }
}

impl std::fmt::Debug for ViewReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewReader")
            .field("version", &self.shared.version.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary;
    use crate::mapping::MappingGenerator;
    use crate::ruleset::{FieldRange, Rule, RuleModel};

    /// Build a database of `count` disjoint single-field rules, one header
    /// each.
    fn sample_database(count: u32) -> Database {
        let mut model = RuleModel::new();
        for id in 1..=count {
            let base = (id - 1) * 100;
            let mut rule = Rule::new(vec![FieldRange::new(base, base + 99, 0)], id);
            rule.priority = id;
            model.push(rule).unwrap();
        }
        let outcome = MappingGenerator::new(17).run(&model, count as usize).unwrap();
        assert_eq!(outcome.unreachable(), 0);

        let mut buffer = Vec::new();
        binary::serialize(&mut buffer, &model, outcome.per_rule()).unwrap();
        Database::from_reader(buffer.as_slice()).unwrap()
    }

    #[test]
    fn test_empty_active_slot_returns_no_pairs() {
        let (_writer, reader) = with_database(sample_database(10), 1);
        let mut rng = StdRng::seed_from_u64(2);
        assert!(reader.select_headers(5, &mut rng).is_empty());
    }

    #[test]
    fn test_prepare_commit_exposes_ids() {
        let (mut writer, reader) = with_database(sample_database(20), 1);

        let added = writer.prepare(5);
        assert!(!added.is_empty() && added.len() <= 5);
        writer.commit();

        let active_bit = 1u8 << writer.active_slot();
        for id in &added {
            assert_ne!(writer.search(*id) & active_bit, 0, "id {id} not active");
        }

        let mut rng = StdRng::seed_from_u64(3);
        let pairs = reader.select_headers(8, &mut rng);
        assert_eq!(pairs.len(), 8);
        for (header, rule_id) in pairs {
            assert!(added.contains(&rule_id));
            let rule = reader.rule(rule_id as usize).unwrap();
            assert!(rule.matches(header));
        }
    }

    #[test]
    fn test_commit_is_cumulative() {
        let (mut writer, _reader) = with_database(sample_database(20), 7);

        let first = writer.stage(&[1, 2, 3]).unwrap();
        assert_eq!(first, 3);
        writer.commit();

        writer.stage(&[4]).unwrap();
        writer.commit();

        // Ids from the first cycle survive into the latest generation.
        let active_bit = 1u8 << writer.active_slot();
        for id in [1, 2, 3, 4] {
            assert_ne!(writer.search(id) & active_bit, 0, "id {id} dropped");
        }
    }

    #[test]
    fn test_clear_empties_next_generation() {
        let (mut writer, reader) = with_database(sample_database(10), 7);
        writer.set_all();
        writer.commit();

        let mut rng = StdRng::seed_from_u64(5);
        assert!(!reader.select_headers(4, &mut rng).is_empty());

        writer.clear();
        writer.commit();
        assert!(reader.select_headers(4, &mut rng).is_empty());
    }

    #[test]
    fn test_stage_rejects_unknown_id() {
        let (mut writer, _reader) = with_database(sample_database(10), 7);
        assert!(matches!(
            writer.stage(&[99]),
            Err(Error::RuleNotFound(99))
        ));
    }

    #[test]
    fn test_stage_skips_duplicates() {
        let (mut writer, _reader) = with_database(sample_database(10), 7);
        assert_eq!(writer.stage(&[1, 1, 2]).unwrap(), 2);
        assert_eq!(writer.stage(&[2, 3]).unwrap(), 1);
    }

    #[test]
    fn test_set_all_stages_every_rule() {
        let (mut writer, reader) = with_database(sample_database(10), 7);
        writer.set_all();
        writer.commit();

        for id in 0..reader.rule_count() as u32 {
            assert_ne!(writer.search(id), 0);
        }
    }

    #[test]
    fn test_writer_reader_stress() {
        let (mut writer, reader) = with_database(sample_database(50), 11);
        writer.set_all();
        writer.commit();

        std::thread::scope(|scope| {
            for t in 0..4 {
                let reader = reader.clone();
                scope.spawn(move || {
                    let mut rng = StdRng::seed_from_u64(100 + t);
                    for _ in 0..2000 {
                        for (header, rule_id) in reader.select_headers(8, &mut rng) {
                            let rule = reader.rule(rule_id as usize).unwrap();
                            assert!(rule.matches(header), "torn read for rule {rule_id}");
                        }
                    }
                });
            }

            for _ in 0..500 {
                writer.prepare(3);
                writer.commit();
            }
        });
    }
}
