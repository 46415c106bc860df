//! The hash-table engine: find, insert, insert-new, erase, the load-factor
//! policy that drives grow/shrink, and rehash.

use crate::error::{Result, TableError};
use crate::group::{Group, GROUP_SLOTS};
use crate::hash;
use crate::probe::ProbeSeq;
use crate::stats::Stats;

/// Minimum number of groups a table ever has, including a freshly created
/// empty one.
const MIN_GROUPS: usize = 4;

/// `MAX_LOAD_FACTOR = 0.67`, expressed as an exact fraction so load-factor
/// comparisons never drift from floating-point rounding.
const MAX_LOAD_NUM: u128 = 67;
const MAX_LOAD_DEN: u128 = 100;

/// `MIN_LOAD_FACTOR = MAX_LOAD_FACTOR / 4 = 0.1675`.
const MIN_LOAD_NUM: u128 = 67;
const MIN_LOAD_DEN: u128 = 400;

/// A flat, open-addressed hash set of pointer-sized element handles.
///
/// `T` is the opaque handle type: an opaque, non-null handle whose identity
/// is governed by the user's hash and equals callbacks. `H` and `E` are
/// monomorphized callbacks rather than trait objects or function pointers,
/// since they sit on the innermost probing loop, where virtual dispatch is a
/// measurable cost.
pub struct HashSet<T, H, E>
where
    T: Copy,
    H: Fn(&T, u64) -> u64,
    E: Fn(&T, &T) -> bool,
{
    groups: Box<[Group<T>]>,
    group_mask: usize,
    count: usize,
    seed: u64,
    hasher: H,
    equals: E,
    stats: Stats,
}

impl<T, H, E> HashSet<T, H, E>
where
    T: Copy,
    H: Fn(&T, u64) -> u64,
    E: Fn(&T, &T) -> bool,
{
    /// Creates an empty table with the minimum group count.
    ///
    /// Allocation of the minimum-size group array essentially cannot fail in
    /// practice; this is the infallible convenience constructor over
    /// [`HashSet::with_capacity`], the same relationship `Vec::new` has to
    /// `Vec::try_reserve`.
    pub fn new(hasher: H, equals: E) -> Self {
        Self::with_capacity(0, hasher, equals).expect("failed to allocate initial group array")
    }

    /// Creates an empty table sized to hold at least `capacity` elements
    /// without growing (the same group-count sizing formula `reserve` uses,
    /// applied at construction time).
    pub fn with_capacity(capacity: usize, hasher: H, equals: E) -> Result<Self> {
        let group_count = groups_for_capacity(capacity)?;
        let groups = alloc_groups(group_count)?;
        Ok(HashSet {
            groups,
            group_mask: group_count - 1,
            count: 0,
            seed: hash::fresh_seed(),
            hasher,
            equals,
            stats: Stats::default(),
        })
    }

    /// Number of elements currently stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Total number of element slots across all groups (`size_in_groups * 7`).
    #[inline]
    pub fn capacity(&self) -> usize {
        (self.group_mask + 1) * GROUP_SLOTS
    }

    /// Number of groups backing the table. Exposed mainly so tests can
    /// observe grow/shrink behavior directly.
    #[inline]
    pub fn group_count(&self) -> usize {
        self.group_mask + 1
    }

    #[inline]
    fn hash_of(&self, element: &T) -> u64 {
        (self.hasher)(element, self.seed)
    }

    /// Walks the probe sequence for `hint`/`home`, returning the (group,
    /// slot) of the first element equal to `probe`, or `None` if the probe
    /// path proves the key absent. Also returns the number of groups
    /// visited, for statistics.
    fn locate(&self, probe: &T, hint: u8, home: usize) -> (Option<(usize, usize)>, u64) {
        let mut seq = ProbeSeq::new(home);
        let mut visited = 0u64;
        loop {
            visited += 1;
            let pos = seq.pos();
            let group = &self.groups[pos];
            let mut candidates = group.hint_match(hint);
            while candidates != 0 {
                let i = candidates.trailing_zeros() as usize;
                self.stats.record_comparison();
                let candidate = unsafe { group.entry(i) };
                let equal = (self.equals)(probe, &candidate);
                self.stats.record_equality(equal);
                if equal {
                    return (Some((pos, i)), visited);
                }
                candidates &= candidates - 1;
            }
            if !group.was_full() {
                return (None, visited);
            }
            seq.advance(self.group_mask);
        }
    }

    /// Walks the probe sequence from `home` until it finds a group with at
    /// least one empty slot. A slot is guaranteed to exist by the
    /// grow-before-insert policy.
    fn find_empty_slot(&mut self, home: usize) -> (usize, usize) {
        let mut seq = ProbeSeq::new(home);
        loop {
            let pos = seq.pos();
            if let Some(i) = self.groups[pos].first_empty_index() {
                return (pos, i);
            }
            seq.advance(self.group_mask);
        }
    }

    /// Looks up `probe`, returning the stored handle if an equivalent
    /// element is present. The probe element need not be the stored
    /// element; it need only hash and compare equal to it.
    pub fn find(&self, probe: &T) -> Option<T> {
        let hash = self.hash_of(probe);
        let (hint, home) = hash::decompose(hash, self.group_mask);
        self.stats.record_hint_byte(hint);
        let (found, visited) = self.locate(probe, hint, home);
        self.stats.dump("find");
        self.stats.record_find_probe(visited);
        found.map(|(pos, idx)| unsafe { self.groups[pos].entry(idx) })
    }

    /// Upsert: installs `element`, overwriting any existing equal element in
    /// place (hint untouched -- the hash of an overwritten key is
    /// contractually unchanged). Grows first if the load factor would
    /// otherwise be exceeded. Returns `Ok(true)` if this inserted a new
    /// element, `Ok(false)` if it replaced an existing one.
    pub fn insert(&mut self, element: T) -> Result<bool> {
        if self.needs_grow_for_insert() {
            self.grow()?;
        }

        let hash = self.hash_of(&element);
        let (hint, home) = hash::decompose(hash, self.group_mask);
        self.stats.record_hint_byte(hint);
        let (found, visited) = self.locate(&element, hint, home);
        self.stats.record_insert_probe(visited);

        if let Some((pos, idx)) = found {
            self.groups[pos].overwrite_at(idx, element);
            self.stats.dump("insert (replace)");
            return Ok(false);
        }

        let (pos, idx) = self.find_empty_slot(home);
        self.groups[pos].insert_at(idx, element, hint);
        self.count += 1;
        self.stats.dump("insert (new)");
        Ok(true)
    }

    /// Inserts `element` without checking whether an equal element already
    /// exists. Callers promise the key is not already present; violating
    /// that promise leaves the table with two equal keys, and `find` will
    /// return one of them unspecifiedly.
    pub fn insert_new(&mut self, element: T) -> Result<()> {
        if self.needs_grow_for_insert() {
            self.grow()?;
        }

        let hash = self.hash_of(&element);
        let (hint, home) = hash::decompose(hash, self.group_mask);
        self.stats.record_hint_byte(hint);
        let (pos, idx) = self.find_empty_slot(home);
        self.groups[pos].insert_at(idx, element, hint);
        self.count += 1;
        self.stats.dump("insert_new");
        Ok(())
    }

    /// Removes the element equal to `probe`, if any, returning the stored
    /// handle. The caller owns any cleanup of the returned handle -- the
    /// table never frees elements.
    ///
    /// The grow-down check that follows a successful erase is best-effort:
    /// if shrinking the group array fails to allocate, the larger array is
    /// kept rather than surfacing an error from an operation whose public
    /// signature is infallible (shrinking is a memory optimization, not a
    /// correctness requirement).
    pub fn erase(&mut self, probe: &T) -> Option<T> {
        let hash = self.hash_of(probe);
        let (hint, home) = hash::decompose(hash, self.group_mask);
        let (found, _) = self.locate(probe, hint, home);
        let (pos, idx) = found?;
        let prior = self.groups[pos].erase_at(idx);
        self.count -= 1;

        if self.needs_shrink() {
            let _ = self.shrink();
        }

        self.stats.dump("erase");
        Some(prior)
    }

    /// Converts a desired logical capacity into a group count and rehashes
    /// to it. May grow or shrink the table; the result is never sized below
    /// what the table's current element count needs.
    pub fn reserve(&mut self, capacity: usize) -> Result<()> {
        let requested = groups_for_capacity(capacity)?;
        let required_for_current = groups_for_capacity(self.count)?;
        self.rehash_to(requested.max(required_for_current))
    }

    /// Checks the group invariant: presence popcount sums to `count`, a full
    /// group implies was-full, and every occupied slot's cached hint matches
    /// the high byte of that element's hash under the current seed.
    /// Test-only; panics on violation.
    #[cfg(test)]
    fn debug_check_group_invariants(&self) {
        let mut total = 0usize;
        for group in self.groups.iter() {
            let presence = group.presence();
            total += presence.count_ones() as usize;
            if group.is_full() {
                assert!(group.was_full(), "a full group must have was-full set");
            }
            let mut bits = presence;
            while bits != 0 {
                let i = bits.trailing_zeros() as usize;
                let element = unsafe { group.entry(i) };
                let expected_hint = (self.hash_of(&element) >> hash::HINT_SHIFT) as u8;
                assert_eq!(group.hint(i), expected_hint, "stale hint at slot {i}");
                bits &= bits - 1;
            }
        }
        assert_eq!(total, self.count, "presence popcount must equal count");
    }

    /// Read-only traversal of every live entry, in arbitrary but
    /// mutation-stable order.
    pub fn iter(&self) -> Iter<'_, T> {
        let presence = self.groups.first().map(Group::presence).unwrap_or(0);
        Iter {
            groups: &self.groups,
            group_idx: 0,
            presence,
        }
    }

    #[inline]
    fn needs_grow_for_insert(&self) -> bool {
        let groups = (self.group_mask + 1) as u128;
        let slots = groups * GROUP_SLOTS as u128;
        // The pending insertion is anticipated (count + 1) so that the
        // load-factor bound holds immediately after every insert, not just
        // before the next one.
        (self.count as u128 + 1) * MAX_LOAD_DEN > MAX_LOAD_NUM * slots
    }

    #[inline]
    fn needs_shrink(&self) -> bool {
        let groups = self.group_mask + 1;
        if groups <= MIN_GROUPS {
            return false;
        }
        let slots = groups as u128 * GROUP_SLOTS as u128;
        (self.count as u128) * MIN_LOAD_DEN < MIN_LOAD_NUM * slots
    }

    fn grow(&mut self) -> Result<()> {
        let new_group_count = (self.group_mask + 1)
            .checked_mul(2)
            .ok_or(TableError::CapacityOverflow)?;
        self.rehash_to(new_group_count)
    }

    fn shrink(&mut self) -> Result<()> {
        let new_group_count = ((self.group_mask + 1) / 2).max(MIN_GROUPS);
        self.rehash_to(new_group_count)
    }

    /// Allocates a fresh group array of `new_group_count` groups, derives a
    /// new seed, and reinserts every live element via insert-new (the
    /// source is already deduplicated, so no equality check is needed),
    /// then swaps it in. `was_full` bits on the new array exist only where
    /// genuinely filled during this reinsertion.
    fn rehash_to(&mut self, new_group_count: usize) -> Result<()> {
        debug_assert!(new_group_count.is_power_of_two());
        debug_assert!(new_group_count >= MIN_GROUPS);

        let mut new_groups = alloc_groups(new_group_count)?;
        let new_mask = new_group_count - 1;
        let new_seed = hash::fresh_seed();

        for group in self.groups.iter() {
            let mut presence = group.presence();
            while presence != 0 {
                let i = presence.trailing_zeros() as usize;
                let element = unsafe { group.entry(i) };
                let hash = (self.hasher)(&element, new_seed);
                let (hint, home) = hash::decompose(hash, new_mask);

                let mut seq = ProbeSeq::new(home);
                loop {
                    let pos = seq.pos();
                    if let Some(slot) = new_groups[pos].first_empty_index() {
                        new_groups[pos].insert_at(slot, element, hint);
                        break;
                    }
                    seq.advance(new_mask);
                }

                presence &= presence - 1;
            }
        }

        self.groups = new_groups;
        self.group_mask = new_mask;
        self.seed = new_seed;
        Ok(())
    }
}

/// Read-only iterator over live entries.
pub struct Iter<'a, T> {
    groups: &'a [Group<T>],
    group_idx: usize,
    presence: u8,
}

impl<'a, T: Copy> Iterator for Iter<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        loop {
            if self.presence != 0 {
                let i = self.presence.trailing_zeros() as usize;
                self.presence &= self.presence - 1;
                return Some(unsafe { self.groups[self.group_idx].entry(i) });
            }
            self.group_idx += 1;
            if self.group_idx >= self.groups.len() {
                return None;
            }
            self.presence = self.groups[self.group_idx].presence();
        }
    }
}

/// Allocates a power-of-two array of empty groups, surfacing allocator
/// failure as [`TableError::Allocation`] rather than aborting.
fn alloc_groups<T: Copy>(group_count: usize) -> Result<Box<[Group<T>]>> {
    let mut groups: Vec<Group<T>> = Vec::new();
    groups
        .try_reserve_exact(group_count)
        .map_err(|_| TableError::Allocation)?;
    groups.resize_with(group_count, Group::empty);
    Ok(groups.into_boxed_slice())
}

/// Converts a desired logical capacity `n` into a group count:
/// `groups = roundup_pow2((n / MAX_LOAD_FACTOR) / 7 + 1)`, computed with
/// exact-fraction arithmetic instead of floats.
fn groups_for_capacity(n: usize) -> Result<usize> {
    let scaled = (n as u128 * MAX_LOAD_DEN).div_ceil(MAX_LOAD_NUM);
    let raw = scaled / GROUP_SLOTS as u128 + 1;
    let groups = raw.max(MIN_GROUPS as u128);
    if groups > usize::MAX as u128 {
        return Err(TableError::CapacityOverflow);
    }
    Ok((groups as usize).next_power_of_two().max(MIN_GROUPS))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u64_set() -> HashSet<u64, impl Fn(&u64, u64) -> u64, impl Fn(&u64, &u64) -> bool> {
        HashSet::new(|k: &u64, seed: u64| crate::hash::murmur2_64(&k.to_le_bytes(), seed), |a, b| a == b)
    }

    #[test]
    fn fresh_table_starts_at_min_groups() {
        let set = u64_set();
        assert_eq!(set.group_count(), MIN_GROUPS);
        assert_eq!(set.len(), 0);
        assert!(set.is_empty());
    }

    #[test]
    fn basic_insert_and_find() {
        let mut set = u64_set();
        assert_eq!(set.insert(42).unwrap(), true);
        assert_eq!(set.len(), 1);
        assert_eq!(set.find(&42), Some(42));
        assert_eq!(set.find(&7), None);
    }

    #[test]
    fn upsert_is_idempotent() {
        let mut set = u64_set();
        assert_eq!(set.insert(123).unwrap(), true);
        assert_eq!(set.insert(123).unwrap(), false);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn erase_removes_and_find_returns_none() {
        let mut set = u64_set();
        set.insert(5).unwrap();
        assert_eq!(set.erase(&5), Some(5));
        assert_eq!(set.find(&5), None);
        assert_eq!(set.len(), 0);
        assert_eq!(set.erase(&5), None);
    }

    #[test]
    fn insert_new_skips_dedup_and_can_duplicate() {
        let mut set = u64_set();
        set.insert_new(9).unwrap();
        set.insert_new(9).unwrap();
        // Both copies are present; find returns one of them unspecifiedly.
        assert_eq!(set.len(), 2);
        assert_eq!(set.find(&9), Some(9));
    }

    #[test]
    fn grows_past_the_load_factor_and_keeps_everything_findable() {
        let mut set = u64_set();
        for i in 0..500u64 {
            set.insert(i).unwrap();
        }
        assert_eq!(set.len(), 500);
        assert!(set.group_count() > MIN_GROUPS);
        for i in 0..500u64 {
            assert_eq!(set.find(&i), Some(i));
        }
    }

    #[test]
    fn shrinks_after_bulk_erase() {
        let mut set = u64_set();
        for i in 0..1000u64 {
            set.insert(i).unwrap();
        }
        let grown = set.group_count();
        assert!(grown > MIN_GROUPS);

        for i in 0..900u64 {
            set.erase(&i);
        }
        assert_eq!(set.len(), 100);
        assert!(set.group_count() < grown);
        assert!(set.group_count() >= MIN_GROUPS);

        for i in 0..900u64 {
            assert_eq!(set.find(&i), None);
        }
        for i in 900..1000u64 {
            assert_eq!(set.find(&i), Some(i));
        }
    }

    #[test]
    fn reserve_avoids_growing_during_subsequent_inserts() {
        let mut set = u64_set();
        set.reserve(10_000).unwrap();
        let groups_after_reserve = set.group_count();
        for i in 0..10_000u64 {
            set.insert(i).unwrap();
        }
        assert_eq!(set.group_count(), groups_after_reserve);
        assert_eq!(set.len(), 10_000);
    }

    #[test]
    fn iteration_visits_every_live_element_exactly_once() {
        let mut set = u64_set();
        let inserted: Vec<u64> = (0..200).collect();
        for &i in &inserted {
            set.insert(i).unwrap();
        }
        let mut seen: Vec<u64> = set.iter().collect();
        seen.sort_unstable();
        assert_eq!(seen, inserted);
    }

    #[test]
    fn load_factor_bound_holds_after_every_insert() {
        let mut set = u64_set();
        for i in 0..2000u64 {
            set.insert(i).unwrap();
            let slots = (set.group_count() * GROUP_SLOTS) as u128;
            assert!((set.len() as u128) * MAX_LOAD_DEN <= MAX_LOAD_NUM * slots);
        }
    }

    proptest::proptest! {
        /// Checks the group invariant after every single operation in an
        /// arbitrary insert/erase interleaving: the presence popcount always
        /// matches `count`, a full group is always was-full, and every
        /// stored hint matches the element it tags.
        #[test]
        fn group_invariants_hold_after_every_operation(
            ops in proptest::collection::vec((0u64..80, proptest::bool::ANY), 0..300)
        ) {
            let mut set = u64_set();
            for (key, should_insert) in ops {
                if should_insert {
                    let _ = set.insert(key);
                } else {
                    let _ = set.erase(&key);
                }
                set.debug_check_group_invariants();
            }
        }
    }
}
