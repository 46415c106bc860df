//! Hash decomposition and seed mixing, plus the reference byte hasher.

/// Bit offset of the high byte of a 64-bit hash, which feeds the hint.
/// Kept here (not in `group.rs`) since the hint/index split in
/// `decompose` depends on it only through `mask`, which callers already hold.
pub(crate) const HINT_SHIFT: u32 = 56;

/// Splits a 64-bit hash into its hint byte and its home-group index.
///
/// The high byte feeds the hint; the low bits (masked by `group_mask`) feed
/// the home group. Because both halves come from the same hash, a
/// low-entropy hasher degrades both probing and hint filtering at once --
/// this is a contract imposed on callers, not something this function can
/// repair.
#[inline]
pub(crate) fn decompose(hash: u64, group_mask: usize) -> (u8, usize) {
    let hint = (hash >> HINT_SHIFT) as u8;
    let home = (hash as usize) & group_mask;
    (hint, home)
}

/// Mixes a 64-bit value through a multiplicative fold, used both to derive a
/// fresh table seed (from a pointer-sized entropy source) and as the
/// workhorse of the reference byte hasher below. Modeled on the teacher's
/// `fold_hash_fast`.
#[inline(always)]
fn fold_mix(mut x: u64, seed: u64) -> u64 {
    const FOLD: u64 = 0x2d35_8dcc_aa6c_78a5;
    x ^= seed;
    let r = (x as u128) * (FOLD as u128);
    ((r >> 64) as u64) ^ (r as u64)
}

/// Derives a fresh per-table seed. The reference implementation mixes the
/// group array's base address through a 64-bit mixing function so seeds vary
/// across process instances and allocations; `aligned-vec`-free `Box`
/// allocation in this crate makes that address available too, but an
/// address-derived seed is unreliable under sanitizers and deterministic
/// allocators. We substitute a high-entropy seed from a process-wide RNG,
/// which satisfies the same contract: stable for the table's lifetime, and
/// different on every rehash.
#[inline]
pub(crate) fn fresh_seed() -> u64 {
    fold_mix(fastrand::u64(..), fastrand::u64(..))
}

/// A 64-bit MurmurHash2-style byte hasher, provided as a convenience for
/// callers who want to hash a byte-serializable key. The table itself
/// neither requires nor privileges this function -- any `Fn(&T, u64) -> u64`
/// satisfying the hasher contract works equally well.
pub fn murmur2_64(bytes: &[u8], seed: u64) -> u64 {
    const M: u64 = 0xc6a4_a793_5bd1_e995;
    const R: u32 = 47;

    let mut h: u64 = seed ^ (bytes.len() as u64).wrapping_mul(M);

    let mut chunks = bytes.chunks_exact(8);
    for chunk in &mut chunks {
        let mut k = u64::from_le_bytes(chunk.try_into().unwrap());
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);

        h ^= k;
        h = h.wrapping_mul(M);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut buf = [0u8; 8];
        buf[..tail.len()].copy_from_slice(tail);
        h ^= u64::from_le_bytes(buf);
        h = h.wrapping_mul(M);
    }

    h ^= h >> R;
    h = h.wrapping_mul(M);
    h ^= h >> R;
    h
}
