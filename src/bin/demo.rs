//! Micro-benchmark driver for `flatset`, in the spirit of the original
//! `cuckoo-hashing-benchmark` binary: insert N random keys, then time a
//! fixed number of finds against them.

use std::hint::black_box;
use std::time::Instant;

use flatset::murmur::murmur2_64;
use flatset::HashSet;

fn bench_find(n: usize) {
    let mut rng = fastrand::Rng::with_seed(123);
    let mut table: HashSet<u64, _, _> =
        HashSet::new(|k: &u64, seed: u64| murmur2_64(&k.to_le_bytes(), seed), |a, b| a == b);

    for _ in 0..n {
        let key = rng.u64(..);
        table.insert(key).expect("allocation failure while populating demo table");
    }
    log::info!("populated {n} keys across {} groups", table.group_count());

    const ITERS: usize = 10_000_000;
    let start = Instant::now();
    let mut found = 0usize;
    for _ in 0..ITERS {
        let key = rng.u64(..);
        found += table.find(&key).is_some() as usize;
    }
    black_box(found);
    let duration = start.elapsed();
    println!("n={n}: {:.2} ns/find ({found} hits)", duration.as_nanos() as f64 / ITERS as f64);
}

fn main() {
    env_logger::init();
    for &n in &[1_000, 100_000, 1_000_000] {
        bench_find(n);
    }
}
