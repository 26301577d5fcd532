//! Walks a pool through the full lifecycle: a burst of allocations followed
//! by scattered deallocations, then a compaction that packs the survivors
//! back together.
//!
//! Run with `RUST_LOG=debug` to see the pool's own diagnostics interleaved
//! with the statistics printed here.

use std::mem;

use fixedpool::{FitStrategy, Pool, PoolError};

fn main() -> Result<(), PoolError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let pool = Pool::new(1024, FitStrategy::FirstFit)?;

    let mut blocks = Vec::new();
    for value in 0..10u64 {
        let addr = pool.allocate(mem::size_of::<u64>())?;
        pool.write(addr, &value.to_ne_bytes())?;
        blocks.push(addr);
    }

    println!("after ten allocations:");
    print_statistics(&pool);

    for addr in blocks.iter().skip(1).step_by(2) {
        pool.deallocate(*addr)?;
    }

    println!("after freeing every other block:");
    print_statistics(&pool);

    let moved = pool.compact();
    for relocation in &moved {
        println!("block moved {} -> {}", relocation.from, relocation.to);
    }
    for addr in blocks.iter_mut() {
        if let Some(relocation) = moved.iter().find(|m| m.from == *addr) {
            *addr = relocation.to;
        }
    }

    println!("after compaction:");
    print_statistics(&pool);

    for (index, addr) in blocks.iter().enumerate().step_by(2) {
        let bytes = pool.read(*addr, mem::size_of::<u64>())?;
        let value = u64::from_ne_bytes(bytes.try_into().expect("u64 payload"));
        println!("block {index} still holds {value}");
    }

    Ok(())
}

fn print_statistics(pool: &Pool) {
    let stats = pool.statistics();
    println!("  total size:    {:>6}", stats.total_size);
    println!("  used chunks:   {:>6}", stats.live_chunks);
    println!("  free bytes:    {:>6}", stats.free_bytes);
    println!("  free chunks:   {:>6}", stats.free_chunks);
    println!("  smallest free: {:>6}", stats.smallest_free);
    println!("  largest free:  {:>6}", stats.largest_free);
}
