//! shrink-map: a concurrent hash map that gives memory back after
//! deletions by periodically rebuilding its backing storage.
//!
//! Internal Design:
//!
//! Summary
//! - Problem: hash tables keep their allocated capacity after entries are
//!   removed. A map that once held a million entries and now holds ten
//!   still pays for a million slots.
//! - Approach: count inserted and deleted keys since the last rebuild and,
//!   when enough of the storage is waste, move the live entries into a
//!   freshly sized table and drop the old one.
//! - Layers:
//!   - `Table<K, V, S>`: slot-map entry store indexed by a `HashTable` of
//!     precomputed hashes. Never shrinks on its own.
//!   - `policy`: pure decision (`should_shrink`) and sizing
//!     (`rebuild_capacity`) functions.
//!   - `ShrinkMap<K, V, S>`: public API. Owns the table behind a
//!     reader/writer lock, the atomic counters, the single-flight flag and
//!     the background worker.
//!   - `Scheduler`: background thread that ticks the policy and absorbs
//!     task panics.
//!
//! Counters
//! - `item_count` counts keys inserted since the last rebuild;
//!   `deleted_count` counts successful deletions since the last rebuild.
//!   `len() == item_count - deleted_count` whenever no mutation is in
//!   flight. Both are updated while the table's exclusive lock is held, but
//!   `len()` reads them without the lock and may observe a rebuild halfway.
//! - A rebuild stores the new size into `item_count` and zeroes
//!   `deleted_count`.
//!
//! Shrink policy
//! - Rebuild when `deleted / inserted >= shrink_ratio` and at least
//!   `min_shrink_interval` has passed since the previous rebuild. The ratio
//!   gate bounds waste; the cooldown bounds rebuild frequency under churn.
//! - Rebuilt capacity is `max(initial_capacity, ceil(len * growth))`.
//!
//! Concurrency
//! - Reads (`get`, `contains_key`, `snapshot`) take the shared lock; every
//!   mutation and the rebuild's copy-and-swap take the exclusive lock.
//! - Rebuilds are single-flight: a caller that finds one running returns
//!   `false` instead of waiting.
//! - Entries are moved during a rebuild using their stored hashes, so no
//!   `K: Hash`/`K: Eq` code runs while the exclusive lock is held for it.
//!
//! Triggers
//! - `delete` runs a synchronous shrink attempt when auto-shrink is on.
//! - `set` reaching `max_map_size` starts a shrink attempt off the caller's
//!   thread: on the worker if one runs, otherwise on a one-shot thread.
//! - `apply_batch` nudges the worker when auto-shrink is on.
//! - Neither waits for the rebuild.
//! - The worker evaluates the policy every `shrink_interval`.
//!
//! Lifecycle
//! - With auto-shrink enabled the worker holds a strong reference to the
//!   map. Call [`ShrinkMap::stop`] to end it; dropping all handles without
//!   stopping leaks the worker thread and the table.
//! - After `stop`, `set`, `conditional_set`, `get_or_set` and `apply_batch`
//!   fail with [`ShrinkMapError::MapStopped`]. Reads and `delete` keep
//!   working.
//!
//! ```
//! use shrink_map::{Config, ShrinkMap};
//!
//! let map: ShrinkMap<String, u32> = ShrinkMap::new(Config::default());
//! map.set("key".to_string(), 42).unwrap();
//! assert_eq!(map.get("key"), Some(42));
//! assert!(map.delete("key"));
//! map.stop();
//! ```

mod batch;
mod builder;
mod config;
mod error;
mod iter;
mod map;
mod metrics;
pub mod policy;
mod scheduler;
mod single_flight;
#[cfg(feature = "bench_internal")]
pub mod table;
#[cfg(not(feature = "bench_internal"))]
mod table;
#[cfg(test)]
mod table_proptest;

// Public surface
pub use batch::{Batch, BatchOp};
pub use builder::ShrinkMapBuilder;
pub use config::Config;
pub use error::{ErrorKind, Result, ShrinkMapError};
pub use iter::SnapshotIter;
pub use map::ShrinkMap;
pub use metrics::{ErrorRecord, MetricsSnapshot, ERROR_HISTORY_LIMIT};
pub use scheduler::SchedulerState;
