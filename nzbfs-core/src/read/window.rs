//! How many segments a single read may touch.

use crate::config::DEFAULT_WORKERS;

const SEGMENTS_PER_WORKER: usize = 8;
const WINDOW_FLOOR: usize = 20;
const WINDOW_CEILING: usize = 100;

/// Ranges above this are treated as bulk/streaming reads.
pub const BULK_READ_THRESHOLD: u64 = 50 * 1024 * 1024;
const BULK_SEGMENTS_PER_WORKER: usize = 12;
const BULK_WINDOW_FLOOR: usize = 30;
const BULK_WINDOW_CEILING: usize = 150;

/// Segment window for a read of `range_len` bytes with `workers` fetchers.
/// `workers == 0` means the default worker count.
pub fn window_limit(workers: usize, range_len: u64) -> usize {
    let workers = if workers == 0 { DEFAULT_WORKERS } else { workers };
    if range_len > BULK_READ_THRESHOLD {
        workers
            .saturating_mul(BULK_SEGMENTS_PER_WORKER)
            .clamp(BULK_WINDOW_FLOOR, BULK_WINDOW_CEILING)
    } else {
        workers
            .saturating_mul(SEGMENTS_PER_WORKER)
            .clamp(WINDOW_FLOOR, WINDOW_CEILING)
    }
}
