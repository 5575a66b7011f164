use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Service epoch: 2025-01-01T00:00:00Z in Unix milliseconds.
const EPOCH_MS: u64 = 1_735_689_600_000;

const WORKER_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const TIMESTAMP_SHIFT: u32 = WORKER_BITS + SEQUENCE_BITS;
const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1;

/// Generator for 63-bit time-ordered message ids.
///
/// Sorting by id sorts by send time: the high bits hold milliseconds
/// since the service epoch, followed by a worker id and a
/// per-millisecond sequence. One generator per process; the worker id
/// keeps ids distinct across processes sharing a database.
pub struct SnowflakeGenerator {
    worker_id: u64,
    clock: Mutex<LogicalClock>,
}

/// The millisecond the generator last minted in, and how many ids it
/// has handed out within it.
struct LogicalClock {
    millis: u64,
    sequence: u64,
}

impl SnowflakeGenerator {
    pub fn new(worker_id: u16) -> Self {
        assert!(
            u64::from(worker_id) < (1u64 << WORKER_BITS),
            "worker_id must fit in {WORKER_BITS} bits"
        );
        Self {
            worker_id: u64::from(worker_id),
            clock: Mutex::new(LogicalClock {
                millis: 0,
                sequence: 0,
            }),
        }
    }

    pub fn generate(&self) -> i64 {
        let mut clock = self.clock.lock().unwrap();
        let now = unix_ms();

        if now > clock.millis {
            clock.millis = now;
            clock.sequence = 0;
        } else {
            // Same millisecond, or the wall clock stepped backwards:
            // take the next sequence slot, rolling into the following
            // logical millisecond once the slot space is exhausted.
            clock.sequence += 1;
            if clock.sequence > MAX_SEQUENCE {
                clock.millis += 1;
                clock.sequence = 0;
                while unix_ms() < clock.millis {
                    std::hint::spin_loop();
                }
            }
        }

        let elapsed = clock.millis - EPOCH_MS;
        ((elapsed << TIMESTAMP_SHIFT) | (self.worker_id << SEQUENCE_BITS) | clock.sequence) as i64
    }
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before Unix epoch")
        .as_millis() as u64
}
