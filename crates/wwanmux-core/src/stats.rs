use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Packet and byte counters for one link (a session or the root device).
///
/// All updates are lock-free so any number of contexts may record at once.
#[derive(Debug, Default)]
pub struct LinkStats {
    tx_packets: AtomicU64,
    tx_bytes: AtomicU64,
    rx_packets: AtomicU64,
    rx_bytes: AtomicU64,
}

impl LinkStats {
    /// Count one packet of `bytes` in the given direction.
    pub fn record(&self, bytes: u64, is_tx: bool) {
        let (packets, total) = if is_tx {
            (&self.tx_packets, &self.tx_bytes)
        } else {
            (&self.rx_packets, &self.rx_bytes)
        };
        packets.fetch_add(1, Ordering::Relaxed);
        total.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            tx_packets: self.tx_packets.load(Ordering::Relaxed),
            tx_bytes: self.tx_bytes.load(Ordering::Relaxed),
            rx_packets: self.rx_packets.load(Ordering::Relaxed),
            rx_bytes: self.rx_bytes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a [`LinkStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub rx_bytes: u64,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn directions_are_independent() {
        let stats = LinkStats::default();
        stats.record(100, true);
        stats.record(40, false);
        stats.record(60, false);

        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                tx_packets: 1,
                tx_bytes: 100,
                rx_packets: 2,
                rx_bytes: 100,
            }
        );
    }

    #[test]
    fn concurrent_records_are_not_lost() {
        let stats = Arc::new(LinkStats::default());
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.record(3, true);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let snap = stats.snapshot();
        assert_eq!(snap.tx_packets, 4000);
        assert_eq!(snap.tx_bytes, 12_000);
    }
}
