use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;

use crate::config::config_for_tag;
use crate::error::{ChannelError, Result};
use crate::traits::{ChannelId, ChannelTransport, Submit};

const DEFAULT_MAX_CHANNELS: usize = 64;

/// Callback fired with `(session_id, engage)` when an uplink queue fills up
/// (`true`) or is drained again (`false`).
pub type BackpressureHook = Arc<dyn Fn(u32, bool) + Send + Sync>;

/// Configuration for [`LoopbackTransport`].
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct LoopbackConfig {
    /// Size of the channel id pool.
    pub max_channels: usize,
    /// Uplink queue depth for every channel. `None` uses the UL transfer
    /// descriptor count of the channel's table entry.
    pub queue_depth: Option<usize>,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            max_channels: DEFAULT_MAX_CHANNELS,
            queue_depth: None,
        }
    }
}

struct OpenChannel {
    tag: u16,
    depth: usize,
    queue: VecDeque<Bytes>,
    throttled: bool,
}

/// In-memory channel transport.
///
/// Uplink payloads are queued per channel until [`drain`](Self::drain) is
/// called; a full queue answers `Submit::Retry` and engages backpressure.
pub struct LoopbackTransport {
    config: LoopbackConfig,
    channels: Mutex<HashMap<ChannelId, OpenChannel>>,
    refuse_opens: AtomicBool,
    fail_transmits: AtomicBool,
    hook: Mutex<Option<BackpressureHook>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::with_config(LoopbackConfig::default())
    }

    pub fn with_config(config: LoopbackConfig) -> Self {
        Self {
            config,
            channels: Mutex::new(HashMap::new()),
            refuse_opens: AtomicBool::new(false),
            fail_transmits: AtomicBool::new(false),
            hook: Mutex::new(None),
        }
    }

    /// Install the backpressure callback.
    pub fn set_backpressure_hook(&self, hook: BackpressureHook) {
        *lock(&self.hook) = Some(hook);
    }

    /// Make subsequent `open` calls fail with `ChannelError::Refused`.
    pub fn refuse_opens(&self, refuse: bool) {
        self.refuse_opens.store(refuse, Ordering::SeqCst);
    }

    /// Make subsequent `transmit` calls fail with an I/O error.
    pub fn fail_transmits(&self, fail: bool) {
        self.fail_transmits.store(fail, Ordering::SeqCst);
    }

    /// Open channels as `(tag, channel)` pairs, ordered by channel id.
    pub fn open_channels(&self) -> Vec<(u16, ChannelId)> {
        let channels = lock(&self.channels);
        let mut open: Vec<_> = channels.iter().map(|(id, ch)| (ch.tag, *id)).collect();
        open.sort_by_key(|(_, id)| *id);
        open
    }

    pub fn is_open(&self, channel: ChannelId) -> bool {
        lock(&self.channels).contains_key(&channel)
    }

    /// Number of payloads waiting on `channel`.
    pub fn queued(&self, channel: ChannelId) -> usize {
        lock(&self.channels)
            .get(&channel)
            .map(|ch| ch.queue.len())
            .unwrap_or(0)
    }

    /// Take every queued payload off `channel`, releasing backpressure.
    pub fn drain(&self, channel: ChannelId) -> Vec<Bytes> {
        let (drained, release) = {
            let mut channels = lock(&self.channels);
            match channels.get_mut(&channel) {
                Some(ch) => {
                    let release = ch.throttled.then_some(ch.tag);
                    ch.throttled = false;
                    (ch.queue.drain(..).collect(), release)
                }
                None => (Vec::new(), None),
            }
        };

        if let Some(tag) = release {
            self.fire_hook(tag, false);
        }
        drained
    }

    fn fire_hook(&self, tag: u16, engage: bool) {
        let hook = lock(&self.hook).clone();
        let Some(hook) = hook else {
            return;
        };
        // Wire-level session ids are the VLAN tag minus one.
        if let Some(session_id) = u32::from(tag).checked_sub(1) {
            tracing::debug!(tag, session_id, engage, "loopback backpressure");
            hook(session_id, engage);
        }
    }

    fn queue_depth(&self, tag: u16) -> usize {
        self.config
            .queue_depth
            .unwrap_or_else(|| config_for_tag(tag).ul_nr_of_entries as usize)
            .max(1)
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelTransport for LoopbackTransport {
    fn open(&self, tag: u16) -> Result<ChannelId> {
        if self.refuse_opens.load(Ordering::SeqCst) {
            return Err(ChannelError::Refused {
                tag,
                reason: "loopback configured to refuse opens".to_string(),
            });
        }

        let mut channels = lock(&self.channels);
        let raw = (0..self.config.max_channels)
            .filter_map(|raw| i32::try_from(raw).ok())
            .find(|raw| !channels.contains_key(&ChannelId::new(*raw)))
            .ok_or(ChannelError::Exhausted { tag })?;

        let channel = ChannelId::new(raw);
        channels.insert(
            channel,
            OpenChannel {
                tag,
                depth: self.queue_depth(tag),
                queue: VecDeque::new(),
                throttled: false,
            },
        );
        tracing::debug!(tag, %channel, "loopback channel opened");
        Ok(channel)
    }

    fn close(&self, tag: u16, channel: ChannelId) -> Result<()> {
        let mut channels = lock(&self.channels);
        match channels.get(&channel) {
            Some(ch) if ch.tag == tag => {
                channels.remove(&channel);
                tracing::debug!(tag, %channel, "loopback channel closed");
                Ok(())
            }
            Some(ch) => Err(ChannelError::TagMismatch {
                channel,
                tag,
                bound: ch.tag,
            }),
            None => Err(ChannelError::NotOpen(channel)),
        }
    }

    fn transmit(&self, tag: u16, channel: ChannelId, payload: Bytes) -> Result<Submit> {
        if self.fail_transmits.load(Ordering::SeqCst) {
            return Err(ChannelError::Io(std::io::Error::other(
                "loopback configured to fail transmits",
            )));
        }

        let (submit, engage) = {
            let mut channels = lock(&self.channels);
            let ch = channels
                .get_mut(&channel)
                .ok_or(ChannelError::NotOpen(channel))?;
            if ch.tag != tag {
                return Err(ChannelError::TagMismatch {
                    channel,
                    tag,
                    bound: ch.tag,
                });
            }

            if ch.queue.len() >= ch.depth {
                (Submit::Retry(payload), false)
            } else {
                ch.queue.push_back(payload);
                let engage = ch.queue.len() >= ch.depth && !ch.throttled;
                if engage {
                    ch.throttled = true;
                }
                (Submit::Accepted, engage)
            }
        };

        if engage {
            self.fire_hook(tag, true);
        }
        Ok(submit)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn small_queue() -> LoopbackTransport {
        LoopbackTransport::with_config(LoopbackConfig {
            max_channels: 4,
            queue_depth: Some(2),
        })
    }

    #[test]
    fn open_assigns_lowest_free_id() {
        let transport = small_queue();
        let a = transport.open(1).unwrap();
        let b = transport.open(2).unwrap();
        assert_eq!((a.raw(), b.raw()), (0, 1));

        transport.close(1, a).unwrap();
        let c = transport.open(3).unwrap();
        assert_eq!(c.raw(), 0);
        assert_eq!(transport.open_channels(), vec![(3, c), (2, b)]);
    }

    #[test]
    fn pool_exhaustion() {
        let transport = small_queue();
        for tag in 1..=4 {
            transport.open(tag).unwrap();
        }
        assert!(matches!(
            transport.open(5),
            Err(ChannelError::Exhausted { tag: 5 })
        ));
    }

    #[test]
    fn refused_open() {
        let transport = small_queue();
        transport.refuse_opens(true);
        assert!(matches!(
            transport.open(1),
            Err(ChannelError::Refused { .. })
        ));
    }

    #[test]
    fn close_checks_binding() {
        let transport = small_queue();
        let ch = transport.open(7).unwrap();
        assert!(matches!(
            transport.close(8, ch),
            Err(ChannelError::TagMismatch { bound: 7, .. })
        ));
        transport.close(7, ch).unwrap();
        assert!(matches!(
            transport.close(7, ch),
            Err(ChannelError::NotOpen(_))
        ));
    }

    #[test]
    fn transmit_on_closed_channel_fails() {
        let transport = small_queue();
        let ch = transport.open(1).unwrap();
        transport.close(1, ch).unwrap();
        let err = transport
            .transmit(1, ch, Bytes::from_static(b"x"))
            .unwrap_err();
        assert!(matches!(err, ChannelError::NotOpen(_)));
    }

    #[test]
    fn full_queue_retries_and_hook_fires() {
        let transport = small_queue();
        let engaged = Arc::new(AtomicUsize::new(0));
        let released = Arc::new(AtomicUsize::new(0));
        let (e, r) = (engaged.clone(), released.clone());
        transport.set_backpressure_hook(Arc::new(move |session_id, engage| {
            assert_eq!(session_id, 9);
            if engage {
                e.fetch_add(1, Ordering::SeqCst);
            } else {
                r.fetch_add(1, Ordering::SeqCst);
            }
        }));

        let ch = transport.open(10).unwrap();
        let first = transport.transmit(10, ch, Bytes::from_static(b"1")).unwrap();
        let second = transport.transmit(10, ch, Bytes::from_static(b"2")).unwrap();
        let third = transport.transmit(10, ch, Bytes::from_static(b"3")).unwrap();

        assert_eq!(first, Submit::Accepted);
        assert_eq!(second, Submit::Accepted);
        assert_eq!(third, Submit::Retry(Bytes::from_static(b"3")));
        assert_eq!(engaged.load(Ordering::SeqCst), 1);

        let drained = transport.drain(ch);
        assert_eq!(drained.len(), 2);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(transport.queued(ch), 0);
    }

    #[test]
    fn default_depth_follows_channel_table() {
        let transport = LoopbackTransport::new();
        let ch = transport.open(258).unwrap();
        for _ in 0..4 {
            assert_eq!(
                transport.transmit(258, ch, Bytes::from_static(b"AT")).unwrap(),
                Submit::Accepted
            );
        }
        assert!(matches!(
            transport.transmit(258, ch, Bytes::from_static(b"AT")),
            Ok(Submit::Retry(_))
        ));
    }

    #[test]
    fn injected_transmit_failure() {
        let transport = small_queue();
        let ch = transport.open(1).unwrap();
        transport.fail_transmits(true);
        assert!(matches!(
            transport.transmit(1, ch, Bytes::new()),
            Err(ChannelError::Io(_))
        ));
    }
}
