use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use wwanmux_channel::{ChannelId, ChannelTransport, RESERVED_CHANNELS};
use wwanmux_frame::{session_to_tag, MacAddr};

use crate::config::{check_mtu, MuxConfig};
use crate::error::{MuxError, Result};
use crate::host::{DeviceInfo, HostStack};
use crate::registry::SessionRegistry;
use crate::session::SessionSnapshot;
use crate::stats::StatsSnapshot;

/// The root network device all VLAN sessions hang off.
///
/// Owns the session registry and sits between a [`ChannelTransport`] below
/// and a [`HostStack`] above. All methods take `&self`: the data plane
/// (`transmit`, `receive`, flow control) runs concurrently with
/// administrative calls from any number of threads.
pub struct RootDevice<T: ChannelTransport, H: HostStack> {
    pub(crate) transport: T,
    pub(crate) host: H,
    pub(crate) registry: Arc<SessionRegistry>,
    name: String,
    pub(crate) max_sessions: usize,
    mtu: AtomicUsize,
    mac: RwLock<MacAddr>,
    pub(crate) up: AtomicBool,
    registered: AtomicBool,
}

/// Serializable summary of the root device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStats {
    pub name: String,
    pub mac_address: String,
    pub mtu: usize,
    pub up: bool,
    pub sessions: usize,
    pub capacity: usize,
    #[serde(flatten)]
    pub totals: StatsSnapshot,
}

impl<T: ChannelTransport, H: HostStack> RootDevice<T, H> {
    /// Create the root device and register it with the host stack.
    pub fn init(transport: T, host: H, config: MuxConfig) -> Result<Self> {
        config.validate()?;
        let mac = config.parsed_mac()?.unwrap_or_else(MacAddr::random);
        let capacity = config.max_sessions + RESERVED_CHANNELS;

        let device = Self {
            transport,
            host,
            registry: Arc::new(SessionRegistry::new(capacity)),
            name: config.name,
            max_sessions: config.max_sessions,
            mtu: AtomicUsize::new(config.mtu),
            mac: RwLock::new(mac),
            up: AtomicBool::new(false),
            registered: AtomicBool::new(false),
        };

        let info = DeviceInfo {
            name: device.name.clone(),
            mac,
            mtu: config.mtu,
            tx_queues: device.tx_queue_count(),
        };
        device
            .host
            .attach(&info)
            .map_err(|err| MuxError::HostRejected(err.to_string()))?;
        device.registered.store(true, Ordering::SeqCst);

        tracing::info!(
            name = %device.name,
            %mac,
            max_sessions = device.max_sessions,
            capacity,
            "root device registered"
        );
        Ok(device)
    }

    /// Detach from the host stack, then close every session's channel.
    pub fn deinit(self) {
        self.shutdown();
    }

    fn shutdown(&self) {
        if !self.registered.swap(false, Ordering::SeqCst) {
            return;
        }
        self.up.store(false, Ordering::SeqCst);
        self.host.detach();
        let closed = self.registry.remove_all(&self.transport);
        let leaked = self.registry.len();
        if leaked > 0 {
            tracing::warn!(name = %self.name, closed, leaked, "sessions left open at deinit");
        } else {
            tracing::info!(name = %self.name, closed, "root device unregistered");
        }
    }

    pub fn add_session(&self, tag: u16) -> Result<ChannelId> {
        self.registry
            .add(&self.transport, tag)
            .inspect_err(|err| tracing::warn!(tag, error = %err, "add session failed"))
    }

    pub fn remove_session(&self, tag: u16) -> Result<()> {
        self.registry
            .remove(&self.transport, tag)
            .inspect_err(|err| tracing::warn!(tag, error = %err, "remove session failed"))
    }

    pub fn change_mtu(&self, mtu: usize) -> Result<()> {
        check_mtu(mtu)?;
        let old = self.mtu.swap(mtu, Ordering::SeqCst);
        tracing::info!(name = %self.name, old, new = mtu, "MTU changed");
        Ok(())
    }

    /// Set the hardware address. The all-zero address clears it, after
    /// which the device cannot be opened until a new address is set.
    /// Any other address is refused while the device is up.
    pub fn set_mac_address(&self, mac: MacAddr) -> Result<()> {
        if !mac.is_zero() && self.is_up() {
            return Err(MuxError::DeviceBusy(self.name.clone()));
        }
        if mac.is_multicast() {
            return Err(MuxError::InvalidAddress(mac));
        }
        *self.mac.write().unwrap_or_else(PoisonError::into_inner) = mac;
        if mac.is_zero() {
            tracing::info!(name = %self.name, "hardware address cleared");
        } else {
            tracing::info!(name = %self.name, %mac, "hardware address set");
        }
        Ok(())
    }

    /// Start all transmit queues.
    pub fn open(&self) -> Result<()> {
        let mac = self.mac_address();
        if !mac.is_valid_unicast() {
            return Err(MuxError::InvalidAddress(mac));
        }
        self.up.store(true, Ordering::SeqCst);
        tracing::info!(name = %self.name, "root device up");
        Ok(())
    }

    /// Stop all transmit queues.
    pub fn stop(&self) {
        self.up.store(false, Ordering::SeqCst);
        tracing::info!(name = %self.name, "root device down");
    }

    /// Count one packet on the session with wire id `session_id` and on the
    /// root device.
    pub fn update_stats(&self, session_id: u32, bytes: u64, is_tx: bool) -> Result<()> {
        let tag = session_to_tag(session_id).ok_or(MuxError::InvalidSessionId(session_id))?;
        self.registry
            .mutate_counters(tag, bytes, is_tx)
            .inspect_err(|_| tracing::debug!(session_id, tag, "stats for unbound session"))
    }

    pub fn stats(&self) -> DeviceStats {
        DeviceStats {
            name: self.name.clone(),
            mac_address: self.mac_address().to_string(),
            mtu: self.mtu(),
            up: self.is_up(),
            sessions: self.registry.len(),
            capacity: self.registry.capacity(),
            totals: self.registry.root_stats().snapshot(),
        }
    }

    pub fn session_stats(&self, tag: u16) -> Option<SessionSnapshot> {
        self.registry.lookup(tag).map(|entry| entry.session.snapshot())
    }

    /// Snapshots of all live sessions in table order.
    pub fn sessions(&self) -> Vec<SessionSnapshot> {
        self.registry.snapshot()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mtu(&self) -> usize {
        self.mtu.load(Ordering::SeqCst)
    }

    pub fn mac_address(&self) -> MacAddr {
        *self.mac.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    pub fn tx_queue_count(&self) -> usize {
        1 + self.max_sessions
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn host(&self) -> &H {
        &self.host
    }
}

impl<T: ChannelTransport, H: HostStack> Drop for RootDevice<T, H> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use wwanmux_channel::LoopbackTransport;

    use super::*;
    use crate::host::CollectingHost;

    type Device = RootDevice<Arc<LoopbackTransport>, Arc<CollectingHost>>;

    fn device(max_sessions: usize) -> (Device, Arc<LoopbackTransport>, Arc<CollectingHost>) {
        let transport = Arc::new(LoopbackTransport::new());
        let host = Arc::new(CollectingHost::new());
        let config = MuxConfig {
            max_sessions,
            mac_address: Some("02:11:22:33:44:55".to_string()),
            ..MuxConfig::default()
        };
        let device = RootDevice::init(Arc::clone(&transport), Arc::clone(&host), config).unwrap();
        (device, transport, host)
    }

    #[test]
    fn init_registers_with_host() {
        let (device, _, host) = device(4);
        assert!(device.is_registered());
        assert!(!device.is_up());
        assert!(host.is_attached());
        let info = host.device_info().unwrap();
        assert_eq!(info.tx_queues, 5);
        assert_eq!(info.mac, MacAddr([0x02, 0x11, 0x22, 0x33, 0x44, 0x55]));
        assert_eq!(device.registry().capacity(), 4 + RESERVED_CHANNELS);
    }

    #[test]
    fn random_mac_when_unset() {
        let device = RootDevice::init(
            LoopbackTransport::new(),
            CollectingHost::new(),
            MuxConfig::default(),
        )
        .unwrap();
        assert!(device.mac_address().is_valid_unicast());
    }

    #[test]
    fn host_rejection() {
        let host = CollectingHost::new();
        host.reject_attach(true);
        let result = RootDevice::init(LoopbackTransport::new(), host, MuxConfig::default());
        assert!(matches!(result, Err(MuxError::HostRejected(_))));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = MuxConfig {
            max_sessions: 0,
            ..MuxConfig::default()
        };
        let result = RootDevice::init(LoopbackTransport::new(), CollectingHost::new(), config);
        assert!(matches!(result, Err(MuxError::InvalidConfig(_))));
    }

    #[test]
    fn deinit_detaches_and_closes_channels() {
        let (device, transport, host) = device(4);
        for tag in [1, 2, 257] {
            device.add_session(tag).unwrap();
        }
        assert_eq!(transport.open_channels().len(), 3);

        device.deinit();
        assert!(!host.is_attached());
        assert!(transport.open_channels().is_empty());
    }

    #[test]
    fn drop_behaves_like_deinit() {
        let (device, transport, host) = device(4);
        device.add_session(3).unwrap();
        drop(device);
        assert!(!host.is_attached());
        assert!(transport.open_channels().is_empty());
    }

    #[test]
    fn mtu_range() {
        let (device, _, _) = device(2);
        assert!(matches!(
            device.change_mtu(67),
            Err(MuxError::OutOfRange { min: 68, .. })
        ));
        assert!(device.change_mtu(1024 * 1024 + 1).is_err());
        device.change_mtu(68).unwrap();
        device.change_mtu(1024 * 1024).unwrap();
        assert_eq!(device.mtu(), 1024 * 1024);
    }

    #[test]
    fn mac_rules() {
        let (device, _, _) = device(2);
        let multicast = MacAddr([0x01, 0, 0x5e, 0, 0, 1]);
        assert!(matches!(
            device.set_mac_address(multicast),
            Err(MuxError::InvalidAddress(_))
        ));

        device.open().unwrap();
        device.stop();

        device.set_mac_address(MacAddr::ZERO).unwrap();
        assert!(device.mac_address().is_zero());
        assert!(matches!(device.open(), Err(MuxError::InvalidAddress(_))));

        device
            .set_mac_address(MacAddr([0x02, 0, 0, 0, 0, 9]))
            .unwrap();
        device.open().unwrap();
        assert!(device.is_up());
    }

    #[test]
    fn mac_change_refused_while_up() {
        let (device, _, _) = device(2);
        let before = device.mac_address();
        device.open().unwrap();

        assert!(matches!(
            device.set_mac_address(MacAddr([0x02, 0, 0, 0, 0, 7])),
            Err(MuxError::DeviceBusy(_))
        ));
        assert_eq!(device.mac_address(), before);
        assert!(device.is_up());

        device.stop();
        device
            .set_mac_address(MacAddr([0x02, 0, 0, 0, 0, 7]))
            .unwrap();
        assert_eq!(device.mac_address(), MacAddr([0x02, 0, 0, 0, 0, 7]));

        device.open().unwrap();
        device.set_mac_address(MacAddr::ZERO).unwrap();
        assert!(device.mac_address().is_zero());
    }

    #[test]
    fn concurrent_stats_are_exact() {
        let (device, _, _) = device(4);
        device.add_session(1).unwrap();
        device.add_session(2).unwrap();
        let device = Arc::new(device);

        let workers: Vec<_> = (0..10)
            .flat_map(|_| [(0, 1), (1, 100)])
            .map(|(session_id, bytes)| {
                let device = Arc::clone(&device);
                thread::spawn(move || {
                    for _ in 0..10 {
                        device.update_stats(session_id, bytes, true).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let first = device.session_stats(1).unwrap().stats;
        assert_eq!((first.tx_packets, first.tx_bytes), (100, 100));
        let second = device.session_stats(2).unwrap().stats;
        assert_eq!((second.tx_packets, second.tx_bytes), (100, 10_000));
        let root = device.stats().totals;
        assert_eq!((root.tx_packets, root.tx_bytes), (200, 10_100));
        assert_eq!(root.rx_packets, 0);
    }

    #[test]
    fn stats_for_unbound_session() {
        let (device, _, _) = device(4);
        assert!(matches!(
            device.update_stats(4, 10, false),
            Err(MuxError::UnknownSession(5))
        ));
        assert!(matches!(
            device.update_stats(u32::MAX, 10, false),
            Err(MuxError::InvalidSessionId(_))
        ));
        assert_eq!(device.stats().totals, StatsSnapshot::default());
    }
}
