use std::sync::atomic::Ordering;
use std::sync::Arc;

use wwanmux_channel::ChannelTransport;
use wwanmux_frame::session_to_tag;

use crate::device::RootDevice;
use crate::error::{MuxError, Result};
use crate::host::HostStack;
use crate::registry::SessionRegistry;
use crate::session::FlowTransition;

/// Flow-control entry point that can be handed to the channel layer.
///
/// Holds only the session registry, so a transport may keep it (for example
/// inside a backpressure callback) without owning the root device.
#[derive(Clone)]
pub struct FlowHandle {
    registry: Arc<SessionRegistry>,
}

impl FlowHandle {
    /// Stop (`engage = true`) or restart the session with wire id
    /// `session_id`. Repeating the current state is a no-op.
    pub fn set_flow_control(&self, session_id: u32, engage: bool) -> Result<()> {
        let tag = session_to_tag(session_id).ok_or(MuxError::InvalidSessionId(session_id))?;
        match self.registry.set_flow_control(tag, engage) {
            Ok(FlowTransition::Changed) => {
                tracing::debug!(session_id, tag, engage, "flow control changed");
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(err) => {
                tracing::debug!(session_id, tag, engage, "flow control for unbound session");
                Err(err)
            }
        }
    }

    pub fn is_flow_controlled(&self, session_id: u32) -> bool {
        session_to_tag(session_id).is_some_and(|tag| self.registry.is_flow_controlled(tag))
    }
}

impl<T: ChannelTransport, H: HostStack> RootDevice<T, H> {
    /// A handle for reporting backpressure from the channel layer.
    pub fn flow_handle(&self) -> FlowHandle {
        FlowHandle {
            registry: Arc::clone(&self.registry),
        }
    }

    pub fn set_flow_control(&self, session_id: u32, engage: bool) -> Result<()> {
        self.flow_handle().set_flow_control(session_id, engage)
    }

    pub fn is_flow_controlled(&self, session_id: u32) -> bool {
        self.flow_handle().is_flow_controlled(session_id)
    }

    /// True if the host must not hand frames to transmit `queue`.
    ///
    /// Every queue is stopped while the device is down. Queue 0 (root and
    /// control traffic) is otherwise always running; queue `n` follows the
    /// flow-control state of IP session tag `n`. Queues past the IP session
    /// count do not exist and report stopped.
    pub fn queue_stopped(&self, queue: u16) -> bool {
        if !self.up.load(Ordering::SeqCst) {
            return true;
        }
        if queue == 0 {
            return false;
        }
        if usize::from(queue) > self.max_sessions {
            return true;
        }
        self.registry.is_flow_controlled(queue)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::thread;

    use wwanmux_channel::{LoopbackConfig, LoopbackTransport};

    use super::*;
    use crate::config::MuxConfig;
    use crate::host::CollectingHost;

    fn device() -> RootDevice<Arc<LoopbackTransport>, CollectingHost> {
        let transport = Arc::new(LoopbackTransport::with_config(LoopbackConfig {
            max_channels: 16,
            queue_depth: Some(2),
        }));
        let device =
            RootDevice::init(transport, CollectingHost::new(), MuxConfig::default()).unwrap();
        device.open().unwrap();
        device
    }

    #[test]
    fn flow_control_is_isolated_per_session() {
        let device = device();
        device.add_session(1).unwrap();
        device.add_session(2).unwrap();

        device.set_flow_control(1, true).unwrap();
        assert!(device.is_flow_controlled(1));
        assert!(!device.is_flow_controlled(0));
        assert!(device.queue_stopped(2));
        assert!(!device.queue_stopped(1));

        device.set_flow_control(1, false).unwrap();
        assert!(!device.is_flow_controlled(1));
        assert!(!device.queue_stopped(2));
    }

    #[test]
    fn repeated_requests_are_idempotent() {
        let device = device();
        device.add_session(3).unwrap();
        device.set_flow_control(2, true).unwrap();
        device.set_flow_control(2, true).unwrap();
        assert!(device.is_flow_controlled(2));
        device.set_flow_control(2, false).unwrap();
        device.set_flow_control(2, false).unwrap();
        assert!(!device.is_flow_controlled(2));
    }

    #[test]
    fn unbound_session() {
        let device = device();
        assert!(matches!(
            device.set_flow_control(9, true),
            Err(MuxError::UnknownSession(10))
        ));
        assert!(!device.is_flow_controlled(9));
        assert!(matches!(
            device.set_flow_control(u32::MAX, true),
            Err(MuxError::InvalidSessionId(_))
        ));
    }

    #[test]
    fn removed_session_forgets_flow_control() {
        let device = device();
        device.add_session(1).unwrap();
        device.set_flow_control(0, true).unwrap();
        device.remove_session(1).unwrap();
        device.add_session(1).unwrap();
        assert!(!device.is_flow_controlled(0));
    }

    #[test]
    fn queues_stop_with_device() {
        let device = device();
        assert!(!device.queue_stopped(0));
        device.stop();
        assert!(device.queue_stopped(0));
        assert!(device.queue_stopped(1));
        device.open().unwrap();
        assert!(!device.queue_stopped(0));
        assert!(device.queue_stopped(9));
    }

    #[test]
    fn handle_outlives_concurrent_toggling() {
        let device = Arc::new(device());
        device.add_session(1).unwrap();
        device.add_session(2).unwrap();
        let handle = device.flow_handle();
        let stop = Arc::new(AtomicBool::new(false));

        let toggler = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut engage = true;
                while !stop.load(Ordering::Relaxed) {
                    handle.set_flow_control(0, engage).unwrap();
                    engage = !engage;
                }
                handle.set_flow_control(0, false).unwrap();
            })
        };

        for _ in 0..1000 {
            assert!(!device.is_flow_controlled(1));
        }
        stop.store(true, Ordering::Relaxed);
        toggler.join().unwrap();
        assert!(!device.is_flow_controlled(0));
    }
}
