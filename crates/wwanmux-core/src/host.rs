use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use wwanmux_frame::{LinkFrame, MacAddr};

/// Identity of the root device as announced to the host stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub mac: MacAddr,
    pub mtu: usize,
    /// One queue for the root device plus one per IP session.
    pub tx_queues: usize,
}

/// Host stack verdict for an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Accepted,
    Dropped,
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct HostError(pub String);

/// The host network stack the root device is registered with.
pub trait HostStack: Send + Sync {
    /// Register the root device.
    fn attach(&self, _info: &DeviceInfo) -> Result<(), HostError> {
        Ok(())
    }

    /// Unregister the root device. Called before any channel is closed.
    fn detach(&self) {}

    /// Hand an inbound frame to the stack.
    fn deliver(&self, frame: LinkFrame) -> Delivery;
}

impl<H: HostStack + ?Sized> HostStack for Arc<H> {
    fn attach(&self, info: &DeviceInfo) -> Result<(), HostError> {
        <H as HostStack>::attach(&**self, info)
    }

    fn detach(&self) {
        <H as HostStack>::detach(&**self)
    }

    fn deliver(&self, frame: LinkFrame) -> Delivery {
        <H as HostStack>::deliver(&**self, frame)
    }
}

/// Host stack that keeps delivered frames in memory.
#[derive(Debug, Default)]
pub struct CollectingHost {
    frames: Mutex<VecDeque<LinkFrame>>,
    limit: Option<usize>,
    attached: AtomicBool,
    reject_attach: AtomicBool,
    info: Mutex<Option<DeviceInfo>>,
}

impl CollectingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop frames once `limit` are waiting.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Make subsequent `attach` calls fail.
    pub fn reject_attach(&self, reject: bool) {
        self.reject_attach.store(reject, Ordering::SeqCst);
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    /// The info passed to the last successful `attach`.
    pub fn device_info(&self) -> Option<DeviceInfo> {
        lock(&self.info).clone()
    }

    pub fn pending(&self) -> usize {
        lock(&self.frames).len()
    }

    /// Take every delivered frame, oldest first.
    pub fn take_frames(&self) -> Vec<LinkFrame> {
        lock(&self.frames).drain(..).collect()
    }
}

impl HostStack for CollectingHost {
    fn attach(&self, info: &DeviceInfo) -> Result<(), HostError> {
        if self.reject_attach.load(Ordering::SeqCst) {
            return Err(HostError(format!("{} refused by host", info.name)));
        }
        *lock(&self.info) = Some(info.clone());
        self.attached.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
    }

    fn deliver(&self, frame: LinkFrame) -> Delivery {
        let mut frames = lock(&self.frames);
        if self.limit.is_some_and(|limit| frames.len() >= limit) {
            return Delivery::Dropped;
        }
        frames.push_back(frame);
        Delivery::Accepted
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
