use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::Result;

/// Opaque transport handle for one open channel.
///
/// Negative values are invalid; [`ChannelId::INVALID`] marks an unbound slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(transparent)]
pub struct ChannelId(i32);

impl ChannelId {
    pub const INVALID: ChannelId = ChannelId(-1);

    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "ChannelId({})", self.0)
        } else {
            f.write_str("ChannelId(invalid)")
        }
    }
}

/// Outcome of a successful transmit call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submit {
    /// The channel took ownership of the payload.
    Accepted,
    /// The channel is momentarily full; the payload is handed back and the
    /// identical frame may be resubmitted later.
    Retry(Bytes),
}

/// The channel layer underneath the multiplexer.
///
/// Implementations are called concurrently from the administrative context
/// (`open` / `close`) and from the data plane (`transmit`).
pub trait ChannelTransport: Send + Sync {
    /// Bind a channel to `tag`.
    fn open(&self, tag: u16) -> Result<ChannelId>;

    /// Release the channel previously bound to `tag`.
    fn close(&self, tag: u16, channel: ChannelId) -> Result<()>;

    /// Queue an uplink payload on `channel`.
    fn transmit(&self, tag: u16, channel: ChannelId, payload: Bytes) -> Result<Submit>;
}

impl<T: ChannelTransport + ?Sized> ChannelTransport for Arc<T> {
    fn open(&self, tag: u16) -> Result<ChannelId> {
        <T as ChannelTransport>::open(&**self, tag)
    }

    fn close(&self, tag: u16, channel: ChannelId) -> Result<()> {
        <T as ChannelTransport>::close(&**self, tag, channel)
    }

    fn transmit(&self, tag: u16, channel: ChannelId, payload: Bytes) -> Result<Submit> {
        <T as ChannelTransport>::transmit(&**self, tag, channel, payload)
    }
}

impl<T: ChannelTransport + ?Sized> ChannelTransport for &T {
    fn open(&self, tag: u16) -> Result<ChannelId> {
        <T as ChannelTransport>::open(&**self, tag)
    }

    fn close(&self, tag: u16, channel: ChannelId) -> Result<()> {
        <T as ChannelTransport>::close(&**self, tag, channel)
    }

    fn transmit(&self, tag: u16, channel: ChannelId, payload: Bytes) -> Result<Submit> {
        <T as ChannelTransport>::transmit(&**self, tag, channel, payload)
    }
}
