use wwanmux_channel::{ChannelError, ChannelId};
use wwanmux_frame::{FrameError, MacAddr, PayloadClass, TagClass};

/// Errors that can occur in multiplexer operations.
///
/// Transient backpressure is not an error: it is reported as
/// [`TxStatus::Busy`](crate::TxStatus::Busy).
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// Tag 0, tag 256 or a tag above 511 was used where a session is required.
    #[error("invalid VLAN tag {0}")]
    InvalidTag(u16),

    /// A wire-level session id that does not map to a VLAN tag.
    #[error("session id {0} does not map to a VLAN tag")]
    InvalidSessionId(u32),

    /// No live session for the tag.
    #[error("no session for VLAN tag {0}")]
    UnknownSession(u16),

    /// The tag already has a live session.
    #[error("session for VLAN tag {0} already exists")]
    SessionExists(u16),

    /// The session table has no free slot.
    #[error("session table full ({capacity} entries)")]
    CapacityExceeded { capacity: usize },

    /// The session's channel id is already invalid.
    #[error("session for VLAN tag {tag} has no valid channel")]
    InvalidChannel { tag: u16 },

    /// The channel transport refused to open a channel.
    #[error("cannot open channel for VLAN tag {tag}: {source}")]
    ChannelOpenFailed {
        tag: u16,
        #[source]
        source: ChannelError,
    },

    /// The channel transport refused to close a channel.
    #[error("cannot close channel {channel} of VLAN tag {tag}: {source}")]
    ChannelCloseFailed {
        tag: u16,
        channel: ChannelId,
        #[source]
        source: ChannelError,
    },

    /// Payload class is not allowed on the session's tag range.
    #[error("VLAN tag {tag} ({class:?}) cannot carry {payload:?} payload")]
    ProtocolMismatch {
        tag: u16,
        class: TagClass,
        payload: PayloadClass,
    },

    /// Outbound frame too short for its link header.
    #[error("link header error: {0}")]
    HeaderError(#[source] FrameError),

    /// Inbound payload has no room for a link header.
    #[error("malformed inbound frame ({len} bytes)")]
    MalformedFrame { len: usize },

    /// A realigned control buffer could not be allocated.
    #[error("out of memory: {0}")]
    OutOfMemory(#[source] FrameError),

    /// Hard transmit failure.
    #[error("transmit failed on VLAN tag {tag}: {reason}")]
    Io { tag: u16, reason: String },

    /// MTU outside the supported range.
    #[error("MTU {mtu} out of range {min}..={max}")]
    OutOfRange { mtu: usize, min: usize, max: usize },

    /// Hardware address not usable for the root device.
    #[error("invalid hardware address {0}")]
    InvalidAddress(MacAddr),

    /// The hardware address cannot change while the device is up.
    #[error("device {0} is up")]
    DeviceBusy(String),

    /// Root device configuration rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The host network stack refused to attach the root device.
    #[error("host stack rejected device: {0}")]
    HostRejected(String),
}

impl MuxError {
    /// True for administrative (session-table) errors, which are returned to
    /// the caller and never retried.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            MuxError::InvalidTag(_)
                | MuxError::UnknownSession(_)
                | MuxError::SessionExists(_)
                | MuxError::CapacityExceeded { .. }
                | MuxError::InvalidChannel { .. }
                | MuxError::ChannelOpenFailed { .. }
                | MuxError::ChannelCloseFailed { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MuxError>;
