use wwanmux_channel::{ChannelTransport, Submit};
use wwanmux_frame::{align_payload, tag_class, LinkFrame, TagClass};

use crate::device::RootDevice;
use crate::error::{MuxError, Result};
use crate::host::HostStack;

/// Queue index returned for frames no transmit queue can carry.
pub const INVALID_QUEUE: u16 = 0xFFFF;

/// Outcome of a transmit call that did not fail.
#[derive(Debug, PartialEq, Eq)]
#[must_use]
pub enum TxStatus {
    /// The channel accepted the payload.
    Sent,
    /// The channel is full. The frame is handed back unchanged and may be
    /// resubmitted once the session's queue restarts.
    Busy(LinkFrame),
    /// Root-device traffic, silently dropped.
    Discarded,
}

/// Map a frame's VLAN tag to a host transmit queue.
///
/// IP sessions get their own queue (the tag itself); root and control
/// traffic share queue 0.
pub fn select_queue(tag: Option<u16>, max_sessions: usize) -> u16 {
    let Some(tag) = tag else {
        return 0;
    };
    match tag_class(tag) {
        TagClass::Root | TagClass::Control => 0,
        TagClass::Data if usize::from(tag) <= max_sessions => tag,
        _ => INVALID_QUEUE,
    }
}

impl<T: ChannelTransport, H: HostStack> RootDevice<T, H> {
    /// Transmit queue for `frame`.
    pub fn select_queue(&self, frame: &LinkFrame) -> u16 {
        select_queue(frame.tag(), self.max_sessions)
    }

    /// Hand a host frame to the channel bound to its VLAN tag.
    ///
    /// The frame is consumed on every path except `TxStatus::Busy`.
    pub fn transmit(&self, frame: LinkFrame) -> Result<TxStatus> {
        let tag = match frame.tag() {
            None | Some(0) => return Ok(TxStatus::Discarded),
            Some(tag) => tag,
        };

        let len = frame.len();
        let stripped = frame.strip_header().map_err(|err| {
            tracing::debug!(tag, len, "drop: frame shorter than link header");
            MuxError::HeaderError(err)
        })?;

        let session = self
            .registry
            .lookup(tag)
            .filter(|entry| entry.index < self.registry.capacity())
            .map(|entry| entry.session);
        let Some(session) = session else {
            tracing::debug!(tag, len, "drop: no session");
            return Err(MuxError::UnknownSession(tag));
        };
        let channel = session.channel();
        if !channel.is_valid() {
            tracing::debug!(tag, len, "drop: session has no channel");
            return Err(MuxError::UnknownSession(tag));
        }

        let class = tag_class(tag);
        let payload_class = stripped.payload_class();
        let allowed = match class {
            TagClass::Data => payload_class.is_ip(),
            TagClass::Control => !payload_class.is_ip(),
            TagClass::Root | TagClass::Invalid => false,
        };
        if !allowed {
            tracing::debug!(tag, len, ?payload_class, "drop: payload not allowed on tag");
            return Err(MuxError::ProtocolMismatch {
                tag,
                class,
                payload: payload_class,
            });
        }

        let (vlan_tag, header, payload) = stripped.into_parts();
        let payload = if class == TagClass::Control {
            align_payload(payload).map_err(|err| {
                tracing::debug!(tag, len, "drop: cannot realign control payload");
                MuxError::OutOfMemory(err)
            })?
        } else {
            payload
        };

        match self.transport.transmit(tag, channel, payload) {
            Ok(Submit::Accepted) => Ok(TxStatus::Sent),
            Ok(Submit::Retry(payload)) => {
                tracing::trace!(tag, %channel, "channel busy");
                LinkFrame::reassemble(vlan_tag, &header, &payload)
                    .map(TxStatus::Busy)
                    .map_err(|err| {
                        tracing::debug!(tag, len, "drop: cannot restore link header");
                        MuxError::Io {
                            tag,
                            reason: err.to_string(),
                        }
                    })
            }
            Err(err) => {
                tracing::warn!(tag, %channel, error = %err, "channel transmit failed");
                Err(MuxError::Io {
                    tag,
                    reason: err.to_string(),
                })
            }
        }
    }
}
