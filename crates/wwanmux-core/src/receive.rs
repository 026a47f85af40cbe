use bytes::BytesMut;
use wwanmux_channel::ChannelTransport;
use wwanmux_frame::{
    session_to_tag, tag_class, write_ethernet_header, LinkFrame, PayloadClass, TagClass, ETH_HLEN,
};

use crate::device::RootDevice;
use crate::error::{MuxError, Result};
use crate::host::{Delivery, HostStack};

impl<T: ChannelTransport, H: HostStack> RootDevice<T, H> {
    /// Deliver a downlink payload from session `session_id` to the host.
    ///
    /// `payload` starts with room for an Ethernet header, which is filled in
    /// here. Control payloads are always announced as 802.3 frames; other
    /// payloads get the ethertype their first nibble suggests.
    pub fn receive(&self, session_id: u32, mut payload: BytesMut, is_control: bool) -> Result<()> {
        let len = payload.len();
        if len < ETH_HLEN {
            tracing::debug!(session_id, len, "drop: downlink shorter than link header");
            return Err(MuxError::MalformedFrame { len });
        }
        let tag = session_to_tag(session_id)
            .filter(|&tag| tag_class(tag) != TagClass::Invalid)
            .ok_or(MuxError::InvalidSessionId(session_id))?;

        let class = if is_control {
            PayloadClass::Other
        } else {
            let sniffed = PayloadClass::sniff(&payload[ETH_HLEN..]);
            if sniffed == PayloadClass::Other {
                tracing::debug!(tag, len, "unclassified downlink payload");
            }
            sniffed
        };

        let mac = self.mac_address();
        write_ethernet_header(
            &mut payload,
            mac,
            mac.with_low_bit_flipped(),
            class.ethertype(),
        )
        .map_err(MuxError::HeaderError)?;

        let rx_bytes = (len - ETH_HLEN) as u64;
        if let Err(err) = self.registry.mutate_counters(tag, rx_bytes, false) {
            tracing::warn!(tag, error = %err, "downlink for unbound session");
        }

        match self.host.deliver(LinkFrame::new(Some(tag), payload.freeze())) {
            Delivery::Accepted => tracing::trace!(tag, len, "delivered"),
            Delivery::Dropped => tracing::debug!(tag, len, "host dropped downlink frame"),
        }
        Ok(())
    }
}
