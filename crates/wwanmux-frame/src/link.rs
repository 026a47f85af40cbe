use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::ether::{
    MacAddr, ETHERTYPE_OFFSET, ETH_ALEN, ETH_HLEN, ETH_P_802_3, ETH_P_8021Q, ETH_P_IP, ETH_P_IPV6,
    VLAN_ETH_HLEN, VLAN_VID_MASK,
};

/// Required alignment in bytes of control payloads handed to a channel.
pub const TX_ALIGN: usize = 4;

/// Smallest MTU accepted by the root device.
pub const MIN_MTU: usize = 68;

/// Largest MTU accepted by the root device (1 MiB).
pub const MAX_MTU: usize = 1024 * 1024;

/// A link-layer packet crossing the host stack boundary.
///
/// The VLAN tag is either carried out of band (`vlan_tag`, as a NIC with tag
/// offload would deliver it) or in band as an 802.1Q header inside `data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkFrame {
    /// Out-of-band VLAN tag.
    pub vlan_tag: Option<u16>,
    /// Frame bytes starting at the Ethernet destination address.
    pub data: Bytes,
}

impl LinkFrame {
    /// Wrap raw frame bytes.
    pub fn new(vlan_tag: Option<u16>, data: impl Into<Bytes>) -> Self {
        Self {
            vlan_tag,
            data: data.into(),
        }
    }

    /// Build an Ethernet frame whose VLAN tag travels out of band.
    pub fn ethernet(tag: u16, dst: MacAddr, src: MacAddr, ethertype: u16, payload: &[u8]) -> Self {
        let mut buf = BytesMut::with_capacity(ETH_HLEN + payload.len());
        buf.put_slice(&dst.0);
        buf.put_slice(&src.0);
        buf.put_u16(ethertype);
        buf.put_slice(payload);
        Self::new(Some(tag), buf.freeze())
    }

    /// Build an Ethernet frame carrying an in-band 802.1Q header.
    pub fn vlan_in_band(
        tag: u16,
        dst: MacAddr,
        src: MacAddr,
        ethertype: u16,
        payload: &[u8],
    ) -> Self {
        let mut buf = BytesMut::with_capacity(VLAN_ETH_HLEN + payload.len());
        buf.put_slice(&dst.0);
        buf.put_slice(&src.0);
        buf.put_u16(ETH_P_8021Q);
        buf.put_u16(tag & VLAN_VID_MASK);
        buf.put_u16(ethertype);
        buf.put_slice(payload);
        Self::new(None, buf.freeze())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Outer ethertype, if the frame is long enough to carry one.
    pub fn ethertype(&self) -> Option<u16> {
        read_u16(&self.data, ETHERTYPE_OFFSET)
    }

    /// Ethertype of the payload behind any in-band 802.1Q header.
    pub fn inner_ethertype(&self) -> Option<u16> {
        if self.has_in_band_vlan() {
            read_u16(&self.data, VLAN_ETH_HLEN - 2)
        } else {
            self.ethertype()
        }
    }

    pub fn has_in_band_vlan(&self) -> bool {
        self.ethertype() == Some(ETH_P_8021Q)
    }

    /// VLAN tag of the frame: the out-of-band tag if present, else the
    /// in-band 802.1Q VLAN id. `None` for an untagged frame.
    pub fn tag(&self) -> Option<u16> {
        if let Some(tag) = self.vlan_tag {
            return Some(tag);
        }
        if self.has_in_band_vlan() {
            return read_u16(&self.data, ETH_HLEN).map(|tci| tci & VLAN_VID_MASK);
        }
        None
    }

    /// Length of the link header `strip_header` removes.
    pub fn header_len(&self) -> usize {
        if self.has_in_band_vlan() {
            VLAN_ETH_HLEN
        } else {
            ETH_HLEN
        }
    }

    /// Split the link header off the payload (zero-copy).
    pub fn strip_header(self) -> Result<StrippedFrame> {
        let need = self.header_len();
        if self.data.len() < need {
            return Err(FrameError::HeaderTooShort {
                len: self.data.len(),
                need,
            });
        }

        let mut payload = self.data;
        let header = payload.split_to(need);
        Ok(StrippedFrame {
            vlan_tag: self.vlan_tag,
            header,
            payload,
        })
    }

    /// Put a stripped header back in front of `payload`, copying both into a
    /// freshly allocated buffer.
    pub fn reassemble(vlan_tag: Option<u16>, header: &[u8], payload: &[u8]) -> Result<Self> {
        let size = header.len() + payload.len();
        let mut buf = try_alloc(size)?;
        buf.extend_from_slice(header);
        buf.extend_from_slice(payload);
        Ok(Self::new(vlan_tag, Bytes::from(buf)))
    }
}

/// A frame with its link header split off.
#[derive(Debug, Clone)]
pub struct StrippedFrame {
    pub vlan_tag: Option<u16>,
    pub header: Bytes,
    pub payload: Bytes,
}

impl StrippedFrame {
    /// Payload class sniffed from the first payload nibble.
    pub fn payload_class(&self) -> PayloadClass {
        PayloadClass::sniff(&self.payload)
    }

    /// Split into `(vlan_tag, header, payload)`.
    pub fn into_parts(self) -> (Option<u16>, Bytes, Bytes) {
        (self.vlan_tag, self.header, self.payload)
    }
}

/// What a payload looks like from its first nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadClass {
    Ipv4,
    Ipv6,
    /// Empty payload or a first nibble other than 4 / 6.
    Other,
}

impl PayloadClass {
    pub fn sniff(payload: &[u8]) -> Self {
        match payload.first().map(|b| b >> 4) {
            Some(0x4) => Self::Ipv4,
            Some(0x6) => Self::Ipv6,
            _ => Self::Other,
        }
    }

    pub fn is_ip(self) -> bool {
        matches!(self, Self::Ipv4 | Self::Ipv6)
    }

    /// Ethertype announced for this class on the host side.
    pub fn ethertype(self) -> u16 {
        match self {
            Self::Ipv4 => ETH_P_IP,
            Self::Ipv6 => ETH_P_IPV6,
            Self::Other => ETH_P_802_3,
        }
    }
}

/// Overwrite the addressing and ethertype of an Ethernet header in place.
pub fn write_ethernet_header(
    buf: &mut [u8],
    dst: MacAddr,
    src: MacAddr,
    ethertype: u16,
) -> Result<()> {
    if buf.len() < ETH_HLEN {
        return Err(FrameError::HeaderTooShort {
            len: buf.len(),
            need: ETH_HLEN,
        });
    }
    buf[..ETH_ALEN].copy_from_slice(&dst.0);
    buf[ETH_ALEN..2 * ETH_ALEN].copy_from_slice(&src.0);
    buf[ETHERTYPE_OFFSET..ETH_HLEN].copy_from_slice(&ethertype.to_be_bytes());
    Ok(())
}

/// True if the buffer starts on a `TX_ALIGN` boundary.
pub fn is_aligned(buf: &[u8]) -> bool {
    (buf.as_ptr() as usize) % TX_ALIGN == 0
}

/// Return `payload` unchanged when aligned, else a `TX_ALIGN`-aligned copy.
pub fn align_payload(payload: Bytes) -> Result<Bytes> {
    if is_aligned(&payload) {
        return Ok(payload);
    }

    let mut buf = try_alloc(payload.len() + TX_ALIGN - 1)?;
    let pad = buf.as_ptr().align_offset(TX_ALIGN);
    buf.resize(pad, 0);
    buf.extend_from_slice(&payload);

    let mut aligned = Bytes::from(buf);
    aligned.advance(pad);
    tracing::trace!(len = aligned.len(), pad, "realigned control payload");
    Ok(aligned)
}

fn try_alloc(size: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size)
        .map_err(|_| FrameError::OutOfMemory { size })?;
    Ok(buf)
}

fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DST: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x01]);
    const SRC: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x02]);

    #[test]
    fn out_of_band_tag_wins() {
        let frame = LinkFrame::ethernet(5, DST, SRC, ETH_P_IP, &[0x45, 0, 0, 20]);
        assert_eq!(frame.tag(), Some(5));
        assert_eq!(frame.header_len(), ETH_HLEN);
        assert_eq!(frame.ethertype(), Some(ETH_P_IP));
    }

    #[test]
    fn in_band_tag_is_read_from_tci() {
        let frame = LinkFrame::vlan_in_band(300, DST, SRC, ETH_P_802_3, b"AT\r\n");
        assert!(frame.has_in_band_vlan());
        assert_eq!(frame.tag(), Some(300));
        assert_eq!(frame.header_len(), VLAN_ETH_HLEN);
        assert_eq!(frame.inner_ethertype(), Some(ETH_P_802_3));
    }

    #[test]
    fn untagged_frame_has_no_tag() {
        let frame = LinkFrame::new(None, vec![0u8; 20]);
        assert_eq!(frame.tag(), None);
    }

    #[test]
    fn strip_plain_header() {
        let frame = LinkFrame::ethernet(1, DST, SRC, ETH_P_IP, &[0x45, 1, 2, 3]);
        let stripped = frame.strip_header().unwrap();
        assert_eq!(stripped.header.len(), ETH_HLEN);
        assert_eq!(stripped.payload.as_ref(), &[0x45, 1, 2, 3]);
        assert_eq!(stripped.payload_class(), PayloadClass::Ipv4);
    }

    #[test]
    fn strip_in_band_header() {
        let frame = LinkFrame::vlan_in_band(9, DST, SRC, ETH_P_IPV6, &[0x60, 0, 0, 0]);
        let stripped = frame.strip_header().unwrap();
        assert_eq!(stripped.header.len(), VLAN_ETH_HLEN);
        assert_eq!(stripped.payload_class(), PayloadClass::Ipv6);
    }

    #[test]
    fn strip_rejects_short_frame() {
        let frame = LinkFrame::new(Some(3), vec![0u8; ETH_HLEN - 1]);
        let err = frame.strip_header().unwrap_err();
        assert!(matches!(
            err,
            FrameError::HeaderTooShort { len: 13, need: 14 }
        ));
    }

    #[test]
    fn strip_rejects_truncated_vlan_header() {
        let mut raw = vec![0u8; 16];
        raw[12..14].copy_from_slice(&ETH_P_8021Q.to_be_bytes());
        let frame = LinkFrame::new(None, raw);
        assert!(matches!(
            frame.strip_header(),
            Err(FrameError::HeaderTooShort { need: 18, .. })
        ));
    }

    #[test]
    fn header_only_frame_is_not_ip() {
        let frame = LinkFrame::ethernet(1, DST, SRC, ETH_P_IP, &[]);
        let stripped = frame.strip_header().unwrap();
        assert!(stripped.payload.is_empty());
        assert_eq!(stripped.payload_class(), PayloadClass::Other);
    }

    #[test]
    fn reattach_restores_original_bytes() {
        let frame = LinkFrame::vlan_in_band(260, DST, SRC, ETH_P_802_3, b"payload");
        let original = frame.clone();
        let (vlan_tag, header, payload) = frame.strip_header().unwrap().into_parts();
        let restored = LinkFrame::reassemble(vlan_tag, &header, &payload).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn sniff_classes() {
        assert_eq!(PayloadClass::sniff(&[0x45]), PayloadClass::Ipv4);
        assert_eq!(PayloadClass::sniff(&[0x60]), PayloadClass::Ipv6);
        assert_eq!(PayloadClass::sniff(&[0x7f]), PayloadClass::Other);
        assert_eq!(PayloadClass::sniff(&[]), PayloadClass::Other);
        assert_eq!(PayloadClass::Other.ethertype(), ETH_P_802_3);
        assert!(!PayloadClass::Other.is_ip());
    }

    #[test]
    fn align_copies_misaligned_payload() {
        let backing = Bytes::from(vec![0xAAu8; 64]);
        let offset = (0..TX_ALIGN)
            .find(|off| !is_aligned(&backing[*off..]))
            .unwrap();
        let misaligned = backing.slice(offset..offset + 10);
        assert!(!is_aligned(&misaligned));

        let aligned = align_payload(misaligned.clone()).unwrap();
        assert!(is_aligned(&aligned));
        assert_eq!(aligned, misaligned);
    }

    #[test]
    fn align_keeps_aligned_payload() {
        let backing = Bytes::from(vec![1u8; 32]);
        let offset = (0..TX_ALIGN).find(|off| is_aligned(&backing[*off..])).unwrap();
        let aligned = backing.slice(offset..offset + 8);
        let ptr = aligned.as_ptr();
        let out = align_payload(aligned).unwrap();
        assert_eq!(out.as_ptr(), ptr);
    }

    #[test]
    fn write_header_in_place() {
        let mut buf = vec![0u8; ETH_HLEN + 2];
        write_ethernet_header(&mut buf, DST, SRC, ETH_P_IPV6).unwrap();
        assert_eq!(&buf[..6], &DST.0);
        assert_eq!(&buf[6..12], &SRC.0);
        assert_eq!(&buf[12..14], &[0x86, 0xDD]);

        let mut short = [0u8; 4];
        assert!(write_ethernet_header(&mut short, DST, SRC, ETH_P_IP).is_err());
    }
}
