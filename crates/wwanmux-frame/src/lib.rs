//! Link-layer framing for the wwanmux session multiplexer.
//!
//! Every session is a VLAN sub-interface of one root Ethernet device. This
//! crate knows how to:
//! - classify VLAN tags into root / IP-data / control ranges
//! - read a frame's tag (out of band or in-band 802.1Q)
//! - strip and re-attach the Ethernet header without copying the payload
//! - sniff the payload class from its first nibble
//! - realign control payloads to the 4-byte boundary channels require

pub mod error;
pub mod ether;
pub mod link;
pub mod tag;

pub use error::{FrameError, Result};
pub use ether::{
    MacAddr, ETH_ALEN, ETH_HLEN, ETH_P_802_3, ETH_P_8021Q, ETH_P_IP, ETH_P_IPV6, VLAN_ETH_HLEN,
};
pub use link::{
    align_payload, is_aligned, write_ethernet_header, LinkFrame, PayloadClass, StrippedFrame,
    MAX_MTU, MIN_MTU, TX_ALIGN,
};
pub use tag::{
    is_session_tag, session_to_tag, tag_class, tag_class_name, tag_to_session, TagClass,
    CONTROL_TAG_END, CONTROL_TAG_START, DATA_TAG_END, DATA_TAG_START, ROOT_TAG,
};
