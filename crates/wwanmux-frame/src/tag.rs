//! VLAN tag ranges.
//!
//! Tag 0 addresses the root device itself and never occupies a session slot.
//! Tags 1-255 carry IP data, tags 257-511 carry control (non-IP) streams and
//! tag 256 is unused.

/// VLAN tag of the root device.
pub const ROOT_TAG: u16 = 0;

/// First IP-data session tag.
pub const DATA_TAG_START: u16 = 1;

/// Last IP-data session tag.
pub const DATA_TAG_END: u16 = 255;

/// First control session tag.
pub const CONTROL_TAG_START: u16 = 257;

/// Last control session tag.
pub const CONTROL_TAG_END: u16 = 511;

/// Offset between a wire-level session id and its VLAN tag.
pub const SESSION_TAG_OFFSET: u16 = 1;

/// Payload class a tag is allowed to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TagClass {
    /// The root device (tag 0).
    Root,
    /// IP-data session (1-255).
    Data,
    /// Control / non-IP session (257-511).
    Control,
    /// Tag 256 or anything above 511.
    Invalid,
}

/// Classifies a tag.
pub fn tag_class(tag: u16) -> TagClass {
    match tag {
        ROOT_TAG => TagClass::Root,
        DATA_TAG_START..=DATA_TAG_END => TagClass::Data,
        CONTROL_TAG_START..=CONTROL_TAG_END => TagClass::Control,
        _ => TagClass::Invalid,
    }
}

/// Returns true if the tag may own a session slot.
pub fn is_session_tag(tag: u16) -> bool {
    matches!(tag_class(tag), TagClass::Data | TagClass::Control)
}

/// Returns a human-readable name for a tag's class.
pub fn tag_class_name(tag: u16) -> &'static str {
    match tag_class(tag) {
        TagClass::Root => "ROOT",
        TagClass::Data => "DATA",
        TagClass::Control => "CONTROL",
        TagClass::Invalid => "INVALID",
    }
}

/// VLAN tag for a wire-level session id.
///
/// Returns `None` when the id does not map into the 12-bit tag space.
pub fn session_to_tag(session_id: u32) -> Option<u16> {
    let tag = session_id.checked_add(u32::from(SESSION_TAG_OFFSET))?;
    u16::try_from(tag).ok().filter(|tag| *tag <= CONTROL_TAG_END)
}

/// Wire-level session id for a VLAN tag. The root tag has no session id.
pub fn tag_to_session(tag: u16) -> Option<u32> {
    tag.checked_sub(SESSION_TAG_OFFSET).map(u32::from)
}
