//! VLAN session multiplexing for modem WWAN interfaces.
//!
//! wwanmux maps the VLAN sub-interfaces of one root network device onto the
//! numbered channels of a modem, classifies every frame as IP data or control
//! traffic by its tag, and feeds per-session backpressure back to the host.
//!
//! # Crate Structure
//!
//! - [`channel`] - Channel transport seam and the modem channel table
//! - [`frame`] - VLAN tag ranges, Ethernet framing and payload classification
//! - [`mux`] - Session registry, transmit / receive paths and the root device

/// Re-export channel types.
pub mod channel {
    pub use wwanmux_channel::*;
}

/// Re-export frame types.
pub mod frame {
    pub use wwanmux_frame::*;
}

/// Re-export multiplexer types.
pub mod mux {
    pub use wwanmux_core::*;
}
