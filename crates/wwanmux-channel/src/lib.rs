//! Channel transport abstraction.
//!
//! The remote processor is reached through a small set of numbered channels.
//! This is the lowest layer of wwanmux: the multiplexer only ever talks to a
//! [`ChannelTransport`], which opens and closes channels on behalf of a VLAN
//! tag and moves opaque payloads onto them.
//!
//! [`LoopbackTransport`] is an in-memory implementation used by tests and the
//! CLI simulator.

pub mod config;
pub mod error;
pub mod loopback;
pub mod traits;

pub use config::{
    channel_config, config_for_tag, ChannelConfig, ChannelRole, MODEM_CHANNELS, RESERVED_CHANNELS,
};
pub use error::{ChannelError, Result};
pub use loopback::{BackpressureHook, LoopbackConfig, LoopbackTransport};
pub use traits::{ChannelId, ChannelTransport, Submit};
