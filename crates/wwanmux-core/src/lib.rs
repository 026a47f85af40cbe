//! VLAN session multiplexer for a modem data interface.
//!
//! One root Ethernet device carries many sessions, each a VLAN sub-interface
//! bound to one channel of the modem. [`RootDevice`] owns the session
//! registry and runs the transmit path (host frame to channel), the receive
//! path (channel payload to host frame) and per-session flow control.

pub mod config;
pub mod device;
pub mod error;
pub mod flow;
pub mod host;
pub mod receive;
pub mod registry;
pub mod session;
pub mod stats;
pub mod transmit;

pub use config::MuxConfig;
pub use device::{DeviceStats, RootDevice};
pub use error::{MuxError, Result};
pub use flow::FlowHandle;
pub use host::{CollectingHost, Delivery, DeviceInfo, HostError, HostStack};
pub use registry::{SessionEntry, SessionRegistry};
pub use session::{FlowTransition, Session, SessionSnapshot, SessionState};
pub use stats::{LinkStats, StatsSnapshot};
pub use transmit::{select_queue, TxStatus, INVALID_QUEUE};
