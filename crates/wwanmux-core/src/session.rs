use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};

use serde::Serialize;
use wwanmux_channel::ChannelId;
use wwanmux_frame::{tag_class, TagClass};

use crate::stats::{LinkStats, StatsSnapshot};

/// Lifecycle state of a session.
///
/// `Unbound -> Runnable` on add, `Runnable <-> FlowControlled` on flow
/// control, any bound state `-> Unbound` on remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SessionState {
    Unbound = 0,
    Runnable = 1,
    FlowControlled = 2,
}

impl SessionState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Runnable,
            2 => Self::FlowControlled,
            _ => Self::Unbound,
        }
    }
}

/// Result of a flow-control request on a single session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowTransition {
    Changed,
    Unchanged,
    Unbound,
}

/// One VLAN sub-interface bound to a modem channel.
///
/// Sessions are shared between table generations, so state and counters
/// survive compaction of the session table.
#[derive(Debug)]
pub struct Session {
    tag: u16,
    channel: AtomicI32,
    state: AtomicU8,
    stats: LinkStats,
}

impl Session {
    pub(crate) fn new(tag: u16, channel: ChannelId) -> Self {
        Self {
            tag,
            channel: AtomicI32::new(channel.raw()),
            state: AtomicU8::new(SessionState::Runnable as u8),
            stats: LinkStats::default(),
        }
    }

    pub fn tag(&self) -> u16 {
        self.tag
    }

    pub fn class(&self) -> TagClass {
        tag_class(self.tag)
    }

    pub fn channel(&self) -> ChannelId {
        ChannelId::new(self.channel.load(Ordering::Acquire))
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub fn is_flow_controlled(&self) -> bool {
        self.state() == SessionState::FlowControlled
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Engage or release flow control. Unbound sessions are left alone.
    pub(crate) fn set_flow_control(&self, engage: bool) -> FlowTransition {
        let (from, to) = if engage {
            (SessionState::Runnable, SessionState::FlowControlled)
        } else {
            (SessionState::FlowControlled, SessionState::Runnable)
        };

        match self.state.compare_exchange(
            from as u8,
            to as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => FlowTransition::Changed,
            Err(current) if SessionState::from_raw(current) == SessionState::Unbound => {
                FlowTransition::Unbound
            }
            Err(_) => FlowTransition::Unchanged,
        }
    }

    /// Detach from the channel. Readers holding an older table generation
    /// see an invalid channel id from here on.
    pub(crate) fn unbind(&self) {
        self.channel
            .store(ChannelId::INVALID.raw(), Ordering::Release);
        self.state
            .store(SessionState::Unbound as u8, Ordering::Release);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            tag: self.tag,
            class: self.class(),
            channel: self.channel(),
            state: self.state(),
            stats: self.stats.snapshot(),
        }
    }
}

/// Serializable view of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub tag: u16,
    pub class: TagClass,
    pub channel: ChannelId,
    pub state: SessionState,
    #[serde(flatten)]
    pub stats: StatsSnapshot,
}
