use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwap;
use wwanmux_channel::{ChannelError, ChannelId, ChannelTransport};
use wwanmux_frame::is_session_tag;

use crate::error::{MuxError, Result};
use crate::session::{FlowTransition, Session, SessionSnapshot};
use crate::stats::LinkStats;

/// One immutable generation of the session table, in insertion order.
#[derive(Debug, Default)]
struct SessionTable {
    sessions: Vec<Arc<Session>>,
}

impl SessionTable {
    fn find(&self, tag: u16) -> Option<(usize, &Arc<Session>)> {
        self.sessions
            .iter()
            .enumerate()
            .find(|(_, session)| session.tag() == tag)
    }
}

/// A session found by [`SessionRegistry::lookup`].
#[derive(Debug, Clone)]
pub struct SessionEntry {
    /// Position in the table generation the lookup observed.
    pub index: usize,
    pub session: Arc<Session>,
}

/// Tag-keyed table of live sessions.
///
/// Structural changes (`add`, `remove`) are serialized by an administrative
/// lock and publish a fresh table generation. Lookups and counter updates
/// never take that lock: they read whichever generation is current, which
/// is always a complete pre- or post-mutation table.
pub struct SessionRegistry {
    table: ArcSwap<SessionTable>,
    admin: Mutex<()>,
    capacity: usize,
    root_stats: LinkStats,
}

impl SessionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            table: ArcSwap::from_pointee(SessionTable::default()),
            admin: Mutex::new(()),
            capacity,
            root_stats: LinkStats::default(),
        }
    }

    /// Bind `tag` to a freshly opened channel.
    pub fn add<T>(&self, transport: &T, tag: u16) -> Result<ChannelId>
    where
        T: ChannelTransport + ?Sized,
    {
        if !is_session_tag(tag) {
            return Err(MuxError::InvalidTag(tag));
        }

        let _admin = self.lock_admin();
        let current = self.table.load_full();
        if current.find(tag).is_some() {
            return Err(MuxError::SessionExists(tag));
        }
        if current.sessions.len() >= self.capacity {
            return Err(MuxError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        let channel = transport
            .open(tag)
            .map_err(|source| MuxError::ChannelOpenFailed { tag, source })?;
        if !channel.is_valid() {
            return Err(MuxError::ChannelOpenFailed {
                tag,
                source: ChannelError::Refused {
                    tag,
                    reason: format!("transport returned channel id {}", channel.raw()),
                },
            });
        }

        let mut sessions = Vec::with_capacity(current.sessions.len() + 1);
        sessions.extend(current.sessions.iter().cloned());
        sessions.push(Arc::new(Session::new(tag, channel)));
        self.table.store(Arc::new(SessionTable { sessions }));

        tracing::info!(tag, %channel, "session added");
        Ok(channel)
    }

    /// Close the channel bound to `tag` and drop the session, keeping the
    /// relative order of the remaining sessions.
    ///
    /// A session whose channel refuses to close stays in the table.
    pub fn remove<T>(&self, transport: &T, tag: u16) -> Result<()>
    where
        T: ChannelTransport + ?Sized,
    {
        let _admin = self.lock_admin();
        let current = self.table.load_full();
        let (index, session) = current.find(tag).ok_or(MuxError::UnknownSession(tag))?;

        let channel = session.channel();
        if !channel.is_valid() {
            return Err(MuxError::InvalidChannel { tag });
        }

        transport
            .close(tag, channel)
            .map_err(|source| MuxError::ChannelCloseFailed {
                tag,
                channel,
                source,
            })?;
        session.unbind();

        let sessions = current
            .sessions
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, session)| Arc::clone(session))
            .collect();
        self.table.store(Arc::new(SessionTable { sessions }));

        tracing::info!(tag, %channel, "session removed");
        Ok(())
    }

    /// Remove every session, returning how many were closed. Failures are
    /// logged and the affected sessions stay in the table.
    pub fn remove_all<T>(&self, transport: &T) -> usize
    where
        T: ChannelTransport + ?Sized,
    {
        let tags: Vec<u16> = self.table.load().sessions.iter().map(|s| s.tag()).collect();
        let mut removed = 0;
        for tag in tags {
            match self.remove(transport, tag) {
                Ok(()) => removed += 1,
                Err(err) => tracing::warn!(tag, error = %err, "failed to remove session"),
            }
        }
        removed
    }

    /// Find the live session for `tag`.
    pub fn lookup(&self, tag: u16) -> Option<SessionEntry> {
        let table = self.table.load();
        table.find(tag).map(|(index, session)| SessionEntry {
            index,
            session: Arc::clone(session),
        })
    }

    /// Count one packet of `bytes` for the session and the root device.
    pub fn mutate_counters(&self, tag: u16, bytes: u64, is_tx: bool) -> Result<()> {
        let entry = self.lookup(tag).ok_or(MuxError::UnknownSession(tag))?;
        entry.session.stats().record(bytes, is_tx);
        self.root_stats.record(bytes, is_tx);
        Ok(())
    }

    pub(crate) fn set_flow_control(&self, tag: u16, engage: bool) -> Result<FlowTransition> {
        let entry = self.lookup(tag).ok_or(MuxError::UnknownSession(tag))?;
        match entry.session.set_flow_control(engage) {
            FlowTransition::Unbound => Err(MuxError::UnknownSession(tag)),
            transition => Ok(transition),
        }
    }

    pub fn is_flow_controlled(&self, tag: u16) -> bool {
        self.lookup(tag)
            .is_some_and(|entry| entry.session.is_flow_controlled())
    }

    /// Live sessions in table order.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.table.load().sessions.clone()
    }

    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        self.table
            .load()
            .sessions
            .iter()
            .map(|session| session.snapshot())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.table.load().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Counters of the root device.
    pub fn root_stats(&self) -> &LinkStats {
        &self.root_stats
    }

    fn lock_admin(&self) -> MutexGuard<'_, ()> {
        self.admin
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
