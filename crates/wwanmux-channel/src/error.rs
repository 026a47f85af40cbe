use crate::traits::ChannelId;

/// Errors reported by a channel transport.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// No free channel is left to bind the tag to.
    #[error("no free channel for tag {tag}")]
    Exhausted { tag: u16 },

    /// The remote side or the transport refused the request.
    #[error("channel request refused for tag {tag}: {reason}")]
    Refused { tag: u16, reason: String },

    /// The channel is not open (never opened, or already closed).
    #[error("channel {0} is not open")]
    NotOpen(ChannelId),

    /// The channel was opened for a different tag.
    #[error("channel {channel} is bound to tag {bound}, not {tag}")]
    TagMismatch {
        channel: ChannelId,
        tag: u16,
        bound: u16,
    },

    /// Hard transfer failure.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
