/// Errors that can occur while manipulating link-layer frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame is shorter than the header being removed or rewritten.
    #[error("frame too short for link header ({len} bytes, need {need})")]
    HeaderTooShort { len: usize, need: usize },

    /// A buffer for a realigned or reassembled frame could not be allocated.
    #[error("failed to allocate {size} byte frame buffer")]
    OutOfMemory { size: usize },

    /// The MAC address string could not be parsed.
    #[error("invalid MAC address '{0}'")]
    InvalidMac(String),
}

pub type Result<T> = std::result::Result<T, FrameError>;
