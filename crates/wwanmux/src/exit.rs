use std::fmt;
use std::io;

use wwanmux_core::MuxError;

// Exit codes shared by every subcommand.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => USAGE,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::InvalidData => DATA_INVALID,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn exit_code(err: &MuxError) -> i32 {
    match err {
        MuxError::InvalidTag(_)
        | MuxError::InvalidSessionId(_)
        | MuxError::InvalidConfig(_)
        | MuxError::InvalidAddress(_)
        | MuxError::OutOfRange { .. } => USAGE,
        MuxError::ProtocolMismatch { .. }
        | MuxError::HeaderError(_)
        | MuxError::MalformedFrame { .. } => DATA_INVALID,
        MuxError::ChannelOpenFailed { .. }
        | MuxError::ChannelCloseFailed { .. }
        | MuxError::Io { .. } => TRANSPORT_ERROR,
        MuxError::UnknownSession(_)
        | MuxError::SessionExists(_)
        | MuxError::CapacityExceeded { .. }
        | MuxError::InvalidChannel { .. }
        | MuxError::DeviceBusy(_) => FAILURE,
        MuxError::OutOfMemory(_) | MuxError::HostRejected(_) => INTERNAL,
    }
}

pub fn mux_error(context: &str, err: MuxError) -> CliError {
    CliError::new(exit_code(&err), format!("{context}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mux_errors_map_to_exit_codes() {
        assert_eq!(exit_code(&MuxError::InvalidTag(256)), USAGE);
        assert_eq!(exit_code(&MuxError::MalformedFrame { len: 3 }), DATA_INVALID);
        assert_eq!(
            exit_code(&MuxError::Io {
                tag: 1,
                reason: "gone".to_string()
            }),
            TRANSPORT_ERROR
        );
        assert_eq!(exit_code(&MuxError::CapacityExceeded { capacity: 9 }), FAILURE);
    }

    #[test]
    fn missing_file_is_usage() {
        let err = io_error("read", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(err.code, USAGE);
        assert!(err.message.starts_with("read: "));
    }
}
