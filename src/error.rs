//! Error types for the codec, the outbound write paths and storage.
//!
//! Decode errors are local to one notification: callers drop the offending
//! buffer and keep processing the stream.  Write-path errors are surfaced
//! as-is; nothing in this crate retries a write.

use uuid::Uuid;

/// Failure to encode or decode a single wire record.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("{record} record must be {expected} bytes, got {actual}")]
    Length {
        record: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("{field} = {value} does not fit its fixed-point wire field")]
    OutOfRange { field: &'static str, value: f64 },
    #[error("unknown exit condition code 0x{0:02x}")]
    UnknownExitKind(u8),
    #[error("unknown command code 0x{0:02x}")]
    UnknownCommand(u8),
    #[error("unsupported profile header version {0}")]
    UnsupportedVersion(u8),
}

/// Errors reported by a [`crate::transport::Transport`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("no active BLE link")]
    NotConnected,
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),
    #[error("write to {characteristic} rejected: {reason}")]
    Write { characteristic: Uuid, reason: String },
    #[error("subscribe to {characteristic} failed: {reason}")]
    Subscribe { characteristic: Uuid, reason: String },
    #[error("write timed out")]
    Timeout,
}

/// Errors from [`crate::dispatcher::CommandDispatcher`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("cannot send command: no active BLE link")]
    NotConnected,
    #[error("command write failed: {0}")]
    Transport(#[source] TransportError),
    /// The last profile upload broke part-way; extraction stays blocked until
    /// a full upload succeeds.
    #[error("refusing to start: last profile upload was incomplete")]
    ProfileIncomplete,
}

impl From<TransportError> for CommandError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::NotConnected => Self::NotConnected,
            other => Self::Transport(other),
        }
    }
}

/// Errors from [`crate::upload::ProfileUploader`].
///
/// After any of these the machine's profile slots are in an unknown state;
/// the whole sequence must be re-sent from the header before an extraction
/// may be started.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UploadError {
    #[error("cannot upload profile: no active BLE link")]
    NotConnected,
    #[error("profile has {0} steps, expected 1..={max}", max = crate::protocol::MAX_FRAMES)]
    StepCount(usize),
    #[error("profile could not be encoded: {0}")]
    Encode(#[from] CodecError),
    /// The write sequence broke part-way through.
    ///
    /// `last_successful` is the 0-based index of the last frame the machine
    /// acknowledged (`None` if no frame was acknowledged); the header is not
    /// counted.
    #[error(
        "profile upload aborted (header written: {header_written}, last frame: {last_successful:?}): {source}"
    )]
    PartialUpload {
        last_successful: Option<usize>,
        header_written: bool,
        #[source]
        source: TransportError,
    },
}

/// Errors from a [`crate::storage::Storage`] backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("recording rejected: {0}")]
    Rejected(String),
}
