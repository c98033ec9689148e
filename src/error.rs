//! Error and result types shared by every part of the crate.
//!
//! Every failing operation returns an [`Error`] that carries its own description, so
//! callers never need a separate "last error" query to find out what went wrong.

use derive_more::{Display, Error, From};
use embedded_io_async::ErrorKind;

use crate::protocol::{Command, Status};

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

// ============================================================================
// Error - what callers see
// ============================================================================

/// Errors returned by a MegaLeaf [`Session`](crate::session::Session) and its link.
///
/// The `Display` output is the human-readable description of the failure.
#[derive(Clone, Copy, Debug, Display, Eq, Error, From, PartialEq)]
pub enum Error {
    /// The device could not be opened or did not pass the handshake.
    #[display("failed to open MegaLeaf controller: {reason}")]
    #[from]
    OpenFailed {
        /// Why opening failed.
        reason: OpenFailure,
    },

    /// Another session already holds the device.
    #[display("MegaLeaf controller is already open in another session")]
    AlreadyOpen,

    /// An argument was rejected before any wire traffic.
    #[display("invalid argument: {reason}")]
    InvalidArgument {
        /// Which constraint was violated.
        reason: &'static str,
    },

    /// A mutating command was rejected by the device or the link failed.
    #[display("{command} failed: {cause}")]
    CommandFailed {
        /// The command that failed.
        command: Command,
        /// What went wrong.
        cause: Failure,
    },

    /// A query was rejected by the device or the link failed.
    #[display("{command} failed: {cause}")]
    QueryFailed {
        /// The query that failed.
        command: Command,
        /// What went wrong.
        cause: Failure,
    },

    /// The round trip did not complete within its bound.
    #[display("{command} timed out after {timeout_ms} ms")]
    Timeout {
        /// The command whose round trip timed out.
        command: Command,
        /// The bound that was exceeded.
        timeout_ms: u64,
    },

    /// The session was closed before this call.
    #[display("session is closed")]
    SessionClosed,
}

impl Error {
    /// Shorthand for [`Error::InvalidArgument`].
    #[must_use]
    pub(crate) const fn invalid(reason: &'static str) -> Self {
        Self::InvalidArgument { reason }
    }
}

// ============================================================================
// Failure - the cause behind a failed round trip
// ============================================================================

/// The cause of a failed round trip.
#[derive(Clone, Copy, Debug, Display, Eq, From, PartialEq)]
pub enum Failure {
    /// The controller answered with a non-zero status.
    #[display("controller reported {_0}")]
    Device(Status),
    /// Reading from or writing to the link failed.
    #[display("link error ({_0:?})")]
    Link(ErrorKind),
    /// The controller's answer did not follow the protocol.
    #[display("{_0}")]
    Protocol(ProtocolError),
}

/// Ways a received frame can violate the MegaLeaf protocol.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum ProtocolError {
    /// The header magic did not match the expected direction.
    #[display("invalid header magic {found:#010x}")]
    BadHeaderMagic {
        /// Magic actually received.
        found: u32,
    },
    /// The footer magic was wrong.
    #[display("invalid footer magic {found:#010x}")]
    BadFooterMagic {
        /// Magic actually received.
        found: u32,
    },
    /// The footer CRC does not cover the received header and body.
    #[display("CRC mismatch (computed {computed:#010x}, received {received:#010x})")]
    CrcMismatch {
        /// CRC computed locally.
        computed: u32,
        /// CRC carried in the footer.
        received: u32,
    },
    /// The header announced a body larger than the protocol allows.
    #[display("body of {size} bytes exceeds the protocol limit")]
    BodyTooLarge {
        /// Announced body size.
        size: usize,
    },
    /// A response body was shorter than its command requires.
    #[display("response body too short ({found} of {expected} bytes)")]
    ShortBody {
        /// Bytes the command requires.
        expected: usize,
        /// Bytes received.
        found: usize,
    },
    /// The buffer ended before a full frame was available.
    #[display("truncated frame ({found} of {expected} bytes)")]
    Truncated {
        /// Bytes a full frame needs.
        expected: usize,
        /// Bytes available.
        found: usize,
    },
    /// A request carried a command id this crate does not know.
    #[display("unknown command id {_0}")]
    UnknownCommand(u8),
}

// ============================================================================
// OpenFailure - why a session could not be created
// ============================================================================

/// The reason behind [`Error::OpenFailed`].
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum OpenFailure {
    /// No path was given and no controller was found on the system.
    #[display("no MegaLeaf controller found")]
    NotFound,
    /// The device file could not be opened (missing, permission denied, ...).
    #[display("device unreachable ({_0:?})")]
    Unreachable(ErrorKind),
    /// The device file is not a serial terminal or could not be configured.
    #[display("serial port setup failed ({_0:?})")]
    PortSetup(ErrorKind),
    /// The requested baud rate has no termios equivalent.
    #[display("unsupported baud rate {_0}")]
    UnsupportedBaudRate(u32),
    /// The `GetInfo` handshake failed.
    #[display("handshake failed: {_0}")]
    Handshake(Failure),
    /// The `GetInfo` handshake got no answer in time.
    #[display("handshake timed out")]
    HandshakeTimeout,
}
