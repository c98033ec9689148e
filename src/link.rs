//! Byte transport between a session and its controller.
//!
//! A link is any [`embedded_io_async`] reader/writer that implements [`Link`]. On a host
//! the controller enumerates as a USB CDC serial port, opened with
//! [`SerialLink`](serial::SerialLink) and found by [`discovery`].

use embassy_time::{Duration, TimeoutError, with_timeout};
pub use embedded_io_async::{ErrorKind, ErrorType, Read, Write};

#[cfg(feature = "host")]
pub mod discovery;
#[cfg(feature = "host")]
pub mod serial;

/// A bidirectional byte stream to a MegaLeaf controller.
///
/// A read that returns `0` bytes means the controller has gone silent. Most transports
/// need nothing beyond an empty impl:
///
/// ```rust,ignore
/// impl Link for MyPort {}
/// ```
pub trait Link: Read + Write {
    /// Throw away input left over from an abandoned exchange and return how many bytes
    /// were dropped.
    ///
    /// The session calls this before its next request whenever an answer was cut short,
    /// arrived malformed or never arrived. The default reads and discards until the link
    /// stays quiet for `quiet` or a read returns `0` bytes. Override it when the
    /// transport can flush its receive queue directly.
    async fn discard_input(
        &mut self,
        quiet: Duration,
    ) -> Result<usize, <Self as ErrorType>::Error> {
        let mut scratch = [0_u8; 64];
        let mut discarded = 0;
        loop {
            match with_timeout(quiet, self.read(&mut scratch)).await {
                Ok(Ok(0)) | Err(TimeoutError) => return Ok(discarded),
                Ok(Ok(read)) => discarded += read,
                Ok(Err(err)) => return Err(err),
            }
        }
    }
}
