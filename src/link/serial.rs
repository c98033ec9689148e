//! Host serial link to a MegaLeaf controller's USB CDC port (Linux termios).
//!
//! Opening takes an exclusive advisory lock on the device so that two sessions never
//! share one controller. The lock lives as long as the [`SerialLink`] and is released
//! when it is dropped.
//!
//! Reads block for at most [`SessionConfig::read_poll_interval`] before yielding, which
//! lets the session's round-trip timeout fire while the controller is silent.

use std::fs::{File, OpenOptions};
use std::io::{self, Read as _, Write as _};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use derive_more::{Display, Error};
use embassy_futures::yield_now;
use embassy_time::Duration;
use embedded_io_async::{ErrorKind, ErrorType, Read, Write};
use log::{debug, info};

use crate::config::SessionConfig;
use crate::error::OpenFailure;
use crate::link::Link;
use crate::{Error, Result};

/// Error reported by a [`SerialLink`] read, write or flush.
#[derive(Clone, Copy, Debug, Display, Eq, Error, PartialEq)]
#[display("serial link error ({kind:?})")]
pub struct SerialError {
    kind: ErrorKind,
}

impl embedded_io_async::Error for SerialError {
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl From<io::Error> for SerialError {
    fn from(err: io::Error) -> Self {
        Self {
            kind: error_kind(&err),
        }
    }
}

/// An open, locked and configured serial port.
#[derive(Debug)]
pub struct SerialLink {
    file: File,
    path: PathBuf,
}

impl SerialLink {
    /// Open `path` as a raw 8N1 serial port at `config.baud_rate`.
    ///
    /// # Errors
    ///
    /// - [`Error::OpenFailed`] if the baud rate is unsupported, the path cannot be opened,
    ///   or it is not a serial terminal.
    /// - [`Error::AlreadyOpen`] if another link holds the device.
    pub fn open(path: impl AsRef<Path>, config: &SessionConfig) -> Result<Self> {
        let path = path.as_ref();
        let speed = termios_speed(config.baud_rate)
            .ok_or(OpenFailure::UnsupportedBaudRate(config.baud_rate))?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(path)
            .map_err(|err| OpenFailure::Unreachable(error_kind(&err)))?;

        lock_exclusive(&file).map_err(|err| {
            if err.kind() == io::ErrorKind::WouldBlock {
                Error::AlreadyOpen
            } else {
                OpenFailure::PortSetup(error_kind(&err)).into()
            }
        })?;

        configure_raw(&file, speed, poll_deciseconds(config))
            .map_err(|err| OpenFailure::PortSetup(error_kind(&err)))?;

        info!("opened {} at {} baud", path.display(), config.baud_rate);
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// The device path this link was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ErrorType for SerialLink {
    type Error = SerialError;
}

impl Read for SerialLink {
    async fn read(&mut self, buf: &mut [u8]) -> core::result::Result<usize, SerialError> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            match (&self.file).read(buf) {
                // VTIME expired with nothing received.
                Ok(0) => yield_now().await,
                Ok(read) => return Ok(read),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
    }
}

impl Write for SerialLink {
    async fn write(&mut self, buf: &[u8]) -> core::result::Result<usize, SerialError> {
        loop {
            match (&self.file).write(buf) {
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                result => return result.map_err(SerialError::from),
            }
        }
    }

    async fn flush(&mut self) -> core::result::Result<(), SerialError> {
        drain(&self.file).map_err(SerialError::from)
    }
}

impl Link for SerialLink {
    /// Flush the terminal's receive queue instead of reading it out.
    async fn discard_input(&mut self, _quiet: Duration) -> core::result::Result<usize, SerialError> {
        flush_input(&self.file).map_err(SerialError::from)
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        debug!("releasing {}", self.path.display());
    }
}

// ============================================================================
// termios / flock glue
// ============================================================================

/// `VTIME` in tenths of a second, within what the terminal driver accepts.
fn poll_deciseconds(config: &SessionConfig) -> u8 {
    let tenths = config.read_poll_interval.as_millis().div_ceil(100);
    u8::try_from(tenths.clamp(1, u64::from(u8::MAX))).unwrap_or(u8::MAX)
}

fn termios_speed(baud_rate: u32) -> Option<libc::speed_t> {
    let speed = match baud_rate {
        9_600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        460_800 => libc::B460800,
        500_000 => libc::B500000,
        576_000 => libc::B576000,
        921_600 => libc::B921600,
        1_000_000 => libc::B1000000,
        1_152_000 => libc::B1152000,
        1_500_000 => libc::B1500000,
        2_000_000 => libc::B2000000,
        _ => return None,
    };
    Some(speed)
}

fn check(rc: libc::c_int) -> io::Result<()> {
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[expect(unsafe_code, reason = "flock on a descriptor owned by `file`")]
fn lock_exclusive(file: &File) -> io::Result<()> {
    // SAFETY: the descriptor stays open for the duration of the call.
    check(unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) })
}

#[expect(unsafe_code, reason = "termios calls on a descriptor owned by `file`")]
fn configure_raw(file: &File, speed: libc::speed_t, vtime: u8) -> io::Result<()> {
    let fd = file.as_raw_fd();
    // SAFETY: termios is plain old data; all-zero is a valid value that tcgetattr overwrites.
    let mut tty: libc::termios = unsafe { core::mem::zeroed() };
    // SAFETY: fd is open and `tty` is a valid, exclusively borrowed termios.
    unsafe {
        check(libc::tcgetattr(fd, &raw mut tty))?;
        libc::cfmakeraw(&raw mut tty);
        check(libc::cfsetispeed(&raw mut tty, speed))?;
        check(libc::cfsetospeed(&raw mut tty, speed))?;
    }

    // 8N1, no flow control, receiver on, modem lines ignored.
    tty.c_cflag &= !(libc::PARENB | libc::CSTOPB | libc::CSIZE | libc::CRTSCTS);
    tty.c_cflag |= libc::CS8 | libc::CREAD | libc::CLOCAL;
    tty.c_cc[libc::VMIN] = 0;
    tty.c_cc[libc::VTIME] = vtime;

    // SAFETY: as above.
    unsafe {
        check(libc::tcsetattr(fd, libc::TCSANOW, &raw const tty))?;
        check(libc::tcflush(fd, libc::TCIOFLUSH))
    }
}

#[expect(unsafe_code, reason = "tcdrain on a descriptor owned by `file`")]
fn drain(file: &File) -> io::Result<()> {
    // SAFETY: the descriptor stays open for the duration of the call.
    check(unsafe { libc::tcdrain(file.as_raw_fd()) })
}

/// Drop everything received but not yet read, returning how much that was.
#[expect(unsafe_code, reason = "ioctl and tcflush on a descriptor owned by `file`")]
fn flush_input(file: &File) -> io::Result<usize> {
    let fd = file.as_raw_fd();
    let mut pending: libc::c_int = 0;
    // SAFETY: fd is open and FIONREAD writes one c_int through the valid pointer.
    if unsafe { libc::ioctl(fd, libc::FIONREAD, &raw mut pending) } < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: the descriptor stays open for the duration of the call.
    check(unsafe { libc::tcflush(fd, libc::TCIFLUSH) })?;
    Ok(usize::try_from(pending).unwrap_or(0))
}

fn error_kind(err: &io::Error) -> ErrorKind {
    match err.kind() {
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
        io::ErrorKind::BrokenPipe => ErrorKind::BrokenPipe,
        io::ErrorKind::InvalidInput => ErrorKind::InvalidInput,
        io::ErrorKind::InvalidData => ErrorKind::InvalidData,
        io::ErrorKind::TimedOut => ErrorKind::TimedOut,
        io::ErrorKind::Interrupted => ErrorKind::Interrupted,
        io::ErrorKind::Unsupported => ErrorKind::Unsupported,
        _ => ErrorKind::Other,
    }
}
