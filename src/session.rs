//! A device session with one MegaLeaf controller.
//!
//! See [`Session`] for usage.

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, TimeoutError, with_timeout};
use embedded_io_async::{Error as _, ReadExactError};
use log::{debug, info, warn};

use crate::config::SessionConfig;
use crate::effect::{EffectSettings, EffectState};
use crate::error::{Failure, OpenFailure, ProtocolError};
use crate::led::{LedCounts, MAX_COLOR, RGB8, Strips, ToColorWord};
use crate::link::Link;
use crate::protocol::frame::{self, FrameBuffer};
use crate::protocol::payload::{self, BodyBuffer};
use crate::protocol::{
    Command, FOOTER_SIZE, HEADER_SIZE, MAX_BODY_SIZE, RESPONSE_MAGIC, Status,
};
use crate::{Error, Result};

#[cfg(feature = "host")]
use crate::link::{discovery, serial::SerialLink};
#[cfg(feature = "host")]
use std::path::Path;

// ============================================================================
// Session
// ============================================================================

/// An open connection to one MegaLeaf controller.
///
/// A session exists only after a successful open, which performs a `GetInfo` handshake
/// and learns the panel's [`LedCounts`]. Every operation is one request/response round
/// trip bounded by [`SessionConfig::round_trip_timeout`]; operations issued concurrently
/// through `&self` are serialized so only one round trip is ever in flight.
///
/// Closing is one way: after [`Session::close`] every operation fails with
/// [`Error::SessionClosed`].
///
/// A round trip that times out or ends in a malformed answer leaves the link out of
/// step with the controller. The next round trip first discards pending input (see
/// [`Link::discard_input`]), then scans for a response header and keeps the newest
/// complete answer, so a late reply is never taken for the current one.
///
/// # Example
///
/// ```rust,no_run
/// use megaleaf_envoy::config::SessionConfig;
/// use megaleaf_envoy::effect::{EffectId, EffectSettings};
/// use megaleaf_envoy::session::Session;
///
/// embassy_futures::block_on(async {
///     // An empty path picks the first controller found under /dev/serial/by-id.
///     let session = Session::open_path("", SessionConfig::new()).await?;
///     println!("firmware {}", session.firmware_version().await?);
///
///     let settings = EffectSettings::new(EffectId::STATIC_COLOR).with_color(0x0005_50ff);
///     session.set_effect(settings).await?;
///     session.set_brightness(60).await?;
///
///     session.close().await;
///     Ok::<(), megaleaf_envoy::Error>(())
/// })?;
/// # Ok::<(), megaleaf_envoy::Error>(())
/// ```
pub struct Session<L: Link> {
    connection: Mutex<CriticalSectionRawMutex, Option<Connection<L>>>,
    outcome: BlockingMutex<CriticalSectionRawMutex, Cell<Outcome>>,
    leds: LedCounts,
    config: SessionConfig,
}

struct Connection<L> {
    link: L,
    /// Set when input may still hold bytes of an earlier answer.
    resync: bool,
}

#[derive(Clone, Copy, Default)]
struct Outcome {
    closed: bool,
    last_error: Option<Error>,
}

impl<L: Link> Session<L> {
    /// Open a session over `link` and perform the `GetInfo` handshake.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OpenFailed`] if the controller rejects the handshake, answers
    /// with a malformed or short info body, or does not answer in time. The link is
    /// dropped in every failure case.
    pub async fn open(link: L, config: SessionConfig) -> Result<Self> {
        let mut connection = Connection {
            link,
            resync: false,
        };
        let info = round_trip(&mut connection, &config, Command::GetInfo, &[])
            .await
            .and_then(|body| {
                payload::decode_device_info(&body)
                    .map_err(|err| failed(Command::GetInfo, err.into()))
            })
            .map_err(|err| match err {
                Error::Timeout { .. } => Error::from(OpenFailure::HandshakeTimeout),
                Error::QueryFailed { cause, .. } | Error::CommandFailed { cause, .. } => {
                    Error::from(OpenFailure::Handshake(cause))
                }
                other => other,
            })?;

        info!(
            "MegaLeaf controller open: firmware {}, {} top + {} bottom LEDs",
            info.firmware_version, info.leds.top, info.leds.bottom
        );
        Ok(Self {
            connection: Mutex::new(Some(connection)),
            outcome: BlockingMutex::new(Cell::new(Outcome::default())),
            leds: info.leds,
            config,
        })
    }

    /// Close the session and release its link.
    ///
    /// Never fails. Closing an already closed session does nothing.
    pub async fn close(&self) {
        let connection = self.connection.lock().await.take();
        self.outcome.lock(|outcome| {
            outcome.set(Outcome {
                closed: true,
                last_error: None,
            });
        });
        if let Some(connection) = connection {
            drop(connection);
            info!("MegaLeaf session closed");
        }
    }

    /// Whether [`Session::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.outcome.lock(|outcome| outcome.get().closed)
    }

    /// The error of the most recent operation, or `None` if it succeeded.
    #[must_use]
    pub fn last_error(&self) -> Option<Error> {
        self.outcome.lock(|outcome| outcome.get().last_error)
    }

    /// The configuration this session was opened with.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Device information
    // ------------------------------------------------------------------------

    /// Query the controller's firmware version.
    ///
    /// Every call is a fresh round trip.
    ///
    /// # Errors
    ///
    /// [`Error::QueryFailed`], [`Error::Timeout`] or [`Error::SessionClosed`].
    pub async fn firmware_version(&self) -> Result<u8> {
        self.query(Command::GetInfo, |body| {
            payload::decode_device_info(body).map(|info| info.firmware_version)
        })
        .await
    }

    /// The LED topology learned when the session was opened.
    ///
    /// # Errors
    ///
    /// [`Error::SessionClosed`] if the session has been closed.
    pub fn led_counts(&self) -> Result<LedCounts> {
        let result = if self.is_closed() {
            Err(Error::SessionClosed)
        } else {
            Ok(self.leds)
        };
        self.finish(result)
    }

    // ------------------------------------------------------------------------
    // Power
    // ------------------------------------------------------------------------

    /// Switch the LEDs on, restoring the state they had when turned off.
    ///
    /// # Errors
    ///
    /// [`Error::CommandFailed`], [`Error::Timeout`] or [`Error::SessionClosed`].
    pub async fn turn_on(&self) -> Result<()> {
        self.command(Command::TurnOn, &[]).await
    }

    /// Switch the LEDs off.
    ///
    /// # Errors
    ///
    /// [`Error::CommandFailed`], [`Error::Timeout`] or [`Error::SessionClosed`].
    pub async fn turn_off(&self) -> Result<()> {
        self.command(Command::TurnOff, &[]).await
    }

    /// Query whether the LEDs are on.
    ///
    /// # Errors
    ///
    /// [`Error::QueryFailed`], [`Error::Timeout`] or [`Error::SessionClosed`].
    pub async fn is_turned_on(&self) -> Result<bool> {
        self.query(Command::GetOnState, payload::decode_on_state).await
    }

    // ------------------------------------------------------------------------
    // Brightness
    // ------------------------------------------------------------------------

    /// Set the brightness of both strips.
    ///
    /// Accepts any integer; values outside `0..=255` are rejected before anything is
    /// sent.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`], [`Error::CommandFailed`], [`Error::Timeout`] or
    /// [`Error::SessionClosed`].
    pub async fn set_brightness(&self, brightness: impl TryInto<u8>) -> Result<()> {
        if self.is_closed() {
            return self.finish(Err(Error::SessionClosed));
        }
        let Ok(brightness) = brightness.try_into() else {
            return self.finish(Err(Error::invalid("brightness must be within 0..=255")));
        };
        let body = payload::encode_set_brightness(brightness, Strips::BOTH);
        self.command(Command::SetBrightness, &body).await
    }

    /// Query the current brightness.
    ///
    /// # Errors
    ///
    /// [`Error::QueryFailed`], [`Error::Timeout`] or [`Error::SessionClosed`].
    pub async fn brightness(&self) -> Result<u8> {
        self.query(Command::GetBrightness, payload::decode_brightness)
            .await
    }

    // ------------------------------------------------------------------------
    // Colors
    // ------------------------------------------------------------------------

    /// Set every LED to an explicit `0x00RRGGBB` color.
    ///
    /// `colors` holds one word per LED in wire order: the bottom strip's LEDs first,
    /// then the top strip's. Its length must equal [`LedCounts::total`].
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if the length is wrong, a value exceeds `0xFFFFFF` or
    /// the panel has too many LEDs for one frame. Otherwise [`Error::CommandFailed`],
    /// [`Error::Timeout`] or [`Error::SessionClosed`].
    pub async fn set_colors(&self, colors: &[u32]) -> Result<()> {
        self.set_color_words(colors.iter().copied()).await
    }

    /// Set every LED from [`RGB8`] pixels, in the same order as [`Session::set_colors`].
    ///
    /// # Errors
    ///
    /// As [`Session::set_colors`].
    pub async fn set_pixels(&self, pixels: &[RGB8]) -> Result<()> {
        self.set_color_words(pixels.iter().map(|pixel| pixel.to_color_word()))
            .await
    }

    async fn set_color_words(
        &self,
        colors: impl ExactSizeIterator<Item = u32> + Clone,
    ) -> Result<()> {
        if self.is_closed() {
            return self.finish(Err(Error::SessionClosed));
        }
        match self.encode_colors(colors) {
            Ok(body) => self.command(Command::SetColor, &body).await,
            Err(err) => self.finish(Err(err)),
        }
    }

    fn encode_colors(&self, colors: impl ExactSizeIterator<Item = u32> + Clone) -> Result<BodyBuffer> {
        let led_count = self.leds.total();
        if colors.len() != led_count {
            return Err(Error::invalid("color count must equal the number of LEDs"));
        }
        if colors.clone().any(|color| color > MAX_COLOR) {
            return Err(Error::invalid("color exceeds 0xFFFFFF"));
        }
        if payload::color_body_len(led_count) > MAX_BODY_SIZE {
            return Err(Error::invalid("too many LEDs for one SetColor frame"));
        }
        payload::encode_set_color(Strips::BOTH, colors)
            .map_err(|_| Error::invalid("too many LEDs for one SetColor frame"))
    }

    // ------------------------------------------------------------------------
    // Effects
    // ------------------------------------------------------------------------

    /// Run a built-in effect.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if no strip is selected or the color exceeds
    /// `0xFFFFFF`. Otherwise [`Error::CommandFailed`], [`Error::Timeout`] or
    /// [`Error::SessionClosed`].
    pub async fn set_effect(&self, settings: EffectSettings) -> Result<()> {
        if self.is_closed() {
            return self.finish(Err(Error::SessionClosed));
        }
        if settings.strips.is_empty() {
            return self.finish(Err(Error::invalid("effect must target at least one strip")));
        }
        if settings.color > MAX_COLOR {
            return self.finish(Err(Error::invalid("color exceeds 0xFFFFFF")));
        }
        let body = payload::encode_set_effect(settings);
        self.command(Command::SetEffect, &body).await
    }

    /// Query the running effect, its speed and color in one round trip.
    ///
    /// # Errors
    ///
    /// [`Error::QueryFailed`], [`Error::Timeout`] or [`Error::SessionClosed`].
    pub async fn effect(&self) -> Result<EffectState> {
        self.query(Command::GetEffect, payload::decode_effect_state)
            .await
    }

    // ------------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------------

    async fn command(&self, command: Command, body: &[u8]) -> Result<()> {
        let result = self.request(command, body).await.map(drop);
        self.finish(result)
    }

    async fn query<T>(
        &self,
        command: Command,
        decode: impl FnOnce(&[u8]) -> core::result::Result<T, ProtocolError>,
    ) -> Result<T> {
        let result = self.request(command, &[]).await.and_then(|body| {
            decode(&body).map_err(|err| failed(command, err.into()))
        });
        self.finish(result)
    }

    async fn request(&self, command: Command, body: &[u8]) -> Result<BodyBuffer> {
        let mut connection = self.connection.lock().await;
        let connection = connection.as_mut().ok_or(Error::SessionClosed)?;
        round_trip(connection, &self.config, command, body).await
    }

    fn finish<T>(&self, result: Result<T>) -> Result<T> {
        let last_error = result.as_ref().err().copied();
        self.outcome.lock(|outcome| {
            outcome.set(Outcome {
                last_error,
                ..outcome.get()
            });
        });
        result
    }
}

#[cfg(feature = "host")]
impl Session<SerialLink> {
    /// Open the controller at `path`, or the first one discovered if `path` is empty.
    ///
    /// # Errors
    ///
    /// - [`Error::OpenFailed`] if no controller is found, the path is unreachable or not
    ///   a serial terminal, or the handshake fails.
    /// - [`Error::AlreadyOpen`] if another session holds the device.
    pub async fn open_path(path: impl AsRef<Path>, config: SessionConfig) -> Result<Self> {
        let path = path.as_ref();
        let link = if path.as_os_str().is_empty() {
            let found = discovery::find_controller().ok_or(OpenFailure::NotFound)?;
            SerialLink::open(found, &config)?
        } else {
            SerialLink::open(path, &config)?
        };
        Self::open(link, config).await
    }
}

// ============================================================================
// One round trip
// ============================================================================

/// Why an exchange ended without a response frame.
enum ExchangeError {
    /// The link reported end of stream before the frame was complete.
    Silent,
    Failed(Failure),
}

impl From<ProtocolError> for ExchangeError {
    fn from(err: ProtocolError) -> Self {
        Self::Failed(Failure::Protocol(err))
    }
}

impl<E: embedded_io_async::Error> From<ReadExactError<E>> for ExchangeError {
    fn from(err: ReadExactError<E>) -> Self {
        match err {
            ReadExactError::UnexpectedEof => Self::Silent,
            ReadExactError::Other(err) => Self::Failed(Failure::Link(err.kind())),
        }
    }
}

/// A response frame as read off the link.
struct Answer {
    status: Status,
    body: BodyBuffer,
    /// Stray bytes and superseded frames skipped on the way to this one.
    skipped: usize,
}

/// How long a link must stay quiet before leftover input counts as drained.
fn quiet_window(config: &SessionConfig) -> Duration {
    (config.round_trip_timeout / 10).max(Duration::from_millis(1))
}

async fn round_trip<L: Link>(
    connection: &mut Connection<L>,
    config: &SessionConfig,
    command: Command,
    body: &[u8],
) -> Result<BodyBuffer> {
    let request = frame::encode_request(command, body).map_err(|err| failed(command, err.into()))?;
    let resync = connection.resync.then(|| quiet_window(config));
    if let Some(quiet) = resync {
        discard_stale(&mut connection.link, config, quiet, command).await;
    }
    debug!("{command}: sending {} byte frame", request.len());

    let outcome = with_timeout(
        config.round_trip_timeout,
        exchange(&mut connection.link, &request, resync),
    )
    .await;
    connection.resync = !matches!(&outcome, Ok(Ok(answer)) if answer.skipped == 0);

    match outcome {
        Ok(Ok(Answer {
            status: Status::Ok,
            body,
            ..
        })) => {
            debug!("{command}: ok, {} byte body", body.len());
            Ok(body)
        }
        Ok(Ok(Answer { status, .. })) => {
            warn!("{command}: controller reported {status}");
            Err(failed(command, Failure::Device(status)))
        }
        Ok(Err(ExchangeError::Failed(cause))) => {
            warn!("{command}: {cause}");
            Err(failed(command, cause))
        }
        Ok(Err(ExchangeError::Silent)) | Err(TimeoutError) => {
            let timeout_ms = config.round_trip_timeout.as_millis();
            warn!("{command}: no complete answer within {timeout_ms} ms");
            Err(Error::Timeout {
                command,
                timeout_ms,
            })
        }
    }
}

async fn discard_stale<L: Link>(
    link: &mut L,
    config: &SessionConfig,
    quiet: Duration,
    command: Command,
) {
    match with_timeout(config.round_trip_timeout, link.discard_input(quiet)).await {
        Ok(Ok(0)) => {}
        Ok(Ok(count)) => debug!("{command}: discarded {count} stale bytes"),
        Ok(Err(err)) => warn!("{command}: could not discard stale input ({:?})", err.kind()),
        Err(TimeoutError) => warn!("{command}: input never went quiet"),
    }
}

/// Send `request` and read its answer.
///
/// With `resync` set the answer may be preceded by leftovers of an abandoned exchange:
/// bytes before a response header are skipped, and further frames arriving within the
/// quiet window replace the one already read.
async fn exchange<L: Link>(
    link: &mut L,
    request: &FrameBuffer,
    resync: Option<Duration>,
) -> core::result::Result<Answer, ExchangeError> {
    let link_failure = |err: L::Error| ExchangeError::Failed(Failure::Link(err.kind()));
    link.write_all(request).await.map_err(link_failure)?;
    link.flush().await.map_err(link_failure)?;

    let Some(quiet) = resync else {
        return read_answer(link, false).await;
    };
    let mut answer = read_answer(link, true).await?;
    while let Ok(newer) = with_timeout(quiet, read_answer(link, true)).await {
        match newer {
            Ok(newer) => {
                debug!("dropped a stale {} answer", answer.status);
                answer = Answer {
                    skipped: answer.skipped + newer.skipped + 1,
                    ..newer
                };
            }
            Err(ExchangeError::Silent) => break,
            Err(err) => return Err(err),
        }
    }
    Ok(answer)
}

async fn read_answer<L: Link>(
    link: &mut L,
    hunt: bool,
) -> core::result::Result<Answer, ExchangeError> {
    let mut header = [0_u8; HEADER_SIZE];
    let skipped = if hunt {
        read_header_hunting(link, &mut header).await?
    } else {
        link.read_exact(&mut header).await?;
        0
    };
    let (status, body_len) = frame::decode_response_header(&header)?;

    let mut body = BodyBuffer::new();
    body.resize_default(body_len)
        .map_err(|()| ProtocolError::BodyTooLarge { size: body_len })?;
    link.read_exact(&mut body).await?;

    let mut footer = [0_u8; FOOTER_SIZE];
    link.read_exact(&mut footer).await?;
    frame::check_footer(&header, &body, &footer)?;
    Ok(Answer {
        status,
        body,
        skipped,
    })
}

/// Read a response header, skipping input until the response magic lines up.
async fn read_header_hunting<L: Link>(
    link: &mut L,
    header: &mut [u8; HEADER_SIZE],
) -> core::result::Result<usize, ExchangeError> {
    let magic = RESPONSE_MAGIC.to_le_bytes();
    let (window, rest) = header.split_at_mut(magic.len());
    link.read_exact(window).await?;
    let mut skipped = 0;
    while window != magic.as_slice() {
        let mut next = [0_u8; 1];
        link.read_exact(&mut next).await?;
        let [next] = next;
        window.rotate_left(1);
        if let Some(last) = window.last_mut() {
            *last = next;
        }
        skipped += 1;
    }
    if skipped > 0 {
        debug!("skipped {skipped} bytes ahead of a response header");
    }
    link.read_exact(rest).await?;
    Ok(skipped)
}

/// Wrap a failure in the variant matching the command's kind.
const fn failed(command: Command, cause: Failure) -> Error {
    if command.is_query() {
        Error::QueryFailed { command, cause }
    } else {
        Error::CommandFailed { command, cause }
    }
}
