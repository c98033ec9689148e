//! The MegaLeaf (MLF) wire protocol.
//!
//! Every exchange is one request frame from the host followed by one response frame
//! from the controller:
//!
//! ```text
//! | header (7 bytes)              | body (data_size bytes) | footer (8 bytes)   |
//! | magic u32 | cmd/status u8 | data_size u16 |  command specific  | crc u32 | magic u32 |
//! ```
//!
//! All integers are little-endian and all structures are packed. Requests carry a
//! [`Command`] in the header; responses carry a [`Status`] in the same position.
//!
//! See [`frame`] for encoding and decoding, and [`payload`] for the command bodies.

use derive_more::Display;

pub mod frame;
pub mod payload;

// ============================================================================
// Constants
// ============================================================================

/// Magic opening every request frame (`"FLM\0"` on the wire).
pub const REQUEST_MAGIC: u32 = 0x004D_4C46;

/// Magic opening every response frame (`"FLR\0"` on the wire).
pub const RESPONSE_MAGIC: u32 = 0x0052_4C46;

/// Magic closing every frame (`"leds"` on the wire).
pub const FOOTER_MAGIC: u32 = 0x7364_656C;

/// Size of a request or response header.
pub const HEADER_SIZE: usize = 4 + 1 + 2; // Magic + Cmd/Status + DataSize

/// Size of the frame footer.
pub const FOOTER_SIZE: usize = 4 + 4; // Crc + Magic

/// Largest body the controller accepts or sends.
pub const MAX_BODY_SIZE: usize = 2048;

/// Largest complete frame.
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + MAX_BODY_SIZE + FOOTER_SIZE;

// ============================================================================
// Command - what the host asks for
// ============================================================================

/// Command ids understood by the controller.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u8)]
pub enum Command {
    /// Switch all LEDs off.
    #[display("TurnOff")]
    TurnOff = 0,
    /// Report firmware version and LED counts.
    #[display("GetInfo")]
    GetInfo = 1,
    /// Keep-alive ping (controller side feature, unused by the session).
    #[display("FeaturePing")]
    FeaturePing = 2,
    /// Configure the keep-alive ping (controller side feature, unused by the session).
    #[display("FeaturePingConfig")]
    FeaturePingConfig = 3,
    /// Set brightness of the selected strips.
    #[display("SetBrightness")]
    SetBrightness = 4,
    /// Set the color of every LED.
    #[display("SetColor")]
    SetColor = 5,
    /// Run a built-in effect on the selected strips.
    #[display("SetEffect")]
    SetEffect = 6,
    /// Restore the LEDs to their state before [`Command::TurnOff`].
    #[display("TurnOn")]
    TurnOn = 7,
    /// Report whether the LEDs are on.
    #[display("GetOnState")]
    GetOnState = 8,
    /// Report the current brightness.
    #[display("GetBrightness")]
    GetBrightness = 9,
    /// Report the current effect, speed and color.
    #[display("GetEffect")]
    GetEffect = 10,
}

impl Command {
    /// Every command, in id order.
    pub const ALL: [Self; 11] = [
        Self::TurnOff,
        Self::GetInfo,
        Self::FeaturePing,
        Self::FeaturePingConfig,
        Self::SetBrightness,
        Self::SetColor,
        Self::SetEffect,
        Self::TurnOn,
        Self::GetOnState,
        Self::GetBrightness,
        Self::GetEffect,
    ];

    /// The id sent in the request header.
    #[must_use]
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Look up a command by its wire id.
    #[must_use]
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.id() == id)
    }

    /// Whether the command only reads device state.
    #[must_use]
    pub const fn is_query(self) -> bool {
        matches!(
            self,
            Self::GetInfo | Self::GetOnState | Self::GetBrightness | Self::GetEffect
        )
    }
}

// ============================================================================
// Status - what the controller answers
// ============================================================================

/// Status code carried in a response header.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum Status {
    /// The command succeeded.
    #[display("success")]
    Ok,
    /// Keep-alive answer.
    #[display("ping")]
    Ping,
    /// The controller computed a different CRC.
    #[display("CRC failure")]
    CrcFail,
    /// Unknown command id.
    #[display("invalid command")]
    InvalidCommand,
    /// Malformed header.
    #[display("malformed header")]
    InvalidHeader,
    /// The command body was rejected.
    #[display("invalid data")]
    InvalidData,
    /// Malformed footer.
    #[display("malformed footer")]
    InvalidFooter,
    /// The controller is busy with a previous frame.
    #[display("device not ready")]
    NotReady,
    /// The controller gave up waiting for the rest of the frame.
    #[display("timeout")]
    Timeout,
    /// The frame exceeded the controller's buffer.
    #[display("data too large")]
    DataTooLarge,
    /// A code this crate does not know.
    #[display("unknown error {_0}")]
    Unknown(u8),
}

impl Status {
    /// Decode a status byte.
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::Ping,
            128 => Self::CrcFail,
            129 => Self::InvalidCommand,
            130 => Self::InvalidHeader,
            131 => Self::InvalidData,
            132 => Self::InvalidFooter,
            133 => Self::NotReady,
            134 => Self::Timeout,
            135 => Self::DataTooLarge,
            other => Self::Unknown(other),
        }
    }

    /// The byte sent in the response header.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Ping => 1,
            Self::CrcFail => 128,
            Self::InvalidCommand => 129,
            Self::InvalidHeader => 130,
            Self::InvalidData => 131,
            Self::InvalidFooter => 132,
            Self::NotReady => 133,
            Self::Timeout => 134,
            Self::DataTooLarge => 135,
            Self::Unknown(code) => code,
        }
    }

    /// Whether the status reports success.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl From<u8> for Status {
    fn from(code: u8) -> Self {
        Self::from_code(code)
    }
}
