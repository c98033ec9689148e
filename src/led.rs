//! LED topology, strip selection and color packing for a MegaLeaf panel.
//!
//! A panel has two addressable strips, *top* and *bottom*. Colors travel on the wire
//! as packed `0x00RRGGBB` words, bottom strip first.

use core::ops::BitOr;

use serde::{Deserialize, Serialize};

/// RGB color type accepted by [`Session::set_pixels`](crate::session::Session::set_pixels).
#[doc(inline)]
pub use smart_leds::RGB8;

/// Largest valid packed color word.
pub const MAX_COLOR: u32 = 0x00FF_FFFF;

// ============================================================================
// LedCounts
// ============================================================================

/// Number of LEDs on each strip, as reported by the controller at open.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct LedCounts {
    /// LEDs on the top strip.
    pub top: u16,
    /// LEDs on the bottom strip.
    pub bottom: u16,
}

impl LedCounts {
    /// Create a topology from per-strip counts.
    #[must_use]
    pub const fn new(top: u16, bottom: u16) -> Self {
        Self { top, bottom }
    }

    /// Total number of LEDs across both strips.
    ///
    /// ```rust
    /// use megaleaf_envoy::led::LedCounts;
    ///
    /// assert_eq!(LedCounts::new(30, 20).total(), 50);
    /// ```
    #[must_use]
    pub const fn total(self) -> usize {
        self.top as usize + self.bottom as usize
    }
}

// ============================================================================
// Strips
// ============================================================================

/// Selects which strips a command applies to.
///
/// Bit 0 is the top strip and bit 1 the bottom strip. Combine with `|`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Strips(u8);

impl Strips {
    /// No strip. Rejected by every command.
    pub const NONE: Self = Self(0b00);
    /// The top strip.
    pub const TOP: Self = Self(0b01);
    /// The bottom strip.
    pub const BOTTOM: Self = Self(0b10);
    /// Both strips.
    pub const BOTH: Self = Self(0b11);

    /// Build a selector from its wire bits, or `None` if unknown bits are set.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Option<Self> {
        if bits & !Self::BOTH.0 == 0 {
            Some(Self(bits))
        } else {
            None
        }
    }

    /// Build a selector, ignoring unknown bits.
    #[must_use]
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::BOTH.0)
    }

    /// The byte sent on the wire.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether no strip is selected.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether every strip in `other` is selected.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for Strips {
    fn default() -> Self {
        Self::BOTH
    }
}

impl BitOr for Strips {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ============================================================================
// Color packing
// ============================================================================

/// Convert colors to packed `0x00RRGGBB` words.
///
/// # Example
///
/// ```rust
/// use megaleaf_envoy::led::{ToColorWord, RGB8};
///
/// assert_eq!(RGB8::new(0x05, 0x50, 0xff).to_color_word(), 0x0005_50ff);
/// assert_eq!(0x0005_50ff_u32.to_color_word(), 0x0005_50ff);
/// ```
pub trait ToColorWord {
    /// Convert this color to a packed word.
    #[must_use]
    fn to_color_word(self) -> u32;
}

impl ToColorWord for u32 {
    #[inline(always)]
    fn to_color_word(self) -> u32 {
        self
    }
}

impl ToColorWord for RGB8 {
    #[inline(always)]
    fn to_color_word(self) -> u32 {
        u32::from_be_bytes([0, self.r, self.g, self.b])
    }
}

/// Unpack a color word into [`RGB8`], ignoring the unused top byte.
#[must_use]
pub const fn unpack_color(word: u32) -> RGB8 {
    let [_, r, g, b] = word.to_be_bytes();
    RGB8 { r, g, b }
}
