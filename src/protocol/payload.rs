//! Typed command and response bodies.
//!
//! Each body has an `encode_*` function producing wire bytes and a `decode_*` function
//! parsing them back. Decoders accept trailing bytes and reject short bodies with
//! [`ProtocolError::ShortBody`].

use heapless::Vec;

use super::MAX_BODY_SIZE;
use crate::effect::{EffectId, EffectSettings, EffectState};
use crate::error::ProtocolError;
use crate::led::{LedCounts, Strips};

/// An encoded command body, stored inline.
pub type BodyBuffer = Vec<u8, MAX_BODY_SIZE>;

/// Size of a `SetColor` body for `led_count` LEDs.
#[must_use]
pub const fn color_body_len(led_count: usize) -> usize {
    1 + 4 * led_count
}

// ============================================================================
// GetInfo
// ============================================================================

/// `GetInfo` response: firmware version and LED topology.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DeviceInfo {
    /// Firmware version number.
    pub firmware_version: u8,
    /// LEDs per strip.
    pub leds: LedCounts,
}

/// Encode a `GetInfo` response body.
#[must_use]
pub const fn encode_device_info(info: DeviceInfo) -> [u8; 5] {
    let [t0, t1] = info.leds.top.to_le_bytes();
    let [b0, b1] = info.leds.bottom.to_le_bytes();
    [info.firmware_version, t0, t1, b0, b1]
}

/// Decode a `GetInfo` response body.
///
/// # Errors
///
/// Returns [`ProtocolError::ShortBody`] if fewer than five bytes were received.
pub fn decode_device_info(body: &[u8]) -> Result<DeviceInfo, ProtocolError> {
    let [firmware_version, t0, t1, b0, b1] = take(body)?;
    Ok(DeviceInfo {
        firmware_version,
        leds: LedCounts::new(u16::from_le_bytes([t0, t1]), u16::from_le_bytes([b0, b1])),
    })
}

// ============================================================================
// Brightness
// ============================================================================

/// Encode a `SetBrightness` request body.
#[must_use]
pub const fn encode_set_brightness(brightness: u8, strips: Strips) -> [u8; 2] {
    [brightness, strips.bits()]
}

/// Decode a `SetBrightness` request body.
///
/// # Errors
///
/// Returns [`ProtocolError::ShortBody`] if fewer than two bytes were received.
pub fn decode_set_brightness(body: &[u8]) -> Result<(u8, Strips), ProtocolError> {
    let [brightness, strips] = take(body)?;
    Ok((brightness, Strips::from_bits_truncate(strips)))
}

/// Decode a `GetBrightness` response body.
///
/// # Errors
///
/// Returns [`ProtocolError::ShortBody`] if the body is empty.
pub fn decode_brightness(body: &[u8]) -> Result<u8, ProtocolError> {
    let [brightness] = take(body)?;
    Ok(brightness)
}

// ============================================================================
// Power
// ============================================================================

/// Encode a `GetOnState` response body.
#[must_use]
pub fn encode_on_state(is_on: bool) -> [u8; 1] {
    [u8::from(is_on)]
}

/// Decode a `GetOnState` response body. Any non-zero byte means on.
///
/// # Errors
///
/// Returns [`ProtocolError::ShortBody`] if the body is empty.
pub fn decode_on_state(body: &[u8]) -> Result<bool, ProtocolError> {
    let [is_on] = take(body)?;
    Ok(is_on != 0)
}

// ============================================================================
// Colors
// ============================================================================

/// Encode a `SetColor` request body: the strip selector followed by one little-endian
/// word per LED.
///
/// # Errors
///
/// Returns [`ProtocolError::BodyTooLarge`] if the body would exceed [`MAX_BODY_SIZE`].
pub fn encode_set_color(
    strips: Strips,
    colors: impl ExactSizeIterator<Item = u32>,
) -> Result<BodyBuffer, ProtocolError> {
    let too_large = ProtocolError::BodyTooLarge {
        size: color_body_len(colors.len()),
    };
    let mut body = BodyBuffer::new();
    body.push(strips.bits()).map_err(|_| too_large)?;
    for color in colors {
        body.extend_from_slice(&color.to_le_bytes())
            .map_err(|()| too_large)?;
    }
    Ok(body)
}

/// Decode a `SetColor` request body into its strip selector and color words.
///
/// # Errors
///
/// Returns [`ProtocolError::ShortBody`] if the selector is missing or the last word is
/// incomplete.
pub fn decode_set_color(
    body: &[u8],
) -> Result<(Strips, impl ExactSizeIterator<Item = u32> + '_), ProtocolError> {
    let (&strips, words) = body.split_first().ok_or(ProtocolError::ShortBody {
        expected: 1,
        found: 0,
    })?;
    let words = words.chunks_exact(4);
    if !words.remainder().is_empty() {
        return Err(ProtocolError::ShortBody {
            expected: color_body_len(words.len() + 1),
            found: body.len(),
        });
    }
    let colors = words.map(|word| <[u8; 4]>::try_from(word).map_or(0, u32::from_le_bytes));
    Ok((Strips::from_bits_truncate(strips), colors))
}

// ============================================================================
// Effects
// ============================================================================

/// Encode a `SetEffect` request body.
#[must_use]
pub const fn encode_set_effect(settings: EffectSettings) -> [u8; 7] {
    let [c0, c1, c2, c3] = settings.color.to_le_bytes();
    [
        settings.effect.0,
        settings.speed,
        settings.strips.bits(),
        c0,
        c1,
        c2,
        c3,
    ]
}

/// Decode a `SetEffect` request body.
///
/// # Errors
///
/// Returns [`ProtocolError::ShortBody`] if fewer than seven bytes were received.
pub fn decode_set_effect(body: &[u8]) -> Result<EffectSettings, ProtocolError> {
    let [effect, speed, strips, c0, c1, c2, c3] = take(body)?;
    Ok(EffectSettings {
        effect: EffectId(effect),
        speed,
        strips: Strips::from_bits_truncate(strips),
        color: u32::from_le_bytes([c0, c1, c2, c3]),
    })
}

/// Encode a `GetEffect` response body.
#[must_use]
pub const fn encode_effect_state(state: EffectState) -> [u8; 6] {
    let [c0, c1, c2, c3] = state.color.to_le_bytes();
    [state.effect.0, state.speed, c0, c1, c2, c3]
}

/// Decode a `GetEffect` response body.
///
/// # Errors
///
/// Returns [`ProtocolError::ShortBody`] if fewer than six bytes were received.
pub fn decode_effect_state(body: &[u8]) -> Result<EffectState, ProtocolError> {
    let [effect, speed, c0, c1, c2, c3] = take(body)?;
    Ok(EffectState {
        effect: EffectId(effect),
        speed,
        color: u32::from_le_bytes([c0, c1, c2, c3]),
    })
}

/// First `N` bytes of `body`.
fn take<const N: usize>(body: &[u8]) -> Result<[u8; N], ProtocolError> {
    body.first_chunk::<N>()
        .copied()
        .ok_or(ProtocolError::ShortBody {
            expected: N,
            found: body.len(),
        })
}
