//! Built-in controller effects.
//!
//! The controller firmware owns the catalogue of effects; this crate passes the id
//! through unchanged. The constants on [`EffectId`] name the ones shipped today.

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

use crate::led::Strips;

/// Identifier of a firmware effect.
#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, From, Hash, Into, Ord, PartialEq, PartialOrd, Serialize,
)]
#[display("effect {_0}")]
#[serde(transparent)]
pub struct EffectId(pub u8);

impl EffectId {
    /// Rainbow sweep along both strips.
    pub const RAINBOW: Self = Self(0);
    /// Whole panel cycles through the hue wheel.
    pub const COLOR_CYCLE: Self = Self(1);
    /// One fixed color, taken from [`EffectSettings::color`].
    pub const STATIC_COLOR: Self = Self(2);
    /// A bar of color running along the strips.
    pub const BAR_CYCLE: Self = Self(3);
}

/// Everything [`Session::set_effect`](crate::session::Session::set_effect) sends.
///
/// Start from [`EffectSettings::new`] and override what differs from the defaults
/// (speed `0`, both strips, color `0`).
///
/// ```rust
/// use megaleaf_envoy::effect::{EffectId, EffectSettings};
/// use megaleaf_envoy::led::Strips;
///
/// let settings = EffectSettings::new(EffectId::STATIC_COLOR)
///     .with_color(0x0005_50ff)
///     .with_strips(Strips::TOP);
/// assert_eq!(settings.speed, 0);
/// ```
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct EffectSettings {
    /// Which effect to run.
    pub effect: EffectId,
    /// Effect speed, `0` being the slowest.
    pub speed: u8,
    /// Strips the effect applies to.
    pub strips: Strips,
    /// Color parameter, `0x00RRGGBB`. Ignored by effects that do not use one.
    pub color: u32,
}

impl EffectSettings {
    /// Settings for `effect` with default speed, strips and color.
    #[must_use]
    pub const fn new(effect: EffectId) -> Self {
        Self {
            effect,
            speed: 0,
            strips: Strips::BOTH,
            color: 0,
        }
    }

    /// Replace the speed.
    #[must_use]
    pub const fn with_speed(self, speed: u8) -> Self {
        Self { speed, ..self }
    }

    /// Replace the strip selector.
    #[must_use]
    pub const fn with_strips(self, strips: Strips) -> Self {
        Self { strips, ..self }
    }

    /// Replace the color parameter.
    #[must_use]
    pub const fn with_color(self, color: u32) -> Self {
        Self { color, ..self }
    }
}

/// Effect state as reported by the controller.
///
/// The strip selector is not reported back.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct EffectState {
    /// Effect currently running.
    pub effect: EffectId,
    /// Its speed.
    pub speed: u8,
    /// Its color parameter.
    pub color: u32,
}

impl From<EffectSettings> for EffectState {
    fn from(settings: EffectSettings) -> Self {
        Self {
            effect: settings.effect,
            speed: settings.speed,
            color: settings.color,
        }
    }
}
