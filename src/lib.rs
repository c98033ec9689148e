//! Session driver for the MegaLeaf addressable-LED panel controller.
//!
//! A MegaLeaf panel is two strips of addressable LEDs (*top* and *bottom*) behind a
//! microcontroller that speaks a small framed request/response protocol over USB CDC
//! serial. This crate opens a [`Session`](session::Session) with one controller and
//! exposes its commands as typed async methods.
//!
//! ```rust,no_run
//! use megaleaf_envoy::config::SessionConfig;
//! use megaleaf_envoy::session::Session;
//!
//! embassy_futures::block_on(async {
//!     let session = Session::open_path("/dev/ttyACM0", SessionConfig::new()).await?;
//!     let leds = session.led_counts()?;
//!     session.set_colors(&vec![0x00ff_0000; leds.total()]).await?;
//!     Ok::<(), megaleaf_envoy::Error>(())
//! })?;
//! # Ok::<(), megaleaf_envoy::Error>(())
//! ```
//!
//! # Glossary
//!
//! - **Round trip:** one request frame from the host followed by one response frame
//!   from the controller. A session never has more than one in flight.
//! - **Strip selector:** bitmask naming the strips a command applies to
//!   ([`Strips`](led::Strips)).
//! - **Effect:** an animation built into the controller firmware, identified by an
//!   [`EffectId`](effect::EffectId).
//! - **Link:** the byte stream a session talks over ([`Link`](link::Link)).
//!
//! # Features
//!
//! - `host` (default): std build with the Linux [`SerialLink`](link::serial::SerialLink),
//!   controller discovery and the std time driver. Without it the crate is `no_std` and
//!   any [`embedded_io_async`] stream implementing [`Link`](link::Link) can be used.
//! - `demo`: builds the `panel_demo` binary.
#![cfg_attr(not(feature = "host"), no_std)]
#![allow(async_fn_in_trait, reason = "sessions are driven by a single executor")]

pub mod config;
pub mod effect;
mod error;
pub mod led;
pub mod link;
pub mod protocol;
pub mod session;

// Re-export error types and result (used throughout)
pub use crate::error::{Error, Failure, OpenFailure, ProtocolError, Result};
