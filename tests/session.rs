#![allow(missing_docs)]
//! Session behavior against a simulated controller.

mod common;

use common::{Behavior, Controller, SimLink};
use embassy_futures::block_on;
use embassy_futures::join::join3;
use embassy_time::Duration;
use embedded_io_async::ErrorKind;
use megaleaf_envoy::config::SessionConfig;
use megaleaf_envoy::effect::{EffectId, EffectSettings, EffectState};
use megaleaf_envoy::led::{LedCounts, RGB8, Strips};
use megaleaf_envoy::protocol::{Command, Status};
use megaleaf_envoy::session::Session;
use megaleaf_envoy::{Error, Failure, OpenFailure, ProtocolError};

fn fast_config() -> SessionConfig {
    SessionConfig::new().with_round_trip_timeout(Duration::from_millis(50))
}

fn open(controller: &Controller) -> Session<SimLink> {
    block_on(Session::open(controller.link(), fast_config())).expect("handshake succeeds")
}

// ============================================================================
// Open
// ============================================================================

#[test]
fn open_learns_topology_and_firmware() {
    let controller = Controller::reference();
    let session = open(&controller);

    assert_eq!(session.led_counts(), Ok(LedCounts::new(30, 20)));
    assert_eq!(session.led_counts().map(LedCounts::total), Ok(50));
    assert_eq!(block_on(session.firmware_version()), Ok(102));
    assert!(!session.is_closed());
    assert_eq!(session.last_error(), None);
}

#[test]
fn led_counts_is_served_from_the_handshake() {
    let controller = Controller::reference();
    let session = open(&controller);
    let before = controller.request_count();

    for _ in 0..3 {
        assert!(session.led_counts().is_ok());
    }
    assert_eq!(controller.request_count(), before);
}

#[test]
fn firmware_version_is_queried_every_time() {
    let controller = Controller::reference();
    let session = open(&controller);

    block_on(session.firmware_version()).expect("first query");
    controller.panel().firmware_version = 103;
    assert_eq!(block_on(session.firmware_version()), Ok(103));
    assert_eq!(
        controller.panel().requests,
        [Command::GetInfo, Command::GetInfo, Command::GetInfo]
    );
}

#[test]
fn rejected_handshake_fails_open() {
    let controller = Controller::reference();
    controller.set_behavior(Behavior::Reject(Status::NotReady));

    let result = block_on(Session::open(controller.link(), fast_config()));
    assert_eq!(
        result.err(),
        Some(Error::OpenFailed {
            reason: OpenFailure::Handshake(Failure::Device(Status::NotReady))
        })
    );
}

#[test]
fn silent_controller_fails_open_with_handshake_timeout() {
    let controller = Controller::reference();
    controller.set_behavior(Behavior::Hang);

    let result = block_on(Session::open(controller.link(), fast_config()));
    assert_eq!(
        result.err(),
        Some(Error::OpenFailed {
            reason: OpenFailure::HandshakeTimeout
        })
    );
}

#[test]
fn short_info_body_fails_open() {
    let controller = Controller::reference();
    controller.set_behavior(Behavior::ShortBody);

    let result = block_on(Session::open(controller.link(), fast_config()));
    assert_eq!(
        result.err(),
        Some(Error::OpenFailed {
            reason: OpenFailure::Handshake(Failure::Protocol(ProtocolError::ShortBody {
                expected: 5,
                found: 1
            }))
        })
    );
}

// ============================================================================
// Power and brightness
// ============================================================================

#[test]
fn power_state_follows_turn_on_and_off() {
    let controller = Controller::reference();
    let session = open(&controller);

    block_on(session.turn_off()).expect("turn off");
    assert_eq!(block_on(session.is_turned_on()), Ok(false));

    block_on(session.turn_on()).expect("turn on");
    block_on(session.turn_on()).expect("repeated turn on is accepted");
    assert_eq!(block_on(session.is_turned_on()), Ok(true));
}

#[test]
fn brightness_is_applied_to_both_strips() {
    let controller = Controller::reference();
    let session = open(&controller);

    block_on(session.set_brightness(60)).expect("set brightness");
    assert_eq!(block_on(session.brightness()), Ok(60));
    assert_eq!(controller.panel().brightness_strips, Strips::BOTH);

    block_on(session.set_brightness(0_u8)).expect("zero is valid");
    block_on(session.set_brightness(255_u16)).expect("255 is valid");
    assert_eq!(block_on(session.brightness()), Ok(255));
}

#[test]
fn out_of_range_brightness_sends_nothing() {
    let controller = Controller::reference();
    let session = open(&controller);
    let before = controller.request_count();

    for value in [256, -1, 1000] {
        assert!(matches!(
            block_on(session.set_brightness(value)),
            Err(Error::InvalidArgument { .. })
        ));
    }
    assert_eq!(controller.request_count(), before);
    assert_eq!(block_on(session.brightness()), Ok(255));
}

// ============================================================================
// Colors
// ============================================================================

#[test]
fn colors_reach_every_led_in_order() {
    let controller = Controller::reference();
    let session = open(&controller);

    let colors: Vec<u32> = (0..50).map(|index| index * 0x0001_0101).collect();
    block_on(session.set_colors(&colors)).expect("set colors");

    let panel = controller.panel();
    assert_eq!(panel.colors, colors);
    assert_eq!(panel.color_strips, Strips::BOTH);
}

#[test]
fn pixels_are_packed_as_rgb_words() {
    let controller = Controller::reference();
    let session = open(&controller);

    let mut pixels = vec![RGB8::new(0, 0, 0); 50];
    pixels[0] = RGB8::new(0x12, 0x34, 0x56);
    block_on(session.set_pixels(&pixels)).expect("set pixels");

    assert_eq!(controller.panel().colors[0], 0x0012_3456);
}

#[test]
fn wrong_color_count_sends_nothing() {
    let controller = Controller::reference();
    let session = open(&controller);
    let before = controller.request_count();

    for len in [0, 49, 51] {
        assert!(matches!(
            block_on(session.set_colors(&vec![0; len])),
            Err(Error::InvalidArgument { .. })
        ));
    }
    assert_eq!(controller.request_count(), before);
}

#[test]
fn color_above_24_bits_is_rejected() {
    let controller = Controller::reference();
    let session = open(&controller);

    let mut colors = vec![0x00FF_FFFF; 50];
    colors[7] = 0x0100_0000;
    assert!(matches!(
        block_on(session.set_colors(&colors)),
        Err(Error::InvalidArgument { .. })
    ));
    assert_eq!(controller.panel().colors, vec![0; 50]);
}

#[test]
fn panel_too_large_for_one_frame_is_rejected() {
    let controller = Controller::new(1, LedCounts::new(400, 200));
    let session = open(&controller);
    let before = controller.request_count();

    assert!(matches!(
        block_on(session.set_colors(&vec![0; 600])),
        Err(Error::InvalidArgument { .. })
    ));
    assert_eq!(controller.request_count(), before);
}

// ============================================================================
// Effects
// ============================================================================

#[test]
fn effect_settings_read_back_without_strips() {
    let controller = Controller::reference();
    let session = open(&controller);

    let settings = EffectSettings::new(EffectId::STATIC_COLOR)
        .with_speed(0)
        .with_color(0x0005_50ff);
    block_on(session.set_effect(settings)).expect("set effect");

    assert_eq!(
        block_on(session.effect()),
        Ok(EffectState {
            effect: EffectId(2),
            speed: 0,
            color: 0x0005_50ff
        })
    );
    assert_eq!(controller.panel().effect_strips, Strips::BOTH);
}

#[test]
fn effect_on_one_strip_is_sent_as_given() {
    let controller = Controller::reference();
    let session = open(&controller);

    let settings = EffectSettings::new(EffectId::COLOR_CYCLE)
        .with_speed(9)
        .with_strips(Strips::TOP);
    block_on(session.set_effect(settings)).expect("set effect");

    let panel = controller.panel();
    assert_eq!(panel.effect_strips, Strips::TOP);
    assert_eq!(panel.effect.speed, 9);
}

#[test]
fn invalid_effect_settings_send_nothing() {
    let controller = Controller::reference();
    let session = open(&controller);
    let before = controller.request_count();

    let no_strip = EffectSettings::new(EffectId::RAINBOW).with_strips(Strips::NONE);
    let bad_color = EffectSettings::new(EffectId::STATIC_COLOR).with_color(0x0100_0000);
    for settings in [no_strip, bad_color] {
        assert!(matches!(
            block_on(session.set_effect(settings)),
            Err(Error::InvalidArgument { .. })
        ));
    }
    assert_eq!(controller.request_count(), before);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn device_rejection_names_the_command() {
    let controller = Controller::reference();
    let session = open(&controller);
    controller.set_behavior(Behavior::Reject(Status::InvalidData));

    assert_eq!(
        block_on(session.set_brightness(10)),
        Err(Error::CommandFailed {
            command: Command::SetBrightness,
            cause: Failure::Device(Status::InvalidData)
        })
    );
    assert_eq!(
        block_on(session.brightness()),
        Err(Error::QueryFailed {
            command: Command::GetBrightness,
            cause: Failure::Device(Status::InvalidData)
        })
    );
}

#[test]
fn unknown_status_code_is_preserved() {
    let controller = Controller::reference();
    let session = open(&controller);
    controller.set_behavior(Behavior::Reject(Status::from_code(200)));

    assert_eq!(
        block_on(session.turn_on()),
        Err(Error::CommandFailed {
            command: Command::TurnOn,
            cause: Failure::Device(Status::Unknown(200))
        })
    );
}

#[test]
fn silent_controller_times_out() {
    let controller = Controller::reference();
    let session = open(&controller);
    controller.set_behavior(Behavior::Hang);

    assert_eq!(
        block_on(session.is_turned_on()),
        Err(Error::Timeout {
            command: Command::GetOnState,
            timeout_ms: 50
        })
    );
}

#[test]
fn silence_mid_frame_times_out() {
    let controller = Controller::reference();
    let session = open(&controller);
    controller.set_behavior(Behavior::Truncate(9));

    assert_eq!(
        block_on(session.effect()),
        Err(Error::Timeout {
            command: Command::GetEffect,
            timeout_ms: 50
        })
    );
}

#[test]
fn late_answer_is_not_taken_for_the_next_one() {
    let controller = Controller::reference();
    let session = open(&controller);
    block_on(session.set_brightness(60)).expect("set brightness");

    controller.set_behavior(Behavior::Late);
    assert_eq!(
        block_on(session.is_turned_on()),
        Err(Error::Timeout {
            command: Command::GetOnState,
            timeout_ms: 50
        })
    );

    // The on-state answer now arrives ahead of the brightness answer.
    controller.set_behavior(Behavior::Normal);
    assert_eq!(block_on(session.brightness()), Ok(60));
    assert_eq!(block_on(session.is_turned_on()), Ok(true));
    assert_eq!(session.last_error(), None);
}

#[test]
fn rest_of_a_truncated_answer_is_skipped() {
    let controller = Controller::reference();
    let session = open(&controller);
    block_on(session.set_brightness(60)).expect("set brightness");

    controller.set_behavior(Behavior::Truncate(9));
    assert!(matches!(
        block_on(session.effect()),
        Err(Error::Timeout {
            command: Command::GetEffect,
            ..
        })
    ));

    controller.set_behavior(Behavior::Normal);
    assert_eq!(block_on(session.brightness()), Ok(60));
    let expected = controller.panel().effect;
    assert_eq!(block_on(session.effect()), Ok(expected));
}

#[test]
fn truncated_header_is_skipped() {
    let controller = Controller::reference();
    let session = open(&controller);

    controller.set_behavior(Behavior::Truncate(3));
    assert!(block_on(session.firmware_version()).is_err());

    controller.set_behavior(Behavior::Normal);
    block_on(session.turn_off()).expect("turn off");
    assert_eq!(block_on(session.is_turned_on()), Ok(false));
}

#[test]
fn corrupted_answer_is_a_protocol_failure() {
    let controller = Controller::reference();
    let session = open(&controller);
    controller.set_behavior(Behavior::CorruptCrc);

    assert!(matches!(
        block_on(session.brightness()),
        Err(Error::QueryFailed {
            command: Command::GetBrightness,
            cause: Failure::Protocol(ProtocolError::CrcMismatch { .. })
        })
    ));

    controller.set_behavior(Behavior::Normal);
    assert_eq!(block_on(session.firmware_version()), Ok(102));
}

#[test]
fn short_effect_body_is_a_protocol_failure() {
    let controller = Controller::reference();
    let session = open(&controller);
    controller.set_behavior(Behavior::ShortBody);

    assert_eq!(
        block_on(session.effect()),
        Err(Error::QueryFailed {
            command: Command::GetEffect,
            cause: Failure::Protocol(ProtocolError::ShortBody {
                expected: 6,
                found: 1
            })
        })
    );
}

#[test]
fn broken_link_is_a_link_failure() {
    let controller = Controller::reference();
    let session = open(&controller);
    controller.set_behavior(Behavior::Broken);

    assert_eq!(
        block_on(session.turn_off()),
        Err(Error::CommandFailed {
            command: Command::TurnOff,
            cause: Failure::Link(ErrorKind::BrokenPipe)
        })
    );
}

#[test]
fn last_error_tracks_the_latest_operation() {
    let controller = Controller::reference();
    let session = open(&controller);

    let err = block_on(session.set_brightness(300)).expect_err("out of range");
    assert_eq!(session.last_error(), Some(err));

    block_on(session.set_brightness(30)).expect("in range");
    assert_eq!(session.last_error(), None);
}

#[test]
fn every_error_describes_itself() {
    let errors = [
        Error::OpenFailed {
            reason: OpenFailure::NotFound,
        },
        Error::AlreadyOpen,
        Error::CommandFailed {
            command: Command::SetColor,
            cause: Failure::Device(Status::DataTooLarge),
        },
        Error::Timeout {
            command: Command::GetInfo,
            timeout_ms: 1000,
        },
        Error::SessionClosed,
    ];
    for err in errors {
        assert!(!err.to_string().is_empty());
    }
    assert_eq!(
        Error::CommandFailed {
            command: Command::SetColor,
            cause: Failure::Device(Status::DataTooLarge),
        }
        .to_string(),
        "SetColor failed: controller reported data too large"
    );
}

#[test]
fn reference_panel_scenario_succeeds_without_error() {
    let controller = Controller::reference();
    let session = open(&controller);

    assert_eq!(block_on(session.firmware_version()), Ok(102));
    assert_eq!(session.led_counts(), Ok(LedCounts::new(30, 20)));
    let settings = EffectSettings::new(EffectId(2))
        .with_speed(0)
        .with_strips(Strips::BOTH)
        .with_color(0x0005_50ff);
    block_on(session.set_effect(settings)).expect("set effect");
    block_on(session.set_brightness(60)).expect("set brightness");
    assert_eq!(session.last_error(), None);

    block_on(session.close());
}

// ============================================================================
// Close and concurrency
// ============================================================================

#[test]
fn closed_session_refuses_everything() {
    let controller = Controller::reference();
    let session = open(&controller);

    block_on(session.close());
    assert!(session.is_closed());
    let before = controller.request_count();

    assert_eq!(session.led_counts(), Err(Error::SessionClosed));
    assert_eq!(block_on(session.firmware_version()), Err(Error::SessionClosed));
    assert_eq!(block_on(session.turn_on()), Err(Error::SessionClosed));
    assert_eq!(block_on(session.set_brightness(10)), Err(Error::SessionClosed));
    assert_eq!(block_on(session.effect()), Err(Error::SessionClosed));

    // Closed wins over argument validation.
    assert_eq!(block_on(session.set_brightness(300)), Err(Error::SessionClosed));
    assert_eq!(block_on(session.set_colors(&[])), Err(Error::SessionClosed));
    let no_strips = EffectSettings::new(EffectId::RAINBOW).with_strips(Strips::NONE);
    assert_eq!(block_on(session.set_effect(no_strips)), Err(Error::SessionClosed));
    assert_eq!(session.last_error(), Some(Error::SessionClosed));
    assert_eq!(controller.request_count(), before);

    block_on(session.close());
    assert!(session.is_closed());
}

#[test]
fn concurrent_operations_are_serialized() {
    let controller = Controller::reference();
    let session = open(&controller);

    let (brightness, on, effect) = block_on(join3(
        session.set_brightness(42),
        session.turn_off(),
        session.set_effect(EffectSettings::new(EffectId::RAINBOW).with_speed(3)),
    ));
    brightness.expect("brightness");
    on.expect("turn off");
    effect.expect("effect");

    let panel = controller.panel();
    assert_eq!(panel.requests.len(), 4);
    assert_eq!(panel.brightness, 42);
    assert!(!panel.is_on);
    assert_eq!(panel.effect.speed, 3);
}
