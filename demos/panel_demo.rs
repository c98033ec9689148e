//! Open a MegaLeaf controller, show a static color and read the settings back.
//!
//! Usage: `panel_demo [DEVICE_PATH]`. Without a path the first controller found under
//! `/dev/serial/by-id` is used. Set `RUST_LOG=debug` to see every round trip.

use std::process::ExitCode;

use megaleaf_envoy::{
    Result,
    config::SessionConfig,
    effect::{EffectId, EffectSettings},
    led::Strips,
    session::Session,
};

// Two "mains" let us use Results.
fn main() -> ExitCode {
    env_logger::init();
    match embassy_futures::block_on(inner_main()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn inner_main() -> Result<()> {
    let path = std::env::args().nth(1).unwrap_or_default();
    let session = Session::open_path(&path, SessionConfig::new()).await?;

    let leds = session.led_counts()?;
    println!("firmware version: {}", session.firmware_version().await?);
    println!("LEDs: {} top, {} bottom", leds.top, leds.bottom);

    let settings = EffectSettings::new(EffectId::STATIC_COLOR)
        .with_speed(0)
        .with_strips(Strips::BOTH)
        .with_color(0x0005_50ff);
    session.set_effect(settings).await?;
    session.set_brightness(60).await?;

    let effect = session.effect().await?;
    println!(
        "effect: {}, speed {}, color {:#08x}",
        effect.effect.0, effect.speed, effect.color
    );
    println!("brightness: {}", session.brightness().await?);

    session.close().await;
    Ok(())
}
