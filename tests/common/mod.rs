//! A simulated MegaLeaf controller speaking the wire protocol over an in-memory link.
#![allow(dead_code, reason = "each test crate uses a different subset")]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use embedded_io_async::{ErrorKind, ErrorType, Read, Write};
use megaleaf_envoy::effect::{EffectId, EffectState};
use megaleaf_envoy::led::{LedCounts, Strips};
use megaleaf_envoy::link::Link;
use megaleaf_envoy::protocol::frame::{self, frame_len};
use megaleaf_envoy::protocol::payload::{self, DeviceInfo};
use megaleaf_envoy::protocol::{Command, HEADER_SIZE, Status};

/// How the controller answers.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Behavior {
    /// Answer every request correctly.
    #[default]
    Normal,
    /// Never answer; reads stay pending.
    Hang,
    /// Send only the first `n` bytes of each answer; the rest arrives ahead of the
    /// next answer.
    Truncate(usize),
    /// Hold each answer back and deliver it ahead of the next one.
    Late,
    /// Answer every request with this status and an empty body.
    Reject(Status),
    /// Answer with a corrupted, non-zero CRC.
    CorruptCrc,
    /// Answer with a correct frame whose body is cut to one byte.
    ShortBody,
    /// Fail every write.
    Broken,
}

/// Device state, observable by tests.
#[derive(Clone, Debug)]
pub struct Panel {
    pub firmware_version: u8,
    pub leds: LedCounts,
    pub is_on: bool,
    pub brightness: u8,
    pub brightness_strips: Strips,
    pub effect: EffectState,
    pub effect_strips: Strips,
    pub colors: Vec<u32>,
    pub color_strips: Strips,
    /// Every request received, in order.
    pub requests: Vec<Command>,
    pub behavior: Behavior,
}

/// Handle to a simulated controller shared with the links it hands out.
#[derive(Clone, Debug)]
pub struct Controller(Arc<Mutex<Panel>>);

impl Controller {
    pub fn new(firmware_version: u8, leds: LedCounts) -> Self {
        Self(Arc::new(Mutex::new(Panel {
            firmware_version,
            leds,
            is_on: true,
            brightness: 255,
            brightness_strips: Strips::BOTH,
            effect: EffectState {
                effect: EffectId::RAINBOW,
                speed: 0,
                color: 0,
            },
            effect_strips: Strips::BOTH,
            colors: vec![0; leds.total()],
            color_strips: Strips::BOTH,
            requests: Vec::new(),
            behavior: Behavior::Normal,
        })))
    }

    /// The panel used throughout the tests: firmware 102, 30 top and 20 bottom LEDs.
    pub fn reference() -> Self {
        Self::new(102, LedCounts::new(30, 20))
    }

    pub fn link(&self) -> SimLink {
        SimLink {
            controller: self.clone(),
            inbox: Vec::new(),
            outbox: VecDeque::new(),
            held: Vec::new(),
        }
    }

    pub fn panel(&self) -> MutexGuard<'_, Panel> {
        self.0.lock().expect("panel lock poisoned")
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        self.panel().behavior = behavior;
    }

    pub fn request_count(&self) -> usize {
        self.panel().requests.len()
    }
}

/// One end of an in-memory link to a [`Controller`].
#[derive(Debug)]
pub struct SimLink {
    controller: Controller,
    inbox: Vec<u8>,
    outbox: VecDeque<u8>,
    /// Answer bytes the controller has produced but not yet sent.
    held: Vec<u8>,
}

impl SimLink {
    fn process_inbox(&mut self) {
        let Some(header) = self.inbox.first_chunk::<HEADER_SIZE>() else {
            return;
        };
        let body_len = usize::from(u16::from_le_bytes([header[5], header[6]]));
        let len = frame_len(body_len);
        if self.inbox.len() < len {
            return;
        }
        let request: Vec<u8> = self.inbox.drain(..len).collect();

        let mut panel = self.controller.panel();
        let behavior = panel.behavior;
        let (status, body) = match frame::decode_request(&request) {
            Ok(request) => {
                panel.requests.push(request.command);
                match behavior {
                    Behavior::Reject(status) => (status, Vec::new()),
                    _ => panel.handle(request.command, request.body),
                }
            }
            Err(_) => (Status::InvalidHeader, Vec::new()),
        };
        drop(panel);

        let mut response = match behavior {
            Behavior::ShortBody if !body.is_empty() => {
                frame::encode_response(status, &body[..1]).expect("response fits")
            }
            _ => frame::encode_response(status, &body).expect("response fits"),
        };
        match behavior {
            Behavior::Hang => return,
            Behavior::Late => {
                self.held.extend(response);
                return;
            }
            Behavior::Truncate(keep) => {
                let (sent, rest) = response.split_at(keep.min(response.len()));
                self.outbox.extend(self.held.drain(..));
                self.outbox.extend(sent);
                self.held = rest.to_vec();
                return;
            }
            Behavior::CorruptCrc => {
                let crc_at = response.len() - 8;
                response[crc_at] ^= 0x5A;
            }
            _ => {}
        }
        self.outbox.extend(self.held.drain(..));
        self.outbox.extend(response);
    }
}

impl Panel {
    fn handle(&mut self, command: Command, body: &[u8]) -> (Status, Vec<u8>) {
        match command {
            Command::GetInfo => {
                let info = DeviceInfo {
                    firmware_version: self.firmware_version,
                    leds: self.leds,
                };
                (Status::Ok, payload::encode_device_info(info).to_vec())
            }
            Command::TurnOff => {
                self.is_on = false;
                (Status::Ok, Vec::new())
            }
            Command::TurnOn => {
                self.is_on = true;
                (Status::Ok, Vec::new())
            }
            Command::GetOnState => (Status::Ok, payload::encode_on_state(self.is_on).to_vec()),
            Command::SetBrightness => match payload::decode_set_brightness(body) {
                Ok((brightness, strips)) => {
                    self.brightness = brightness;
                    self.brightness_strips = strips;
                    (Status::Ok, Vec::new())
                }
                Err(_) => (Status::InvalidData, Vec::new()),
            },
            Command::GetBrightness => (Status::Ok, vec![self.brightness]),
            Command::SetColor => match payload::decode_set_color(body) {
                Ok((strips, colors)) if colors.len() == self.leds.total() => {
                    self.colors = colors.collect();
                    self.color_strips = strips;
                    (Status::Ok, Vec::new())
                }
                _ => (Status::InvalidData, Vec::new()),
            },
            Command::SetEffect => match payload::decode_set_effect(body) {
                Ok(settings) => {
                    self.effect = settings.into();
                    self.effect_strips = settings.strips;
                    (Status::Ok, Vec::new())
                }
                Err(_) => (Status::InvalidData, Vec::new()),
            },
            Command::GetEffect => (
                Status::Ok,
                payload::encode_effect_state(self.effect).to_vec(),
            ),
            Command::FeaturePing | Command::FeaturePingConfig => (Status::Ping, Vec::new()),
        }
    }
}

impl ErrorType for SimLink {
    type Error = ErrorKind;
}

impl Link for SimLink {}

impl Read for SimLink {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        if self.outbox.is_empty() {
            if self.controller.panel().behavior != Behavior::Hang {
                return Ok(0);
            }
            core::future::pending::<()>().await;
        }
        let count = buf.len().min(self.outbox.len());
        for (slot, byte) in buf.iter_mut().zip(self.outbox.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }
}

impl Write for SimLink {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, ErrorKind> {
        if self.controller.panel().behavior == Behavior::Broken {
            return Err(ErrorKind::BrokenPipe);
        }
        self.inbox.extend_from_slice(buf);
        self.process_inbox();
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), ErrorKind> {
        Ok(())
    }
}
