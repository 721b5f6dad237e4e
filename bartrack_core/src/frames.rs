//! Wire codec for the bar sensor.
//!
//! Inbound frames are little-endian with fixed offsets: data frames carry
//! accel/gyro/Euler as signed 16-bit words, response frames carry a 16-bit
//! register selector plus a 16-bit payload. Outbound commands are fixed
//! 5-byte sequences. Anything short, misheadered, or unknown decodes to
//! `None`; the decoder never fails loudly, because a dropped radio frame is
//! routine, not an error.

use crate::sample::ImuSample;
use bartrack_traits::{BoxError, Clock, CommandPort};
use std::time::Duration;

// -- Frame geometry --
pub const FRAME_HEADER: u8 = 0x55;
pub const DATA_FRAME_ID: u8 = 0x61;
pub const RESPONSE_FRAME_ID: u8 = 0x71;
pub const DATA_FRAME_LEN: usize = 20;

// -- Registers addressable through response/read frames --
pub const REG_SAMPLE_RATE: u16 = 0x0003;
pub const REG_TEMPERATURE: u16 = 0x0040;
pub const REG_BATTERY: u16 = 0x0064;

// -- Word scale factors (full-scale over i16 range) --
const ACCEL_SCALE_G: f64 = 16.0 / 32768.0;
const GYRO_SCALE_DPS: f64 = 2000.0 / 32768.0;
const EULER_SCALE_DEG: f64 = 180.0 / 32768.0;

// -- Fixed outbound commands --
pub const CMD_READ_RATE: [u8; 5] = [0xFF, 0xAA, 0x27, 0x03, 0x00];
pub const CMD_READ_BATTERY: [u8; 5] = [0xFF, 0xAA, 0x27, 0x64, 0x00];
pub const CMD_READ_TEMPERATURE: [u8; 5] = [0xFF, 0xAA, 0x27, 0x40, 0x00];
pub const CMD_SAVE_SETTINGS: [u8; 5] = [0xFF, 0xAA, 0x00, 0x00, 0x00];

/// Delay between a rate write and the save that commits it.
pub const RATE_CHANGE_SETTLE: Duration = Duration::from_millis(200);

/// Battery discharge curve: (centivolts, percent), descending. Values below
/// the last boundary report 0%.
const BATTERY_CURVE: [(u16, u8); 11] = [
    (396, 100),
    (393, 90),
    (387, 75),
    (382, 60),
    (379, 50),
    (377, 40),
    (373, 30),
    (370, 20),
    (368, 15),
    (350, 10),
    (340, 5),
];

/// Everything a well-formed inbound frame can decode into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Frame {
    Data(ImuSample),
    SampleRate { hz: u32 },
    Battery { centivolts: u16, percent: u8 },
    Temperature { deg_c: f64 },
}

#[inline]
fn word_i16(buf: &[u8], off: usize) -> f64 {
    f64::from(i16::from_le_bytes([buf[off], buf[off + 1]]))
}

#[inline]
fn word_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

/// Decode one inbound frame. `timestamp_ms` is the link's arrival stamp and
/// is attached to data samples; frames do not carry time of their own.
pub fn decode(buf: &[u8], timestamp_ms: u64) -> Option<Frame> {
    if buf.len() < 2 || buf[0] != FRAME_HEADER {
        return None;
    }
    match buf[1] {
        DATA_FRAME_ID => decode_data(buf, timestamp_ms),
        RESPONSE_FRAME_ID => decode_response(buf),
        _ => None,
    }
}

fn decode_data(buf: &[u8], timestamp_ms: u64) -> Option<Frame> {
    if buf.len() < DATA_FRAME_LEN {
        return None;
    }
    let read3 = |base: usize, scale: f64| -> [f64; 3] {
        [
            word_i16(buf, base) * scale,
            word_i16(buf, base + 2) * scale,
            word_i16(buf, base + 4) * scale,
        ]
    };
    Some(Frame::Data(ImuSample {
        timestamp_ms,
        accel_g: read3(2, ACCEL_SCALE_G),
        gyro_dps: read3(8, GYRO_SCALE_DPS),
        euler_deg: read3(14, EULER_SCALE_DEG),
    }))
}

fn decode_response(buf: &[u8]) -> Option<Frame> {
    if buf.len() < 6 {
        return None;
    }
    let register = word_u16(buf, 2);
    let payload = word_u16(buf, 4);
    match register {
        REG_SAMPLE_RATE => rate_code_to_hz(payload).map(|hz| Frame::SampleRate { hz }),
        REG_BATTERY => Some(Frame::Battery {
            centivolts: payload,
            percent: battery_percent(payload),
        }),
        REG_TEMPERATURE => Some(Frame::Temperature {
            deg_c: f64::from(payload as i16) / 100.0,
        }),
        _ => None,
    }
}

/// Map a rate register code to its output rate in Hz.
pub fn rate_code_to_hz(code: u16) -> Option<u32> {
    match code {
        0x06 => Some(10),
        0x07 => Some(20),
        0x08 => Some(50),
        0x09 => Some(100),
        0x0B => Some(200),
        _ => None,
    }
}

/// Inverse of `rate_code_to_hz` for building set-rate commands.
pub fn hz_to_rate_code(hz: u32) -> Option<u8> {
    match hz {
        10 => Some(0x06),
        20 => Some(0x07),
        50 => Some(0x08),
        100 => Some(0x09),
        200 => Some(0x0B),
        _ => None,
    }
}

/// Battery percentage from raw centivolts via the discharge curve.
pub fn battery_percent(centivolts: u16) -> u8 {
    for (boundary, percent) in BATTERY_CURVE {
        if centivolts >= boundary {
            return percent;
        }
    }
    0
}

/// Build the set-rate command for a supported rate.
pub fn set_rate_command(hz: u32) -> Option<[u8; 5]> {
    hz_to_rate_code(hz).map(|code| [0xFF, 0xAA, 0x03, code, 0x00])
}

/// Change the sensor output rate: write the rate register, give the sensor
/// time to latch it, then persist with the save command.
pub fn apply_sample_rate<P: CommandPort, C: Clock>(
    port: &mut P,
    clock: &C,
    hz: u32,
) -> Result<(), BoxError> {
    let Some(cmd) = set_rate_command(hz) else {
        return Err(format!("unsupported sample rate: {hz} Hz").into());
    };
    port.write_command(&cmd)?;
    clock.pause(RATE_CHANGE_SETTLE);
    port.write_command(&CMD_SAVE_SETTINGS)?;
    tracing::info!(hz, "sensor sample rate updated");
    Ok(())
}
