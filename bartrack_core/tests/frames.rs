//! Wire-level tests: response registers, command builders, and the
//! rate-change sequence against a mock port and manual clock.

use bartrack_core::frames::{
    self, CMD_READ_BATTERY, CMD_READ_RATE, CMD_READ_TEMPERATURE, CMD_SAVE_SETTINGS, Frame,
    RATE_CHANGE_SETTLE,
};
use bartrack_traits::{BoxError, Clock, CommandPort, ManualClock};
use rstest::rstest;

#[derive(Default)]
struct RecordingPort {
    written: Vec<[u8; 5]>,
}

impl CommandPort for RecordingPort {
    fn write_command(&mut self, frame: &[u8; 5]) -> Result<(), BoxError> {
        self.written.push(*frame);
        Ok(())
    }
}

fn response(register: u16, payload: u16) -> Vec<u8> {
    let mut buf = vec![0x55, 0x71];
    buf.extend_from_slice(&register.to_le_bytes());
    buf.extend_from_slice(&payload.to_le_bytes());
    buf
}

#[rstest]
#[case::rate_20hz(0x0003, 0x0007, Frame::SampleRate { hz: 20 })]
#[case::rate_200hz(0x0003, 0x000B, Frame::SampleRate { hz: 200 })]
#[case::battery_full(0x0064, 398, Frame::Battery { centivolts: 398, percent: 100 })]
#[case::battery_low(0x0064, 345, Frame::Battery { centivolts: 345, percent: 5 })]
#[case::temperature(0x0040, 2_315, Frame::Temperature { deg_c: 23.15 })]
fn response_registers_decode(#[case] register: u16, #[case] payload: u16, #[case] expect: Frame) {
    assert_eq!(frames::decode(&response(register, payload), 0), Some(expect));
}

#[test]
fn unknown_register_is_silently_skipped() {
    assert_eq!(frames::decode(&response(0x0099, 1), 0), None);
}

#[test]
fn negative_temperature_payload_decodes() {
    // -5.00 °C as two's-complement centidegrees.
    let raw = (-500i16) as u16;
    assert_eq!(
        frames::decode(&response(0x0040, raw), 0),
        Some(Frame::Temperature { deg_c: -5.0 })
    );
}

#[test]
fn read_commands_match_the_wire_protocol() {
    assert_eq!(CMD_READ_RATE, [0xFF, 0xAA, 0x27, 0x03, 0x00]);
    assert_eq!(CMD_READ_BATTERY, [0xFF, 0xAA, 0x27, 0x64, 0x00]);
    assert_eq!(CMD_READ_TEMPERATURE, [0xFF, 0xAA, 0x27, 0x40, 0x00]);
    assert_eq!(CMD_SAVE_SETTINGS, [0xFF, 0xAA, 0x00, 0x00, 0x00]);
    assert_eq!(frames::set_rate_command(50), Some([0xFF, 0xAA, 0x03, 0x08, 0x00]));
    assert_eq!(frames::set_rate_command(60), None);
}

#[test]
fn rate_change_writes_then_waits_then_saves() {
    let mut port = RecordingPort::default();
    let clock = ManualClock::new();

    frames::apply_sample_rate(&mut port, &clock, 20).unwrap();

    assert_eq!(
        port.written,
        vec![[0xFF, 0xAA, 0x03, 0x07, 0x00], CMD_SAVE_SETTINGS]
    );
    assert_eq!(clock.elapsed_ms(), RATE_CHANGE_SETTLE.as_millis() as u64);
}

#[test]
fn unsupported_rate_writes_nothing() {
    let mut port = RecordingPort::default();
    let clock = ManualClock::new();
    assert!(frames::apply_sample_rate(&mut port, &clock, 75).is_err());
    assert!(port.written.is_empty());
}
