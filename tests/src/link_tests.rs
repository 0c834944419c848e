//! Radio link decoding through the full controller path

use flight_core::config::{ControlWord, Register};
use flight_core::host::HostCommand;
use flight_core::receiver::{sbus, FrameError, Receiver};
use flight_core::test_utils::{frame_for, pack_sbus, Rig};
use flight_core::types::{FaultKind, IndicatorEvent, RawChannels};
use flight_core::Protocol;
use proptest::prelude::*;
use rstest::rstest;

fn centered(protocol: Protocol) -> RawChannels {
    match protocol {
        Protocol::Ibus => RawChannels {
            throttle: 1000,
            aileron: 1500,
            elevator: 1500,
            rudder: 1500,
            armed: 1000,
            aux: 1000,
        },
        Protocol::Sumd => RawChannels {
            throttle: 8800,
            aileron: 12000,
            elevator: 12000,
            rudder: 12000,
            armed: 8800,
            aux: 8800,
        },
        Protocol::Sbus => RawChannels {
            throttle: 368,
            aileron: 1024,
            elevator: 1024,
            rudder: 1024,
            armed: 144,
            aux: 144,
        },
    }
}

fn enable_checksum(rig: &mut Rig) {
    let ctrl = rig.controller.config().word(Register::Ctrl);
    rig.host(HostCommand::WriteRegister {
        address: Register::Ctrl.address(),
        bits: ctrl | ControlWord::VERIFY_CHECKSUM,
    });
    rig.poll();
}

#[rstest]
#[case::ibus(Protocol::Ibus)]
#[case::sumd(Protocol::Sumd)]
#[case::sbus(Protocol::Sbus)]
fn test_valid_frame_updates_command(#[case] protocol: Protocol) {
    let mut rig = Rig::new(protocol);
    rig.settle();
    let mut raw = centered(protocol);
    raw.aux = protocol.raw_from(&flight_core::PilotCommand {
        aux: 1.0,
        ..Default::default()
    })
    .aux;
    rig.send_channels(&raw);

    assert_eq!(rig.controller.receiver().frame_count(), 1);
    assert_eq!(*rig.controller.receiver().raw(), raw);
    assert_eq!(rig.controller.shaped_command().aileron, 0.0);
    // aux high requests the beeper
    assert!(rig
        .shared()
        .alarms
        .is_active(flight_core::types::AlarmSource::User));
}

#[rstest]
#[case::ibus(Protocol::Ibus, 2100, 900)]
#[case::sumd(Protocol::Sumd, 16000, 8000)]
#[case::sbus(Protocol::Sbus, 1811, 172)]
fn test_stick_endpoints_past_span_saturate(
    #[case] protocol: Protocol,
    #[case] high: u16,
    #[case] low: u16,
) {
    let mut rig = Rig::new(protocol);
    rig.settle();
    rig.send_channels(&RawChannels {
        throttle: high,
        aileron: high,
        elevator: low,
        rudder: high,
        ..centered(protocol)
    });

    let cmd = rig.controller.receiver().command();
    assert_eq!(cmd.throttle, 1.0);
    assert_eq!((cmd.aileron, cmd.elevator, cmd.rudder), (1.0, -1.0, 1.0));

    // expo keeps full deflection at full deflection
    let shaped = rig.controller.shaped_command();
    for value in [shaped.aileron, shaped.elevator, shaped.rudder] {
        assert!(value.abs() <= 1.0 + 1e-5, "{:?} {}", protocol, value);
        assert!(value.abs() > 0.999, "{:?} {}", protocol, value);
    }
}

#[rstest]
#[case::ibus(Protocol::Ibus, 0)]
#[case::sumd(Protocol::Sumd, 0)]
#[case::sbus(Protocol::Sbus, 24)]
fn test_corrupt_framing_triggers_resync(#[case] protocol: Protocol, #[case] byte: usize) {
    let mut rig = Rig::new(protocol);
    rig.settle();
    let restarts = rig.hal.link.restarts();

    let mut frame = frame_for(protocol, &centered(protocol));
    frame[byte] ^= 0xA5;
    rig.shared().on_frame(&frame);
    rig.settle();

    assert_eq!(rig.shared().faults.link_faults(), 1);
    assert_eq!(rig.hal.link.restarts(), restarts + 1);
    assert!(rig
        .hal
        .indicator
        .saw(IndicatorEvent::Fault(FaultKind::LinkFrame)));
    assert_eq!(rig.controller.receiver().frame_count(), 0);
}

#[rstest]
#[case::ibus(Protocol::Ibus)]
#[case::sumd(Protocol::Sumd)]
fn test_checksum_checked_only_when_enabled(#[case] protocol: Protocol) {
    let mut rig = Rig::new(protocol);
    rig.settle();
    let mut frame = frame_for(protocol, &centered(protocol));
    let last = frame.len() - 1;
    frame[last] ^= 0xFF;

    rig.shared().on_frame(&frame);
    rig.poll();
    assert_eq!(rig.controller.receiver().frame_count(), 1);

    enable_checksum(&mut rig);
    rig.shared().on_frame(&frame);
    rig.settle();
    assert_eq!(rig.controller.receiver().frame_count(), 1);
    assert_eq!(rig.shared().faults.link_faults(), 1);
}

#[test]
fn test_sumd_status_byte() {
    let mut frame = frame_for(Protocol::Sumd, &centered(Protocol::Sumd));
    let mut rx = Receiver::new(Protocol::Sumd);
    frame[1] = flight_core::receiver::sumd::STATUS_FAILSAFE;
    assert!(rx.accept(&frame).is_ok());
    frame[1] = 0x42;
    assert_eq!(rx.accept(&frame), Err(FrameError::Status));
}

#[test]
fn test_sbus_inverted_header_accepted() {
    let mut frame = frame_for(Protocol::Sbus, &centered(Protocol::Sbus));
    frame[0] = 0x8F;
    let mut rx = Receiver::new(Protocol::Sbus);
    assert!(rx.accept(&frame).is_ok());
}

#[test]
fn test_overrun_keeps_newest_frame() {
    let mut rig = Rig::new(Protocol::Ibus);
    rig.settle();
    let first = centered(Protocol::Ibus);
    let second = RawChannels {
        throttle: 1600,
        ..first
    };
    rig.shared().on_frame(&frame_for(Protocol::Ibus, &first));
    rig.shared().on_frame(&frame_for(Protocol::Ibus, &second));
    rig.settle();

    assert_eq!(rig.shared().faults.frame_overruns(), 1);
    assert_eq!(rig.controller.receiver().raw().throttle, 1600);
    assert_eq!(rig.controller.receiver().frame_count(), 1);
}

#[test]
fn test_resync_bounded_when_line_stays_busy() {
    let mut rig = Rig::new(Protocol::Sbus);
    rig.hal.link.set_idle_after(None);
    rig.settle();
    assert!(rig.hal.link.is_receiving());
    assert!(rig.hal.link.discarded() > 0);
}

proptest! {
    #[test]
    fn prop_arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..40)) {
        for protocol in [Protocol::Ibus, Protocol::Sumd, Protocol::Sbus] {
            let mut rx = Receiver::new(protocol);
            rx.set_verify_checksum(true);
            let _ = rx.accept(&bytes);
            if bytes.len() != protocol.frame_len() {
                prop_assert_eq!(rx.accept(&bytes), Err(FrameError::Length));
            }
        }
    }

    #[test]
    fn prop_sbus_channels_survive_packing(channels in proptest::array::uniform16(0u16..2048)) {
        let payload = pack_sbus(&channels);
        let unpacked: [u16; sbus::CHANNELS] = sbus::unpack(&payload);
        prop_assert_eq!(unpacked, channels);
    }
}
