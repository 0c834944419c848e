//! End-to-end flight scenarios on the mock board

use flight_core::arming::ADC_SCALE;
use flight_core::config::{ConfigSource, MotorTest, Register, REGISTER_COUNT};
use flight_core::hal::mock::MockHal;
use flight_core::hal::Storage;
use flight_core::host::HostCommand;
use flight_core::mixer::Override;
use flight_core::test_utils::{Rig, IDLE_STICKS};
use flight_core::types::{
    AlarmSource, ArmStatus, IndicatorEvent, PilotCommand, RawChannels, SERVO_CENTER,
};
use flight_core::{Protocol, FIRMWARE_VERSION};

use crate::sim::Simulation;

fn hover() -> PilotCommand {
    PilotCommand {
        throttle: 0.5,
        armed: 1.0,
        ..IDLE_STICKS
    }
}

/// Calibrated, unlocked and armed at half throttle
fn flying(protocol: Protocol) -> Rig {
    let mut rig = Rig::new(protocol);
    rig.settle();
    rig.calibrate([3, -2, 1]);
    assert!(rig.controller.is_calibrated());
    assert!(rig.hal.indicator.saw(IndicatorEvent::Calibrated));
    rig.unlock();
    rig.send_command(&hover());
    for _ in 0..200 {
        rig.send_sample([3, -2, 1]);
    }
    rig
}

fn read_register(rig: &mut Rig, reg: Register) -> u32 {
    rig.host(HostCommand::ReadRegister {
        address: reg.address(),
    });
    let packet = rig.hal.host.last().cloned().unwrap();
    u32::from_le_bytes([packet[0], packet[1], packet[2], packet[3]])
}

#[test]
fn test_hover_outputs_balanced() {
    println!("🚁 Hover at mid throttle with a biased gyro");
    let bias = [3, -2, 1];
    let mut rig = Rig::new(Protocol::Ibus);
    rig.settle();
    rig.calibrate(bias);
    rig.unlock();
    rig.send_channels(&RawChannels {
        throttle: 1500,
        aileron: 1500,
        elevator: 1500,
        rudder: 1500,
        armed: 2000,
        aux: 1000,
    });
    assert_eq!(rig.controller.arm_status(), ArmStatus::Armed);

    rig.send_sample(bias);
    let first = rig.controller.output();
    assert_eq!(rig.controller.output_override(), Override::None);
    assert_eq!(first.motors[0], first.motors[1]);
    assert_eq!(first.motors[1], first.motors[2]);
    assert!(first.motors[0] >= 150);
    assert_eq!(first.servo, SERVO_CENTER);

    for _ in 0..200 {
        rig.send_sample(bias);
    }
    let out = rig.controller.output();
    // motor_armed 150 + 0.5 * 1750
    assert!(out.motors.iter().all(|m| (1020..=1025).contains(m)), "{:?}", out);
    assert_eq!(out.motors[0], out.motors[1]);
    assert_eq!(out.motors[1], out.motors[2]);
    assert_eq!(out.servo, SERVO_CENTER);
    println!("  ✅ motors {:?}, servo {}", out.motors, out.servo);
}

#[test]
fn test_link_timeout_stops_motors_and_beeps() {
    let mut rig = flying(Protocol::Sumd);
    rig.tick(500);
    rig.settle();
    assert_eq!(rig.controller.arm_status(), ArmStatus::Disarmed);
    assert!(rig.shared().alarms.is_active(AlarmSource::Link));

    rig.send_sample([3, -2, 1]);
    assert_eq!(rig.controller.output().motors, [0; 3]);

    // beeper period elapses with the alarm raised
    assert_eq!(rig.tick(250).beeper, Some(true));

    // the next good frame restores the armed value and silences the link alarm
    rig.send_command(&hover());
    assert!(!rig.shared().alarms.is_active(AlarmSource::Link));
    rig.send_sample([3, -2, 1]);
    assert!(rig.controller.output().motors.iter().all(|m| *m > 1000));
}

#[test]
fn test_sensor_timeout_kills_outputs_until_next_sample() {
    let mut rig = flying(Protocol::Sbus);
    let writes = rig.hal.pulses.writes();
    rig.tick(10);
    rig.settle();

    assert!(rig.shared().alarms.is_active(AlarmSource::Sensor));
    assert_eq!(rig.hal.pulses.writes(), writes + 1);
    assert_eq!(rig.hal.pulses.last().unwrap().motors, [0; 3]);
    // the radio link is still healthy
    assert_eq!(rig.controller.arm_status(), ArmStatus::Armed);

    rig.send_sample([3, -2, 1]);
    assert!(!rig.shared().alarms.is_active(AlarmSource::Sensor));
    assert!(rig.hal.pulses.last().unwrap().motors.iter().all(|m| *m > 1000));
}

#[test]
fn test_low_battery_alarm() {
    let mut rig = Rig::new(Protocol::Ibus);
    rig.settle();
    rig.hal.battery.set_raw(Some((12.0 / ADC_SCALE) as u16));
    for _ in 0..1000 {
        rig.shared().events.raise(flight_core::Event::Battery);
        rig.poll();
    }
    let vbat = f32::from_bits(read_register(&mut rig, Register::Vbat));
    assert!(vbat < 14.4 && vbat > 12.0, "{}", vbat);
    assert_eq!(vbat, rig.controller.battery_voltage());
    assert!(rig.shared().alarms.is_active(AlarmSource::Battery));
}

#[test]
fn test_disconnected_battery_clears_alarm() {
    let mut rig = Rig::new(Protocol::Ibus);
    rig.settle();
    rig.hal.battery.set_raw(Some(0));
    for _ in 0..5000 {
        rig.shared().events.raise(flight_core::Event::Battery);
        rig.poll();
    }
    assert!(rig.controller.battery_voltage() < 8.0);
    assert!(!rig.shared().alarms.is_active(AlarmSource::Battery));
}

#[test]
fn test_motor_test_runs_while_disarmed() {
    let mut rig = Rig::new(Protocol::Ibus);
    rig.settle();
    rig.host(HostCommand::WriteRegister {
        address: Register::MotorTest.address(),
        bits: MotorTest {
            select: 0b0010,
            value: 1200,
        }
        .to_word(),
    });
    rig.poll();
    rig.send_sample([0; 3]);
    let out = rig.hal.pulses.last().unwrap();
    assert_eq!(out.motors, [0, 1200, 0]);
    assert_eq!(out.servo, SERVO_CENTER);
}

#[test]
fn test_persisted_configuration_survives_reboot() {
    let mut rig = Rig::new(Protocol::Ibus);
    rig.settle();
    rig.host(HostCommand::WriteRegister {
        address: Register::PitchP.address(),
        bits: 5.5f32.to_bits(),
    });
    rig.poll();

    // a ground tool saves the whole table, version marker included
    rig.host(HostCommand::StorageErase);
    for address in 0..REGISTER_COUNT as u8 {
        let reg = Register::from_address(address).unwrap();
        let bits = read_register(&mut rig, reg);
        rig.host(HostCommand::StorageWrite {
            index: address,
            value: bits,
        });
    }
    assert_eq!(rig.hal.storage.word(0), FIRMWARE_VERSION);

    let Rig { hal, .. } = rig;
    let rebooted = Rig::with_hal(Protocol::Ibus, hal);
    assert_eq!(rebooted.controller.config_source(), ConfigSource::Persisted);
    assert_eq!(rebooted.controller.config().float(Register::PitchP), 5.5);
}

#[test]
fn test_version_mismatch_loads_defaults() {
    let mut hal = MockHal::new();
    hal.storage.write_word(0, FIRMWARE_VERSION - 1).unwrap();
    hal.storage
        .write_word(Register::PitchP.address() as u16, 9.0f32.to_bits())
        .unwrap();
    let rig = Rig::with_hal(Protocol::Ibus, hal);
    assert_eq!(rig.controller.config_source(), ConfigSource::Defaults);
    assert_eq!(rig.controller.config().float(Register::PitchP), 4.0);
}

#[test]
fn test_closed_loop_damps_yaw_disturbance() {
    println!("🌀 Closed-loop yaw disturbance");
    let mut sim = Simulation::new(Protocol::Ibus);
    sim.prepare();
    sim.airframe.rates = [0.0, 0.0, 100.0];
    sim.run(300);
    let [pitch, roll, yaw] = sim.airframe.rates;
    println!("  ✅ rates after {} samples: {:?}", sim.samples, sim.airframe.rates);
    assert!(yaw.abs() < 5.0, "yaw {}", yaw);
    assert!(pitch.abs() < 1.0 && roll.abs() < 1.0);
}

#[test]
fn test_closed_loop_damps_pitch_and_roll() {
    let mut sim = Simulation::new(Protocol::Sbus);
    sim.prepare();
    sim.airframe.rates = [30.0, -20.0, 0.0];
    sim.run(300);
    assert!(
        sim.airframe.rates.iter().all(|r| r.abs() < 2.0),
        "{:?}",
        sim.airframe.rates
    );
}
