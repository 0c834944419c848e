//! Arming gesture over every radio protocol

use flight_core::arming::{ArmState, ArmingStateMachine};
use flight_core::test_utils::{Rig, IDLE_STICKS};
use flight_core::types::{ArmStatus, PilotCommand};
use flight_core::Protocol;
use rstest::rstest;

fn switch(armed: f32, throttle: f32) -> PilotCommand {
    PilotCommand {
        armed,
        throttle,
        ..IDLE_STICKS
    }
}

#[rstest]
#[case::ibus(Protocol::Ibus)]
#[case::sumd(Protocol::Sumd)]
#[case::sbus(Protocol::Sbus)]
fn test_unlock_then_arm(#[case] protocol: Protocol) {
    let mut rig = Rig::new(protocol);
    rig.settle();
    assert_eq!(rig.controller.arm_status(), ArmStatus::Locked);

    rig.send_command(&switch(1.0, 0.0));
    assert_eq!(rig.controller.arm_status(), ArmStatus::Step1Armed);
    rig.send_command(&switch(0.0, 0.0));
    assert_eq!(rig.controller.arm_status(), ArmStatus::Disarmed);
    rig.send_command(&switch(1.0, 0.3));
    assert_eq!(rig.controller.arm_status(), ArmStatus::Armed);
    println!("✅ {:?}: unlocked and armed", protocol);
}

#[rstest]
#[case::ibus(Protocol::Ibus)]
#[case::sumd(Protocol::Sumd)]
#[case::sbus(Protocol::Sbus)]
fn test_open_throttle_blocks_unlock(#[case] protocol: Protocol) {
    let mut rig = Rig::new(protocol);
    rig.settle();
    rig.send_command(&switch(1.0, 0.5));
    rig.send_command(&switch(0.0, 0.5));
    rig.send_command(&switch(1.0, 0.5));
    assert_eq!(rig.controller.arm_status(), ArmStatus::Step1Armed);
    assert_eq!(rig.controller.armed(), 0.0);
}

#[rstest]
#[case(&[0.0, 1.0, 0.0, 1.0], ArmState::Unlocked, 1.0)]
#[case(&[1.0, 1.0, 1.0], ArmState::Step1Armed, 0.0)]
#[case(&[0.2, 0.4, 0.49], ArmState::Locked, 0.0)]
#[case(&[0.6, 0.1, 0.7], ArmState::Unlocked, 0.7)]
fn test_gesture_sequences(#[case] switches: &[f32], #[case] state: ArmState, #[case] armed: f32) {
    let mut fsm = ArmingStateMachine::new();
    for s in switches {
        fsm.update(*s, 0.0);
    }
    assert_eq!(fsm.state(), state);
    assert_eq!(fsm.armed(), armed);
}

#[test]
fn test_unlock_survives_link_timeout() {
    let mut rig = Rig::new(Protocol::Ibus);
    rig.settle();
    rig.unlock();
    rig.send_command(&switch(1.0, 0.0));
    assert_eq!(rig.controller.arm_status(), ArmStatus::Armed);

    rig.tick(500);
    rig.settle();
    assert_eq!(rig.controller.arm_status(), ArmStatus::Disarmed);

    // no second gesture needed once the link is back
    rig.send_command(&switch(1.0, 0.0));
    assert_eq!(rig.controller.arm_status(), ArmStatus::Armed);
}
