//! Stabilizer and mixer properties over arbitrary inputs

use flight_core::config::MotorTest;
use flight_core::mixer::{Mixer, MixerParams, Override};
use flight_core::pid::{integral_window, Gains, RateLimits, Stabilizer, INTEGRAL_MAX};
use flight_core::shaping::{Expo, SmoothedCommand};
use flight_core::types::{Axis, MOTOR_MAX, SERVO_MAX};
use proptest::prelude::*;

const DEFAULT_GAINS: [Gains; 3] = [
    Gains { p: 4.0, i: 0.005, d: 0.0 },
    Gains { p: 4.0, i: 0.005, d: 0.0 },
    Gains { p: 6.0, i: 0.01, d: 0.0 },
];

const DEFAULT_RATES: RateLimits = RateLimits {
    pitch_roll: 1200.0,
    yaw: 1200.0,
};

const DEFAULT_MIXER: MixerParams = MixerParams {
    motor_start: 50,
    motor_armed: 150,
    throttle_range: 1750.0,
    throttle_atten: 0.0,
};

fn stick() -> impl Strategy<Value = f32> {
    -1.0f32..=1.0
}

proptest! {
    #[test]
    fn prop_outputs_always_in_range(
        throttle in 0.0f32..=1.0,
        aileron in stick(),
        elevator in stick(),
        rudder in stick(),
        gyro in proptest::array::uniform3(-2000.0f32..2000.0),
        steps in 1usize..50,
    ) {
        let mut stab = Stabilizer::new(DEFAULT_GAINS, DEFAULT_RATES);
        let mut mixer = Mixer::new(DEFAULT_MIXER);
        let cmd = SmoothedCommand { throttle, aileron, elevator, rudder };
        for _ in 0..steps {
            let correction = stab.update(&cmd, &gyro, true);
            let out = mixer.update(throttle, &correction);
            prop_assert!(out.in_range());
            prop_assert!(out.motors.iter().all(|m| *m >= 50));
        }
        let (out, reason) = mixer.output(MotorTest::default(), false);
        prop_assert_eq!(reason, Override::None);
        prop_assert!(out.motors.iter().all(|m| *m <= MOTOR_MAX));
        prop_assert!(out.servo <= SERVO_MAX);
    }

    #[test]
    fn prop_integral_contribution_bounded(i in 1e-6f32..50.0, error in -5000.0f32..5000.0) {
        let window = integral_window(i);
        prop_assert!(window * i <= INTEGRAL_MAX);

        let gains = Gains { p: 0.0, i, d: 0.0 };
        let mut stab = Stabilizer::new([gains; 3], DEFAULT_RATES);
        let cmd = SmoothedCommand::default();
        let mut out = stab.update(&cmd, &[error; 3], true);
        for _ in 0..20 {
            out = stab.update(&cmd, &[error; 3], true);
        }
        prop_assert!(out.pitch.abs() <= INTEGRAL_MAX);
        prop_assert!(stab.axis(Axis::Yaw).integral().abs() <= window);
    }

    #[test]
    fn prop_expo_monotonic_and_bounded(k in 0.1f32..8.0, a in 0.0f32..=1.0, b in 0.0f32..=1.0) {
        let expo = Expo::new(k);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(expo.apply(lo) <= expo.apply(hi));
        prop_assert!(expo.apply(hi) <= 1.0 + 1e-6);
        prop_assert_eq!(expo.apply(-hi), -expo.apply(hi));
    }
}

#[test]
fn test_motor_test_wins_while_disarmed() {
    let mut mixer = Mixer::new(DEFAULT_MIXER);
    let test = MotorTest {
        select: 0b0111,
        value: 1100,
    };
    let (out, reason) = mixer.output(test, true);
    assert_eq!(reason, Override::Test);
    assert_eq!(out.motors, [1100; 3]);
}
