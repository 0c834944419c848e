//! Status lights and beeper against embedded-hal pin mocks

use embedded_hal_mock::eh1::pin::{Mock as PinMock, State as PinState, Transaction as PinTransaction};
use flight_core::hal::{Beeper, Indicator, PinIndicator};
use flight_core::types::{HeartbeatSource, IndicatorEvent, IndicatorMode};

#[test]
fn test_status_mode_lights_sensor_only() {
    let link = PinMock::new(&[PinTransaction::set(PinState::High)]);
    let sensor = PinMock::new(&[PinTransaction::set(PinState::Low)]);
    let mut indicator = PinIndicator::new(link, sensor);

    indicator
        .signal(IndicatorEvent::Mode(IndicatorMode::Status))
        .unwrap();

    let (mut link, mut sensor) = indicator.release();
    link.done();
    sensor.done();
}

#[test]
fn test_heartbeat_blinks_its_own_light() {
    let link = PinMock::new(&[
        PinTransaction::set(PinState::Low),
        PinTransaction::set(PinState::High),
    ]);
    let sensor = PinMock::new(&[]);
    let mut indicator = PinIndicator::new(link, sensor);

    for on in [true, false] {
        indicator
            .signal(IndicatorEvent::Heartbeat {
                source: HeartbeatSource::Link,
                on,
            })
            .unwrap();
    }
    // calibration events are not shown on the lights
    indicator.signal(IndicatorEvent::Calibrated).unwrap();

    let (mut link, mut sensor) = indicator.release();
    link.done();
    sensor.done();
}

#[test]
fn test_beeper_pin_sequence() {
    let pin = PinMock::new(&[
        PinTransaction::set(PinState::High),
        PinTransaction::set(PinState::Low),
        PinTransaction::set(PinState::High),
        PinTransaction::set(PinState::Low),
        PinTransaction::set(PinState::Low),
    ]);
    let mut beeper = Beeper::new(pin);
    for active in [true, true, true, false, false] {
        beeper.tick(active).unwrap();
    }
    assert!(!beeper.is_on());
    beeper.release().done();
}
