//! Interrupt-side producers racing the main loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration as StdDuration;

use flight_core::test_utils::{frame_for, sample_payload, Rig, LEVEL_ACCEL};
use flight_core::host::HostCommand;
use flight_core::types::{RawChannels, RawInertialSample};
use flight_core::{Duration, Event, Protocol, Register, FIRMWARE_VERSION};

const BURST: u16 = 3000;

fn channels(value: u16) -> RawChannels {
    RawChannels {
        throttle: value,
        aileron: value,
        elevator: value,
        rudder: value,
        armed: 1000,
        aux: 1000,
    }
}

/// Poll until the producer finished and nothing is pending
fn drain(rig: &mut Rig, done: &AtomicBool, mut check: impl FnMut(&Rig)) {
    loop {
        let finished = done.load(Ordering::Acquire);
        rig.poll();
        check(rig);
        if finished && rig.shared().events.is_idle() {
            break;
        }
    }
}

#[test]
fn test_frames_are_taken_or_counted_as_overruns() {
    println!("📡 Racing {} radio frames against the main loop", BURST);
    let mut rig = Rig::new(Protocol::Ibus);
    rig.settle();
    let shared = rig.shared();
    let done = Arc::new(AtomicBool::new(false));

    let producer = {
        let done = done.clone();
        thread::spawn(move || {
            for n in 0..BURST {
                shared.on_frame(&frame_for(Protocol::Ibus, &channels(1000 + n % 1000)));
                if n % 64 == 0 {
                    thread::yield_now();
                }
            }
            done.store(true, Ordering::Release);
        })
    };

    drain(&mut rig, &done, |rig| {
        // every frame is taken whole
        let raw = rig.controller.receiver().raw();
        assert_eq!(raw.throttle, raw.aileron);
        assert_eq!(raw.elevator, raw.rudder);
        assert_eq!(raw.throttle, raw.rudder);
    });
    producer.join().unwrap();

    let accepted = rig.controller.receiver().frame_count();
    let overruns = rig.shared().faults.frame_overruns();
    println!("  ✅ {} accepted, {} overrun", accepted, overruns);
    assert_eq!(accepted as u32 + overruns as u32, BURST as u32);
    assert_eq!(rig.shared().faults.link_faults(), 0);
    assert_eq!(rig.controller.receiver().raw().throttle, 1000 + (BURST - 1) % 1000);
}

#[test]
fn test_samples_are_taken_or_counted_as_overruns() {
    let mut rig = Rig::new(Protocol::Sbus);
    rig.settle();
    let shared = rig.shared();
    let done = Arc::new(AtomicBool::new(false));

    let producer = {
        let done = done.clone();
        thread::spawn(move || {
            for n in 0..BURST {
                let gyro = (n % 100) as i16;
                let sample = RawInertialSample {
                    accel: LEVEL_ACCEL,
                    temperature: gyro,
                    gyro: [gyro; 3],
                };
                shared.on_sample_transfer(&sample_payload(&sample), Duration::from_micros(120));
            }
            done.store(true, Ordering::Release);
        })
    };

    drain(&mut rig, &done, |rig| {
        let raw = rig.controller.sensor().last_raw();
        assert!(raw.gyro.iter().all(|g| *g == raw.temperature));
    });
    producer.join().unwrap();

    let accepted = rig.controller.sensor().sample_count();
    let overruns = rig.shared().faults.sample_overruns();
    assert_eq!(accepted as u32 + overruns as u32, BURST as u32);
    assert_eq!(rig.shared().faults.sensor_faults(), 0);
}

#[test]
fn test_flags_coalesce_until_serviced() {
    let mut rig = Rig::new(Protocol::Sumd);
    rig.settle();
    for _ in 0..10 {
        rig.shared().events.raise(Event::Battery);
    }
    assert_eq!(rig.poll(), 1);
    assert_eq!(rig.poll(), 0);
    assert!(rig.shared().events.is_idle());
}

#[test]
fn test_host_requests_from_async_client() {
    let mut rig = Rig::new(Protocol::Ibus);
    rig.settle();
    let replies = tokio_test::block_on(async {
        let mut replies = Vec::new();
        for reg in [Register::Version, Register::Ctrl, Register::MotorArmed] {
            rig.host(HostCommand::ReadRegister {
                address: reg.address(),
            });
            tokio::task::yield_now().await;
            if let Some(packet) = rig.hal.host.last() {
                replies.push(u32::from_le_bytes([packet[0], packet[1], packet[2], packet[3]]));
            }
        }
        replies
    });
    assert_eq!(replies, vec![FIRMWARE_VERSION, 34, 150]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tick_task_and_radio_task_share_state() {
    println!("⏱️ Tick and radio tasks against one controller");
    let mut rig = Rig::new(Protocol::Ibus);
    rig.settle();
    let shared = rig.shared();

    let radio = tokio::spawn(async move {
        for n in 0..200u16 {
            shared.on_frame(&frame_for(Protocol::Ibus, &channels(1100 + n)));
            tokio::time::sleep(StdDuration::from_micros(200)).await;
        }
    });
    let ticks = tokio::spawn(async move {
        let mut alarms = 0;
        for _ in 0..50 {
            if shared.on_tick(1).beeper == Some(true) {
                alarms += 1;
            }
            tokio::time::sleep(StdDuration::from_micros(500)).await;
        }
        alarms
    });

    while !(radio.is_finished() && ticks.is_finished()) {
        rig.poll();
        tokio::task::yield_now().await;
    }
    rig.settle();

    radio.await.unwrap();
    // 50 ms never reaches the beeper period
    assert_eq!(ticks.await.unwrap(), 0);
    let accepted = rig.controller.receiver().frame_count() as u32;
    assert_eq!(accepted + rig.shared().faults.frame_overruns() as u32, 200);
    assert_eq!(rig.controller.receiver().raw().throttle, 1299);
}
