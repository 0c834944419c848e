//! Cost of one sample through the control path

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use flight_core::pid::{Gains, RateLimits, Stabilizer};
use flight_core::receiver::Receiver;
use flight_core::shaping::{Expo, SmoothedCommand};
use flight_core::test_utils::{frame_for, Rig, IDLE_STICKS};
use flight_core::types::PilotCommand;
use flight_core::Protocol;

fn armed_rig() -> Rig {
    let mut rig = Rig::new(Protocol::Ibus);
    rig.settle();
    rig.calibrate([0; 3]);
    rig.unlock();
    rig.send_command(&PilotCommand {
        throttle: 0.5,
        armed: 1.0,
        ..IDLE_STICKS
    });
    rig
}

fn bench_sample_cycle(c: &mut Criterion) {
    let mut rig = armed_rig();
    let mut n = 0i16;
    c.bench_function("sample to actuator", |b| {
        b.iter(|| {
            n = (n + 1) % 64;
            rig.send_sample(black_box([n, -n, n / 2]));
        })
    });
}

fn bench_frame_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame decode");
    for protocol in [Protocol::Ibus, Protocol::Sumd, Protocol::Sbus] {
        let frame = frame_for(protocol, &protocol.raw_from(&IDLE_STICKS));
        let mut rx = Receiver::new(protocol);
        rx.set_verify_checksum(true);
        group.bench_function(format!("{:?}", protocol), |b| {
            b.iter(|| rx.accept(black_box(&frame)).is_ok())
        });
    }
    group.finish();
}

fn bench_stabilizer(c: &mut Criterion) {
    let gains = Gains {
        p: 4.0,
        i: 0.005,
        d: 0.0,
    };
    let mut stab = Stabilizer::new(
        [gains; 3],
        RateLimits {
            pitch_roll: 1200.0,
            yaw: 1200.0,
        },
    );
    let cmd = SmoothedCommand::default();
    c.bench_function("stabilizer step", |b| {
        b.iter(|| stab.update(black_box(&cmd), black_box(&[1.5, -2.0, 0.25]), true))
    });

    let expo = Expo::new(4.0);
    c.bench_function("expo", |b| b.iter(|| expo.apply(black_box(0.37))));
}

criterion_group!(benches, bench_sample_cycle, bench_frame_decode, bench_stabilizer);
criterion_main!(benches);
