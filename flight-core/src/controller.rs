//! Main-loop scheduler and pipeline stages

use crate::arming::{ArmingStateMachine, BatteryMonitor};
use crate::config::{ConfigSource, ConfigStore, ConfigValue, ControlWord, MotorTest, Register};
use crate::hal::{
    BatterySense, FlightHal, HostTransport, Indicator, PulseOutput, SensorBus, Storage,
};
use crate::host::{reply, HostCommand};
use crate::mixer::{Mixer, MixerParams, Override};
use crate::pid::{Correction, Gains, RateLimits, Stabilizer};
use crate::receiver::{LinkSync, Receiver};
use crate::sensor::{SampleOutcome, SensorPipeline};
use crate::shaping::{CommandSmoother, Expo, SmoothedCommand};
use crate::sync::{Event, SharedState};
use crate::telemetry::{
    encode_f32, encode_raw_sample, encode_register_byte, encode_u16, DebugCase, DebugSelect,
};
use crate::types::{
    ActuatorCommand, AlarmSource, ArmStatus, FaultKind, HeartbeatSource, IndicatorEvent,
    IndicatorMode, PilotCommand, ScaledSample,
};
use crate::FlightConfig;

/// Link heartbeat period in frames
const LINK_HEARTBEAT_MASK: u16 = 0x7F;
/// Sensor heartbeat period in samples
const SENSOR_HEARTBEAT_MASK: u16 = 0x3FF;

/// Measured durations in microseconds
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Timing {
    /// Sensor bus transfer
    pub transfer_us: u16,
    /// One pass over the pending events
    pub process_us: u16,
}

impl Timing {
    /// Packed form exposed through the time register
    pub fn word(&self) -> u32 {
        ((self.process_us as u32) << 16) | self.transfer_us as u32
    }
}

fn hold(slot: &mut u16, value: u16, max_hold: bool) {
    if !max_hold || value > *slot {
        *slot = value;
    }
}

/// Tricopter flight controller.
///
/// Owns every piece of main-loop state. Interrupt handlers only reach it
/// through the [`SharedState`] it borrows.
pub struct FlightController<'a> {
    shared: &'a SharedState,
    flight: FlightConfig,
    config: ConfigStore,
    config_source: ConfigSource,

    // Derived from the register table on every configuration update
    ctrl: ControlWord,
    debug: DebugSelect,
    motor_test: MotorTest,
    pitch_roll_expo: Expo,
    yaw_expo: Expo,
    vbat_min: f32,

    sensor: SensorPipeline,
    receiver: Receiver,
    link: LinkSync,
    arming: ArmingStateMachine,
    battery: BatteryMonitor,
    smoother: CommandSmoother,
    stabilizer: Stabilizer,
    mixer: Mixer,

    shaped: PilotCommand,
    smoothed: SmoothedCommand,
    correction: Correction,
    output: ActuatorCommand,
    output_override: Override,
    timing: Timing,
    pending_sensor_read: bool,
}

impl<'a> FlightController<'a> {
    /// Load the configuration and queue the boot-time events.
    ///
    /// Derived parameters are built by the first configuration update and
    /// the radio link is aligned by the first resync, both raised here.
    pub fn boot<H: FlightHal>(shared: &'a SharedState, flight: FlightConfig, hal: &mut H) -> Self {
        let (config, config_source) = ConfigStore::load(hal.storage());
        #[cfg(feature = "defmt")]
        defmt::info!("boot: {} link, configuration from {}", flight.protocol, config_source);

        let controller = Self {
            shared,
            flight,
            config,
            config_source,
            ctrl: ControlWord(0),
            debug: DebugSelect::OFF,
            motor_test: MotorTest::default(),
            pitch_roll_expo: Expo::default(),
            yaw_expo: Expo::default(),
            vbat_min: 0.0,
            sensor: SensorPipeline::new(),
            receiver: Receiver::new(flight.protocol),
            link: LinkSync::new(flight.protocol.frame_len(), flight.resync_bound),
            arming: ArmingStateMachine::new(),
            battery: BatteryMonitor::new(),
            smoother: CommandSmoother::new(),
            stabilizer: Stabilizer::new(
                [Gains::default(); 3],
                RateLimits {
                    pitch_roll: 0.0,
                    yaw: 0.0,
                },
            ),
            mixer: Mixer::new(MixerParams {
                motor_start: 0,
                motor_armed: 0,
                throttle_range: 0.0,
                throttle_atten: 0.0,
            }),
            shaped: PilotCommand::default(),
            smoothed: SmoothedCommand::default(),
            correction: Correction::default(),
            output: ActuatorCommand::SAFE,
            output_override: Override::Safe,
            timing: Timing::default(),
            pending_sensor_read: false,
        };

        shared.events.raise(Event::ConfigUpdate);
        shared.events.raise(Event::LinkResync);
        let _ = hal.indicator().signal(IndicatorEvent::Calibrating);
        controller
    }

    /// Service every pending event once, in priority order.
    ///
    /// Returns the number of stages run.
    pub fn poll_once<H: FlightHal>(&mut self, hal: &mut H) -> usize {
        let start = hal.now();
        let mut handled = 0;
        for event in Event::PRIORITY {
            if self.shared.events.take(event) {
                self.dispatch(event, hal);
                handled += 1;
            }
        }
        if handled > 0 {
            let elapsed = hal.now().saturating_duration_since(start).as_micros();
            let elapsed = elapsed.min(u16::MAX as u64) as u16;
            hold(&mut self.timing.process_us, elapsed, self.ctrl.time_maxhold());
        }
        handled
    }

    /// Main loop; idles until the next hardware event whenever nothing is pending
    pub fn run<H: FlightHal>(&mut self, hal: &mut H) -> ! {
        loop {
            self.poll_once(hal);
            if self.shared.events.is_idle() {
                hal.wait_for_event();
            }
        }
    }

    fn dispatch<H: FlightHal>(&mut self, event: Event, hal: &mut H) {
        match event {
            Event::ConfigUpdate => self.apply_config(hal),
            Event::LinkTimeout => self.on_link_timeout(hal),
            Event::SensorTimeout => self.on_sensor_timeout(hal),
            Event::LinkResync => self.on_resync(hal),
            Event::Command => self.on_frame(hal),
            Event::Sample => self.on_sample(hal),
            Event::Actuator => self.on_actuator(hal),
            Event::Battery => self.on_battery(hal),
            Event::Host => self.on_host(hal),
        }
    }

    fn apply_config<H: FlightHal>(&mut self, hal: &mut H) {
        let cfg = &self.config;
        let ctrl = cfg.ctrl();
        self.ctrl = ctrl;
        self.debug = DebugSelect::from_word(cfg.word(Register::Debug));
        self.motor_test = cfg.motor_test();
        self.pitch_roll_expo = Expo::new(cfg.float(Register::PitchRollExpo));
        self.yaw_expo = Expo::new(cfg.float(Register::YawExpo));
        self.vbat_min = cfg.float(Register::VbatMin);

        let gains = |p, i, d| Gains {
            p: cfg.float(p),
            i: cfg.float(i),
            d: cfg.float(d),
        };
        self.stabilizer.configure(
            [
                gains(Register::PitchP, Register::PitchI, Register::PitchD),
                gains(Register::RollP, Register::RollI, Register::RollD),
                gains(Register::YawP, Register::YawI, Register::YawD),
            ],
            RateLimits {
                pitch_roll: cfg.float(Register::PitchRollRate),
                yaw: cfg.float(Register::YawRate),
            },
            ctrl.reset_integral_on_disarm(),
        );
        self.mixer.set_params(MixerParams {
            motor_start: cfg.word(Register::MotorStart),
            motor_armed: cfg.word(Register::MotorArmed),
            throttle_range: cfg.float(Register::ThrottleRange),
            throttle_atten: cfg.float(Register::ThrottleAtten),
        });
        self.receiver.set_verify_checksum(ctrl.verify_checksum());

        self.shared.set_sensor_host_control(ctrl.sensor_host_control());
        self.shared.alarms.set(AlarmSource::Host, ctrl.beep_test());
        let _ = hal
            .indicator()
            .signal(IndicatorEvent::Mode(ctrl.indicator_mode()));
    }

    fn on_link_timeout<H: FlightHal>(&mut self, hal: &mut H) {
        #[cfg(feature = "defmt")]
        defmt::warn!("radio link timeout");
        self.arming.force_disarm();
        self.shared.alarms.set(AlarmSource::Link, true);
        // a failed resync leaves reception off; retry once per timeout period
        if !self.link.is_receiving() {
            self.shared.events.raise(Event::LinkResync);
        }
        let _ = hal
            .indicator()
            .signal(IndicatorEvent::Fault(FaultKind::LinkTimeout));
    }

    fn on_sensor_timeout<H: FlightHal>(&mut self, hal: &mut H) {
        #[cfg(feature = "defmt")]
        defmt::warn!("inertial sensor timeout");
        self.shared.alarms.set(AlarmSource::Sensor, true);
        let _ = hal
            .indicator()
            .signal(IndicatorEvent::Fault(FaultKind::SensorTimeout));
        self.shared.events.raise(Event::Actuator);
    }

    fn on_resync<H: FlightHal>(&mut self, hal: &mut H) {
        #[cfg(feature = "defmt")]
        defmt::debug!("radio resync");
        match self.link.resync(hal) {
            Ok(_outcome) => {
                #[cfg(feature = "defmt")]
                defmt::debug!("radio resync: {}", _outcome);
            }
            Err(_) => self.shared.faults.record_link_fault(),
        }
    }

    fn on_frame<H: FlightHal>(&mut self, hal: &mut H) {
        let Some(frame) = self.shared.take_frame() else {
            return;
        };
        if self.receiver.accept(&frame).is_err() {
            self.shared.faults.record_link_fault();
            self.shared.events.raise(Event::LinkResync);
            let _ = hal
                .indicator()
                .signal(IndicatorEvent::Fault(FaultKind::LinkFrame));
            return;
        }
        self.shared.feed_link_watchdog();
        self.shared.alarms.set(AlarmSource::Link, false);

        let count = self.receiver.frame_count();
        let raw = *self.receiver.raw();
        let cmd = self.receiver.command();
        self.arming.update(cmd.armed, cmd.throttle);
        self.shaped = PilotCommand {
            aileron: self.pitch_roll_expo.apply(cmd.aileron),
            elevator: self.pitch_roll_expo.apply(cmd.elevator),
            rudder: self.yaw_expo.apply(cmd.rudder),
            ..cmd
        };

        if self.debug.wants(DebugCase::RawChannels, count) {
            send(hal, &encode_u16(raw.to_array()));
        }
        self.shared.alarms.set(AlarmSource::User, cmd.aux > 0.5);
        self.heartbeat(hal, HeartbeatSource::Link, count, LINK_HEARTBEAT_MASK);
    }

    fn on_sample<H: FlightHal>(&mut self, hal: &mut H) {
        let Some(transfer) = self.shared.take_sample() else {
            return;
        };
        if self.shared.sensor_host_control() {
            if self.pending_sensor_read {
                self.pending_sensor_read = false;
                let value = transfer.payload.first().copied().unwrap_or(0);
                send(hal, &encode_register_byte(value));
            }
            return;
        }

        let outcome = match self.sensor.process(&transfer.payload) {
            Ok(outcome) => outcome,
            Err(_) => {
                self.shared.faults.record_sensor_fault();
                let _ = hal
                    .indicator()
                    .signal(IndicatorEvent::Fault(FaultKind::SensorSample));
                return;
            }
        };
        self.shared.feed_sensor_watchdog();
        self.shared.clear_sensor_timeout();
        self.shared.alarms.set(AlarmSource::Sensor, false);
        hold(
            &mut self.timing.transfer_us,
            transfer.transfer_us,
            self.ctrl.time_maxhold(),
        );

        let count = self.sensor.sample_count();
        if self.debug.wants(DebugCase::RawSensor, count) {
            send(hal, &encode_raw_sample(self.sensor.last_raw()));
        }
        self.smoothed = self.smoother.update(&self.shaped);

        match outcome {
            SampleOutcome::Calibrating => {}
            SampleOutcome::Calibrated => {
                #[cfg(feature = "defmt")]
                defmt::info!("gyro calibration done");
                let _ = hal.indicator().signal(IndicatorEvent::Calibrated);
            }
            SampleOutcome::Ready(sample) => self.stabilize(hal, &sample, count),
        }

        self.heartbeat(hal, HeartbeatSource::Sensor, count, SENSOR_HEARTBEAT_MASK);
        self.shared.events.raise(Event::Actuator);
    }

    fn stabilize<H: FlightHal>(&mut self, hal: &mut H, sample: &ScaledSample, count: u16) {
        if self.debug.wants(DebugCase::ScaledSensor, count) {
            let [gx, gy, gz] = sample.gyro;
            let [ax, ay, az] = sample.accel;
            send(hal, &encode_f32([gx, gy, gz, ax, ay, az, sample.temperature]));
        }
        let s = self.smoothed;
        if self.debug.wants(DebugCase::SmoothedCommands, count) {
            send(
                hal,
                &encode_f32([
                    s.throttle,
                    s.aileron,
                    s.elevator,
                    s.rudder,
                    self.arming.armed(),
                    self.shaped.aux,
                ]),
            );
        }

        self.correction = self
            .stabilizer
            .update(&s, &sample.gyro, self.arming.is_armed());
        if self.debug.wants(DebugCase::PidOutputs, count) {
            let c = self.correction;
            send(hal, &encode_f32([c.pitch, c.roll, c.yaw]));
        }

        let computed = self.mixer.update(s.throttle, &self.correction);
        if self.debug.wants(DebugCase::MixerOutputs, count) {
            let mix = self.mixer.last_mix();
            send(
                hal,
                &encode_f32([mix.motors[0], mix.motors[1], mix.motors[2], mix.servo]),
            );
        }
        if self.debug.wants(DebugCase::MotorOutputs, count) {
            let [m0, m1, m2] = computed.motors;
            send(hal, &encode_u16([m0, m1, m2, computed.servo]));
        }
    }

    fn on_actuator<H: FlightHal>(&mut self, hal: &mut H) {
        let safe = !self.arming.is_armed()
            || self.shared.sensor_timed_out()
            || !self.sensor.is_calibrated();
        let (command, reason) = self.mixer.output(self.motor_test, safe);
        if reason != self.output_override {
            #[cfg(feature = "defmt")]
            defmt::info!("actuator override {} -> {}", self.output_override, reason);
            self.output_override = reason;
        }
        if hal.pulses().write(&command).is_err() {
            #[cfg(feature = "defmt")]
            defmt::warn!("pulse output rejected {}", command);
        }
        self.output = command;
    }

    fn on_battery<H: FlightHal>(&mut self, hal: &mut H) {
        let Ok(raw) = hal.battery().read_raw() else {
            return;
        };
        let was_low = self.battery.is_low(self.vbat_min);
        let voltage = self.battery.update(raw);
        self.config.set(Register::Vbat, ConfigValue::Float(voltage));

        if self.debug.wants(DebugCase::Battery, self.battery.sample_count()) {
            send(hal, &encode_f32([voltage]));
        }
        let low = self.battery.is_low(self.vbat_min);
        if low && !was_low {
            #[cfg(feature = "defmt")]
            defmt::warn!("battery low: {} V", voltage);
        }
        self.shared.alarms.set(AlarmSource::Battery, low);
    }

    fn on_host<H: FlightHal>(&mut self, hal: &mut H) {
        let Some(request) = self.shared.take_request() else {
            return;
        };
        let Ok(command) = HostCommand::parse(&request) else {
            return;
        };
        match command {
            HostCommand::ReadRegister { address } => {
                self.refresh_diagnostics();
                if let Ok(bits) = self.config.read(address) {
                    send(hal, &reply(bits));
                }
            }
            HostCommand::WriteRegister { address, bits } => {
                match self.config.write(address, bits) {
                    Ok(_) => self.shared.events.raise(Event::ConfigUpdate),
                    Err(_e) => {
                        #[cfg(feature = "defmt")]
                        defmt::warn!("host write ignored: {}", _e);
                    }
                }
            }
            HostCommand::SensorRead { register } => {
                self.pending_sensor_read = true;
                if hal.sensor().read_register(register).is_err() {
                    self.pending_sensor_read = false;
                    self.shared.faults.record_sensor_fault();
                }
            }
            HostCommand::SensorWrite { register, value } => {
                if hal.sensor().write_register(register, value).is_err() {
                    self.shared.faults.record_sensor_fault();
                }
            }
            HostCommand::StorageRead { index } => {
                if let Ok(word) = hal.storage().read_word(index as u16) {
                    send(hal, &reply(word));
                }
            }
            HostCommand::StorageWrite { index, value } => {
                let _ = hal.storage().write_word(index as u16, value);
            }
            HostCommand::StorageErase => {
                let _ = hal.storage().erase_page();
            }
        }
    }

    /// Copy the fault counters and timings into their read-only registers
    fn refresh_diagnostics(&mut self) {
        self.config
            .set(Register::Error, ConfigValue::Word(self.shared.faults.error_word()));
        self.config
            .set(Register::Time, ConfigValue::Word(self.timing.word()));
    }

    fn heartbeat<H: FlightHal>(&self, hal: &mut H, source: HeartbeatSource, count: u16, mask: u16) {
        if self.ctrl.indicator_mode() != IndicatorMode::Heartbeat {
            return;
        }
        let phase = count & mask;
        let half = mask / 2 + 1;
        if phase == 0 || phase == half {
            let _ = hal.indicator().signal(IndicatorEvent::Heartbeat {
                source,
                on: phase == 0,
            });
        }
    }

    // ---- inspection ----

    pub fn shared(&self) -> &SharedState {
        self.shared
    }

    pub fn flight_config(&self) -> &FlightConfig {
        &self.flight
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn config_source(&self) -> ConfigSource {
        self.config_source
    }

    pub fn arm_status(&self) -> ArmStatus {
        self.arming.status()
    }

    pub fn armed(&self) -> f32 {
        self.arming.armed()
    }

    pub fn is_calibrated(&self) -> bool {
        self.sensor.is_calibrated()
    }

    pub fn sensor(&self) -> &SensorPipeline {
        &self.sensor
    }

    pub fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    /// Pilot command after expo shaping
    pub fn shaped_command(&self) -> &PilotCommand {
        &self.shaped
    }

    pub fn smoothed_command(&self) -> &SmoothedCommand {
        &self.smoothed
    }

    pub fn correction(&self) -> &Correction {
        &self.correction
    }

    /// Last command written to the pulse generator
    pub fn output(&self) -> ActuatorCommand {
        self.output
    }

    /// Override applied to the last actuator command
    pub fn output_override(&self) -> Override {
        self.output_override
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn battery_voltage(&self) -> f32 {
        self.battery.voltage()
    }
}

fn send<H: FlightHal>(hal: &mut H, packet: &[u8]) {
    if hal.host().send(packet).is_err() {
        #[cfg(feature = "defmt")]
        defmt::debug!("host transport busy, {} bytes dropped", packet.len());
    }
}
