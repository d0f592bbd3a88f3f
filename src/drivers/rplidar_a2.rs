//! Slamtec RoboPeak lidar A2 driver.
//!
//! Adds motor-PWM control and start/stop timing around the A1 protocol:
//! four states `{OFF, START, SCAN, STOP}` gated by an owned [`Timer`] in
//! addition to the demanded state.

use std::sync::atomic::{AtomicBool, AtomicI16, Ordering};
use std::sync::{Arc, Mutex};

use crate::serial::SerialPort;
use crate::thread::{self, NamedThread, ThreadHandle};
use crate::timer::Timer;

const STACK_SIZE: usize = 64 * 1024;

const STATE_OFF: i16 = 0;
const STATE_START: i16 = 1;
const STATE_SCAN: i16 = 2;
const STATE_STOP: i16 = 3;

const HEADER_SIZE: usize = 7;
const DATA_SIZE: usize = 5;

const START_FLAG: u8 = 0xA5;
const STOP: u8 = 0x25;
const SCAN: u8 = 0x20;
const SET_MOTOR_PWM: u8 = 0xF0;

const DEFAULT_MOTOR_PWM: u16 = 200;
const START_DELAY_MS: u32 = 500;
const STOP_DELAY_MS: u32 = 500;

const QUALITY_THRESHOLD: f32 = 10.0;
const DISTANCE_THRESHOLD: f32 = 0.01;

/// Receives decoded measurements from an [`RPLidarA2`] driver.
pub trait Delegate: Send + Sync {
    fn receive_measurement(&self, quality: f32, angle: f32, distance: f32);
}

fn decode(data: &[u8; DATA_SIZE]) -> (f32, f32, f32) {
    let quality = ((data[0] as u16) >> 2) as f32;
    let angle_raw = ((data[1] as u16) | ((data[2] as u16) << 8)) >> 1;
    let angle = 360.0 - (angle_raw as f32) / 64.0;
    let distance = ((data[3] as u16) | ((data[4] as u16) << 8)) as f32 / 4000.0;
    (quality, angle, distance)
}

fn motor_pwm_command(pwm: u16) -> [u8; 6] {
    let lo = (pwm & 0xFF) as u8;
    let hi = ((pwm >> 8) & 0xFF) as u8;
    let mut checksum = 0u8;
    checksum ^= START_FLAG;
    checksum ^= SET_MOTOR_PWM;
    checksum ^= 2;
    checksum ^= lo;
    checksum ^= hi;
    [START_FLAG, SET_MOTOR_PWM, 2, lo, hi, checksum]
}

fn send(serial: &mut dyn SerialPort, bytes: &[u8]) {
    for &b in bytes {
        serial.putc(b);
    }
}

/// The state machine body, factored out for deterministic unit testing.
struct StateMachine {
    state: i16,
    header: [u8; HEADER_SIZE],
    header_counter: usize,
    data: [u8; DATA_SIZE],
    data_counter: usize,
}

impl StateMachine {
    fn new() -> Self {
        StateMachine {
            state: STATE_STOP,
            header: [0u8; HEADER_SIZE],
            header_counter: 0,
            data: [0u8; DATA_SIZE],
            data_counter: 0,
        }
    }

    fn step(
        &mut self,
        serial: &mut dyn SerialPort,
        timer: &mut Timer,
        demand: i16,
    ) -> Option<(f32, f32, f32)> {
        match self.state {
            STATE_OFF => {
                if demand == STATE_SCAN {
                    serial.clear_dtr();
                    send(serial, &motor_pwm_command(DEFAULT_MOTOR_PWM));
                    timer.reset();
                    self.state = STATE_START;
                }
                None
            }
            STATE_START => {
                if demand == STATE_SCAN {
                    if timer.read() > START_DELAY_MS {
                        while serial.readable() {
                            serial.getc();
                        }
                        self.header_counter = 0;
                        self.data_counter = 0;
                        send(serial, &[START_FLAG, SCAN]);
                        self.state = STATE_SCAN;
                    }
                } else if demand == STATE_OFF {
                    send(serial, &motor_pwm_command(0));
                    timer.reset();
                    self.state = STATE_STOP;
                }
                None
            }
            STATE_SCAN => {
                if demand == STATE_OFF {
                    send(serial, &[START_FLAG, STOP]);
                    send(serial, &motor_pwm_command(0));
                    timer.reset();
                    self.state = STATE_STOP;
                    None
                } else if serial.readable() {
                    let c = serial.getc() as u8;

                    if self.header_counter < HEADER_SIZE {
                        self.header[self.header_counter] = c;
                        self.header_counter += 1;
                        None
                    } else {
                        if self.data_counter < DATA_SIZE {
                            self.data[self.data_counter] = c;
                            self.data_counter += 1;
                        }

                        if self.data_counter >= DATA_SIZE {
                            self.data_counter = 0;
                            let (quality, angle, distance) = decode(&self.data);

                            if quality >= QUALITY_THRESHOLD && distance >= DISTANCE_THRESHOLD {
                                Some((quality, angle, distance))
                            } else {
                                None
                            }
                        } else {
                            None
                        }
                    }
                } else {
                    None
                }
            }
            STATE_STOP => {
                if timer.read() > STOP_DELAY_MS {
                    serial.set_dtr();
                    self.state = STATE_OFF;
                }
                None
            }
            _ => {
                self.state = STATE_STOP;
                None
            }
        }
    }
}

/// Device driver for the Slamtec RoboPeak lidar A2, running its own handler
/// thread over a serial interface. Uses the lidar in simple scan mode
/// (2 kHz); express scan is not supported.
pub struct RPLidarA2 {
    state_demand: Arc<AtomicI16>,
    delegate: Arc<Mutex<Option<Arc<dyn Delegate>>>>,
    stop_flag: Arc<AtomicBool>,
    handle: Option<ThreadHandle>,
}

impl RPLidarA2 {
    pub fn new(serial: impl SerialPort + 'static) -> Self {
        let state_demand = Arc::new(AtomicI16::new(STATE_STOP));
        let delegate: Arc<Mutex<Option<Arc<dyn Delegate>>>> = Arc::new(Mutex::new(None));
        let stop_flag = Arc::new(AtomicBool::new(false));

        let thread_demand = state_demand.clone();
        let thread_delegate = delegate.clone();
        let thread_stop = stop_flag.clone();

        let handle = NamedThread::new("RPLidarA2")
            .with_stack_size(STACK_SIZE)
            .with_priority(thread::MAX_PRIORITY)
            .start(move || run(serial, thread_demand, thread_delegate, thread_stop));

        RPLidarA2 {
            state_demand,
            delegate,
            stop_flag,
            handle: Some(handle),
        }
    }

    pub fn set_delegate(&self, delegate: Arc<dyn Delegate>) {
        *self.delegate.lock().unwrap() = Some(delegate);
    }

    pub fn start_scan(&self) {
        self.state_demand.store(STATE_SCAN, Ordering::SeqCst);
    }

    pub fn stop_scan(&self) {
        self.state_demand.store(STATE_OFF, Ordering::SeqCst);
    }
}

impl Drop for RPLidarA2 {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run(
    mut serial: impl SerialPort,
    state_demand: Arc<AtomicI16>,
    delegate: Arc<Mutex<Option<Arc<dyn Delegate>>>>,
    stop_flag: Arc<AtomicBool>,
) {
    let mut machine = StateMachine::new();
    let mut timer = Timer::new();
    timer.start();

    while !stop_flag.load(Ordering::SeqCst) {
        let demand = state_demand.load(Ordering::SeqCst);

        if let Some((quality, angle, distance)) = machine.step(&mut serial, &mut timer, demand) {
            if let Some(d) = delegate.lock().unwrap().as_ref() {
                d.receive_measurement(quality, angle, distance);
            }
        }

        if machine.state != STATE_SCAN {
            thread::sleep_ms(10);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::MockSerialPort;

    fn sample_bytes(quality_raw: u8, angle_raw: u16, distance_raw: u16) -> Vec<u8> {
        vec![
            quality_raw,
            (angle_raw & 0xFF) as u8,
            (angle_raw >> 8) as u8,
            (distance_raw & 0xFF) as u8,
            (distance_raw >> 8) as u8,
        ]
    }

    #[test]
    fn off_to_start_sends_motor_pwm_command() {
        let mut serial = MockSerialPort::new();
        let mut timer = Timer::new();
        timer.start();
        let mut machine = StateMachine::new();
        machine.state = STATE_OFF;

        machine.step(&mut serial, &mut timer, STATE_SCAN);

        assert_eq!(machine.state, STATE_START);
        assert_eq!(serial.output, motor_pwm_command(DEFAULT_MOTOR_PWM).to_vec());
    }

    #[test]
    fn start_waits_for_delay_before_entering_scan() {
        let mut serial = MockSerialPort::new();
        let mut timer = Timer::new();
        // Not started: read() stays at 0, so the delay guard never passes.
        let mut machine = StateMachine::new();
        machine.state = STATE_START;

        machine.step(&mut serial, &mut timer, STATE_SCAN);
        assert_eq!(machine.state, STATE_START);
    }

    #[test]
    fn start_to_off_sends_zero_pwm_command() {
        let mut serial = MockSerialPort::new();
        let mut timer = Timer::new();
        let mut machine = StateMachine::new();
        machine.state = STATE_START;

        machine.step(&mut serial, &mut timer, STATE_OFF);

        assert_eq!(machine.state, STATE_STOP);
        assert_eq!(serial.output, motor_pwm_command(0).to_vec());
    }

    #[test]
    fn scan_to_off_sends_stop_then_motor_off() {
        let mut serial = MockSerialPort::new();
        let mut timer = Timer::new();
        let mut machine = StateMachine::new();
        machine.state = STATE_SCAN;

        machine.step(&mut serial, &mut timer, STATE_OFF);

        assert_eq!(machine.state, STATE_STOP);
        let mut expected = vec![START_FLAG, STOP];
        expected.extend_from_slice(&motor_pwm_command(0));
        assert_eq!(serial.output, expected);
    }

    #[test]
    fn scan_decodes_valid_sample_once_header_is_filled() {
        let mut serial = MockSerialPort::new();
        serial.feed(&[0u8; HEADER_SIZE]);
        serial.feed(&sample_bytes(160, 0, 4000));

        let mut timer = Timer::new();
        let mut machine = StateMachine::new();
        machine.state = STATE_SCAN;

        let mut last = None;
        for _ in 0..(HEADER_SIZE + DATA_SIZE) {
            if let Some(m) = machine.step(&mut serial, &mut timer, STATE_SCAN) {
                last = Some(m);
            }
        }

        assert_eq!(last, Some((40.0, 360.0, 1.0)));
    }

    #[test]
    fn stop_to_off_waits_for_delay_then_sets_dtr() {
        let mut serial = MockSerialPort::new();
        serial.clear_dtr();
        let mut timer = Timer::new();
        let mut machine = StateMachine::new();
        machine.state = STATE_STOP;

        // Timer not running: read() is 0, below STOP_DELAY_MS, so stays put.
        machine.step(&mut serial, &mut timer, STATE_OFF);
        assert_eq!(machine.state, STATE_STOP);
        assert!(!serial.dtr);
    }
}
