//! Slamtec RoboPeak lidar A1 driver.
//!
//! Owns a serial interface and a private handler thread running at maximum
//! thread priority. Measurements are pushed to a registered [`Delegate`]
//! under the driver's mutex; there is no pull-based API.

use std::sync::atomic::{AtomicBool, AtomicI16, Ordering};
use std::sync::{Arc, Mutex};

use crate::serial::SerialPort;
use crate::thread::{self, NamedThread, ThreadHandle};

const STACK_SIZE: usize = 64 * 1024;

const STATE_STOP: i16 = 0;
const STATE_SCAN: i16 = 1;

const HEADER_SIZE: usize = 7;
const DATA_SIZE: usize = 5;

const START_FLAG: u8 = 0xA5;
const SCAN: u8 = 0x20;
const STOP: u8 = 0x25;

const QUALITY_THRESHOLD: f32 = 10.0;
const DISTANCE_THRESHOLD: f32 = 0.01;

/// Receives decoded measurements from an [`RPLidarA1`] driver.
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

/// The state machine body, factored out of the thread loop so it can be
/// driven deterministically in unit tests without a real blocking serial
/// port or a background thread.
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

    /// Runs one iteration of the run loop. Returns `Some(measurement)` when a
    /// full, valid data packet was decoded this call.
    fn step(
        &mut self,
        serial: &mut dyn SerialPort,
        demand: i16,
    ) -> Option<(f32, f32, f32)> {
        match self.state {
            STATE_STOP => {
                if demand == STATE_SCAN {
                    serial.clear_dtr();

                    while serial.readable() {
                        serial.getc();
                    }

                    self.header_counter = 0;
                    self.data_counter = 0;

                    serial.putc(START_FLAG);
                    serial.putc(SCAN);

                    self.state = STATE_SCAN;
                }
                None
            }
            STATE_SCAN => {
                if demand == STATE_STOP {
                    serial.putc(START_FLAG);
                    serial.putc(STOP);
                    serial.set_dtr();
                    self.state = STATE_STOP;
                    None
                } else {
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
                }
            }
            _ => {
                self.state = STATE_STOP;
                None
            }
        }
    }
}

/// Device driver for the Slamtec RoboPeak lidar A1, running its own handler
/// thread over a serial interface.
pub struct RPLidarA1 {
    state_demand: Arc<AtomicI16>,
    delegate: Arc<Mutex<Option<Arc<dyn Delegate>>>>,
    stop_flag: Arc<AtomicBool>,
    handle: Option<ThreadHandle>,
}

impl RPLidarA1 {
    /// Takes ownership of a serial interface configured at 115200 baud,
    /// sets DTR (motor off), and starts the handler thread.
    pub fn new(mut serial: impl SerialPort + 'static) -> Self {
        serial.set_dtr();

        let state_demand = Arc::new(AtomicI16::new(STATE_STOP));
        let delegate: Arc<Mutex<Option<Arc<dyn Delegate>>>> = Arc::new(Mutex::new(None));
        let stop_flag = Arc::new(AtomicBool::new(false));

        let thread_demand = state_demand.clone();
        let thread_delegate = delegate.clone();
        let thread_stop = stop_flag.clone();

        let handle = NamedThread::new("RPLidarA1")
            .with_stack_size(STACK_SIZE)
            .with_priority(thread::MAX_PRIORITY)
            .start(move || run(serial, thread_demand, thread_delegate, thread_stop));

        RPLidarA1 {
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
        self.state_demand.store(STATE_STOP, Ordering::SeqCst);
    }
}

impl Drop for RPLidarA1 {
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

    while !stop_flag.load(Ordering::SeqCst) {
        let demand = state_demand.load(Ordering::SeqCst);
        let idle = machine.state == STATE_STOP && demand != STATE_SCAN;

        if let Some((quality, angle, distance)) = machine.step(&mut serial, demand) {
            if let Some(d) = delegate.lock().unwrap().as_ref() {
                d.receive_measurement(quality, angle, distance);
            }
        }

        if idle {
            thread::sleep_ms(10);
        }
    }
}
