use std::sync::Arc;

use super::Channel;
use crate::module::Module;

/// Writes a module's analog output, applying an affine `gain`/`offset`
/// transform on write and caching the last *unscaled* value written so
/// that `read()` returns what the caller wrote, not the scaled value sent
/// downstream.
pub struct AnalogOut {
    channel: Channel,
    gain: f32,
    offset: f32,
    value: f32,
}

impl AnalogOut {
    pub fn new(module: Arc<dyn Module>, number: u16) -> Self {
        module.configure_analog_out(number);
        AnalogOut {
            channel: Channel::new(module, number),
            gain: 1.0,
            offset: 0.0,
            value: 0.0,
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut Channel {
        &mut self.channel
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn set_offset(&mut self, offset: f32) {
        self.offset = offset;
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    /// Stores `value` and writes `value * gain + offset` to the module.
    pub fn write(&mut self, value: f32) {
        self.value = value;
        self.channel
            .module()
            .write_analog_out(self.channel.number(), value * self.gain + self.offset);
    }

    /// Returns the last *unscaled* value passed to [`write`](Self::write).
    pub fn read(&self) -> f32 {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct StubModule {
        last_physical: Mutex<f32>,
    }

    impl Module for StubModule {
        fn write_analog_out(&self, _number: u16, value: f32) {
            *self.last_physical.lock().unwrap() = value;
        }
    }

    #[test]
    fn write_then_read_returns_unscaled_value() {
        let module = Arc::new(StubModule { last_physical: Mutex::new(0.0) });
        let mut out = AnalogOut::new(module.clone(), 0);
        out.set_gain(2.0);
        out.set_offset(1.0);

        out.write(5.0);

        assert_eq!(out.read(), 5.0);
        assert_eq!(*module.last_physical.lock().unwrap(), 5.0 * 2.0 + 1.0);
    }
}
