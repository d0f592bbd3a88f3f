use std::sync::Arc;

use super::Channel;
use crate::module::Module;

/// Reads a module's analog input, applying an affine `gain`/`offset`
/// transform: `read() = module.read_analog_in(index) * gain + offset`.
pub struct AnalogIn {
    channel: Channel,
    gain: f32,
    offset: f32,
}

impl AnalogIn {
    pub fn new(module: Arc<dyn Module>, number: u16) -> Self {
        module.configure_analog_in(number);
        AnalogIn {
            channel: Channel::new(module, number),
            gain: 1.0,
            offset: 0.0,
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

    pub fn read(&self) -> f32 {
        self.channel.module().read_analog_in(self.channel.number()) * self.gain + self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    struct StubModule {
        raw: AtomicI32,
    }

    impl Module for StubModule {
        fn read_analog_in(&self, _number: u16) -> f32 {
            self.raw.load(Ordering::SeqCst) as f32
        }
    }

    #[test]
    fn affine_transform_matches_law() {
        let module = Arc::new(StubModule { raw: AtomicI32::new(10) });
        let mut input = AnalogIn::new(module, 0);
        input.set_gain(2.0);
        input.set_offset(3.0);

        assert_eq!(input.read(), 10.0 * 2.0 + 3.0);
    }
}
