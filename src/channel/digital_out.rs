use std::sync::Arc;

use super::Channel;
use crate::module::Module;

/// Writes a module's digital output with an invertible polarity applied on
/// write, caching the last value written so `read()` returns what the
/// caller wrote.
pub struct DigitalOut {
    channel: Channel,
    polarity: bool,
    value: bool,
}

impl DigitalOut {
    pub fn new(module: Arc<dyn Module>, number: u16) -> Self {
        module.configure_digital_out(number);
        DigitalOut {
            channel: Channel::new(module, number),
            polarity: false,
            value: false,
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut Channel {
        &mut self.channel
    }

    pub fn inverse_polarity(&mut self, polarity: bool) {
        self.polarity = polarity;
    }

    /// Stores `value` and writes `polarity XOR value` to the module.
    pub fn write(&mut self, value: bool) {
        self.value = value;
        self.channel
            .module()
            .write_digital_out(self.channel.number(), self.polarity != value);
    }

    pub fn read(&self) -> bool {
        self.value
    }
}
