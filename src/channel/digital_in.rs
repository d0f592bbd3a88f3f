use std::sync::Arc;

use super::Channel;
use crate::module::Module;

/// Reads a module's digital input with an invertible polarity:
/// `read() = polarity XOR module.read_digital_in(index)`.
pub struct DigitalIn {
    channel: Channel,
    polarity: bool,
}

impl DigitalIn {
    pub fn new(module: Arc<dyn Module>, number: u16) -> Self {
        module.configure_digital_in(number);
        DigitalIn {
            channel: Channel::new(module, number),
            polarity: false,
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut Channel {
        &mut self.channel
    }

    /// `true` inverts the polarity, `false` is the normal polarity.
    pub fn inverse_polarity(&mut self, polarity: bool) {
        self.polarity = polarity;
    }

    pub fn read(&self) -> bool {
        self.polarity != self.channel.module().read_digital_in(self.channel.number())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StubModule {
        raw: AtomicBool,
    }

    impl Module for StubModule {
        fn read_digital_in(&self, _number: u16) -> bool {
            self.raw.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn polarity_xor_applies_to_read() {
        let module = Arc::new(StubModule { raw: AtomicBool::new(true) });
        let mut input = DigitalIn::new(module, 0);
        assert!(input.read());

        input.inverse_polarity(true);
        assert!(!input.read());
    }
}
