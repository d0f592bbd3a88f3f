use std::sync::Arc;

use super::Channel;
use crate::module::Module;

/// Reads a module's encoder counter with an additive offset:
/// `read() = module.read_encoder_counter(index) + offset`.
///
/// `reset()`/`reset_to()` adjust the offset so the *observed* value becomes
/// zero, or a given value, without touching the underlying hardware count.
pub struct EncoderCounter {
    channel: Channel,
    offset: i32,
}

impl EncoderCounter {
    pub fn new(module: Arc<dyn Module>, number: u16) -> Self {
        module.configure_encoder_counter(number);
        EncoderCounter {
            channel: Channel::new(module, number),
            offset: 0,
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut Channel {
        &mut self.channel
    }

    pub fn set_offset(&mut self, offset: i32) {
        self.offset = offset;
    }

    pub fn offset(&self) -> i32 {
        self.offset
    }

    pub fn read(&self) -> i32 {
        self.channel.module().read_encoder_counter(self.channel.number()) + self.offset
    }

    /// Sets the offset so that `read()` becomes zero.
    pub fn reset(&mut self) {
        self.offset = -self.read();
    }

    /// Sets the offset so that `read()` becomes `value`.
    pub fn reset_to(&mut self, value: i32) {
        self.offset = value - self.read();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubModule {
        raw: i32,
    }

    impl Module for StubModule {
        fn read_encoder_counter(&self, _number: u16) -> i32 {
            self.raw
        }
    }

    #[test]
    fn offsetting_matches_s3_scenario() {
        // S3: stub module returning 1000.
        let module: Arc<dyn Module> = Arc::new(StubModule { raw: 1000 });
        let mut counter = EncoderCounter::new(module, 0);

        assert_eq!(counter.read(), 1000);

        counter.reset();
        assert_eq!(counter.read(), 0);
    }

    #[test]
    fn reset_to_sets_read_to_given_value() {
        let module: Arc<dyn Module> = Arc::new(StubModule { raw: 1000 });
        let mut counter = EncoderCounter::new(module, 0);

        counter.reset_to(42);
        assert_eq!(counter.read(), 42);
    }
}
