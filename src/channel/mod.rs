//! Typed views onto a [`Module`](crate::module::Module)'s I/O points.
//!
//! Each channel type composes a [`Channel`] (module reference + index +
//! optional name) with the per-type transform spec.md describes: an affine
//! gain/offset for analog channels, an XOR polarity for digital channels,
//! and an additive offset for the encoder counter.
//!
//! A channel holds an `Arc<dyn Module>` rather than a borrowed reference:
//! drivers are long-lived, shared across the thread that owns them and any
//! number of channel views, so reference-counted shared ownership is the
//! natural Rust rendering of "a channel holds a non-owning back-reference
//! to its module; modules outlive channels" (see DESIGN.md).

mod analog_in;
mod analog_out;
mod digital_in;
mod digital_out;
mod encoder_counter;

pub use analog_in::AnalogIn;
pub use analog_out::AnalogOut;
pub use digital_in::DigitalIn;
pub use digital_out::DigitalOut;
pub use encoder_counter::EncoderCounter;

use std::sync::Arc;

use crate::module::Module;

/// Common identity shared by every channel type: the module it belongs to,
/// its index on that module, and an optional human-readable name.
pub struct Channel {
    module: Arc<dyn Module>,
    number: u16,
    name: Option<String>,
}

impl Channel {
    fn new(module: Arc<dyn Module>, number: u16) -> Self {
        Channel {
            module,
            number,
            name: None,
        }
    }

    pub fn module(&self) -> &Arc<dyn Module> {
        &self.module
    }

    pub fn number(&self) -> u16 {
        self.number
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}
