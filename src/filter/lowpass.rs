use super::Coefficients;

/// A time-discrete 2nd order lowpass filter for a series of data values.
///
/// Typically used within a periodic task that takes measurements that need
/// to be filtered, like speed or position values. Not safe to call
/// [`filter`](Self::filter) concurrently with the setters: this type is
/// intended for single-threaded use within one periodic task, the same
/// precondition the original documents.
pub struct LowpassFilter {
    period: f64,
    frequency: f64,
    coefficients: Coefficients,
    x1: f64,
    x2: f64,
}

impl LowpassFilter {
    /// Creates a filter with the default cutoff frequency of 1000 rad/s
    /// and a 1 s sampling period.
    pub fn new() -> Self {
        let period = 1.0;
        let frequency = 1000.0;
        LowpassFilter {
            period,
            frequency,
            coefficients: Coefficients::compute(frequency, period),
            x1: 0.0,
            x2: 0.0,
        }
    }

    /// Zeroes the internal state.
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
    }

    /// Seeds the internal state so the next `filter()` call, assuming a
    /// steady input of `value`, returns `value`.
    pub fn reset_to(&mut self, value: f64) {
        self.x1 = value / (self.frequency * self.frequency);
        self.x2 = 0.0;
    }

    /// Sets the sampling period, given in seconds, and recomputes
    /// coefficients.
    pub fn set_period(&mut self, period: f64) {
        self.period = period;
        self.coefficients = Coefficients::compute(self.frequency, self.period);
    }

    /// Sets the cutoff frequency, given in rad/s, and recomputes
    /// coefficients.
    pub fn set_frequency(&mut self, frequency: f64) {
        self.frequency = frequency;
        self.coefficients = Coefficients::compute(self.frequency, self.period);
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Filters one input sample and returns the filtered output.
    pub fn filter(&mut self, value: f64) -> f64 {
        let c = self.coefficients;
        let x1_old = self.x1;
        let x2_old = self.x2;

        self.x1 = c.a11 * x1_old + c.a12 * x2_old + c.b1 * value;
        self.x2 = c.a21 * x1_old + c.a22 * x2_old + c.b2 * value;

        self.frequency * self.frequency * self.x1
    }
}

impl Default for LowpassFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_response_settles_near_unity() {
        // S1: defaults (omega=1000, h=1). filter(1.0) 20 times.
        let mut filter = LowpassFilter::new();
        let mut output = 0.0;
        for _ in 0..20 {
            output = filter.filter(1.0);
        }
        assert!((output - 1.0).abs() < 1e-6, "output={output}");
    }

    #[test]
    fn reset_to_value_is_exact_on_first_output() {
        let mut filter = LowpassFilter::new();
        filter.reset_to(3.5);
        let output = filter.filter(3.5);
        assert!((output - 3.5).abs() < 1e-9, "output={output}");
    }

    #[test]
    fn reset_zeroes_state() {
        let mut filter = LowpassFilter::new();
        for _ in 0..5 {
            filter.filter(1.0);
        }
        filter.reset();
        let output = filter.filter(0.0);
        assert_eq!(output, 0.0);
    }

    #[test]
    fn retuning_frequency_changes_settling_behaviour() {
        let mut filter = LowpassFilter::new();
        filter.set_frequency(10.0);
        assert_eq!(filter.frequency(), 10.0);

        let mut output = 0.0;
        for _ in 0..2000 {
            output = filter.filter(2.0);
        }
        assert!((output - 2.0).abs() < 1e-3, "output={output}");
    }
}
