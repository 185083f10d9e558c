/// Keep every `factor`-th bin of `input`, starting with bin 0
///
/// The output has `ceil(input.len() / factor)` bins.
pub fn decimate_into(input: &[f32], factor: usize, out: &mut Vec<f32>) {
    out.clear();
    out.extend(input.iter().step_by(factor.max(1)).copied());
}

/// Round an amplitude to the nearest representable envelope value
pub fn to_amplitude(value: f32) -> u16 {
    value.round().clamp(0.0, u16::MAX as f32) as u16
}

/// Convert a processed sweep back to envelope amplitudes
pub fn to_amplitudes_into(input: &[f32], out: &mut Vec<u16>) {
    out.clear();
    out.extend(input.iter().map(|&v| to_amplitude(v)));
}

/// Per-bin average over consecutive sweeps
///
/// Accumulates sweeps of a fixed length and produces their arithmetic mean.
/// Storage is allocated once, so averaging at sweep rate does not allocate.
pub struct SweepAverager {
    sum: Vec<f32>,
    count: usize,
}

impl SweepAverager {
    /// Create an averager for sweeps of `length` bins
    pub fn new(length: usize) -> Self {
        Self {
            sum: vec![0.0; length],
            count: 0,
        }
    }

    /// Add a sweep to the running sum
    ///
    /// Bins beyond the averager length are ignored.
    pub fn add(&mut self, sweep: &[f32]) {
        for (acc, &value) in self.sum.iter_mut().zip(sweep) {
            *acc += value;
        }
        self.count += 1;
    }

    /// Number of sweeps accumulated since the last reset
    pub fn count(&self) -> usize {
        self.count
    }

    /// Write the mean of the accumulated sweeps into `out`
    pub fn average_into(&self, out: &mut Vec<f32>) {
        let count = self.count.max(1) as f32;
        out.clear();
        out.extend(self.sum.iter().map(|&s| s / count));
    }

    pub fn reset(&mut self) {
        self.sum.fill(0.0);
        self.count = 0;
    }
}
