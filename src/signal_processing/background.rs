use crate::config::BackgroundReducer;
use crate::error::{DetectorError, Result};

/// Calibrated no-target amplitude baseline
///
/// Holds one amplitude per distance bin together with the receiver gain in
/// effect when it was recorded, so that thresholds can be rescaled when the
/// gain changes.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundProfile {
    values: Vec<u16>,
    receiver_gain: f32,
}

impl BackgroundProfile {
    pub fn new(values: Vec<u16>, receiver_gain: f32) -> Self {
        Self {
            values,
            receiver_gain,
        }
    }

    pub fn values(&self) -> &[u16] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn receiver_gain(&self) -> f32 {
        self.receiver_gain
    }

    /// Factor that maps recorded amplitudes to amplitudes at `receiver_gain`
    pub fn gain_scale(&self, receiver_gain: f32) -> f32 {
        if self.receiver_gain > 0.0 {
            receiver_gain / self.receiver_gain
        } else {
            1.0
        }
    }
}

/// Serialize a background profile as little-endian u16 values
pub fn encode_background(values: &[u16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Parse a blob produced by [`encode_background`]
pub fn decode_background(bytes: &[u8]) -> Result<Vec<u16>> {
    if bytes.len() % 2 != 0 {
        return Err(DetectorError::config(
            "background",
            format!("blob length {} is not a whole number of values", bytes.len()),
        ));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Collects background sweeps and reduces them to one profile
pub struct BackgroundRecorder {
    reducer: BackgroundReducer,
    length: usize,
    history: Vec<f32>,
    column: Vec<f32>,
}

impl BackgroundRecorder {
    /// Prepare to record `expected_sweeps` sweeps of `length` bins
    pub fn new(reducer: BackgroundReducer, length: usize, expected_sweeps: usize) -> Self {
        Self {
            reducer,
            length,
            history: Vec::with_capacity(length * expected_sweeps),
            column: Vec::with_capacity(expected_sweeps),
        }
    }

    pub fn add(&mut self, sweep: &[f32]) {
        debug_assert_eq!(sweep.len(), self.length);
        self.history
            .extend((0..self.length).map(|i| sweep.get(i).copied().unwrap_or(0.0)));
    }

    /// Sweeps recorded so far
    pub fn count(&self) -> usize {
        if self.length == 0 {
            0
        } else {
            self.history.len() / self.length
        }
    }

    /// Reduce recorded sweeps per bin into `out`
    pub fn finish_into(&mut self, out: &mut [u16]) {
        let count = self.count();
        if count == 0 {
            out.fill(0);
            return;
        }

        for (bin, slot) in out.iter_mut().enumerate().take(self.length) {
            self.column.clear();
            self.column
                .extend((0..count).map(|sweep| self.history[sweep * self.length + bin]));

            let value = match self.reducer {
                BackgroundReducer::Mean => self.column.iter().sum::<f32>() / count as f32,
                BackgroundReducer::Maximum => self.column.iter().copied().fold(0.0, f32::max),
                BackgroundReducer::Median => {
                    self.column.sort_by(|a, b| a.total_cmp(b));
                    let mid = count / 2;
                    if count % 2 == 0 {
                        (self.column[mid - 1] + self.column[mid]) / 2.0
                    } else {
                        self.column[mid]
                    }
                }
            };
            *slot = super::sweep::to_amplitude(value);
        }
    }
}
