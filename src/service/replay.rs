use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use num_complex::Complex;
use serde::{Deserialize, Serialize};

use super::{
    BindRequest, RawSweep, RecordedWindow, SensorService, ServiceBinding, ServiceError, SweepInfo,
};

/// First line of a sweep file: where the recorded sweeps start and how far
/// apart their bins are.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepFileHeader {
    pub start_m: f32,
    pub step_length_m: f32,
}

/// One recorded sweep per line after the header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepRecord {
    Envelope(Vec<u16>),
    Iq(Vec<[f32; 2]>),
}

impl From<SweepRecord> for RawSweep {
    fn from(record: SweepRecord) -> Self {
        match record {
            SweepRecord::Envelope(data) => RawSweep::Envelope(data),
            SweepRecord::Iq(data) => {
                RawSweep::Iq(data.into_iter().map(|[re, im]| Complex::new(re, im)).collect())
            }
        }
    }
}

impl From<&RawSweep> for SweepRecord {
    fn from(sweep: &RawSweep) -> Self {
        match sweep {
            RawSweep::Envelope(data) => SweepRecord::Envelope(data.clone()),
            RawSweep::Iq(data) => SweepRecord::Iq(data.iter().map(|z| [z.re, z.im]).collect()),
        }
    }
}

/// Write sweeps in the JSON-lines format read by [`ReplayService::open`]
pub fn write_sweep_file<W: Write>(
    mut writer: W,
    header: &SweepFileHeader,
    sweeps: &[RawSweep],
) -> Result<(), ServiceError> {
    let line = serde_json::to_string(header).map_err(|e| ServiceError::Source(e.to_string()))?;
    writeln!(writer, "{}", line).map_err(|e| ServiceError::Source(e.to_string()))?;
    for sweep in sweeps {
        let line = serde_json::to_string(&SweepRecord::from(sweep))
            .map_err(|e| ServiceError::Source(e.to_string()))?;
        writeln!(writer, "{}", line).map_err(|e| ServiceError::Source(e.to_string()))?;
    }
    writer.flush().map_err(|e| ServiceError::Source(e.to_string()))
}

/// Sensor service that replays previously recorded sweeps
///
/// Every pull returns the next recorded sweep, cropped to the bound window.
/// When the recording runs out the service reports `Disconnected`, unless
/// looping is enabled.
pub struct ReplayService {
    window: RecordedWindow,
    sweeps: Vec<RawSweep>,
    position: usize,
    looping: bool,
    next_binding: u64,
    active: Option<(u64, usize)>,
    sequence: u64,
}

impl ReplayService {
    /// Replay in-memory sweeps whose bin 0 lies at `start_m`
    pub fn new(start_m: f32, step_length_m: f32, sweeps: Vec<RawSweep>) -> Self {
        Self {
            window: RecordedWindow {
                start_m,
                step_length_m,
            },
            sweeps,
            position: 0,
            looping: false,
            next_binding: 1,
            active: None,
            sequence: 0,
        }
    }

    /// Replay envelope sweeps whose bin 0 lies at `start_m`
    pub fn from_envelopes(start_m: f32, step_length_m: f32, sweeps: Vec<Vec<u16>>) -> Self {
        Self::new(
            start_m,
            step_length_m,
            sweeps.into_iter().map(RawSweep::Envelope).collect(),
        )
    }

    /// Read a JSON-lines sweep file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ServiceError> {
        let file = File::open(path.as_ref()).map_err(|e| ServiceError::Source(e.to_string()))?;
        let mut lines = BufReader::new(file).lines();

        let header_line = lines
            .next()
            .ok_or_else(|| ServiceError::Source("empty sweep file".to_string()))?
            .map_err(|e| ServiceError::Source(e.to_string()))?;
        let header: SweepFileHeader = serde_json::from_str(&header_line)
            .map_err(|e| ServiceError::Source(format!("bad header: {}", e)))?;

        let mut sweeps = Vec::new();
        for (index, line) in lines.enumerate() {
            let line = line.map_err(|e| ServiceError::Source(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: SweepRecord = serde_json::from_str(&line)
                .map_err(|e| ServiceError::Source(format!("bad sweep {}: {}", index + 1, e)))?;
            sweeps.push(record.into());
        }

        log::info!(
            "Loaded {} sweeps starting at {:.3} m, step {:.5} m",
            sweeps.len(),
            header.start_m,
            header.step_length_m
        );
        Ok(Self::new(header.start_m, header.step_length_m, sweeps))
    }

    /// Start over from the first sweep when the recording runs out
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn header(&self) -> SweepFileHeader {
        SweepFileHeader {
            start_m: self.window.start_m,
            step_length_m: self.window.step_length_m,
        }
    }

    /// Sweeps left before the recording runs out
    pub fn remaining(&self) -> usize {
        self.sweeps.len().saturating_sub(self.position)
    }
}

impl SensorService for ReplayService {
    fn bind(&mut self, request: &BindRequest) -> Result<ServiceBinding, ServiceError> {
        let (geometry, offset) = self.window.bind_geometry(request)?;
        let recorded_len = self.sweeps.first().map_or(usize::MAX, RawSweep::len);
        let fits = offset
            .checked_add(geometry.data_length)
            .is_some_and(|end| end <= recorded_len);
        if !fits {
            return Err(ServiceError::Rejected(format!(
                "window {:.3}-{:.3} m exceeds recording of {} bins",
                geometry.start_m,
                geometry.end_m(),
                recorded_len
            )));
        }

        let id = self.next_binding;
        self.next_binding += 1;
        self.active = Some((id, offset));
        Ok(ServiceBinding::new(id, geometry))
    }

    fn pull_sweep(
        &mut self,
        binding: &ServiceBinding,
        sweep: &mut RawSweep,
    ) -> Result<SweepInfo, ServiceError> {
        let offset = match self.active {
            Some((id, offset)) if id == binding.id() => offset,
            _ => return Err(ServiceError::UnknownBinding(binding.id())),
        };

        if self.position >= self.sweeps.len() {
            if !self.looping || self.sweeps.is_empty() {
                return Err(ServiceError::Disconnected);
            }
            self.position = 0;
        }

        let recorded = &self.sweeps[self.position];
        self.position += 1;
        recorded.copy_window_into(offset, binding.geometry().data_length, sweep)?;

        self.sequence += 1;
        Ok(SweepInfo {
            sequence: self.sequence,
            saturated: false,
            missed_data: false,
        })
    }

    fn unbind(&mut self, binding: ServiceBinding) {
        if matches!(self.active, Some((id, _)) if id == binding.id()) {
            self.active = None;
        }
    }
}
