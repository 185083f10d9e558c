use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use super::{
    BindRequest, RawSweep, RecordedWindow, SensorService, ServiceBinding, ServiceError, SweepInfo,
};

/// Sensor service fed by a producer thread over a bounded channel
///
/// The producer sends full-range sweeps whose bin 0 lies at `start_m`;
/// each pull blocks up to `timeout` for the next one and crops it to the
/// bound window.
pub struct ChannelService {
    rx: Receiver<RawSweep>,
    window: RecordedWindow,
    timeout: Duration,
    next_binding: u64,
    active: Option<(u64, usize)>,
    sequence: u64,
    incoming: RawSweep,
}

impl ChannelService {
    pub fn new(rx: Receiver<RawSweep>, start_m: f32, step_length_m: f32, timeout: Duration) -> Self {
        Self {
            rx,
            window: RecordedWindow {
                start_m,
                step_length_m,
            },
            timeout,
            next_binding: 1,
            active: None,
            sequence: 0,
            incoming: RawSweep::default(),
        }
    }

    /// Create a service together with the sender a producer thread should use
    pub fn pair(
        start_m: f32,
        step_length_m: f32,
        capacity: usize,
        timeout: Duration,
    ) -> (Sender<RawSweep>, Self) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (tx, Self::new(rx, start_m, step_length_m, timeout))
    }
}

impl SensorService for ChannelService {
    fn bind(&mut self, request: &BindRequest) -> Result<ServiceBinding, ServiceError> {
        let (geometry, offset) = self.window.bind_geometry(request)?;
        let id = self.next_binding;
        self.next_binding += 1;
        self.active = Some((id, offset));
        log::debug!(
            "Channel service bound sensor {} as binding {}",
            request.sensor,
            id
        );
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

        self.incoming = match self.rx.recv_timeout(self.timeout) {
            Ok(data) => data,
            Err(RecvTimeoutError::Timeout) => return Err(ServiceError::Timeout(self.timeout)),
            Err(RecvTimeoutError::Disconnected) => return Err(ServiceError::Disconnected),
        };
        self.incoming
            .copy_window_into(offset, binding.geometry().data_length, sweep)?;

        self.sequence += 1;
        Ok(SweepInfo {
            sequence: self.sequence,
            saturated: false,
            // A full queue means the producer is being held back
            missed_data: self.rx.is_full(),
        })
    }

    fn unbind(&mut self, binding: ServiceBinding) {
        if matches!(self.active, Some((id, _)) if id == binding.id()) {
            self.active = None;
        }
    }
}
