use super::{DistanceOutput, Formatter};

pub struct TextFormatter {
    verbose: bool,
}

impl TextFormatter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl Formatter for TextFormatter {
    fn format(&self, output: &DistanceOutput) -> String {
        let peaks = if output.results.is_empty() {
            "-".to_string()
        } else {
            output
                .results
                .iter()
                .map(|r| format!("{:.3} m ({})", r.distance_m, r.amplitude))
                .collect::<Vec<_>>()
                .join(", ")
        };

        if self.verbose {
            let info = output.info;
            let mut flags = Vec::new();
            if info.saturated {
                flags.push("saturated");
            }
            if info.missed_data {
                flags.push("missed");
            }
            format!(
                "Sweep {:>5}: {} [seq: {}, avg: {}, found: {}{}{}]",
                info.sweep_index,
                peaks,
                info.sequence,
                info.sweeps_averaged,
                info.peaks_found,
                if flags.is_empty() { "" } else { ", " },
                flags.join(", ")
            )
        } else {
            format!("Sweep {:>5}: {}", output.info.sweep_index, peaks)
        }
    }
}
