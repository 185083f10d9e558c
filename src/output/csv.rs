use super::{DistanceOutput, Formatter, iso8601_timestamp};

/// One row per reported peak; sweeps without peaks produce one empty row
pub struct CsvFormatter;

impl Formatter for CsvFormatter {
    fn format(&self, output: &DistanceOutput) -> String {
        let ts = iso8601_timestamp();
        let info = output.info;
        let prefix = format!(
            "{},{},{},{}",
            ts, info.sweep_index, info.saturated as u8, info.missed_data as u8
        );

        if output.results.is_empty() {
            return format!("{},,,", prefix);
        }
        output
            .results
            .iter()
            .enumerate()
            .map(|(rank, r)| format!("{},{},{:.4},{}", prefix, rank, r.distance_m, r.amplitude))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn header(&self) -> Option<&'static str> {
        Some("ts,sweep,saturated,missed_data,rank,distance_m,amplitude")
    }
}
