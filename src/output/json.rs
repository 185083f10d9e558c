use serde::Serialize;

use super::{DistanceOutput, Formatter, iso8601_timestamp};
use crate::detector::{DistanceResult, ResultInfo};

pub struct JsonFormatter;

#[derive(Serialize)]
struct JsonLine<'a> {
    ts: String,
    #[serde(flatten)]
    info: &'a ResultInfo,
    results: &'a [DistanceResult],
}

impl Formatter for JsonFormatter {
    fn format(&self, output: &DistanceOutput) -> String {
        let line = JsonLine {
            ts: iso8601_timestamp(),
            info: output.info,
            results: output.results,
        };
        // Serializing plain numbers and strings cannot fail
        serde_json::to_string(&line).unwrap_or_default()
    }
}
