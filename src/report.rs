//! Result output
//!
//! CSV lines look like `<position>, <value>, <value>...`; the position is
//! omitted for whole-stream units. JSON output writes one object per line.

use crate::algorithm::{AlgorithmResult, BinSize};
use crate::batch::Measurement;
use crate::error::{EntropyError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::io::Write;
use std::str::FromStr;

/// Output encoding for reported units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

impl FromStr for OutputFormat {
    type Err = EntropyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" | "ndjson" => Ok(OutputFormat::Json),
            _ => Err(EntropyError::invalid(format!(
                "invalid output format '{}'. Valid options: csv, json",
                s
            ))),
        }
    }
}

/// Writes one line per reported unit
pub struct ReportWriter<W: Write> {
    out: W,
    format: OutputFormat,
    bin_size: BinSize,
    lines: u64,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(out: W, format: OutputFormat, bin_size: BinSize) -> Self {
        ReportWriter {
            out,
            format,
            bin_size,
            lines: 0,
        }
    }

    /// Emit one unit
    pub fn write_unit(&mut self, position: Option<u64>, measurements: &[Measurement<'_>]) -> Result<()> {
        match self.format {
            OutputFormat::Csv => self.write_csv(position, measurements)?,
            OutputFormat::Json => self.write_json(position, measurements)?,
        }
        self.lines += 1;
        Ok(())
    }

    pub fn lines_written(&self) -> u64 {
        self.lines
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_csv(&mut self, position: Option<u64>, measurements: &[Measurement<'_>]) -> Result<()> {
        let mut fields: Vec<String> = Vec::new();
        if let Some(position) = position {
            fields.push(position.to_string());
        }

        for measurement in measurements {
            match measurement.value {
                AlgorithmResult::Scalar(value) => fields.push(format!("{:.6}", value)),
                AlgorithmResult::Distribution(table) => fields.extend(
                    self.bin_size
                        .bin(table)
                        .into_iter()
                        .map(|count| count.to_string()),
                ),
            }
        }

        writeln!(self.out, "{}", fields.join(", "))?;
        Ok(())
    }

    fn write_json(&mut self, position: Option<u64>, measurements: &[Measurement<'_>]) -> Result<()> {
        let mut metrics = Map::new();
        for measurement in measurements {
            let value = match measurement.value {
                AlgorithmResult::Scalar(value) => json!(value),
                AlgorithmResult::Distribution(table) => json!(self.bin_size.bin(table)),
            };
            metrics.insert(measurement.algorithm.name().to_string(), value);
        }

        let line = json!({
            "position": position,
            "metrics": Value::Object(metrics),
        });
        serde_json::to_writer(&mut self.out, &line).map_err(|e| {
            if e.is_io() {
                EntropyError::Io(e.into())
            } else {
                EntropyError::Serialization(e)
            }
        })?;
        writeln!(self.out)?;
        Ok(())
    }
}
