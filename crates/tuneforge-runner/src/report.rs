//! Verbose and CSV reporting of tuning results.

use crate::results::{TuningResult, ValidationStatus};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// Unit used when printing durations in the verbose report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
}

impl TimeUnit {
    fn divisor(&self) -> f64 {
        match self {
            TimeUnit::Nanoseconds => 1.0,
            TimeUnit::Microseconds => 1_000.0,
            TimeUnit::Milliseconds => 1_000_000.0,
            TimeUnit::Seconds => 1_000_000_000.0,
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds => "ns",
            TimeUnit::Microseconds => "us",
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Seconds => "s",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReportOptions {
    pub time_unit: TimeUnit,
    /// Include invalid and failed results in the output.
    pub print_invalid: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            time_unit: TimeUnit::Milliseconds,
            print_invalid: true,
        }
    }
}

/// Formats recorded results for humans or spreadsheets.
#[derive(Debug, Default)]
pub struct Reporter {
    options: ReportOptions,
}

impl Reporter {
    pub fn new(options: ReportOptions) -> Self {
        Self { options }
    }

    /// Human-oriented listing, one block per result in insertion order.
    pub fn write_verbose(&self, out: &mut dyn Write, results: &[TuningResult]) -> io::Result<()> {
        let unit = self.options.time_unit;
        for result in self.selected(results) {
            write!(
                out,
                "kernel {}: {} in {:.3} {}",
                result.kernel_name,
                result.status,
                result.duration_ns as f64 / unit.divisor(),
                unit.suffix()
            )?;
            if let Some(overhead_ns) = result.overhead_ns {
                write!(
                    out,
                    " (+{:.3} {} overhead)",
                    overhead_ns as f64 / unit.divisor(),
                    unit.suffix()
                )?;
            }
            writeln!(out, ", {}", result.configuration)?;
            if let Some(message) = &result.error_message {
                writeln!(out, "    {}", message)?;
            }
        }
        Ok(())
    }

    /// CSV listing: parameter names in declaration order, then `DurationNs`,
    /// `Status` and `ErrorMessage`. The header follows the same order.
    pub fn write_csv(&self, out: &mut dyn Write, results: &[TuningResult]) -> io::Result<()> {
        let Some(first) = results.first() else {
            return Ok(());
        };

        for pair in first.configuration.values() {
            write!(out, "{},", csv_field(&pair.name))?;
        }
        writeln!(out, "DurationNs,Status,ErrorMessage")?;

        for result in self.selected(results) {
            for pair in result.configuration.values() {
                write!(out, "{},", pair.value)?;
            }
            writeln!(
                out,
                "{},{},{}",
                result.duration_ns,
                result.status,
                csv_field(result.error_message.as_deref().unwrap_or(""))
            )?;
        }
        Ok(())
    }

    fn selected<'a>(
        &self,
        results: &'a [TuningResult],
    ) -> impl Iterator<Item = &'a TuningResult> {
        let print_invalid = self.options.print_invalid;
        results
            .iter()
            .filter(move |result| print_invalid || result.status == ValidationStatus::Valid)
    }
}

// Quotes a field when it would break the row.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
