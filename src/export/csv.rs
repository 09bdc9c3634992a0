use anyhow::Result;
use std::io::Write;

use crate::state::{MeasurementReport, ProbeSample};

/// Export a measurement to CSV, one row per probe
pub fn export_csv<W: Write>(report: &MeasurementReport, mut writer: W) -> Result<()> {
    writeln!(writer, "target,slot,sequence,outcome,rtt_ms,verdict")?;

    let target = escape_csv(&report.target);
    let verdict = report.verdict.map(|v| v.label()).unwrap_or("");

    for record in &report.records {
        let (outcome, rtt) = match record.sample {
            ProbeSample::Reply { rtt } => ("reply", format!("{:.2}", rtt.as_secs_f64() * 1000.0)),
            ProbeSample::Lost { reason } => (reason.label(), String::new()),
        };

        writeln!(
            writer,
            "{},{},{},{},{},{}",
            target,
            record.slot,
            record.sequence,
            escape_csv(outcome),
            rtt,
            verdict
        )?;
    }

    Ok(())
}

/// Escape a string for CSV (quote if contains comma, quote, or newline)
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
