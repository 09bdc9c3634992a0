use std::io::Write;

use crate::state::{MeasurementReport, ProbeSample};

/// Generate a human-readable text report
pub fn generate_report<W: Write>(report: &MeasurementReport, mut writer: W) -> std::io::Result<()> {
    match report.resolved {
        Some(ip) => writeln!(writer, "conncheck report for {} ({})", report.target, ip)?,
        None => writeln!(writer, "conncheck report for {}", report.target)?,
    }
    writeln!(writer, "Started: {}", report.started_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
    writeln!(
        writer,
        "Probes: {} every {:.1}s, timeout {:.1}s",
        report.config.count,
        report.config.interval.as_secs_f64(),
        report.config.timeout.as_secs_f64()
    )?;
    writeln!(writer)?;

    writeln!(writer, "{:>3}  {:>5}  {:>10}", "#", "Seq", "RTT")?;
    writeln!(writer, "{}", "-".repeat(22))?;

    for record in &report.records {
        let rtt = match record.sample {
            ProbeSample::Reply { rtt } => format!("{:.1}ms", rtt.as_secs_f64() * 1000.0),
            ProbeSample::Lost { reason } => reason.label().to_string(),
        };
        writeln!(writer, "{:>3}  {:>5}  {:>10}", record.slot + 1, record.sequence, rtt)?;
    }

    writeln!(writer)?;
    writeln!(writer, "Loss: {:.1}%", report.loss_pct())?;
    if let Some(worst) = report.worst_rtt() {
        writeln!(writer, "Worst RTT: {:.1}ms", worst.as_secs_f64() * 1000.0)?;
    }
    if let Some(ref error) = report.error {
        writeln!(writer, "Error: {}", error)?;
    }
    match report.verdict {
        Some(verdict) => writeln!(writer, "Quality: {}", verdict)?,
        None => writeln!(writer, "Quality: unknown (cancelled)")?,
    }

    Ok(())
}
