use anyhow::Result;
use std::io::Write;

use crate::state::MeasurementReport;

/// Export a measurement as pretty-printed JSON
pub fn export_json<W: Write>(report: &MeasurementReport, mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, report)?;
    writeln!(writer)?;
    Ok(())
}
