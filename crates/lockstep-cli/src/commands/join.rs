//! Join command: joins two JSON-lines record files.

use super::run_pipeline;
use anyhow::{Context, Result};
use lockstep_core::{Config, LogRecord};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

/// Read one `{"key": ..., "value": ...}` object per line; blank lines are skipped.
pub fn read_records(path: &Path) -> Result<Vec<LogRecord>> {
    let file = File::open(path).with_context(|| format!("Failed to read {}", path.display()))?;
    parse_records(BufReader::new(file))
        .with_context(|| format!("Failed to read records from {}", path.display()))
}

fn parse_records<R: BufRead>(reader: R) -> Result<Vec<LogRecord>> {
    let mut records = Vec::new();

    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let record: LogRecord = serde_json::from_str(line)
            .with_context(|| format!("Malformed record on line {}", n + 1))?;
        records.push(record);
    }

    Ok(records)
}

/// Write records as JSON lines.
pub fn write_records<W: Write>(writer: W, records: &[LogRecord]) -> Result<()> {
    let mut writer = BufWriter::new(writer);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Run the join.
pub async fn run(
    config: Config,
    primary: &Path,
    secondary: &Path,
    output: Option<&Path>,
    print_metrics: bool,
) -> Result<()> {
    let primary_records = read_records(primary)?;
    let secondary_records = read_records(secondary)?;

    info!(
        primary = %primary.display(),
        secondary = %secondary.display(),
        primary_records = primary_records.len(),
        secondary_records = secondary_records.len(),
        "Starting join"
    );

    let (outcome, metrics) =
        run_pipeline(config.pipeline, primary_records, secondary_records).await?;

    for result in outcome.results.iter().skip(1) {
        if let Some(err) = &result.error {
            warn!(evaluator = result.evaluator, error = %err, "Evaluator failed");
        }
    }

    let cycles = outcome.cycles;
    let data = outcome.into_data()?;

    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            write_records(file, &data)?;
        }
        None => write_records(io::stdout().lock(), &data)?,
    }

    info!(records = data.len(), cycles, "Join finished");

    if print_metrics {
        eprint!("{}", metrics.export_prometheus_text());
    }

    Ok(())
}
