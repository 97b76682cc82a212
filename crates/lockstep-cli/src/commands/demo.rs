//! Demo command: joins a generated data set and checks the result.

use super::run_pipeline;
use anyhow::{bail, Result};
use lockstep_core::{Config, LogRecord};
use tracing::info;

const LETTERS: &[u8] = b"abcdefghij";

/// Every three-letter key over `a..j`, valued by the sum of its letter indices.
pub fn expected_records() -> Vec<LogRecord> {
    let mut records = Vec::with_capacity(LETTERS.len().pow(3));
    for (i, &a) in LETTERS.iter().enumerate() {
        for (j, &b) in LETTERS.iter().enumerate() {
            for (k, &c) in LETTERS.iter().enumerate() {
                let key = String::from_utf8_lossy(&[a, b, c]).into_owned();
                records.push(LogRecord::new(key, (i + j + k) as i64));
            }
        }
    }
    records
}

/// Split the expected data into a primary stream shifted by `offset` and a
/// secondary stream carrying `-offset`, so joining them restores it.
pub fn demo_streams(expected: &[LogRecord], offset: i64) -> (Vec<LogRecord>, Vec<LogRecord>) {
    expected
        .iter()
        .map(|record| {
            (
                LogRecord::new(record.key.clone(), record.value + offset),
                LogRecord::new(record.key.clone(), -offset),
            )
        })
        .unzip()
}

/// Run the demo.
pub async fn run(config: Config, offset: i64) -> Result<()> {
    let expected = expected_records();
    let (primary, secondary) = demo_streams(&expected, offset);

    info!(
        records = expected.len(),
        offset,
        batch_size = config.pipeline.batch_size,
        "Starting demo"
    );

    let (outcome, metrics) = run_pipeline(config.pipeline, primary, secondary).await?;

    for result in &outcome.results {
        if let Some(err) = &result.error {
            bail!("Evaluator {} failed: {}", result.evaluator, err);
        }
        if result.data != expected {
            let first_diff = result
                .data
                .iter()
                .zip(&expected)
                .position(|(got, want)| got != want)
                .unwrap_or_else(|| result.data.len().min(expected.len()));
            bail!(
                "Demo output mismatch for evaluator {}: {} records, first difference at {}",
                result.evaluator,
                result.data.len(),
                first_diff
            );
        }
    }

    info!(
        cycles = outcome.cycles,
        evaluators = outcome.results.len(),
        hits = metrics.join_hits_total(),
        misses = metrics.join_misses_total(),
        "Demo output verified"
    );
    println!(
        "Joined {} records in {} cycles across {} evaluator(s)",
        expected.len(),
        outcome.cycles,
        outcome.results.len()
    );

    Ok(())
}
