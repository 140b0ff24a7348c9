//! Sentrix Replay
//!
//! Reads JSON-lines observations from stdin, runs them in order through the
//! entity pipeline and writes emitted alerts to stdout as JSON lines.
//!
//! Usage: `replay [--events] < observations.jsonl`

use dotenvy::dotenv;
use sentrix::config::EngineConfig;
use sentrix::core::pipeline::{EntityPipeline, ObservationStatus};
use sentrix::ingest::normalizer::RawObservation;
use sentrix::logging;
use sentrix::services::publisher::PublishEvent;
use std::io::{self, BufRead, BufWriter, Write};
use std::sync::Arc;
use tracing::{info, warn};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    logging::init_stderr_logging();

    let with_events = std::env::args().skip(1).any(|arg| arg == "--events");
    let config = EngineConfig::from_env()?;
    let mut pipeline = EntityPipeline::new(Arc::new(config));

    let stdin = io::stdin();
    let mut out = BufWriter::new(io::stdout().lock());
    let (mut lines, mut rejected, mut alerts) = (0u64, 0u64, 0u64);

    for (index, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        lines += 1;

        let observation = match serde_json::from_str::<RawObservation>(&line)
            .map_err(|e| e.to_string())
            .and_then(|raw| raw.into_observation().map_err(|e| e.to_string()))
        {
            Ok(observation) => observation,
            Err(e) => {
                rejected += 1;
                warn!(line = index + 1, error = %e, "skipping observation");
                continue;
            }
        };

        let outcome = pipeline.process(observation);
        if outcome.status != ObservationStatus::Processed {
            warn!(line = index + 1, status = ?outcome.status, "observation not processed");
        }

        if with_events {
            for record in outcome.events {
                writeln!(out, "{}", serde_json::to_string(&PublishEvent::Signal(record))?)?;
            }
        }
        for alert in outcome.alerts {
            alerts += 1;
            writeln!(out, "{}", serde_json::to_string(&PublishEvent::Alert(alert))?)?;
        }
    }
    out.flush()?;

    info!(
        lines,
        rejected,
        alerts,
        entities = pipeline.entity_count(),
        "replay finished"
    );
    Ok(())
}
