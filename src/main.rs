use std::path::PathBuf;

use anyhow::Context;
use request_workflow::catalogue::StepCatalogue;
use request_workflow::config::EngineConfig;
use request_workflow::{WorkflowError, telemetry};

// Seeds the configured circuit into the workflow database. Run on every
// deployment; seeding skips edges that already exist. A database holding a
// different circuit is only rewritten with `catalogue.replace_existing`.
fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = EngineConfig::load(config_path.as_deref())?;
    telemetry::init(&config.observability)?;

    let db = sled::open(&config.database.path).with_context(|| {
        format!(
            "failed to open workflow database at {}",
            config.database.path.display()
        )
    })?;

    let catalogue = StepCatalogue::open(&db, config.catalogue.cache_ttl())?;
    let circuit = config.catalogue.circuit;
    let inserted = match catalogue.seed_circuit(circuit) {
        Err(WorkflowError::CircuitMismatch { seeded, .. }) if config.catalogue.replace_existing => {
            tracing::warn!(seeded, requested = circuit.version(), "replacing workflow circuit");
            catalogue.replace_circuit(circuit)
        }
        outcome => outcome,
    }
    .context("failed to seed workflow catalogue")?;
    db.flush()?;

    tracing::info!(
        circuit = ?circuit,
        inserted,
        total = catalogue.len(),
        "workflow catalogue ready"
    );
    Ok(())
}
