//! Example linear-regression training CLI.
//!
//! # Usage
//!
//! ```bash
//! regression [config.json]
//! ```
//!
//! # Example config
//!
//! ```json
//! {"max_epochs": 40, "iterations_per_epoch": 50, "tracing": {"level": "info", "format": "compact"}}
//! ```

use std::sync::Arc;

use cadence_operator::{Operator, OperatorConfig, init_tracing};
use example::{Dataset, LinearModel, MODEL, seed_registry, training_hooks, training_step};

#[tokio::main]
async fn main() {
    let config = match std::env::args().nth(1) {
        Some(path) => OperatorConfig::from_json_file(&path),
        None => Ok(OperatorConfig::default()
            .with_max_epochs(Some(40))
            .with_iterations_per_epoch(50)),
    };
    let config = config.unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });
    init_tracing(&config.tracing);

    let dataset = Arc::new(Dataset::synthetic(512, 3.0, -1.0));
    let mut operator = Operator::new(config).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });
    if let Err(e) = seed_registry(operator.registry_mut()) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    for hook in training_hooks(Arc::clone(&dataset)) {
        operator.add_hook(hook);
    }

    match operator.run(training_step(dataset, 32)).await {
        Ok(summary) => {
            let model = operator
                .registry()
                .get::<LinearModel>(MODEL)
                .copied()
                .unwrap_or_default();
            tracing::info!(
                epochs = summary.counters.epoch,
                iterations = summary.counters.iteration,
                reason = ?summary.stop_reason,
                background_failures = summary.background_failures,
                weight = model.weight,
                bias = model.bias,
                "training finished"
            );
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
