use std::sync::Arc;
use towerec::data::synthetic::{generate, SyntheticSpec};
use towerec::services::serving::{ModelSnapshot, ServingService};
use towerec::services::training::TrainingService;
use towerec::*;

fn main() -> anyhow::Result<()> {
    init_tracing("info");

    println!("towerec basic usage");

    // 1. synthetic catalog and interaction log
    let store = generate(&SyntheticSpec::default());
    println!(
        "Generated {} users, {} items, {} interactions",
        store.users().len(),
        store.items().len(),
        store.interactions().len()
    );

    // 2. train, evaluate and persist into a scratch directory
    let mut config = Config::default();
    config.artifacts.dir = std::env::temp_dir().join("towerec-demo");
    config.training.dim = 16;
    config.training.epochs = 10;
    let training = TrainingService::new(Arc::new(config.clone()));
    let outcome = training.run_with_store(&store)?;

    println!("Epoch losses: {:?}", outcome.training.epoch_losses);
    for (name, value) in &outcome.evaluation.metrics {
        println!("  {:<10} {:.4}", name, value);
    }

    // 3. serve from the saved artifacts
    let serving = ServingService::new(training.artifacts().clone());
    serving.reload()?;
    println!("Health: {:?}", serving.health());

    for user_id in [1, 2, 3] {
        let response = serving.recommend(user_id, 5)?;
        println!(
            "User {} -> {:?} ({:?}, trained={})",
            user_id, response.item_indices, response.strategy, response.model_trained
        );
    }

    // 4. the untrained fallback is flagged in every response
    let fallback = algorithms::trainer::Trainer::untrained(store.shape(), 16, 42)?;
    serving.install(ModelSnapshot::new(fallback, None, None));
    let response = serving.recommend(1, 5)?;
    println!(
        "Fallback user 1 -> {:?} ({:?}, trained={})",
        response.item_indices, response.strategy, response.model_trained
    );

    // 5. unknown users are rejected, not wrapped
    match serving.recommend(10_000, 5) {
        Err(e) if e.is_not_found() => println!("User 10000: {}", e),
        other => println!("Unexpected: {:?}", other.map(|r| r.item_indices)),
    }

    println!("Stats: {:?}", serving.stats());
    Ok(())
}
