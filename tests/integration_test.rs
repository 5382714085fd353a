use std::collections::HashSet;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};
use towerec::algorithms::evaluator::evaluate;
use towerec::algorithms::flat_index::FlatIndex;
use towerec::algorithms::retriever::{ApproximateIndexed, ExactBruteForce, RetrievalStrategy};
use towerec::algorithms::trainer::{fit, Trainer};
use towerec::data::synthetic::{generate, write_csv, SyntheticSpec};
use towerec::data::{split, InteractionStore};
use towerec::server::create_router;
use towerec::services::search::{HyperparameterSearch, RandomSearch};
use towerec::services::serving::ModelSnapshot;
use towerec::services::training::TrainingService;
use towerec::*;

fn temp_dir(tag: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("towerec-{}-{}", tag, uuid::Uuid::new_v4()))
}

fn small_config(tag: &str) -> Config {
    let mut config = Config::default();
    config.artifacts.dir = temp_dir(tag);
    config.training.dim = 8;
    config.training.epochs = 4;
    config.training.batch_size = 128;
    config
}

fn synthetic_store() -> InteractionStore {
    generate(&SyntheticSpec {
        num_users: 30,
        num_items: 20,
        num_interactions: 900,
        ..SyntheticSpec::default()
    })
}

#[test]
fn test_factor_tables_reserve_slot_zero() {
    let interactions = vec![
        Interaction::new(1, 100, 4.0, 0),
        Interaction::new(1, 101, 1.0, 1),
        Interaction::new(2, 100, 1.0, 2),
    ];
    let model = assert_ok!(fit(&interactions, &TrainParams::new(8, 0.01, 5, 512)));
    assert_eq!(model.user_vectors().dim(), (3, 8));
    assert_eq!(model.item_vectors().dim(), (102, 8));
    assert_ok!(model.score(2, 101));
}

#[test]
fn test_empty_training_set_returns_no_model() {
    let result = fit(&[], &TrainParams::new(8, 0.01, 5, 512));
    assert!(matches!(assert_err!(result), RecError::EmptyTrainingSet));
}

#[test]
fn test_single_interaction_user_is_held_out_and_evaluated() {
    let interactions = vec![
        Interaction::new(1, 10, 1.0, 1),
        Interaction::new(1, 11, 2.0, 2),
        Interaction::new(1, 12, 3.0, 3),
        Interaction::new(2, 11, 4.0, 5),
    ];
    let (train, validation) = assert_ok!(split(&interactions, 0.2, 42));
    assert!(train.iter().all(|i| i.user_id != 2));
    assert!(validation.contains(&Interaction::new(2, 11, 4.0, 5)));

    let shape = MatrixShape::from_interactions(&interactions);
    let (model, _) = assert_ok!(Trainer::default().fit(&train, shape, &TrainParams::new(4, 0.01, 3, 8)));
    let report = assert_ok!(evaluate(model.user_vectors(), model.item_vectors(), &validation, &[5, 10, 20]));
    assert_eq!(report.users_evaluated, 2);
    assert!(report.metrics.values().all(|v| v.is_finite()));
}

#[test]
fn test_split_covers_users_with_two_or_more_interactions() {
    let store = synthetic_store();
    let (train, validation) = assert_ok!(split(store.interactions(), 0.2, 7));
    let train_users: HashSet<UserId> = train.iter().map(|i| i.user_id).collect();
    let validation_users: HashSet<UserId> = validation.iter().map(|i| i.user_id).collect();

    for user in store.users() {
        let n = store.interactions().iter().filter(|i| i.user_id == user.user_id).count();
        if n >= 2 {
            assert!(train_users.contains(&user.user_id));
            assert!(validation_users.contains(&user.user_id));
        }
    }
    assert_eq!(train.len() + validation.len(), store.interactions().len());
}

#[test]
fn test_training_is_reproducible() {
    let store = synthetic_store();
    let params = TrainParams::new(8, 0.01, 3, 64).with_seed(11);
    let a = assert_ok!(fit(store.interactions(), &params));
    let b = assert_ok!(fit(store.interactions(), &params));
    assert_eq!(a, b);

    let shape = store.shape();
    let untrained_a = assert_ok!(Trainer::untrained(shape, 8, 11));
    let untrained_b = assert_ok!(Trainer::untrained(shape, 8, 11));
    assert_eq!(untrained_a, untrained_b);
    assert!(!untrained_a.is_trained());
}

#[test]
fn test_index_and_brute_force_agree() {
    let store = generate(&SyntheticSpec {
        num_users: 30,
        num_items: 5000,
        num_interactions: 20_000,
        ..SyntheticSpec::default()
    });
    let model = assert_ok!(fit(store.interactions(), &TrainParams::new(16, 0.01, 1, 256)));

    let index = assert_ok!(FlatIndex::build(
        model.item_vectors(),
        Config::default().retrieval.partition_rows
    ));
    let exact = ExactBruteForce::new(model.item_matrix());
    let indexed = ApproximateIndexed::new(index);
    assert_eq!(indexed.len(), model.item_rows());

    for user in 0..model.user_rows() {
        let query = model.user_vector(user).unwrap().to_vec();
        for k in [1, 10, 100] {
            let a = exact.search(&query, k).unwrap();
            let b = indexed.search(&query, k).unwrap();
            assert_eq!(a, b, "user {} k {}", user, k);
        }
    }
}

#[test]
fn test_user_at_row_count_is_rejected() {
    let store = synthetic_store();
    let model = assert_ok!(fit(store.interactions(), &TrainParams::new(8, 0.01, 1, 64)));
    let rows = model.user_rows();
    let snapshot = ModelSnapshot::new(model, None, None);

    let err = assert_err!(snapshot.recommend(rows, 5));
    assert!(matches!(err, RecError::UserOutOfRange { user_id, rows: r } if user_id == rows && r == rows));
    assert_ok!(snapshot.recommend(rows - 1, 5));
}

#[test]
fn test_csv_pipeline_end_to_end() {
    let data_dir = temp_dir("data");
    assert_ok!(write_csv(&synthetic_store(), &data_dir));

    let mut config = small_config("pipeline");
    config.data.data_dir = data_dir.clone();
    let artifacts = config.artifacts.dir.clone();

    let service = TrainingService::new(Arc::new(config.clone()));
    let outcome = assert_ok!(service.run());
    assert_eq!(outcome.model.user_rows(), 31);
    assert_eq!(outcome.model.item_rows(), 1021);
    assert!(outcome.meta.trained);

    let state = AppState::new(config);
    assert_ok!(state.serving.reload());
    let health = state.serving.health();
    assert_eq!(health.status, "ok");
    assert!(health.index_loaded);

    let response = assert_ok!(state.serving.recommend(3, 5));
    assert_eq!(response.item_indices.len(), 5);
    assert!(response.item_indices.iter().all(|&i| i < 1021));

    std::fs::remove_dir_all(data_dir).ok();
    std::fs::remove_dir_all(artifacts).ok();
}

#[test]
fn test_search_retrains_best_configuration_on_all_data() {
    let mut config = small_config("search");
    config.search.space.dim_min = 4;
    config.search.space.dim_max = 8;
    config.search.space.dim_step = 4;
    config.search.space.epochs_min = 1;
    config.search.space.epochs_max = 2;
    let artifacts = config.artifacts.dir.clone();

    let search = HyperparameterSearch::new(Arc::new(config.clone()));
    let data = assert_ok!(search.training().prepare(&synthetic_store()));
    let outcome = assert_ok!(search.search(
        &mut RandomSearch::new(3),
        &data,
        "recall@10",
        3,
        &config.search.space
    ));

    assert_eq!(outcome.trials.len(), 3);
    assert!(outcome.trials.iter().all(|t| t.objective <= outcome.best.objective));
    assert_eq!(
        outcome.final_report.examples,
        search.training().training_rows(&data.all()).len()
    );

    let meta = assert_ok!(search.persist(&outcome));
    assert_eq!(meta.trained_on, "train+validation");
    assert_eq!(meta.dim, outcome.best.config.dim);

    std::fs::remove_dir_all(artifacts).ok();
}

#[tokio::test]
async fn test_http_reload_and_recommend() {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    let config = small_config("http");
    let artifacts = config.artifacts.dir.clone();
    let service = TrainingService::new(Arc::new(config.clone()));
    assert_ok!(service.run_with_store(&synthetic_store()));

    let state = AppState::new(config);
    let router = create_router(state.clone());

    let response = router
        .clone()
        .oneshot(Request::builder().uri("/rec/1").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = router
        .clone()
        .oneshot(Request::builder().method("POST").uri("/reload").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .clone()
        .oneshot(Request::builder().uri("/rec/1?k=3").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: RecommendationResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body.user_id, 1);
    assert_eq!(body.item_indices.len(), 3);
    assert_eq!(body.strategy, StrategyKind::Indexed);

    let response = router
        .oneshot(Request::builder().uri("/rec/31").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    std::fs::remove_dir_all(artifacts).ok();
}
