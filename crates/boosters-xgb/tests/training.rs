//! Training and evaluation protocol tests.

use approx::assert_relative_eq;
use ndarray::Array2;

use boosters_xgb::testing::{FakeNative, NativeOp};
use boosters_xgb::training::{
    parse_eval_string, train, CustomEval, CustomObjective, EvalFn, SquaredError, TrainConfig,
    TrainHooks, Verbosity,
};
use boosters_xgb::{Booster, BoosterConfig, BoosterError, ContractViolation, DMatrix, EvalSet, Params, Phase};

#[test]
fn five_native_iterations_then_predict_and_dispose() {
    let api = FakeNative::new();
    let dtrain = api.dmatrix(12);
    let mut booster = Booster::new(api.clone(), &[&dtrain], &Params::new()).unwrap();
    booster.set_param("max_depth", 3).unwrap();

    for i in 0..5 {
        booster.update(&dtrain, i).unwrap();
    }
    let preds = booster.predict(&dtrain).unwrap();
    assert_eq!(preds.nrows(), dtrain.num_rows());
    assert_eq!(api.num_trees(booster.handle()), 5);

    booster.dispose();
    assert_eq!(booster.handle(), 0);
    booster.dispose();
}

#[test]
fn custom_objective_sees_margins_and_boosts() {
    let api = FakeNative::new();
    let dtrain = api.dmatrix(4);
    let mut booster = Booster::new(
        api.clone(),
        &[&dtrain],
        &Params::new().set("objective", "binary:logistic"),
    )
    .unwrap();

    let mut seen: Vec<Array2<f32>> = Vec::new();
    let mut objective = CustomObjective::new(|margins, dtrain| {
        assert_eq!(margins.nrows(), dtrain.num_rows());
        seen.push(margins.clone());
        let grad: Vec<f32> = margins.iter().map(|m| m - 1.0).collect();
        let hess = vec![1.0; grad.len()];
        (grad, hess)
    });
    booster.update_custom(&dtrain, &mut objective).unwrap();
    booster.update_custom(&dtrain, &mut objective).unwrap();
    drop(objective);

    // Margins are raw: the base score, not its sigmoid.
    assert_relative_eq!(seen[0][[0, 0]], 0.5);
    assert_eq!(api.count(NativeOp::BoostOneIter), 2);
    assert_eq!(api.count(NativeOp::UpdateOneIter), 0);
}

#[test]
fn boost_rejects_mismatched_lengths_without_native_call() {
    let api = FakeNative::new();
    let dtrain = api.dmatrix(3);
    let mut booster = Booster::new(api.clone(), &[&dtrain], &Params::new()).unwrap();

    let err = booster
        .boost(&dtrain, &[0.1, 0.2, 0.3], &[1.0])
        .unwrap_err();
    assert!(matches!(
        err,
        BoosterError::Contract(ContractViolation::GradientLengthMismatch { grad: 3, hess: 1 })
    ));
    assert_eq!(api.count(NativeOp::BoostOneIter), 0);
}

#[test]
fn boost_native_failure_is_train_phase() {
    let api = FakeNative::new();
    let dtrain = api.dmatrix(3);
    let mut booster = Booster::new(api.clone(), &[&dtrain], &Params::new()).unwrap();

    // Lengths agree with each other but not with the dataset.
    let err = booster.boost(&dtrain, &[0.1; 2], &[1.0; 2]).unwrap_err();
    assert_eq!(err.phase(), Some(Phase::Train));
    assert!(err.to_string().contains("does not match 3 rows"));
}

#[test]
fn custom_eval_string_format() {
    let api = FakeNative::new();
    let dtrain = api.dmatrix(4);
    let dtest = api.dmatrix(2);
    let mut booster = Booster::new(api.clone(), &[&dtrain, &dtest], &Params::new()).unwrap();

    let mut scores = [0.1f32, 0.2].into_iter();
    let mut eval = CustomEval::new("error", move |_preds, _dmat| scores.next().unwrap_or(f32::NAN));
    let line = booster
        .eval_set_custom(&[&dtrain, &dtest], &["train", "test"], &mut eval)
        .unwrap();

    assert_eq!(line, "\ttrain-error:0.100000\ttest-error:0.200000");
}

#[test]
fn custom_eval_gets_transformed_predictions_in_order() {
    let api = FakeNative::new();
    let a = api.dmatrix(3);
    let b = api.dmatrix(5);
    let mut booster = Booster::new(
        api.clone(),
        &[&a, &b],
        &Params::new().set("objective", "binary:logistic"),
    )
    .unwrap();

    let mut rows_seen = Vec::new();
    let mut eval = CustomEval::new("rows", |preds: &Array2<f32>, dmat: &dyn DMatrix| {
        assert!(preds.iter().all(|p| (0.0..=1.0).contains(p)));
        rows_seen.push(dmat.num_rows());
        preds.nrows() as f32
    });
    let line = booster
        .eval_set_custom(&[&b, &a], &["b", "a"], &mut eval)
        .unwrap();
    drop(eval);

    assert_eq!(rows_seen, vec![5, 3]);
    assert_eq!(line, "\tb-rows:5.000000\ta-rows:3.000000");
}

#[test]
fn native_eval_returns_native_line() {
    let api = FakeNative::new();
    let dtrain = api.dmatrix(4);
    let dvalid = api.dmatrix(4);
    let mut booster = Booster::new(
        api.clone(),
        &[&dtrain, &dvalid],
        &Params::new().set("eval_metric", "rmse").set("eval_metric", "auc"),
    )
    .unwrap();
    booster.update(&dtrain, 0).unwrap();

    let line = booster
        .eval_set(&[&dtrain, &dvalid], &["train", "valid"], 0)
        .unwrap();
    assert!(line.starts_with("[0]\ttrain-rmse:"));

    let metrics = parse_eval_string(&line, &["train", "valid"]);
    let names: Vec<_> = metrics.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["train-rmse", "train-auc", "valid-rmse", "valid-auc"]);
    assert!(metrics[1].higher_is_better);
}

#[test]
fn eval_failure_is_evaluate_phase() {
    let api = FakeNative::new();
    let dtrain = api.dmatrix(4);
    let mut booster = Booster::new(api.clone(), &[&dtrain], &Params::new()).unwrap();
    api.fail_next(NativeOp::EvalOneIter, "metric not found");

    let err = booster.eval_set(&[&dtrain], &["train"], 0).unwrap_err();
    assert_eq!(err.phase(), Some(Phase::Evaluate));
    assert!(err.to_string().ends_with("metric not found"));
}

// =============================================================================
// train()
// =============================================================================

#[test]
fn train_runs_all_rounds_and_tracks_best() {
    let api = FakeNative::new();
    let dtrain = api.dmatrix(8);
    let dvalid = api.dmatrix(4);
    let config = TrainConfig::builder()
        .booster(BoosterConfig::builder().params(Params::new().set("eta", 0.5)).build())
        .n_rounds(6)
        .verbosity(Verbosity::Info)
        .build()
        .unwrap();

    let outcome = train(
        api.clone(),
        &config,
        &dtrain,
        &[EvalSet::new("train", &dtrain), EvalSet::new("valid", &dvalid)],
        TrainHooks::default(),
    )
    .unwrap();

    assert_eq!(outcome.history.len(), 6);
    assert_eq!(api.num_trees(outcome.booster.handle()), 6);
    // The fake's loss keeps falling, so the last round is the best.
    assert_eq!(outcome.best_iteration, Some(5));
    let best = outcome.best_score.unwrap();
    assert_relative_eq!(best, 1.1 / 7.0, epsilon = 1e-6);
}

#[test]
fn train_stops_early_on_plateau() {
    let api = FakeNative::new();
    let dtrain = api.dmatrix(8);
    let config = TrainConfig::builder()
        .n_rounds(20)
        .early_stopping_rounds(2)
        .build()
        .unwrap();

    let mut scores = [0.5f32, 0.4, 0.45, 0.41, 0.42, 0.1].into_iter();
    let mut metric = CustomEval::new("loss", move |_, _| scores.next().unwrap_or(0.0));
    let outcome = train(
        api.clone(),
        &config,
        &dtrain,
        &[EvalSet::new("train", &dtrain)],
        TrainHooks::default().with_eval(&mut metric),
    )
    .unwrap();

    assert_eq!(outcome.best_iteration, Some(1));
    assert_eq!(outcome.history.len(), 4);
    assert_eq!(api.num_trees(outcome.booster.handle()), 4);
    assert_eq!(metric.metric_name(), "loss");
}

#[test]
fn train_watches_exact_set_when_names_share_a_prefix() {
    let api = FakeNative::new();
    let dtrain = api.dmatrix(8);
    let dsmall = api.dmatrix(2);
    let config = TrainConfig::builder()
        .n_rounds(3)
        .early_stopping_rounds(5)
        .early_stopping_eval_set(0)
        .build()
        .unwrap();

    let mut metric = CustomEval::new("err", |_, dmat: &dyn DMatrix| {
        if dmat.num_rows() == 8 {
            0.1
        } else {
            9.0
        }
    });
    let outcome = train(
        api.clone(),
        &config,
        &dtrain,
        &[EvalSet::new("train", &dtrain), EvalSet::new("train-small", &dsmall)],
        TrainHooks::default().with_eval(&mut metric),
    )
    .unwrap();

    let first: Vec<_> = outcome.history[0].iter().map(|m| m.name.as_str()).collect();
    assert_eq!(first, vec!["train-err", "train-small-err"]);
    assert!(outcome.history[0][1].is_for("train-small"));
    assert_relative_eq!(outcome.best_score.unwrap(), 0.1, epsilon = 1e-6);
    assert_eq!(outcome.best_iteration, Some(0));
}

#[test]
fn train_with_custom_objective() {
    let api = FakeNative::new();
    let dtrain = api.dmatrix(4);
    let config = TrainConfig::builder().n_rounds(3).build().unwrap();

    let mut objective = SquaredError::new(vec![1.0, 0.0, 1.0, 0.0]);
    let outcome = train(
        api.clone(),
        &config,
        &dtrain,
        &[],
        TrainHooks::default().with_objective(&mut objective),
    )
    .unwrap();

    assert_eq!(api.count(NativeOp::BoostOneIter), 3);
    assert_eq!(api.count(NativeOp::EvalOneIter), 0);
    assert!(outcome.history.is_empty());
    assert_eq!(outcome.best_iteration, None);
}

#[test]
fn train_propagates_native_failure() {
    let api = FakeNative::new();
    let dtrain = api.dmatrix(4);
    api.fail_next(NativeOp::UpdateOneIter, "bad objective");

    let err = train(
        api.clone(),
        &TrainConfig::default(),
        &dtrain,
        &[],
        TrainHooks::default(),
    )
    .unwrap_err();
    assert_eq!(err.phase(), Some(Phase::Train));
    assert_eq!(api.live_boosters(), 0);
}
