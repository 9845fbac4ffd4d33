use super::*;
use crate::automl::Trial;
use crate::classify::ClassLabels;
use crate::model::ConvBlock;
use crate::text::Quantizer;
use crate::traits::TextTransformer;

const INPUT_LEN: usize = 16;

fn tiny() -> HyperModel {
    let architecture = CharCnnConfig {
        embedding_dim: 4,
        conv_blocks: vec![ConvBlock::new(6, 3, Some(2))],
        dense_units: vec![8],
        dropout: 0.25,
        kernel_init_std: 0.1,
    };
    HyperModel::new(INPUT_LEN, 69, 2)
        .with_architecture(architecture)
        .with_seed(11)
}

fn data() -> (CsrMatrix<i32>, OneHot) {
    let quantizer = Quantizer::builder().input_length(INPUT_LEN).build();
    let docs = ["yes", "no", "yes yes", "no no", "yeah", "nope", "yes!", "no!"];
    let classes = ["y", "n", "y", "n", "y", "n", "y", "n"];
    let labels = ClassLabels::new(["n", "y"]).unwrap();
    (quantizer.transform(&docs), labels.one_hot(&classes).unwrap())
}

fn fit_options() -> FitOptions {
    FitOptions {
        epochs: 2,
        batch_size: 4,
        validation_split: 0.25,
        seed: Some(1),
        verbose: false,
        ..FitOptions::default()
    }
}

#[test]
fn test_search_options_defaults() {
    let options = SearchOptions::default();
    assert_eq!(options.max_trials, 8);
    assert_eq!(options.executions_per_trial, 2);
    assert_eq!(options.directory, None);
    assert_eq!(options.project_name, "hyper-search");
}

#[test]
fn test_build_with_defaults() {
    let mut hyper = tiny();
    assert!(hyper.model().is_none());
    let model = hyper.build(&mut HyperDefaulter).unwrap();
    assert_eq!(model.learning_rate(), 1.5e-4);
    assert_eq!(model.class_len(), 2);
    assert!(hyper.model().is_some());
}

#[test]
fn test_build_answers_from_trial() {
    let mut hyper = tiny();
    let mut hp = SearchParameters::new();
    let mut trial = Trial::empty();
    trial.set("learning_rate", 3e-4);
    hp.begin_trial(trial);

    let model = hyper.build(&mut hp).unwrap();
    assert_eq!(model.learning_rate(), 3e-4);
    assert!(hp.space().contains("learning_rate"));
}

#[test]
fn test_build_replaces_held_model() {
    let mut hyper = tiny();
    hyper.build(&mut HyperDefaulter).unwrap();
    let mut hp = SearchParameters::new();
    let mut trial = Trial::empty();
    trial.set("learning_rate", 2e-4);
    hp.begin_trial(trial);
    hyper.build(&mut hp).unwrap();
    assert_eq!(hyper.model().map(Model::learning_rate), Some(2e-4));
}

#[test]
fn test_build_rejects_collapsed_shapes() {
    let mut hyper = HyperModel::new(10, 69, 2);
    let err = hyper.build(&mut HyperDefaulter).unwrap_err();
    assert!(matches!(err, CharCnnError::InvalidArchitecture { .. }));
    assert!(hyper.model().is_none());
}

#[test]
fn test_save_without_model() {
    let dir = tempfile::tempdir().unwrap();
    let err = tiny().save(dir.path()).unwrap_err();
    assert!(matches!(err, CharCnnError::ModelNotBuilt));
}

#[test]
fn test_fit_builds_and_trains() {
    let (x, y) = data();
    let mut hyper = tiny();
    hyper.fit(&x, &y, true, &fit_options()).unwrap();
    assert_eq!(hyper.model().map(Model::learning_rate), Some(1.5e-4));

    let dir = tempfile::tempdir().unwrap();
    hyper.save(dir.path()).unwrap();
    assert!(dir.path().join(crate::model::MODEL_FILE).exists());
}

fn read_json(path: std::path::PathBuf) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_search_keeps_best_model() {
    let (x, y) = data();
    let dir = tempfile::tempdir().unwrap();
    let options = SearchOptions {
        max_trials: 3,
        executions_per_trial: 1,
        directory: Some(dir.path().to_path_buf()),
        seed: Some(4),
        ..SearchOptions::default()
    };
    let mut hyper = tiny();
    hyper.search(&x, &y, &options, &fit_options()).unwrap();

    let lr = hyper.model().map(Model::learning_rate).unwrap();
    assert!((1e-4..=5e-4).contains(&lr));
    let project = dir.path().join("hyper-search");
    for id in 0..3 {
        assert!(project.join(format!("trial_{id}")).join("trial.json").exists());
    }

    // the installed model comes from the trial the oracle ranks best
    let oracle = read_json(project.join("oracle.json"));
    let best = oracle["best_trial"].as_u64().unwrap();
    let record = read_json(project.join(format!("trial_{best}")).join("trial.json"));
    let recorded = record["hyperparameters"]["values"]["learning_rate"]
        .as_f64()
        .unwrap();
    assert!((lr - recorded).abs() <= 1e-12 * recorded);

    let best_score = record["score"].as_f64().unwrap();
    for id in 0..3 {
        let other = read_json(project.join(format!("trial_{id}")).join("trial.json"));
        assert!(other["score"].as_f64().unwrap() <= best_score);
    }
}

#[test]
fn test_search_scores_best_epoch() {
    let (x, y) = data();
    let dir = tempfile::tempdir().unwrap();
    let options = SearchOptions {
        max_trials: 1,
        executions_per_trial: 1,
        directory: Some(dir.path().to_path_buf()),
        ..SearchOptions::default()
    };
    let fit = FitOptions {
        epochs: 10,
        validation_split: 0.5,
        ..fit_options()
    };
    let mut hyper = tiny();
    hyper.search(&x, &y, &options, &fit).unwrap();

    // the single trial runs with defaults, so a plain fit replays it
    let mut replay = tiny();
    let history = replay.build(&mut HyperDefaulter).unwrap().fit(&x, &y, &fit).unwrap();
    let val_accuracy = history.get("val_accuracy").unwrap();
    let peak = val_accuracy.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    assert!(peak >= history.last("val_accuracy").unwrap());

    let record = read_json(dir.path().join("hyper-search/trial_0/trial.json"));
    let scored = record["metrics"]["val_accuracy"].as_f64().unwrap();
    assert!((scored - peak).abs() < 1e-12);

    // the kept weights reproduce the peak on the held-out half
    let x_val = x.select_rows(&[4, 5, 6, 7]).unwrap();
    let y_val = OneHot::from_indices(y.indices()[4..].to_vec(), 2).unwrap();
    let evaluation = hyper.model_mut().unwrap().evaluate(&x_val, &y_val).unwrap();
    assert_eq!(evaluation.accuracy, peak);
}

#[test]
fn test_built_models_carry_quantizer_settings() {
    let settings = crate::config::QuantizerConfig {
        input_length: INPUT_LEN,
        reverse: false,
        ..crate::config::QuantizerConfig::default()
    };
    let mut hyper = tiny().with_quantizer(settings.clone());
    let model = hyper.build(&mut HyperDefaulter).unwrap();
    assert_eq!(model.quantizer(), Some(&settings));
    assert_eq!(tiny().build(&mut HyperDefaulter).unwrap().quantizer(), None);
}

#[test]
fn test_search_needs_validation_metric() {
    let (x, y) = data();
    let options = SearchOptions {
        max_trials: 1,
        executions_per_trial: 1,
        ..SearchOptions::default()
    };
    let fit = FitOptions {
        validation_split: 0.0,
        ..fit_options()
    };
    let err = tiny().search(&x, &y, &options, &fit).unwrap_err();
    assert!(matches!(err, CharCnnError::MissingObjective { .. }));
}

#[test]
fn test_search_with_no_trials() {
    let (x, y) = data();
    let options = SearchOptions {
        max_trials: 0,
        ..SearchOptions::default()
    };
    let mut hyper = tiny();
    let err = hyper.search(&x, &y, &options, &fit_options()).unwrap_err();
    assert!(matches!(err, CharCnnError::NoTrials));
    assert!(hyper.model().is_none());
}

#[test]
fn test_take_model_empties_slot() {
    let mut hyper = tiny();
    hyper.build(&mut HyperDefaulter).unwrap();
    assert!(hyper.take_model().is_some());
    assert!(hyper.model().is_none());
    assert!(hyper.take_model().is_none());
}
