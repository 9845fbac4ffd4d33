//! Integration tests for charcnn.
//!
//! These tests run the full pipeline: quantize raw text, train or search a
//! model, persist it with its labels, and classify with the reloaded
//! artifacts.

use charcnn::automl::{RandomSearch, SearchStrategy, TPE};
use charcnn::hyper::{FloatRange, HyperDefaulter, HyperParameters, Sampling, SearchParameters};
use charcnn::prelude::*;
use charcnn::text::DEFAULT_INPUT_LENGTH;

const INPUT_LEN: usize = 48;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn small_hyper_model(class_len: usize) -> HyperModel {
    HyperModel::new(INPUT_LEN, Quantizer::new().vocabulary_size(), class_len)
        .with_architecture(CharCnnConfig::small())
        .with_seed(17)
}

fn corpus() -> (Vec<&'static str>, Vec<&'static str>) {
    let docs = vec![
        "the match ended two nil",
        "stocks rallied at the close",
        "the striker scored twice",
        "bond yields fell sharply",
        "a late goal sealed the win",
        "the central bank held rates",
        "fans stormed the pitch",
        "earnings beat expectations",
        "the keeper saved a penalty",
        "the merger was approved",
    ];
    let classes = vec![
        "sport", "finance", "sport", "finance", "sport", "finance", "sport", "finance", "sport",
        "finance",
    ];
    (docs, classes)
}

#[test]
fn test_hello_encodes_reversed_and_right_padded() {
    let quantizer = Quantizer::new();
    let encoded = quantizer.transform(&["Hello"]);
    assert_eq!(encoded.shape(), [1, DEFAULT_INPUT_LENGTH]);

    let row = encoded.row_dense(0);
    let index = |c: char| quantizer.symbol_map().index_of(c) as i32;
    assert_eq!(&row[..5], &[index('o'), index('l'), index('l'), index('e'), index('h')]);
    assert!(row[5..].iter().all(|&v| v == 0));
}

#[test]
fn test_defaulter_ignores_bounds() {
    let mut hp = HyperDefaulter;
    for (min, max) in [(1e-4, 5e-4), (10.0, 20.0), (-1.0, 0.0)] {
        let range = FloatRange::new("learning_rate", min, max).sampling(Sampling::Log);
        assert_eq!(hp.float(1.5e-4, range), 1.5e-4);
    }
}

#[test]
fn test_strategies_respect_budgets() {
    let mut hp = SearchParameters::new();
    hp.float(1.5e-4, FloatRange::new("learning_rate", 1e-4, 5e-4).sampling(Sampling::Log));
    let space = hp.into_space();

    let mut random = RandomSearch::new(5).with_seed(1);
    assert_eq!(random.suggest(&space, 10).len(), 5);
    assert!(random.suggest(&space, 1).is_empty());

    let mut tpe = TPE::new(4).with_seed(1);
    assert_eq!(tpe.suggest(&space, 10).len(), 4);
    assert!(tpe.suggest(&space, 1).is_empty());
}

#[test]
fn test_train_save_load_classify() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let (docs, classes) = corpus();

    let mut quantizer = Quantizer::builder().input_length(INPUT_LEN).build();
    let labels = ClassLabels::from_observed(classes.iter().copied());
    let x = quantizer.fit_transform(&docs);
    let y = labels.one_hot(&classes).expect("known labels");

    let mut hyper = small_hyper_model(labels.len());
    let options = FitOptions {
        epochs: 3,
        batch_size: 4,
        validation_split: 0.2,
        seed: Some(5),
        ..FitOptions::default()
    };
    hyper.fit(&x, &y, true, &options).expect("fit");
    hyper.save(dir.path()).expect("save model");
    labels.save(dir.path()).expect("save labels");

    let expected = hyper
        .model_mut()
        .expect("built")
        .predict(&quantizer.transform(&["a goal in extra time"]))
        .expect("predict");

    let mut classifier = Classifier::load(dir.path()).expect("load classifier");
    assert_eq!(classifier.labels(), &labels);
    let predictions = classifier
        .predict(&["a goal in extra time", ""], 0)
        .expect("classify");

    assert_eq!(predictions.len(), 2);
    let first = &predictions[0];
    let mut probabilities: Vec<f32> = expected[0].clone();
    probabilities.sort_by(|a, b| b.total_cmp(a));
    let ranked: Vec<f32> = first.classes.iter().map(|c| c.association).collect();
    assert_eq!(ranked, probabilities);
    assert_eq!(first.classes[0].rank, 1);
    assert!(labels.index_of(&first.classes[0].id).is_some());
}

#[test]
fn test_classes_file_layout() {
    let dir = tempfile::tempdir().expect("tempdir");
    let labels = ClassLabels::new(["sport", "finance"]).expect("unique");
    labels.save(dir.path()).expect("save");

    let raw = std::fs::read_to_string(dir.path().join("classes.json")).expect("read");
    let json: serde_json::Value = serde_json::from_str(&raw).expect("json");
    assert_eq!(
        json,
        serde_json::json!({"data": [
            {"type": "class", "id": "sport"},
            {"type": "class", "id": "finance"}
        ]})
    );
}

#[test]
fn test_search_then_save() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let (docs, classes) = corpus();
    let quantizer = Quantizer::builder().input_length(INPUT_LEN).build();
    let labels = ClassLabels::from_observed(classes.iter().copied());
    let x = quantizer.transform(&docs);
    let y = labels.one_hot(&classes).expect("known labels");

    let search = SearchOptions {
        max_trials: 2,
        executions_per_trial: 1,
        directory: Some(dir.path().join("tuning")),
        seed: Some(3),
        ..SearchOptions::default()
    };
    let fit = FitOptions {
        epochs: 1,
        batch_size: 5,
        validation_split: 0.2,
        seed: Some(2),
        verbose: false,
        ..FitOptions::default()
    };

    let mut hyper = small_hyper_model(labels.len());
    hyper.search(&x, &y, &search, &fit).expect("search");
    hyper.save(dir.path().join("model")).expect("save");

    let model = Model::load(dir.path().join("model")).expect("load");
    assert!((1e-4..=5e-4).contains(&model.learning_rate()));
    assert!(dir.path().join("tuning/hyper-search/oracle.json").exists());
}

#[test]
fn test_config_drives_pipeline() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("train.json");
    std::fs::write(
        &path,
        r#"{
            "quantizer": {"input_length": 48, "padding": "left", "reverse": false},
            "fit": {"epochs": 1, "verbose": false}
        }"#,
    )
    .expect("write");

    let config = TrainingConfig::from_json_file(&path).expect("config");
    let quantizer = config.quantizer.build();
    assert_eq!(quantizer.input_length(), 48);
    let row = quantizer.transform(&["ab"]).row_dense(0);
    assert_eq!(&row[46..], &[40, 41]);

    let mut hyper = HyperModel::new(48, quantizer.vocabulary_size(), 2)
        .with_architecture(CharCnnConfig::small())
        .with_quantizer(config.quantizer.clone());
    let (docs, classes) = corpus();
    let labels = ClassLabels::from_observed(classes.iter().copied());
    let x = quantizer.transform(&docs);
    let y = labels.one_hot(&classes).expect("labels");
    hyper.fit(&x, &y, false, &config.fit).expect("fit");
    assert_eq!(
        hyper.model().and_then(Model::quantizer),
        Some(&config.quantizer)
    );
}
