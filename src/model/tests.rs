use super::*;
use crate::classify::ClassLabels;
use crate::text::Quantizer;
use crate::traits::TextTransformer;

const INPUT_LEN: usize = 12;

fn tiny_config() -> CharCnnConfig {
    CharCnnConfig {
        embedding_dim: 8,
        conv_blocks: vec![ConvBlock::new(8, 3, Some(2))],
        dense_units: vec![16],
        dropout: 0.0,
        kernel_init_std: 0.1,
    }
}

fn quantizer() -> Quantizer {
    Quantizer::builder().input_length(INPUT_LEN).build()
}

/// Four "a" documents and four "z" documents, interleaved.
fn toy_data() -> (CsrMatrix<i32>, OneHot) {
    let docs = ["aaaa", "zzzz", "aaa", "zzz", "aaaaa", "zzzzz", "aa", "zz"];
    let classes = ["a", "z", "a", "z", "a", "z", "a", "z"];
    let labels = ClassLabels::new(["a", "z"]).unwrap();
    (quantizer().transform(&docs), labels.one_hot(&classes).unwrap())
}

fn tiny_model(seed: u64) -> Model {
    Model::new(tiny_config(), INPUT_LEN, quantizer().vocabulary_size(), 2, 1e-2, Some(seed)).unwrap()
}

fn quiet(epochs: usize) -> FitOptions {
    FitOptions {
        epochs,
        batch_size: 8,
        seed: Some(3),
        verbose: false,
        ..FitOptions::default()
    }
}

#[test]
fn test_fit_options_defaults() {
    let options = FitOptions::default();
    assert_eq!(options.epochs, 1);
    assert_eq!(options.batch_size, 32);
    assert_eq!(options.validation_split, 0.0);
    assert!(options.shuffle);
    assert!(options.verbose);
    assert!(options.validate().is_ok());
}

#[test]
fn test_fit_options_rejects_bad_values() {
    let zero_batch = FitOptions {
        batch_size: 0,
        ..FitOptions::default()
    };
    assert!(matches!(
        zero_batch.validate(),
        Err(CharCnnError::InvalidHyperparameter { ref param, .. }) if param == "batch_size"
    ));
    let full_split = FitOptions {
        validation_split: 1.0,
        ..FitOptions::default()
    };
    assert!(full_split.validate().is_err());
}

#[test]
fn test_fit_records_history() {
    let (x, y) = toy_data();
    let mut model = tiny_model(1);
    let history = model.fit(&x, &y, &quiet(3)).unwrap();

    assert_eq!(history.epochs(), 3);
    assert_eq!(history.names().collect::<Vec<_>>(), vec!["accuracy", "loss"]);
    for &loss in history.get("loss").unwrap() {
        assert!(loss.is_finite() && loss > 0.0);
    }
    for &acc in history.get("accuracy").unwrap() {
        assert!((0.0..=1.0).contains(&acc));
    }
    assert!(history.get("val_loss").is_none());
}

#[test]
fn test_fit_with_validation_split() {
    let (x, y) = toy_data();
    let mut model = tiny_model(2);
    let options = FitOptions {
        validation_split: 0.25,
        ..quiet(2)
    };
    let history = model.fit(&x, &y, &options).unwrap();

    assert_eq!(history.get("val_loss").map(<[f64]>::len), Some(2));
    assert_eq!(history.get("val_accuracy").map(<[f64]>::len), Some(2));
    let last = history.final_metrics();
    assert_eq!(last.len(), 4);
    // two held-out rows: accuracy is a multiple of one half
    let val_acc = last["val_accuracy"];
    assert!([0.0, 0.5, 1.0].iter().any(|v| (v - val_acc).abs() < 1e-9));
}

#[test]
fn test_fit_reduces_loss() {
    let (x, y) = toy_data();
    let mut model = tiny_model(4);
    let history = model.fit(&x, &y, &quiet(40)).unwrap();
    let losses = history.get("loss").unwrap();
    assert!(losses[39] < losses[0], "loss {} -> {}", losses[0], losses[39]);
}

#[test]
fn test_fit_split_leaving_no_training_rows() {
    let labels = ClassLabels::new(["a", "z"]).unwrap();
    let x = quantizer().transform(&["a"]);
    let y = labels.one_hot(&["a"]).unwrap();
    let options = FitOptions {
        validation_split: 0.5,
        ..quiet(1)
    };
    let err = tiny_model(0).fit(&x, &y, &options).unwrap_err();
    assert!(matches!(err, CharCnnError::InvalidHyperparameter { .. }));
}

#[test]
fn test_fit_rejects_mismatched_inputs() {
    let (x, _) = toy_data();
    let mut model = tiny_model(0);

    let wide = Quantizer::builder().input_length(INPUT_LEN + 1).build().transform(&["a"]);
    let one = ClassLabels::new(["a", "z"]).unwrap().one_hot(&["a"]).unwrap();
    assert!(matches!(
        model.fit(&wide, &one, &quiet(1)),
        Err(CharCnnError::DimensionMismatch { .. })
    ));

    let three = ClassLabels::new(["a", "b", "z"]).unwrap();
    let y3 = three.one_hot(&["a", "z", "a", "z", "a", "z", "a", "z"]).unwrap();
    assert!(model.fit(&x, &y3, &quiet(1)).is_err());

    let short = OneHot::from_indices(vec![0, 1], 2).unwrap();
    assert!(model.fit(&x, &short, &quiet(1)).is_err());
    assert!(model.evaluate(&x, &short).is_err());
}

#[test]
fn test_non_finite_loss_is_convergence_failure() {
    let (x, y) = toy_data();
    let mut model = tiny_model(0);
    model
        .network
        .set_param("dense_1/bias", Tensor::new(vec![f32::NAN, 0.0], &[2]).unwrap())
        .unwrap();
    let err = model.fit(&x, &y, &quiet(1)).unwrap_err();
    assert!(matches!(err, CharCnnError::ConvergenceFailure { iterations: 0, .. }));
}

#[test]
fn test_predict_returns_distributions() {
    let (x, _) = toy_data();
    let mut model = tiny_model(5);
    let probs = model.predict(&x).unwrap();

    assert_eq!(probs.len(), 8);
    for row in &probs {
        assert_eq!(row.len(), 2);
        assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }
    assert!(model.predict(&quantizer().transform::<&str>(&[])).unwrap().is_empty());
}

#[test]
fn test_evaluate_in_inference_mode() {
    let (x, y) = toy_data();
    let mut model = tiny_model(6);
    let first = model.evaluate(&x, &y).unwrap();
    let second = model.evaluate(&x, &y).unwrap();
    assert_eq!(first, second);
    assert!((0.0..=1.0).contains(&first.accuracy));
}

#[test]
fn test_save_and_load_preserve_predictions() {
    let dir = tempfile::tempdir().unwrap();
    let (x, y) = toy_data();
    let mut model = tiny_model(7);
    model.fit(&x, &y, &quiet(2)).unwrap();
    model.save(dir.path()).unwrap();
    assert!(dir.path().join(MODEL_FILE).exists());

    let mut loaded = Model::load(dir.path()).unwrap();
    assert_eq!(loaded.input_len(), INPUT_LEN);
    assert_eq!(loaded.chars_len(), quantizer().vocabulary_size());
    assert_eq!(loaded.class_len(), 2);
    assert_eq!(loaded.learning_rate(), 1e-2);
    assert_eq!(loaded.config(), &tiny_config());
    assert_eq!(model.predict(&x).unwrap(), loaded.predict(&x).unwrap());
}

#[test]
fn test_load_requires_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let tensors = BTreeMap::from([("w".to_string(), (vec![1.0], vec![1]))]);
    save_safetensors(dir.path().join(MODEL_FILE), &tensors, &UserMetadata::new()).unwrap();

    let err = Model::load(dir.path()).unwrap_err();
    assert!(matches!(err, CharCnnError::FormatError { ref message, .. } if message.contains("input_len")));
}

#[test]
fn test_load_rejects_foreign_tensors() {
    let dir = tempfile::tempdir().unwrap();
    tiny_model(0).save(dir.path()).unwrap();

    // same metadata, only one of the tensors
    let file = SafeTensors::read(dir.path().join(MODEL_FILE)).unwrap();
    let meta = file.user_metadata().clone();
    let tensors = BTreeMap::from([("dense/bias".to_string(), (vec![0.0; 16], vec![16]))]);
    save_safetensors(dir.path().join(MODEL_FILE), &tensors, &meta).unwrap();

    assert!(matches!(Model::load(dir.path()), Err(CharCnnError::FormatError { .. })));
}

#[test]
fn test_load_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Model::load(dir.path().join("absent")).is_err());
}

#[test]
fn test_summary_lists_layers() {
    let model = tiny_model(0);
    let summary = model.summary();
    assert!(summary.starts_with("Model: \"char_cnn\""));
    assert!(summary.contains("conv1d (Conv1D)"));
    assert!(summary.contains(&format!("Total params: {}", model.n_params())));
}

fn history_of(columns: &[(&str, &[f64])]) -> History {
    let mut history = History::default();
    for (name, values) in columns {
        for &value in *values {
            history.record(name, value);
        }
    }
    history
}

#[test]
fn test_best_epoch_takes_earliest_peak() {
    let history = history_of(&[
        ("loss", &[0.9, 0.7, 0.6, 0.5]),
        ("val_accuracy", &[0.75, 0.5, 0.75, 0.5]),
        ("val_loss", &[0.6, 0.7, f64::NAN, 0.65]),
    ]);

    let accuracy = Objective::maximize("val_accuracy");
    assert_eq!(history.best_epoch(&accuracy), Some(0));
    let best = history.best_metrics(&accuracy);
    assert_eq!(best["val_accuracy"], 0.75);
    assert_eq!(best["loss"], 0.9);
    assert_eq!(history.final_metrics()["val_accuracy"], 0.5);

    // non-finite values never win
    assert_eq!(history.best_epoch(&Objective::minimize("val_loss")), Some(0));
    assert_eq!(history.metrics_at(3)["val_loss"], 0.65);
}

#[test]
fn test_best_metrics_without_objective_are_final() {
    let history = history_of(&[("loss", &[0.9, 0.4]), ("accuracy", &[0.5, 1.0])]);
    let objective = Objective::maximize("val_accuracy");
    assert_eq!(history.best_epoch(&objective), None);
    assert_eq!(history.best_metrics(&objective), history.final_metrics());
}

#[test]
fn test_fit_best_epoch_keeps_peak_weights() {
    let (x, y) = toy_data();
    let options = FitOptions {
        validation_split: 0.5,
        ..quiet(10)
    };
    let objective = Objective::maximize("val_accuracy");
    let mut model = tiny_model(1);
    let history = model.fit_best_epoch(&x, &y, &options, &objective).unwrap();
    let best = history.best_epoch(&objective).unwrap();

    // the trailing half is the validation set
    let val_rows = [4, 5, 6, 7];
    let x_val = x.select_rows(&val_rows).unwrap();
    let y_val = OneHot::from_indices(y.indices()[4..].to_vec(), 2).unwrap();
    let scored = model.evaluate(&x_val, &y_val).unwrap();
    let values = history.get("val_accuracy").unwrap();
    assert_eq!(scored.accuracy, values[best]);
    assert_eq!(scored.loss, history.get("val_loss").unwrap()[best]);
    assert!(values.iter().all(|&v| v <= values[best]));
}

#[test]
fn test_fit_best_epoch_without_validation_keeps_final_weights() {
    let (x, y) = toy_data();
    let objective = Objective::maximize("val_accuracy");
    let mut plain = tiny_model(8);
    let mut monitored = tiny_model(8);
    plain.fit(&x, &y, &quiet(3)).unwrap();
    let history = monitored.fit_best_epoch(&x, &y, &quiet(3), &objective).unwrap();
    assert_eq!(history.best_epoch(&objective), None);
    assert_eq!(plain.predict(&x).unwrap(), monitored.predict(&x).unwrap());
}

#[test]
fn test_fit_is_reproducible_with_dropout() {
    // shuffle follows the fit seed, dropout masks follow the build seed
    let (x, y) = toy_data();
    let config = CharCnnConfig {
        dropout: 0.5,
        ..tiny_config()
    };
    let build = || {
        Model::new(config.clone(), INPUT_LEN, quantizer().vocabulary_size(), 2, 1e-2, Some(9))
            .unwrap()
    };
    let a = build().fit(&x, &y, &quiet(3)).unwrap();
    let b = build().fit(&x, &y, &quiet(3)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_save_and_load_keep_quantizer_settings() {
    let dir = tempfile::tempdir().unwrap();
    let settings = QuantizerConfig {
        input_length: INPUT_LEN,
        padding: crate::text::Padding::Left,
        reverse: false,
        ..QuantizerConfig::default()
    };
    tiny_model(3).with_quantizer(settings.clone()).save(dir.path()).unwrap();
    let loaded = Model::load(dir.path()).unwrap();
    assert_eq!(loaded.quantizer(), Some(&settings));

    let bare = tempfile::tempdir().unwrap();
    tiny_model(3).save(bare.path()).unwrap();
    assert_eq!(Model::load(bare.path()).unwrap().quantizer(), None);
}
