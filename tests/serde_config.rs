#![cfg(feature = "serde")]

use ae_outlier::{Activation, AutoEncoder, AutoEncoderConfig, History, Loss, Matrix, Optimizer};

#[test]
fn config_round_trips_through_json() {
    let config = AutoEncoderConfig::default()
        .with_hidden_layer_widths([8, 4, 8])
        .with_activations(Activation::LeakyReLU { alpha: 0.2 }, Activation::Identity)
        .with_loss(Loss::Mae)
        .with_optimizer(Optimizer::SgdMomentum { momentum: 0.9 }, 0.05)
        .with_random_seed(9);

    let json = serde_json::to_string(&config).unwrap();
    assert!(json.contains("\"hidden_layer_widths\":[8,4,8]"), "{json}");
    assert!(json.contains("\"kind\":\"sgd_momentum\""), "{json}");

    let back: AutoEncoderConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);
}

#[test]
fn missing_config_fields_take_defaults() {
    let config: AutoEncoderConfig =
        serde_json::from_str(r#"{"hidden_layer_widths":[2,1,2],"epochs":3}"#).unwrap();
    assert_eq!(config.hidden_layer_widths, vec![2, 1, 2]);
    assert_eq!(config.epochs, 3);
    assert_eq!(config.contamination, AutoEncoderConfig::default().contamination);
}

#[test]
fn history_serializes_per_epoch_records() {
    let x = Matrix::from_rows(&[[0.0_f32, 1.0], [1.0, 0.0], [0.5, 0.5], [0.2, 0.9]]).unwrap();
    let config = AutoEncoderConfig::default()
        .with_hidden_layer_widths([1])
        .with_epochs(2)
        .with_validation_fraction(0.0)
        .with_random_seed(4);
    let mut det = AutoEncoder::new(config).unwrap();
    det.fit(&x).unwrap();

    let json = serde_json::to_value(det.history().unwrap()).unwrap();
    let epochs = json["epochs"].as_array().unwrap();
    assert_eq!(epochs.len(), 2);
    assert_eq!(epochs[0]["epoch"], 1);
    assert!(epochs[0]["val_loss"].is_null());

    let back: History = serde_json::from_value(json).unwrap();
    assert_eq!(&back, det.history().unwrap());
}
