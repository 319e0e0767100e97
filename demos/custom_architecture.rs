//! Drives the building blocks by hand instead of going through `AutoEncoder`.

use ae_outlier::score::reconstruction_distances;
use ae_outlier::{
    Activation, Architecture, Calibration, Loss, Matrix, Optimizer, Standardizer, TrainConfig,
    Verbosity, train,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn main() -> ae_outlier::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ae_outlier=debug".into()),
        )
        .init();

    // Points on a helix; the last row sits off the curve.
    let mut rows: Vec<[f32; 3]> = (0..300)
        .map(|i| {
            let t = i as f32 * 0.05;
            [t.cos(), t.sin(), t * 0.1]
        })
        .collect();
    rows.push([0.0, 0.0, 0.75]);
    let x = Matrix::from_rows(&rows)?;
    let (x_norm, standardizer) = Standardizer::fit_transform(&x)?;
    println!("mean={:?} scale={:?}", standardizer.mean(), standardizer.scale());

    let arch = Architecture {
        feature_count: x.cols(),
        effective_hidden_widths: vec![x.cols(), 8, 2, 8],
        hidden_activation: Activation::Tanh,
        output_activation: Activation::Identity,
        dropout_rate: 0.0,
        l2_penalty: 1e-4,
        loss: Loss::Mse,
        optimizer: Optimizer::SgdMomentum { momentum: 0.9 },
        learning_rate: 0.01,
    };

    let mut rng = StdRng::seed_from_u64(5);
    let mut compiled = arch.compile(&mut rng)?;
    println!(
        "widths={:?} params={}",
        compiled.network.widths(),
        compiled.network.num_params()
    );

    let cfg = TrainConfig {
        epochs: 200,
        batch_size: 16,
        validation_fraction: 0.2,
        verbosity: Verbosity::Silent,
    };
    let history = train::train(&mut compiled, &x_norm, &cfg, &mut rng)?;
    if let Some(last) = history.last() {
        println!(
            "epoch={} train_loss={:.5} val_loss={:?}",
            last.epoch, last.train_loss, last.val_loss
        );
    }

    let reconstructed = compiled.network.predict(&x_norm)?;
    let scores = reconstruction_distances(&x_norm, &reconstructed)?;
    let calibration = Calibration::from_scores(&scores, 0.01)?;
    println!(
        "threshold={:.4} outliers={} last_row_score={:.4} last_row_label={}",
        calibration.threshold,
        calibration.n_outliers(),
        scores[scores.len() - 1],
        calibration.labels[scores.len() - 1]
    );

    Ok(())
}
