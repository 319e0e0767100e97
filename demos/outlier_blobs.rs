use ae_outlier::{AutoEncoder, AutoEncoderConfig, Matrix, Verbosity};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn main() -> ae_outlier::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ae_outlier=info".into()),
        )
        .init();

    // Two correlated blobs in 6 dimensions plus a handful of scattered points.
    let mut rng = StdRng::seed_from_u64(0);
    let mut rows = Vec::new();
    for center in [-2.0_f32, 2.0] {
        for _ in 0..200 {
            let t: f32 = rng.gen_range(-1.0..1.0);
            let row: Vec<f32> = (0..6)
                .map(|j| center + t * (j as f32 + 1.0) * 0.3 + rng.gen_range(-0.05..0.05))
                .collect();
            rows.push(row);
        }
    }
    let planted: Vec<usize> = (0..6).map(|k| k * 67 + 5).collect();
    for &i in &planted {
        rows[i] = (0..6).map(|_| rng.gen_range(-6.0..6.0)).collect();
    }
    let x = Matrix::from_rows(&rows)?;

    let config = AutoEncoderConfig::default()
        .with_hidden_layer_widths([4, 2, 4])
        .with_epochs(60)
        .with_verbosity(Verbosity::PerEpoch)
        .with_contamination(0.02)
        .with_random_seed(42);
    let mut detector = AutoEncoder::new(config)?;
    let fitted = detector.fit(&x)?;

    println!(
        "widths={:?} encoding_width={} compression_ratio={} threshold={:.4}",
        fitted.effective_hidden_widths,
        fitted.encoding_width,
        fitted.compression_ratio,
        fitted.threshold
    );

    let mut ranked: Vec<(usize, f32)> = fitted.decision_scores.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    for (i, score) in ranked.iter().take(10) {
        let tag = if planted.contains(i) { "planted" } else { "" };
        println!("row={i:>3} score={score:.4} label={} {tag}", fitted.labels[*i]);
    }

    let fresh = Matrix::from_rows(&[vec![2.0_f32; 6], vec![5.0, -5.0, 5.0, -5.0, 5.0, -5.0]])?;
    println!("fresh scores={:?}", detector.score(&fresh)?);
    println!("fresh labels={:?}", detector.predict(&fresh)?);

    Ok(())
}
