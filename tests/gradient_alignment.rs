use latentbridge::core::alignment::gradient::{GradientAligner, GradientConfig};
use latentbridge::core::alignment::synthetic::generate_synthetic_anchor_points;
use latentbridge::AlignmentMethod;

fn config(seed: u64) -> GradientConfig {
    GradientConfig { learning_rate: 0.05, epochs: 200, seed: Some(seed), ..GradientConfig::default() }
}

#[test]
fn loss_decreases_from_first_epoch() {
    let data = generate_synthetic_anchor_points(8, 6, 60, 0.01, 1).unwrap();
    let out = GradientAligner::new(config(7)).train(&data.source, &data.target).unwrap();

    let first = out.validation_losses[0];
    assert!(out.best_validation_loss <= first);
    assert!(out.best_validation_loss < 0.5 * first, "first={first} best={}", out.best_validation_loss);
    assert_eq!(out.train_losses.len(), out.epochs_run);
    assert!(out.epochs_run <= 200);
    assert!(out.convergence_epoch >= 1 && out.convergence_epoch <= out.epochs_run);
    assert_eq!(out.alignment.metadata.method, AlignmentMethod::Gradient);
    assert_eq!(out.alignment.weights.shape(), (6, 8));
    assert!((out.alignment.epsilon - out.best_validation_loss.sqrt()).abs() < 1e-12);
}

#[test]
fn same_seed_same_result() {
    let data = generate_synthetic_anchor_points(5, 5, 50, 0.05, 2).unwrap();
    let cfg = GradientConfig { epochs: 20, ..config(11) };
    let a = GradientAligner::new(cfg).train(&data.source, &data.target).unwrap();
    let b = GradientAligner::new(cfg).train(&data.source, &data.target).unwrap();
    assert_eq!(a.alignment.weights, b.alignment.weights);
    assert_eq!(a.validation_losses, b.validation_losses);
}

#[test]
fn patience_stops_training() {
    let data = generate_synthetic_anchor_points(4, 4, 50, 0.0, 3).unwrap();
    // A vanishing learning rate never improves by min_delta.
    let cfg = GradientConfig {
        learning_rate: 1e-12,
        orthogonality_weight: 0.0,
        min_delta: 1.0,
        patience: 3,
        ..config(5)
    };
    let out = GradientAligner::new(cfg).train(&data.source, &data.target).unwrap();
    assert!(out.stopped_early);
    // Epoch 1 improves on infinity; three stale epochs follow.
    assert_eq!(out.epochs_run, 4);
    assert_eq!(out.convergence_epoch, 1);
}

#[test]
fn invalid_settings_rejected() {
    let data = generate_synthetic_anchor_points(3, 3, 10, 0.0, 4).unwrap();
    let bad = GradientConfig { batch_size: 0, ..GradientConfig::default() };
    assert!(GradientAligner::new(bad).train(&data.source, &data.target).is_err());
    let bad = GradientConfig { validation_split: 1.0, ..GradientConfig::default() };
    assert!(GradientAligner::new(bad).train(&data.source, &data.target).is_err());
}
