use approx::assert_abs_diff_eq;
use ndarray::{Array2, Axis};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use scatter_pca::PcaModel;
use tempfile::NamedTempFile;

fn random_matrix(n_samples: usize, n_features: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array2::from_shape_fn((n_samples, n_features), |_| rng.gen_range(-1.0..1.0))
}

#[test]
fn round_trip_without_whitening_or_truncation() {
    // Full-rank data, all components kept: the projection is a rotation and
    // inverse_transform(transform(X)) must reproduce X.
    let x = random_matrix(20, 5, 42);
    let mut model = PcaModel::new();
    model.fit(x.clone()).unwrap();
    assert_eq!(model.n_components_retained(), Some(5));

    let z = model.transform(&x).unwrap();
    assert_eq!(z.dim(), (20, 5));
    let back = model.inverse_transform(&z).unwrap();

    for (&a, &b) in x.iter().zip(back.iter()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-8);
    }
}

#[test]
fn dual_branch_components_are_orthonormal_and_reconstruct() {
    // More features than samples triggers the Gram-matrix path. Centering
    // drops the rank to n_samples - 1.
    let x = random_matrix(5, 12, 7);
    let mut model = PcaModel::new();
    model.fit(x.clone()).unwrap();
    assert_eq!(model.n_components_retained(), Some(4));

    let components = model.components().unwrap();
    assert_eq!(components.dim(), (4, 12));

    // Rows must be orthonormal: C·Cᵀ = I.
    let gram = components.dot(&components.t());
    for i in 0..4 {
        for j in 0..4 {
            let expected = if i == j { 1.0 } else { 0.0 };
            assert_abs_diff_eq!(gram[[i, j]], expected, epsilon = 1e-8);
        }
    }

    // All surviving directions are retained, so the round trip is exact up
    // to floating point.
    let z = model.transform(&x).unwrap();
    let back = model.inverse_transform(&z).unwrap();
    for (&a, &b) in x.iter().zip(back.iter()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-8);
    }
}

#[test]
fn primal_and_dual_branches_recover_the_same_spectrum() {
    // Fitting X and Xᵀ exercises opposite branches. With centering off and
    // the biased divisor, both decompose XᵀX up to the divisor (8 vs 3), so
    // the eigenvalues agree after undoing it.
    let x = random_matrix(8, 3, 11);

    let mut primal = PcaModel::new().center(false).bias(true);
    primal.fit(x.clone()).unwrap();

    let mut dual = PcaModel::new().center(false).bias(true);
    dual.fit(x.t().to_owned()).unwrap();

    let ev_primal = primal.explained_variance().unwrap();
    let ev_dual = dual.explained_variance().unwrap();
    assert_eq!(ev_primal.len(), 3);
    assert_eq!(ev_dual.len(), 3);

    for (&p, &d) in ev_primal.iter().zip(ev_dual.iter()) {
        assert_abs_diff_eq!(p * 8.0, d * 3.0, epsilon = 1e-8);
    }
}

#[test]
fn explained_variance_is_non_increasing() {
    for (n_samples, n_features, seed) in [(30, 6, 1), (6, 30, 2), (10, 10, 3)] {
        let x = random_matrix(n_samples, n_features, seed);
        let mut model = PcaModel::new();
        model.fit(x).unwrap();

        let ev = model.explained_variance().unwrap();
        for w in ev.windows(2) {
            assert!(
                w[0] >= w[1],
                "explained variance increased: {} < {}",
                w[0],
                w[1]
            );
        }
    }
}

#[test]
fn variance_ratios_sum_to_at_most_one() {
    let x = random_matrix(25, 6, 13);

    // All positive eigenvalues retained: the ratios account for everything.
    let mut full = PcaModel::new();
    full.fit(x.clone()).unwrap();
    let full_sum: f64 = full.explained_variance_ratio().unwrap().sum();
    assert_abs_diff_eq!(full_sum, 1.0, epsilon = 1e-10);
    assert_eq!(full.noise_variance(), Some(0.0));

    // Truncated: the ratio is still relative to the full recovered variance.
    let mut truncated = PcaModel::new().n_components(3);
    truncated.fit(x).unwrap();
    let truncated_sum: f64 = truncated.explained_variance_ratio().unwrap().sum();
    assert!(truncated_sum < 1.0);
    assert!(truncated_sum > 0.0);

    // The discarded tail shows up as noise variance.
    let noise = truncated.noise_variance().unwrap();
    assert!(noise > 0.0);
    let full_ev = full.explained_variance().unwrap();
    let expected_noise = (full_ev[3] + full_ev[4] + full_ev[5]) / 3.0;
    assert_abs_diff_eq!(noise, expected_noise, epsilon = 1e-10);
}

#[test]
fn whitened_projection_has_unit_variance() {
    // Primal branch.
    let x = random_matrix(40, 4, 17);
    let mut model = PcaModel::new().whiten(true);
    model.fit(x.clone()).unwrap();

    let z = model.transform(&x).unwrap();
    let stds = z.map_axis(Axis(0), |column| column.std(1.0));
    for &s in stds.iter() {
        assert_abs_diff_eq!(s, 1.0, epsilon = 1e-8);
    }

    // Dual branch: the Gram eigenvectors are mapped back to feature space
    // and must end up whitened the same way.
    let x = random_matrix(4, 10, 19);
    let mut model = PcaModel::new().whiten(true);
    model.fit(x.clone()).unwrap();
    assert_eq!(model.n_components_retained(), Some(3));

    let z = model.transform(&x).unwrap();
    let stds = z.map_axis(Axis(0), |column| column.std(1.0));
    for &s in stds.iter() {
        assert_abs_diff_eq!(s, 1.0, epsilon = 1e-8);
    }
}

#[test]
fn low_rank_data_resolves_to_its_true_rank() {
    // X = U·V has rank 2; centering cannot raise it because the mean row
    // stays inside the row space of V.
    let u = random_matrix(6, 2, 23);
    let v = random_matrix(2, 5, 29);
    let x = u.dot(&v);

    let mut model = PcaModel::new();
    model.fit(x).unwrap();

    assert_eq!(model.n_components_retained(), Some(2));
    assert_eq!(model.noise_variance(), Some(0.0));
    let ratio_sum: f64 = model.explained_variance_ratio().unwrap().sum();
    assert_abs_diff_eq!(ratio_sum, 1.0, epsilon = 1e-10);
}

#[test]
fn bias_flag_rescales_the_spectrum() {
    let x = random_matrix(5, 3, 31);

    let mut unbiased = PcaModel::new();
    unbiased.fit(x.clone()).unwrap();
    let mut biased = PcaModel::new().bias(true);
    biased.fit(x).unwrap();

    let ev_unbiased = unbiased.explained_variance().unwrap();
    let ev_biased = biased.explained_variance().unwrap();
    assert_eq!(ev_unbiased.len(), ev_biased.len());

    // Divisor 5 instead of 4 scales every eigenvalue by 4/5.
    for (&u, &b) in ev_unbiased.iter().zip(ev_biased.iter()) {
        assert_abs_diff_eq!(b, u * 4.0 / 5.0, epsilon = 1e-10);
    }
}

#[test]
fn saved_model_round_trips_through_disk() {
    let x = random_matrix(10, 4, 37);
    let mut model = PcaModel::new().n_components(2);
    model.fit(x.clone()).unwrap();

    let file = NamedTempFile::new().unwrap();
    model.save_model(file.path()).unwrap();
    let loaded = PcaModel::load_model(file.path()).unwrap();

    assert_eq!(loaded.n_components_retained(), Some(2));
    assert_eq!(loaded.mean().unwrap(), model.mean().unwrap());
    assert_eq!(loaded.components().unwrap(), model.components().unwrap());
    assert_eq!(
        loaded.explained_variance().unwrap(),
        model.explained_variance().unwrap()
    );

    let z_original = model.transform(&x).unwrap();
    let z_loaded = loaded.transform(&x).unwrap();
    assert_eq!(z_original, z_loaded);
}

#[test]
fn saving_an_unfitted_model_fails() {
    let model = PcaModel::new();
    let file = NamedTempFile::new().unwrap();
    assert!(model.save_model(file.path()).is_err());
}

#[test]
fn loading_a_corrupt_file_fails() {
    use std::io::Write;

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"not a pca model").unwrap();
    file.flush().unwrap();
    assert!(PcaModel::load_model(file.path()).is_err());
}
