// PCA model: fit by scatter-matrix eigendecomposition, project, reconstruct.

use log::{debug, warn};
use ndarray::{s, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::eig;

/// Principal component analysis model.
///
/// Configuration (component count, whitening, centering, covariance bias) is
/// fixed at construction; the fitted state (mean, components, explained
/// variances, noise variance) is produced by [`fit`](PcaModel::fit) and
/// consumed by [`transform`](PcaModel::transform) and
/// [`inverse_transform`](PcaModel::inverse_transform). Each successful `fit`
/// rewrites the fitted state completely; a failed `fit` leaves any previous
/// fitted state untouched.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PcaModel {
    /// Requested number of components; `None` keeps every component that
    /// survives the eigenvalue filter.
    n_components: Option<usize>,
    whiten: bool,
    center: bool,
    /// Selects the covariance divisor: `N` when true, `N - 1` when false.
    bias: bool,

    /// Per-feature mean of the training data; zero vector when centering is
    /// disabled. Shape: (n_features).
    mean: Option<Array1<f64>>,
    /// Resolved component count after fitting.
    n_retained: Option<usize>,
    /// Retained basis vectors as rows, whitening scaling already applied.
    /// Shape: (n_retained, n_features).
    components: Option<Array2<f64>>,
    /// Variance along each retained component, descending.
    /// Shape: (n_retained).
    explained_variance: Option<Array1<f64>>,
    /// `explained_variance` divided by the total variance of *all* filtered
    /// eigenvalues, retained or not. Shape: (n_retained).
    explained_variance_ratio: Option<Array1<f64>>,
    /// Mean variance of the discarded components; 0.0 when none were
    /// discarded.
    noise_variance: Option<f64>,
}

impl Default for PcaModel {
    fn default() -> Self {
        Self::new()
    }
}

impl PcaModel {
    /// Creates an unfitted model with the default configuration: keep all
    /// retained components, center the data, unbiased (`N - 1`) covariance
    /// divisor, no whitening.
    ///
    /// # Examples
    ///
    /// ```
    /// use scatter_pca::PcaModel;
    /// let model = PcaModel::new();
    /// ```
    pub fn new() -> Self {
        Self {
            n_components: None,
            whiten: false,
            center: true,
            bias: false,
            mean: None,
            n_retained: None,
            components: None,
            explained_variance: None,
            explained_variance_ratio: None,
            noise_variance: None,
        }
    }

    /// Sets the number of components to retain.
    ///
    /// Requests beyond the number of eigenvalues surviving the filter are
    /// clamped during `fit` (with a warning) rather than failing.
    pub fn n_components(mut self, n_components: usize) -> Self {
        self.n_components = Some(n_components);
        self
    }

    /// Enables or disables whitening: each retained component is scaled by
    /// the inverse square root of its eigenvalue so the projected training
    /// data has unit variance along it. Whitened components are no longer
    /// orthonormal, which makes `inverse_transform` lossy.
    pub fn whiten(mut self, whiten: bool) -> Self {
        self.whiten = whiten;
        self
    }

    /// Enables or disables mean centering before the scatter matrix is
    /// formed. Enabled by default.
    pub fn center(mut self, center: bool) -> Self {
        self.center = center;
        self
    }

    /// Selects the biased covariance estimator (divisor `N` instead of
    /// `N - 1`). Disabled by default.
    pub fn bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    /// Returns the per-feature mean of the training data, if fitted.
    pub fn mean(&self) -> Option<&Array1<f64>> {
        self.mean.as_ref()
    }

    /// Returns the retained components as rows of an
    /// `(n_retained, n_features)` matrix, if fitted.
    pub fn components(&self) -> Option<&Array2<f64>> {
        self.components.as_ref()
    }

    /// Returns the resolved number of retained components, if fitted.
    pub fn n_components_retained(&self) -> Option<usize> {
        self.n_retained
    }

    /// Returns the variance along each retained component (descending), if
    /// fitted.
    pub fn explained_variance(&self) -> Option<&Array1<f64>> {
        self.explained_variance.as_ref()
    }

    /// Returns the fraction of total recovered variance attributable to each
    /// retained component, if fitted.
    pub fn explained_variance_ratio(&self) -> Option<&Array1<f64>> {
        self.explained_variance_ratio.as_ref()
    }

    /// Returns the mean variance of the discarded components (0.0 when none
    /// were discarded), if fitted.
    pub fn noise_variance(&self) -> Option<f64> {
        self.noise_variance
    }

    /// Fits the model to `x`, an `(n_samples, n_features)` matrix.
    ///
    /// The matrix is taken by value: centering works on the model's own copy,
    /// never through a borrow of caller memory. The fit centers the data
    /// (when configured), forms the smaller of the two scatter matrices
    /// (`XᵀX / N` when `n_features < n_samples`, `XXᵀ / N` otherwise),
    /// eigendecomposes it, maps dual eigenvectors back to feature space when
    /// needed, applies whitening, resolves the retained component count, and
    /// estimates the noise variance of whatever was discarded.
    ///
    /// Returns `&mut Self` for chaining.
    ///
    /// # Errors
    ///
    /// Returns an error if `x` has zero samples or zero features, if the
    /// unbiased divisor is configured with fewer than 2 samples, or if the
    /// eigendecomposition fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use ndarray::array;
    /// use scatter_pca::PcaModel;
    ///
    /// let x = array![[1.0, 2.0], [3.0, 4.0], [5.0, 7.0]];
    /// let mut model = PcaModel::new();
    /// model.fit(x).unwrap();
    /// assert!(model.components().is_some());
    /// ```
    pub fn fit(&mut self, mut x: Array2<f64>) -> Result<&mut Self, Box<dyn Error>> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples == 0 || n_features == 0 {
            return Err("Input matrix has zero samples or zero features.".into());
        }
        if !self.bias && n_samples < 2 {
            return Err("Unbiased covariance (bias = false) requires at least 2 samples.".into());
        }

        let n = if self.bias {
            n_samples as f64
        } else {
            (n_samples - 1) as f64
        };

        let mean_vector = if self.center {
            let m = x
                .mean_axis(Axis(0))
                .ok_or("Failed to compute mean of the data.")?;
            x -= &m;
            m
        } else {
            Array1::zeros(n_features)
        };

        // Never decompose anything larger than min(n_samples, n_features)
        // squared.
        let (axes, eigenvalues) = if n_features < n_samples {
            debug!(
                "fit: primal branch, {}x{} covariance matrix",
                n_features, n_features
            );
            let scatter = x.t().dot(&x) / n;
            let (mut vecs, vals) = eig::decompose(&scatter, eig::DEFAULT_EPS)?;
            if self.whiten {
                for (mut col, &val) in vecs.columns_mut().into_iter().zip(vals.iter()) {
                    let w = val.powf(-0.5);
                    col.mapv_inplace(|v| v * w);
                }
            }
            (vecs, vals)
        } else {
            debug!(
                "fit: dual branch, {}x{} Gram matrix",
                n_samples, n_samples
            );
            let scatter = x.dot(&x.t()) / n;
            let (dual_vecs, vals) = eig::decompose(&scatter, eig::DEFAULT_EPS)?;
            let mut vecs = x.t().dot(&dual_vecs);
            // Map sample-space eigenvectors back to feature space. Projecting
            // a unit Gram eigenvector through Xᵀ yields a vector of norm
            // √(N·λ), so (N·λ)^(-1/2) restores the unit length the primal
            // branch produces; whitening then divides by √λ exactly as in the
            // primal branch.
            for (mut col, &val) in vecs.columns_mut().into_iter().zip(vals.iter()) {
                let w = if self.whiten {
                    (n * val).powf(-0.5) / val.sqrt()
                } else {
                    (n * val).powf(-0.5)
                };
                col.mapv_inplace(|v| v * w);
            }
            (vecs, vals)
        };

        let n_available = eigenvalues.len();
        let n_retained = match self.n_components {
            None => n_available,
            Some(k) if k > n_available => {
                warn!(
                    "Requested {} components but only {} eigenvalues survive the filter; clamping.",
                    k, n_available
                );
                n_available
            }
            Some(k) => k,
        };
        debug!(
            "fit: retaining {} of {} recovered components",
            n_retained, n_available
        );

        // Mean of an empty slice is None, which is exactly the "nothing was
        // discarded" case.
        let noise_variance = eigenvalues.slice(s![n_retained..]).mean().unwrap_or(0.0);

        let total_variance = eigenvalues.sum();
        let explained_variance = eigenvalues.slice(s![..n_retained]).to_owned();
        let explained_variance_ratio = &explained_variance / total_variance;
        let components = axes.t().slice(s![..n_retained, ..]).to_owned();

        self.mean = Some(mean_vector);
        self.n_retained = Some(n_retained);
        self.components = Some(components);
        self.explained_variance = Some(explained_variance);
        self.explained_variance_ratio = Some(explained_variance_ratio);
        self.noise_variance = Some(noise_variance);

        Ok(self)
    }

    /// Projects `x` onto the retained components: `Z = (X − mean)·componentsᵀ`.
    ///
    /// `x` has shape `(m_samples, n_features)` with the fitted feature count;
    /// the result has shape `(m_samples, n_retained)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the model is not fitted or if the feature
    /// dimension of `x` does not match the fitted model.
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>, Box<dyn Error>> {
        let components = self
            .components
            .as_ref()
            .ok_or("PCA model is not fitted; call fit first.")?;
        let mean = self
            .mean
            .as_ref()
            .ok_or("PCA model is not fitted; call fit first.")?;

        if x.ncols() != mean.len() {
            return Err(format!(
                "Input feature dimension ({}) does not match the fitted feature dimension ({}).",
                x.ncols(),
                mean.len()
            )
            .into());
        }

        let centered = x - mean;
        Ok(centered.dot(&components.t()))
    }

    /// Maps latent coordinates back to feature space: `X = Z·components + mean`.
    ///
    /// `z` has shape `(m_samples, n_retained)`; the result has shape
    /// `(m_samples, n_features)`. When whitening is enabled this is *not* an
    /// exact inverse of [`transform`](PcaModel::transform): the whitened
    /// components are not orthonormal, so the whitening-induced rescaling is
    /// not undone.
    ///
    /// # Errors
    ///
    /// Returns an error if the model is not fitted or if the component
    /// dimension of `z` does not match the fitted model.
    pub fn inverse_transform(&self, z: &Array2<f64>) -> Result<Array2<f64>, Box<dyn Error>> {
        let components = self
            .components
            .as_ref()
            .ok_or("PCA model is not fitted; call fit first.")?;
        let mean = self
            .mean
            .as_ref()
            .ok_or("PCA model is not fitted; call fit first.")?;

        if z.ncols() != components.nrows() {
            return Err(format!(
                "Input component dimension ({}) does not match the fitted component count ({}).",
                z.ncols(),
                components.nrows()
            )
            .into());
        }

        Ok(z.dot(components) + mean)
    }

    /// Saves the fitted model to a file using bincode.
    ///
    /// # Errors
    ///
    /// Returns an error if the model is not fitted, or if file I/O or
    /// serialization fails.
    pub fn save_model<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn Error>> {
        if self.components.is_none() || self.mean.is_none() {
            return Err("Cannot save an unfitted PCA model; call fit first.".into());
        }
        let file = File::create(path.as_ref())
            .map_err(|e| format!("Failed to create file at {:?}: {}", path.as_ref(), e))?;
        let mut writer = BufWriter::new(file);

        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())
            .map_err(|e| format!("Failed to serialize PCA model: {}", e))?;
        Ok(())
    }

    /// Loads a model previously saved with [`save_model`](PcaModel::save_model).
    ///
    /// # Errors
    ///
    /// Returns an error if file I/O or deserialization fails, or if the
    /// loaded model is incomplete, has inconsistent dimensions, or carries
    /// non-finite/negative variances.
    pub fn load_model<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn Error>> {
        let file = File::open(path.as_ref())
            .map_err(|e| format!("Failed to open file at {:?}: {}", path.as_ref(), e))?;
        let mut reader = BufReader::new(file);

        let model: PcaModel =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
                .map_err(|e| format!("Failed to deserialize PCA model: {}", e))?;

        let components = model
            .components
            .as_ref()
            .ok_or("Loaded PCA model is missing its components matrix.")?;
        let mean = model
            .mean
            .as_ref()
            .ok_or("Loaded PCA model is missing its mean vector.")?;
        let explained_variance = model
            .explained_variance
            .as_ref()
            .ok_or("Loaded PCA model is missing its explained variances.")?;
        let explained_variance_ratio = model
            .explained_variance_ratio
            .as_ref()
            .ok_or("Loaded PCA model is missing its explained variance ratios.")?;
        let noise_variance = model
            .noise_variance
            .ok_or("Loaded PCA model is missing its noise variance.")?;
        let n_retained = model
            .n_retained
            .ok_or("Loaded PCA model is missing its retained component count.")?;

        if components.ncols() != mean.len() {
            return Err(format!(
                "Loaded PCA model is inconsistent: components have {} features but mean has {}.",
                components.ncols(),
                mean.len()
            )
            .into());
        }
        if components.nrows() != n_retained
            || explained_variance.len() != n_retained
            || explained_variance_ratio.len() != n_retained
        {
            return Err(format!(
                "Loaded PCA model is inconsistent: {} retained components but components/variance/ratio lengths are {}/{}/{}.",
                n_retained,
                components.nrows(),
                explained_variance.len(),
                explained_variance_ratio.len()
            )
            .into());
        }
        if explained_variance.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err("Loaded PCA model has non-finite or negative explained variances.".into());
        }
        if !noise_variance.is_finite() || noise_variance < 0.0 {
            return Err("Loaded PCA model has a non-finite or negative noise variance.".into());
        }

        Ok(model)
    }
}
