
// imports
use crate::error::{Result, WackyError};

use ndarray::{Array1, ArrayView1};

/// Score reported for two vectors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimilarityMeasure {
    /// `(u·v)/(|u||v|)`
    Cosine,
    /// `1 - acos(cosine)/π`, in [0, 1]
    Angular,
}

impl SimilarityMeasure {

    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "cosine" => Ok(SimilarityMeasure::Cosine),
            "angular" => Ok(SimilarityMeasure::Angular),
            other => Err(WackyError::InvalidConfig(format!("unrecognized similarity {}", other))),
        }
    }

    pub fn score<M: VectorMath + ?Sized>(&self, math: &M, u: ArrayView1<f32>, v: ArrayView1<f32>) -> f32 {
        let cosine = math.cosine(u, v);
        match self {
            SimilarityMeasure::Cosine => cosine,
            SimilarityMeasure::Angular => 1.0 - cosine.acos() / std::f32::consts::PI,
        }
    }
}

/// Vector primitives the composition models are built from.
pub trait VectorMath: Sync {

    fn dot(&self, u: ArrayView1<f32>, v: ArrayView1<f32>) -> f32;

    /// Cosine similarity clamped to [-1, 1], accumulated in f64. When `|u||v|` is below
    /// `f32::EPSILON` or not finite the similarity is undefined and 0 is returned.
    fn cosine(&self, u: ArrayView1<f32>, v: ArrayView1<f32>) -> f32 {

        let (uv, uu, vv) = u.iter().zip(v.iter()).fold((0.0f64, 0.0f64, 0.0f64), |(uv, uu, vv), (a, b)| {
            let (a, b) = (f64::from(*a), f64::from(*b));
            (uv + a * b, uu + a * a, vv + b * b)
        });
        let norms = uu.sqrt() * vv.sqrt();
        if !norms.is_finite() || norms < f64::from(f32::EPSILON) {
            return 0.0;
        }
        let cosine = uv / norms;
        if cosine.is_finite() {
            cosine.clamp(-1.0, 1.0) as f32
        } else {
            0.0
        }
    }

    /// Flattened outer product, `u[i] * v[j]` at `i * v.len() + j`.
    fn outer(&self, u: ArrayView1<f32>, v: ArrayView1<f32>) -> Array1<f32>;

    fn add(&self, u: ArrayView1<f32>, v: ArrayView1<f32>) -> Array1<f32>;

    fn mul(&self, u: ArrayView1<f32>, v: ArrayView1<f32>) -> Array1<f32>;
}

/// [`VectorMath`] on ndarray's own kernels.
#[derive(Clone, Copy, Debug, Default)]
pub struct NdMath;

impl VectorMath for NdMath {

    fn dot(&self, u: ArrayView1<f32>, v: ArrayView1<f32>) -> f32 {
        u.dot(&v)
    }

    fn outer(&self, u: ArrayView1<f32>, v: ArrayView1<f32>) -> Array1<f32> {
        let m = v.len();
        Array1::from_shape_fn(u.len() * m, |k| u[k / m] * v[k % m])
    }

    fn add(&self, u: ArrayView1<f32>, v: ArrayView1<f32>) -> Array1<f32> {
        &u + &v
    }

    fn mul(&self, u: ArrayView1<f32>, v: ArrayView1<f32>) -> Array1<f32> {
        &u * &v
    }
}
