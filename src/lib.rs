// Principal component analysis by scatter-matrix eigendecomposition.

#![doc = include_str!("../README.md")]

pub mod eig;
mod pca;

pub use pca::PcaModel;
