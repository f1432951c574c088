#![allow(dead_code)]

pub use log::{info, warn};

pub type Mat = ndarray::Array2<f64>;
pub type CountMat = ndarray::Array2<u32>;
