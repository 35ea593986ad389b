pub mod classifier;
pub mod config;
pub mod encoding;
pub mod features;
pub mod frequency;
pub mod hits;
pub mod models;
pub mod predictor;
pub mod shared;
