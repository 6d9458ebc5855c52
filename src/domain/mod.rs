pub mod intervals;
pub mod models;
pub mod rounding;
pub mod segmenter;
pub mod update;
