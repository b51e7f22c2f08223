pub mod basis;
pub mod blocks;
pub mod config;
pub mod corpus;
pub mod dictionary;
pub mod error;
pub mod math;
pub mod pipeline;
pub mod progress;
pub mod relations;
pub mod similarity;
pub mod vectors;

pub use config::{files_handling, Config, JsonTypes};
pub use error::{Result, WackyError};
pub use pipeline::{Context, Pipeline};
pub use similarity::find_k_most_similar;
