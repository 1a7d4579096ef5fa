#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod capacity;
pub mod config;
pub mod partition;
pub mod predict;
pub mod predictor;
pub mod stats;
pub mod types;
#[path = "../shared/files.rs"]
pub mod shared_files;
pub mod shared {
    pub use super::shared_files as files;
}

#[path = "../vcf/mod.rs"]
pub mod vcf;
