pub mod cifar100;
#[cfg(feature = "download")]
pub mod download;
pub mod errors;
pub mod merge;

pub use cifar100::{Batch, Sample};
pub use errors::LoadError;
pub use merge::GroupedTree;
