mod category;
mod image_policy;
mod snapshot;

pub use category::{Category, CategoryRecord};
pub use image_policy::ImagePolicy;
pub use snapshot::{Snapshot, SnapshotDiff};
