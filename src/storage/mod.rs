//! Storage for collected data: the snapshot model and the previous-sample table.

pub mod model;
mod sample_store;

pub use sample_store::{KERNEL_ID, Sample, SampleRecord, SampleStore, Stamped};
