//! perfcollector - Host performance metrics collector library.
//!
//! Samples CPU, memory, network and disk counters from `/proc`, derives
//! rates against the previous sample and emits one snapshot per tick.
//! The `perfcollectord` binary drives the sampling loop.

pub mod collector;
pub mod fmt;
pub mod rates;
pub mod storage;
pub mod util;
