//! Metrics collection infrastructure.
//!
//! # Usage
//!
//! ```ignore
//! use allwatch_core::metrics::new_shared_registry;
//!
//! let registry = new_shared_registry();
//! registry.record_batch(3);
//! let prometheus_text = registry.to_prometheus();
//! ```

mod registry;

pub use registry::{new_shared_registry, MetricsRegistry, SharedMetricsRegistry};
