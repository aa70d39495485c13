//! Metrics plumbing for the autoscaler
//!
//! Two directions: [`source`] consumes signal values from a Prometheus-style
//! metrics backend, and [`exporter`] produces the controller's own metrics
//! for scraping.

pub mod exporter;
pub mod source;

pub use source::{MetricsSource, PrometheusSource};
