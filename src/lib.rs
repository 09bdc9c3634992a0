//! Network path quality checking over ICMP echo.
//!
//! A [`QualityChecker`] sends a short, evenly spaced batch of echo probes to a
//! target, times each reply and grades the batch into a [`QualityVerdict`].

pub mod analyzer;
pub mod checker;
pub mod config;
pub mod error;
pub mod export;
pub mod measure;
pub mod prefs;
pub mod probe;
pub mod state;

pub use analyzer::{QualityAnalyzer, SampleAnalyzer};
pub use checker::{QualityChecker, QualityObserver};
pub use config::{Config, Thresholds};
pub use error::{Error, Result, TransportError};
pub use state::{BatchState, LossReason, MeasurementReport, ProbeRecord, ProbeSample, QualityVerdict};
