//! Statistical summaries for the storecast pipeline.
//!
//! The training pipeline fits one model per store and records a fit-quality
//! score for each of them. This crate condenses those per-store scores into
//! run-level diagnostics.
//!
//! # Modules
//!
//! - [`descriptive`]: Mean, median, variance, standard deviation, etc.
//! - [`percentiles`]: Nearest-rank percentile computation and storage
//!
//! # Examples
//!
//! ## Summarizing per-store scores
//!
//! ```
//! use storecast_stats::descriptive::DescriptiveStats;
//!
//! let scores = [0.5, 0.75, 1.0];
//! let stats = DescriptiveStats::new(scores).unwrap();
//! assert_eq!(stats.mean, 0.75);
//! ```
//!
//! ## Computing percentiles
//!
//! ```
//! use storecast_stats::percentiles::Percentiles;
//!
//! let values = [1.0, 2.0, 3.0, 4.0, 5.0];
//! let percentiles = Percentiles::new(&values, &[25.0, 50.0, 75.0]);
//! assert_eq!(percentiles.get(50.0), Some(3.0));
//! ```

pub mod descriptive;
pub mod percentiles;
