//! Inkgrid - Glyph Variant Atlas & Provenance Engine
//!
//! Inkgrid catalogues every occurrence of every character in a segmented
//! calligraphy document, compares occurrences of the same character by visual
//! resemblance, groups them into variant clusters, and maps each occurrence
//! back to its position on the source page.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use inkgrid::{AtlasConfig, AtlasSession};
//!
//! # async fn example() -> inkgrid::Result<()> {
//! let session = AtlasSession::open("data/lantingxu/index.json", AtlasConfig::default()).await?;
//! match session.cluster_variants("之").await {
//!     inkgrid::Analysis::Ready(set) => println!("{} variants", set.clusters.len()),
//!     inkgrid::Analysis::Unavailable(reason) => println!("{}", reason),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Index** (`index`): read-only catalogue of occurrences with page and character lookups
//! - **Features** (`features`): bitmap loading and memoized z-scored grayscale vectors
//! - **Similarity** (`similarity`): distance ranking against a reference occurrence
//! - **Clustering** (`cluster`): deterministic k-means over feature vectors
//! - **Locator** (`locator`): page-pixel crop boxes to on-screen highlights
//! - **Cache** (`cache`): precomputed analysis resource and identity-based translation
//! - **Scheduler** (`scheduler`): batched live computation with generation tokens
//! - **Core** (`core`): configuration, resource I/O and the [`AtlasSession`] facade

#![deny(unsafe_code)]

pub mod cache;
pub mod cluster;
pub mod core;
pub mod error;
pub mod features;
pub mod index;
pub mod locator;
pub mod scheduler;
pub mod similarity;
pub mod types;

pub use error::{InkgridError, Result};
pub use types::*;

pub use cache::{AnalysisCache, CharacterAnalysis, FeatureDescriptor, IdentityLookup, build_analysis};
pub use cluster::{ClusterParams, cluster_occurrences};
pub use core::config::AtlasConfig;
pub use core::session::{AtlasSession, ResourceStatus, Selection};
pub use features::{BitmapSource, FeatureExtractor, FsBitmapSource, MemoryBitmapSource, extract_features};
pub use index::{IndexStats, OccurrenceIndex, PageLayout};
pub use locator::{FitTransform, Size, locate};
pub use scheduler::{Published, Scheduler, Ticket};
pub use similarity::{euclidean_distance, rank_by_distance};
