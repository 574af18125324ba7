//! # Photosync - One-way photo library backup
//!
//! Mirrors a hierarchical photo library into a flat object-storage bucket.
//! Every photo missing from the bucket is copied there; every bucket object
//! whose photo is gone from the library is hidden (never erased).
//!
//! ## Overview
//!
//! A sync is a diff of two sorted streams:
//!
//! - the library, walked depth-first in key order ([`SourceWalk`])
//! - the bucket, listed under a prefix ([`TargetStore::list_objects`])
//!
//! Both are merged in lockstep by [`OrderedMerge`], holding one element of
//! lookahead per side, so neither the library tree nor the bucket listing
//! is ever loaded into memory as a whole.
//!
//! ## Keys
//!
//! A photo lands in the bucket under
//!
//! ```text
//! <folder>/<album>/<stem>.<fingerprint>.<extension>
//! ```
//!
//! where the fingerprint covers caption, date, file name, keywords and
//! title (see [`projection`]). Editing any of them moves the photo to a new
//! key: the old object is hidden and the new one uploaded.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use photosync::{LocalBucket, LocalSource, SynchronizerBuilder};
//!
//! # fn main() -> photosync::Result<()> {
//! let source = LocalSource::open("./Pictures")?;
//! let bucket = LocalBucket::open("./backup")?;
//!
//! let sync = SynchronizerBuilder::new()
//!     .prefix("Travel/")
//!     .build(source, bucket)?;
//!
//! // See what would happen
//! for action in sync.plan()? {
//!     println!("{:?}", action?);
//! }
//!
//! // Then do it
//! let report = sync.run()?;
//! println!("{} uploaded, {} hidden", report.uploaded, report.hidden);
//! # Ok(())
//! # }
//! ```
//!
//! ## Backends
//!
//! The sync only talks to the [`TreeSource`] and [`TargetStore`] traits.
//! The crate ships in-memory versions of both ([`MemorySource`],
//! [`MemoryBucket`]) and filesystem versions ([`LocalSource`],
//! [`LocalBucket`]).
//!
//! ## Error Handling
//!
//! All operations return `Result<T, SyncError>`. Out-of-order listings,
//! folders that hold both sub-folders and photos, and corrupt downloads
//! are reported as data-integrity errors
//! ([`SyncError::is_data_integrity`]) and stop the run.
//!
//! ## Module Organization
//!
//! - [`merge`]: Ordered merge of two sorted streams
//! - [`projection`]: Bucket key construction
//! - [`source`]: Library trait and in-memory library
//! - [`target`]: Bucket trait, paged listings and in-memory bucket
//! - [`local`]: Filesystem library and bucket
//! - [`walk`]: Key-ordered library walk
//! - [`sync`]: Diff and execution
//! - [`config`]: YAML configuration for the CLI
//! - [`error`]: Error types and handling

// Public API modules
pub mod config;
pub mod error;
pub mod local;
pub mod merge;
pub mod projection;
pub mod source;
pub mod sync;
pub mod target;
pub mod walk;

// Re-export main types for convenience
pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use local::{LocalBucket, LocalSource};
pub use merge::{ordered_merge, ordered_merge_by_key, Aligned, OrderedMerge, SortedReader};
pub use projection::{hash_metadata, project, MediaMetadata, SyncKey};
pub use source::{
    verify_content, ContentLocator, DeclaredContent, MediaItem, MemorySource, NodeKind, TreeNode, TreeSource,
};
pub use sync::{SyncAction, SyncEvent, SyncPlan, SyncReport, Synchronizer, SynchronizerBuilder};
pub use target::{MemoryBucket, TargetObject, TargetStore};
pub use walk::{SourceImage, SourceWalk};
