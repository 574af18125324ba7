//! Library-to-bucket synchronization
//!
//! A sync walks the library in key order ([`SourceWalk`]), lists the bucket
//! under the same prefix, and merges the two streams with
//! [`OrderedMerge`]. Every key in the union turns into at most one action:
//!
//! | Library | Bucket | Action |
//! |---------|--------|--------|
//! | yes     | no     | [`SyncAction::Upload`] |
//! | no      | yes    | [`SyncAction::Hide`] |
//! | yes     | yes    | none |
//!
//! Keys encode the item's folder, file name and metadata fingerprint, so a
//! matching key means there is nothing to copy. Content is never compared.
//!
//! Actions run one at a time in ascending key order. If one fails the run
//! stops with that error; running again later recomputes the diff from
//! scratch and picks up where the failed run left off.
//!
//! ## Examples
//!
//! ```rust
//! use photosync::{MediaMetadata, MemoryBucket, MemorySource, SynchronizerBuilder};
//!
//! # fn main() -> photosync::Result<()> {
//! let mut source = MemorySource::new();
//! let album = source.add_album(source.root_id(), "Holidays")?;
//! source.add_item(album, MediaMetadata {
//!     file_name: "beach.jpg".to_string(),
//!     ..Default::default()
//! }, b"jpeg bytes")?;
//!
//! let bucket = MemoryBucket::new();
//! let sync = SynchronizerBuilder::new().build(&source, &bucket)?;
//!
//! let report = sync.run()?;
//! assert_eq!(report.uploaded, 1);
//!
//! // Nothing changed, nothing to do
//! let report = sync.run()?;
//! assert_eq!(report.uploaded, 0);
//! assert_eq!(report.unchanged, 1);
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::merge::{Aligned, OrderedMerge};
use crate::projection::SyncKey;
use crate::source::{MediaItem, TreeSource};
use crate::target::{ObjectListing, TargetObject, TargetStore};
use crate::walk::{validate_prefix, SourceImage, SourceWalk};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, trace};

/// One change to apply to the bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// Copy a library item to the bucket under `key`
    Upload {
        /// Destination key
        key: SyncKey,
        /// Item whose content gets fetched and stored
        item: MediaItem,
    },
    /// Hide the bucket object at `key`
    Hide {
        /// Key of the object that no longer exists in the library
        key: SyncKey,
    },
}

impl SyncAction {
    /// Key the action applies to
    pub fn key(&self) -> &SyncKey {
        match self {
            SyncAction::Upload { key, .. } | SyncAction::Hide { key } => key,
        }
    }
}

fn image_key(image: &SourceImage) -> SyncKey {
    image.key.clone()
}

fn object_key(object: &TargetObject) -> SyncKey {
    object.key.clone()
}

/// Lazy sequence of the actions a sync would take, in key order
///
/// Produced by [`Synchronizer::plan`]. Reading the plan lists the library
/// and bucket but changes nothing.
pub struct SyncPlan<'a, S: ?Sized> {
    merge: OrderedMerge<
        SourceWalk<'a, S>,
        ObjectListing<'a>,
        fn(&SourceImage) -> SyncKey,
        fn(&TargetObject) -> SyncKey,
        SourceImage,
        TargetObject,
        SyncKey,
    >,
    unchanged: usize,
}

impl<'a, S: TreeSource + ?Sized> SyncPlan<'a, S> {
    fn new(walk: SourceWalk<'a, S>, listing: ObjectListing<'a>) -> Self {
        Self {
            merge: OrderedMerge::new(
                walk,
                listing,
                image_key as fn(&SourceImage) -> SyncKey,
                object_key as fn(&TargetObject) -> SyncKey,
            ),
            unchanged: 0,
        }
    }

    /// Number of keys found on both sides so far
    pub fn unchanged(&self) -> usize {
        self.unchanged
    }
}

impl<S: TreeSource + ?Sized> Iterator for SyncPlan<'_, S> {
    type Item = Result<SyncAction>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.merge.next()? {
                Err(e) => return Some(Err(e)),
                Ok(Aligned::Left(image)) => {
                    return Some(Ok(SyncAction::Upload {
                        key: image.key,
                        item: image.item,
                    }))
                }
                Ok(Aligned::Right(object)) => return Some(Ok(SyncAction::Hide { key: object.key })),
                Ok(Aligned::Both(image, _)) => {
                    trace!("Unchanged {}", image.key);
                    self.unchanged += 1;
                }
            }
        }
    }
}

/// Progress notification sent after each action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// An item was copied to the bucket
    Uploaded {
        /// Destination key
        key: SyncKey,
        /// Bytes written
        bytes: u64,
    },
    /// A bucket object was hidden
    Hidden {
        /// Key of the hidden object
        key: SyncKey,
    },
}

/// Summary of a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Items copied to the bucket
    pub uploaded: usize,
    /// Bucket objects hidden
    pub hidden: usize,
    /// Items already present under the right key
    pub unchanged: usize,
    /// Total bytes copied; declared sizes on a dry run
    pub bytes_uploaded: u64,
    /// Wall-clock time of the run
    pub duration: Duration,
    /// Whether the run only planned
    pub dry_run: bool,
}

impl SyncReport {
    /// Total number of uploads and hides
    pub fn actions(&self) -> usize {
        self.uploaded + self.hidden
    }
}

/// Builder for [`Synchronizer`]
///
/// # Examples
///
/// ```rust
/// use photosync::{MemoryBucket, MemorySource, SynchronizerBuilder};
///
/// let source = MemorySource::new();
/// let bucket = MemoryBucket::new();
/// let sync = SynchronizerBuilder::new()
///     .prefix("Travel/")
///     .dry_run(true)
///     .build(source, bucket)
///     .unwrap();
///
/// assert_eq!(sync.prefix(), "Travel/");
/// ```
#[derive(Debug, Clone, Default)]
pub struct SynchronizerBuilder {
    prefix: String,
    dry_run: bool,
}

impl SynchronizerBuilder {
    /// Create a builder for a full, non-dry run
    pub fn new() -> Self {
        Self::default()
    }

    /// Only sync keys starting with `prefix`
    ///
    /// Must be empty or end with `/`; checked by [`build`](Self::build).
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Plan and count actions without fetching content or touching the bucket
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Build a synchronizer over a library and a bucket
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidPrefix`](crate::SyncError::InvalidPrefix)
    /// if the prefix is not empty and does not end with `/`.
    pub fn build<S, T>(self, source: S, target: T) -> Result<Synchronizer<S, T>>
    where
        S: TreeSource,
        T: TargetStore,
    {
        validate_prefix(&self.prefix)?;
        Ok(Synchronizer {
            source,
            target,
            prefix: self.prefix,
            dry_run: self.dry_run,
        })
    }
}

/// One-way sync from a photo library into a bucket
///
/// Holds no state between runs; each run recomputes the diff.
pub struct Synchronizer<S, T> {
    source: S,
    target: T,
    prefix: String,
    dry_run: bool,
}

impl<S: TreeSource, T: TargetStore> Synchronizer<S, T> {
    /// Prefix this synchronizer is scoped to
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether runs only plan
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Library being read
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Bucket being written
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Actions a run would take, computed lazily
    pub fn plan(&self) -> Result<SyncPlan<'_, S>> {
        let walk = SourceWalk::with_prefix(&self.source, &self.prefix);
        let listing = self.target.list_objects(&self.prefix)?;
        Ok(SyncPlan::new(walk, listing))
    }

    /// Apply every action of the plan
    pub fn run(&self) -> Result<SyncReport> {
        self.run_with_progress(|_| {})
    }

    /// Apply every action of the plan, reporting each one to `progress`
    ///
    /// Stops at the first error. Actions already applied stay applied.
    #[instrument(skip(self, progress), fields(prefix = %self.prefix, dry_run = self.dry_run))]
    pub fn run_with_progress<F>(&self, mut progress: F) -> Result<SyncReport>
    where
        F: FnMut(&SyncEvent),
    {
        let start = Instant::now();
        info!("Starting sync");

        let mut report = SyncReport {
            dry_run: self.dry_run,
            ..Default::default()
        };
        let mut plan = self.plan()?;

        for action in plan.by_ref() {
            let event = match action? {
                SyncAction::Upload { key, item } => {
                    let bytes = self.upload(&key, &item)?;
                    report.uploaded += 1;
                    report.bytes_uploaded += bytes;
                    SyncEvent::Uploaded { key, bytes }
                }
                SyncAction::Hide { key } => {
                    debug!("Hide {}", key);
                    if !self.dry_run {
                        self.target.hide(&key)?;
                    }
                    report.hidden += 1;
                    SyncEvent::Hidden { key }
                }
            };
            progress(&event);
        }

        report.unchanged = plan.unchanged();
        report.duration = start.elapsed();
        info!(
            "Sync finished: {} uploaded, {} hidden, {} unchanged in {:?}",
            report.uploaded, report.hidden, report.unchanged, report.duration
        );
        Ok(report)
    }

    fn upload(&self, key: &SyncKey, item: &MediaItem) -> Result<u64> {
        debug!("Upload {} ({} bytes)", key, item.declared_size());
        if self.dry_run {
            return Ok(item.declared_size());
        }
        let content = self.source.fetch_content(item)?;
        self.target
            .upload(key, &content, &item.metadata.to_attributes())?;
        Ok(content.len() as u64)
    }
}
