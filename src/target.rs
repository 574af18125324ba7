//! Bucket side of a sync
//!
//! The sync needs three things from object storage: a listing of every key
//! under a prefix in ascending byte order, a way to hide (soft-delete) a
//! key, and a way to upload bytes with a small set of string attributes.
//! [`TargetStore`] captures exactly that.
//!
//! Listings are streams. [`PagedListing`] turns a page-fetch function into
//! an iterator that holds at most one page in memory and only asks for the
//! next page once the current one is drained, which is how remote bucket
//! APIs paginate with a `start_after` continuation.
//!
//! [`MemoryBucket`] is an in-memory store for tests and embedding. The
//! filesystem-backed bucket lives in [`crate::local`].

use crate::error::{Result, SyncError};
use crate::projection::SyncKey;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::ops::Bound;
use tracing::{debug, trace};

/// Default number of keys fetched per listing page
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// An object visible in a bucket listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetObject {
    /// Full key of the object
    pub key: SyncKey,
    /// Stored size in bytes
    pub size: u64,
}

/// Stream of listed objects, ascending by key
pub type ObjectListing<'a> = Box<dyn Iterator<Item = Result<TargetObject>> + 'a>;

/// Write access to an object-storage bucket
pub trait TargetStore {
    /// All visible objects whose key starts with `prefix`, ascending by key
    fn list_objects<'a>(&'a self, prefix: &str) -> Result<ObjectListing<'a>>;

    /// Hide the object at `key`; it stops appearing in listings
    fn hide(&self, key: &SyncKey) -> Result<()>;

    /// Store `content` at `key` with the given attributes
    fn upload(&self, key: &SyncKey, content: &[u8], attributes: &BTreeMap<String, String>) -> Result<()>;
}

impl<T: TargetStore + ?Sized> TargetStore for &T {
    fn list_objects<'a>(&'a self, prefix: &str) -> Result<ObjectListing<'a>> {
        (**self).list_objects(prefix)
    }

    fn hide(&self, key: &SyncKey) -> Result<()> {
        (**self).hide(key)
    }

    fn upload(&self, key: &SyncKey, content: &[u8], attributes: &BTreeMap<String, String>) -> Result<()> {
        (**self).upload(key, content, attributes)
    }
}

impl<T: TargetStore + ?Sized> TargetStore for Box<T> {
    fn list_objects<'a>(&'a self, prefix: &str) -> Result<ObjectListing<'a>> {
        (**self).list_objects(prefix)
    }

    fn hide(&self, key: &SyncKey) -> Result<()> {
        (**self).hide(key)
    }

    fn upload(&self, key: &SyncKey, content: &[u8], attributes: &BTreeMap<String, String>) -> Result<()> {
        (**self).upload(key, content, attributes)
    }
}

/// One page of a listing
#[derive(Debug, Default)]
pub struct ListPage {
    /// Objects in this page, ascending by key
    pub objects: Vec<TargetObject>,
    /// Continuation for the next page, `None` on the last page
    pub next_start_after: Option<String>,
}

/// Iterator over a paginated listing
pub struct PagedListing<F> {
    fetch: F,
    buffer: VecDeque<TargetObject>,
    start_after: Option<String>,
    finished: bool,
}

impl<F> PagedListing<F>
where
    F: FnMut(Option<&str>) -> Result<ListPage>,
{
    /// Wrap a function that fetches the page following `start_after`
    pub fn new(fetch: F) -> Self {
        Self {
            fetch,
            buffer: VecDeque::new(),
            start_after: None,
            finished: false,
        }
    }
}

impl<F> Iterator for PagedListing<F>
where
    F: FnMut(Option<&str>) -> Result<ListPage>,
{
    type Item = Result<TargetObject>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.buffer.is_empty() {
            if self.finished {
                return None;
            }
            match (self.fetch)(self.start_after.as_deref()) {
                Ok(page) => {
                    trace!("Fetched listing page of {} objects", page.objects.len());
                    self.buffer.extend(page.objects);
                    self.start_after = page.next_start_after;
                    self.finished = self.start_after.is_none();
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    content: Vec<u8>,
    attributes: BTreeMap<String, String>,
}

/// In-memory bucket
#[derive(Debug)]
pub struct MemoryBucket {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    hidden: Mutex<BTreeSet<String>>,
    uploads: Mutex<usize>,
    page_size: usize,
}

impl MemoryBucket {
    /// Create an empty bucket
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Create an empty bucket that lists `page_size` keys per page
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            hidden: Mutex::new(BTreeSet::new()),
            uploads: Mutex::new(0),
            page_size: page_size.max(1),
        }
    }

    /// Place an object directly, without counting it as an upload
    pub fn insert(&self, key: &str, content: &[u8]) {
        self.objects.lock().insert(
            key.to_string(),
            StoredObject {
                content: content.to_vec(),
                attributes: BTreeMap::new(),
            },
        );
    }

    /// Content and attributes of a visible object
    pub fn object(&self, key: &str) -> Option<(Vec<u8>, BTreeMap<String, String>)> {
        self.objects
            .lock()
            .get(key)
            .map(|stored| (stored.content.clone(), stored.attributes.clone()))
    }

    /// Keys of all visible objects, ascending
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().keys().cloned().collect()
    }

    /// Keys that have been hidden, ascending
    pub fn hidden_keys(&self) -> Vec<String> {
        self.hidden.lock().iter().cloned().collect()
    }

    /// Number of uploads received
    pub fn upload_count(&self) -> usize {
        *self.uploads.lock()
    }

    fn page(&self, prefix: &str, start_after: Option<&str>) -> ListPage {
        let objects = self.objects.lock();
        let lower = match start_after {
            Some(key) => Bound::Excluded(key.to_string()),
            None => Bound::Included(prefix.to_string()),
        };
        let mut page: Vec<TargetObject> = objects
            .range((lower, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .take(self.page_size + 1)
            .map(|(key, stored)| TargetObject {
                key: SyncKey::new(key.clone()),
                size: stored.content.len() as u64,
            })
            .collect();

        let next_start_after = if page.len() > self.page_size {
            page.truncate(self.page_size);
            page.last().map(|object| object.key.as_str().to_string())
        } else {
            None
        };
        ListPage {
            objects: page,
            next_start_after,
        }
    }
}

impl Default for MemoryBucket {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetStore for MemoryBucket {
    fn list_objects<'a>(&'a self, prefix: &str) -> Result<ObjectListing<'a>> {
        let prefix = prefix.to_string();
        Ok(Box::new(PagedListing::new(move |start_after| {
            Ok(self.page(&prefix, start_after))
        })))
    }

    fn hide(&self, key: &SyncKey) -> Result<()> {
        let removed = self.objects.lock().remove(key.as_str()).is_some();
        let mut hidden = self.hidden.lock();
        if !removed && !hidden.contains(key.as_str()) {
            return Err(SyncError::ObjectNotFound(key.to_string()));
        }
        hidden.insert(key.to_string());
        debug!("Hid {}", key);
        Ok(())
    }

    fn upload(&self, key: &SyncKey, content: &[u8], attributes: &BTreeMap<String, String>) -> Result<()> {
        self.objects.lock().insert(
            key.to_string(),
            StoredObject {
                content: content.to_vec(),
                attributes: attributes.clone(),
            },
        );
        self.hidden.lock().remove(key.as_str());
        *self.uploads.lock() += 1;
        debug!("Uploaded {} ({} bytes)", key, content.len());
        Ok(())
    }
}
