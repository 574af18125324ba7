//! Depth-first walk of a photo library in key order
//!
//! [`SourceWalk`] turns a [`TreeSource`] into a stream of [`SourceImage`]s
//! sorted by [`SyncKey`], which is what the merge against the bucket
//! listing needs. The walk is lazy: each container is listed only when the
//! walk reaches it, and only one album's items are held at a time.
//!
//! ## Ordering
//!
//! Children of a container are visited in order of `name + "/"`, not plain
//! `name`. Every key below a child starts with that string, so sorting on it
//! keeps keys globally ascending. Plain names get it wrong whenever one name
//! is a prefix of a sibling: `"A"` sorts before `"A.b"`, yet `"A/"` sorts
//! after `"A.b/"` because `'.'` < `'/'`.
//!
//! Items within an album are sorted by their projected key, not by the
//! order the library returned them in.
//!
//! ## Scoping
//!
//! With a prefix filter, only containers whose prefix is an ancestor or a
//! descendant of the filter are listed, and only items whose key starts with
//! the filter are yielded.

use crate::error::{Result, SyncError};
use crate::projection::{child_prefix, project, SyncKey, SEPARATOR};
use crate::source::{MediaItem, NodeKind, TreeNode, TreeSource};
use tracing::{debug, trace};

/// A library item together with its bucket key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    /// Where the item lives in the bucket
    pub key: SyncKey,
    /// The item itself
    pub item: MediaItem,
}

/// Whether a folder at `prefix` can hold anything under `filter`, or lies under it
pub fn prefix_compatible(prefix: &str, filter: &str) -> bool {
    filter.starts_with(prefix) || prefix.starts_with(filter)
}

enum Frame {
    Nodes(std::vec::IntoIter<(TreeNode, String)>),
    Images(std::vec::IntoIter<SourceImage>),
}

enum Step {
    Yield(SourceImage),
    Visit(TreeNode, String),
    Pop,
    Finished,
}

/// Lazy, key-ordered stream of every item in a library
///
/// Yields `Err` and then stops if the library returns an error or a node
/// breaks the container/album rule. A walk cannot be restarted; create a new
/// one from the root instead.
pub struct SourceWalk<'a, S: ?Sized> {
    source: &'a S,
    filter: String,
    stack: Vec<Frame>,
    started: bool,
    done: bool,
}

impl<'a, S: TreeSource + ?Sized> SourceWalk<'a, S> {
    /// Walk the whole library
    pub fn new(source: &'a S) -> Self {
        Self::with_prefix(source, "")
    }

    /// Walk only the part of the library whose keys start with `filter`
    pub fn with_prefix(source: &'a S, filter: &str) -> Self {
        Self {
            source,
            filter: filter.to_string(),
            stack: Vec::new(),
            started: false,
            done: false,
        }
    }

    fn visit(&mut self, node: TreeNode, prefix: String) -> Result<()> {
        match node.kind()? {
            NodeKind::Container => {
                let mut children = self.source.list_children(&node)?;
                children.sort_by_cached_key(|child| format!("{}{}", child.name, SEPARATOR));
                let frames: Vec<(TreeNode, String)> = children
                    .into_iter()
                    .map(|child| {
                        let child_prefix = child_prefix(&prefix, &child.name);
                        (child, child_prefix)
                    })
                    .filter(|(_, child_prefix)| prefix_compatible(child_prefix, &self.filter))
                    .collect();
                debug!("Container {:?}: {} children to visit", prefix, frames.len());
                self.stack.push(Frame::Nodes(frames.into_iter()));
            }
            NodeKind::Album => {
                let mut images: Vec<SourceImage> = self
                    .source
                    .list_album_items(&node)?
                    .into_iter()
                    .map(|item| SourceImage {
                        key: project(&prefix, &item.metadata),
                        item,
                    })
                    .filter(|image| image.key.has_prefix(&self.filter))
                    .collect();
                images.sort_by(|a, b| a.key.cmp(&b.key));
                debug!("Album {:?}: {} items", prefix, images.len());
                self.stack.push(Frame::Images(images.into_iter()));
            }
            NodeKind::Empty => {
                trace!("Empty node {:?}", prefix);
            }
        }
        Ok(())
    }

    fn step(&mut self) -> Result<Option<SourceImage>> {
        if !self.started {
            self.started = true;
            let root = self.source.root()?;
            self.visit(root, String::new())?;
        }

        loop {
            let step = match self.stack.last_mut() {
                None => Step::Finished,
                Some(Frame::Images(images)) => images.next().map_or(Step::Pop, Step::Yield),
                Some(Frame::Nodes(nodes)) => nodes
                    .next()
                    .map_or(Step::Pop, |(node, prefix)| Step::Visit(node, prefix)),
            };

            match step {
                Step::Yield(image) => return Ok(Some(image)),
                Step::Visit(node, prefix) => self.visit(node, prefix)?,
                Step::Pop => {
                    self.stack.pop();
                }
                Step::Finished => return Ok(None),
            }
        }
    }
}

impl<S: TreeSource + ?Sized> Iterator for SourceWalk<'_, S> {
    type Item = Result<SourceImage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(image)) => Some(Ok(image)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                self.stack.clear();
                Some(Err(e))
            }
        }
    }
}

/// Check that a prefix filter is empty or ends with the folder separator
pub fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() || prefix.ends_with(SEPARATOR) {
        Ok(())
    } else {
        Err(SyncError::InvalidPrefix(prefix.to_string()))
    }
}
