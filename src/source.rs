//! Photo library side of a sync
//!
//! A library is a tree. Every node is either a *container* with named
//! children, an *album* holding media items, or empty. A node must never be
//! both a container and an album; [`TreeNode::kind`] turns that case into a
//! [`SyncError::StructureViolation`].
//!
//! The [`TreeSource`] trait is the only thing the sync needs from a library
//! backend. Every method may block on a remote call. Items are returned
//! with their metadata already resolved so repeated accessor calls during a
//! run never go back to the network; only [`TreeSource::fetch_content`]
//! downloads bytes, and the sync calls it at most once per uploaded item.
//!
//! [`MemorySource`] is an in-memory library for tests and embedding. The
//! filesystem-backed library lives in [`crate::local`].

use crate::error::{Result, SyncError};
use crate::projection::MediaMetadata;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::trace;

/// A node of the library tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    /// Backend-specific identifier used to list the node's contents
    pub id: String,
    /// Display name; becomes one segment of the bucket key
    pub name: String,
    /// Whether the node reports child nodes
    pub has_children: bool,
    /// Whether the node reports an album
    pub has_album: bool,
}

/// What a node holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Has child nodes
    Container,
    /// Has an album of media items
    Album,
    /// Has neither
    Empty,
}

impl TreeNode {
    /// Classify the node, rejecting nodes that claim to be both
    pub fn kind(&self) -> Result<NodeKind> {
        match (self.has_children, self.has_album) {
            (true, true) => Err(SyncError::StructureViolation {
                node: self.name.clone(),
            }),
            (true, false) => Ok(NodeKind::Container),
            (false, true) => Ok(NodeKind::Album),
            (false, false) => Ok(NodeKind::Empty),
        }
    }
}

/// Size and checksum a library declares for one rendition of an item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredContent {
    /// Size in bytes
    pub size: u64,
    /// MD5 of the bytes, when the backend reports one
    pub md5: Option<String>,
}

impl DeclaredContent {
    /// Declaration matching `content` exactly
    pub fn of(content: &[u8]) -> Self {
        Self {
            size: content.len() as u64,
            md5: Some(format!("{:x}", md5::compute(content))),
        }
    }
}

/// Which rendition of an item gets downloaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentLocator {
    /// The archived original; used for photos
    Archived(DeclaredContent),
    /// The largest rendition of a video, with its own size and checksum
    LargestVideo(DeclaredContent),
}

impl ContentLocator {
    /// Pick the rendition to download for a library format
    ///
    /// `JPG` items download the archived original. `MP4` items download
    /// their largest video rendition and are checked against that
    /// rendition's declaration, not the archive's. Any other format, or a
    /// video with no rendition, is [`SyncError::UnsupportedNode`].
    pub fn for_format(
        format: &str,
        archived: DeclaredContent,
        largest_video: Option<DeclaredContent>,
    ) -> Result<Self> {
        match format {
            "JPG" => Ok(ContentLocator::Archived(archived)),
            "MP4" => largest_video
                .map(ContentLocator::LargestVideo)
                .ok_or_else(|| SyncError::UnsupportedNode("MP4 item without a video rendition".to_string())),
            other => Err(SyncError::UnsupportedNode(format!("unknown format: {}", other))),
        }
    }

    /// Size and checksum of the chosen rendition
    pub fn declared(&self) -> &DeclaredContent {
        match self {
            ContentLocator::Archived(declared) | ContentLocator::LargestVideo(declared) => declared,
        }
    }
}

/// A photo or video in an album
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    /// Backend-specific identifier used to fetch content
    pub id: String,
    /// Metadata fields that make up the fingerprint
    pub metadata: MediaMetadata,
    /// Rendition that [`TreeSource::fetch_content`] downloads
    pub content: ContentLocator,
}

impl MediaItem {
    /// Declared size of the bytes a fetch returns
    pub fn declared_size(&self) -> u64 {
        self.content.declared().size
    }
}

/// Read access to a photo library
pub trait TreeSource {
    /// Root node of the library; contributes no key segment
    fn root(&self) -> Result<TreeNode>;

    /// Children of a container, in no particular order
    fn list_children(&self, node: &TreeNode) -> Result<Vec<TreeNode>>;

    /// Items of an album, in no particular order
    fn list_album_items(&self, node: &TreeNode) -> Result<Vec<MediaItem>>;

    /// Download the raw bytes of an item
    ///
    /// Implementations validate the bytes against the declared size and
    /// checksum (see [`verify_content`]) before returning them.
    fn fetch_content(&self, item: &MediaItem) -> Result<Vec<u8>>;
}

impl<S: TreeSource + ?Sized> TreeSource for &S {
    fn root(&self) -> Result<TreeNode> {
        (**self).root()
    }

    fn list_children(&self, node: &TreeNode) -> Result<Vec<TreeNode>> {
        (**self).list_children(node)
    }

    fn list_album_items(&self, node: &TreeNode) -> Result<Vec<MediaItem>> {
        (**self).list_album_items(node)
    }

    fn fetch_content(&self, item: &MediaItem) -> Result<Vec<u8>> {
        (**self).fetch_content(item)
    }
}

impl<S: TreeSource + ?Sized> TreeSource for Box<S> {
    fn root(&self) -> Result<TreeNode> {
        (**self).root()
    }

    fn list_children(&self, node: &TreeNode) -> Result<Vec<TreeNode>> {
        (**self).list_children(node)
    }

    fn list_album_items(&self, node: &TreeNode) -> Result<Vec<MediaItem>> {
        (**self).list_album_items(node)
    }

    fn fetch_content(&self, item: &MediaItem) -> Result<Vec<u8>> {
        (**self).fetch_content(item)
    }
}

/// Check downloaded bytes against the item's chosen rendition
pub fn verify_content(item: &MediaItem, content: &[u8]) -> Result<()> {
    let declared = item.content.declared();
    let actual_size = content.len() as u64;
    if actual_size != declared.size {
        return Err(SyncError::SizeMismatch {
            key: item.metadata.file_name.clone(),
            expected: declared.size,
            actual: actual_size,
        });
    }

    if let Some(expected) = &declared.md5 {
        let actual = format!("{:x}", md5::compute(content));
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(SyncError::HashMismatch {
                key: item.metadata.file_name.clone(),
                expected: expected.clone(),
                actual,
            });
        }
    }

    trace!("Verified {} ({} bytes)", item.metadata.file_name, actual_size);
    Ok(())
}

#[derive(Debug, Default)]
struct MemoryNode {
    name: String,
    children: Vec<usize>,
    is_album: bool,
    items: Vec<(MediaItem, Vec<u8>)>,
}

/// In-memory photo library
///
/// Nodes are addressed by the index returned when they were added; index 0
/// is the root. Any node may be given children and album items, so trees
/// that break the container/album rule can be built on purpose.
#[derive(Debug)]
pub struct MemorySource {
    nodes: Vec<MemoryNode>,
    fetches: AtomicUsize,
}

impl MemorySource {
    /// Create a library containing only an empty root
    pub fn new() -> Self {
        Self {
            nodes: vec![MemoryNode::default()],
            fetches: AtomicUsize::new(0),
        }
    }

    /// Index of the root node
    pub fn root_id(&self) -> usize {
        0
    }

    /// Add a container node under `parent`
    pub fn add_container(&mut self, parent: usize, name: &str) -> Result<usize> {
        self.add_node(parent, name, false)
    }

    /// Add an album node under `parent`
    pub fn add_album(&mut self, parent: usize, name: &str) -> Result<usize> {
        self.add_node(parent, name, true)
    }

    /// Add a photo to an album, declaring its true size and checksum
    pub fn add_item(&mut self, album: usize, metadata: MediaMetadata, content: &[u8]) -> Result<MediaItem> {
        self.add_media(album, "JPG", metadata, content, None)
    }

    /// Add an item of the given library format
    ///
    /// `archived` is the original upload; `rendition` is the largest video
    /// rendition, if any. The bytes later returned by `fetch_content` are
    /// whichever of the two [`ContentLocator::for_format`] picks.
    pub fn add_media(
        &mut self,
        album: usize,
        format: &str,
        metadata: MediaMetadata,
        archived: &[u8],
        rendition: Option<&[u8]>,
    ) -> Result<MediaItem> {
        let locator = ContentLocator::for_format(
            format,
            DeclaredContent::of(archived),
            rendition.map(DeclaredContent::of),
        )?;
        let stored = match (&locator, rendition) {
            (ContentLocator::LargestVideo(_), Some(video)) => video,
            _ => archived,
        };

        let node = self.node_mut(album)?;
        node.is_album = true;
        let item = MediaItem {
            id: format!("{}:{}", album, node.items.len()),
            metadata,
            content: locator,
        };
        node.items.push((item.clone(), stored.to_vec()));
        Ok(item)
    }

    /// Swap the stored bytes of an item without touching its declared checksum
    pub fn replace_content(&mut self, item_id: &str, content: &[u8]) -> Result<()> {
        let (album, index) = parse_item_id(item_id)?;
        let slot = self
            .node_mut(album)?
            .items
            .get_mut(index)
            .ok_or_else(|| SyncError::ObjectNotFound(item_id.to_string()))?;
        slot.1 = content.to_vec();
        Ok(())
    }

    /// Number of `fetch_content` calls made so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    fn add_node(&mut self, parent: usize, name: &str, is_album: bool) -> Result<usize> {
        let id = self.nodes.len();
        self.node_mut(parent)?.children.push(id);
        self.nodes.push(MemoryNode {
            name: name.to_string(),
            is_album,
            ..Default::default()
        });
        Ok(id)
    }

    fn node(&self, id: &str) -> Result<&MemoryNode> {
        id.parse::<usize>()
            .ok()
            .and_then(|index| self.nodes.get(index))
            .ok_or_else(|| SyncError::ObjectNotFound(id.to_string()))
    }

    fn node_mut(&mut self, index: usize) -> Result<&mut MemoryNode> {
        self.nodes
            .get_mut(index)
            .ok_or_else(|| SyncError::ObjectNotFound(index.to_string()))
    }

    fn tree_node(&self, index: usize) -> TreeNode {
        let node = &self.nodes[index];
        TreeNode {
            id: index.to_string(),
            name: node.name.clone(),
            has_children: !node.children.is_empty(),
            has_album: node.is_album,
        }
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeSource for MemorySource {
    fn root(&self) -> Result<TreeNode> {
        Ok(self.tree_node(0))
    }

    fn list_children(&self, node: &TreeNode) -> Result<Vec<TreeNode>> {
        let children = self.node(&node.id)?.children.clone();
        Ok(children.into_iter().map(|index| self.tree_node(index)).collect())
    }

    fn list_album_items(&self, node: &TreeNode) -> Result<Vec<MediaItem>> {
        Ok(self
            .node(&node.id)?
            .items
            .iter()
            .map(|(item, _)| item.clone())
            .collect())
    }

    fn fetch_content(&self, item: &MediaItem) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let (album, index) = parse_item_id(&item.id)?;
        let content = self
            .nodes
            .get(album)
            .and_then(|node| node.items.get(index))
            .map(|(_, content)| content.clone())
            .ok_or_else(|| SyncError::ObjectNotFound(item.id.clone()))?;
        verify_content(item, &content)?;
        Ok(content)
    }
}

fn parse_item_id(id: &str) -> Result<(usize, usize)> {
    id.split_once(':')
        .and_then(|(album, index)| Some((album.parse().ok()?, index.parse().ok()?)))
        .ok_or_else(|| SyncError::ObjectNotFound(id.to_string()))
}
