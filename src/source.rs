//! The blob-iterator external collaborator.
//!
//! The core engine never touches `gix` types directly: it only consumes
//! the [`BlobSource`] trait, the same "depend on the trait, implement it
//! once concretely" shape used for chunk readers
//! (`backup::read_chunk::ReadChunk` / `LocalChunkReader`).

use anyhow::{Context, Result};

/// One (revision, path) contribution: a file's content at a specific
/// revision, matching a `SearchFile` plus its raw bytes.
pub struct Blob {
    pub revision_label: String,
    pub path: String,
    pub content_id: [u8; 20],
    pub data: Vec<u8>,
}

/// Abstract version-control object store. The ingestor drives this to
/// obtain every text blob reachable from a revision's tree.
pub trait BlobSource {
    /// Returns an iterator over every blob reachable from `revision`'s
    /// tree, tag objects transparently dereferenced to their target.
    fn blobs<'a>(
        &'a self,
        revision: &str,
    ) -> Result<Box<dyn Iterator<Item = Result<Blob>> + 'a>>;
}

/// A [`BlobSource`] backed by a real git repository via `gix`.
pub struct GixBlobSource {
    repo: gix::Repository,
}

impl GixBlobSource {
    /// Opens the repository at `path` (a working directory or a bare
    /// `.git` directory).
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let repo = gix::open(path.as_ref())
            .with_context(|| format!("failed to open repository at {:?}", path.as_ref()))?;
        Ok(Self { repo })
    }
}

impl BlobSource for GixBlobSource {
    fn blobs<'a>(
        &'a self,
        revision: &str,
    ) -> Result<Box<dyn Iterator<Item = Result<Blob>> + 'a>> {
        let id = self
            .repo
            .rev_parse_single(revision)
            .with_context(|| format!("failed to resolve revision {:?}", revision))?;

        // Tag objects are transparently dereferenced to their target.
        let commit = id
            .object()
            .with_context(|| format!("failed to look up object for {:?}", revision))?
            .peel_to_kind(gix::object::Kind::Commit)
            .with_context(|| format!("{:?} does not resolve to a commit", revision))?
            .into_commit();

        let tree = commit
            .tree()
            .with_context(|| format!("failed to get tree for {:?}", revision))?;

        let mut recorder = gix::traverse::tree::Recorder::default();
        tree.traverse()
            .breadthfirst
            .all(&mut recorder)
            .with_context(|| format!("failed to walk tree for {:?}", revision))?;

        let repo = &self.repo;
        let revision_label = revision.to_string();

        let iter = recorder.records.into_iter().filter_map(move |entry| {
            if !entry.mode.is_blob() {
                return None;
            }
            let path = format!("/{}", entry.filepath);
            let oid = entry.oid;
            Some((|| -> Result<Blob> {
                let object = repo
                    .find_object(oid)
                    .with_context(|| format!("failed to read blob {} at {}", oid, path))?;
                let mut content_id = [0u8; 20];
                let bytes = oid.as_bytes();
                let n = bytes.len().min(20);
                content_id[..n].copy_from_slice(&bytes[..n]);
                Ok(Blob {
                    revision_label: revision_label.clone(),
                    path,
                    content_id,
                    data: object.data.clone(),
                })
            })())
        });

        Ok(Box::new(iter))
    }
}

/// A trivial in-memory [`BlobSource`]: a fixed set of blobs keyed by
/// revision label, with no dependency on `gix` or a real repository.
/// Exercised directly by unit tests here and reused by the end-to-end
/// integration tests in `tests/`, where it stands in for a real checkout.
pub struct MemoryBlobSource {
    blobs: Vec<(String, String, [u8; 20], Vec<u8>)>,
}

impl Default for MemoryBlobSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBlobSource {
    pub fn new() -> Self {
        Self { blobs: Vec::new() }
    }

    /// Adds one blob. `content_id` is synthesized from the blob's index so
    /// tests don't need to hash anything.
    pub fn push(&mut self, revision_label: &str, path: &str, data: &[u8]) {
        let idx = self.blobs.len() as u8;
        let mut content_id = [0u8; 20];
        content_id[0] = idx;
        self.blobs.push((
            revision_label.to_string(),
            path.to_string(),
            content_id,
            data.to_vec(),
        ));
    }
}

impl BlobSource for MemoryBlobSource {
    fn blobs<'a>(
        &'a self,
        revision: &str,
    ) -> Result<Box<dyn Iterator<Item = Result<Blob>> + 'a>> {
        let iter = self
            .blobs
            .iter()
            .filter(move |(rev, ..)| rev == revision)
            .map(|(rev, path, content_id, data)| {
                Ok(Blob {
                    revision_label: rev.clone(),
                    path: path.clone(),
                    content_id: *content_id,
                    data: data.clone(),
                })
            });
        Ok(Box::new(iter))
    }
}
