use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::config::DEFAULT_MAX_IMAGES;

pub const SUPPORTED_IMAGE_MIME_TYPES: [&str; 3] = ["image/png", "image/jpeg", "image/webp"];

const UNKNOWN_MIME: &str = "application/octet-stream";

/// A user-selected file: bytes plus the MIME type they were picked as.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageFile {
    name: String,
    mime_type: String,
    bytes: Vec<u8>,
    source_path: Option<PathBuf>,
}

impl fmt::Debug for ImageFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("byte_len", &self.bytes.len())
            .field("source_path", &self.source_path)
            .finish()
    }
}

impl ImageFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
            source_path: None,
        }
    }

    /// Reads a file from disk, typing it by extension.
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or("image")
            .to_string();
        let mime_type = mime_for_path(path).unwrap_or(UNKNOWN_MIME);
        Ok(Self {
            name,
            mime_type: mime_type.to_string(),
            bytes,
            source_path: Some(path.to_path_buf()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn is_supported_image(&self) -> bool {
        SUPPORTED_IMAGE_MIME_TYPES.contains(&self.mime_type.as_str())
    }
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// Display-only reference to staged bytes. Never sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewHandle {
    pub id: u64,
    pub location: String,
}

/// Issues and releases preview handles. Every issued handle is released
/// exactly once by its owning [`ImageStager`].
pub trait PreviewSink {
    fn issue(&mut self, image: &ImageFile) -> PreviewHandle;
    fn release(&mut self, handle: PreviewHandle);
    fn live(&self) -> usize;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedImage {
    pub file: ImageFile,
    pub preview: PreviewHandle,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionReport {
    pub accepted: usize,
    /// Names of files excluded because their type is not an accepted image type.
    pub rejected: Vec<String>,
    /// Accepted-type files cut from the tail of the batch by the capacity cap.
    pub dropped: usize,
    /// The stager was already full; the batch was ignored.
    pub refused: bool,
}

type SelectionListener = Box<dyn FnMut(&[StagedImage])>;

/// Ordered, capacity-bounded set of staged images for one upload slot.
pub struct ImageStager {
    label: String,
    max_images: usize,
    staged: Vec<StagedImage>,
    previews: Box<dyn PreviewSink>,
    listener: Option<SelectionListener>,
}

impl fmt::Debug for ImageStager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageStager")
            .field("label", &self.label)
            .field("max_images", &self.max_images)
            .field("staged", &self.staged)
            .finish_non_exhaustive()
    }
}

impl ImageStager {
    pub fn new(label: impl Into<String>, previews: Box<dyn PreviewSink>) -> Self {
        Self::with_capacity(label, DEFAULT_MAX_IMAGES, previews)
    }

    pub fn with_capacity(
        label: impl Into<String>,
        max_images: usize,
        previews: Box<dyn PreviewSink>,
    ) -> Self {
        Self {
            label: label.into(),
            max_images: max_images.max(1),
            staged: Vec::new(),
            previews,
            listener: None,
        }
    }

    /// Registers the owner's callback, invoked after every mutation.
    pub fn on_change(&mut self, listener: impl FnMut(&[StagedImage]) + 'static) {
        self.listener = Some(Box::new(listener));
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn max_images(&self) -> usize {
        self.max_images
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.staged.len() >= self.max_images
    }

    pub fn remaining_capacity(&self) -> usize {
        self.max_images.saturating_sub(self.staged.len())
    }

    pub fn staged(&self) -> &[StagedImage] {
        &self.staged
    }

    pub fn previews(&self) -> impl Iterator<Item = &PreviewHandle> {
        self.staged.iter().map(|image| &image.preview)
    }

    /// Copies the current files; later edits do not affect the copy.
    pub fn snapshot(&self) -> Vec<ImageFile> {
        self.staged.iter().map(|image| image.file.clone()).collect()
    }

    pub fn live_previews(&self) -> usize {
        self.previews.live()
    }

    /// Appends a batch, keeping existing items first and cutting the batch tail
    /// at capacity. All previews are reissued for the retained set.
    pub fn select(&mut self, batch: Vec<ImageFile>) -> SelectionReport {
        let mut report = SelectionReport::default();
        if self.is_full() {
            debug!(label = %self.label, batch = batch.len(), "selection refused, stager full");
            report.refused = true;
            return report;
        }

        let mut accepted = Vec::new();
        for file in batch {
            if file.is_supported_image() {
                accepted.push(file);
            } else {
                debug!(label = %self.label, name = file.name(), mime = file.mime_type(), "excluded unsupported file");
                report.rejected.push(file.name().to_string());
            }
        }
        let room = self.remaining_capacity();
        report.dropped = accepted.len().saturating_sub(room);
        accepted.truncate(room);
        report.accepted = accepted.len();
        if accepted.is_empty() {
            return report;
        }

        let mut files = self.release_all();
        files.extend(accepted);
        for file in files {
            let preview = self.previews.issue(&file);
            self.staged.push(StagedImage { file, preview });
        }
        debug!(
            label = %self.label,
            staged = self.staged.len(),
            dropped = report.dropped,
            "selection committed"
        );
        self.notify();
        report
    }

    /// Removes the image at `index`; out-of-range indices are ignored.
    pub fn remove(&mut self, index: usize) -> Option<ImageFile> {
        if index >= self.staged.len() {
            return None;
        }
        let removed = self.staged.remove(index);
        self.previews.release(removed.preview);
        self.notify();
        Some(removed.file)
    }

    pub fn clear(&mut self) {
        if self.staged.is_empty() {
            return;
        }
        self.release_all();
        self.notify();
    }

    fn release_all(&mut self) -> Vec<ImageFile> {
        let mut files = Vec::with_capacity(self.staged.len());
        for image in self.staged.drain(..) {
            self.previews.release(image.preview);
            files.push(image.file);
        }
        files
    }

    fn notify(&mut self) {
        if let Some(listener) = self.listener.as_mut() {
            listener(&self.staged);
        }
    }
}

impl Drop for ImageStager {
    fn drop(&mut self) {
        self.release_all();
    }
}
