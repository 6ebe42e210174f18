use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::staging::{ImageFile, PreviewHandle, PreviewSink};

pub const THUMBNAIL_MAX_EDGE: u32 = 256;

/// Writes downscaled PNG thumbnails into a private temp directory.
///
/// Undecodable images fall back to a `file://` reference to their source (or
/// an opaque `preview://` id when they were never on disk). The directory and
/// anything still in it is removed when the sink is dropped.
#[derive(Debug)]
pub struct ThumbnailPreviews {
    dir: TempDir,
    max_edge: u32,
    next_id: u64,
    live: BTreeMap<u64, Option<PathBuf>>,
}

impl ThumbnailPreviews {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("roseglass-previews-")
            .tempdir()
            .context("failed to create preview directory")?;
        Ok(Self {
            dir,
            max_edge: THUMBNAIL_MAX_EDGE,
            next_id: 0,
            live: BTreeMap::new(),
        })
    }

    pub fn with_max_edge(mut self, max_edge: u32) -> Self {
        self.max_edge = max_edge.max(1);
        self
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

impl PreviewSink for ThumbnailPreviews {
    fn issue(&mut self, image: &ImageFile) -> PreviewHandle {
        self.next_id += 1;
        let id = self.next_id;
        let path = self.dir.path().join(format!("preview-{id:04}.png"));
        let (location, owned) = match write_thumbnail(image.bytes(), &path, self.max_edge) {
            Ok(()) => (path.to_string_lossy().to_string(), Some(path)),
            Err(err) => {
                warn!(name = image.name(), "thumbnail failed, using source reference: {err:#}");
                let location = image
                    .source_path()
                    .map(|source| format!("file://{}", source.display()))
                    .unwrap_or_else(|| format!("preview://{id}"));
                (location, None)
            }
        };
        self.live.insert(id, owned);
        PreviewHandle { id, location }
    }

    fn release(&mut self, handle: PreviewHandle) {
        let Some(owned) = self.live.remove(&handle.id) else {
            debug!(id = handle.id, "ignoring release of unknown preview");
            return;
        };
        if let Some(path) = owned {
            if let Err(err) = fs::remove_file(&path) {
                if err.kind() != ErrorKind::NotFound {
                    warn!(path = %path.display(), "failed to remove preview: {err}");
                }
            }
        }
    }

    fn live(&self) -> usize {
        self.live.len()
    }
}

/// Holds previews as in-memory `data:` URLs.
#[derive(Debug, Default)]
pub struct DataUrlPreviews {
    next_id: u64,
    live: BTreeMap<u64, usize>,
}

impl DataUrlPreviews {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently held by outstanding previews.
    pub fn held_bytes(&self) -> usize {
        self.live.values().sum()
    }
}

impl PreviewSink for DataUrlPreviews {
    fn issue(&mut self, image: &ImageFile) -> PreviewHandle {
        self.next_id += 1;
        let location = format!(
            "data:{};base64,{}",
            image.mime_type(),
            BASE64.encode(image.bytes())
        );
        self.live.insert(self.next_id, location.len());
        PreviewHandle {
            id: self.next_id,
            location,
        }
    }

    fn release(&mut self, handle: PreviewHandle) {
        if self.live.remove(&handle.id).is_none() {
            debug!(id = handle.id, "ignoring release of unknown preview");
        }
    }

    fn live(&self) -> usize {
        self.live.len()
    }
}

fn write_thumbnail(bytes: &[u8], path: &Path, max_edge: u32) -> Result<()> {
    let decoded = image::load_from_memory(bytes).context("failed to decode image")?;
    decoded
        .thumbnail(max_edge, max_edge)
        .save(path)
        .with_context(|| format!("failed to save {}", path.display()))?;
    Ok(())
}
