// PNG encoder - readback data to temp_<n>.png
//
// `n` comes from an IdSource. The default source is a process-wide atomic
// counter, so concurrent renders never collide on a name.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{RenderError, Result};
use crate::options::Resolution;

/// Hands out ids for output file names.
pub trait IdSource: Send + Sync {
    /// Returns a value never returned before by this source.
    fn next_id(&self) -> u64;
}

/// Monotonic counter starting at a given value.
#[derive(Debug, Default)]
pub struct AtomicIdSource {
    next: AtomicU64,
}

impl AtomicIdSource {
    pub const fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl IdSource for AtomicIdSource {
    fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

static PROCESS_IDS: AtomicIdSource = AtomicIdSource::starting_at(0);

/// The counter shared by every encoder that was not given its own source.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessIdSource;

impl IdSource for ProcessIdSource {
    fn next_id(&self) -> u64 {
        PROCESS_IDS.next_id()
    }
}

pub fn file_name(id: u64) -> String {
    format!("temp_{id}.png")
}

#[derive(Clone)]
pub struct ImageEncoder {
    directory: PathBuf,
    ids: Arc<dyn IdSource>,
}

impl std::fmt::Debug for ImageEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageEncoder")
            .field("directory", &self.directory)
            .finish_non_exhaustive()
    }
}

impl ImageEncoder {
    /// Encoder writing into `directory`, named from the process-wide counter.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self::with_ids(directory, Arc::new(ProcessIdSource))
    }

    pub fn with_ids(directory: impl Into<PathBuf>, ids: Arc<dyn IdSource>) -> Self {
        Self {
            directory: directory.into(),
            ids,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Reserve the next output path. Each call consumes one id.
    pub fn next_path(&self) -> PathBuf {
        self.directory.join(file_name(self.ids.next_id()))
    }

    /// Write tightly packed RGBA8 `pixels` as a PNG and return its path.
    ///
    /// A failed write leaves no file behind.
    pub fn write_image(&self, pixels: &[u8], resolution: Resolution) -> Result<PathBuf> {
        let path = self.next_path();

        let result = image::save_buffer_with_format(
            &path,
            pixels,
            resolution.width,
            resolution.height,
            image::ExtendedColorType::Rgba8,
            image::ImageFormat::Png,
        );

        if let Err(source) = result {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(&path) {
                    log::warn!("Could not remove partial image {:?}: {}", path, e);
                }
            }
            return Err(RenderError::Io { path, source });
        }

        log::info!("Wrote {}x{} image to {:?}", resolution.width, resolution.height, path);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("shadey-encoder-{}-{name}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_names_follow_counter() {
        let encoder = ImageEncoder::with_ids("out", Arc::new(AtomicIdSource::starting_at(7)));
        assert_eq!(encoder.next_path(), Path::new("out").join("temp_7.png"));
        assert_eq!(encoder.next_path(), Path::new("out").join("temp_8.png"));
    }

    #[test]
    fn test_concurrent_ids_are_unique() {
        let ids = Arc::new(AtomicIdSource::default());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                thread::spawn(move || (0..250).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "id {id} handed out twice");
            }
        }
        assert_eq!(seen.len(), 8 * 250);
    }

    #[test]
    fn test_process_source_is_shared() {
        let a = ImageEncoder::new("a");
        let b = ImageEncoder::new("b");
        let first = a.next_path();
        let second = b.next_path();
        assert_ne!(first.file_name(), second.file_name());
    }

    #[test]
    fn test_write_image_round_trips_pixels() {
        let dir = scratch_dir("write");
        let encoder = ImageEncoder::with_ids(&dir, Arc::new(AtomicIdSource::starting_at(0)));

        let resolution = Resolution::new(3, 2);
        let pixels: Vec<u8> = (0..resolution.rgba8_size() as u8).collect();

        let path = encoder.write_image(&pixels, resolution).unwrap();
        assert_eq!(path, dir.join("temp_0.png"));

        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.as_raw(), &pixels);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_write_failure_is_io_error() {
        let encoder = ImageEncoder::with_ids(
            "/nonexistent/shadey/output",
            Arc::new(AtomicIdSource::default()),
        );
        let err = encoder
            .write_image(&[0; 4], Resolution::new(1, 1))
            .unwrap_err();
        assert!(matches!(err, RenderError::Io { .. }), "{err:?}");
    }
}
