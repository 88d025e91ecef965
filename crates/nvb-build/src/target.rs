use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use nvb_image::{Image, Partition};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::config::RunKey;
use crate::error::{BuildError, BuildResult};

/// Extension of delivered image files.
pub const IMAGE_EXTENSION: &str = "hnv";

/// The validated pair of images produced by one run.
#[derive(Clone, Debug)]
pub struct ImageSet {
    pub factory: Image,
    pub normal: Image,
}

impl ImageSet {
    pub fn get(&self, partition: Partition) -> &Image {
        match partition {
            Partition::Factory => &self.factory,
            Partition::Normal => &self.normal,
        }
    }
}

/// File name of one delivered image, e.g. `nv_factory.hnv`.
pub fn image_file_name(image_name: &str, partition: Partition) -> String {
    format!("{image_name}_{partition}.{IMAGE_EXTENSION}")
}

/// Where finished images go.
pub trait DeploymentTarget: Send + Sync {
    /// Deliver both images of a run. Either both are delivered or neither.
    fn deliver(&self, key: &RunKey, images: &ImageSet) -> BuildResult<()>;
}

/// Writes `<out_dir>/<product>/<variant>/<image_name>_{factory,normal}.hnv`.
///
/// Both images are written to temporary files in the destination
/// directory first and only then renamed into place.
#[derive(Clone, Debug)]
pub struct FsTarget {
    out_dir: PathBuf,
    image_name: String,
}

impl FsTarget {
    pub fn new(out_dir: impl Into<PathBuf>, image_name: impl Into<String>) -> Self {
        Self {
            out_dir: out_dir.into(),
            image_name: image_name.into(),
        }
    }

    pub fn run_dir(&self, key: &RunKey) -> PathBuf {
        self.out_dir.join(&key.product).join(&key.variant)
    }

    pub fn image_path(&self, key: &RunKey, partition: Partition) -> PathBuf {
        self.run_dir(key).join(image_file_name(&self.image_name, partition))
    }

    fn stage(dir: &Path, bytes: &[u8]) -> BuildResult<NamedTempFile> {
        let mut file = NamedTempFile::new_in(dir).map_err(|e| BuildError::io(dir, e))?;
        file.write_all(bytes)
            .and_then(|()| file.as_file().sync_all())
            .map_err(|e| BuildError::io(file.path(), e))?;
        Ok(file)
    }

    /// Put back what was at `path` before this delivery: the previous
    /// image if there was one, otherwise nothing.
    fn restore(dir: &Path, path: &Path, previous: Option<Vec<u8>>) -> BuildResult<()> {
        match previous {
            Some(bytes) => Self::stage(dir, &bytes)?
                .persist(path)
                .map(drop)
                .map_err(|e| BuildError::io(path, e.error)),
            None => std::fs::remove_file(path).map_err(|e| BuildError::io(path, e)),
        }
    }
}

impl DeploymentTarget for FsTarget {
    fn deliver(&self, key: &RunKey, images: &ImageSet) -> BuildResult<()> {
        let dir = self.run_dir(key);
        std::fs::create_dir_all(&dir).map_err(|e| BuildError::io(&dir, e))?;

        let staged = Partition::ALL
            .into_iter()
            .map(|p| Ok((p, Self::stage(&dir, images.get(p).as_bytes())?)))
            .collect::<BuildResult<Vec<_>>>()?;

        // (path, previous contents) of every image already moved into place
        let mut persisted: Vec<(PathBuf, Option<Vec<u8>>)> = Vec::new();
        for (partition, file) in staged {
            let path = self.image_path(key, partition);
            let previous = if path.is_file() {
                Some(std::fs::read(&path).map_err(|e| BuildError::io(&path, e))?)
            } else {
                None
            };
            if let Err(e) = file.persist(&path) {
                for (done, previous) in persisted.into_iter().rev() {
                    if let Err(undo) = Self::restore(&dir, &done, previous) {
                        warn!(run = %key, error = %undo, "could not roll back delivered image");
                    }
                }
                return Err(BuildError::io(&path, e.error));
            }
            persisted.push((path, previous));
        }

        for (path, _) in &persisted {
            info!(run = %key, path = %path.display(), "delivered image");
        }
        Ok(())
    }
}

/// Keeps delivered images in memory.
#[derive(Debug, Default)]
pub struct MemoryTarget {
    images: RwLock<BTreeMap<(RunKey, Partition), Vec<u8>>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes of a delivered image.
    pub fn image(&self, key: &RunKey, partition: Partition) -> Option<Vec<u8>> {
        self.images
            .read()
            .expect("lock poisoned")
            .get(&(key.clone(), partition))
            .cloned()
    }

    /// Every run that has been delivered, in key order.
    pub fn keys(&self) -> Vec<RunKey> {
        let map = self.images.read().expect("lock poisoned");
        let mut keys: Vec<RunKey> = map.keys().map(|(k, _)| k.clone()).collect();
        keys.dedup();
        keys
    }

    pub fn len(&self) -> usize {
        self.images.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.read().expect("lock poisoned").is_empty()
    }
}

impl DeploymentTarget for MemoryTarget {
    fn deliver(&self, key: &RunKey, images: &ImageSet) -> BuildResult<()> {
        let mut map = self.images.write().expect("lock poisoned");
        for partition in Partition::ALL {
            map.insert(
                (key.clone(), partition),
                images.get(partition).as_bytes().to_vec(),
            );
        }
        Ok(())
    }
}
