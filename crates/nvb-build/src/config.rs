use std::fmt;
use std::path::{Path, PathBuf};

use nvb_image::{ImageParams, HEADER_LEN};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{BuildError, BuildResult};

/// Extension of override files; each one found is a deployment variant.
pub const OVERRIDE_EXTENSION: &str = "cfg";

/// Configuration for a full build: which descriptors to merge, which
/// products and variants to build, and where to put the results.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Descriptor files. The first must exist; later ones are optional.
    pub sources: Vec<PathBuf>,
    /// Product tags to build for.
    pub products: Vec<String>,
    /// Directory holding one `*.cfg` override file per variant.
    pub overrides_dir: PathBuf,
    /// Restrict the build to these variants. Empty builds every variant.
    pub variants: Vec<String>,
    /// Struct definitions handed to the item compiler.
    pub struct_def_dir: PathBuf,
    /// Scratch space for intermediate descriptors and compiled payloads.
    pub work_dir: PathBuf,
    /// Root of the delivered images.
    pub out_dir: PathBuf,
    /// Item compiler program.
    pub compiler: PathBuf,
    /// Base file name of delivered images.
    pub image_name: String,
    #[serde(flatten)]
    pub image: ImageParams,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            products: vec!["sta".to_string()],
            overrides_dir: PathBuf::from("overrides"),
            variants: Vec::new(),
            struct_def_dir: PathBuf::from("include"),
            work_dir: PathBuf::from("build"),
            out_dir: PathBuf::from("out"),
            compiler: PathBuf::from("cdbm"),
            image_name: "nv".to_string(),
            image: ImageParams::default(),
        }
    }
}

impl BuildConfig {
    /// Load from a TOML file. Relative paths are resolved against the
    /// file's directory.
    pub fn load(path: &Path) -> BuildResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
        let mut config = Self::from_toml(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    pub fn from_toml(text: &str) -> BuildResult<Self> {
        toml::from_str(text).map_err(|e| BuildError::Config(e.to_string()))
    }

    /// Rebase every relative path onto `base`.
    ///
    /// A bare compiler name (no directory part) is left alone so it is
    /// looked up on `PATH`.
    pub fn resolve_relative_to(&mut self, base: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        for source in &mut self.sources {
            rebase(source);
        }
        rebase(&mut self.overrides_dir);
        rebase(&mut self.struct_def_dir);
        rebase(&mut self.work_dir);
        rebase(&mut self.out_dir);
        if self.compiler.components().count() > 1 {
            rebase(&mut self.compiler);
        }
    }

    pub fn validate(&self) -> BuildResult<()> {
        if self.sources.is_empty() {
            return Err(BuildError::Config("no descriptor sources".into()));
        }
        if self.products.is_empty() {
            return Err(BuildError::Config("no products".into()));
        }
        let mut seen = std::collections::BTreeSet::new();
        for product in &self.products {
            let tag = product.trim().to_ascii_lowercase();
            if tag.is_empty() {
                return Err(BuildError::Config("empty product tag".into()));
            }
            if !seen.insert(tag) {
                return Err(BuildError::Config(format!("product {product} listed twice")));
            }
        }
        if self.image_name.is_empty() {
            return Err(BuildError::Config("empty image name".into()));
        }
        let flash_size = self.image.flash_size as usize;
        if flash_size < HEADER_LEN {
            return Err(BuildError::Config(format!(
                "flash size {flash_size} is smaller than the {HEADER_LEN}-byte header"
            )));
        }
        if self.image.flash_size >= self.image.max_image_size {
            return Err(BuildError::Config(format!(
                "flash size {} must be below the image limit {}",
                self.image.flash_size, self.image.max_image_size
            )));
        }
        Ok(())
    }

    /// Variants discovered in `overrides_dir`, sorted by name, narrowed by
    /// `variants` if set. A missing directory has no variants.
    pub fn discover_variants(&self) -> BuildResult<Vec<(String, PathBuf)>> {
        let dir = &self.overrides_dir;
        let listing = match std::fs::read_dir(dir) {
            Ok(listing) => Some(listing),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(dir = %dir.display(), "override directory not found");
                None
            }
            Err(e) => return Err(BuildError::io(dir, e)),
        };

        let mut found = Vec::new();
        for entry in listing.into_iter().flatten() {
            let path = entry.map_err(|e| BuildError::io(dir, e))?.path();
            if !path.is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(OVERRIDE_EXTENSION)
            {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            found.push((stem.to_string(), path));
        }
        found.sort();

        if !self.variants.is_empty() {
            for wanted in &self.variants {
                if !found.iter().any(|(name, _)| name == wanted) {
                    return Err(BuildError::Config(format!(
                        "variant {wanted} has no override file in {}",
                        dir.display()
                    )));
                }
            }
            found.retain(|(name, _)| self.variants.contains(name));
        }
        debug!(count = found.len(), dir = %dir.display(), "discovered variants");
        Ok(found)
    }

    /// Expand products × variants into independent run configurations.
    pub fn runs(&self) -> BuildResult<Vec<RunConfig>> {
        let variants = self.discover_variants()?;
        let mut runs = Vec::with_capacity(self.products.len() * variants.len());
        for product in &self.products {
            for (variant, overrides) in &variants {
                let key = RunKey::new(product, variant);
                runs.push(RunConfig {
                    work_dir: self.work_dir.join(&key.product).join(&key.variant),
                    key,
                    overrides: overrides.clone(),
                    struct_def_dir: self.struct_def_dir.clone(),
                    image_name: self.image_name.clone(),
                    image: self.image,
                });
            }
        }
        Ok(runs)
    }
}

/// Identifies one run: a product and a deployment variant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RunKey {
    pub product: String,
    pub variant: String,
}

impl RunKey {
    pub fn new(product: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            product: product.into().trim().to_ascii_lowercase(),
            variant: variant.into(),
        }
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.product, self.variant)
    }
}

/// Everything one run needs. Built up front and never shared mutably, so
/// runs can proceed in parallel.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub key: RunKey,
    /// This variant's override file.
    pub overrides: PathBuf,
    pub struct_def_dir: PathBuf,
    /// Private scratch directory of this run.
    pub work_dir: PathBuf,
    pub image_name: String,
    pub image: ImageParams,
}

impl RunConfig {
    /// Where the overridden descriptor is written for the compiler.
    pub fn descriptor_path(&self) -> PathBuf {
        self.work_dir.join("descriptor.xml")
    }

    /// Where the compiler leaves one payload file per item.
    pub fn bin_dir(&self) -> PathBuf {
        self.work_dir.join("bin")
    }
}
