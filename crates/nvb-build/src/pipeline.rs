use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use nvb_descriptor::{filter_for_product, load_file, merge_labelled, write_file, OverrideSet};
use nvb_image::{ImageAssembler, Partition};
use nvb_types::Descriptor;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::compiler::{load_compiled, ItemCompiler};
use crate::config::{BuildConfig, RunConfig, RunKey};
use crate::emit::{emit, AssembledImages};
use crate::error::{BuildError, BuildResult};
use crate::target::{DeploymentTarget, ImageSet};

/// Name of the merged descriptor written to the work directory.
pub const MERGED_DESCRIPTOR: &str = "merged.xml";
/// Name of each product-scoped descriptor, under `<work_dir>/<product>/`.
pub const PRODUCT_DESCRIPTOR: &str = "product.xml";

/// Load and merge descriptor sources.
///
/// The first source must exist. Later sources are optional and skipped
/// when absent.
pub fn load_sources(paths: &[PathBuf]) -> BuildResult<Descriptor> {
    let Some((first, rest)) = paths.split_first() else {
        return Err(BuildError::Config("no descriptor sources".into()));
    };

    let mut loaded = vec![(first.display().to_string(), load_file(first)?)];
    for path in rest {
        if !path.exists() {
            info!(path = %path.display(), "optional descriptor source not found, skipping");
            continue;
        }
        loaded.push((path.display().to_string(), load_file(path)?));
    }

    let labelled: Vec<(&str, &Descriptor)> =
        loaded.iter().map(|(label, d)| (label.as_str(), d)).collect();
    let merged = merge_labelled(&labelled)?;
    info!(
        sources = loaded.len(),
        groups = merged.groups.len(),
        items = merged.item_count(),
        "merged descriptor sources"
    );
    Ok(merged)
}

/// What a successful run produced.
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub key: RunKey,
    pub flash_size: u32,
    pub factory_items: usize,
    pub normal_items: usize,
    pub factory_used: usize,
    pub normal_used: usize,
}

impl RunSummary {
    fn new(key: RunKey, images: &ImageSet) -> Self {
        Self {
            key,
            flash_size: images.normal.header().flash_size,
            factory_items: images.factory.entries().len(),
            normal_items: images.normal.entries().len(),
            factory_used: images.factory.used_len(),
            normal_used: images.normal.used_len(),
        }
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub key: RunKey,
    pub result: BuildResult<RunSummary>,
}

/// Result of [`build_all`]: one outcome per run, in run order.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub merged_items: usize,
    pub outcomes: Vec<RunOutcome>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn successes(&self) -> impl Iterator<Item = &RunSummary> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&RunKey, &BuildError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.key, e)))
    }
}

/// Build both images for one product and variant.
///
/// `product` is the merged descriptor already scoped to the run's product.
/// Nothing is delivered if any step fails.
pub fn run_variant(
    run: &RunConfig,
    product: &Descriptor,
    compiler: &dyn ItemCompiler,
    target: &dyn DeploymentTarget,
) -> BuildResult<RunSummary> {
    let overrides = OverrideSet::load(&run.overrides)?;
    let descriptor = overrides.apply(product);
    info!(run = %run.key, overrides = overrides.len(), "applied overrides");

    create_dir(&run.work_dir)?;
    let descriptor_path = run.descriptor_path();
    write_file(&descriptor_path, &descriptor)?;

    let bin_dir = run.bin_dir();
    if bin_dir.exists() {
        std::fs::remove_dir_all(&bin_dir).map_err(|e| BuildError::io(&bin_dir, e))?;
    }
    create_dir(&bin_dir)?;
    compiler.compile(&descriptor_path, &run.struct_def_dir, &bin_dir)?;
    let compiled = load_compiled(&bin_dir)?;

    let assembler = ImageAssembler::new(compiled, run.image);
    let mut images = AssembledImages::default();
    for partition in Partition::ALL {
        images.insert(assembler.assemble(&descriptor, partition)?);
    }

    let set = emit(&run.key, images, &run.image, target)?;
    Ok(RunSummary::new(run.key.clone(), &set))
}

/// Run the whole build: merge, filter per product, then every
/// product × variant run in parallel.
///
/// Configuration and merge errors abort the build. Errors inside a run
/// are recorded in the report and do not stop other runs.
pub fn build_all(
    config: &BuildConfig,
    compiler: &dyn ItemCompiler,
    target: &dyn DeploymentTarget,
) -> BuildResult<BuildReport> {
    config.validate()?;
    let runs = config.runs()?;
    if runs.is_empty() {
        warn!(dir = %config.overrides_dir.display(), "no variants to build");
    }

    let merged = load_sources(&config.sources)?;
    create_dir(&config.work_dir)?;
    write_file(&config.work_dir.join(MERGED_DESCRIPTOR), &merged)?;

    let mut products = BTreeMap::new();
    for product in &config.products {
        let tag = product.trim().to_ascii_lowercase();
        let scoped = filter_for_product(&merged, &tag);
        let dir = config.work_dir.join(&tag);
        create_dir(&dir)?;
        write_file(&dir.join(PRODUCT_DESCRIPTOR), &scoped)?;
        products.insert(tag, scoped);
    }

    let outcomes = std::thread::scope(|scope| {
        let handles: Vec<_> = runs
            .iter()
            .map(|run| {
                let product = products.get(&run.key.product);
                let handle = scope.spawn(move || match product {
                    Some(product) => run_variant(run, product, compiler, target),
                    None => Err(BuildError::Config(format!(
                        "no descriptor for product {}",
                        run.key.product
                    ))),
                });
                (run.key.clone(), handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(key, handle)| {
                let result = handle
                    .join()
                    .unwrap_or_else(|_| Err(BuildError::RunPanicked(key.clone())));
                if let Err(e) = &result {
                    error!(run = %key, error = %e, "run failed");
                }
                RunOutcome { key, result }
            })
            .collect::<Vec<_>>()
    });

    let report = BuildReport {
        merged_items: merged.item_count(),
        outcomes,
    };
    info!(
        runs = report.outcomes.len(),
        failed = report.failures().count(),
        "build finished"
    );
    Ok(report)
}

fn create_dir(path: &Path) -> BuildResult<()> {
    std::fs::create_dir_all(path).map_err(|e| BuildError::io(path, e))
}
