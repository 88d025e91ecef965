//! Build pipeline for NV images.
//!
//! A build merges the descriptor sources once, scopes the result to each
//! product, and then runs every product × variant combination on its own
//! thread with its own [`RunConfig`]:
//!
//! 1. apply the variant's overrides and write the run descriptor
//! 2. invoke the [`ItemCompiler`] to produce one payload per item
//! 3. assemble the factory and normal images
//! 4. validate both and hand them to a [`DeploymentTarget`]
//!
//! A failing run is reported in the [`BuildReport`] and leaves no output
//! behind. Other runs are unaffected.

pub mod compiler;
pub mod config;
pub mod emit;
pub mod error;
pub mod pipeline;
pub mod target;

pub use compiler::{load_compiled, payload_file_name, ExternalCompiler, ItemCompiler};
pub use config::{BuildConfig, RunConfig, RunKey};
pub use emit::{emit, AssembledImages};
pub use error::{BuildError, BuildResult};
pub use pipeline::{build_all, load_sources, run_variant, BuildReport, RunOutcome, RunSummary};
pub use target::{image_file_name, DeploymentTarget, FsTarget, ImageSet, MemoryTarget};

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    use nvb_image::{ImageError, ImageReader, Partition};
    use nvb_types::{ItemId, FACTORY_GROUP};

    /// Writes each item's value as its payload, skipping the ids in `skip`.
    struct ValueCompiler {
        skip: Vec<u32>,
    }

    impl ValueCompiler {
        fn new() -> Self {
            Self { skip: Vec::new() }
        }
    }

    impl ItemCompiler for ValueCompiler {
        fn compile(&self, descriptor: &Path, _: &Path, out_dir: &Path) -> BuildResult<()> {
            let descriptor = nvb_descriptor::load_file(descriptor)?;
            for (_, item) in descriptor.items() {
                if self.skip.contains(&item.id.get()) {
                    continue;
                }
                let payload = item.value.clone().unwrap_or_default();
                let path = out_dir.join(payload_file_name(item.id));
                std::fs::write(&path, payload).map_err(|e| BuildError::Io { path, source: e })?;
            }
            Ok(())
        }
    }

    const BASE: &str = r#"<HISTUDIO>
  <GROUP NAME="Factory" ID="0x1">
    <NV ID="0x01" PARAM_VALUE="SN0001"/>
  </GROUP>
  <GROUP NAME="Keep" ID="0x2">
    <NV ID="0x82" PARAM_VALUE="k2"/>
    <NV ID="0x80" PARAM_VALUE="k0"/>
  </GROUP>
  <GROUP NAME="Radio" ID="0x3">
    <NV ID="0x10" PARAM_VALUE="ch1" DEV="asic-fpga"/>
    <NV ID="0x11" PARAM_VALUE="fpga-only" DEV="FPGA"/>
  </GROUP>
</HISTUDIO>"#;

    const EXTRA: &str = r#"<HISTUDIO>
  <GROUP NAME="Radio" ID="0x3">
    <NV ID="0x12" PARAM_VALUE="pwr"/>
  </GROUP>
</HISTUDIO>"#;

    struct Fixture {
        dir: tempfile::TempDir,
        config: BuildConfig,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::write(root.join("base.xml"), BASE).unwrap();
        std::fs::write(root.join("extra.xml"), EXTRA).unwrap();
        std::fs::create_dir(root.join("overrides")).unwrap();
        std::fs::write(root.join("overrides/default.cfg"), "").unwrap();
        std::fs::write(
            root.join("overrides/lab.cfg"),
            "# lab bench\nID=0x10\nPARAM_VALUE=ch9\n",
        )
        .unwrap();

        let config = BuildConfig {
            sources: vec![
                PathBuf::from("base.xml"),
                PathBuf::from("extra.xml"),
                PathBuf::from("absent.xml"),
            ],
            products: vec!["asic".into(), "fpga".into()],
            ..Default::default()
        };
        let mut fixture = Fixture { dir, config };
        fixture.config.resolve_relative_to(fixture.dir.path());
        fixture
    }

    fn reader(target: &MemoryTarget, product: &str, variant: &str, p: Partition) -> ImageReader {
        let bytes = target.image(&RunKey::new(product, variant), p).unwrap();
        ImageReader::from_bytes(bytes).unwrap()
    }

    #[test]
    fn builds_every_product_and_variant() {
        let fx = fixture();
        let target = MemoryTarget::new();
        let report = build_all(&fx.config, &ValueCompiler::new(), &target).unwrap();

        assert!(report.is_success());
        assert_eq!(report.merged_items, 6);
        let keys: Vec<String> = report.outcomes.iter().map(|o| o.key.to_string()).collect();
        assert_eq!(keys, ["asic/default", "asic/lab", "fpga/default", "fpga/lab"]);
        assert_eq!(target.keys().len(), 4);

        let factory = reader(&target, "asic", "default", Partition::Factory);
        assert_eq!(factory.read_item(0x01).unwrap(), Some(&b"SN0001"[..]));
        assert_eq!(factory.item_count(), 1);

        let normal = reader(&target, "asic", "default", Partition::Normal);
        let ids: Vec<u8> = normal.entries().iter().map(|e| e.id).collect();
        assert_eq!(ids, [0x10, 0x12, 0x80, 0x82]);
        assert_eq!(normal.header().keep_range, (0x80, 0x82));
        assert_eq!(normal.read_item(0x10).unwrap(), Some(&b"ch1"[..]));
    }

    #[test]
    fn device_tags_scope_items_per_product() {
        let fx = fixture();
        let target = MemoryTarget::new();
        build_all(&fx.config, &ValueCompiler::new(), &target).unwrap();

        let asic = reader(&target, "asic", "default", Partition::Normal);
        let fpga = reader(&target, "fpga", "default", Partition::Normal);
        assert!(asic.read_item(0x11).unwrap().is_none());
        assert_eq!(fpga.read_item(0x11).unwrap(), Some(&b"fpga-only"[..]));
    }

    #[test]
    fn variant_overrides_only_touch_their_run() {
        let fx = fixture();
        let target = MemoryTarget::new();
        build_all(&fx.config, &ValueCompiler::new(), &target).unwrap();

        let lab = reader(&target, "fpga", "lab", Partition::Normal);
        let default = reader(&target, "fpga", "default", Partition::Normal);
        assert_eq!(lab.read_item(0x10).unwrap(), Some(&b"ch9"[..]));
        assert_eq!(default.read_item(0x10).unwrap(), Some(&b"ch1"[..]));
    }

    #[test]
    fn intermediate_descriptors_are_written() {
        let fx = fixture();
        build_all(&fx.config, &ValueCompiler::new(), &MemoryTarget::new()).unwrap();

        let work = &fx.config.work_dir;
        let merged = nvb_descriptor::load_file(&work.join("merged.xml")).unwrap();
        assert_eq!(merged.item_count(), 6);
        let product = nvb_descriptor::load_file(&work.join("asic/product.xml")).unwrap();
        assert!(product.item(ItemId::new(0x11)).is_none());
        let run = nvb_descriptor::load_file(&work.join("asic/lab/descriptor.xml")).unwrap();
        let item = run.item(ItemId::new(0x10)).unwrap();
        assert_eq!(item.value.as_deref(), Some("ch9"));
        assert!(work.join("asic/lab/bin/0x10.bin").is_file());
    }

    #[test]
    fn fs_target_lays_out_images_per_run() {
        let fx = fixture();
        let target = FsTarget::new(&fx.config.out_dir, &fx.config.image_name);
        let report = build_all(&fx.config, &ValueCompiler::new(), &target).unwrap();
        assert!(report.is_success());

        for run in ["asic/default", "asic/lab", "fpga/default", "fpga/lab"] {
            for file in ["nv_factory.hnv", "nv_normal.hnv"] {
                let path = fx.config.out_dir.join(run).join(file);
                let reader = ImageReader::open(&path).unwrap();
                reader.verify().unwrap();
            }
        }
    }

    #[test]
    fn missing_payload_fails_only_that_build_and_delivers_nothing() {
        let fx = fixture();
        let target = MemoryTarget::new();
        let compiler = ValueCompiler { skip: vec![0x11] };
        let report = build_all(&fx.config, &compiler, &target).unwrap();

        assert!(!report.is_success());
        let failed: Vec<String> = report.failures().map(|(k, _)| k.to_string()).collect();
        assert_eq!(failed, ["fpga/default", "fpga/lab"]);
        for (_, err) in report.failures() {
            assert!(matches!(err, BuildError::Image(ImageError::MissingPayload { .. })));
        }
        assert_eq!(report.successes().count(), 2);
        assert_eq!(target.keys(), vec![RunKey::new("asic", "default"), RunKey::new("asic", "lab")]);
    }

    #[test]
    fn duplicate_ids_across_sources_abort_the_build() {
        let fx = fixture();
        std::fs::write(
            fx.dir.path().join("extra.xml"),
            r#"<HISTUDIO><GROUP NAME="Dup" ID="0x9"><NV ID="0x10" PARAM_VALUE="x"/></GROUP></HISTUDIO>"#,
        )
        .unwrap();
        let target = MemoryTarget::new();
        let err = build_all(&fx.config, &ValueCompiler::new(), &target).unwrap_err();
        assert!(matches!(
            err,
            BuildError::Descriptor(nvb_descriptor::DescriptorError::DuplicateId { .. })
        ));
        assert!(target.is_empty());
    }

    #[test]
    fn missing_first_source_aborts_the_build() {
        let mut fx = fixture();
        fx.config.sources[0] = fx.dir.path().join("nope.xml");
        assert!(matches!(
            build_all(&fx.config, &ValueCompiler::new(), &MemoryTarget::new()),
            Err(BuildError::Descriptor(_))
        ));
    }

    #[test]
    fn oversized_factory_group_is_size_error() {
        let fx = fixture();
        let big: String = (0x20..0x60)
            .map(|id| format!(r#"<NV ID="{id:#x}" PARAM_VALUE="{}"/>"#, "x".repeat(200)))
            .collect();
        std::fs::write(
            fx.dir.path().join("extra.xml"),
            format!(r#"<HISTUDIO><GROUP NAME="{FACTORY_GROUP}" ID="0x1">{big}</GROUP></HISTUDIO>"#),
        )
        .unwrap();
        let report = build_all(&fx.config, &ValueCompiler::new(), &MemoryTarget::new()).unwrap();
        assert!(report.outcomes.iter().all(|o| matches!(
            o.result,
            Err(BuildError::Image(ImageError::SizeExceeded { .. }))
        )));
    }

    #[cfg(unix)]
    #[test]
    fn external_compiler_failure_is_reported_per_run() {
        let fx = fixture();
        let report = build_all(&fx.config, &ExternalCompiler::new("false"), &MemoryTarget::new())
            .unwrap();
        assert_eq!(report.failures().count(), 4);
        assert!(report
            .failures()
            .all(|(_, e)| matches!(e, BuildError::ExternalTool { .. })));
    }

    #[test]
    fn run_variant_with_absent_override_file_fails() {
        let fx = fixture();
        let mut runs = fx.config.runs().unwrap();
        let mut run = runs.remove(0);
        run.overrides = fx.dir.path().join("overrides/gone.cfg");
        let product = load_sources(&fx.config.sources).unwrap();
        assert!(run_variant(&run, &product, &ValueCompiler::new(), &MemoryTarget::new()).is_err());
    }
}
