use anyhow::{bail, Context};
use colored::Colorize;
use nvb_build::{build_all, BuildConfig, BuildReport, ExternalCompiler, FsTarget};
use nvb_descriptor::{filter_for_product, load_file, merge_labelled, write_file, Descriptor};
use nvb_image::ImageReader;
use serde_json::json;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Build(args) => cmd_build(args, &cli.format),
        Command::Merge(args) => cmd_merge(args, &cli.format),
        Command::Inspect(args) => cmd_inspect(args, &cli.format),
        Command::Verify(args) => cmd_verify(args, &cli.format),
    }
}

fn cmd_build(args: BuildArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let mut config = BuildConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if !args.products.is_empty() {
        config.products = args.products;
    }
    if !args.variants.is_empty() {
        config.variants = args.variants;
    }

    let compiler = ExternalCompiler::new(&config.compiler);
    let target = FsTarget::new(&config.out_dir, &config.image_name);
    let report = build_all(&config, &compiler, &target)?;

    match format {
        OutputFormat::Json => print_json(&build_json(&report))?,
        OutputFormat::Text => {
            for outcome in &report.outcomes {
                match &outcome.result {
                    Ok(s) => println!(
                        "{} {}  factory: {} items, {} B  normal: {} items, {} B",
                        "✓".green().bold(),
                        outcome.key.to_string().yellow(),
                        s.factory_items,
                        s.factory_used,
                        s.normal_items,
                        s.normal_used,
                    ),
                    Err(e) => println!("{} {}  {}", "✗".red().bold(), outcome.key.to_string().yellow(), e),
                }
            }
            println!("Images written to {}", config.out_dir.display().to_string().bold());
        }
    }

    let failed = report.failures().count();
    if failed > 0 {
        bail!("{failed} of {} runs failed", report.outcomes.len());
    }
    Ok(())
}

fn build_json(report: &BuildReport) -> serde_json::Value {
    json!({
        "merged_items": report.merged_items,
        "succeeded": report.successes().collect::<Vec<_>>(),
        "failed": report
            .failures()
            .map(|(key, e)| json!({ "key": key, "error": e.to_string() }))
            .collect::<Vec<_>>(),
    })
}

fn cmd_merge(args: MergeArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let mut loaded = Vec::with_capacity(args.descriptors.len());
    for path in &args.descriptors {
        let descriptor =
            load_file(path).with_context(|| format!("loading {}", path.display()))?;
        loaded.push((path.display().to_string(), descriptor));
    }
    let labelled: Vec<(&str, &Descriptor)> =
        loaded.iter().map(|(label, d)| (label.as_str(), d)).collect();
    let mut merged = merge_labelled(&labelled)?;
    if let Some(product) = &args.product {
        merged = filter_for_product(&merged, product);
    }
    write_file(&args.output, &merged)?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "output": args.output.display().to_string(),
            "sources": loaded.len(),
            "groups": merged.groups.len(),
            "items": merged.item_count(),
        }))?,
        OutputFormat::Text => println!(
            "{} Merged {} sources into {} ({} groups, {} items)",
            "✓".green().bold(),
            loaded.len(),
            args.output.display().to_string().bold(),
            merged.groups.len(),
            merged.item_count(),
        ),
    }
    Ok(())
}

fn cmd_inspect(args: InspectArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let reader = ImageReader::open(&args.image)
        .with_context(|| format!("reading {}", args.image.display()))?;
    let header = reader.header();

    match format {
        OutputFormat::Json => print_json(&json!({
            "partition": reader.partition(),
            "header": header,
            "entries": reader.entries(),
            "used": reader.used_len(),
        }))?,
        OutputFormat::Text => {
            println!("{} ({} image)", args.image.display().to_string().bold(), reader.partition().to_string().cyan());
            println!("  Magic:      {:#010x}", header.magic);
            println!("  CRC:        {:#010x}", header.crc);
            println!("  Version:    {}", header.version);
            println!("  Seq:        {}", header.seq);
            println!("  Ver magic:  {:#x}", header.ver_magic);
            println!("  Flash size: {} B ({} B used)", header.flash_size, reader.used_len());
            println!("  Keep range: {:#04x}..={:#04x}", header.keep_range.0, header.keep_range.1);
            println!("  Items:      {}", header.item_count);
            for entry in reader.entries() {
                println!(
                    "    {}  len {:>3}  @ {:#06x}",
                    format!("{:#04x}", entry.id).yellow(),
                    entry.len,
                    entry.offset,
                );
            }
        }
    }
    Ok(())
}

fn cmd_verify(args: VerifyArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let results: Vec<_> = args
        .images
        .iter()
        .map(|path| {
            let result = ImageReader::open(path).and_then(|r| r.verify().map(|()| r));
            (path, result)
        })
        .collect();

    match format {
        OutputFormat::Json => print_json(&json!(results
            .iter()
            .map(|(path, result)| match result {
                Ok(r) => json!({
                    "image": path.display().to_string(),
                    "ok": true,
                    "partition": r.partition(),
                    "items": r.item_count(),
                }),
                Err(e) => json!({
                    "image": path.display().to_string(),
                    "ok": false,
                    "error": e.to_string(),
                }),
            })
            .collect::<Vec<_>>()))?,
        OutputFormat::Text => {
            for (path, result) in &results {
                match result {
                    Ok(r) => println!(
                        "{} {}  {} image, {} items",
                        "✓".green().bold(),
                        path.display(),
                        r.partition(),
                        r.item_count()
                    ),
                    Err(e) => println!("{} {}  {}", "✗".red().bold(), path.display(), e),
                }
            }
        }
    }

    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    if failed > 0 {
        bail!("{failed} of {} images failed verification", results.len());
    }
    Ok(())
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
