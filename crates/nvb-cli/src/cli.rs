use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "nvb",
    about = "NV image builder: merge descriptors and build factory/normal flash images",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build images for every product and variant in a build config
    Build(BuildArgs),
    /// Merge descriptor files into one, optionally scoped to a product
    Merge(MergeArgs),
    /// Show an image's header and index table
    Inspect(InspectArgs),
    /// Check image integrity
    Verify(VerifyArgs),
}

#[derive(Args)]
pub struct BuildArgs {
    /// Build configuration (TOML)
    #[arg(short, long, default_value = "nvbuild.toml")]
    pub config: PathBuf,
    /// Build only these products instead of the configured ones
    #[arg(long = "product")]
    pub products: Vec<String>,
    /// Build only these variants
    #[arg(long = "variant")]
    pub variants: Vec<String>,
}

#[derive(Args)]
pub struct MergeArgs {
    #[arg(required = true)]
    pub descriptors: Vec<PathBuf>,
    #[arg(short, long)]
    pub output: PathBuf,
    #[arg(long)]
    pub product: Option<String>,
}

#[derive(Args)]
pub struct InspectArgs {
    pub image: PathBuf,
}

#[derive(Args)]
pub struct VerifyArgs {
    #[arg(required = true)]
    pub images: Vec<PathBuf>,
}
