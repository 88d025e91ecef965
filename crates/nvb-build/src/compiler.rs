use std::path::{Path, PathBuf};
use std::process::Command;

use nvb_image::CompiledItems;
use nvb_types::ItemId;
use tracing::{debug, info, warn};

use crate::error::{BuildError, BuildResult};

/// Extension of compiled payload files.
pub const PAYLOAD_EXTENSION: &str = "bin";

/// Turns a descriptor into one binary payload file per item.
///
/// The compiler must leave `<out_dir>/<id>.bin` for every item it
/// compiles, where `<id>` is the item id in `0x..` form.
pub trait ItemCompiler: Send + Sync {
    fn compile(&self, descriptor: &Path, struct_def_dir: &Path, out_dir: &Path) -> BuildResult<()>;
}

/// Runs an external program as `<program> <descriptor> <struct_def_dir> <out_dir>`.
#[derive(Clone, Debug)]
pub struct ExternalCompiler {
    program: PathBuf,
}

impl ExternalCompiler {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl ItemCompiler for ExternalCompiler {
    fn compile(&self, descriptor: &Path, struct_def_dir: &Path, out_dir: &Path) -> BuildResult<()> {
        debug!(
            program = %self.program.display(),
            descriptor = %descriptor.display(),
            "invoking item compiler"
        );
        let output = Command::new(&self.program)
            .arg(descriptor)
            .arg(struct_def_dir)
            .arg(out_dir)
            .output()
            .map_err(|e| BuildError::ExternalTool {
                program: self.program.display().to_string(),
                status: format!("could not start: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let status = match stderr.trim() {
                "" => output.status.to_string(),
                msg => format!("{}: {msg}", output.status),
            };
            return Err(BuildError::ExternalTool {
                program: self.program.display().to_string(),
                status,
            });
        }
        Ok(())
    }
}

/// File name the compiler uses for an item's payload.
pub fn payload_file_name(id: ItemId) -> String {
    format!("{}.{PAYLOAD_EXTENSION}", id.to_canonical())
}

/// Collect every payload file in `dir`, keyed by the id in its file stem.
///
/// Only files named exactly as [`payload_file_name`] names them are
/// loaded, so each item id has one possible file. Anything else is skipped
/// with a warning.
pub fn load_compiled(dir: &Path) -> BuildResult<CompiledItems> {
    let listing = std::fs::read_dir(dir).map_err(|e| BuildError::io(dir, e))?;
    let mut items = CompiledItems::new();
    for entry in listing {
        let path = entry.map_err(|e| BuildError::io(dir, e))?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(PAYLOAD_EXTENSION) {
            continue;
        }
        let file_name = path.file_name().and_then(|s| s.to_str());
        let stem = path.file_stem().and_then(|s| s.to_str());
        let id = match stem.map(ItemId::parse) {
            Some(Ok(id)) if file_name == Some(payload_file_name(id).as_str()) => id,
            _ => {
                warn!(file = %path.display(), "skipping payload with unrecognised name");
                continue;
            }
        };
        let payload = std::fs::read(&path).map_err(|e| BuildError::io(&path, e))?;
        items.insert(id, payload);
    }
    info!(count = items.len(), dir = %dir.display(), "loaded compiled items");
    Ok(items)
}
