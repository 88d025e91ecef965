use nvb_image::{Image, ImageParams, Partition};
use tracing::info;

use crate::config::RunKey;
use crate::error::{BuildError, BuildResult};
use crate::target::{DeploymentTarget, ImageSet};

/// The images a run produced, before validation. A run that failed partway
/// may have only one of them.
#[derive(Clone, Debug, Default)]
pub struct AssembledImages {
    pub factory: Option<Image>,
    pub normal: Option<Image>,
}

impl AssembledImages {
    pub fn insert(&mut self, image: Image) {
        match image.partition() {
            Partition::Factory => self.factory = Some(image),
            Partition::Normal => self.normal = Some(image),
        }
    }

    /// Check that both images exist and are well formed for `params`.
    pub fn validate(self, key: &RunKey, params: &ImageParams) -> BuildResult<ImageSet> {
        let factory = checked(key, params, Partition::Factory, self.factory)?;
        let normal = checked(key, params, Partition::Normal, self.normal)?;
        Ok(ImageSet { factory, normal })
    }
}

fn checked(
    key: &RunKey,
    params: &ImageParams,
    partition: Partition,
    image: Option<Image>,
) -> BuildResult<Image> {
    let incomplete = |reason: String| BuildError::IncompleteOutput {
        key: key.clone(),
        partition,
        reason,
    };

    let image = image.ok_or_else(|| incomplete("is missing".into()))?;
    if image.is_empty() {
        return Err(incomplete("is empty".into()));
    }
    if image.partition() != partition {
        return Err(incomplete(format!("carries {} magic", image.partition())));
    }
    if image.len() != params.flash_size as usize {
        return Err(incomplete(format!(
            "is {} bytes, expected {}",
            image.len(),
            params.flash_size
        )));
    }
    params.check_image_len(image.len())?;
    Ok(image)
}

/// Validate a run's images and hand them to the target.
///
/// Nothing is delivered unless both images pass.
pub fn emit(
    key: &RunKey,
    images: AssembledImages,
    params: &ImageParams,
    target: &dyn DeploymentTarget,
) -> BuildResult<ImageSet> {
    let set = images.validate(key, params)?;
    target.deliver(key, &set)?;
    info!(
        run = %key,
        factory_items = set.factory.entries().len(),
        normal_items = set.normal.entries().len(),
        "emitted images"
    );
    Ok(set)
}
