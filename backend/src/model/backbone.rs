use std::env;
use std::path::PathBuf;

use log::info;
use tch::{CModule, Device, Tensor};

use crate::model::error::ModelError;

pub const DEFAULT_BACKBONE: &str = "facebook/dinov2-base";

/// Feature extractor shared by the three classification heads. Implementors
/// map a `[batch, 3, S, S]` image batch to a `[batch, width]` feature batch;
/// the width is only discoverable by running a forward pass.
pub trait Backbone: Send {
    fn forward(&self, xs: &Tensor) -> Result<Tensor, ModelError>;
}

/// TorchScript export of a pretrained vision transformer.
pub struct ScriptedBackbone {
    module: CModule,
}

impl Backbone for ScriptedBackbone {
    fn forward(&self, xs: &Tensor) -> Result<Tensor, ModelError> {
        let out = self
            .module
            .forward_ts(&[xs])
            .map_err(|e| ModelError::Inference(format!("backbone forward pass failed: {e}")))?;
        // ViT-style modules emit [batch, tokens, width]; the CLS token carries
        // the image-level features.
        if out.dim() == 3 {
            Ok(out.select(1, 0))
        } else {
            Ok(out)
        }
    }
}

/// Resolves backbone identifiers (e.g. `facebook/dinov2-base`) to TorchScript
/// artifacts in local cache directories. The artifacts themselves arrive
/// out-of-band, like the weights checkpoint.
pub struct BackboneRegistry {
    cache_dirs: Vec<PathBuf>,
}

impl BackboneRegistry {
    pub fn new(cache_dirs: Vec<PathBuf>) -> Self {
        Self { cache_dirs }
    }

    pub fn from_env() -> Self {
        let mut cache_dirs = Vec::new();
        if let Ok(dir) = env::var("BACKBONE_CACHE_DIR") {
            cache_dirs.push(PathBuf::from(dir));
        }
        if let Ok(cwd) = env::current_dir() {
            cache_dirs.push(cwd.join("backbones"));
        }
        cache_dirs.push(PathBuf::from("/app/backbones"));
        Self { cache_dirs }
    }

    fn artifact_name(identifier: &str) -> String {
        format!("{}.pt", identifier.replace('/', "--"))
    }

    pub fn instantiate(
        &self,
        identifier: &str,
        device: Device,
    ) -> Result<Box<dyn Backbone>, ModelError> {
        let artifact = Self::artifact_name(identifier);
        for dir in &self.cache_dirs {
            let path = dir.join(&artifact);
            info!("Looking for backbone artifact at {}", path.display());
            if path.is_file() {
                let module = CModule::load_on_device(&path, device).map_err(|e| {
                    ModelError::Load(format!(
                        "backbone {} at {} could not be loaded: {e}",
                        identifier,
                        path.display()
                    ))
                })?;
                info!("Loaded backbone {} from {}", identifier, path.display());
                return Ok(Box::new(ScriptedBackbone { module }));
            }
        }
        Err(ModelError::Load(format!(
            "backbone '{}' not cached; expected {} under one of {:?}",
            identifier, artifact, self.cache_dirs
        )))
    }
}
