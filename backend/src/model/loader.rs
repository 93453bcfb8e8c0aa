use std::fs;
use std::path::Path;

use log::info;
use safetensors::SafeTensors;
use tch::nn::{self, ModuleT};
use tch::{Device, Kind, Tensor};

use crate::model::backbone::{Backbone, BackboneRegistry, DEFAULT_BACKBONE};
use crate::model::error::ModelError;
use crate::model::labels::LABELS;
use crate::model::predict::{Classifier, RawLogits};

pub const DEFAULT_IMAGE_SIZE: i64 = 224;
const HEAD_DROPOUT: f64 = 0.3;

/// Training config persisted in the checkpoint's safetensors metadata.
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    pub backbone_name: String,
    pub image_size: i64,
}

pub fn read_checkpoint_config(path: &Path) -> Result<CheckpointConfig, ModelError> {
    let bytes = fs::read(path)
        .map_err(|e| ModelError::Load(format!("failed to read {}: {e}", path.display())))?;
    let (_, metadata) = SafeTensors::read_metadata(&bytes).map_err(|e| {
        ModelError::Load(format!(
            "{} is not a valid safetensors checkpoint: {e}",
            path.display()
        ))
    })?;
    let kv = metadata.metadata().clone().unwrap_or_default();
    let backbone_name = kv
        .get("backbone_name")
        .cloned()
        .unwrap_or_else(|| DEFAULT_BACKBONE.to_string());
    let image_size = kv
        .get("image_size")
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_IMAGE_SIZE);
    Ok(CheckpointConfig {
        backbone_name,
        image_size,
    })
}

/// LayerNorm -> Dropout -> Linear -> GELU -> Dropout -> Linear, the head
/// architecture the checkpoint was trained with.
fn classification_head(
    p: nn::Path<'_>,
    in_dim: i64,
    hidden: i64,
    out: i64,
) -> nn::SequentialT {
    nn::seq_t()
        .add(nn::layer_norm(&p / "norm", vec![in_dim], Default::default()))
        .add_fn_t(|xs, train| xs.dropout(HEAD_DROPOUT, train))
        .add(nn::linear(&p / "fc1", in_dim, hidden, Default::default()))
        .add_fn(|xs| xs.gelu("none"))
        .add_fn_t(|xs, train| xs.dropout(HEAD_DROPOUT, train))
        .add(nn::linear(&p / "fc2", hidden, out, Default::default()))
}

/// The fully assembled network: frozen backbone plus three heads, pinned to
/// one device. Read-only after construction; inference always runs with
/// `train = false` under `no_grad`.
pub struct LoadedModel {
    backbone: Box<dyn Backbone>,
    disease_head: nn::SequentialT,
    stage_head: nn::SequentialT,
    combined_head: nn::SequentialT,
    image_size: i64,
    device: Device,
    _vs: nn::VarStore,
}

pub fn load_model(path: &Path, registry: &BackboneRegistry) -> Result<LoadedModel, ModelError> {
    let device = Device::cuda_if_available();
    info!("Loading model from {} on {:?}", path.display(), device);

    let config = read_checkpoint_config(path)?;
    info!(
        "Checkpoint config: backbone={} image_size={}",
        config.backbone_name, config.image_size
    );

    let backbone = registry.instantiate(&config.backbone_name, device)?;

    // The feature width is only known after the backbone exists; probe it
    // with one dummy forward pass.
    let width = tch::no_grad(|| -> Result<i64, ModelError> {
        let dummy = Tensor::zeros(
            [1, 3, config.image_size, config.image_size],
            (Kind::Float, device),
        );
        let features = backbone.forward(&dummy)?;
        features
            .size()
            .last()
            .copied()
            .ok_or_else(|| ModelError::Load("backbone produced a scalar feature tensor".into()))
    })
    .map_err(|e| match e {
        ModelError::Inference(msg) => ModelError::Load(format!("backbone probe failed: {msg}")),
        other => other,
    })?;
    info!("Backbone feature width: {width}");

    let mut vs = nn::VarStore::new(device);
    let root = vs.root();
    let disease_head = classification_head(
        &root / "heads" / "disease",
        width,
        512,
        LABELS.diseases.len() as i64,
    );
    let stage_head = classification_head(
        &root / "heads" / "stage",
        width,
        256,
        LABELS.stages.len() as i64,
    );
    let combined_head = classification_head(
        &root / "heads" / "combined",
        width,
        512,
        LABELS.combined.len() as i64,
    );

    vs.load(path).map_err(|e| {
        ModelError::Load(format!(
            "weights in {} do not match the reconstructed heads: {e}",
            path.display()
        ))
    })?;
    vs.freeze();
    info!("Model loaded successfully");

    Ok(LoadedModel {
        backbone,
        disease_head,
        stage_head,
        combined_head,
        image_size: config.image_size,
        device,
        _vs: vs,
    })
}

impl Classifier for LoadedModel {
    fn image_size(&self) -> i64 {
        self.image_size
    }

    fn raw_forward(&self, input: &Tensor) -> Result<RawLogits, ModelError> {
        let input = input.to_device(self.device);
        let features = self.backbone.forward(&input)?;
        Ok(RawLogits {
            disease: self.disease_head.forward_t(&features, false),
            stage: self.stage_head.forward_t(&features, false),
            combined: self.combined_head.forward_t(&features, false),
        })
    }
}
