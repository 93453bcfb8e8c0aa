use std::collections::BTreeMap;

use image::imageops::FilterType;
use tch::{Kind, Tensor};

use crate::model::error::ModelError;
use crate::model::labels::LABELS;

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// One raw score vector per classification head, shape `[1, n]` each.
pub struct RawLogits {
    pub disease: Tensor,
    pub stage: Tensor,
    pub combined: Tensor,
}

/// The loaded network as the prediction path sees it. Kept as a trait so the
/// postprocessing pipeline can be exercised against a stub with declared
/// logits.
pub trait Classifier: Send {
    fn image_size(&self) -> i64;
    fn raw_forward(&self, input: &Tensor) -> Result<RawLogits, ModelError>;
}

#[derive(Debug, Clone)]
pub struct Prediction {
    pub disease: String,
    pub stage: String,
    pub combined: String,
    pub disease_confidence: f32,
    pub stage_confidence: f32,
    pub combined_confidence: f32,
    pub disease_probabilities: BTreeMap<String, f32>,
    pub stage_probabilities: BTreeMap<String, f32>,
}

impl From<Prediction> for shared::PredictionResponse {
    fn from(p: Prediction) -> Self {
        shared::PredictionResponse {
            success: true,
            disease: p.disease,
            stage: p.stage,
            disease_confidence: p.disease_confidence,
            stage_confidence: p.stage_confidence,
            combined_confidence: p.combined_confidence,
            all_disease_probabilities: p.disease_probabilities,
            all_stage_probabilities: p.stage_probabilities,
        }
    }
}

/// Decode, resize and normalize an uploaded image into a `[1, 3, S, S]`
/// float tensor with ImageNet statistics. The normalization must match the
/// training transform exactly or predictions drift.
pub fn preprocess(bytes: &[u8], image_size: i64) -> Result<Tensor, ModelError> {
    if bytes.is_empty() {
        return Err(ModelError::Input("no image provided".into()));
    }
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| ModelError::Input(format!("could not decode image: {e}")))?;
    let rgb = decoded.to_rgb8();
    let resized = image::imageops::resize(
        &rgb,
        image_size as u32,
        image_size as u32,
        FilterType::Triangle,
    );

    let tensor = Tensor::from_slice(resized.as_raw())
        .view([image_size, image_size, 3])
        .permute([2, 0, 1])
        .to_kind(Kind::Float)
        / 255.0;
    let mean = Tensor::from_slice(&IMAGENET_MEAN).view([3, 1, 1]);
    let std = Tensor::from_slice(&IMAGENET_STD).view([3, 1, 1]);
    Ok(((tensor - &mean) / &std).unsqueeze(0))
}

pub fn predict(model: &dyn Classifier, bytes: &[u8]) -> Result<Prediction, ModelError> {
    let input = preprocess(bytes, model.image_size())?;
    let logits = tch::no_grad(|| model.raw_forward(&input))?;

    let (disease_idx, disease_confidence, disease_scores) = postprocess(&logits.disease)?;
    let (stage_idx, stage_confidence, stage_scores) = postprocess(&logits.stage)?;
    let (combined_idx, combined_confidence, _) = postprocess(&logits.combined)?;

    let disease = label_at(&LABELS.diseases, disease_idx, "disease")?;
    let stage = label_at(&LABELS.stages, stage_idx, "stage")?;
    let combined = label_at(&LABELS.combined, combined_idx, "combined")?;

    Ok(Prediction {
        disease,
        stage,
        combined,
        disease_confidence,
        stage_confidence,
        combined_confidence,
        disease_probabilities: distribution(&LABELS.diseases, &disease_scores),
        stage_probabilities: distribution(&LABELS.stages, &stage_scores),
    })
}

/// Softmax one logit vector; returns (argmax, confidence in percent, all
/// percentages in index order).
fn postprocess(logits: &Tensor) -> Result<(usize, f32, Vec<f32>), ModelError> {
    let probs = logits.softmax(-1, Kind::Float).view([-1]);
    let n = probs.size()[0] as usize;
    if n == 0 {
        return Err(ModelError::Inference("empty logit vector".into()));
    }
    let mut scores = vec![0.0f32; n];
    probs.copy_data(&mut scores, n);
    let mut best = 0;
    for (i, score) in scores.iter().enumerate() {
        if *score > scores[best] {
            best = i;
        }
    }
    let percentages: Vec<f32> = scores.iter().map(|s| s * 100.0).collect();
    let confidence = percentages[best];
    Ok((best, confidence, percentages))
}

fn label_at(labels: &[String], idx: usize, head: &str) -> Result<String, ModelError> {
    labels.get(idx).cloned().ok_or_else(|| {
        ModelError::Inference(format!(
            "{head} head produced index {idx} outside the {}-class taxonomy",
            labels.len()
        ))
    })
}

fn distribution(labels: &[String], percentages: &[f32]) -> BTreeMap<String, f32> {
    labels
        .iter()
        .cloned()
        .zip(percentages.iter().copied())
        .collect()
}
