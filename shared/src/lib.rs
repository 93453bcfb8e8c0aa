use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PredictionResponse {
    pub success: bool,
    pub disease: String,
    pub stage: String,
    pub disease_confidence: f32,
    pub stage_confidence: f32,
    pub combined_confidence: f32,
    pub all_disease_probabilities: BTreeMap<String, f32>,
    pub all_stage_probabilities: BTreeMap<String, f32>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}
