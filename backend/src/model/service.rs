use std::sync::Mutex;

use log::info;

use crate::model::backbone::BackboneRegistry;
use crate::model::error::ModelError;
use crate::model::loader::load_model;
use crate::model::locator::{locate_weights_file, LocatorConfig};
use crate::model::predict::{predict, Classifier, Prediction};

/// Owns the one model handle for the whole process. The mutex serializes
/// both installation (so concurrent first-requests trigger exactly one load
/// attempt) and forward passes (tch modules are Send but not Sync).
pub struct ModelService {
    slot: Mutex<Option<Box<dyn Classifier>>>,
    locator: LocatorConfig,
    registry: BackboneRegistry,
}

impl ModelService {
    pub fn new(locator: LocatorConfig, registry: BackboneRegistry) -> Self {
        Self {
            slot: Mutex::new(None),
            locator,
            registry,
        }
    }

    pub fn from_env() -> Self {
        Self::new(LocatorConfig::from_env(), BackboneRegistry::from_env())
    }

    /// Install an already-built classifier, bypassing the filesystem loader.
    pub fn preloaded(classifier: Box<dyn Classifier>) -> Self {
        let service = Self::from_env();
        *service.slot.lock().unwrap() = Some(classifier);
        service
    }

    pub fn ensure_loaded(&self) -> Result<(), ModelError> {
        let mut slot = self.slot.lock().unwrap();
        self.load_into(&mut slot)
    }

    pub fn predict(&self, bytes: &[u8]) -> Result<Prediction, ModelError> {
        let mut slot = self.slot.lock().unwrap();
        self.load_into(&mut slot)?;
        let model = slot.as_deref().ok_or_else(|| {
            ModelError::Load("model slot empty after successful load".into())
        })?;
        predict(model, bytes)
    }

    fn load_into(&self, slot: &mut Option<Box<dyn Classifier>>) -> Result<(), ModelError> {
        if slot.is_some() {
            return Ok(());
        }
        let path = locate_weights_file(&self.locator)?;
        let model = load_model(&path, &self.registry)?;
        info!("Model installed from {}", path.display());
        *slot = Some(Box::new(model));
        Ok(())
    }
}
