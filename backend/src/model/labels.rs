use lazy_static::lazy_static;

// Must match the taxonomy the checkpoint was trained against.
pub const DISEASE_CLASSES: [&str; 5] = [
    "allergic_dermatitis",
    "bacterial_dermatosis",
    "fungal_infections",
    "healthy",
    "ringworm",
];

pub const STAGE_CLASSES: [&str; 3] = ["mild", "severe", "none"];

pub const HEALTHY_CLASS: &str = "healthy";

/// Index-ordered label sets for the three classification heads.
pub struct LabelMappings {
    pub diseases: Vec<String>,
    pub stages: Vec<String>,
    pub combined: Vec<String>,
}

impl LabelMappings {
    fn new() -> Self {
        let diseases: Vec<String> = DISEASE_CLASSES.iter().map(|s| s.to_string()).collect();
        let stages: Vec<String> = STAGE_CLASSES.iter().map(|s| s.to_string()).collect();
        let combined = derive_combined_classes(&diseases);
        Self {
            diseases,
            stages,
            combined,
        }
    }
}

/// Joint (disease, stage) label list: healthy pairs only with "none", every
/// other disease with "mild" and "severe". Yields 2*(n-1)+1 classes for a
/// taxonomy with one healthy entry.
pub fn derive_combined_classes(diseases: &[String]) -> Vec<String> {
    let mut combined = Vec::new();
    for disease in diseases {
        if disease == HEALTHY_CLASS {
            combined.push(format!("{disease}_none"));
        } else {
            combined.push(format!("{disease}_mild"));
            combined.push(format!("{disease}_severe"));
        }
    }
    combined
}

lazy_static! {
    pub static ref LABELS: LabelMappings = LabelMappings::new();
}
