use serde::{Serialize, Deserialize};

use crate::ExperimentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStage {
    Active,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub experiment_id: ExperimentId,
    pub name: String,
    #[serde(default)]
    pub artifact_location: String,
    pub lifecycle_stage: LifecycleStage,
    #[serde(default)]
    pub last_update_time: Option<i64>,
    #[serde(default)]
    pub creation_time: Option<i64>,
    #[serde(default)]
    pub tags: Option<Vec<ExperimentTag>>,
}

impl Experiment {
    pub fn is_deleted(&self) -> bool {
        self.lifecycle_stage == LifecycleStage::Deleted
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentTag {
    pub key: String,
    pub value: String,
}
