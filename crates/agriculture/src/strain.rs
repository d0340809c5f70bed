use serde::{Deserialize, Serialize};

/// One entry in a strain's cultivation task template. Offsets are relative
/// to the batch start date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CultivationTaskSpec {
    pub subject: String,
    pub start_offset_days: i64,
    pub duration_days: i64,
}

/// Strain reference data captured at batch creation time.
///
/// Batches snapshot the strain rather than linking to it, so a later edit
/// to the strain never rewrites history on replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrainSnapshot {
    pub name: String,
    /// Cultivation period in days, start to harvest.
    pub period_days: i64,
    pub plant_spacing_uom: Option<String>,
    pub cultivation_tasks: Vec<CultivationTaskSpec>,
}

impl StrainSnapshot {
    pub fn has_task_template(&self) -> bool {
        !self.cultivation_tasks.is_empty()
    }
}
