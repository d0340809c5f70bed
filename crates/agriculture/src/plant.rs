//! Documents drafted from a plant batch. Each generator copies the fields
//! a new record inherits from its source batch; the caller persists the
//! draft as its own aggregate.

use serde::{Deserialize, Serialize};

use crate::batch::{PlantBatch, PlantBatchId};

/// A plant drafted from a batch. Carries the batch link plus the strain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlantDraft {
    pub plant_batch: PlantBatchId,
    pub strain: String,
}

/// An additive application log drafted from a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditiveLogDraft {
    pub plant_batch: PlantBatchId,
    pub batch_title: String,
}

/// A disease diagnosis drafted from a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiseaseDiagnosisDraft {
    pub plant_batch: PlantBatchId,
    pub batch_title: String,
}

pub fn make_plant(batch: &PlantBatch) -> PlantDraft {
    PlantDraft {
        plant_batch: batch.id_typed(),
        strain: batch
            .strain()
            .map(|s| s.name.clone())
            .unwrap_or_default(),
    }
}

pub fn make_additive_log(batch: &PlantBatch) -> AdditiveLogDraft {
    AdditiveLogDraft {
        plant_batch: batch.id_typed(),
        batch_title: batch.title().to_string(),
    }
}

pub fn make_disease_diagnosis(batch: &PlantBatch) -> DiseaseDiagnosisDraft {
    DiseaseDiagnosisDraft {
        plant_batch: batch.id_typed(),
        batch_title: batch.title().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{CreatePlantBatch, PlantBatchCommand};
    use crate::strain::StrainSnapshot;
    use agroflow_core::{Aggregate, AggregateId, TenantId};
    use chrono::{NaiveDate, Utc};

    fn batch() -> PlantBatch {
        let batch_id = PlantBatchId::new(AggregateId::new());
        let mut batch = PlantBatch::empty(batch_id);
        let events = batch
            .handle(&PlantBatchCommand::CreatePlantBatch(CreatePlantBatch {
                tenant_id: TenantId::new(),
                batch_id,
                title: "East rows".to_string(),
                strain: StrainSnapshot {
                    name: "Evans".to_string(),
                    period_days: 60,
                    plant_spacing_uom: None,
                    cultivation_tasks: vec![],
                },
                start_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
                plant_spacing_uom: None,
                location: None,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        batch.apply(&events[0]);
        batch
    }

    #[test]
    fn plant_draft_links_back_to_the_batch() {
        let batch = batch();
        let draft = make_plant(&batch);
        assert_eq!(draft.plant_batch, batch.id_typed());
        assert_eq!(draft.strain, "Evans");
    }

    #[test]
    fn log_and_diagnosis_drafts_carry_the_batch_title() {
        let batch = batch();
        assert_eq!(make_additive_log(&batch).batch_title, "East rows");
        assert_eq!(make_disease_diagnosis(&batch).batch_title, "East rows");
    }
}
