//! Plant batch tracking: batches, cultivation scheduling, field geometry
//! and the documents drafted from a batch.

pub mod batch;
pub mod geo;
pub mod plant;
pub mod strain;

pub use batch::{
    BatchPlanted, BatchRescheduled, CreatePlantBatch, CultivationScheduled, CultivationTask,
    PlantBatch, PlantBatchCommand, PlantBatchEvent, PlantBatchId, ProjectSchedule, ReschedulePlantBatch,
    ScheduleCultivation,
};
pub use geo::{get_coordinates, get_geometry_type, is_in_location};
pub use plant::{make_additive_log, make_disease_diagnosis, make_plant, AdditiveLogDraft, DiseaseDiagnosisDraft, PlantDraft};
pub use strain::{CultivationTaskSpec, StrainSnapshot};
