use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use agroflow_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use agroflow_events::Event;

use crate::strain::StrainSnapshot;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlantBatchId(pub AggregateId);

impl PlantBatchId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PlantBatchId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// One scheduled cultivation task, dated from the batch start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CultivationTask {
    pub subject: String,
    pub expected_start: NaiveDate,
    pub expected_end: NaiveDate,
}

/// The cultivation project opened for a batch: its window plus the tasks
/// instantiated from the strain's template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSchedule {
    pub project_id: AggregateId,
    pub title: String,
    pub expected_start: NaiveDate,
    pub expected_end: NaiveDate,
    pub tasks: Vec<CultivationTask>,
}

/// Aggregate root: PlantBatch.
#[derive(Debug, Clone, PartialEq)]
pub struct PlantBatch {
    id: PlantBatchId,
    tenant_id: Option<TenantId>,
    title: String,
    strain: Option<StrainSnapshot>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    plant_spacing_uom: Option<String>,
    location: Option<JsonValue>,
    project: Option<ProjectSchedule>,
    version: u64,
    created: bool,
}

impl PlantBatch {
    pub fn empty(id: PlantBatchId) -> Self {
        Self {
            id,
            tenant_id: None,
            title: String::new(),
            strain: None,
            start_date: None,
            end_date: None,
            plant_spacing_uom: None,
            location: None,
            project: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PlantBatchId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn strain(&self) -> Option<&StrainSnapshot> {
        self.strain.as_ref()
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.start_date
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.end_date
    }

    pub fn plant_spacing_uom(&self) -> Option<&str> {
        self.plant_spacing_uom.as_deref()
    }

    pub fn location(&self) -> Option<&JsonValue> {
        self.location.as_ref()
    }

    pub fn project(&self) -> Option<&ProjectSchedule> {
        self.project.as_ref()
    }
}

impl AggregateRoot for PlantBatch {
    type Id = PlantBatchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePlantBatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePlantBatch {
    pub tenant_id: TenantId,
    pub batch_id: PlantBatchId,
    pub title: String,
    pub strain: StrainSnapshot,
    pub start_date: NaiveDate,
    pub plant_spacing_uom: Option<String>,
    /// GeoJSON feature collection for the field, when mapped.
    pub location: Option<JsonValue>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ScheduleCultivation (runs once, right after creation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleCultivation {
    pub tenant_id: TenantId,
    pub batch_id: PlantBatchId,
    pub project_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReschedulePlantBatch (move the start date).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReschedulePlantBatch {
    pub tenant_id: TenantId,
    pub batch_id: PlantBatchId,
    pub start_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlantBatchCommand {
    CreatePlantBatch(CreatePlantBatch),
    ScheduleCultivation(ScheduleCultivation),
    ReschedulePlantBatch(ReschedulePlantBatch),
}

/// Event: BatchPlanted. `end_date` is derived from the strain period and
/// carried so replay never recomputes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPlanted {
    pub tenant_id: TenantId,
    pub batch_id: PlantBatchId,
    pub title: String,
    pub strain: StrainSnapshot,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub plant_spacing_uom: Option<String>,
    pub location: Option<JsonValue>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CultivationScheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CultivationScheduled {
    pub tenant_id: TenantId,
    pub batch_id: PlantBatchId,
    pub project: ProjectSchedule,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchRescheduled. Carries the recomputed window and, when a
/// project exists, its re-dated schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRescheduled {
    pub tenant_id: TenantId,
    pub batch_id: PlantBatchId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub project: Option<ProjectSchedule>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlantBatchEvent {
    BatchPlanted(BatchPlanted),
    CultivationScheduled(CultivationScheduled),
    BatchRescheduled(BatchRescheduled),
}

impl Event for PlantBatchEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PlantBatchEvent::BatchPlanted(_) => "agriculture.plant_batch.planted",
            PlantBatchEvent::CultivationScheduled(_) => "agriculture.plant_batch.cultivation_scheduled",
            PlantBatchEvent::BatchRescheduled(_) => "agriculture.plant_batch.rescheduled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PlantBatchEvent::BatchPlanted(e) => e.occurred_at,
            PlantBatchEvent::CultivationScheduled(e) => e.occurred_at,
            PlantBatchEvent::BatchRescheduled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PlantBatch {
    type Command = PlantBatchCommand;
    type Event = PlantBatchEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PlantBatchEvent::BatchPlanted(e) => {
                self.id = e.batch_id;
                self.tenant_id = Some(e.tenant_id);
                self.title = e.title.clone();
                self.strain = Some(e.strain.clone());
                self.start_date = Some(e.start_date);
                self.end_date = Some(e.end_date);
                self.plant_spacing_uom = e.plant_spacing_uom.clone();
                self.location = e.location.clone();
                self.created = true;
            }
            PlantBatchEvent::CultivationScheduled(e) => {
                self.project = Some(e.project.clone());
            }
            PlantBatchEvent::BatchRescheduled(e) => {
                self.start_date = Some(e.start_date);
                self.end_date = Some(e.end_date);
                if e.project.is_some() {
                    self.project = e.project.clone();
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PlantBatchCommand::CreatePlantBatch(cmd) => self.handle_create(cmd),
            PlantBatchCommand::ScheduleCultivation(cmd) => self.handle_schedule(cmd),
            PlantBatchCommand::ReschedulePlantBatch(cmd) => self.handle_reschedule(cmd),
        }
    }
}

impl PlantBatch {
    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreatePlantBatch) -> Result<Vec<PlantBatchEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("plant batch already exists"));
        }

        if cmd.title.trim().is_empty() {
            return Err(DomainError::validation("title is required"));
        }

        if cmd.strain.period_days <= 0 {
            return Err(DomainError::validation(
                "strain cultivation period must be positive",
            ));
        }

        let end_date = cmd.start_date + Duration::days(cmd.strain.period_days);

        let plant_spacing_uom = cmd
            .plant_spacing_uom
            .clone()
            .or_else(|| cmd.strain.plant_spacing_uom.clone());

        Ok(vec![PlantBatchEvent::BatchPlanted(BatchPlanted {
            tenant_id: cmd.tenant_id,
            batch_id: cmd.batch_id,
            title: cmd.title.clone(),
            strain: cmd.strain.clone(),
            start_date: cmd.start_date,
            end_date,
            plant_spacing_uom,
            location: cmd.location.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_schedule(
        &self,
        cmd: &ScheduleCultivation,
    ) -> Result<Vec<PlantBatchEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;

        if self.project.is_some() {
            return Err(DomainError::conflict("batch already has a project"));
        }

        let strain = self
            .strain
            .as_ref()
            .ok_or_else(|| DomainError::invariant("batch has no strain snapshot"))?;

        // Strains without a task template get no project.
        if !strain.has_task_template() {
            return Ok(vec![]);
        }

        let start = self
            .start_date
            .ok_or_else(|| DomainError::invariant("batch has no start date"))?;

        let project = build_schedule(strain, cmd.project_id, &self.title, start);

        Ok(vec![PlantBatchEvent::CultivationScheduled(
            CultivationScheduled {
                tenant_id: cmd.tenant_id,
                batch_id: cmd.batch_id,
                project,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_reschedule(
        &self,
        cmd: &ReschedulePlantBatch,
    ) -> Result<Vec<PlantBatchEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_tenant(cmd.tenant_id)?;

        let strain = self
            .strain
            .as_ref()
            .ok_or_else(|| DomainError::invariant("batch has no strain snapshot"))?;

        let end_date = cmd.start_date + Duration::days(strain.period_days);

        let project = self.project.as_ref().map(|existing| {
            build_schedule(strain, existing.project_id, &self.title, cmd.start_date)
        });

        Ok(vec![PlantBatchEvent::BatchRescheduled(BatchRescheduled {
            tenant_id: cmd.tenant_id,
            batch_id: cmd.batch_id,
            start_date: cmd.start_date,
            end_date,
            project,
            occurred_at: cmd.occurred_at,
        })])
    }
}

/// Instantiate a project schedule from the strain template: the project spans
/// the batch window and each task is offset from the batch start.
fn build_schedule(
    strain: &StrainSnapshot,
    project_id: AggregateId,
    title: &str,
    start: NaiveDate,
) -> ProjectSchedule {
    let tasks = strain
        .cultivation_tasks
        .iter()
        .map(|spec| {
            let expected_start = start + Duration::days(spec.start_offset_days);
            CultivationTask {
                subject: spec.subject.clone(),
                expected_start,
                expected_end: expected_start + Duration::days(spec.duration_days),
            }
        })
        .collect();

    ProjectSchedule {
        project_id,
        title: title.to_string(),
        expected_start: start,
        expected_end: start + Duration::days(strain.period_days),
        tasks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strain::CultivationTaskSpec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn strain() -> StrainSnapshot {
        StrainSnapshot {
            name: "Carmine Jewel".to_string(),
            period_days: 90,
            plant_spacing_uom: Some("Meter".to_string()),
            cultivation_tasks: vec![
                CultivationTaskSpec {
                    subject: "Germinate".to_string(),
                    start_offset_days: 0,
                    duration_days: 14,
                },
                CultivationTaskSpec {
                    subject: "Transplant".to_string(),
                    start_offset_days: 14,
                    duration_days: 7,
                },
            ],
        }
    }

    fn planted(tenant_id: TenantId, batch_id: PlantBatchId) -> PlantBatch {
        let mut batch = PlantBatch::empty(batch_id);
        let events = batch
            .handle(&PlantBatchCommand::CreatePlantBatch(CreatePlantBatch {
                tenant_id,
                batch_id,
                title: "North field cherries".to_string(),
                strain: strain(),
                start_date: date(2024, 3, 1),
                plant_spacing_uom: None,
                location: None,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        batch.apply(&events[0]);
        batch
    }

    #[test]
    fn end_date_is_start_plus_strain_period() {
        let batch = planted(TenantId::new(), PlantBatchId::new(AggregateId::new()));
        assert_eq!(batch.start_date(), Some(date(2024, 3, 1)));
        assert_eq!(batch.end_date(), Some(date(2024, 5, 30)));
    }

    #[test]
    fn spacing_uom_defaults_from_the_strain() {
        let batch = planted(TenantId::new(), PlantBatchId::new(AggregateId::new()));
        assert_eq!(batch.plant_spacing_uom(), Some("Meter"));
    }

    #[test]
    fn empty_title_is_rejected() {
        let batch_id = PlantBatchId::new(AggregateId::new());
        let err = PlantBatch::empty(batch_id)
            .handle(&PlantBatchCommand::CreatePlantBatch(CreatePlantBatch {
                tenant_id: TenantId::new(),
                batch_id,
                title: "  ".to_string(),
                strain: strain(),
                start_date: date(2024, 3, 1),
                plant_spacing_uom: None,
                location: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn scheduling_instantiates_tasks_offset_from_start() {
        let tenant_id = TenantId::new();
        let batch_id = PlantBatchId::new(AggregateId::new());
        let mut batch = planted(tenant_id, batch_id);

        let events = batch
            .handle(&PlantBatchCommand::ScheduleCultivation(ScheduleCultivation {
                tenant_id,
                batch_id,
                project_id: AggregateId::new(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        batch.apply(&events[0]);

        let project = batch.project().unwrap();
        assert_eq!(project.expected_start, date(2024, 3, 1));
        assert_eq!(project.expected_end, date(2024, 5, 30));
        assert_eq!(project.tasks.len(), 2);
        assert_eq!(project.tasks[1].subject, "Transplant");
        assert_eq!(project.tasks[1].expected_start, date(2024, 3, 15));
        assert_eq!(project.tasks[1].expected_end, date(2024, 3, 22));
    }

    #[test]
    fn strain_without_template_schedules_nothing() {
        let tenant_id = TenantId::new();
        let batch_id = PlantBatchId::new(AggregateId::new());
        let mut batch = PlantBatch::empty(batch_id);

        let mut bare = strain();
        bare.cultivation_tasks.clear();

        let events = batch
            .handle(&PlantBatchCommand::CreatePlantBatch(CreatePlantBatch {
                tenant_id,
                batch_id,
                title: "South field".to_string(),
                strain: bare,
                start_date: date(2024, 3, 1),
                plant_spacing_uom: None,
                location: None,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        batch.apply(&events[0]);

        let events = batch
            .handle(&PlantBatchCommand::ScheduleCultivation(ScheduleCultivation {
                tenant_id,
                batch_id,
                project_id: AggregateId::new(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        assert!(events.is_empty());
        assert!(batch.project().is_none());
    }

    #[test]
    fn scheduling_twice_is_rejected() {
        let tenant_id = TenantId::new();
        let batch_id = PlantBatchId::new(AggregateId::new());
        let mut batch = planted(tenant_id, batch_id);

        let cmd = PlantBatchCommand::ScheduleCultivation(ScheduleCultivation {
            tenant_id,
            batch_id,
            project_id: AggregateId::new(),
            occurred_at: Utc::now(),
        });
        let events = batch.handle(&cmd).unwrap();
        batch.apply(&events[0]);

        let err = batch.handle(&cmd).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn reschedule_moves_the_window_and_every_task() {
        let tenant_id = TenantId::new();
        let batch_id = PlantBatchId::new(AggregateId::new());
        let mut batch = planted(tenant_id, batch_id);

        let events = batch
            .handle(&PlantBatchCommand::ScheduleCultivation(ScheduleCultivation {
                tenant_id,
                batch_id,
                project_id: AggregateId::new(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        batch.apply(&events[0]);
        let project_id = batch.project().unwrap().project_id;

        let events = batch
            .handle(&PlantBatchCommand::ReschedulePlantBatch(ReschedulePlantBatch {
                tenant_id,
                batch_id,
                start_date: date(2024, 4, 1),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        batch.apply(&events[0]);

        assert_eq!(batch.start_date(), Some(date(2024, 4, 1)));
        assert_eq!(batch.end_date(), Some(date(2024, 6, 30)));

        let project = batch.project().unwrap();
        assert_eq!(project.project_id, project_id);
        assert_eq!(project.expected_start, date(2024, 4, 1));
        assert_eq!(project.tasks[1].expected_start, date(2024, 4, 15));
    }

    #[test]
    fn reschedule_without_a_project_only_moves_the_window() {
        let tenant_id = TenantId::new();
        let batch_id = PlantBatchId::new(AggregateId::new());
        let mut batch = planted(tenant_id, batch_id);

        let events = batch
            .handle(&PlantBatchCommand::ReschedulePlantBatch(ReschedulePlantBatch {
                tenant_id,
                batch_id,
                start_date: date(2024, 4, 1),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        batch.apply(&events[0]);

        assert_eq!(batch.end_date(), Some(date(2024, 6, 30)));
        assert!(batch.project().is_none());
    }
}
