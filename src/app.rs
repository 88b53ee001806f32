use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::client::RegistryClient;
use crate::domain::{Category, Reference, ReferenceId, RegisteredItem, SavedProject};
use crate::error::IngestError;
use crate::project::ProjectRequest;
use crate::registration::{FileRegistration, RegistrationRequest};
use crate::scan::{IndexMode, scan_directory};

/// What happens to already registered files when a batch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RollbackPolicy {
    /// Registered files stay on the server.
    #[default]
    Keep,
    /// Delete registered files in reverse order. Failures are logged, and
    /// the original error is still returned.
    BestEffort,
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub index_mode: IndexMode,
    pub rollback: RollbackPolicy,
    pub pretty_name: Option<String>,
    pub parent_id: Option<u64>,
}

/// Lifecycle of one directory load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    ReferenceLoading,
    ReferenceLoaded,
    Scanning,
    Registering { current: usize, total: usize },
    Aggregated,
    ProjectSaving,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    pub fn can_advance_to(&self, next: &RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Done | Failed, _) => false,
            (_, Failed) => true,
            (Idle, ReferenceLoading) => true,
            (ReferenceLoading, ReferenceLoaded) => true,
            (ReferenceLoaded, Scanning) => true,
            (Scanning, Registering { current: 1, total }) => *total > 0,
            (Scanning, Aggregated) => true,
            (
                Registering { current, total },
                Registering {
                    current: next_current,
                    total: next_total,
                },
            ) => next_total == total && *next_current == current + 1 && next_current <= total,
            (Registering { current, total }, Aggregated) => current == total,
            (Aggregated, ProjectSaving) => true,
            (ProjectSaving, Done) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredFile {
    pub category: Category,
    pub path: String,
    pub index_path: Option<String>,
    pub item: RegisteredItem,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestResult {
    pub reference: Reference,
    pub items: Vec<RegisteredFile>,
    pub project: SavedProject,
    pub state: RunState,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedRegistration {
    pub category: Category,
    pub request: RegistrationRequest,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanResult {
    pub reference: Reference,
    pub registrations: Vec<PlannedRegistration>,
    pub skipped_indices: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResult {
    pub category: Category,
    pub id: u64,
    pub deleted: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

struct RunTracker<'a> {
    state: RunState,
    sink: &'a dyn ProgressSink,
}

impl<'a> RunTracker<'a> {
    fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            state: RunState::Idle,
            sink,
        }
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_advance_to(&next),
            "invalid transition {:?} -> {next:?}",
            self.state
        );
        tracing::debug!("state {:?} -> {next:?}", self.state);
        self.state = next;
    }

    fn emit(&self, message: impl Into<String>) {
        self.sink.event(ProgressEvent {
            message: message.into(),
            elapsed: None,
        });
    }
}

pub struct App<C: RegistryClient> {
    client: C,
}

impl<C: RegistryClient> App<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Registers every data file in `dir` against the reference, then saves
    /// them as one project.
    ///
    /// Fails fast: the first error stops the batch, and no project is saved.
    /// Files registered before the failure stay registered unless
    /// [`RollbackPolicy::BestEffort`] removes them; any that remain are listed
    /// in [`IngestError::BatchAborted`].
    pub fn load_directory(
        &self,
        reference_id: ReferenceId,
        dir: &Path,
        project_name: &str,
        options: &LoadOptions,
        sink: &dyn ProgressSink,
    ) -> Result<IngestResult, IngestError> {
        let mut run = RunTracker::new(sink);
        let mut registered = Vec::new();
        let result = self.run_batch(
            &mut run,
            &mut registered,
            reference_id,
            dir,
            project_name,
            options,
        );
        result.map_err(|err| {
            run.advance(RunState::Failed);
            run.emit(format!("phase=Failed; {err}"));
            let remaining = self.report_partial(&registered, options.rollback, &run);
            if remaining.is_empty() {
                err
            } else {
                IngestError::BatchAborted {
                    registered: remaining,
                    source: Box::new(err),
                }
            }
        })
    }

    fn run_batch(
        &self,
        run: &mut RunTracker<'_>,
        registered: &mut Vec<RegisteredFile>,
        reference_id: ReferenceId,
        dir: &Path,
        project_name: &str,
        options: &LoadOptions,
    ) -> Result<IngestResult, IngestError> {
        run.advance(RunState::ReferenceLoading);
        run.emit(format!("phase=Reference; loading reference {reference_id}"));
        let reference = self.client.load_reference(reference_id)?;
        run.advance(RunState::ReferenceLoaded);
        run.emit(format!(
            "phase=Reference; loaded {} (bioDataItemId={})",
            reference.name.as_deref().unwrap_or("reference"),
            reference.bio_data_item_id
        ));

        run.advance(RunState::Scanning);
        run.emit(format!("phase=Scan; scanning {}", dir.display()));
        let working_set = scan_directory(dir)?;
        let plan = working_set.plan(options.index_mode)?;
        run.emit(format!(
            "phase=Scan; {} file(s), {} to register",
            working_set.len(),
            plan.len()
        ));

        let parent_id = reference.registration_id(reference_id);
        let total = plan.len();
        for (position, resolved) in plan.iter().enumerate() {
            run.advance(RunState::Registering {
                current: position + 1,
                total,
            });
            if resolved.index.is_none() && resolved.file.extension.index_extension().is_some() {
                run.emit(format!("phase=Register; no index for {}", resolved.file.path));
            }
            let request = RegistrationRequest::for_batch(resolved, parent_id);
            let start = std::time::Instant::now();
            let item = self.client.register(resolved.file.category, &request)?;
            tracing::info!(
                "registered {} {} as {} (bioDataItemId={})",
                resolved.file.category,
                resolved.file.path,
                item.name,
                item.bio_data_item_id
            );
            run.sink.event(ProgressEvent {
                message: format!(
                    "phase=Register; [{}/{total}] registered {} {} as {}",
                    position + 1,
                    resolved.file.category,
                    resolved.file.path,
                    item.name
                ),
                elapsed: Some(start.elapsed()),
            });
            registered.push(RegisteredFile {
                category: resolved.file.category,
                path: request.path,
                index_path: request.index_path,
                item,
            });
        }
        run.advance(RunState::Aggregated);

        let request = ProjectRequest::assemble(
            project_name,
            &reference,
            registered.iter().map(|file| &file.item),
        )
        .with_pretty_name(options.pretty_name.clone())
        .with_parent(options.parent_id);
        run.advance(RunState::ProjectSaving);
        run.emit(format!(
            "phase=Project; saving {project_name} with {} item(s)",
            request.items.len()
        ));
        let project = self.client.save_project(&request)?;
        tracing::info!("saved project {} (id={})", project.name, project.id);
        run.advance(RunState::Done);
        run.emit(format!("phase=Done; project {} id={}", project.name, project.id));

        Ok(IngestResult {
            reference,
            items: std::mem::take(registered),
            project,
            state: run.state,
            completed_at: Utc::now(),
        })
    }

    /// Logs what a failed batch left behind and applies the rollback policy.
    /// Returns the bioDataItemIds still registered on the server.
    fn report_partial(
        &self,
        registered: &[RegisteredFile],
        policy: RollbackPolicy,
        run: &RunTracker<'_>,
    ) -> Vec<u64> {
        if registered.is_empty() {
            return Vec::new();
        }
        let ids = registered
            .iter()
            .map(|file| file.item.bio_data_item_id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        tracing::warn!(
            "batch aborted after {} registration(s); bioDataItemIds {ids} remain registered",
            registered.len()
        );
        run.emit(format!("phase=Failed; still registered: {ids}"));

        if policy != RollbackPolicy::BestEffort {
            return registered
                .iter()
                .map(|file| file.item.bio_data_item_id)
                .collect();
        }
        let mut remaining = Vec::new();
        for file in registered.iter().rev() {
            let Some(id) = file.item.id else {
                tracing::warn!("cannot roll back {}: server returned no file id", file.path);
                remaining.push(file.item.bio_data_item_id);
                continue;
            };
            match self.client.delete(file.category, id) {
                Ok(()) => {
                    run.emit(format!("phase=Rollback; deleted {} {}", file.category, file.path));
                }
                Err(err) => {
                    tracing::warn!("rollback of {} failed: {err}", file.path);
                    remaining.push(file.item.bio_data_item_id);
                }
            }
        }
        remaining.reverse();
        remaining
    }

    /// Loads the reference and resolves the directory without registering
    /// anything.
    pub fn plan_directory(
        &self,
        reference_id: ReferenceId,
        dir: &Path,
        index_mode: IndexMode,
        sink: &dyn ProgressSink,
    ) -> Result<PlanResult, IngestError> {
        let run = RunTracker::new(sink);
        run.emit(format!("phase=Reference; loading reference {reference_id}"));
        let reference = self.client.load_reference(reference_id)?;
        run.emit(format!("phase=Scan; scanning {}", dir.display()));
        let working_set = scan_directory(dir)?;
        let plan = working_set.plan(index_mode)?;

        let attached = plan
            .iter()
            .filter_map(|resolved| resolved.index.as_ref())
            .collect::<Vec<_>>();
        let skipped_indices = working_set
            .files()
            .iter()
            .filter(|file| file.category.is_index() && !attached.contains(&&file.path))
            .map(|file| file.path.to_string())
            .collect();

        let parent_id = reference.registration_id(reference_id);
        let registrations = plan
            .iter()
            .map(|resolved| PlannedRegistration {
                category: resolved.file.category,
                request: RegistrationRequest::for_batch(resolved, parent_id),
            })
            .collect();
        Ok(PlanResult {
            reference,
            registrations,
            skipped_indices,
        })
    }

    /// Registers one file, validating it locally before any remote call.
    pub fn register_file(
        &self,
        reference_id: ReferenceId,
        registration: &FileRegistration,
        sink: &dyn ProgressSink,
    ) -> Result<RegisteredFile, IngestError> {
        let run = RunTracker::new(sink);
        let prepared = registration.validate()?;
        let category = prepared.category;

        run.emit(format!("phase=Reference; loading reference {reference_id}"));
        let reference = self.client.load_reference(reference_id)?;
        let request = prepared.into_request(reference.registration_id(reference_id));

        run.emit(format!("phase=Register; registering {category} {}", request.path));
        let item = self.client.register(category, &request)?;
        tracing::info!(
            "registered {category} {} as {} (bioDataItemId={})",
            request.path,
            item.name,
            item.bio_data_item_id
        );
        Ok(RegisteredFile {
            category,
            path: request.path,
            index_path: request.index_path,
            item,
        })
    }

    pub fn delete(
        &self,
        category: Category,
        id: u64,
        sink: &dyn ProgressSink,
    ) -> Result<DeleteResult, IngestError> {
        category.id_field()?;
        sink.event(ProgressEvent {
            message: format!("phase=Delete; deleting {category} {id}"),
            elapsed: None,
        });
        self.client.delete(category, id)?;
        tracing::info!("deleted {category} {id}");
        Ok(DeleteResult {
            category,
            id,
            deleted: true,
        })
    }
}
