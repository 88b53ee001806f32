use std::path::{Path, PathBuf};
use std::sync::Mutex;

use assert_matches::assert_matches;

use biodata_ingest::app::{
    App, LoadOptions, ProgressEvent, ProgressSink, RollbackPolicy, RunState,
};
use biodata_ingest::client::{RegistryClient, decode_payload};
use biodata_ingest::domain::{Category, Reference, ReferenceId, RegisteredItem, SavedProject};
use biodata_ingest::error::{ErrorKind, IngestError, Stage};
use biodata_ingest::output::JsonOutput;
use biodata_ingest::project::ProjectRequest;
use biodata_ingest::registration::{FileRegistration, RegistrationRequest};
use biodata_ingest::scan::IndexMode;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    LoadReference(u64),
    Register(Category, RegistrationRequest),
    SaveProject(Vec<u64>),
    Delete(Category, u64),
}

#[derive(Default)]
struct MockRegistry {
    calls: Mutex<Vec<Call>>,
    reference_without_payload: bool,
    fail_on_registration: Option<usize>,
    fail_deletes: bool,
}

impl MockRegistry {
    fn failing_at(registration: usize) -> Self {
        Self {
            fail_on_registration: Some(registration),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn registrations(&self) -> Vec<(Category, RegistrationRequest)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Register(category, request) => Some((category, request)),
                _ => None,
            })
            .collect()
    }
}

impl RegistryClient for MockRegistry {
    fn load_reference(&self, id: ReferenceId) -> Result<Reference, IngestError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::LoadReference(id.value()));
        if self.reference_without_payload {
            return decode_payload(Stage::ReferenceLookup, 200, r#"{"status":"OK"}"#);
        }
        Ok(Reference {
            bio_data_item_id: 1,
            id: Some(50),
            name: Some("hg38".to_string()),
        })
    }

    fn register(
        &self,
        category: Category,
        request: &RegistrationRequest,
    ) -> Result<RegisteredItem, IngestError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(Call::Register(category, request.clone()));
        let count = calls
            .iter()
            .filter(|call| matches!(call, Call::Register(..)))
            .count();
        if self.fail_on_registration == Some(count) {
            return Err(IngestError::RemoteRejected {
                stage: Stage::Registration,
                message: "File already registered".to_string(),
            });
        }
        let name = Path::new(&request.path)
            .file_name()
            .unwrap()
            .to_string_lossy()
            .to_string();
        Ok(RegisteredItem {
            id: Some(count as u64),
            bio_data_item_id: 100 + count as u64,
            name,
        })
    }

    fn save_project(&self, request: &ProjectRequest) -> Result<SavedProject, IngestError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::SaveProject(request.item_ids()));
        Ok(SavedProject {
            id: 7,
            name: request.name.clone(),
        })
    }

    fn delete(&self, category: Category, id: u64) -> Result<(), IngestError> {
        self.calls.lock().unwrap().push(Call::Delete(category, id));
        if self.fail_deletes {
            return Err(IngestError::HttpStatus {
                stage: Stage::Delete,
                status: 403,
                message: "forbidden".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

fn batch_dir(files: &[&str]) -> (tempfile::TempDir, PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    for file in files {
        std::fs::write(temp.path().join(file), b"data").unwrap();
    }
    let root = std::fs::canonicalize(temp.path()).unwrap();
    (temp, root)
}

fn reference() -> ReferenceId {
    "1".parse().unwrap()
}

fn path_string(root: &Path, name: &str) -> String {
    root.join(name).to_string_lossy().to_string()
}

#[test]
fn registers_batch_and_saves_project_in_order() {
    let (temp, root) = batch_dir(&["sample.vcf.gz", "sample.vcf.gz.tbi", "panel.bed"]);
    let app = App::new(MockRegistry::default());
    let sink = RecordingSink::default();

    let result = app
        .load_directory(reference(), temp.path(), "study", &LoadOptions::default(), &sink)
        .unwrap();

    let mut vcf = RegistrationRequest::new(path_string(&root, "sample.vcf.gz"), 50);
    vcf.index_path = Some(path_string(&root, "sample.vcf.gz.tbi"));
    let bed = RegistrationRequest::new(path_string(&root, "panel.bed"), 50);
    assert_eq!(
        app.client().calls(),
        vec![
            Call::LoadReference(1),
            Call::Register(Category::Vcf, vcf),
            Call::Register(Category::Bed, bed),
            Call::SaveProject(vec![1, 101, 102]),
        ]
    );

    assert_eq!(result.state, RunState::Done);
    assert_eq!(result.project.name, "study");
    assert_eq!(result.items.len(), 2);
    assert_eq!(result.items[0].item.name, "sample.vcf.gz");

    let messages = sink.messages.lock().unwrap();
    assert!(
        messages
            .iter()
            .any(|m| m.contains("no index for") && m.contains("panel.bed"))
    );
}

#[test]
fn unsupported_extension_aborts_before_registration() {
    let (temp, _root) = batch_dir(&["sample.vcf", "weird.xyz"]);
    let app = App::new(MockRegistry::default());

    let err = app
        .load_directory(
            reference(),
            temp.path(),
            "study",
            &LoadOptions::default(),
            &RecordingSink::default(),
        )
        .unwrap_err();

    assert_matches!(
        err,
        IngestError::UnsupportedExtension { ref extension, .. } if extension == "xyz"
    );
    assert!(app.client().registrations().is_empty());
    assert!(!app
        .client()
        .calls()
        .iter()
        .any(|call| matches!(call, Call::SaveProject(_))));
}

#[test]
fn reference_without_payload_stops_the_run() {
    let (temp, _root) = batch_dir(&["sample.vcf"]);
    let app = App::new(MockRegistry {
        reference_without_payload: true,
        ..MockRegistry::default()
    });

    let err = app
        .load_directory(
            reference(),
            temp.path(),
            "study",
            &LoadOptions::default(),
            &RecordingSink::default(),
        )
        .unwrap_err();

    assert_matches!(
        err,
        IngestError::RemoteProtocol {
            stage: Stage::ReferenceLookup,
            ..
        }
    );
    assert_eq!(app.client().calls(), vec![Call::LoadReference(1)]);
}

#[test]
fn missing_directory_is_reported_after_reference_load() {
    let temp = tempfile::tempdir().unwrap();
    let app = App::new(MockRegistry::default());

    let err = app
        .load_directory(
            reference(),
            &temp.path().join("absent"),
            "study",
            &LoadOptions::default(),
            &RecordingSink::default(),
        )
        .unwrap_err();

    assert_matches!(err, IngestError::PathNotFound(_));
    assert_eq!(app.client().calls(), vec![Call::LoadReference(1)]);
}

#[test]
fn failed_registration_stops_later_calls_and_project() {
    let (temp, root) = batch_dir(&["a.vcf", "b.gff", "c.bed"]);
    let app = App::new(MockRegistry::failing_at(2));
    let sink = RecordingSink::default();

    let err = app
        .load_directory(reference(), temp.path(), "study", &LoadOptions::default(), &sink)
        .unwrap_err();

    assert_matches!(
        err,
        IngestError::BatchAborted { ref registered, .. } if *registered == vec![101]
    );
    assert_matches!(
        err.root_cause(),
        IngestError::RemoteRejected { stage: Stage::Registration, message }
            if message == "File already registered"
    );
    assert_eq!(err.kind(), ErrorKind::RemoteRejected);
    let registered_paths = app
        .client()
        .registrations()
        .into_iter()
        .map(|(_, request)| request.path)
        .collect::<Vec<_>>();
    assert_eq!(
        registered_paths,
        vec![path_string(&root, "a.vcf"), path_string(&root, "b.gff")]
    );
    let calls = app.client().calls();
    assert!(!calls.iter().any(|call| matches!(call, Call::SaveProject(_))));
    assert!(!calls.iter().any(|call| matches!(call, Call::Delete(..))));

    let messages = sink.messages.lock().unwrap();
    assert!(messages.iter().any(|m| m.contains("still registered: 101")));
}

#[test]
fn best_effort_rollback_deletes_in_reverse() {
    let (temp, _root) = batch_dir(&["a.vcf", "b.gff", "c.bed"]);
    let app = App::new(MockRegistry::failing_at(3));
    let options = LoadOptions {
        rollback: RollbackPolicy::BestEffort,
        ..LoadOptions::default()
    };

    let err = app
        .load_directory(reference(), temp.path(), "study", &options, &RecordingSink::default())
        .unwrap_err();

    assert_matches!(err, IngestError::RemoteRejected { .. });
    let deletes = app
        .client()
        .calls()
        .into_iter()
        .filter(|call| matches!(call, Call::Delete(..)))
        .collect::<Vec<_>>();
    assert_eq!(
        deletes,
        vec![Call::Delete(Category::Gene, 2), Call::Delete(Category::Vcf, 1)]
    );
}

#[test]
fn json_mode_error_lists_items_left_registered() {
    let (temp, _root) = batch_dir(&["a.vcf", "b.gff", "c.bed"]);
    let app = App::new(MockRegistry::failing_at(3));

    let err = app
        .load_directory(reference(), temp.path(), "study", &LoadOptions::default(), &JsonOutput)
        .unwrap_err();

    assert!(err.to_string().contains("101,102"), "{err}");
    let cause = std::error::Error::source(&err).unwrap().to_string();
    assert!(cause.contains("File already registered"), "{cause}");
}

#[test]
fn failed_rollback_keeps_items_in_error() {
    let (temp, _root) = batch_dir(&["a.vcf", "b.gff", "c.bed"]);
    let app = App::new(MockRegistry {
        fail_on_registration: Some(3),
        fail_deletes: true,
        ..MockRegistry::default()
    });
    let options = LoadOptions {
        rollback: RollbackPolicy::BestEffort,
        ..LoadOptions::default()
    };

    let err = app
        .load_directory(reference(), temp.path(), "study", &options, &JsonOutput)
        .unwrap_err();

    assert_matches!(
        err,
        IngestError::BatchAborted { ref registered, .. } if *registered == vec![101, 102]
    );
    assert_matches!(err.root_cause(), IngestError::RemoteRejected { .. });
}

#[test]
fn index_files_are_never_registered_alone() {
    let (temp, _root) = batch_dir(&["orphan.tbi", "reads.bam", "reads.bam.bai"]);
    let app = App::new(MockRegistry::default());

    let result = app
        .load_directory(
            reference(),
            temp.path(),
            "study",
            &LoadOptions::default(),
            &RecordingSink::default(),
        )
        .unwrap();

    let registrations = app.client().registrations();
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0].0, Category::Bam);
    assert!(
        registrations[0]
            .1
            .index_path
            .as_deref()
            .unwrap()
            .ends_with("reads.bam.bai")
    );
    assert_eq!(result.items.len(), 1);
}

#[test]
fn strict_mode_requires_bam_index() {
    let (temp, _root) = batch_dir(&["reads.bam", "sample.vcf"]);
    let app = App::new(MockRegistry::default());
    let options = LoadOptions {
        index_mode: IndexMode::Strict,
        ..LoadOptions::default()
    };

    let err = app
        .load_directory(reference(), temp.path(), "study", &options, &RecordingSink::default())
        .unwrap_err();

    assert_matches!(err, IngestError::IndexRequired { ref category, .. } if category == "bam");
    assert!(app.client().registrations().is_empty());
}

#[test]
fn lenient_mode_registers_bam_without_index() {
    let (temp, _root) = batch_dir(&["reads.bam"]);
    let app = App::new(MockRegistry::default());

    app.load_directory(
        reference(),
        temp.path(),
        "study",
        &LoadOptions::default(),
        &RecordingSink::default(),
    )
    .unwrap();

    let registrations = app.client().registrations();
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0].1.index_path, None);
}

#[test]
fn empty_directory_still_saves_reference_project() {
    let (temp, _root) = batch_dir(&[]);
    let app = App::new(MockRegistry::default());

    let result = app
        .load_directory(
            reference(),
            temp.path(),
            "empty",
            &LoadOptions::default(),
            &RecordingSink::default(),
        )
        .unwrap();

    assert!(result.items.is_empty());
    assert_eq!(
        app.client().calls(),
        vec![Call::LoadReference(1), Call::SaveProject(vec![1])]
    );
}

#[test]
fn dry_run_plans_without_registering() {
    let (temp, root) = batch_dir(&["sample.vcf", "sample.vcf.idx", "orphan.tbi"]);
    let app = App::new(MockRegistry::default());

    let plan = app
        .plan_directory(reference(), temp.path(), IndexMode::Lenient, &RecordingSink::default())
        .unwrap();

    assert_eq!(plan.registrations.len(), 1);
    assert_eq!(
        plan.registrations[0].request.index_path,
        Some(path_string(&root, "sample.vcf.idx"))
    );
    assert_eq!(plan.skipped_indices, vec![path_string(&root, "orphan.tbi")]);
    assert_eq!(app.client().calls(), vec![Call::LoadReference(1)]);
}

#[test]
fn single_file_registration_sends_absolute_path() {
    let (temp, _root) = batch_dir(&["sample.vcf"]);
    let app = App::new(MockRegistry::default());
    let registration = FileRegistration {
        path: temp.path().join("sample.vcf").to_string_lossy().to_string(),
        name: Some("calls".to_string()),
        do_index: Some(false),
        ..FileRegistration::default()
    };

    let file = app
        .register_file(reference(), &registration, &RecordingSink::default())
        .unwrap();

    assert_eq!(file.category, Category::Vcf);
    let registrations = app.client().registrations();
    let request = &registrations[0].1;
    assert!(Path::new(&request.path).is_absolute());
    assert!(request.path.ends_with("sample.vcf"));
    assert_eq!(request.reference_id, 50);
    assert_eq!(request.name.as_deref(), Some("calls"));
    assert_eq!(request.do_index, Some(false));
}

#[test]
fn single_bam_without_index_fails_before_any_call() {
    let (temp, _root) = batch_dir(&["reads.bam"]);
    let app = App::new(MockRegistry::default());
    let registration = FileRegistration::new(temp.path().join("reads.bam").to_string_lossy());

    let err = app
        .register_file(reference(), &registration, &RecordingSink::default())
        .unwrap_err();

    assert_matches!(err, IngestError::IndexRequired { .. });
    assert!(app.client().calls().is_empty());
}

#[test]
fn delete_rejects_category_without_id_field() {
    let app = App::new(MockRegistry::default());

    let err = app
        .delete(Category::Maf, 3, &RecordingSink::default())
        .unwrap_err();
    assert_matches!(err, IngestError::UnsupportedCategory(_));
    assert!(app.client().calls().is_empty());

    let result = app
        .delete(Category::Vcf, 3, &RecordingSink::default())
        .unwrap();
    assert!(result.deleted);
    assert_eq!(app.client().calls(), vec![Call::Delete(Category::Vcf, 3)]);
}
