use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Remote step an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ReferenceLookup,
    Registration,
    ProjectSave,
    Delete,
    Authentication,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::ReferenceLookup => write!(f, "reference lookup"),
            Stage::Registration => write!(f, "registration"),
            Stage::ProjectSave => write!(f, "project save"),
            Stage::Delete => write!(f, "delete"),
            Stage::Authentication => write!(f, "authentication"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    RemoteProtocol,
    RemoteRejected,
    Transport,
    Configuration,
}

#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error("path does not exist: {0}")]
    PathNotFound(PathBuf),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("unsupported file extension '{extension}': {path}")]
    #[diagnostic(help(
        "supported: vcf, gff, gtf, gff3, bam, cram, seg, bw, bigwig, bdg, bg, bedGraph, bed, maf, \
         vg and their indices"
    ))]
    UnsupportedExtension { path: String, extension: String },

    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("category {0} cannot be used for this operation")]
    UnsupportedCategory(String),

    #[error("index file is required for {category} file {path}")]
    IndexRequired { category: String, path: String },

    #[error("index {index} does not match the expected index format for {category}")]
    IndexFormatMismatch { index: String, category: String },

    #[error("invalid reference id: {0}")]
    InvalidReferenceId(String),

    #[error("invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("non-UTF-8 path: {0}")]
    NonUtf8Path(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(
        "no credentials configured; set auth in config or \
         BIODATA_INGEST_USER/BIODATA_INGEST_PASSWORD"
    )]
    MissingCredentials,

    #[error("{stage} request failed: {message}")]
    Http { stage: Stage, message: String },

    #[error("{stage} returned status {status}: {message}")]
    HttpStatus {
        stage: Stage,
        status: u16,
        message: String,
    },

    #[error("{stage} returned an unusable response: {message}")]
    RemoteProtocol { stage: Stage, message: String },

    #[error("{stage} rejected by server: {message}")]
    RemoteRejected { stage: Stage, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error(
        "batch aborted with bioDataItemIds {} still registered on the server",
        join_ids(.registered)
    )]
    #[diagnostic(help("delete the listed items before retrying the batch"))]
    BatchAborted {
        registered: Vec<u64>,
        #[source]
        source: Box<IngestError>,
    },
}

fn join_ids(ids: &[u64]) -> String {
    ids.iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::PathNotFound(_)
            | IngestError::NotADirectory(_)
            | IngestError::UnsupportedExtension { .. }
            | IngestError::UnknownCategory(_)
            | IngestError::UnsupportedCategory(_)
            | IngestError::IndexRequired { .. }
            | IngestError::IndexFormatMismatch { .. }
            | IngestError::InvalidReferenceId(_)
            | IngestError::InvalidUrl { .. }
            | IngestError::NonUtf8Path(_)
            | IngestError::Filesystem(_) => ErrorKind::InvalidArgument,
            IngestError::ConfigRead(_)
            | IngestError::ConfigParse(_)
            | IngestError::InvalidConfig(_)
            | IngestError::MissingCredentials => ErrorKind::Configuration,
            IngestError::Http { .. } | IngestError::HttpStatus { .. } => ErrorKind::Transport,
            IngestError::RemoteProtocol { .. } => ErrorKind::RemoteProtocol,
            IngestError::RemoteRejected { .. } => ErrorKind::RemoteRejected,
            IngestError::BatchAborted { source, .. } => source.kind(),
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            IngestError::Http { stage, .. }
            | IngestError::HttpStatus { stage, .. }
            | IngestError::RemoteProtocol { stage, .. }
            | IngestError::RemoteRejected { stage, .. } => Some(*stage),
            IngestError::BatchAborted { source, .. } => source.stage(),
            _ => None,
        }
    }

    /// The error that stopped the run, unwrapped from any batch context.
    pub fn root_cause(&self) -> &IngestError {
        match self {
            IngestError::BatchAborted { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
