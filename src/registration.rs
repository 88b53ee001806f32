use std::path::Path;

use reqwest::Url;
use serde::Serialize;

use crate::classify::{classify_or_reject, verify_index};
use crate::domain::{Category, ResourceType};
use crate::error::IngestError;
use crate::scan::ResolvedFile;

/// Body of a `POST <register>/{category}` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub path: String,
    pub reference_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pretty_name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<ResourceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_type: Option<ResourceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub do_index: Option<bool>,
}

impl RegistrationRequest {
    pub fn new(path: impl Into<String>, reference_id: u64) -> Self {
        Self {
            path: path.into(),
            reference_id,
            index_path: None,
            name: None,
            pretty_name: None,
            resource_type: None,
            index_type: None,
            do_index: None,
        }
    }

    /// Request for one data file of a directory batch.
    pub fn for_batch(resolved: &ResolvedFile, reference_id: u64) -> Self {
        let mut request = Self::new(resolved.file.path.as_str(), reference_id);
        request.index_path = resolved.index.as_ref().map(|index| index.to_string());
        request
    }
}

/// One file named on the command line, with optional index and naming.
///
/// Paths with a `http`, `https`, `ftp`, `s3`, `az` or `gs` scheme are sent
/// as URLs; anything else must exist locally and is sent as an absolute path.
#[derive(Debug, Clone, Default)]
pub struct FileRegistration {
    pub path: String,
    pub index: Option<String>,
    pub name: Option<String>,
    pub pretty_name: Option<String>,
    pub do_index: Option<bool>,
}

/// A validated [`FileRegistration`] waiting for its reference id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedFile {
    pub category: Category,
    request: RegistrationRequest,
}

impl PreparedFile {
    pub fn into_request(self, reference_id: u64) -> RegistrationRequest {
        RegistrationRequest {
            reference_id,
            ..self.request
        }
    }
}

impl FileRegistration {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Classifies the file and checks its index before any remote call.
    pub fn validate(&self) -> Result<PreparedFile, IngestError> {
        let resource_type = ResourceType::from_path(&self.path);
        let (path, classify_target) = normalize(&self.path, resource_type)?;
        let (_, category) = classify_or_reject(&classify_target)?;
        if category.is_index() {
            return Err(IngestError::UnsupportedCategory(category.to_string()));
        }

        let mut index_path = None;
        let mut index_type = None;
        match &self.index {
            None if category.requires_index() => {
                return Err(IngestError::IndexRequired {
                    category: category.to_string(),
                    path,
                });
            }
            None => {}
            Some(index) => {
                let kind = ResourceType::from_path(index);
                let (normalized, check_target) = normalize_index(index, kind)?;
                if verify_index(category, &check_target)? {
                    index_path = Some(normalized);
                    index_type = Some(kind);
                }
            }
        }

        let mut request = RegistrationRequest::new(path, 0);
        request.index_path = index_path;
        request.index_type = index_type;
        request.resource_type = Some(resource_type);
        request.name = self.name.clone();
        request.pretty_name = self.pretty_name.clone();
        if matches!(category, Category::Vcf | Category::Gene) {
            request.do_index = self.do_index;
        }
        Ok(PreparedFile { category, request })
    }
}

/// Returns the path to send and the string to classify: the absolute path
/// for files, the URL and its path component for URLs.
fn normalize(path: &str, resource_type: ResourceType) -> Result<(String, String), IngestError> {
    match resource_type {
        ResourceType::Url => {
            let url = parse_url(path)?;
            Ok((url.to_string(), url.path().to_string()))
        }
        ResourceType::File => {
            let local = Path::new(path);
            if !local.exists() {
                return Err(IngestError::PathNotFound(local.to_path_buf()));
            }
            let absolute = absolute_string(local)?;
            Ok((absolute.clone(), absolute))
        }
    }
}

fn normalize_index(
    index: &str,
    resource_type: ResourceType,
) -> Result<(String, String), IngestError> {
    match resource_type {
        ResourceType::Url => {
            let url = parse_url(index)?;
            Ok((url.to_string(), url.path().to_string()))
        }
        ResourceType::File => {
            let absolute = absolute_string(Path::new(index))?;
            Ok((absolute.clone(), absolute))
        }
    }
}

fn parse_url(value: &str) -> Result<Url, IngestError> {
    Url::parse(value.trim()).map_err(|err| IngestError::InvalidUrl {
        url: value.to_string(),
        message: err.to_string(),
    })
}

fn absolute_string(path: &Path) -> Result<String, IngestError> {
    let absolute =
        std::path::absolute(path).map_err(|err| IngestError::Filesystem(err.to_string()))?;
    absolute
        .into_os_string()
        .into_string()
        .map_err(|raw| IngestError::NonUtf8Path(raw.into()))
}
