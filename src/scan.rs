use std::collections::HashSet;
use std::fs;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};

use crate::classify::{ExtensionKey, classify_or_reject, verify_index};
use crate::domain::Category;
use crate::error::IngestError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: Utf8PathBuf,
    pub extension: ExtensionKey,
    pub category: Category,
}

/// How strictly companion indices are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexMode {
    /// A data file without an index is registered without one.
    #[default]
    Lenient,
    /// Files whose category mandates an index must have one, and every
    /// attached index must have an extension the server accepts.
    Strict,
}

/// A data file paired with the companion index found for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub file: ScannedFile,
    pub index: Option<Utf8PathBuf>,
}

/// Files found by one directory scan, in scan order.
#[derive(Debug, Clone, Default)]
pub struct WorkingSet {
    files: Vec<ScannedFile>,
    paths: HashSet<Utf8PathBuf>,
}

impl WorkingSet {
    pub fn from_files(files: Vec<ScannedFile>) -> Self {
        let paths = files.iter().map(|file| file.path.clone()).collect();
        Self { files, paths }
    }

    pub fn files(&self) -> &[ScannedFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, path: &Utf8Path) -> bool {
        self.paths.contains(path)
    }

    pub fn data_files(&self) -> impl Iterator<Item = &ScannedFile> {
        self.files.iter().filter(|file| !file.category.is_index())
    }

    /// Companion index for `file`: `<path>.<index extension>`, if that exact
    /// path was scanned too.
    pub fn resolve_index(&self, file: &ScannedFile) -> Option<Utf8PathBuf> {
        if file.category.is_index() {
            return None;
        }
        let index_ext = file.extension.index_extension()?;
        let candidate = Utf8PathBuf::from(format!("{}.{index_ext}", file.path));
        self.contains(&candidate).then_some(candidate)
    }

    /// Resolves every data file in scan order.
    pub fn plan(&self, mode: IndexMode) -> Result<Vec<ResolvedFile>, IngestError> {
        self.data_files()
            .map(|file| -> Result<ResolvedFile, IngestError> {
                let index = self.resolve_index(file);
                if mode == IndexMode::Strict {
                    check_strict(file, index.as_deref())?;
                }
                if index.is_none() && file.extension.index_extension().is_some() {
                    tracing::warn!("no index found for {}, registering without one", file.path);
                }
                Ok(ResolvedFile {
                    file: file.clone(),
                    index,
                })
            })
            .collect()
    }
}

/// Lists and classifies the regular files directly inside `dir`. Scan order
/// groups files by category, then sorts by path. Any unsupported extension
/// rejects the whole scan.
pub fn scan_directory(dir: &Path) -> Result<WorkingSet, IngestError> {
    if !dir.exists() {
        return Err(IngestError::PathNotFound(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(IngestError::NotADirectory(dir.to_path_buf()));
    }
    let dir = fs::canonicalize(dir).map_err(|err| IngestError::Filesystem(err.to_string()))?;

    let mut paths = Vec::new();
    let entries = fs::read_dir(&dir)
        .map_err(|err| IngestError::Filesystem(format!("read {}: {err}", dir.display())))?;
    for entry in entries {
        let entry = entry.map_err(|err| IngestError::Filesystem(err.to_string()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let path = Utf8PathBuf::from_path_buf(path).map_err(IngestError::NonUtf8Path)?;
        paths.push(path);
    }
    let mut files = paths
        .into_iter()
        .map(|path| -> Result<ScannedFile, IngestError> {
            let (extension, category) = classify_or_reject(path.as_str())?;
            tracing::debug!("scanned {path} as {category} ({extension})");
            Ok(ScannedFile {
                path,
                extension,
                category,
            })
        })
        .collect::<Result<Vec<_>, IngestError>>()?;
    files.sort_by(|a, b| a.category.cmp(&b.category).then_with(|| a.path.cmp(&b.path)));

    Ok(WorkingSet::from_files(files))
}

fn check_strict(file: &ScannedFile, index: Option<&Utf8Path>) -> Result<(), IngestError> {
    match index {
        Some(index) => {
            verify_index(file.category, index.as_str())?;
            Ok(())
        }
        None if file.category.requires_index() => Err(IngestError::IndexRequired {
            category: file.category.to_string(),
            path: file.path.to_string(),
        }),
        None => Ok(()),
    }
}
