//! Extension-based file type classification.
//!
//! A file name is reduced to an [`ExtensionKey`] in two steps: strip a
//! trailing `gz` compression suffix, then take the extension of what is left.
//! `vcf` and `vcf.gz` are therefore distinct keys that may share a category.

use std::fmt;

use crate::domain::Category;
use crate::error::IngestError;

pub const GZIP_EXTENSION: &str = "gz";
pub const TABIX_INDEX_EXTENSION: &str = "tbi";
pub const IDX_INDEX_EXTENSION: &str = "idx";

/// Uncompressed extension → category. Matching is case-sensitive.
pub const FILE_TYPE_RULES: &[(&str, Category)] = &[
    ("vcf", Category::Vcf),
    ("gff", Category::Gene),
    ("gtf", Category::Gene),
    ("gff3", Category::Gene),
    ("bam", Category::Bam),
    ("cram", Category::Bam),
    ("seg", Category::Seg),
    ("bw", Category::Wig),
    ("bigwig", Category::Wig),
    ("bdg", Category::Wig),
    ("bg", Category::Wig),
    ("bedGraph", Category::Wig),
    ("bed", Category::Bed),
    ("maf", Category::Maf),
    ("vg", Category::Vg),
    ("tbi", Category::Index),
    ("idx", Category::Index),
    ("bai", Category::Index),
    ("crai", Category::Index),
];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtensionKey {
    base: String,
    compressed: bool,
}

impl ExtensionKey {
    pub fn new(base: impl Into<String>, compressed: bool) -> Self {
        Self {
            base: base.into(),
            compressed,
        }
    }

    /// Builds the key for the last path segment of `name`, so plain paths
    /// and URL paths both work.
    pub fn from_file_name(name: &str) -> Self {
        let file_name = name.rsplit('/').next().unwrap_or(name);
        match split_compression(file_name) {
            Some(remainder) => Self::new(extension(remainder), true),
            None => Self::new(extension(file_name), false),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn category(&self) -> Option<Category> {
        // `archive.gz` has no extension left once the suffix is stripped
        if self.base.is_empty() {
            return None;
        }
        let category = FILE_TYPE_RULES
            .iter()
            .find(|(ext, _)| *ext == self.base)
            .map(|(_, category)| *category)?;
        if self.compressed && !category.supports_gzip() {
            return None;
        }
        Some(category)
    }

    /// Canonical companion index extension, if files of this kind are ever
    /// auto-indexed.
    pub fn index_extension(&self) -> Option<&'static str> {
        match (self.base.as_str(), self.compressed) {
            ("vcf" | "gff" | "gtf" | "gff3" | "bed", false) => Some(IDX_INDEX_EXTENSION),
            ("vcf" | "gff" | "gtf" | "gff3" | "bed", true) => Some(TABIX_INDEX_EXTENSION),
            ("bam", false) => Some("bai"),
            ("cram", false) => Some("crai"),
            _ => None,
        }
    }
}

impl fmt::Display for ExtensionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.compressed, self.base.is_empty()) {
            (true, true) => write!(f, "{GZIP_EXTENSION}"),
            (true, false) => write!(f, "{}.{GZIP_EXTENSION}", self.base),
            (false, _) => write!(f, "{}", self.base),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub key: ExtensionKey,
    pub category: Option<Category>,
}

impl Classification {
    pub fn recognized(&self) -> bool {
        self.category.is_some()
    }
}

pub fn classify(name: &str) -> Classification {
    let key = ExtensionKey::from_file_name(name);
    let category = key.category();
    Classification { key, category }
}

/// Like [`classify`], but an unrecognized extension is an error.
pub fn classify_or_reject(name: &str) -> Result<(ExtensionKey, Category), IngestError> {
    let Classification { key, category } = classify(name);
    match category {
        Some(category) => Ok((key, category)),
        None => Err(IngestError::UnsupportedExtension {
            path: name.to_string(),
            extension: key.to_string(),
        }),
    }
}

/// Every key the classifier recognizes, compressed variants included.
pub fn supported_keys() -> impl Iterator<Item = (ExtensionKey, Category)> {
    FILE_TYPE_RULES.iter().flat_map(|(ext, category)| {
        let plain = Some((ExtensionKey::new(*ext, false), *category));
        let gz = category
            .supports_gzip()
            .then(|| (ExtensionKey::new(*ext, true), *category));
        plain.into_iter().chain(gz)
    })
}

/// Index extensions the server accepts for a category.
pub fn allowed_index_extensions(category: Category) -> &'static [&'static str] {
    match category {
        Category::Bam => &["bai", "crai"],
        Category::Vcf | Category::Gene | Category::Bed | Category::Wig => {
            &[TABIX_INDEX_EXTENSION, IDX_INDEX_EXTENSION]
        }
        _ => &[],
    }
}

/// Checks a supplied index against the category's accepted extensions.
///
/// Returns `Ok(false)` when the category takes no index at all: the server
/// builds its own, so the caller should drop the supplied one.
pub fn verify_index(category: Category, index_path: &str) -> Result<bool, IngestError> {
    let allowed = allowed_index_extensions(category);
    if allowed.is_empty() {
        tracing::warn!(
            "index {index_path} won't be used, the server builds its own index for {category}"
        );
        return Ok(false);
    }
    let file_name = index_path.rsplit('/').next().unwrap_or(index_path);
    if !allowed.contains(&extension(file_name)) {
        return Err(IngestError::IndexFormatMismatch {
            index: index_path.to_string(),
            category: category.to_string(),
        });
    }
    Ok(true)
}

fn split_compression(file_name: &str) -> Option<&str> {
    let (remainder, ext) = file_name.rsplit_once('.')?;
    (ext == GZIP_EXTENSION).then_some(remainder)
}

fn extension(file_name: &str) -> &str {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .unwrap_or_default()
}
