use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

static URL_SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)(https?|ftp|s3|az|gs)://").expect("scheme pattern is valid")
});

/// Semantic file type. Selects the registration endpoint and, on the delete
/// path, the id parameter name. Declaration order is the batch scan order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Reference,
    Vcf,
    Gene,
    Bam,
    Seg,
    Wig,
    Bed,
    Vg,
    Maf,
    Index,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Reference => "reference",
            Category::Vcf => "vcf",
            Category::Gene => "gene",
            Category::Bam => "bam",
            Category::Seg => "seg",
            Category::Wig => "wig",
            Category::Bed => "bed",
            Category::Vg => "vg",
            Category::Maf => "maf",
            Category::Index => "index",
        }
    }

    /// URL segment of the registration endpoint. Index files are only ever
    /// sent as a companion of a data file.
    pub fn endpoint_segment(&self) -> Result<&'static str, IngestError> {
        match self {
            Category::Index => Err(IngestError::UnsupportedCategory(self.to_string())),
            other => Ok(other.as_str()),
        }
    }

    /// Query parameter carrying the item id on the delete endpoint.
    pub fn id_field(&self) -> Result<&'static str, IngestError> {
        match self {
            Category::Vcf => Ok("vcfFileId"),
            Category::Gene => Ok("geneFileId"),
            Category::Bam => Ok("bamFileId"),
            Category::Seg => Ok("segFileId"),
            Category::Wig => Ok("wigFileId"),
            Category::Bed => Ok("bedFileId"),
            Category::Vg => Ok("vgFileId"),
            Category::Reference => Ok("referenceId"),
            Category::Maf | Category::Index => {
                Err(IngestError::UnsupportedCategory(self.to_string()))
            }
        }
    }

    pub fn supports_gzip(&self) -> bool {
        matches!(
            self,
            Category::Vcf
                | Category::Gene
                | Category::Wig
                | Category::Bed
                | Category::Seg
                | Category::Maf
        )
    }

    pub fn requires_index(&self) -> bool {
        matches!(self, Category::Bam)
    }

    pub fn is_index(&self) -> bool {
        matches!(self, Category::Index)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reference" => Ok(Category::Reference),
            "vcf" => Ok(Category::Vcf),
            "gene" => Ok(Category::Gene),
            "bam" => Ok(Category::Bam),
            "seg" => Ok(Category::Seg),
            "wig" => Ok(Category::Wig),
            "bed" => Ok(Category::Bed),
            "vg" => Ok(Category::Vg),
            "maf" => Ok(Category::Maf),
            "index" => Ok(Category::Index),
            _ => Err(IngestError::UnknownCategory(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceId(u64);

impl ReferenceId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReferenceId {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(IngestError::InvalidReferenceId(value.to_string()));
        }
        trimmed
            .parse()
            .map(Self)
            .map_err(|_| IngestError::InvalidReferenceId(value.to_string()))
    }
}

/// Whether a path names a local file or a remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceType {
    File,
    Url,
}

impl ResourceType {
    pub fn from_path(path: &str) -> Self {
        if URL_SCHEME.is_match(path.trim()) {
            ResourceType::Url
        } else {
            ResourceType::File
        }
    }
}

/// Reference genome a batch is registered against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub bio_data_item_id: u64,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Reference {
    /// Id sent as `referenceId` in registrations: the reference's own id
    /// when the server reports one, otherwise the id it was looked up by.
    pub fn registration_id(&self, requested: ReferenceId) -> u64 {
        self.id.unwrap_or(requested.value())
    }
}

/// Item created by a successful registration call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredItem {
    #[serde(default)]
    pub id: Option<u64>,
    pub bio_data_item_id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedProject {
    pub id: u64,
    pub name: String,
}
