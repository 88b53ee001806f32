use serde::Serialize;

use crate::domain::{Reference, RegisteredItem};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectItem {
    pub bio_data_item_id: u64,
}

/// Body of the project-save call. The reference always comes first,
/// followed by the registered files in registration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pretty_name: Option<String>,
    pub items: Vec<ProjectItem>,
    /// Sent as the `parentId` query parameter, not in the body.
    #[serde(skip)]
    pub parent_id: Option<u64>,
}

impl ProjectRequest {
    pub fn assemble<'a>(
        name: &str,
        reference: &Reference,
        registered: impl IntoIterator<Item = &'a RegisteredItem>,
    ) -> Self {
        let items = std::iter::once(reference.bio_data_item_id)
            .chain(registered.into_iter().map(|item| item.bio_data_item_id))
            .map(|bio_data_item_id| ProjectItem { bio_data_item_id })
            .collect();
        Self {
            name: name.to_string(),
            pretty_name: None,
            items,
            parent_id: None,
        }
    }

    pub fn with_pretty_name(mut self, pretty_name: Option<String>) -> Self {
        self.pretty_name = pretty_name;
        self
    }

    pub fn with_parent(mut self, parent_id: Option<u64>) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn item_ids(&self) -> Vec<u64> {
        self.items.iter().map(|item| item.bio_data_item_id).collect()
    }
}
