use serde::{Deserialize, Serialize};

use crate::domain::{ImageId, StoreTypeId};

/// One page of a bounded collection listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage<T> {
    pub page: u32,
    pub per_page: u32,
    #[serde(default)]
    pub total_pages: u32,
    pub total_items: u64,
    pub items: Vec<T>,
}

/// Body for creating a category. A fresh image file is uploaded separately
/// and resolved to an [`ImageId`] before this is sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<StoreTypeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageId>,
}

fn default_active() -> bool {
    true
}

impl NewCategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: 0,
            active: true,
            types: None,
            image: None,
        }
    }
}

/// Partial update body; only supplied fields reach the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<StoreTypeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Create,
    Update,
    Delete,
}

/// One push notification frame from the record store.
///
/// `record` stays raw here; whether it decodes into a usable record is the
/// receiver's problem, and a frame that does not must never kill the stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordChange {
    pub collection: String,
    pub action: ChangeOp,
    pub record: serde_json::Value,
}
