use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a menu job. Transitions are monotonic:
/// `Pending -> Extracting -> Enriching -> {Completed | Failed}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MenuStatus {
    Pending,
    Extracting,
    Enriching,
    Completed,
    Failed,
}

impl MenuStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MenuStatus::Pending => "PENDING",
            MenuStatus::Extracting => "EXTRACTING",
            MenuStatus::Enriching => "ENRICHING",
            MenuStatus::Completed => "COMPLETED",
            MenuStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<MenuStatus> {
        match s {
            "PENDING" => Some(MenuStatus::Pending),
            "EXTRACTING" => Some(MenuStatus::Extracting),
            "ENRICHING" => Some(MenuStatus::Enriching),
            "COMPLETED" => Some(MenuStatus::Completed),
            "FAILED" => Some(MenuStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MenuStatus::Completed | MenuStatus::Failed)
    }

    /// Whether moving to `next` respects the state machine.
    pub fn can_transition_to(&self, next: MenuStatus) -> bool {
        use MenuStatus::*;
        matches!(
            (self, next),
            (Pending, Extracting)
                | (Extracting, Enriching)
                | (Extracting, Failed)
                | (Enriching, Completed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Menu {
    pub id: Uuid,
    pub status: MenuStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: Uuid,
    pub menu_id: Uuid,
    pub item_text: String,
    pub item_price: Option<String>,
    pub description: Option<String>,
    pub estimated_calories: Option<i64>,
    pub generated_image: Option<Vec<u8>>,
    pub generation_prompt: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One candidate line as returned by the vision adapter, before persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedItem {
    pub item_text: String,
    #[serde(default)]
    pub item_price: Option<String>,
}

/// Wire shape of `GET /menus/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct MenuResponse {
    pub id: Uuid,
    pub status: &'static str,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub items: Vec<MenuItemResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MenuItemResponse {
    pub id: Uuid,
    pub item_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_calories: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_image_data: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MenuResponse {
    pub fn from_parts(menu: Menu, items: Vec<MenuItem>) -> Self {
        Self {
            id: menu.id,
            status: menu.status.as_str(),
            created_at: menu.created_at,
            updated_at: menu.updated_at,
            error: menu.error,
            items: items.into_iter().map(MenuItemResponse::from).collect(),
        }
    }
}

impl From<MenuItem> for MenuItemResponse {
    fn from(item: MenuItem) -> Self {
        // The generation prompt is audit data; it is stored but never exposed.
        Self {
            id: item.id,
            item_text: item.item_text,
            item_price: item.item_price,
            description: item.description,
            estimated_calories: item.estimated_calories,
            generated_image_data: item
                .generated_image
                .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes)),
            created_at: item.created_at,
        }
    }
}
