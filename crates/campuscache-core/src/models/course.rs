use serde::{Deserialize, Serialize};

/// Review status of a course in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum CourseStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
    Published,
    #[serde(other)]
    Unknown,
}

impl CourseStatus {
    pub fn display_name(&self) -> &'static str {
        match self {
            CourseStatus::Draft => "Draft",
            CourseStatus::Pending => "Pending review",
            CourseStatus::Approved => "Approved",
            CourseStatus::Rejected => "Rejected",
            CourseStatus::Published => "Published",
            CourseStatus::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Course {
    #[serde(alias = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_status")]
    pub status: CourseStatus,
    #[serde(default)]
    pub instructor_name: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub enrolled_count: Option<u32>,
}

fn default_status() -> CourseStatus {
    CourseStatus::Draft
}

impl Course {
    pub fn is_pending_review(&self) -> bool {
        self.status == CourseStatus::Pending
    }

    pub fn price_display(&self) -> String {
        match self.price {
            Some(p) if p > 0.0 => format!("${:.2}", p),
            _ => "Free".to_string(),
        }
    }
}

/// Catalog filters. Serialized both into the cache key and the query string,
/// so field order and naming must stay stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CourseStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    pub page: u32,
    pub limit: u32,
}

impl Default for CourseFilter {
    fn default() -> Self {
        Self {
            category: None,
            status: None,
            search: None,
            page: 1,
            limit: 10,
        }
    }
}

impl CourseFilter {
    pub fn page(page: u32, limit: u32) -> Self {
        Self {
            page,
            limit,
            ..Self::default()
        }
    }
}
