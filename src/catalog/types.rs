/// Course type definitions
///
/// A course is what an enquiry asks about and what an enrollment grants.
/// Fees are whole rupees.

use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub title: String,
    pub description: String,
    /// e.g. "Full Stack Development", "Data Science"
    pub category: String,
    /// e.g. "Beginner", "Advanced"
    pub level: String,
    /// Free text such as "12 weeks"
    pub duration: String,
    pub fee: i64,
    pub instructor: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for course creation and update
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourseInput {
    pub title: String,
    pub description: String,
    pub category: String,
    pub level: String,
    pub duration: String,
    pub fee: i64,
    pub instructor: Option<String>,
}

impl CourseInput {
    /// Trim text fields and check the required ones
    pub fn normalized(mut self) -> AppResult<Self> {
        self.title = self.title.trim().to_string();
        self.description = self.description.trim().to_string();
        self.category = self.category.trim().to_string();
        self.level = self.level.trim().to_string();
        self.duration = self.duration.trim().to_string();
        self.instructor = self
            .instructor
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty());

        if self.title.is_empty() {
            return Err(AppError::Validation("Course title is required".to_string()));
        }
        if self.fee < 0 {
            return Err(AppError::Validation("Course fee cannot be negative".to_string()));
        }
        Ok(self)
    }
}
