use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{FormId, Question};

/// Form metadata accepted by `create_form`; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NewForm {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub settings: serde_json::Value,
    #[serde(default)]
    pub published: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    pub id: FormId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub settings: serde_json::Value,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub questions: Vec<Question>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Form {
    pub fn summary(&self) -> FormSummary {
        FormSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            published: self.published,
            question_count: self.questions.len(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSummary {
    pub id: FormId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub published: bool,
    pub question_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
