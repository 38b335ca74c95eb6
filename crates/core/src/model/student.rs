use serde::{Deserialize, Serialize};

use crate::model::{Category, StudentId};

/// The authenticated student taking the quiz.
///
/// Identity and category assignment come from outside the session engine; the
/// engine only reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub category: Option<Category>,
}

impl Student {
    #[must_use]
    pub fn new(id: StudentId, name: impl Into<String>, category: Option<Category>) -> Self {
        Self {
            id,
            name: name.into(),
            category,
        }
    }
}
