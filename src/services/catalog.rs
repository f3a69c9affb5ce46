use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::course::Course;

/// Catalog used when `COURSE_CATALOG` is not set.
pub const DEFAULT_COURSE_CATALOG: &str = "learn-ai=Learn AI,learn-pr=Learn PR,\
learn-python=Learn Python,learn-sql=Learn SQL,learn-dsa=Learn DSA";

/// The known course and application identifiers.
#[derive(Debug, Clone)]
pub struct CourseCatalog {
    courses: Arc<Vec<Course>>,
}

impl CourseCatalog {
    /// Parses `id=Name,id=Name,...`. A bare `id` uses the id as its name.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut courses: Vec<Course> = Vec::new();

        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (id, name) = match entry.split_once('=') {
                Some((id, name)) => (id.trim(), name.trim()),
                None => (entry, entry),
            };

            if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
                return Err(AppError::Validation(format!("Invalid course id: '{}'", id)));
            }
            if courses.iter().any(|c| c.id == id) {
                return Err(AppError::Validation(format!("Duplicate course id: '{}'", id)));
            }

            courses.push(Course {
                id: id.to_string(),
                name: if name.is_empty() { id.to_string() } else { name.to_string() },
            });
        }

        if courses.is_empty() {
            return Err(AppError::Validation("Course catalog is empty".to_string()));
        }

        Ok(Self {
            courses: Arc::new(courses),
        })
    }

    /// Looks up a course by id.
    pub fn get(&self, id: &str) -> Option<&Course> {
        self.courses.iter().find(|c| c.id == id)
    }

    /// Looks up a course, failing validation for unknown ids.
    pub fn require(&self, id: &str) -> Result<&Course> {
        self.get(id)
            .ok_or_else(|| AppError::Validation(format!("Unknown course: '{}'", id)))
    }

    /// All courses, in configured order.
    pub fn courses(&self) -> &[Course] {
        &self.courses
    }
}

impl Default for CourseCatalog {
    fn default() -> Self {
        Self::parse(DEFAULT_COURSE_CATALOG).unwrap_or_else(|_| Self {
            courses: Arc::new(Vec::new()),
        })
    }
}
