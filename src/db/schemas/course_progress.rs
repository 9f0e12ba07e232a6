//! Course progress aggregate schema
//!
//! One document per user×course pair, holding the rollup of completion state.
//! `percentage` and `status` are always derived from the minute counts; no
//! code path writes them independently.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for course progress aggregates
pub const COURSE_PROGRESS_COLLECTION: &str = "course_progress";

/// Completion status, a pure function of percentage
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CourseStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl CourseStatus {
    /// Derive status from a 0-100 percentage
    pub fn from_percentage(percentage: i32) -> Self {
        match percentage {
            i32::MIN..=0 => CourseStatus::NotStarted,
            100.. => CourseStatus::Completed,
            _ => CourseStatus::InProgress,
        }
    }
}

impl std::fmt::Display for CourseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CourseStatus::NotStarted => write!(f, "not_started"),
            CourseStatus::InProgress => write!(f, "in_progress"),
            CourseStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Derive the integer percentage for `completed` minutes out of `total`.
///
/// Rounded to the nearest point, but 100 is reserved for full completion:
/// `percentage == 100` holds exactly when `completed == total` (total > 0).
/// A zero-duration course reports 0.
pub fn derive_percentage(completed: f64, total: f64) -> i32 {
    if total <= 0.0 {
        return 0;
    }
    if completed >= total {
        return 100;
    }
    let rounded = ((completed / total) * 100.0).round() as i32;
    rounded.clamp(0, 99)
}

/// Course progress document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CourseProgressDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at)
    #[serde(default)]
    pub metadata: Metadata,

    /// Learner identifier (opaque, owned by the account system)
    pub user_id: String,

    /// Course identifier (opaque, owned by the catalogue system)
    pub course_id: String,

    /// Minutes of course content completed, 0..=total_minutes
    pub completed_minutes: f64,

    /// Course duration in minutes, fixed at enrollment time
    pub total_minutes: f64,

    /// Derived completion percentage, 0..=100
    pub percentage: i32,

    /// Derived completion status
    #[serde(default)]
    pub status: CourseStatus,

    /// Set on every mutation
    pub last_updated: DateTime,

    /// Proctoring similarity score (0-1), orthogonal to completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_similarity_score: Option<f64>,

    /// Proctoring face-not-found flag, orthogonal to completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_not_found: Option<bool>,
}

impl CourseProgressDoc {
    /// Create a fresh aggregate for an enrollment
    pub fn new(user_id: String, course_id: String, total_minutes: f64) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            user_id,
            course_id,
            completed_minutes: 0.0,
            total_minutes,
            percentage: 0,
            status: CourseStatus::NotStarted,
            last_updated: DateTime::now(),
            face_similarity_score: None,
            face_not_found: None,
        }
    }

    /// Set completed minutes, re-deriving percentage and status.
    ///
    /// Minutes are capped to `[0, total_minutes]`; this is the single
    /// place the percentage/status invariants are enforced.
    pub fn set_completed_minutes(&mut self, completed: f64) {
        self.completed_minutes = completed.clamp(0.0, self.total_minutes.max(0.0));
        self.percentage = derive_percentage(self.completed_minutes, self.total_minutes);
        self.status = CourseStatus::from_percentage(self.percentage);
        self.last_updated = DateTime::now();
    }
}

impl IntoIndexes for CourseProgressDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // One aggregate per user-course pair
            (
                doc! { "user_id": 1, "course_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("user_course_unique".to_string())
                        .build(),
                ),
            ),
            // Admin review listing scans by user
            (
                doc! { "user_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("user_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for CourseProgressDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_percentage() {
        assert_eq!(CourseStatus::from_percentage(0), CourseStatus::NotStarted);
        assert_eq!(CourseStatus::from_percentage(1), CourseStatus::InProgress);
        assert_eq!(CourseStatus::from_percentage(99), CourseStatus::InProgress);
        assert_eq!(CourseStatus::from_percentage(100), CourseStatus::Completed);
    }

    #[test]
    fn test_percentage_full_only_at_total() {
        // 99.6/100 rounds to 100 but must not report full completion
        assert_eq!(derive_percentage(99.6, 100.0), 99);
        assert_eq!(derive_percentage(100.0, 100.0), 100);
        assert_eq!(derive_percentage(0.0, 100.0), 0);
        assert_eq!(derive_percentage(35.0, 50.0), 70);
    }

    #[test]
    fn test_percentage_zero_duration_course() {
        assert_eq!(derive_percentage(0.0, 0.0), 0);
        assert_eq!(derive_percentage(10.0, 0.0), 0);
    }

    #[test]
    fn test_set_completed_minutes_caps_and_derives() {
        let mut progress = CourseProgressDoc::new("u1".into(), "c1".into(), 100.0);

        progress.set_completed_minutes(60.0);
        assert_eq!(progress.percentage, 60);
        assert_eq!(progress.status, CourseStatus::InProgress);

        // Over-reporting caps at the course duration
        progress.set_completed_minutes(250.0);
        assert_eq!(progress.completed_minutes, 100.0);
        assert_eq!(progress.percentage, 100);
        assert_eq!(progress.status, CourseStatus::Completed);

        progress.set_completed_minutes(-5.0);
        assert_eq!(progress.completed_minutes, 0.0);
        assert_eq!(progress.status, CourseStatus::NotStarted);
    }
}
