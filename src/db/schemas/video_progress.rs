//! Per-video watch record schema
//!
//! One document per user×course×video triple. Each record keeps a bounded
//! watch history: entries are appended only when the percentage moves by at
//! least the materiality threshold, and the oldest entries are evicted once
//! the cap is reached.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for per-video watch records
pub const VIDEO_PROGRESS_COLLECTION: &str = "video_progress";

/// Bounds on the per-video watch history
#[derive(Debug, Clone, Copy)]
pub struct HistoryPolicy {
    /// Maximum entries kept; oldest evicted first
    pub cap: usize,
    /// Minimum percentage-point change before an entry is appended
    pub materiality: i32,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self {
            cap: 50,
            materiality: 5,
        }
    }
}

/// One watch-history entry
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct WatchSample {
    pub timestamp: DateTime,
    pub minutes_watched: f64,
    pub percentage: i32,
}

/// Per-video watch record stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct VideoProgressDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at)
    #[serde(default)]
    pub metadata: Metadata,

    /// Learner identifier
    pub user_id: String,

    /// Course identifier
    pub course_id: String,

    /// Video identifier within the course
    pub video_id: String,

    /// Minutes of this video completed
    pub completed_minutes: f64,

    /// Completion percentage for this single video, 0..=100
    pub percentage: i32,

    /// Last time a watch report touched this record
    pub last_watched: DateTime,

    /// Bounded audit trail of percentage changes
    #[serde(default)]
    pub watch_history: Vec<WatchSample>,
}

impl VideoProgressDoc {
    /// Create a fresh record for the first report on a video
    pub fn new(user_id: String, course_id: String, video_id: String) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            user_id,
            course_id,
            video_id,
            completed_minutes: 0.0,
            percentage: 0,
            last_watched: DateTime::now(),
            watch_history: Vec::new(),
        }
    }

    /// Apply a watch report and conditionally extend the history.
    ///
    /// The history entry is appended only when there is no prior entry or
    /// the percentage moved by at least `policy.materiality` points since
    /// the last recorded one; the history never exceeds `policy.cap`.
    pub fn record_watch(&mut self, completed_minutes: f64, percentage: i32, policy: &HistoryPolicy) {
        self.completed_minutes = completed_minutes.max(0.0);
        self.percentage = percentage.clamp(0, 100);
        self.last_watched = DateTime::now();

        let material = match self.watch_history.last() {
            None => true,
            Some(last) => (self.percentage - last.percentage).abs() >= policy.materiality,
        };

        if material {
            self.watch_history.push(WatchSample {
                timestamp: DateTime::now(),
                minutes_watched: self.completed_minutes,
                percentage: self.percentage,
            });

            while self.watch_history.len() > policy.cap {
                self.watch_history.remove(0);
            }
        }
    }

    /// Zero the record on an explicit reset, keeping the audit trail
    pub fn reset(&mut self, policy: &HistoryPolicy) {
        self.record_watch(0.0, 0, policy);
    }
}

impl IntoIndexes for VideoProgressDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // One record per user-course-video triple
            (
                doc! { "user_id": 1, "course_id": 1, "video_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("user_course_video_unique".to_string())
                        .build(),
                ),
            ),
            // Recompute lists all records for a user-course pair
            (
                doc! { "user_id": 1, "course_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("user_course_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for VideoProgressDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
