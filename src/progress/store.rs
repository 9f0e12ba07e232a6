//! Progress store traits and their MongoDB implementations
//!
//! The traits are the seam between the aggregation logic and persistence;
//! tests exercise the aggregator against in-memory implementations.

use async_trait::async_trait;
use bson::doc;

use crate::db::schemas::{CourseProgressDoc, VideoProgressDoc};
use crate::db::MongoCollection;
use crate::types::Result;

/// Persisted per-user-per-course aggregates
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Find the aggregate for a user-course pair
    async fn find(&self, user_id: &str, course_id: &str) -> Result<Option<CourseProgressDoc>>;

    /// Insert or replace the aggregate for its user-course pair
    async fn upsert(&self, progress: CourseProgressDoc) -> Result<CourseProgressDoc>;

    /// List every aggregate (admin review)
    async fn list_all(&self) -> Result<Vec<CourseProgressDoc>>;
}

/// Persisted per-user-per-course-per-video watch records
#[async_trait]
pub trait VideoProgressStore: Send + Sync {
    /// Find the record for a user-course-video triple
    async fn find(
        &self,
        user_id: &str,
        course_id: &str,
        video_id: &str,
    ) -> Result<Option<VideoProgressDoc>>;

    /// List all video records for a user-course pair
    async fn list_for_course(&self, user_id: &str, course_id: &str)
        -> Result<Vec<VideoProgressDoc>>;

    /// Insert or replace the record for its user-course-video triple
    async fn upsert(&self, video: VideoProgressDoc) -> Result<VideoProgressDoc>;
}

/// MongoDB-backed [`ProgressStore`]
#[derive(Clone)]
pub struct MongoProgressStore {
    collection: MongoCollection<CourseProgressDoc>,
}

impl MongoProgressStore {
    pub fn new(collection: MongoCollection<CourseProgressDoc>) -> Self {
        Self { collection }
    }
}

#[async_trait]
impl ProgressStore for MongoProgressStore {
    async fn find(&self, user_id: &str, course_id: &str) -> Result<Option<CourseProgressDoc>> {
        self.collection
            .find_one(doc! { "user_id": user_id, "course_id": course_id })
            .await
    }

    async fn upsert(&self, progress: CourseProgressDoc) -> Result<CourseProgressDoc> {
        let filter = doc! {
            "user_id": &progress.user_id,
            "course_id": &progress.course_id,
        };
        self.collection.replace_one_upsert(filter, progress).await
    }

    async fn list_all(&self) -> Result<Vec<CourseProgressDoc>> {
        self.collection.find_many(doc! {}).await
    }
}

/// MongoDB-backed [`VideoProgressStore`]
#[derive(Clone)]
pub struct MongoVideoProgressStore {
    collection: MongoCollection<VideoProgressDoc>,
}

impl MongoVideoProgressStore {
    pub fn new(collection: MongoCollection<VideoProgressDoc>) -> Self {
        Self { collection }
    }
}

#[async_trait]
impl VideoProgressStore for MongoVideoProgressStore {
    async fn find(
        &self,
        user_id: &str,
        course_id: &str,
        video_id: &str,
    ) -> Result<Option<VideoProgressDoc>> {
        self.collection
            .find_one(doc! {
                "user_id": user_id,
                "course_id": course_id,
                "video_id": video_id,
            })
            .await
    }

    async fn list_for_course(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Vec<VideoProgressDoc>> {
        self.collection
            .find_many(doc! { "user_id": user_id, "course_id": course_id })
            .await
    }

    async fn upsert(&self, video: VideoProgressDoc) -> Result<VideoProgressDoc> {
        let filter = doc! {
            "user_id": &video.user_id,
            "course_id": &video.course_id,
            "video_id": &video.video_id,
        };
        self.collection.replace_one_upsert(filter, video).await
    }
}
