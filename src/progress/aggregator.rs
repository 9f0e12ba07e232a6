//! Course progress aggregation
//!
//! Maintains the per-course aggregate as a pure rollup of the per-video
//! records. Recomputation always sums the current record set, so concurrent
//! reports against different videos of one course converge regardless of
//! arrival order; reports against the same video are last-write-wins.
//!
//! A course is tracked in exactly one of two modes: per-video reports or
//! direct minute increments. Mixing them would double count, so the
//! aggregator rejects a report in the mode the course is not using.

use std::sync::Arc;
use tracing::debug;

use crate::db::schemas::{CourseProgressDoc, HistoryPolicy, VideoProgressDoc};
use crate::progress::store::{ProgressStore, VideoProgressStore};
use crate::types::{LecternError, Result};

/// Result of a per-video report or reset
#[derive(Debug, Clone)]
pub struct VideoUpdateOutcome {
    /// The touched video record after the write
    pub video: VideoProgressDoc,
    /// The recomputed aggregate; None when no enrollment aggregate exists
    pub aggregate: Option<CourseProgressDoc>,
}

/// Recomputes course aggregates from per-video watch records.
///
/// Exclusively owns aggregate recomputation: no other path writes
/// `completed_minutes`/`percentage` on an aggregate.
pub struct ProgressAggregator {
    progress: Arc<dyn ProgressStore>,
    videos: Arc<dyn VideoProgressStore>,
    history: HistoryPolicy,
}

impl ProgressAggregator {
    pub fn new(
        progress: Arc<dyn ProgressStore>,
        videos: Arc<dyn VideoProgressStore>,
        history: HistoryPolicy,
    ) -> Self {
        Self {
            progress,
            videos,
            history,
        }
    }

    /// Apply a per-video watch report and recompute the owning aggregate.
    ///
    /// Upserts the video record, then recomputes the aggregate as the sum
    /// of all current video records for the pair, capped at the course
    /// duration. When no aggregate exists the video record is still stored
    /// but the aggregate is untouched (a video report cannot create
    /// enrollment state). Idempotent: repeating an identical report leaves
    /// the same end state.
    pub async fn apply_video_update(
        &self,
        user_id: &str,
        course_id: &str,
        video_id: &str,
        completed_minutes: f64,
        percentage: i32,
    ) -> Result<VideoUpdateOutcome> {
        require_ids(user_id, course_id)?;
        if video_id.trim().is_empty() {
            return Err(LecternError::Validation(
                "video identifier must not be empty".into(),
            ));
        }
        if completed_minutes < 0.0 {
            return Err(LecternError::Validation(
                "completedMinutes must not be negative".into(),
            ));
        }
        if !(0..=100).contains(&percentage) {
            return Err(LecternError::Validation(
                "percentage must be between 0 and 100".into(),
            ));
        }

        let aggregate = self.progress.find(user_id, course_id).await?;

        // Mode guard: minutes on the aggregate without any video records
        // means the course is tracked by direct increments.
        if let Some(agg) = &aggregate {
            if agg.completed_minutes > 0.0 {
                let existing = self.videos.list_for_course(user_id, course_id).await?;
                if existing.is_empty() {
                    return Err(LecternError::Validation(
                        "course is tracked by direct increments; per-video reports are not accepted"
                            .into(),
                    ));
                }
            }
        }

        let mut video = match self.videos.find(user_id, course_id, video_id).await? {
            Some(existing) => existing,
            None => VideoProgressDoc::new(
                user_id.to_string(),
                course_id.to_string(),
                video_id.to_string(),
            ),
        };
        video.record_watch(completed_minutes, percentage, &self.history);
        let video = self.videos.upsert(video).await?;

        let aggregate = if aggregate.is_some() {
            self.recompute(user_id, course_id).await?
        } else {
            debug!(
                user_id,
                course_id, video_id, "video report without enrollment aggregate, rollup skipped"
            );
            None
        };

        Ok(VideoUpdateOutcome { video, aggregate })
    }

    /// Add watched minutes directly to the aggregate, bypassing per-video
    /// granularity.
    ///
    /// Fails with NotFound when no aggregate exists (enrollment required
    /// first) and rejects courses already tracked per-video. Minutes are
    /// capped at the course duration.
    pub async fn apply_direct_increment(
        &self,
        user_id: &str,
        course_id: &str,
        watched_minutes: f64,
    ) -> Result<CourseProgressDoc> {
        require_ids(user_id, course_id)?;
        if watched_minutes < 0.0 {
            return Err(LecternError::Validation(
                "watchedMinutes must not be negative".into(),
            ));
        }

        let mut aggregate = self
            .progress
            .find(user_id, course_id)
            .await?
            .ok_or_else(|| {
                LecternError::NotFound(format!(
                    "no progress record for user '{user_id}' in course '{course_id}'"
                ))
            })?;

        let videos = self.videos.list_for_course(user_id, course_id).await?;
        if !videos.is_empty() {
            return Err(LecternError::Validation(
                "course is tracked per-video; direct increments are not accepted".into(),
            ));
        }

        aggregate.set_completed_minutes(aggregate.completed_minutes + watched_minutes);
        self.progress.upsert(aggregate).await
    }

    /// Administrative/bulk-set path; the only path that creates an
    /// aggregate, normally invoked once at enrollment.
    ///
    /// Minutes are clamped to `[0, total_minutes]`. The requested
    /// percentage is clamped to `[0, 100]` and then reconciled against the
    /// value derived from the minutes; the derived value wins, keeping
    /// status a pure function of completion.
    pub async fn overwrite_total(
        &self,
        user_id: &str,
        course_id: &str,
        completed_minutes: f64,
        percentage: i32,
        total_minutes: f64,
    ) -> Result<CourseProgressDoc> {
        require_ids(user_id, course_id)?;
        if total_minutes < 0.0 {
            return Err(LecternError::Validation(
                "totalMinutes must not be negative".into(),
            ));
        }

        let mut aggregate = match self.progress.find(user_id, course_id).await? {
            Some(existing) => existing,
            None => CourseProgressDoc::new(user_id.to_string(), course_id.to_string(), total_minutes),
        };

        aggregate.total_minutes = total_minutes;
        aggregate.set_completed_minutes(completed_minutes);

        let requested = percentage.clamp(0, 100);
        if requested != aggregate.percentage {
            debug!(
                user_id,
                course_id,
                requested,
                derived = aggregate.percentage,
                "overwrite percentage reconciled to derived value"
            );
        }

        self.progress.upsert(aggregate).await
    }

    /// Zero one video record, then recompute the aggregate so a reset on a
    /// high-weight video correctly lowers the rollup.
    pub async fn reset_video(
        &self,
        user_id: &str,
        course_id: &str,
        video_id: &str,
    ) -> Result<VideoUpdateOutcome> {
        require_ids(user_id, course_id)?;

        let mut video = self
            .videos
            .find(user_id, course_id, video_id)
            .await?
            .ok_or_else(|| {
                LecternError::NotFound(format!(
                    "no watch record for video '{video_id}' in course '{course_id}'"
                ))
            })?;

        video.reset(&self.history);
        let video = self.videos.upsert(video).await?;
        let aggregate = self.recompute(user_id, course_id).await?;

        Ok(VideoUpdateOutcome { video, aggregate })
    }

    /// Recompute one aggregate from the current set of video records.
    ///
    /// Pure rollup: sum of video minutes, capped at the course duration,
    /// percentage and status re-derived. Calling it twice with unchanged
    /// inputs stores the same state.
    async fn recompute(&self, user_id: &str, course_id: &str) -> Result<Option<CourseProgressDoc>> {
        let Some(mut aggregate) = self.progress.find(user_id, course_id).await? else {
            return Ok(None);
        };

        let videos = self.videos.list_for_course(user_id, course_id).await?;
        let watched: f64 = videos.iter().map(|v| v.completed_minutes).sum();
        aggregate.set_completed_minutes(watched);

        Ok(Some(self.progress.upsert(aggregate).await?))
    }
}

fn require_ids(user_id: &str, course_id: &str) -> Result<()> {
    if user_id.trim().is_empty() || course_id.trim().is_empty() {
        return Err(LecternError::Validation(
            "userId and courseId must not be empty".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::CourseStatus;
    use crate::testutil::{MemoryProgressStore, MemoryVideoProgressStore};

    fn aggregator() -> ProgressAggregator {
        ProgressAggregator::new(
            Arc::new(MemoryProgressStore::default()),
            Arc::new(MemoryVideoProgressStore::default()),
            HistoryPolicy::default(),
        )
    }

    async fn enroll(agg: &ProgressAggregator, user: &str, course: &str, total: f64) {
        agg.overwrite_total(user, course, 0.0, 0, total).await.unwrap();
    }

    #[tokio::test]
    async fn test_rollup_sums_video_minutes() {
        let agg = aggregator();
        enroll(&agg, "u1", "c1", 50.0).await;

        agg.apply_video_update("u1", "c1", "v1", 10.0, 50).await.unwrap();
        agg.apply_video_update("u1", "c1", "v2", 20.0, 100).await.unwrap();
        let outcome = agg.apply_video_update("u1", "c1", "v3", 5.0, 25).await.unwrap();

        let rollup = outcome.aggregate.unwrap();
        assert_eq!(rollup.completed_minutes, 35.0);
        assert_eq!(rollup.percentage, 70);
        assert_eq!(rollup.status, CourseStatus::InProgress);
    }

    #[tokio::test]
    async fn test_video_update_is_idempotent() {
        let agg = aggregator();
        enroll(&agg, "u1", "c1", 100.0).await;

        let first = agg.apply_video_update("u1", "c1", "v1", 40.0, 80).await.unwrap();
        let second = agg.apply_video_update("u1", "c1", "v1", 40.0, 80).await.unwrap();

        let a = first.aggregate.unwrap();
        let b = second.aggregate.unwrap();
        assert_eq!(a.completed_minutes, b.completed_minutes);
        assert_eq!(a.percentage, b.percentage);
        assert_eq!(a.status, b.status);
        assert_eq!(
            first.video.watch_history.len(),
            second.video.watch_history.len()
        );
    }

    #[tokio::test]
    async fn test_video_update_without_enrollment_skips_aggregate() {
        let agg = aggregator();

        let outcome = agg.apply_video_update("u1", "c1", "v1", 10.0, 20).await.unwrap();
        assert!(outcome.aggregate.is_none());
        assert_eq!(outcome.video.completed_minutes, 10.0);
    }

    #[tokio::test]
    async fn test_rollup_caps_at_course_duration() {
        let agg = aggregator();
        enroll(&agg, "u1", "c1", 100.0).await;

        agg.apply_video_update("u1", "c1", "v1", 60.0, 60).await.unwrap();
        let outcome = agg.apply_video_update("u1", "c1", "v2", 55.0, 100).await.unwrap();

        let rollup = outcome.aggregate.unwrap();
        assert_eq!(rollup.completed_minutes, 100.0);
        assert_eq!(rollup.percentage, 100);
        assert_eq!(rollup.status, CourseStatus::Completed);
    }

    #[tokio::test]
    async fn test_direct_increment_requires_enrollment() {
        let agg = aggregator();
        let err = agg.apply_direct_increment("u1", "c1", 10.0).await.unwrap_err();
        assert!(matches!(err, LecternError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_direct_increment_caps_at_total() {
        let agg = aggregator();
        enroll(&agg, "u1", "c1", 100.0).await;

        agg.apply_direct_increment("u1", "c1", 70.0).await.unwrap();
        let rollup = agg.apply_direct_increment("u1", "c1", 70.0).await.unwrap();

        assert_eq!(rollup.completed_minutes, 100.0);
        assert_eq!(rollup.percentage, 100);
        assert_eq!(rollup.status, CourseStatus::Completed);
    }

    #[tokio::test]
    async fn test_direct_increment_rejected_on_per_video_course() {
        let agg = aggregator();
        enroll(&agg, "u1", "c1", 100.0).await;
        agg.apply_video_update("u1", "c1", "v1", 10.0, 20).await.unwrap();

        let err = agg.apply_direct_increment("u1", "c1", 5.0).await.unwrap_err();
        assert!(matches!(err, LecternError::Validation(_)));
    }

    #[tokio::test]
    async fn test_video_update_rejected_on_direct_increment_course() {
        let agg = aggregator();
        enroll(&agg, "u1", "c1", 100.0).await;
        agg.apply_direct_increment("u1", "c1", 30.0).await.unwrap();

        let err = agg
            .apply_video_update("u1", "c1", "v1", 10.0, 20)
            .await
            .unwrap_err();
        assert!(matches!(err, LecternError::Validation(_)));
    }

    #[tokio::test]
    async fn test_reset_video_lowers_aggregate() {
        let agg = aggregator();
        enroll(&agg, "u1", "c1", 100.0).await;
        agg.apply_video_update("u1", "c1", "v1", 60.0, 100).await.unwrap();
        agg.apply_video_update("u1", "c1", "v2", 40.0, 100).await.unwrap();

        let outcome = agg.reset_video("u1", "c1", "v1").await.unwrap();

        assert_eq!(outcome.video.completed_minutes, 0.0);
        let rollup = outcome.aggregate.unwrap();
        assert_eq!(rollup.completed_minutes, 40.0);
        assert_eq!(rollup.percentage, 40);
        assert_eq!(rollup.status, CourseStatus::InProgress);
    }

    #[tokio::test]
    async fn test_reset_unknown_video_not_found() {
        let agg = aggregator();
        enroll(&agg, "u1", "c1", 100.0).await;

        let err = agg.reset_video("u1", "c1", "ghost").await.unwrap_err();
        assert!(matches!(err, LecternError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_out_of_range_input() {
        let agg = aggregator();
        enroll(&agg, "u1", "c1", 100.0).await;

        assert!(matches!(
            agg.apply_video_update("u1", "c1", "v1", -1.0, 50).await,
            Err(LecternError::Validation(_))
        ));
        assert!(matches!(
            agg.apply_video_update("u1", "c1", "v1", 1.0, 101).await,
            Err(LecternError::Validation(_))
        ));
        assert!(matches!(
            agg.apply_video_update("u1", "c1", "", 1.0, 50).await,
            Err(LecternError::Validation(_))
        ));
        assert!(matches!(
            agg.apply_direct_increment("u1", "c1", -0.5).await,
            Err(LecternError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_overwrite_clamps_and_derives() {
        let agg = aggregator();

        let rollup = agg
            .overwrite_total("u1", "c1", 500.0, 150, 100.0)
            .await
            .unwrap();
        assert_eq!(rollup.completed_minutes, 100.0);
        assert_eq!(rollup.percentage, 100);
        assert_eq!(rollup.status, CourseStatus::Completed);

        // Overwrite can also shrink an existing aggregate
        let rollup = agg.overwrite_total("u1", "c1", 0.0, 0, 80.0).await.unwrap();
        assert_eq!(rollup.total_minutes, 80.0);
        assert_eq!(rollup.status, CourseStatus::NotStarted);
    }
}
