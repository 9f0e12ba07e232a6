//! HTTP routes for progress tracking
//!
//! - POST /api/progress/video       - per-video watch report
//! - POST /api/progress/update      - direct minute increment
//! - POST /api/progress/overwrite   - enrollment/admin bulk set
//! - POST /api/progress/video/reset - zero one video record
//! - GET  /api/progress             - read one aggregate
//! - GET  /api/progress/review      - list all aggregates (admin)
//!
//! After any mutation that raises an aggregate to `completed`, the handler
//! explicitly attempts eligibility + issuance; a failed auto-issue is
//! logged and never fails the progress response.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::certificate::issuer::IssueRequest;
use crate::db::schemas::{CourseProgressDoc, CourseStatus, VideoProgressDoc};
use crate::routes::certificates::CertificateBody;
use crate::routes::{error_response, json_response, parse_json_body, query_param, ErrorBody};
use crate::server::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoProgressRequest {
    pub user_id: String,
    pub course_id: String,
    pub video_id: String,
    pub completed_minutes: f64,
    pub percentage: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectIncrementRequest {
    pub user_id: String,
    pub course_id: String,
    pub watched_minutes: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverwriteRequest {
    pub user_id: String,
    pub course_id: String,
    #[serde(default)]
    pub completed_minutes: f64,
    #[serde(default)]
    pub percentage: i32,
    pub total_minutes: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetVideoRequest {
    pub user_id: String,
    pub course_id: String,
    pub video_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressBody {
    pub user_id: String,
    pub course_id: String,
    pub completed_minutes: f64,
    pub total_minutes: f64,
    pub percentage: i32,
    pub status: String,
    pub last_updated: String,
}

impl ProgressBody {
    fn from_doc(progress: &CourseProgressDoc) -> Self {
        Self {
            user_id: progress.user_id.clone(),
            course_id: progress.course_id.clone(),
            completed_minutes: progress.completed_minutes,
            total_minutes: progress.total_minutes,
            percentage: progress.percentage,
            status: progress.status.to_string(),
            last_updated: progress.last_updated.to_chrono().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoBody {
    pub video_id: String,
    pub completed_minutes: f64,
    pub percentage: i32,
    pub last_watched: String,
    pub history_entries: usize,
}

impl VideoBody {
    fn from_doc(video: &VideoProgressDoc) -> Self {
        Self {
            video_id: video.video_id.clone(),
            completed_minutes: video.completed_minutes,
            percentage: video.percentage,
            last_watched: video.last_watched.to_chrono().to_rfc3339(),
            history_entries: video.watch_history.len(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<CertificateBody>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressListResponse {
    pub success: bool,
    pub count: usize,
    pub progress: Vec<ProgressBody>,
}

// =============================================================================
// Post-update hook
// =============================================================================

/// Attempt eligibility + issuance after a completing mutation.
///
/// Failures are logged, never surfaced to the progress caller.
async fn auto_issue(
    state: &Arc<AppState>,
    user_id: &str,
    course_id: &str,
) -> Option<CertificateBody> {
    match state
        .issuer
        .issue(user_id, course_id, IssueRequest::default())
        .await
    {
        Ok(outcome) => {
            if !outcome.existing {
                info!(
                    user_id,
                    course_id,
                    certificate = %outcome.certificate.certificate_number,
                    "certificate auto-issued on course completion"
                );
            }
            Some(CertificateBody::from_doc(
                &outcome.certificate,
                outcome.existing,
            ))
        }
        Err(err) => {
            warn!(
                user_id,
                course_id,
                error = %err,
                "auto issuance after completion failed"
            );
            None
        }
    }
}

async fn certificate_if_completed(
    state: &Arc<AppState>,
    aggregate: Option<&CourseProgressDoc>,
) -> Option<CertificateBody> {
    match aggregate {
        Some(progress) if progress.status == CourseStatus::Completed => {
            auto_issue(state, &progress.user_id, &progress.course_id).await
        }
        _ => None,
    }
}

// =============================================================================
// Route Handlers
// =============================================================================

/// POST /api/progress/video
pub async fn handle_video_progress(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<Full<Bytes>> {
    let body: VideoProgressRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e, state.args.dev_mode),
    };

    match state
        .aggregator
        .apply_video_update(
            &body.user_id,
            &body.course_id,
            &body.video_id,
            body.completed_minutes,
            body.percentage,
        )
        .await
    {
        Ok(outcome) => {
            let certificate = certificate_if_completed(&state, outcome.aggregate.as_ref()).await;
            json_response(
                StatusCode::OK,
                &ProgressResponse {
                    success: true,
                    message: "Progress updated".into(),
                    progress: outcome.aggregate.as_ref().map(ProgressBody::from_doc),
                    video: Some(VideoBody::from_doc(&outcome.video)),
                    certificate,
                },
            )
        }
        Err(e) => error_response(&e, state.args.dev_mode),
    }
}

/// POST /api/progress/update
pub async fn handle_direct_increment(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<Full<Bytes>> {
    let body: DirectIncrementRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e, state.args.dev_mode),
    };

    match state
        .aggregator
        .apply_direct_increment(&body.user_id, &body.course_id, body.watched_minutes)
        .await
    {
        Ok(progress) => {
            let certificate = certificate_if_completed(&state, Some(&progress)).await;
            json_response(
                StatusCode::OK,
                &ProgressResponse {
                    success: true,
                    message: "Progress updated".into(),
                    progress: Some(ProgressBody::from_doc(&progress)),
                    video: None,
                    certificate,
                },
            )
        }
        Err(e) => error_response(&e, state.args.dev_mode),
    }
}

/// POST /api/progress/overwrite
///
/// Enrollment/admin bulk-set path; the only path that creates an aggregate.
pub async fn handle_overwrite(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<Full<Bytes>> {
    let body: OverwriteRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e, state.args.dev_mode),
    };

    match state
        .aggregator
        .overwrite_total(
            &body.user_id,
            &body.course_id,
            body.completed_minutes,
            body.percentage,
            body.total_minutes,
        )
        .await
    {
        Ok(progress) => {
            let certificate = certificate_if_completed(&state, Some(&progress)).await;
            json_response(
                StatusCode::OK,
                &ProgressResponse {
                    success: true,
                    message: "Progress overwritten".into(),
                    progress: Some(ProgressBody::from_doc(&progress)),
                    video: None,
                    certificate,
                },
            )
        }
        Err(e) => error_response(&e, state.args.dev_mode),
    }
}

/// POST /api/progress/video/reset
pub async fn handle_reset_video(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<Full<Bytes>> {
    let body: ResetVideoRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e, state.args.dev_mode),
    };

    match state
        .aggregator
        .reset_video(&body.user_id, &body.course_id, &body.video_id)
        .await
    {
        Ok(outcome) => json_response(
            StatusCode::OK,
            &ProgressResponse {
                success: true,
                message: "Video progress reset".into(),
                progress: outcome.aggregate.as_ref().map(ProgressBody::from_doc),
                video: Some(VideoBody::from_doc(&outcome.video)),
                certificate: None,
            },
        ),
        Err(e) => error_response(&e, state.args.dev_mode),
    }
}

/// GET /api/progress?userId=&courseId=
pub async fn handle_get_progress(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<Full<Bytes>> {
    let (Some(user_id), Some(course_id)) =
        (query_param(&req, "userId"), query_param(&req, "courseId"))
    else {
        return json_response(
            StatusCode::BAD_REQUEST,
            &ErrorBody {
                success: false,
                message: "userId and courseId query parameters are required".into(),
            },
        );
    };

    match state.progress.find(&user_id, &course_id).await {
        Ok(Some(progress)) => json_response(
            StatusCode::OK,
            &ProgressResponse {
                success: true,
                message: "Progress found".into(),
                progress: Some(ProgressBody::from_doc(&progress)),
                video: None,
                certificate: None,
            },
        ),
        Ok(None) => json_response(
            StatusCode::NOT_FOUND,
            &ErrorBody {
                success: false,
                message: format!("no progress record for user '{user_id}' in course '{course_id}'"),
            },
        ),
        Err(e) => error_response(&e, state.args.dev_mode),
    }
}

/// GET /api/progress/review
pub async fn handle_progress_review(state: Arc<AppState>) -> Response<Full<Bytes>> {
    match state.progress.list_all().await {
        Ok(records) => {
            let progress: Vec<ProgressBody> = records.iter().map(ProgressBody::from_doc).collect();
            json_response(
                StatusCode::OK,
                &ProgressListResponse {
                    success: true,
                    count: progress.len(),
                    progress,
                },
            )
        }
        Err(e) => error_response(&e, state.args.dev_mode),
    }
}
