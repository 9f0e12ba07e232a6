//! HTTP routes for certificates
//!
//! - GET   /api/certificates/eligibility?userId=&courseId=
//! - POST  /api/certificates/generate
//! - POST  /api/certificates/retry-upload
//! - GET   /api/certificates?userId=
//! - GET   /api/certificates/verify/{code}   (public)
//! - PATCH /api/certificates/revoke/{id}     (admin)

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::certificate::issuer::{ArtifactStatus, IssueOutcome, IssueRequest};
use crate::db::schemas::CertificateDoc;
use crate::routes::{error_response, json_response, parse_json_body, query_param, ErrorBody};
use crate::server::AppState;
use crate::services::notifier::Notifier;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub user_id: String,
    pub course_id: String,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub course_title: Option<String>,
    #[serde(default)]
    pub recipient_email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryUploadRequest {
    pub certificate_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateBody {
    pub id: String,
    pub certificate_number: String,
    pub student_name: String,
    pub course_title: String,
    pub completion_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_url: Option<String>,
    pub verification_code: String,
    pub is_valid: bool,
    pub is_existing: bool,
}

impl CertificateBody {
    pub fn from_doc(certificate: &CertificateDoc, existing: bool) -> Self {
        Self {
            id: certificate._id.map(|id| id.to_hex()).unwrap_or_default(),
            certificate_number: certificate.certificate_number.clone(),
            student_name: certificate.student_name.clone(),
            course_title: certificate.course_title.clone(),
            completion_date: certificate.completion_date.to_chrono().to_rfc3339(),
            certificate_url: certificate.certificate_url.clone(),
            verification_code: certificate.verification_code.clone(),
            is_valid: certificate.is_valid,
            is_existing: existing,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactBody {
    pub uploaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ArtifactBody {
    fn from_status(artifact: &ArtifactStatus) -> Self {
        match artifact {
            ArtifactStatus::Uploaded { url } => Self {
                uploaded: true,
                url: Some(url.clone()),
                retryable_step: None,
                error: None,
            },
            ArtifactStatus::Pending { step, error } => Self {
                uploaded: false,
                url: None,
                retryable_step: Some(step.to_string()),
                error: Some(error.clone()),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueResponse {
    pub success: bool,
    pub message: String,
    pub certificate: CertificateBody,
    pub artifact: ArtifactBody,
}

impl IssueResponse {
    fn from_outcome(outcome: &IssueOutcome) -> Self {
        Self {
            success: true,
            message: if outcome.existing {
                "Certificate already exists".into()
            } else {
                "Certificate generated successfully".into()
            },
            certificate: CertificateBody::from_doc(&outcome.certificate, outcome.existing),
            artifact: ArtifactBody::from_status(&outcome.artifact),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityResponse {
    pub success: bool,
    pub eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<CertificateBody>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateListResponse {
    pub success: bool,
    pub count: usize,
    pub certificates: Vec<CertificateBody>,
}

/// Public verification view; never reveals internal identifiers
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedCertificate {
    pub certificate_number: String,
    pub student_name: String,
    pub course_title: String,
    pub completion_date: String,
    pub issue_date: String,
    pub total_course_duration: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub success: bool,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<VerifiedCertificate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokedBody {
    pub certificate_id: String,
    pub certificate_number: String,
    pub student_name: String,
    pub course_title: String,
    pub revoked_at: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeResponse {
    pub success: bool,
    pub message: String,
    pub revoked: RevokedBody,
}

// =============================================================================
// Notification
// =============================================================================

/// Best-effort issuance notification; failures are logged, never propagated
pub(crate) async fn notify_certificate_issued(
    notifier: Arc<dyn Notifier>,
    recipient: String,
    certificate: CertificateDoc,
) {
    if !notifier.is_configured() {
        return;
    }

    let subject = format!("Your certificate for \"{}\"", certificate.course_title);
    let download = certificate
        .certificate_url
        .as_deref()
        .unwrap_or("(artifact still being prepared)");
    let body = format!(
        "Congratulations! Your certificate for \"{}\" is ready.\n\n\
         Certificate Details:\n\
         - Certificate Number: {}\n\
         - Completion Date: {}\n\
         - Verification Code: {}\n\n\
         Download your certificate: {}\n",
        certificate.course_title,
        certificate.certificate_number,
        certificate.completion_date.to_chrono().format("%B %d, %Y"),
        certificate.verification_code,
        download,
    );

    if let Err(err) = notifier.send(&recipient, &subject, &body).await {
        warn!(
            certificate = %certificate.certificate_number,
            error = %err,
            "certificate notification failed"
        );
    }
}

// =============================================================================
// Route Handlers
// =============================================================================

/// GET /api/certificates/eligibility?userId=&courseId=
pub async fn handle_eligibility(
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

    use crate::certificate::eligibility::Eligibility;
    match state.eligibility.check(&user_id, &course_id).await {
        Ok(Eligibility::Eligible { .. }) => json_response(
            StatusCode::OK,
            &EligibilityResponse {
                success: true,
                eligible: true,
                reason: None,
                certificate: None,
            },
        ),
        Ok(Eligibility::Ineligible {
            reason,
            certificate,
        }) => json_response(
            StatusCode::OK,
            &EligibilityResponse {
                success: true,
                eligible: false,
                reason: Some(reason.to_string()),
                certificate: certificate
                    .as_ref()
                    .map(|c| CertificateBody::from_doc(c, true)),
            },
        ),
        Err(e) => error_response(&e, state.args.dev_mode),
    }
}

/// POST /api/certificates/generate
pub async fn handle_generate(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<Full<Bytes>> {
    let body: GenerateRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e, state.args.dev_mode),
    };

    let request = IssueRequest {
        student_name: body.student_name,
        course_title: body.course_title,
    };

    match state
        .issuer
        .issue(&body.user_id, &body.course_id, request)
        .await
    {
        Ok(outcome) => {
            // Non-blocking best-effort side effect
            if !outcome.existing {
                if let Some(recipient) = body.recipient_email {
                    tokio::spawn(notify_certificate_issued(
                        state.notifier.clone(),
                        recipient,
                        outcome.certificate.clone(),
                    ));
                }
            }

            let status = if outcome.existing {
                StatusCode::OK
            } else {
                StatusCode::CREATED
            };
            json_response(status, &IssueResponse::from_outcome(&outcome))
        }
        Err(e) => error_response(&e, state.args.dev_mode),
    }
}

/// POST /api/certificates/retry-upload
pub async fn handle_retry_upload(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<Full<Bytes>> {
    let body: RetryUploadRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e, state.args.dev_mode),
    };

    match state.issuer.retry_upload(&body.certificate_id).await {
        Ok(outcome) => json_response(StatusCode::OK, &IssueResponse::from_outcome(&outcome)),
        Err(e) => error_response(&e, state.args.dev_mode),
    }
}

/// GET /api/certificates?userId=
pub async fn handle_list(req: Request<Incoming>, state: Arc<AppState>) -> Response<Full<Bytes>> {
    let Some(user_id) = query_param(&req, "userId") else {
        return json_response(
            StatusCode::BAD_REQUEST,
            &ErrorBody {
                success: false,
                message: "userId query parameter is required".into(),
            },
        );
    };

    match state.certificates.list_valid_for_user(&user_id).await {
        Ok(certificates) => {
            let certificates: Vec<CertificateBody> = certificates
                .iter()
                .map(|c| CertificateBody::from_doc(c, true))
                .collect();
            json_response(
                StatusCode::OK,
                &CertificateListResponse {
                    success: true,
                    count: certificates.len(),
                    certificates,
                },
            )
        }
        Err(e) => error_response(&e, state.args.dev_mode),
    }
}

/// GET /api/certificates/verify/{code}
///
/// Public, unauthenticated lookup by verification code. Revoked or unknown
/// codes answer "not found"; the response never carries internal IDs.
pub async fn handle_verify(code: &str, state: Arc<AppState>) -> Response<Full<Bytes>> {
    let code = code.trim().to_uppercase();
    if code.is_empty() {
        return json_response(
            StatusCode::BAD_REQUEST,
            &ErrorBody {
                success: false,
                message: "verification code is required".into(),
            },
        );
    }

    match state.certificates.find_by_verification_code(&code).await {
        Ok(Some(certificate)) if certificate.is_valid => json_response(
            StatusCode::OK,
            &VerifyResponse {
                success: true,
                valid: true,
                certificate: Some(VerifiedCertificate {
                    certificate_number: certificate.certificate_number.clone(),
                    student_name: certificate.student_name.clone(),
                    course_title: certificate.course_title.clone(),
                    completion_date: certificate.completion_date.to_chrono().to_rfc3339(),
                    issue_date: certificate.issue_date.to_chrono().to_rfc3339(),
                    total_course_duration: certificate.total_course_duration,
                }),
                message: None,
            },
        ),
        Ok(_) => json_response(
            StatusCode::NOT_FOUND,
            &VerifyResponse {
                success: false,
                valid: false,
                certificate: None,
                message: Some("certificate not found or invalid".into()),
            },
        ),
        Err(e) => error_response(&e, state.args.dev_mode),
    }
}

/// PATCH /api/certificates/revoke/{id}
pub async fn handle_revoke(
    req: Request<Incoming>,
    certificate_id: String,
    state: Arc<AppState>,
) -> Response<Full<Bytes>> {
    let body: RevokeRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(&e, state.args.dev_mode),
    };

    match state.lifecycle.revoke(&certificate_id, &body.reason).await {
        Ok(revoked) => json_response(
            StatusCode::OK,
            &RevokeResponse {
                success: true,
                message: "Certificate revoked".into(),
                revoked: RevokedBody {
                    certificate_id,
                    certificate_number: revoked.certificate.certificate_number.clone(),
                    student_name: revoked.certificate.student_name.clone(),
                    course_title: revoked.certificate.course_title.clone(),
                    revoked_at: revoked.revoked_at.to_chrono().to_rfc3339(),
                    reason: revoked.reason.clone(),
                },
            },
        ),
        Err(e) => error_response(&e, state.args.dev_mode),
    }
}
