//! Certificate issuance
//!
//! Produces exactly one valid certificate per user-course pair. The
//! database record is durable before any artifact work begins: rendering
//! and upload run as two sequential steps afterwards, each reported
//! independently, so a failed collaborator call leaves a retryable
//! `pending` certificate rather than corrupting state.

use bson::DateTime as BsonDateTime;
use chrono::{Datelike, Local, TimeZone};
use rand::Rng;
use std::sync::Arc;
use tracing::{info, warn};

use crate::certificate::eligibility::{CertificateEligibility, Eligibility, IneligibleReason};
use crate::certificate::pdf::render_certificate;
use crate::certificate::store::CertificateStore;
use crate::db::schemas::{CertificateDoc, CourseProgressDoc, Metadata};
use crate::services::storage::{ObjectStorage, StorageError};
use crate::types::{DependencyStep, LecternError, Result};

/// Blob-store key for a certificate artifact
pub fn artifact_key(certificate_number: &str) -> String {
    format!("certificates/certificate-{certificate_number}.pdf")
}

/// Caller-provided snapshot fields for issuance.
///
/// Student and course identity live in external systems; the issuance
/// request may carry display values, falling back to the raw identifiers.
#[derive(Debug, Clone, Default)]
pub struct IssueRequest {
    pub student_name: Option<String>,
    pub course_title: Option<String>,
}

/// Outcome of the artifact step, reported independently of the record write
#[derive(Debug, Clone)]
pub enum ArtifactStatus {
    /// Render and upload both succeeded
    Uploaded { url: String },
    /// The named step failed; the certificate record stays durable and the
    /// step can be retried without re-creating the certificate
    Pending {
        step: DependencyStep,
        error: String,
    },
}

/// Result of an issuance attempt
#[derive(Debug, Clone)]
pub struct IssueOutcome {
    pub certificate: CertificateDoc,
    /// True when an existing valid certificate was returned unchanged
    pub existing: bool,
    pub artifact: ArtifactStatus,
}

/// Creates uniquely numbered, verifiable certificates
pub struct CertificateIssuer {
    certificates: Arc<dyn CertificateStore>,
    eligibility: CertificateEligibility,
    storage: Arc<dyn ObjectStorage>,
}

impl CertificateIssuer {
    pub fn new(
        certificates: Arc<dyn CertificateStore>,
        eligibility: CertificateEligibility,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            certificates,
            eligibility,
            storage,
        }
    }

    /// Issue a certificate for a completed course.
    ///
    /// Idempotent: an existing valid certificate is returned unchanged, with
    /// no duplicate creation and no artifact regeneration. Two concurrent
    /// calls resolve through the storage-layer unique constraint; the loser
    /// re-reads and returns the winner's certificate.
    pub async fn issue(
        &self,
        user_id: &str,
        course_id: &str,
        request: IssueRequest,
    ) -> Result<IssueOutcome> {
        if let Some(existing) = self.certificates.find_valid(user_id, course_id).await? {
            return Ok(outcome_for_existing(existing));
        }

        let progress = match self.eligibility.check(user_id, course_id).await? {
            Eligibility::Eligible { progress } => progress,
            Eligibility::Ineligible {
                reason: IneligibleReason::AlreadyCertified,
                certificate: Some(existing),
            } => return Ok(outcome_for_existing(existing)),
            Eligibility::Ineligible {
                reason: IneligibleReason::NoProgress,
                ..
            } => {
                return Err(LecternError::NotFound(format!(
                    "no progress record for user '{user_id}' in course '{course_id}'"
                )))
            }
            Eligibility::Ineligible { reason, .. } => {
                return Err(LecternError::Validation(format!(
                    "not eligible for a certificate: {reason}"
                )))
            }
        };

        self.create_certificate(user_id, course_id, progress, request)
            .await
    }

    /// Re-run the artifact step for an existing pending certificate.
    ///
    /// Keyed by certificate id; never creates a new record.
    pub async fn retry_upload(&self, certificate_id: &str) -> Result<IssueOutcome> {
        let certificate = self
            .certificates
            .find_by_id(certificate_id)
            .await?
            .ok_or_else(|| {
                LecternError::NotFound(format!("certificate '{certificate_id}' not found"))
            })?;

        if !certificate.is_valid {
            return Err(LecternError::Conflict(
                "certificate has been revoked; issue a new one instead".into(),
            ));
        }

        if certificate.certificate_url.is_some() {
            return Ok(outcome_for_existing(certificate));
        }

        let mut certificate = certificate;
        let artifact = self.render_and_upload(&certificate).await;
        if let ArtifactStatus::Uploaded { url } = &artifact {
            certificate.certificate_url = Some(url.clone());
        }

        Ok(IssueOutcome {
            certificate,
            existing: true,
            artifact,
        })
    }

    async fn create_certificate(
        &self,
        user_id: &str,
        course_id: &str,
        progress: CourseProgressDoc,
        request: IssueRequest,
    ) -> Result<IssueOutcome> {
        // Defensive: clear any stale valid records before inserting a
        // replacement. Normally a no-op after the short-circuit above.
        let invalidated = self
            .certificates
            .invalidate_valid(user_id, course_id, "replaced by new certificate")
            .await?;
        if invalidated > 0 {
            warn!(
                user_id,
                course_id, invalidated, "invalidated stale certificates before issuance"
            );
        }

        let now = Local::now();
        let (month_start, month_end) = month_window(&now)?;
        let issued_this_month = self
            .certificates
            .count_created_between(month_start, month_end)
            .await?;

        // Sequence scoped to the calendar month; the unique index on the
        // number is the final arbiter under concurrency.
        let certificate_number = format!(
            "CERT-{:04}{:02}-{:04}",
            now.year(),
            now.month(),
            issued_this_month + 1
        );
        let verification_code = generate_verification_code();

        let student_name = request
            .student_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| user_id.to_string());
        let course_title = request
            .course_title
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| course_id.to_string());

        let candidate = CertificateDoc {
            _id: None,
            metadata: Metadata::new(),
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
            certificate_number: certificate_number.clone(),
            verification_code,
            student_name,
            course_title,
            completion_date: progress.last_updated,
            total_course_duration: progress.total_minutes,
            final_score: 100,
            certificate_url: None,
            is_valid: true,
            revoked_at: None,
            revocation_reason: None,
            issue_date: BsonDateTime::now(),
        };

        let certificate = match self.certificates.insert(candidate).await {
            Ok(stored) => stored,
            Err(LecternError::Conflict(message)) => {
                // Lost the at-most-once race on the valid (user, course)
                // constraint: return the winner's certificate unchanged.
                if let Some(winner) = self.certificates.find_valid(user_id, course_id).await? {
                    info!(
                        user_id,
                        course_id,
                        certificate = %winner.certificate_number,
                        "concurrent issuance resolved to existing certificate"
                    );
                    return Ok(outcome_for_existing(winner));
                }
                // A number collision with no winning certificate means the
                // monthly sequence raced; surface it rather than skipping
                // numbers unnoticed.
                return Err(LecternError::Conflict(message));
            }
            Err(other) => return Err(other),
        };

        info!(
            user_id,
            course_id,
            certificate = %certificate.certificate_number,
            "certificate issued"
        );

        let mut certificate = certificate;
        let artifact = self.render_and_upload(&certificate).await;
        if let ArtifactStatus::Uploaded { url } = &artifact {
            certificate.certificate_url = Some(url.clone());
        }

        Ok(IssueOutcome {
            certificate,
            existing: false,
            artifact,
        })
    }

    /// Render the PDF and upload it, recording the URL on success.
    ///
    /// Never fails the issuance: any collaborator failure is folded into a
    /// `Pending` artifact status naming the retryable step.
    async fn render_and_upload(&self, certificate: &CertificateDoc) -> ArtifactStatus {
        let pdf = render_certificate(certificate);
        let key = artifact_key(&certificate.certificate_number);

        let stored = match self.storage.upload(pdf, &key, "application/pdf").await {
            Ok(stored) => stored,
            Err(StorageError::NotConfigured) => {
                warn!(
                    certificate = %certificate.certificate_number,
                    "object storage not configured, artifact stays pending"
                );
                return ArtifactStatus::Pending {
                    step: DependencyStep::Upload,
                    error: StorageError::NotConfigured.to_string(),
                };
            }
            Err(err) => {
                warn!(
                    certificate = %certificate.certificate_number,
                    error = %err,
                    "artifact upload failed, certificate stays pending"
                );
                return ArtifactStatus::Pending {
                    step: DependencyStep::Upload,
                    error: err.to_string(),
                };
            }
        };

        let certificate_id = certificate
            ._id
            .map(|id| id.to_hex())
            .unwrap_or_default();
        if let Err(err) = self
            .certificates
            .set_certificate_url(&certificate_id, &stored.url)
            .await
        {
            warn!(
                certificate = %certificate.certificate_number,
                error = %err,
                "artifact uploaded but URL not recorded"
            );
            return ArtifactStatus::Pending {
                step: DependencyStep::Upload,
                error: format!("uploaded but URL not recorded: {err}"),
            };
        }

        ArtifactStatus::Uploaded { url: stored.url }
    }
}

fn outcome_for_existing(certificate: CertificateDoc) -> IssueOutcome {
    let artifact = match &certificate.certificate_url {
        Some(url) => ArtifactStatus::Uploaded { url: url.clone() },
        None => ArtifactStatus::Pending {
            step: DependencyStep::Upload,
            error: "artifact not uploaded yet".into(),
        },
    };
    IssueOutcome {
        certificate,
        existing: true,
        artifact,
    }
}

/// Random 16-hex-character uppercase verification code
fn generate_verification_code() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill(&mut bytes[..]);
    hex::encode(bytes).to_uppercase()
}

/// `[start, end)` of the current calendar month in server-local time
fn month_window(now: &chrono::DateTime<Local>) -> Result<(BsonDateTime, BsonDateTime)> {
    let (year, month) = (now.year(), now.month());
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    Ok((
        local_month_start(year, month)?,
        local_month_start(next_year, next_month)?,
    ))
}

fn local_month_start(year: i32, month: u32) -> Result<BsonDateTime> {
    Local
        .with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .earliest()
        .map(|start| BsonDateTime::from_millis(start.timestamp_millis()))
        .ok_or_else(|| {
            LecternError::Config(format!("cannot resolve local month start {year}-{month:02}"))
        })
}
