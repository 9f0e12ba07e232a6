//! Certificate eligibility
//!
//! Decides whether a user may receive a certificate for a course. Fails
//! closed: anything short of a fully completed aggregate is ineligible,
//! and an existing valid certificate is returned for reference rather
//! than treated as an error.

use std::sync::Arc;

use crate::db::schemas::{CertificateDoc, CourseProgressDoc, CourseStatus};
use crate::certificate::store::CertificateStore;
use crate::progress::store::ProgressStore;
use crate::types::{LecternError, Result};

/// Why a user is not (yet) eligible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IneligibleReason {
    /// No progress aggregate exists for the pair
    NoProgress,
    /// Aggregate status is not `completed`
    NotCompleted,
    /// Aggregate percentage is below 100
    BelowFull,
    /// A valid certificate already exists
    AlreadyCertified,
}

impl std::fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IneligibleReason::NoProgress => write!(f, "no progress found"),
            IneligibleReason::NotCompleted => write!(f, "course not completed"),
            IneligibleReason::BelowFull => write!(f, "course progress below 100%"),
            IneligibleReason::AlreadyCertified => write!(f, "valid certificate already exists"),
        }
    }
}

/// Outcome of an eligibility check
#[derive(Debug, Clone)]
pub enum Eligibility {
    /// Issuance may proceed; carries the completed aggregate for snapshotting
    Eligible { progress: CourseProgressDoc },
    /// Issuance must not create a new certificate; `certificate` carries the
    /// existing one when the reason is `AlreadyCertified`
    Ineligible {
        reason: IneligibleReason,
        certificate: Option<CertificateDoc>,
    },
}

/// Eligibility decision function over progress and certificate state
#[derive(Clone)]
pub struct CertificateEligibility {
    progress: Arc<dyn ProgressStore>,
    certificates: Arc<dyn CertificateStore>,
}

impl CertificateEligibility {
    pub fn new(progress: Arc<dyn ProgressStore>, certificates: Arc<dyn CertificateStore>) -> Self {
        Self {
            progress,
            certificates,
        }
    }

    /// Check whether `user_id` may receive a certificate for `course_id`.
    ///
    /// Runs before every issuance attempt; issuance never bypasses it.
    pub async fn check(&self, user_id: &str, course_id: &str) -> Result<Eligibility> {
        if user_id.trim().is_empty() || course_id.trim().is_empty() {
            return Err(LecternError::Validation(
                "userId and courseId must not be empty".into(),
            ));
        }

        let Some(progress) = self.progress.find(user_id, course_id).await? else {
            return Ok(Eligibility::Ineligible {
                reason: IneligibleReason::NoProgress,
                certificate: None,
            });
        };

        if progress.status != CourseStatus::Completed {
            return Ok(Eligibility::Ineligible {
                reason: IneligibleReason::NotCompleted,
                certificate: None,
            });
        }

        if progress.percentage < 100 {
            return Ok(Eligibility::Ineligible {
                reason: IneligibleReason::BelowFull,
                certificate: None,
            });
        }

        if let Some(existing) = self.certificates.find_valid(user_id, course_id).await? {
            return Ok(Eligibility::Ineligible {
                reason: IneligibleReason::AlreadyCertified,
                certificate: Some(existing),
            });
        }

        Ok(Eligibility::Eligible { progress })
    }
}
