//! Certificate revocation
//!
//! Revocation marks the record invalid with an audit trail; the stored
//! artifact is cleaned up best-effort. The record invalidation is the
//! source of truth, so a failed artifact delete is logged, never fatal.
//! Revoked is terminal: re-issuance is a fresh `CertificateIssuer::issue`
//! call, which finds no valid certificate and proceeds normally.

use bson::DateTime;
use std::sync::Arc;
use tracing::{info, warn};

use crate::certificate::issuer::artifact_key;
use crate::certificate::store::CertificateStore;
use crate::db::schemas::CertificateDoc;
use crate::services::storage::ObjectStorage;
use crate::types::{LecternError, Result};

/// Prior state returned from a revocation, for notification purposes
#[derive(Debug, Clone)]
pub struct RevokedCertificate {
    /// The certificate as it was before revocation
    pub certificate: CertificateDoc,
    pub revoked_at: DateTime,
    pub reason: String,
}

/// Handles revocation and replacement of certificates
pub struct CertificateLifecycle {
    certificates: Arc<dyn CertificateStore>,
    storage: Arc<dyn ObjectStorage>,
}

impl CertificateLifecycle {
    pub fn new(certificates: Arc<dyn CertificateStore>, storage: Arc<dyn ObjectStorage>) -> Self {
        Self {
            certificates,
            storage,
        }
    }

    /// Revoke a certificate by record id.
    ///
    /// NotFound when the certificate does not exist; Conflict when it is
    /// already invalid.
    pub async fn revoke(&self, certificate_id: &str, reason: &str) -> Result<RevokedCertificate> {
        let reason = if reason.trim().is_empty() {
            "revoked by administrator"
        } else {
            reason
        };

        let certificate = self
            .certificates
            .find_by_id(certificate_id)
            .await?
            .ok_or_else(|| {
                LecternError::NotFound(format!("certificate '{certificate_id}' not found"))
            })?;

        if !certificate.is_valid {
            return Err(LecternError::Conflict(format!(
                "certificate '{}' is already revoked",
                certificate.certificate_number
            )));
        }

        self.certificates
            .mark_revoked(certificate_id, reason)
            .await?;

        info!(
            certificate = %certificate.certificate_number,
            reason,
            "certificate revoked"
        );

        // Best-effort artifact cleanup
        if certificate.certificate_url.is_some() {
            let key = artifact_key(&certificate.certificate_number);
            if let Err(err) = self.storage.delete(&key).await {
                warn!(
                    certificate = %certificate.certificate_number,
                    error = %err,
                    "artifact delete failed after revocation"
                );
            }
        }

        Ok(RevokedCertificate {
            certificate,
            revoked_at: DateTime::now(),
            reason: reason.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::eligibility::CertificateEligibility;
    use crate::certificate::issuer::{CertificateIssuer, IssueRequest};
    use crate::progress::store::ProgressStore;
    use crate::testutil::{MemoryCertificateStore, MemoryProgressStore, MemoryStorage};

    struct Fixture {
        progress: Arc<MemoryProgressStore>,
        certificates: Arc<MemoryCertificateStore>,
        storage: Arc<MemoryStorage>,
        issuer: CertificateIssuer,
        lifecycle: CertificateLifecycle,
    }

    fn fixture() -> Fixture {
        let progress = Arc::new(MemoryProgressStore::default());
        let certificates = Arc::new(MemoryCertificateStore::default());
        let storage = Arc::new(MemoryStorage::default());
        let eligibility = CertificateEligibility::new(progress.clone(), certificates.clone());
        let issuer = CertificateIssuer::new(certificates.clone(), eligibility, storage.clone());
        let lifecycle = CertificateLifecycle::new(certificates.clone(), storage.clone());
        Fixture {
            progress,
            certificates,
            storage,
            issuer,
            lifecycle,
        }
    }

    async fn issued_certificate(fixture: &Fixture) -> CertificateDoc {
        let mut progress =
            crate::db::schemas::CourseProgressDoc::new("u1".into(), "c1".into(), 100.0);
        progress.set_completed_minutes(100.0);
        fixture.progress.upsert(progress).await.unwrap();
        fixture
            .issuer
            .issue("u1", "c1", IssueRequest::default())
            .await
            .unwrap()
            .certificate
    }

    #[tokio::test]
    async fn test_revoke_marks_invalid_with_reason() {
        let fixture = fixture();
        let certificate = issued_certificate(&fixture).await;
        let id = certificate._id.unwrap().to_hex();

        let revoked = fixture.lifecycle.revoke(&id, "academic misconduct").await.unwrap();

        assert_eq!(revoked.reason, "academic misconduct");
        assert_eq!(
            revoked.certificate.certificate_number,
            certificate.certificate_number
        );

        let stored = fixture.certificates.find_by_id(&id).await.unwrap().unwrap();
        assert!(!stored.is_valid);
        assert_eq!(
            stored.revocation_reason.as_deref(),
            Some("academic misconduct")
        );
        assert!(stored.revoked_at.is_some());

        // No valid certificate remains for the pair
        assert!(fixture
            .certificates
            .find_valid("u1", "c1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_revocation_is_terminal() {
        let fixture = fixture();
        let certificate = issued_certificate(&fixture).await;
        let id = certificate._id.unwrap().to_hex();

        fixture.lifecycle.revoke(&id, "test").await.unwrap();
        let err = fixture.lifecycle.revoke(&id, "again").await.unwrap_err();
        assert!(matches!(err, LecternError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_revoke_unknown_certificate() {
        let fixture = fixture();
        let err = fixture
            .lifecycle
            .revoke(&bson::oid::ObjectId::new().to_hex(), "test")
            .await
            .unwrap_err();
        assert!(matches!(err, LecternError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reissue_after_revocation_gets_new_number() {
        let fixture = fixture();
        let first = issued_certificate(&fixture).await;
        let id = first._id.unwrap().to_hex();

        fixture.lifecycle.revoke(&id, "replaced").await.unwrap();

        let second = fixture
            .issuer
            .issue("u1", "c1", IssueRequest::default())
            .await
            .unwrap();
        assert!(!second.existing);
        assert_ne!(
            second.certificate.certificate_number,
            first.certificate_number
        );
    }

    #[tokio::test]
    async fn test_artifact_delete_failure_is_not_fatal() {
        let fixture = fixture();
        let certificate = issued_certificate(&fixture).await;
        let id = certificate._id.unwrap().to_hex();
        fixture.storage.fail_deletes(true);

        let revoked = fixture.lifecycle.revoke(&id, "test").await.unwrap();
        assert!(!revoked.reason.is_empty());

        let stored = fixture.certificates.find_by_id(&id).await.unwrap().unwrap();
        assert!(!stored.is_valid);
    }

    #[tokio::test]
    async fn test_blank_reason_gets_default() {
        let fixture = fixture();
        let certificate = issued_certificate(&fixture).await;
        let id = certificate._id.unwrap().to_hex();

        let revoked = fixture.lifecycle.revoke(&id, "  ").await.unwrap();
        assert_eq!(revoked.reason, "revoked by administrator");
    }
}
