//! Certificate document schema
//!
//! A certificate is an immutable snapshot of completion state at issuance
//! time. The partial unique index on (user_id, course_id) where
//! `is_valid: true` is the storage-layer arbiter of at-most-one valid
//! certificate per pair; unique indexes on the number and verification code
//! guard the public identifiers.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for certificates
pub const CERTIFICATE_COLLECTION: &str = "certificates";

/// Certificate document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CertificateDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at)
    #[serde(default)]
    pub metadata: Metadata,

    /// Learner the certificate was issued to
    pub user_id: String,

    /// Course the certificate covers
    pub course_id: String,

    /// Unique number, `CERT-<year><month>-<sequence>`, assigned once
    pub certificate_number: String,

    /// Public token proving authenticity without exposing internal IDs
    pub verification_code: String,

    /// Snapshot: learner display name at issuance
    pub student_name: String,

    /// Snapshot: course title at issuance
    pub course_title: String,

    /// Snapshot: when the course was completed
    pub completion_date: DateTime,

    /// Snapshot: course duration in minutes
    pub total_course_duration: f64,

    /// Snapshot: final score, 0..=100
    pub final_score: i32,

    /// URL of the rendered artifact; None until upload succeeds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_url: Option<String>,

    /// False after revocation or replacement
    pub is_valid: bool,

    /// When the certificate was revoked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime>,

    /// Why the certificate was revoked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revocation_reason: Option<String>,

    /// When the certificate was issued
    pub issue_date: DateTime,
}

impl IntoIndexes for CertificateDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // At most one valid certificate per user-course pair; the
            // partial filter leaves revoked records out of the constraint
            (
                doc! { "user_id": 1, "course_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .partial_filter_expression(doc! { "is_valid": true })
                        .name("valid_user_course_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "certificate_number": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("certificate_number_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "verification_code": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("verification_code_unique".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for CertificateDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
