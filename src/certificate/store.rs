//! Certificate store trait and its MongoDB implementation

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, DateTime};

use crate::db::schemas::CertificateDoc;
use crate::db::MongoCollection;
use crate::types::{LecternError, Result};

/// Persisted certificate records
///
/// `insert` must surface unique-index violations as `Conflict`: the partial
/// unique index on valid (user, course) pairs is the arbiter of the
/// at-most-once issuance race, and the caller resolves a conflict by
/// re-reading current state.
#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// Find the valid certificate for a user-course pair, if any
    async fn find_valid(&self, user_id: &str, course_id: &str) -> Result<Option<CertificateDoc>>;

    /// Find a certificate by its record id
    async fn find_by_id(&self, certificate_id: &str) -> Result<Option<CertificateDoc>>;

    /// Find a certificate by its public verification code
    async fn find_by_verification_code(&self, code: &str) -> Result<Option<CertificateDoc>>;

    /// List all valid certificates held by a user
    async fn list_valid_for_user(&self, user_id: &str) -> Result<Vec<CertificateDoc>>;

    /// Count certificates created within `[start, end)`
    async fn count_created_between(&self, start: DateTime, end: DateTime) -> Result<u64>;

    /// Persist a new certificate; `Conflict` on any unique-index violation
    async fn insert(&self, certificate: CertificateDoc) -> Result<CertificateDoc>;

    /// Invalidate all currently-valid certificates for a pair, recording the
    /// reason; returns how many records were invalidated
    async fn invalidate_valid(&self, user_id: &str, course_id: &str, reason: &str) -> Result<u64>;

    /// Record the artifact URL after a successful upload
    async fn set_certificate_url(&self, certificate_id: &str, url: &str) -> Result<()>;

    /// Mark one certificate revoked with a reason and timestamp
    async fn mark_revoked(&self, certificate_id: &str, reason: &str) -> Result<()>;
}

fn parse_object_id(certificate_id: &str) -> Result<ObjectId> {
    ObjectId::parse_str(certificate_id).map_err(|_| {
        LecternError::Validation(format!("invalid certificate id '{certificate_id}'"))
    })
}

/// MongoDB-backed [`CertificateStore`]
#[derive(Clone)]
pub struct MongoCertificateStore {
    collection: MongoCollection<CertificateDoc>,
}

impl MongoCertificateStore {
    pub fn new(collection: MongoCollection<CertificateDoc>) -> Self {
        Self { collection }
    }
}

#[async_trait]
impl CertificateStore for MongoCertificateStore {
    async fn find_valid(&self, user_id: &str, course_id: &str) -> Result<Option<CertificateDoc>> {
        self.collection
            .find_one(doc! {
                "user_id": user_id,
                "course_id": course_id,
                "is_valid": true,
            })
            .await
    }

    async fn find_by_id(&self, certificate_id: &str) -> Result<Option<CertificateDoc>> {
        let id = parse_object_id(certificate_id)?;
        self.collection.find_one(doc! { "_id": id }).await
    }

    async fn find_by_verification_code(&self, code: &str) -> Result<Option<CertificateDoc>> {
        self.collection
            .find_one(doc! { "verification_code": code })
            .await
    }

    async fn list_valid_for_user(&self, user_id: &str) -> Result<Vec<CertificateDoc>> {
        self.collection
            .find_many(doc! { "user_id": user_id, "is_valid": true })
            .await
    }

    async fn count_created_between(&self, start: DateTime, end: DateTime) -> Result<u64> {
        self.collection
            .count_documents(doc! {
                "metadata.created_at": { "$gte": start, "$lt": end },
            })
            .await
    }

    async fn insert(&self, mut certificate: CertificateDoc) -> Result<CertificateDoc> {
        let id = self.collection.insert_one(certificate.clone()).await?;
        certificate._id = Some(id);
        Ok(certificate)
    }

    async fn invalidate_valid(&self, user_id: &str, course_id: &str, reason: &str) -> Result<u64> {
        let result = self
            .collection
            .update_many(
                doc! { "user_id": user_id, "course_id": course_id, "is_valid": true },
                doc! {
                    "$set": {
                        "is_valid": false,
                        "revoked_at": DateTime::now(),
                        "revocation_reason": reason,
                        "metadata.updated_at": DateTime::now(),
                    }
                },
            )
            .await?;
        Ok(result.modified_count)
    }

    async fn set_certificate_url(&self, certificate_id: &str, url: &str) -> Result<()> {
        let id = parse_object_id(certificate_id)?;
        self.collection
            .update_one(
                doc! { "_id": id },
                doc! {
                    "$set": {
                        "certificate_url": url,
                        "metadata.updated_at": DateTime::now(),
                    }
                },
            )
            .await?;
        Ok(())
    }

    async fn mark_revoked(&self, certificate_id: &str, reason: &str) -> Result<()> {
        let id = parse_object_id(certificate_id)?;
        self.collection
            .update_one(
                doc! { "_id": id },
                doc! {
                    "$set": {
                        "is_valid": false,
                        "revoked_at": DateTime::now(),
                        "revocation_reason": reason,
                        "metadata.updated_at": DateTime::now(),
                    }
                },
            )
            .await?;
        Ok(())
    }
}
