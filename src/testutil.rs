//! In-memory implementations of the store and collaborator traits.
//!
//! Only compiled for tests; unit tests drive the aggregation and
//! certificate logic against these instead of a running MongoDB.

use async_trait::async_trait;
use bson::{oid::ObjectId, DateTime};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::certificate::store::CertificateStore;
use crate::db::schemas::{CertificateDoc, CourseProgressDoc, Metadata, VideoProgressDoc};
use crate::progress::store::{ProgressStore, VideoProgressStore};
use crate::services::notifier::Notifier;
use crate::services::storage::{ObjectStorage, StorageError, StoredObject};
use crate::types::{DependencyStep, LecternError, Result};

#[derive(Default)]
pub struct MemoryProgressStore {
    records: Mutex<HashMap<(String, String), CourseProgressDoc>>,
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn find(&self, user_id: &str, course_id: &str) -> Result<Option<CourseProgressDoc>> {
        let records = self.records.lock().unwrap();
        Ok(records
            .get(&(user_id.to_string(), course_id.to_string()))
            .cloned())
    }

    async fn upsert(&self, mut progress: CourseProgressDoc) -> Result<CourseProgressDoc> {
        if progress._id.is_none() {
            progress._id = Some(ObjectId::new());
        }
        let mut records = self.records.lock().unwrap();
        records.insert(
            (progress.user_id.clone(), progress.course_id.clone()),
            progress.clone(),
        );
        Ok(progress)
    }

    async fn list_all(&self) -> Result<Vec<CourseProgressDoc>> {
        let records = self.records.lock().unwrap();
        Ok(records.values().cloned().collect())
    }
}

#[derive(Default)]
pub struct MemoryVideoProgressStore {
    records: Mutex<HashMap<(String, String, String), VideoProgressDoc>>,
}

#[async_trait]
impl VideoProgressStore for MemoryVideoProgressStore {
    async fn find(
        &self,
        user_id: &str,
        course_id: &str,
        video_id: &str,
    ) -> Result<Option<VideoProgressDoc>> {
        let records = self.records.lock().unwrap();
        Ok(records
            .get(&(
                user_id.to_string(),
                course_id.to_string(),
                video_id.to_string(),
            ))
            .cloned())
    }

    async fn list_for_course(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<Vec<VideoProgressDoc>> {
        let records = self.records.lock().unwrap();
        let mut videos: Vec<VideoProgressDoc> = records
            .values()
            .filter(|v| v.user_id == user_id && v.course_id == course_id)
            .cloned()
            .collect();
        videos.sort_by(|a, b| a.video_id.cmp(&b.video_id));
        Ok(videos)
    }

    async fn upsert(&self, mut video: VideoProgressDoc) -> Result<VideoProgressDoc> {
        if video._id.is_none() {
            video._id = Some(ObjectId::new());
        }
        let mut records = self.records.lock().unwrap();
        records.insert(
            (
                video.user_id.clone(),
                video.course_id.clone(),
                video.video_id.clone(),
            ),
            video.clone(),
        );
        Ok(video)
    }
}

#[derive(Default)]
pub struct MemoryCertificateStore {
    records: Mutex<Vec<CertificateDoc>>,
    // Injected just before the next insert to simulate losing the
    // at-most-once issuance race
    inject: Mutex<Option<(String, String, String)>>,
}

impl MemoryCertificateStore {
    fn build_valid(user_id: &str, course_id: &str, number: &str) -> CertificateDoc {
        CertificateDoc {
            _id: Some(ObjectId::new()),
            metadata: Metadata::new(),
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
            certificate_number: number.to_string(),
            verification_code: format!("CODE{number}"),
            student_name: user_id.to_string(),
            course_title: course_id.to_string(),
            completion_date: DateTime::now(),
            total_course_duration: 100.0,
            final_score: 100,
            certificate_url: None,
            is_valid: true,
            revoked_at: None,
            revocation_reason: None,
            issue_date: DateTime::now(),
        }
    }

    /// Seed a valid certificate for a pair
    pub fn seed_valid(&self, user_id: &str, course_id: &str, number: &str) {
        let mut records = self.records.lock().unwrap();
        records.push(Self::build_valid(user_id, course_id, number));
    }

    /// Arrange for a competing valid certificate to land immediately
    /// before the next `insert` call
    pub fn inject_before_insert(&self, user_id: &str, course_id: &str, number: &str) {
        let mut inject = self.inject.lock().unwrap();
        *inject = Some((
            user_id.to_string(),
            course_id.to_string(),
            number.to_string(),
        ));
    }
}

#[async_trait]
impl CertificateStore for MemoryCertificateStore {
    async fn find_valid(&self, user_id: &str, course_id: &str) -> Result<Option<CertificateDoc>> {
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .find(|c| c.is_valid && c.user_id == user_id && c.course_id == course_id)
            .cloned())
    }

    async fn find_by_id(&self, certificate_id: &str) -> Result<Option<CertificateDoc>> {
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .find(|c| {
                c._id
                    .map(|id| id.to_hex() == certificate_id)
                    .unwrap_or(false)
            })
            .cloned())
    }

    async fn find_by_verification_code(&self, code: &str) -> Result<Option<CertificateDoc>> {
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .find(|c| c.verification_code == code)
            .cloned())
    }

    async fn list_valid_for_user(&self, user_id: &str) -> Result<Vec<CertificateDoc>> {
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .filter(|c| c.is_valid && c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn count_created_between(&self, start: DateTime, end: DateTime) -> Result<u64> {
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .filter(|c| {
                c.metadata
                    .created_at
                    .map(|created| created >= start && created < end)
                    .unwrap_or(false)
            })
            .count() as u64)
    }

    async fn insert(&self, mut certificate: CertificateDoc) -> Result<CertificateDoc> {
        // Simulated race: a competing record lands first
        if let Some((user_id, course_id, number)) = self.inject.lock().unwrap().take() {
            let mut records = self.records.lock().unwrap();
            records.push(Self::build_valid(&user_id, &course_id, &number));
        }

        let mut records = self.records.lock().unwrap();

        // Enforce the same unique constraints the MongoDB indexes do
        if records.iter().any(|c| {
            c.is_valid && c.user_id == certificate.user_id && c.course_id == certificate.course_id
        }) {
            return Err(LecternError::Conflict(
                "duplicate key: valid_user_course_unique".into(),
            ));
        }
        if records
            .iter()
            .any(|c| c.certificate_number == certificate.certificate_number)
        {
            return Err(LecternError::Conflict(
                "duplicate key: certificate_number_unique".into(),
            ));
        }
        if records
            .iter()
            .any(|c| c.verification_code == certificate.verification_code)
        {
            return Err(LecternError::Conflict(
                "duplicate key: verification_code_unique".into(),
            ));
        }

        certificate._id = Some(ObjectId::new());
        if certificate.metadata.created_at.is_none() {
            certificate.metadata.created_at = Some(DateTime::now());
        }
        records.push(certificate.clone());
        Ok(certificate)
    }

    async fn invalidate_valid(&self, user_id: &str, course_id: &str, reason: &str) -> Result<u64> {
        let mut records = self.records.lock().unwrap();
        let mut invalidated = 0;
        for record in records
            .iter_mut()
            .filter(|c| c.is_valid && c.user_id == user_id && c.course_id == course_id)
        {
            record.is_valid = false;
            record.revoked_at = Some(DateTime::now());
            record.revocation_reason = Some(reason.to_string());
            invalidated += 1;
        }
        Ok(invalidated)
    }

    async fn set_certificate_url(&self, certificate_id: &str, url: &str) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        for record in records.iter_mut() {
            if record
                ._id
                .map(|id| id.to_hex() == certificate_id)
                .unwrap_or(false)
            {
                record.certificate_url = Some(url.to_string());
                return Ok(());
            }
        }
        Err(LecternError::NotFound(format!(
            "certificate '{certificate_id}' not found"
        )))
    }

    async fn mark_revoked(&self, certificate_id: &str, reason: &str) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        for record in records.iter_mut() {
            if record
                ._id
                .map(|id| id.to_hex() == certificate_id)
                .unwrap_or(false)
            {
                record.is_valid = false;
                record.revoked_at = Some(DateTime::now());
                record.revocation_reason = Some(reason.to_string());
                return Ok(());
            }
        }
        Err(LecternError::NotFound(format!(
            "certificate '{certificate_id}' not found"
        )))
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    uploads: Mutex<Vec<String>>,
    fail_uploads: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemoryStorage {
    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    fn is_configured(&self) -> bool {
        true
    }

    async fn upload(
        &self,
        _data: Vec<u8>,
        key: &str,
        _content_type: &str,
    ) -> std::result::Result<StoredObject, StorageError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::Status {
                status: 500,
                body: "simulated upload failure".into(),
            });
        }
        self.uploads.lock().unwrap().push(key.to_string());
        Ok(StoredObject {
            url: format!("memory://blobs/{key}"),
        })
    }

    async fn delete(&self, _key: &str) -> std::result::Result<(), StorageError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::Status {
                status: 500,
                body: "simulated delete failure".into(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<(String, String)>>,
    failures: AtomicUsize,
}

impl MemoryNotifier {
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Fail the next `count` send attempts
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    fn is_configured(&self) -> bool {
        true
    }

    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<()> {
        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(LecternError::Dependency {
                step: DependencyStep::Notify,
                message: "simulated notification failure".into(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string()));
        Ok(())
    }
}
