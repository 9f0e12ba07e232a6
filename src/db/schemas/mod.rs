//! Database schemas for Lectern
//!
//! Defines MongoDB document structures for course progress, per-video watch
//! records, and certificates.

mod certificate;
mod course_progress;
mod metadata;
mod video_progress;

pub use certificate::{CertificateDoc, CERTIFICATE_COLLECTION};
pub use course_progress::{
    derive_percentage, CourseProgressDoc, CourseStatus, COURSE_PROGRESS_COLLECTION,
};
pub use metadata::Metadata;
pub use video_progress::{
    HistoryPolicy, VideoProgressDoc, WatchSample, VIDEO_PROGRESS_COLLECTION,
};
