//! Certificate issuance and lifecycle
//!
//! Eligibility gates issuance on verified completion; the issuer owns
//! numbering and validity transitions; the lifecycle handles revocation.

pub mod eligibility;
pub mod issuer;
pub mod lifecycle;
pub mod pdf;
pub mod store;

pub use eligibility::{CertificateEligibility, Eligibility, IneligibleReason};
pub use issuer::{artifact_key, ArtifactStatus, CertificateIssuer, IssueOutcome, IssueRequest};
pub use lifecycle::{CertificateLifecycle, RevokedCertificate};
pub use pdf::render_certificate;
pub use store::{CertificateStore, MongoCertificateStore};
