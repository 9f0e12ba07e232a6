//! External collaborator clients
//!
//! Narrow interfaces over the third-party services the core delegates to:
//! the blob store holding certificate artifacts and the outbound
//! notification webhook.

pub mod notifier;
pub mod storage;

pub use notifier::{Notifier, WebhookNotifier};
pub use storage::{HttpObjectStorage, ObjectStorage, StorageError, StoredObject};
