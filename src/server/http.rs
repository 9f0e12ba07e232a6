//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Each connection is
//! served on its own task; handlers run to completion per request with no
//! internal fan-out.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::certificate::{
    CertificateEligibility, CertificateIssuer, CertificateLifecycle, CertificateStore,
    MongoCertificateStore,
};
use crate::config::Args;
use crate::db::schemas::{
    HistoryPolicy, CERTIFICATE_COLLECTION, COURSE_PROGRESS_COLLECTION, VIDEO_PROGRESS_COLLECTION,
};
use crate::db::MongoClient;
use crate::progress::{
    MongoProgressStore, MongoVideoProgressStore, ProgressAggregator, ProgressStore,
    VideoProgressStore,
};
use crate::routes;
use crate::services::{HttpObjectStorage, Notifier, ObjectStorage, WebhookNotifier};
use crate::types::{LecternError, Result};

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Present in production; readiness degrades without it
    pub mongo: Option<MongoClient>,
    pub progress: Arc<dyn ProgressStore>,
    pub videos: Arc<dyn VideoProgressStore>,
    pub certificates: Arc<dyn CertificateStore>,
    pub notifier: Arc<dyn Notifier>,
    pub aggregator: ProgressAggregator,
    pub eligibility: CertificateEligibility,
    pub issuer: CertificateIssuer,
    pub lifecycle: CertificateLifecycle,
}

impl AppState {
    /// Create AppState backed by MongoDB collections
    pub async fn new(args: Args, mongo: MongoClient) -> Result<Self> {
        let progress_collection = mongo.collection(COURSE_PROGRESS_COLLECTION).await?;
        let video_collection = mongo.collection(VIDEO_PROGRESS_COLLECTION).await?;
        let certificate_collection = mongo.collection(CERTIFICATE_COLLECTION).await?;

        let progress: Arc<dyn ProgressStore> =
            Arc::new(MongoProgressStore::new(progress_collection));
        let videos: Arc<dyn VideoProgressStore> =
            Arc::new(MongoVideoProgressStore::new(video_collection));
        let certificates: Arc<dyn CertificateStore> =
            Arc::new(MongoCertificateStore::new(certificate_collection));

        let storage: Arc<dyn ObjectStorage> =
            Arc::new(HttpObjectStorage::new(args.storage_url.clone()));
        let notifier: Arc<dyn Notifier> = Arc::new(WebhookNotifier::new(
            args.notify_webhook_url.clone(),
            args.notify_sender.clone(),
        ));

        Ok(Self::assemble(
            args,
            Some(mongo),
            progress,
            videos,
            certificates,
            storage,
            notifier,
        ))
    }

    /// Create AppState over explicit store and collaborator implementations
    pub fn with_stores(
        args: Args,
        progress: Arc<dyn ProgressStore>,
        videos: Arc<dyn VideoProgressStore>,
        certificates: Arc<dyn CertificateStore>,
        storage: Arc<dyn ObjectStorage>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::assemble(args, None, progress, videos, certificates, storage, notifier)
    }

    fn assemble(
        args: Args,
        mongo: Option<MongoClient>,
        progress: Arc<dyn ProgressStore>,
        videos: Arc<dyn VideoProgressStore>,
        certificates: Arc<dyn CertificateStore>,
        storage: Arc<dyn ObjectStorage>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let history = HistoryPolicy {
            cap: args.watch_history_cap,
            materiality: args.watch_history_materiality,
        };

        let aggregator = ProgressAggregator::new(progress.clone(), videos.clone(), history);
        let eligibility = CertificateEligibility::new(progress.clone(), certificates.clone());
        let issuer = CertificateIssuer::new(
            certificates.clone(),
            eligibility.clone(),
            storage.clone(),
        );
        let lifecycle = CertificateLifecycle::new(certificates.clone(), storage);

        Self {
            args,
            mongo,
            progress,
            videos,
            certificates,
            notifier,
            aggregator,
            eligibility,
            issuer,
            lifecycle,
        }
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen)
        .await
        .map_err(|e| LecternError::Http(format!("Failed to bind {}: {}", state.args.listen, e)))?;

    info!("Lectern listening on {}", state.args.listen);

    if state.args.dev_mode {
        warn!("Development mode enabled - verbose error bodies");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        (Method::GET, "/health") | (Method::GET, "/healthz") => routes::health::health_check(&state),
        (Method::GET, "/ready") | (Method::GET, "/readyz") => {
            routes::health::readiness_check(&state).await
        }
        (Method::GET, "/version") => routes::health::version_info(),

        (Method::OPTIONS, _) => routes::preflight_response(),

        // Progress
        (Method::POST, "/api/progress/video") => {
            routes::progress::handle_video_progress(req, state).await
        }
        (Method::POST, "/api/progress/update") => {
            routes::progress::handle_direct_increment(req, state).await
        }
        (Method::POST, "/api/progress/overwrite") => {
            routes::progress::handle_overwrite(req, state).await
        }
        (Method::POST, "/api/progress/video/reset") => {
            routes::progress::handle_reset_video(req, state).await
        }
        (Method::GET, "/api/progress") => routes::progress::handle_get_progress(req, state).await,
        (Method::GET, "/api/progress/review") => {
            routes::progress::handle_progress_review(state).await
        }

        // Certificates
        (Method::GET, "/api/certificates") => routes::certificates::handle_list(req, state).await,
        (Method::GET, "/api/certificates/eligibility") => {
            routes::certificates::handle_eligibility(req, state).await
        }
        (Method::POST, "/api/certificates/generate") => {
            routes::certificates::handle_generate(req, state).await
        }
        (Method::POST, "/api/certificates/retry-upload") => {
            routes::certificates::handle_retry_upload(req, state).await
        }
        (Method::GET, p) if p.starts_with("/api/certificates/verify/") => {
            let code = p.trim_start_matches("/api/certificates/verify/").to_string();
            routes::certificates::handle_verify(&code, state).await
        }
        (Method::PATCH, p) if p.starts_with("/api/certificates/revoke/") => {
            let id = p.trim_start_matches("/api/certificates/revoke/").to_string();
            routes::certificates::handle_revoke(req, id, state).await
        }

        _ => routes::not_found(),
    };

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        MemoryCertificateStore, MemoryNotifier, MemoryProgressStore, MemoryStorage,
        MemoryVideoProgressStore,
    };
    use clap::Parser;

    fn test_state() -> Arc<AppState> {
        let mut args = Args::parse_from(["lectern"]);
        args.dev_mode = true;
        Arc::new(AppState::with_stores(
            args,
            Arc::new(MemoryProgressStore::default()),
            Arc::new(MemoryVideoProgressStore::default()),
            Arc::new(MemoryCertificateStore::default()),
            Arc::new(MemoryStorage::default()),
            Arc::new(MemoryNotifier::default()),
        ))
    }

    #[tokio::test]
    async fn test_probes_respond() {
        let state = test_state();

        let health = routes::health::health_check(&state);
        assert_eq!(health.status(), hyper::StatusCode::OK);

        // Dev mode without MongoDB still reports ready
        let ready = routes::health::readiness_check(&state).await;
        assert_eq!(ready.status(), hyper::StatusCode::OK);

        let version = routes::health::version_info();
        assert_eq!(version.status(), hyper::StatusCode::OK);
    }

    #[tokio::test]
    async fn test_state_wires_components_over_shared_stores() {
        let state = test_state();

        // The aggregator and eligibility read the same progress store
        state
            .aggregator
            .overwrite_total("u1", "c1", 100.0, 100, 100.0)
            .await
            .unwrap();

        let eligibility = state.eligibility.check("u1", "c1").await.unwrap();
        assert!(matches!(
            eligibility,
            crate::certificate::Eligibility::Eligible { .. }
        ));
    }
}
