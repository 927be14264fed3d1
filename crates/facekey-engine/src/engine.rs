use crate::context::FaceKeyContext;
use crate::enroll::{enroll, EnrollmentResult};
use crate::error::FaceKeyError;
use crate::verify::{verify_by_embedding, verify_by_image, Verification};
use facekey_core::{AnalyzerFactory, FaceAnalyzer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Requests queued per worker before senders start waiting.
const QUEUE_DEPTH: usize = 4;

/// Messages sent from callers to a worker thread.
enum EngineRequest {
    Enroll {
        username: String,
        image: Vec<u8>,
        reply: oneshot::Sender<Result<EnrollmentResult, FaceKeyError>>,
    },
    VerifyByEmbedding {
        username: String,
        image: Vec<u8>,
        threshold: Option<f32>,
        reply: oneshot::Sender<Result<Verification, FaceKeyError>>,
    },
    VerifyByImage {
        username: String,
        image: Vec<u8>,
        threshold: Option<f32>,
        reply: oneshot::Sender<Result<Verification, FaceKeyError>>,
    },
}

/// Clone-safe handle to the worker pool.
#[derive(Clone)]
pub struct EngineHandle {
    senders: Arc<[mpsc::Sender<EngineRequest>]>,
    next: Arc<AtomicUsize>,
}

impl EngineHandle {
    pub fn workers(&self) -> usize {
        self.senders.len()
    }

    pub async fn enroll(&self, username: &str, image: Vec<u8>) -> Result<EnrollmentResult, FaceKeyError> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(EngineRequest::Enroll {
            username: username.to_string(),
            image,
            reply,
        })
        .await?;
        rx.await.map_err(|_| closed())?
    }

    pub async fn verify_by_embedding(
        &self,
        username: &str,
        image: Vec<u8>,
        threshold: Option<f32>,
    ) -> Result<Verification, FaceKeyError> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(EngineRequest::VerifyByEmbedding {
            username: username.to_string(),
            image,
            threshold,
            reply,
        })
        .await?;
        rx.await.map_err(|_| closed())?
    }

    pub async fn verify_by_image(
        &self,
        username: &str,
        image: Vec<u8>,
        threshold: Option<f32>,
    ) -> Result<Verification, FaceKeyError> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(EngineRequest::VerifyByImage {
            username: username.to_string(),
            image,
            threshold,
            reply,
        })
        .await?;
        rx.await.map_err(|_| closed())?
    }

    async fn dispatch(&self, req: EngineRequest) -> Result<(), FaceKeyError> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.senders.len();
        self.senders[idx].send(req).await.map_err(|_| closed())
    }
}

fn closed() -> FaceKeyError {
    FaceKeyError::Engine("worker thread exited".into())
}

/// Spawn `workers` OS threads, each owning its own analyzer.
///
/// All analyzers are created before any thread starts, so a missing model
/// fails the whole pool at startup. Workers exit once every handle is
/// dropped.
pub fn spawn_engine(
    factory: &dyn AnalyzerFactory,
    ctx: FaceKeyContext,
    workers: usize,
) -> Result<EngineHandle, FaceKeyError> {
    let workers = workers.max(1);
    let analyzers = (0..workers)
        .map(|_| factory.create())
        .collect::<Result<Vec<_>, _>>()?;
    tracing::info!(workers, descriptor_len = factory.descriptor_len(), "face analyzers loaded");

    let mut senders = Vec::with_capacity(workers);
    for (id, analyzer) in analyzers.into_iter().enumerate() {
        let (tx, rx) = mpsc::channel::<EngineRequest>(QUEUE_DEPTH);
        let ctx = ctx.clone();
        std::thread::Builder::new()
            .name(format!("facekey-worker-{id}"))
            .spawn(move || run_worker(id, ctx, analyzer, rx))
            .map_err(|e| FaceKeyError::Engine(format!("failed to spawn worker {id}: {e}")))?;
        senders.push(tx);
    }

    Ok(EngineHandle {
        senders: senders.into(),
        next: Arc::new(AtomicUsize::new(0)),
    })
}

fn run_worker(
    id: usize,
    ctx: FaceKeyContext,
    mut analyzer: Box<dyn FaceAnalyzer>,
    mut rx: mpsc::Receiver<EngineRequest>,
) {
    tracing::debug!(worker = id, "worker started");
    while let Some(req) = rx.blocking_recv() {
        match req {
            EngineRequest::Enroll { username, image, reply } => {
                let result = enroll(&ctx, analyzer.as_mut(), &username, &image);
                if let Err(e) = &result {
                    tracing::warn!(worker = id, username, error = %e, "enrollment failed");
                }
                let _ = reply.send(result);
            }
            EngineRequest::VerifyByEmbedding { username, image, threshold, reply } => {
                let result = verify_by_embedding(&ctx, analyzer.as_mut(), &username, &image, threshold);
                let _ = reply.send(result);
            }
            EngineRequest::VerifyByImage { username, image, threshold, reply } => {
                let result = verify_by_image(&ctx, analyzer.as_mut(), &username, &image, threshold);
                let _ = reply.send(result);
            }
        }
    }
    tracing::debug!(worker = id, "worker exiting");
}
