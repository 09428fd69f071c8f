use reface_core::runner::SwapToolError;
use reface_core::{FaceSwapTool, SwapJob, SwapOutcome};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("tool error: {0}")]
    Tool(#[from] SwapToolError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Swap {
        job: SwapJob,
        reply: oneshot::Sender<Result<SwapOutcome, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Run one swap job through the tool. Jobs are processed one at a
    /// time in submission order.
    pub async fn swap(&self, job: SwapJob) -> Result<SwapOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Swap {
                job,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the tool and serializes invocations: the external
/// program is GPU-bound and must never run twice concurrently. The handle
/// is the only way in.
pub fn spawn_engine(tool: Box<dyn FaceSwapTool + Send>) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("reface-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Swap { job, reply } => {
                        let result = tool.swap(&job).map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}
