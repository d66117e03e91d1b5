use std::pin::Pin;

use tokio::sync::mpsc::error::TrySendError;

pub type Task = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A tokio runtime living on its own OS thread. Futures are handed over a channel and
/// spawned there, so callers never need to be inside a runtime themselves.
pub struct TokioThread {
    tokio: TokioHandle,
    _tokio_thread_handle: std::thread::JoinHandle<()>,
}
#[derive(Clone)]
pub struct TokioHandle(tokio::sync::mpsc::Sender<Task>);
impl TokioHandle {
    /// Hands `task` to the runtime thread without waiting. The task comes back if the
    /// queue is full or the thread has gone away.
    pub fn spawn(
        &self,
        task: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), TrySendError<Task>> {
        self.0.try_send(Box::pin(task))
    }
}
impl TokioThread {
    pub const QUEUE_CAPACITY: usize = 100;

    pub fn new() -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        let (tokio_tx, mut tokio_rx) = tokio::sync::mpsc::channel::<Task>(Self::QUEUE_CAPACITY);
        let tokio = TokioHandle(tokio_tx);

        let tokio_thread_handle = std::thread::Builder::new()
            .name("folio-tokio".to_string())
            .spawn(move || {
                runtime.block_on(async {
                    while let Some(task) = tokio_rx.recv().await {
                        tokio::spawn(task);
                    }
                });
            })?;

        Ok(Self {
            tokio,
            _tokio_thread_handle: tokio_thread_handle,
        })
    }

    pub fn handle(&self) -> TokioHandle {
        self.tokio.clone()
    }

    pub fn spawn(
        &self,
        task: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), TrySendError<Task>> {
        self.tokio.spawn(task)
    }
}
