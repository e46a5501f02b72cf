use std::panic::AssertUnwindSafe;
use std::sync::{Arc, mpsc};
use std::thread;

use crate::kernel::{CubePosition, CubeTask};
use crate::server::ServerError;

/// A contiguous share of the cubes of one launch, executed by a single worker.
pub(crate) struct CubeBatch {
    pub kernel: Arc<dyn CubeTask>,
    pub cubes: Vec<CubePosition>,
    pub done: mpsc::Sender<Result<(), String>>,
}

impl CubeBatch {
    /// Runs every cube of the batch, returning the message of the first panic.
    ///
    /// A panicking cube doesn't stop the others.
    fn run(&self) -> Result<(), String> {
        let mut first_panic = None;

        for cube in self.cubes.iter() {
            let outcome =
                std::panic::catch_unwind(AssertUnwindSafe(|| self.kernel.execute(*cube)));

            if let Err(payload) = outcome {
                first_panic.get_or_insert_with(|| panic_message(payload.as_ref()));
            }
        }

        match first_panic {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }
}

fn panic_message(payload: &(dyn core::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[derive(Debug)]
pub(crate) struct Worker {
    // TODO: Replace the per-worker channel with work stealing so edge cubes don't unbalance launches.
    tx: mpsc::Sender<CubeBatch>,
}

impl Worker {
    pub fn new(thread_id: usize) -> Self {
        let (tx, rx) = mpsc::channel();
        let inner_worker = InnerWorker { thread_id, rx };
        thread::spawn(move || inner_worker.work());
        Self { tx }
    }

    pub fn send_task(&self, batch: CubeBatch) -> Result<(), ServerError> {
        self.tx
            .send(batch)
            .map_err(|_| ServerError::QueueDisconnected)
    }
}

struct InnerWorker {
    thread_id: usize,
    rx: mpsc::Receiver<CubeBatch>,
}

impl InnerWorker {
    fn work(self) {
        log::trace!("Worker {} started", self.thread_id);
        for batch in self.rx.iter() {
            let result = batch.run();
            // The scheduler may have given up on the launch already.
            let _ = batch.done.send(result);
        }
        log::trace!("Worker {} stopped", self.thread_id);
    }
}
