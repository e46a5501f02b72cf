use std::fmt::Debug;
use std::sync::{Arc, mpsc};

use crate::kernel::{CubeCount, CubePosition, CubeTask};
use crate::server::ServerError;

use super::worker::{CubeBatch, Worker};

/// Spreads the cubes of a launch over a pool of worker threads.
pub(crate) struct Scheduler {
    workers: Vec<Worker>,
}

impl Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Scheduler({} workers)", self.workers.len())
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        let available_parallelism = std::thread::available_parallelism()
            .map(|num| num.get())
            .unwrap_or(1);

        Self::new(available_parallelism)
    }
}

impl Scheduler {
    pub fn new(num_workers: usize) -> Self {
        let workers = (0..num_workers.max(1)).map(Worker::new).collect();

        Self { workers }
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Executes every cube of the launch and waits for completion.
    pub fn dispatch_execute(
        &self,
        kernel: Arc<dyn CubeTask>,
        cube_count: CubeCount,
    ) -> Result<(), ServerError> {
        let cubes: Vec<CubePosition> = cube_count.positions().collect();

        if cubes.is_empty() {
            return Ok(());
        }

        let (send, receive) = mpsc::channel();
        let mut msg_count = 0;

        for (slice, worker) in cubes
            .chunks(cubes.len().div_ceil(self.workers.len()))
            .zip(self.workers.iter())
        {
            worker.send_task(CubeBatch {
                kernel: kernel.clone(),
                cubes: slice.to_vec(),
                done: send.clone(),
            })?;
            msg_count += 1;
        }
        core::mem::drop(send);

        let mut first_panic = None;
        let mut received = 0;

        for result in receive.iter().take(msg_count) {
            received += 1;
            if let Err(reason) = result {
                first_panic.get_or_insert(reason);
            }
        }

        if received < msg_count {
            return Err(ServerError::QueueDisconnected);
        }

        match first_panic {
            Some(reason) => Err(ServerError::KernelPanicked {
                name: kernel.name(),
                reason,
            }),
            None => Ok(()),
        }
    }
}
