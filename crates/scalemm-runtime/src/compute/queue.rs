use std::sync::Arc;
use std::sync::mpsc::{SyncSender, sync_channel};

use crate::kernel::{CubeCount, CubeTask};
use crate::logging::ServerLogger;
use crate::profile::{ProfileDuration, ProfileOptions};
use crate::server::ServerError;
use crate::storage::Handle;

use super::Scheduler;

/// An ordered stream of work for the device.
///
/// Items submitted to the same queue execute in submission order on a dedicated thread.
/// Different queues are not ordered with respect to each other. Cloning the queue returns a
/// new handle to the same stream.
#[derive(Clone, Debug)]
pub struct ExecutionQueue {
    sender: SyncSender<QueueItem>,
}

enum QueueItem {
    Task(QueueTask),
    Flush(SyncSender<Vec<ServerError>>),
    ProfileSummary,
}

pub(crate) enum QueueTask {
    Execute {
        kernel: Arc<dyn CubeTask>,
        cube_count: CubeCount,
    },
    Write {
        handle: Handle,
        data: Vec<u8>,
    },
}

impl ExecutionQueue {
    pub(crate) fn new(scheduler: Arc<Scheduler>, name: String) -> Self {
        let (sender, receiver) = sync_channel(32);

        std::thread::spawn(move || {
            let mut server = ExecutionQueueServer {
                scheduler,
                logger: ServerLogger::default(),
                errors: Vec::new(),
            };

            log::trace!("Execution queue {name} started");
            while let Ok(item) = receiver.recv() {
                match item {
                    QueueItem::Task(task) => server.execute_task(task),
                    QueueItem::Flush(sender) => {
                        // The caller might have stopped waiting.
                        let _ = sender.send(server.flush_errors());
                    }
                    QueueItem::ProfileSummary => server.logger.profile_summary(),
                }
            }
            log::trace!("Execution queue {name} stopped");
        });

        Self { sender }
    }

    /// Enqueues a kernel launch.
    pub fn execute(
        &self,
        kernel: Arc<dyn CubeTask>,
        cube_count: CubeCount,
    ) -> Result<(), ServerError> {
        self.push(QueueTask::Execute { kernel, cube_count })
    }

    pub(crate) fn push(&self, task: QueueTask) -> Result<(), ServerError> {
        self.sender
            .send(QueueItem::Task(task))
            .map_err(|_| ServerError::QueueDisconnected)
    }

    /// Waits for every submitted item, returning the first error raised since the last sync.
    pub fn sync(&self) -> Result<(), ServerError> {
        let (sender, receiver) = sync_channel(1);
        self.sender
            .send(QueueItem::Flush(sender))
            .map_err(|_| ServerError::QueueDisconnected)?;

        let errors = receiver
            .recv()
            .map_err(|_| ServerError::QueueDisconnected)?;
        let mut errors = errors.into_iter();

        match errors.next() {
            Some(first) => {
                for other in errors {
                    log::warn!("Additional execution error: {other}");
                }
                Err(first)
            }
            None => Ok(()),
        }
    }

    /// Logs the profiling summary of the queue, when profiling is activated.
    pub fn profile_summary(&self) -> Result<(), ServerError> {
        self.sender
            .send(QueueItem::ProfileSummary)
            .map_err(|_| ServerError::QueueDisconnected)
    }

    /// Measures the mean duration of `launch` following the given options.
    ///
    /// Without `time_kernel`, `launch` runs once and the returned duration is zero.
    pub fn profile<F>(
        &self,
        options: &ProfileOptions,
        mut launch: F,
    ) -> Result<ProfileDuration, ServerError>
    where
        F: FnMut() -> Result<(), ServerError>,
    {
        if !options.time_kernel || options.repeat == 0 {
            launch()?;
            self.sync()?;
            return Ok(ProfileDuration::default());
        }

        for _ in 0..options.warmup_iterations {
            launch()?;
        }
        self.sync()?;

        let start = web_time::Instant::now();
        for _ in 0..options.repeat {
            launch()?;
        }
        self.sync()?;

        Ok(ProfileDuration::from_total(start.elapsed(), options.repeat))
    }
}

struct ExecutionQueueServer {
    scheduler: Arc<Scheduler>,
    logger: ServerLogger,
    errors: Vec<ServerError>,
}

impl ExecutionQueueServer {
    fn execute_task(&mut self, task: QueueTask) {
        let result = match task {
            QueueTask::Execute { kernel, cube_count } => self.kernel(kernel, cube_count),
            QueueTask::Write { handle, data } => handle.copy_from(&data).map_err(Into::into),
        };

        if let Err(err) = result {
            log::trace!("Execution error registered: {err}");
            self.errors.push(err);
        }
    }

    fn kernel(
        &mut self,
        kernel: Arc<dyn CubeTask>,
        cube_count: CubeCount,
    ) -> Result<(), ServerError> {
        if self.logger.launch_activated() {
            self.logger
                .log_launch(&kernel.name(), cube_count, kernel.cube_dim());
        }

        if self.logger.profile_level().is_none() {
            return self.scheduler.dispatch_execute(kernel, cube_count);
        }

        let start = web_time::Instant::now();
        let name = kernel.name();
        let result = self.scheduler.dispatch_execute(kernel, cube_count);
        self.logger.register_profiled(name, start.elapsed());

        result
    }

    fn flush_errors(&mut self) -> Vec<ServerError> {
        core::mem::take(&mut self.errors)
    }
}
