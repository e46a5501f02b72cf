use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytemuck::Pod;

use crate::compute::{ExecutionQueue, QueueTask, Scheduler};
use crate::kernel::{CubeCount, CubeTask};
use crate::properties::DeviceProperties;
use crate::server::{IoError, ServerError};
use crate::storage::{Handle, MemoryTracker, MemoryUsage};

static DEVICE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// The ComputeClient is the entry point to allocate memory and launch kernels on an emulated
/// device.
///
/// Cloning the client shares the device, its worker pool and its default queue.
#[derive(Clone, Debug)]
pub struct ComputeClient {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    device: u64,
    properties: DeviceProperties,
    scheduler: Arc<Scheduler>,
    queue: ExecutionQueue,
    memory: MemoryTracker,
}

impl ComputeClient {
    /// Create a client on a new device, using one worker per available core.
    pub fn new(properties: DeviceProperties) -> Self {
        Self::init(properties, Scheduler::default())
    }

    /// Create a client on a new device with a fixed number of worker threads.
    pub fn with_workers(properties: DeviceProperties, num_workers: usize) -> Self {
        Self::init(properties, Scheduler::new(num_workers))
    }

    fn init(properties: DeviceProperties, scheduler: Scheduler) -> Self {
        let device = DEVICE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let scheduler = Arc::new(scheduler);
        log::debug!(
            "Device {device} ({}) created with {} workers",
            properties.generation,
            scheduler.num_workers()
        );
        let queue = ExecutionQueue::new(scheduler.clone(), format!("{device}-default"));

        Self {
            inner: Arc::new(ClientInner {
                device,
                properties,
                scheduler,
                queue,
                memory: MemoryTracker::default(),
            }),
        }
    }

    /// Get the properties of the device.
    pub fn properties(&self) -> &DeviceProperties {
        &self.inner.properties
    }

    /// Number of worker threads executing cubes.
    pub fn num_workers(&self) -> usize {
        self.inner.scheduler.num_workers()
    }

    /// Allocates a zeroed buffer of `size` bytes.
    pub fn empty(&self, size: usize) -> Handle {
        let handle = Handle::new(self.inner.device, size);
        self.inner.memory.register(&handle);
        handle
    }

    /// Allocates a buffer holding a copy of `data`.
    pub fn create(&self, data: &[u8]) -> Handle {
        let handle = self.empty(data.len());
        handle.write().bytes_mut().copy_from_slice(data);
        handle
    }

    /// Allocates a buffer holding a copy of `data`.
    pub fn create_from_slice<E: Pod>(&self, data: &[E]) -> Handle {
        self.create(bytemuck::cast_slice(data))
    }

    /// Enqueues a write of `data` into the buffer on the default queue.
    ///
    /// The write happens after every kernel already submitted to that queue.
    pub fn write(&self, handle: &Handle, data: &[u8]) -> Result<(), ServerError> {
        self.validate(handle)?;

        if handle.size() != data.len() {
            return Err(IoError::SizeMismatch {
                expected: handle.size(),
                actual: data.len(),
            }
            .into());
        }

        self.inner.queue.push(QueueTask::Write {
            handle: handle.clone(),
            data: data.to_vec(),
        })
    }

    /// Waits for the default queue and returns the content of the buffer.
    pub fn read_one(&self, handle: &Handle) -> Result<Vec<u8>, ServerError> {
        self.validate(handle)?;
        self.sync()?;

        Ok(handle.read().bytes().to_vec())
    }

    /// Waits for the default queue and returns the content of the buffer as elements.
    pub fn read_one_as<E: Pod>(&self, handle: &Handle) -> Result<Vec<E>, ServerError> {
        self.validate(handle)?;
        self.sync()?;

        Ok(handle.read().as_slice::<E>().to_vec())
    }

    /// Executes the kernel over the cube count on the default queue.
    pub fn execute(
        &self,
        kernel: Arc<dyn CubeTask>,
        cube_count: CubeCount,
    ) -> Result<(), ServerError> {
        self.inner.queue.execute(kernel, cube_count)
    }

    /// The default queue of the device.
    pub fn queue(&self) -> &ExecutionQueue {
        &self.inner.queue
    }

    /// Creates a new queue sharing the worker pool of the device.
    pub fn create_queue(&self, name: &str) -> ExecutionQueue {
        ExecutionQueue::new(
            self.inner.scheduler.clone(),
            format!("{}-{name}", self.inner.device),
        )
    }

    /// Wait for the completion of every task on the default queue.
    pub fn sync(&self) -> Result<(), ServerError> {
        self.inner.queue.sync()
    }

    /// Get the current memory usage of the device.
    pub fn memory_usage(&self) -> MemoryUsage {
        self.inner.memory.usage()
    }

    /// Logs the profiling summary of the default queue.
    pub fn profile_summary(&self) -> Result<(), ServerError> {
        self.inner.queue.profile_summary()
    }

    /// Whether the handle was allocated by this device.
    pub fn owns(&self, handle: &Handle) -> bool {
        handle.device() == self.inner.device
    }

    fn validate(&self, handle: &Handle) -> Result<(), IoError> {
        match self.owns(handle) {
            true => Ok(()),
            false => Err(IoError::InvalidHandle),
        }
    }
}
