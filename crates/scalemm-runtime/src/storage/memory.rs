use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytemuck::Pod;
use spin::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::server::IoError;

static HANDLE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier of a device buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandleId(u64);

impl HandleId {
    fn next() -> Self {
        Self(HANDLE_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Words backing a device buffer. Using `u64` keeps every element type aligned.
#[derive(Debug)]
pub(crate) struct DeviceBuffer {
    words: Vec<u64>,
    size: usize,
}

impl DeviceBuffer {
    fn zeroed(size: usize) -> Self {
        Self {
            words: vec![0; size.div_ceil(size_of::<u64>())],
            size,
        }
    }

    fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.words)[..self.size]
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.words)[..self.size]
    }
}

/// Handle to a buffer in device memory.
///
/// Cloning the handle shares the buffer. Kernels read it concurrently and take the write lock
/// only to commit their results.
#[derive(Clone, Debug)]
pub struct Handle {
    id: HandleId,
    device: u64,
    size: usize,
    buffer: Arc<RwLock<DeviceBuffer>>,
}

impl Handle {
    pub(crate) fn new(device: u64, size: usize) -> Self {
        Self {
            id: HandleId::next(),
            device,
            size,
            buffer: Arc::new(RwLock::new(DeviceBuffer::zeroed(size))),
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub(crate) fn device(&self) -> u64 {
        self.device
    }

    /// Size of the buffer in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether both handles point to the same buffer.
    pub fn same_buffer(&self, other: &Handle) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }

    /// Shared access to the buffer content.
    pub fn read(&self) -> BufferReadGuard<'_> {
        BufferReadGuard {
            guard: self.buffer.read(),
        }
    }

    /// Exclusive access to the buffer content.
    pub fn write(&self) -> BufferWriteGuard<'_> {
        BufferWriteGuard {
            guard: self.buffer.write(),
        }
    }

    pub(crate) fn copy_from(&self, data: &[u8]) -> Result<(), IoError> {
        let mut guard = self.buffer.write();
        let bytes = guard.bytes_mut();

        if bytes.len() != data.len() {
            return Err(IoError::SizeMismatch {
                expected: bytes.len(),
                actual: data.len(),
            });
        }

        bytes.copy_from_slice(data);
        Ok(())
    }

    pub(crate) fn downgrade(&self) -> Weak<RwLock<DeviceBuffer>> {
        Arc::downgrade(&self.buffer)
    }
}

/// Read access to a device buffer.
pub struct BufferReadGuard<'a> {
    guard: RwLockReadGuard<'a, DeviceBuffer>,
}

impl BufferReadGuard<'_> {
    pub fn bytes(&self) -> &[u8] {
        self.guard.bytes()
    }

    /// The buffer seen as elements. Trailing bytes that don't form a whole element are ignored.
    pub fn as_slice<E: Pod>(&self) -> &[E] {
        cast_whole(self.guard.bytes())
    }
}

/// Write access to a device buffer.
pub struct BufferWriteGuard<'a> {
    guard: RwLockWriteGuard<'a, DeviceBuffer>,
}

impl BufferWriteGuard<'_> {
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.guard.bytes_mut()
    }

    /// The buffer seen as mutable elements. Trailing bytes that don't form a whole element are
    /// ignored.
    pub fn as_slice_mut<E: Pod>(&mut self) -> &mut [E] {
        let bytes = self.guard.bytes_mut();
        let len = bytes.len() - bytes.len() % size_of::<E>();
        bytemuck::cast_slice_mut(&mut bytes[..len])
    }
}

fn cast_whole<E: Pod>(bytes: &[u8]) -> &[E] {
    let len = bytes.len() - bytes.len() % size_of::<E>();
    bytemuck::cast_slice(&bytes[..len])
}

/// Memory usage of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryUsage {
    /// Number of live buffers.
    pub number_allocs: u64,
    /// Bytes held by live buffers.
    pub bytes_in_use: u64,
}

impl core::fmt::Display for MemoryUsage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{} allocations, {} bytes in use",
            self.number_allocs, self.bytes_in_use
        )
    }
}

/// Tracks the buffers allocated by a device. Buffers are freed when their last handle drops.
#[derive(Default, Debug)]
pub(crate) struct MemoryTracker {
    buffers: spin::Mutex<Vec<Weak<RwLock<DeviceBuffer>>>>,
}

impl MemoryTracker {
    pub(crate) fn register(&self, handle: &Handle) {
        let mut buffers = self.buffers.lock();
        buffers.retain(|buffer| buffer.strong_count() > 0);
        buffers.push(handle.downgrade());
    }

    pub(crate) fn usage(&self) -> MemoryUsage {
        let mut buffers = self.buffers.lock();
        buffers.retain(|buffer| buffer.strong_count() > 0);

        buffers
            .iter()
            .filter_map(Weak::upgrade)
            .fold(MemoryUsage::default(), |mut usage, buffer| {
                usage.number_allocs += 1;
                usage.bytes_in_use += buffer.read().size as u64;
                usage
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_view_ignores_trailing_bytes() {
        let handle = Handle::new(0, 10);
        handle.write().bytes_mut()[..8].copy_from_slice(&[1, 0, 0, 0, 2, 0, 0, 0]);

        let guard = handle.read();
        assert_eq!(guard.as_slice::<u32>(), &[1, 2]);
    }

    #[test]
    fn copy_rejects_wrong_size() {
        let handle = Handle::new(0, 4);

        assert!(matches!(
            handle.copy_from(&[0; 3]),
            Err(IoError::SizeMismatch {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn tracker_forgets_dropped_buffers() {
        let tracker = MemoryTracker::default();
        let kept = Handle::new(0, 16);
        let dropped = Handle::new(0, 32);
        tracker.register(&kept);
        tracker.register(&dropped);
        core::mem::drop(dropped);

        assert_eq!(
            tracker.usage(),
            MemoryUsage {
                number_allocs: 1,
                bytes_in_use: 16
            }
        );
    }
}
