use scalemm_common::Element;

/// Multi-buffered scratch memory of one operand.
///
/// Each buffer holds one block tile laid out `[K0][MN + pad][K1]`.
#[derive(Debug)]
pub struct StageMemory<E: Element> {
    buffers: Vec<Vec<E>>,
}

impl<E: Element> StageMemory<E> {
    pub fn new(num_stages: u32, stage_len: usize) -> Self {
        Self {
            buffers: (0..num_stages).map(|_| vec![E::zero(); stage_len]).collect(),
        }
    }

    pub fn num_stages(&self) -> u32 {
        self.buffers.len() as u32
    }

    pub fn buffer(&self, index: u32) -> &[E] {
        &self.buffers[index as usize]
    }

    pub fn buffer_mut(&mut self, index: u32) -> &mut [E] {
        &mut self.buffers[index as usize]
    }

    /// Borrows buffer `read` for the matrix instructions and buffer `write` for the loads of a
    /// later stage at the same time.
    ///
    /// # Panics
    ///
    /// If both indices are the same buffer.
    pub fn split(&mut self, read: u32, write: u32) -> (&[E], &mut [E]) {
        assert_ne!(read, write, "A stage buffer can't be read and written at once");
        let (read, write) = (read as usize, write as usize);

        if read < write {
            let (head, tail) = self.buffers.split_at_mut(write);
            (&head[read], &mut tail[0])
        } else {
            let (head, tail) = self.buffers.split_at_mut(read);
            (&tail[0], &mut head[write])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_borrows_distinct_buffers() {
        let mut stage = StageMemory::<f32>::new(3, 4);
        stage.buffer_mut(2).fill(1.0);

        let (read, write) = stage.split(2, 0);
        write.copy_from_slice(read);

        assert_eq!(stage.buffer(0), &[1.0; 4]);
        assert_eq!(stage.buffer(1), &[0.0; 4]);
    }

    #[test]
    #[should_panic]
    fn split_rejects_aliasing() {
        let mut stage = StageMemory::<f32>::new(2, 4);
        let _ = stage.split(1, 1);
    }
}
