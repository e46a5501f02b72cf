use core::fmt::Display;

/// Phase of a kernel instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelinePhase {
    /// Batch and tile resolved, nothing loaded yet.
    Dispatch,
    /// Prologue load of a stage ahead of the main loop.
    Stage,
    /// Accumulating one buffer while loading a later stage into another.
    Overlap,
    /// Accumulating one buffer with no load in flight.
    Accumulate,
    /// Rescaling and narrowing the accumulators.
    Epilogue,
    /// Committing the output tile.
    Store,
    /// Done.
    Terminate,
}

impl Display for PipelinePhase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Scratch buffer and iteration of a kernel instance, advanced in lock step by the loads and the
/// matrix instructions.
#[derive(Clone, Debug)]
pub struct PipelineState {
    buffer_index: u32,
    iteration: u32,
    num_buffers: u32,
    phase: PipelinePhase,
}

impl PipelineState {
    pub fn new(num_buffers: u32) -> Self {
        Self {
            buffer_index: 0,
            iteration: 0,
            num_buffers,
            phase: PipelinePhase::Dispatch,
        }
    }

    pub fn phase(&self) -> PipelinePhase {
        self.phase
    }

    /// Buffer read by the matrix instructions of the current iteration.
    pub fn buffer_index(&self) -> u32 {
        self.buffer_index
    }

    /// Current K loop iteration.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Buffer holding stage `iteration`.
    pub fn buffer_of(&self, iteration: u32) -> u32 {
        iteration % self.num_buffers
    }

    fn transition(&mut self, next: PipelinePhase) {
        use PipelinePhase::*;

        debug_assert!(
            matches!(
                (self.phase, next),
                (Dispatch, Stage)
                    | (Stage, Stage | Overlap | Accumulate)
                    | (Overlap, Overlap | Accumulate)
                    | (Accumulate, Accumulate | Epilogue)
                    | (Dispatch | Stage, Epilogue)
                    | (Epilogue, Store)
                    | (Store, Terminate)
            ),
            "Illegal pipeline transition {} -> {next}",
            self.phase
        );
        log::trace!(
            "Pipeline {} -> {next} (iteration {}, buffer {})",
            self.phase,
            self.iteration,
            self.buffer_index
        );

        self.phase = next;
    }

    /// Prologue load of stage `iteration`.
    pub fn stage(&mut self, iteration: u32) {
        self.transition(PipelinePhase::Stage);
        debug_assert_eq!(self.iteration, 0, "Stages are only loaded ahead in the prologue");
        log::trace!("Staging iteration {iteration} in buffer {}", self.buffer_of(iteration));
    }

    /// Accumulates the current buffer while stage `iteration` loads.
    pub fn overlap(&mut self, iteration: u32) {
        self.transition(PipelinePhase::Overlap);
        debug_assert_ne!(
            self.buffer_of(iteration),
            self.buffer_index,
            "A load can't target the buffer being accumulated"
        );
    }

    /// Accumulates the current buffer with no load in flight.
    pub fn accumulate(&mut self) {
        self.transition(PipelinePhase::Accumulate);
    }

    /// Barrier at the end of an iteration: moves to the next buffer.
    pub fn advance(&mut self) {
        debug_assert!(matches!(
            self.phase,
            PipelinePhase::Overlap | PipelinePhase::Accumulate
        ));
        self.iteration += 1;
        self.buffer_index = self.buffer_of(self.iteration);
    }

    pub fn epilogue(&mut self) {
        self.transition(PipelinePhase::Epilogue);
    }

    pub fn store(&mut self) {
        self.transition(PipelinePhase::Store);
    }

    pub fn terminate(&mut self) {
        self.transition(PipelinePhase::Terminate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_rotate_with_iterations() {
        let mut state = PipelineState::new(3);
        state.stage(0);
        state.stage(1);

        let mut buffers = Vec::new();
        for iteration in 0..4 {
            match iteration + 2 < 4 {
                true => state.overlap(iteration + 2),
                false => state.accumulate(),
            }
            buffers.push(state.buffer_index());
            state.advance();
        }
        state.epilogue();
        state.store();
        state.terminate();

        assert_eq!(buffers, vec![0, 1, 2, 0]);
        assert_eq!(state.iteration(), 4);
        assert_eq!(state.phase(), PipelinePhase::Terminate);
    }

    #[test]
    #[should_panic(expected = "Illegal pipeline transition")]
    #[cfg(debug_assertions)]
    fn store_requires_epilogue() {
        let mut state = PipelineState::new(2);
        state.stage(0);
        state.store();
    }
}
