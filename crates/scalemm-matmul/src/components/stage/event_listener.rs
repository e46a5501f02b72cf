#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Events that occur while a wave runs the matrix instructions of one stage.
pub enum StageEvent {
    /// Before any instruction.
    Begin,
    /// After the fragments of a K step are gathered from scratch memory.
    FragmentsLoaded { k_step: u32 },
    /// After `current + 1` of the `total` instructions of the stage completed.
    TileMatmulCompleted { current: u32, total: u32 },
    /// After the last instruction.
    Finish,
}

/// Function that is called at each [StageEvent].
pub trait StageEventListener {
    fn on_event(&mut self, event: StageEvent);
}

/// Use when there is no event listening to do.
#[derive(Default, Debug, Clone, Copy)]
pub struct NoEvent;

impl StageEventListener for NoEvent {
    fn on_event(&mut self, _event: StageEvent) {
        // Nothing to do
    }
}
