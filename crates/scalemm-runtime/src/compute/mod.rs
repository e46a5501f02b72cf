mod queue;
mod scheduler;
mod worker;

pub use queue::ExecutionQueue;

pub(crate) use queue::QueueTask;
pub(crate) use scheduler::Scheduler;
