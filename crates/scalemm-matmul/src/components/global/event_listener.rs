use core::ops::Range;

use crate::components::stage::{StageEvent, StageEventListener};

/// Executes the tasks of a load job, one at a time.
pub trait JobExecutor {
    type Elem;
    type Job: Job;

    /// Creates the loads of stage `iteration` for `units`, split into `num_tasks` tasks.
    fn create_job(&self, iteration: u32, units: Range<u32>, num_tasks: u32) -> Self::Job;

    /// Executes the next task of the job into the stage buffer.
    fn execute_task(&self, job: &mut Self::Job, stage: &mut [Self::Elem]);
}

pub trait Job {
    /// Number of tasks already executed.
    fn current(&self) -> u32;
    fn num_tasks(&self) -> u32;
}

/// Listener interleaving the loads of the next stage between the matrix instructions of the
/// current one.
///
/// The lhs tasks run first, then the rhs tasks, one per completed instruction, ending on the
/// last instruction of the stage. Tasks that don't fit are flushed at [StageEvent::Finish].
pub struct DoubleBufferingEventListener<'a, Lhs: JobExecutor, Rhs: JobExecutor> {
    loader_lhs: &'a Lhs,
    loader_rhs: &'a Rhs,
    stage_lhs: &'a mut [Lhs::Elem],
    stage_rhs: &'a mut [Rhs::Elem],
    job_lhs: Lhs::Job,
    job_rhs: Rhs::Job,
}

#[derive(Clone, Debug)]
struct IdentEventAnalysis {
    /// The event count to execute the next task.
    counter: u32,
    /// If no more tasks need to be executed.
    completed: bool,
}

impl IdentEventAnalysis {
    fn should_execute(&self, current: u32) -> bool {
        self.counter == current && !self.completed
    }
}

/// Analysis of [StageEvent] that reports when lhs and rhs should execute a task.
#[derive(Clone, Debug)]
struct EventAnalysis {
    lhs: IdentEventAnalysis,
    rhs: IdentEventAnalysis,
}

impl<'a, Lhs: JobExecutor, Rhs: JobExecutor> DoubleBufferingEventListener<'a, Lhs, Rhs> {
    pub fn new(
        loader_lhs: &'a Lhs,
        loader_rhs: &'a Rhs,
        stage_lhs: &'a mut [Lhs::Elem],
        stage_rhs: &'a mut [Rhs::Elem],
        job_lhs: Lhs::Job,
        job_rhs: Rhs::Job,
    ) -> Self {
        Self {
            loader_lhs,
            loader_rhs,
            stage_lhs,
            stage_rhs,
            job_lhs,
            job_rhs,
        }
    }

    fn analyse(&self, total: u32) -> EventAnalysis {
        let lhs_num_tasks = self.job_lhs.num_tasks();
        let rhs_num_tasks = self.job_rhs.num_tasks();
        let lhs_executed = self.job_lhs.current();
        let rhs_executed = self.job_rhs.current();
        let start = total.saturating_sub(lhs_num_tasks + rhs_num_tasks);

        EventAnalysis {
            lhs: IdentEventAnalysis {
                counter: lhs_executed + start,
                completed: lhs_executed >= lhs_num_tasks,
            },
            rhs: IdentEventAnalysis {
                counter: rhs_executed + lhs_num_tasks + start,
                completed: rhs_executed >= rhs_num_tasks,
            },
        }
    }
}

impl<Lhs: JobExecutor, Rhs: JobExecutor> StageEventListener
    for DoubleBufferingEventListener<'_, Lhs, Rhs>
{
    fn on_event(&mut self, event: StageEvent) {
        if let StageEvent::TileMatmulCompleted { current, total } = event {
            let analysis = self.analyse(total);

            if analysis.lhs.should_execute(current) {
                self.loader_lhs
                    .execute_task(&mut self.job_lhs, self.stage_lhs);
            }

            if analysis.rhs.should_execute(current) {
                self.loader_rhs
                    .execute_task(&mut self.job_rhs, self.stage_rhs);
            }
        }

        // Cleanup remaining tasks if any.
        if let StageEvent::Finish = event {
            for _ in self.job_lhs.current()..self.job_lhs.num_tasks() {
                self.loader_lhs
                    .execute_task(&mut self.job_lhs, self.stage_lhs);
            }

            for _ in self.job_rhs.current()..self.job_rhs.num_tasks() {
                self.loader_rhs
                    .execute_task(&mut self.job_rhs, self.stage_rhs);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records the event at which each task ran in the stage.
    struct Recorder;

    struct CountJob {
        current: u32,
        num_tasks: u32,
    }

    impl Job for CountJob {
        fn current(&self) -> u32 {
            self.current
        }

        fn num_tasks(&self) -> u32 {
            self.num_tasks
        }
    }

    impl JobExecutor for Recorder {
        type Elem = u32;
        type Job = CountJob;

        fn create_job(&self, _iteration: u32, _units: Range<u32>, num_tasks: u32) -> CountJob {
            CountJob {
                current: 0,
                num_tasks,
            }
        }

        fn execute_task(&self, job: &mut CountJob, stage: &mut [u32]) {
            stage[job.current as usize] += 1;
            job.current += 1;
        }
    }

    fn run_events(lhs_tasks: u32, rhs_tasks: u32, total: u32) -> (Vec<u32>, Vec<u32>) {
        let mut stage_lhs = vec![0; lhs_tasks as usize];
        let mut stage_rhs = vec![0; rhs_tasks as usize];
        let job_lhs = Recorder.create_job(0, 0..1, lhs_tasks);
        let job_rhs = Recorder.create_job(0, 0..1, rhs_tasks);
        let mut listener = DoubleBufferingEventListener::new(
            &Recorder,
            &Recorder,
            &mut stage_lhs,
            &mut stage_rhs,
            job_lhs,
            job_rhs,
        );

        let mut progress = Vec::new();
        listener.on_event(StageEvent::Begin);
        for current in 0..total {
            listener.on_event(StageEvent::TileMatmulCompleted { current, total });
            progress.push(listener.job_lhs.current() + listener.job_rhs.current());
        }
        listener.on_event(StageEvent::Finish);

        (progress, [stage_lhs, stage_rhs].concat())
    }

    #[test]
    fn tasks_end_on_last_instruction() {
        let (progress, executed) = run_events(2, 2, 8);

        assert_eq!(progress, vec![0, 0, 0, 0, 1, 2, 3, 4]);
        assert_eq!(executed, vec![1; 4]);
    }

    #[test]
    fn remaining_tasks_run_at_finish() {
        let (progress, executed) = run_events(3, 3, 4);

        assert_eq!(progress, vec![1, 2, 3, 4]);
        assert_eq!(executed, vec![1; 6]);
    }
}
