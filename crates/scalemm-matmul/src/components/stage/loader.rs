use core::ops::Range;

use scalemm_common::Element;

use crate::components::global::{Job, JobExecutor};
use crate::components::tiling::TransferConfig;

/// View of one operand of one batch from the origin of a block tile, indexed `(mn, k)`.
///
/// Reads outside of the problem extents return zero, which is how partial tiles along M, N and
/// K are padded.
#[derive(new, Clone, Copy, Debug)]
pub struct GlobalView<'a, E: Element> {
    data: &'a [E],
    offset: usize,
    stride_mn: usize,
    stride_k: usize,
    extent_mn: usize,
    extent_k: usize,
}

impl<E: Element> GlobalView<'_, E> {
    pub fn read(&self, mn: u32, k: u32) -> E {
        let (mn, k) = (mn as usize, k as usize);
        if mn >= self.extent_mn || k >= self.extent_k {
            return E::zero();
        }

        self.data[self.offset + mn * self.stride_mn + k * self.stride_k]
    }
}

/// Copies block tiles of one operand into scratch memory.
///
/// Every unit owns a slice of the `[K0, MN, K1]` tile given by its position in the thread
/// cluster. It reads its slice from global memory into registers with vectors along the source
/// vector dimension, then writes the registers to scratch memory with vectors along K1.
#[derive(Clone, Debug)]
pub struct OperandLoader<'a, E: Element> {
    view: GlobalView<'a, E>,
    transfer: &'a TransferConfig,
}

impl<'a, E: Element> OperandLoader<'a, E> {
    pub fn new(view: GlobalView<'a, E>, transfer: &'a TransferConfig) -> Self {
        Self { view, transfer }
    }

    pub fn transfer(&self) -> &TransferConfig {
        self.transfer
    }

    /// First K0, MN and K1 indices of the slice owned by `unit`.
    fn slice_origin(&self, unit: u32) -> [u32; 3] {
        let position = self.transfer.cluster.position(unit);
        core::array::from_fn(|dim| position[dim] * self.transfer.thread_slice[dim])
    }

    fn register_index(&self, index: [u32; 3]) -> usize {
        let slice = self.transfer.thread_slice;
        ((index[0] * slice[1] + index[1]) * slice[2] + index[2]) as usize
    }

    /// Reads the slice of `unit` for stage `iteration` into `registers`.
    pub fn load_thread(&self, unit: u32, iteration: u32, registers: &mut Vec<E>) {
        let transfer = self.transfer;
        let [_, _, k1] = transfer.tile;
        let k_offset = iteration * transfer.tile[0] * k1;
        let origin = self.slice_origin(unit);
        let order = transfer.access_order;
        let vector_dim = transfer.src_vector_dim;
        let vector = transfer.src_vector;

        let mut steps = transfer.thread_slice;
        steps[vector_dim] /= vector;

        registers.clear();
        registers.resize(transfer.slice_len() as usize, E::zero());

        for outer in 0..steps[order[0]] {
            for middle in 0..steps[order[1]] {
                for inner in 0..steps[order[2]] {
                    let mut index = [0; 3];
                    index[order[0]] = outer;
                    index[order[1]] = middle;
                    index[order[2]] = inner;
                    index[vector_dim] *= vector;

                    for lane in 0..vector {
                        let mut index = index;
                        index[vector_dim] += lane;

                        let k = (origin[0] + index[0]) * k1 + origin[2] + index[2];
                        let mn = origin[1] + index[1];
                        registers[self.register_index(index)] = self.view.read(mn, k_offset + k);
                    }
                }
            }
        }
    }

    /// Writes the registers of `unit` to its slice of the stage buffer.
    pub fn store_thread(&self, unit: u32, registers: &[E], stage: &mut [E]) {
        let transfer = self.transfer;
        let [_, _, k1] = transfer.tile;
        let slice = transfer.thread_slice;
        let vector = transfer.dst_vector as usize;
        let origin = self.slice_origin(unit);

        for k0 in 0..slice[0] {
            for mn in 0..slice[1] {
                for k1_start in (0..slice[2]).step_by(vector) {
                    let k = (origin[0] + k0) * k1 + origin[2] + k1_start;
                    let dst = transfer.stage_index(k, origin[1] + mn);
                    let src = self.register_index([k0, mn, k1_start]);

                    stage[dst..dst + vector].copy_from_slice(&registers[src..src + vector]);
                }
            }
        }
    }

    /// Every unit of the cube loads its slice of stage `iteration`.
    pub fn load_stage(&self, iteration: u32, stage: &mut [E]) {
        let mut registers = Vec::with_capacity(self.transfer.slice_len() as usize);

        for unit in 0..self.transfer.cluster.num_units() {
            self.load_thread(unit, iteration, &mut registers);
            self.store_thread(unit, &registers, stage);
        }
    }
}

/// The loads of a range of units for one stage, split into tasks of consecutive units.
#[derive(Clone, Debug)]
pub struct LoadJob {
    iteration: u32,
    units: Range<u32>,
    units_per_task: u32,
    current: u32,
    num_tasks: u32,
}

impl Job for LoadJob {
    fn current(&self) -> u32 {
        self.current
    }

    fn num_tasks(&self) -> u32 {
        self.num_tasks
    }
}

impl<E: Element> JobExecutor for OperandLoader<'_, E> {
    type Elem = E;
    type Job = LoadJob;

    fn create_job(&self, iteration: u32, units: Range<u32>, num_tasks: u32) -> LoadJob {
        let num_tasks = num_tasks.max(1);
        let units_per_task = units.len().div_ceil(num_tasks as usize) as u32;

        LoadJob {
            iteration,
            units,
            units_per_task,
            current: 0,
            num_tasks,
        }
    }

    fn execute_task(&self, job: &mut LoadJob, stage: &mut [E]) {
        if job.current >= job.num_tasks {
            return;
        }

        let start = job.units.start + job.current * job.units_per_task;
        let end = (start + job.units_per_task).min(job.units.end);
        let mut registers = Vec::with_capacity(self.transfer.slice_len() as usize);

        for unit in start..end {
            self.load_thread(unit, job.iteration, &mut registers);
            self.store_thread(unit, &registers, stage);
        }

        job.current += 1;
    }
}
