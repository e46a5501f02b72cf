use scalemm_runtime::kernel::{CubeDim, CubePosition, CubeTask};
use scalemm_runtime::storage::Handle;

/// Units per cube of the dummy kernels.
pub const UNITS: u32 = 4;

/// `out = lhs + rhs`, one element per unit.
#[derive(Debug)]
pub struct DummyElementwiseAddition {
    pub lhs: Handle,
    pub rhs: Handle,
    pub out: Handle,
}

impl CubeTask for DummyElementwiseAddition {
    fn cube_dim(&self) -> CubeDim {
        CubeDim::new_1d(UNITS)
    }

    fn execute(&self, cube: CubePosition) {
        let start = cube.absolute() as usize * UNITS as usize;

        let values: Vec<(usize, u32)> = {
            let lhs = self.lhs.read();
            let rhs = self.rhs.read();
            let lhs = lhs.as_slice::<u32>();
            let rhs = rhs.as_slice::<u32>();

            (start..start + UNITS as usize)
                .filter(|index| *index < lhs.len())
                .map(|index| (index, lhs[index] + rhs[index]))
                .collect()
        };

        let mut out = self.out.write();
        let out = out.as_slice_mut::<u32>();
        for (index, value) in values {
            out[index] = value;
        }
    }
}

/// `out += 1` on every element.
#[derive(Debug)]
pub struct DummyIncrement {
    pub out: Handle,
}

impl CubeTask for DummyIncrement {
    fn cube_dim(&self) -> CubeDim {
        CubeDim::new_1d(UNITS)
    }

    fn execute(&self, cube: CubePosition) {
        let start = cube.absolute() as usize * UNITS as usize;
        let mut out = self.out.write();
        let out = out.as_slice_mut::<u32>();
        let end = (start + UNITS as usize).min(out.len());

        for value in out[start..end].iter_mut() {
            *value += 1;
        }
    }
}

/// Panics in a single cube, every other cube writes its index.
#[derive(Debug)]
pub struct DummyPanicking {
    pub panicking_cube: u64,
    pub out: Handle,
}

impl CubeTask for DummyPanicking {
    fn name(&self) -> String {
        "dummy_panicking".to_string()
    }

    fn cube_dim(&self) -> CubeDim {
        CubeDim::new_1d(1)
    }

    fn execute(&self, cube: CubePosition) {
        let index = cube.absolute();
        if index == self.panicking_cube {
            panic!("cube {index} failed");
        }

        self.out.write().as_slice_mut::<u32>()[index as usize] = index as u32 + 1;
    }
}
