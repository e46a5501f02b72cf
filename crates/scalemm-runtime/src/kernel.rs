use core::fmt::Display;

/// Number of units in a cube, along each axis.
#[derive(new, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CubeDim {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl CubeDim {
    /// A one-dimensional cube of `units` units.
    pub const fn new_1d(units: u32) -> Self {
        Self {
            x: units,
            y: 1,
            z: 1,
        }
    }

    /// Total number of units in the cube.
    pub const fn num_elems(&self) -> u32 {
        self.x * self.y * self.z
    }
}

impl Display for CubeDim {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Number of cubes in a launch, along each axis.
#[derive(new, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CubeCount {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl CubeCount {
    /// Total number of cubes.
    pub const fn num_cubes(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }

    /// Enumerates every cube position, `x` fastest.
    pub fn positions(&self) -> impl Iterator<Item = CubePosition> + use<> {
        let count = *self;
        (0..count.z).flat_map(move |z| {
            (0..count.y).flat_map(move |y| (0..count.x).map(move |x| CubePosition { x, y, z, count }))
        })
    }
}

impl Display for CubeCount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Position of a cube inside its launch grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CubePosition {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub count: CubeCount,
}

impl CubePosition {
    /// Linear index of the cube, `x` fastest.
    pub fn absolute(&self) -> u64 {
        (self.z as u64 * self.count.y as u64 + self.y as u64) * self.count.x as u64 + self.x as u64
    }
}

/// A kernel that can be executed by the device.
///
/// The device calls [`execute`](CubeTask::execute) once per cube of the launch, possibly from
/// several worker threads at the same time. The implementation carries its own buffer handles.
pub trait CubeTask: Send + Sync {
    /// Name used for logging and profiling.
    fn name(&self) -> String {
        core::any::type_name::<Self>().to_string()
    }

    /// Units per cube.
    fn cube_dim(&self) -> CubeDim;

    /// Runs every unit of one cube to completion.
    fn execute(&self, cube: CubePosition);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_cover_grid_in_linear_order() {
        let count = CubeCount::new(3, 2, 2);
        let absolutes: Vec<u64> = count.positions().map(|pos| pos.absolute()).collect();

        assert_eq!(absolutes, (0..12).collect::<Vec<_>>());
    }
}
