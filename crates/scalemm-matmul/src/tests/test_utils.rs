use core::marker::PhantomData;

use scalemm_common::rand::get_rng_from_seed;
use scalemm_runtime::ComputeClient;
pub use scalemm_runtime::properties::{DeviceProperties, HardwareGeneration};

use crate::components::epilogue::ElementwiseOp;
use crate::components::tiling::TileDescriptor;
use crate::components::{MatmulLaunchError, MatmulPrecision, MatmulProblem};
use crate::host::{
    HostTensor, TensorInit, TensorRole, reference_batched_scaled_matmul,
};
use crate::{BatchedScaledMatmul, ScaledMatmulArgs};

/// Client on a fresh emulated device with a couple of workers, so that cubes run concurrently.
pub fn test_client(generation: HardwareGeneration) -> ComputeClient {
    ComputeClient::with_workers(DeviceProperties::new(generation), 2)
}

/// Small descriptor matching the matrix instructions of the generation.
pub fn test_descriptor(generation: HardwareGeneration) -> TileDescriptor {
    match generation {
        HardwareGeneration::Cdna3 => TileDescriptor::cdna3_small(),
        HardwareGeneration::Rdna4 => TileDescriptor::rdna4_wmma(),
        HardwareGeneration::Generic => TileDescriptor::generic_fma(),
    }
}

/// Host inputs of a scaled matmul: row-major lhs, column-major rhs, then one row-broadcast
/// scale and one column-broadcast scale, as many as the epilogue consumes.
pub struct ScaledMatmulInputs<P: MatmulPrecision> {
    pub problem: MatmulProblem,
    pub op: ElementwiseOp,
    pub lhs: HostTensor<P::Lhs>,
    pub rhs: HostTensor<P::Rhs>,
    pub scales: Vec<HostTensor<P::Scale>>,
    _precision: PhantomData<P>,
}

impl<P: MatmulPrecision> ScaledMatmulInputs<P> {
    pub fn generate(
        problem: MatmulProblem,
        op: ElementwiseOp,
        operand_init: TensorInit,
        scale_init: TensorInit,
        seed: u64,
    ) -> Self {
        let mut rng = get_rng_from_seed(seed);
        let MatmulProblem { batches, m, n, k } = problem;

        let lhs = HostTensor::row_major(batches, m, k).with_init(
            operand_init,
            TensorRole::Operand,
            &mut rng,
        );
        let rhs = HostTensor::col_major(batches, k, n).with_init(
            operand_init,
            TensorRole::Operand,
            &mut rng,
        );
        let scales = (0..op.num_aux())
            .map(|index| {
                let scale = match index % 2 {
                    0 => HostTensor::row_broadcast(batches, m, n),
                    _ => HostTensor::col_broadcast(batches, m, n),
                };
                scale.with_init(scale_init, TensorRole::Scale, &mut rng)
            })
            .collect();

        Self {
            problem,
            op,
            lhs,
            rhs,
            scales,
            _precision: PhantomData,
        }
    }

    /// Same inputs consumed by another epilogue, dropping or reusing scales as needed.
    pub fn with_op(&self, op: ElementwiseOp) -> Self {
        let scales = self.scales.iter().cycle().take(op.num_aux()).cloned().collect();

        Self {
            problem: self.problem,
            op,
            lhs: self.lhs.clone(),
            rhs: self.rhs.clone(),
            scales,
            _precision: PhantomData,
        }
    }

    /// The inputs of one batch, as a single-batch problem.
    pub fn single_batch(&self, batch: usize) -> Self {
        Self {
            problem: MatmulProblem::new(1, self.problem.m, self.problem.n, self.problem.k),
            op: self.op,
            lhs: self.lhs.batch(batch),
            rhs: self.rhs.batch(batch),
            scales: self.scales.iter().map(|scale| scale.batch(batch)).collect(),
            _precision: PhantomData,
        }
    }

    pub fn reference(&self) -> HostTensor<P::Out> {
        let MatmulProblem { batches, m, n, .. } = self.problem;
        let mut out = HostTensor::row_major(batches, m, n);

        reference_batched_scaled_matmul(
            &self.problem,
            self.op,
            &self.lhs,
            &self.rhs,
            &self.scales,
            &mut out,
        );

        out
    }

    /// Launches on a zeroed row-major output and reads it back.
    pub fn launch(
        &self,
        matmul: &BatchedScaledMatmul,
    ) -> Result<HostTensor<P::Out>, MatmulLaunchError> {
        let MatmulProblem { batches, m, n, .. } = self.problem;
        self.launch_into(matmul, HostTensor::row_major(batches, m, n))
    }

    /// Launches on `out`, keeping its strides and every element the launch doesn't write.
    pub fn launch_into(
        &self,
        matmul: &BatchedScaledMatmul,
        out: HostTensor<P::Out>,
    ) -> Result<HostTensor<P::Out>, MatmulLaunchError> {
        let client = matmul.client();
        let args = ScaledMatmulArgs::new(
            self.problem,
            self.lhs.to_device(client),
            self.rhs.to_device(client),
            self.scales
                .iter()
                .map(|scale| scale.to_device(client))
                .collect(),
            out.to_device(client),
        );

        matmul.launch(&args)?;

        Ok(HostTensor::from_device(client, &args.out)?)
    }
}

/// Creates the instance, panicking with the reason when the descriptor is invalid.
pub fn matmul_instance<P: MatmulPrecision>(
    client: &ComputeClient,
    descriptor: TileDescriptor,
) -> BatchedScaledMatmul {
    match BatchedScaledMatmul::new(client, descriptor, P::elems()) {
        Ok(matmul) => matmul,
        Err(err) => panic!("Invalid test descriptor: {err}"),
    }
}

/// Output values as `f32`, for readable comparisons.
pub fn values<E: scalemm_common::Element>(tensor: &HostTensor<E>) -> Vec<f32> {
    tensor.indices().map(|(b, r, c)| tensor.get(b, r, c).to_f32()).collect()
}

/// Output encodings, for bit-exact comparisons.
pub fn bits<E: scalemm_common::Element>(tensor: &HostTensor<E>) -> Vec<Vec<u8>> {
    tensor
        .indices()
        .map(|(b, r, c)| bytemuck::bytes_of(&tensor.get(b, r, c)).to_vec())
        .collect()
}
