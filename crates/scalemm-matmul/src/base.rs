use std::sync::Arc;

use scalemm_runtime::ComputeClient;
use scalemm_runtime::kernel::CubeTask;
use scalemm_runtime::profile::ProfileOptions;

use crate::components::batch::{BatchDispatcher, TensorOffsets};
use crate::components::tiling::{GemmSpecialization, MatmulConfig, TileDescriptor};
use crate::components::{
    MatmulElems, MatmulIdent, MatmulLaunchError, MatmulProblem, MatmulSetupError, TensorArg,
    with_precision,
};
use crate::kernels::ScaledMatmulKernel;

/// Timing returned by [BatchedScaledMatmul::run] when the launch can't be performed.
pub const UNSUPPORTED_TIMING: f32 = -1.0;

/// Tensors of a batched scaled matmul `out = op(lhs * rhs, scales...)`.
///
/// `lhs` is `[batch, M, K]`, `rhs` is `[batch, K, N]`, every scale tensor and `out` are
/// `[batch, M, N]` (scales usually broadcast along one axis with a zero stride).
#[derive(new, Clone, Debug)]
pub struct ScaledMatmulArgs {
    pub problem: MatmulProblem,
    pub lhs: TensorArg,
    pub rhs: TensorArg,
    pub scales: Vec<TensorArg>,
    pub out: TensorArg,
}

/// A validated scaled matmul instance bound to a device.
///
/// The tile descriptor is validated once when the instance is created; problems are then
/// checked against it at every launch.
#[derive(Clone, Debug)]
pub struct BatchedScaledMatmul {
    client: ComputeClient,
    config: Arc<MatmulConfig>,
}

impl BatchedScaledMatmul {
    /// Validates the descriptor for the element types on the device of `client`.
    pub fn new(
        client: &ComputeClient,
        descriptor: TileDescriptor,
        elems: MatmulElems,
    ) -> Result<Self, MatmulSetupError> {
        let config = MatmulConfig::new(descriptor, elems, client.properties())?;

        Ok(Self {
            client: client.clone(),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &MatmulConfig {
        &self.config
    }

    pub fn client(&self) -> &ComputeClient {
        &self.client
    }

    /// Human readable description of the instance.
    pub fn type_string(&self) -> String {
        format!(
            "BatchedScaledMatmul<{}, {}, {}>",
            self.config.backend().name(),
            self.config.elems(),
            self.config.descriptor()
        )
    }

    /// Checks the parts of the launch that only depend on the problem shape.
    pub fn check_problem(&self, problem: &MatmulProblem) -> Result<(), MatmulLaunchError> {
        let descriptor = self.config.descriptor();

        if [problem.batches, problem.m, problem.n, problem.k].contains(&0) {
            return Err(MatmulLaunchError::Unsupported(format!(
                "Empty problem {problem}"
            )));
        }

        if descriptor.specialization == GemmSpecialization::Default {
            let blocks = [
                ("M", problem.m, descriptor.m_per_block),
                ("N", problem.n, descriptor.n_per_block),
                ("K", problem.k, descriptor.k_per_block),
            ];
            for (dim, extent, block) in blocks {
                if !extent.is_multiple_of(block as usize) {
                    return Err(MatmulLaunchError::Unsupported(format!(
                        "{dim}={extent} isn't a multiple of the block extent {block}, a padded specialization is required"
                    )));
                }
            }

            let num_loops = problem.k / descriptor.k_per_block as usize;
            let prefetch = descriptor.version.prefetch_depth() as usize;
            if num_loops < prefetch {
                return Err(MatmulLaunchError::Unsupported(format!(
                    "{num_loops} K iterations can't fill a pipeline prefetching {prefetch} stages"
                )));
            }
        }

        Ok(())
    }

    /// Checks that the tensors can be handled by this instance.
    pub fn check_support(&self, args: &ScaledMatmulArgs) -> Result<(), MatmulLaunchError> {
        self.dispatcher(args).map(|_| ())
    }

    fn dispatcher(&self, args: &ScaledMatmulArgs) -> Result<BatchDispatcher, MatmulLaunchError> {
        let problem = &args.problem;
        let config = &self.config;
        let elems = config.elems();
        self.check_problem(problem)?;

        let num_aux = config.descriptor().epilogue.num_aux();
        if args.scales.len() != num_aux {
            return Err(MatmulLaunchError::Unsupported(format!(
                "Epilogue {} expects {num_aux} scale tensors, got {}",
                config.descriptor().epilogue,
                args.scales.len()
            )));
        }

        let epilogue = config.descriptor().epilogue;
        for (index, scale) in args.scales.iter().enumerate() {
            if let Some(broadcast) = epilogue.aux_broadcast(index)
                && !broadcast.matches(&scale.strides)
            {
                return Err(MatmulLaunchError::Unsupported(format!(
                    "Epilogue {epilogue} needs scale {index} broadcast {broadcast:?}, got strides {:?}",
                    scale.strides
                )));
            }
        }

        let tensors = [
            ("lhs", &args.lhs, MatmulIdent::Lhs, elems.lhs),
            ("rhs", &args.rhs, MatmulIdent::Rhs, elems.rhs),
            ("out", &args.out, MatmulIdent::Out, elems.out),
        ]
        .into_iter()
        .chain(
            args.scales
                .iter()
                .map(|scale| ("scale", scale, MatmulIdent::Out, elems.scale)),
        );

        for (name, tensor, ident, elem) in tensors {
            self.check_tensor(name, tensor, problem.shape(ident), elem)?;
        }

        self.check_vectors(args)?;

        let descriptor = config.descriptor();
        let batch_strides = TensorOffsets {
            lhs: args.lhs.strides[0],
            rhs: args.rhs.strides[0],
            scales: args.scales.iter().map(|scale| scale.strides[0]).collect(),
            out: args.out.strides[0],
        };

        BatchDispatcher::new(
            problem,
            descriptor.m_per_block,
            descriptor.n_per_block,
            descriptor.global_order,
            batch_strides,
            self.client.properties().hardware.max_cube_count,
        )
        .map_err(MatmulLaunchError::Unsupported)
    }

    fn check_tensor(
        &self,
        name: &str,
        tensor: &TensorArg,
        shape: [usize; 3],
        elem: scalemm_common::ElemType,
    ) -> Result<(), MatmulLaunchError> {
        if tensor.shape != shape {
            return Err(MatmulLaunchError::Unsupported(format!(
                "Shape of {name} {:?} doesn't match the problem, expected {shape:?}",
                tensor.shape
            )));
        }

        if tensor.elem != elem {
            return Err(MatmulLaunchError::Unsupported(format!(
                "Element type of {name} is {}, the instance expects {elem}",
                tensor.elem
            )));
        }

        if !self.client.owns(&tensor.handle) {
            return Err(MatmulLaunchError::Unsupported(format!(
                "Buffer of {name} wasn't allocated on this device"
            )));
        }

        let required = tensor.required_len() * elem.size();
        if tensor.handle.size() < required {
            return Err(MatmulLaunchError::Unsupported(format!(
                "Buffer of {name} holds {} bytes, its strides address {required}",
                tensor.handle.size()
            )));
        }

        Ok(())
    }

    fn check_vectors(&self, args: &ScaledMatmulArgs) -> Result<(), MatmulLaunchError> {
        let config = &self.config;
        let problem = &args.problem;
        let unsupported = |reason: String| Err(MatmulLaunchError::Unsupported(reason));

        for (name, tensor, ident) in [
            ("lhs", &args.lhs, MatmulIdent::Lhs),
            ("rhs", &args.rhs, MatmulIdent::Rhs),
        ] {
            let transfer = config.transfer(ident);
            let vector = transfer.src_vector as usize;
            // Source vector dim 2 is K1, dim 1 is M for lhs and N for rhs.
            let along_k = transfer.src_vector_dim == 2;
            let (stride, extent) = match (ident, along_k) {
                (MatmulIdent::Lhs, true) => (tensor.strides[2], problem.k),
                (MatmulIdent::Lhs, false) => (tensor.strides[1], problem.m),
                (_, true) => (tensor.strides[1], problem.k),
                (_, false) => (tensor.strides[2], problem.n),
            };
            let dim = if along_k { "K" } else { "MN" };

            if vector > 1 && stride != 1 {
                return unsupported(format!(
                    "{name} is read with vectors of {vector} along {dim}, which needs a unit stride, got {stride}"
                ));
            }
            if !extent.is_multiple_of(vector) {
                return unsupported(format!(
                    "{name} extent {extent} along {dim} isn't a multiple of its vector width {vector}"
                ));
            }
        }

        let shuffle = config.shuffle();
        let outputs = args
            .scales
            .iter()
            .zip(shuffle.aux_vectors.iter())
            .map(|(scale, vector)| ("scale", scale, *vector, true))
            .chain([("out", &args.out, shuffle.out_vector, false)]);

        for (name, tensor, vector, can_broadcast) in outputs {
            let vector = vector as usize;
            let stride = tensor.strides[2];
            let contiguous = stride == 1 || (can_broadcast && stride == 0);

            if vector > 1 && !contiguous {
                return unsupported(format!(
                    "{name} is accessed with vectors of {vector} along N, which needs a unit stride, got {stride}"
                ));
            }
            if !problem.n.is_multiple_of(vector) {
                return unsupported(format!(
                    "N={} isn't a multiple of the {name} vector width {vector}",
                    problem.n
                ));
            }
        }

        Ok(())
    }

    fn kernel(
        &self,
        args: &ScaledMatmulArgs,
        dispatcher: BatchDispatcher,
    ) -> Result<Arc<dyn CubeTask>, MatmulLaunchError> {
        let config = self.config.clone();
        let args = args.clone();

        with_precision!(
            config.elems(),
            P => {
                let kernel: Arc<dyn CubeTask> = Arc::new(ScaledMatmulKernel::<P>::new(
                    config,
                    args.problem,
                    dispatcher,
                    args.lhs,
                    args.rhs,
                    args.scales,
                    args.out,
                ));
                Ok(kernel)
            },
            _ => Err(MatmulLaunchError::Unsupported(format!(
                "No kernel instantiated for {}",
                config.elems()
            )))
        )
    }

    /// Submits one launch to the default queue of the device without waiting for it.
    pub fn launch(&self, args: &ScaledMatmulArgs) -> Result<(), MatmulLaunchError> {
        let dispatcher = self.dispatcher(args)?;
        let cube_count = dispatcher.cube_count();
        let kernel = self.kernel(args, dispatcher)?;

        self.client.execute(kernel, cube_count)?;
        Ok(())
    }

    /// Launches the matmul following the instrumentation options and returns the mean time of a
    /// launch in milliseconds, zero when timing is disabled.
    pub fn try_run(
        &self,
        args: &ScaledMatmulArgs,
        options: &ProfileOptions,
    ) -> Result<f32, MatmulLaunchError> {
        let dispatcher = self.dispatcher(args)?;
        let cube_count = dispatcher.cube_count();
        let kernel = self.kernel(args, dispatcher)?;

        if options.log_level > 0 {
            log::info!(
                "Launching {} on {} ({cube_count} cubes)",
                self.type_string(),
                args.problem
            );
        }

        let duration = self.client.queue().profile(options, || {
            self.client.execute(kernel.clone(), cube_count)
        })?;

        Ok(duration.as_millis_f32())
    }

    /// Same as [try_run](Self::try_run), returning [UNSUPPORTED_TIMING] when the launch can't be
    /// performed.
    pub fn run(&self, args: &ScaledMatmulArgs, options: &ProfileOptions) -> f32 {
        match self.try_run(args, options) {
            Ok(time) => time,
            Err(MatmulLaunchError::Unsupported(reason)) => {
                log::warn!("{} skipped: {reason}", self.type_string());
                UNSUPPORTED_TIMING
            }
            Err(MatmulLaunchError::Server(err)) => {
                log::error!("{} failed: {err}", self.type_string());
                UNSUPPORTED_TIMING
            }
        }
    }
}
