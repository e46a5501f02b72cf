use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use half::bf16;
use scalemm_common::float::e4m3;
use scalemm_common::rand::get_rng_from_seed;
use scalemm_matmul::components::epilogue::ElementwiseOp;
use scalemm_matmul::components::tiling::{PipelineScheduler, PipelineVersion};
use scalemm_matmul::components::{MatmulElems, MatmulProblem};
use scalemm_matmul::host::{
    HostTensor, TensorInit, TensorRole, Tolerance, reference_batched_scaled_matmul, validate,
};
use scalemm_matmul::kernels::MatmulRegistry;
use scalemm_matmul::{BatchedScaledMatmul, ScaledMatmulArgs, UNSUPPORTED_TIMING};
use scalemm_runtime::ComputeClient;
use scalemm_runtime::profile::ProfileOptions;
use scalemm_runtime::properties::{DeviceProperties, HardwareGeneration};

/// Batched `E = (A x B) * D0 * D1` with fp8 operands, a row scale `D0`, a column scale `D1` and
/// a bf16 output.
///
/// A is row-major, B is column-major and E is row-major. Exits non-zero when the configuration
/// is unsupported or the verification fails.
#[derive(Parser, Debug)]
#[command(name = "rowwise-gemm")]
struct Cli {
    /// Compare the output with the host reference.
    #[arg(long)]
    verify: bool,

    /// 0: zeros, 1: integers, 2: decimals.
    #[arg(long, default_value_t = 1)]
    init: u8,

    /// Measure the kernel.
    #[arg(long)]
    time_kernel: bool,

    #[arg(short, default_value_t = 256)]
    m: usize,

    #[arg(short, default_value_t = 128)]
    n: usize,

    #[arg(short, default_value_t = 512)]
    k: usize,

    #[arg(long, default_value_t = 4)]
    batch: usize,

    /// Row stride of A, defaults to K.
    #[arg(long)]
    stride_a: Option<usize>,

    /// Column stride of B, defaults to K.
    #[arg(long)]
    stride_b: Option<usize>,

    /// Row stride of E, defaults to N.
    #[arg(long)]
    stride_e: Option<usize>,

    /// Defaults to `M * stride_a`.
    #[arg(long)]
    batch_stride_a: Option<usize>,

    /// Defaults to `N * stride_b`.
    #[arg(long)]
    batch_stride_b: Option<usize>,

    /// Defaults to `M * stride_e`.
    #[arg(long)]
    batch_stride_e: Option<usize>,

    /// Emulated device: cdna3, rdna4 or generic.
    #[arg(long, default_value = "cdna3")]
    generation: HardwareGeneration,

    /// Overrides the scheduler of the selected descriptor: interwave or intrawave.
    #[arg(long, value_parser = parse_scheduler)]
    scheduler: Option<PipelineScheduler>,

    /// Overrides the pipeline version of the selected descriptor: v1 or v2.
    #[arg(long, value_parser = parse_version)]
    version: Option<PipelineVersion>,

    /// Extra descriptors, tried before the built-in ones.
    #[arg(long)]
    registry: Option<PathBuf>,

    #[arg(long, default_value_t = 5)]
    warmup: usize,

    #[arg(long, default_value_t = 50)]
    repeat: usize,

    /// Non-zero levels log the instance on every launch.
    #[arg(long, default_value_t = 0)]
    log_level: u32,

    /// Seed of the generated inputs.
    #[arg(long, default_value_t = scalemm_common::rand::DEFAULT_SEED)]
    seed: u64,
}

fn parse_scheduler(value: &str) -> Result<PipelineScheduler, String> {
    match value.to_ascii_lowercase().as_str() {
        "interwave" => Ok(PipelineScheduler::Interwave),
        "intrawave" => Ok(PipelineScheduler::Intrawave),
        other => Err(format!("Unknown scheduler {other}")),
    }
}

fn parse_version(value: &str) -> Result<PipelineVersion, String> {
    match value.to_ascii_lowercase().as_str() {
        "v1" | "1" => Ok(PipelineVersion::V1),
        "v2" | "2" => Ok(PipelineVersion::V2),
        other => Err(format!("Unknown pipeline version {other}")),
    }
}

struct Inputs {
    lhs: HostTensor<e4m3>,
    rhs: HostTensor<e4m3>,
    d0: HostTensor<f32>,
    d1: HostTensor<f32>,
    out: HostTensor<bf16>,
}

impl Cli {
    fn problem(&self) -> MatmulProblem {
        MatmulProblem::new(self.batch, self.m, self.n, self.k)
    }

    fn inputs(&self) -> Result<Inputs> {
        let Some(init) = TensorInit::from_method(self.init) else {
            bail!("Unknown init method {}, expected 0, 1 or 2", self.init);
        };
        let (batch, m, n, k) = (self.batch, self.m, self.n, self.k);

        let stride_a = self.stride_a.unwrap_or(k);
        let stride_b = self.stride_b.unwrap_or(k);
        let stride_e = self.stride_e.unwrap_or(n);
        if stride_a < k || stride_b < k || stride_e < n {
            bail!("Strides {stride_a}, {stride_b}, {stride_e} are smaller than the matrices");
        }

        let a_strides = [self.batch_stride_a.unwrap_or(m * stride_a), stride_a, 1];
        let b_strides = [self.batch_stride_b.unwrap_or(n * stride_b), 1, stride_b];
        let e_strides = [self.batch_stride_e.unwrap_or(m * stride_e), stride_e, 1];

        let mut rng = get_rng_from_seed(self.seed);

        Ok(Inputs {
            lhs: HostTensor::new([batch, m, k], a_strides).with_init(
                init,
                TensorRole::Operand,
                &mut rng,
            ),
            rhs: HostTensor::new([batch, k, n], b_strides).with_init(
                init,
                TensorRole::Operand,
                &mut rng,
            ),
            d0: HostTensor::row_broadcast(batch, m, n).with_init(
                init,
                TensorRole::Scale,
                &mut rng,
            ),
            d1: HostTensor::col_broadcast(batch, m, n).with_init(
                init,
                TensorRole::Scale,
                &mut rng,
            ),
            out: HostTensor::new([batch, m, n], e_strides),
        })
    }

    fn matmul(&self, client: &ComputeClient) -> Result<BatchedScaledMatmul> {
        let mut registry = MatmulRegistry::default();
        if let Some(path) = &self.registry {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let count = registry
                .extend_from_toml(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            log::info!("Registered {count} descriptors from {}", path.display());
        }

        let elems = MatmulElems::REFERENCE;
        let selected = registry
            .select(client, &self.problem(), elems)
            .map_err(|err| anyhow::anyhow!("{err}"))?;

        if self.scheduler.is_none() && self.version.is_none() {
            return Ok(selected);
        }

        let mut descriptor = selected.config().descriptor().clone();
        if let Some(scheduler) = self.scheduler {
            descriptor = descriptor.with_scheduler(scheduler);
        }
        if let Some(version) = self.version {
            descriptor = descriptor.with_version(version);
        }

        BatchedScaledMatmul::new(client, descriptor, elems).map_err(|err| anyhow::anyhow!("{err}"))
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let problem = cli.problem();

    let client = ComputeClient::new(DeviceProperties::new(cli.generation));
    let matmul = cli.matmul(&client)?;
    let inputs = cli.inputs()?;

    println!("a: {:?} {:?}", inputs.lhs.shape(), inputs.lhs.strides());
    println!("b: {:?} {:?}", inputs.rhs.shape(), inputs.rhs.strides());
    println!("e: {:?} {:?}", inputs.out.shape(), inputs.out.strides());

    let args = ScaledMatmulArgs::new(
        problem,
        inputs.lhs.to_device(&client),
        inputs.rhs.to_device(&client),
        vec![inputs.d0.to_device(&client), inputs.d1.to_device(&client)],
        inputs.out.to_device(&client),
    );

    let options = ProfileOptions {
        time_kernel: cli.time_kernel,
        warmup_iterations: cli.warmup,
        repeat: cli.repeat,
        log_level: cli.log_level,
    };

    let time = matmul.run(&args, &options);
    if time == UNSUPPORTED_TIMING {
        bail!("{} doesn't support {problem}", matmul.type_string());
    }

    if cli.time_kernel {
        let bytes = problem.batches
            * (problem.m * problem.k * size_of::<e4m3>()
                + problem.k * problem.n * size_of::<e4m3>()
                + (problem.m + problem.n) * size_of::<f32>()
                + problem.m * problem.n * size_of::<bf16>());
        let tflops = problem.flops() as f64 / 1.0e9 / time as f64;
        let gb_per_sec = bytes as f64 / 1.0e6 / time as f64;

        println!(
            "Perf: {time:.5} ms, {tflops:.5} TFlops, {gb_per_sec:.5} GB/s, {}",
            matmul.type_string()
        );
    }

    if cli.verify {
        let actual = HostTensor::<bf16>::from_device(&client, &args.out)?;
        let mut expected = inputs.out.clone();
        reference_batched_scaled_matmul(
            &problem,
            ElementwiseOp::MultiplyMultiply,
            &inputs.lhs,
            &inputs.rhs,
            &[inputs.d0, inputs.d1],
            &mut expected,
        );

        let tolerance = Tolerance::for_elem(MatmulElems::REFERENCE.out);
        let failures: Vec<_> = validate(&actual, &expected, tolerance)
            .into_iter()
            .filter(|report| !report.is_ok())
            .collect();

        for report in &failures {
            println!("{report}");
        }
        if !failures.is_empty() {
            bail!("Verification failed on {} batches ({tolerance})", failures.len());
        }
        println!("Verification passed ({tolerance})");
    }

    client.profile_summary()?;

    Ok(())
}
