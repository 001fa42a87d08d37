//! Tune a vector-add kernel against the sim driver.
//!
//! The sim compiler assigns each block size a synthetic launch duration, so
//! the session converges to the fastest configuration without real hardware.

use std::sync::Arc;
use warptune_autotune::{DeviceInfo, RunAggregator, Strategy, TunedKernel};
use warptune_backend::{DeviceBuffer, Dim3, Driver, SimDriver, Stream};
use warptune_compile::{KernelSource, ModuleCompiler, SimCompiler};
use warptune_core::KernelType;
use warptune_kernel::KernelBuilder;

const KERNEL: &str = r#"
__global__ void vector_add(float* c, const float* a, const float* b, unsigned int n) {
    unsigned int i = blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) {
        c[i] = a[i] + b[i];
    }
}
"#;

const N: u32 = 1_000_000;

fn main() -> anyhow::Result<()> {
    let sim = Arc::new(SimDriver::new());
    let driver: Arc<dyn Driver> = Arc::clone(&sim) as Arc<dyn Driver>;

    let mut builder = KernelBuilder::new(KernelSource::inline("vector_add.cu", KERNEL), "vector_add");
    let (block_x, _, _) = builder.tune_block_size(vec![32, 64, 128, 256, 512, 1024], vec![1], vec![1])?;
    builder.restrict(block_x.le(512));
    builder.define_param(&block_x)?;

    // pretend 256-wide blocks are the sweet spot
    let compiler: Arc<dyn ModuleCompiler> = Arc::new(SimCompiler::with_cost_model(|job| {
        let block: f64 = job
            .define_value("block_size_x")
            .and_then(|v| v.parse().ok())
            .unwrap_or(32.0);
        Ok(1e-3 + (block - 256.0).abs() * 1e-6)
    }));

    let parameter_types = vec![
        KernelType::of::<*mut f32>(),
        KernelType::of::<*const f32>(),
        KernelType::of::<*const f32>(),
        KernelType::of::<u32>(),
    ];

    let mut tuner = TunedKernel::new(
        builder,
        parameter_types,
        Strategy::random(),
        compiler,
        Arc::clone(&driver),
        RunAggregator::new(1, 3, 3600.0, 0),
    )?;

    let device = DeviceInfo::query(&driver)?;
    println!("tuning vector_add on {}", device.device_name);

    let stream = Stream::new(&driver)?;
    let a = DeviceBuffer::from_slice(&driver, &vec![1.0f32; N as usize])?;
    let b = DeviceBuffer::from_slice(&driver, &vec![2.0f32; N as usize])?;
    let c = DeviceBuffer::<f32>::allocate(&driver, N as usize)?;

    let mut dispatches = 0;
    while !tuner.is_finished() {
        tuner.launch(
            &stream,
            Dim3::from(N),
            &[c.arg(), a.arg(), b.arg(), N.into()],
        )?;
        dispatches += 1;
    }

    println!(
        "converged after {dispatches} dispatches; best performance {:.3e} elements/s",
        tuner.best_performance()
    );
    Ok(())
}
