//! Compiled kernel handles and problem-size to grid-size mapping.

use crate::error::KernelError;
use warptune_backend::{Dim3, LaunchArg, Stream};
use warptune_compile::{CompileError, PendingModule};

/// A kernel compiled for one configuration.
///
/// Bundles the eventually-available module with the launch geometry computed
/// from that configuration. The module future resolves lazily: `ready` polls
/// without blocking, `launch` waits if it has to.
#[derive(Debug)]
pub struct CompiledKernel {
    pending: Option<PendingModule>,
    module: Option<warptune_backend::GpuModule>,
    block_size: Dim3,
    grid_divisor: Dim3,
    shared_mem: u32,
}

impl CompiledKernel {
    pub fn new(
        pending: PendingModule,
        block_size: Dim3,
        grid_divisor: Dim3,
        shared_mem: u32,
    ) -> CompiledKernel {
        CompiledKernel {
            pending: Some(pending),
            module: None,
            block_size,
            grid_divisor,
            shared_mem,
        }
    }

    pub fn block_size(&self) -> Dim3 {
        self.block_size
    }

    pub fn grid_divisor(&self) -> Dim3 {
        self.grid_divisor
    }

    pub fn shared_mem(&self) -> u32 {
        self.shared_mem
    }

    /// Whether the module can be used without blocking.
    pub fn ready(&self) -> bool {
        self.module.is_some() || self.pending.as_ref().is_some_and(PendingModule::ready)
    }

    /// Block until compilation finishes and surface its result.
    pub fn wait_ready(&mut self) -> Result<(), KernelError> {
        self.resolve().map(|_| ())
    }

    fn resolve(&mut self) -> Result<&warptune_backend::GpuModule, KernelError> {
        if self.module.is_none() {
            let mut pending = self
                .pending
                .take()
                .ok_or(CompileError::WorkerLost)
                .map_err(KernelError::from)?;
            self.module = Some(pending.wait_take()?);
        }

        Ok(self.module.as_ref().expect("module resolved above"))
    }

    /// Grid size for `problem_size` under this kernel's divisors.
    pub fn grid_size(&self, problem_size: Dim3) -> Dim3 {
        Dim3::new(
            problem_size.x.div_ceil(self.grid_divisor.x),
            problem_size.y.div_ceil(self.grid_divisor.y),
            problem_size.z.div_ceil(self.grid_divisor.z),
        )
    }

    /// Enqueue the kernel on `stream` for `problem_size`.
    pub fn launch(
        &mut self,
        stream: &Stream,
        problem_size: Dim3,
        args: &[LaunchArg],
    ) -> Result<(), KernelError> {
        let grid = self.grid_size(problem_size);
        let block = self.block_size;
        let shared = self.shared_mem;
        let module = self.resolve()?;
        module.launch(grid, block, shared, stream, args)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use warptune_backend::{Driver, GpuModule, SimDriver};

    fn ready_kernel(driver: &Arc<dyn Driver>, divisor: Dim3) -> CompiledKernel {
        let module = GpuModule::load(driver, "sim cost=0.5", "k").unwrap();
        CompiledKernel::new(
            PendingModule::ready_now(Ok(module)),
            Dim3::new(64, 1, 1),
            divisor,
            0,
        )
    }

    #[test]
    fn grid_size_rounds_up() {
        let driver: Arc<dyn Driver> = Arc::new(SimDriver::new());
        let kernel = ready_kernel(&driver, Dim3::new(64, 16, 3));
        assert_eq!(
            kernel.grid_size(Dim3::new(100, 33, 3)),
            Dim3::new(2, 3, 1)
        );
        assert_eq!(kernel.grid_size(Dim3::new(64, 16, 3)), Dim3::new(1, 1, 1));
        assert_eq!(kernel.grid_size(Dim3::new(65, 17, 4)), Dim3::new(2, 2, 2));
    }

    #[test]
    fn launch_uses_the_computed_grid() {
        let sim = Arc::new(SimDriver::new());
        let driver: Arc<dyn Driver> = Arc::clone(&sim) as Arc<dyn Driver>;
        let mut kernel = ready_kernel(&driver, Dim3::new(64, 1, 1));

        let stream = Stream::new(&driver).unwrap();
        kernel
            .launch(&stream, Dim3::new(200, 1, 1), &[LaunchArg::U32(200)])
            .unwrap();

        let launches = sim.launches();
        assert_eq!(launches.len(), 1);
        assert_eq!(launches[0].grid, Dim3::new(4, 1, 1));
        assert_eq!(launches[0].block, Dim3::new(64, 1, 1));
        assert_eq!(launches[0].arg_count, 1);
    }

    #[test]
    fn failed_compilation_surfaces_on_launch() {
        let driver: Arc<dyn Driver> = Arc::new(SimDriver::new());
        let mut kernel = CompiledKernel::new(
            PendingModule::ready_now(Err(CompileError::Rejected {
                kernel: "k".to_string(),
                log: "boom".to_string(),
            })),
            Dim3::ones(),
            Dim3::ones(),
            0,
        );

        let stream = Stream::new(&driver).unwrap();
        assert!(matches!(
            kernel.launch(&stream, Dim3::ones(), &[]),
            Err(KernelError::Compile(CompileError::Rejected { .. }))
        ));
    }
}
