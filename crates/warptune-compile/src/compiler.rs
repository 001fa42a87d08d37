//! The compiler contract and the asynchronous decorator.

use crate::error::CompileError;
use crate::future::{module_channel, PendingModule};
use crate::source::KernelSource;
use std::sync::Arc;
use warptune_backend::{DeviceId, Driver, GpuModule};
use warptune_core::{KernelType, TemplateArg};

/// Everything one compilation needs.
#[derive(Clone, Debug)]
pub struct CompileJob {
    pub source: KernelSource,
    pub entry: String,
    pub template_args: Vec<TemplateArg>,
    pub parameter_types: Vec<KernelType>,
    pub options: Vec<String>,
    /// Target device; the driver's current device when absent.
    pub device: Option<DeviceId>,
}

impl CompileJob {
    /// Value of a `--define-macro NAME=VALUE` option pair, if present.
    pub fn define_value(&self, name: &str) -> Option<&str> {
        self.options
            .windows(2)
            .filter(|pair| pair[0] == "--define-macro")
            .find_map(|pair| {
                let (macro_name, value) = pair[1].split_once('=')?;
                (macro_name == name).then_some(value)
            })
    }
}

/// Contract of the source-to-module toolchain.
pub trait ModuleCompiler: Send + Sync {
    /// Compile `job` to a loaded module on the calling thread.
    fn compile_blocking(
        &self,
        job: &CompileJob,
        driver: &Arc<dyn Driver>,
    ) -> Result<GpuModule, CompileError>;

    /// Submit `job`, producing a module that becomes available eventually.
    ///
    /// The default implementation compiles synchronously and returns an
    /// already-resolved future; [`AsyncCompiler`] overrides this.
    fn compile(
        &self,
        job: CompileJob,
        driver: Arc<dyn Driver>,
    ) -> Result<PendingModule, CompileError> {
        Ok(PendingModule::ready_now(self.compile_blocking(&job, &driver)))
    }
}

impl<C: ModuleCompiler + ?Sized> ModuleCompiler for Arc<C> {
    fn compile_blocking(
        &self,
        job: &CompileJob,
        driver: &Arc<dyn Driver>,
    ) -> Result<GpuModule, CompileError> {
        (**self).compile_blocking(job, driver)
    }

    fn compile(
        &self,
        job: CompileJob,
        driver: Arc<dyn Driver>,
    ) -> Result<PendingModule, CompileError> {
        (**self).compile(job, driver)
    }
}

/// Runs any compiler on the rayon pool.
///
/// The worker binds the target device's primary context before delegating,
/// so the produced module belongs to the right device.
pub struct AsyncCompiler<C> {
    inner: Arc<C>,
}

impl<C> AsyncCompiler<C> {
    pub fn new(inner: C) -> AsyncCompiler<C> {
        AsyncCompiler {
            inner: Arc::new(inner),
        }
    }
}

impl<C: ModuleCompiler + 'static> ModuleCompiler for AsyncCompiler<C> {
    fn compile_blocking(
        &self,
        job: &CompileJob,
        driver: &Arc<dyn Driver>,
    ) -> Result<GpuModule, CompileError> {
        self.inner.compile_blocking(job, driver)
    }

    fn compile(
        &self,
        job: CompileJob,
        driver: Arc<dyn Driver>,
    ) -> Result<PendingModule, CompileError> {
        let device = match job.device {
            Some(device) => device,
            None => driver.current_device()?,
        };

        let inner = Arc::clone(&self.inner);
        let (promise, pending) = module_channel();

        rayon::spawn(move || {
            let result = driver
                .bind_context(device)
                .map_err(CompileError::from)
                .and_then(|()| inner.compile_blocking(&job, &driver));

            if let Err(err) = &result {
                tracing::debug!(error = %err, entry = %job.entry, "background compilation failed");
            }
            promise.fulfill(result);
        });

        Ok(pending)
    }
}
