//! Compiler for the sim driver.

use crate::compiler::{CompileJob, ModuleCompiler};
use crate::error::CompileError;
use crate::symbol::{assemble_options, symbol_expression};
use std::sync::Arc;
use warptune_backend::{Driver, GpuModule};

type CostModel = dyn Fn(&CompileJob) -> Result<f64, CompileError> + Send + Sync;

/// Produces fake modules whose simulated launch duration comes from a cost
/// model over the compile job.
///
/// Tests use the cost model to make one configuration faster than another:
/// the cost is embedded into the fake image, and [`warptune_backend::SimDriver`]
/// charges it to the stream clock on every launch.
pub struct SimCompiler {
    cost_model: Box<CostModel>,
}

impl SimCompiler {
    /// Constant-cost compiler.
    pub fn new() -> SimCompiler {
        SimCompiler::with_cost(1e-3)
    }

    pub fn with_cost(seconds: f64) -> SimCompiler {
        SimCompiler {
            cost_model: Box::new(move |_| Ok(seconds)),
        }
    }

    /// Derive the launch duration from the compile job (typically from its
    /// `--define-macro` options). Returning an error simulates a kernel the
    /// toolchain rejects.
    pub fn with_cost_model(
        model: impl Fn(&CompileJob) -> Result<f64, CompileError> + Send + Sync + 'static,
    ) -> SimCompiler {
        SimCompiler {
            cost_model: Box::new(model),
        }
    }
}

impl Default for SimCompiler {
    fn default() -> SimCompiler {
        SimCompiler::new()
    }
}

impl ModuleCompiler for SimCompiler {
    fn compile_blocking(
        &self,
        job: &CompileJob,
        driver: &Arc<dyn Driver>,
    ) -> Result<GpuModule, CompileError> {
        // reading validates that file-backed sources exist
        let _contents = job.source.read()?;

        let device = match job.device {
            Some(device) => device,
            None => driver.current_device()?,
        };
        let capability = driver.compute_capability(device)?;
        let options = assemble_options(&job.options, capability);

        let cost = (self.cost_model)(job)?;
        let symbol = symbol_expression(&job.entry, &job.template_args, &job.parameter_types);
        let image = format!(
            "warptune-sim-ptx symbol={symbol} cost={cost} options={}",
            options.join(" ")
        );

        GpuModule::load(driver, &image, &symbol).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::KernelSource;
    use warptune_backend::{Dim3, SimDriver, Stream};

    fn job_with_tile(tile: &str) -> CompileJob {
        CompileJob {
            source: KernelSource::inline("k.cu", "__global__ void k() {}"),
            entry: "k".to_string(),
            template_args: vec![],
            parameter_types: vec![],
            options: vec!["--define-macro".to_string(), format!("TILE={tile}")],
            device: None,
        }
    }

    #[test]
    fn cost_model_drives_the_virtual_clock() {
        let sim = Arc::new(SimDriver::new());
        let driver: Arc<dyn Driver> = Arc::clone(&sim) as Arc<dyn Driver>;

        let compiler = SimCompiler::with_cost_model(|job| {
            let tile: f64 = job.define_value("TILE").unwrap().parse().unwrap();
            Ok(1.0 / tile)
        });

        let module = compiler
            .compile_blocking(&job_with_tile("4"), &driver)
            .unwrap();

        let stream = Stream::new(&driver).unwrap();
        module
            .launch(Dim3::ones(), Dim3::ones(), 0, &stream, &[])
            .unwrap();
        assert_eq!(sim.stream_clock(stream.raw()), 0.25);
    }

    #[test]
    fn rejection_surfaces_as_compile_error() {
        let driver: Arc<dyn Driver> = Arc::new(SimDriver::new());
        let compiler = SimCompiler::with_cost_model(|job| {
            Err(CompileError::Rejected {
                kernel: job.entry.clone(),
                log: "error: identifier \"TILE\" is undefined".to_string(),
            })
        });

        assert!(matches!(
            compiler.compile_blocking(&job_with_tile("4"), &driver),
            Err(CompileError::Rejected { .. })
        ));
    }
}
