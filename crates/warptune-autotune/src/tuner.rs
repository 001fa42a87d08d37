//! The per-call-site tuning state machine.

use crate::error::TuneError;
use crate::results::RunAggregator;
use crate::strategy::{SearchStrategy, Strategy};
use std::sync::Arc;
use warptune_backend::{Dim3, Driver, Event, LaunchArg, Stream};
use warptune_compile::ModuleCompiler;
use warptune_core::{Config, KernelType};
use warptune_kernel::{BuildError, CompiledKernel, KernelBuilder, KernelError};

/// State of one tuning session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TunerState {
    Uninitialized,
    /// The current configuration's module is being built in the background.
    Compiling,
    /// The current module is ready; the next dispatch is a measured launch.
    Tuning,
    /// A measured launch is in flight; its timing has not been collected yet.
    Measuring,
    /// The search is exhausted; every dispatch launches the best variant.
    Finished,
}

/// A kernel that tunes itself while the application runs.
///
/// The state machine is cooperative: it only advances when the application
/// dispatches a launch, and it never blocks application progress while a
/// usable fallback module exists. One instance serves one call site and is
/// not thread-safe.
pub struct TunedKernel {
    state: TunerState,
    builder: Option<KernelBuilder>,
    strategy: Option<Strategy>,
    compiler: Option<Arc<dyn ModuleCompiler>>,
    driver: Arc<dyn Driver>,
    parameter_types: Vec<KernelType>,

    before_event: Event,
    after_event: Event,

    best_performance: f64,
    best_kernel: Option<CompiledKernel>,

    current_config: Config,
    current_kernel: Option<CompiledKernel>,
    current_problem: Dim3,
    aggregator: RunAggregator,
}

impl TunedKernel {
    /// Start a tuning session: ask the strategy for the first configuration
    /// and submit its compilation.
    pub fn new(
        builder: KernelBuilder,
        parameter_types: Vec<KernelType>,
        mut strategy: Strategy,
        compiler: Arc<dyn ModuleCompiler>,
        driver: Arc<dyn Driver>,
        aggregator: RunAggregator,
    ) -> Result<TunedKernel, TuneError> {
        let before_event = Event::new(&driver)?;
        let after_event = Event::new(&driver)?;

        let mut current_config = Config::new();
        if !strategy.init(&builder, &mut current_config)? {
            return Err(TuneError::NoValidConfig);
        }

        let mut tuner = TunedKernel {
            state: TunerState::Uninitialized,
            builder: Some(builder),
            strategy: Some(strategy),
            compiler: Some(compiler),
            driver,
            parameter_types,
            before_event,
            after_event,
            best_performance: f64::NEG_INFINITY,
            best_kernel: None,
            current_config,
            current_kernel: None,
            current_problem: Dim3::ones(),
            aggregator,
        };

        tuner.next_configuration()?;
        Ok(tuner)
    }

    pub fn state(&self) -> TunerState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == TunerState::Finished
    }

    /// Best aggregate performance seen so far; non-decreasing over the
    /// session's lifetime.
    pub fn best_performance(&self) -> f64 {
        self.best_performance
    }

    /// Dispatch one application launch, advancing the tuning state machine.
    pub fn launch(
        &mut self,
        stream: &Stream,
        problem_size: Dim3,
        args: &[LaunchArg],
    ) -> Result<(), TuneError> {
        loop {
            match self.state {
                TunerState::Finished => {
                    let best = self
                        .best_kernel
                        .as_mut()
                        .ok_or(TuneError::NoUsableKernel)?;
                    best.launch(stream, problem_size, args)?;
                    return Ok(());
                }

                TunerState::Measuring => {
                    self.after_event.synchronize()?;
                    let seconds = self.after_event.seconds_elapsed_since(&self.before_event)?;
                    self.aggregator.add(self.current_problem, seconds);
                    self.state = TunerState::Tuning;

                    if let Some(performance) = self.aggregator.collect() {
                        if performance > self.best_performance {
                            self.best_performance = performance;
                            self.best_kernel = self.current_kernel.take();
                        }

                        tracing::debug!(
                            performance,
                            best = self.best_performance,
                            "configuration measured"
                        );

                        if self.submit_to_strategy(performance)? {
                            self.next_configuration()?;
                        } else {
                            self.finish();
                        }
                    }
                }

                TunerState::Tuning => {
                    self.before_event.record(stream)?;
                    let kernel = self
                        .current_kernel
                        .as_mut()
                        .expect("current kernel present while tuning");
                    kernel.launch(stream, problem_size, args)?;
                    self.after_event.record(stream)?;

                    self.current_problem = problem_size;
                    self.state = TunerState::Measuring;
                    return Ok(());
                }

                TunerState::Compiling => {
                    let current_ready = self
                        .current_kernel
                        .as_ref()
                        .is_some_and(CompiledKernel::ready);

                    if current_ready {
                        self.resolve_current()?;
                    } else if self.best_kernel.as_ref().is_some_and(CompiledKernel::ready) {
                        // keep the application moving on the best variant
                        let best = self.best_kernel.as_mut().expect("best kernel checked");
                        best.launch(stream, problem_size, args)?;
                        return Ok(());
                    } else {
                        // nothing to fall back to: wait for the compilation
                        self.resolve_current()?;
                    }
                }

                TunerState::Uninitialized => return Err(TuneError::Uninitialized),
            }
        }
    }

    /// Wait for the in-flight module and either start tuning it or report the
    /// configuration as failed.
    fn resolve_current(&mut self) -> Result<(), TuneError> {
        let kernel = self
            .current_kernel
            .as_mut()
            .expect("current kernel present while compiling");

        match kernel.wait_ready() {
            Ok(()) => {
                self.state = TunerState::Tuning;
                Ok(())
            }
            Err(KernelError::Compile(err)) => {
                tracing::warn!(error = %err, "configuration failed to compile, excluding it");
                self.current_kernel = None;
                if self.submit_to_strategy(f64::NEG_INFINITY)? {
                    self.next_configuration()
                } else {
                    self.finish();
                    Ok(())
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    fn submit_to_strategy(&mut self, performance: f64) -> Result<bool, TuneError> {
        self.strategy
            .as_mut()
            .expect("strategy present while tuning")
            .submit(performance, &mut self.current_config)
    }

    /// Submit compilation of the current configuration.
    ///
    /// A synchronous compiler rejection excludes the configuration and moves
    /// on; every other failure propagates.
    fn next_configuration(&mut self) -> Result<(), TuneError> {
        loop {
            let builder = self.builder.as_ref().expect("builder present while tuning");
            let compiler = self
                .compiler
                .as_ref()
                .expect("compiler present while tuning");

            match builder.compile(
                &self.current_config,
                &self.parameter_types,
                compiler,
                &self.driver,
            ) {
                Ok(kernel) => {
                    self.current_kernel = Some(kernel);
                    self.aggregator.reset();
                    self.state = TunerState::Compiling;
                    return Ok(());
                }
                Err(BuildError::Compile(err)) => {
                    tracing::warn!(error = %err, "configuration failed to compile, excluding it");
                    if !self.submit_to_strategy(f64::NEG_INFINITY)? {
                        self.finish();
                        return Ok(());
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Enter the terminal state and drop everything tuning needed.
    fn finish(&mut self) {
        tracing::debug!(best = self.best_performance, "tuning finished");
        self.state = TunerState::Finished;
        self.builder = None;
        self.strategy = None;
        self.compiler = None;
        self.current_kernel = None;
    }
}

/// Synchronously tune `builder` by measuring configurations with `measure`,
/// persisting every measurement at `path`.
///
/// If the cache already holds results, the best known configuration is
/// returned immediately. Otherwise the strategy runs to exhaustion and the
/// best configuration found is returned.
pub fn tune_blocking(
    path: impl AsRef<std::path::Path>,
    mut strategy: Strategy,
    builder: &KernelBuilder,
    device: &crate::cache::DeviceInfo,
    mut measure: impl FnMut(&Config) -> Result<f64, TuneError>,
) -> Result<Config, TuneError> {
    let (mut cache, prior_best) = crate::cache::TuningCache::open(path, builder, device)?;
    if let Some(best) = prior_best {
        return Ok(best);
    }

    let mut current = Config::new();
    if !strategy.init(builder, &mut current)? {
        return Err(TuneError::NoValidConfig);
    }

    let mut best_config = current.clone();
    let mut best_performance = f64::NEG_INFINITY;

    loop {
        let performance = match cache.find(&current) {
            Some(known) => known,
            None => {
                let measured = measure(&current)?;
                cache.append(&current, measured)?;
                measured
            }
        };

        if performance > best_performance {
            best_performance = performance;
            best_config = current.clone();
        }

        if !strategy.submit(performance, &mut current)? {
            return Ok(best_config);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DeviceInfo;
    use warptune_compile::KernelSource;

    fn builder() -> KernelBuilder {
        let mut builder = KernelBuilder::new(
            KernelSource::inline("k.cu", "__global__ void k() {}"),
            "k",
        );
        let foo = builder.tune("foo", vec![1, 2, 3]).unwrap();
        let bar = builder.tune("bar", vec![1, 2, 3]).unwrap();
        builder.restrict(foo.le(&bar));
        builder
    }

    fn device() -> DeviceInfo {
        DeviceInfo {
            device_name: "Sim Device".to_string(),
            driver_version: 12020,
            hostname: "test-host".to_string(),
        }
    }

    fn score(builder: &KernelBuilder, config: &Config) -> f64 {
        let foo = builder.space().param("foo").unwrap();
        let bar = builder.space().param("bar").unwrap();
        let foo = config.get(foo).unwrap().to_i64().unwrap() as f64;
        let bar = config.get(bar).unwrap().to_i64().unwrap() as f64;
        // maximized at foo=1, bar=3
        10.0 * bar - foo
    }

    #[test]
    fn blocking_tuning_returns_the_best_measured_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let builder = builder();

        let mut measured = 0;
        let best = tune_blocking(&path, Strategy::random(), &builder, &device(), |config| {
            measured += 1;
            Ok(score(&builder, config))
        })
        .unwrap();

        assert_eq!(measured, 6);
        assert_eq!(score(&builder, &best), 29.0);

        // a second run answers from the cache without measuring anything
        let replayed = tune_blocking(&path, Strategy::random(), &builder, &device(), |_| {
            panic!("cache should answer every configuration")
        })
        .unwrap();
        assert_eq!(score(&builder, &replayed), 29.0);
    }

    #[test]
    fn blocking_tuning_rejects_an_unsatisfiable_space() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let mut builder = KernelBuilder::new(
            KernelSource::inline("k.cu", "__global__ void k() {}"),
            "k",
        );
        let foo = builder.tune("foo", vec![1, 2]).unwrap();
        builder.restrict(foo.gt(5));

        let result = tune_blocking(&path, Strategy::random(), &builder, &device(), |_| Ok(1.0));
        assert!(matches!(result, Err(TuneError::NoValidConfig)));
    }
}
