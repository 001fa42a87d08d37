//! Search strategies over a kernel's configuration space.
//!
//! A strategy produces a stream of configurations to measure: `init` yields
//! the first, each `submit` consumes the previous measurement and yields the
//! next, and `false` means the search is exhausted. The built-in strategies
//! form a closed set; user-supplied searchers plug in through
//! [`Strategy::custom`].

use crate::cache::{DeviceInfo, TuningCache};
use crate::error::TuneError;
use std::path::PathBuf;
use warptune_core::{Config, ConfigIterator, ConfigSpace, Param, Value};
use warptune_kernel::KernelBuilder;

/// Iterator-style searcher over a configuration space.
pub trait SearchStrategy: Send {
    /// Produce the first configuration to evaluate.
    fn init(&mut self, builder: &KernelBuilder, config: &mut Config) -> Result<bool, TuneError>;

    /// Consume the previous configuration's performance and produce the next.
    fn submit(&mut self, performance: f64, config: &mut Config) -> Result<bool, TuneError>;
}

/// The built-in strategies plus an escape hatch for user-supplied ones.
pub enum Strategy {
    Random(RandomStrategy),
    HillClimbing(HillClimbingStrategy),
    Limit(LimitStrategy),
    Caching(CachingStrategy),
    Custom(Box<dyn SearchStrategy>),
}

impl Strategy {
    /// Duplicate-free random enumeration of the space.
    pub fn random() -> Strategy {
        Strategy::Random(RandomStrategy::new())
    }

    /// Greedy neighborhood search reseeded from `inner`.
    pub fn hill_climbing(inner: Strategy) -> Strategy {
        Strategy::HillClimbing(HillClimbingStrategy::new(inner))
    }

    /// Stop `inner` after at most `max_evals` configurations.
    pub fn limit(max_evals: u64, inner: Strategy) -> Strategy {
        Strategy::Limit(LimitStrategy::new(max_evals, inner))
    }

    /// Persist `inner`'s measurements at `path` and replay known results.
    pub fn caching(path: impl Into<PathBuf>, device: DeviceInfo, inner: Strategy) -> Strategy {
        Strategy::Caching(CachingStrategy::new(path, device, inner))
    }

    pub fn custom(strategy: impl SearchStrategy + 'static) -> Strategy {
        Strategy::Custom(Box::new(strategy))
    }
}

impl Default for Strategy {
    fn default() -> Strategy {
        Strategy::random()
    }
}

impl SearchStrategy for Strategy {
    fn init(&mut self, builder: &KernelBuilder, config: &mut Config) -> Result<bool, TuneError> {
        match self {
            Strategy::Random(s) => s.init(builder, config),
            Strategy::HillClimbing(s) => s.init(builder, config),
            Strategy::Limit(s) => s.init(builder, config),
            Strategy::Caching(s) => s.init(builder, config),
            Strategy::Custom(s) => s.init(builder, config),
        }
    }

    fn submit(&mut self, performance: f64, config: &mut Config) -> Result<bool, TuneError> {
        match self {
            Strategy::Random(s) => s.submit(performance, config),
            Strategy::HillClimbing(s) => s.submit(performance, config),
            Strategy::Limit(s) => s.submit(performance, config),
            Strategy::Caching(s) => s.submit(performance, config),
            Strategy::Custom(s) => s.submit(performance, config),
        }
    }
}

/// Yields every valid configuration exactly once, in pseudo-random order.
#[derive(Default)]
pub struct RandomStrategy {
    iter: Option<ConfigIterator>,
}

impl RandomStrategy {
    pub fn new() -> RandomStrategy {
        RandomStrategy::default()
    }
}

impl SearchStrategy for RandomStrategy {
    fn init(&mut self, builder: &KernelBuilder, config: &mut Config) -> Result<bool, TuneError> {
        let mut iter = builder.iterate()?;
        let found = iter.next(config);
        self.iter = Some(iter);
        Ok(found)
    }

    fn submit(&mut self, _performance: f64, config: &mut Config) -> Result<bool, TuneError> {
        Ok(self.iter.as_mut().is_some_and(|iter| iter.next(config)))
    }
}

/// Local search: flip one parameter at a time, keep improvements, and restart
/// from the inner strategy when the neighborhood is exhausted.
pub struct HillClimbingStrategy {
    inner: Box<Strategy>,
    space: ConfigSpace,
    neighbors: Vec<(Param, Value)>,
    attempted: Vec<bool>,
    attempted_count: usize,
    best_performance: f64,
    best_config: Config,
}

impl HillClimbingStrategy {
    pub fn new(inner: Strategy) -> HillClimbingStrategy {
        HillClimbingStrategy {
            inner: Box::new(inner),
            space: ConfigSpace::new(),
            neighbors: Vec::new(),
            attempted: Vec::new(),
            attempted_count: 0,
            best_performance: f64::NEG_INFINITY,
            best_config: Config::new(),
        }
    }

    fn update_best(&mut self, performance: f64, config: &Config) {
        self.attempted.iter_mut().for_each(|seen| *seen = false);
        self.attempted_count = 0;
        self.best_performance = performance;
        self.best_config = config.clone();
    }
}

impl SearchStrategy for HillClimbingStrategy {
    fn init(&mut self, builder: &KernelBuilder, config: &mut Config) -> Result<bool, TuneError> {
        self.space = builder.space().clone();
        self.neighbors.clear();
        self.attempted.clear();

        for param in self.space.params() {
            for value in param.values() {
                self.neighbors.push((param.clone(), *value));
                self.attempted.push(false);
            }
        }

        if !self.inner.init(builder, config)? {
            return Ok(false);
        }

        self.update_best(0.0, config);
        Ok(self.space.size()? > 0)
    }

    fn submit(&mut self, performance: f64, config: &mut Config) -> Result<bool, TuneError> {
        if performance > self.best_performance {
            self.update_best(performance, config);
        } else {
            // walk back to the best known configuration
            *config = self.best_config.clone();
        }

        while self.attempted_count < self.neighbors.len() {
            let index = fastrand::usize(0..self.neighbors.len());
            if self.attempted[index] {
                continue;
            }
            self.attempted[index] = true;
            self.attempted_count += 1;

            let (param, new_value) = &self.neighbors[index];
            let old_value = *config.require(param)?;
            if old_value == *new_value {
                continue;
            }

            config.insert(param.clone(), *new_value);
            if !self.space.is_valid(config) {
                config.insert(param.clone(), old_value);
                continue;
            }

            return Ok(true);
        }

        // neighborhood exhausted: reseed from the inner strategy
        if !self.inner.submit(performance, config)? {
            return Ok(false);
        }

        self.update_best(0.0, config);
        Ok(true)
    }
}

/// Caps the number of configurations yielded by the inner strategy.
pub struct LimitStrategy {
    max_evals: u64,
    yielded: u64,
    inner: Box<Strategy>,
}

impl LimitStrategy {
    pub fn new(max_evals: u64, inner: Strategy) -> LimitStrategy {
        LimitStrategy {
            max_evals,
            yielded: 0,
            inner: Box::new(inner),
        }
    }
}

impl SearchStrategy for LimitStrategy {
    fn init(&mut self, builder: &KernelBuilder, config: &mut Config) -> Result<bool, TuneError> {
        self.yielded = 0;
        if self.max_evals == 0 || !self.inner.init(builder, config)? {
            return Ok(false);
        }
        self.yielded = 1;
        Ok(true)
    }

    fn submit(&mut self, performance: f64, config: &mut Config) -> Result<bool, TuneError> {
        if self.yielded >= self.max_evals || !self.inner.submit(performance, config)? {
            return Ok(false);
        }
        self.yielded += 1;
        Ok(true)
    }
}

/// Wraps any strategy with the persistent tuning cache.
///
/// On the first run after a cache hit, the cached best configuration is
/// emitted before the inner strategy's proposal so the application
/// immediately benefits from earlier sessions. Configurations whose
/// performance is already known are answered from the cache instead of being
/// measured again.
pub struct CachingStrategy {
    path: PathBuf,
    device: DeviceInfo,
    inner: Box<Strategy>,
    cache: Option<TuningCache>,
    first_run: bool,
    stashed: Option<Config>,
}

impl CachingStrategy {
    pub fn new(path: impl Into<PathBuf>, device: DeviceInfo, inner: Strategy) -> CachingStrategy {
        CachingStrategy {
            path: path.into(),
            device,
            inner: Box::new(inner),
            cache: None,
            first_run: false,
            stashed: None,
        }
    }

    /// Skip forward past configurations whose performance is cached.
    fn skip_known(&mut self, config: &mut Config) -> Result<bool, TuneError> {
        loop {
            let known = self.cache.as_ref().and_then(|cache| cache.find(config));
            match known {
                None => return Ok(true),
                Some(performance) => {
                    if !self.inner.submit(performance, config)? {
                        return Ok(false);
                    }
                }
            }
        }
    }
}

impl SearchStrategy for CachingStrategy {
    fn init(&mut self, builder: &KernelBuilder, config: &mut Config) -> Result<bool, TuneError> {
        if !self.inner.init(builder, config)? {
            return Ok(false);
        }

        let (cache, prior_best) = TuningCache::open(&self.path, builder, &self.device)?;
        self.cache = Some(cache);

        if let Some(best) = prior_best {
            self.first_run = true;
            self.stashed = Some(std::mem::replace(config, best));
            return Ok(true);
        }

        self.first_run = false;
        self.skip_known(config)
    }

    fn submit(&mut self, performance: f64, config: &mut Config) -> Result<bool, TuneError> {
        if self.first_run {
            // the measured config came from the cache; restore the inner
            // strategy's stashed proposal
            self.first_run = false;
            *config = self.stashed.take().expect("stashed first config");
        } else {
            if let Some(cache) = self.cache.as_mut() {
                cache.append(config, performance)?;
            }
            if !self.inner.submit(performance, config)? {
                return Ok(false);
            }
        }

        self.skip_known(config)
    }
}
