//! Aggregation of measured launches into one performance number.

use warptune_backend::Dim3;

/// Collects `(problem size, elapsed seconds)` samples for one configuration
/// and decides when enough have been seen.
///
/// Performance is total workload divided by total time over the kept samples,
/// where workload is the problem volume; higher is better. The slowest
/// `num_outliers` samples are discarded to suppress scheduling noise.
#[derive(Clone, Debug)]
pub struct RunAggregator {
    records: Vec<(Dim3, f64)>,
    min_evals: usize,
    max_evals: usize,
    max_seconds: f64,
    num_outliers: usize,
}

impl RunAggregator {
    pub fn new(
        min_evals: usize,
        max_evals: usize,
        max_seconds: f64,
        num_outliers: usize,
    ) -> RunAggregator {
        RunAggregator {
            records: Vec::new(),
            min_evals,
            max_evals,
            max_seconds,
            num_outliers,
        }
    }

    pub fn reset(&mut self) {
        self.records.clear();
    }

    pub fn add(&mut self, problem_size: Dim3, seconds: f64) {
        self.records.push((problem_size, seconds));
    }

    pub fn samples(&self) -> usize {
        self.records.len()
    }

    /// The aggregate performance, once enough samples are present.
    pub fn collect(&mut self) -> Option<f64> {
        if self.records.len() < self.min_evals + self.num_outliers {
            return None;
        }

        // slowest first, so skipping the prefix discards the outliers
        self.records
            .sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut total_workload = 0.0;
        let mut total_time = 0.0;
        for (problem, seconds) in self.records.iter().skip(self.num_outliers) {
            total_workload += problem.volume() as f64;
            total_time += seconds;
        }

        if self.records.len() < self.max_evals && total_time < self.max_seconds {
            return None;
        }

        Some(total_workload / total_time)
    }
}

impl Default for RunAggregator {
    fn default() -> RunAggregator {
        RunAggregator::new(0, 20, 1.0, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_min_evals_plus_outliers() {
        let mut agg = RunAggregator::new(2, 10, 1000.0, 1);
        agg.add(Dim3::from(100), 1.0);
        agg.add(Dim3::from(100), 1.0);
        assert_eq!(agg.collect(), None);

        // third sample satisfies min_evals + num_outliers but neither bound
        agg.add(Dim3::from(100), 1.0);
        assert_eq!(agg.collect(), None);
    }

    #[test]
    fn max_evals_triggers_collection() {
        let mut agg = RunAggregator::new(0, 3, 1000.0, 1);
        agg.add(Dim3::from(100), 2.0);
        agg.add(Dim3::from(100), 1.0);
        agg.add(Dim3::from(100), 1.0);

        // slowest sample (2.0 s) is discarded: 200 work in 2 s
        assert_eq!(agg.collect(), Some(100.0));
    }

    #[test]
    fn max_seconds_triggers_collection() {
        let mut agg = RunAggregator::new(1, 100, 0.5, 1);
        agg.add(Dim3::from(64), 0.4);
        agg.add(Dim3::from(64), 0.3);
        assert_eq!(agg.collect(), None); // kept time 0.3 < 0.5

        agg.add(Dim3::from(64), 0.3);
        // kept samples: 0.3 + 0.3 >= 0.5
        let perf = agg.collect().unwrap();
        assert!((perf - 128.0 / 0.6).abs() < 1e-9);
    }

    #[test]
    fn reset_discards_samples() {
        let mut agg = RunAggregator::new(0, 1, 1000.0, 0);
        agg.add(Dim3::from(10), 1.0);
        assert!(agg.collect().is_some());

        agg.reset();
        assert_eq!(agg.samples(), 0);
        assert_eq!(agg.collect(), None);
    }

    #[test]
    fn workload_is_the_problem_volume() {
        let mut agg = RunAggregator::new(0, 1, 1000.0, 0);
        agg.add(Dim3::new(8, 4, 2), 2.0);
        assert_eq!(agg.collect(), Some(32.0));
    }
}
