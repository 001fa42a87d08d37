//! Persistent tuning results.
//!
//! The cache is a UTF-8 text file: the first non-empty line is a JSON header
//! describing the kernel, device, and canonical parameter list; every further
//! non-empty line is one JSON record binding a configuration key to a
//! measured performance. Records are only ever appended, so concurrent
//! writers at worst interleave whole lines; unparsable records are skipped on
//! read instead of failing the session.

use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use warptune_backend::{Driver, DriverError};
use warptune_core::{Config, Param, Value};
use warptune_kernel::KernelBuilder;

const HEADER_MAGIC: &str = "warptune";
const HEADER_VERSION: &str = "0.1";

/// Identity of the device the cached results were measured on.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub device_name: String,
    pub driver_version: u32,
    pub hostname: String,
}

impl DeviceInfo {
    pub fn query(driver: &Arc<dyn Driver>) -> Result<DeviceInfo, DriverError> {
        let device = driver.current_device()?;
        Ok(DeviceInfo {
            device_name: driver.device_name(device)?,
            driver_version: driver.driver_version()?,
            hostname: std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string()),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheHeader {
    magic: String,
    version: String,
    kernel_name: String,
    kernel_source: String,
    device: String,
    hostname: String,
    date: String,
    cuda_driver: u32,
    parameters: Vec<HeaderParam>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HeaderParam {
    name: String,
    #[serde(rename = "type")]
    ty: String,
    values: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    key: String,
    config: serde_json::Value,
    date: String,
    performance: f64,
}

fn current_date() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%z").to_string()
}

/// Append-only, header-validated log of measured configurations.
pub struct TuningCache {
    path: PathBuf,
    parameters: Vec<Param>,
    entries: HashMap<String, f64>,
}

impl TuningCache {
    /// Open or create the cache at `path` for `builder`.
    ///
    /// Returns the cache together with the best previously recorded
    /// configuration, if the file held any records.
    pub fn open(
        path: impl AsRef<Path>,
        builder: &KernelBuilder,
        device: &DeviceInfo,
    ) -> Result<(TuningCache, Option<Config>), CacheError> {
        let path = path.as_ref().to_path_buf();

        let mut parameters = builder.params().to_vec();
        parameters.sort_by(|a, b| a.name().cmp(b.name()));

        let mut cache = TuningCache {
            path,
            parameters,
            entries: HashMap::new(),
        };

        if !cache.path.exists() {
            let header = cache.fresh_header(builder, device);
            let line = serde_json::to_string(&header).expect("header serializes");
            std::fs::write(&cache.path, line)?;
            return Ok((cache, None));
        }

        let contents = std::fs::read_to_string(&cache.path)?;
        let mut seen_header = false;
        let mut best: Option<(f64, serde_json::Value)> = None;

        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }

            if !seen_header {
                seen_header = true;
                let header: CacheHeader =
                    serde_json::from_str(line).map_err(|_| CacheError::Incompatible {
                        path: cache.path.display().to_string(),
                        reason: "invalid file format or file has been corrupted".to_string(),
                    })?;
                cache.validate_header(&header, builder, device)?;
                continue;
            }

            let record: CacheRecord = match serde_json::from_str(line) {
                Ok(record) => record,
                Err(err) => {
                    // tolerate torn writes from concurrent writers
                    tracing::warn!(
                        path = %cache.path.display(),
                        error = %err,
                        "skipping unparsable tuning record"
                    );
                    continue;
                }
            };

            if best
                .as_ref()
                .map_or(true, |(perf, _)| record.performance > *perf)
            {
                best = Some((record.performance, record.config.clone()));
            }
            cache.entries.insert(record.key, record.performance);
        }

        let best_config = match best {
            Some((_, config)) => Some(builder.load_config(&config)?),
            None => None,
        };

        Ok((cache, best_config))
    }

    fn fresh_header(&self, builder: &KernelBuilder, device: &DeviceInfo) -> CacheHeader {
        let parameters = self
            .parameters
            .iter()
            .map(|param| HeaderParam {
                name: param.name().to_string(),
                ty: param.ty().name().to_string(),
                values: param.values().iter().map(Value::to_json).collect(),
            })
            .collect();

        CacheHeader {
            magic: HEADER_MAGIC.to_string(),
            version: HEADER_VERSION.to_string(),
            kernel_name: builder.kernel_name().to_string(),
            kernel_source: builder.kernel_source().file_name().to_string(),
            device: device.device_name.clone(),
            hostname: device.hostname.clone(),
            date: current_date(),
            cuda_driver: device.driver_version,
            parameters,
        }
    }

    fn validate_header(
        &self,
        header: &CacheHeader,
        builder: &KernelBuilder,
        device: &DeviceInfo,
    ) -> Result<(), CacheError> {
        let incompatible = |reason: String| CacheError::Incompatible {
            path: self.path.display().to_string(),
            reason,
        };

        if header.magic != HEADER_MAGIC {
            return Err(incompatible(
                "invalid file format or file has been corrupted".to_string(),
            ));
        }

        if header.version != HEADER_VERSION {
            return Err(incompatible("invalid version number".to_string()));
        }

        if header.kernel_name != builder.kernel_name() {
            return Err(incompatible(format!(
                "results have been tuned for kernel '{}', but current kernel is '{}'",
                header.kernel_name,
                builder.kernel_name()
            )));
        }

        if header.device != device.device_name {
            return Err(incompatible(format!(
                "results have been tuned for device '{}', but current device is '{}'",
                header.device, device.device_name
            )));
        }

        let names_match = header.parameters.len() == self.parameters.len()
            && header
                .parameters
                .iter()
                .zip(&self.parameters)
                .all(|(recorded, param)| recorded.name == param.name());
        if !names_match {
            return Err(incompatible(
                "results have been tuned for different parameters".to_string(),
            ));
        }

        Ok(())
    }

    /// Canonical key: per-parameter string values in name-sorted order.
    fn canonical_key(&self, config: &Config) -> Result<String, CacheError> {
        let mut parts = Vec::with_capacity(self.parameters.len());
        for param in &self.parameters {
            parts.push(config.require(param)?.to_string());
        }
        Ok(parts.join("|"))
    }

    /// Append one measurement.
    pub fn append(&mut self, config: &Config, performance: f64) -> Result<(), CacheError> {
        let key = self.canonical_key(config)?;
        self.entries.insert(key.clone(), performance);

        let record = CacheRecord {
            key,
            config: config.to_json(),
            date: current_date(),
            performance,
        };

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(&record).expect("record serializes");
        write!(file, "\n{line}")?;
        Ok(())
    }

    /// Performance previously recorded for `config`, if any.
    pub fn find(&self, config: &Config) -> Option<f64> {
        let key = self.canonical_key(config).ok()?;
        self.entries.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warptune_compile::KernelSource;

    fn device() -> DeviceInfo {
        DeviceInfo {
            device_name: "Sim Device".to_string(),
            driver_version: 12020,
            hostname: "test-host".to_string(),
        }
    }

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

    fn config_for(builder: &KernelBuilder, foo: i64, bar: i64) -> Config {
        builder
            .load_config(&serde_json::json!({ "foo": foo, "bar": bar }))
            .unwrap()
    }

    #[test]
    fn fresh_cache_has_no_prior_best() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.json");

        let builder = builder();
        let (cache, best) = TuningCache::open(&path, &builder, &device()).unwrap();
        assert!(best.is_none());
        assert!(cache.is_empty());
        assert!(path.exists());
    }

    #[test]
    fn append_then_reopen_finds_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.json");
        let builder = builder();

        let config = config_for(&builder, 1, 2);
        {
            let (mut cache, _) = TuningCache::open(&path, &builder, &device()).unwrap();
            cache.append(&config, 123.5).unwrap();
            assert_eq!(cache.find(&config), Some(123.5));
        }

        let (cache, best) = TuningCache::open(&path, &builder, &device()).unwrap();
        assert_eq!(cache.find(&config), Some(123.5));
        assert_eq!(best.unwrap(), config);
    }

    #[test]
    fn reopening_replays_the_best_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.json");
        let builder = builder();

        {
            let (mut cache, _) = TuningCache::open(&path, &builder, &device()).unwrap();
            cache.append(&config_for(&builder, 1, 1), 1.0).unwrap();
            cache.append(&config_for(&builder, 1, 2), 2.5).unwrap();
            cache.append(&config_for(&builder, 2, 3), 1.8).unwrap();
        }

        let (_, best) = TuningCache::open(&path, &builder, &device()).unwrap();
        assert_eq!(best.unwrap(), config_for(&builder, 1, 2));
    }

    #[test]
    fn canonical_key_uses_name_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.json");
        let builder = builder();

        let (mut cache, _) = TuningCache::open(&path, &builder, &device()).unwrap();
        cache.append(&config_for(&builder, 1, 2), 1.0).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let record_line = contents.lines().nth(1).unwrap();
        let record: serde_json::Value = serde_json::from_str(record_line).unwrap();
        // "bar" sorts before "foo"
        assert_eq!(record["key"], "2|1");
    }

    #[test]
    fn malformed_records_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.json");
        let builder = builder();

        {
            let (mut cache, _) = TuningCache::open(&path, &builder, &device()).unwrap();
            cache.append(&config_for(&builder, 1, 1), 4.0).unwrap();
        }

        // simulate a torn concurrent write
        let mut contents = std::fs::read_to_string(&path).unwrap();
        contents.push_str("\n{\"key\":\"1|1\",\"perfor");
        std::fs::write(&path, contents).unwrap();

        let (cache, best) = TuningCache::open(&path, &builder, &device()).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(best.unwrap(), config_for(&builder, 1, 1));
    }

    #[test]
    fn unknown_header_keys_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.json");
        let builder = builder();

        {
            TuningCache::open(&path, &builder, &device()).unwrap();
        }

        let mut header: serde_json::Value =
            serde_json::from_str(std::fs::read_to_string(&path).unwrap().lines().next().unwrap())
                .unwrap();
        header["future_field"] = serde_json::json!({ "nested": true });
        std::fs::write(&path, header.to_string()).unwrap();

        assert!(TuningCache::open(&path, &builder, &device()).is_ok());
    }

    #[test]
    fn mismatched_device_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.json");
        let builder = builder();

        {
            TuningCache::open(&path, &builder, &device()).unwrap();
        }

        let other = DeviceInfo {
            device_name: "Different GPU".to_string(),
            ..device()
        };
        assert!(matches!(
            TuningCache::open(&path, &builder, &other),
            Err(CacheError::Incompatible { .. })
        ));
    }

    #[test]
    fn mismatched_kernel_and_parameters_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.json");

        {
            TuningCache::open(&path, &builder(), &device()).unwrap();
        }

        let mut renamed = KernelBuilder::new(
            KernelSource::inline("k.cu", "__global__ void other() {}"),
            "other",
        );
        renamed.tune("foo", vec![1, 2, 3]).unwrap();
        renamed.tune("bar", vec![1, 2, 3]).unwrap();
        assert!(matches!(
            TuningCache::open(&path, &renamed, &device()),
            Err(CacheError::Incompatible { .. })
        ));

        let mut different_params = KernelBuilder::new(
            KernelSource::inline("k.cu", "__global__ void k() {}"),
            "k",
        );
        different_params.tune("foo", vec![1, 2, 3]).unwrap();
        assert!(matches!(
            TuningCache::open(&path, &different_params, &device()),
            Err(CacheError::Incompatible { .. })
        ));
    }

    #[test]
    fn corrupted_header_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.json");
        std::fs::write(&path, "not json at all").unwrap();

        assert!(matches!(
            TuningCache::open(&path, &builder(), &device()),
            Err(CacheError::Incompatible { .. })
        ));
    }
}
