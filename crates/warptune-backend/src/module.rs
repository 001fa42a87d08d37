//! Loaded GPU modules.

use crate::driver::{Dim3, Driver, LaunchArg, ModuleHandle};
use crate::error::DriverError;
use crate::stream::Stream;
use std::fmt;
use std::sync::Arc;

/// A compiled binary loaded into the driver plus its launchable symbol.
pub struct GpuModule {
    driver: Arc<dyn Driver>,
    raw: ModuleHandle,
    symbol: String,
}

impl GpuModule {
    /// Load a compiled image and resolve `symbol` to a launchable handle.
    pub fn load(
        driver: &Arc<dyn Driver>,
        image: &str,
        symbol: &str,
    ) -> Result<GpuModule, DriverError> {
        let raw = driver.load_module(image, symbol)?;
        Ok(GpuModule {
            driver: Arc::clone(driver),
            raw,
            symbol: symbol.to_string(),
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn launch(
        &self,
        grid: Dim3,
        block: Dim3,
        shared_mem: u32,
        stream: &Stream,
        args: &[LaunchArg],
    ) -> Result<(), DriverError> {
        self.driver
            .launch_kernel(self.raw, grid, block, shared_mem, stream.raw(), args)
    }
}

impl Drop for GpuModule {
    fn drop(&mut self) {
        if let Err(err) = self.driver.unload_module(self.raw) {
            tracing::debug!(error = %err, symbol = %self.symbol, "failed to unload module");
        }
    }
}

impl fmt::Debug for GpuModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuModule")
            .field("handle", &self.raw)
            .field("symbol", &self.symbol)
            .finish()
    }
}
