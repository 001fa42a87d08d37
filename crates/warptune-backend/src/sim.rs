//! Deterministic in-process driver used by tests and examples.
//!
//! The sim driver keeps a virtual clock per stream. Launching a module
//! advances the clock by the module's configured duration, and events record
//! the clock of the stream they are recorded on, so elapsed times are exact
//! and reproducible across runs. Device memory is backed by host vectors.

use crate::driver::{
    DeviceId, DevicePtr, Dim3, Driver, EventHandle, LaunchArg, ModuleHandle, StreamHandle,
};
use crate::error::DriverError;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// Duration of a launch whose image does not specify a cost.
const DEFAULT_LAUNCH_COST: f64 = 1e-3;

/// One recorded kernel launch.
#[derive(Clone, Debug)]
pub struct SimLaunch {
    pub symbol: String,
    pub grid: Dim3,
    pub block: Dim3,
    pub shared_mem: u32,
    pub arg_count: usize,
}

#[derive(Debug)]
struct SimModule {
    symbol: String,
    cost: f64,
}

#[derive(Debug, Default)]
struct SimState {
    next_handle: u64,
    next_addr: u64,
    streams: HashMap<u64, f64>,
    events: HashMap<u64, Option<f64>>,
    modules: HashMap<u64, SimModule>,
    allocations: BTreeMap<u64, Vec<u8>>,
    contexts: HashMap<i32, isize>,
    launches: Vec<SimLaunch>,
}

/// In-process [`Driver`] with a virtual clock.
#[derive(Debug)]
pub struct SimDriver {
    state: Mutex<SimState>,
    device_name: String,
    capability: (u32, u32),
    driver_version: u32,
}

impl SimDriver {
    pub fn new() -> SimDriver {
        let mut state = SimState {
            next_handle: 1,
            next_addr: 0x1000,
            ..SimState::default()
        };
        state.streams.insert(StreamHandle::DEFAULT.0, 0.0);

        SimDriver {
            state: Mutex::new(state),
            device_name: "Sim Device".to_string(),
            capability: (8, 0),
            driver_version: 12020,
        }
    }

    pub fn with_device_name(mut self, name: impl Into<String>) -> SimDriver {
        self.device_name = name.into();
        self
    }

    pub fn with_capability(mut self, major: u32, minor: u32) -> SimDriver {
        self.capability = (major, minor);
        self
    }

    /// Every launch recorded so far, in submission order.
    pub fn launches(&self) -> Vec<SimLaunch> {
        self.state.lock().unwrap().launches.clone()
    }

    pub fn launch_count(&self) -> usize {
        self.state.lock().unwrap().launches.len()
    }

    /// Current virtual clock of `stream`, in seconds.
    pub fn stream_clock(&self, stream: StreamHandle) -> f64 {
        self.state
            .lock()
            .unwrap()
            .streams
            .get(&stream.0)
            .copied()
            .unwrap_or(0.0)
    }

    fn fresh_handle(state: &mut SimState) -> u64 {
        let handle = state.next_handle;
        state.next_handle += 1;
        handle
    }

    fn resolve_range<'a>(
        state: &'a mut SimState,
        ptr: DevicePtr,
        bytes: usize,
    ) -> Result<&'a mut [u8], DriverError> {
        let (base, allocation) = state
            .allocations
            .range_mut(..=ptr.0)
            .next_back()
            .ok_or_else(|| DriverError::invalid_handle("unknown device pointer"))?;

        let offset = (ptr.0 - base) as usize;
        let end = offset
            .checked_add(bytes)
            .ok_or_else(|| DriverError::invalid_value("device range overflow"))?;
        if end > allocation.len() {
            return Err(DriverError::invalid_value("device range out of bounds"));
        }

        Ok(&mut allocation[offset..end])
    }
}

impl Default for SimDriver {
    fn default() -> SimDriver {
        SimDriver::new()
    }
}

/// Extract the simulated launch duration from a fake module image.
///
/// Compilers targeting the sim driver embed `cost=<seconds>` in the image.
fn parse_cost(image: &str) -> f64 {
    image
        .split(|c: char| c.is_whitespace() || c == ';')
        .find_map(|token| token.strip_prefix("cost="))
        .and_then(|cost| cost.parse().ok())
        .unwrap_or(DEFAULT_LAUNCH_COST)
}

impl Driver for SimDriver {
    fn device_count(&self) -> Result<usize, DriverError> {
        Ok(1)
    }

    fn current_device(&self) -> Result<DeviceId, DriverError> {
        Ok(DeviceId(0))
    }

    fn device_name(&self, device: DeviceId) -> Result<String, DriverError> {
        if device.0 != 0 {
            return Err(DriverError::invalid_handle("unknown device"));
        }
        Ok(self.device_name.clone())
    }

    fn compute_capability(&self, device: DeviceId) -> Result<(u32, u32), DriverError> {
        if device.0 != 0 {
            return Err(DriverError::invalid_handle("unknown device"));
        }
        Ok(self.capability)
    }

    fn driver_version(&self) -> Result<u32, DriverError> {
        Ok(self.driver_version)
    }

    fn retain_primary_context(&self, device: DeviceId) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        *state.contexts.entry(device.0).or_insert(0) += 1;
        Ok(())
    }

    fn release_primary_context(&self, device: DeviceId) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        let count = state
            .contexts
            .get_mut(&device.0)
            .ok_or_else(|| DriverError::invalid_handle("context not retained"))?;
        *count -= 1;
        Ok(())
    }

    fn bind_context(&self, device: DeviceId) -> Result<(), DriverError> {
        if device.0 != 0 {
            return Err(DriverError::invalid_handle("unknown device"));
        }
        Ok(())
    }

    fn create_stream(&self) -> Result<StreamHandle, DriverError> {
        let mut state = self.state.lock().unwrap();
        let handle = Self::fresh_handle(&mut state);
        state.streams.insert(handle, 0.0);
        Ok(StreamHandle(handle))
    }

    fn destroy_stream(&self, stream: StreamHandle) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state
            .streams
            .remove(&stream.0)
            .map(|_| ())
            .ok_or_else(|| DriverError::invalid_handle("unknown stream"))
    }

    fn create_event(&self) -> Result<EventHandle, DriverError> {
        let mut state = self.state.lock().unwrap();
        let handle = Self::fresh_handle(&mut state);
        state.events.insert(handle, None);
        Ok(EventHandle(handle))
    }

    fn destroy_event(&self, event: EventHandle) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state
            .events
            .remove(&event.0)
            .map(|_| ())
            .ok_or_else(|| DriverError::invalid_handle("unknown event"))
    }

    fn record_event(&self, event: EventHandle, stream: StreamHandle) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        let clock = *state
            .streams
            .get(&stream.0)
            .ok_or_else(|| DriverError::invalid_handle("unknown stream"))?;
        let slot = state
            .events
            .get_mut(&event.0)
            .ok_or_else(|| DriverError::invalid_handle("unknown event"))?;
        *slot = Some(clock);
        Ok(())
    }

    fn synchronize_event(&self, event: EventHandle) -> Result<(), DriverError> {
        let state = self.state.lock().unwrap();
        if !state.events.contains_key(&event.0) {
            return Err(DriverError::invalid_handle("unknown event"));
        }
        Ok(())
    }

    fn elapsed_seconds(
        &self,
        before: EventHandle,
        after: EventHandle,
    ) -> Result<f64, DriverError> {
        let state = self.state.lock().unwrap();
        let lookup = |handle: EventHandle| {
            state
                .events
                .get(&handle.0)
                .copied()
                .flatten()
                .ok_or_else(|| DriverError::invalid_handle("event was never recorded"))
        };
        Ok(lookup(after)? - lookup(before)?)
    }

    fn load_module(&self, image: &str, symbol: &str) -> Result<ModuleHandle, DriverError> {
        let mut state = self.state.lock().unwrap();
        let handle = Self::fresh_handle(&mut state);
        state.modules.insert(
            handle,
            SimModule {
                symbol: symbol.to_string(),
                cost: parse_cost(image),
            },
        );
        Ok(ModuleHandle(handle))
    }

    fn unload_module(&self, module: ModuleHandle) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state
            .modules
            .remove(&module.0)
            .map(|_| ())
            .ok_or_else(|| DriverError::invalid_handle("unknown module"))
    }

    fn launch_kernel(
        &self,
        module: ModuleHandle,
        grid: Dim3,
        block: Dim3,
        shared_mem: u32,
        stream: StreamHandle,
        args: &[LaunchArg],
    ) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        let (symbol, cost) = {
            let module = state
                .modules
                .get(&module.0)
                .ok_or_else(|| DriverError::invalid_handle("unknown module"))?;
            (module.symbol.clone(), module.cost)
        };

        let clock = state
            .streams
            .get_mut(&stream.0)
            .ok_or_else(|| DriverError::invalid_handle("unknown stream"))?;
        *clock += cost;

        state.launches.push(SimLaunch {
            symbol,
            grid,
            block,
            shared_mem,
            arg_count: args.len(),
        });
        Ok(())
    }

    fn allocate(&self, bytes: usize) -> Result<DevicePtr, DriverError> {
        let mut state = self.state.lock().unwrap();
        let addr = state.next_addr;
        let reserved = (bytes.max(1) as u64 + 255) & !255;
        state.next_addr += reserved;
        state.allocations.insert(addr, vec![0; bytes]);
        Ok(DevicePtr(addr))
    }

    fn free(&self, ptr: DevicePtr) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state
            .allocations
            .remove(&ptr.0)
            .map(|_| ())
            .ok_or_else(|| DriverError::invalid_handle("unknown allocation"))
    }

    fn copy_to_device(&self, dst: DevicePtr, src: &[u8]) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        Self::resolve_range(&mut state, dst, src.len())?.copy_from_slice(src);
        Ok(())
    }

    fn copy_to_host(&self, dst: &mut [u8], src: DevicePtr) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        let range = Self::resolve_range(&mut state, src, dst.len())?;
        dst.copy_from_slice(range);
        Ok(())
    }

    fn copy_device_to_device(
        &self,
        dst: DevicePtr,
        src: DevicePtr,
        bytes: usize,
    ) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        let staged = Self::resolve_range(&mut state, src, bytes)?.to_vec();
        Self::resolve_range(&mut state, dst, bytes)?.copy_from_slice(&staged);
        Ok(())
    }

    fn memset_d8(&self, ptr: DevicePtr, value: u8, count: usize) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        Self::resolve_range(&mut state, ptr, count)?.fill(value);
        Ok(())
    }

    fn memset_d16(&self, ptr: DevicePtr, value: u16, count: usize) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        let range = Self::resolve_range(&mut state, ptr, count * 2)?;
        for chunk in range.chunks_exact_mut(2) {
            chunk.copy_from_slice(&value.to_ne_bytes());
        }
        Ok(())
    }

    fn memset_d32(&self, ptr: DevicePtr, value: u32, count: usize) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        let range = Self::resolve_range(&mut state, ptr, count * 4)?;
        for chunk in range.chunks_exact_mut(4) {
            chunk.copy_from_slice(&value.to_ne_bytes());
        }
        Ok(())
    }
}
