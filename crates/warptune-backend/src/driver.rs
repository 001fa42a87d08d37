//! The driver contract consumed by the tuning core.

use crate::error::DriverError;
use std::fmt;

/// Index of a GPU device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeviceId(pub i32);

/// Opaque handle to a command stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StreamHandle(pub u64);

impl StreamHandle {
    /// The backend's default stream.
    pub const DEFAULT: StreamHandle = StreamHandle(0);
}

/// Opaque handle to a timing event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventHandle(pub u64);

/// Opaque handle to a loaded module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModuleHandle(pub u64);

/// Raw device memory address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DevicePtr(pub u64);

impl DevicePtr {
    pub fn offset(self, bytes: u64) -> DevicePtr {
        DevicePtr(self.0 + bytes)
    }
}

/// A three-dimensional extent: problem size, grid size, or block size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Dim3 {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Dim3 {
    pub fn new(x: u32, y: u32, z: u32) -> Dim3 {
        Dim3 { x, y, z }
    }

    pub fn ones() -> Dim3 {
        Dim3 { x: 1, y: 1, z: 1 }
    }

    pub fn volume(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }
}

impl Default for Dim3 {
    fn default() -> Dim3 {
        Dim3::ones()
    }
}

impl From<u32> for Dim3 {
    fn from(x: u32) -> Dim3 {
        Dim3 { x, y: 1, z: 1 }
    }
}

impl From<(u32, u32)> for Dim3 {
    fn from((x, y): (u32, u32)) -> Dim3 {
        Dim3 { x, y, z: 1 }
    }
}

impl From<(u32, u32, u32)> for Dim3 {
    fn from((x, y, z): (u32, u32, u32)) -> Dim3 {
        Dim3 { x, y, z }
    }
}

impl fmt::Display for Dim3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.x, self.y, self.z)
    }
}

/// A type-erased kernel launch argument.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LaunchArg {
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Ptr(DevicePtr),
}

macro_rules! launch_arg_from {
    ($($ty:ty => $variant:ident;)*) => {
        $(
            impl From<$ty> for LaunchArg {
                fn from(v: $ty) -> LaunchArg {
                    LaunchArg::$variant(v)
                }
            }
        )*
    };
}

launch_arg_from! {
    i32 => I32;
    u32 => U32;
    i64 => I64;
    u64 => U64;
    f32 => F32;
    f64 => F64;
    DevicePtr => Ptr;
}

/// Contract of the underlying GPU driver.
///
/// All operations are process-global; handles are plain integers owned by the
/// caller. Safe RAII wrappers live in this crate next to the trait.
pub trait Driver: Send + Sync {
    // device management
    fn device_count(&self) -> Result<usize, DriverError>;
    fn current_device(&self) -> Result<DeviceId, DriverError>;
    fn device_name(&self, device: DeviceId) -> Result<String, DriverError>;
    fn compute_capability(&self, device: DeviceId) -> Result<(u32, u32), DriverError>;
    fn driver_version(&self) -> Result<u32, DriverError>;
    fn retain_primary_context(&self, device: DeviceId) -> Result<(), DriverError>;
    fn release_primary_context(&self, device: DeviceId) -> Result<(), DriverError>;
    /// Associate the calling thread with `device`'s primary context.
    fn bind_context(&self, device: DeviceId) -> Result<(), DriverError>;

    // streams and events
    fn create_stream(&self) -> Result<StreamHandle, DriverError>;
    fn destroy_stream(&self, stream: StreamHandle) -> Result<(), DriverError>;
    fn create_event(&self) -> Result<EventHandle, DriverError>;
    fn destroy_event(&self, event: EventHandle) -> Result<(), DriverError>;
    fn record_event(&self, event: EventHandle, stream: StreamHandle) -> Result<(), DriverError>;
    fn synchronize_event(&self, event: EventHandle) -> Result<(), DriverError>;
    fn elapsed_seconds(&self, before: EventHandle, after: EventHandle)
        -> Result<f64, DriverError>;

    // modules and launches
    fn load_module(&self, image: &str, symbol: &str) -> Result<ModuleHandle, DriverError>;
    fn unload_module(&self, module: ModuleHandle) -> Result<(), DriverError>;
    #[allow(clippy::too_many_arguments)]
    fn launch_kernel(
        &self,
        module: ModuleHandle,
        grid: Dim3,
        block: Dim3,
        shared_mem: u32,
        stream: StreamHandle,
        args: &[LaunchArg],
    ) -> Result<(), DriverError>;

    // device memory
    fn allocate(&self, bytes: usize) -> Result<DevicePtr, DriverError>;
    fn free(&self, ptr: DevicePtr) -> Result<(), DriverError>;
    fn copy_to_device(&self, dst: DevicePtr, src: &[u8]) -> Result<(), DriverError>;
    fn copy_to_host(&self, dst: &mut [u8], src: DevicePtr) -> Result<(), DriverError>;
    fn copy_device_to_device(
        &self,
        dst: DevicePtr,
        src: DevicePtr,
        bytes: usize,
    ) -> Result<(), DriverError>;
    fn memset_d8(&self, ptr: DevicePtr, value: u8, count: usize) -> Result<(), DriverError>;
    fn memset_d16(&self, ptr: DevicePtr, value: u16, count: usize) -> Result<(), DriverError>;
    fn memset_d32(&self, ptr: DevicePtr, value: u32, count: usize) -> Result<(), DriverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dim3_conversions() {
        assert_eq!(Dim3::from(8), Dim3::new(8, 1, 1));
        assert_eq!(Dim3::from((8, 4)), Dim3::new(8, 4, 1));
        assert_eq!(Dim3::from((8, 4, 2)), Dim3::new(8, 4, 2));
        assert_eq!(Dim3::default(), Dim3::ones());
    }

    #[test]
    fn dim3_volume() {
        assert_eq!(Dim3::new(16, 16, 2).volume(), 512);
        assert_eq!(Dim3::new(u32::MAX, 2, 1).volume(), u32::MAX as u64 * 2);
    }
}
