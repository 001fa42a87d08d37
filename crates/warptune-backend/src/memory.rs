//! Typed device memory.

use crate::driver::{DevicePtr, Driver, LaunchArg};
use crate::error::DriverError;
use bytemuck::Pod;
use std::marker::PhantomData;
use std::sync::Arc;

/// An owned device allocation of `len` elements of `T`.
pub struct DeviceBuffer<T> {
    driver: Arc<dyn Driver>,
    ptr: DevicePtr,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> DeviceBuffer<T> {
    pub fn allocate(driver: &Arc<dyn Driver>, len: usize) -> Result<DeviceBuffer<T>, DriverError> {
        let ptr = driver.allocate(len * std::mem::size_of::<T>())?;
        Ok(DeviceBuffer {
            driver: Arc::clone(driver),
            ptr,
            len,
            _marker: PhantomData,
        })
    }

    pub fn from_slice(driver: &Arc<dyn Driver>, data: &[T]) -> Result<DeviceBuffer<T>, DriverError> {
        let buffer = DeviceBuffer::allocate(driver, data.len())?;
        buffer.copy_from_slice(data)?;
        Ok(buffer)
    }

    pub fn ptr(&self) -> DevicePtr {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn size_in_bytes(&self) -> usize {
        self.len * std::mem::size_of::<T>()
    }

    /// Non-owning view of the whole buffer.
    pub fn view(&self) -> DeviceView<T> {
        DeviceView {
            driver: Arc::clone(&self.driver),
            ptr: self.ptr,
            len: self.len,
            _marker: PhantomData,
        }
    }

    pub fn slice(&self, start: usize, len: usize) -> Result<DeviceView<T>, DriverError> {
        self.view().slice(start, len)
    }

    pub fn copy_from_slice(&self, data: &[T]) -> Result<(), DriverError> {
        self.view().copy_from_slice(data)
    }

    pub fn to_vec(&self) -> Result<Vec<T>, DriverError> {
        self.view().to_vec()
    }

    pub fn fill(&self, value: T) -> Result<(), DriverError> {
        self.view().fill(value)
    }

    pub fn fill_zeros(&self) -> Result<(), DriverError> {
        self.view().fill_zeros()
    }

    /// Launch argument carrying this buffer's address.
    pub fn arg(&self) -> LaunchArg {
        LaunchArg::Ptr(self.ptr)
    }
}

impl<T> Drop for DeviceBuffer<T> {
    fn drop(&mut self) {
        if let Err(err) = self.driver.free(self.ptr) {
            tracing::debug!(error = %err, "failed to free device buffer");
        }
    }
}

/// A non-owning range of a device allocation.
#[derive(Clone)]
pub struct DeviceView<T> {
    driver: Arc<dyn Driver>,
    ptr: DevicePtr,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> DeviceView<T> {
    pub fn ptr(&self) -> DevicePtr {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn size_in_bytes(&self) -> usize {
        self.len * std::mem::size_of::<T>()
    }

    pub fn arg(&self) -> LaunchArg {
        LaunchArg::Ptr(self.ptr)
    }

    pub fn slice(&self, start: usize, len: usize) -> Result<DeviceView<T>, DriverError> {
        let end = start
            .checked_add(len)
            .ok_or_else(|| DriverError::invalid_value("slice bounds overflow"))?;
        if end > self.len {
            return Err(DriverError::invalid_value(format!(
                "slice {start}..{end} out of bounds for length {}",
                self.len
            )));
        }

        Ok(DeviceView {
            driver: Arc::clone(&self.driver),
            ptr: self.ptr.offset((start * std::mem::size_of::<T>()) as u64),
            len,
            _marker: PhantomData,
        })
    }

    pub fn copy_from_slice(&self, data: &[T]) -> Result<(), DriverError> {
        if data.len() != self.len {
            return Err(DriverError::invalid_value("size mismatch"));
        }
        self.driver
            .copy_to_device(self.ptr, bytemuck::cast_slice(data))
    }

    pub fn to_vec(&self) -> Result<Vec<T>, DriverError> {
        let mut out = vec![T::zeroed(); self.len];
        self.driver
            .copy_to_host(bytemuck::cast_slice_mut(&mut out), self.ptr)?;
        Ok(out)
    }

    /// Copy this view's contents into `other`.
    pub fn copy_to(&self, other: &DeviceView<T>) -> Result<(), DriverError> {
        if other.len != self.len {
            return Err(DriverError::invalid_value("size mismatch"));
        }
        self.driver
            .copy_device_to_device(other.ptr, self.ptr, self.size_in_bytes())
    }

    /// Fill every element with `value`; supported for 1, 2, and 4 byte types.
    pub fn fill(&self, value: T) -> Result<(), DriverError> {
        let bytes = bytemuck::bytes_of(&value);
        match bytes.len() {
            1 => self.driver.memset_d8(self.ptr, bytes[0], self.len),
            2 => {
                let pattern = u16::from_ne_bytes([bytes[0], bytes[1]]);
                self.driver.memset_d16(self.ptr, pattern, self.len)
            }
            4 => {
                let pattern = u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                self.driver.memset_d32(self.ptr, pattern, self.len)
            }
            n => Err(DriverError::invalid_value(format!(
                "fill not supported for {n}-byte elements"
            ))),
        }
    }

    pub fn fill_zeros(&self) -> Result<(), DriverError> {
        self.driver.memset_d8(self.ptr, 0, self.size_in_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimDriver;

    fn driver() -> Arc<dyn Driver> {
        Arc::new(SimDriver::new())
    }

    #[test]
    fn round_trip_host_device() {
        let driver = driver();
        let data: Vec<f32> = (0..64).map(|i| i as f32).collect();
        let buffer = DeviceBuffer::from_slice(&driver, &data).unwrap();
        assert_eq!(buffer.len(), 64);
        assert_eq!(buffer.to_vec().unwrap(), data);
    }

    #[test]
    fn device_to_device_copy() {
        let driver = driver();
        let src = DeviceBuffer::from_slice(&driver, &[1u32, 2, 3, 4]).unwrap();
        let dst = DeviceBuffer::<u32>::allocate(&driver, 4).unwrap();
        src.view().copy_to(&dst.view()).unwrap();
        assert_eq!(dst.to_vec().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn slice_bounds() {
        let driver = driver();
        let buffer = DeviceBuffer::from_slice(&driver, &[10u32, 11, 12, 13]).unwrap();

        let tail = buffer.slice(2, 2).unwrap();
        assert_eq!(tail.to_vec().unwrap(), vec![12, 13]);

        // the final element is addressable
        let last = buffer.slice(3, 1).unwrap();
        assert_eq!(last.to_vec().unwrap(), vec![13]);

        assert!(buffer.slice(3, 2).is_err());
        assert!(buffer.slice(usize::MAX, 2).is_err());
    }

    #[test]
    fn fill_patterns() {
        let driver = driver();

        let bytes = DeviceBuffer::<u8>::allocate(&driver, 8).unwrap();
        bytes.fill(0xAB).unwrap();
        assert_eq!(bytes.to_vec().unwrap(), vec![0xAB; 8]);

        let shorts = DeviceBuffer::<u16>::allocate(&driver, 4).unwrap();
        shorts.fill(0xBEEF).unwrap();
        assert_eq!(shorts.to_vec().unwrap(), vec![0xBEEF; 4]);

        let floats = DeviceBuffer::<f32>::allocate(&driver, 4).unwrap();
        floats.fill(1.5).unwrap();
        assert_eq!(floats.to_vec().unwrap(), vec![1.5; 4]);

        let wide = DeviceBuffer::<f64>::allocate(&driver, 2).unwrap();
        assert!(wide.fill(1.0).is_err());
        wide.fill_zeros().unwrap();
        assert_eq!(wide.to_vec().unwrap(), vec![0.0; 2]);
    }
}
