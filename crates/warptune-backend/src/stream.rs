//! RAII wrappers for streams and timing events.

use crate::driver::{Driver, EventHandle, StreamHandle};
use crate::error::DriverError;
use std::sync::Arc;

/// A command stream owned by this wrapper (unless it is the default stream).
pub struct Stream {
    driver: Arc<dyn Driver>,
    raw: StreamHandle,
    owned: bool,
}

impl Stream {
    pub fn new(driver: &Arc<dyn Driver>) -> Result<Stream, DriverError> {
        let raw = driver.create_stream()?;
        Ok(Stream {
            driver: Arc::clone(driver),
            raw,
            owned: true,
        })
    }

    /// Borrow the backend's default stream.
    pub fn default_stream(driver: &Arc<dyn Driver>) -> Stream {
        Stream {
            driver: Arc::clone(driver),
            raw: StreamHandle::DEFAULT,
            owned: false,
        }
    }

    pub fn raw(&self) -> StreamHandle {
        self.raw
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        if self.owned {
            if let Err(err) = self.driver.destroy_stream(self.raw) {
                tracing::debug!(error = %err, "failed to destroy stream");
            }
        }
    }
}

/// A timing event on the GPU command stream.
pub struct Event {
    driver: Arc<dyn Driver>,
    raw: EventHandle,
}

impl Event {
    pub fn new(driver: &Arc<dyn Driver>) -> Result<Event, DriverError> {
        let raw = driver.create_event()?;
        Ok(Event {
            driver: Arc::clone(driver),
            raw,
        })
    }

    pub fn raw(&self) -> EventHandle {
        self.raw
    }

    pub fn record(&self, stream: &Stream) -> Result<(), DriverError> {
        self.driver.record_event(self.raw, stream.raw())
    }

    pub fn synchronize(&self) -> Result<(), DriverError> {
        self.driver.synchronize_event(self.raw)
    }

    /// Seconds between `before` and this event.
    pub fn seconds_elapsed_since(&self, before: &Event) -> Result<f64, DriverError> {
        self.driver.elapsed_seconds(before.raw, self.raw)
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        if let Err(err) = self.driver.destroy_event(self.raw) {
            tracing::debug!(error = %err, "failed to destroy event");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::sim::SimDriver;
    use super::*;

    #[test]
    fn stream_and_event_lifecycle() {
        let driver: Arc<dyn Driver> = Arc::new(SimDriver::new());
        let stream = Stream::new(&driver).unwrap();
        let before = Event::new(&driver).unwrap();
        let after = Event::new(&driver).unwrap();

        before.record(&stream).unwrap();
        after.record(&stream).unwrap();
        after.synchronize().unwrap();
        assert_eq!(after.seconds_elapsed_since(&before).unwrap(), 0.0);
    }
}
