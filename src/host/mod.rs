//! Host application and time source seen by the supervisor

use crate::overlay::Canvas;
use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Services the host application provides
pub trait Host {
    /// Release any exclusive mouse or keyboard grab
    fn release_input_capture(&mut self) {}

    /// Terminate the application
    fn quit(&mut self) {}

    /// Surface the error overlay draws on, if any
    fn canvas(&mut self) -> Option<&mut dyn Canvas> {
        None
    }
}

/// Host with no input capture and nowhere to draw
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl Host for NullHost {}

/// Monotonic time source used for the scan interval
pub trait Clock {
    /// Time since an arbitrary fixed origin
    fn now(&self) -> Duration;
}

/// Wall clock measured from creation
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock advanced by hand; clones share the same time
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn set(&self, to: Duration) {
        self.now.set(to);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}
