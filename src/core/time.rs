//! Abstractions for providing the current time.
//!
//! Time is a free running millisecond tick counter which wraps around at
//! `u32::MAX`. Always compare ticks with `elapsed(...)`, never with `<` or `>`
//! on absolute values.

use std::cell::Cell;
use std::fmt::Debug;
use std::rc::Rc;
use std::time::Instant;

/// A millisecond tick count.
pub type Ticks = u32;

/// Returns the number of ticks from since to now, accounting for wraparound.
pub fn elapsed(since: Ticks, now: Ticks) -> Ticks {
    now.wrapping_sub(since)
}

/// An environment that provides the current time.
pub trait Env: Debug {
    /// Returns the tick corresponding to "now".
    fn now(&self) -> Ticks;
}

/// An environment that provides system based time.
#[derive(Clone, Debug)]
pub struct SystemEnv {
    epoch: Instant,
}

impl SystemEnv {
    pub fn new() -> SystemEnv {
        SystemEnv {
            epoch: Instant::now(),
        }
    }
}

impl Env for SystemEnv {
    fn now(&self) -> Ticks {
        let since = Instant::now().duration_since(self.epoch);
        (since.as_secs() as u32)
            .wrapping_mul(1000)
            .wrapping_add(since.subsec_millis())
    }
}

/// An environment that provides a configurable time.
///
/// Clones share the same clock, so a test can keep a handle and advance the
/// time seen by a stack it handed a clone to.
#[derive(Clone, Debug)]
pub struct MockEnv {
    now: Rc<Cell<Ticks>>,
}

impl MockEnv {
    pub fn new() -> MockEnv {
        MockEnv::starting_at(0)
    }

    pub fn starting_at(now: Ticks) -> MockEnv {
        MockEnv {
            now: Rc::new(Cell::new(now)),
        }
    }

    /// Moves the clock forward by ticks, wrapping around at u32::MAX.
    pub fn advance(&self, ticks: Ticks) {
        self.now.set(self.now.get().wrapping_add(ticks));
    }

    pub fn set(&self, now: Ticks) {
        self.now.set(now);
    }
}

impl Env for MockEnv {
    fn now(&self) -> Ticks {
        self.now.get()
    }
}
