//! Simulation time: an absolute [`Time`] point and a relative [`Duration`].
//!
//! Both wrap `f64` and compare with `f64::total_cmp` so that `NAN`-free
//! simulation values form a total order, which is what lets `Time` sit as
//! the primary key of the event queue's `BinaryHeap<Reverse<Event<M>>>`.

use std::cmp::Ordering;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use derive_more::{Deref, DerefMut, Display, From};
use serde::{Deserialize, Serialize};

/// A point in simulated time, relative to the scenario's epoch at `Time(0.0)`.
#[derive(Debug, Clone, Copy, From, Display, Deref, DerefMut, Serialize, Deserialize)]
pub struct Time(pub f64);

impl Time {
    pub const ZERO: Time = Time(0.0);
}

impl PartialEq for Time {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0).is_eq()
    }
}

impl Eq for Time {}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.0.total_cmp(&other.0))
    }
}

impl Ord for Time {
    fn cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other).unwrap()
    }
}

/// A span of simulated time, e.g. a processing time or a setup time.
#[derive(Debug, Clone, Copy, From, Display, Deref, DerefMut, Serialize, Deserialize)]
pub struct Duration(pub f64);

impl Duration {
    pub const ZERO: Duration = Duration(0.0);
}

impl PartialEq for Duration {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0).is_eq()
    }
}

impl Eq for Duration {}

impl PartialOrd for Duration {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.0.total_cmp(&other.0))
    }
}

impl Ord for Duration {
    fn cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other).unwrap()
    }
}

impl Add<Duration> for Time {
    type Output = Time;

    fn add(self, rhs: Duration) -> Self::Output {
        Time(self.0 + rhs.0)
    }
}

impl AddAssign<Duration> for Time {
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs.0;
    }
}

impl Sub<Duration> for Time {
    type Output = Time;

    fn sub(self, rhs: Duration) -> Self::Output {
        Time(self.0 - rhs.0)
    }
}

impl SubAssign<Duration> for Time {
    fn sub_assign(&mut self, rhs: Duration) {
        self.0 -= rhs.0;
    }
}

impl Sub for Time {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Self::Output {
        Duration(self.0 - rhs.0)
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Self) -> Self::Output {
        Duration(self.0 + rhs.0)
    }
}

impl AddAssign for Duration {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}
