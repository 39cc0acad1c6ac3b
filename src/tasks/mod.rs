//! Background Tasks Module
//!
//! Contains the repeating task primitive the cache uses to sweep expired
//! entries on an interval.

mod interval;

pub use interval::{Action, Interval, Signal};
