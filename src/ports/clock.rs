// SPDX-License-Identifier: MIT OR Apache-2.0

//! Clock port.
//!
//! Cache TTLs, session expiry and key grace windows are all judged against an
//! injected clock so that tests can move time forward deterministically.

use chrono::{DateTime, Utc};

/// A source of the current time.
///
/// # Examples
///
/// ```rust
/// use trustcfg::ports::Clock;
/// use chrono::{DateTime, Utc};
///
/// struct FrozenClock(DateTime<Utc>);
///
/// impl Clock for FrozenClock {
///     fn now(&self) -> DateTime<Utc> {
///         self.0
///     }
/// }
///
/// let instant = Utc::now();
/// assert_eq!(FrozenClock(instant).now(), instant);
/// ```
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}
