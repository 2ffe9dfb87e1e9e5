//! Memory accounting and the pressure state machine.
//!
//! [`MemoryUsage`] keeps an estimate of the bytes held by live blocks and
//! maps it onto a [`PressureLevel`] using configurable
//! [`PressureThresholds`]:
//!
//! | usage / limit | level |
//! |---|---|
//! | `>= 0.90` | `Critical` |
//! | `>= 0.80` | `High` |
//! | `>= 0.65` | `Medium` |
//! | `>= 0.45` | `Low` |
//! | otherwise, or no limit | `None` |
//!
//! Accounting is an estimate that drives reclamation heuristics; it is not
//! an allocator and does not track exact heap usage.
//!
//! # Examples
//!
//! ```
//! use rblob::memory::{MemoryUsage, PressureLevel, PressureThresholds};
//!
//! let usage = MemoryUsage::new(Some(1000), PressureThresholds::default());
//! usage.allocate(850);
//!
//! assert_eq!(usage.update_level(), Some((PressureLevel::None, PressureLevel::High)));
//! assert_eq!(usage.update_level(), None);
//! ```

mod pressure;
mod usage;

pub use pressure::{PressureCallback, PressureLevel, PressureSubscription, PressureThresholds};
pub(crate) use pressure::PressureSubscribers;
pub use usage::MemoryUsage;
