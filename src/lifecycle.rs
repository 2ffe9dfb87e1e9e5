//! Block liveness tracking and storage reclamation.
//!
//! The [`LifecycleTracker`] holds a weak handle and a [`TrackingInfo`] for
//! every live block. It never keeps a block alive: when the last handle to a
//! block is dropped, the block's `Drop` runs [`LifecycleTracker::finalize`],
//! which decrements the global counters and releases the block's content
//! store references.
//!
//! Finalization is idempotent. The tracking entry is removed before anything
//! is released, so explicit disposal (see
//! [`DisposableBlock`](crate::DisposableBlock)), a later drop, and a cleanup
//! pass that finds the entry dead cannot release the same storage twice.

mod tracker;

pub use tracker::{CleanupReport, LifecycleTracker, LivenessHandle, MemoryReport, TrackingInfo};
