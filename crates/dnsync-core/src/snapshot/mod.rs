// # Snapshot Store Implementations
//
// This module provides implementations of the DocumentStore trait.

pub mod file;

pub use file::FileSnapshotStore;
