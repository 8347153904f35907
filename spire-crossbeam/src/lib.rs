//! Crossbeam-based reclamation backend for spire indexes.
//!
//! This crate provides [`EpochGuard`], an implementation of the
//! `spire_core::Guard` trait on top of crossbeam-epoch.
//!
//! # Usage
//!
//! ```ignore
//! use spire_core::SkipIndex;
//! use spire_crossbeam::EpochGuard;
//!
//! let index: SkipIndex<u64, u64, EpochGuard> = SkipIndex::new(true);
//! index.insert(42, 420);
//! ```

pub mod epoch_guard;

pub use epoch_guard::EpochGuard;
