//! The shared functional suite run under DeferredGuard.

use spire_core::DeferredGuard;
use spire_core::common_tests::ordered_index_core_tests::*;

#[test]
fn basic_operations() {
    test_basic_operations::<DeferredGuard>();
}

#[test]
fn unique_duplicate_rejection() {
    test_unique_duplicate_rejection::<DeferredGuard>();
}

#[test]
fn duplicate_pairs_in_insertion_order() {
    test_duplicate_pairs_in_insertion_order::<DeferredGuard>();
}

#[test]
fn scan_range_bounds() {
    test_scan_range_bounds::<DeferredGuard>();
}

#[test]
fn reinsert_after_delete() {
    test_reinsert_after_delete::<DeferredGuard>();
}

#[test]
fn facade_trait_object() {
    test_facade_trait_object::<DeferredGuard>();
}

#[test]
fn round_trip() {
    test_round_trip::<DeferredGuard>();
}
