//! Property-based tests

pub mod read_receipt_proptest;
pub mod partition_proptest;
