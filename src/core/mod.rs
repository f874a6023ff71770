//! Core measurement engine and free-block traversal

pub mod adapter;
pub mod algorithm;
pub mod batch;
pub mod engine;
pub mod error;
pub mod ext4;
pub mod frequency;
pub mod iterator;
pub mod memory;
