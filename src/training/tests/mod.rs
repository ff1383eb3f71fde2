//! Test suite for the dialogue training loop
//!
//! Mock data sources, graphs, models and evaluators live here alongside the
//! cross-module tests that drive the learner end to end.

// Test modules
pub mod checkpoint_tests;

// Utility modules for testing
pub mod fixtures;
