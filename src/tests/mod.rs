// Packet Ingest Test Infrastructure
//
// Shared helpers (temp dirs, fast configs, fake decoder and sink, a local
// HTTP stub) plus the test suites for each pipeline stage.

// ============================================================================
// TEST HELPERS - Shared utilities for all tests
// ============================================================================
pub mod helpers;


pub mod watcher_tests;
