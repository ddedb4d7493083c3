//! Server-side engine tests.

mod delivery_tests;
mod push_tests;
mod retention_tests;
