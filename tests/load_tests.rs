//! Load Test Runner
//!
//! Makes the Monte Carlo load tests discoverable by cargo test.
//!
//! To run load tests:
//! ```bash
//! cargo test --release --test load_tests -- --ignored --test-threads=1
//! ```
//!
//! Load tests are marked #[ignore] so normal CI builds skip them.

mod load;
