//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises the bridge against the
//! simulated broker, link, pins and probes. All tests run on the host
//! with no real hardware or network required.

#![cfg(not(target_os = "espidf"))]

mod bridge_flow_tests;
mod mock_hw;
mod rpc_dispatch_tests;
mod supervisor_tests;
