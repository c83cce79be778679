//! Integration tests for cadence-remote
//!
//! Uses wiremock to simulate the sync API and verifies the pull and push
//! endpoints end to end, including HTTP status classification.

mod common;

mod test_pull;
mod test_push;
