//! Test suite for the core client.
//!
//! Everything here runs against scripted fakes of the labeling service; no
//! kernel is involved. The support module provides the fake endpoints and
//! reply builders shared across the suites.

mod support;

mod scenario;
mod status;
mod transport;
