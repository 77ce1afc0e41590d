//! Helpers for tests of the shop engine and the crates built on it. Enabled with the `test_utils` feature.
//!
//! * [`prepare_env`] creates a fresh SQLite database per test.
//! * [`fixtures`] seeds a small catalog and builds order requests.
//! * [`fakes`] holds scripted stand-ins for the card processor, chain explorer, rate source and mailer.
//! * [`test_shop`] wires all of the above into a running engine.
pub mod fakes;
pub mod fixtures;
pub mod prepare_env;
pub mod test_shop;
