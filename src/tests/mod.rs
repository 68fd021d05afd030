//! Crate-level tests against the host core model.

mod helpers;
