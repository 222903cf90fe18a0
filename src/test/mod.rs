//! Shared helpers for unit tests.
//!
//! - [`factories`] builds small functions with a known shape for each kind of
//!   region the splitter handles.
//! - [`interpreter`] runs IR, so tests can compare a module before and after
//!   splitting by what it returns, what error it raises and which external
//!   calls it makes, in order.

pub mod factories;
