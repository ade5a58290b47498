#![warn(unused_extern_crates)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::unreachable)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]
// We allow expect since it forces good error messages at the least.
#![allow(clippy::expect_used)]

//! Find and clean "ghost" replica update vectors on a 389-ds / FreeIPA server.
//!
//! See <https://www.port389.org/docs/389ds/howto/howto-cleanruv.html> for the
//! background on why ghosts appear and what CLEANALLRUV does about them.

pub mod config;
pub mod error;
pub mod ldap;
pub mod operator;
pub mod opt;
pub mod resolver;
pub mod ruv;
pub mod session;

#[cfg(test)]
mod test_utils;
#[cfg(test)]
mod tests;
