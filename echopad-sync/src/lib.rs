//! Library surface for the `echopad-sync` server binary, split out so
//! integration tests can build the router the same way `main` does.

pub mod api;
pub mod config;
