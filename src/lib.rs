// Library root
// -----------
// The binary (`main.rs`) is a thin wrapper around these modules.
//
// Module responsibilities:
// - `auth`: resolves the Cloud or Data Center credential from flags and the
//   environment.
// - `api`: authorizes HTTP requests and talks to the import endpoints.
// - `cli`: clap argument model and command dispatch.
// - `config`: constants, the `ConfigSource` capability, client settings.
// - `error`: error taxonomy and exit codes.
// - `framework`: supported result formats.
pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod framework;
