//! Depforge core library.
//!
//! Declares third-party native libraries, hands them to an external install
//! engine in one batch, and wires the installed artefacts into a consumer
//! build graph: imported targets are normalised once per session and the
//! shared libraries a consumer needs at run time are copied next to it.
//!
//! The command line front end lives in [`cli`] and [`runner`]; everything
//! else is usable as a library through [`session::Session`].

pub mod ast;
pub mod cli;
pub mod engine;
pub mod graph;
pub mod manifest;
pub mod platform;
pub mod registry;
pub mod rules;
pub mod runner;
pub mod session;
