//! Multi-client convergence and fault-injection harness.
//!
//! Several [`Session`]s are bound to one shared document. Scenarios drive
//! mutations through the [`ActionDriver`], break transports through the
//! [`FaultInjector`], and ask the oracle whether every session ended up with
//! the same ordered item list.
//!
//! The page under test is reached through the [`DocumentSurface`] trait. Two
//! backends are provided: [`webdriver`] for a real browser and [`sim`] for an
//! in-memory stand-in.

pub mod action;
pub mod config;
pub mod error;
pub mod fault;
pub mod inflight;
pub mod oracle;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod session;
pub mod sim;
pub mod surface;
pub mod webdriver;

pub use action::{Action, ActionDriver, ActionPicker};
pub use config::HarnessConfig;
pub use error::HarnessError;
pub use fault::{CloseCode, FaultEvent, FaultInjector};
pub use inflight::InFlight;
pub use oracle::{await_convergence, ConvergenceResult};
pub use report::{RunReport, ScenarioReport, ScenarioStatus};
pub use runner::ScenarioRunner;
pub use session::Session;
pub use surface::{Command, DocumentSurface, StateKey, SurfaceFactory};
