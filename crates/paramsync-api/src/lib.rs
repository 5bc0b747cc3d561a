//! Transport seam for the paramsync engine.
//!
//! The engine never talks to a socket directly. It consumes a
//! [`Transport`]: request/response calls, named push events, and a
//! connection-phase signal. This crate defines that contract, the typed
//! JSON payloads exchanged over it ([`wire`]), and [`LoopbackTransport`],
//! an in-process peer used by the test suites and the `paramsync demo`
//! command.

pub mod error;
pub mod loopback;
pub mod transport;
pub mod wire;

pub use error::TransportError;
pub use loopback::{CallRecord, HeldWrite, LoopbackTransport};
pub use transport::{CallFuture, EventHandler, Transport, TransportPhase, Unsubscribe};
pub use wire::{
    BulkChanged, ParameterChanged, SetRequest, SnapshotResponse, WireKind, WireParameter,
};
