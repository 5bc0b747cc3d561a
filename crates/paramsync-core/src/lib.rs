// paramsync-core: Optimistic parameter state between a UI and a remote engine.
//
// The engine keeps one record per remote parameter, lets consumers write
// optimistically, and reconciles every write, push event and snapshot
// against the remote's authoritative state so no displayed value ever
// regresses.

pub mod backoff;
pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod model;
pub mod normalize;
pub mod reconciler;
pub mod stream;

mod store;
mod subscription;

// ── Primary re-exports ──────────────────────────────────────────────
pub use backoff::BackoffConfig;
pub use config::EngineConfig;
pub use engine::{ChangeSubscription, Engine};
pub use error::CoreError;
pub use fetch::FetchState;
pub use reconciler::WriteHandle;
pub use stream::{ParameterStream, ParameterWatchStream};

pub use model::{
    ChangeCause, ConnectionPhase, ConnectionState, ParamKind, ParamValue, ParameterChange,
    ParameterDescriptor, ParameterRecord, PendingWrite, WriteStatus,
};
