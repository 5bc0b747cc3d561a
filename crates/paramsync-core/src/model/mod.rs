// ── Domain model ──

mod change;
mod connection;
mod descriptor;
mod record;
mod value;

pub use change::{ChangeCause, ParameterChange};
pub use connection::{ConnectionPhase, ConnectionState};
pub use descriptor::{ParamKind, ParameterDescriptor};
pub(crate) use record::RemoteOutcome;
pub use record::{ParameterRecord, PendingWrite, WriteStatus};
pub use value::ParamValue;
