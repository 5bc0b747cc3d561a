//! `paramsync demo`: run an engine against a loopback peer.
//!
//! Walks through the reconciliation cases one at a time (optimistic write,
//! rollback race, lone rollback, remote push, rejected writes, reconnect
//! under failing snapshots) and reports the resulting records and every
//! change notification.

use std::sync::Arc;
use std::time::Duration;

use paramsync_api::wire::names;
use paramsync_api::{LoopbackTransport, TransportError, TransportPhase, WireParameter};
use paramsync_core::{
    ChangeCause, ConnectionPhase, ConnectionState, CoreError, Engine, EngineConfig, ParamKind,
    ParamValue, ParameterChange, ParameterRecord, normalize,
};
use serde::Serialize;
use tabled::Tabled;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use crate::cli::{DemoArgs, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

// ── Report ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct DemoReport {
    pub steps: Vec<StepRow>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<ChangeRow>,
    pub records: Vec<RecordRow>,
}

#[derive(Debug, Serialize, Tabled)]
pub struct StepRow {
    #[tabled(rename = "Step")]
    pub step: &'static str,
    #[tabled(rename = "Outcome")]
    pub outcome: String,
}

#[derive(Debug, Serialize, Tabled)]
pub struct ChangeRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Cause")]
    pub cause: ChangeCause,
    #[tabled(rename = "From")]
    pub previous: String,
    #[tabled(rename = "To")]
    pub current: String,
}

#[derive(Debug, Serialize, Tabled)]
pub struct RecordRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Kind")]
    pub kind: ParamKind,
    #[tabled(rename = "Value")]
    pub value: String,
    #[tabled(rename = "Confirmed")]
    pub authoritative: String,
    #[tabled(rename = "Seq")]
    pub last_applied_seq: u64,
    #[tabled(rename = "Pending")]
    pub pending: usize,
}

impl From<&ParameterRecord> for RecordRow {
    fn from(record: &ParameterRecord) -> Self {
        let descriptor = record.descriptor();
        Self {
            id: descriptor.id.clone(),
            name: descriptor.name.clone(),
            kind: descriptor.kind,
            value: record.display_value(),
            authoritative: normalize::display(descriptor, record.authoritative_value()),
            last_applied_seq: record.last_applied_seq(),
            pending: record.in_flight_writes().count(),
        }
    }
}

// ── Handler ──────────────────────────────────────────────────────────

pub async fn handle(args: &DemoArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let config = paramsync_config::load_config(global.config.as_deref())?;
    let engine_config = config.to_engine_config()?;

    let mut report = run(engine_config, args).await?;
    if args.no_changes {
        report.changes.clear();
    }

    let rendered = render(&report, global.output)?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}

/// The peer's parameter table.
pub fn peer_parameters() -> Vec<WireParameter> {
    vec![
        WireParameter::float("gain", 0.0, 1.0, 0.5)
            .with_name("Gain")
            .with_unit("%"),
        WireParameter::float("mix", 0.0, 1.0, 0.3).with_name("Dry/Wet"),
        WireParameter::toggle("bypass", false).with_name("Bypass"),
        WireParameter::choice("mode", &["clean", "warm", "fuzz"], 0).with_name("Mode"),
    ]
}

pub async fn run(config: EngineConfig, args: &DemoArgs) -> Result<DemoReport, CliError> {
    let peer = LoopbackTransport::new(peer_parameters());
    peer.fail_snapshots(args.fail_snapshots);

    let engine = Engine::new(Arc::new(peer.clone()), config);
    let mut demo = Demo {
        changes: engine.changes(),
        connection: engine.connection_state(),
        peer,
        engine,
        limit: Duration::from_secs(args.timeout),
        fail_snapshots: args.fail_snapshots,
        steps: Vec::new(),
    };

    let result = demo.script().await;
    demo.engine.shutdown();
    result?;

    Ok(demo.finish())
}

fn render(report: &DemoReport, format: OutputFormat) -> Result<String, CliError> {
    match format {
        OutputFormat::Json => output::render_json(report, false),
        OutputFormat::JsonCompact => output::render_json(report, true),
        OutputFormat::Plain => Ok(report
            .records
            .iter()
            .map(|r| format!("{}={}", r.id, r.value))
            .collect::<Vec<_>>()
            .join("\n")),
        OutputFormat::Table => {
            let mut sections = vec![output::render_table(&report.steps)];
            if !report.changes.is_empty() {
                sections.push(output::render_table(&report.changes));
            }
            sections.push(output::render_table(&report.records));
            Ok(sections.join("\n\n"))
        }
    }
}

// ── Script ───────────────────────────────────────────────────────────

struct Demo {
    peer: LoopbackTransport,
    engine: Engine,
    changes: broadcast::Receiver<ParameterChange>,
    connection: watch::Receiver<ConnectionState>,
    limit: Duration,
    fail_snapshots: u32,
    steps: Vec<StepRow>,
}

impl Demo {
    async fn script(&mut self) -> Result<(), CliError> {
        self.connect().await?;
        self.optimistic_write().await?;
        self.rollback_race().await?;
        self.lone_rollback().await?;
        self.remote_push();
        self.enum_write().await?;
        self.rejected_writes();
        self.reconnect().await
    }

    fn record(&mut self, step: &'static str, outcome: String) {
        info!(step, outcome = %outcome, "demo step");
        self.steps.push(StepRow { step, outcome });
    }

    fn shown(&self, id: &str) -> String {
        self.engine.display(id).unwrap_or_else(|| "-".into())
    }

    fn snapshot_calls(&self) -> usize {
        self.peer.calls_to(names::SNAPSHOT).len()
    }

    async fn connect(&mut self) -> Result<(), CliError> {
        self.engine.start()?;
        self.peer.set_phase(TransportPhase::Connected);
        self.wait_for(ConnectionPhase::Connected, "the initial snapshot")
            .await?;

        let outcome = format!(
            "{} parameters after {} snapshot attempt(s)",
            self.engine.get_all().len(),
            self.snapshot_calls()
        );
        self.record("connect", outcome);
        Ok(())
    }

    async fn optimistic_write(&mut self) -> Result<(), CliError> {
        let handle = self.engine.set("gain", 0.8)?;
        let shown = self.shown("gain");
        handle.await?;
        let outcome = format!("gain shows {shown} before the reply, then confirmed");
        self.record("optimistic write", outcome);
        Ok(())
    }

    /// Two writes to one parameter; the newer succeeds first and the older
    /// then fails. The failure must not drag the value back.
    async fn rollback_race(&mut self) -> Result<(), CliError> {
        self.peer.hold_writes(true);
        let older = self.engine.set("mix", 0.2)?;
        let newer = self.engine.set("mix", 0.7)?;
        self.peer.hold_writes(false);

        let held = self.peer.held_writes();
        let (Some(first), Some(second)) = (held.first(), held.get(1)) else {
            return Err(CliError::Internal("loopback peer did not park both writes".into()));
        };

        self.peer.release_write(second.ticket, Ok(()));
        newer.await?;
        self.peer.release_write(
            first.ticket,
            Err(TransportError::remote(names::SET, "rejected by demo peer")),
        );
        let older_outcome = older.await;

        let outcome = format!(
            "older write {}; mix stays {}",
            describe(&older_outcome),
            self.shown("mix")
        );
        self.record("rollback race", outcome);
        Ok(())
    }

    async fn lone_rollback(&mut self) -> Result<(), CliError> {
        self.peer
            .fail_next_write(TransportError::remote(names::SET, "rejected by demo peer"));
        let result = self.engine.set("gain", 0.3)?.await;
        let outcome = format!("write {}; gain back to {}", describe(&result), self.shown("gain"));
        self.record("rollback", outcome);
        Ok(())
    }

    fn remote_push(&mut self) {
        let seq = self.peer.remote_change("bypass", 1.0);
        let outcome = format!("peer pushed seq {seq}; bypass is {}", self.shown("bypass"));
        self.record("remote push", outcome);
    }

    async fn enum_write(&mut self) -> Result<(), CliError> {
        self.engine.set("mode", ParamValue::Enum(2))?.await?;
        let outcome = format!("mode is {}", self.shown("mode"));
        self.record("enum write", outcome);
        Ok(())
    }

    fn rejected_writes(&mut self) {
        let invalid = self.engine.set("mode", ParamValue::Enum(7)).map(|_| ());
        let outcome = format!("mode #7 {}; mode is {}", describe(&invalid), self.shown("mode"));
        self.record("invalid value", outcome);

        let unknown = self.engine.set("drive", 0.5).map(|_| ());
        self.record("unknown parameter", format!("drive {}", describe(&unknown)));
    }

    /// Drop the link, change a value behind the engine's back, and come
    /// back up with snapshots failing.
    async fn reconnect(&mut self) -> Result<(), CliError> {
        let before = self.snapshot_calls();
        self.peer.set_phase(TransportPhase::Disconnected);
        self.wait_for(ConnectionPhase::Disconnected, "the link to drop")
            .await?;

        self.peer.remote_change_silently("mix", 0.45);
        self.peer.fail_snapshots(self.fail_snapshots);
        self.peer.set_phase(TransportPhase::Connected);
        self.wait_for(ConnectionPhase::Connected, "the resync").await?;

        let attempts = self.snapshot_calls().saturating_sub(before);
        let outcome = format!(
            "resynced after {attempts} snapshot attempt(s); mix is {}",
            self.shown("mix")
        );
        self.record("reconnect", outcome);
        Ok(())
    }

    async fn wait_for(&mut self, phase: ConnectionPhase, what: &str) -> Result<(), CliError> {
        let reached =
            tokio::time::timeout(self.limit, self.connection.wait_for(|s| s.phase == phase)).await;
        match reached {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(CliError::EngineStopped),
            Err(_) => Err(CliError::Timeout {
                what: what.to_owned(),
                seconds: self.limit.as_secs(),
            }),
        }
    }

    fn finish(mut self) -> DemoReport {
        let mut changes = Vec::new();
        loop {
            match self.changes.try_recv() {
                Ok(change) => changes.push(self.change_row(&change)),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(skipped = n, "demo change log lagged");
                }
                Err(_) => break,
            }
        }

        let records = self
            .engine
            .get_all()
            .iter()
            .map(|r| RecordRow::from(r.as_ref()))
            .collect();

        DemoReport {
            steps: self.steps,
            changes,
            records,
        }
    }

    fn change_row(&self, change: &ParameterChange) -> ChangeRow {
        let render = |value: ParamValue| match self.engine.get(&change.id) {
            Some(record) => normalize::display(record.descriptor(), value),
            None => value.to_string(),
        };
        ChangeRow {
            id: change.id.clone(),
            cause: change.cause,
            previous: change.previous.map_or_else(|| "-".into(), &render),
            current: render(change.current),
        }
    }
}

fn describe(result: &Result<(), CoreError>) -> String {
    match result {
        Ok(()) => "confirmed".into(),
        Err(e) if e.is_validation() => format!("rejected: {e}"),
        Err(e) => format!("failed: {e}"),
    }
}
