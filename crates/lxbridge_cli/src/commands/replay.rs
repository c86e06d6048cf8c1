//! Replay command implementation.
//!
//! Runs a bridge against an in-memory controller that serves the given
//! structure, feeds it a JSON-lines script and reports the resulting states,
//! sent commands and counters.
//!
//! Each script line is one step:
//!
//! ```text
//! {"event": {"uuid": "sw-1-active", "value": 1}}
//! {"write": {"id": "sw-1.active", "value": true}}
//! {"wait": 250}
//! {"drop": {"code": 1006}}
//! ```

use super::{check_config, loaders};
use lxbridge_engine::{
    Bridge, BridgeConfig, BridgeError, ConnectOutcome, ControllerTransport, CounterId,
    Credentials, MemoryStateStore, MockTransport, StateStore,
};
use lxbridge_protocol::{CloseReason, ControllerEvent, ItemId, StateValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const COMMAND_PREFIX: &str = "jdev/sps/io/";

/// Errors raised while replaying a script.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// A script line is not a valid step.
    #[error("line {line}: invalid step: {source}")]
    InvalidStep {
        /// 1-based line number.
        line: usize,
        /// Parse error.
        source: serde_json::Error,
    },

    /// The bridge could not be created.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// The first connection attempt failed.
    #[error("initial connect failed: {0:?}")]
    Connect(ConnectOutcome),
}

/// One step of a replay script.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    /// The controller pushes an event.
    Event(ControllerEvent),
    /// The host writes an item.
    Write {
        /// Target item.
        id: ItemId,
        /// Written value.
        value: StateValue,
    },
    /// Let time pass, in milliseconds.
    Wait(u64),
    /// The controller drops the session.
    Drop {
        /// Close code; a transport error is assumed without one.
        #[serde(default)]
        code: Option<u16>,
    },
}

/// Parses a script. Blank lines and lines starting with `#` are skipped.
pub fn parse_script(script: &str) -> Result<Vec<(usize, Step)>, ReplayError> {
    script
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str(line)
                .map(|step| (index + 1, step))
                .map_err(|source| ReplayError::InvalidStep {
                    line: index + 1,
                    source,
                })
        })
        .collect()
}

/// Result of one host write.
#[derive(Debug, Serialize)]
pub struct WriteRecord {
    /// Script line of the write.
    pub line: usize,
    /// Target item.
    pub id: String,
    /// How the engine handled the write.
    pub outcome: String,
}

/// A final item state.
#[derive(Debug, Serialize)]
pub struct FinalState {
    /// Value.
    pub value: StateValue,
    /// Confirmation flag.
    pub ack: bool,
}

/// Replay report.
#[derive(Debug, Serialize)]
pub struct ReplayReport {
    /// Number of steps run.
    pub steps: usize,
    /// Whether the bridge was connected after the last step.
    pub connected: bool,
    /// Number of sessions opened, the first one included.
    pub sessions: usize,
    /// Outcome of every host write.
    pub writes: Vec<WriteRecord>,
    /// Command paths sent to the controller, in order.
    pub commands: Vec<String>,
    /// Item states after the last step.
    pub states: BTreeMap<String, FinalState>,
    /// Counter values.
    pub counters: BTreeMap<&'static str, u64>,
}

/// Runs a script against a bridge serving `structure`.
pub async fn replay(
    config: BridgeConfig,
    structure: String,
    steps: Vec<(usize, Step)>,
) -> Result<ReplayReport, ReplayError> {
    let transport = Arc::new(MockTransport::new());
    transport.set_response(&config.structure_path, structure);
    let store = Arc::new(MemoryStateStore::new());

    let bridge = Bridge::new(
        config,
        Arc::clone(&transport) as Arc<dyn ControllerTransport>,
        Arc::clone(&store) as Arc<dyn StateStore>,
        loaders::registry(),
    )?;
    let outcome = bridge.start().await;
    if outcome != ConnectOutcome::Connected {
        bridge.shutdown().await;
        return Err(ReplayError::Connect(outcome));
    }

    let mut writes = Vec::new();
    for (line, step) in &steps {
        debug!(line, ?step, "replaying step");
        match step {
            Step::Event(event) => {
                if transport.push_event(event.clone()) {
                    bridge.process_events().await;
                } else {
                    debug!(line, "no open session, event dropped");
                }
            }
            Step::Write { id, value } => {
                let outcome = bridge.handle_state_change(id, value.clone(), false).await;
                writes.push(WriteRecord {
                    line: *line,
                    id: id.to_string(),
                    outcome: outcome.map(|o| format!("{o:?}")).unwrap_or_default(),
                });
            }
            Step::Wait(ms) => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                bridge.process_events().await;
            }
            Step::Drop { code } => {
                let reason = match code {
                    Some(code) => CloseReason::Remote { code: *code },
                    None => CloseReason::Error("connection dropped".into()),
                };
                let session = bridge.supervisor().session();
                if transport.drop_connection(reason.clone()) {
                    bridge.supervisor().handle_closed(session, reason).await;
                }
            }
        }
    }

    let report = ReplayReport {
        steps: steps.len(),
        connected: bridge.is_connected(),
        sessions: transport.open_count(),
        writes,
        commands: transport
            .sent_paths()
            .into_iter()
            .filter(|path| path.starts_with(COMMAND_PREFIX))
            .collect(),
        states: store
            .states()
            .into_iter()
            .map(|(id, state)| {
                (
                    id.to_string(),
                    FinalState {
                        value: state.value,
                        ack: state.ack,
                    },
                )
            })
            .collect(),
        counters: CounterId::ALL
            .iter()
            .map(|id| (id.name(), bridge.counters().value(*id)))
            .collect(),
    };

    bridge.shutdown().await;
    Ok(report)
}

/// Runs the replay command.
pub fn run(
    structure_path: &Path,
    events_path: &Path,
    config_path: Option<&Path>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = match config_path {
        Some(path) => check_config::load(path)?,
        None => BridgeConfig::new("replay.local", 80, Credentials::default()),
    };
    let structure = std::fs::read_to_string(structure_path)
        .map_err(|e| format!("cannot read {}: {e}", structure_path.display()))?;
    let script = std::fs::read_to_string(events_path)
        .map_err(|e| format!("cannot read {}: {e}", events_path.display()))?;
    let steps = parse_script(&script)?;
    info!(steps = steps.len(), "replaying script");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(replay(config, structure, steps))?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => print_text_output(&report),
    }

    Ok(())
}

fn print_text_output(report: &ReplayReport) {
    println!("Steps:     {}", report.steps);
    println!("Connected: {}", report.connected);
    println!("Sessions:  {}", report.sessions);

    if !report.writes.is_empty() {
        println!();
        println!("Writes:");
        for write in &report.writes {
            println!("  line {:<4} {:<32} {}", write.line, write.id, write.outcome);
        }
    }

    if !report.commands.is_empty() {
        println!();
        println!("Commands:");
        for command in &report.commands {
            println!("  {command}");
        }
    }

    println!();
    println!("States:");
    for (id, state) in &report.states {
        let flag = if state.ack { "" } else { " (unconfirmed)" };
        println!("  {id:<40} {}{flag}", state.value);
    }

    println!();
    println!("Counters:");
    for (name, value) in &report.counters {
        println!("  {name:<20} {value}");
    }
}
