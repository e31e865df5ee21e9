//! Build runner collaborator.
//!
//! The core hands a [`BuildRequest`] (compilation id, selected modules and the
//! resolved snapshot) to a [`BuildRunner`] and consumes a stream of log
//! records and per-module states. [`SimulatedBuildRunner`] fabricates that
//! stream on a timer; it checks out nothing and packages nothing.

use crate::error::{Entity, ModelError};
use crate::resolve::{ResolvedModule, ResolvedSnapshot, ValueSource};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildLogRecord {
    pub id: u64,
    pub timestamp: i64,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleBuildStatus {
    Pending,
    Building,
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleBuildState {
    pub module_id: String,
    pub status: ModuleBuildStatus,
    /// 0..=100
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ModuleBuildState {
    fn pending(module_id: &str) -> Self {
        Self {
            module_id: module_id.to_string(),
            status: ModuleBuildStatus::Pending,
            progress: 0,
            artifact_url: None,
            error_message: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    pub compilation_id: String,
    /// Empty means every module of the snapshot.
    pub selected_module_ids: Vec<String>,
    pub snapshot: ResolvedSnapshot,
}

#[derive(Debug, Clone)]
pub enum BuildEvent {
    Log(BuildLogRecord),
    Module(ModuleBuildState),
}

/// Final outcome of a drained build stream.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub compilation_id: String,
    pub succeeded: bool,
    pub modules: Vec<ModuleBuildState>,
    pub logs: Vec<BuildLogRecord>,
}

/// Receiving end of a running build.
pub struct BuildHandle {
    pub compilation_id: String,
    events: mpsc::Receiver<BuildEvent>,
}

impl BuildHandle {
    pub fn new(compilation_id: impl Into<String>, events: mpsc::Receiver<BuildEvent>) -> Self {
        Self {
            compilation_id: compilation_id.into(),
            events,
        }
    }

    pub async fn next_event(&mut self) -> Option<BuildEvent> {
        self.events.recv().await
    }

    /// Drain the stream, calling `on_log` for every record as it arrives.
    /// Module states keep the order in which modules first reported.
    pub async fn collect(mut self, mut on_log: impl FnMut(&BuildLogRecord)) -> BuildReport {
        let mut logs = Vec::new();
        let mut modules: Vec<ModuleBuildState> = Vec::new();

        while let Some(event) = self.next_event().await {
            match event {
                BuildEvent::Log(record) => {
                    on_log(&record);
                    logs.push(record);
                }
                BuildEvent::Module(state) => {
                    match modules.iter_mut().find(|m| m.module_id == state.module_id) {
                        Some(existing) => *existing = state,
                        None => modules.push(state),
                    }
                }
            }
        }

        let succeeded = !modules.is_empty()
            && modules
                .iter()
                .all(|m| m.status == ModuleBuildStatus::Success);

        BuildReport {
            compilation_id: self.compilation_id,
            succeeded,
            modules,
            logs,
        }
    }
}

#[async_trait]
pub trait BuildRunner: Send + Sync {
    /// Start a build and return its event stream.
    async fn start(&self, request: BuildRequest) -> Result<BuildHandle>;
}

/// One build in flight per compilation.
#[derive(Clone, Default)]
pub struct BuildRegistry {
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl BuildRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the compilation; the slot frees when the guard drops.
    pub fn acquire(&self, compilation_id: &str) -> Result<BuildGuard, ModelError> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !in_flight.insert(compilation_id.to_string()) {
            return Err(ModelError::BuildInFlight {
                compilation_id: compilation_id.to_string(),
            });
        }
        Ok(BuildGuard {
            compilation_id: compilation_id.to_string(),
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    pub fn is_running(&self, compilation_id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(compilation_id)
    }
}

pub struct BuildGuard {
    compilation_id: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.remove(&self.compilation_id);
    }
}

const PHASES: &[&str] = &[
    "Fetching sources",
    "Applying configuration",
    "Compiling",
    "Packaging",
];

/// Timer-driven stand-in for a real build service.
#[derive(Debug, Clone)]
pub struct SimulatedBuildRunner {
    tick: Duration,
    steps_per_module: u32,
}

impl SimulatedBuildRunner {
    pub fn new(tick: Duration, steps_per_module: u32) -> Self {
        Self {
            tick,
            steps_per_module: steps_per_module.max(1),
        }
    }

    /// Modules to build, in snapshot order.
    fn select<'a>(
        snapshot: &'a ResolvedSnapshot,
        selected: &[String],
    ) -> Result<Vec<&'a ResolvedModule>, ModelError> {
        if selected.is_empty() {
            return Ok(snapshot.modules.iter().collect());
        }
        if let Some(unknown) = selected.iter().find(|id| snapshot.module(id).is_none()) {
            return Err(ModelError::not_found(Entity::Module, unknown.as_str()));
        }
        Ok(snapshot
            .modules
            .iter()
            .filter(|m| selected.contains(&m.module_id))
            .collect())
    }
}

/// Emits log records with monotonically increasing ids.
struct Emitter {
    tx: mpsc::Sender<BuildEvent>,
    next_id: u64,
}

impl Emitter {
    async fn log(&mut self, level: LogLevel, message: String, context: Option<String>) {
        self.next_id += 1;
        let record = BuildLogRecord {
            id: self.next_id,
            timestamp: crate::db::now_ms(),
            level,
            message,
            context,
        };
        let _ = self.tx.send(BuildEvent::Log(record)).await;
    }

    async fn module(&self, state: ModuleBuildState) {
        let _ = self.tx.send(BuildEvent::Module(state)).await;
    }
}

#[async_trait]
impl BuildRunner for SimulatedBuildRunner {
    async fn start(&self, request: BuildRequest) -> Result<BuildHandle> {
        let modules: Vec<ResolvedModule> = Self::select(&request.snapshot, &request.selected_module_ids)?
            .into_iter()
            .cloned()
            .collect();
        let (tx, rx) = mpsc::channel(64);
        let tick = self.tick;
        let steps = self.steps_per_module;
        let compilation_id = request.compilation_id.clone();
        let warnings = request.snapshot.warnings.clone();
        let version = request.snapshot.version.clone();

        debug!(compilation = %compilation_id, modules = modules.len(), "Starting simulated build");

        tokio::spawn(async move {
            let mut emit = Emitter { tx, next_id: 0 };
            emit.log(
                LogLevel::Info,
                format!(
                    "Build started for compilation {} at version {} ({} modules)",
                    compilation_id,
                    version,
                    modules.len()
                ),
                None,
            )
            .await;
            for warning in warnings {
                emit.log(LogLevel::Warn, warning, Some("resolution".to_string()))
                    .await;
            }
            for module in &modules {
                emit.module(ModuleBuildState::pending(&module.module_id)).await;
            }

            for module in &modules {
                let context = Some(module.project_name.clone());
                let mut state = ModuleBuildState {
                    status: ModuleBuildStatus::Building,
                    ..ModuleBuildState::pending(&module.module_id)
                };
                emit.module(state.clone()).await;

                let dangling: Vec<&str> = module
                    .configs
                    .iter()
                    .filter(|c| c.source == ValueSource::Dangling)
                    .map(|c| c.name.as_str())
                    .collect();

                for step in 1..=steps {
                    if !tick.is_zero() {
                        tokio::time::sleep(tick).await;
                    }
                    let phase = PHASES[((step - 1) as usize * PHASES.len() / steps as usize)
                        .min(PHASES.len() - 1)];
                    emit.log(
                        LogLevel::Info,
                        format!("{} ({}/{})", phase, step, steps),
                        context.clone(),
                    )
                    .await;

                    if !dangling.is_empty() && phase == "Applying configuration" {
                        break;
                    }
                    state.progress = (step * 100 / steps).min(100) as u8;
                    emit.module(state.clone()).await;
                }

                if dangling.is_empty() {
                    state.status = ModuleBuildStatus::Success;
                    state.progress = 100;
                    state.artifact_url = Some(format!(
                        "artifact://{}/{}/{}",
                        compilation_id, module.project_id, module.project_version
                    ));
                    emit.log(
                        LogLevel::Info,
                        format!("{} built successfully", module.project_name),
                        context.clone(),
                    )
                    .await;
                } else {
                    let message = format!("unresolved configuration: {}", dangling.join(", "));
                    state.status = ModuleBuildStatus::Failed;
                    state.error_message = Some(message.clone());
                    emit.log(LogLevel::Error, message, context.clone()).await;
                }
                emit.module(state).await;
            }

            emit.log(LogLevel::Info, "Build finished".to_string(), None)
                .await;
        });

        Ok(BuildHandle::new(request.compilation_id, rx))
    }
}
