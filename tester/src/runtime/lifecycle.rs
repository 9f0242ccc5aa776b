//! Resource Lifecycle Manager
//!
//! Creates the org, space and apps a run needs, remembers everything it (or a
//! scenario) created, and deletes it all again in dependency order whatever
//! happened in between.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::join_all;
use shared::{NameGenerator, ResourceHandle, ResourceKind};
use tracing::{debug, info, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::platform::cf::{AppSpec, CfCli};

#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionedResource {
    pub handle: ResourceHandle,
    pub created_at: DateTime<Utc>,
}

/// A deletion that did not succeed during teardown.
#[derive(Debug, Clone, PartialEq)]
pub struct TeardownFailure {
    pub handle: ResourceHandle,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeardownReport {
    pub deleted: Vec<ResourceHandle>,
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct ResourceLifecycle {
    cf: CfCli,
    names: Arc<NameGenerator>,
    prefix: String,
    registry: Mutex<HashMap<ResourceHandle, DateTime<Utc>>>,
}

impl ResourceLifecycle {
    pub fn new(cf: CfCli, names: Arc<NameGenerator>, prefix: impl Into<String>) -> Self {
        Self {
            cf,
            names,
            prefix: prefix.into(),
            registry: Mutex::new(HashMap::new()),
        }
    }

    pub fn cf(&self) -> &CfCli {
        &self.cf
    }

    pub fn names(&self) -> &NameGenerator {
        &self.names
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<ResourceHandle, DateTime<Utc>>> {
        self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Remember `handle` for teardown. Returns `false` if it was already recorded.
    pub fn record_for_teardown(&self, handle: ResourceHandle) -> bool {
        let mut registry = self.registry();
        if registry.contains_key(&handle) {
            return false;
        }
        debug!("📌 Recording {} for teardown", handle);
        registry.insert(handle, Utc::now());
        true
    }

    /// Stop tracking a resource the caller already deleted.
    pub fn forget(&self, handle: &ResourceHandle) -> bool {
        self.registry().remove(handle).is_some()
    }

    /// Currently recorded resources, oldest first.
    pub fn resources(&self) -> Vec<ProvisionedResource> {
        let mut resources: Vec<ProvisionedResource> = self
            .registry()
            .iter()
            .map(|(handle, created_at)| ProvisionedResource {
                handle: handle.clone(),
                created_at: *created_at,
            })
            .collect();
        resources.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.handle.name.cmp(&b.handle.name)));
        resources
    }

    /// Target the API, authenticate, then create and target a fresh org and space.
    pub async fn provision_org_and_space(&self) -> HarnessResult<(String, String)> {
        let org = self.names.prefixed(&self.prefix, "ORG");
        let space = self.names.prefixed(&self.prefix, "SPACE");

        info!("🏗️ Provisioning org {} and space {}", org, space);
        self.cf.api().await?;
        self.cf.auth().await?;

        self.cf.create_org(&org).await?;
        self.record_for_teardown(ResourceHandle::org(&org));

        self.cf.create_space(&org, &space).await?;
        self.record_for_teardown(ResourceHandle::space(&space));

        self.cf.target(&org, &space).await?;
        Ok((org, space))
    }

    pub async fn provision_app(&self, spec: &AppSpec) -> HarnessResult<String> {
        info!("📦 Pushing {} from {}", spec.name, spec.path.display());
        self.cf.push(spec).await?;
        self.record_for_teardown(ResourceHandle::app(&spec.name));
        Ok(spec.name.clone())
    }

    /// Push every app concurrently and wait for all of them.
    ///
    /// Apps that were pushed stay recorded even when others fail.
    pub async fn provision_apps(&self, specs: &[AppSpec]) -> HarnessResult<Vec<String>> {
        let outcomes = join_all(specs.iter().map(|spec| self.provision_app(spec))).await;

        let mut names = Vec::with_capacity(specs.len());
        let mut failures = Vec::new();
        for (spec, outcome) in specs.iter().zip(outcomes) {
            match outcome {
                Ok(name) => names.push(name),
                Err(e) => failures.push(format!("{}: {}", spec.name, e)),
            }
        }

        if failures.is_empty() {
            Ok(names)
        } else {
            Err(HarnessError::ProvisioningFailed { failures })
        }
    }

    async fn delete(&self, handle: &ResourceHandle) -> HarnessResult<()> {
        match handle.kind {
            ResourceKind::App => self.cf.delete_app(&handle.name).await,
            ResourceKind::Drain => self.cf.delete_drain(&handle.name).await,
            ResourceKind::SpaceDrain => self.cf.delete_drain_space(&handle.name).await,
            ResourceKind::Space => self.cf.delete_space(&handle.name).await,
            ResourceKind::Org => self.cf.delete_org(&handle.name).await,
        }
    }

    /// Delete every recorded resource, level by level, never failing.
    pub async fn teardown_all(&self) -> TeardownReport {
        let recorded: Vec<ResourceHandle> = self.registry().drain().map(|(handle, _)| handle).collect();
        let mut levels: BTreeMap<u8, Vec<ResourceHandle>> = BTreeMap::new();
        for handle in recorded {
            levels.entry(handle.kind.teardown_level()).or_default().push(handle);
        }

        let mut report = TeardownReport::default();
        for (level, handles) in levels {
            debug!("🧹 Teardown level {}: {} resources", level, handles.len());
            let outcomes = join_all(handles.iter().map(|handle| self.delete(handle))).await;
            for (handle, outcome) in handles.into_iter().zip(outcomes) {
                match outcome {
                    Ok(()) => report.deleted.push(handle),
                    Err(e) => {
                        warn!("⚠️ Failed to delete {}: {}", handle, e);
                        report.failures.push(TeardownFailure {
                            handle,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        if !report.deleted.is_empty() || !report.failures.is_empty() {
            info!(
                "🧹 Teardown finished: {} deleted, {} failed",
                report.deleted.len(),
                report.failures.len()
            );
        }
        report
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioPhase {
    Idle,
    Provisioning,
    Active,
    TearingDown,
    Done,
}

/// Drives provisioning, a body and teardown, guaranteeing the teardown.
pub struct ScenarioRun {
    name: String,
    lifecycle: Arc<ResourceLifecycle>,
    phases: Vec<ScenarioPhase>,
    report: Option<TeardownReport>,
}

impl ScenarioRun {
    pub fn new(name: impl Into<String>, lifecycle: Arc<ResourceLifecycle>) -> Self {
        Self {
            name: name.into(),
            lifecycle,
            phases: vec![ScenarioPhase::Idle],
            report: None,
        }
    }

    pub fn phase(&self) -> ScenarioPhase {
        self.phases.last().copied().unwrap_or(ScenarioPhase::Idle)
    }

    /// Every phase entered so far, starting with `Idle`.
    pub fn phases(&self) -> &[ScenarioPhase] {
        &self.phases
    }

    pub fn teardown_report(&self) -> Option<&TeardownReport> {
        self.report.as_ref()
    }

    fn enter(&mut self, phase: ScenarioPhase) {
        debug!("🔀 {}: {:?} -> {:?}", self.name, self.phase(), phase);
        self.phases.push(phase);
    }

    /// Run `provision`, then `body` with its output, then tear down.
    ///
    /// Teardown runs after a provisioning error, a body error and a panic in
    /// either. A panic is resumed once teardown is done; otherwise the body's
    /// result is returned unchanged, whatever teardown reported.
    pub async fn execute<S, T, P, B, F>(&mut self, provision: P, body: B) -> HarnessResult<T>
    where
        P: Future<Output = HarnessResult<S>>,
        B: FnOnce(S) -> F,
        F: Future<Output = HarnessResult<T>>,
    {
        self.enter(ScenarioPhase::Provisioning);
        let outcome = match AssertUnwindSafe(provision).catch_unwind().await {
            Ok(Ok(state)) => {
                self.enter(ScenarioPhase::Active);
                AssertUnwindSafe(async move { body(state).await }).catch_unwind().await
            }
            Ok(Err(e)) => {
                warn!("❌ {}: provisioning failed: {}", self.name, e);
                Ok(Err(e))
            }
            Err(panic) => Err(panic),
        };

        self.enter(ScenarioPhase::TearingDown);
        let report = self.lifecycle.teardown_all().await;
        for failure in &report.failures {
            warn!("⚠️ {}: leaked {} ({})", self.name, failure.handle, failure.reason);
        }
        self.report = Some(report);
        self.enter(ScenarioPhase::Done);

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
