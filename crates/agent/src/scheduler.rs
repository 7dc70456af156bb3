//! Periodic audit runs
//!
//! Resolves the project groups, runs every audit over them, keeps the
//! latest report for the API and reflects the outcome in the health registry.

use audit_lib::health::components;
use audit_lib::{AuditRunner, HealthRegistry, MultiProjectReport, ProjectManager};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::{interval, Instant};
use tracing::{debug, info};

/// Which projects each run covers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectSelection {
    pub explicit: Option<Vec<String>>,
    pub all: bool,
    pub combine: bool,
}

/// Latest finished report, shared with the API
pub type ReportHandle = Arc<RwLock<Option<Arc<MultiProjectReport>>>>;

pub struct AuditScheduler {
    runner: AuditRunner,
    projects: ProjectManager,
    selection: ProjectSelection,
    health: HealthRegistry,
    latest: ReportHandle,
    interval: Duration,
    /// Serializes scheduled runs and on-demand refreshes
    run_lock: Arc<Mutex<()>>,
}

impl AuditScheduler {
    pub fn new(
        runner: AuditRunner,
        projects: ProjectManager,
        selection: ProjectSelection,
        health: HealthRegistry,
        interval: Duration,
    ) -> Self {
        Self {
            runner,
            projects,
            selection,
            health,
            latest: Arc::new(RwLock::new(None)),
            interval,
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn latest(&self) -> ReportHandle {
        Arc::clone(&self.latest)
    }

    /// Run one audit cycle now; `None` when no project could be resolved
    pub async fn run_once(&self) -> Option<Arc<MultiProjectReport>> {
        let _guard = self.run_lock.lock().await;
        self.run_cycle().await
    }

    /// Start a cycle in the background; `false` when one is already running
    pub fn trigger(self: &Arc<Self>) -> bool {
        let Ok(guard) = Arc::clone(&self.run_lock).try_lock_owned() else {
            debug!("Audit cycle already in progress, refresh skipped");
            return false;
        };

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            scheduler.run_cycle().await;
            drop(guard);
        });
        true
    }

    async fn run_cycle(&self) -> Option<Arc<MultiProjectReport>> {
        let started = Instant::now();

        let groups = self
            .projects
            .initialize_projects(
                self.selection.explicit.as_deref(),
                self.selection.all,
                self.selection.combine,
            )
            .await;

        if groups.is_empty() {
            self.health
                .set_unhealthy(components::PROJECT_MANAGER, "No projects could be resolved")
                .await;
            return None;
        }
        self.health.set_healthy(components::PROJECT_MANAGER).await;

        if self.runner.has_time_series() {
            self.health.set_healthy(components::MONITORING).await;
        } else {
            self.health
                .set_degraded(
                    components::MONITORING,
                    "No monitoring backend, usage metrics read as zero",
                )
                .await;
        }

        let groups = self.projects.project_data_groups(&groups).await;
        let report = Arc::new(self.runner.run_groups(&groups).await);

        let issues = report.issue_count();
        if issues == 0 {
            self.health.set_healthy(components::AUDIT_RUNNER).await;
        } else {
            self.health
                .set_degraded(
                    components::AUDIT_RUNNER,
                    format!("{} issue(s) recorded in the last run", issues),
                )
                .await;
        }

        *self.latest.write().await = Some(Arc::clone(&report));
        self.health.set_ready(true).await;

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            projects = report.project_count(),
            "Audit cycle complete"
        );
        Some(report)
    }

    /// Run on every tick until shutdown
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting audit scheduler"
        );

        let mut ticker = interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down audit scheduler");
                    break;
                }
            }
        }
    }
}
