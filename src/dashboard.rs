//! Bootstrap sequencing for the overview page.
//!
//! Stages run strictly one after another: stylesheets, engine script,
//! loader capability, snapshot, text fields, map, plot, fit, queue wiring.
//! The first failure stops everything after it and becomes the page's error
//! banner; whatever was already rendered stays as it is.

use chrono::DateTime;
use serde_json::Number;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::config::AppConfig;
use crate::data::{SnapshotRepository, SnapshotSource};
use crate::engine::{MapEngine, ModuleLoader};
use crate::error::{BootstrapError, CapabilityTimeoutError};
use crate::loader::{Document, ResourceLoader};
use crate::map::{FocusOutcome, MapController};
use crate::queue::{self, escape_html, Element, QueueView};
use crate::types::{Delta, Kpi, Snapshot};

pub const QUEUE_LIST_ID: &str = "queueList";
const DASH: &str = "—";

/// A document that can also expose the engine's module loader once the
/// engine script has installed it.
pub trait Page: Document {
    type Loader: ModuleLoader;

    fn module_loader(&self) -> Option<&Self::Loader>;
}

pub type PageEngine<P> = <<P as Page>::Loader as ModuleLoader>::Engine;

/// A fully bootstrapped page: the map, the queue and the selection stream
/// that links them.
pub struct Dashboard<E: MapEngine> {
    snapshot: Snapshot,
    map: MapController<E>,
    queue: QueueView,
    selections: mpsc::UnboundedReceiver<String>,
}

impl<E: MapEngine> Dashboard<E> {
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn map(&self) -> &MapController<E> {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut MapController<E> {
        &mut self.map
    }

    /// Forward a click on the queue list.
    pub fn click<N: Element>(&mut self, path: &[N]) -> bool {
        self.queue.click(path)
    }

    /// Focus every selection made so far without waiting for new ones.
    pub async fn drain_selections(&mut self) -> Vec<FocusOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(id) = self.selections.try_recv() {
            outcomes.push(self.map.focus_incident(&id).await);
        }
        outcomes
    }

    /// Hand the queue to the caller and keep the map behind the selection
    /// stream. Clicks delivered through the returned [`QueueView`] reach the
    /// map once [`FocusLoop::run`] is driven.
    pub fn split(self) -> (QueueView, FocusLoop<E>) {
        let Self { map, queue, selections, .. } = self;
        (queue, FocusLoop { map, selections })
    }
}

/// The map side of a split [`Dashboard`].
pub struct FocusLoop<E: MapEngine> {
    map: MapController<E>,
    selections: mpsc::UnboundedReceiver<String>,
}

impl<E: MapEngine> FocusLoop<E> {
    /// Focus selections as they arrive. Ends once the queue view is dropped
    /// and hands the map back.
    pub async fn run(mut self) -> MapController<E> {
        while let Some(id) = self.selections.recv().await {
            let outcome = self.map.focus_incident(&id).await;
            debug!(id = %id, ?outcome, "selection handled");
        }
        self.map
    }
}

pub struct DashboardController<'a, P: Page> {
    page: &'a P,
    config: &'a AppConfig,
}

impl<'a, P: Page> DashboardController<'a, P> {
    pub fn new(page: &'a P, config: &'a AppConfig) -> Self {
        Self { page, config }
    }

    /// Run the bootstrap; on failure show the error banner and return `None`.
    pub async fn start(&self) -> Option<Dashboard<PageEngine<P>>> {
        match self.bootstrap().await {
            Ok(dashboard) => Some(dashboard),
            Err(e) => {
                error!(error = %e, "bootstrap failed");
                self.page.prepend_banner(&error_banner(&e));
                None
            }
        }
    }

    pub async fn bootstrap(&self) -> Result<Dashboard<PageEngine<P>>, BootstrapError> {
        let resources = &self.config.resources;
        let loader = ResourceLoader::new(self.page, resources.poll_interval());

        for href in &resources.stylesheets {
            loader.load_stylesheet(href).await?;
        }
        loader.load_script(&resources.script).await?;

        let page = self.page;
        let available = loader
            .wait_for_capability(|| page.module_loader().is_some(), resources.capability_timeout())
            .await;
        if !available {
            return Err(CapabilityTimeoutError {
                capability: resources.capability.clone(),
                script: resources.script.clone(),
                timeout: resources.capability_timeout(),
            }
            .into());
        }
        info!("resources loaded");

        let repository = SnapshotRepository::new(SnapshotSource::parse(&self.config.data.source));
        let snapshot = repository.load().await?;

        render_text_fields(self.page, &snapshot);
        let mut queue = QueueView::new();
        self.page.set_html(QUEUE_LIST_ID, &queue.render(&snapshot.dispatch_queue));

        let mut map =
            MapController::initialize(self.page.module_loader(), &self.config.map, &snapshot.map).await?;
        map.plot(&snapshot.incidents, &snapshot.assets)?;
        map.fit_to_content().await;
        map.when_ready().await?;

        let (tx, selections) = mpsc::unbounded_channel();
        queue.on_select(move |id| {
            let _ = tx.send(id.to_string());
        });
        info!("dashboard ready");

        Ok(Dashboard { snapshot, map, queue, selections })
    }
}

/// Header, summary and KPI fields. Plain text substitution.
pub fn render_text_fields<D: Document + ?Sized>(page: &D, snapshot: &Snapshot) {
    let header = &snapshot.header;
    let time = format_timestamp(&header.timestamp);
    page.set_text("userName", &header.user_name);
    page.set_text("notifBadge", &header.notifications.to_string());
    page.set_text("headerTime", &time);
    page.set_text("lastUpdate", &format!("Last update: {time}"));

    let s = &snapshot.summary;
    for (id, value) in [
        ("mActive", &s.active_incidents),
        ("mDeployed", &s.deployed_assets),
        ("mAvailable", &s.available_assets),
        ("mTotal", &s.total_casualties),
        ("mResponse", &s.avg_response_min),
        ("activeMissionsNum", &s.active_missions),
        ("openCases", &s.open_cases),
        ("inProgress", &s.in_progress_cases),
        ("avgResp", &s.avg_response_min),
        ("hotZones", &s.hot_zones),
    ] {
        page.set_text(id, &number(value));
    }

    page.set_text(
        "queueActiveCount",
        &queue::active_count(&snapshot.dispatch_queue).to_string(),
    );

    let k = &snapshot.kpis;
    page.set_text("kActiveIncidents", &number(&k.active_incidents.value));
    page.set_text("dActiveIncidents", &delta_badge(k.active_incidents.delta.as_ref()));
    page.set_text("kAvgResponse", &number(&k.avg_response_min.value));
    page.set_text("dAvgResponse", &delta_badge(k.avg_response_min.delta.as_ref()));
    page.set_text("kTargetResponse", &number(&k.avg_response_min.target));
    page.set_text("kAvailAssets", &ratio(&k.available_assets));
    page.set_text("dAvailAssets", &delta_badge(k.available_assets.delta.as_ref()));
    page.set_text("kEvacRate", &number(&k.evac_success_rate.value));
    page.set_text("dEvacRate", &delta_badge(k.evac_success_rate.delta.as_ref()));
    page.set_text("kTargetEvac", &number(&k.evac_success_rate.target));
    page.set_text("kTreated", &number(&k.treated24h.value));
    page.set_text("dTreated", &delta_badge(k.treated24h.delta.as_ref()));
    page.set_text("kBedsAvail", &ratio(&k.hospital_beds));
    page.set_text("dBedsAvail", &delta_badge(k.hospital_beds.delta.as_ref()));

    // A rising response time is bad news.
    if k.avg_response_min.delta.as_ref().is_some_and(Delta::is_up) {
        page.add_class("dAvgResponse", "is-bad");
    }
}

/// `"JAN 05, 2025 · 09:30:00"` in the timestamp's own offset.
pub fn format_timestamp(timestamp: &str) -> String {
    match DateTime::parse_from_rfc3339(timestamp) {
        Ok(dt) => format!(
            "{} {}",
            dt.format("%b").to_string().to_uppercase(),
            dt.format("%d, %Y · %H:%M:%S")
        ),
        Err(_) => DASH.to_string(),
    }
}

pub fn delta_badge(delta: Option<&Delta>) -> String {
    let Some(delta) = delta else {
        return DASH.to_string();
    };
    let arrow = if delta.direction == "down" { "↘" } else { "↗" };
    let unit = delta.unit.as_deref().unwrap_or("%");
    format!("{arrow} {}{unit}", delta.value.abs())
}

fn number(value: &Option<Number>) -> String {
    value.as_ref().map(Number::to_string).unwrap_or_else(|| DASH.to_string())
}

fn ratio(kpi: &Kpi) -> String {
    format!("{}/{}", number(&kpi.value), number(&kpi.total))
}

pub fn error_banner(err: &dyn std::error::Error) -> String {
    format!(
        concat!(
            r#"<div style="padding:14px;margin:14px;border:1px solid #fecaca;background:#fff1f2;border-radius:12px">"#,
            r#"<b>App failed to start.</b>"#,
            r#"<div style="margin-top:6px;font-family:ui-monospace, SFMono-Regular, Menlo, monospace">{}</div>"#,
            r#"</div>"#
        ),
        escape_html(&err.to_string())
    )
}
