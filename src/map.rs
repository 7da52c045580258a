//! Owns the map engine, the incident and asset layers, and the camera.
//!
//! Lifecycle: `Initializing` from construction until the view reports ready,
//! then `Ready`, passing through `Plotting` while layers are rebuilt. Fit
//! and focus requests made before the view is ready are queued and replayed
//! in order once it is.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use geo::{BoundingRect, MultiPoint, Point};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::MapConfig;
use crate::engine::{
    load_modules, CameraTarget, GoToOptions, LayerId, MapEngine, MarkerSpec, ModuleLoader, ViewOptions,
};
use crate::error::{EngineError, MapInitError};
use crate::styler;
use crate::types::{Asset, Incident, MapViewport};

pub const INCIDENTS_LAYER: &str = "Incidents";
pub const ASSETS_LAYER: &str = "Medical Assets";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapState {
    Initializing,
    Ready,
    Plotting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusOutcome {
    Focused,
    /// Queued until the view is ready.
    Deferred,
    /// The id is not on the map. Not an error.
    Missed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitOutcome {
    Fitted,
    Deferred,
    Empty,
}

/// Links a domain id to the engine marker drawn for it.
#[derive(Debug, Clone)]
pub struct MarkerRef<M> {
    pub marker: M,
    pub location: Point<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct CameraSettings {
    pub padding: u32,
    pub duration: Duration,
    pub min_focus_zoom: f64,
}

impl From<&MapConfig> for CameraSettings {
    fn from(config: &MapConfig) -> Self {
        Self {
            padding: config.fit_padding,
            duration: config.animation(),
            min_focus_zoom: config.min_focus_zoom,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PendingOp {
    Fit,
    Focus(String),
}

pub struct MapController<E: MapEngine> {
    engine: E,
    state: MapState,
    incidents: LayerId,
    assets: LayerId,
    incident_markers: HashMap<String, MarkerRef<E::Marker>>,
    asset_markers: HashMap<String, MarkerRef<E::Marker>>,
    plotted: Vec<Point<f64>>,
    pending: VecDeque<PendingOp>,
    camera: CameraSettings,
}

impl<E: MapEngine> MapController<E> {
    /// Load the engine modules and build the map, both layers and the view.
    pub async fn initialize<L>(
        loader: Option<&L>,
        config: &MapConfig,
        viewport: &MapViewport,
    ) -> Result<Self, MapInitError>
    where
        L: ModuleLoader<Engine = E> + ?Sized,
    {
        let loader = loader.ok_or(MapInitError::LoaderUnavailable)?;
        let engine = load_modules(loader, &config.modules).await?;
        Self::from_engine(engine, config, viewport)
    }

    pub fn from_engine(mut engine: E, config: &MapConfig, viewport: &MapViewport) -> Result<Self, MapInitError> {
        engine.create_map(&config.basemap)?;
        let incidents = engine.add_layer(INCIDENTS_LAYER)?;
        let assets = engine.add_layer(ASSETS_LAYER)?;
        engine.create_view(&ViewOptions {
            container: config.container.clone(),
            center: viewport.center_point(),
            zoom: viewport.zoom,
            snap_to_zoom: false,
        })?;
        info!(container = %config.container, zoom = viewport.zoom, "map view created");

        Ok(Self {
            engine,
            state: MapState::Initializing,
            incidents,
            assets,
            incident_markers: HashMap::new(),
            asset_markers: HashMap::new(),
            plotted: Vec::new(),
            pending: VecDeque::new(),
            camera: CameraSettings::from(config),
        })
    }

    pub fn state(&self) -> MapState {
        self.state
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn incident_layer(&self) -> LayerId {
        self.incidents
    }

    pub fn asset_layer(&self) -> LayerId {
        self.assets
    }

    pub fn marker_count(&self, layer: LayerId) -> usize {
        self.engine.marker_count(layer)
    }

    pub fn incident_marker(&self, id: &str) -> Option<&MarkerRef<E::Marker>> {
        self.incident_markers.get(id)
    }

    pub fn asset_marker(&self, id: &str) -> Option<&MarkerRef<E::Marker>> {
        self.asset_markers.get(id)
    }

    /// Await the view's ready signal, then replay queued requests.
    pub async fn when_ready(&mut self) -> Result<(), MapInitError> {
        if self.state == MapState::Initializing {
            self.engine.when_ready().await?;
            self.state = MapState::Ready;
            debug!(queued = self.pending.len(), "map view ready");
        }
        while let Some(op) = self.pending.pop_front() {
            match op {
                PendingOp::Fit => {
                    self.fit_now().await;
                }
                PendingOp::Focus(id) => {
                    self.focus_now(&id).await;
                }
            }
        }
        Ok(())
    }

    /// Replace both layers' contents with markers for the given entities.
    pub fn plot(&mut self, incidents: &[Incident], assets: &[Asset]) -> Result<(), MapInitError> {
        let previous = self.state;
        self.state = MapState::Plotting;
        let result = self.rebuild(incidents, assets);
        self.state = previous;
        result?;
        info!(
            incidents = self.marker_count(self.incidents),
            assets = self.marker_count(self.assets),
            "markers plotted"
        );
        Ok(())
    }

    fn rebuild(&mut self, incidents: &[Incident], assets: &[Asset]) -> Result<(), MapInitError> {
        self.engine.clear_layer(self.incidents);
        self.engine.clear_layer(self.assets);
        self.incident_markers.clear();
        self.asset_markers.clear();
        self.plotted.clear();

        for incident in incidents {
            let location = incident.coords.to_point();
            let marker = self.engine.add_marker(
                self.incidents,
                MarkerSpec {
                    geometry: location,
                    symbol: styler::incident_symbol(&incident.severity),
                    attributes: attributes(incident)?,
                    popup: styler::incident_popup(incident),
                },
            )?;
            self.plotted.push(location);
            // First marker wins when ids repeat.
            self.incident_markers
                .entry(incident.id.clone())
                .or_insert(MarkerRef { marker, location });
        }

        for asset in assets {
            let location = asset.coords.to_point();
            let marker = self.engine.add_marker(
                self.assets,
                MarkerSpec {
                    geometry: location,
                    symbol: styler::asset_symbol(&asset.status),
                    attributes: attributes(asset)?,
                    popup: styler::asset_popup(asset),
                },
            )?;
            self.plotted.push(location);
            self.asset_markers
                .entry(asset.id.clone())
                .or_insert(MarkerRef { marker, location });
        }
        Ok(())
    }

    /// Move the camera so every plotted marker is visible.
    pub async fn fit_to_content(&mut self) -> FitOutcome {
        if self.state != MapState::Ready {
            self.pending.push_back(PendingOp::Fit);
            return FitOutcome::Deferred;
        }
        self.fit_now().await
    }

    async fn fit_now(&mut self) -> FitOutcome {
        let Some(bounds) = MultiPoint::from(self.plotted.clone()).bounding_rect() else {
            debug!("nothing plotted, skipping fit");
            return FitOutcome::Empty;
        };
        let target = CameraTarget::Extent { bounds, padding: self.camera.padding };
        if let Err(e) = self.engine.go_to(target, self.options()).await {
            warn!(error = %e, "camera fit failed");
        }
        FitOutcome::Fitted
    }

    /// Center on an incident marker and open its popup.
    pub async fn focus_incident(&mut self, id: &str) -> FocusOutcome {
        if self.state != MapState::Ready {
            self.pending.push_back(PendingOp::Focus(id.to_string()));
            return FocusOutcome::Deferred;
        }
        self.focus_now(id).await
    }

    async fn focus_now(&mut self, id: &str) -> FocusOutcome {
        let Some(found) = self.incident_markers.get(id) else {
            debug!(id, "incident not on the map");
            return FocusOutcome::Missed;
        };
        let marker = found.marker.clone();
        let location = found.location;

        // Never zoom out to focus.
        let zoom = self.engine.zoom().max(self.camera.min_focus_zoom);
        let target = CameraTarget::Point { center: location, zoom };
        if let Err(e) = self.engine.go_to(target, self.options()).await {
            warn!(id, error = %e, "camera focus failed");
        }
        self.engine.open_popup(&marker, location);
        FocusOutcome::Focused
    }

    fn options(&self) -> GoToOptions {
        GoToOptions { duration: self.camera.duration }
    }
}

fn attributes<T: Serialize>(entity: &T) -> Result<Map<String, Value>, EngineError> {
    match serde_json::to_value(entity) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Ok(Map::new()),
        Err(e) => Err(EngineError::new(format!("attributes: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewportConfig;
    use crate::headless::{HeadlessEngine, HeadlessLoader};
    use crate::types::{Casualties, Coords};
    use tokio::sync::oneshot;

    fn incident(id: &str, severity: &str, lat: f64, lon: f64) -> Incident {
        Incident {
            id: id.into(),
            code: format!("INC-{id}"),
            kind: "Fire".into(),
            description: "Structure fire".into(),
            severity: severity.into(),
            status: "pending".into(),
            officer: "Sgt. Nasser".into(),
            coords: Coords { lat, lon },
            casualties: Casualties::default(),
            last_update_label: None,
        }
    }

    fn asset(id: &str, status: &str, lat: f64, lon: f64) -> Asset {
        Asset {
            id: id.into(),
            label: format!("AMB-{id}"),
            kind: "Ambulance".into(),
            team: "Alpha".into(),
            status: status.into(),
            eta_min: None,
            coords: Coords { lat, lon },
        }
    }

    fn viewport() -> MapViewport {
        MapViewport { center: [46.6753, 24.7136], zoom: 11.0 }
    }

    async fn ready_controller() -> MapController<HeadlessEngine> {
        let engine = HeadlessEngine::new(ViewportConfig::default());
        let mut map = MapController::from_engine(engine, &MapConfig::default(), &viewport()).unwrap();
        map.when_ready().await.unwrap();
        map
    }

    #[tokio::test]
    async fn missing_loader_is_fatal() {
        let result = MapController::<HeadlessEngine>::initialize(
            None::<&HeadlessLoader>,
            &MapConfig::default(),
            &viewport(),
        )
        .await;
        assert!(matches!(result, Err(MapInitError::LoaderUnavailable)));
    }

    #[test]
    fn view_without_a_container_is_fatal() {
        let config = MapConfig { container: String::new(), ..MapConfig::default() };
        let engine = HeadlessEngine::new(ViewportConfig::default());

        let result = MapController::from_engine(engine, &config, &viewport());
        assert!(matches!(result, Err(MapInitError::Engine(_))));
    }

    #[tokio::test]
    async fn replotting_does_not_leak_markers() {
        let mut map = ready_controller().await;
        let incidents = vec![incident("1", "critical", 24.70, 46.67), incident("2", "low", 24.75, 46.70)];
        let assets = vec![asset("a", "available", 24.72, 46.68)];

        map.plot(&incidents, &assets).unwrap();
        map.plot(&incidents, &assets).unwrap();
        assert_eq!(map.marker_count(map.incident_layer()), 2);
        assert_eq!(map.marker_count(map.asset_layer()), 1);

        map.plot(&incidents[..1], &[]).unwrap();
        assert_eq!(map.marker_count(map.incident_layer()), 1);
        assert_eq!(map.marker_count(map.asset_layer()), 0);
        assert!(map.incident_marker("2").is_none());
        assert_eq!(map.state(), MapState::Ready);
    }

    #[tokio::test]
    async fn focus_on_unknown_id_leaves_camera_alone() {
        let mut map = ready_controller().await;
        map.plot(&[incident("1", "high", 24.70, 46.67)], &[]).unwrap();
        let before = map.engine().camera();

        assert_eq!(map.focus_incident("does-not-exist").await, FocusOutcome::Missed);
        assert_eq!(map.engine().camera(), before);
        assert!(map.engine().moves().is_empty());
        assert!(map.engine().open_popup_title().is_none());
    }

    #[tokio::test]
    async fn focus_never_zooms_out() {
        let mut map = ready_controller().await;
        map.plot(&[incident("1", "high", 24.70, 46.67)], &[]).unwrap();

        // Current zoom 11 is below the focus minimum.
        assert_eq!(map.focus_incident("1").await, FocusOutcome::Focused);
        let camera = map.engine().camera();
        assert_eq!(camera.zoom, 14.0);
        assert_eq!(camera.center, Point::new(46.67, 24.70));
        assert_eq!(map.engine().open_popup_title().as_deref(), Some("INC-1 · Fire · PENDING"));

        // Already closer than the minimum: keep it.
        map.engine_mut().set_zoom(16.5);
        map.focus_incident("1").await;
        assert_eq!(map.engine().camera().zoom, 16.5);
        assert_eq!(map.engine().moves().last().unwrap().duration, Duration::from_millis(600));
    }

    #[tokio::test]
    async fn fit_with_nothing_plotted_is_a_no_op() {
        let mut map = ready_controller().await;
        map.plot(&[], &[]).unwrap();

        assert_eq!(map.fit_to_content().await, FitOutcome::Empty);
        assert!(map.engine().moves().is_empty());
    }

    #[tokio::test]
    async fn fit_targets_the_extent_of_all_markers() {
        let mut map = ready_controller().await;
        map.plot(
            &[incident("1", "critical", 24.60, 46.60)],
            &[asset("a", "deployed", 24.80, 46.90)],
        )
        .unwrap();

        assert_eq!(map.fit_to_content().await, FitOutcome::Fitted);
        let request = map.engine().moves().last().cloned().unwrap();
        match request.target {
            CameraTarget::Extent { bounds, padding } => {
                assert_eq!(padding, 70);
                assert_eq!(bounds.min().x, 46.60);
                assert_eq!(bounds.max().y, 24.80);
            }
            other => panic!("unexpected target {other:?}"),
        }
    }

    #[tokio::test]
    async fn camera_failures_are_swallowed() {
        let mut map = ready_controller().await;
        map.plot(&[incident("1", "critical", 24.60, 46.60)], &[]).unwrap();
        map.engine_mut().interrupt_next_move();

        assert_eq!(map.fit_to_content().await, FitOutcome::Fitted);
        assert_eq!(map.engine().camera().zoom, 11.0);
    }

    #[tokio::test]
    async fn requests_before_ready_are_replayed_in_order() {
        let (tx, rx) = oneshot::channel();
        let engine = HeadlessEngine::new(ViewportConfig::default()).with_ready_signal(rx);
        let mut map = MapController::from_engine(engine, &MapConfig::default(), &viewport()).unwrap();
        map.plot(&[incident("1", "critical", 24.60, 46.60), incident("2", "low", 24.90, 46.95)], &[])
            .unwrap();
        assert_eq!(map.state(), MapState::Initializing);

        assert_eq!(map.fit_to_content().await, FitOutcome::Deferred);
        assert_eq!(map.focus_incident("2").await, FocusOutcome::Deferred);
        assert!(map.engine().moves().is_empty());

        tx.send(()).unwrap();
        map.when_ready().await.unwrap();

        assert_eq!(map.state(), MapState::Ready);
        let moves = map.engine().moves();
        assert_eq!(moves.len(), 2);
        assert!(matches!(moves[0].target, CameraTarget::Extent { .. }));
        assert_eq!(
            moves[1].target,
            CameraTarget::Point { center: Point::new(46.95, 24.90), zoom: moves[1].zoom_before.max(14.0) }
        );
    }

    #[tokio::test]
    async fn markers_carry_entity_attributes() {
        let mut map = ready_controller().await;
        map.plot(&[incident("1", "critical", 24.60, 46.60)], &[asset("a", "deployed", 24.8, 46.9)])
            .unwrap();

        let spec = map.engine().marker_spec(map.incident_layer(), 0).unwrap();
        assert_eq!(spec.attributes["id"], "1");
        assert_eq!(spec.attributes["type"], "Fire");
        assert_eq!(spec.symbol.color, "#ff4d4f");

        let spec = map.engine().marker_spec(map.asset_layer(), 0).unwrap();
        assert_eq!(spec.attributes["label"], "AMB-a");
        assert_eq!(spec.symbol.color, "#3b82f6");
    }
}
