//! In-memory page and map engine.
//!
//! Lets the full bootstrap run without a browser: the page records what was
//! written to it, the engine records layers, markers, popups and camera
//! moves, and fits extents with Web-Mercator math against a fixed viewport.

use std::collections::{BTreeMap, HashSet};
use std::f64::consts::PI;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use geo::{Point, Rect};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value as GeoJsonValue};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::config::ViewportConfig;
use crate::dashboard::Page;
use crate::engine::{
    CameraTarget, GoToOptions, LayerId, MapEngine, MarkerSpec, ModuleLoader, ModulesCallback, ViewOptions,
};
use crate::error::EngineError;
use crate::loader::Document;

const TILE_SIZE: f64 = 256.0;
const MAX_ZOOM: f64 = 23.0;
const MAX_LATITUDE: f64 = 85.051_128_78;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub center: Point<f64>,
    pub zoom: f64,
}

/// One `go_to` request as the engine received it.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraMove {
    pub target: CameraTarget,
    pub duration: Duration,
    pub zoom_before: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadlessMarker {
    pub layer: LayerId,
    pub index: usize,
}

#[derive(Debug, Default)]
struct Layer {
    title: String,
    markers: Vec<MarkerSpec>,
}

#[derive(Debug)]
pub struct HeadlessEngine {
    viewport: ViewportConfig,
    basemap: Option<String>,
    layers: Vec<Layer>,
    view: Option<ViewOptions>,
    camera: Camera,
    ready: Option<oneshot::Receiver<()>>,
    moves: Vec<CameraMove>,
    popup: Option<(HeadlessMarker, Point<f64>)>,
    interrupt_next: bool,
}

impl HeadlessEngine {
    pub fn new(viewport: ViewportConfig) -> Self {
        Self {
            viewport,
            basemap: None,
            layers: Vec::new(),
            view: None,
            camera: Camera { center: Point::new(0.0, 0.0), zoom: 0.0 },
            ready: None,
            moves: Vec::new(),
            popup: None,
            interrupt_next: false,
        }
    }

    /// The view only becomes ready once `signal` fires.
    pub fn with_ready_signal(mut self, signal: oneshot::Receiver<()>) -> Self {
        self.ready = Some(signal);
        self
    }

    pub fn basemap(&self) -> Option<&str> {
        self.basemap.as_deref()
    }

    pub fn view(&self) -> Option<&ViewOptions> {
        self.view.as_ref()
    }

    pub fn camera(&self) -> Camera {
        self.camera
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.camera.zoom = zoom;
    }

    pub fn moves(&self) -> &[CameraMove] {
        &self.moves
    }

    /// Make the next camera move fail, as an interrupted animation would.
    pub fn interrupt_next_move(&mut self) {
        self.interrupt_next = true;
    }

    pub fn layer_title(&self, layer: LayerId) -> Option<&str> {
        self.layers.get(layer.0).map(|l| l.title.as_str())
    }

    pub fn marker_spec(&self, layer: LayerId, index: usize) -> Option<&MarkerSpec> {
        self.layers.get(layer.0)?.markers.get(index)
    }

    pub fn markers(&self, layer: LayerId) -> &[MarkerSpec] {
        self.layers.get(layer.0).map(|l| l.markers.as_slice()).unwrap_or(&[])
    }

    pub fn open_popup_title(&self) -> Option<String> {
        let (marker, _) = self.popup?;
        self.marker_spec(marker.layer, marker.index)
            .map(|spec| spec.popup.title.clone())
    }

    /// Export one layer as GeoJSON, symbol and popup folded into the properties.
    pub fn layer_geojson(&self, layer: LayerId) -> FeatureCollection {
        let features = self
            .markers(layer)
            .iter()
            .map(|spec| {
                let mut properties: JsonObject = spec.attributes.clone();
                properties.insert("marker-color".into(), Value::from(spec.symbol.color));
                properties.insert("marker-size".into(), Value::from(spec.symbol.size));
                properties.insert("popup-title".into(), Value::from(spec.popup.title.clone()));
                Feature {
                    bbox: None,
                    geometry: Some(Geometry::new(GeoJsonValue::Point(vec![
                        spec.geometry.x(),
                        spec.geometry.y(),
                    ]))),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();
        FeatureCollection { bbox: None, features, foreign_members: None }
    }

    fn layer_mut(&mut self, layer: LayerId) -> Result<&mut Layer, EngineError> {
        self.layers
            .get_mut(layer.0)
            .ok_or_else(|| EngineError::new(format!("no layer {}", layer.0)))
    }
}

#[async_trait]
impl MapEngine for HeadlessEngine {
    type Marker = HeadlessMarker;

    fn create_map(&mut self, basemap: &str) -> Result<(), EngineError> {
        self.basemap = Some(basemap.to_string());
        Ok(())
    }

    fn add_layer(&mut self, title: &str) -> Result<LayerId, EngineError> {
        if self.basemap.is_none() {
            return Err(EngineError::new("layer added before the map was created"));
        }
        self.layers.push(Layer { title: title.to_string(), markers: Vec::new() });
        Ok(LayerId(self.layers.len() - 1))
    }

    fn create_view(&mut self, options: &ViewOptions) -> Result<(), EngineError> {
        if options.container.is_empty() {
            return Err(EngineError::new("view container id is empty"));
        }
        self.camera = Camera { center: options.center, zoom: options.zoom };
        self.view = Some(options.clone());
        Ok(())
    }

    fn add_marker(&mut self, layer: LayerId, marker: MarkerSpec) -> Result<HeadlessMarker, EngineError> {
        let target = self.layer_mut(layer)?;
        target.markers.push(marker);
        Ok(HeadlessMarker { layer, index: target.markers.len() - 1 })
    }

    fn clear_layer(&mut self, layer: LayerId) {
        if let Some(target) = self.layers.get_mut(layer.0) {
            target.markers.clear();
        }
        if matches!(self.popup, Some((marker, _)) if marker.layer == layer) {
            self.popup = None;
        }
    }

    fn marker_count(&self, layer: LayerId) -> usize {
        self.markers(layer).len()
    }

    async fn when_ready(&mut self) -> Result<(), EngineError> {
        if self.view.is_none() {
            return Err(EngineError::new("view was never created"));
        }
        if let Some(signal) = self.ready.take() {
            signal
                .await
                .map_err(|_| EngineError::new("view was destroyed before it became ready"))?;
        }
        Ok(())
    }

    fn zoom(&self) -> f64 {
        self.camera.zoom
    }

    async fn go_to(&mut self, target: CameraTarget, options: GoToOptions) -> Result<(), EngineError> {
        self.moves.push(CameraMove {
            target: target.clone(),
            duration: options.duration,
            zoom_before: self.camera.zoom,
        });
        if std::mem::take(&mut self.interrupt_next) {
            return Err(EngineError::new("goTo interrupted"));
        }
        self.camera = match target {
            CameraTarget::Point { center, zoom } => Camera { center, zoom },
            CameraTarget::Extent { bounds, padding } => fit_extent(bounds, padding, self.viewport, self.camera.zoom),
        };
        Ok(())
    }

    fn open_popup(&mut self, marker: &HeadlessMarker, location: Point<f64>) {
        self.popup = Some((*marker, location));
    }
}

/// Lon/lat to normalized Web-Mercator coordinates in `[0, 1]`.
fn mercator(point: Point<f64>) -> (f64, f64) {
    let lat_rad = point.y().clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let x = (point.x() + 180.0) / 360.0;
    let y = (1.0 - (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() / PI) / 2.0;
    (x, y)
}

fn inverse_mercator(x: f64, y: f64) -> Point<f64> {
    let lon = x * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * y)).sinh().atan().to_degrees();
    Point::new(lon, lat)
}

/// Camera that shows `bounds` inside the viewport minus `padding` on each side.
/// A zero-area extent keeps `current_zoom`.
pub fn fit_extent(bounds: Rect<f64>, padding: u32, viewport: ViewportConfig, current_zoom: f64) -> Camera {
    let (x0, y0) = mercator(Point::from(bounds.min()));
    let (x1, y1) = mercator(Point::from(bounds.max()));
    let center = inverse_mercator((x0 + x1) / 2.0, (y0 + y1) / 2.0);

    let usable_w = (viewport.width as f64 - 2.0 * padding as f64).max(1.0);
    let usable_h = (viewport.height as f64 - 2.0 * padding as f64).max(1.0);
    let span_x = (x1 - x0).abs();
    let span_y = (y1 - y0).abs();

    let zoom_for = |usable: f64, span: f64| {
        if span > 0.0 {
            (usable / (TILE_SIZE * span)).log2()
        } else {
            f64::INFINITY
        }
    };
    let zoom = zoom_for(usable_w, span_x).min(zoom_for(usable_h, span_y));
    let zoom = if zoom.is_finite() { zoom.clamp(0.0, MAX_ZOOM) } else { current_zoom };

    Camera { center, zoom }
}

/// Module loader backed by [`HeadlessEngine`].
#[derive(Debug)]
pub struct HeadlessLoader {
    viewport: ViewportConfig,
    ready: Mutex<Option<oneshot::Receiver<()>>>,
    requested: Mutex<Vec<String>>,
}

impl HeadlessLoader {
    pub fn new(viewport: ViewportConfig) -> Self {
        Self { viewport, ready: Mutex::new(None), requested: Mutex::new(Vec::new()) }
    }

    /// Engines built by this loader wait for `signal` before becoming ready.
    pub fn with_ready_signal(self, signal: oneshot::Receiver<()>) -> Self {
        *self.ready.lock().unwrap_or_else(|e| e.into_inner()) = Some(signal);
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ModuleLoader for HeadlessLoader {
    type Engine = HeadlessEngine;

    fn require(&self, modules: &[String], callback: ModulesCallback<HeadlessEngine>) {
        self.requested
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(modules.iter().cloned());
        if modules.is_empty() {
            callback(Err(EngineError::new("no modules requested")));
            return;
        }
        let mut engine = HeadlessEngine::new(self.viewport);
        if let Some(signal) = self.ready.lock().unwrap_or_else(|e| e.into_inner()).take() {
            engine = engine.with_ready_signal(signal);
        }
        callback(Ok(engine));
    }
}

#[derive(Debug, Default)]
struct PageState {
    stylesheets: Vec<String>,
    scripts: Vec<String>,
    text: BTreeMap<String, String>,
    html: BTreeMap<String, String>,
    classes: BTreeMap<String, Vec<String>>,
    banners: Vec<String>,
}

/// A page that records everything written to it. The module loader shows up
/// once any script has loaded, unless built with [`HeadlessPage::without_loader`].
#[derive(Debug)]
pub struct HeadlessPage {
    state: Mutex<PageState>,
    failing: HashSet<String>,
    loader: Option<HeadlessLoader>,
}

impl Default for HeadlessPage {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessPage {
    pub fn new() -> Self {
        Self::with_loader(HeadlessLoader::new(ViewportConfig::default()))
    }

    pub fn with_loader(loader: HeadlessLoader) -> Self {
        Self { state: Mutex::new(PageState::default()), failing: HashSet::new(), loader: Some(loader) }
    }

    pub fn without_loader() -> Self {
        Self { state: Mutex::new(PageState::default()), failing: HashSet::new(), loader: None }
    }

    /// Loading `url` will fail.
    pub fn fail_on(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut PageState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    pub fn stylesheets(&self) -> Vec<String> {
        self.with_state(|s| s.stylesheets.clone())
    }

    pub fn scripts(&self) -> Vec<String> {
        self.with_state(|s| s.scripts.clone())
    }

    pub fn text(&self, element_id: &str) -> Option<String> {
        self.with_state(|s| s.text.get(element_id).cloned())
    }

    pub fn html(&self, element_id: &str) -> Option<String> {
        self.with_state(|s| s.html.get(element_id).cloned())
    }

    pub fn classes(&self, element_id: &str) -> Vec<String> {
        self.with_state(|s| s.classes.get(element_id).cloned().unwrap_or_default())
    }

    pub fn banners(&self) -> Vec<String> {
        self.with_state(|s| s.banners.clone())
    }

    pub fn loader(&self) -> Option<&HeadlessLoader> {
        self.loader.as_ref()
    }
}

#[async_trait]
impl Document for HeadlessPage {
    async fn append_stylesheet(&self, href: &str) -> anyhow::Result<()> {
        if self.failing.contains(href) {
            return Err(anyhow!("stylesheet request failed"));
        }
        self.with_state(|s| s.stylesheets.push(href.to_string()));
        Ok(())
    }

    async fn append_script(&self, src: &str) -> anyhow::Result<()> {
        if self.failing.contains(src) {
            return Err(anyhow!("script request failed"));
        }
        self.with_state(|s| s.scripts.push(src.to_string()));
        Ok(())
    }

    fn set_text(&self, element_id: &str, text: &str) {
        self.with_state(|s| s.text.insert(element_id.to_string(), text.to_string()));
    }

    fn set_html(&self, element_id: &str, html: &str) {
        self.with_state(|s| s.html.insert(element_id.to_string(), html.to_string()));
    }

    fn add_class(&self, element_id: &str, class: &str) {
        self.with_state(|s| {
            let classes = s.classes.entry(element_id.to_string()).or_default();
            if !classes.iter().any(|c| c == class) {
                classes.push(class.to_string());
            }
        });
    }

    fn prepend_banner(&self, html: &str) {
        self.with_state(|s| s.banners.insert(0, html.to_string()));
    }
}

impl Page for HeadlessPage {
    type Loader = HeadlessLoader;

    fn module_loader(&self) -> Option<&HeadlessLoader> {
        let script_loaded = self.with_state(|s| !s.scripts.is_empty());
        if script_loaded {
            self.loader.as_ref()
        } else {
            None
        }
    }
}
