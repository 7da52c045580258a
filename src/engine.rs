//! Boundary to the external mapping engine.
//!
//! The engine is only ever reached through [`MapEngine`] and
//! [`ModuleLoader`]. Its module system hands results to a callback; the
//! [`load_modules`] adapter turns that into a single awaitable call.

use std::time::Duration;

use async_trait::async_trait;
use geo::{Point, Rect};
use serde_json::{Map, Value};
use tokio::sync::oneshot;

use crate::error::{EngineError, MapInitError};
use crate::styler::{Popup, Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerId(pub usize);

#[derive(Debug, Clone)]
pub struct ViewOptions {
    pub container: String,
    pub center: Point<f64>,
    pub zoom: f64,
    pub snap_to_zoom: bool,
}

/// Everything the engine needs to draw one marker.
#[derive(Debug, Clone)]
pub struct MarkerSpec {
    pub geometry: Point<f64>,
    pub symbol: Symbol,
    /// The entity in the engine's native attribute format.
    pub attributes: Map<String, Value>,
    pub popup: Popup,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CameraTarget {
    /// Fit a lon/lat extent with `padding` pixels on every side.
    Extent { bounds: Rect<f64>, padding: u32 },
    /// Center on a point at a given zoom.
    Point { center: Point<f64>, zoom: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoToOptions {
    pub duration: Duration,
}

#[async_trait]
pub trait MapEngine: Send + 'static {
    /// Engine-native handle for a drawn marker.
    type Marker: Clone + Send + Sync;

    fn create_map(&mut self, basemap: &str) -> Result<(), EngineError>;
    fn add_layer(&mut self, title: &str) -> Result<LayerId, EngineError>;
    fn create_view(&mut self, options: &ViewOptions) -> Result<(), EngineError>;

    fn add_marker(&mut self, layer: LayerId, marker: MarkerSpec) -> Result<Self::Marker, EngineError>;
    fn clear_layer(&mut self, layer: LayerId);
    fn marker_count(&self, layer: LayerId) -> usize;

    /// Resolves once the view has finished its own asynchronous setup.
    async fn when_ready(&mut self) -> Result<(), EngineError>;

    fn zoom(&self) -> f64;
    async fn go_to(&mut self, target: CameraTarget, options: GoToOptions) -> Result<(), EngineError>;
    fn open_popup(&mut self, marker: &Self::Marker, location: Point<f64>);
}

pub type ModulesCallback<E> = Box<dyn FnOnce(Result<E, EngineError>) + Send>;

/// The engine's callback-style module loader (`require([...], cb)`).
pub trait ModuleLoader: Send + Sync {
    type Engine: MapEngine;

    fn require(&self, modules: &[String], callback: ModulesCallback<Self::Engine>);
}

pub async fn load_modules<L>(loader: &L, modules: &[String]) -> Result<L::Engine, MapInitError>
where
    L: ModuleLoader + ?Sized,
{
    let (tx, rx) = oneshot::channel();
    loader.require(
        modules,
        Box::new(move |result| {
            let _ = tx.send(result);
        }),
    );
    match rx.await {
        Ok(Ok(engine)) => Ok(engine),
        Ok(Err(e)) => Err(MapInitError::Modules(e.to_string())),
        Err(_) => Err(MapInitError::Modules("module loader dropped its callback".into())),
    }
}
