use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use std::time::Duration;
use anyhow::{Context, Result};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub resources: ResourceConfig,
    pub data: DataConfig,
    pub map: MapConfig,
    pub viewport: ViewportConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ResourceConfig {
    pub stylesheets: Vec<String>, // Injected in order, one at a time
    pub script: String,
    pub capability: String,
    pub capability_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl ResourceConfig {
    pub fn capability_timeout(&self) -> Duration {
        Duration::from_millis(self.capability_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            stylesheets: vec![
                "https://fonts.googleapis.com/css2?family=Tajawal:wght@200;300;400;500;700;800;900&display=swap".into(),
                "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.5.0/css/all.min.css".into(),
                "https://js.arcgis.com/4.26/esri/themes/light/main.css".into(),
            ],
            script: "https://js.arcgis.com/4.26/init.js".into(),
            capability: "require".into(),
            capability_timeout_ms: 8000,
            poll_interval_ms: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DataConfig {
    pub source: String, // http(s) URL or file path
}

impl Default for DataConfig {
    fn default() -> Self {
        Self { source: "data.json".into() }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapConfig {
    pub container: String,
    pub basemap: String,
    pub modules: Vec<String>,
    pub fit_padding: u32,
    pub animation_ms: u64,
    pub min_focus_zoom: f64,
}

impl MapConfig {
    pub fn animation(&self) -> Duration {
        Duration::from_millis(self.animation_ms)
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            container: "viewDiv".into(),
            basemap: "streets-vector".into(),
            modules: vec![
                "esri/Map".into(),
                "esri/views/MapView".into(),
                "esri/Graphic".into(),
                "esri/layers/GraphicsLayer".into(),
            ],
            fit_padding: 70,
            animation_ms: 600,
            min_focus_zoom: 14.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct ViewportConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self { width: 1280, height: 720 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub root: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080, root: PathBuf::from(".") }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }

    /// Like `load_from_file`, but a missing file means "use the defaults".
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let config: AppConfig = toml::from_str(
            r#"
            [data]
            source = "https://ops.example.org/overview/data.json"

            [map]
            min_focus_zoom = 15.5
            "#,
        )
        .unwrap();

        assert_eq!(config.data.source, "https://ops.example.org/overview/data.json");
        assert_eq!(config.map.min_focus_zoom, 15.5);
        assert_eq!(config.map.fit_padding, 70);
        assert_eq!(config.map.modules.len(), 4);
        assert_eq!(config.resources.stylesheets.len(), 3);
        assert_eq!(config.resources.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(&dir.path().join("console.toml")).unwrap();
        assert_eq!(config.resources.capability_timeout(), Duration::from_millis(8000));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.toml");
        fs::write(&path, "[map\nfit_padding = ").unwrap();
        assert!(AppConfig::load_from_file(&path).is_err());
    }
}
