use crate::error::DataLoadError;
use crate::types::Snapshot;
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use std::path::PathBuf;
use tracing::info;

/// Where the snapshot lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotSource {
    File(PathBuf),
    Http(String),
}

impl SnapshotSource {
    /// `http://` and `https://` locations are fetched, anything else is read
    /// from disk.
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            SnapshotSource::Http(location.to_string())
        } else {
            SnapshotSource::File(PathBuf::from(location))
        }
    }

    pub fn location(&self) -> String {
        match self {
            SnapshotSource::File(path) => path.display().to_string(),
            SnapshotSource::Http(url) => url.clone(),
        }
    }
}

/// Loads the snapshot exactly once per call: one attempt, no retry.
pub struct SnapshotRepository {
    source: SnapshotSource,
    client: reqwest::Client,
}

impl SnapshotRepository {
    pub fn new(source: SnapshotSource) -> Self {
        Self { source, client: reqwest::Client::new() }
    }

    pub fn source(&self) -> &SnapshotSource {
        &self.source
    }

    pub async fn load(&self) -> Result<Snapshot, DataLoadError> {
        let location = self.source.location();
        let body = match &self.source {
            SnapshotSource::File(path) => tokio::fs::read(path)
                .await
                .map_err(|e| DataLoadError::Fetch { location: location.clone(), reason: e.to_string() })?,
            SnapshotSource::Http(url) => self.fetch(url).await?,
        };

        let snapshot = parse_snapshot(&location, &body)?;
        info!(
            source = %location,
            incidents = snapshot.incidents.len(),
            assets = snapshot.assets.len(),
            queue = snapshot.dispatch_queue.len(),
            "snapshot loaded"
        );
        Ok(snapshot)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DataLoadError> {
        // Always bypass caches: a stale snapshot is worse than a slow one.
        let response = self
            .client
            .get(url)
            .header(CACHE_CONTROL, "no-store")
            .header(PRAGMA, "no-cache")
            .send()
            .await
            .map_err(|e| DataLoadError::Fetch { location: url.to_string(), reason: e.to_string() })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DataLoadError::Status { location: url.to_string(), status: status.as_u16() });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| DataLoadError::Fetch { location: url.to_string(), reason: e.to_string() })?;
        Ok(bytes.to_vec())
    }
}

pub fn parse_snapshot(location: &str, body: &[u8]) -> Result<Snapshot, DataLoadError> {
    serde_json::from_slice(body).map_err(|source| DataLoadError::Parse {
        location: location.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use std::sync::{Arc, Mutex};

    const SNAPSHOT: &str = r#"{"header": {"userName": "Ops"}, "map": {"center": [46.6753, 24.7136], "zoom": 11}}"#;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    #[test]
    fn source_is_picked_from_the_location_scheme() {
        assert_eq!(
            SnapshotSource::parse("https://ops.example.org/data.json"),
            SnapshotSource::Http("https://ops.example.org/data.json".into())
        );
        assert_eq!(
            SnapshotSource::parse("overview/data.json"),
            SnapshotSource::File(PathBuf::from("overview/data.json"))
        );
    }

    #[tokio::test]
    async fn missing_file_is_a_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let repo = SnapshotRepository::new(SnapshotSource::File(dir.path().join("data.json")));

        let err = repo.load().await.unwrap_err();
        assert!(matches!(err, DataLoadError::Fetch { .. }));
        assert!(err.to_string().contains("data.json"));
    }

    #[tokio::test]
    async fn unparseable_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "{\"header\": ").unwrap();

        let err = SnapshotRepository::new(SnapshotSource::File(path)).load().await.unwrap_err();
        assert!(matches!(err, DataLoadError::Parse { .. }));
    }

    #[tokio::test]
    async fn file_snapshot_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(
            &path,
            r#"{
                "header": {"userName": "Ops", "notifications": 3, "timestamp": "2025-01-05T09:30:00Z"},
                "map": {"center": [46.6753, 24.7136], "zoom": 11},
                "assets": [{"id": "a-1", "label": "AMB-12", "status": "deployed", "coords": {"lat": 24.7, "lon": 46.7}}]
            }"#,
        )
        .unwrap();

        let snapshot = SnapshotRepository::new(SnapshotSource::File(path)).load().await.unwrap();
        assert_eq!(snapshot.header.notifications, 3);
        assert_eq!(snapshot.assets[0].label, "AMB-12");
        assert!(snapshot.incidents.is_empty());
    }

    #[tokio::test]
    async fn http_fetch_bypasses_caches() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new().route(
            "/data.json",
            get({
                let seen = seen.clone();
                move |headers: HeaderMap| {
                    let seen = seen.clone();
                    async move {
                        for name in [header::CACHE_CONTROL, header::PRAGMA] {
                            if let Some(value) = headers.get(&name).and_then(|v| v.to_str().ok()) {
                                seen.lock().unwrap().push(format!("{name}: {value}"));
                            }
                        }
                        SNAPSHOT
                    }
                }
            }),
        );
        let base = serve(app).await;

        let snapshot = SnapshotRepository::new(SnapshotSource::parse(&format!("{base}/data.json")))
            .load()
            .await
            .unwrap();
        assert_eq!(snapshot.header.user_name, "Ops");
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["cache-control: no-store".to_string(), "pragma: no-cache".to_string()]
        );
    }

    #[tokio::test]
    async fn unsuccessful_http_status_is_a_data_error() {
        let app = Router::new().route(
            "/broken.json",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, SNAPSHOT) }),
        );
        let base = serve(app).await;

        let err = SnapshotRepository::new(SnapshotSource::parse(&format!("{base}/broken.json")))
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, DataLoadError::Status { status: 500, .. }));

        let err = SnapshotRepository::new(SnapshotSource::parse(&format!("{base}/missing.json")))
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, DataLoadError::Status { status: 404, .. }));
        assert!(err.to_string().contains("HTTP 404"));
    }
}
