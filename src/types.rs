use geo::Point;
use serde::{Deserialize, Serialize};
use serde_json::Number;

/// The single payload behind one page load. Read-only once parsed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub header: Header,
    #[serde(default)]
    pub summary: Summary,
    pub map: MapViewport,
    #[serde(default)]
    pub incidents: Vec<Incident>,
    #[serde(default)]
    pub assets: Vec<Asset>,
    #[serde(default)]
    pub dispatch_queue: Vec<QueueEntry>,
    #[serde(default)]
    pub kpis: Kpis,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub notifications: u32,
    #[serde(default)]
    pub timestamp: String,
}

// Counters are kept as JSON numbers so they print the way they were written.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Summary {
    pub active_incidents: Option<Number>,
    pub deployed_assets: Option<Number>,
    pub available_assets: Option<Number>,
    pub total_casualties: Option<Number>,
    pub avg_response_min: Option<Number>,
    pub active_missions: Option<Number>,
    pub open_cases: Option<Number>,
    pub in_progress_cases: Option<Number>,
    pub hot_zones: Option<Number>,
}

/// Initial camera: `center` is `[lon, lat]`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct MapViewport {
    pub center: [f64; 2],
    pub zoom: f64,
}

impl MapViewport {
    pub fn center_point(&self) -> Point<f64> {
        Point::new(self.center[0], self.center[1])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coords {
    pub lat: f64,
    pub lon: f64,
}

impl Coords {
    /// Map geometry is always `(x = lon, y = lat)`.
    pub fn to_point(self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Casualties {
    pub red: u32,
    pub yellow: u32,
    pub green: u32,
}

impl Casualties {
    // Summed wide: three u32 counters cannot overflow a u64.
    pub fn total(&self) -> u64 {
        u64::from(self.red) + u64::from(self.yellow) + u64::from(self.green)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: String,
    pub code: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub officer: String,
    pub coords: Coords,
    #[serde(default)]
    pub casualties: Casualties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub team: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_min: Option<Number>,
    pub coords: Coords,
}

/// One row of the dispatch queue. Same shape as an incident, but every
/// display field is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub id: String,
    #[serde(default)]
    pub code: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub officer: String,
    #[serde(default)]
    pub coords: Option<Coords>,
    #[serde(default)]
    pub casualties: Casualties,
    #[serde(default)]
    pub last_update_label: Option<String>,
    #[serde(default)]
    pub assignment: Option<String>,
}

impl QueueEntry {
    pub fn is_pending(&self) -> bool {
        self.status.eq_ignore_ascii_case("pending")
    }

    pub fn is_resolved(&self) -> bool {
        self.status.eq_ignore_ascii_case("resolved")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Kpis {
    pub active_incidents: Kpi,
    pub avg_response_min: Kpi,
    pub available_assets: Kpi,
    pub evac_success_rate: Kpi,
    pub treated24h: Kpi,
    pub hospital_beds: Kpi,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Kpi {
    pub value: Option<Number>,
    pub total: Option<Number>,
    pub target: Option<Number>,
    pub delta: Option<Delta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Delta {
    pub value: f64,
    #[serde(default)]
    pub direction: String,
    #[serde(default)]
    pub unit: Option<String>,
}

impl Delta {
    pub fn is_up(&self) -> bool {
        self.direction == "up"
    }
}

/// Four-tier severity table shared by map markers and queue accents.
/// Anything unrecognised lands in the lowest tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            _ => Severity::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}
