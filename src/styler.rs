//! Domain attributes to marker symbols and popup text. Pure functions only.

use crate::types::{Asset, Incident, Severity};

pub const INCIDENT_SIZE: u32 = 22;
pub const INCIDENT_OUTLINE: u32 = 3;
pub const ASSET_SIZE: u32 = 14;
pub const ASSET_OUTLINE: u32 = 2;
pub const OUTLINE_COLOR: &str = "white";

pub const CRITICAL_COLOR: &str = "#ff4d4f";
pub const HIGH_COLOR: &str = "#ff8a3d";
pub const MEDIUM_COLOR: &str = "#ffd14a";
pub const LOW_COLOR: &str = "#3ccf7e";
pub const DEPLOYED_COLOR: &str = "#3b82f6";
pub const AVAILABLE_COLOR: &str = "#14b8a6";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerStyle {
    Circle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outline {
    pub color: &'static str,
    pub width: u32,
}

/// A simple point marker as the engine draws it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub style: MarkerStyle,
    pub color: &'static str,
    pub size: u32,
    pub outline: Outline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Popup {
    pub title: String,
    pub body: String,
}

pub fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => CRITICAL_COLOR,
        Severity::High => HIGH_COLOR,
        Severity::Medium => MEDIUM_COLOR,
        Severity::Low => LOW_COLOR,
    }
}

pub fn incident_symbol(severity: &str) -> Symbol {
    Symbol {
        style: MarkerStyle::Circle,
        color: severity_color(Severity::from_label(severity)),
        size: INCIDENT_SIZE,
        outline: Outline { color: OUTLINE_COLOR, width: INCIDENT_OUTLINE },
    }
}

// Only "deployed" is special; "available", typos and blanks all share teal.
pub fn asset_symbol(status: &str) -> Symbol {
    let color = if status.trim().eq_ignore_ascii_case("deployed") {
        DEPLOYED_COLOR
    } else {
        AVAILABLE_COLOR
    };
    Symbol {
        style: MarkerStyle::Circle,
        color,
        size: ASSET_SIZE,
        outline: Outline { color: OUTLINE_COLOR, width: ASSET_OUTLINE },
    }
}

pub fn incident_popup(incident: &Incident) -> Popup {
    let c = &incident.casualties;
    let body = [
        format!("Severity: {}", incident.severity),
        String::new(),
        incident.description.clone(),
        String::new(),
        format!("Officer: {}", incident.officer),
        format!("Casualties: RED {} · YEL {} · GRN {}", c.red, c.yellow, c.green),
        format!("Updated: {}", incident.last_update_label.as_deref().unwrap_or("")),
    ]
    .join("\n");

    Popup {
        title: format!(
            "{} · {} · {}",
            incident.code,
            incident.kind,
            incident.status.to_uppercase()
        ),
        body,
    }
}

pub fn asset_popup(asset: &Asset) -> Popup {
    let eta = asset
        .eta_min
        .as_ref()
        .map(|n| n.to_string())
        .unwrap_or_else(|| "—".to_string());
    let body = [
        format!("Type: {}", asset.kind),
        format!("Team: {}", asset.team),
        format!("Status: {}", asset.status),
        format!("ETA: {} min", eta),
    ]
    .join("\n");

    Popup {
        title: format!("{} · {}", asset.label, asset.status.to_uppercase()),
        body,
    }
}
