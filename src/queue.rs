//! Dispatch-queue list and click delegation back to incident ids.

use tracing::debug;

use crate::types::{QueueEntry, Severity};

/// Attribute carrying the incident id on every queue row.
pub const INCIDENT_ID_ATTR: &str = "data-incident-id";

/// An element on a click path, as seen by the delegating listener.
pub trait Element {
    fn attribute(&self, name: &str) -> Option<&str>;
}

/// Plain attribute bag for click paths that don't come from a live DOM.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    attributes: Vec<(String, String)>,
}

impl Node {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((name.to_string(), value.to_string()));
        self
    }

    /// A queue row for `id`.
    pub fn row(id: &str) -> Self {
        Self::new().attr("class", "qcard").attr(INCIDENT_ID_ATTR, id)
    }
}

impl Element for Node {
    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Nearest element on `path` (target first, then its ancestors) that is a
/// queue row.
pub fn closest_incident_id<E: Element>(path: &[E]) -> Option<&str> {
    path.iter().find_map(|el| el.attribute(INCIDENT_ID_ATTR))
}

type SelectHandler = Box<dyn FnMut(&str) + Send>;

#[derive(Default)]
pub struct QueueView {
    handlers: Vec<SelectHandler>,
}

impl QueueView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&self, entries: &[QueueEntry]) -> String {
        entries.iter().map(queue_card).collect()
    }

    pub fn on_select<F>(&mut self, handler: F)
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.handlers.push(Box::new(handler));
    }

    /// Deliver one click. Returns whether it landed on a row.
    pub fn click<E: Element>(&mut self, path: &[E]) -> bool {
        let Some(id) = closest_incident_id(path) else {
            return false;
        };
        debug!(id, "queue row selected");
        for handler in &mut self.handlers {
            handler(id);
        }
        true
    }
}

/// Entries still needing attention.
pub fn active_count(entries: &[QueueEntry]) -> usize {
    entries.iter().filter(|e| !e.is_resolved()).count()
}

fn queue_card(entry: &QueueEntry) -> String {
    let pending = entry.is_pending();
    let severity = Severity::from_label(&entry.severity);

    let wrap_class = if pending {
        format!("qcard qcard--pending qcard--{}", severity.as_str())
    } else {
        format!("qcard qcard--{}", severity.as_str())
    };

    let (badge_class, badge) = if pending {
        ("qbadge qbadge--pending", "PENDING")
    } else {
        ("qbadge qbadge--progress", "IN PROGRESS")
    };

    let last = entry.last_update_label.as_deref().unwrap_or("—");
    let coords = entry
        .coords
        .map(|c| format!("{:.4}, {:.4}", c.lat, c.lon))
        .unwrap_or_else(|| "—".to_string());
    let c = &entry.casualties;

    format!(
        r#"<div class="{wrap_class}" role="listitem" {attr}="{id}">
  <div class="qcard__top">
    <div class="qcard__left">
      <span class="qdot" aria-hidden="true"></span>
      <span class="qcode">{code}</span>
      <span class="{badge_class}">{badge}</span>
    </div>
    <div class="qtime">{last}</div>
  </div>
  <div class="qcard__body">
    <div class="qtag">{kind}</div>
    <div class="qdesc">{description}</div>
    <div class="qmeta">
      <div class="qmeta__item"><i class="fa-regular fa-user"></i><span>{officer}</span></div>
      <div class="qmeta__item"><i class="fa-solid fa-location-dot"></i><span>{coords}</span></div>
    </div>
    <div class="qcounters">
      <span class="qpill qpill--red">RED: <b>{red}</b></span>
      <span class="qpill qpill--yel">YEL: <b>{yellow}</b></span>
      <span class="qpill qpill--grn">GRN: <b>{green}</b></span>
    </div>
    <div class="qtotal">Total Casualties<sup>{total}</sup></div>
  </div>
</div>
"#,
        attr = INCIDENT_ID_ATTR,
        id = escape_html(&entry.id),
        code = escape_html(&entry.code),
        last = escape_html(last),
        kind = escape_html(&entry.kind),
        description = escape_html(&entry.description),
        officer = escape_html(&entry.officer),
        red = c.red,
        yellow = c.yellow,
        green = c.green,
        total = c.total(),
    )
}

pub(crate) fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
