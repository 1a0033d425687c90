//! View identity, geometry, and content metadata
//!
//! These are the immutable value types a tracker aggregates. Geometry and
//! content follow a copy-on-write discipline: an update builds a whole new
//! snapshot and the owner swaps it in, so a previously captured reference is
//! never mutated underneath its holder.

use serde::{Deserialize, Serialize};

use crate::report::{keys, ReportPayload};

/// Sentinel for geometry that has not been measured yet
pub const GEOMETRY_UNSET: i32 = -1;

/// Identity record for a tracked view. Immutable once constructed; the
/// identity of a view is its `view_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewInfo {
    /// Unique id of the view within the app (never empty for an active tracker)
    pub view_id: String,
    /// Human-readable title
    pub view_title: String,
    /// Id of the in-app view the user navigated here from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_referrer: Option<String>,
    /// Per-install user token
    pub token: String,
}

impl ViewInfo {
    /// Create an identity record for a view
    pub fn new(
        view_id: String,
        view_title: String,
        internal_referrer: Option<String>,
        token: String,
    ) -> Self {
        Self {
            view_id,
            view_title,
            internal_referrer,
            token,
        }
    }

    /// Append this view's identity fields to a reporting payload.
    /// The referrer entry is omitted when the view was entered externally.
    pub fn append_to(&self, payload: &mut ReportPayload) {
        payload.push(keys::VIEW_ID, self.view_id.clone());
        payload.push(keys::VIEW_TITLE, self.view_title.clone());
        if let Some(referrer) = &self.internal_referrer {
            payload.push(keys::INTERNAL_REFERRER, referrer.clone());
        }
        payload.push(keys::TOKEN, self.token.clone());
    }
}

/// Snapshot of scroll and rendering geometry for a view.
///
/// All geometry is in pixels. `max_scroll_depth` is the one field carried
/// forward across snapshots: it is the maximum `scroll_position_top` ever
/// supplied for this view, including the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewDimension {
    /// Latest vertical scroll offset
    pub scroll_position_top: i32,
    /// Viewport height
    pub scroll_window_height: i32,
    /// Full content height
    pub total_content_height: i32,
    /// Rendered document width
    pub fully_rendered_doc_width: i32,
    /// Maximum scroll offset reached so far
    pub max_scroll_depth: i32,
}

impl Default for ViewDimension {
    fn default() -> Self {
        Self::empty()
    }
}

impl ViewDimension {
    /// Geometry for a view with no measurements yet: sentinel `-1` for the
    /// four geometry fields, `0` for max depth
    pub fn empty() -> Self {
        Self {
            scroll_position_top: GEOMETRY_UNSET,
            scroll_window_height: GEOMETRY_UNSET,
            total_content_height: GEOMETRY_UNSET,
            fully_rendered_doc_width: GEOMETRY_UNSET,
            max_scroll_depth: 0,
        }
    }

    /// Build a snapshot from four geometry values and an explicit max depth
    pub fn new(
        scroll_position_top: i32,
        scroll_window_height: i32,
        total_content_height: i32,
        fully_rendered_doc_width: i32,
        max_scroll_depth: i32,
    ) -> Self {
        Self {
            scroll_position_top,
            scroll_window_height,
            total_content_height,
            fully_rendered_doc_width,
            max_scroll_depth,
        }
    }

    /// Append the geometry fields to a reporting payload. The `-1` sentinel
    /// is reported literally when a field was never measured.
    pub fn append_to(&self, payload: &mut ReportPayload) {
        payload.push(keys::SCROLL_POSITION_TOP, self.scroll_position_top.to_string());
        payload.push(keys::SCROLL_WINDOW_HEIGHT, self.scroll_window_height.to_string());
        payload.push(keys::TOTAL_CONTENT_HEIGHT, self.total_content_height.to_string());
        payload.push(
            keys::FULLY_RENDERED_DOC_WIDTH,
            self.fully_rendered_doc_width.to_string(),
        );
        payload.push(keys::MAX_SCROLL_DEPTH, self.max_scroll_depth.to_string());
    }
}

/// Snapshot of content classification metadata for a view.
///
/// Updated copy-on-write: each `with_*` builds a new snapshot where exactly
/// one field changes and the other three are carried forward.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewContent {
    /// Content sections, if set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sections: Option<String>,
    /// Content authors, if set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,
    /// Content zones, if set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zones: Option<String>,
    /// Page load time in seconds (0.0 until reported by the host)
    #[serde(default)]
    pub page_load_time: f32,
}

impl ViewContent {
    /// Content metadata for a freshly activated view: nothing set yet
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from all four fields
    pub fn new(
        sections: Option<String>,
        authors: Option<String>,
        zones: Option<String>,
        page_load_time: f32,
    ) -> Self {
        Self {
            sections,
            authors,
            zones,
            page_load_time,
        }
    }

    /// New snapshot with `sections` replaced
    pub fn with_sections(&self, sections: String) -> Self {
        Self {
            sections: Some(sections),
            authors: self.authors.clone(),
            zones: self.zones.clone(),
            page_load_time: self.page_load_time,
        }
    }

    /// New snapshot with `authors` replaced
    pub fn with_authors(&self, authors: String) -> Self {
        Self {
            sections: self.sections.clone(),
            authors: Some(authors),
            zones: self.zones.clone(),
            page_load_time: self.page_load_time,
        }
    }

    /// New snapshot with `zones` replaced
    pub fn with_zones(&self, zones: String) -> Self {
        Self {
            sections: self.sections.clone(),
            authors: self.authors.clone(),
            zones: Some(zones),
            page_load_time: self.page_load_time,
        }
    }

    /// New snapshot with `page_load_time` replaced
    pub fn with_page_load_time(&self, page_load_time: f32) -> Self {
        Self {
            sections: self.sections.clone(),
            authors: self.authors.clone(),
            zones: self.zones.clone(),
            page_load_time,
        }
    }

    /// Append the content fields to a reporting payload. Unset sections,
    /// authors, and zones are omitted; the load time is always reported.
    pub fn append_to(&self, payload: &mut ReportPayload) {
        if let Some(sections) = &self.sections {
            payload.push(keys::SECTIONS, sections.clone());
        }
        if let Some(authors) = &self.authors {
            payload.push(keys::AUTHORS, authors.clone());
        }
        if let Some(zones) = &self.zones {
            payload.push(keys::ZONES, zones.clone());
        }
        payload.push(keys::PAGE_LOAD_TIME, self.page_load_time.to_string());
    }
}
