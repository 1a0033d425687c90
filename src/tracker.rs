//! Per-view engagement tracking
//!
//! Exactly one `ViewEngagementTracker` is live for the currently visible
//! view. It owns the view's identity, the latest geometry and content
//! snapshots, and the activation timestamp, and renders all of it as the
//! ordered reporting payload when a report is due or the view ends.

use chrono::{DateTime, Utc};

use crate::report::{keys, ReportPayload};
use crate::view::{ViewContent, ViewDimension, ViewInfo};

/// Mutable aggregator of engagement state for a single view.
///
/// The tracker has no lifecycle of its own beyond existing: its owner creates
/// it when a view becomes active, routes updates into it while the view is
/// visible, and drops it when the view changes or tracking stops. All
/// operations are in-memory; none block or fail.
#[derive(Debug)]
pub struct ViewEngagementTracker {
    info: ViewInfo,
    dimension: ViewDimension,
    content: ViewContent,
    view_init_time: DateTime<Utc>,
}

impl ViewEngagementTracker {
    /// Start tracking a view, capturing the current time as its activation
    /// time.
    ///
    /// # Arguments
    /// * `view_id` - Unique id of the view (never empty)
    /// * `view_title` - Human-readable title
    /// * `internal_referrer` - Id of the in-app view the user came from, if any
    /// * `token` - Per-install user token
    /// * `initial_dimension` - Geometry known at activation, if any
    pub fn new(
        view_id: String,
        view_title: String,
        internal_referrer: Option<String>,
        token: String,
        initial_dimension: Option<ViewDimension>,
    ) -> Self {
        Self::new_at(
            Utc::now(),
            view_id,
            view_title,
            internal_referrer,
            token,
            initial_dimension,
        )
    }

    /// Start tracking a view with an explicit activation time
    pub fn new_at(
        now_utc: DateTime<Utc>,
        view_id: String,
        view_title: String,
        internal_referrer: Option<String>,
        token: String,
        initial_dimension: Option<ViewDimension>,
    ) -> Self {
        Self {
            info: ViewInfo::new(view_id, view_title, internal_referrer, token),
            dimension: initial_dimension.unwrap_or_default(),
            content: ViewContent::empty(),
            view_init_time: now_utc,
        }
    }

    /// Identity of the tracked view
    pub fn info(&self) -> &ViewInfo {
        &self.info
    }

    /// Latest geometry snapshot
    pub fn dimension(&self) -> &ViewDimension {
        &self.dimension
    }

    /// Latest content snapshot
    pub fn content(&self) -> &ViewContent {
        &self.content
    }

    /// When the view became active
    pub fn view_init_time(&self) -> DateTime<Utc> {
        self.view_init_time
    }

    /// True iff this tracker is tracking the given view id. The owner uses
    /// this to tell a duplicate/refresh of the current view from a
    /// transition to a new one.
    pub fn is_same_view(&self, view_id: &str) -> bool {
        self.info.view_id == view_id
    }

    /// True iff the view was reached via in-app navigation rather than
    /// external entry
    pub fn was_referred_from_another_view(&self) -> bool {
        self.info.internal_referrer.is_some()
    }

    /// Elapsed engagement time in minutes, computed fresh on every call.
    ///
    /// Clamped to zero if the wall clock moved backward since activation.
    /// Sub-minute precision is retained; one-decimal formatting is applied
    /// only when the payload is rendered.
    pub fn viewing_time_in_minutes(&self) -> f64 {
        self.viewing_time_in_minutes_at(Utc::now())
    }

    /// Elapsed engagement time in minutes at an explicit reference time
    pub fn viewing_time_in_minutes_at(&self, now_utc: DateTime<Utc>) -> f64 {
        let elapsed_ms = (now_utc - self.view_init_time).num_milliseconds().max(0);
        elapsed_ms as f64 / 1000.0 / 60.0
    }

    /// Replace the geometry snapshot with one built from the four new values.
    ///
    /// Max scroll depth is the only field carried forward: the new snapshot
    /// records `max(current max depth, scroll_position_top)`, so it is
    /// monotonically non-decreasing for the lifetime of the tracker. The
    /// other fields reflect the latest scroll frame only.
    pub fn update_dimension(
        &mut self,
        scroll_position_top: i32,
        scroll_window_height: i32,
        total_content_height: i32,
        fully_rendered_doc_width: i32,
    ) {
        let max_scroll_depth = self.dimension.max_scroll_depth.max(scroll_position_top);
        self.dimension = ViewDimension::new(
            scroll_position_top,
            scroll_window_height,
            total_content_height,
            fully_rendered_doc_width,
            max_scroll_depth,
        );
    }

    /// Replace the content snapshot with one where only `sections` changes
    pub fn update_sections(&mut self, sections: String) {
        self.content = self.content.with_sections(sections);
    }

    /// Replace the content snapshot with one where only `authors` changes
    pub fn update_authors(&mut self, authors: String) {
        self.content = self.content.with_authors(authors);
    }

    /// Replace the content snapshot with one where only `zones` changes
    pub fn update_zones(&mut self, zones: String) {
        self.content = self.content.with_zones(zones);
    }

    /// Replace the content snapshot with one where only the page load time
    /// changes
    pub fn update_page_loading_time(&mut self, seconds: f32) {
        self.content = self.content.with_page_load_time(seconds);
    }

    /// Render the full tracker state as the ordered reporting payload.
    ///
    /// Emission order is fixed: identity fields, time on view (one decimal
    /// place), geometry fields, content fields. The order is a wire contract
    /// with the collector and is stable across repeated calls.
    pub fn to_report_payload(&self) -> ReportPayload {
        self.to_report_payload_at(Utc::now())
    }

    /// Render the reporting payload at an explicit reference time
    pub fn to_report_payload_at(&self, now_utc: DateTime<Utc>) -> ReportPayload {
        let mut payload = ReportPayload::new();
        self.info.append_to(&mut payload);
        payload.push(
            keys::TIME_ON_VIEW_MINUTES,
            format!("{:.1}", self.viewing_time_in_minutes_at(now_utc)),
        );
        self.dimension.append_to(&mut payload);
        self.content.append_to(&mut payload);
        payload
    }
}
