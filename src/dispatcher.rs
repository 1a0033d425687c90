//! Command dispatch and session lifecycle
//!
//! The dispatcher owns the one live tracker, decides when views start and
//! end, and persists the last used account so tracking can resume after a
//! process restart. All state is explicit: the dispatcher owns its
//! preference store and its optional session, and the host owns the
//! dispatcher. Commands arrive as typed method calls or as serialized
//! [`Command`] values (the shape host bridges send); malformed requests are
//! rejected with a logged `Ignored` outcome, never a fault.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TrackerError;
use crate::report::ReportPayload;
use crate::store::{
    PreferenceStore, KEY_LAST_USED_ACCOUNT_ID, KEY_LAST_USED_DOMAIN, KEY_USER_TOKEN,
};
use crate::tracker::ViewEngagementTracker;
use crate::view::{ViewDimension, GEOMETRY_UNSET};

fn geometry_unset() -> i32 {
    GEOMETRY_UNSET
}

/// Account a session reports under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Collector account id
    pub account_id: String,
    /// Reporting domain override, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// A dispatch request, as issued by the host bridge.
///
/// Serialized commands are tagged JSON objects, e.g.
/// `{"action":"track_view","view_id":"v1","view_title":"Home"}`. Omitted
/// geometry fields default to the `-1` sentinel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    /// Initialize (or re-point) the session at an account
    Init {
        account_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        domain: Option<String>,
    },
    /// A view became active
    TrackView {
        view_id: String,
        view_title: String,
        #[serde(default = "geometry_unset")]
        scroll_position_top: i32,
        #[serde(default = "geometry_unset")]
        scroll_window_height: i32,
        #[serde(default = "geometry_unset")]
        total_content_height: i32,
        #[serde(default = "geometry_unset")]
        fully_rendered_doc_width: i32,
    },
    /// The user left a view
    LeftView { view_id: String },
    /// New scroll geometry for the live view
    SetPosition {
        scroll_position_top: i32,
        scroll_window_height: i32,
        total_content_height: i32,
        fully_rendered_doc_width: i32,
    },
    /// Set content sections for the live view
    SetSections { sections: String },
    /// Set content authors for the live view
    SetAuthors { authors: String },
    /// Set content zones for the live view
    SetZones { zones: String },
    /// Report the live view's page load time in seconds
    SetViewLoadTime { seconds: f32 },
    /// Record the app-level referrer for the session
    SetAppReferrer { referrer: String },
    /// Stop tracking but keep the cached account for later resumption
    Pause,
    /// Stop tracking and forget the cached account
    Stop,
}

/// Result of dispatching one command
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    /// The command was applied
    Applied,
    /// The command was rejected; the rejection was logged
    Ignored { reason: IgnoreReason },
    /// The command ended a view; its final payload is attached
    Report { payload: ReportPayload },
}

/// Why a command was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// No session and no cached account to resume from
    NotInitialized,
    /// No view is currently tracked
    NoActiveView,
    /// The command names a view other than the live one
    DifferentView,
    /// An active tracker requires a non-empty view id
    EmptyViewId,
}

fn rejected(operation: &str, reason: IgnoreReason) -> CommandOutcome {
    warn!("{} ignored: {:?}", operation, reason);
    CommandOutcome::Ignored { reason }
}

/// True when at least one of the four geometry values was supplied
fn any_geometry_set(
    scroll_position_top: i32,
    scroll_window_height: i32,
    total_content_height: i32,
    fully_rendered_doc_width: i32,
) -> bool {
    scroll_position_top != GEOMETRY_UNSET
        || scroll_window_height != GEOMETRY_UNSET
        || total_content_height != GEOMETRY_UNSET
        || fully_rendered_doc_width != GEOMETRY_UNSET
}

/// Persistable session cache: what survives a process restart.
///
/// Live tracker state is not part of the cache; only the account and the
/// per-install user token carry across.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_token: Option<String>,
}

#[derive(Debug)]
struct TrackingSession {
    config: AccountConfig,
    user_token: String,
    app_referrer: Option<String>,
    tracker: Option<ViewEngagementTracker>,
}

/// Routes commands to the live tracker and manages session lifecycle.
///
/// One dispatcher serves one serialized call stream (single-owner,
/// single-writer); it performs no locking and no I/O beyond the preference
/// store it was given.
#[derive(Debug)]
pub struct ViewDispatcher<S: PreferenceStore> {
    store: S,
    session: Option<TrackingSession>,
}

impl<S: PreferenceStore> ViewDispatcher<S> {
    /// Create an uninitialized dispatcher over the host's store.
    ///
    /// Commands are rejected until `init` runs or a previously cached
    /// account is found in the store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            session: None,
        }
    }

    /// Create a dispatcher and initialize it in one step
    pub fn with_account(store: S, account_id: &str, domain: Option<&str>) -> Self {
        let mut dispatcher = Self::new(store);
        dispatcher.init(account_id, domain);
        dispatcher
    }

    /// Point the session at an account, persisting it as the last used
    /// account. Safe to call repeatedly; a live tracker keeps running.
    pub fn init(&mut self, account_id: &str, domain: Option<&str>) {
        self.store.put(KEY_LAST_USED_ACCOUNT_ID, account_id);
        match domain {
            Some(domain) => self.store.put(KEY_LAST_USED_DOMAIN, domain),
            None => self.store.remove(KEY_LAST_USED_DOMAIN),
        }
        let config = AccountConfig {
            account_id: account_id.to_string(),
            domain: domain.map(|d| d.to_string()),
        };
        if let Some(session) = &mut self.session {
            session.config = config;
        } else {
            let user_token = self.load_or_create_user_token();
            debug!("initialized session for account {}", config.account_id);
            self.session = Some(TrackingSession {
                config,
                user_token,
                app_referrer: None,
                tracker: None,
            });
        }
    }

    /// Route a view activation.
    ///
    /// The same id as the live view is a refresh: the tracker (and its
    /// activation time) is kept and any supplied geometry applied as an
    /// update. A different id retires the live tracker, returns its final
    /// payload, and activates a new tracker whose internal referrer is the
    /// retired view's id. Pass `-1` for geometry unknown at activation.
    pub fn track_view(
        &mut self,
        view_id: &str,
        view_title: &str,
        scroll_position_top: i32,
        scroll_window_height: i32,
        total_content_height: i32,
        fully_rendered_doc_width: i32,
    ) -> CommandOutcome {
        if view_id.is_empty() {
            return rejected("track_view", IgnoreReason::EmptyViewId);
        }
        let session = match self.session_mut() {
            Some(session) => session,
            None => return rejected("track_view", IgnoreReason::NotInitialized),
        };

        if let Some(tracker) = &mut session.tracker {
            if tracker.is_same_view(view_id) {
                if any_geometry_set(
                    scroll_position_top,
                    scroll_window_height,
                    total_content_height,
                    fully_rendered_doc_width,
                ) {
                    tracker.update_dimension(
                        scroll_position_top,
                        scroll_window_height,
                        total_content_height,
                        fully_rendered_doc_width,
                    );
                }
                debug!("refreshed view {}", view_id);
                return CommandOutcome::Applied;
            }
        }

        let retired = session.tracker.take();
        let internal_referrer = retired.as_ref().map(|t| t.info().view_id.clone());
        let final_payload = retired.map(|t| t.to_report_payload());

        let initial_dimension = if any_geometry_set(
            scroll_position_top,
            scroll_window_height,
            total_content_height,
            fully_rendered_doc_width,
        ) {
            Some(ViewDimension::new(
                scroll_position_top,
                scroll_window_height,
                total_content_height,
                fully_rendered_doc_width,
                scroll_position_top.max(0),
            ))
        } else {
            None
        };

        debug!("tracking view {}", view_id);
        session.tracker = Some(ViewEngagementTracker::new(
            view_id.to_string(),
            view_title.to_string(),
            internal_referrer,
            session.user_token.clone(),
            initial_dimension,
        ));

        match final_payload {
            Some(payload) => CommandOutcome::Report { payload },
            None => CommandOutcome::Applied,
        }
    }

    /// Route a view departure. Retires the live tracker and returns its
    /// final payload iff the id names the live view.
    pub fn user_left_view(&mut self, view_id: &str) -> CommandOutcome {
        let session = match self.session_mut() {
            Some(session) => session,
            None => return rejected("user_left_view", IgnoreReason::NotInitialized),
        };
        match session.tracker.take() {
            Some(tracker) if tracker.is_same_view(view_id) => {
                debug!("view {} ended", view_id);
                CommandOutcome::Report {
                    payload: tracker.to_report_payload(),
                }
            }
            Some(tracker) => {
                // not the live view; put it back untouched
                session.tracker = Some(tracker);
                rejected("user_left_view", IgnoreReason::DifferentView)
            }
            None => rejected("user_left_view", IgnoreReason::NoActiveView),
        }
    }

    /// Route new scroll geometry to the live tracker
    pub fn set_position(
        &mut self,
        scroll_position_top: i32,
        scroll_window_height: i32,
        total_content_height: i32,
        fully_rendered_doc_width: i32,
    ) -> CommandOutcome {
        self.with_live_tracker("set_position", |tracker| {
            tracker.update_dimension(
                scroll_position_top,
                scroll_window_height,
                total_content_height,
                fully_rendered_doc_width,
            )
        })
    }

    /// Set content sections for the live view
    pub fn set_sections(&mut self, sections: &str) -> CommandOutcome {
        self.with_live_tracker("set_sections", |tracker| {
            tracker.update_sections(sections.to_string())
        })
    }

    /// Set content authors for the live view
    pub fn set_authors(&mut self, authors: &str) -> CommandOutcome {
        self.with_live_tracker("set_authors", |tracker| {
            tracker.update_authors(authors.to_string())
        })
    }

    /// Set content zones for the live view
    pub fn set_zones(&mut self, zones: &str) -> CommandOutcome {
        self.with_live_tracker("set_zones", |tracker| {
            tracker.update_zones(zones.to_string())
        })
    }

    /// Report the live view's page load time in seconds
    pub fn set_view_load_time(&mut self, seconds: f32) -> CommandOutcome {
        self.with_live_tracker("set_view_load_time", |tracker| {
            tracker.update_page_loading_time(seconds)
        })
    }

    /// Record the app-level referrer for the session. Session state for the
    /// delivery layer; never merged into a view payload.
    pub fn set_app_referrer(&mut self, referrer: &str) -> CommandOutcome {
        match self.session_mut() {
            Some(session) => {
                session.app_referrer = Some(referrer.to_string());
                CommandOutcome::Applied
            }
            None => rejected("set_app_referrer", IgnoreReason::NotInitialized),
        }
    }

    /// Stop tracking the live view but keep the session and the cached
    /// account, so the next `track_view` resumes under the same account
    pub fn pause(&mut self) -> CommandOutcome {
        let session = match self.session_mut() {
            Some(session) => session,
            None => return rejected("pause", IgnoreReason::NotInitialized),
        };
        match session.tracker.take() {
            Some(tracker) => {
                debug!("paused while tracking view {}", tracker.info().view_id);
                CommandOutcome::Report {
                    payload: tracker.to_report_payload(),
                }
            }
            None => CommandOutcome::Applied,
        }
    }

    /// Stop tracking and forget the cached account. Subsequent commands are
    /// rejected until `init` runs again.
    pub fn stop(&mut self) -> CommandOutcome {
        let session = match self.session_mut() {
            Some(session) => session,
            None => return rejected("stop", IgnoreReason::NotInitialized),
        };
        let final_payload = session.tracker.take().map(|t| t.to_report_payload());
        self.session = None;
        self.store.remove(KEY_LAST_USED_ACCOUNT_ID);
        self.store.remove(KEY_LAST_USED_DOMAIN);
        debug!("stopped tracking, cached account cleared");
        match final_payload {
            Some(payload) => CommandOutcome::Report { payload },
            None => CommandOutcome::Applied,
        }
    }

    /// Dispatch one serialized-form command. Every arm routes to the typed
    /// operation of the same name.
    pub fn apply(&mut self, command: Command) -> CommandOutcome {
        match command {
            Command::Init { account_id, domain } => {
                self.init(&account_id, domain.as_deref());
                CommandOutcome::Applied
            }
            Command::TrackView {
                view_id,
                view_title,
                scroll_position_top,
                scroll_window_height,
                total_content_height,
                fully_rendered_doc_width,
            } => self.track_view(
                &view_id,
                &view_title,
                scroll_position_top,
                scroll_window_height,
                total_content_height,
                fully_rendered_doc_width,
            ),
            Command::LeftView { view_id } => self.user_left_view(&view_id),
            Command::SetPosition {
                scroll_position_top,
                scroll_window_height,
                total_content_height,
                fully_rendered_doc_width,
            } => self.set_position(
                scroll_position_top,
                scroll_window_height,
                total_content_height,
                fully_rendered_doc_width,
            ),
            Command::SetSections { sections } => self.set_sections(&sections),
            Command::SetAuthors { authors } => self.set_authors(&authors),
            Command::SetZones { zones } => self.set_zones(&zones),
            Command::SetViewLoadTime { seconds } => self.set_view_load_time(seconds),
            Command::SetAppReferrer { referrer } => self.set_app_referrer(&referrer),
            Command::Pause => self.pause(),
            Command::Stop => self.stop(),
        }
    }

    /// Parse and dispatch a JSON command
    pub fn apply_json(&mut self, command_json: &str) -> Result<CommandOutcome, TrackerError> {
        let command: Command = serde_json::from_str(command_json)
            .map_err(|e| TrackerError::InvalidCommand(e.to_string()))?;
        Ok(self.apply(command))
    }

    /// Render the live tracker's payload without ending the view
    pub fn report(&self) -> Option<ReportPayload> {
        self.live_tracker().map(|t| t.to_report_payload())
    }

    /// Whether any view is currently tracked
    pub fn is_tracking(&self) -> bool {
        self.live_tracker().is_some()
    }

    /// Whether the given view is the live one
    pub fn is_tracking_view(&self, view_id: &str) -> bool {
        self.live_tracker()
            .map(|t| t.is_same_view(view_id))
            .unwrap_or(false)
    }

    /// The live tracker, if a view is active
    pub fn live_tracker(&self) -> Option<&ViewEngagementTracker> {
        self.session.as_ref().and_then(|s| s.tracker.as_ref())
    }

    /// The session's account, if initialized
    pub fn account(&self) -> Option<&AccountConfig> {
        self.session.as_ref().map(|s| &s.config)
    }

    /// The session's per-install user token, if initialized
    pub fn user_token(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.user_token.as_str())
    }

    /// The app-level referrer recorded for this session, if any
    pub fn app_referrer(&self) -> Option<&str> {
        self.session.as_ref().and_then(|s| s.app_referrer.as_deref())
    }

    /// The underlying preference store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Snapshot the restart-surviving session cache as JSON. Fails when
    /// neither a session nor a cached account exists.
    pub fn save_state(&self) -> Result<String, TrackerError> {
        let state = match &self.session {
            Some(session) => SessionState {
                account_id: session.config.account_id.clone(),
                domain: session.config.domain.clone(),
                user_token: Some(session.user_token.clone()),
            },
            None => {
                let account_id = self.store.get(KEY_LAST_USED_ACCOUNT_ID).ok_or_else(|| {
                    TrackerError::NoCachedAccount("nothing to save before init".to_string())
                })?;
                SessionState {
                    account_id,
                    domain: self.store.get(KEY_LAST_USED_DOMAIN),
                    user_token: self.store.get(KEY_USER_TOKEN),
                }
            }
        };
        Ok(serde_json::to_string(&state)?)
    }

    /// Load a previously saved session cache and resume under it. Any live
    /// tracker is discarded.
    pub fn load_state(&mut self, state_json: &str) -> Result<(), TrackerError> {
        let state: SessionState = serde_json::from_str(state_json)
            .map_err(|e| TrackerError::InvalidState(e.to_string()))?;
        if state.account_id.is_empty() {
            return Err(TrackerError::InvalidState("empty account id".to_string()));
        }
        self.store.put(KEY_LAST_USED_ACCOUNT_ID, &state.account_id);
        match &state.domain {
            Some(domain) => self.store.put(KEY_LAST_USED_DOMAIN, domain),
            None => self.store.remove(KEY_LAST_USED_DOMAIN),
        }
        if let Some(token) = &state.user_token {
            self.store.put(KEY_USER_TOKEN, token);
        }
        self.session = None;
        self.resume_from_store();
        Ok(())
    }

    /// Session for routing, resuming from the cache first if needed
    fn session_mut(&mut self) -> Option<&mut TrackingSession> {
        self.resume_from_store();
        self.session.as_mut()
    }

    /// Rebuild the session from the cached account, if one exists. This is
    /// the restart path: a host process may come back with commands before
    /// anyone calls `init` again.
    fn resume_from_store(&mut self) {
        if self.session.is_some() {
            return;
        }
        if let Some(account_id) = self.store.get(KEY_LAST_USED_ACCOUNT_ID) {
            let domain = self.store.get(KEY_LAST_USED_DOMAIN);
            let user_token = self.load_or_create_user_token();
            debug!("resumed session for cached account {}", account_id);
            self.session = Some(TrackingSession {
                config: AccountConfig { account_id, domain },
                user_token,
                app_referrer: None,
                tracker: None,
            });
        }
    }

    fn load_or_create_user_token(&mut self) -> String {
        match self.store.get(KEY_USER_TOKEN) {
            Some(token) => token,
            None => {
                let token = Uuid::new_v4().to_string();
                self.store.put(KEY_USER_TOKEN, &token);
                token
            }
        }
    }

    /// Apply `update` to the live tracker, rejecting when no view is tracked
    fn with_live_tracker<F>(&mut self, operation: &str, update: F) -> CommandOutcome
    where
        F: FnOnce(&mut ViewEngagementTracker),
    {
        let session = match self.session_mut() {
            Some(session) => session,
            None => return rejected(operation, IgnoreReason::NotInitialized),
        };
        match &mut session.tracker {
            Some(tracker) => {
                update(tracker);
                CommandOutcome::Applied
            }
            None => rejected(operation, IgnoreReason::NoActiveView),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryPreferenceStore;
    use pretty_assertions::assert_eq;

    fn dispatcher() -> ViewDispatcher<MemoryPreferenceStore> {
        ViewDispatcher::with_account(
            MemoryPreferenceStore::new(),
            "acct-1",
            Some("news.example.com"),
        )
    }

    #[test]
    fn test_commands_rejected_before_init() {
        let mut dispatcher = ViewDispatcher::new(MemoryPreferenceStore::new());

        let outcome = dispatcher.track_view("v1", "Home", -1, -1, -1, -1);
        assert_eq!(
            outcome,
            CommandOutcome::Ignored {
                reason: IgnoreReason::NotInitialized
            }
        );
    }

    #[test]
    fn test_content_update_without_view_is_ignored() {
        let mut dispatcher = dispatcher();

        let outcome = dispatcher.set_sections("tech");
        assert_eq!(
            outcome,
            CommandOutcome::Ignored {
                reason: IgnoreReason::NoActiveView
            }
        );
    }

    #[test]
    fn test_track_view_rejects_empty_id() {
        let mut dispatcher = dispatcher();

        let outcome = dispatcher.track_view("", "Home", -1, -1, -1, -1);
        assert_eq!(
            outcome,
            CommandOutcome::Ignored {
                reason: IgnoreReason::EmptyViewId
            }
        );
        assert!(!dispatcher.is_tracking());
    }

    #[test]
    fn test_first_view_has_no_referrer() {
        let mut dispatcher = dispatcher();

        let outcome = dispatcher.track_view("v1", "Home", -1, -1, -1, -1);
        assert_eq!(outcome, CommandOutcome::Applied);

        let tracker = dispatcher.live_tracker().unwrap();
        assert!(!tracker.was_referred_from_another_view());
        assert!(dispatcher.is_tracking_view("v1"));
    }

    #[test]
    fn test_view_transition_reports_and_seeds_referrer() {
        let mut dispatcher = dispatcher();
        dispatcher.track_view("v1", "Home", -1, -1, -1, -1);
        dispatcher.set_sections("tech");

        let outcome = dispatcher.track_view("v2", "Article", -1, -1, -1, -1);
        match outcome {
            CommandOutcome::Report { payload } => {
                assert_eq!(payload.get("p"), Some("v1"));
                assert_eq!(payload.get("g0"), Some("tech"));
            }
            other => panic!("expected final payload for v1, got {:?}", other),
        }

        let live = dispatcher.report().unwrap();
        assert_eq!(live.get("p"), Some("v2"));
        assert_eq!(live.get("v"), Some("v1"));
    }

    #[test]
    fn test_duplicate_track_view_is_a_refresh() {
        let mut dispatcher = dispatcher();
        dispatcher.track_view("v1", "Home", 10, 800, 4000, 360);
        let init_time = dispatcher.live_tracker().unwrap().view_init_time();

        let outcome = dispatcher.track_view("v1", "Home", 5, 800, 4000, 360);
        assert_eq!(outcome, CommandOutcome::Applied);

        let tracker = dispatcher.live_tracker().unwrap();
        assert_eq!(tracker.view_init_time(), init_time);
        assert_eq!(tracker.dimension().max_scroll_depth, 10);
        assert_eq!(tracker.dimension().scroll_position_top, 5);
    }

    #[test]
    fn test_track_view_without_geometry_starts_empty() {
        let mut dispatcher = dispatcher();
        dispatcher.track_view("v1", "Home", -1, -1, -1, -1);

        let tracker = dispatcher.live_tracker().unwrap();
        assert_eq!(*tracker.dimension(), ViewDimension::empty());
    }

    #[test]
    fn test_initial_max_depth_clamped_to_zero() {
        let mut dispatcher = dispatcher();
        // window height known at activation, scroll offset not yet measured
        dispatcher.track_view("v1", "Home", -1, 800, -1, -1);

        let tracker = dispatcher.live_tracker().unwrap();
        assert_eq!(tracker.dimension().scroll_position_top, -1);
        assert_eq!(tracker.dimension().max_scroll_depth, 0);
    }

    #[test]
    fn test_left_view_reports_final_payload() {
        let mut dispatcher = dispatcher();
        dispatcher.track_view("v1", "Home", 50, 800, 4000, 360);

        let outcome = dispatcher.user_left_view("v1");
        match outcome {
            CommandOutcome::Report { payload } => {
                assert_eq!(payload.get("p"), Some("v1"));
                assert_eq!(payload.get("m"), Some("50"));
            }
            other => panic!("expected final payload, got {:?}", other),
        }
        assert!(!dispatcher.is_tracking());
    }

    #[test]
    fn test_left_view_for_other_view_is_ignored() {
        let mut dispatcher = dispatcher();
        dispatcher.track_view("v1", "Home", -1, -1, -1, -1);

        let outcome = dispatcher.user_left_view("v9");
        assert_eq!(
            outcome,
            CommandOutcome::Ignored {
                reason: IgnoreReason::DifferentView
            }
        );
        assert!(dispatcher.is_tracking_view("v1"));
    }

    #[test]
    fn test_set_position_routes_to_live_view() {
        let mut dispatcher = dispatcher();
        dispatcher.track_view("v1", "Home", -1, -1, -1, -1);
        dispatcher.set_position(50, 800, 4000, 360);
        dispatcher.set_position(30, 800, 4000, 360);

        let payload = dispatcher.report().unwrap();
        assert_eq!(payload.get("m"), Some("50"));
        assert_eq!(payload.get("x"), Some("30"));
    }

    #[test]
    fn test_pause_keeps_cached_account() {
        let mut dispatcher = dispatcher();
        dispatcher.track_view("v1", "Home", -1, -1, -1, -1);

        let outcome = dispatcher.pause();
        assert!(matches!(outcome, CommandOutcome::Report { .. }));
        assert!(!dispatcher.is_tracking());
        assert_eq!(
            dispatcher.store().get(KEY_LAST_USED_ACCOUNT_ID),
            Some("acct-1".to_string())
        );

        // tracking resumes under the same session; the referrer chain is broken
        let outcome = dispatcher.track_view("v2", "Article", -1, -1, -1, -1);
        assert_eq!(outcome, CommandOutcome::Applied);
        assert!(!dispatcher
            .live_tracker()
            .unwrap()
            .was_referred_from_another_view());
    }

    #[test]
    fn test_stop_clears_cached_account() {
        let mut dispatcher = dispatcher();
        dispatcher.track_view("v1", "Home", -1, -1, -1, -1);

        let outcome = dispatcher.stop();
        assert!(matches!(outcome, CommandOutcome::Report { .. }));
        assert_eq!(dispatcher.account(), None);
        assert_eq!(dispatcher.store().get(KEY_LAST_USED_ACCOUNT_ID), None);

        // no session and nothing cached to resume from
        let outcome = dispatcher.track_view("v2", "Article", -1, -1, -1, -1);
        assert_eq!(
            outcome,
            CommandOutcome::Ignored {
                reason: IgnoreReason::NotInitialized
            }
        );
    }

    #[test]
    fn test_uninitialized_dispatcher_resumes_from_cached_account() {
        let mut store = MemoryPreferenceStore::new();
        store.put(KEY_LAST_USED_ACCOUNT_ID, "acct-9");
        store.put(KEY_LAST_USED_DOMAIN, "blog.example.com");
        store.put(KEY_USER_TOKEN, "tok-cached");

        let mut dispatcher = ViewDispatcher::new(store);
        let outcome = dispatcher.track_view("v1", "Home", -1, -1, -1, -1);
        assert_eq!(outcome, CommandOutcome::Applied);

        let account = dispatcher.account().unwrap();
        assert_eq!(account.account_id, "acct-9");
        assert_eq!(account.domain.as_deref(), Some("blog.example.com"));
        assert_eq!(dispatcher.user_token(), Some("tok-cached"));
    }

    #[test]
    fn test_user_token_survives_stop_and_reinit() {
        let mut dispatcher = dispatcher();
        let token = dispatcher.user_token().unwrap().to_string();
        assert!(!token.is_empty());

        dispatcher.stop();
        dispatcher.init("acct-1", None);
        assert_eq!(dispatcher.user_token(), Some(token.as_str()));
    }

    #[test]
    fn test_save_and_load_state_round_trip() {
        let mut source = dispatcher();
        source.track_view("v1", "Home", -1, -1, -1, -1);
        let token = source.user_token().unwrap().to_string();
        let state_json = source.save_state().unwrap();

        let mut restored = ViewDispatcher::new(MemoryPreferenceStore::new());
        restored.load_state(&state_json).unwrap();

        let account = restored.account().unwrap();
        assert_eq!(account.account_id, "acct-1");
        assert_eq!(account.domain.as_deref(), Some("news.example.com"));
        assert_eq!(restored.user_token(), Some(token.as_str()));
        // tracker state does not survive; only the session cache does
        assert!(!restored.is_tracking());
    }

    #[test]
    fn test_save_state_before_init_fails() {
        let dispatcher = ViewDispatcher::new(MemoryPreferenceStore::new());
        let err = dispatcher.save_state().unwrap_err();
        assert!(matches!(err, TrackerError::NoCachedAccount(_)));
    }

    #[test]
    fn test_apply_json_routes_commands() {
        let mut dispatcher = ViewDispatcher::new(MemoryPreferenceStore::new());

        let outcome = dispatcher
            .apply_json(r#"{"action":"init","account_id":"acct-1"}"#)
            .unwrap();
        assert_eq!(outcome, CommandOutcome::Applied);

        let outcome = dispatcher
            .apply_json(r#"{"action":"track_view","view_id":"v1","view_title":"Home"}"#)
            .unwrap();
        assert_eq!(outcome, CommandOutcome::Applied);
        // omitted geometry defaults to the unset sentinel
        assert_eq!(
            *dispatcher.live_tracker().unwrap().dimension(),
            ViewDimension::empty()
        );

        let err = dispatcher.apply_json(r#"{"action":"warp"}"#).unwrap_err();
        assert!(matches!(err, TrackerError::InvalidCommand(_)));
    }

    #[test]
    fn test_app_referrer_never_enters_view_payload() {
        let mut dispatcher = dispatcher();
        dispatcher.set_app_referrer("android-app://com.example.launcher");
        dispatcher.track_view("v1", "Home", -1, -1, -1, -1);

        let payload = dispatcher.report().unwrap();
        assert_eq!(payload.get("v"), None);
        assert_eq!(
            dispatcher.app_referrer(),
            Some("android-app://com.example.launcher")
        );
    }

    #[test]
    fn test_outcome_serialization_shape() {
        let applied = serde_json::to_value(CommandOutcome::Applied).unwrap();
        assert_eq!(applied, serde_json::json!({ "outcome": "applied" }));

        let ignored = serde_json::to_value(CommandOutcome::Ignored {
            reason: IgnoreReason::NoActiveView,
        })
        .unwrap();
        assert_eq!(
            ignored,
            serde_json::json!({ "outcome": "ignored", "reason": "no_active_view" })
        );
    }
}
