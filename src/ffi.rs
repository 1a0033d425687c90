//! FFI bindings for viewpulse
//!
//! This module provides C-compatible functions for embedding the dispatcher
//! in mobile host apps. All functions use C strings (null-terminated) and
//! return allocated memory that must be freed by the caller using
//! `viewpulse_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::dispatcher::ViewDispatcher;
use crate::store::MemoryPreferenceStore;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

// ============================================================================
// Dispatcher API
// ============================================================================

/// Opaque handle to a ViewDispatcher.
///
/// The handle owns an in-memory preference store; hosts carry the session
/// cache across process restarts with `viewpulse_dispatcher_save_state` and
/// `viewpulse_dispatcher_resume`.
pub struct ViewDispatcherHandle {
    dispatcher: ViewDispatcher<MemoryPreferenceStore>,
}

/// Create a dispatcher initialized for an account.
///
/// # Safety
/// - `account_id` must be a valid null-terminated C string.
/// - `domain` may be NULL when the account has no domain override; otherwise
///   it must be a valid null-terminated C string.
/// - Returns a pointer that must be freed with `viewpulse_dispatcher_free`.
/// - Returns NULL on error; call `viewpulse_last_error` for the message.
#[no_mangle]
pub unsafe extern "C" fn viewpulse_dispatcher_new(
    account_id: *const c_char,
    domain: *const c_char,
) -> *mut ViewDispatcherHandle {
    clear_last_error();

    let account_str = match cstr_to_string(account_id) {
        Some(s) => s,
        None => {
            set_last_error("Invalid account_id string pointer");
            return ptr::null_mut();
        }
    };

    let domain_str = if domain.is_null() {
        None
    } else {
        match cstr_to_string(domain) {
            Some(s) => Some(s),
            None => {
                set_last_error("Invalid domain string pointer");
                return ptr::null_mut();
            }
        }
    };

    let dispatcher = ViewDispatcher::with_account(
        MemoryPreferenceStore::new(),
        &account_str,
        domain_str.as_deref(),
    );
    let handle = Box::new(ViewDispatcherHandle { dispatcher });
    Box::into_raw(handle)
}

/// Create a dispatcher from a previously saved session-cache state.
///
/// # Safety
/// - `state_json` must be a valid null-terminated C string holding JSON
///   returned by `viewpulse_dispatcher_save_state`.
/// - Returns a pointer that must be freed with `viewpulse_dispatcher_free`.
/// - Returns NULL on error; call `viewpulse_last_error` for the message.
#[no_mangle]
pub unsafe extern "C" fn viewpulse_dispatcher_resume(
    state_json: *const c_char,
) -> *mut ViewDispatcherHandle {
    clear_last_error();

    let state_str = match cstr_to_string(state_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid state_json string pointer");
            return ptr::null_mut();
        }
    };

    let mut dispatcher = ViewDispatcher::new(MemoryPreferenceStore::new());
    match dispatcher.load_state(&state_str) {
        Ok(()) => {
            let handle = Box::new(ViewDispatcherHandle { dispatcher });
            Box::into_raw(handle)
        }
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a dispatcher.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `viewpulse_dispatcher_new`
///   or `viewpulse_dispatcher_resume`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn viewpulse_dispatcher_free(handle: *mut ViewDispatcherHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Dispatch a JSON command and return the outcome as JSON.
///
/// # Safety
/// - `handle` must be a valid dispatcher pointer.
/// - `command_json` must be a valid null-terminated C string holding one
///   tagged command object, e.g. `{"action":"left_view","view_id":"v1"}`.
/// - Returns a newly allocated string that must be freed with
///   `viewpulse_free_string`.
/// - Returns NULL on error; call `viewpulse_last_error` for the message.
#[no_mangle]
pub unsafe extern "C" fn viewpulse_dispatcher_apply(
    handle: *mut ViewDispatcherHandle,
    command_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null dispatcher pointer");
        return ptr::null_mut();
    }

    let handle = &mut *handle;

    let command_str = match cstr_to_string(command_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid command_json string pointer");
            return ptr::null_mut();
        }
    };

    match handle.dispatcher.apply_json(&command_str) {
        Ok(outcome) => match serde_json::to_string(&outcome) {
            Ok(json) => string_to_cstr(&json),
            Err(e) => {
                set_last_error(&e.to_string());
                ptr::null_mut()
            }
        },
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Render the live view's reporting payload as a JSON object.
///
/// # Safety
/// - `handle` must be a valid dispatcher pointer.
/// - Returns a newly allocated string that must be freed with
///   `viewpulse_free_string`.
/// - Returns NULL when no view is tracked or on error; call
///   `viewpulse_last_error` for the message.
#[no_mangle]
pub unsafe extern "C" fn viewpulse_dispatcher_report(
    handle: *mut ViewDispatcherHandle,
) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null dispatcher pointer");
        return ptr::null_mut();
    }

    let handle = &*handle;

    match handle.dispatcher.report() {
        Some(payload) => match serde_json::to_string(&payload) {
            Ok(json) => string_to_cstr(&json),
            Err(e) => {
                set_last_error(&e.to_string());
                ptr::null_mut()
            }
        },
        None => {
            set_last_error("No view is currently tracked");
            ptr::null_mut()
        }
    }
}

/// Check whether a view is currently tracked.
///
/// # Safety
/// - `handle` must be a valid dispatcher pointer.
/// - `view_id` may be NULL to ask whether any view is tracked; otherwise it
///   must be a valid null-terminated C string naming a specific view.
/// - Returns 1 if tracked, 0 if not, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn viewpulse_dispatcher_is_tracking(
    handle: *mut ViewDispatcherHandle,
    view_id: *const c_char,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null dispatcher pointer");
        return -1;
    }

    let handle = &*handle;

    let tracked = if view_id.is_null() {
        handle.dispatcher.is_tracking()
    } else {
        match cstr_to_string(view_id) {
            Some(id) => handle.dispatcher.is_tracking_view(&id),
            None => {
                set_last_error("Invalid view_id string pointer");
                return -1;
            }
        }
    };

    if tracked {
        1
    } else {
        0
    }
}

/// Save the session cache to JSON for the host to persist.
///
/// # Safety
/// - `handle` must be a valid dispatcher pointer.
/// - Returns a newly allocated string that must be freed with
///   `viewpulse_free_string`.
/// - Returns NULL on error; call `viewpulse_last_error` for the message.
#[no_mangle]
pub unsafe extern "C" fn viewpulse_dispatcher_save_state(
    handle: *mut ViewDispatcherHandle,
) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null dispatcher pointer");
        return ptr::null_mut();
    }

    let handle = &*handle;

    match handle.dispatcher.save_state() {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by viewpulse functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a viewpulse function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn viewpulse_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next viewpulse function call on
///   this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn viewpulse_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the viewpulse library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn viewpulse_version() -> *const c_char {
    // Use a static CString to avoid allocation
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn new_handle() -> *mut ViewDispatcherHandle {
        let account = CString::new("acct-1").unwrap();
        let domain = CString::new("news.example.com").unwrap();
        unsafe { viewpulse_dispatcher_new(account.as_ptr(), domain.as_ptr()) }
    }

    #[test]
    fn test_ffi_dispatcher_lifecycle() {
        unsafe {
            let handle = new_handle();
            assert!(!handle.is_null());

            let track = CString::new(
                r#"{"action":"track_view","view_id":"v1","view_title":"Home"}"#,
            )
            .unwrap();
            let outcome = viewpulse_dispatcher_apply(handle, track.as_ptr());
            assert!(!outcome.is_null());

            let outcome_str = CStr::from_ptr(outcome).to_str().unwrap();
            assert!(outcome_str.contains("applied"));
            viewpulse_free_string(outcome);

            assert_eq!(viewpulse_dispatcher_is_tracking(handle, ptr::null()), 1);

            let v1 = CString::new("v1").unwrap();
            assert_eq!(viewpulse_dispatcher_is_tracking(handle, v1.as_ptr()), 1);
            let v2 = CString::new("v2").unwrap();
            assert_eq!(viewpulse_dispatcher_is_tracking(handle, v2.as_ptr()), 0);

            let report = viewpulse_dispatcher_report(handle);
            assert!(!report.is_null());
            let report_str = CStr::from_ptr(report).to_str().unwrap();
            assert!(report_str.contains(r#""p":"v1""#));
            viewpulse_free_string(report);

            viewpulse_dispatcher_free(handle);
        }
    }

    #[test]
    fn test_ffi_state_round_trip() {
        unsafe {
            let handle = new_handle();
            assert!(!handle.is_null());

            let state = viewpulse_dispatcher_save_state(handle);
            assert!(!state.is_null());

            let resumed = viewpulse_dispatcher_resume(state);
            assert!(!resumed.is_null());

            // resumed handles carry the account but never a live view
            assert_eq!(viewpulse_dispatcher_is_tracking(resumed, ptr::null()), 0);

            let track = CString::new(
                r#"{"action":"track_view","view_id":"v1","view_title":"Home"}"#,
            )
            .unwrap();
            let outcome = viewpulse_dispatcher_apply(resumed, track.as_ptr());
            assert!(!outcome.is_null());
            viewpulse_free_string(outcome);

            viewpulse_free_string(state);
            viewpulse_dispatcher_free(handle);
            viewpulse_dispatcher_free(resumed);
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let handle = new_handle();
            assert!(!handle.is_null());

            let invalid = CString::new("not json").unwrap();
            let outcome = viewpulse_dispatcher_apply(handle, invalid.as_ptr());
            assert!(outcome.is_null());

            let error = viewpulse_last_error();
            assert!(!error.is_null());
            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(!error_str.is_empty());

            // no live view: report sets the error and returns NULL
            let report = viewpulse_dispatcher_report(handle);
            assert!(report.is_null());
            assert!(!viewpulse_last_error().is_null());

            viewpulse_dispatcher_free(handle);
        }
    }

    #[test]
    fn test_ffi_null_arguments() {
        unsafe {
            let handle = viewpulse_dispatcher_new(ptr::null(), ptr::null());
            assert!(handle.is_null());
            assert!(!viewpulse_last_error().is_null());

            let outcome = viewpulse_dispatcher_apply(ptr::null_mut(), ptr::null());
            assert!(outcome.is_null());

            assert_eq!(
                viewpulse_dispatcher_is_tracking(ptr::null_mut(), ptr::null()),
                -1
            );
        }
    }

    #[test]
    fn test_ffi_invalid_utf8_argument() {
        unsafe {
            let bad = CString::new(vec![0xff, 0xfe, 0xfd]).unwrap();
            let handle = viewpulse_dispatcher_new(bad.as_ptr(), ptr::null());
            assert!(handle.is_null());
            assert!(!viewpulse_last_error().is_null());
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = viewpulse_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
