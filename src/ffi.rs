//! FFI bindings for posegate
//!
//! This module provides C-compatible functions for driving an assessment
//! session from a host (browser bridge, mobile app, or native UI). All
//! functions use C strings (null-terminated) and return allocated memory that
//! must be freed by the caller using `posegate_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::config::GateConfig;
use crate::pipeline::AssessmentProcessor;

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
// Stateful Processor API
// ============================================================================

/// Opaque handle to an AssessmentProcessor
pub struct PosegateProcessorHandle {
    processor: AssessmentProcessor,
}

/// Create a new assessment session.
///
/// # Safety
/// - `config_json` may be NULL (reference thresholds) or a valid null-terminated
///   C string holding a JSON configuration.
/// - Returns a pointer that must be freed with `posegate_processor_free`.
/// - Returns NULL on error; call `posegate_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn posegate_processor_new(
    config_json: *const c_char,
) -> *mut PosegateProcessorHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        GateConfig::default()
    } else {
        let json = match cstr_to_string(config_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        };
        match GateConfig::from_json(&json) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    match AssessmentProcessor::with_config(config) {
        Ok(processor) => Box::into_raw(Box::new(PosegateProcessorHandle { processor })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free an assessment session. Any running hold timer goes with it.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `posegate_processor_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn posegate_processor_free(processor: *mut PosegateProcessorHandle) {
    if !processor.is_null() {
        drop(Box::from_raw(processor));
    }
}

/// Process one pose.frame.v1 JSON record and return the frame report JSON.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `posegate_processor_new`.
/// - `frame_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `posegate_free_string`.
/// - Returns NULL on error; call `posegate_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn posegate_processor_push_frame(
    processor: *mut PosegateProcessorHandle,
    frame_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &mut *processor;

    let json_str = match cstr_to_string(frame_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid frame string pointer");
            return ptr::null_mut();
        }
    };

    match handle.processor.process_json(&json_str) {
        Ok(report) => string_to_cstr(&report),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Return the current snapshot as JSON without processing a frame.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `posegate_processor_new`.
/// - Returns a newly allocated string that must be freed with `posegate_free_string`.
/// - Returns NULL on error; call `posegate_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn posegate_processor_snapshot(
    processor: *mut PosegateProcessorHandle,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &*processor;
    match serde_json::to_string(&handle.processor.snapshot()) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Return the trial results recorded so far as JSON.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `posegate_processor_new`.
/// - Returns a newly allocated string that must be freed with `posegate_free_string`.
/// - Returns NULL on error; call `posegate_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn posegate_processor_results(
    processor: *mut PosegateProcessorHandle,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &*processor;
    match handle.processor.summary_json() {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Discard all progress and return the session to positioning.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `posegate_processor_new`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn posegate_processor_reset(processor: *mut PosegateProcessorHandle) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }

    let handle = &mut *processor;
    handle.processor.reset();
    0
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by posegate functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a posegate function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn posegate_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next posegate call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn posegate_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the posegate library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn posegate_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
