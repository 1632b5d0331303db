//! FFI module for host runtimes
//!
//! C-compatible entry points over the parse pipeline. Every failure is
//! reported as an empty result (null pointer, zero length, empty set) and
//! logged; nothing here panics on caller data.

use std::ffi::{c_char, c_int, c_uchar, CStr, CString};
use std::ptr;
use std::slice;

use crate::binary;
use crate::hash::derive_name;
use crate::prefixes;
use crate::printer::Printer;

// ============================================================================
// Initialization
// ============================================================================

/// Initialize logging (`RUST_LOG` controls the filter)
#[no_mangle]
pub extern "C" fn istf_init() {
    let _ = env_logger::try_init();
}

/// Get library version
#[no_mangle]
pub extern "C" fn istf_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

/// Borrow `count` C strings as UTF-8; `None` if any is null or invalid
unsafe fn borrow_strings<'a>(ptrs: *const *const c_char, count: u32) -> Option<Vec<&'a str>> {
    if count == 0 {
        return Some(Vec::new());
    }
    if ptrs.is_null() {
        return None;
    }
    slice::from_raw_parts(ptrs, count as usize)
        .iter()
        .map(|&p| {
            if p.is_null() {
                None
            } else {
                CStr::from_ptr(p).to_str().ok()
            }
        })
        .collect()
}

fn into_c_string(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(c_string) => c_string.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse a template into a binary ISTF buffer
///
/// `chunks` holds `chunk_count` NUL-terminated strings; interpolation `i`
/// sits between chunk `i` and `i + 1` and is encoded by its ordinal.
/// Returns a `malloc`ed buffer to release with `istf_buffer_free`, or null
/// with `*out_len = 0` on failure.
#[no_mangle]
pub extern "C" fn istf_parse_template(
    chunks: *const *const c_char,
    chunk_count: u32,
    out_len: *mut u32,
) -> *mut c_uchar {
    if out_len.is_null() {
        return ptr::null_mut();
    }
    unsafe {
        *out_len = 0;
        let Some(chunks) = borrow_strings(chunks, chunk_count) else {
            log::warn!("template chunks missing or not UTF-8");
            return ptr::null_mut();
        };
        let ordinals: Vec<usize> = (0..chunks.len().saturating_sub(1)).collect();
        let nodes = match crate::parse_template(chunks.as_slice(), ordinals.as_slice()) {
            Ok(nodes) => nodes,
            Err(err) => {
                log::warn!("template skipped: {}", err);
                return ptr::null_mut();
            }
        };

        let bytes = binary::encode(&nodes);
        let buffer = libc::malloc(bytes.len()) as *mut c_uchar;
        if buffer.is_null() {
            return ptr::null_mut();
        }
        ptr::copy_nonoverlapping(bytes.as_ptr(), buffer, bytes.len());
        *out_len = bytes.len() as u32;
        buffer
    }
}

/// Free a buffer returned by `istf_parse_template`
#[no_mangle]
pub extern "C" fn istf_buffer_free(buffer: *mut c_uchar) {
    if !buffer.is_null() {
        unsafe {
            libc::free(buffer as *mut libc::c_void);
        }
    }
}

/// Structural class name of an encoded node sequence, or null
#[no_mangle]
pub extern "C" fn istf_buffer_name(buffer: *const c_uchar, length: u32) -> *mut c_char {
    if buffer.is_null() {
        return ptr::null_mut();
    }
    let data = unsafe { slice::from_raw_parts(buffer, length as usize) };
    match binary::decode(data) {
        Ok(nodes) => into_c_string(derive_name(&nodes)),
        Err(err) => {
            log::warn!("cannot name buffer: {}", err);
            ptr::null_mut()
        }
    }
}

/// Render an encoded node sequence as CSS, or null
///
/// Interpolation `i` is replaced by `substitutions[i]`.
#[no_mangle]
pub extern "C" fn istf_buffer_css(
    buffer: *const c_uchar,
    length: u32,
    substitutions: *const *const c_char,
    substitution_count: u32,
    vendor_prefixes: c_int,
) -> *mut c_char {
    if buffer.is_null() {
        return ptr::null_mut();
    }
    let data = unsafe { slice::from_raw_parts(buffer, length as usize) };
    let nodes = match binary::decode(data) {
        Ok(nodes) => nodes,
        Err(err) => {
            log::warn!("cannot print buffer: {}", err);
            return ptr::null_mut();
        }
    };
    let Some(substitutions) = (unsafe { borrow_strings(substitutions, substitution_count) }) else {
        return ptr::null_mut();
    };
    let css = Printer::new(&nodes, substitutions.as_slice())
        .vendor_prefixes(vendor_prefixes != 0)
        .to_string();
    into_c_string(css)
}

/// Free a string returned by this library
#[no_mangle]
pub extern "C" fn istf_string_free(s: *mut c_char) {
    if !s.is_null() {
        unsafe {
            drop(CString::from_raw(s));
        }
    }
}

// ============================================================================
// Vendor prefixes
// ============================================================================

/// Vendor bitset for a property name (1 = webkit, 2 = moz, 4 = ms)
#[no_mangle]
pub extern "C" fn istf_vendor_prefixes(name: *const c_char) -> u8 {
    if name.is_null() {
        return 0;
    }
    unsafe {
        match CStr::from_ptr(name).to_str() {
            Ok(name) => prefixes::lookup(name).bits(),
            Err(_) => 0,
        }
    }
}
