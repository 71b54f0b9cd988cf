// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// iOS platform bridge via objc2 and a thin Swift shim.
//
// Requires compilation with the iOS SDK (Xcode).  Two halves:
//
// 1. **Payload capture** (objc2): PushKit payloads and launch options arrive
//    as `NSDictionary` trees.  `native_from_object` walks them with plain
//    Objective-C message sends and lifts every node into a `NativeValue`.
//
// 2. **CallKit / AVAudioSession / method channel** (C FFI): the host app
//    links a Swift shim that owns the `CXProvider`, the shared
//    `AVAudioSession` and the `FlutterMethodChannel`s, and exports the
//    `callrelay_ios_*` functions declared below via `@_cdecl`.  The shim
//    performs each CallKit request on the provider's private queue and blocks
//    until its completion handler fires, so every call here is synchronous.
//
// This module is cfg-gated to `target_os = "ios"`.

#![cfg(target_os = "ios")]

use std::ffi::{CStr, CString, c_char, c_void};

use objc2::rc::Retained;
use objc2::runtime::{AnyClass, AnyObject};
use objc2::{class, msg_send};
use objc2_foundation::NSString;

use callrelay_core::config::ProviderConfig;
use callrelay_core::error::{CallRelayError, Result};
use callrelay_core::types::CallId;
use callrelay_core::value::{CanonicalValue, NativeValue};

use crate::traits::*;

// ---------------------------------------------------------------------------
// Swift shim FFI
// ---------------------------------------------------------------------------

/// Size of the buffer the shim writes `localizedDescription` into.
const ERROR_BUFFER_LEN: usize = 512;

/// Status code the shim returns on success.
const SHIM_OK: i32 = 0;

unsafe extern "C" {
    fn callrelay_ios_register_provider(
        localized_name: *const c_char,
        max_call_groups: u32,
        max_calls_per_group: u32,
        supports_video: bool,
        handle_type_mask: u32,
    ) -> i32;

    fn callrelay_ios_report_incoming(
        call_uuid: *const c_char,
        handle_type: u32,
        handle_value: *const c_char,
        caller_name: *const c_char,
        has_video: bool,
        error_out: *mut c_char,
        error_len: usize,
    ) -> i32;

    fn callrelay_ios_report_ended(call_uuid: *const c_char, reason: u32) -> i32;

    fn callrelay_ios_configure_audio(error_out: *mut c_char, error_len: usize) -> i32;

    fn callrelay_ios_deactivate_audio() -> i32;

    fn callrelay_ios_engine_ready() -> bool;

    fn callrelay_ios_invoke(
        channel: *const c_char,
        method: *const c_char,
        arguments_json: *const c_char,
    ) -> i32;

    fn callrelay_ios_complete_action(action_id: u64, fulfilled: bool);
}

/// Build a C string, rejecting interior NULs.
fn c_string(what: &str, value: &str) -> Result<CString> {
    CString::new(value).map_err(|_| CallRelayError::Bridge(format!("{what} contains a NUL byte")))
}

/// Run a shim call that reports failures through an error buffer.
fn with_error_buffer(call: impl FnOnce(*mut c_char, usize) -> i32) -> std::result::Result<(), String> {
    let mut buf = [0 as c_char; ERROR_BUFFER_LEN];
    let status = call(buf.as_mut_ptr(), buf.len());
    if status == SHIM_OK {
        return Ok(());
    }
    // SAFETY: the shim always NUL-terminates within `error_len`, and the
    // buffer is zero-initialised so an untouched buffer reads as "".
    let message = unsafe { CStr::from_ptr(buf.as_ptr()) }.to_string_lossy().into_owned();
    if message.is_empty() {
        Err(format!("status {status}"))
    } else {
        Err(message)
    }
}

// ---------------------------------------------------------------------------
// Payload capture
// ---------------------------------------------------------------------------

/// `-[NSObject isKindOfClass:]`.
fn is_kind_of(obj: &AnyObject, cls: &AnyClass) -> bool {
    // SAFETY: every Objective-C object responds to isKindOfClass:.
    unsafe { msg_send![obj, isKindOfClass: cls] }
}

/// `-[NSObject description]` as a Rust string.
fn describe(obj: &AnyObject) -> String {
    // SAFETY: every Objective-C object responds to description.
    let desc: Retained<NSString> = unsafe { msg_send![obj, description] };
    desc.to_string()
}

/// Class name of an object, for fallback diagnostics.
fn class_name(obj: &AnyObject) -> String {
    // SAFETY: classes respond to description with their name.
    let name: Retained<NSString> = unsafe { msg_send![obj.class(), description] };
    name.to_string()
}

/// Elements of an `NSArray`, in order.
///
/// SAFETY: caller guarantees `array` is an `NSArray`.
unsafe fn array_items(array: &AnyObject) -> Vec<Retained<AnyObject>> {
    let count: usize = unsafe { msg_send![array, count] };
    (0..count)
        .map(|i| unsafe { msg_send![array, objectAtIndex: i] })
        .collect()
}

/// `NSNumber` keeps its original C type; `objCType` tells them apart.
///
/// SAFETY: caller guarantees `number` is an `NSNumber`.
unsafe fn number_to_native(number: &AnyObject) -> NativeValue {
    let encoding: *const c_char = unsafe { msg_send![number, objCType] };
    // SAFETY: objCType returns a static NUL-terminated encoding string.
    let encoding = unsafe { CStr::from_ptr(encoding) }.to_bytes();

    // BOOL literals are __NSCFBoolean; only they answer YES here.
    let is_bool = is_kind_of(number, class!(__NSCFBoolean));
    if is_bool {
        let value: bool = unsafe { msg_send![number, boolValue] };
        return NativeValue::Bool(value);
    }

    match encoding {
        b"c" | b"C" | b"s" | b"S" | b"i" => {
            let value: i32 = unsafe { msg_send![number, intValue] };
            NativeValue::Int(value)
        }
        b"I" | b"l" | b"L" | b"q" | b"Q" => {
            let value: i64 = unsafe { msg_send![number, longLongValue] };
            NativeValue::Long(value)
        }
        b"f" => {
            let value: f32 = unsafe { msg_send![number, floatValue] };
            NativeValue::Float(value)
        }
        _ => {
            let value: f64 = unsafe { msg_send![number, doubleValue] };
            NativeValue::Double(value)
        }
    }
}

/// Lift any Foundation object graph (push payload, launch options) into a
/// [`NativeValue`].
pub fn native_from_object(obj: &AnyObject) -> NativeValue {
    if is_kind_of(obj, class!(NSNull)) {
        return NativeValue::Null;
    }

    if is_kind_of(obj, class!(NSString)) {
        // SAFETY: checked above; NSString has the same layout as AnyObject.
        let s = unsafe { &*(obj as *const AnyObject as *const NSString) };
        return NativeValue::String(s.to_string());
    }

    if is_kind_of(obj, class!(NSNumber)) {
        // SAFETY: checked above.
        return unsafe { number_to_native(obj) };
    }

    if is_kind_of(obj, class!(NSDictionary)) {
        // SAFETY: checked above; allKeys returns an NSArray.
        let keys: Retained<AnyObject> = unsafe { msg_send![obj, allKeys] };
        let entries = unsafe { array_items(&keys) }
            .into_iter()
            .map(|key| {
                let value: Option<Retained<AnyObject>> =
                    unsafe { msg_send![obj, objectForKey: &*key] };
                let key = if is_kind_of(&key, class!(NSString)) {
                    // SAFETY: checked by is_kind_of.
                    unsafe { &*(&*key as *const AnyObject as *const NSString) }.to_string()
                } else {
                    describe(&key)
                };
                let value = value.map_or(NativeValue::Null, |v| native_from_object(&v));
                (key, value)
            })
            .collect();
        return NativeValue::Map(entries);
    }

    if is_kind_of(obj, class!(NSArray)) {
        // SAFETY: checked above.
        let items = unsafe { array_items(obj) };
        return NativeValue::List(items.iter().map(|item| native_from_object(item)).collect());
    }

    if is_kind_of(obj, class!(NSData)) {
        return NativeValue::Bytes(data_bytes(obj));
    }

    NativeValue::Opaque {
        type_name: class_name(obj),
        description: describe(obj),
    }
}

/// Raw bytes of an `NSData` (e.g. `PKPushCredentials.token`).
pub fn data_bytes(data: &AnyObject) -> Vec<u8> {
    // SAFETY: `length` and `bytes` are NSData accessors; the slice is copied
    // before `data` can be released.
    unsafe {
        let len: usize = msg_send![data, length];
        if len == 0 {
            return Vec::new();
        }
        let ptr: *const c_void = msg_send![data, bytes];
        std::slice::from_raw_parts(ptr.cast::<u8>(), len).to_vec()
    }
}

// ---------------------------------------------------------------------------
// Bridge struct
// ---------------------------------------------------------------------------

/// iOS implementation of the telephony bridge.
///
/// Zero-sized: the `CXProvider` and audio session live in the Swift shim.
pub struct IosBridge;

impl IosBridge {
    pub fn new() -> Self {
        Self
    }
}

impl Default for IosBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformBridge for IosBridge {
    fn platform_name(&self) -> &str {
        "iOS"
    }
}

impl CallProvider for IosBridge {
    fn register(&self, config: &ProviderConfig) -> Result<()> {
        let name = c_string("localized name", &config.localized_name)?;
        // SAFETY: `name` outlives the call; the shim copies it.
        let status = unsafe {
            callrelay_ios_register_provider(
                name.as_ptr(),
                config.max_call_groups,
                config.max_calls_per_group,
                config.supports_video,
                handle_type_mask(&config.handle_types),
            )
        };
        if status != SHIM_OK {
            return Err(CallRelayError::Bridge(format!(
                "CXProvider registration failed with status {status}"
            )));
        }
        tracing::info!(name = %config.localized_name, "CXProvider configured");
        Ok(())
    }

    fn report_new_incoming_call(&self, update: &CallUpdate) -> Result<()> {
        let uuid = c_string("call uuid", &update.call.uuid().to_string())?;
        let handle = c_string("handle", &update.handle_value)?;
        let name = c_string("caller name", &update.caller_name)?;

        // SAFETY: all pointers stay valid for the duration of the call.
        with_error_buffer(|buf, len| unsafe {
            callrelay_ios_report_incoming(
                uuid.as_ptr(),
                handle_type_code(update.handle_type),
                handle.as_ptr(),
                name.as_ptr(),
                update.has_video,
                buf,
                len,
            )
        })
        .map_err(|reason| CallRelayError::Report {
            call_id: update.call.to_string(),
            reason,
        })
    }

    fn report_call_ended(&self, call: &CallId, reason: EndReason) -> Result<()> {
        let uuid = c_string("call uuid", &call.uuid().to_string())?;
        // SAFETY: `uuid` outlives the call.
        let status = unsafe { callrelay_ios_report_ended(uuid.as_ptr(), reason.code()) };
        if status != SHIM_OK {
            return Err(CallRelayError::Bridge(format!(
                "reportCall(endedAt:) failed with status {status}"
            )));
        }
        Ok(())
    }
}

impl AudioRoute for IosBridge {
    fn configure_for_call(&self) -> Result<()> {
        // SAFETY: the buffer pointer is valid for `len` bytes.
        with_error_buffer(|buf, len| unsafe { callrelay_ios_configure_audio(buf, len) })
            .map_err(CallRelayError::AudioSession)
    }

    fn deactivate(&self) -> Result<()> {
        // SAFETY: no arguments.
        let status = unsafe { callrelay_ios_deactivate_audio() };
        if status != SHIM_OK {
            return Err(CallRelayError::AudioSession(format!(
                "setActive(false) failed with status {status}"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Method channel endpoint
// ---------------------------------------------------------------------------

/// Flutter method channel reached through the shim.  The shim hops to the
/// main queue before touching the `FlutterViewController`.
pub struct IosEndpoint;

impl AppEndpoint for IosEndpoint {
    fn is_ready(&self) -> bool {
        // SAFETY: no arguments; the shim only reads the root view controller.
        unsafe { callrelay_ios_engine_ready() }
    }

    fn invoke(&self, channel: &str, method: &str, arguments: &CanonicalValue) -> Result<()> {
        let channel = c_string("channel", channel)?;
        let method = c_string("method", method)?;
        let json = c_string("arguments", &arguments.to_json_string()?)?;

        // SAFETY: all pointers stay valid for the duration of the call.
        let status = unsafe { callrelay_ios_invoke(channel.as_ptr(), method.as_ptr(), json.as_ptr()) };
        if status != SHIM_OK {
            return Err(CallRelayError::Endpoint(format!(
                "invokeMethod failed with status {status}"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CXAction acknowledgement
// ---------------------------------------------------------------------------

/// Pending `CXAction`, identified by the token the shim handed out.
pub struct IosActionAck {
    pub action_id: u64,
}

impl ActionAck for IosActionAck {
    fn fulfill(self: Box<Self>) {
        // SAFETY: unknown ids are ignored by the shim.
        unsafe { callrelay_ios_complete_action(self.action_id, true) };
    }

    fn fail(self: Box<Self>) {
        // SAFETY: unknown ids are ignored by the shim.
        unsafe { callrelay_ios_complete_action(self.action_id, false) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objc2_foundation::ns_string;

    #[test]
    fn strings_lift_verbatim() {
        let s = ns_string!("+15551234567");
        let obj = unsafe { &*(s as *const NSString as *const AnyObject) };
        assert_eq!(native_from_object(obj), NativeValue::String("+15551234567".into()));
    }
}
