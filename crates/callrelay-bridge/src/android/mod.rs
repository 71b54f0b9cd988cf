// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Android platform bridge via JNI.
//
// Requires the Android NDK.  Two halves:
//
// 1. **Intent capture**: the host `Activity` hands every launch / new intent
//    to native code.  `intent_action_and_extras` reads the action string and
//    walks the extras `Bundle`, lifting every value into a `NativeValue`.
//
// 2. **ConnectionService / AudioManager / method channel**: the app ships a
//    small Kotlin glue object (`com.callrelay.bridge.CallRelayGlue`) whose
//    `@JvmStatic` methods wrap `TelecomManager`, `AudioManager` and the
//    Flutter `MethodChannel`.  The class is resolved once on the main thread
//    and held as a global reference, because worker threads attached through
//    JNI only see the system class loader.

#![cfg(target_os = "android")]

use jni::objects::{GlobalRef, JByteArray, JClass, JObject, JObjectArray, JString, JValue};
use jni::{JNIEnv, JavaVM};

use callrelay_core::config::ProviderConfig;
use callrelay_core::error::{CallRelayError, Result};
use callrelay_core::types::CallId;
use callrelay_core::value::{CanonicalValue, NativeValue};

use crate::traits::*;

/// JNI name of the Kotlin glue object.
const GLUE_CLASS: &str = "com/callrelay/bridge/CallRelayGlue";

// ---------------------------------------------------------------------------
// JNI bootstrap helpers
// ---------------------------------------------------------------------------

/// Obtain the process `JavaVM` from the NDK context.
fn java_vm() -> Result<JavaVM> {
    let ctx = ndk_context::android_context();
    // SAFETY: `ctx.vm()` returns the `JavaVM*` set by the NDK glue code.
    // The pointer is valid for the lifetime of the process.
    unsafe { JavaVM::from_raw(ctx.vm().cast()) }
        .map_err(|e| CallRelayError::Bridge(format!("failed to obtain JavaVM: {e}")))
}

/// Convenience: map any `jni::errors::Error` into `CallRelayError::Bridge`.
fn jni_err(context: &str, e: jni::errors::Error) -> CallRelayError {
    CallRelayError::Bridge(format!("{context}: {e}"))
}

/// Resolve the glue class on the current thread and pin it globally.
fn glue_class(vm: &JavaVM) -> Result<GlobalRef> {
    let mut env = vm
        .attach_current_thread_permanently()
        .map_err(|e| jni_err("attach thread", e))?;
    let class = env
        .find_class(GLUE_CLASS)
        .map_err(|e| jni_err("find glue class", e))?;
    env.new_global_ref(class)
        .map_err(|e| jni_err("pin glue class", e))
}

/// Read a nullable `String` result from the glue (null means success).
fn optional_error(env: &mut JNIEnv, value: JObject) -> Result<Option<String>> {
    if value.is_null() {
        return Ok(None);
    }
    let message: String = env
        .get_string(&JString::from(value))
        .map_err(|e| jni_err("read error string", e))?
        .into();
    Ok(Some(message))
}

// ---------------------------------------------------------------------------
// Intent capture
// ---------------------------------------------------------------------------

/// Read `intent.action` and `intent.extras` from an `android.content.Intent`.
pub fn intent_action_and_extras(
    env: &mut JNIEnv,
    intent: &JObject,
) -> Result<(Option<String>, Option<NativeValue>)> {
    if intent.is_null() {
        return Ok((None, None));
    }

    let action = env
        .call_method(intent, "getAction", "()Ljava/lang/String;", &[])
        .and_then(|v| v.l())
        .map_err(|e| jni_err("Intent.getAction", e))?;
    let action = if action.is_null() {
        None
    } else {
        let s: String = env
            .get_string(&JString::from(action))
            .map_err(|e| jni_err("action string", e))?
            .into();
        Some(s)
    };

    let extras = env
        .call_method(intent, "getExtras", "()Landroid/os/Bundle;", &[])
        .and_then(|v| v.l())
        .map_err(|e| jni_err("Intent.getExtras", e))?;
    let extras = if extras.is_null() {
        None
    } else {
        Some(bundle_to_native(env, &extras)?)
    };

    Ok((action, extras))
}

/// Walk an `android.os.Bundle` into a [`NativeValue::Map`].
pub fn bundle_to_native(env: &mut JNIEnv, bundle: &JObject) -> Result<NativeValue> {
    let key_set = env
        .call_method(bundle, "keySet", "()Ljava/util/Set;", &[])
        .and_then(|v| v.l())
        .map_err(|e| jni_err("Bundle.keySet", e))?;
    let keys = env
        .call_method(&key_set, "toArray", "()[Ljava/lang/Object;", &[])
        .and_then(|v| v.l())
        .map_err(|e| jni_err("Set.toArray", e))?;
    let keys = JObjectArray::from(keys);
    let len = env
        .get_array_length(&keys)
        .map_err(|e| jni_err("key array length", e))?;

    let mut entries = Vec::with_capacity(len as usize);
    for i in 0..len {
        let key_obj = env
            .get_object_array_element(&keys, i)
            .map_err(|e| jni_err("key element", e))?;
        let key: String = env
            .get_string(&JString::from(key_obj))
            .map_err(|e| jni_err("key string", e))?
            .into();
        let j_key = env
            .new_string(&key)
            .map_err(|e| jni_err("new_string(key)", e))?;
        // Bundle.get(String) is deprecated but is the only untyped accessor.
        let value = env
            .call_method(
                bundle,
                "get",
                "(Ljava/lang/String;)Ljava/lang/Object;",
                &[JValue::Object(&j_key)],
            )
            .and_then(|v| v.l())
            .map_err(|e| jni_err("Bundle.get", e))?;
        let native = object_to_native(env, &value)?;
        entries.push((key, native));
    }

    Ok(NativeValue::Map(entries))
}

/// `obj instanceof class`.
fn is_a(env: &mut JNIEnv, obj: &JObject, class: &str) -> Result<bool> {
    env.is_instance_of(obj, class)
        .map_err(|e| jni_err("instanceof", e))
}

/// Lift a single Java object into a [`NativeValue`].
///
/// Primitive arrays other than `byte[]` have no structural counterpart and
/// are captured as opaque values.
pub fn object_to_native(env: &mut JNIEnv, obj: &JObject) -> Result<NativeValue> {
    if obj.is_null() {
        return Ok(NativeValue::Null);
    }

    if is_a(env, obj, "java/lang/String")? {
        let local = env.new_local_ref(obj).map_err(|e| jni_err("local ref", e))?;
        let s: String = env
            .get_string(&JString::from(local))
            .map_err(|e| jni_err("String value", e))?
            .into();
        return Ok(NativeValue::String(s));
    }

    if is_a(env, obj, "java/lang/Boolean")? {
        let b = env
            .call_method(obj, "booleanValue", "()Z", &[])
            .and_then(|v| v.z())
            .map_err(|e| jni_err("booleanValue", e))?;
        return Ok(NativeValue::Bool(b));
    }

    if is_a(env, obj, "java/lang/Integer")? {
        let i = env
            .call_method(obj, "intValue", "()I", &[])
            .and_then(|v| v.i())
            .map_err(|e| jni_err("intValue", e))?;
        return Ok(NativeValue::Int(i));
    }

    if is_a(env, obj, "java/lang/Long")? {
        let l = env
            .call_method(obj, "longValue", "()J", &[])
            .and_then(|v| v.j())
            .map_err(|e| jni_err("longValue", e))?;
        return Ok(NativeValue::Long(l));
    }

    if is_a(env, obj, "java/lang/Double")? {
        let d = env
            .call_method(obj, "doubleValue", "()D", &[])
            .and_then(|v| v.d())
            .map_err(|e| jni_err("doubleValue", e))?;
        return Ok(NativeValue::Double(d));
    }

    if is_a(env, obj, "java/lang/Float")? {
        let f = env
            .call_method(obj, "floatValue", "()F", &[])
            .and_then(|v| v.f())
            .map_err(|e| jni_err("floatValue", e))?;
        return Ok(NativeValue::Float(f));
    }

    if is_a(env, obj, "android/os/Bundle")? {
        return bundle_to_native(env, obj);
    }

    if is_a(env, obj, "java/util/List")? {
        let size = env
            .call_method(obj, "size", "()I", &[])
            .and_then(|v| v.i())
            .map_err(|e| jni_err("List.size", e))?;
        let mut items = Vec::with_capacity(size.max(0) as usize);
        for i in 0..size {
            let item = env
                .call_method(obj, "get", "(I)Ljava/lang/Object;", &[JValue::Int(i)])
                .and_then(|v| v.l())
                .map_err(|e| jni_err("List.get", e))?;
            items.push(object_to_native(env, &item)?);
        }
        return Ok(NativeValue::List(items));
    }

    if is_a(env, obj, "[B")? {
        let local = env.new_local_ref(obj).map_err(|e| jni_err("local ref", e))?;
        let array = JByteArray::from(local);
        let bytes = env
            .convert_byte_array(&array)
            .map_err(|e| jni_err("byte[]", e))?;
        return Ok(NativeValue::Bytes(bytes));
    }

    // Covers String[], Parcelable[] and every other reference array.
    if is_a(env, obj, "[Ljava/lang/Object;")? {
        let local = env.new_local_ref(obj).map_err(|e| jni_err("local ref", e))?;
        let array = JObjectArray::from(local);
        let len = env
            .get_array_length(&array)
            .map_err(|e| jni_err("array length", e))?;
        let mut items = Vec::with_capacity(len as usize);
        for i in 0..len {
            let item = env
                .get_object_array_element(&array, i)
                .map_err(|e| jni_err("array element", e))?;
            items.push(object_to_native(env, &item)?);
        }
        return Ok(NativeValue::Array(items));
    }

    let class = env
        .call_method(obj, "getClass", "()Ljava/lang/Class;", &[])
        .and_then(|v| v.l())
        .map_err(|e| jni_err("getClass", e))?;
    let type_name = env
        .call_method(&class, "getSimpleName", "()Ljava/lang/String;", &[])
        .and_then(|v| v.l())
        .map_err(|e| jni_err("getSimpleName", e))?;
    let type_name: String = env
        .get_string(&JString::from(type_name))
        .map_err(|e| jni_err("class name", e))?
        .into();
    let description = env
        .call_method(obj, "toString", "()Ljava/lang/String;", &[])
        .and_then(|v| v.l())
        .map_err(|e| jni_err("toString", e))?;
    let description = if description.is_null() {
        String::new()
    } else {
        env.get_string(&JString::from(description))
            .map_err(|e| jni_err("toString value", e))?
            .into()
    };

    Ok(NativeValue::Opaque {
        type_name,
        description,
    })
}

// ---------------------------------------------------------------------------
// Bridge struct
// ---------------------------------------------------------------------------

/// Android implementation of the telephony bridge.
///
/// Holds the `JavaVM` and a global reference to the Kotlin glue class; all
/// telecom state lives on the Java side.
pub struct AndroidBridge {
    vm: JavaVM,
    glue: GlobalRef,
}

impl AndroidBridge {
    /// Resolve the glue class.  Must run on the main thread.
    pub fn new() -> Result<Self> {
        let vm = java_vm()?;
        let glue = glue_class(&vm)?;
        Ok(Self { vm, glue })
    }

    fn env(&self) -> Result<JNIEnv<'_>> {
        self.vm
            .attach_current_thread_permanently()
            .map_err(|e| jni_err("attach thread", e))
    }

    fn class(&self) -> &JClass<'static> {
        <&JClass>::from(self.glue.as_obj())
    }
}

impl PlatformBridge for AndroidBridge {
    fn platform_name(&self) -> &str {
        "Android"
    }
}

impl CallProvider for AndroidBridge {
    /// Registers a self-managed `PhoneAccount` with `TelecomManager`.
    fn register(&self, config: &ProviderConfig) -> Result<()> {
        let mut env = self.env()?;
        let label = env
            .new_string(&config.localized_name)
            .map_err(|e| jni_err("new_string(label)", e))?;
        env.call_static_method(
            self.class(),
            "registerPhoneAccount",
            "(Ljava/lang/String;IZI)V",
            &[
                JValue::Object(&label),
                JValue::Int(max_simultaneous_calls(config)),
                JValue::Bool(config.supports_video.into()),
                JValue::Int(handle_type_mask(&config.handle_types) as i32),
            ],
        )
        .map_err(|e| jni_err("registerPhoneAccount", e))?;
        tracing::info!(label = %config.localized_name, "PhoneAccount registered");
        Ok(())
    }

    fn report_new_incoming_call(&self, update: &CallUpdate) -> Result<()> {
        let mut env = self.env()?;
        let uuid = env
            .new_string(update.call.uuid().to_string())
            .map_err(|e| jni_err("new_string(uuid)", e))?;
        let handle = env
            .new_string(&update.handle_value)
            .map_err(|e| jni_err("new_string(handle)", e))?;
        let name = env
            .new_string(&update.caller_name)
            .map_err(|e| jni_err("new_string(name)", e))?;

        let result = env
            .call_static_method(
                self.class(),
                "addIncomingCall",
                "(Ljava/lang/String;ILjava/lang/String;Ljava/lang/String;Z)Ljava/lang/String;",
                &[
                    JValue::Object(&uuid),
                    JValue::Int(handle_type_code(update.handle_type) as i32),
                    JValue::Object(&handle),
                    JValue::Object(&name),
                    JValue::Bool(update.has_video.into()),
                ],
            )
            .and_then(|v| v.l())
            .map_err(|e| jni_err("addIncomingCall", e))?;

        match optional_error(&mut env, result)? {
            None => Ok(()),
            Some(reason) => Err(CallRelayError::Report {
                call_id: update.call.to_string(),
                reason,
            }),
        }
    }

    fn report_call_ended(&self, call: &CallId, reason: EndReason) -> Result<()> {
        let mut env = self.env()?;
        let uuid = env
            .new_string(call.uuid().to_string())
            .map_err(|e| jni_err("new_string(uuid)", e))?;
        env.call_static_method(
            self.class(),
            "reportCallEnded",
            "(Ljava/lang/String;I)V",
            &[JValue::Object(&uuid), JValue::Int(reason.code() as i32)],
        )
        .map_err(|e| jni_err("reportCallEnded", e))?;
        Ok(())
    }
}

impl AudioRoute for AndroidBridge {
    /// `AudioManager.MODE_IN_COMMUNICATION` with bluetooth SCO when present.
    fn configure_for_call(&self) -> Result<()> {
        let mut env = self.env()?;
        let result = env
            .call_static_method(
                self.class(),
                "configureAudioForCall",
                "()Ljava/lang/String;",
                &[],
            )
            .and_then(|v| v.l())
            .map_err(|e| jni_err("configureAudioForCall", e))?;
        match optional_error(&mut env, result)? {
            None => Ok(()),
            Some(reason) => Err(CallRelayError::AudioSession(reason)),
        }
    }

    fn deactivate(&self) -> Result<()> {
        let mut env = self.env()?;
        env.call_static_method(self.class(), "releaseAudio", "()V", &[])
            .map_err(|e| jni_err("releaseAudio", e))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Method channel endpoint
// ---------------------------------------------------------------------------

/// Flutter `MethodChannel` reached through the glue object, which posts the
/// invocation onto the main looper.
pub struct JniEndpoint {
    vm: JavaVM,
    glue: GlobalRef,
}

impl JniEndpoint {
    /// Resolve the glue class.  Must run on the main thread.
    pub fn new() -> Result<Self> {
        let vm = java_vm()?;
        let glue = glue_class(&vm)?;
        Ok(Self { vm, glue })
    }
}

impl AppEndpoint for JniEndpoint {
    /// `flutterEngine?.dartExecutor` is non-null.
    fn is_ready(&self) -> bool {
        let Ok(mut env) = self.vm.attach_current_thread_permanently() else {
            return false;
        };
        let class = <&JClass>::from(self.glue.as_obj());
        env.call_static_method(class, "isEngineReady", "()Z", &[])
            .and_then(|v| v.z())
            .unwrap_or(false)
    }

    fn invoke(&self, channel: &str, method: &str, arguments: &CanonicalValue) -> Result<()> {
        let json = arguments.to_json_string()?;
        let mut env = self
            .vm
            .attach_current_thread_permanently()
            .map_err(|e| jni_err("attach thread", e))?;
        let j_channel = env
            .new_string(channel)
            .map_err(|e| jni_err("new_string(channel)", e))?;
        let j_method = env
            .new_string(method)
            .map_err(|e| jni_err("new_string(method)", e))?;
        let j_args = env
            .new_string(json)
            .map_err(|e| jni_err("new_string(arguments)", e))?;
        let class = <&JClass>::from(self.glue.as_obj());

        env.call_static_method(
            class,
            "invokeMethod",
            "(Ljava/lang/String;Ljava/lang/String;Ljava/lang/String;)V",
            &[
                JValue::Object(&j_channel),
                JValue::Object(&j_method),
                JValue::Object(&j_args),
            ],
        )
        .map_err(|e| CallRelayError::Endpoint(format!("invokeMethod {method}: {e}")))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Connection action acknowledgement
// ---------------------------------------------------------------------------

/// Pending `Connection` callback (`onAnswer`, `onDisconnect`), identified by
/// the token the glue handed out.
pub struct AndroidActionAck {
    vm: JavaVM,
    glue: GlobalRef,
    pub action_id: i64,
}

impl AndroidActionAck {
    pub fn new(bridge: &AndroidBridge, action_id: i64) -> Result<Self> {
        Ok(Self {
            vm: java_vm()?,
            glue: bridge.glue.clone(),
            action_id,
        })
    }

    fn complete(&self, fulfilled: bool) {
        let result = self
            .vm
            .attach_current_thread_permanently()
            .and_then(|mut env| {
                let class = <&JClass>::from(self.glue.as_obj());
                env.call_static_method(
                    class,
                    "completeAction",
                    "(JZ)V",
                    &[JValue::Long(self.action_id), JValue::Bool(fulfilled.into())],
                )
                .map(|_| ())
            });
        if let Err(e) = result {
            tracing::error!(action_id = self.action_id, error = %e, "completeAction failed");
        }
    }
}

impl ActionAck for AndroidActionAck {
    fn fulfill(self: Box<Self>) {
        self.complete(true);
    }

    fn fail(self: Box<Self>) {
        self.complete(false);
    }
}
