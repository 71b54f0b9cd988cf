// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// callrelay — Native telephony bridge abstractions.
//
// This crate defines the ports the relay uses to talk to the OS call
// subsystem and to the application layer, plus one implementation per
// platform: iOS (CallKit / PushKit via objc2 and a Swift shim), Android
// (ConnectionService via JNI) and a desktop stub.

pub mod traits;

#[cfg(target_os = "ios")]
pub mod ios;

#[cfg(target_os = "android")]
pub mod android;

#[cfg(not(any(target_os = "ios", target_os = "android")))]
pub mod stub;

use std::sync::Arc;

use callrelay_core::error::Result;

/// Returns the OS call-subsystem bridge for the target operating system.
///
/// On Android this resolves the Java glue classes, so it must be called from
/// a thread whose class loader can see them (the main thread).
pub fn platform_bridge() -> Result<Box<dyn traits::PlatformBridge>> {
    #[cfg(target_os = "ios")]
    {
        Ok(Box::new(ios::IosBridge::new()))
    }
    #[cfg(target_os = "android")]
    {
        Ok(Box::new(android::AndroidBridge::new()?))
    }
    #[cfg(not(any(target_os = "ios", target_os = "android")))]
    {
        Ok(Box::new(stub::StubBridge))
    }
}

/// Returns the application-layer endpoint for the target operating system.
pub fn app_endpoint() -> Result<Arc<dyn traits::AppEndpoint>> {
    #[cfg(target_os = "ios")]
    {
        Ok(Arc::new(ios::IosEndpoint))
    }
    #[cfg(target_os = "android")]
    {
        Ok(Arc::new(android::JniEndpoint::new()?))
    }
    #[cfg(not(any(target_os = "ios", target_os = "android")))]
    {
        Ok(Arc::new(stub::StubEndpoint))
    }
}
