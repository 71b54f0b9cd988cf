// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for payload normalization of realistic push and
// intent payloads.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use callrelay_core::normalize::{normalize, normalize_extras};
use callrelay_core::value::NativeValue;

/// A nested VoIP push payload as delivered by the push network.
fn push_payload() -> NativeValue {
    NativeValue::from_json(serde_json::json!({
        "aps": { "alert": "Incoming call", "content-available": 1 },
        "call_data": {
            "call_id": "0b5c3a7e-9f34-4d3e-8a51-4f7d2c1b9e60",
            "caller_name": "Jane Doe",
            "caller_number": "+15551234567",
            "voice_sdk_id": "vsdk-9",
            "metadata": {
                "codecs": ["opus", "pcmu", "pcma"],
                "region": "us-east",
                "attempt": 1
            }
        }
    }))
}

/// Flat Android intent extras including opaque platform objects.
fn intent_extras() -> NativeValue {
    NativeValue::map([
        ("call_id", "abc-123".into()),
        ("caller_name", "Jane".into()),
        ("caller_number", "+15551234567".into()),
        ("voice_sdk_id", "vsdk-9".into()),
        ("duration", NativeValue::Long(30_000)),
        ("isVideo", NativeValue::Bool(false)),
        (
            "avatar",
            NativeValue::Opaque {
                type_name: "android.net.Uri".into(),
                description: "content://avatars/42".into(),
            },
        ),
        ("token", NativeValue::Bytes(vec![0xde, 0xad, 0xbe, 0xef])),
    ])
}

fn bench_normalize(c: &mut Criterion) {
    let push = push_payload();
    let extras = intent_extras();

    c.bench_function("normalize_nested_push_payload", |b| {
        b.iter(|| normalize(black_box(push.clone())))
    });

    c.bench_function("normalize_intent_extras", |b| {
        b.iter(|| normalize_extras(black_box(Some(extras.clone()))))
    });
}

criterion_group!(benches, bench_normalize);
criterion_main!(benches);
