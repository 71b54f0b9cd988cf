// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Payload normalization: native values -> bridge-safe canonical values.
//
// Rules, applied recursively:
//   primitives              -> unchanged (32-bit widened to 64-bit)
//   NaN / infinite floats   -> string form ("NaN", "inf", "-inf")
//   key/value containers    -> CanonicalValue::Map
//   lists and arrays        -> CanonicalValue::List
//   null                    -> null
//   bytes / opaque objects  -> string form (logged as a fallback)
//
// Native telephony payloads are shallow; recursion depth follows the input.

use tracing::warn;

use crate::value::{CanonicalPayload, CanonicalValue, NativeValue};

/// Convert a native value into its canonical, bridge-safe form.
///
/// Never fails and never turns a present value into `null`.  Values outside
/// the representable set degrade to their string form.
pub fn normalize(value: NativeValue) -> CanonicalValue {
    match value {
        NativeValue::Null => CanonicalValue::Null,
        NativeValue::Bool(b) => CanonicalValue::Bool(b),
        NativeValue::Int(i) => CanonicalValue::Integer(i64::from(i)),
        NativeValue::Long(i) => CanonicalValue::Integer(i),
        NativeValue::Float(f) => float(f64::from(f)),
        NativeValue::Double(f) => float(f),
        NativeValue::String(s) => CanonicalValue::String(s),
        NativeValue::Map(entries) => CanonicalValue::Map(normalize_entries(entries)),
        NativeValue::List(items) | NativeValue::Array(items) => {
            CanonicalValue::List(items.into_iter().map(normalize).collect())
        }
        NativeValue::Bytes(bytes) => {
            let encoded = hex::encode(&bytes);
            warn!(
                kind = "ByteArray",
                len = bytes.len(),
                "normalization fallback: bytes converted to hex string"
            );
            CanonicalValue::String(encoded)
        }
        NativeValue::Opaque {
            type_name,
            description,
        } => {
            warn!(
                kind = %type_name,
                value = %description,
                "normalization fallback: unsupported type converted to string"
            );
            CanonicalValue::String(description)
        }
    }
}

/// JSON has no non-finite numbers; they would cross the bridge as `null`.
fn float(f: f64) -> CanonicalValue {
    if f.is_finite() {
        return CanonicalValue::Float(f);
    }
    warn!(kind = "Float", value = %f, "normalization fallback: non-finite float converted to string");
    CanonicalValue::String(f.to_string())
}

/// Normalize a key/value bag (intent extras, push payload) into a payload.
///
/// A later duplicate key overwrites an earlier one, matching how both
/// `Bundle` and `NSDictionary` resolve lookups.
pub fn normalize_entries(entries: Vec<(String, NativeValue)>) -> CanonicalPayload {
    entries
        .into_iter()
        .map(|(key, value)| (key, normalize(value)))
        .collect()
}

/// Normalize an optional extras bag.  A non-map top-level value is kept under
/// the `"value"` key so nothing the OS handed over is lost.
pub fn normalize_extras(extras: Option<NativeValue>) -> CanonicalPayload {
    match extras {
        None | Some(NativeValue::Null) => CanonicalPayload::new(),
        Some(NativeValue::Map(entries)) => normalize_entries(entries),
        Some(other) => {
            let mut payload = CanonicalPayload::new();
            payload.insert("value".into(), normalize(other));
            payload
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_pass_through() {
        assert_eq!(normalize(NativeValue::Null), CanonicalValue::Null);
        assert_eq!(normalize(NativeValue::Bool(true)), CanonicalValue::Bool(true));
        assert_eq!(normalize(NativeValue::Int(-4)), CanonicalValue::Integer(-4));
        assert_eq!(
            normalize(NativeValue::Long(9_000_000_000)),
            CanonicalValue::Integer(9_000_000_000)
        );
        assert_eq!(normalize(NativeValue::Float(1.5)), CanonicalValue::Float(1.5));
        assert_eq!(normalize(NativeValue::Double(2.25)), CanonicalValue::Float(2.25));
        assert_eq!(normalize("Jane".into()), CanonicalValue::String("Jane".into()));
    }

    #[test]
    fn nested_containers_keep_shape() {
        let native = NativeValue::map([
            ("call_id", "abc-123".into()),
            (
                "headers",
                NativeValue::map([
                    ("x-tenant", "acme".into()),
                    ("x-hops", NativeValue::Int(2)),
                ]),
            ),
            (
                "codecs",
                NativeValue::List(vec!["opus".into(), "pcmu".into()]),
            ),
            (
                "ports",
                NativeValue::Array(vec![NativeValue::Int(5060), NativeValue::Int(5061)]),
            ),
        ]);

        let canonical = normalize(native);
        let map = canonical.as_map().expect("map");
        let keys: Vec<_> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, ["call_id", "codecs", "headers", "ports"]);

        let headers = map["headers"].as_map().expect("nested map");
        assert_eq!(headers["x-tenant"], CanonicalValue::String("acme".into()));
        assert_eq!(headers["x-hops"], CanonicalValue::Integer(2));
        assert_eq!(
            map["ports"],
            CanonicalValue::List(vec![
                CanonicalValue::Integer(5060),
                CanonicalValue::Integer(5061)
            ])
        );
    }

    #[test]
    fn opaque_values_become_strings() {
        let opaque = NativeValue::Opaque {
            type_name: "android.net.Uri".into(),
            description: "tel:+15551234567".into(),
        };
        assert_eq!(
            normalize(opaque),
            CanonicalValue::String("tel:+15551234567".into())
        );
    }

    #[test]
    fn opaque_with_empty_description_is_still_present() {
        let opaque = NativeValue::Opaque {
            type_name: "Parcelable".into(),
            description: String::new(),
        };
        assert_eq!(normalize(opaque), CanonicalValue::String(String::new()));
    }

    #[test]
    fn non_finite_floats_stay_present() {
        assert_eq!(normalize(NativeValue::Double(f64::NAN)), CanonicalValue::String("NaN".into()));
        assert_eq!(
            normalize(NativeValue::Float(f32::INFINITY)),
            CanonicalValue::String("inf".into())
        );
        assert_eq!(
            normalize(NativeValue::Double(f64::NEG_INFINITY)),
            CanonicalValue::String("-inf".into())
        );
        let json = serde_json::to_string(&normalize(NativeValue::Double(f64::NAN))).unwrap();
        assert_eq!(json, r#""NaN""#);
    }

    #[test]
    fn bytes_become_hex() {
        assert_eq!(
            normalize(NativeValue::Bytes(vec![0x0a, 0xff, 0x00])),
            CanonicalValue::String("0aff00".into())
        );
    }

    #[test]
    fn opaque_inside_list_is_coerced_in_place() {
        let list = NativeValue::List(vec![
            NativeValue::Int(1),
            NativeValue::Opaque {
                type_name: "Date".into(),
                description: "2026-01-01".into(),
            },
            NativeValue::Null,
        ]);
        assert_eq!(
            normalize(list),
            CanonicalValue::List(vec![
                CanonicalValue::Integer(1),
                CanonicalValue::String("2026-01-01".into()),
                CanonicalValue::Null,
            ])
        );
    }

    #[test]
    fn extras_variants() {
        assert!(normalize_extras(None).is_empty());
        assert!(normalize_extras(Some(NativeValue::Null)).is_empty());

        let wrapped = normalize_extras(Some("lonely".into()));
        assert_eq!(wrapped["value"], CanonicalValue::String("lonely".into()));

        let extras = normalize_extras(Some(NativeValue::map([("a", NativeValue::Bool(false))])));
        assert_eq!(extras["a"], CanonicalValue::Bool(false));
    }
}
