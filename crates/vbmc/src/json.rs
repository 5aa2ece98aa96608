/*
 * SPDX-FileCopyrightText: Copyright (c) 2021-2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */

//! JSON helpers shared by the Redfish resource builders.

use axum::http::{header, StatusCode};
use axum::response::Response;
use serde_json::Value;

/// Recursive merge of `patch` into `base`. Objects merge key-wise, everything
/// else replaces. `null` in the patch removes the key, per RFC 7386.
pub fn json_merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                if patch_value.is_null() {
                    base_map.remove(&key);
                } else {
                    json_merge(base_map.entry(key).or_insert(Value::Null), patch_value);
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

/// Builder-style merge used by the resource builders.
pub trait JsonPatch {
    fn patch(self, patch: Value) -> Value;
}

impl JsonPatch for Value {
    fn patch(mut self, patch: Value) -> Value {
        json_merge(&mut self, patch);
        self
    }
}

/// Turn a `serde_json::Value` into an HTTP response with the right content
/// type, without going through a typed serde struct.
pub trait JsonExt {
    fn into_response(self, status: StatusCode) -> Response;

    fn into_ok_response(self) -> Response
    where
        Self: Sized,
    {
        self.into_response(StatusCode::OK)
    }
}

impl JsonExt for Value {
    fn into_response(self, status: StatusCode) -> Response {
        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json")
            .body(self.to_string().into())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn merges_nested_objects() {
        let base = json!({"Boot": {"BootSourceOverrideTarget": "None", "BootSourceOverrideEnabled": "Disabled"}});
        let merged = base.patch(json!({"Boot": {"BootSourceOverrideTarget": "Pxe"}}));
        assert_eq!(merged["Boot"]["BootSourceOverrideTarget"], "Pxe");
        assert_eq!(merged["Boot"]["BootSourceOverrideEnabled"], "Disabled");
    }

    #[test]
    fn null_removes_keys() {
        let merged = json!({"a": 1, "b": 2}).patch(json!({"b": null}));
        assert_eq!(merged, json!({"a": 1}));
    }

    #[test]
    fn scalars_replace() {
        let merged = json!({"a": [1, 2]}).patch(json!({"a": [3]}));
        assert_eq!(merged, json!({"a": [3]}));
    }
}
