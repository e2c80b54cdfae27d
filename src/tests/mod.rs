// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

mod compile;
mod intersect;
mod scenarios;

use crate::Value;

/// Build a `Value` from a `serde_json::json!` literal.
pub(crate) fn v(json: serde_json::Value) -> Value {
    match serde_json::from_value(json) {
        Ok(value) => value,
        Err(e) => panic!("fixture failed to deserialize: {e}"),
    }
}
