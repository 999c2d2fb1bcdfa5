// This file is part of wasm-indexer.
// Copyright (C) 2025 Wasm Indexer Contributors
// SPDX-License-Identifier: Apache-2.0
// Licensed under the Apache License, Version 2.0 (the "License");
// You may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub mod bank;
pub mod feegrant;
pub mod wasm;

use crate::domain::extractor::ExtractError;
use serde_json::Value;

/// A required string field of an item value.
fn str_field<'a>(value: &'a Value, field: &str) -> Result<&'a str, ExtractError> {
    value[field]
        .as_str()
        .ok_or_else(|| ExtractError::InvalidData(format!("missing string field {field}")))
}

/// A required unsigned integer field of an item value.
fn u64_field(value: &Value, field: &str) -> Result<u64, ExtractError> {
    value[field]
        .as_u64()
        .ok_or_else(|| ExtractError::InvalidData(format!("missing integer field {field}")))
}
