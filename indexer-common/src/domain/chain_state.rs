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

use serde::{Deserialize, Serialize};

/// The singleton indexing state. All writes are monotonic: a laggy worker can never rewind a
/// published high-water mark.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    pub chain_id: Option<String>,
    pub latest_block_height: u64,
    pub latest_block_time_unix_ms: u64,
    pub last_wasm_block_height_exported: Option<u64>,
    pub last_bank_block_height_exported: Option<u64>,
    pub last_feegrant_block_height_exported: Option<u64>,
}

/// The modules for which per-module export high-water marks are tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportModule {
    Wasm,
    Bank,
    Feegrant,
}

impl ExportModule {
    /// The module exporting under the given trace-handler name.
    pub fn for_handler(name: &str) -> Option<Self> {
        match name {
            "wasm" => Some(Self::Wasm),
            "bank" => Some(Self::Bank),
            "feegrant" => Some(Self::Feegrant),
            _ => None,
        }
    }

    /// The `chain_state` column holding this module's high-water mark.
    pub const fn column(&self) -> &'static str {
        match self {
            Self::Wasm => "last_wasm_block_height_exported",
            Self::Bank => "last_bank_block_height_exported",
            Self::Feegrant => "last_feegrant_block_height_exported",
        }
    }
}
