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

use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

/// Process-wide registry of named code-id allow-lists, e.g. which code ids count as a DAO core
/// contract or which addresses are worth retaining bank balances for.
#[derive(Debug, Default)]
pub struct WasmCodeService {
    code_ids_by_key: RwLock<HashMap<String, BTreeSet<u64>>>,
}

impl WasmCodeService {
    /// Create a new [WasmCodeService] from initial `(key, code ids)` pairs.
    pub fn new(codes: impl IntoIterator<Item = (String, Vec<u64>)>) -> Self {
        let service = Self::default();
        for (key, code_ids) in codes {
            service.register(&key, code_ids);
        }
        service
    }

    /// Register additional code ids under the given key.
    pub fn register(&self, key: &str, code_ids: impl IntoIterator<Item = u64>) {
        self.code_ids_by_key
            .write()
            .entry(key.to_owned())
            .or_default()
            .extend(code_ids);
    }

    /// All code ids registered under the given key.
    pub fn code_ids(&self, key: &str) -> BTreeSet<u64> {
        self.code_ids_by_key
            .read()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether the given code id is registered under any of the given keys.
    pub fn matches(&self, code_id: u64, keys: &[&str]) -> bool {
        let code_ids_by_key = self.code_ids_by_key.read();
        keys.iter().any(|key| {
            code_ids_by_key
                .get(*key)
                .is_some_and(|code_ids| code_ids.contains(&code_id))
        })
    }
}
