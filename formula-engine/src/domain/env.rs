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

use crate::domain::{
    formula::{DependencySource, DependentKey, FormulaError},
    storage::{FeegrantRole, MatchPagination, Storage},
};
use indexer_common::domain::{Block, Contract, FeegrantAllowance, WasmCodeService};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// A value read from the event log together with the height it was written at.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueAtHeight {
    pub block_height: u64,
    pub value: Value,
}

/// How map key tails are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapKeyType {
    String,
    /// Tails which do not parse as unsigned integers are skipped.
    Number,
}

/// Choose the candidate with the greatest height; on ties the earliest listed candidate wins,
/// so callers list sources in precedence order (extraction, transformation, state).
pub fn pick_latest(
    candidates: impl IntoIterator<Item = Option<ValueAtHeight>>,
) -> Option<ValueAtHeight> {
    let mut best: Option<ValueAtHeight> = None;
    for candidate in candidates.into_iter().flatten() {
        match &best {
            Some(picked) if candidate.block_height <= picked.block_height => {}
            _ => best = Some(candidate),
        }
    }
    best
}

/// The environment a formula computes in: the event store at a fixed block height, plus the
/// dependency set every primitive appends the logical keys it reads to.
pub struct FormulaEnv<'a, S> {
    storage: &'a S,
    wasm_codes: &'a WasmCodeService,
    block: Block,
    dependencies: Mutex<BTreeSet<DependentKey>>,
}

impl<'a, S> FormulaEnv<'a, S>
where
    S: Storage,
{
    pub fn new(storage: &'a S, wasm_codes: &'a WasmCodeService, block: Block) -> Self {
        Self {
            storage,
            wasm_codes,
            block,
            dependencies: Mutex::new(BTreeSet::new()),
        }
    }

    /// The block this computation is fixed at.
    pub fn block(&self) -> Block {
        self.block
    }

    pub fn into_dependencies(self) -> BTreeSet<DependentKey> {
        self.dependencies.into_inner()
    }

    fn depend(&self, source: DependencySource, scope: &str, key: &str, prefix: bool) {
        self.dependencies.lock().insert(DependentKey {
            source,
            scope: scope.to_string(),
            key: key.to_string(),
            prefix,
        });
    }

    /// The latest raw state event value for the key, at or below the env height.
    pub async fn get(&self, scope: &str, key: &str) -> Result<Option<ValueAtHeight>, FormulaError> {
        self.depend(DependencySource::State, scope, key, false);

        let event = self
            .storage
            .latest_state_event(scope, key, self.block.height)
            .await?;

        Ok(event.filter(|event| !event.deleted).map(|event| ValueAtHeight {
            block_height: event.block_height,
            value: event.value_json,
        }))
    }

    /// All latest state-event values whose key starts with the prefix, mapped by key tail.
    pub async fn get_map(
        &self,
        scope: &str,
        prefix: &str,
        key_type: MapKeyType,
    ) -> Result<Map<String, Value>, FormulaError> {
        self.depend(DependencySource::State, scope, prefix, true);

        let events = self
            .storage
            .latest_state_events_by_prefix(scope, prefix, self.block.height)
            .await?;

        let mut map = Map::new();
        for event in events {
            if event.deleted {
                continue;
            }
            let tail = &event.key[prefix.len()..];
            if key_type == MapKeyType::Number && tail.parse::<u64>().is_err() {
                continue;
            }
            map.insert(tail.to_string(), event.value_json);
        }

        Ok(map)
    }

    /// The latest transformation value with the exact name.
    pub async fn get_transformation_match(
        &self,
        scope: &str,
        name: &str,
    ) -> Result<Option<ValueAtHeight>, FormulaError> {
        self.depend(DependencySource::Transformation, scope, name, false);

        let transformation = self
            .storage
            .latest_transformation(scope, name, self.block.height)
            .await?;

        Ok(transformation.map(|transformation| ValueAtHeight {
            block_height: transformation.block_height,
            value: transformation.value,
        }))
    }

    /// The latest transformation per name matching the single-`*` wildcard pattern.
    pub async fn get_transformation_matches(
        &self,
        scope: Option<&str>,
        name_pattern: &str,
        pagination: &MatchPagination,
    ) -> Result<Vec<TransformationMatch>, FormulaError> {
        self.depend(
            DependencySource::Transformation,
            scope.unwrap_or("*"),
            name_pattern,
            true,
        );

        let transformations = self
            .storage
            .latest_transformations_matching(scope, name_pattern, self.block.height, pagination)
            .await?;

        Ok(transformations
            .into_iter()
            .map(|transformation| TransformationMatch {
                contract_address: transformation.contract_address,
                name: transformation.name,
                block_height: transformation.block_height,
                value: transformation.value,
            })
            .collect())
    }

    /// Map-shaped read against transformations: latest value per name tail under the prefix.
    pub async fn get_transformation_map(
        &self,
        scope: &str,
        prefix: &str,
    ) -> Result<Map<String, Value>, FormulaError> {
        let pattern = format!("{prefix}*");
        self.depend(DependencySource::Transformation, scope, &pattern, true);

        let transformations = self
            .storage
            .latest_transformations_matching(
                Some(scope),
                &pattern,
                self.block.height,
                &MatchPagination::default(),
            )
            .await?;

        Ok(transformations
            .into_iter()
            .map(|transformation| {
                let tail = transformation.name[prefix.len()..].to_string();
                (tail, transformation.value)
            })
            .collect())
    }

    /// The latest extraction value with the exact name.
    pub async fn get_extraction(
        &self,
        scope: &str,
        name: &str,
    ) -> Result<Option<ValueAtHeight>, FormulaError> {
        self.depend(DependencySource::Extraction, scope, name, false);

        let extraction = self
            .storage
            .latest_extraction(scope, name, self.block.height)
            .await?;

        Ok(extraction.map(|extraction| ValueAtHeight {
            block_height: extraction.block_height,
            value: extraction.data,
        }))
    }

    /// The latest extraction per name matching the single-`*` wildcard pattern.
    pub async fn get_extractions(
        &self,
        scope: Option<&str>,
        name_pattern: &str,
        pagination: &MatchPagination,
    ) -> Result<Vec<ExtractionMatch>, FormulaError> {
        self.depend(
            DependencySource::Extraction,
            scope.unwrap_or("*"),
            name_pattern,
            true,
        );

        let extractions = self
            .storage
            .latest_extractions_matching(scope, name_pattern, self.block.height, pagination)
            .await?;

        Ok(extractions
            .into_iter()
            .map(|extraction| ExtractionMatch {
                address: extraction.address,
                name: extraction.name,
                block_height: extraction.block_height,
                value: extraction.data,
            })
            .collect())
    }

    /// Map-shaped read against extractions: latest value per name tail under the prefix.
    pub async fn get_extraction_map(
        &self,
        scope: &str,
        prefix: &str,
    ) -> Result<Map<String, Value>, FormulaError> {
        let pattern = format!("{prefix}*");
        self.depend(DependencySource::Extraction, scope, &pattern, true);

        let extractions = self
            .storage
            .latest_extractions_matching(
                Some(scope),
                &pattern,
                self.block.height,
                &MatchPagination::default(),
            )
            .await?;

        Ok(extractions
            .into_iter()
            .map(|extraction| {
                let tail = extraction.name[prefix.len()..].to_string();
                (tail, extraction.data)
            })
            .collect())
    }

    /// The contract's instantiation facts.
    pub async fn get_contract(&self, address: &str) -> Result<Option<Contract>, FormulaError> {
        self.depend(DependencySource::Contract, address, "info", false);
        Ok(self.storage.get_contract(address).await?)
    }

    /// The stored block nearest at or below the requested height.
    pub async fn get_block(&self, height: u64) -> Result<Option<Block>, FormulaError> {
        self.depend(DependencySource::Block, "", &height.to_string(), false);
        Ok(self.storage.get_block_at_or_below(height).await?)
    }

    /// When the key was last modified at or below the env height.
    pub async fn get_date_key_modified(
        &self,
        scope: &str,
        key: &str,
    ) -> Result<Option<u64>, FormulaError> {
        self.depend(DependencySource::State, scope, key, false);

        let event = self
            .storage
            .latest_state_event(scope, key, self.block.height)
            .await?;

        Ok(event.map(|event| event.block_time_unix_ms))
    }

    /// When the key was first set.
    pub async fn get_date_key_first_set(
        &self,
        scope: &str,
        key: &str,
    ) -> Result<Option<u64>, FormulaError> {
        self.depend(DependencySource::State, scope, key, false);

        let event = self
            .storage
            .first_state_event(scope, key, None, self.block.height)
            .await?;

        Ok(event.map(|event| event.block_time_unix_ms))
    }

    /// When the key was first set to a value containing `value_match`.
    pub async fn get_date_key_first_set_with_value_match(
        &self,
        scope: &str,
        key: &str,
        value_match: &Value,
    ) -> Result<Option<u64>, FormulaError> {
        self.depend(DependencySource::State, scope, key, false);

        let event = self
            .storage
            .first_state_event(scope, key, Some(value_match), self.block.height)
            .await?;

        Ok(event.map(|event| event.block_time_unix_ms))
    }

    /// When the named transformation first appeared.
    pub async fn get_date_first_transformed(
        &self,
        scope: &str,
        name: &str,
    ) -> Result<Option<u64>, FormulaError> {
        self.depend(DependencySource::Transformation, scope, name, false);

        let transformation = self
            .storage
            .first_transformation(scope, name, self.block.height)
            .await?;

        Ok(transformation.map(|transformation| transformation.block_time_unix_ms))
    }

    /// When the named extraction first appeared.
    pub async fn get_date_first_extracted(
        &self,
        scope: &str,
        name: &str,
    ) -> Result<Option<u64>, FormulaError> {
        self.depend(DependencySource::Extraction, scope, name, false);

        let extraction = self
            .storage
            .first_extraction(scope, name, self.block.height)
            .await?;

        Ok(extraction.map(|extraction| extraction.block_time_unix_ms))
    }

    /// The latest per-grant snapshot for the pair.
    pub async fn get_feegrant_allowance(
        &self,
        granter: &str,
        grantee: &str,
    ) -> Result<Option<FeegrantAllowance>, FormulaError> {
        let key = format!("{granter}:{grantee}");
        self.depend(DependencySource::Feegrant, granter, &key, false);

        Ok(self
            .storage
            .latest_feegrant_allowance(granter, grantee, self.block.height)
            .await?)
    }

    /// The active grants on the given side of the address.
    pub async fn get_feegrant_allowances(
        &self,
        address: &str,
        role: FeegrantRole,
    ) -> Result<Vec<FeegrantAllowance>, FormulaError> {
        self.depend(DependencySource::Feegrant, address, "*", true);

        Ok(self
            .storage
            .latest_feegrant_allowances(address, role, self.block.height)
            .await?)
    }

    /// Whether the pair has an active grant.
    pub async fn has_feegrant_allowance(
        &self,
        granter: &str,
        grantee: &str,
    ) -> Result<bool, FormulaError> {
        let allowance = self.get_feegrant_allowance(granter, grantee).await?;
        Ok(allowance.is_some_and(|allowance| allowance.active))
    }

    /// The latest balance per denom for the address.
    pub async fn get_balances(
        &self,
        address: &str,
    ) -> Result<Map<String, Value>, FormulaError> {
        self.depend(DependencySource::Balance, address, "*", true);

        let balances = self
            .storage
            .latest_balances(address, self.block.height)
            .await?;

        Ok(balances
            .into_iter()
            .map(|balance| (balance.denom, Value::String(balance.balance)))
            .collect())
    }

    /// Whether the contract's code id is registered under any of the named allow-list keys.
    pub async fn contract_matches_code_id_keys(
        &self,
        address: &str,
        keys: &[&str],
    ) -> Result<bool, FormulaError> {
        let contract = self.get_contract(address).await?;
        Ok(contract.is_some_and(|contract| self.wasm_codes.matches(contract.code_id, keys)))
    }

    /// Escape hatch for set-oriented formulas. Callers must constrain by block height
    /// themselves, e.g. `block_height <= $1` with the env height as parameter.
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Value>, FormulaError> {
        self.depend(DependencySource::Query, "", sql, true);
        Ok(self.storage.query(sql, params).await?)
    }
}

/// One row of [FormulaEnv::get_transformation_matches].
#[derive(Debug, Clone, PartialEq)]
pub struct TransformationMatch {
    pub contract_address: String,
    pub name: String,
    pub block_height: u64,
    pub value: Value,
}

/// One row of [FormulaEnv::get_extractions].
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionMatch {
    pub address: String,
    pub name: String,
    pub block_height: u64,
    pub value: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::testing::MockStorage;
    use serde_json::json;

    fn at(block_height: u64, value: Value) -> Option<ValueAtHeight> {
        Some(ValueAtHeight {
            block_height,
            value,
        })
    }

    static WASM_CODES: std::sync::LazyLock<WasmCodeService> =
        std::sync::LazyLock::new(WasmCodeService::default);

    fn env_at(storage: &MockStorage, height: u64) -> FormulaEnv<'_, MockStorage> {
        FormulaEnv::new(
            storage,
            &WASM_CODES,
            Block {
                height,
                time_unix_ms: height * 6_000,
            },
        )
    }

    #[tokio::test]
    async fn test_get_returns_latest_at_or_below() {
        let storage = MockStorage::default()
            .with_state_event("wasm1c", "config", 100, json!({ "v": 1 }))
            .with_state_event("wasm1c", "config", 200, json!({ "v": 2 }));

        let env = env_at(&storage, 150);
        let value = env.get("wasm1c", "config").await.unwrap().unwrap();
        assert_eq!(value.block_height, 100);
        assert_eq!(value.value, json!({ "v": 1 }));

        let env = env_at(&storage, 300);
        let value = env.get("wasm1c", "config").await.unwrap().unwrap();
        assert_eq!(value.block_height, 200);
    }

    #[tokio::test]
    async fn test_get_hides_deleted_keys() {
        let storage = MockStorage::default()
            .with_state_event("wasm1c", "config", 100, json!({ "v": 1 }))
            .with_deleted_state_event("wasm1c", "config", 200);

        let env = env_at(&storage, 300);
        assert_eq!(env.get("wasm1c", "config").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_map_decodes_key_tails() {
        let storage = MockStorage::default()
            .with_state_event("wasm1c", "proposal:1", 100, json!("a"))
            .with_state_event("wasm1c", "proposal:2", 110, json!("b"))
            .with_state_event("wasm1c", "proposal:abc", 120, json!("c"))
            .with_state_event("wasm1c", "other", 130, json!("d"));

        let env = env_at(&storage, 200);

        let map = env
            .get_map("wasm1c", "proposal:", MapKeyType::String)
            .await
            .unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map["abc"], json!("c"));

        // Number key tails skip everything non-numeric.
        let map = env
            .get_map("wasm1c", "proposal:", MapKeyType::Number)
            .await
            .unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["1"], json!("a"));
        assert_eq!(map["2"], json!("b"));
    }

    #[tokio::test]
    async fn test_transformation_matches_pagination() {
        let storage = MockStorage::default()
            .with_transformation("wasm1c", "member:a", 100, json!(1))
            .with_transformation("wasm1c", "member:b", 100, json!(2))
            .with_transformation("wasm1c", "member:b", 150, json!(22))
            .with_transformation("wasm1c", "member:c", 100, json!(3));

        let env = env_at(&storage, 200);

        let matches = env
            .get_transformation_matches(
                Some("wasm1c"),
                "member:*",
                &MatchPagination {
                    gt: Some("member:a".to_string()),
                    lt: None,
                    limit: Some(1),
                },
            )
            .await
            .unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].name, "member:b");
        // The latest value per name is returned.
        assert_eq!(matches[0].value, json!(22));
        assert_eq!(matches[0].block_height, 150);
    }

    #[tokio::test]
    async fn test_date_key_introspection() {
        let storage = MockStorage::default()
            .with_state_event("wasm1c", "status", 100, json!({ "open": true }))
            .with_state_event("wasm1c", "status", 200, json!({ "open": false }));

        let env = env_at(&storage, 300);

        assert_eq!(
            env.get_date_key_first_set("wasm1c", "status").await.unwrap(),
            Some(100 * 6_000)
        );
        assert_eq!(
            env.get_date_key_modified("wasm1c", "status").await.unwrap(),
            Some(200 * 6_000)
        );
        assert_eq!(
            env.get_date_key_first_set_with_value_match(
                "wasm1c",
                "status",
                &json!({ "open": false })
            )
            .await
            .unwrap(),
            Some(200 * 6_000)
        );
    }

    #[tokio::test]
    async fn test_feegrant_primitives() {
        let storage = MockStorage::default()
            .with_feegrant_allowance("wasm1granter", "wasm1a", 100, true, None)
            .with_feegrant_allowance("wasm1granter", "wasm1b", 100, true, None)
            .with_feegrant_allowance("wasm1granter", "wasm1b", 200, false, None);

        let env = env_at(&storage, 300);

        // The list variant keeps active grants only, using the latest snapshot per pair.
        let granted = env
            .get_feegrant_allowances("wasm1granter", FeegrantRole::Granted)
            .await
            .unwrap();
        assert_eq!(granted.len(), 1);
        assert_eq!(granted[0].grantee, "wasm1a");

        assert!(env.has_feegrant_allowance("wasm1granter", "wasm1a").await.unwrap());
        assert!(!env.has_feegrant_allowance("wasm1granter", "wasm1b").await.unwrap());

        // Before the revocation the grant was active.
        let env = env_at(&storage, 150);
        assert!(env.has_feegrant_allowance("wasm1granter", "wasm1b").await.unwrap());
    }

    #[tokio::test]
    async fn test_extraction_and_transformation_maps() {
        let storage = MockStorage::default()
            .with_extraction("wasm1c", "proposal:1", 100, json!({ "id": 1 }))
            .with_extraction("wasm1c", "proposal:2", 110, json!({ "id": 2 }))
            .with_transformation("wasm1c", "member:alice", 100, json!("1000"));

        let env = env_at(&storage, 200);

        let extractions = env.get_extraction_map("wasm1c", "proposal:").await.unwrap();
        assert_eq!(extractions.len(), 2);
        assert_eq!(extractions["1"], json!({ "id": 1 }));

        let transformations = env
            .get_transformation_map("wasm1c", "member:")
            .await
            .unwrap();
        assert_eq!(transformations.len(), 1);
        assert_eq!(transformations["alice"], json!("1000"));
    }

    #[tokio::test]
    async fn test_contract_matches_code_id_keys() {
        let storage = MockStorage::default().with_contract(Contract {
            address: "wasm1dao".to_string(),
            code_id: 7,
            admin: None,
            creator: None,
            label: None,
            instantiated_at_block_height: 1,
            instantiated_at_block_time_unix_ms: 6_000,
            tx_hash: None,
        });
        let wasm_codes = WasmCodeService::new([("dao-core".to_string(), vec![7])]);
        let env = FormulaEnv::new(
            &storage,
            &wasm_codes,
            Block {
                height: 100,
                time_unix_ms: 600_000,
            },
        );

        assert!(env
            .contract_matches_code_id_keys("wasm1dao", &["dao-core"])
            .await
            .unwrap());
        assert!(!env
            .contract_matches_code_id_keys("wasm1dao", &["cw20"])
            .await
            .unwrap());
        assert!(!env
            .contract_matches_code_id_keys("wasm1unknown", &["dao-core"])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_balances_latest_per_denom() {
        let storage = MockStorage::default()
            .with_balance("wasm1a", "ustake", 100, "1000")
            .with_balance("wasm1a", "ustake", 200, "500")
            .with_balance("wasm1a", "uatom", 150, "7");

        let env = env_at(&storage, 300);
        let balances = env.get_balances("wasm1a").await.unwrap();
        assert_eq!(balances["ustake"], json!("500"));
        assert_eq!(balances["uatom"], json!("7"));

        let env = env_at(&storage, 120);
        let balances = env.get_balances("wasm1a").await.unwrap();
        assert_eq!(balances["ustake"], json!("1000"));
        assert_eq!(balances.get("uatom"), None);
    }

    #[test]
    fn test_pick_latest_max_height_wins() {
        let picked = pick_latest([
            at(500, json!("extraction")),
            at(700, json!("transformation")),
            at(600, json!("state")),
        ])
        .unwrap();
        assert_eq!(picked.value, json!("transformation"));
    }

    #[test]
    fn test_pick_latest_tie_favors_first_listed() {
        let picked = pick_latest([
            at(600, json!("extraction")),
            at(600, json!("transformation")),
            at(600, json!("state")),
        ])
        .unwrap();
        assert_eq!(picked.value, json!("extraction"));
    }

    #[test]
    fn test_pick_latest_skips_missing() {
        let picked = pick_latest([None, at(600, json!("state"))]).unwrap();
        assert_eq!(picked.value, json!("state"));

        assert_eq!(pick_latest([None, None]), None);
    }
}
