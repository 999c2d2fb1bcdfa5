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
    env::{FormulaEnv, MapKeyType, pick_latest},
    formula::{Formula, FormulaError, FormulaInput},
    storage::Storage,
};
use async_trait::async_trait;
use serde_json::{Value, json};

/// The raw state key the contract info transformation is derived from.
const CONTRACT_INFO_KEY: &str = "contract_info";

/// The contract's info, sourced with precedence from extraction, transformation and raw state;
/// the source with the greatest height at or below the env height wins, ties favor extraction.
pub struct Info;

#[async_trait]
impl<S> Formula<S> for Info
where
    S: Storage,
{
    async fn compute(
        &self,
        env: &FormulaEnv<'_, S>,
        input: &FormulaInput,
    ) -> Result<Value, FormulaError> {
        let address = input.target()?;

        let extraction = env.get_extraction(address, "info").await?;
        let transformation = env.get_transformation_match(address, "info").await?;
        let state = env.get(address, CONTRACT_INFO_KEY).await?;

        pick_latest([extraction, transformation, state])
            .map(|picked| picked.value)
            .ok_or_else(|| FormulaError::MissingInput(format!("no contract info for {address}")))
    }
}

/// The latest value of a single raw state key, `null` when never set or deleted.
pub struct Item;

#[async_trait]
impl<S> Formula<S> for Item
where
    S: Storage,
{
    async fn compute(
        &self,
        env: &FormulaEnv<'_, S>,
        input: &FormulaInput,
    ) -> Result<Value, FormulaError> {
        let address = input.target()?;
        let key = input.str_arg("key")?;

        let value = env.get(address, key).await?;
        Ok(value.map(|value| value.value).unwrap_or(Value::Null))
    }
}

/// All latest values under a key prefix, as a map of key tails.
pub struct Items;

#[async_trait]
impl<S> Formula<S> for Items
where
    S: Storage,
{
    async fn compute(
        &self,
        env: &FormulaEnv<'_, S>,
        input: &FormulaInput,
    ) -> Result<Value, FormulaError> {
        let address = input.target()?;
        let prefix = input.opt_str_arg("prefix").unwrap_or_default();
        let key_type = match input.opt_str_arg("key_type") {
            None | Some("string") => MapKeyType::String,
            Some("number") => MapKeyType::Number,
            Some(other) => {
                return Err(FormulaError::InvalidArgument {
                    name: "key_type".to_string(),
                    reason: format!("expected string or number, got {other}"),
                });
            }
        };

        let map = env.get_map(address, prefix, key_type).await?;
        Ok(Value::Object(map))
    }
}

/// The contract's instantiation facts.
pub struct Instantiation;

#[async_trait]
impl<S> Formula<S> for Instantiation
where
    S: Storage,
{
    async fn compute(
        &self,
        env: &FormulaEnv<'_, S>,
        input: &FormulaInput,
    ) -> Result<Value, FormulaError> {
        let address = input.target()?;

        let contract = env
            .get_contract(address)
            .await?
            .ok_or_else(|| FormulaError::MissingInput(format!("unknown contract {address}")))?;

        Ok(json!({
            "address": contract.address,
            "code_id": contract.code_id,
            "admin": contract.admin,
            "creator": contract.creator,
            "label": contract.label,
            "block_height": contract.instantiated_at_block_height,
            "block_time_unix_ms": contract.instantiated_at_block_time_unix_ms,
            "tx_hash": contract.tx_hash,
        }))
    }
}
