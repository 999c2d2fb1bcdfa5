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
    env::FormulaEnv,
    formula::{Formula, FormulaError, FormulaInput},
    storage::{FeegrantRole, Storage},
};
use async_trait::async_trait;
use serde_json::{Value, json};

/// The latest per-denom balances of the account.
pub struct Balances;

#[async_trait]
impl<S> Formula<S> for Balances
where
    S: Storage,
{
    async fn compute(
        &self,
        env: &FormulaEnv<'_, S>,
        input: &FormulaInput,
    ) -> Result<Value, FormulaError> {
        let address = input.target()?;
        let balances = env.get_balances(address).await?;
        Ok(Value::Object(balances))
    }
}

/// The account's active fee allowances, granted or received. Dynamic: grants with an
/// expiration before the env block time are filtered out.
pub struct FeegrantAllowances;

#[async_trait]
impl<S> Formula<S> for FeegrantAllowances
where
    S: Storage,
{
    fn dynamic(&self) -> bool {
        true
    }

    async fn compute(
        &self,
        env: &FormulaEnv<'_, S>,
        input: &FormulaInput,
    ) -> Result<Value, FormulaError> {
        let address = input.target()?;
        let role = match input.opt_str_arg("type") {
            None | Some("granted") => FeegrantRole::Granted,
            Some("received") => FeegrantRole::Received,
            Some(other) => {
                return Err(FormulaError::InvalidArgument {
                    name: "type".to_string(),
                    reason: format!("expected granted or received, got {other}"),
                });
            }
        };

        let block_time_unix_ms = env.block().time_unix_ms;
        let allowances = env
            .get_feegrant_allowances(address, role)
            .await?
            .into_iter()
            .filter(|allowance| {
                allowance
                    .parsed_expiration_unix_ms
                    .is_none_or(|expiration| expiration > block_time_unix_ms)
            })
            .map(|allowance| {
                json!({
                    "granter": allowance.granter,
                    "grantee": allowance.grantee,
                    "block_height": allowance.block_height,
                    "allowance": allowance.allowance_data,
                    "amount": allowance.parsed_amount,
                    "denom": allowance.parsed_denom,
                    "allowance_type": allowance.parsed_allowance_type,
                    "expiration_unix_ms": allowance.parsed_expiration_unix_ms,
                })
            })
            .collect::<Vec<_>>();

        Ok(Value::Array(allowances))
    }
}
