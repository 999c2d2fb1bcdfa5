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
    storage::Storage,
};
use async_trait::async_trait;
use serde_json::{Value, json};

/// The stored block nearest at or below the requested height (default: the env height).
pub struct ChainBlock;

#[async_trait]
impl<S> Formula<S> for ChainBlock
where
    S: Storage,
{
    async fn compute(
        &self,
        env: &FormulaEnv<'_, S>,
        input: &FormulaInput,
    ) -> Result<Value, FormulaError> {
        let height = input
            .opt_u64_arg("height")?
            .unwrap_or(env.block().height);

        let block = env
            .get_block(height)
            .await?
            .ok_or_else(|| FormulaError::MissingInput(format!("no block at or below {height}")))?;

        Ok(json!({
            "height": block.height,
            "time_unix_ms": block.time_unix_ms,
        }))
    }
}

/// Row counts over the event log at the env height, via the SQL escape hatch.
pub struct ChainStats;

#[async_trait]
impl<S> Formula<S> for ChainStats
where
    S: Storage,
{
    async fn compute(
        &self,
        env: &FormulaEnv<'_, S>,
        _input: &FormulaInput,
    ) -> Result<Value, FormulaError> {
        let height = json!(env.block().height);

        let state_events = env
            .query(
                "SELECT count(*) AS count FROM wasm_state_events WHERE block_height <= $1",
                &[height.clone()],
            )
            .await?;
        let extractions = env
            .query(
                "SELECT count(*) AS count FROM extractions WHERE block_height <= $1",
                &[height],
            )
            .await?;

        let count = |rows: &[Value]| {
            rows.first()
                .and_then(|row| row["count"].as_i64())
                .unwrap_or_default()
        };

        Ok(json!({
            "state_events": count(&state_events),
            "extractions": count(&extractions),
        }))
    }
}
