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
use serde_json::Value;

/// The validator's identity extraction, as emitted by the staking extractor.
pub struct Identity;

#[async_trait]
impl<S> Formula<S> for Identity
where
    S: Storage,
{
    async fn compute(
        &self,
        env: &FormulaEnv<'_, S>,
        input: &FormulaInput,
    ) -> Result<Value, FormulaError> {
        let address = input.target()?;

        let identity = env.get_extraction(address, "identity").await?;
        identity
            .map(|identity| identity.value)
            .ok_or_else(|| FormulaError::MissingInput(format!("no identity for {address}")))
    }
}
