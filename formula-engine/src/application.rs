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
    formula::{Computation, FormulaError, FormulaInput, FormulaScope},
    registry::FormulaRegistries,
    storage::Storage,
};
use indexer_common::domain::{Block, WasmCodeService};
use log::debug;
use std::sync::Arc;

/// The computational entry point the HTTP layer calls: resolve the named formula in the
/// per-scope registries, validate the input, compute at the given block, and return the value
/// with its dependency set.
pub struct Engine<S> {
    storage: S,
    wasm_codes: Arc<WasmCodeService>,
    registries: Arc<FormulaRegistries<S>>,
}

impl<S> Engine<S>
where
    S: Storage,
{
    /// Create a new [Engine] with the built-in formula catalog.
    pub fn new(storage: S, wasm_codes: Arc<WasmCodeService>) -> Self {
        Self::with_registries(storage, wasm_codes, Arc::new(FormulaRegistries::default()))
    }

    pub fn with_registries(
        storage: S,
        wasm_codes: Arc<WasmCodeService>,
        registries: Arc<FormulaRegistries<S>>,
    ) -> Self {
        Self {
            storage,
            wasm_codes,
            registries,
        }
    }

    /// Compute the named formula as of the given block.
    pub async fn compute(
        &self,
        scope: FormulaScope,
        name: &str,
        input: FormulaInput,
        block: Block,
    ) -> Result<Computation, FormulaError> {
        let formula = self
            .registries
            .get(scope, name)
            .ok_or_else(|| FormulaError::NotFound {
                scope,
                name: name.to_string(),
            })?;

        if scope.takes_target() {
            let target = input
                .target
                .as_deref()
                .ok_or_else(|| FormulaError::InvalidArgument {
                    name: "address".to_string(),
                    reason: "required for this scope".to_string(),
                })?;

            bech32::decode(target).map_err(|error| FormulaError::InvalidArgument {
                name: "address".to_string(),
                reason: format!("not a bech32 address: {error}"),
            })?;
        }

        let env = FormulaEnv::new(&self.storage, &self.wasm_codes, block);
        let value = formula.compute(&env, &input).await?;
        let dependencies = env.into_dependencies();

        debug!(
            scope:% = scope,
            name,
            block_height = block.height,
            dependencies = dependencies.len();
            "formula computed"
        );

        Ok(Computation {
            value,
            dependencies,
            dynamic: formula.dynamic(),
        })
    }
}
