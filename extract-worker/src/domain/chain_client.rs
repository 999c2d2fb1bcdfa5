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

use indexer_common::error::BoxError;
use thiserror::Error;

/// ABCI query access to the chain, used by extractors to enrich trace items with state the
/// events do not carry.
#[trait_variant::make(Send)]
pub trait ChainClient
where
    Self: Clone + Send + Sync + 'static,
{
    /// The instantiation facts of the given contract, `None` if it does not exist.
    async fn contract_info(&self, address: &str) -> Result<Option<ContractInfo>, ChainClientError>;

    /// The balance of the given address and denom, as a decimal string, at the given height.
    async fn balance(
        &self,
        address: &str,
        denom: &str,
        height: u64,
    ) -> Result<String, ChainClientError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractInfo {
    pub code_id: u64,
    pub admin: Option<String>,
    pub creator: Option<String>,
    pub label: Option<String>,
}

#[derive(Debug, Error)]
#[error("chain query failed")]
pub struct ChainClientError(#[source] pub BoxError);

impl ChainClientError {
    pub fn new(error: impl Into<BoxError>) -> Self {
        Self(error.into())
    }
}
