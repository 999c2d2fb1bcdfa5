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

use indexer_common::domain::{
    BankDenomBalance, BankStateEvent, Block, Contract, Extraction, FeegrantAllowance,
    WasmStateEvent, WasmStateEventTransformation,
};

/// Write side of the event store. The extract worker is the exclusive writer of all event
/// tables. Every upsert coalesces on its `(scope, key, block_height)` unique key — the last
/// write for a key within a block wins — and co-inserts the `blocks` row so every event has a
/// corresponding block.
#[trait_variant::make(Send)]
pub trait Storage
where
    Self: Clone + Send + Sync + 'static,
{
    async fn upsert_wasm_state_event(&self, event: &WasmStateEvent) -> Result<(), sqlx::Error>;

    async fn upsert_transformation(
        &self,
        transformation: &WasmStateEventTransformation,
    ) -> Result<(), sqlx::Error>;

    async fn upsert_extraction(&self, extraction: &Extraction) -> Result<(), sqlx::Error>;

    async fn upsert_bank_state_event(&self, event: &BankStateEvent) -> Result<(), sqlx::Error>;

    /// Guarded projection update: the row is only written if the incoming block height strictly
    /// exceeds the stored one, so out-of-order jobs cannot regress it.
    async fn upsert_bank_denom_balance(
        &self,
        balance: &BankDenomBalance,
    ) -> Result<(), sqlx::Error>;

    async fn upsert_feegrant_allowance(
        &self,
        allowance: &FeegrantAllowance,
    ) -> Result<(), sqlx::Error>;

    async fn upsert_contract(&self, contract: &Contract) -> Result<(), sqlx::Error>;

    /// The code id of the given contract, if it is known.
    async fn get_contract_code_id(&self, address: &str) -> Result<Option<u64>, sqlx::Error>;

    /// Upsert the given block and advance the latest-block high-water marks monotonically.
    async fn save_block(&self, block: Block) -> Result<(), sqlx::Error>;
}
