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

use indexer_common::domain::{Block, ChainState, ExportModule};

/// Storage abstraction for the chain indexer. The chain indexer writes only `blocks` and
/// `chain_state`; event tables belong to the extract worker.
#[trait_variant::make(Send)]
pub trait Storage
where
    Self: Clone + Send + Sync + 'static,
{
    /// Upsert the given block and advance the latest-block high-water marks monotonically.
    async fn save_block(&self, block: Block) -> Result<(), sqlx::Error>;

    /// Set the chain id once known; an existing different value is overwritten.
    async fn update_chain_id(&self, chain_id: &str) -> Result<(), sqlx::Error>;

    /// Advance the given module's export high-water mark monotonically.
    async fn update_export_progress(
        &self,
        module: ExportModule,
        block_height: u64,
    ) -> Result<(), sqlx::Error>;

    /// The current indexing state.
    async fn get_chain_state(&self) -> Result<ChainState, sqlx::Error>;

    /// The highest stored block, if any; used to resume iteration.
    async fn get_highest_block(&self) -> Result<Option<Block>, sqlx::Error>;
}
