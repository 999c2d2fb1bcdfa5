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

use crate::domain::storage::Storage;
use fastrace::trace;
use indexer_common::{
    domain::{Block, ChainState, ExportModule},
    infra::pool::postgres::PostgresPool,
};
use indoc::indoc;

/// Postgres based implementation of [Storage].
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PostgresPool,
}

impl PostgresStorage {
    /// Create a new [PostgresStorage].
    pub fn new(pool: PostgresPool) -> Self {
        Self { pool }
    }
}

impl Storage for PostgresStorage {
    #[trace]
    async fn save_block(&self, block: Block) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let query = indoc! {"
            INSERT INTO blocks (height, time_unix_ms)
            VALUES ($1, $2)
            ON CONFLICT (height) DO NOTHING
        "};
        sqlx::query(query)
            .bind(block.height as i64)
            .bind(block.time_unix_ms as i64)
            .execute(&mut *tx)
            .await?;

        let query = indoc! {"
            UPDATE chain_state
            SET latest_block_height = GREATEST(latest_block_height, $1),
                latest_block_time_unix_ms = GREATEST(latest_block_time_unix_ms, $2)
        "};
        sqlx::query(query)
            .bind(block.height as i64)
            .bind(block.time_unix_ms as i64)
            .execute(&mut *tx)
            .await?;

        tx.commit().await
    }

    #[trace]
    async fn update_chain_id(&self, chain_id: &str) -> Result<(), sqlx::Error> {
        let query = indoc! {"
            UPDATE chain_state
            SET chain_id = $1
        "};

        sqlx::query(query)
            .bind(chain_id)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    #[trace]
    async fn update_export_progress(
        &self,
        module: ExportModule,
        block_height: u64,
    ) -> Result<(), sqlx::Error> {
        let query = format!(
            "UPDATE chain_state SET {column} = GREATEST(COALESCE({column}, 0), $1)",
            column = module.column()
        );

        sqlx::query(&query)
            .bind(block_height as i64)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    #[trace]
    async fn get_chain_state(&self) -> Result<ChainState, sqlx::Error> {
        let query = indoc! {"
            SELECT
                chain_id,
                latest_block_height,
                latest_block_time_unix_ms,
                last_wasm_block_height_exported,
                last_bank_block_height_exported,
                last_feegrant_block_height_exported
            FROM chain_state
        "};

        let (
            chain_id,
            latest_block_height,
            latest_block_time_unix_ms,
            last_wasm,
            last_bank,
            last_feegrant,
        ) = sqlx::query_as::<
            _,
            (
                Option<String>,
                i64,
                i64,
                Option<i64>,
                Option<i64>,
                Option<i64>,
            ),
        >(query)
        .fetch_one(&*self.pool)
        .await?;

        Ok(ChainState {
            chain_id,
            latest_block_height: latest_block_height as u64,
            latest_block_time_unix_ms: latest_block_time_unix_ms as u64,
            last_wasm_block_height_exported: last_wasm.map(|h| h as u64),
            last_bank_block_height_exported: last_bank.map(|h| h as u64),
            last_feegrant_block_height_exported: last_feegrant.map(|h| h as u64),
        })
    }

    #[trace]
    async fn get_highest_block(&self) -> Result<Option<Block>, sqlx::Error> {
        let query = indoc! {"
            SELECT height, time_unix_ms
            FROM blocks
            ORDER BY height DESC
            LIMIT 1
        "};

        let block = sqlx::query_as::<_, (i64, i64)>(query)
            .fetch_optional(&*self.pool)
            .await?
            .map(|(height, time_unix_ms)| Block {
                height: height as u64,
                time_unix_ms: time_unix_ms as u64,
            });

        Ok(block)
    }
}
