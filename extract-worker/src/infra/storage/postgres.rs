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
    domain::{
        BankDenomBalance, BankStateEvent, Block, Contract, Extraction, FeegrantAllowance,
        WasmStateEvent, WasmStateEventTransformation,
    },
    infra::pool::postgres::PostgresPool,
};
use indoc::indoc;
use sqlx::{Postgres, types::Json};

type Tx = sqlx::Transaction<'static, Postgres>;

/// Postgres based implementation of [Storage]. Every event upsert runs in a transaction which
/// co-inserts the `blocks` row, so invariant "every event has a corresponding block" holds even
/// when jobs are replayed out of order.
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

async fn insert_block(block_height: u64, block_time_unix_ms: u64, tx: &mut Tx) -> Result<(), sqlx::Error> {
    let query = indoc! {"
        INSERT INTO blocks (height, time_unix_ms)
        VALUES ($1, $2)
        ON CONFLICT (height) DO NOTHING
    "};

    sqlx::query(query)
        .bind(block_height as i64)
        .bind(block_time_unix_ms as i64)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

impl Storage for PostgresStorage {
    #[trace]
    async fn upsert_wasm_state_event(&self, event: &WasmStateEvent) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        insert_block(event.block_height, event.block_time_unix_ms, &mut tx).await?;

        let query = indoc! {"
            INSERT INTO wasm_state_events (
                contract_address,
                key,
                value_json,
                deleted,
                block_height,
                block_time_unix_ms
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (contract_address, key, block_height)
            DO UPDATE SET
                value_json = EXCLUDED.value_json,
                deleted = EXCLUDED.deleted,
                block_time_unix_ms = EXCLUDED.block_time_unix_ms
        "};

        sqlx::query(query)
            .bind(&event.contract_address)
            .bind(&event.key)
            .bind(Json(&event.value_json))
            .bind(event.deleted)
            .bind(event.block_height as i64)
            .bind(event.block_time_unix_ms as i64)
            .execute(&mut *tx)
            .await?;

        tx.commit().await
    }

    #[trace]
    async fn upsert_transformation(
        &self,
        transformation: &WasmStateEventTransformation,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        insert_block(
            transformation.block_height,
            transformation.block_time_unix_ms,
            &mut tx,
        )
        .await?;

        let query = indoc! {"
            INSERT INTO wasm_state_event_transformations (
                contract_address,
                name,
                value,
                block_height,
                block_time_unix_ms
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (contract_address, name, block_height)
            DO UPDATE SET
                value = EXCLUDED.value,
                block_time_unix_ms = EXCLUDED.block_time_unix_ms
        "};

        sqlx::query(query)
            .bind(&transformation.contract_address)
            .bind(&transformation.name)
            .bind(Json(&transformation.value))
            .bind(transformation.block_height as i64)
            .bind(transformation.block_time_unix_ms as i64)
            .execute(&mut *tx)
            .await?;

        tx.commit().await
    }

    #[trace]
    async fn upsert_extraction(&self, extraction: &Extraction) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        insert_block(extraction.block_height, extraction.block_time_unix_ms, &mut tx).await?;

        let query = indoc! {"
            INSERT INTO extractions (
                address,
                name,
                data,
                block_height,
                block_time_unix_ms,
                tx_hash
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (address, name, block_height)
            DO UPDATE SET
                data = EXCLUDED.data,
                block_time_unix_ms = EXCLUDED.block_time_unix_ms,
                tx_hash = EXCLUDED.tx_hash
        "};

        sqlx::query(query)
            .bind(&extraction.address)
            .bind(&extraction.name)
            .bind(Json(&extraction.data))
            .bind(extraction.block_height as i64)
            .bind(extraction.block_time_unix_ms as i64)
            .bind(&extraction.tx_hash)
            .execute(&mut *tx)
            .await?;

        tx.commit().await
    }

    #[trace]
    async fn upsert_bank_state_event(&self, event: &BankStateEvent) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        insert_block(event.block_height, event.block_time_unix_ms, &mut tx).await?;

        let query = indoc! {"
            INSERT INTO bank_state_events (
                address,
                denom,
                balance,
                block_height,
                block_time_unix_ms
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (address, denom, block_height)
            DO UPDATE SET
                balance = EXCLUDED.balance,
                block_time_unix_ms = EXCLUDED.block_time_unix_ms
        "};

        sqlx::query(query)
            .bind(&event.address)
            .bind(&event.denom)
            .bind(&event.balance)
            .bind(event.block_height as i64)
            .bind(event.block_time_unix_ms as i64)
            .execute(&mut *tx)
            .await?;

        tx.commit().await
    }

    #[trace]
    async fn upsert_bank_denom_balance(
        &self,
        balance: &BankDenomBalance,
    ) -> Result<(), sqlx::Error> {
        // Conditional block-height guard: out-of-order jobs cannot regress the projection.
        let query = indoc! {"
            INSERT INTO bank_denom_balances (
                address,
                denom,
                balance,
                block_height,
                block_time_unix_ms
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (address, denom)
            DO UPDATE SET
                balance = EXCLUDED.balance,
                block_height = EXCLUDED.block_height,
                block_time_unix_ms = EXCLUDED.block_time_unix_ms
            WHERE bank_denom_balances.block_height < EXCLUDED.block_height
        "};

        sqlx::query(query)
            .bind(&balance.address)
            .bind(&balance.denom)
            .bind(&balance.balance)
            .bind(balance.block_height as i64)
            .bind(balance.block_time_unix_ms as i64)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    #[trace]
    async fn upsert_feegrant_allowance(
        &self,
        allowance: &FeegrantAllowance,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        insert_block(allowance.block_height, allowance.block_time_unix_ms, &mut tx).await?;

        let query = indoc! {"
            INSERT INTO feegrant_allowances (
                granter,
                grantee,
                block_height,
                block_time_unix_ms,
                active,
                allowance_data,
                parsed_amount,
                parsed_denom,
                parsed_allowance_type,
                parsed_expiration_unix_ms,
                tx_hash
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (granter, grantee, block_height)
            DO UPDATE SET
                block_time_unix_ms = EXCLUDED.block_time_unix_ms,
                active = EXCLUDED.active,
                allowance_data = EXCLUDED.allowance_data,
                parsed_amount = EXCLUDED.parsed_amount,
                parsed_denom = EXCLUDED.parsed_denom,
                parsed_allowance_type = EXCLUDED.parsed_allowance_type,
                parsed_expiration_unix_ms = EXCLUDED.parsed_expiration_unix_ms,
                tx_hash = EXCLUDED.tx_hash
        "};

        sqlx::query(query)
            .bind(&allowance.granter)
            .bind(&allowance.grantee)
            .bind(allowance.block_height as i64)
            .bind(allowance.block_time_unix_ms as i64)
            .bind(allowance.active)
            .bind(Json(&allowance.allowance_data))
            .bind(&allowance.parsed_amount)
            .bind(&allowance.parsed_denom)
            .bind(&allowance.parsed_allowance_type)
            .bind(allowance.parsed_expiration_unix_ms.map(|ms| ms as i64))
            .bind(&allowance.tx_hash)
            .execute(&mut *tx)
            .await?;

        tx.commit().await
    }

    #[trace]
    async fn upsert_contract(&self, contract: &Contract) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        insert_block(
            contract.instantiated_at_block_height,
            contract.instantiated_at_block_time_unix_ms,
            &mut tx,
        )
        .await?;

        // Instantiation facts are immutable; replays leave the first row untouched.
        let query = indoc! {"
            INSERT INTO contracts (
                address,
                code_id,
                admin,
                creator,
                label,
                instantiated_at_block_height,
                instantiated_at_block_time_unix_ms,
                tx_hash
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (address) DO NOTHING
        "};

        sqlx::query(query)
            .bind(&contract.address)
            .bind(contract.code_id as i64)
            .bind(&contract.admin)
            .bind(&contract.creator)
            .bind(&contract.label)
            .bind(contract.instantiated_at_block_height as i64)
            .bind(contract.instantiated_at_block_time_unix_ms as i64)
            .bind(&contract.tx_hash)
            .execute(&mut *tx)
            .await?;

        tx.commit().await
    }

    #[trace]
    async fn get_contract_code_id(&self, address: &str) -> Result<Option<u64>, sqlx::Error> {
        let query = indoc! {"
            SELECT code_id
            FROM contracts
            WHERE address = $1
        "};

        let code_id = sqlx::query_scalar::<_, i64>(query)
            .bind(address)
            .fetch_optional(&*self.pool)
            .await?;

        Ok(code_id.map(|code_id| code_id as u64))
    }

    #[trace]
    async fn save_block(&self, block: Block) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        insert_block(block.height, block.time_unix_ms, &mut tx).await?;

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
}
