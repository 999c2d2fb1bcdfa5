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

use crate::domain::storage::{FeegrantRole, MatchPagination, Storage, pattern_to_like};
use fastrace::trace;
use indexer_common::{
    domain::{
        BankStateEvent, Block, Contract, Extraction, FeegrantAllowance, WasmStateEvent,
        WasmStateEventTransformation,
    },
    infra::pool::postgres::PostgresPool,
};
use indoc::{formatdoc, indoc};
use serde_json::Value;
use sqlx::{
    Postgres,
    query::QueryAs,
    postgres::PgArguments,
    types::Json,
};

/// Postgres based implementation of [Storage]: point-in-time reads via height-bounded
/// `DISTINCT ON` latest-per-key queries.
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

/// Escape `LIKE` metacharacters in a literal prefix.
fn escape_like(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '%' => escaped.push_str("\\%"),
            '_' => escaped.push_str("\\_"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Ascending by key unless only `lt` is given, then descending.
fn key_direction(pagination: &MatchPagination) -> &'static str {
    if pagination.gt.is_none() && pagination.lt.is_some() {
        "DESC"
    } else {
        "ASC"
    }
}

type StateEventRow = (String, String, Json<Value>, bool, i64, i64);

fn state_event_from(row: StateEventRow) -> WasmStateEvent {
    let (contract_address, key, Json(value_json), deleted, block_height, block_time_unix_ms) = row;
    WasmStateEvent {
        contract_address,
        key,
        value_json,
        deleted,
        block_height: block_height as u64,
        block_time_unix_ms: block_time_unix_ms as u64,
    }
}

type TransformationRow = (String, String, Json<Value>, i64, i64);

fn transformation_from(row: TransformationRow) -> WasmStateEventTransformation {
    let (contract_address, name, Json(value), block_height, block_time_unix_ms) = row;
    WasmStateEventTransformation {
        contract_address,
        name,
        value,
        block_height: block_height as u64,
        block_time_unix_ms: block_time_unix_ms as u64,
    }
}

type ExtractionRow = (String, String, Json<Value>, i64, i64, Option<String>);

fn extraction_from(row: ExtractionRow) -> Extraction {
    let (address, name, Json(data), block_height, block_time_unix_ms, tx_hash) = row;
    Extraction {
        address,
        name,
        data,
        block_height: block_height as u64,
        block_time_unix_ms: block_time_unix_ms as u64,
        tx_hash,
    }
}

type FeegrantRow = (
    String,
    String,
    i64,
    i64,
    bool,
    Json<Value>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<i64>,
    Option<String>,
);

fn feegrant_from(row: FeegrantRow) -> FeegrantAllowance {
    let (
        granter,
        grantee,
        block_height,
        block_time_unix_ms,
        active,
        Json(allowance_data),
        parsed_amount,
        parsed_denom,
        parsed_allowance_type,
        parsed_expiration_unix_ms,
        tx_hash,
    ) = row;
    FeegrantAllowance {
        granter,
        grantee,
        block_height: block_height as u64,
        block_time_unix_ms: block_time_unix_ms as u64,
        active,
        allowance_data,
        parsed_amount,
        parsed_denom,
        parsed_allowance_type,
        parsed_expiration_unix_ms: parsed_expiration_unix_ms.map(|ms| ms as u64),
        tx_hash,
    }
}

const FEEGRANT_COLUMNS: &str = indoc! {"
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
"};

impl Storage for PostgresStorage {
    #[trace]
    async fn latest_state_event(
        &self,
        contract_address: &str,
        key: &str,
        max_height: u64,
    ) -> Result<Option<WasmStateEvent>, sqlx::Error> {
        let query = indoc! {"
            SELECT contract_address, key, value_json, deleted, block_height, block_time_unix_ms
            FROM wasm_state_events
            WHERE contract_address = $1
            AND key = $2
            AND block_height <= $3
            ORDER BY block_height DESC
            LIMIT 1
        "};

        let row = sqlx::query_as::<_, StateEventRow>(query)
            .bind(contract_address)
            .bind(key)
            .bind(max_height as i64)
            .fetch_optional(&*self.pool)
            .await?;

        Ok(row.map(state_event_from))
    }

    #[trace]
    async fn latest_state_events_by_prefix(
        &self,
        contract_address: &str,
        key_prefix: &str,
        max_height: u64,
    ) -> Result<Vec<WasmStateEvent>, sqlx::Error> {
        let query = indoc! {"
            SELECT DISTINCT ON (key)
                contract_address, key, value_json, deleted, block_height, block_time_unix_ms
            FROM wasm_state_events
            WHERE contract_address = $1
            AND key LIKE $2
            AND block_height <= $3
            ORDER BY key, block_height DESC
        "};

        let rows = sqlx::query_as::<_, StateEventRow>(query)
            .bind(contract_address)
            .bind(format!("{}%", escape_like(key_prefix)))
            .bind(max_height as i64)
            .fetch_all(&*self.pool)
            .await?;

        Ok(rows.into_iter().map(state_event_from).collect())
    }

    #[trace]
    async fn first_state_event(
        &self,
        contract_address: &str,
        key: &str,
        value_match: Option<&Value>,
        max_height: u64,
    ) -> Result<Option<WasmStateEvent>, sqlx::Error> {
        let query = indoc! {"
            SELECT contract_address, key, value_json, deleted, block_height, block_time_unix_ms
            FROM wasm_state_events
            WHERE contract_address = $1
            AND key = $2
            AND block_height <= $3
            AND ($4::jsonb IS NULL OR value_json @> $4::jsonb)
            ORDER BY block_height ASC
            LIMIT 1
        "};

        let row = sqlx::query_as::<_, StateEventRow>(query)
            .bind(contract_address)
            .bind(key)
            .bind(max_height as i64)
            .bind(value_match.map(Json))
            .fetch_optional(&*self.pool)
            .await?;

        Ok(row.map(state_event_from))
    }

    #[trace]
    async fn latest_transformation(
        &self,
        contract_address: &str,
        name: &str,
        max_height: u64,
    ) -> Result<Option<WasmStateEventTransformation>, sqlx::Error> {
        let query = indoc! {"
            SELECT contract_address, name, value, block_height, block_time_unix_ms
            FROM wasm_state_event_transformations
            WHERE contract_address = $1
            AND name = $2
            AND block_height <= $3
            ORDER BY block_height DESC
            LIMIT 1
        "};

        let row = sqlx::query_as::<_, TransformationRow>(query)
            .bind(contract_address)
            .bind(name)
            .bind(max_height as i64)
            .fetch_optional(&*self.pool)
            .await?;

        Ok(row.map(transformation_from))
    }

    #[trace]
    async fn latest_transformations_matching(
        &self,
        contract_address: Option<&str>,
        name_pattern: &str,
        max_height: u64,
        pagination: &MatchPagination,
    ) -> Result<Vec<WasmStateEventTransformation>, sqlx::Error> {
        let query = formatdoc! {"
            SELECT DISTINCT ON (contract_address, name)
                contract_address, name, value, block_height, block_time_unix_ms
            FROM wasm_state_event_transformations
            WHERE ($1::text IS NULL OR contract_address = $1)
            AND name LIKE $2
            AND block_height <= $3
            AND ($4::text IS NULL OR name > $4)
            AND ($5::text IS NULL OR name < $5)
            ORDER BY contract_address, name {direction}, block_height DESC
            LIMIT $6
            ",
            direction = key_direction(pagination)
        };

        let rows = sqlx::query_as::<_, TransformationRow>(&query)
            .bind(contract_address)
            .bind(pattern_to_like(name_pattern))
            .bind(max_height as i64)
            .bind(&pagination.gt)
            .bind(&pagination.lt)
            .bind(pagination.limit.map(|limit| limit as i64))
            .fetch_all(&*self.pool)
            .await?;

        Ok(rows.into_iter().map(transformation_from).collect())
    }

    #[trace]
    async fn first_transformation(
        &self,
        contract_address: &str,
        name: &str,
        max_height: u64,
    ) -> Result<Option<WasmStateEventTransformation>, sqlx::Error> {
        let query = indoc! {"
            SELECT contract_address, name, value, block_height, block_time_unix_ms
            FROM wasm_state_event_transformations
            WHERE contract_address = $1
            AND name = $2
            AND block_height <= $3
            ORDER BY block_height ASC
            LIMIT 1
        "};

        let row = sqlx::query_as::<_, TransformationRow>(query)
            .bind(contract_address)
            .bind(name)
            .bind(max_height as i64)
            .fetch_optional(&*self.pool)
            .await?;

        Ok(row.map(transformation_from))
    }

    #[trace]
    async fn latest_extraction(
        &self,
        address: &str,
        name: &str,
        max_height: u64,
    ) -> Result<Option<Extraction>, sqlx::Error> {
        let query = indoc! {"
            SELECT address, name, data, block_height, block_time_unix_ms, tx_hash
            FROM extractions
            WHERE address = $1
            AND name = $2
            AND block_height <= $3
            ORDER BY block_height DESC
            LIMIT 1
        "};

        let row = sqlx::query_as::<_, ExtractionRow>(query)
            .bind(address)
            .bind(name)
            .bind(max_height as i64)
            .fetch_optional(&*self.pool)
            .await?;

        Ok(row.map(extraction_from))
    }

    #[trace]
    async fn latest_extractions_matching(
        &self,
        address: Option<&str>,
        name_pattern: &str,
        max_height: u64,
        pagination: &MatchPagination,
    ) -> Result<Vec<Extraction>, sqlx::Error> {
        let query = formatdoc! {"
            SELECT DISTINCT ON (address, name)
                address, name, data, block_height, block_time_unix_ms, tx_hash
            FROM extractions
            WHERE ($1::text IS NULL OR address = $1)
            AND name LIKE $2
            AND block_height <= $3
            AND ($4::text IS NULL OR name > $4)
            AND ($5::text IS NULL OR name < $5)
            ORDER BY address, name {direction}, block_height DESC
            LIMIT $6
            ",
            direction = key_direction(pagination)
        };

        let rows = sqlx::query_as::<_, ExtractionRow>(&query)
            .bind(address)
            .bind(pattern_to_like(name_pattern))
            .bind(max_height as i64)
            .bind(&pagination.gt)
            .bind(&pagination.lt)
            .bind(pagination.limit.map(|limit| limit as i64))
            .fetch_all(&*self.pool)
            .await?;

        Ok(rows.into_iter().map(extraction_from).collect())
    }

    #[trace]
    async fn first_extraction(
        &self,
        address: &str,
        name: &str,
        max_height: u64,
    ) -> Result<Option<Extraction>, sqlx::Error> {
        let query = indoc! {"
            SELECT address, name, data, block_height, block_time_unix_ms, tx_hash
            FROM extractions
            WHERE address = $1
            AND name = $2
            AND block_height <= $3
            ORDER BY block_height ASC
            LIMIT 1
        "};

        let row = sqlx::query_as::<_, ExtractionRow>(query)
            .bind(address)
            .bind(name)
            .bind(max_height as i64)
            .fetch_optional(&*self.pool)
            .await?;

        Ok(row.map(extraction_from))
    }

    #[trace]
    async fn get_contract(&self, address: &str) -> Result<Option<Contract>, sqlx::Error> {
        let query = indoc! {"
            SELECT
                address,
                code_id,
                admin,
                creator,
                label,
                instantiated_at_block_height,
                instantiated_at_block_time_unix_ms,
                tx_hash
            FROM contracts
            WHERE address = $1
        "};

        let row = sqlx::query_as::<
            _,
            (
                String,
                i64,
                Option<String>,
                Option<String>,
                Option<String>,
                i64,
                i64,
                Option<String>,
            ),
        >(query)
        .bind(address)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(
            |(address, code_id, admin, creator, label, height, time, tx_hash)| Contract {
                address,
                code_id: code_id as u64,
                admin,
                creator,
                label,
                instantiated_at_block_height: height as u64,
                instantiated_at_block_time_unix_ms: time as u64,
                tx_hash,
            },
        ))
    }

    #[trace]
    async fn get_block_at_or_below(&self, height: u64) -> Result<Option<Block>, sqlx::Error> {
        let query = indoc! {"
            SELECT height, time_unix_ms
            FROM blocks
            WHERE height <= $1
            ORDER BY height DESC
            LIMIT 1
        "};

        let row = sqlx::query_as::<_, (i64, i64)>(query)
            .bind(height as i64)
            .fetch_optional(&*self.pool)
            .await?;

        Ok(row.map(|(height, time_unix_ms)| Block {
            height: height as u64,
            time_unix_ms: time_unix_ms as u64,
        }))
    }

    #[trace]
    async fn latest_feegrant_allowance(
        &self,
        granter: &str,
        grantee: &str,
        max_height: u64,
    ) -> Result<Option<FeegrantAllowance>, sqlx::Error> {
        let query = formatdoc! {"
            SELECT {columns}
            FROM feegrant_allowances
            WHERE granter = $1
            AND grantee = $2
            AND block_height <= $3
            ORDER BY block_height DESC
            LIMIT 1
            ",
            columns = FEEGRANT_COLUMNS
        };

        let row = sqlx::query_as::<_, FeegrantRow>(&query)
            .bind(granter)
            .bind(grantee)
            .bind(max_height as i64)
            .fetch_optional(&*self.pool)
            .await?;

        Ok(row.map(feegrant_from))
    }

    #[trace]
    async fn latest_feegrant_allowances(
        &self,
        address: &str,
        role: FeegrantRole,
        max_height: u64,
    ) -> Result<Vec<FeegrantAllowance>, sqlx::Error> {
        let side = match role {
            FeegrantRole::Granted => "granter",
            FeegrantRole::Received => "grantee",
        };
        let query = formatdoc! {"
            SELECT * FROM (
                SELECT DISTINCT ON (granter, grantee) {columns}
                FROM feegrant_allowances
                WHERE {side} = $1
                AND block_height <= $2
                ORDER BY granter, grantee, block_height DESC
            ) latest
            WHERE latest.active
            ",
            columns = FEEGRANT_COLUMNS,
            side = side
        };

        let rows = sqlx::query_as::<_, FeegrantRow>(&query)
            .bind(address)
            .bind(max_height as i64)
            .fetch_all(&*self.pool)
            .await?;

        Ok(rows.into_iter().map(feegrant_from).collect())
    }

    #[trace]
    async fn latest_balances(
        &self,
        address: &str,
        max_height: u64,
    ) -> Result<Vec<BankStateEvent>, sqlx::Error> {
        let query = indoc! {"
            SELECT DISTINCT ON (denom)
                address, denom, balance, block_height, block_time_unix_ms
            FROM bank_state_events
            WHERE address = $1
            AND block_height <= $2
            ORDER BY denom, block_height DESC
        "};

        let rows = sqlx::query_as::<_, (String, String, String, i64, i64)>(query)
            .bind(address)
            .bind(max_height as i64)
            .fetch_all(&*self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(
                |(address, denom, balance, block_height, block_time_unix_ms)| BankStateEvent {
                    address,
                    denom,
                    balance,
                    block_height: block_height as u64,
                    block_time_unix_ms: block_time_unix_ms as u64,
                },
            )
            .collect())
    }

    #[trace]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Value>, sqlx::Error> {
        // Wrap the caller's query so each row comes back as one JSON object, whatever its
        // column shape.
        let wrapped = format!("SELECT to_jsonb(q) FROM ({sql}) AS q");

        let mut query = sqlx::query_as::<_, (Json<Value>,)>(&wrapped);
        for param in params {
            query = bind_value(query, param);
        }

        let rows = query.fetch_all(&*self.pool).await?;
        Ok(rows.into_iter().map(|(Json(row),)| row).collect())
    }
}

fn bind_value<'q>(
    query: QueryAs<'q, Postgres, (Json<Value>,), PgArguments>,
    param: &'q Value,
) -> QueryAs<'q, Postgres, (Json<Value>,), PgArguments> {
    match param {
        Value::Null => query.bind(None::<String>),
        Value::Bool(value) => query.bind(*value),
        Value::Number(value) => match value.as_i64() {
            Some(value) => query.bind(value),
            None => query.bind(value.as_f64().unwrap_or_default()),
        },
        Value::String(value) => query.bind(value.as_str()),
        value => query.bind(Json(value)),
    }
}
