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
    extractor::{ExtractError, Extractor, ExtractorEnv, JobItems, PersistedEvent},
    extractors::str_field,
    storage::Storage,
};
use async_trait::async_trait;
use cosmrs::proto::cosmos::feegrant::v1beta1::{
    AllowedMsgAllowance, BasicAllowance, PeriodicAllowance,
};
use indexer_common::domain::FeegrantAllowance;
use prost::Message;
use serde_json::Value;

const BASIC_ALLOWANCE: &str = "/cosmos.feegrant.v1beta1.BasicAllowance";
const PERIODIC_ALLOWANCE: &str = "/cosmos.feegrant.v1beta1.PeriodicAllowance";
const ALLOWED_MSG_ALLOWANCE: &str = "/cosmos.feegrant.v1beta1.AllowedMsgAllowance";

/// Persists per-grant allowance snapshots. Allowance protobufs are decoded best-effort; on
/// failure the `parsed_*` fields stay empty while the raw grant is kept.
pub struct FeegrantExtractor<S, C> {
    env: ExtractorEnv<S, C>,
}

impl<S, C> FeegrantExtractor<S, C> {
    pub fn new(env: ExtractorEnv<S, C>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl<S, C> Extractor for FeegrantExtractor<S, C>
where
    S: Storage,
    C: Send + Sync,
{
    async fn extract(&self, data: &Value) -> Result<Vec<PersistedEvent>, ExtractError> {
        let JobItems { items } = JobItems::from_data(data)?;
        let block = self.env.block;
        let mut events = Vec::with_capacity(items.len());

        for item in items {
            let granter = str_field(&item.value, "granter")?;
            let grantee = str_field(&item.value, "grantee")?;
            let active = item.value["active"].as_bool().ok_or_else(|| {
                ExtractError::InvalidData("missing boolean field active".to_string())
            })?;

            let allowance_data = item.value["allowance"].clone();
            let parsed = allowance_data
                .as_object()
                .and_then(|allowance| {
                    let type_url = allowance.get("type_url")?.as_str()?;
                    let value = const_hex::decode(allowance.get("value_hex")?.as_str()?).ok()?;
                    parse_allowance(type_url, &value)
                })
                .filter(|_| active);

            let allowance = FeegrantAllowance {
                granter: granter.to_string(),
                grantee: grantee.to_string(),
                block_height: block.height,
                block_time_unix_ms: block.time_unix_ms,
                active,
                allowance_data,
                parsed_amount: parsed.as_ref().and_then(|parsed| parsed.amount.clone()),
                parsed_denom: parsed.as_ref().and_then(|parsed| parsed.denom.clone()),
                parsed_allowance_type: parsed
                    .as_ref()
                    .map(|parsed| parsed.allowance_type.to_string()),
                parsed_expiration_unix_ms: parsed
                    .as_ref()
                    .and_then(|parsed| parsed.expiration_unix_ms),
                tx_hash: item.tx_hash,
            };
            self.env
                .storage
                .upsert_feegrant_allowance(&allowance)
                .await?;
            events.push(PersistedEvent::FeegrantAllowance(allowance));
        }

        Ok(events)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedAllowance {
    amount: Option<String>,
    denom: Option<String>,
    allowance_type: &'static str,
    expiration_unix_ms: Option<u64>,
}

/// Decode the known allowance types; `AllowedMsgAllowance` unwraps its inner allowance while
/// keeping its own type tag. Unknown types and decode failures yield `None`.
fn parse_allowance(type_url: &str, value: &[u8]) -> Option<ParsedAllowance> {
    match type_url {
        BASIC_ALLOWANCE => {
            let basic = BasicAllowance::decode(value).ok()?;
            Some(parse_basic(&basic, "basic"))
        }

        PERIODIC_ALLOWANCE => {
            let periodic = PeriodicAllowance::decode(value).ok()?;
            let basic = periodic.basic?;
            Some(parse_basic(&basic, "periodic"))
        }

        ALLOWED_MSG_ALLOWANCE => {
            let allowed = AllowedMsgAllowance::decode(value).ok()?;
            let inner = allowed.allowance?;
            let parsed = parse_allowance(&inner.type_url, &inner.value)?;
            Some(ParsedAllowance {
                allowance_type: "allowed_msg",
                ..parsed
            })
        }

        _ => None,
    }
}

fn parse_basic(basic: &BasicAllowance, allowance_type: &'static str) -> ParsedAllowance {
    let coin = basic.spend_limit.first();

    ParsedAllowance {
        amount: coin.map(|coin| coin.amount.clone()),
        denom: coin.map(|coin| coin.denom.clone()),
        allowance_type,
        expiration_unix_ms: basic.expiration.as_ref().map(|expiration| {
            expiration.seconds.max(0) as u64 * 1_000 + expiration.nanos.max(0) as u64 / 1_000_000
        }),
    }
}
