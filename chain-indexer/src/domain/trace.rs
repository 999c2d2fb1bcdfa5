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

use crate::domain::node::{BlockHeader, TxData};
use cosmrs::proto::cosmos::feegrant::v1beta1::{MsgGrantAllowance, MsgRevokeAllowance};
use indexer_common::domain::{Block, TxHash};
use log::debug;
use cosmrs::proto::traits::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const MSG_GRANT_ALLOWANCE: &str = "/cosmos.feegrant.v1beta1.MsgGrantAllowance";
const MSG_REVOKE_ALLOWANCE: &str = "/cosmos.feegrant.v1beta1.MsgRevokeAllowance";

/// One per-state-key record destined for the extract queue. `(handler, id)` is the dedupe key
/// within a block; the last item for a key wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceItem {
    pub handler: String,
    pub id: String,
    pub value: Value,
    pub block: Block,
    pub tx_hash: Option<TxHash>,
}

/// Turns successfully executed TXs into [TraceItem]s for one extractor. Handlers are pure
/// parsers; everything slow happens in the extract worker.
pub trait TraceHandler
where
    Self: Send + Sync,
{
    fn name(&self) -> &'static str;

    /// Background handlers are flushed to the background queue so they cannot starve the
    /// critical path.
    fn background(&self) -> bool {
        false
    }

    fn handle_tx(&self, tx: &TxData, header: &BlockHeader) -> Vec<TraceItem>;
}

fn block_of(header: &BlockHeader) -> Block {
    Block {
        height: header.height,
        time_unix_ms: header.time_unix_ms,
    }
}

/// Contract instantiations and per-key state writes surfaced through `instantiate` and `wasm`
/// events.
#[derive(Debug, Default)]
pub struct WasmTraceHandler;

impl TraceHandler for WasmTraceHandler {
    fn name(&self) -> &'static str {
        "wasm"
    }

    fn handle_tx(&self, tx: &TxData, header: &BlockHeader) -> Vec<TraceItem> {
        let mut items = Vec::new();

        for event in &tx.events {
            match event.kind.as_str() {
                "instantiate" => {
                    let (Some(contract_address), Some(code_id)) = (
                        event.attribute("_contract_address"),
                        event.attribute("code_id").and_then(|id| id.parse::<u64>().ok()),
                    ) else {
                        continue;
                    };

                    items.push(TraceItem {
                        handler: self.name().to_string(),
                        id: format!("instantiate:{contract_address}"),
                        value: json!({
                            "type": "instantiate",
                            "contract_address": contract_address,
                            "code_id": code_id,
                        }),
                        block: block_of(header),
                        tx_hash: Some(tx.hash.clone()),
                    });
                }

                "wasm" => {
                    let Some(contract_address) = event.attribute("_contract_address") else {
                        continue;
                    };

                    for (key, value) in &event.attributes {
                        if key == "_contract_address" {
                            continue;
                        }

                        items.push(TraceItem {
                            handler: self.name().to_string(),
                            id: format!("state:{contract_address}:{key}"),
                            value: json!({
                                "type": "state",
                                "contract_address": contract_address,
                                "key": key,
                                "value": value,
                            }),
                            block: block_of(header),
                            tx_hash: Some(tx.hash.clone()),
                        });
                    }
                }

                _ => {}
            }
        }

        items
    }
}

/// Addresses and denoms touched by bank transfers, surfaced through `coin_spent` and
/// `coin_received` events. Balances themselves are queried by the extractor at job time.
#[derive(Debug, Default)]
pub struct BankTraceHandler;

impl TraceHandler for BankTraceHandler {
    fn name(&self) -> &'static str {
        "bank"
    }

    fn background(&self) -> bool {
        true
    }

    fn handle_tx(&self, tx: &TxData, header: &BlockHeader) -> Vec<TraceItem> {
        let mut items = Vec::new();

        for event in &tx.events {
            let address_key = match event.kind.as_str() {
                "coin_spent" => "spender",
                "coin_received" => "receiver",
                _ => continue,
            };

            let (Some(address), Some(amount)) =
                (event.attribute(address_key), event.attribute("amount"))
            else {
                continue;
            };

            for (_, denom) in parse_coins(amount) {
                items.push(TraceItem {
                    handler: self.name().to_string(),
                    id: format!("{address}:{denom}"),
                    value: json!({
                        "address": address,
                        "denom": denom,
                    }),
                    block: block_of(header),
                    tx_hash: Some(tx.hash.clone()),
                });
            }
        }

        items
    }
}

/// Split a coin list like `1000ustake,5uatom` into `(amount, denom)` pairs. Malformed entries
/// are skipped.
pub fn parse_coins(coins: &str) -> Vec<(String, String)> {
    coins
        .split(',')
        .filter_map(|coin| {
            let coin = coin.trim();
            let split_at = coin.find(|c: char| !c.is_ascii_digit())?;
            if split_at == 0 {
                return None;
            }
            let (amount, denom) = coin.split_at(split_at);
            Some((amount.to_string(), denom.to_string()))
        })
        .collect()
}

/// Fee allowance grants and revocations, decoded from TX messages.
#[derive(Debug, Default)]
pub struct FeegrantTraceHandler;

impl TraceHandler for FeegrantTraceHandler {
    fn name(&self) -> &'static str {
        "feegrant"
    }

    fn handle_tx(&self, tx: &TxData, header: &BlockHeader) -> Vec<TraceItem> {
        let mut items = Vec::new();

        for message in &tx.messages {
            let item = match message.type_url.as_str() {
                MSG_GRANT_ALLOWANCE => match MsgGrantAllowance::decode(message.value.as_slice()) {
                    Ok(grant) => {
                        let allowance = grant.allowance.map(|allowance| {
                            json!({
                                "type_url": allowance.type_url,
                                "value_hex": const_hex::encode(&allowance.value),
                            })
                        });

                        TraceItem {
                            handler: self.name().to_string(),
                            id: format!("{}:{}", grant.granter, grant.grantee),
                            value: json!({
                                "granter": grant.granter,
                                "grantee": grant.grantee,
                                "active": true,
                                "allowance": allowance,
                            }),
                            block: block_of(header),
                            tx_hash: Some(tx.hash.clone()),
                        }
                    }

                    Err(error) => {
                        debug!(error:%, tx_hash:% = tx.hash; "cannot decode MsgGrantAllowance");
                        continue;
                    }
                },

                MSG_REVOKE_ALLOWANCE => {
                    match MsgRevokeAllowance::decode(message.value.as_slice()) {
                        Ok(revoke) => TraceItem {
                            handler: self.name().to_string(),
                            id: format!("{}:{}", revoke.granter, revoke.grantee),
                            value: json!({
                                "granter": revoke.granter,
                                "grantee": revoke.grantee,
                                "active": false,
                                "allowance": null,
                            }),
                            block: block_of(header),
                            tx_hash: Some(tx.hash.clone()),
                        },

                        Err(error) => {
                            debug!(error:%, tx_hash:% = tx.hash; "cannot decode MsgRevokeAllowance");
                            continue;
                        }
                    }
                }

                _ => continue,
            };

            items.push(item);
        }

        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::{AbciEvent, TxMessage};

    fn header() -> BlockHeader {
        BlockHeader {
            chain_id: "testing-1".to_string(),
            height: 100,
            time_unix_ms: 1_700_000_000_000,
        }
    }

    fn tx(events: Vec<AbciEvent>, messages: Vec<TxMessage>) -> TxData {
        TxData {
            index: 0,
            hash: "AB12".to_string(),
            code: 0,
            gas_wanted: 0,
            gas_used: 0,
            events,
            messages,
        }
    }

    #[test]
    fn test_parse_coins() {
        assert_eq!(
            parse_coins("1000ustake,5uatom"),
            vec![
                ("1000".to_string(), "ustake".to_string()),
                ("5".to_string(), "uatom".to_string())
            ]
        );
        assert_eq!(parse_coins(""), vec![]);
        assert_eq!(parse_coins("nodigits"), vec![]);
    }

    #[test]
    fn test_wasm_handler_state_and_instantiate() {
        let tx = tx(
            vec![
                AbciEvent {
                    kind: "instantiate".to_string(),
                    attributes: vec![
                        ("_contract_address".to_string(), "wasm1contract".to_string()),
                        ("code_id".to_string(), "42".to_string()),
                    ],
                },
                AbciEvent {
                    kind: "wasm".to_string(),
                    attributes: vec![
                        ("_contract_address".to_string(), "wasm1contract".to_string()),
                        ("owner".to_string(), "wasm1owner".to_string()),
                    ],
                },
            ],
            vec![],
        );

        let items = WasmTraceHandler.handle_tx(&tx, &header());
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "instantiate:wasm1contract");
        assert_eq!(items[0].value["code_id"], 42);
        assert_eq!(items[1].id, "state:wasm1contract:owner");
        assert_eq!(items[1].value["value"], "wasm1owner");
    }

    #[test]
    fn test_bank_handler_one_item_per_address_denom() {
        let tx = tx(
            vec![
                AbciEvent {
                    kind: "coin_spent".to_string(),
                    attributes: vec![
                        ("spender".to_string(), "wasm1alice".to_string()),
                        ("amount".to_string(), "1000ustake,5uatom".to_string()),
                    ],
                },
                AbciEvent {
                    kind: "coin_received".to_string(),
                    attributes: vec![
                        ("receiver".to_string(), "wasm1bob".to_string()),
                        ("amount".to_string(), "1000ustake".to_string()),
                    ],
                },
            ],
            vec![],
        );

        let items = BankTraceHandler.handle_tx(&tx, &header());
        let ids = items.iter().map(|item| item.id.as_str()).collect::<Vec<_>>();
        assert_eq!(
            ids,
            vec!["wasm1alice:ustake", "wasm1alice:uatom", "wasm1bob:ustake"]
        );
    }

    #[test]
    fn test_feegrant_handler_grant_and_revoke() {
        let grant = MsgGrantAllowance {
            granter: "wasm1granter".to_string(),
            grantee: "wasm1grantee".to_string(),
            allowance: None,
        };
        let revoke = MsgRevokeAllowance {
            granter: "wasm1granter".to_string(),
            grantee: "wasm1grantee".to_string(),
        };

        let tx = tx(
            vec![],
            vec![
                TxMessage {
                    type_url: MSG_GRANT_ALLOWANCE.to_string(),
                    value: grant.encode_to_vec(),
                },
                TxMessage {
                    type_url: MSG_REVOKE_ALLOWANCE.to_string(),
                    value: revoke.encode_to_vec(),
                },
            ],
        );

        let items = FeegrantTraceHandler.handle_tx(&tx, &header());
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "wasm1granter:wasm1grantee");
        assert_eq!(items[0].value["active"], true);
        assert_eq!(items[1].value["active"], false);
    }
}
