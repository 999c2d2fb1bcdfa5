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

use crate::domain::chain_client::{ChainClient, ChainClientError, ContractInfo};
use cosmrs::proto::{
    cosmos::bank::v1beta1::{QueryBalanceRequest, QueryBalanceResponse},
    cosmwasm::wasm::v1::{QueryContractInfoRequest, QueryContractInfoResponse},
};
use fastrace::trace;
use prost::Message;
use serde::Deserialize;
use tendermint::block::Height;
use tendermint_rpc::{Client, HttpClient};

const CONTRACT_INFO_PATH: &str = "/cosmwasm.wasm.v1.Query/ContractInfo";
const BALANCE_PATH: &str = "/cosmos.bank.v1beta1.Query/Balance";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// The HTTP RPC endpoint, e.g. `http://localhost:26657`.
    pub rpc_url: String,
}

/// A [ChainClient] implementation querying the chain's gRPC services through the CometBFT
/// `abci_query` endpoint.
#[derive(Clone)]
pub struct CometChainClient {
    http_client: HttpClient,
}

impl CometChainClient {
    /// Create a new [CometChainClient] with the given [Config].
    pub fn new(config: Config) -> Result<Self, ChainClientError> {
        let http_client =
            HttpClient::new(config.rpc_url.as_str()).map_err(ChainClientError::new)?;

        Ok(Self { http_client })
    }

    async fn abci_query(
        &self,
        path: &str,
        data: Vec<u8>,
        height: Option<u64>,
    ) -> Result<Option<Vec<u8>>, ChainClientError> {
        let height = height
            .map(Height::try_from)
            .transpose()
            .map_err(ChainClientError::new)?;

        let response = self
            .http_client
            .abci_query(Some(path.to_string()), data, height, false)
            .await
            .map_err(ChainClientError::new)?;

        if response.code.is_err() {
            return Ok(None);
        }

        Ok(Some(response.value))
    }
}

impl ChainClient for CometChainClient {
    #[trace]
    async fn contract_info(&self, address: &str) -> Result<Option<ContractInfo>, ChainClientError> {
        let request = QueryContractInfoRequest {
            address: address.to_string(),
        };

        let Some(value) = self
            .abci_query(CONTRACT_INFO_PATH, request.encode_to_vec(), None)
            .await?
        else {
            return Ok(None);
        };

        let response =
            QueryContractInfoResponse::decode(value.as_slice()).map_err(ChainClientError::new)?;

        Ok(response.contract_info.map(|info| ContractInfo {
            code_id: info.code_id,
            admin: (!info.admin.is_empty()).then_some(info.admin),
            creator: (!info.creator.is_empty()).then_some(info.creator),
            label: (!info.label.is_empty()).then_some(info.label),
        }))
    }

    #[trace]
    async fn balance(
        &self,
        address: &str,
        denom: &str,
        height: u64,
    ) -> Result<String, ChainClientError> {
        let request = QueryBalanceRequest {
            address: address.to_string(),
            denom: denom.to_string(),
        };

        let value = self
            .abci_query(BALANCE_PATH, request.encode_to_vec(), Some(height))
            .await?
            .ok_or_else(|| {
                ChainClientError::new(format!("balance query failed for {address}/{denom}"))
            })?;

        let response =
            QueryBalanceResponse::decode(value.as_slice()).map_err(ChainClientError::new)?;

        Ok(response
            .balance
            .map(|coin| coin.amount)
            .unwrap_or_else(|| "0".to_string()))
    }
}
