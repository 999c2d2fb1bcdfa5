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

use crate::domain::node::BlockHeader;
use metrics::{Counter, Gauge, counter, gauge};

pub struct Metrics {
    block_height: Gauge,
    txs: Counter,
    errors: Counter,
}

impl Metrics {
    pub fn new(highest_block_height: Option<u64>) -> Self {
        let block_height = gauge!("chain_indexer_block_height");
        if let Some(height) = highest_block_height {
            block_height.set(height as f64);
        }

        Self {
            block_height,
            txs: counter!("chain_indexer_txs_total"),
            errors: counter!("chain_indexer_errors_total"),
        }
    }

    pub fn block(&self, header: &BlockHeader) {
        self.block_height.set(header.height as f64);
    }

    pub fn tx(&self) {
        self.txs.increment(1);
    }

    pub fn error(&self) {
        self.errors.increment(1);
    }
}
