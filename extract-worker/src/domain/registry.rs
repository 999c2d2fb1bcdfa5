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
    chain_client::ChainClient,
    extractor::{Extractor, ExtractorEnv},
    extractors::{bank::BankExtractor, feegrant::FeegrantExtractor, wasm::WasmExtractor},
    storage::Storage,
};
use std::collections::HashMap;

type ExtractorFactory<S, C> =
    Box<dyn Fn(ExtractorEnv<S, C>) -> Box<dyn Extractor> + Send + Sync>;

/// Static name → constructor registry, built once at worker boot. Each job instantiates its
/// extractor with the per-job environment.
pub struct ExtractorRegistry<S, C> {
    factories: HashMap<&'static str, ExtractorFactory<S, C>>,
}

impl<S, C> ExtractorRegistry<S, C>
where
    S: Storage,
    C: ChainClient,
{
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        name: &'static str,
        factory: impl Fn(ExtractorEnv<S, C>) -> Box<dyn Extractor> + Send + Sync + 'static,
    ) {
        self.factories.insert(name, Box::new(factory));
    }

    /// Instantiate the named extractor with the given environment, `None` for unknown names.
    pub fn instantiate(&self, name: &str, env: ExtractorEnv<S, C>) -> Option<Box<dyn Extractor>> {
        self.factories.get(name).map(|factory| factory(env))
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names = self.factories.keys().copied().collect::<Vec<_>>();
        names.sort_unstable();
        names
    }
}

impl<S, C> Default for ExtractorRegistry<S, C>
where
    S: Storage,
    C: ChainClient,
{
    /// The built-in extractor catalog.
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register("wasm", |env| Box::new(WasmExtractor::new(env)));
        registry.register("bank", |env| Box::new(BankExtractor::new(env)));
        registry.register("feegrant", |env| Box::new(FeegrantExtractor::new(env)));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::testing::{MockChainClient, MockStorage};
    use indexer_common::domain::{Block, WasmCodeService};
    use std::sync::Arc;

    #[test]
    fn test_default_registry() {
        let registry = ExtractorRegistry::<MockStorage, MockChainClient>::default();
        assert_eq!(registry.names(), vec!["bank", "feegrant", "wasm"]);

        let env = ExtractorEnv {
            storage: MockStorage::default(),
            chain_client: MockChainClient::default(),
            wasm_codes: Arc::new(WasmCodeService::default()),
            block: Block::default(),
            tx_hash: None,
        };
        assert!(registry.instantiate("wasm", env.clone()).is_some());
        assert!(registry.instantiate("unknown", env).is_none());
    }
}
