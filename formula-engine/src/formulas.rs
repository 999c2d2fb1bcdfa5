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

pub mod account;
pub mod contract;
pub mod generic;
pub mod validator;

use crate::domain::{formula::FormulaScope, registry::FormulaRegistries, storage::Storage};

/// Register the built-in formula catalog.
pub fn register_all<S>(registries: &mut FormulaRegistries<S>)
where
    S: Storage,
{
    registries.register(FormulaScope::Account, "bank/balances", account::Balances);
    registries.register(
        FormulaScope::Account,
        "feegrant/allowances",
        account::FeegrantAllowances,
    );

    registries.register(FormulaScope::Contract, "info", contract::Info);
    registries.register(FormulaScope::Contract, "item", contract::Item);
    registries.register(FormulaScope::Contract, "items", contract::Items);
    registries.register(
        FormulaScope::Contract,
        "instantiation",
        contract::Instantiation,
    );

    registries.register(FormulaScope::Generic, "chain/block", generic::ChainBlock);
    registries.register(FormulaScope::Generic, "chain/stats", generic::ChainStats);

    registries.register(FormulaScope::Validator, "identity", validator::Identity);
}
