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
    formula::{Formula, FormulaScope},
    storage::Storage,
};
use std::{collections::HashMap, sync::Arc};

/// The four per-scope formula registries, static at process start. Formula names are
/// slash-separated paths, e.g. `bank/balances`.
pub struct FormulaRegistries<S> {
    account: HashMap<String, Arc<dyn Formula<S>>>,
    contract: HashMap<String, Arc<dyn Formula<S>>>,
    generic: HashMap<String, Arc<dyn Formula<S>>>,
    validator: HashMap<String, Arc<dyn Formula<S>>>,
}

impl<S> FormulaRegistries<S>
where
    S: Storage,
{
    pub fn new() -> Self {
        Self {
            account: HashMap::new(),
            contract: HashMap::new(),
            generic: HashMap::new(),
            validator: HashMap::new(),
        }
    }

    fn scope_registry(&mut self, scope: FormulaScope) -> &mut HashMap<String, Arc<dyn Formula<S>>> {
        match scope {
            FormulaScope::Account => &mut self.account,
            FormulaScope::Contract => &mut self.contract,
            FormulaScope::Generic => &mut self.generic,
            FormulaScope::Validator => &mut self.validator,
        }
    }

    pub fn register(
        &mut self,
        scope: FormulaScope,
        name: impl Into<String>,
        formula: impl Formula<S> + 'static,
    ) {
        self.scope_registry(scope).insert(name.into(), Arc::new(formula));
    }

    pub fn get(&self, scope: FormulaScope, name: &str) -> Option<Arc<dyn Formula<S>>> {
        let registry = match scope {
            FormulaScope::Account => &self.account,
            FormulaScope::Contract => &self.contract,
            FormulaScope::Generic => &self.generic,
            FormulaScope::Validator => &self.validator,
        };
        registry.get(name).cloned()
    }

    /// The registered names of one scope, sorted.
    pub fn names(&self, scope: FormulaScope) -> Vec<&str> {
        let registry = match scope {
            FormulaScope::Account => &self.account,
            FormulaScope::Contract => &self.contract,
            FormulaScope::Generic => &self.generic,
            FormulaScope::Validator => &self.validator,
        };
        let mut names = registry.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }
}

impl<S> Default for FormulaRegistries<S>
where
    S: Storage,
{
    /// The built-in formula catalog.
    fn default() -> Self {
        let mut registries = Self::new();
        crate::formulas::register_all(&mut registries);
        registries
    }
}
