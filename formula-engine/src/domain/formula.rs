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

use crate::domain::{env::FormulaEnv, storage::Storage};
use async_trait::async_trait;
use derive_more::Display;
use indexer_common::domain::Address;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use thiserror::Error;

/// The addressing domain of a formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaScope {
    #[display("account")]
    Account,

    #[display("contract")]
    Contract,

    #[display("generic")]
    Generic,

    #[display("validator")]
    Validator,
}

impl FormulaScope {
    /// Whether formulas of this scope are computed against a target address.
    pub const fn takes_target(&self) -> bool {
        !matches!(self, Self::Generic)
    }
}

/// The input of one formula computation: the target address (absent for generic formulas) and
/// named arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormulaInput {
    pub target: Option<Address>,
    pub args: Map<String, Value>,
}

impl FormulaInput {
    /// The target address; formulas of target-taking scopes may rely on it being present.
    pub fn target(&self) -> Result<&str, FormulaError> {
        self.target
            .as_deref()
            .ok_or_else(|| FormulaError::MissingInput("target address".to_string()))
    }

    /// A required string argument.
    pub fn str_arg(&self, name: &str) -> Result<&str, FormulaError> {
        self.args
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| FormulaError::InvalidArgument {
                name: name.to_string(),
                reason: "required string argument".to_string(),
            })
    }

    /// An optional string argument.
    pub fn opt_str_arg(&self, name: &str) -> Option<&str> {
        self.args.get(name).and_then(Value::as_str)
    }

    /// An optional unsigned integer argument.
    pub fn opt_u64_arg(&self, name: &str) -> Result<Option<u64>, FormulaError> {
        match self.args.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_u64()
                .map(Some)
                .ok_or_else(|| FormulaError::InvalidArgument {
                    name: name.to_string(),
                    reason: "expected an unsigned integer".to_string(),
                }),
        }
    }
}

/// The sources a dependent key can be read from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DependencySource {
    State,
    Transformation,
    Extraction,
    Contract,
    Block,
    Feegrant,
    Balance,
    Query,
}

/// One logical key read during a computation; `prefix` marks range reads. The set of dependent
/// keys lets upstream caches invalidate precisely.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DependentKey {
    pub source: DependencySource,
    pub scope: String,
    pub key: String,
    pub prefix: bool,
}

/// The result of one formula computation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Computation {
    pub value: Value,
    pub dependencies: BTreeSet<DependentKey>,

    /// Dynamic computations depend on block time and must never be cached by output alone.
    pub dynamic: bool,
}

#[derive(Debug, Error)]
pub enum FormulaError {
    #[error("formula {scope}/{name} not found")]
    NotFound { scope: FormulaScope, name: String },

    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("invalid argument {name}: {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("storage error")]
    Storage(#[from] sqlx::Error),
}

/// A pure read-only computation over the event store at a fixed block height. Formulas are
/// registered in the per-scope registries at process start.
#[async_trait]
pub trait Formula<S>
where
    Self: Send + Sync,
    S: Storage,
{
    /// Whether the output depends on block time, e.g. expirations.
    fn dynamic(&self) -> bool {
        false
    }

    async fn compute(
        &self,
        env: &FormulaEnv<'_, S>,
        input: &FormulaInput,
    ) -> Result<Value, FormulaError>;
}
