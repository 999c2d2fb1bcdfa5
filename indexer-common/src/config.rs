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

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::Deserialize;

const CONFIG_FILE: &str = "config.yaml";
const ENV_PREFIX: &str = "APP__";
const ENV_SEPARATOR: &str = "__";

/// Extension methods for "config" structs that can be deserialized.
pub trait ConfigExt
where
    Self: for<'de> Deserialize<'de>,
{
    /// Load configuration from the `config.yaml` file, overridden by `APP__` prefixed and `__`
    /// separated environment variables, e.g. `APP__INFRA__STORAGE__PASSWORD`.
    fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Yaml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split(ENV_SEPARATOR))
            .extract()
    }
}

impl<T> ConfigExt for T where T: for<'de> Deserialize<'de> {}
