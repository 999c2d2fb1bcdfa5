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

use fastrace::collector::{Config as FastraceConfig, ConsoleReporter};
use log::warn;
use logforth::append;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Deserialize;
use std::net::SocketAddr;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "tracing")]
    pub tracing_config: TracingConfig,

    #[serde(rename = "metrics")]
    pub metrics_config: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TracingConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,

    #[serde(default)]
    pub address: Option<SocketAddr>,
}

/// Initialize logging to stderr; the maximum level is taken from the `RUST_LOG` environment
/// variable, defaulting to `info`.
pub fn init_logging() {
    let max_level = logforth::filter::env_filter::EnvFilterBuilder::from_default_env_or("info")
        .build();

    logforth::starter_log::builder()
        .dispatch(|dispatch| {
            dispatch
                .filter(max_level)
                .append(append::Stderr::default())
        })
        .apply();
}

/// Initialize tracing with the given [TracingConfig].
pub fn init_tracing(config: TracingConfig) {
    if config.enabled {
        fastrace::set_reporter(ConsoleReporter, FastraceConfig::default());
    }
}

/// Initialize metrics with the given [MetricsConfig]; if enabled, a Prometheus exporter is
/// installed at the configured address.
pub fn init_metrics(config: MetricsConfig) {
    let MetricsConfig { enabled, address } = config;

    if let (true, Some(address)) = (enabled, address) {
        if let Err(error) = PrometheusBuilder::new()
            .with_http_listener(address)
            .install()
        {
            warn!(error:%; "cannot install Prometheus metrics exporter");
        }
    }
}
