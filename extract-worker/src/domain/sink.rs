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

use crate::domain::extractor::PersistedEvent;
use indexer_common::error::BoxError;

/// Fire-and-forget search indexing. Returns the number of updated documents; failures are
/// logged by the worker and never fail the job.
#[trait_variant::make(Send)]
pub trait SearchSink
where
    Self: Clone + Send + Sync + 'static,
{
    async fn index(&self, events: &[PersistedEvent]) -> Result<u64, BoxError>;
}

/// Fire-and-forget webhook notification. Returns the number of dispatched notifications;
/// failures are logged by the worker and never fail the job.
#[trait_variant::make(Send)]
pub trait WebhookSink
where
    Self: Clone + Send + Sync + 'static,
{
    async fn dispatch(&self, events: &[PersistedEvent]) -> Result<u64, BoxError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSearchSink;

impl SearchSink for NoopSearchSink {
    async fn index(&self, _events: &[PersistedEvent]) -> Result<u64, BoxError> {
        Ok(0)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopWebhookSink;

impl WebhookSink for NoopWebhookSink {
    async fn dispatch(&self, _events: &[PersistedEvent]) -> Result<u64, BoxError> {
        Ok(0)
    }
}
