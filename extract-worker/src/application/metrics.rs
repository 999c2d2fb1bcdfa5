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

use indexer_common::domain::job::Topic;
use metrics::{Counter, counter};

pub struct Metrics {
    jobs_done: Counter,
    jobs_failed: Counter,
}

impl Metrics {
    pub fn new(topic: Topic) -> Self {
        Self {
            jobs_done: counter!("extract_worker_jobs_done_total", "topic" => topic.as_str()),
            jobs_failed: counter!("extract_worker_jobs_failed_total", "topic" => topic.as_str()),
        }
    }

    pub fn done(&self) {
        self.jobs_done.increment(1);
    }

    pub fn failed(&self) {
        self.jobs_failed.increment(1);
    }
}
