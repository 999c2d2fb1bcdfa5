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

pub mod job;

mod block;
mod chain_state;
mod event;
mod wasm_code;

pub use block::*;
pub use chain_state::*;
pub use event::*;
pub use wasm_code::*;

/// A bech32 account or contract address.
pub type Address = String;

/// A hex-encoded (uppercase) transaction hash.
pub type TxHash = String;
