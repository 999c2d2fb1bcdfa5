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

use indexer_common::domain::Block;
use serde::Serialize;
use serde_json::Value;

/// Constant computations (no key access) carry this in place of a block height.
pub const CONSTANT_HEIGHT: i64 = -1;

/// One computed output over a range: the block it was computed at (`None` for constant
/// formulas) and its value.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeValue {
    pub block: Option<Block>,
    pub value: Value,
}

/// The step of a downsampled series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeStep {
    /// Step boundaries are block heights.
    Height(u64),
    /// Step boundaries are Unix-milli timestamps.
    Time(u64),
}

/// One point of a downsampled series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangePoint {
    /// The step boundary (a height or a timestamp per [RangeStep]).
    pub at: u64,
    pub block_height: i64,
    pub value: Value,
}

/// Downsample a pre-sorted sequence of outputs: for each step boundary `b` in
/// `[start, end]`, pick the output with the greatest key `<= b`, advancing a single pointer
/// through the list. The final boundary `end` is included exactly even when unaligned.
/// Boundaries before the first output are omitted.
pub fn downsample(values: &[RangeValue], start: u64, end: u64, step: RangeStep) -> Vec<RangePoint> {
    let step_size = match step {
        RangeStep::Height(step_size) | RangeStep::Time(step_size) => step_size.max(1),
    };

    // Constant outputs sort below every boundary.
    let key = |value: &RangeValue| {
        value.block.map(|block| match step {
            RangeStep::Height(_) => block.height as i64,
            RangeStep::Time(_) => block.time_unix_ms as i64,
        })
    };

    let mut points = Vec::new();
    let mut current: Option<&RangeValue> = None;
    let mut next_index = 0;

    let mut boundary = start;
    loop {
        while next_index < values.len()
            && key(&values[next_index]).is_none_or(|k| k <= boundary as i64)
        {
            current = Some(&values[next_index]);
            next_index += 1;
        }

        if let Some(current) = current {
            points.push(RangePoint {
                at: boundary,
                block_height: current
                    .block
                    .map(|block| block.height as i64)
                    .unwrap_or(CONSTANT_HEIGHT),
                value: current.value.clone(),
            });
        }

        if boundary >= end {
            break;
        }
        // Include the final boundary exactly.
        boundary = boundary.saturating_add(step_size).min(end);
    }

    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn value(height: u64, time_unix_ms: u64, value: Value) -> RangeValue {
        RangeValue {
            block: Some(Block {
                height,
                time_unix_ms,
            }),
            value,
        }
    }

    #[test]
    fn test_downsample_by_height() {
        let values = [
            value(100, 1_000, json!(1)),
            value(105, 1_050, json!(2)),
            value(112, 1_120, json!(3)),
        ];

        let points = downsample(&values, 100, 115, RangeStep::Height(5));
        assert_eq!(
            points
                .iter()
                .map(|point| (point.at, point.block_height, point.value.clone()))
                .collect::<Vec<_>>(),
            vec![
                (100, 100, json!(1)),
                (105, 105, json!(2)),
                (110, 105, json!(2)),
                (115, 112, json!(3)),
            ]
        );
    }

    #[test]
    fn test_downsample_final_boundary_unaligned() {
        let values = [value(100, 1_000, json!(1)), value(107, 1_070, json!(2))];

        let points = downsample(&values, 100, 108, RangeStep::Height(5));
        assert_eq!(
            points.iter().map(|point| point.at).collect::<Vec<_>>(),
            vec![100, 105, 108]
        );
        assert_eq!(points[2].value, json!(2));
    }

    #[test]
    fn test_downsample_by_time() {
        let values = [
            value(100, 1_000, json!("a")),
            value(110, 2_500, json!("b")),
        ];

        let points = downsample(&values, 1_000, 3_000, RangeStep::Time(1_000));
        assert_eq!(
            points
                .iter()
                .map(|point| (point.at, point.value.clone()))
                .collect::<Vec<_>>(),
            vec![
                (1_000, json!("a")),
                (2_000, json!("a")),
                (3_000, json!("b")),
            ]
        );
    }

    #[test]
    fn test_downsample_constant() {
        let values = [RangeValue {
            block: None,
            value: json!(42),
        }];

        let points = downsample(&values, 10, 20, RangeStep::Height(10));
        assert_eq!(points.len(), 2);
        assert!(points
            .iter()
            .all(|point| point.block_height == CONSTANT_HEIGHT && point.value == json!(42)));
    }

    #[test]
    fn test_downsample_omits_boundaries_before_first_output() {
        let values = [value(110, 1_100, json!(1))];

        let points = downsample(&values, 100, 120, RangeStep::Height(10));
        assert_eq!(points.iter().map(|point| point.at).collect::<Vec<_>>(), vec![110, 120]);
    }
}
