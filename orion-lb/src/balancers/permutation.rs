// SPDX-FileCopyrightText: © 2025 Huawei Cloud Computing Technologies Co., Ltd
// SPDX-License-Identifier: Apache-2.0
//
// Copyright 2025 Huawei Cloud Computing Technologies Co., Ltd
//
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
//

//! Seeded permutations used to pick fallback hosts.
//!
//! The order in which positions are visited depends only on the seed and the number of positions,
//! so it is identical across runs, processes and platforms. [`SplitMix64`] and [`SeededPermutation`]
//! are specified bit for bit, and the golden values in the tests below must never change: doing so
//! would move the fallback host for every request hash that lands on an overloaded host.

use rand::{Error, RngCore, SeedableRng};

const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

/// The SplitMix64 generator.
///
/// Small, fast and fully deterministic. Not suitable for anything security related.
#[derive(Debug, Clone)]
pub struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    /// Returns a uniformly distributed value in `0..bound`, using the high part of a 64x64 bit
    /// multiplication. `bound` must be greater than zero.
    #[allow(clippy::cast_possible_truncation)]
    pub fn bounded(&mut self, bound: usize) -> usize {
        debug_assert!(bound > 0);
        ((u128::from(self.next_u64()) * bound as u128) >> 64) as usize
    }
}

impl RngCore for SplitMix64 {
    #[allow(clippy::cast_possible_truncation)]
    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(GOLDEN_GAMMA);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for SplitMix64 {
    type Seed = [u8; 8];

    fn from_seed(seed: Self::Seed) -> Self {
        Self { state: u64::from_le_bytes(seed) }
    }

    // The default implementation scrambles the seed with a PCG, here the seed is the state.
    fn seed_from_u64(state: u64) -> Self {
        Self { state }
    }
}

/// Lazily produces a permutation of `0..len` with a forward Fisher-Yates shuffle.
///
/// Each call to `next()` performs a single swap, so callers that stop early never pay for the
/// rest of the shuffle.
#[derive(Debug, Clone)]
pub struct SeededPermutation {
    rng: SplitMix64,
    indices: Vec<usize>,
    position: usize,
}

impl SeededPermutation {
    pub fn new(seed: u64, len: usize) -> Self {
        Self { rng: SplitMix64::seed_from_u64(seed), indices: (0..len).collect(), position: 0 }
    }
}

impl Iterator for SeededPermutation {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let position = self.position;
        let remaining = self.indices.len().checked_sub(position).filter(|remaining| *remaining > 0)?;
        if remaining > 1 {
            let other = position + self.rng.bounded(remaining);
            self.indices.swap(position, other);
        }
        self.position += 1;
        self.indices.get(position).copied()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.indices.len() - self.position;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SeededPermutation {}
