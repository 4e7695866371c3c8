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

use std::{fmt::Debug, sync::Arc};

use http::uri::Authority;
use rand::Rng;

use super::{
    hash_policy::DeterministicBuildHasher, Balancer, EndpointWithAuthority, HashSelector, LbItem, WeightedHostTable,
};

/// A consistent balancer based on this paper:
/// "Maglev: A Fast and Reliable Software Network Load Balancer" by Danielle E. Eisenbud et al.
///
/// The basic idea is to build a lookup table with a number of entries per position of the host
/// table proportional to its weight. Maglev tries to guarantee that each position at least has
/// one entry in the table, and to distribute the entries evenly so the load balancing is
/// consistent but fair.
#[derive(Debug, Clone)]
pub struct MaglevBalancer<E> {
    hosts: WeightedHostTable<E>,
    table: Vec<usize>,
}

// The building of the table requires that the table size is a prime number.
// In this case, `(1 << 16) + 1`. See section 5.3 in the original paper.
const DEFAULT_TABLE_SIZE: usize = 65537;

impl<E> MaglevBalancer<E>
where
    E: EndpointWithAuthority,
{
    pub fn new(items: impl IntoIterator<Item = LbItem<E>>) -> Self {
        Self::from_table(WeightedHostTable::from_weights(items))
    }

    pub fn from_table(hosts: WeightedHostTable<E>) -> Self {
        Self::with_size::<DEFAULT_TABLE_SIZE>(hosts)
    }

    fn with_size<const TABLE_SIZE: usize>(hosts: WeightedHostTable<E>) -> Self {
        let () = <Prime<TABLE_SIZE> as IsPrime>::IS_PRIME;

        // Visit positions sorted by authority so rebuilding the table will yield consistent results
        let mut positions: Vec<usize> = (0..hosts.len()).filter(|index| weight_at(&hosts, *index) > 0.0).collect();
        positions.sort_by(|a, b| authority_sorting_key(&hosts, *a).cmp(authority_sorting_key(&hosts, *b)));

        let max_weight = positions.iter().map(|index| weight_at(&hosts, *index)).reduce(f64::max);

        let table = match (positions.as_slice(), max_weight) {
            (_, None) => Vec::new(),            // No positions
            ([single], Some(_)) => vec![*single], // A single position
            (_, Some(max_weight)) => {
                let mut permutations: Vec<(usize, Permutation<TABLE_SIZE>)> = positions
                    .iter()
                    .filter_map(|index| {
                        let entry = hosts.get(*index)?;
                        Some((*index, Permutation::new(entry.host.authority(), entry.weight, max_weight)))
                    })
                    .collect();

                let mut table_builder = TableBuilder::<TABLE_SIZE>::new();

                // This implements the pseudocode from section 3.4 of the paper.
                // A bug here could mean an infinite loop, hence the debug assertions. In production
                // the loop gives up and produces a table far from the desired distribution.
                'table_loop: for _ in 0..TABLE_SIZE {
                    'position_loop: for (index, permutation) in &mut permutations {
                        if table_builder.is_full() {
                            break 'table_loop;
                        }

                        // Positions with the maximum weight take an entry on every iteration,
                        // the others skip iterations until they accumulate enough weight.
                        if !permutation.has_enough_weight_after_iterating() {
                            continue;
                        }

                        // Walks the whole table in TABLE_SIZE steps because it is a prime number
                        for _ in 0..TABLE_SIZE {
                            if table_builder.try_update(permutation.next(), *index).is_ok() {
                                continue 'position_loop;
                            }
                        }

                        debug_assert!(false, "Maglev lookup table generator could enter an infinite loop");
                    }
                }

                table_builder.build()
            },
        };

        MaglevBalancer { hosts, table }
    }
}

fn weight_at<E>(hosts: &WeightedHostTable<E>, index: usize) -> f64 {
    hosts.get(index).map(|entry| entry.weight).unwrap_or_default()
}

/// Get a sorting key for [Authority] that implements [Ord], the same way [Authority]
/// implements [PartialOrd].
fn authority_sorting_key<E: EndpointWithAuthority>(
    hosts: &WeightedHostTable<E>,
    index: usize,
) -> impl Iterator<Item = u8> + '_ {
    let authority: Option<&Authority> = hosts.get(index).map(|entry| entry.host.authority());
    authority.into_iter().flat_map(|authority| authority.as_str().as_bytes().iter().map(u8::to_ascii_lowercase))
}

impl<E> MaglevBalancer<E> {
    pub fn host_table(&self) -> &WeightedHostTable<E> {
        &self.hosts
    }
}

struct TableBuilder<const TABLE_SIZE: usize> {
    table: Vec<Option<usize>>,
    size: usize,
}

impl<const TABLE_SIZE: usize> TableBuilder<TABLE_SIZE> {
    fn new() -> Self {
        TableBuilder { table: vec![None; TABLE_SIZE], size: 0 }
    }

    fn try_update(&mut self, index: usize, value: usize) -> Result<(), ()> {
        let Some(entry) = self.table.get_mut(index) else {
            debug_assert!(false, "Unexpected invalid index while constructing Maglev lookup table");
            return Err(());
        };
        if entry.is_some() {
            return Err(());
        }
        *entry = Some(value);
        self.size += 1;
        Ok(())
    }

    fn is_full(&self) -> bool {
        self.size >= TABLE_SIZE
    }

    fn build(self) -> Vec<usize> {
        self.table
            .into_iter()
            .map(|entry| {
                debug_assert!(entry.is_some(), "Incomplete Maglev lookup table");
                entry.unwrap_or_default()
            })
            .collect()
    }
}

struct Permutation<const TABLE_SIZE: usize> {
    offset: usize,
    skip: usize,
    weight: f64,
    current_weight: f64,
    target_weight: f64,
    next: usize,
}

impl<const TABLE_SIZE: usize> Permutation<TABLE_SIZE> {
    const OFFSET_SEED: u64 = 0;
    const SKIP_SEED: u64 = 1;

    fn new(authority: &Authority, weight: f64, target_weight: f64) -> Self {
        let offset = usize::try_from(DeterministicBuildHasher::hash_one_with_seed(authority, Self::OFFSET_SEED))
            .unwrap_or(0)
            % TABLE_SIZE;
        let skip = (usize::try_from(DeterministicBuildHasher::hash_one_with_seed(authority, Self::SKIP_SEED))
            .unwrap_or(0)
            % (TABLE_SIZE - 1))
            + 1;
        debug_assert!((0..TABLE_SIZE).contains(&offset), "Offset is expected to be in 0..TABLE_SIZE");
        debug_assert!((1..TABLE_SIZE).contains(&skip), "Skip is expected to be in 1..TABLE_SIZE");
        Self { offset, skip, weight, current_weight: target_weight, target_weight, next: 0 }
    }

    fn has_enough_weight_after_iterating(&mut self) -> bool {
        self.current_weight += self.weight;
        let has_reached_target = self.current_weight >= self.target_weight;
        if has_reached_target {
            self.current_weight -= self.target_weight;
        }
        has_reached_target
    }

    fn next(&mut self) -> usize {
        let index = (self.offset + self.skip * self.next) % TABLE_SIZE;
        self.next += 1;
        index
    }
}

impl<E: EndpointWithAuthority> Default for MaglevBalancer<E> {
    fn default() -> Self {
        Self::new([])
    }
}

impl<E: Send + Sync> HashSelector<E> for MaglevBalancer<E> {
    fn choose_host(&self, hash: u64, attempt: u32) -> Option<Arc<E>> {
        if self.table.is_empty() {
            return None;
        }

        // Retries land on an unrelated entry of the table
        let hash = hash ^ u64::from(attempt).wrapping_neg();
        let table_size = u64::try_from(self.table.len()).ok()?;
        let table_index = usize::try_from(hash % table_size).ok()?;

        let index = self.table.get(table_index)?;
        self.hosts.get(*index).map(|entry| Arc::clone(&entry.host))
    }
}

impl<E: Send + Sync> Balancer<E> for MaglevBalancer<E> {
    fn next_item(&mut self, hash: Option<u64>) -> Option<Arc<E>> {
        // If no hash is provided, a random one is generated
        let hash = hash.unwrap_or_else(|| rand::thread_rng().gen());
        self.choose_host(hash, 0)
    }
}

trait IsPrime {
    const IS_PRIME: ();
}

struct Prime<const N: usize>;

impl<const N: usize> IsPrime for Prime<N> {
    const IS_PRIME: () = assert!(is_prime(N), "Maglev lookup table size is not a prime number");
}

const fn is_prime(n: usize) -> bool {
    if n <= 1 {
        return false;
    } else if n <= 3 {
        return true;
    }
    if n % 2 == 0 || n % 3 == 0 {
        return false;
    }

    // candidates of the form 6k - 1 and 6k + 1, alternating steps of 2 and 4
    let mut current = 5;
    let mut step = 2;
    while current <= n / current {
        if n % current == 0 {
            return false;
        }
        current += step;
        step ^= 6;
    }

    true
}
