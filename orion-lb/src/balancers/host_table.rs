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

use std::{fmt::Debug, slice, sync::Arc};

use tracing::warn;

use super::LbItem;

const WEIGHT_TOLERANCE: f64 = 1e-6;

#[derive(Debug)]
pub struct NormalizedHost<E> {
    pub host: Arc<E>,
    pub weight: f64,
}

impl<E> Clone for NormalizedHost<E> {
    fn clone(&self) -> Self {
        Self { host: Arc::clone(&self.host), weight: self.weight }
    }
}

/// Ordered snapshot of hosts and their normalized weights.
///
/// The same host may appear at several positions. Positions, not hosts, are the unit of
/// iteration. Cloning shares the backing storage.
#[derive(Debug)]
pub struct WeightedHostTable<E> {
    hosts: Arc<[NormalizedHost<E>]>,
}

impl<E> Clone for WeightedHostTable<E> {
    fn clone(&self) -> Self {
        Self { hosts: Arc::clone(&self.hosts) }
    }
}

impl<E> Default for WeightedHostTable<E> {
    fn default() -> Self {
        Self { hosts: Arc::new([]) }
    }
}

impl<E> WeightedHostTable<E> {
    /// Builds a table out of integer weights, normalizing them so they add up to 1.0.
    pub fn from_weights(items: impl IntoIterator<Item = LbItem<E>>) -> Self {
        let (items, total_weight) = collect_checked(items);
        if total_weight == 0 && !items.is_empty() {
            warn!("All endpoints have zero weight, none of them will get traffic through its weight share");
        }
        let total_weight = f64::from(total_weight.max(1));
        let hosts = items
            .into_iter()
            .map(|item| NormalizedHost { host: item.item, weight: f64::from(item.weight) / total_weight })
            .collect();
        Self { hosts }
    }

    /// Takes weights that were already normalized by whoever produced the host list.
    pub fn from_normalized(entries: impl IntoIterator<Item = (Arc<E>, f64)>) -> Self {
        let hosts: Arc<[NormalizedHost<E>]> = entries
            .into_iter()
            .map(|(host, weight)| {
                let weight = if weight.is_finite() && weight >= 0.0 {
                    weight
                } else {
                    warn!(weight, "Invalid normalized host weight, using 0 instead");
                    0.0
                };
                NormalizedHost { host, weight }
            })
            .collect();

        let total: f64 = hosts.iter().map(|entry| entry.weight).sum();
        if !hosts.is_empty() && (total - 1.0).abs() > WEIGHT_TOLERANCE {
            warn!(total, "Normalized host weights do not add up to 1.0");
        }
        Self { hosts }
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&NormalizedHost<E>> {
        self.hosts.get(index)
    }

    pub fn iter(&self) -> slice::Iter<'_, NormalizedHost<E>> {
        self.hosts.iter()
    }

    pub fn total_weight(&self) -> f64 {
        self.hosts.iter().map(|entry| entry.weight).sum()
    }
}

impl<'a, E> IntoIterator for &'a WeightedHostTable<E> {
    type Item = &'a NormalizedHost<E>;
    type IntoIter = slice::Iter<'a, NormalizedHost<E>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Returns a valid subset of the items whose total weight fits in [u32].
pub(crate) fn collect_checked<E>(items: impl IntoIterator<Item = LbItem<E>>) -> (Vec<LbItem<E>>, u32) {
    let mut total = 0_u32;
    let sanitized_subset = items
        .into_iter()
        .take_while(|item| {
            let result = total.checked_add(item.weight);
            if let Some(new_total) = result {
                total = new_total;
            } else {
                warn!("Endpoint weight overflow in consistent hashing load balancer, will only use the endpoints whose weight sum fits in 32 bits");
            }
            result.is_some()
        })
        .collect();
    (sanitized_subset, total)
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use tracing_test::traced_test;

    use super::{LbItem, WeightedHostTable};

    fn table(weights: &[u32]) -> WeightedHostTable<u32> {
        WeightedHostTable::from_weights(
            weights.iter().enumerate().map(|(index, weight)| LbItem::new(*weight, Arc::new(index as u32))),
        )
    }

    #[test]
    fn weights_are_normalized() {
        let hosts = table(&[1, 1, 2]);
        let weights: Vec<_> = hosts.iter().map(|entry| entry.weight).collect();
        assert_eq!(weights, vec![0.25, 0.25, 0.5]);
        assert!((hosts.total_weight() - 1.0).abs() < 1e-12);
        assert_eq!(hosts.get(2).map(|entry| *entry.host), Some(2));
        assert!(hosts.get(3).is_none());
    }

    #[test]
    fn empty_table() {
        let hosts: WeightedHostTable<u32> = WeightedHostTable::default();
        assert!(hosts.is_empty());
        assert_eq!(hosts.len(), 0);
        assert!(table(&[]).is_empty());
    }

    #[test]
    #[traced_test]
    fn weight_overflow_drops_the_tail() {
        let hosts = table(&[u32::MAX - 2, 1, 2]);
        assert_eq!(hosts.len(), 2);
        assert!(logs_contain("Endpoint weight overflow"));
    }

    #[test]
    fn duplicates_keep_their_position() {
        let shared = Arc::new(7_u32);
        let other = Arc::new(8_u32);
        let hosts = WeightedHostTable::from_normalized([
            (Arc::clone(&shared), 0.25),
            (Arc::clone(&other), 0.5),
            (Arc::clone(&shared), 0.25),
        ]);
        assert_eq!(hosts.len(), 3);
        assert!(Arc::ptr_eq(&hosts.get(0).unwrap().host, &hosts.get(2).unwrap().host));

        let copy = hosts.clone();
        assert!(Arc::ptr_eq(&copy.get(1).unwrap().host, &other));
    }

    #[test]
    #[traced_test]
    fn invalid_normalized_weights_are_clamped() {
        let hosts = WeightedHostTable::from_normalized([(Arc::new(0_u32), -1.0), (Arc::new(1_u32), f64::NAN)]);
        assert_eq!(hosts.total_weight(), 0.0);
        assert!(logs_contain("Invalid normalized host weight"));
        assert!(logs_contain("do not add up to 1.0"));
    }
}
