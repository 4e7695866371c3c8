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

use std::{
    fmt::Debug,
    hash::{Hash, Hasher},
    sync::Arc,
};

use orion_configuration::config::cluster::RingHashConfig;
use rand::Rng;

use super::{
    hash_policy::DeterministicBuildHasher, Balancer, EndpointWithAuthority, HashSelector, LbItem, WeightedHostTable,
};

/// A consistent balancer based on the "ketama hash" algorithm.
///
/// A ring contains slots proportional to the weight of each position in the host table. When
/// doing load balancing, the first slot whose hash is not lower than the request hash is
/// selected, wrapping around to the first slot past the end of the ring.
///
/// When there are not enough slots in the ring, some hosts don't get one. This can happen
/// because there are more hosts than slots, or because one host has an exaggerated weight
/// over the others. Slots are assigned on a FIFO basis, so for a ring size of 20,
/// `[(host0, 50), (host1, 1)]` should only contain one host, while
/// `[(host1, 1), (host0, 50)]` should contain both.
#[derive(Debug, Clone)]
pub struct RingHashBalancer<E> {
    hosts: WeightedHostTable<E>,
    ring: Vec<(u64, usize)>,
}

impl<E> RingHashBalancer<E>
where
    E: EndpointWithAuthority,
{
    pub fn new(items: impl IntoIterator<Item = LbItem<E>>) -> Self {
        Self::from_table(WeightedHostTable::from_weights(items), &RingHashConfig::default())
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_table(hosts: WeightedHostTable<E>, settings: &RingHashConfig) -> Self {
        let min_ring_size = f64::from(settings.minimum_ring_size);
        let max_ring_size = f64::from(settings.maximum_ring_size);

        let mut ring = Vec::new();
        // Positions with no weight never get a slot, and must not drag the scale down to zero
        let minimum_weight = hosts.iter().map(|entry| entry.weight).filter(|weight| *weight > 0.0).reduce(f64::min);
        if let Some(minimum_weight) = minimum_weight {
            // Calculate the size of the ring so all positions have at least one slot
            let scale = ((minimum_weight * min_ring_size).ceil() / minimum_weight).min(max_ring_size);

            let ring_size = scale.ceil() as usize; // there is no usize::try_from::<f64>() yet
            ring.reserve(ring_size);

            // Add entries to the ring until it reaches the target number according to
            // the weight and the scale factor for this position.
            let mut current_slots = 0.0;
            let mut target_slots = 0.0;
            for (index, entry) in hosts.iter().enumerate() {
                let host_key = entry.host.authority();
                target_slots += entry.weight * scale;

                let mut slot_index = 0_u64;
                while current_slots < target_slots {
                    let mut hasher = DeterministicBuildHasher::build_hasher();
                    host_key.hash(&mut hasher);
                    slot_index.hash(&mut hasher);

                    ring.push((hasher.finish(), index));
                    current_slots += 1.0;
                    slot_index += 1;
                }
            }

            // The ring has to be sorted for the binary search in `choose_host()` to work
            ring.sort_by_key(|(hash, _)| *hash);
        }

        RingHashBalancer { hosts, ring }
    }
}

impl<E> RingHashBalancer<E> {
    pub fn host_table(&self) -> &WeightedHostTable<E> {
        &self.hosts
    }

    pub fn ring_size(&self) -> usize {
        self.ring.len()
    }
}

impl<E: EndpointWithAuthority> Default for RingHashBalancer<E> {
    fn default() -> Self {
        Self::new([])
    }
}

impl<E: Send + Sync> HashSelector<E> for RingHashBalancer<E> {
    fn choose_host(&self, hash: u64, attempt: u32) -> Option<Arc<E>> {
        let ring_size = self.ring.len();
        if ring_size == 0 {
            return None;
        }

        // Find the closest entry doing a binary search of the hash
        let closest_index = match self.ring.binary_search_by_key(&hash, |(hash, _)| *hash) {
            Ok(matching_index) => matching_index,
            Err(closest_index) if closest_index == ring_size => 0,
            Err(closest_index) => closest_index,
        };
        // Retries walk the ring clockwise
        let offset = usize::try_from(attempt).unwrap_or_default() % ring_size;
        let ring_index = (closest_index + offset) % ring_size;

        let (_, index) = self.ring.get(ring_index)?;
        self.hosts.get(*index).map(|entry| Arc::clone(&entry.host))
    }
}

impl<E: Send + Sync> Balancer<E> for RingHashBalancer<E> {
    fn next_item(&mut self, hash: Option<u64>) -> Option<Arc<E>> {
        // If no hash is provided, a random one is generated
        let hash = hash.unwrap_or_else(|| rand::thread_rng().gen());
        self.choose_host(hash, 0)
    }
}

#[cfg(test)]
mod test {
    use std::{ops::ControlFlow, sync::Arc};

    use http::uri::Authority;
    use orion_configuration::config::cluster::RingHashConfig;
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    use super::{LbItem, RingHashBalancer};
    use crate::balancers::{Balancer, EndpointWithAuthority, HashSelector, WeightedHostTable};

    struct TestEndpoint {
        value: u32,
        authority: Authority,
    }

    impl TestEndpoint {
        fn new(value: u32) -> Self {
            Self { value, authority: Authority::try_from(format!("example.com:{}", 8000 + value)).unwrap() }
        }
    }

    impl EndpointWithAuthority for TestEndpoint {
        fn authority(&self) -> &Authority {
            &self.authority
        }
    }

    fn is_sorted<T: Ord>(mut iter: impl Iterator<Item = T>) -> bool {
        if let Some(first) = iter.next() {
            iter.try_fold(
                first,
                |prev, current| if prev <= current { ControlFlow::Continue(current) } else { ControlFlow::Break(()) },
            )
            .is_continue()
        } else {
            true
        }
    }

    fn balancer_from_distribution(
        distribution: &[(u32, u32)],
        minimum_ring_size: u32,
        maximum_ring_size: u32,
    ) -> RingHashBalancer<TestEndpoint> {
        let items = distribution.iter().map(|(value, weight)| LbItem::new(*weight, Arc::new(TestEndpoint::new(*value))));
        let settings = RingHashConfig { minimum_ring_size, maximum_ring_size };
        let balancer = RingHashBalancer::from_table(WeightedHostTable::from_weights(items), &settings);

        assert!(is_sorted(balancer.ring.iter().map(|(hash, _index)| hash)), "ring is not sorted");

        balancer
    }

    fn slot_counts(balancer: &RingHashBalancer<TestEndpoint>, hosts: usize) -> Vec<u32> {
        let mut counts = vec![0_u32; hosts];
        for (_hash, index) in &balancer.ring {
            counts[balancer.hosts.get(*index).unwrap().host.value as usize] += 1;
        }
        counts
    }

    fn distribution_within_margin(a: &[f64], b: &[f64], error_margin: f64) {
        for (value_a, value_b) in a.iter().zip(b.iter()) {
            assert!(
                (value_a - value_b).abs() / value_b < error_margin,
                "Value {value_a} is {:+.1}% of {value_b} which is not within {:.1}%",
                (value_a - value_b) * 100. / value_b,
                error_margin * 100.0,
            );
        }
    }

    #[test]
    fn ring_balancer_empty() {
        let mut empty_balancer: RingHashBalancer<TestEndpoint> = RingHashBalancer::default();

        assert!(empty_balancer.next_item(None).is_none(), "unexpected output from empty load balancer");
        assert!(empty_balancer.choose_host(42, 3).is_none());
    }

    #[test]
    fn ring_balancer_weight_overflow() {
        // Weights of 0 + 1 fit, weight of 2 overflows
        let balancer = balancer_from_distribution(&[(0, u32::MAX - 2), (1, 1), (2, 2)], 1, 10);

        assert_eq!(balancer.host_table().len(), 2, "balancer did not detect a weight overflow");
    }

    #[test]
    fn ring_balancer_distribution() {
        const RING_MIN: u32 = 10;
        const RING_MAX: u32 = 50;

        let distributions = [
            (vec![(0, 1), (1, 1), (2, 1), (3, 1), (4, 1), (5, 1), (6, 1), (7, 1), (8, 1), (9, 1)], 0.05),
            (vec![(0, 1), (1, 2), (2, 3), (3, 1), (4, 2), (5, 3), (6, 1), (7, 2), (8, 3), (9, 1)], 0.05),
            // Capped at the maximum ring size
            (vec![(0, 1), (1, 50)], 0.05),
            (vec![(0, 1), (1, 2), (2, 3), (3, 4), (4, 5), (5, 6), (6, 7), (7, 8), (8, 9), (9, 10)], 0.15),
        ];

        for (distribution, error_margin) in distributions {
            let total_weight: u32 = distribution.iter().map(|(_value, weight)| *weight).sum();
            let normalized_weights: Vec<_> =
                distribution.iter().map(|(_value, weight)| f64::from(*weight) / f64::from(total_weight)).collect();

            let balancer = balancer_from_distribution(&distribution, RING_MIN, RING_MAX);
            let counts = slot_counts(&balancer, distribution.len());
            let ring_size: u32 = counts.iter().sum();

            assert!((RING_MIN..=RING_MAX).contains(&ring_size));
            assert!(counts.iter().all(|count| *count > 0), "item is zero in {counts:?} for {distribution:?}");

            distribution_within_margin(
                &counts.iter().map(|count| f64::from(*count) / f64::from(ring_size)).collect::<Vec<_>>(),
                &normalized_weights,
                error_margin,
            );
        }
    }

    #[test]
    fn ring_balancer_overflow() {
        // 20 hosts into a ring of at most 10 slots
        let distribution: Vec<_> = (0..20).map(|value| (value, 1)).collect();

        let balancer = balancer_from_distribution(&distribution, 1, 10);
        let counts = slot_counts(&balancer, distribution.len());

        assert_eq!(balancer.ring_size(), 10);
        assert_eq!(counts.iter().filter(|count| **count > 0).count(), 10, "unexpected slots in {counts:?}");
    }

    #[test]
    fn zero_weight_hosts_get_no_slot() {
        let hosts = WeightedHostTable::from_normalized([
            (Arc::new(TestEndpoint::new(0)), 0.0),
            (Arc::new(TestEndpoint::new(1)), 1.0),
        ]);
        let balancer = RingHashBalancer::from_table(hosts, &RingHashConfig { minimum_ring_size: 8, maximum_ring_size: 8 });

        assert_eq!(balancer.ring_size(), 8);
        assert!(balancer.ring.iter().all(|(_hash, index)| *index == 1));
    }

    #[test]
    fn ring_balancer_consistent() {
        let distributions = [
            [(0, 1), (1, 1), (2, 1), (3, 1), (4, 1), (5, 1), (6, 1), (7, 1), (8, 1), (9, 1)],
            [(0, 1), (1, 2), (2, 3), (3, 1), (4, 2), (5, 3), (6, 1), (7, 2), (8, 3), (9, 1)],
            [(0, 1), (1, 2), (2, 3), (3, 4), (4, 5), (5, 6), (6, 7), (7, 8), (8, 9), (9, 10)],
        ];

        for distribution in distributions {
            let mut balancer = balancer_from_distribution(&distribution, 10, 20);

            let mut rng = SmallRng::seed_from_u64(1);
            for _ in 0..100 {
                let hash = rng.gen();
                let first = balancer.next_item(Some(hash)).unwrap().value;
                for _ in 0..10 {
                    assert_eq!(balancer.next_item(Some(hash)).unwrap().value, first, "different host for the same request");
                    assert_eq!(balancer.choose_host(hash, 0).unwrap().value, first);
                }
            }
        }
    }

    #[test]
    fn hashes_past_the_last_slot_wrap_around() {
        let balancer = balancer_from_distribution(&[(0, 1), (1, 1), (2, 1)], 30, 30);
        let (last_hash, _) = *balancer.ring.last().unwrap();
        let (_, first_index) = balancer.ring[0];
        let first_host = &balancer.hosts.get(first_index).unwrap().host;

        if last_hash < u64::MAX {
            assert!(Arc::ptr_eq(&balancer.choose_host(last_hash + 1, 0).unwrap(), first_host));
        }
        assert!(Arc::ptr_eq(&balancer.choose_host(0, 0).unwrap(), first_host));
    }

    #[test]
    fn retries_walk_the_ring() {
        let balancer = balancer_from_distribution(&[(0, 1), (1, 1), (2, 1)], 30, 30);
        let ring_size = balancer.ring_size();

        for (position, (hash, _)) in balancer.ring.iter().enumerate() {
            for attempt in 0..4_u32 {
                let (_, expected) = balancer.ring[(position + attempt as usize) % ring_size];
                let expected = &balancer.hosts.get(expected).unwrap().host;
                assert!(Arc::ptr_eq(&balancer.choose_host(*hash, attempt).unwrap(), expected));
            }
        }
    }
}
