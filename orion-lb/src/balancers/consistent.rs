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

use std::{fmt::Debug, net::SocketAddr, sync::Arc};

use compact_str::CompactString;
use http::Request;
use orion_configuration::config::{
    cluster::{HashBalanceFactor, LbPolicy},
    Cluster, HashPolicy,
};
use rand::Rng;
use tracing::debug;

use super::{
    bounded_load::BoundedLoadBalancer, hash_policy::HashState, Balancer, EndpointWithAuthority, EndpointWithLoad,
    HashSelector, LbItem, MaglevBalancer, RingHashBalancer, WeightedEndpoint, WeightedHostTable,
};
use crate::Result;

/// The balancer of a cluster configured for consistent hashing.
///
/// Combines the request hash policies of the cluster with a ring hash or maglev selector, wrapped
/// in a [`BoundedLoadBalancer`] when the cluster sets a hash balance factor.
pub struct ConsistentHashBalancer<E> {
    name: CompactString,
    hash_policy: Vec<HashPolicy>,
    hash_balance_factor: Option<HashBalanceFactor>,
    hosts: WeightedHostTable<E>,
    selector: Arc<dyn HashSelector<E>>,
}

impl<E> ConsistentHashBalancer<E>
where
    E: WeightedEndpoint + EndpointWithAuthority + EndpointWithLoad + Send + Sync + 'static,
{
    pub fn from_config(cluster: &Cluster, endpoints: impl IntoIterator<Item = Arc<E>>) -> Result<Self> {
        let hosts =
            WeightedHostTable::from_weights(endpoints.into_iter().map(|endpoint| LbItem::new(endpoint.weight(), endpoint)));

        let hashing_lb: Arc<dyn HashSelector<E>> = match &cluster.lb_policy {
            LbPolicy::RingHash(settings) => Arc::new(RingHashBalancer::from_table(hosts.clone(), settings)),
            LbPolicy::Maglev(_) => Arc::new(MaglevBalancer::from_table(hosts.clone())),
        };

        let selector: Arc<dyn HashSelector<E>> = match cluster.hash_balance_factor {
            Some(factor) => Arc::new(BoundedLoadBalancer::new(
                Some(hashing_lb),
                Some(hosts.clone()),
                factor.get().get(),
                None,
            )?),
            None => hashing_lb,
        };

        debug!(
            cluster = %cluster.name,
            hosts = hosts.len(),
            lb_policy = ?cluster.lb_policy,
            hash_balance_factor = ?cluster.hash_balance_factor.map(|factor| factor.to_string()),
            "built consistent hash balancer"
        );

        Ok(Self {
            name: cluster.name.clone(),
            hash_policy: cluster.hash_policy.clone(),
            hash_balance_factor: cluster.hash_balance_factor,
            hosts,
            selector,
        })
    }
}

impl<E> ConsistentHashBalancer<E> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_bounded(&self) -> bool {
        self.hash_balance_factor.is_some()
    }

    pub fn host_table(&self) -> &WeightedHostTable<E> {
        &self.hosts
    }

    /// Hash of the request according to the hash policies of the cluster.
    pub fn request_hash<B>(&self, req: &Request<B>, src_addr: SocketAddr) -> Option<u64> {
        HashState::new(&self.hash_policy, req, src_addr).compute()
    }

    pub fn choose_host(&self, hash: u64, attempt: u32) -> Option<Arc<E>> {
        self.selector.choose_host(hash, attempt)
    }
}

impl<E> Clone for ConsistentHashBalancer<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            hash_policy: self.hash_policy.clone(),
            hash_balance_factor: self.hash_balance_factor,
            hosts: self.hosts.clone(),
            selector: Arc::clone(&self.selector),
        }
    }
}

impl<E> Debug for ConsistentHashBalancer<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsistentHashBalancer")
            .field("name", &self.name)
            .field("hash_policy", &self.hash_policy)
            .field("hash_balance_factor", &self.hash_balance_factor)
            .field("hosts", &self.hosts.len())
            .finish_non_exhaustive()
    }
}

impl<E> Balancer<E> for ConsistentHashBalancer<E> {
    fn next_item(&mut self, hash: Option<u64>) -> Option<Arc<E>> {
        // If no hash is provided, a random one is generated
        let hash = hash.unwrap_or_else(|| rand::thread_rng().gen());
        self.choose_host(hash, 0)
    }
}

#[cfg(test)]
mod test {
    use std::{net::SocketAddr, sync::Arc};

    use http::Request;
    use orion_configuration::config::Cluster;

    use super::ConsistentHashBalancer;
    use crate::{balancers::Balancer, load::ActiveRequests, EndpointWithAuthority, LbEndpoint};

    fn cluster(yaml: &str) -> (Vec<Arc<LbEndpoint>>, ConsistentHashBalancer<LbEndpoint>) {
        let cluster: Cluster = serde_yaml::from_str(yaml).unwrap();
        let cluster_requests = ActiveRequests::new();
        let endpoints: Vec<_> = cluster
            .endpoints
            .iter()
            .map(|endpoint| Arc::new(LbEndpoint::from_config(endpoint, &cluster_requests).unwrap()))
            .collect();
        let balancer = ConsistentHashBalancer::from_config(&cluster, endpoints.iter().cloned()).unwrap();
        (endpoints, balancer)
    }

    const RING: &str = r#"
name: ring
hash_policy:
  - policy_specifier: { header: "x-user-id" }
endpoints:
  - "10.0.0.1:80"
  - "10.0.0.2:80"
  - address: "10.0.0.3:80"
    load_balancing_weight: 2
"#;

    const BOUNDED_MAGLEV: &str = r#"
name: maglev
lb_policy:
  maglev: {}
hash_balance_factor: 120
endpoints: ["10.0.0.1:80", "10.0.0.2:80", "10.0.0.3:80"]
"#;

    #[test]
    fn builds_from_config() {
        let (_endpoints, ring) = cluster(RING);
        assert_eq!(ring.name(), "ring");
        assert!(!ring.is_bounded());
        let weights: Vec<_> = ring.host_table().iter().map(|entry| entry.weight).collect();
        assert_eq!(weights, vec![0.25, 0.25, 0.5]);

        let (_endpoints, maglev) = cluster(BOUNDED_MAGLEV);
        assert!(maglev.is_bounded());
        assert_eq!(maglev.host_table().len(), 3);
    }

    #[test]
    fn request_hash_follows_policies() {
        let (_endpoints, ring) = cluster(RING);
        let source: SocketAddr = ([192, 168, 1, 1], 3000).into();

        let alice = Request::builder().uri("/").header("x-user-id", "alice").body(()).unwrap();
        let anonymous = Request::builder().uri("/").body(()).unwrap();

        let hash = ring.request_hash(&alice, source);
        assert!(hash.is_some());
        assert_eq!(hash, ring.request_hash(&alice, ([10, 0, 0, 9], 1).into()));
        assert_eq!(ring.request_hash(&anonymous, source), None);

        let (_endpoints, maglev) = cluster(BOUNDED_MAGLEV);
        assert_eq!(maglev.request_hash(&alice, source), None);
    }

    #[test]
    fn same_hash_same_host() {
        for yaml in [RING, BOUNDED_MAGLEV] {
            let (_endpoints, mut balancer) = cluster(yaml);
            for hash in 0..100_u64 {
                let hash = hash.wrapping_mul(0x9E37_79B9_7F4A_7C15);
                let first = balancer.next_item(Some(hash)).unwrap();
                assert!(Arc::ptr_eq(&first, &balancer.choose_host(hash, 0).unwrap()));
            }
            assert!(balancer.next_item(None).is_some());
        }
    }

    #[test]
    fn bounded_balancer_moves_away_from_a_busy_host() {
        let (endpoints, balancer) = cluster(BOUNDED_MAGLEV);
        let hash = 0xfeed_beef;
        let busy = balancer.choose_host(hash, 0).unwrap();

        let _guards: Vec<_> = (0..10).map(|_| busy.start_request()).collect();
        let diverted = balancer.choose_host(hash, 0).unwrap();
        assert_ne!(diverted.authority(), busy.authority());
        assert!(endpoints.iter().any(|endpoint| Arc::ptr_eq(endpoint, &diverted)));
    }
}
