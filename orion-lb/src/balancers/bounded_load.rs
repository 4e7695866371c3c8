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

use std::{fmt::Debug, num::NonZeroU32, sync::Arc};

use tracing::{debug, trace};

use super::{
    overload::{LoadBoundPredicate, OverloadPredicate},
    permutation::SeededPermutation,
    EndpointWithAuthority, EndpointWithLoad, HashSelector, WeightedHostTable,
};

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundedLoadError {
    #[error("hash balance factor must be greater than zero to enable bounded load")]
    ZeroBalanceFactor,
    #[error("bounded load balancing requires a host table")]
    MissingHostTable,
}

/// Consistent hashing with bounded load.
///
/// Wraps a [`HashSelector`] and returns its choice unless the chosen host is overloaded. In that
/// case the positions of the host table are visited in an order seeded by the request hash, and
/// the first host that is not overloaded is returned instead. When every host is overloaded the
/// original choice is kept.
///
/// The same request hash always visits positions in the same order, so a request keeps landing on
/// the same fallback host as long as the load picture does not change, while two requests that
/// hashed onto the same overloaded host usually spread to different fallbacks.
pub struct BoundedLoadBalancer<E> {
    hashing_lb: Option<Arc<dyn HashSelector<E>>>,
    hosts: WeightedHostTable<E>,
    hash_balance_factor: NonZeroU32,
    predicate: Arc<dyn OverloadPredicate<E>>,
}

impl<E> BoundedLoadBalancer<E>
where
    E: EndpointWithAuthority + EndpointWithLoad + Send + Sync + 'static,
{
    /// Uses a [`LoadBoundPredicate`] built from `hosts` when no predicate is given.
    pub fn new(
        hashing_lb: Option<Arc<dyn HashSelector<E>>>,
        hosts: Option<WeightedHostTable<E>>,
        hash_balance_factor: u32,
        predicate: Option<Arc<dyn OverloadPredicate<E>>>,
    ) -> Result<Self, BoundedLoadError> {
        Self::build(hashing_lb, hosts, hash_balance_factor, |hosts| match predicate {
            Some(predicate) => predicate,
            None => Arc::new(LoadBoundPredicate::new(hosts)),
        })
    }
}

impl<E> BoundedLoadBalancer<E> {
    pub fn with_predicate(
        hashing_lb: Option<Arc<dyn HashSelector<E>>>,
        hosts: Option<WeightedHostTable<E>>,
        hash_balance_factor: u32,
        predicate: Arc<dyn OverloadPredicate<E>>,
    ) -> Result<Self, BoundedLoadError> {
        Self::build(hashing_lb, hosts, hash_balance_factor, |_| predicate)
    }

    /// Checks the factor before the table. The predicate is only resolved once both are valid.
    fn build(
        hashing_lb: Option<Arc<dyn HashSelector<E>>>,
        hosts: Option<WeightedHostTable<E>>,
        hash_balance_factor: u32,
        predicate: impl FnOnce(&WeightedHostTable<E>) -> Arc<dyn OverloadPredicate<E>>,
    ) -> Result<Self, BoundedLoadError> {
        let hash_balance_factor = NonZeroU32::new(hash_balance_factor).ok_or(BoundedLoadError::ZeroBalanceFactor)?;
        let hosts = hosts.ok_or(BoundedLoadError::MissingHostTable)?;
        let predicate = predicate(&hosts);
        Ok(Self { hashing_lb, hosts, hash_balance_factor, predicate })
    }

    /// The balance factor as a ratio of the average load, `1.5` for a factor of 150.
    pub fn threshold(&self) -> f64 {
        f64::from(self.hash_balance_factor.get()) / 100.0
    }

    pub fn choose_host(&self, hash: u64, attempt: u32) -> Option<Arc<E>> {
        let candidate = self.hashing_lb.as_ref()?.choose_host(hash, attempt)?;
        let threshold = self.threshold();
        if !self.predicate.is_overloaded(candidate.as_ref(), threshold) {
            trace!(hash, attempt, "hash selection within its load bound");
            return Some(candidate);
        }

        for position in SeededPermutation::new(hash, self.hosts.len()) {
            let Some(entry) = self.hosts.get(position) else {
                continue;
            };
            // already known to be overloaded
            if Arc::ptr_eq(&entry.host, &candidate) {
                continue;
            }
            if !self.predicate.is_overloaded(entry.host.as_ref(), threshold) {
                debug!(hash, attempt, position, "diverting request away from an overloaded host");
                return Some(Arc::clone(&entry.host));
            }
        }

        debug!(hash, attempt, hosts = self.hosts.len(), "every host is overloaded, keeping the hash selection");
        Some(candidate)
    }
}

impl<E> Clone for BoundedLoadBalancer<E> {
    fn clone(&self) -> Self {
        Self {
            hashing_lb: self.hashing_lb.clone(),
            hosts: self.hosts.clone(),
            hash_balance_factor: self.hash_balance_factor,
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<E> Debug for BoundedLoadBalancer<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedLoadBalancer")
            .field("has_hashing_lb", &self.hashing_lb.is_some())
            .field("hosts", &self.hosts.len())
            .field("hash_balance_factor", &self.hash_balance_factor)
            .finish_non_exhaustive()
    }
}

impl<E: Send + Sync> HashSelector<E> for BoundedLoadBalancer<E> {
    fn choose_host(&self, hash: u64, attempt: u32) -> Option<Arc<E>> {
        BoundedLoadBalancer::choose_host(self, hash, attempt)
    }
}
