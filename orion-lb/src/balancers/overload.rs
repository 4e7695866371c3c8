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

use std::fmt::Debug;

use http::uri::Authority;
use rustc_hash::FxHashMap;

use super::{EndpointWithAuthority, EndpointWithLoad, WeightedHostTable};

/// Decides whether a host is too loaded to take one more request.
///
/// `threshold` is the configured balance factor expressed as a ratio, `1.5` for a factor of 150.
pub trait OverloadPredicate<E>: Send + Sync {
    fn is_overloaded(&self, host: &E, threshold: f64) -> bool;
}

impl<E, F> OverloadPredicate<E> for F
where
    F: Fn(&E, f64) -> bool + Send + Sync,
{
    fn is_overloaded(&self, host: &E, threshold: f64) -> bool {
        self(host, threshold)
    }
}

/// Caps every host at its weighted share of the cluster load, multiplied by the threshold.
///
/// With `L` requests in flight in the cluster, a host whose share of the table is `w` may
/// take up to `ceil(ceil((L + 1) * threshold) * w)` requests, and never less than one. A host
/// already at that bound is overloaded. Shares are summed by authority, so a host listed
/// at several positions gets the weight of all of them.
#[derive(Debug, Clone, Default)]
pub struct LoadBoundPredicate {
    shares: FxHashMap<Authority, f64>,
}

impl LoadBoundPredicate {
    pub fn new<E: EndpointWithAuthority>(hosts: &WeightedHostTable<E>) -> Self {
        let mut shares = FxHashMap::default();
        for entry in hosts {
            *shares.entry(entry.host.authority().clone()).or_insert(0.0) += entry.weight;
        }
        Self { shares }
    }

    pub fn share(&self, authority: &Authority) -> f64 {
        self.shares.get(authority).copied().unwrap_or_default()
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn bound(&self, authority: &Authority, cluster_load: u32, threshold: f64) -> u32 {
        let cluster_capacity = ((f64::from(cluster_load) + 1.0) * threshold).ceil();
        let bound = (cluster_capacity * self.share(authority)).ceil();
        // float to int casts saturate
        (bound as u32).max(1)
    }
}

impl<E> OverloadPredicate<E> for LoadBoundPredicate
where
    E: EndpointWithAuthority + EndpointWithLoad,
{
    fn is_overloaded(&self, host: &E, threshold: f64) -> bool {
        host.http_load() >= self.bound(host.authority(), host.cluster_load(), threshold)
    }
}
