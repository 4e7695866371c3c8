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

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

/// Number of requests currently in flight, either to one endpoint or to a whole cluster.
#[derive(Debug, Default)]
pub struct ActiveRequests(AtomicU32);

impl ActiveRequests {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    fn decrement(&self) {
        // saturates at zero
        let _ = self.0.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |value| value.checked_sub(1));
    }
}

/// Accounts for one in-flight request on an endpoint and on its cluster until dropped.
#[derive(Debug)]
#[must_use = "the request is only accounted for while the guard is alive"]
pub struct RequestGuard {
    endpoint: Arc<ActiveRequests>,
    cluster: Arc<ActiveRequests>,
}

impl RequestGuard {
    pub(crate) fn new(endpoint: &Arc<ActiveRequests>, cluster: &Arc<ActiveRequests>) -> Self {
        endpoint.increment();
        cluster.increment();
        Self { endpoint: Arc::clone(endpoint), cluster: Arc::clone(cluster) }
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.endpoint.decrement();
        self.cluster.decrement();
    }
}

#[cfg(test)]
mod test {
    use super::{ActiveRequests, RequestGuard};

    #[test]
    fn guards_track_endpoint_and_cluster() {
        let cluster = ActiveRequests::new();
        let first = ActiveRequests::new();
        let second = ActiveRequests::new();

        let a = RequestGuard::new(&first, &cluster);
        let b = RequestGuard::new(&first, &cluster);
        let c = RequestGuard::new(&second, &cluster);
        assert_eq!((first.get(), second.get(), cluster.get()), (2, 1, 3));

        drop(b);
        assert_eq!((first.get(), second.get(), cluster.get()), (1, 1, 2));

        drop((a, c));
        assert_eq!((first.get(), second.get(), cluster.get()), (0, 0, 0));
    }

    #[test]
    fn counter_does_not_underflow() {
        let counter = ActiveRequests::default();
        counter.decrement();
        assert_eq!(counter.get(), 0);
    }
}
