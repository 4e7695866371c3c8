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

use std::sync::Arc;

pub(crate) mod bounded_load;
pub(crate) mod consistent;
mod endpoint;
pub mod hash_policy;
pub(crate) mod host_table;
pub(crate) mod maglev;
pub(crate) mod overload;
pub mod permutation;
pub(crate) mod ring;

pub use endpoint::{EndpointWithAuthority, EndpointWithLoad, LbEndpoint, LbItem, WeightedEndpoint};
pub use host_table::{NormalizedHost, WeightedHostTable};
pub use maglev::MaglevBalancer;
pub use ring::RingHashBalancer;

pub trait Balancer<E> {
    fn next_item(&mut self, hash: Option<u64>) -> Option<Arc<E>>;
}

/// Maps a request hash to a host, independently of the hosts' current load.
///
/// `attempt` is zero for the first try of a request and is increased on every retry,
/// giving the implementation a chance to pick a different host.
pub trait HashSelector<E>: Send + Sync {
    fn choose_host(&self, hash: u64, attempt: u32) -> Option<Arc<E>>;
}
