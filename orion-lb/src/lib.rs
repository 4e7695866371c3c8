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

pub mod balancers;
pub mod load;

use std::net::SocketAddr;

pub use balancers::{
    bounded_load::{BoundedLoadBalancer, BoundedLoadError},
    consistent::ConsistentHashBalancer,
    host_table::{NormalizedHost, WeightedHostTable},
    overload::{LoadBoundPredicate, OverloadPredicate},
    Balancer, EndpointWithAuthority, EndpointWithLoad, HashSelector, LbEndpoint, LbItem, MaglevBalancer, RingHashBalancer,
    WeightedEndpoint,
};
pub use load::{ActiveRequests, RequestGuard};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    BoundedLoad(#[from] BoundedLoadError),
    #[error("endpoint address {0} is not a valid authority")]
    InvalidAuthority(SocketAddr, #[source] http::uri::InvalidUri),
}

pub type Result<T> = ::core::result::Result<T, Error>;
