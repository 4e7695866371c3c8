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

use http::uri::Authority;
use orion_configuration::config::cluster::LbEndpoint as LbEndpointConfig;

use crate::{
    load::{ActiveRequests, RequestGuard},
    Error, Result,
};

pub trait WeightedEndpoint {
    fn weight(&self) -> u32;
}

pub trait EndpointWithLoad {
    /// Requests in flight to this endpoint.
    fn http_load(&self) -> u32;
    /// Requests in flight to the whole cluster this endpoint belongs to.
    fn cluster_load(&self) -> u32;
}

pub trait EndpointWithAuthority {
    fn authority(&self) -> &Authority;
}

#[derive(Clone, Debug)]
pub struct LbItem<E> {
    pub item: Arc<E>,
    pub weight: u32,
}

impl<E> LbItem<E> {
    pub fn new(weight: u32, item: Arc<E>) -> Self {
        Self { item, weight }
    }
}

#[derive(Debug)]
pub struct LbEndpoint {
    pub authority: Authority,
    pub weight: u32,
    active_requests: Arc<ActiveRequests>,
    cluster_requests: Arc<ActiveRequests>,
}

impl LbEndpoint {
    pub fn new(authority: Authority, weight: u32, cluster_requests: &Arc<ActiveRequests>) -> Self {
        Self { authority, weight, active_requests: ActiveRequests::new(), cluster_requests: Arc::clone(cluster_requests) }
    }

    pub fn from_config(config: &LbEndpointConfig, cluster_requests: &Arc<ActiveRequests>) -> Result<Self> {
        let authority = authority_from_address(config.address)?;
        Ok(Self::new(authority, config.load_balancing_weight.get(), cluster_requests))
    }

    /// Marks a request as sent to this endpoint until the returned guard is dropped.
    pub fn start_request(&self) -> RequestGuard {
        RequestGuard::new(&self.active_requests, &self.cluster_requests)
    }
}

fn authority_from_address(address: SocketAddr) -> Result<Authority> {
    Authority::try_from(address.to_string()).map_err(|e| Error::InvalidAuthority(address, e))
}

impl PartialEq for LbEndpoint {
    fn eq(&self, other: &Self) -> bool {
        self.authority == other.authority
    }
}

impl Eq for LbEndpoint {}

impl WeightedEndpoint for LbEndpoint {
    fn weight(&self) -> u32 {
        self.weight
    }
}

impl EndpointWithAuthority for LbEndpoint {
    fn authority(&self) -> &Authority {
        &self.authority
    }
}

impl EndpointWithLoad for LbEndpoint {
    fn http_load(&self) -> u32 {
        self.active_requests.get()
    }

    fn cluster_load(&self) -> u32 {
        self.cluster_requests.get()
    }
}
