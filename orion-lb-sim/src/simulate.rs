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
    collections::VecDeque,
    fmt::{self, Display},
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};

use compact_str::CompactString;
use http::{uri::Authority, Request};
use orion_configuration::{config::Cluster, options::Options};
use orion_lb::{
    ActiveRequests, Balancer, ConsistentHashBalancer, EndpointWithAuthority, EndpointWithLoad, LbEndpoint,
    RequestGuard,
};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use tracing::{debug, info};

use crate::Result;

const USERS: u32 = 500;
const SESSIONS: u32 = 2000;
/// Share of the traffic coming from a single user, so one host gets hot.
const HOT_USER_SHARE: f64 = 0.3;

#[derive(Debug, Clone)]
pub struct Simulation {
    requests: usize,
    in_flight: usize,
    seed: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostReport {
    pub authority: Authority,
    pub weight: u32,
    pub selected: usize,
    pub peak_load: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterReport {
    pub name: CompactString,
    pub bounded: bool,
    pub requests: usize,
    /// Requests for which no hash policy applied and a random hash was used.
    pub unhashed: usize,
    pub unassigned: usize,
    pub hosts: Vec<HostReport>,
}

impl Simulation {
    pub fn new(options: &Options) -> Self {
        Self { requests: options.requests.get(), in_flight: options.in_flight, seed: options.seed }
    }

    pub fn requests(&self) -> usize {
        self.requests
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Sends the configured number of synthetic requests to one cluster.
    ///
    /// Requests stay open until `in_flight` newer ones have been sent, so the load seen by the
    /// balancer when picking a host is the load of the last `in_flight` requests.
    pub fn run_cluster(&self, cluster: &Cluster) -> Result<ClusterReport> {
        let cluster_requests = ActiveRequests::new();
        let endpoints = cluster
            .endpoints
            .iter()
            .map(|endpoint| LbEndpoint::from_config(endpoint, &cluster_requests).map(Arc::new))
            .collect::<orion_lb::Result<Vec<_>>>()?;
        let mut balancer = ConsistentHashBalancer::from_config(cluster, endpoints.iter().cloned())?;

        let mut hosts: Vec<_> = endpoints
            .iter()
            .map(|endpoint| HostReport {
                authority: endpoint.authority().clone(),
                weight: endpoint.weight,
                selected: 0,
                peak_load: 0,
            })
            .collect();
        let mut report = ClusterReport {
            name: cluster.name.clone(),
            bounded: balancer.is_bounded(),
            requests: self.requests,
            unhashed: 0,
            unassigned: 0,
            hosts: Vec::new(),
        };

        let mut rng = SmallRng::seed_from_u64(self.seed);
        let mut open: VecDeque<RequestGuard> = VecDeque::with_capacity(self.in_flight + 1);
        for _ in 0..self.requests {
            let (request, source) = synthetic_request(&mut rng, &cluster.name)?;
            let hash = balancer.request_hash(&request, source);
            if hash.is_none() {
                report.unhashed += 1;
            }

            let Some(host) = balancer.next_item(hash) else {
                report.unassigned += 1;
                continue;
            };
            let guard = host.start_request();
            if let Some(index) = endpoints.iter().position(|endpoint| Arc::ptr_eq(endpoint, &host)) {
                hosts[index].selected += 1;
                hosts[index].peak_load = hosts[index].peak_load.max(host.http_load());
            }

            open.push_back(guard);
            while open.len() > self.in_flight {
                open.pop_front();
            }
        }
        debug!(cluster = %cluster.name, still_open = open.len(), "simulation finished");

        report.hosts = hosts;
        Ok(report)
    }
}

fn synthetic_request(rng: &mut SmallRng, cluster: &str) -> Result<(Request<()>, SocketAddr)> {
    let user = if rng.gen_bool(HOT_USER_SHARE) { 0 } else { rng.gen_range(1..USERS) };
    let session = rng.gen_range(0..SESSIONS);
    let address = Ipv4Addr::from(0x0a00_0000 | (rng.gen::<u32>() & 0x00ff_ffff));
    let source = SocketAddr::new(IpAddr::V4(address), rng.gen_range(1024..=u16::MAX));

    let request = Request::builder()
        .uri(format!("http://{cluster}/cart?session=s{session}"))
        .header("x-user-id", format!("user-{user}"))
        .body(())?;
    Ok((request, source))
}

impl ClusterReport {
    pub fn selected(&self) -> usize {
        self.hosts.iter().map(|host| host.selected).sum()
    }

    #[allow(clippy::cast_precision_loss)]
    fn percentage(&self, selected: usize) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            selected as f64 * 100.0 / self.requests as f64
        }
    }

    pub fn log(&self) {
        for host in &self.hosts {
            info!(
                cluster = %self.name,
                host = %host.authority,
                weight = host.weight,
                selected = host.selected,
                percentage = self.percentage(host.selected),
                peak_load = host.peak_load,
                "host selections"
            );
        }
        if self.unassigned > 0 {
            info!(cluster = %self.name, unassigned = self.unassigned, "requests without a host");
        }
    }
}

impl Display for ClusterReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bounding = if self.bounded { "bounded load" } else { "unbounded" };
        writeln!(f, "cluster {} ({bounding}), {} requests, {} unhashed", self.name, self.requests, self.unhashed)?;
        for host in &self.hosts {
            writeln!(
                f,
                "  {:<24} weight {:>3}  selected {:>7} ({:>5.1}%)  peak load {:>4}",
                host.authority.as_str(),
                host.weight,
                host.selected,
                self.percentage(host.selected),
                host.peak_load
            )?;
        }
        Ok(())
    }
}
