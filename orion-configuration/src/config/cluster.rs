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

use std::{collections::HashSet, fmt::Display, net::SocketAddr, num::NonZeroU32};

use compact_str::CompactString;
use serde::{Deserialize, Deserializer, Serialize};

use super::{
    common::{is_default, GenericError, WithNodeOnResult},
    hash_policy::HashPolicy,
};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Cluster {
    pub name: CompactString,
    #[serde(with = "serde_yaml::with::singleton_map", skip_serializing_if = "is_default", default)]
    pub lb_policy: LbPolicy,
    #[serde(deserialize_with = "deserialize_hash_balance_factor")]
    #[serde(skip_serializing_if = "Option::is_none", default = "Default::default")]
    pub hash_balance_factor: Option<HashBalanceFactor>,
    #[serde(skip_serializing_if = "Vec::is_empty", default = "Default::default")]
    pub hash_policy: Vec<HashPolicy>,
    #[serde(deserialize_with = "deser_through::<LbEndpointVecDeser,_,_>")]
    pub endpoints: Vec<LbEndpoint>,
}

impl Cluster {
    pub(crate) fn validate(&self) -> Result<(), GenericError> {
        if self.endpoints.is_empty() {
            return Err(GenericError::from_msg("a cluster needs at least one endpoint")).with_node("endpoints");
        }
        if self.hash_policy.is_empty() {
            tracing::warn!(cluster = %self.name, "no hash policy configured, every request will get a random hash");
        }
        self.lb_policy.validate().with_node("lb_policy")
    }
}

pub(crate) fn validate_clusters(clusters: &[Cluster]) -> Result<(), GenericError> {
    let mut names = HashSet::new();
    for (index, cluster) in clusters.iter().enumerate() {
        if !names.insert(cluster.name.as_str()) {
            return Err(GenericError::from_msg(format!("duplicate cluster name \"{}\"", cluster.name)))
                .with_index(index);
        }
        cluster.validate().with_name(cluster.name.clone()).with_index(index)?;
    }
    Ok(())
}

/// Allowed load on a single host, in percent of the average host load.
///
/// Only values of at least 100 are meaningful, anything lower would cap every host below
/// the average and force diversion on every request.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(transparent)]
pub struct HashBalanceFactor(NonZeroU32);

impl HashBalanceFactor {
    pub const MIN: u32 = 100;

    pub fn new(value: u32) -> Result<Option<Self>, GenericError> {
        match NonZeroU32::new(value) {
            None => Ok(None),
            Some(value) if value.get() < Self::MIN => Err(GenericError::from_msg(format!(
                "hash_balance_factor must be 0 (disabled) or at least {}, got {value}",
                Self::MIN
            ))),
            Some(value) => Ok(Some(Self(value))),
        }
    }

    pub fn get(self) -> NonZeroU32 {
        self.0
    }
}

impl Display for HashBalanceFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

fn deserialize_hash_balance_factor<'de, D>(deserializer: D) -> Result<Option<HashBalanceFactor>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<u32>::deserialize(deserializer).and_then(|maybe_value| {
        maybe_value
            .map(HashBalanceFactor::new)
            .transpose()
            .map(Option::flatten)
            .map_err(|e| serde::de::Error::custom(e.to_string()))
    })
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LbPolicy {
    RingHash(RingHashConfig),
    Maglev(MaglevConfig),
}

impl Default for LbPolicy {
    fn default() -> Self {
        Self::RingHash(RingHashConfig::default())
    }
}

impl LbPolicy {
    fn validate(&self) -> Result<(), GenericError> {
        match self {
            Self::RingHash(ring) => ring.validate().with_node("ring_hash"),
            Self::Maglev(_) => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct RingHashConfig {
    #[serde(default = "RingHashConfig::default_minimum_ring_size")]
    pub minimum_ring_size: u32,
    #[serde(default = "RingHashConfig::default_maximum_ring_size")]
    pub maximum_ring_size: u32,
}

impl RingHashConfig {
    pub const DEFAULT_MINIMUM_RING_SIZE: u32 = 1024;
    pub const DEFAULT_MAXIMUM_RING_SIZE: u32 = 1024 * 1024 * 8;

    const fn default_minimum_ring_size() -> u32 {
        Self::DEFAULT_MINIMUM_RING_SIZE
    }

    const fn default_maximum_ring_size() -> u32 {
        Self::DEFAULT_MAXIMUM_RING_SIZE
    }

    fn validate(&self) -> Result<(), GenericError> {
        if self.minimum_ring_size == 0 {
            return Err(GenericError::from_msg("ring size must be positive")).with_node("minimum_ring_size");
        }
        if self.minimum_ring_size > self.maximum_ring_size {
            return Err(GenericError::from_msg(format!(
                "minimum ring size {} is larger than the maximum {}",
                self.minimum_ring_size, self.maximum_ring_size
            )))
            .with_node("maximum_ring_size");
        }
        Ok(())
    }
}

impl Default for RingHashConfig {
    fn default() -> Self {
        Self {
            minimum_ring_size: Self::DEFAULT_MINIMUM_RING_SIZE,
            maximum_ring_size: Self::DEFAULT_MAXIMUM_RING_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
pub struct MaglevConfig {}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LbEndpoint {
    pub address: SocketAddr,
    #[serde(default = "default_weight")]
    pub load_balancing_weight: NonZeroU32,
}

const fn default_weight() -> NonZeroU32 {
    NonZeroU32::MIN
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LbEndpointDeser {
    LbEndpoint(LbEndpoint),
    Address(SocketAddr),
}

#[derive(Deserialize)]
#[serde(transparent)]
struct LbEndpointVecDeser(Vec<LbEndpointDeser>);

impl From<LbEndpointVecDeser> for Vec<LbEndpoint> {
    fn from(value: LbEndpointVecDeser) -> Self {
        value
            .0
            .into_iter()
            .map(|endpoint| match endpoint {
                LbEndpointDeser::LbEndpoint(endpoint) => endpoint,
                LbEndpointDeser::Address(address) => LbEndpoint { address, load_balancing_weight: default_weight() },
            })
            .collect()
    }
}

fn deser_through<'de, In: Deserialize<'de>, Out: From<In>, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Out, D::Error> {
    In::deserialize(deserializer).map(Out::from)
}
