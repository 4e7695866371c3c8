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

pub mod cluster;
pub use cluster::Cluster;
pub mod common;
pub use common::GenericError;
pub mod hash_policy;
pub use hash_policy::HashPolicy;
pub mod log;
pub use log::Log;

use std::{fs::File, path::Path};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{options::Options, Result};
use common::{is_default, WithNodeOnResult};

#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct Config {
    #[serde(skip_serializing_if = "is_default", default)]
    pub logging: Log,
    #[serde(skip_serializing_if = "Vec::is_empty", default = "Default::default")]
    pub clusters: Vec<Cluster>,
}

impl Config {
    pub fn new(opt: &Options) -> Result<Self> {
        let config: Self = deserialize_yaml(&opt.config)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        cluster::validate_clusters(&self.clusters).with_node("clusters")
    }
}

pub fn deserialize_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)
        .map_err(|e| GenericError::from_msg_with_cause(format!("failed to open \"{}\"", path.display()), e))?;
    serde_path_to_error::deserialize(serde_yaml::Deserializer::from_reader(&file))
        .map_err(|e| GenericError::from_msg_with_cause(format!("failed to deserialize \"{}\"", path.display()), e))
}
