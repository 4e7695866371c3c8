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

use std::{num::NonZeroUsize, path::PathBuf};

use clap::Parser;

#[derive(Parser, Debug, Clone)]
pub struct Options {
    #[arg(help = "Configuration file", short = 'c', long = "config")]
    pub config: PathBuf,
    #[arg(help = "Number of requests to simulate per cluster", short = 'n', long = "requests", default_value = "10000")]
    pub requests: NonZeroUsize,
    #[arg(help = "Number of requests kept open while simulating", long = "in-flight", default_value = "64")]
    pub in_flight: usize,
    #[arg(help = "Seed for the synthetic traffic generator", long = "seed", default_value = "1")]
    pub seed: u64,
}

impl Options {
    pub fn parse_options() -> Self {
        Options::parse()
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { config: path.into(), requests: NonZeroUsize::MIN.saturating_add(9999), in_flight: 64, seed: 1 }
    }
}
