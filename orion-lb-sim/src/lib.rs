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

use orion_configuration::{config::Config, options::Options};

mod simulate;

pub use simulate::{ClusterReport, HostReport, Simulation};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] orion_configuration::Error),
    #[error(transparent)]
    Balancer(#[from] orion_lb::Error),
    #[error("failed to build a synthetic request")]
    Request(#[from] http::Error),
    #[error("failed to reload the tracing subscriber")]
    Tracing(#[from] tracing_subscriber::reload::Error),
}

pub type Result<T> = ::core::result::Result<T, Error>;

pub fn run() -> Result<()> {
    let mut tracing_manager = sim_tracing::TracingManager::new();

    let options = Options::parse_options();
    let Config { logging, clusters } = Config::new(&options)?;

    tracing_manager.update(logging)?;

    let simulation = Simulation::new(&options);
    tracing::info!(
        clusters = clusters.len(),
        requests = simulation.requests(),
        in_flight = simulation.in_flight(),
        "starting simulation"
    );
    for cluster in &clusters {
        let report = simulation.run_cluster(cluster)?;
        report.log();
        println!("{report}");
    }
    Ok(())
}

mod sim_tracing {
    use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
    use tracing_subscriber::{
        filter::LevelFilter,
        fmt,
        fmt::format::{DefaultFields, Format},
        layer::Layered,
        reload,
        reload::Handle,
        EnvFilter, Registry,
    };

    use orion_configuration::config::Log;

    use crate::Result;

    type FilteredRegistry = Layered<reload::Layer<EnvFilter, Registry>, Registry>;
    type OutputLayer = fmt::Layer<FilteredRegistry, DefaultFields, Format, NonBlocking>;

    /// Owns the log writer and allows swapping the filter and the output once the configuration
    /// has been read. Logs written before that go to stdout at `info`.
    pub struct TracingManager {
        guard: WorkerGuard,
        filter_handle: Handle<EnvFilter, Registry>,
        output_handle: Handle<OutputLayer, FilteredRegistry>,
    }

    impl TracingManager {
        pub fn new() -> Self {
            use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

            let env_filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).parse_lossy(""));
            let (env_filter, filter_handle) = reload::Layer::new(env_filter);

            let (guard, output) = Self::stdout_layer();
            let (output, output_handle) = reload::Layer::new(output);

            Registry::default().with(env_filter).with(output).init();
            TracingManager { guard, filter_handle, output_handle }
        }

        pub fn update(&mut self, mut log: Log) -> Result<()> {
            let env_filter = log.env_filter();
            self.filter_handle.modify(|filter| *filter = env_filter)?;

            if let Some(log_file) = log.log_file {
                let (guard, file_layer) = Self::file_layer(&log_file, log.log_directory.as_deref());
                self.output_handle.modify(|output| *output = file_layer)?;
                // the previous writer flushes when its guard is dropped
                self.guard = guard;
                tracing::info!(log_file = %log_file, "logging to file");
            }
            Ok(())
        }

        fn stdout_layer() -> (WorkerGuard, OutputLayer) {
            let out = std::io::stdout();
            let is_terminal = std::io::IsTerminal::is_terminal(&out);
            let (non_blocking, guard) = tracing_appender::non_blocking(out);
            (guard, fmt::layer().with_writer(non_blocking).with_ansi(is_terminal))
        }

        fn file_layer(log_file: &str, log_directory: Option<&str>) -> (WorkerGuard, OutputLayer) {
            let file_appender = tracing_appender::rolling::hourly(log_directory.unwrap_or("."), log_file);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            (guard, fmt::layer().with_ansi(false).with_writer(non_blocking))
        }
    }
}
