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
    hash::{Hash, Hasher},
    net::SocketAddr,
};

use compact_str::CompactString;
use http::{HeaderName, Request};
use serde::{Deserialize, Serialize};

/// One step of the request hash computation. Policies are applied in order, each one
/// feeding its value into the same hasher.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct HashPolicy {
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub policy_specifier: PolicySpecifier,
    #[serde(skip_serializing_if = "std::ops::Not::not", default = "Default::default")]
    pub terminal: bool,
}

#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum HashPolicyResult {
    Applied,
    Skipped,
    Terminal,
}

impl HashPolicy {
    pub fn apply<B>(&self, hasher: &mut impl Hasher, req: &Request<B>, src_addr: SocketAddr) -> HashPolicyResult {
        let applied = match &self.policy_specifier {
            PolicySpecifier::SourceIp(true) => {
                src_addr.hash(hasher);
                true
            },
            PolicySpecifier::SourceIp(false) => false,
            PolicySpecifier::Header(name) => req.headers().get(name).inspect(|value| value.hash(hasher)).is_some(),
            PolicySpecifier::QueryParameter(name) => req
                .uri()
                .query()
                .and_then(|query| {
                    // first matching key wins, names are case-sensitive
                    url::form_urlencoded::parse(query.as_bytes()).find(|(key, _value)| key == name.as_str())
                })
                .inspect(|(_key, value)| value.hash(hasher))
                .is_some(),
        };

        match (applied, self.terminal) {
            (true, true) => HashPolicyResult::Terminal,
            (true, false) => HashPolicyResult::Applied,
            (false, _) => HashPolicyResult::Skipped,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PolicySpecifier {
    SourceIp(bool),
    Header(#[serde(with = "http_serde_ext::header_name")] HeaderName),
    QueryParameter(CompactString),
}

#[cfg(test)]
mod test {
    use std::{collections::hash_map::DefaultHasher, hash::Hasher, net::SocketAddr};

    use http::{HeaderName, Request};

    use super::{HashPolicy, HashPolicyResult, PolicySpecifier};

    #[test]
    fn deserialize_policies() {
        let policies: Vec<HashPolicy> = serde_yaml::from_str(
            r#"
- policy_specifier: { header: "X-User-Id" }
- policy_specifier: { query_parameter: "session" }
  terminal: true
- policy_specifier: { source_ip: true }
"#,
        )
        .unwrap();

        assert_eq!(policies[0].policy_specifier, PolicySpecifier::Header(HeaderName::from_static("x-user-id")));
        assert!(!policies[0].terminal);
        assert_eq!(policies[1].policy_specifier, PolicySpecifier::QueryParameter("session".into()));
        assert!(policies[1].terminal);
        assert_eq!(policies[2].policy_specifier, PolicySpecifier::SourceIp(true));
    }

    #[test]
    fn skipped_policies_do_not_touch_the_hasher() {
        let request = Request::builder().uri("https://example.com/?other=1").body(()).unwrap();
        let source = SocketAddr::from(([10, 0, 0, 1], 4000));
        let policy =
            HashPolicy { policy_specifier: PolicySpecifier::QueryParameter("session".into()), terminal: true };

        let mut hasher = DefaultHasher::new();
        let untouched = DefaultHasher::new().finish();
        assert_eq!(policy.apply(&mut hasher, &request, source), HashPolicyResult::Skipped);
        assert_eq!(hasher.finish(), untouched);

        let disabled = HashPolicy { policy_specifier: PolicySpecifier::SourceIp(false), terminal: false };
        assert_eq!(disabled.apply(&mut hasher, &request, source), HashPolicyResult::Skipped);
    }

    #[test]
    fn terminal_policy_reports_terminal() {
        let request = Request::builder().uri("https://example.com/").header("x-user-id", "42").body(()).unwrap();
        let source = SocketAddr::from(([10, 0, 0, 1], 4000));
        let policy = HashPolicy {
            policy_specifier: PolicySpecifier::Header(HeaderName::from_static("x-user-id")),
            terminal: true,
        };
        assert_eq!(policy.apply(&mut DefaultHasher::new(), &request, source), HashPolicyResult::Terminal);
    }
}
