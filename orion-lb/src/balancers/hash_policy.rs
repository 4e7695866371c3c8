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

use std::{hash::Hasher, net::SocketAddr, ops::ControlFlow};

use http::Request;
use orion_configuration::config::hash_policy::{HashPolicy, HashPolicyResult};
use twox_hash::XxHash64;

/// Computes the hash of a request out of a list of hash policies.
#[derive(Clone, Debug)]
pub struct HashState<'a, B> {
    policies: &'a [HashPolicy],
    req: &'a Request<B>,
    src_addr: SocketAddr,
}

impl<'a, B> HashState<'a, B> {
    pub fn new(policies: &'a [HashPolicy], req: &'a Request<B>, src_addr: SocketAddr) -> Self {
        Self { policies, req, src_addr }
    }

    /// Returns `None` when no policy produced a value for this request.
    pub fn compute(self) -> Option<u64> {
        if self.policies.is_empty() {
            return None;
        }
        let mut hasher = DeterministicBuildHasher::build_hasher();
        let outcome = self.policies.iter().try_fold(false, |applied, policy| {
            match policy.apply(&mut hasher, self.req, self.src_addr) {
                HashPolicyResult::Applied => ControlFlow::Continue(true),
                HashPolicyResult::Skipped => ControlFlow::Continue(applied),
                HashPolicyResult::Terminal => ControlFlow::Break(()),
            }
        });
        match outcome {
            ControlFlow::Continue(applied) => applied.then(|| hasher.finish()),
            ControlFlow::Break(()) => Some(hasher.finish()),
        }
    }
}

/// Similar to [std::hash::BuildHasher] but with a fixed seed, so hashes are stable across
/// processes and restarts.
#[derive(Default)]
pub(crate) struct DeterministicBuildHasher;

impl DeterministicBuildHasher {
    const SEED: u64 = 0;

    pub fn build_hasher() -> XxHash64 {
        XxHash64::with_seed(Self::SEED)
    }

    pub fn hash_one_with_seed<T: std::hash::Hash>(x: T, seed: u64) -> u64 {
        let mut hasher = XxHash64::with_seed(seed);
        x.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod test {
    use std::{
        hash::{Hash, Hasher},
        net::SocketAddr,
    };

    use http::{HeaderName, HeaderValue, Request};
    use orion_configuration::config::hash_policy::{HashPolicy, PolicySpecifier};
    use twox_hash::XxHash64;

    use super::{DeterministicBuildHasher, HashState};

    struct ExpectedHash(XxHash64);

    impl ExpectedHash {
        fn new() -> Self {
            Self(DeterministicBuildHasher::build_hasher())
        }

        fn then<T: Hash>(mut self, value: T) -> Self {
            value.hash(&mut self.0);
            self
        }

        fn finish(self) -> u64 {
            self.0.finish()
        }
    }

    fn request(uri: &str, headers: &[(&str, &str)]) -> Request<()> {
        headers
            .iter()
            .fold(Request::builder().uri(uri), |builder, (key, value)| builder.header(*key, *value))
            .body(())
            .unwrap()
    }

    fn user_id() -> PolicySpecifier {
        PolicySpecifier::Header(HeaderName::from_static("x-user-id"))
    }

    fn session() -> PolicySpecifier {
        PolicySpecifier::QueryParameter("session".into())
    }

    fn policies(specifiers: &[(PolicySpecifier, bool)]) -> Vec<HashPolicy> {
        specifiers
            .iter()
            .map(|(policy_specifier, terminal)| HashPolicy { policy_specifier: policy_specifier.clone(), terminal: *terminal })
            .collect()
    }

    const SOURCE: SocketAddr = SocketAddr::V4(std::net::SocketAddrV4::new(std::net::Ipv4Addr::new(10, 1, 2, 3), 5000));

    fn compute(specifiers: &[(PolicySpecifier, bool)], req: &Request<()>) -> Option<u64> {
        HashState::new(&policies(specifiers), req, SOURCE).compute()
    }

    #[test]
    fn no_policies_no_hash() {
        assert_eq!(compute(&[], &request("http://svc/", &[("x-user-id", "7")])), None);
    }

    #[test]
    fn header_hashing() {
        let expected = ExpectedHash::new().then(HeaderValue::from_static("user-7")).finish();
        let single = [(user_id(), false)];

        assert_eq!(compute(&single, &request("http://svc/", &[("X-User-Id", "user-7")])), Some(expected));
        assert_eq!(
            compute(&single, &request("http://svc/", &[("accept", "*/*"), ("x-user-id", "user-7"), ("via", "lb")])),
            Some(expected)
        );
        assert_eq!(compute(&single, &request("http://svc/", &[("x-other-id", "user-7")])), None);
    }

    #[test]
    fn query_parameter_hashing() {
        let expected = ExpectedHash::new().then("abc").finish();
        let single = [(session(), false)];

        assert_eq!(compute(&single, &request("http://svc/cart?session=abc", &[])), Some(expected));
        assert_eq!(compute(&single, &request("http://svc/cart?page=2&session=abc&session=xyz", &[])), Some(expected));
        assert_eq!(compute(&single, &request("http://svc/cart?Session=abc", &[])), None);
        assert_eq!(compute(&single, &request("http://svc/cart", &[])), None);
    }

    #[test]
    fn source_ip_hashing() {
        let expected = ExpectedHash::new().then(SOURCE).finish();
        assert_eq!(compute(&[(PolicySpecifier::SourceIp(true), false)], &request("http://svc/", &[])), Some(expected));
        assert_eq!(compute(&[(PolicySpecifier::SourceIp(false), false)], &request("http://svc/", &[])), None);
    }

    #[test]
    fn chained_policies() {
        let chain = [(user_id(), false), (session(), false), (PolicySpecifier::SourceIp(true), false)];
        let both = request("http://svc/?session=abc", &[("x-user-id", "user-7")]);
        let header_only = request("http://svc/", &[("x-user-id", "user-7")]);

        assert_eq!(
            compute(&chain, &both),
            Some(ExpectedHash::new().then(HeaderValue::from_static("user-7")).then("abc").then(SOURCE).finish())
        );
        assert_eq!(
            compute(&chain, &header_only),
            Some(ExpectedHash::new().then(HeaderValue::from_static("user-7")).then(SOURCE).finish())
        );
    }

    #[test]
    fn terminal_policy_stops_the_chain() {
        let chain = [(user_id(), false), (session(), true), (PolicySpecifier::SourceIp(true), false)];

        assert_eq!(
            compute(&chain, &request("http://svc/?session=abc", &[("x-user-id", "user-7")])),
            Some(ExpectedHash::new().then(HeaderValue::from_static("user-7")).then("abc").finish())
        );
        // a skipped terminal policy does not stop anything
        assert_eq!(
            compute(&chain, &request("http://svc/", &[("x-user-id", "user-7")])),
            Some(ExpectedHash::new().then(HeaderValue::from_static("user-7")).then(SOURCE).finish())
        );
    }

    #[test]
    fn hashes_are_stable() {
        assert_eq!(DeterministicBuildHasher::hash_one_with_seed("backend", 0), ExpectedHash::new().then("backend").finish());
        assert_ne!(
            DeterministicBuildHasher::hash_one_with_seed("backend", 0),
            DeterministicBuildHasher::hash_one_with_seed("backend", 1)
        );
    }
}
