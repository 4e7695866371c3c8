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
    borrow::Cow,
    error::Error,
    fmt::{Debug, Display},
};

pub(crate) fn is_default<T: PartialEq + Default>(value: &T) -> bool {
    *value == T::default()
}

enum TraceNode {
    Field(Cow<'static, str>),
    Name(Cow<'static, str>),
    Index(usize),
}

impl Display for TraceNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceNode::Field(field) => f.write_str(field),
            TraceNode::Name(name) => write!(f, "[\"{name}\"]"),
            TraceNode::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// Path from the configuration root down to the value that failed validation.
/// Nodes are pushed innermost first while the error bubbles up.
struct FieldTrace {
    vec: Vec<TraceNode>,
}

impl Display for FieldTrace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut iter = self.vec.iter().rev();
        if let Some(first) = iter.next() {
            first.fmt(f)?;
        }
        for node in iter {
            match node {
                TraceNode::Field(_) => f.write_str(" / ")?,
                TraceNode::Name(_) | TraceNode::Index(_) => f.write_str(" ")?,
            }
            node.fmt(f)?;
        }
        Ok(())
    }
}

impl Debug for FieldTrace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

#[derive(thiserror::Error, Debug)]
#[allow(private_interfaces)]
pub enum GenericError {
    #[error("Error parsing field {0}")]
    TracedError(FieldTrace, #[source] Box<Self>),
    #[error("{0}")]
    MessageWithCause(Cow<'static, str>, #[source] Box<dyn Error + Send + Sync + 'static>),
    #[error("{0}")]
    Message(Cow<'static, str>),
    #[error("Missing field: {0}")]
    MissingField(&'static str),
}

impl GenericError {
    #[must_use]
    pub(crate) fn with_node<T: Into<Cow<'static, str>>>(self, node: T) -> Self {
        self.with_trace_node(TraceNode::Field(node.into()))
    }

    #[must_use]
    pub(crate) fn with_index(self, index: usize) -> Self {
        self.with_trace_node(TraceNode::Index(index))
    }

    #[must_use]
    pub(crate) fn with_name<T: Into<Cow<'static, str>>>(self, name: T) -> Self {
        self.with_trace_node(TraceNode::Name(name.into()))
    }

    #[must_use]
    fn with_trace_node(self, node: TraceNode) -> Self {
        match self {
            Self::TracedError(mut fields, error) => {
                fields.vec.push(node);
                Self::TracedError(fields, error)
            },
            other => Self::TracedError(FieldTrace { vec: vec![node] }, Box::new(other)),
        }
    }

    pub fn from_msg<T: Into<Cow<'static, str>>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn from_msg_with_cause<T: Into<Cow<'static, str>>, E: Error + Send + Sync + 'static>(msg: T, cause: E) -> Self {
        Self::MessageWithCause(msg.into(), cause.into())
    }

    /// The field path leading to the failing value, if the error was raised during validation.
    pub fn field_path(&self) -> Option<String> {
        match self {
            Self::TracedError(fields, _) => Some(fields.to_string()),
            _ => None,
        }
    }
}

pub(crate) trait WithNodeOnResult {
    fn with_node<T: Into<Cow<'static, str>>>(self, node: T) -> Self;
    fn with_index(self, index: usize) -> Self;
    fn with_name<T: Into<Cow<'static, str>>>(self, name: T) -> Self;
}

impl<T> WithNodeOnResult for Result<T, GenericError> {
    fn with_node<Node: Into<Cow<'static, str>>>(self, node: Node) -> Self {
        self.map_err(|e| e.with_node(node))
    }

    fn with_index(self, index: usize) -> Self {
        self.map_err(|e| e.with_index(index))
    }

    fn with_name<Node: Into<Cow<'static, str>>>(self, name: Node) -> Self {
        self.map_err(|e| e.with_name(name))
    }
}

#[cfg(test)]
mod test {
    use super::{GenericError, WithNodeOnResult};

    #[test]
    fn field_path_is_rendered_outermost_first() {
        let result: Result<(), GenericError> = Err(GenericError::from_msg("bad value"));
        let err = result
            .with_node("hash_balance_factor")
            .with_name("backend")
            .with_index(0)
            .with_node("clusters")
            .unwrap_err();

        assert_eq!(err.field_path().as_deref(), Some("clusters [0] [\"backend\"] / hash_balance_factor"));
        assert_eq!(err.to_string(), "Error parsing field clusters [0] [\"backend\"] / hash_balance_factor");
    }

    #[test]
    fn plain_errors_have_no_path() {
        assert!(GenericError::from_msg("oops").field_path().is_none());
    }
}
