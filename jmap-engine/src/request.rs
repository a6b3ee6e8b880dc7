// jmap-engine/src/request.rs
use std::collections::{BTreeSet, HashMap, HashSet};

use serde::de::Error as _;
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::JmapError;
use crate::registry::{Capability, Method};

/// One `[methodName, arguments, tag]` entry of a request
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    method: Method,
    parameters: Value,
    tag: String,
}

impl Invocation {
    pub fn new<P: Serialize>(
        method: Method,
        parameters: &P,
        tag: impl Into<String>,
    ) -> Result<Self, JmapError> {
        let parameters = serde_json::to_value(parameters).map_err(JmapError::encoding)?;
        if !parameters.is_object() {
            return Err(JmapError::request(format!(
                "arguments of {} must be a JSON object",
                method
            )));
        }
        Ok(Self {
            method,
            parameters,
            tag: tag.into(),
        })
    }

    /// Build from a method name string; names missing from the registry are rejected.
    pub fn from_name(name: &str, parameters: Value, tag: impl Into<String>) -> Result<Self, JmapError> {
        let method = Method::from_name(name)
            .ok_or_else(|| JmapError::request(format!("unknown method '{}'", name)))?;
        Self::new(method, &parameters, tag)
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    fn account_id(&self) -> Option<&str> {
        self.parameters.get("accountId").and_then(Value::as_str)
    }
}

impl Serialize for Invocation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(3)?;
        tuple.serialize_element(self.method.name())?;
        tuple.serialize_element(&self.parameters)?;
        tuple.serialize_element(&self.tag)?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for Invocation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (name, parameters, tag) = <(String, Value, String)>::deserialize(deserializer)?;
        Invocation::from_name(&name, parameters, tag).map_err(D::Error::custom)
    }
}

/// Ask the server to substitute part of an earlier result in place of an argument.
///
/// Used as the value of a `#`-prefixed argument, e.g. `"#ids"`. The `*` path
/// segment maps over an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultReference {
    #[serde(rename = "resultOf")]
    pub result_of: String,
    pub name: Method,
    pub path: String,
}

impl ResultReference {
    pub fn new(result_of: impl Into<String>, name: Method, path: impl Into<String>) -> Self {
        Self {
            result_of: result_of.into(),
            name,
            path: path.into(),
        }
    }
}

/// A batch ready to be sent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    using: Vec<Capability>,
    #[serde(rename = "methodCalls")]
    method_calls: Vec<Invocation>,
    #[serde(rename = "createdIds")]
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    created_ids: Option<HashMap<String, String>>,
}

impl Request {
    pub fn capabilities(&self) -> &[Capability] {
        &self.using
    }

    pub fn invocations(&self) -> &[Invocation] {
        &self.method_calls
    }

    pub fn invocation(&self, tag: &str) -> Option<&Invocation> {
        self.method_calls.iter().find(|i| i.tag == tag)
    }

    /// Distinct `accountId` arguments across all invocations, in call order
    pub fn account_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.method_calls
            .iter()
            .filter_map(Invocation::account_id)
            .filter(|id| seen.insert(*id))
            .map(String::from)
            .collect()
    }

    pub fn to_json(&self) -> Result<Vec<u8>, JmapError> {
        serde_json::to_vec(self).map_err(JmapError::encoding)
    }
}

/// Assembles invocations into a [`Request`], enforcing the batch invariants
#[derive(Debug, Default)]
pub struct RequestBuilder {
    invocations: Vec<Invocation>,
    max_calls: Option<u64>,
    created_ids: Option<HashMap<String, String>>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upper bound on invocations, usually the session's `maxCallsInRequest`
    pub fn max_calls(mut self, max_calls: Option<u64>) -> Self {
        self.max_calls = max_calls;
        self
    }

    pub fn created_ids(mut self, created_ids: HashMap<String, String>) -> Self {
        self.created_ids = Some(created_ids);
        self
    }

    pub fn call(mut self, invocation: Invocation) -> Self {
        self.invocations.push(invocation);
        self
    }

    pub fn calls(mut self, invocations: impl IntoIterator<Item = Invocation>) -> Self {
        self.invocations.extend(invocations);
        self
    }

    pub fn build(self) -> Result<Request, JmapError> {
        if self.invocations.is_empty() {
            return Err(JmapError::request("a request needs at least one invocation"));
        }
        if let Some(max) = self.max_calls {
            if self.invocations.len() as u64 > max {
                return Err(JmapError::TooManyMethodCalls {
                    calls: self.invocations.len(),
                    max,
                });
            }
        }

        let mut earlier: HashMap<&str, Method> = HashMap::new();
        for invocation in &self.invocations {
            check_references(invocation, &earlier)?;
            if earlier.insert(&invocation.tag, invocation.method).is_some() {
                return Err(JmapError::request(format!(
                    "duplicate invocation tag '{}'",
                    invocation.tag
                )));
            }
        }

        let mut using = BTreeSet::from([Capability::Core]);
        for invocation in &self.invocations {
            using.insert(invocation.method.capability());
            // the server runs implicit calls under the capabilities of their own method
            using.extend(invocation.method.companions().map(Method::capability));
        }

        Ok(Request {
            using: using.into_iter().collect(),
            method_calls: self.invocations,
            created_ids: self.created_ids,
        })
    }
}

// References may only point at invocations that come before this one.
fn check_references(invocation: &Invocation, earlier: &HashMap<&str, Method>) -> Result<(), JmapError> {
    let Some(arguments) = invocation.parameters.as_object() else {
        return Ok(());
    };
    for (key, value) in arguments {
        let Some(plain) = key.strip_prefix('#') else {
            continue;
        };
        if arguments.contains_key(plain) {
            return Err(JmapError::request(format!(
                "invocation '{}' sets both '{}' and '{}'",
                invocation.tag, plain, key
            )));
        }
        let reference: ResultReference = serde_json::from_value(value.clone()).map_err(|e| {
            JmapError::request(format!(
                "malformed result reference '{}' in invocation '{}': {}",
                key, invocation.tag, e
            ))
        })?;
        match earlier.get(reference.result_of.as_str()) {
            None => {
                return Err(JmapError::request(format!(
                    "invocation '{}' references '{}', which is not an earlier invocation",
                    invocation.tag, reference.result_of
                )))
            }
            Some(&method) if method != reference.name => {
                return Err(JmapError::request(format!(
                    "invocation '{}' references {} but '{}' is {}",
                    invocation.tag, reference.name, reference.result_of, method
                )))
            }
            Some(_) => {}
        }
        if !reference.path.starts_with('/') {
            return Err(JmapError::request(format!(
                "result reference path '{}' must start with '/'",
                reference.path
            )));
        }
    }
    Ok(())
}
