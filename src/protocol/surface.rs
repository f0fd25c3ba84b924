use std::collections::BTreeMap;

use serde_json::Value;

use super::{Member, Method};
use crate::error::{CapabilityError, CapabilityResult};

/// Flat namespace of every composed protocol member.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySurface {
    members: BTreeMap<String, Member>,
}

impl CapabilitySurface {
    /// Applies the merge rule: methods overwrite, properties only fill free names.
    pub(crate) fn merge(&mut self, name: String, member: Member) {
        if member.is_callable() {
            self.members.insert(name, member);
        } else {
            self.members.entry(name).or_insert(member);
        }
    }

    pub fn call(&self, name: &str, args: &[Value]) -> CapabilityResult<Value> {
        match self.members.get(name) {
            Some(Member::Method(method)) => method(args),
            Some(Member::Property(_)) => Err(CapabilityError::NotCallable(name.to_string())),
            None => Err(CapabilityError::NotFound(name.to_string())),
        }
    }

    pub fn method(&self, name: &str) -> Option<Method> {
        match self.members.get(name) {
            Some(Member::Method(method)) => Some(method.clone()),
            _ => None,
        }
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        match self.members.get(name) {
            Some(Member::Property(value)) => Some(value),
            _ => None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    /// Member names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.members.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
