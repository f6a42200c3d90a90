//! Credential requirement scanning and just-in-time injection.
//!
//! The engine reads secrets from an external store, substitutes them into
//! a copy of an action payload immediately before dispatch, and wipes the
//! plaintext as soon as the dispatcher returns. Credential values never
//! enter `ExecutionState`, step history, or logs.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use regex_lite::Regex;
use serde_json::Value;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};
use crate::workflow::{Action, ActionType, WorkflowDocument};

/// A named credential requirement: one field of one service.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CredentialRef {
    pub service: String,
    pub field: String,
}

impl fmt::Display for CredentialRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.service, self.field)
    }
}

/// A secret value that zeroizes its backing storage on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue([REDACTED])")
    }
}

/// Read-only boundary to the external credential store.
/// The engine never writes it.
pub trait CredentialStore: Send + Sync {
    fn get(&self, service: &str, field: &str) -> Option<SecretValue>;
}

/// In-memory store for tests and embedding hosts that manage their own
/// secret material.
#[derive(Default)]
pub struct MemoryCredentialStore {
    values: HashMap<(String, String), SecretValue>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, service: &str, field: &str, value: &str) {
        self.values.insert(
            (service.to_string(), field.to_string()),
            SecretValue::new(value),
        );
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, service: &str, field: &str) -> Option<SecretValue> {
        self.values
            .get(&(service.to_string(), field.to_string()))
            .cloned()
    }
}

fn placeholder_regex() -> Regex {
    // {{ service.field }}
    Regex::new(r"\{\{\s*([A-Za-z0-9_-]+)\.([A-Za-z0-9_-]+)\s*\}\}").expect("valid pattern")
}

fn collect_placeholders(value: &Value, re: &Regex, out: &mut BTreeSet<CredentialRef>) {
    match value {
        Value::String(s) => {
            for caps in re.captures_iter(s) {
                out.insert(CredentialRef {
                    service: caps[1].to_string(),
                    field: caps[2].to_string(),
                });
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_placeholders(item, re, out);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_placeholders(item, re, out);
            }
        }
        _ => {}
    }
}

/// Build the full requirement set for a document: every declared
/// `credentials_required` entry plus every placeholder reference found in
/// action payloads.
pub fn scan_requirements(document: &WorkflowDocument) -> BTreeSet<CredentialRef> {
    let re = placeholder_regex();
    let mut refs = BTreeSet::new();

    for node in &document.nodes {
        for (service, fields) in &node.credentials_required {
            for field in fields {
                refs.insert(CredentialRef {
                    service: service.clone(),
                    field: field.clone(),
                });
            }
        }
        for action in &node.actions {
            collect_placeholders(&action.data, &re, &mut refs);
            if let Some(target) = &action.target {
                collect_placeholders(&Value::String(target.clone()), &re, &mut refs);
            }
        }
    }

    refs
}

/// Run-start gate: verify every requirement resolves. Fails closed with
/// the full list of unresolved references; the run must not start.
pub fn validate_all(document: &WorkflowDocument, store: &dyn CredentialStore) -> Result<()> {
    let missing: Vec<String> = scan_requirements(document)
        .into_iter()
        .filter(|r| store.get(&r.service, &r.field).is_none())
        .map(|r| r.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::CredentialMissing { missing })
    }
}

/// An action with credentials substituted in, ready for dispatch.
///
/// Holds the only in-memory copy of the resolved plaintext. The payload is
/// wiped on drop, and the task handler additionally calls [`Self::wipe`]
/// the moment the dispatcher returns.
pub struct InjectedAction {
    pub action_type: ActionType,
    pub target: Option<String>,
    pub data: Value,
    pub timeout_ms: u64,
    wiped: bool,
}

impl InjectedAction {
    /// Overwrite every string in the payload and target, then clear them.
    pub fn wipe(&mut self) {
        if self.wiped {
            return;
        }
        wipe_value(&mut self.data);
        if let Some(target) = &mut self.target {
            target.zeroize();
        }
        self.data = Value::Null;
        self.target = None;
        self.wiped = true;
    }
}

impl Drop for InjectedAction {
    fn drop(&mut self) {
        self.wipe();
    }
}

impl fmt::Debug for InjectedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectedAction")
            .field("action_type", &self.action_type)
            .field("data", &"[REDACTED]")
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

fn wipe_value(value: &mut Value) {
    match value {
        Value::String(s) => s.zeroize(),
        Value::Array(items) => {
            for item in items {
                wipe_value(item);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                wipe_value(item);
            }
        }
        _ => {}
    }
}

fn substitute_str(input: &str, re: &Regex, store: &dyn CredentialStore) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for caps in re.captures_iter(input) {
        let whole = caps.get(0).expect("capture 0");
        let (service, field) = (&caps[1], &caps[2]);
        let secret = store.get(service, field).ok_or_else(|| Error::CredentialMissing {
            missing: vec![format!("{}.{}", service, field)],
        })?;
        out.push_str(&input[last..whole.start()]);
        out.push_str(secret.expose());
        last = whole.end();
    }
    out.push_str(&input[last..]);
    Ok(out)
}

fn substitute_value(value: &Value, re: &Regex, store: &dyn CredentialStore) -> Result<Value> {
    Ok(match value {
        Value::String(s) => Value::String(substitute_str(s, re, store)?),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| substitute_value(v, re, store))
                .collect::<Result<_>>()?,
        ),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), substitute_value(v, re, store)?);
            }
            Value::Object(out)
        }
        other => other.clone(),
    })
}

/// Resolve only the credentials this action references and substitute them
/// into a copy of the payload. Unresolved placeholders fail closed: a
/// literal `{{...}}` is never forwarded to the dispatcher.
pub fn inject(action: &Action, store: &dyn CredentialStore) -> Result<InjectedAction> {
    let re = placeholder_regex();
    let data = substitute_value(&action.data, &re, store)?;
    let target = action
        .target
        .as_deref()
        .map(|t| substitute_str(t, &re, store))
        .transpose()?;

    Ok(InjectedAction {
        action_type: action.action_type,
        target,
        data,
        timeout_ms: action.timeout_ms,
        wiped: false,
    })
}
