//! Execution context: which backends implement functions, which array class
//! holds their storage, and which device they run on.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{DType, Device, NablaError, Result};

/// Environment variable holding a comma-separated backend priority list.
pub const ENV_BACKEND: &str = "NABLA_BACKEND";
/// Environment variable overriding the array class.
pub const ENV_ARRAY_CLASS: &str = "NABLA_ARRAY_CLASS";
/// Environment variable overriding the device id.
pub const ENV_DEVICE_ID: &str = "NABLA_DEVICE_ID";

/// A function's execution context.
///
/// `backend` is a priority list of `name:type_config` entries such as
/// `"accel:float"` or `"cpu:double"`; the registry picks the first entry
/// with a registered implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub backend: Vec<String>,
    pub array_class: String,
    pub device_id: String,
}

/// One parsed entry of [`Context::backend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSpec {
    pub name: String,
    pub type_config: String,
}

impl BackendSpec {
    /// Parse `"name:type_config"`. A missing type config means `"float"`.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (name, type_config) = match s.split_once(':') {
            Some((n, t)) => (n.trim(), t.trim()),
            None => (s, "float"),
        };
        if name.is_empty() || type_config.is_empty() {
            return Err(NablaError::InvalidContext(format!("malformed backend '{s}'")));
        }
        Ok(Self {
            name: name.to_string(),
            type_config: type_config.to_string(),
        })
    }

    /// Element dtype selected by the type config, if known.
    pub fn dtype(&self) -> Option<DType> {
        DType::from_type_config(&self.type_config)
    }
}

impl fmt::Display for BackendSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.type_config)
    }
}

/// Parse a device id string as a non-negative device ordinal.
///
/// Surrounding whitespace is tolerated; signs, empty strings and anything
/// that is not a plain integer are rejected.
pub fn parse_device_id(id: &str) -> Result<usize> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(NablaError::InvalidDeviceId {
            id: id.to_string(),
            reason: "empty".into(),
        });
    }
    if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NablaError::InvalidDeviceId {
            id: id.to_string(),
            reason: "not a non-negative integer".into(),
        });
    }
    trimmed.parse::<usize>().map_err(|e| NablaError::InvalidDeviceId {
        id: id.to_string(),
        reason: e.to_string(),
    })
}

impl Context {
    /// Create a context from its three parts.
    pub fn new(backend: &[&str], array_class: &str, device_id: &str) -> Self {
        Self {
            backend: backend.iter().map(|b| b.to_string()).collect(),
            array_class: array_class.to_string(),
            device_id: device_id.to_string(),
        }
    }

    /// Host context computing in f32.
    pub fn cpu() -> Self {
        Self::new(&["cpu:float"], "CpuCachedArray", "0")
    }

    /// Parsed device ordinal.
    pub fn device_index(&self) -> Result<usize> {
        parse_device_id(&self.device_id)
    }

    /// Device that arrays of this context's array class live on.
    pub fn storage_device(&self) -> Result<Device> {
        let idx = self.device_index()?;
        Device::for_array_class(&self.array_class, idx).ok_or_else(|| {
            NablaError::InvalidContext(format!("unknown array class '{}'", self.array_class))
        })
    }

    /// Parsed backend priority list.
    pub fn backends(&self) -> Result<Vec<BackendSpec>> {
        if self.backend.is_empty() {
            return Err(NablaError::InvalidContext("empty backend list".into()));
        }
        self.backend.iter().map(|b| BackendSpec::parse(b)).collect()
    }

    /// Copy of this context with a different backend list.
    pub fn with_backend(&self, backend: &[&str]) -> Self {
        Self {
            backend: backend.iter().map(|b| b.to_string()).collect(),
            ..self.clone()
        }
    }

    /// Load a context from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| NablaError::InvalidContext(format!("context JSON: {e}")))
    }

    /// Serialize this context to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| NablaError::InvalidContext(format!("context JSON: {e}")))
    }

    /// Build a context from `NABLA_BACKEND`, `NABLA_ARRAY_CLASS` and
    /// `NABLA_DEVICE_ID`, falling back to [`Context::cpu`] for unset values.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut ctx = Self::cpu();
        if let Some(backend) = lookup(ENV_BACKEND) {
            ctx.backend = backend
                .split(',')
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(class) = lookup(ENV_ARRAY_CLASS) {
            ctx.array_class = class;
        }
        if let Some(id) = lookup(ENV_DEVICE_ID) {
            ctx.device_id = id;
        }
        // Validate eagerly so a bad environment fails at startup.
        ctx.backends()?;
        ctx.storage_device()?;
        tracing::debug!("context from environment: {}", ctx);
        Ok(ctx)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::cpu()
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Context(backend={:?}, array_class={}, device_id={})",
            self.backend, self.array_class, self.device_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_device_id() {
        assert_eq!(parse_device_id("0").unwrap(), 0);
        assert_eq!(parse_device_id(" 3 ").unwrap(), 3);
        assert!(parse_device_id("").is_err());
        assert!(parse_device_id("-1").is_err());
        assert!(parse_device_id("+1").is_err());
        assert!(parse_device_id("gpu0").is_err());
        assert!(parse_device_id("1.5").is_err());
        assert!(parse_device_id("99999999999999999999999999").is_err());
    }

    #[test]
    fn test_backend_spec() {
        let b = BackendSpec::parse("accel:double").unwrap();
        assert_eq!(b.name, "accel");
        assert_eq!(b.dtype(), Some(DType::F64));

        let b = BackendSpec::parse("cpu").unwrap();
        assert_eq!(b.type_config, "float");
        assert_eq!(b.to_string(), "cpu:float");

        assert!(BackendSpec::parse(":float").is_err());
        assert!(BackendSpec::parse("cpu:").is_err());
    }

    #[test]
    fn test_storage_device() {
        let ctx = Context::new(&["accel:float"], "CudaCachedArray", "1");
        assert_eq!(ctx.storage_device().unwrap(), Device::Cuda(1));
        assert_eq!(Context::cpu().storage_device().unwrap(), Device::Cpu);

        let bad = Context::new(&["cpu:float"], "WeirdArray", "0");
        assert!(bad.storage_device().is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let ctx = Context::new(&["accel:float", "cpu:float"], "CpuArray", "0");
        let json = ctx.to_json().unwrap();
        assert_eq!(Context::from_json(&json).unwrap(), ctx);
        assert!(Context::from_json("{\"backend\": 3}").is_err());
    }

    #[test]
    fn test_from_lookup() {
        let mut env = HashMap::new();
        env.insert(ENV_BACKEND, "accel:double, cpu:double".to_string());
        env.insert(ENV_DEVICE_ID, "2".to_string());
        let ctx = Context::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert_eq!(ctx.backend, vec!["accel:double", "cpu:double"]);
        assert_eq!(ctx.array_class, "CpuCachedArray");
        assert_eq!(ctx.device_index().unwrap(), 2);

        let ctx = Context::from_lookup(|_| None).unwrap();
        assert_eq!(ctx, Context::cpu());

        env.insert(ENV_DEVICE_ID, "x".to_string());
        assert!(Context::from_lookup(|k| env.get(k).cloned()).is_err());
    }
}
