use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// Prefix that resolves a placeholder from the process environment.
const ENV_PREFIX: &str = "env:";

/// Runtime parameters passed to a config, e.g. the password via `-P password=...`.
#[derive(Debug, Clone, Default)]
pub struct Params {
    values: HashMap<String, String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter value.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse from CLI args like "key=value".
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut params = Self::new();
        for arg in args {
            let (key, value) = arg.split_once('=').ok_or_else(|| {
                Error::Config(format!("invalid param '{}', expected key=value", arg))
            })?;
            params.values.insert(key.to_string(), value.to_string());
        }
        Ok(params)
    }
}

/// Parameter definition in config.
#[derive(Debug, Clone, Deserialize)]
pub struct ParamDef {
    #[serde(default)]
    pub required: bool,

    pub default: Option<String>,

    pub description: Option<String>,
}

fn lookup(
    name: &str,
    params: &Params,
    defs: &HashMap<String, ParamDef>,
) -> Result<Option<String>> {
    if let Some(var) = name.strip_prefix(ENV_PREFIX) {
        return std::env::var(var).map(Some).map_err(|_| {
            Error::Config(format!("environment variable {} is not set", var))
        });
    }
    if let Some(v) = params.get(name) {
        return Ok(Some(v.to_string()));
    }
    match defs.get(name) {
        Some(ParamDef {
            default: Some(default),
            ..
        }) => Ok(Some(default.clone())),
        Some(ParamDef { required: true, .. }) => Err(Error::Config(format!(
            "missing required parameter: {} (pass -P {}=...)",
            name, name
        ))),
        Some(_) => Ok(Some(String::new())),
        // Unknown placeholders are left verbatim.
        None => Ok(None),
    }
}

/// Substitute `${var}` and `${env:VAR}` patterns in a string.
pub fn substitute(
    template: &str,
    params: &Params,
    defs: &HashMap<String, ParamDef>,
) -> Result<String> {
    let mut result = template.to_string();
    let mut start = 0;

    while let Some(offset) = result[start..].find("${") {
        let var_start = start + offset;
        let Some(len) = result[var_start..].find('}') else {
            break;
        };
        let var_end = var_start + len;

        match lookup(&result[var_start + 2..var_end], params, defs)? {
            Some(value) => {
                result.replace_range(var_start..=var_end, &value);
                start = var_start + value.len();
            }
            None => start = var_end + 1,
        }
    }

    Ok(result)
}

/// Recursively substitute params in a serde_yaml::Value.
pub fn substitute_value(
    value: &mut serde_yaml::Value,
    params: &Params,
    defs: &HashMap<String, ParamDef>,
) -> Result<()> {
    match value {
        serde_yaml::Value::String(s) => {
            *s = substitute(s, params, defs)?;
        }
        serde_yaml::Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                substitute_value(v, params, defs)?;
            }
        }
        serde_yaml::Value::Sequence(seq) => {
            for v in seq.iter_mut() {
                substitute_value(v, params, defs)?;
            }
        }
        _ => {}
    }
    Ok(())
}
