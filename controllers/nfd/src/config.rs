//! Operator configuration, read once from the environment at startup.

use crate::error::ControllerError;
use std::env;
use std::net::SocketAddr;

pub const DEFAULT_OPERAND_NAMESPACE: &str = "node-feature-discovery";
pub const DEFAULT_PROBE_ADDR: &str = "0.0.0.0:8081";
pub const DEFAULT_RECONCILE_CONCURRENCY: u16 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Namespace holding every operand object
    pub operand_namespace: String,
    /// Listen address of the /healthz and /readyz server
    pub probe_addr: SocketAddr,
    /// Maximum reconciles running at once
    pub reconcile_concurrency: u16,
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let operand_namespace = get("OPERAND_NAMESPACE")
            .unwrap_or_else(|| DEFAULT_OPERAND_NAMESPACE.to_string());

        let probe_addr = get("PROBE_ADDR")
            .unwrap_or_else(|| DEFAULT_PROBE_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ControllerError::InvalidConfig(format!("PROBE_ADDR: {e}")))?;

        let reconcile_concurrency = match get("RECONCILE_CONCURRENCY") {
            None => DEFAULT_RECONCILE_CONCURRENCY,
            Some(raw) => match raw.trim().parse::<u16>() {
                Ok(0) => {
                    return Err(ControllerError::InvalidConfig(
                        "RECONCILE_CONCURRENCY must be at least 1".to_string(),
                    ))
                }
                Ok(n) => n,
                Err(e) => {
                    return Err(ControllerError::InvalidConfig(format!(
                        "RECONCILE_CONCURRENCY={raw}: {e}"
                    )))
                }
            },
        };

        Ok(Self {
            operand_namespace,
            probe_addr,
            reconcile_concurrency,
        })
    }
}
