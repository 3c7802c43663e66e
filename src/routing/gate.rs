use axum::http::Method;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("Origin {origin:?} is not allowed")]
    Forbidden { origin: Option<String> },

    #[error("Method {0} not allowed, only POST is accepted")]
    MethodNotAllowed(Method),
}

/// Which client origin may talk to the gateway.
///
/// Configured as a single string: `*` allows everyone, anything else must match the
/// origin exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AllowedHosts {
    #[default]
    Any,
    Only(String),
}

impl AllowedHosts {
    pub fn permits(&self, origin: Option<&str>) -> bool {
        match self {
            AllowedHosts::Any => true,
            AllowedHosts::Only(allowed) => origin == Some(allowed.as_str()),
        }
    }
}

impl From<String> for AllowedHosts {
    fn from(value: String) -> Self {
        let value = value.trim();
        if value == "*" {
            AllowedHosts::Any
        } else {
            AllowedHosts::Only(value.to_string())
        }
    }
}

impl From<AllowedHosts> for String {
    fn from(value: AllowedHosts) -> Self {
        value.to_string()
    }
}

impl fmt::Display for AllowedHosts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllowedHosts::Any => f.write_str("*"),
            AllowedHosts::Only(host) => f.write_str(host),
        }
    }
}

/// Transport-level precondition check, run before the path is even looked at.
#[derive(Debug, Clone, Default)]
pub struct RequestGate {
    allowed_hosts: AllowedHosts,
}

impl RequestGate {
    pub fn new(allowed_hosts: AllowedHosts) -> Self {
        Self { allowed_hosts }
    }

    /// `forwarded_for` wins over `peer` whenever the header is present.
    pub fn check(
        &self,
        method: &Method,
        forwarded_for: Option<&str>,
        peer: Option<&str>,
    ) -> Result<(), GateError> {
        if !matches!(self.allowed_hosts, AllowedHosts::Any) {
            let origin = forwarded_for.or(peer);
            if !self.allowed_hosts.permits(origin) {
                return Err(GateError::Forbidden {
                    origin: origin.map(str::to_string),
                });
            }
        }

        if *method != Method::POST {
            return Err(GateError::MethodNotAllowed(method.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_all_only_checks_method() {
        let gate = RequestGate::default();
        assert_eq!(gate.check(&Method::POST, None, None), Ok(()));
        assert_eq!(
            gate.check(&Method::GET, None, Some("10.0.0.1")),
            Err(GateError::MethodNotAllowed(Method::GET))
        );
    }

    #[test]
    fn forwarded_for_takes_precedence_over_peer() {
        let gate = RequestGate::new(AllowedHosts::Only("192.168.1.5".into()));
        assert_eq!(gate.check(&Method::POST, Some("192.168.1.5"), Some("127.0.0.1")), Ok(()));
        assert_eq!(
            gate.check(&Method::POST, Some("10.9.9.9"), Some("192.168.1.5")),
            Err(GateError::Forbidden {
                origin: Some("10.9.9.9".into())
            })
        );
        assert_eq!(gate.check(&Method::POST, None, Some("192.168.1.5")), Ok(()));
    }

    #[test]
    fn forbidden_is_reported_before_method() {
        let gate = RequestGate::new(AllowedHosts::Only("192.168.1.5".into()));
        assert!(matches!(
            gate.check(&Method::DELETE, None, None),
            Err(GateError::Forbidden { origin: None })
        ));
    }

    #[test]
    fn parses_allowed_hosts_strings() {
        assert_eq!(AllowedHosts::from("*".to_string()), AllowedHosts::Any);
        assert_eq!(
            AllowedHosts::from(" 127.0.0.1 ".to_string()),
            AllowedHosts::Only("127.0.0.1".into())
        );
        assert_eq!(String::from(AllowedHosts::Any), "*");
    }
}
