//! Platform-provided environment

use serde::Deserialize;

use crate::error::{AppError, AppResult};

pub const ENV_VCAP_APPLICATION: &str = "VCAP_APPLICATION";
pub const ENV_PORT: &str = "PORT";
const DEFAULT_PORT: u16 = 8080;

/// The fields of `VCAP_APPLICATION` the apps care about.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VcapApplication {
    pub application_name: String,
    #[serde(default)]
    pub application_uris: Vec<String>,
}

impl VcapApplication {
    pub fn from_env() -> AppResult<Self> {
        let raw = std::env::var(ENV_VCAP_APPLICATION).map_err(|_| AppError::MissingEnv(ENV_VCAP_APPLICATION))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> AppResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// `ADDRESS: |https://<first route>|`, the line the suite scrapes from recent logs.
    pub fn address_line(&self) -> Option<String> {
        self.application_uris
            .first()
            .map(|uri| format!("ADDRESS: |https://{uri}|"))
    }
}

/// Listening port from `PORT`, or 8080 outside the platform.
pub fn port() -> AppResult<u16> {
    parse_port(std::env::var(ENV_PORT).ok().as_deref())
}

pub fn parse_port(raw: Option<&str>) -> AppResult<u16> {
    match raw {
        None => Ok(DEFAULT_PORT),
        Some(raw) => raw.trim().parse().map_err(|_| AppError::InvalidPort(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_vcap_application() {
        let vcap = VcapApplication::parse(
            r#"{"application_id":"a1","application_name":"SYSLOG-SERVER-1--abc","application_uris":["syslog-server.example.com"],"limits":{"mem":64}}"#,
        )
        .unwrap();

        assert_eq!(vcap.application_name, "SYSLOG-SERVER-1--abc");
        assert_eq!(
            vcap.address_line().as_deref(),
            Some("ADDRESS: |https://syslog-server.example.com|")
        );
    }

    #[test]
    fn test_vcap_without_routes_has_no_address() {
        let vcap = VcapApplication::parse(r#"{"application_name":"cfar-lats-1-app-A-0123"}"#).unwrap();
        assert!(vcap.address_line().is_none());
        assert_matches!(VcapApplication::parse("not json"), Err(AppError::Vcap(_)));
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port(None).unwrap(), 8080);
        assert_eq!(parse_port(Some("61001")).unwrap(), 61001);
        assert_matches!(parse_port(Some("http")), Err(AppError::InvalidPort(raw)) if raw == "http");
    }
}
