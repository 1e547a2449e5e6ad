//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (port in range, intervals > 0)
//! - Check that addresses parse before anything is bound
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

use crate::config::schema::{GatewayConfig, ListenerConfig};

/// A single semantic problem with a loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("tcpPort {0} is outside 1..=65535")]
    PortOutOfRange(u32),

    #[error("backlog must be greater than zero")]
    ZeroBacklog,

    #[error("checkInterval must be greater than zero")]
    ZeroCheckInterval,

    #[error("maxConnections must be greater than zero")]
    ZeroMaxConnections,

    #[error("host '{0}' is not an IP address")]
    InvalidHost(String),

    #[error("relay upstream '{0}' is not a socket address")]
    InvalidUpstream(String),

    #[error("metrics address '{0}' is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Check a configuration for semantic errors.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = listener_errors(&config.http);

    if let Some(upstream) = &config.relay.upstream {
        if upstream.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidUpstream(upstream.clone()));
        }
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidMetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Check only the listener section. The bootstrap runs this itself so a
/// hand-built config is rejected before anything is bound.
pub fn validate_listener(http: &ListenerConfig) -> Result<(), Vec<ValidationError>> {
    let errors = listener_errors(http);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn listener_errors(http: &ListenerConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if http.tcp_port == 0 || http.tcp_port > u32::from(u16::MAX) {
        errors.push(ValidationError::PortOutOfRange(http.tcp_port));
    }
    if http.backlog == 0 {
        errors.push(ValidationError::ZeroBacklog);
    }
    if http.check_interval == 0 {
        errors.push(ValidationError::ZeroCheckInterval);
    }
    if http.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }
    if http.host.parse::<IpAddr>().is_err() {
        errors.push(ValidationError::InvalidHost(http.host.clone()));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut config = GatewayConfig::default();
        config.http.tcp_port = 0;
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::PortOutOfRange(0)]
        );
    }

    #[test]
    fn reports_every_violation() {
        let mut config = GatewayConfig::default();
        config.http.tcp_port = 70_000;
        config.http.backlog = 0;
        config.http.check_interval = 0;
        config.http.host = "localhost".into();
        config.relay.upstream = Some("nowhere".into());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.contains(&ValidationError::ZeroCheckInterval));
        assert!(errors.contains(&ValidationError::InvalidHost("localhost".into())));
    }
}
