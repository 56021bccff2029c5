//! Client configuration.

use std::time::Duration;

use catwire_protocol::{Role, PROTOCOL_VERSION};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Configuration for one game client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// The role this client checks in as.
    pub role: Role,

    /// The identity proposed in the CHECKIN request. `None` leaves the
    /// assignment entirely to the server; a check-in response that then
    /// carries no identity either is a protocol error.
    pub proposed_id: Option<String>,

    /// Protocol version reported at check-in.
    pub version: u32,

    /// How many times the transport is dialed before giving up.
    pub conn_trials_max: u32,

    /// Fixed delay between connect attempts.
    pub retry_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            role: Role::Trader,
            proposed_id: None,
            version: PROTOCOL_VERSION,
            conn_trials_max: 3,
            retry_delay: Duration::from_millis(200),
        }
    }
}

impl ClientConfig {
    /// A default configuration for the given role.
    pub fn for_role(role: Role) -> Self {
        Self {
            role,
            ..Self::default()
        }
    }

    /// Fills `proposed_id` with a generated name for this config's role.
    pub fn with_random_id(mut self) -> Self {
        self.proposed_id = Some(random_client_name(self.role));
        self
    }
}

/// Generates a proposed client name: a role prefix plus 8 hex characters
/// of randomness, e.g. `trader-4fa90c12`.
pub fn random_client_name(role: Role) -> String {
    let prefix = match role {
        Role::Trader => "trader",
        Role::Specialist => "market",
    };
    let mut rng = rand::rng();
    let bytes: [u8; 4] = rng.random();
    let suffix: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("{prefix}-{suffix}")
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = ClientConfig::default();
        assert_eq!(config.role, Role::Trader);
        assert!(config.proposed_id.is_none());
        assert_eq!(config.version, PROTOCOL_VERSION);
        assert_eq!(config.conn_trials_max, 3);
        assert_eq!(config.retry_delay, Duration::from_millis(200));
    }

    #[test]
    fn test_random_client_name_is_role_prefixed() {
        assert!(random_client_name(Role::Trader).starts_with("trader-"));
        assert!(random_client_name(Role::Specialist).starts_with("market-"));
    }

    #[test]
    fn test_random_client_names_differ() {
        let a = random_client_name(Role::Trader);
        let b = random_client_name(Role::Trader);
        assert_ne!(a, b, "names must be distinct across clients");
    }

    #[test]
    fn test_with_random_id_fills_proposed_id() {
        let config = ClientConfig::for_role(Role::Specialist).with_random_id();
        assert!(config.proposed_id.unwrap().starts_with("market-"));
    }
}
