//! Configuration for Sugar
//!
//! Settings come from the environment (and a `.env` file) or from a TOML
//! file. Collaborator addresses default to the known deployment for the
//! configured chain and can be overridden one by one.

use alloy_primitives::Address;
use eyre::{eyre, Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::deployments::{self, Deployment, BASE_CHAIN_ID};
use crate::sugar::TokenPolicy;

// ============================================
// MAIN CONFIGURATION
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // ========== Network Settings ==========
    /// JSON-RPC endpoint
    pub rpc_url: String,

    /// Chain ID (8453 = Base)
    pub chain_id: u64,

    // ========== Collaborator Overrides ==========
    /// Replaces the known voter for the chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voter: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convertor: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nfpm: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cl_helper: Option<Address>,

    // ========== Listing Settings ==========
    /// Which tokens `tokens` returns without an explicit address list
    #[serde(default)]
    pub token_policy: TokenPolicy,

    /// Serve from a JSON snapshot instead of live RPC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<String>,
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            // Network
            rpc_url: env::var("RPC_URL").unwrap_or_else(|_| "https://mainnet.base.org".to_string()),
            chain_id: env::var("CHAIN_ID")
                .unwrap_or_else(|_| BASE_CHAIN_ID.to_string())
                .parse()
                .unwrap_or(BASE_CHAIN_ID),

            // Overrides
            voter: Self::address_var("SUGAR_VOTER")?,
            registry: Self::address_var("SUGAR_REGISTRY")?,
            convertor: Self::address_var("SUGAR_CONVERTOR")?,
            nfpm: Self::address_var("SUGAR_NFPM")?,
            cl_helper: Self::address_var("SUGAR_CL_HELPER")?,

            // Listing
            token_policy: Self::parse_token_policy(
                &env::var("TOKEN_POLICY").unwrap_or_else(|_| "all".to_string()),
            ),
            snapshot_path: env::var("SUGAR_SNAPSHOT").ok().filter(|s| !s.is_empty()),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Optional address from the environment; a malformed value is an error
    fn address_var(key: &str) -> Result<Option<Address>> {
        match env::var(key) {
            Ok(value) if !value.trim().is_empty() => Address::from_str(value.trim())
                .map(Some)
                .wrap_err_with(|| format!("{} is not a valid address: {}", key, value)),
            _ => Ok(None),
        }
    }

    fn parse_token_policy(value: &str) -> TokenPolicy {
        match value.to_lowercase().as_str() {
            "listed" | "listed_only" | "whitelisted" => TokenPolicy::ListedOnly,
            _ => TokenPolicy::All,
        }
    }

    /// Collaborators for the configured chain, with overrides applied
    pub fn deployment(&self) -> Result<Deployment> {
        let known = deployments::known(self.chain_id);
        let resolve = |value: Option<Address>, fallback: Option<Address>, key: &str| {
            value.or(fallback).ok_or_else(|| {
                eyre!(
                    "No known deployment for chain {} - set {}",
                    self.chain_id,
                    key
                )
            })
        };

        Ok(Deployment {
            voter: resolve(self.voter, known.map(|d| d.voter), "SUGAR_VOTER")?,
            registry: resolve(self.registry, known.map(|d| d.registry), "SUGAR_REGISTRY")?,
            convertor: resolve(self.convertor, known.map(|d| d.convertor), "SUGAR_CONVERTOR")?,
            nfpm: resolve(self.nfpm, known.map(|d| d.nfpm), "SUGAR_NFPM")?,
            cl_helper: resolve(self.cl_helper, known.map(|d| d.cl_helper), "SUGAR_CL_HELPER")?,
        })
    }

    /// Validate configuration before serving
    pub fn validate(&self) -> Result<()> {
        match &self.snapshot_path {
            Some(path) => {
                if !Path::new(path).exists() {
                    return Err(eyre!("SUGAR_SNAPSHOT points to a missing file: {}", path));
                }
            }
            None => {
                if self.rpc_url.is_empty() || self.rpc_url.contains("YOUR_API_KEY") {
                    return Err(eyre!("Invalid RPC_URL - please set a valid endpoint"));
                }
            }
        }

        self.deployment()?;
        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let source = match &self.snapshot_path {
            Some(_) => "Snapshot (JSON)",
            None => "Live RPC",
        };
        let overrides = [self.voter, self.registry, self.convertor, self.nfpm, self.cl_helper]
            .iter()
            .filter(|o| o.is_some())
            .count();

        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║                  SUGAR - CONFIGURATION                     ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Chain ID:          {:^40} ║", self.chain_id);
        println!("║ Source:            {:^40} ║", source);
        println!("║ Token Policy:      {:^40} ║", self.token_policy);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ DEPLOYMENT                                                 ║");
        match self.deployment() {
            Ok(deployment) => {
                println!("║ • Voter:     {:<45} ║", format!("{:?}", deployment.voter));
                println!("║ • Registry:  {:<45} ║", format!("{:?}", deployment.registry));
                println!("║ • NFPM:      {:<45} ║", format!("{:?}", deployment.nfpm));
                println!("║ • CL Helper: {:<45} ║", format!("{:?}", deployment.cl_helper));
            }
            Err(_) => println!("║ • {:<56} ║", "✗ Unresolved"),
        }
        println!("║ • Overrides:       {:^40} ║", overrides);
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: "https://mainnet.base.org".to_string(),
            chain_id: BASE_CHAIN_ID,
            voter: None,
            registry: None,
            convertor: None,
            nfpm: None,
            cl_helper: None,
            token_policy: TokenPolicy::All,
            snapshot_path: None,
        }
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chain_id, 8453);
        assert_eq!(config.token_policy, TokenPolicy::All);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deployment_defaults_to_known() {
        let config = Config::default();
        assert_eq!(config.deployment().unwrap(), deployments::known(8453).unwrap());
    }

    #[test]
    fn test_deployment_override() {
        let voter = Address::repeat_byte(0x42);
        let config = Config {
            voter: Some(voter),
            ..Config::default()
        };

        let deployment = config.deployment().unwrap();
        assert_eq!(deployment.voter, voter);
        assert_eq!(deployment.registry, deployments::known(8453).unwrap().registry);
    }

    #[test]
    fn test_unknown_chain_needs_every_address() {
        let partial = Config {
            chain_id: 10,
            voter: Some(Address::repeat_byte(1)),
            ..Config::default()
        };
        assert!(partial.deployment().is_err());
        assert!(partial.validate().is_err());

        let full = Config {
            chain_id: 10,
            voter: Some(Address::repeat_byte(1)),
            registry: Some(Address::repeat_byte(2)),
            convertor: Some(Address::repeat_byte(3)),
            nfpm: Some(Address::repeat_byte(4)),
            cl_helper: Some(Address::repeat_byte(5)),
            ..Config::default()
        };
        assert_eq!(full.deployment().unwrap().nfpm, Address::repeat_byte(4));
    }

    #[test]
    fn test_token_policy_parsing() {
        assert_eq!(Config::parse_token_policy("listed"), TokenPolicy::ListedOnly);
        assert_eq!(Config::parse_token_policy("LISTED_ONLY"), TokenPolicy::ListedOnly);
        assert_eq!(Config::parse_token_policy("all"), TokenPolicy::All);
        assert_eq!(Config::parse_token_policy("anything"), TokenPolicy::All);
    }

    #[test]
    fn test_validate_rejects_placeholder_rpc() {
        let config = Config {
            rpc_url: "https://base-mainnet.g.alchemy.com/v2/YOUR_API_KEY".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        // Snapshot mode does not touch the RPC URL
        let missing = Config {
            snapshot_path: Some("/nonexistent/sugar-snapshot.json".to_string()),
            ..config
        };
        assert!(missing.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config {
            nfpm: Some(Address::repeat_byte(0x77)),
            token_policy: TokenPolicy::ListedOnly,
            ..Config::default()
        };

        let path = env::temp_dir().join(format!("sugar-config-{}.toml", std::process::id()));
        config.save_to_file(&path).unwrap();
        let loaded = Config::from_file(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }
}
