//! Runs the email existence endpoint.

use anyhow::{bail, Result};
use email_check_server::{build_router, serve, AppState, StoreDirectory};
use guest_store::{BackendStore, MemoryStore, SupabaseStore};
use guestlist_config_and_utils::Config;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Account preloaded into the offline directory, written `email` or
/// `email:unverified`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedUser {
    pub email: String,
    pub verified: bool,
}

impl FromStr for SeedUser {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (email, verified) = match s.rsplit_once(':') {
            Some((email, "verified")) => (email, true),
            Some((email, "unverified")) => (email, false),
            Some((_, flag)) => return Err(format!("unknown seed flag: {}", flag)),
            None => (s, true),
        };
        let email = email.trim();
        if email.is_empty() {
            return Err("seed user needs an email".to_string());
        }
        Ok(Self {
            email: email.to_string(),
            verified,
        })
    }
}

/// Service-role store for account lookups.
pub fn directory_store(
    config: &Config,
    offline: bool,
    seeds: &[SeedUser],
) -> Result<Arc<dyn BackendStore>> {
    if offline {
        let store = MemoryStore::new();
        for seed in seeds {
            store.seed_user(&seed.email, seed.verified);
        }
        info!(accounts = seeds.len(), "using in-memory account directory");
        return Ok(Arc::new(store));
    }
    if !seeds.is_empty() {
        bail!("--seed-user only applies with --offline");
    }
    let Some(service_key) = config.supabase_service_key.as_deref() else {
        bail!("Set GUESTLIST_SUPABASE_SERVICE_KEY or pass --offline.");
    };
    Ok(Arc::new(SupabaseStore::new(&config.supabase_url()?, service_key)))
}

pub async fn run(config: &Config, bind: SocketAddr, offline: bool, seeds: &[SeedUser]) -> Result<()> {
    let store = directory_store(config, offline, seeds)?;
    let router = build_router(AppState::new(Arc::new(StoreDirectory::new(store))));
    let listener = TcpListener::bind(bind).await?;
    serve(listener, router).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use guest_store::{Collection, Query};

    #[test]
    fn test_parse_seed_user() {
        assert_eq!(
            "a@x.com".parse::<SeedUser>().unwrap(),
            SeedUser {
                email: "a@x.com".to_string(),
                verified: true
            }
        );
        assert!(!"a@x.com:unverified".parse::<SeedUser>().unwrap().verified);
        assert!("a@x.com:maybe".parse::<SeedUser>().is_err());
        assert!(":verified".parse::<SeedUser>().is_err());
    }

    #[tokio::test]
    async fn test_offline_directory_is_seeded() {
        let seeds = vec!["a@x.com".parse().unwrap(), "b@x.com:unverified".parse().unwrap()];
        let store = directory_store(&Config::default(), true, &seeds).unwrap();
        let rows = store.query(Query::new(Collection::Users)).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_online_requires_service_key() {
        let err = directory_store(&Config::default(), false, &[]).err().unwrap();
        assert!(err.to_string().contains("GUESTLIST_SUPABASE_SERVICE_KEY"));
        assert!(directory_store(
            &Config::default(),
            false,
            &["a@x.com".parse().unwrap()]
        )
        .is_err());
    }
}
