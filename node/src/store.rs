//! # Deployment Store
//!
//! Binds a [`Deployment`] to its sled database. Every mutating command goes
//! through [`Store::apply`]: load the latest snapshot, run one deployment
//! entry point, and commit the new snapshot together with the events it
//! emitted in a single database transaction. A reverted entry point commits
//! nothing.

use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;

use valocracy_contracts::{ContractError, Deployment, EventRecord};
use valocracy_protocol::identity::Address;
use valocracy_protocol::storage::ValocracyDB;

pub struct Store {
    db: ValocracyDB,
}

impl Store {
    /// Opens (or creates) the database under `data_dir/db`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let db_path = data_dir.join("db");
        std::fs::create_dir_all(&db_path).with_context(|| {
            format!("failed to create database directory: {}", db_path.display())
        })?;
        let db = ValocracyDB::open(&db_path)
            .with_context(|| format!("failed to open database at {}", db_path.display()))?;
        tracing::debug!(path = %db_path.display(), "database opened");
        Ok(Self { db })
    }

    #[cfg(test)]
    pub fn temporary() -> Result<Self> {
        Ok(Self {
            db: ValocracyDB::open_temporary()?,
        })
    }

    #[cfg(test)]
    pub fn db(&self) -> &ValocracyDB {
        &self.db
    }

    /// Hands the database over, e.g. to the API server.
    pub fn into_db(self) -> ValocracyDB {
        self.db
    }

    /// Bootstraps a fresh deployment administered by `owner` and persists it.
    pub fn init(&self, owner: Address) -> Result<Deployment> {
        if self.db.is_initialized()? {
            bail!("a deployment already exists in this data directory");
        }
        let mut deployment =
            Deployment::bootstrap(owner).context("failed to bootstrap deployment")?;
        self.persist(&mut deployment)?;
        Ok(deployment)
    }

    /// Loads the latest committed deployment.
    pub fn load(&self) -> Result<Deployment> {
        self.db
            .load_snapshot::<Deployment>()
            .context("failed to load deployment snapshot")?
            .ok_or_else(|| anyhow!("no deployment found; run `valocracy-node init` first"))
    }

    /// Runs `op` against the latest deployment and commits the result.
    ///
    /// The contract error, if any, is returned as-is inside the outer
    /// `Ok` so callers can report its kind.
    pub fn apply<T, F>(&self, op: F) -> Result<Result<T, ContractError>>
    where
        F: FnOnce(&mut Deployment) -> Result<T, ContractError>,
    {
        let mut deployment = self.load()?;
        match op(&mut deployment) {
            Ok(value) => {
                self.persist(&mut deployment)?;
                Ok(Ok(value))
            }
            Err(e) => Ok(Err(e)),
        }
    }

    fn persist(&self, deployment: &mut Deployment) -> Result<()> {
        let events = deployment.drain_journal();
        self.db
            .commit(&*deployment, &events)
            .context("failed to commit deployment")?;
        tracing::info!(
            sequence = deployment.sequence(),
            events = events.len(),
            "deployment persisted"
        );
        Ok(())
    }

    /// Committed events after `since`, oldest first.
    pub fn events_since(&self, since: u64, limit: usize) -> Result<Vec<EventRecord>> {
        self.db
            .events_since(since, limit)
            .context("failed to read event journal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Address {
        Address::derive("owner")
    }

    #[test]
    fn init_then_load() {
        let store = Store::temporary().unwrap();
        store.init(owner()).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.valocracy().owner(), owner());
        assert!(store.init(owner()).is_err());
    }

    #[test]
    fn load_before_init_fails() {
        let store = Store::temporary().unwrap();
        assert!(store.load().is_err());
    }

    #[test]
    fn apply_commits_snapshot_and_events() {
        let store = Store::temporary().unwrap();
        store.init(owner()).unwrap();

        store
            .apply(|d| d.set_valor(owner(), 1, 10, "ipfs://x"))
            .unwrap()
            .unwrap();
        store
            .apply(|d| d.issue(owner(), Address::derive("alice"), 1))
            .unwrap()
            .unwrap();

        let deployment = store.load().unwrap();
        assert_eq!(deployment.valocracy().total_supply(), 1);

        let events = store.events_since(0, 100).unwrap();
        let sequences: Vec<u64> = events.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, (1..=deployment.sequence()).collect::<Vec<_>>());
        assert_eq!(store.db().last_sequence().unwrap(), Some(deployment.sequence()));
    }

    #[test]
    fn reverted_apply_commits_nothing() {
        let store = Store::temporary().unwrap();
        store.init(owner()).unwrap();
        let before = store.db().event_count();

        let outcome = store
            .apply(|d| d.issue(owner(), Address::derive("alice"), 42))
            .unwrap();
        assert!(outcome.is_err());
        assert_eq!(store.db().event_count(), before);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::open(dir.path()).unwrap();
            store.init(owner()).unwrap();
            store
                .apply(|d| d.set_valor(owner(), 3, 7, "ipfs://kept"))
                .unwrap()
                .unwrap();
        }
        let store = Store::open(dir.path()).unwrap();
        let deployment = store.load().unwrap();
        assert_eq!(deployment.valocracy().rarity_of(3).unwrap(), 7);
    }
}
