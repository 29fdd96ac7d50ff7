//! # Protocol Configuration & Constants
//!
//! Every fixed name, label, and default used by Valocracy lives here. The
//! contract crate and the node binary read these instead of repeating
//! literals, so a rename happens in exactly one place.
//!
//! Contract addresses are derived from the labels below with
//! [`Address::derive`], which means a fresh deployment always lands at the
//! same addresses. Changing a label after data has been persisted orphans
//! every stored balance, so treat them as frozen once a node has run.

use crate::identity::Address;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Protocol version string reported by the node.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Snapshot schema version. Bump when the persisted deployment layout changes.
pub const SNAPSHOT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Registry (certificate token)
// ---------------------------------------------------------------------------

/// Default name of the certificate registry.
pub const REGISTRY_NAME: &str = "Valocracy";

/// Default symbol of the certificate registry.
pub const REGISTRY_SYMBOL: &str = "gVal";

/// Identifier assigned to the first issued certificate. Ids are never reused.
pub const FIRST_TOKEN_ID: u64 = 1;

/// Upper bound on certificate metadata length in bytes. A content URI
/// (`ipfs://...`) is far below this.
pub const MAX_METADATA_LENGTH: usize = 2048;

// ---------------------------------------------------------------------------
// Treasury (vault)
// ---------------------------------------------------------------------------

/// Default name of the treasury vault.
pub const TREASURY_NAME: &str = "Valocracy Treasury";

/// Default symbol of the treasury's share unit.
pub const TREASURY_SYMBOL: &str = "eVal";

// ---------------------------------------------------------------------------
// Pooled asset
// ---------------------------------------------------------------------------

/// Default name of the pooled asset ledger used by local deployments.
pub const ASSET_NAME: &str = "Valocracy Pool Asset";

/// Default symbol of the pooled asset.
pub const ASSET_SYMBOL: &str = "VPA";

// ---------------------------------------------------------------------------
// Address derivation labels
// ---------------------------------------------------------------------------

/// BLAKE3 label for the certificate registry contract address.
pub const REGISTRY_LABEL: &str = "valocracy:registry";

/// BLAKE3 label for the pooled asset ledger address.
pub const ASSET_LABEL: &str = "valocracy:asset";

/// BLAKE3 label prefix for treasury instances. The instance index is appended
/// (`valocracy:treasury:0`, `valocracy:treasury:1`, ...).
pub const TREASURY_LABEL_PREFIX: &str = "valocracy:treasury";

/// Address of the certificate registry in a standard deployment.
pub fn registry_address() -> Address {
    Address::derive(REGISTRY_LABEL)
}

/// Address of the pooled asset ledger in a standard deployment.
pub fn asset_address() -> Address {
    Address::derive(ASSET_LABEL)
}

/// Address of the `index`-th treasury instance.
pub fn treasury_address(index: u32) -> Address {
    Address::derive(&format!("{}:{}", TREASURY_LABEL_PREFIX, index))
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Default port for the read-only HTTP API.
pub const DEFAULT_API_PORT: u16 = 9841;

/// Default port for the Prometheus metrics endpoint.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

/// Default data directory for the node's sled database.
pub const DEFAULT_DATA_DIR: &str = ".valocracy";

/// Environment variable overriding the data directory.
pub const ENV_DATA_DIR: &str = "VALOCRACY_DATA_DIR";

/// Environment variable overriding the API port.
pub const ENV_API_PORT: &str = "VALOCRACY_API_PORT";

/// Environment variable overriding the metrics port.
pub const ENV_METRICS_PORT: &str = "VALOCRACY_METRICS_PORT";

/// Environment variable selecting the log format (`pretty` or `json`).
pub const ENV_LOG_FORMAT: &str = "VALOCRACY_LOG_FORMAT";

/// Maximum number of events returned by a single journal query.
pub const MAX_EVENTS_PER_QUERY: usize = 1_000;
