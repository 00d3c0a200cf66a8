//! Column family definitions for the RocksDB coordination store.
//!
//! - zsets: ordered-set entries keyed by `{set}\0{score}\0{member}`
//! - zscores: member -> score side index keyed by `{set}\0{member}`
//! - hashes: hash fields keyed by `{hash}\0{field}`
//! - kv: plain keys with optional expiry

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family for ordered-set entries, sorted by score
pub const CF_ZSETS: &str = "zsets";

/// Column family for the member -> score index
pub const CF_ZSCORES: &str = "zscores";

/// Column family for hash fields
pub const CF_HASHES: &str = "hashes";

/// Column family for TTL-bounded plain keys
pub const CF_KV: &str = "kv";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[CF_ZSETS, CF_ZSCORES, CF_HASHES, CF_KV];

/// Queue entries churn constantly; keep compaction cheap.
fn zsets_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::None);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_ZSETS, zsets_options()),
        ColumnFamilyDescriptor::new(CF_ZSCORES, Options::default()),
        ColumnFamilyDescriptor::new(CF_HASHES, Options::default()),
        ColumnFamilyDescriptor::new(CF_KV, Options::default()),
    ]
}
