//! Key layout for the coordination store.
//!
//! Logical keys (shared by every backend):
//! - `reindex:queue`: ordered set of queued document ids
//! - `reindex:jobs`: hash of job snapshots by document id
//! - `reindex:in_progress`: hash of in-progress markers by document id
//! - `lock:{documentId}`: lock records
//! - `version:{documentId}`: blue-green version pointers
//!
//! Physical keys (RocksDB backend) join a logical key and its sub-key with a
//! NUL byte. Ordered-set entries embed the score as a sign-flipped,
//! zero-padded 20 digit number so lexicographic order equals numeric order.

use crate::error::StorageError;

/// Ordered set holding queued document ids
pub const QUEUE_KEY: &str = "reindex:queue";

/// Hash of job snapshots keyed by document id
pub const JOBS_KEY: &str = "reindex:jobs";

/// Hash of in-progress markers keyed by document id
pub const IN_PROGRESS_KEY: &str = "reindex:in_progress";

/// Prefix of lock keys
pub const LOCK_PREFIX: &str = "lock:";

/// Prefix of version pointer keys
pub const VERSION_PREFIX: &str = "version:";

const SEP: u8 = 0;

/// Lock key for a document.
pub fn lock_key(document_id: &str) -> String {
    format!("{}{}", LOCK_PREFIX, document_id)
}

/// Version pointer key for a document.
pub fn version_key(document_id: &str) -> String {
    format!("{}{}", VERSION_PREFIX, document_id)
}

/// Document id encoded in a lock key, if it is one.
pub fn document_id_from_lock_key(key: &str) -> Option<&str> {
    key.strip_prefix(LOCK_PREFIX)
}

/// Encode a score so byte order matches numeric order.
pub fn encode_score(score: i64) -> String {
    format!("{:020}", (score as u64) ^ (1u64 << 63))
}

/// Inverse of [`encode_score`].
pub fn decode_score(encoded: &str) -> Result<i64, StorageError> {
    let raw: u64 = encoded
        .parse()
        .map_err(|e| StorageError::Key(format!("Invalid score '{}': {}", encoded, e)))?;
    Ok((raw ^ (1u64 << 63)) as i64)
}

/// `{key}\0`, the scan prefix for all sub-keys of a logical key.
pub fn scan_prefix(key: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(key.len() + 1);
    bytes.extend_from_slice(key.as_bytes());
    bytes.push(SEP);
    bytes
}

/// `{key}\0{sub}`, used for hash fields and the zset score index.
pub fn compound_key(key: &str, sub: &str) -> Vec<u8> {
    let mut bytes = scan_prefix(key);
    bytes.extend_from_slice(sub.as_bytes());
    bytes
}

/// Sub-key portion of a compound key.
pub fn sub_key(prefix: &[u8], full: &[u8]) -> Result<String, StorageError> {
    let rest = full
        .strip_prefix(prefix)
        .ok_or_else(|| StorageError::Key("Key outside scan prefix".to_string()))?;
    String::from_utf8(rest.to_vec())
        .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))
}

/// Ordered-set entry key: `{key}\0{score:020}\0{member}`.
pub fn zset_entry_key(key: &str, member: &str, score: i64) -> Vec<u8> {
    let mut bytes = scan_prefix(key);
    bytes.extend_from_slice(encode_score(score).as_bytes());
    bytes.push(SEP);
    bytes.extend_from_slice(member.as_bytes());
    bytes
}

/// Decode `(member, score)` from an ordered-set entry key.
pub fn decode_zset_entry(prefix: &[u8], full: &[u8]) -> Result<(String, i64), StorageError> {
    let rest = full
        .strip_prefix(prefix)
        .ok_or_else(|| StorageError::Key("Entry outside scan prefix".to_string()))?;
    if rest.len() < 21 || rest[20] != SEP {
        return Err(StorageError::Key("Malformed ordered-set entry".to_string()));
    }
    let score_str = std::str::from_utf8(&rest[..20])
        .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;
    let member = String::from_utf8(rest[21..].to_vec())
        .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;
    Ok((member, decode_score(score_str)?))
}
