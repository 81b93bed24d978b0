//! The answer cache. `AnswerCache` is question-keyed, stores a whole
//! answer list per entry, and is set-if-absent (a second `set` for an
//! unexpired key never overwrites it); TTL expiry is delegated to the
//! backing store. Sits on top of a `CacheStore`: a small external
//! key-value interface any real backing store (Redis, an in-process
//! map, ...) can implement.
//!
//! `AnswerCache` itself is an `Arc`-cloneable handle around that store,
//! aborting on internal lock poisoning rather than trying to recover,
//! and logging hit/miss at `trace` level.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use dns_types::protocol::types::*;

const MUTEX_POISON_MESSAGE: &str =
    "[INTERNAL ERROR] cache mutex poisoned, cannot recover from this - aborting";

/// The external key-value contract a backing cache store must
/// satisfy. Any store providing this get/set/clear semantics — in-
/// memory, network KV, local file — can sit behind `AnswerCache`.
pub trait CacheStore: Send + Sync {
    /// # Errors
    ///
    /// If the backing store could not be reached.
    fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    /// # Errors
    ///
    /// If the backing store could not be reached.
    fn set(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
        if_absent: bool,
    ) -> Result<SetOutcome, CacheError>;

    /// # Errors
    ///
    /// If the backing store could not be reached.
    fn clear(&self) -> Result<(), CacheError>;
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SetOutcome {
    Ok,
    AlreadyPresent,
}

#[derive(Debug, Clone)]
pub enum CacheError {
    Backend(String),
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            CacheError::Backend(message) => write!(f, "cache backend error: {message}"),
        }
    }
}

impl std::error::Error for CacheError {}

/// An in-process `CacheStore`, used when no external KV endpoint is
/// configured. A `redis`-backed `CacheStore` would plug in at this
/// same trait boundary without touching `AnswerCache` or the engine.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: Mutex<HashMap<String, (Bytes, Instant)>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for InMemoryCacheStore {
    fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let mut entries = self.entries.lock().expect(MUTEX_POISON_MESSAGE);
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
        if_absent: bool,
    ) -> Result<SetOutcome, CacheError> {
        let mut entries = self.entries.lock().expect(MUTEX_POISON_MESSAGE);
        if if_absent {
            if let Some((_, expires_at)) = entries.get(key) {
                if *expires_at > Instant::now() {
                    return Ok(SetOutcome::AlreadyPresent);
                }
            }
        }
        entries.insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(SetOutcome::Ok)
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.entries.lock().expect(MUTEX_POISON_MESSAGE).clear();
        Ok(())
    }
}

/// The answer cache sitting in front of the resolution engine.
/// Cheaply `Clone`-able; every clone shares the same backing store.
#[derive(Clone)]
pub struct AnswerCache {
    store: Arc<dyn CacheStore>,
}

impl AnswerCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// A fresh cache backed by an in-process `InMemoryCacheStore`.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryCacheStore::new()))
    }

    /// Look up the cached answer set for `question`, if any.
    pub fn get(&self, question: &Question) -> Option<Vec<ResourceRecord>> {
        let key = cache_key(question);
        match self.store.get(&key) {
            Ok(Some(bytes)) => match serde_json::from_slice::<Vec<CachedAnswer>>(&bytes) {
                Ok(cached) => {
                    tracing::trace!(%key, "cache hit");
                    Some(cached.into_iter().map(CachedAnswer::into_resource_record).collect())
                }
                Err(error) => {
                    tracing::warn!(%key, %error, "corrupt cache entry, treating as a miss");
                    None
                }
            },
            Ok(None) => {
                tracing::trace!(%key, "cache miss");
                None
            }
            Err(error) => {
                tracing::warn!(%key, %error, "cache get failed, treating as a miss");
                None
            }
        }
    }

    /// Insert `answers` for `question` if no unexpired entry already
    /// exists. Empty `answers` is a no-op. Any backend error is logged
    /// and swallowed: the cache is lossy and best-effort.
    pub fn set(&self, question: &Question, answers: &[ResourceRecord]) {
        let Some(first) = answers.first() else {
            return;
        };
        let key = cache_key(question);
        let ttl = Duration::from_secs(u64::from(first.ttl));
        let cached: Vec<CachedAnswer> = answers.iter().map(CachedAnswer::from_resource_record).collect();

        match serde_json::to_vec(&cached) {
            Ok(bytes) => match self.store.set(&key, Bytes::from(bytes), ttl, true) {
                Ok(SetOutcome::Ok) => tracing::trace!(%key, ttl = ttl.as_secs(), "cache insert"),
                Ok(SetOutcome::AlreadyPresent) => {
                    tracing::trace!(%key, "cache insert skipped: already present");
                }
                Err(error) => tracing::warn!(%key, %error, "cache set failed"),
            },
            Err(error) => tracing::warn!(%key, %error, "could not serialise cache entry"),
        }
    }

    /// Test-only: wipe the backing store.
    #[cfg(test)]
    pub fn clear(&self) {
        let _ = self.store.clear();
    }
}

fn cache_key(question: &Question) -> String {
    format!(
        "{}:{}:{}",
        question.name.to_dotted_string().to_ascii_lowercase(),
        u16::from(question.qtype),
        u16::from(question.qclass),
    )
}

/// The JSON-serializable mirror of a `ResourceRecord`. The on-disk
/// shape is internal, so this lives only in `dns-resolver` rather than
/// adding a `serde` dependency to `dns-types` itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedAnswer {
    name: String,
    rclass: u16,
    ttl: u32,
    rdata: CachedRdata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum CachedRdata {
    A { address: Ipv4Addr },
    Aaaa { address: Ipv6Addr },
    Ns { nsdname: String },
    Cname { cname: String },
    Soa {
        mname: String,
        rname: String,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    Txt { octets: Vec<u8> },
    Unknown { rtype: u16, octets: Vec<u8> },
}

impl CachedAnswer {
    fn from_resource_record(rr: &ResourceRecord) -> Self {
        let rdata = match &rr.rtype_with_data {
            RecordTypeWithData::A { address } => CachedRdata::A { address: *address },
            RecordTypeWithData::AAAA { address } => CachedRdata::Aaaa { address: *address },
            RecordTypeWithData::NS { nsdname } => CachedRdata::Ns {
                nsdname: nsdname.to_dotted_string(),
            },
            RecordTypeWithData::CNAME { cname } => CachedRdata::Cname {
                cname: cname.to_dotted_string(),
            },
            RecordTypeWithData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => CachedRdata::Soa {
                mname: mname.to_dotted_string(),
                rname: rname.to_dotted_string(),
                serial: *serial,
                refresh: *refresh,
                retry: *retry,
                expire: *expire,
                minimum: *minimum,
            },
            RecordTypeWithData::TXT { octets } => CachedRdata::Txt {
                octets: octets.to_vec(),
            },
            RecordTypeWithData::Unknown { rtype, octets } => CachedRdata::Unknown {
                rtype: *rtype,
                octets: octets.to_vec(),
            },
        };
        CachedAnswer {
            name: rr.name.to_dotted_string(),
            rclass: rr.rclass.into(),
            ttl: rr.ttl,
            rdata,
        }
    }

    fn into_resource_record(self) -> ResourceRecord {
        let name = DomainName::from_dotted_string(&self.name).unwrap_or_else(DomainName::root_domain);
        let rtype_with_data = match self.rdata {
            CachedRdata::A { address } => RecordTypeWithData::A { address },
            CachedRdata::Aaaa { address } => RecordTypeWithData::AAAA { address },
            CachedRdata::Ns { nsdname } => RecordTypeWithData::NS {
                nsdname: DomainName::from_dotted_string(&nsdname).unwrap_or_else(DomainName::root_domain),
            },
            CachedRdata::Cname { cname } => RecordTypeWithData::CNAME {
                cname: DomainName::from_dotted_string(&cname).unwrap_or_else(DomainName::root_domain),
            },
            CachedRdata::Soa {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => RecordTypeWithData::SOA {
                mname: DomainName::from_dotted_string(&mname).unwrap_or_else(DomainName::root_domain),
                rname: DomainName::from_dotted_string(&rname).unwrap_or_else(DomainName::root_domain),
                serial,
                refresh,
                retry,
                expire,
                minimum,
            },
            CachedRdata::Txt { octets } => RecordTypeWithData::TXT {
                octets: Bytes::from(octets),
            },
            CachedRdata::Unknown { rtype, octets } => RecordTypeWithData::Unknown {
                rtype,
                octets: Bytes::from(octets),
            },
        };
        ResourceRecord {
            name,
            rtype_with_data,
            rclass: RecordClass::from(self.rclass),
            ttl: self.ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns_types::protocol::types::test_util::*;

    fn question(name: &str) -> Question {
        Question {
            name: domain(name),
            qtype: QueryType::Record(RecordType::A),
            qclass: QueryClass::Record(RecordClass::IN),
        }
    }

    #[test]
    fn set_then_get_returns_the_answer() {
        let cache = AnswerCache::in_memory();
        let q = question("example.com.");
        let rr = a_record("example.com.", "93.184.216.34".parse().unwrap());

        cache.set(&q, &[rr.clone()]);
        assert_eq!(cache.get(&q), Some(vec![rr]));
    }

    #[test]
    fn get_on_empty_cache_is_a_miss() {
        let cache = AnswerCache::in_memory();
        assert_eq!(cache.get(&question("example.com.")), None);
    }

    #[test]
    fn set_is_set_if_absent() {
        let cache = AnswerCache::in_memory();
        let q = question("example.com.");
        let rr1 = a_record("example.com.", "1.1.1.1".parse().unwrap());
        let rr2 = a_record("example.com.", "2.2.2.2".parse().unwrap());

        cache.set(&q, &[rr1.clone()]);
        cache.set(&q, &[rr2]);

        assert_eq!(cache.get(&q), Some(vec![rr1]));
    }

    #[test]
    fn set_with_empty_answers_is_a_no_op() {
        let cache = AnswerCache::in_memory();
        let q = question("example.com.");
        cache.set(&q, &[]);
        assert_eq!(cache.get(&q), None);
    }

    #[test]
    fn keys_are_case_insensitive_on_qname() {
        let cache = AnswerCache::in_memory();
        let rr = a_record("example.com.", "93.184.216.34".parse().unwrap());
        cache.set(&question("Example.COM."), &[rr.clone()]);
        assert_eq!(cache.get(&question("example.com.")), Some(vec![rr]));
    }

    #[test]
    fn entry_expires_after_its_ttl() {
        let store = Arc::new(InMemoryCacheStore::new());
        let cache = AnswerCache::new(store.clone());
        let q = question("example.com.");
        let mut rr = a_record("example.com.", "93.184.216.34".parse().unwrap());
        rr.ttl = 0;

        cache.set(&q, &[rr]);
        // a zero-second TTL expires immediately
        assert_eq!(cache.get(&q), None);
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = AnswerCache::in_memory();
        let q = question("example.com.");
        cache.set(&q, &[a_record("example.com.", "1.1.1.1".parse().unwrap())]);
        cache.clear();
        assert_eq!(cache.get(&q), None);
    }
}
