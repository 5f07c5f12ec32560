//! RocksDB-backed persistent ledger storage.
//!
//! Column families hold rigs, holdings, operator approvals, the event log,
//! value-book accounts, and metadata. Every committed ledger operation is
//! written as one atomic [`WriteBatch`], so a crash never leaves a half-applied
//! operation on disk.
//!
//! Keys are fixed-width big-endian so iteration order matches numeric order.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};

use rigshare_core::ledger::{ChangeSet, LedgerSnapshot};
use rigshare_core::{Address, Holding, HoldingKey, LedgerEvent, Rig, RigId, RigshareError};

// --- Column family names ---

const CF_RIGS: &str = "rigs";
const CF_HOLDINGS: &str = "holdings";
const CF_APPROVALS: &str = "approvals";
const CF_EVENTS: &str = "events";
const CF_ACCOUNTS: &str = "accounts";
const CF_META: &str = "meta";

/// All column family names.
const ALL_CFS: &[&str] = &[
    CF_RIGS,
    CF_HOLDINGS,
    CF_APPROVALS,
    CF_EVENTS,
    CF_ACCOUNTS,
    CF_META,
];

// --- Metadata keys ---

const META_TREASURY: &[u8] = b"treasury";
const META_NEXT_EVENT: &[u8] = b"next_event_seq";

/// One persisted ledger event with its sequence number and commit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct EventRecord {
    pub seq: u64,
    /// Commit time in Unix milliseconds.
    pub at_ms: i64,
    pub event: LedgerEvent,
}

impl EventRecord {
    pub fn at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.at_ms)
    }
}

/// Everything one committed operation changed.
#[derive(Debug, Clone, Copy)]
pub struct CommitBatch<'a> {
    pub changes: &'a ChangeSet,
    pub accounts: &'a [(Address, u128)],
    pub treasury: Option<u128>,
    pub at_ms: i64,
}

pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open or create a RocksDB database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RigshareError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(storage_error)?;
        Ok(Self { db })
    }

    /// Write one committed operation atomically. Returns the stored event records.
    pub fn commit(&self, batch_in: CommitBatch<'_>) -> Result<Vec<EventRecord>, RigshareError> {
        let mut batch = WriteBatch::default();

        let cf_rigs = self.cf_handle(CF_RIGS)?;
        for rig in &batch_in.changes.rigs {
            batch.put_cf(cf_rigs, rig.id.to_be_bytes(), encode(rig)?);
        }

        let cf_holdings = self.cf_handle(CF_HOLDINGS)?;
        for (key, holding) in &batch_in.changes.holdings {
            let k = holding_key(key);
            if holding.is_empty() {
                batch.delete_cf(cf_holdings, k);
            } else {
                batch.put_cf(cf_holdings, k, encode(holding)?);
            }
        }

        let cf_approvals = self.cf_handle(CF_APPROVALS)?;
        for (owner, operator, approved) in &batch_in.changes.approvals {
            let k = approval_key(owner, operator);
            if *approved {
                batch.put_cf(cf_approvals, k, []);
            } else {
                batch.delete_cf(cf_approvals, k);
            }
        }

        let cf_accounts = self.cf_handle(CF_ACCOUNTS)?;
        for (account, balance) in batch_in.accounts {
            if *balance == 0 {
                batch.delete_cf(cf_accounts, account.as_bytes());
            } else {
                batch.put_cf(cf_accounts, account.as_bytes(), balance.to_le_bytes());
            }
        }

        let cf_meta = self.cf_handle(CF_META)?;
        if let Some(treasury) = batch_in.treasury {
            batch.put_cf(cf_meta, META_TREASURY, treasury.to_le_bytes());
        }

        let cf_events = self.cf_handle(CF_EVENTS)?;
        let mut seq = self.next_event_seq()?;
        let mut records = Vec::with_capacity(batch_in.changes.events.len());
        for event in &batch_in.changes.events {
            let record = EventRecord {
                seq,
                at_ms: batch_in.at_ms,
                event: event.clone(),
            };
            batch.put_cf(cf_events, seq.to_be_bytes(), encode(&record)?);
            records.push(record);
            seq += 1;
        }
        batch.put_cf(cf_meta, META_NEXT_EVENT, seq.to_le_bytes());

        self.db.write(batch).map_err(storage_error)?;
        Ok(records)
    }

    /// Read the full ledger state.
    pub fn load_snapshot(&self) -> Result<LedgerSnapshot, RigshareError> {
        let mut snapshot = LedgerSnapshot::default();

        let cf_rigs = self.cf_handle(CF_RIGS)?;
        for item in self.db.iterator_cf(cf_rigs, IteratorMode::Start) {
            let (_, value) = item.map_err(storage_error)?;
            snapshot.rigs.push(decode::<Rig>(&value)?);
        }

        let cf_holdings = self.cf_handle(CF_HOLDINGS)?;
        for item in self.db.iterator_cf(cf_holdings, IteratorMode::Start) {
            let (key, value) = item.map_err(storage_error)?;
            snapshot
                .holdings
                .push((parse_holding_key(&key)?, decode::<Holding>(&value)?));
        }

        let cf_approvals = self.cf_handle(CF_APPROVALS)?;
        for item in self.db.iterator_cf(cf_approvals, IteratorMode::Start) {
            let (key, _) = item.map_err(storage_error)?;
            if key.len() != 40 {
                return Err(RigshareError::Storage("invalid approval key length".into()));
            }
            snapshot
                .approvals
                .push((address_at(&key, 0)?, address_at(&key, 20)?));
        }

        Ok(snapshot)
    }

    /// Value-book accounts and the treasury balance.
    pub fn load_accounts(&self) -> Result<(u128, BTreeMap<Address, u128>), RigshareError> {
        let cf_accounts = self.cf_handle(CF_ACCOUNTS)?;
        let mut accounts = BTreeMap::new();
        for item in self.db.iterator_cf(cf_accounts, IteratorMode::Start) {
            let (key, value) = item.map_err(storage_error)?;
            if key.len() != 20 {
                return Err(RigshareError::Storage("invalid account key length".into()));
            }
            accounts.insert(address_at(&key, 0)?, read_u128(&value)?);
        }
        let treasury = match self.get_meta(META_TREASURY)? {
            Some(bytes) => read_u128(&bytes)?,
            None => 0,
        };
        Ok((treasury, accounts))
    }

    /// Sequence number the next stored event will receive.
    pub fn next_event_seq(&self) -> Result<u64, RigshareError> {
        match self.get_meta(META_NEXT_EVENT)? {
            Some(bytes) if bytes.len() == 8 => {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(&bytes);
                Ok(u64::from_le_bytes(arr))
            }
            Some(_) => Err(RigshareError::Storage("invalid metadata value length".into())),
            None => Ok(0),
        }
    }

    /// Up to `limit` events starting at sequence `from`, optionally only those touching `rig`.
    pub fn events(
        &self,
        from: u64,
        limit: usize,
        rig: Option<RigId>,
    ) -> Result<Vec<EventRecord>, RigshareError> {
        let cf_events = self.cf_handle(CF_EVENTS)?;
        let start = from.to_be_bytes();
        let iter = self.db.iterator_cf(
            cf_events,
            IteratorMode::From(&start, rocksdb::Direction::Forward),
        );
        let mut out = Vec::new();
        for item in iter {
            if out.len() >= limit {
                break;
            }
            let (_, value) = item.map_err(storage_error)?;
            let record: EventRecord = decode(&value)?;
            if rig.is_none_or(|id| record.event.rig_ids().contains(&id)) {
                out.push(record);
            }
        }
        Ok(out)
    }

    /// Flush all in-memory buffers to disk.
    pub fn flush(&self) -> Result<(), RigshareError> {
        self.db.flush().map_err(storage_error)
    }

    fn get_meta(&self, key: &[u8]) -> Result<Option<Vec<u8>>, RigshareError> {
        let cf = self.cf_handle(CF_META)?;
        self.db.get_cf(cf, key).map_err(storage_error)
    }

    /// Get a column family handle.
    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily, RigshareError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| RigshareError::Storage(format!("missing column family: {name}")))
    }
}

fn storage_error(e: rocksdb::Error) -> RigshareError {
    RigshareError::Storage(e.to_string())
}

fn encode<T: bincode::Encode>(value: &T) -> Result<Vec<u8>, RigshareError> {
    bincode::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| RigshareError::Codec(e.to_string()))
}

fn decode<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T, RigshareError> {
    bincode::decode_from_slice(bytes, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| RigshareError::Codec(e.to_string()))
}

/// `rig_id (8, BE) || holder (20)`.
fn holding_key(key: &HoldingKey) -> [u8; 28] {
    let mut out = [0u8; 28];
    out[..8].copy_from_slice(&key.rig_id.to_be_bytes());
    out[8..].copy_from_slice(key.holder.as_bytes());
    out
}

fn parse_holding_key(bytes: &[u8]) -> Result<HoldingKey, RigshareError> {
    if bytes.len() != 28 {
        return Err(RigshareError::Storage("invalid holding key length".into()));
    }
    let mut id = [0u8; 8];
    id.copy_from_slice(&bytes[..8]);
    Ok(HoldingKey::new(u64::from_be_bytes(id), address_at(bytes, 8)?))
}

/// `owner (20) || operator (20)`.
fn approval_key(owner: &Address, operator: &Address) -> [u8; 40] {
    let mut out = [0u8; 40];
    out[..20].copy_from_slice(owner.as_bytes());
    out[20..].copy_from_slice(operator.as_bytes());
    out
}

fn address_at(bytes: &[u8], offset: usize) -> Result<Address, RigshareError> {
    let slice = bytes
        .get(offset..offset + 20)
        .ok_or_else(|| RigshareError::Storage("truncated address".into()))?;
    let mut arr = [0u8; 20];
    arr.copy_from_slice(slice);
    Ok(Address(arr))
}

fn read_u128(bytes: &[u8]) -> Result<u128, RigshareError> {
    let arr: [u8; 16] = bytes
        .try_into()
        .map_err(|_| RigshareError::Storage("invalid u128 value length".into()))?;
    Ok(u128::from_le_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holding_key_roundtrip_and_order() {
        let a = HoldingKey::new(1, Address([0xFF; 20]));
        let b = HoldingKey::new(2, Address([0x00; 20]));
        assert_eq!(parse_holding_key(&holding_key(&a)).unwrap(), a);
        assert!(holding_key(&a) < holding_key(&b));
    }

    #[test]
    fn parse_holding_key_rejects_bad_length() {
        assert!(parse_holding_key(&[0u8; 27]).is_err());
    }

    #[test]
    fn read_u128_rejects_bad_length() {
        assert!(read_u128(&[0u8; 8]).is_err());
        assert_eq!(read_u128(&7u128.to_le_bytes()).unwrap(), 7);
    }

    #[test]
    fn event_record_timestamp() {
        let rec = EventRecord {
            seq: 0,
            at_ms: 1_700_000_000_000,
            event: LedgerEvent::RewardsDeposited {
                rig_id: 1,
                depositor: Address::ZERO,
                value: 1,
            },
        };
        assert_eq!(rec.at().unwrap().timestamp(), 1_700_000_000);
    }
}
