//! SQLite-based store implementation

use chrono::{DateTime, SecondsFormat, Utc};
use lessor_api::{InventoryStats, NewAccountSpec, QuarantineEntry};
use lessor_util::{AccountId, OwnerId, SIBLING_HOLD_OWNER};
use rusqlite::{Connection, OptionalExtension, Params, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::{
    AccountRow, AssignOutcome, AuditEvent, ClaimOutcome, ExtendOutcome, FeedbackCredit,
    LeaseState, RotationCommit, Store, StoreError, StoreResult,
};

const ACCOUNT_COLUMNS: &str = "id, inventory_name, login, credential_ref, secret, \
                               lease_duration_hours, owner, lease_start";

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            -- Leasable inventory; rows sharing a login form a sibling group
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                inventory_name TEXT NOT NULL,
                login TEXT NOT NULL,
                credential_ref TEXT NOT NULL,
                secret TEXT NOT NULL,
                lease_duration_hours INTEGER NOT NULL CHECK (lease_duration_hours >= 1),
                owner TEXT,
                lease_start TEXT,
                CHECK ((owner IS NULL) = (lease_start IS NULL))
            );

            CREATE TABLE IF NOT EXISTS authorized_operators (
                operator TEXT PRIMARY KEY,
                added_at TEXT NOT NULL
            );

            -- Rows whose rotation failed; skipped by the sweeper
            CREATE TABLE IF NOT EXISTS rotation_quarantine (
                account_id INTEGER PRIMARY KEY,
                reason TEXT NOT NULL,
                since TEXT NOT NULL
            );

            -- Buyers whose review bonus was already granted
            CREATE TABLE IF NOT EXISTS feedback_credits (
                owner TEXT PRIMARY KEY,
                credited_at TEXT NOT NULL
            );

            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_accounts_name ON accounts(inventory_name);
            CREATE INDEX IF NOT EXISTS idx_accounts_login ON accounts(login);
            CREATE INDEX IF NOT EXISTS idx_accounts_owner ON accounts(owner);
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

/// Fixed-width UTC timestamps so text ordering matches time ordering
fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("bad timestamp '{s}': {e}")))
}

struct RawAccount {
    id: i64,
    inventory_name: String,
    login: String,
    credential_ref: String,
    secret: String,
    lease_duration_hours: u32,
    owner: Option<String>,
    lease_start: Option<String>,
}

fn read_account(row: &Row<'_>) -> rusqlite::Result<RawAccount> {
    Ok(RawAccount {
        id: row.get(0)?,
        inventory_name: row.get(1)?,
        login: row.get(2)?,
        credential_ref: row.get(3)?,
        secret: row.get(4)?,
        lease_duration_hours: row.get(5)?,
        owner: row.get(6)?,
        lease_start: row.get(7)?,
    })
}

impl RawAccount {
    fn into_row(self) -> StoreResult<AccountRow> {
        let state = match (self.owner, self.lease_start) {
            (None, None) => LeaseState::Free,
            (Some(owner), Some(start)) => {
                let started_at = parse_timestamp(&start)?;
                if owner == SIBLING_HOLD_OWNER {
                    LeaseState::Held { started_at }
                } else {
                    LeaseState::Leased {
                        owner: OwnerId::new(owner),
                        started_at,
                    }
                }
            }
            _ => {
                return Err(StoreError::Inconsistent(format!(
                    "account {} has only one of owner/lease_start",
                    self.id
                )));
            }
        };

        Ok(AccountRow {
            id: AccountId::new(self.id),
            inventory_name: self.inventory_name,
            login: self.login,
            credential_ref: self.credential_ref,
            secret: self.secret,
            lease_duration_hours: self.lease_duration_hours,
            state,
        })
    }
}

fn query_accounts<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> StoreResult<Vec<AccountRow>> {
    let mut stmt = conn.prepare(sql)?;
    let raws = stmt
        .query_map(params, read_account)?
        .collect::<Result<Vec<_>, _>>()?;
    raws.into_iter().map(RawAccount::into_row).collect()
}

fn fetch_account(conn: &Connection, id: AccountId) -> StoreResult<Option<AccountRow>> {
    conn.query_row(
        &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
        params![id.as_i64()],
        read_account,
    )
    .optional()?
    .map(RawAccount::into_row)
    .transpose()
}

fn fetch_existing(conn: &Connection, id: AccountId) -> StoreResult<AccountRow> {
    fetch_account(conn, id)?.ok_or_else(|| StoreError::NotFound(format!("account {id}")))
}

fn find_active_lease_in(
    conn: &Connection,
    owner: &OwnerId,
    inventory_name: &str,
) -> StoreResult<Option<AccountRow>> {
    let rows = query_accounts(
        conn,
        &format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts \
             WHERE owner = ?1 AND inventory_name = ?2 ORDER BY id LIMIT 1"
        ),
        params![owner.as_str(), inventory_name],
    )?;
    Ok(rows.into_iter().next())
}

fn active_leases_for_in(conn: &Connection, owner: &OwnerId) -> StoreResult<Vec<AccountRow>> {
    query_accounts(
        conn,
        &format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts \
             WHERE owner = ?1 AND owner != ?2 ORDER BY lease_start DESC, id DESC"
        ),
        params![owner.as_str(), SIBLING_HOLD_OWNER],
    )
}

/// Mark every free sibling of `id` as held with the same start stamp
fn hold_siblings(conn: &Connection, id: AccountId, start: &str) -> StoreResult<usize> {
    let held = conn.execute(
        "UPDATE accounts SET owner = ?2, lease_start = ?3 \
         WHERE login = (SELECT login FROM accounts WHERE id = ?1) \
           AND id != ?1 AND owner IS NULL",
        params![id.as_i64(), SIBLING_HOLD_OWNER, start],
    )?;
    Ok(held)
}

fn clear_group_quarantine(conn: &Connection, login: &str) -> StoreResult<usize> {
    let cleared = conn.execute(
        "DELETE FROM rotation_quarantine \
         WHERE account_id IN (SELECT id FROM accounts WHERE login = ?1)",
        params![login],
    )?;
    Ok(cleared)
}

impl Store for SqliteStore {
    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.lock()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![format_timestamp(&event.timestamp), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            events.push(AuditEvent {
                id,
                timestamp: parse_timestamp(&timestamp_str)?,
                event: serde_json::from_str(&event_json)?,
            });
        }

        Ok(events)
    }

    fn add_accounts(&self, spec: &NewAccountSpec) -> StoreResult<Vec<AccountId>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        // New lot names for a login that is already out keep the group held
        let held_since: Option<String> = tx
            .query_row(
                "SELECT lease_start FROM accounts WHERE login = ?1 AND owner IS NOT NULL LIMIT 1",
                params![spec.login],
                |row| row.get(0),
            )
            .optional()?;
        let owner = held_since.as_ref().map(|_| SIBLING_HOLD_OWNER);

        let mut ids = Vec::with_capacity(spec.inventory_names.len());
        for name in &spec.inventory_names {
            tx.execute(
                "INSERT INTO accounts \
                 (inventory_name, login, credential_ref, secret, lease_duration_hours, owner, lease_start) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    name,
                    spec.login,
                    spec.credential_ref,
                    spec.secret,
                    spec.duration_hours,
                    owner,
                    held_since
                ],
            )?;
            ids.push(AccountId::new(tx.last_insert_rowid()));
        }

        tx.commit()?;
        debug!(login = %spec.login, count = ids.len(), "Accounts added");
        Ok(ids)
    }

    fn delete_sibling_group(&self, id: AccountId) -> StoreResult<Option<(String, usize)>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let login: Option<String> = tx
            .query_row(
                "SELECT login FROM accounts WHERE id = ?1",
                params![id.as_i64()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(login) = login else {
            return Ok(None);
        };

        clear_group_quarantine(&tx, &login)?;
        let removed = tx.execute("DELETE FROM accounts WHERE login = ?1", params![login])?;

        tx.commit()?;
        Ok(Some((login, removed)))
    }

    fn get_account(&self, id: AccountId) -> StoreResult<Option<AccountRow>> {
        let conn = self.lock()?;
        fetch_account(&conn, id)
    }

    fn list_accounts(&self) -> StoreResult<Vec<AccountRow>> {
        let conn = self.lock()?;
        query_accounts(
            &conn,
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY id"),
            [],
        )
    }

    fn list_free(&self) -> StoreResult<Vec<AccountRow>> {
        let conn = self.lock()?;
        query_accounts(
            &conn,
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE owner IS NULL ORDER BY id"),
            [],
        )
    }

    fn inventory_names(&self, free_only: bool) -> StoreResult<Vec<String>> {
        let conn = self.lock()?;
        let filter = if free_only { "WHERE owner IS NULL" } else { "" };
        let mut stmt = conn.prepare(&format!(
            "SELECT inventory_name FROM accounts {filter} \
             GROUP BY inventory_name ORDER BY MIN(id)"
        ))?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn count_by_name(&self, inventory_name: &str) -> StoreResult<(u64, u64)> {
        let conn = self.lock()?;
        let (free, total): (i64, i64) = conn.query_row(
            "SELECT COALESCE(SUM(owner IS NULL), 0), COUNT(*) FROM accounts \
             WHERE inventory_name = ?1",
            params![inventory_name],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((free.max(0) as u64, total.max(0) as u64))
    }

    fn find_active_lease(
        &self,
        owner: &OwnerId,
        inventory_name: &str,
    ) -> StoreResult<Option<AccountRow>> {
        let conn = self.lock()?;
        find_active_lease_in(&conn, owner, inventory_name)
    }

    fn active_leases_for(&self, owner: &OwnerId) -> StoreResult<Vec<AccountRow>> {
        let conn = self.lock()?;
        active_leases_for_in(&conn, owner)
    }

    fn list_active_leases(&self) -> StoreResult<Vec<AccountRow>> {
        let conn = self.lock()?;
        query_accounts(
            &conn,
            &format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts \
                 WHERE owner IS NOT NULL AND owner != ?1 AND lease_start IS NOT NULL \
                 ORDER BY id"
            ),
            params![SIBLING_HOLD_OWNER],
        )
    }

    fn claim_free(
        &self,
        inventory_name: &str,
        owner: &OwnerId,
        duration_hours: u32,
        start: DateTime<Utc>,
    ) -> StoreResult<ClaimOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let start = format_timestamp(&start);

        // Compare-and-set: only a free row of a wholly free group, and only
        // if the owner does not already lease this lot
        let claimed = tx.execute(
            "UPDATE accounts SET owner = ?1, lease_start = ?2, lease_duration_hours = ?3 \
             WHERE id = ( \
                 SELECT a.id FROM accounts a \
                 WHERE a.inventory_name = ?4 AND a.owner IS NULL \
                   AND NOT EXISTS ( \
                       SELECT 1 FROM accounts s WHERE s.login = a.login AND s.owner IS NOT NULL) \
                 ORDER BY a.id LIMIT 1) \
               AND owner IS NULL \
               AND NOT EXISTS ( \
                   SELECT 1 FROM accounts o WHERE o.inventory_name = ?4 AND o.owner = ?1)",
            params![owner.as_str(), start, duration_hours, inventory_name],
        )?;

        let outcome = if claimed == 1 {
            let row = find_active_lease_in(&tx, owner, inventory_name)?.ok_or_else(|| {
                StoreError::Database(format!("claimed row of '{inventory_name}' vanished"))
            })?;
            hold_siblings(&tx, row.id, &start)?;
            ClaimOutcome::Claimed(row)
        } else if let Some(existing) = find_active_lease_in(&tx, owner, inventory_name)? {
            ClaimOutcome::OwnerHoldsLot(existing)
        } else {
            let known: bool = tx.query_row(
                "SELECT EXISTS (SELECT 1 FROM accounts WHERE inventory_name = ?1)",
                params![inventory_name],
                |row| row.get(0),
            )?;
            if known {
                ClaimOutcome::NoneFree
            } else {
                ClaimOutcome::UnknownName
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    fn assign(
        &self,
        id: AccountId,
        owner: &OwnerId,
        start: DateTime<Utc>,
    ) -> StoreResult<AssignOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let start = format_timestamp(&start);

        let Some(row) = fetch_account(&tx, id)? else {
            return Ok(AssignOutcome::NotFound);
        };
        if !row.is_free() {
            return Ok(AssignOutcome::AlreadyLeased(row));
        }

        let claimed = tx.execute(
            "UPDATE accounts SET owner = ?2, lease_start = ?3 \
             WHERE id = ?1 AND owner IS NULL",
            params![id.as_i64(), owner.as_str(), start],
        )?;
        if claimed == 0 {
            let row = fetch_existing(&tx, id)?;
            return Ok(AssignOutcome::AlreadyLeased(row));
        }
        hold_siblings(&tx, id, &start)?;
        let row = fetch_existing(&tx, id)?;

        tx.commit()?;
        Ok(AssignOutcome::Assigned(row))
    }

    fn extend(
        &self,
        id: AccountId,
        add_hours: u32,
        max_hours: u32,
    ) -> StoreResult<ExtendOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let changed = tx.execute(
            "UPDATE accounts SET lease_duration_hours = lease_duration_hours + ?2 \
             WHERE id = ?1 AND owner IS NOT NULL AND owner != ?3 \
               AND lease_duration_hours + ?2 <= ?4",
            params![id.as_i64(), add_hours, SIBLING_HOLD_OWNER, max_hours],
        )?;

        let outcome = match fetch_account(&tx, id)? {
            Some(row) if changed == 1 => ExtendOutcome::Extended(row),
            Some(row) if row.is_leased() => ExtendOutcome::OverLimit(row),
            _ => ExtendOutcome::NotLeased,
        };

        tx.commit()?;
        Ok(outcome)
    }

    fn release(&self, id: AccountId) -> StoreResult<Option<AccountRow>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let row = match fetch_account(&tx, id)? {
            Some(row) if row.is_leased() => row,
            _ => return Ok(None),
        };

        tx.execute(
            "UPDATE accounts SET owner = NULL, lease_start = NULL \
             WHERE login = ?1 AND (id = ?2 OR owner = ?3)",
            params![row.login, id.as_i64(), SIBLING_HOLD_OWNER],
        )?;

        tx.commit()?;
        Ok(Some(row))
    }

    fn complete_rotation(
        &self,
        expired: &AccountRow,
        new_secret: &str,
        reset_duration_hours: u32,
    ) -> StoreResult<RotationCommit> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let login = &expired.login;

        let unchanged = fetch_account(&tx, expired.id)?.is_some_and(|current| {
            current.state == expired.state
                && current.lease_duration_hours == expired.lease_duration_hours
        });

        let commit = if unchanged {
            let updated = tx.execute(
                "UPDATE accounts SET secret = ?2, owner = NULL, lease_start = NULL, \
                 lease_duration_hours = ?3 WHERE login = ?1",
                params![login, new_secret, reset_duration_hours],
            )?;
            RotationCommit::Released(updated)
        } else {
            debug!(account_id = %expired.id, login = %login, "Lease changed during rotation");
            let updated = tx.execute(
                "UPDATE accounts SET secret = ?2 WHERE login = ?1",
                params![login, new_secret],
            )?;
            RotationCommit::LeaseChanged(updated)
        };
        clear_group_quarantine(&tx, login)?;

        tx.commit()?;
        Ok(commit)
    }

    fn replace_group_secret(&self, login: &str, new_secret: &str) -> StoreResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let updated = tx.execute(
            "UPDATE accounts SET secret = ?2 WHERE login = ?1",
            params![login, new_secret],
        )?;
        clear_group_quarantine(&tx, login)?;

        tx.commit()?;
        Ok(updated)
    }

    fn quarantine(&self, id: AccountId, reason: &str, since: DateTime<Utc>) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO rotation_quarantine (account_id, reason, since) VALUES (?1, ?2, ?3) \
             ON CONFLICT(account_id) DO UPDATE SET reason = excluded.reason",
            params![id.as_i64(), reason, format_timestamp(&since)],
        )?;
        Ok(())
    }

    fn is_quarantined(&self, id: AccountId) -> StoreResult<bool> {
        let conn = self.lock()?;
        let quarantined: bool = conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM rotation_quarantine WHERE account_id = ?1)",
            params![id.as_i64()],
            |row| row.get(0),
        )?;
        Ok(quarantined)
    }

    fn list_quarantined(&self) -> StoreResult<Vec<QuarantineEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT account_id, reason, since FROM rotation_quarantine ORDER BY account_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, reason, since)| -> StoreResult<QuarantineEntry> {
                Ok(QuarantineEntry {
                    account_id: AccountId::new(id),
                    reason,
                    since: parse_timestamp(&since)?,
                })
            })
            .collect()
    }

    fn credit_feedback(
        &self,
        owner: &OwnerId,
        bonus_hours: u32,
        max_hours: u32,
        at: DateTime<Utc>,
    ) -> StoreResult<FeedbackCredit> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let already: bool = tx.query_row(
            "SELECT EXISTS (SELECT 1 FROM feedback_credits WHERE owner = ?1)",
            params![owner.as_str()],
            |row| row.get(0),
        )?;
        if already {
            return Ok(FeedbackCredit::AlreadyCredited);
        }

        let extended = tx.execute(
            "UPDATE accounts SET lease_duration_hours = \
                 MAX(lease_duration_hours, MIN(lease_duration_hours + ?2, ?4)) \
             WHERE owner = ?1 AND owner != ?3",
            params![owner.as_str(), bonus_hours, SIBLING_HOLD_OWNER, max_hours],
        )?;
        if extended == 0 {
            return Ok(FeedbackCredit::NoActiveLease);
        }

        tx.execute(
            "INSERT INTO feedback_credits (owner, credited_at) VALUES (?1, ?2)",
            params![owner.as_str(), format_timestamp(&at)],
        )?;
        let leases = active_leases_for_in(&tx, owner)?;

        tx.commit()?;
        Ok(FeedbackCredit::Credited(leases))
    }

    fn stats(&self, now: DateTime<Utc>) -> StoreResult<InventoryStats> {
        let conn = self.lock()?;
        let rows = query_accounts(
            &conn,
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts"),
            [],
        )?;
        let quarantined: i64 =
            conn.query_row("SELECT COUNT(*) FROM rotation_quarantine", [], |row| {
                row.get(0)
            })?;

        let day_ago = now - chrono::Duration::hours(24);
        let mut stats = InventoryStats {
            total: rows.len() as u64,
            quarantined: quarantined.max(0) as u64,
            ..Default::default()
        };
        for row in &rows {
            match &row.state {
                LeaseState::Free => stats.free += 1,
                LeaseState::Held { .. } => stats.held += 1,
                LeaseState::Leased { started_at, .. } => {
                    stats.active += 1;
                    stats.leased_hours += u64::from(row.lease_duration_hours);
                    if *started_at >= day_ago {
                        stats.started_last_24h += 1;
                    }
                }
            }
        }

        Ok(stats)
    }

    fn add_operator(&self, operator: &str) -> StoreResult<bool> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO authorized_operators (operator, added_at) VALUES (?1, ?2)",
            params![operator, format_timestamp(&lessor_util::now())],
        )?;
        Ok(inserted > 0)
    }

    fn list_operators(&self) -> StoreResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT operator FROM authorized_operators ORDER BY added_at, operator")?;
        let operators = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(operators)
    }

    fn is_operator(&self, operator: &str) -> StoreResult<bool> {
        let conn = self.lock()?;
        let known: bool = conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM authorized_operators WHERE operator = ?1)",
            params![operator],
            |row| row.get(0),
        )?;
        Ok(known)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.execute_batch("SELECT 1").is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuditEventType;
    use chrono::TimeZone;

    const CAP: u32 = 720;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn spec(names: &[&str], login: &str) -> NewAccountSpec {
        NewAccountSpec {
            inventory_names: names.iter().map(|n| n.to_string()).collect(),
            login: login.into(),
            credential_ref: format!("{login}.maFile"),
            secret: "initial-secret".into(),
            duration_hours: 1,
        }
    }

    /// Every row must have both owner and lease_start, or neither
    fn assert_pairing(store: &SqliteStore) {
        let conn = store.lock().unwrap();
        let broken: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM accounts WHERE (owner IS NULL) != (lease_start IS NULL)",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(broken, 0);
    }

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.is_healthy());
    }

    #[test]
    fn test_audit_log() {
        let store = SqliteStore::in_memory().unwrap();

        store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStarted))
            .unwrap();

        let events = store.get_recent_audits(10).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].event, AuditEventType::ServiceStarted));
    }

    #[test]
    fn claim_holds_every_sibling() {
        let store = SqliteStore::in_memory().unwrap();
        store.add_accounts(&spec(&["LotA", "LotB", "LotC"], "L1")).unwrap();
        let alice = OwnerId::new("alice");

        let outcome = store.claim_free("LotB", &alice, 3, t0()).unwrap();
        let row = match outcome {
            ClaimOutcome::Claimed(row) => row,
            other => panic!("expected claim, got {other:?}"),
        };
        assert_eq!(row.inventory_name, "LotB");
        assert_eq!(row.lease_duration_hours, 3);

        let rows = store.list_accounts().unwrap();
        assert_eq!(rows.iter().filter(|r| r.is_leased()).count(), 1);
        assert_eq!(
            rows.iter()
                .filter(|r| matches!(r.state, LeaseState::Held { .. }))
                .count(),
            2
        );
        assert!(store.list_free().unwrap().is_empty());
        assert_pairing(&store);
    }

    #[test]
    fn claim_refuses_second_row_for_same_owner() {
        let store = SqliteStore::in_memory().unwrap();
        store.add_accounts(&spec(&["LotA"], "L1")).unwrap();
        store.add_accounts(&spec(&["LotA"], "L2")).unwrap();
        let alice = OwnerId::new("alice");

        assert!(matches!(
            store.claim_free("LotA", &alice, 1, t0()).unwrap(),
            ClaimOutcome::Claimed(_)
        ));
        assert!(matches!(
            store.claim_free("LotA", &alice, 1, t0()).unwrap(),
            ClaimOutcome::OwnerHoldsLot(_)
        ));
        assert_eq!(store.count_by_name("LotA").unwrap(), (1, 2));
    }

    #[test]
    fn claim_distinguishes_taken_and_unknown() {
        let store = SqliteStore::in_memory().unwrap();
        store.add_accounts(&spec(&["LotA"], "L1")).unwrap();

        store.claim_free("LotA", &OwnerId::new("x"), 1, t0()).unwrap();
        assert!(matches!(
            store.claim_free("LotA", &OwnerId::new("y"), 1, t0()).unwrap(),
            ClaimOutcome::NoneFree
        ));
        assert!(matches!(
            store.claim_free("Nope", &OwnerId::new("y"), 1, t0()).unwrap(),
            ClaimOutcome::UnknownName
        ));
    }

    #[test]
    fn extend_free_row_is_noop() {
        let store = SqliteStore::in_memory().unwrap();
        let ids = store.add_accounts(&spec(&["LotA"], "L1")).unwrap();

        let before = store.get_account(ids[0]).unwrap().unwrap();
        assert!(matches!(
            store.extend(ids[0], 5, CAP).unwrap(),
            ExtendOutcome::NotLeased
        ));
        let after = store.get_account(ids[0]).unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn extend_held_row_is_refused() {
        let store = SqliteStore::in_memory().unwrap();
        let ids = store.add_accounts(&spec(&["LotA", "LotB"], "L1")).unwrap();
        store.assign(ids[0], &OwnerId::new("alice"), t0()).unwrap();

        assert!(matches!(
            store.extend(ids[1], 2, CAP).unwrap(),
            ExtendOutcome::NotLeased
        ));
        match store.extend(ids[0], 2, CAP).unwrap() {
            ExtendOutcome::Extended(row) => assert_eq!(row.lease_duration_hours, 3),
            other => panic!("expected extension, got {other:?}"),
        }
    }

    #[test]
    fn extend_refuses_to_pass_cap() {
        let store = SqliteStore::in_memory().unwrap();
        let ids = store.add_accounts(&spec(&["LotA"], "L1")).unwrap();
        store.claim_free("LotA", &OwnerId::new("alice"), 10, t0()).unwrap();

        assert!(matches!(
            store.extend(ids[0], 3, 12).unwrap(),
            ExtendOutcome::OverLimit(row) if row.lease_duration_hours == 10
        ));
        assert!(matches!(
            store.extend(ids[0], u32::MAX, u32::MAX).unwrap(),
            ExtendOutcome::OverLimit(_)
        ));
        assert!(matches!(
            store.extend(ids[0], 2, 12).unwrap(),
            ExtendOutcome::Extended(row) if row.lease_duration_hours == 12
        ));
        // The stored duration still reads back
        assert_eq!(store.list_active_leases().unwrap().len(), 1);
    }

    #[test]
    fn assign_reports_conflicts() {
        let store = SqliteStore::in_memory().unwrap();
        let ids = store.add_accounts(&spec(&["LotA", "LotB"], "L1")).unwrap();

        assert!(matches!(
            store.assign(ids[0], &OwnerId::new("alice"), t0()).unwrap(),
            AssignOutcome::Assigned(_)
        ));
        // The sibling is held, so it cannot be handed out either
        assert!(matches!(
            store.assign(ids[1], &OwnerId::new("bob"), t0()).unwrap(),
            AssignOutcome::AlreadyLeased(_)
        ));
        assert!(matches!(
            store.assign(AccountId::new(99), &OwnerId::new("bob"), t0()).unwrap(),
            AssignOutcome::NotFound
        ));
    }

    #[test]
    fn release_frees_siblings_but_keeps_duration() {
        let store = SqliteStore::in_memory().unwrap();
        let ids = store.add_accounts(&spec(&["LotA", "LotB"], "L1")).unwrap();
        let alice = OwnerId::new("alice");
        store.claim_free("LotA", &alice, 4, t0()).unwrap();

        let released = store.release(ids[0]).unwrap().unwrap();
        assert_eq!(released.owner(), Some(&alice));

        let rows = store.list_accounts().unwrap();
        assert!(rows.iter().all(|r| r.is_free()));
        assert_eq!(rows[0].lease_duration_hours, 4);
        assert!(store.release(ids[0]).unwrap().is_none());
        assert_pairing(&store);
    }

    #[test]
    fn rotation_resets_group_and_clears_quarantine() {
        let store = SqliteStore::in_memory().unwrap();
        let ids = store.add_accounts(&spec(&["LotA", "LotB"], "L1")).unwrap();
        store.claim_free("LotA", &OwnerId::new("alice"), 5, t0()).unwrap();
        store.quarantine(ids[0], "provider refused", t0()).unwrap();
        assert!(store.is_quarantined(ids[0]).unwrap());

        let expired = store.get_account(ids[0]).unwrap().unwrap();
        assert_eq!(
            store.complete_rotation(&expired, "fresh-secret", 1).unwrap(),
            RotationCommit::Released(2)
        );

        for row in store.list_accounts().unwrap() {
            assert!(row.is_free());
            assert_eq!(row.secret, "fresh-secret");
            assert_eq!(row.lease_duration_hours, 1);
        }
        assert!(!store.is_quarantined(ids[0]).unwrap());
        assert_pairing(&store);
    }

    #[test]
    fn rotation_leaves_a_newer_lease_alone() {
        let store = SqliteStore::in_memory().unwrap();
        let ids = store.add_accounts(&spec(&["LotA", "LotB"], "L1")).unwrap();
        store.claim_free("LotA", &OwnerId::new("alice"), 1, t0()).unwrap();
        let expired = store.get_account(ids[0]).unwrap().unwrap();

        // Released and re-let to someone else before the commit lands
        store.release(ids[0]).unwrap();
        let bob = OwnerId::new("bob");
        store.claim_free("LotB", &bob, 5, t0()).unwrap();

        assert_eq!(
            store.complete_rotation(&expired, "fresh-secret", 1).unwrap(),
            RotationCommit::LeaseChanged(2)
        );
        let leases = store.active_leases_for(&bob).unwrap();
        assert_eq!(leases.len(), 1);
        assert_eq!(leases[0].lease_duration_hours, 5);
        assert!(store.list_accounts().unwrap().iter().all(|r| r.secret == "fresh-secret"));
        assert_pairing(&store);
    }

    #[test]
    fn rotation_keeps_an_extension_made_meanwhile() {
        let store = SqliteStore::in_memory().unwrap();
        let ids = store.add_accounts(&spec(&["LotA"], "L1")).unwrap();
        let alice = OwnerId::new("alice");
        store.claim_free("LotA", &alice, 1, t0()).unwrap();
        let expired = store.get_account(ids[0]).unwrap().unwrap();

        store.extend(ids[0], 2, CAP).unwrap();

        assert_eq!(
            store.complete_rotation(&expired, "fresh-secret", 1).unwrap(),
            RotationCommit::LeaseChanged(1)
        );
        let row = store.get_account(ids[0]).unwrap().unwrap();
        assert_eq!(row.owner(), Some(&alice));
        assert_eq!(row.lease_duration_hours, 3);
    }

    #[test]
    fn adding_to_leased_login_starts_held() {
        let store = SqliteStore::in_memory().unwrap();
        store.add_accounts(&spec(&["LotA"], "L1")).unwrap();
        store.claim_free("LotA", &OwnerId::new("alice"), 1, t0()).unwrap();

        let ids = store.add_accounts(&spec(&["LotB"], "L1")).unwrap();
        let row = store.get_account(ids[0]).unwrap().unwrap();
        assert_eq!(row.state, LeaseState::Held { started_at: t0() });
    }

    #[test]
    fn delete_removes_whole_group() {
        let store = SqliteStore::in_memory().unwrap();
        let ids = store.add_accounts(&spec(&["LotA", "LotB"], "L1")).unwrap();
        store.add_accounts(&spec(&["LotC"], "L2")).unwrap();

        let (login, removed) = store.delete_sibling_group(ids[1]).unwrap().unwrap();
        assert_eq!(login, "L1");
        assert_eq!(removed, 2);
        assert_eq!(store.inventory_names(false).unwrap(), vec!["LotC".to_string()]);
        assert!(store.delete_sibling_group(ids[0]).unwrap().is_none());
    }

    #[test]
    fn feedback_credited_once() {
        let store = SqliteStore::in_memory().unwrap();
        store.add_accounts(&spec(&["LotA"], "L1")).unwrap();
        store.add_accounts(&spec(&["LotB"], "L2")).unwrap();
        let alice = OwnerId::new("alice");

        assert!(matches!(
            store.credit_feedback(&alice, 1, CAP, t0()).unwrap(),
            FeedbackCredit::NoActiveLease
        ));

        store.claim_free("LotA", &alice, 2, t0()).unwrap();
        store.claim_free("LotB", &alice, 3, t0()).unwrap();

        match store.credit_feedback(&alice, 1, CAP, t0()).unwrap() {
            FeedbackCredit::Credited(leases) => {
                let mut hours: Vec<u32> = leases.iter().map(|r| r.lease_duration_hours).collect();
                hours.sort();
                assert_eq!(hours, vec![3, 4]);
            }
            other => panic!("expected credit, got {other:?}"),
        }
        assert!(matches!(
            store.credit_feedback(&alice, 1, CAP, t0()).unwrap(),
            FeedbackCredit::AlreadyCredited
        ));
    }

    #[test]
    fn feedback_credit_stops_at_cap() {
        let store = SqliteStore::in_memory().unwrap();
        store.add_accounts(&spec(&["LotA"], "L1")).unwrap();
        let alice = OwnerId::new("alice");
        store.claim_free("LotA", &alice, 11, t0()).unwrap();

        match store.credit_feedback(&alice, 5, 12, t0()).unwrap() {
            FeedbackCredit::Credited(leases) => assert_eq!(leases[0].lease_duration_hours, 12),
            other => panic!("expected credit, got {other:?}"),
        }
    }

    #[test]
    fn stats_count_only_real_leases() {
        let store = SqliteStore::in_memory().unwrap();
        store.add_accounts(&spec(&["LotA", "LotB", "LotC"], "L1")).unwrap();
        store.add_accounts(&spec(&["LotD"], "L2")).unwrap();
        store.claim_free("LotA", &OwnerId::new("alice"), 3, t0()).unwrap();

        let stats = store.stats(t0() + chrono::Duration::hours(1)).unwrap();
        assert_eq!(
            stats,
            InventoryStats {
                total: 4,
                active: 1,
                held: 2,
                free: 1,
                leased_hours: 3,
                started_last_24h: 1,
                quarantined: 0,
            }
        );

        let later = store.stats(t0() + chrono::Duration::hours(30)).unwrap();
        assert_eq!(later.started_last_24h, 0);
    }

    #[test]
    fn operators_are_unique() {
        let store = SqliteStore::in_memory().unwrap();

        assert!(store.add_operator("ops").unwrap());
        assert!(!store.add_operator("ops").unwrap());
        assert!(store.is_operator("ops").unwrap());
        assert!(!store.is_operator("other").unwrap());
        assert_eq!(store.list_operators().unwrap(), vec!["ops".to_string()]);
    }

    #[test]
    fn quarantine_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lessord.db");

        let id = {
            let store = SqliteStore::open(&path).unwrap();
            let ids = store.add_accounts(&spec(&["LotA"], "L1")).unwrap();
            store.quarantine(ids[0], "timeout", t0()).unwrap();
            ids[0]
        };

        let store = SqliteStore::open(&path).unwrap();
        let entries = store.list_quarantined().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].account_id, id);
        assert_eq!(entries[0].since, t0());
    }
}
