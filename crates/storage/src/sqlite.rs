use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params, params_from_iter};

use rackline_core::{
    AttrFilter, AttrValue, Attribute, EntityId, NumberFilter, SubkeyFilter, Version,
    name::{validate_key, validate_name},
};

use crate::error::StoreError;
use crate::records::{ClaimKind, EntityRecord, View};

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Begin a write transaction, minting the working version it will stamp
    /// onto every row it touches. Dropping the returned handle without
    /// committing rolls everything back, including the version row.
    pub fn begin(&mut self) -> Result<Txn<'_>, StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute("INSERT INTO versions DEFAULT VALUES", [])?;
        let version = Version::from_raw(tx.last_insert_rowid() as u64);
        tracing::trace!(%version, "begin transaction");
        Ok(Txn {
            tx,
            version,
            writes: 0,
        })
    }

    pub fn latest_version(&self) -> Result<Version, StoreError> {
        latest_version(&self.conn)
    }

    pub fn get_entity(&self, id: EntityId, view: View) -> Result<Option<EntityRecord>, StoreError> {
        get_entity(&self.conn, id, view)
    }

    pub fn get_entity_by_name(
        &self,
        name: &str,
        view: View,
    ) -> Result<Option<EntityRecord>, StoreError> {
        get_entity_by_name(&self.conn, name, view)
    }

    pub fn list_entities(
        &self,
        kind: Option<&str>,
        driver: Option<&str>,
        view: View,
    ) -> Result<Vec<EntityRecord>, StoreError> {
        list_entities(&self.conn, kind, driver, view)
    }

    pub fn attrs(
        &self,
        entity_id: EntityId,
        filter: &AttrFilter,
        view: View,
    ) -> Result<Vec<Attribute>, StoreError> {
        attrs(&self.conn, entity_id, filter, view)
    }

    /// Live relation attributes pointing at `target`, additionally narrowed
    /// by `filter` (applied to the referencing rows).
    pub fn referencers(
        &self,
        target: EntityId,
        filter: &AttrFilter,
        view: View,
    ) -> Result<Vec<Attribute>, StoreError> {
        referencers(&self.conn, target, filter, view)
    }

    /// Claim rows (exclusive or forced) for a given resource key and value.
    pub fn claims(
        &self,
        key: &str,
        value: &AttrValue,
        view: View,
    ) -> Result<Vec<Attribute>, StoreError> {
        claims(&self.conn, key, value, view)
    }

    /// Every claim row recorded under a resource key, regardless of value.
    pub fn claims_for_key(&self, key: &str, view: View) -> Result<Vec<Attribute>, StoreError> {
        claims_for_key(&self.conn, key, view)
    }
}

/// An open write transaction. All mutations stamp `version`; `commit`
/// refuses to publish a version that changed nothing.
pub struct Txn<'conn> {
    tx: rusqlite::Transaction<'conn>,
    version: Version,
    writes: u64,
}

impl Txn<'_> {
    pub fn working_version(&self) -> Version {
        self.version
    }

    pub fn commit(self) -> Result<Version, StoreError> {
        if self.writes == 0 {
            self.tx.rollback()?;
            return Err(StoreError::EmptyCommit);
        }
        let version = self.version;
        self.tx.commit()?;
        tracing::trace!(%version, "commit transaction");
        Ok(version)
    }

    pub fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback()?;
        Ok(())
    }

    pub fn create_entity(
        &mut self,
        name: &str,
        kind: &str,
        driver: &str,
    ) -> Result<EntityId, StoreError> {
        validate_name(name)?;
        let result = self.tx.execute(
            "INSERT INTO entities (name, kind, driver, version) VALUES (?1, ?2, ?3, ?4)",
            params![name, kind, driver, self.version.as_u64() as i64],
        );
        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(StoreError::NameInUse(name.to_string()));
            }
            Err(e) => return Err(StoreError::Sqlite(e)),
        }
        self.writes += 1;
        Ok(EntityId::from_raw(self.tx.last_insert_rowid()))
    }

    /// Soft-delete an entity, its live attributes, and every live relation
    /// attribute pointing at it. Keeps the invariant that live attributes
    /// only ever reference live entities.
    pub fn delete_entity(&mut self, id: EntityId) -> Result<bool, StoreError> {
        let v = self.version.as_u64() as i64;
        let entity_rows = self.tx.execute(
            "UPDATE entities SET deleted_at_version = ?1
             WHERE entity_id = ?2 AND deleted_at_version IS NULL",
            params![v, id.as_i64()],
        )?;
        let attr_rows = self.tx.execute(
            "UPDATE attributes SET deleted_at_version = ?1
             WHERE (entity_id = ?2 OR relation_id = ?2) AND deleted_at_version IS NULL",
            params![v, id.as_i64()],
        )?;
        self.writes += (entity_rows + attr_rows) as u64;
        Ok(entity_rows > 0)
    }

    pub fn add_attr(
        &mut self,
        entity_id: EntityId,
        key: &str,
        subkey: Option<&str>,
        number: Option<i64>,
        value: &AttrValue,
        claim: ClaimKind,
    ) -> Result<Attribute, StoreError> {
        validate_key(key)?;
        if let Some(subkey) = subkey {
            validate_key(subkey)?;
        }
        let (int_v, text_v, dt_v, rel_v) = value_columns(value);
        let result = self.tx.execute(
            "INSERT INTO attributes
                (entity_id, key, subkey, number, datatype,
                 int_value, text_value, datetime_value, relation_id,
                 is_claim, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                entity_id.as_i64(),
                key,
                subkey,
                number,
                value.datatype(),
                int_v,
                text_v,
                dt_v,
                rel_v,
                claim.as_i64(),
                self.version.as_u64() as i64,
            ],
        );
        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation && claim.is_claim() =>
            {
                return Err(StoreError::ResourceTaken(format!("{key}={value:?}")));
            }
            Err(e) => return Err(StoreError::Sqlite(e)),
        }
        self.writes += 1;
        Ok(Attribute {
            entity_id,
            key: key.to_string(),
            subkey: subkey.map(str::to_string),
            number,
            value: value.clone(),
            version: self.version,
            deleted_at_version: None,
        })
    }

    /// Soft-delete live attributes matching `filter`. Returns the number of
    /// rows stamped.
    pub fn del_attrs(
        &mut self,
        entity_id: EntityId,
        filter: &AttrFilter,
    ) -> Result<usize, StoreError> {
        let mut sql = String::from(
            "UPDATE attributes SET deleted_at_version = ?
             WHERE entity_id = ? AND deleted_at_version IS NULL",
        );
        let mut sql_params: Vec<SqlValue> = vec![
            SqlValue::Integer(self.version.as_u64() as i64),
            SqlValue::Integer(entity_id.as_i64()),
        ];
        push_filter(filter, &mut sql, &mut sql_params);
        let rows = self.tx.execute(&sql, params_from_iter(sql_params))?;
        self.writes += rows as u64;
        Ok(rows)
    }

    /// Bump and return the monotonic counter for (entity, key). Starts at 1.
    pub fn next_counter(&mut self, entity_id: EntityId, key: &str) -> Result<i64, StoreError> {
        let value: i64 = self.tx.query_row(
            "INSERT INTO counters (entity_id, key, value) VALUES (?1, ?2, 1)
             ON CONFLICT (entity_id, key) DO UPDATE SET value = value + 1
             RETURNING value",
            params![entity_id.as_i64(), key],
            |row| row.get(0),
        )?;
        self.writes += 1;
        Ok(value)
    }

    // Reads inside the transaction see its own uncommitted writes.

    pub fn get_entity_by_name(&self, name: &str) -> Result<Option<EntityRecord>, StoreError> {
        get_entity_by_name(&self.tx, name, View::Latest)
    }

    pub fn get_entity(&self, id: EntityId) -> Result<Option<EntityRecord>, StoreError> {
        get_entity(&self.tx, id, View::Latest)
    }

    pub fn attrs(
        &self,
        entity_id: EntityId,
        filter: &AttrFilter,
    ) -> Result<Vec<Attribute>, StoreError> {
        attrs(&self.tx, entity_id, filter, View::Latest)
    }

    pub fn claims(&self, key: &str, value: &AttrValue) -> Result<Vec<Attribute>, StoreError> {
        claims(&self.tx, key, value, View::Latest)
    }
}

// ---------------------------------------------------------------------------
// Shared query helpers. Free functions over &Connection so both the store
// and an open transaction (which derefs to Connection) can use them.
// ---------------------------------------------------------------------------

fn latest_version(conn: &Connection) -> Result<Version, StoreError> {
    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM versions", [], |row| row.get(0))?;
    Ok(Version::from_raw(v.unwrap_or(0) as u64))
}

fn value_columns(value: &AttrValue) -> (Option<i64>, Option<String>, Option<i64>, Option<i64>) {
    match value {
        AttrValue::Int(n) => (Some(*n), None, None, None),
        AttrValue::Text(s) => (None, Some(s.clone()), None, None),
        AttrValue::DateTime(ms) => (None, None, Some(*ms), None),
        AttrValue::Relation(id) => (None, None, None, Some(id.as_i64())),
    }
}

/// Append the version-window predicate for `view`:
/// `version <= pin AND (deleted_at_version IS NULL OR deleted_at_version > pin)`,
/// or plain liveness when reading the latest state.
fn push_view(view: View, sql: &mut String, sql_params: &mut Vec<SqlValue>) {
    match view.pin() {
        None => sql.push_str(" AND deleted_at_version IS NULL"),
        Some(pin) => {
            sql.push_str(
                " AND version <= ? AND (deleted_at_version IS NULL OR deleted_at_version > ?)",
            );
            sql_params.push(SqlValue::Integer(pin));
            sql_params.push(SqlValue::Integer(pin));
        }
    }
}

fn push_filter(filter: &AttrFilter, sql: &mut String, sql_params: &mut Vec<SqlValue>) {
    if let Some(key) = &filter.key {
        sql.push_str(" AND key = ?");
        sql_params.push(SqlValue::Text(key.clone()));
    }
    match &filter.subkey {
        SubkeyFilter::Any => {}
        SubkeyFilter::None => sql.push_str(" AND subkey IS NULL"),
        SubkeyFilter::Is(s) => {
            sql.push_str(" AND subkey = ?");
            sql_params.push(SqlValue::Text(s.clone()));
        }
    }
    match filter.number {
        NumberFilter::Any => {}
        NumberFilter::None => sql.push_str(" AND number IS NULL"),
        NumberFilter::Is(n) => {
            sql.push_str(" AND number = ?");
            sql_params.push(SqlValue::Integer(n));
        }
    }
    if let Some(value) = &filter.value {
        push_value_predicate(value, sql, sql_params);
    }
}

fn push_value_predicate(value: &AttrValue, sql: &mut String, sql_params: &mut Vec<SqlValue>) {
    sql.push_str(" AND datatype = ?");
    sql_params.push(SqlValue::Text(value.datatype().to_string()));
    match value {
        AttrValue::Int(n) => {
            sql.push_str(" AND int_value = ?");
            sql_params.push(SqlValue::Integer(*n));
        }
        AttrValue::Text(s) => {
            sql.push_str(" AND text_value = ?");
            sql_params.push(SqlValue::Text(s.clone()));
        }
        AttrValue::DateTime(ms) => {
            sql.push_str(" AND datetime_value = ?");
            sql_params.push(SqlValue::Integer(*ms));
        }
        AttrValue::Relation(id) => {
            sql.push_str(" AND relation_id = ?");
            sql_params.push(SqlValue::Integer(id.as_i64()));
        }
    }
}

const ENTITY_COLS: &str = "entity_id, name, kind, driver, version, deleted_at_version";

fn read_entity(row: &rusqlite::Row) -> rusqlite::Result<EntityRecord> {
    Ok(EntityRecord {
        entity_id: EntityId::from_raw(row.get(0)?),
        name: row.get(1)?,
        kind: row.get(2)?,
        driver: row.get(3)?,
        version: Version::from_raw(row.get::<_, i64>(4)? as u64),
        deleted_at_version: row
            .get::<_, Option<i64>>(5)?
            .map(|v| Version::from_raw(v as u64)),
    })
}

fn get_entity(conn: &Connection, id: EntityId, view: View) -> Result<Option<EntityRecord>, StoreError> {
    let mut sql = format!("SELECT {ENTITY_COLS} FROM entities WHERE entity_id = ?");
    let mut sql_params: Vec<SqlValue> = vec![SqlValue::Integer(id.as_i64())];
    push_view(view, &mut sql, &mut sql_params);
    query_one_entity(conn, &sql, sql_params)
}

fn get_entity_by_name(
    conn: &Connection,
    name: &str,
    view: View,
) -> Result<Option<EntityRecord>, StoreError> {
    let mut sql = format!("SELECT {ENTITY_COLS} FROM entities WHERE name = ?");
    let mut sql_params: Vec<SqlValue> = vec![SqlValue::Text(name.to_string())];
    push_view(view, &mut sql, &mut sql_params);
    query_one_entity(conn, &sql, sql_params)
}

fn query_one_entity(
    conn: &Connection,
    sql: &str,
    sql_params: Vec<SqlValue>,
) -> Result<Option<EntityRecord>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query_map(params_from_iter(sql_params), read_entity)?;
    match rows.next() {
        Some(Ok(record)) => Ok(Some(record)),
        Some(Err(e)) => Err(StoreError::Sqlite(e)),
        None => Ok(None),
    }
}

fn list_entities(
    conn: &Connection,
    kind: Option<&str>,
    driver: Option<&str>,
    view: View,
) -> Result<Vec<EntityRecord>, StoreError> {
    let mut sql = format!("SELECT {ENTITY_COLS} FROM entities WHERE 1 = 1");
    let mut sql_params: Vec<SqlValue> = Vec::new();
    if let Some(kind) = kind {
        sql.push_str(" AND kind = ?");
        sql_params.push(SqlValue::Text(kind.to_string()));
    }
    if let Some(driver) = driver {
        sql.push_str(" AND driver = ?");
        sql_params.push(SqlValue::Text(driver.to_string()));
    }
    push_view(view, &mut sql, &mut sql_params);
    sql.push_str(" ORDER BY name");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(sql_params), read_entity)?;
    let mut result = Vec::new();
    for row in rows {
        result.push(row?);
    }
    Ok(result)
}

const ATTR_COLS: &str = "entity_id, key, subkey, number, datatype, \
     int_value, text_value, datetime_value, relation_id, version, deleted_at_version";

struct RawAttr {
    entity_id: i64,
    key: String,
    subkey: Option<String>,
    number: Option<i64>,
    datatype: String,
    int_value: Option<i64>,
    text_value: Option<String>,
    datetime_value: Option<i64>,
    relation_id: Option<i64>,
    version: i64,
    deleted_at_version: Option<i64>,
}

fn read_raw_attr(row: &rusqlite::Row) -> rusqlite::Result<RawAttr> {
    Ok(RawAttr {
        entity_id: row.get(0)?,
        key: row.get(1)?,
        subkey: row.get(2)?,
        number: row.get(3)?,
        datatype: row.get(4)?,
        int_value: row.get(5)?,
        text_value: row.get(6)?,
        datetime_value: row.get(7)?,
        relation_id: row.get(8)?,
        version: row.get(9)?,
        deleted_at_version: row.get(10)?,
    })
}

fn decode_attr(raw: RawAttr) -> Result<Attribute, StoreError> {
    let value = match raw.datatype.as_str() {
        "int" => raw.int_value.map(AttrValue::Int),
        "text" => raw.text_value.map(AttrValue::Text),
        "datetime" => raw.datetime_value.map(AttrValue::DateTime),
        "relation" => raw
            .relation_id
            .map(|id| AttrValue::Relation(EntityId::from_raw(id))),
        _ => None,
    }
    .ok_or_else(|| {
        StoreError::Corrupt(format!(
            "attribute {}/{} has datatype {:?} but no matching value column",
            raw.entity_id, raw.key, raw.datatype
        ))
    })?;
    Ok(Attribute {
        entity_id: EntityId::from_raw(raw.entity_id),
        key: raw.key,
        subkey: raw.subkey,
        number: raw.number,
        value,
        version: Version::from_raw(raw.version as u64),
        deleted_at_version: raw
            .deleted_at_version
            .map(|v| Version::from_raw(v as u64)),
    })
}

fn query_attrs(
    conn: &Connection,
    sql: &str,
    sql_params: Vec<SqlValue>,
) -> Result<Vec<Attribute>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(sql_params), read_raw_attr)?;
    let mut result = Vec::new();
    for row in rows {
        result.push(decode_attr(row?)?);
    }
    Ok(result)
}

fn attrs(
    conn: &Connection,
    entity_id: EntityId,
    filter: &AttrFilter,
    view: View,
) -> Result<Vec<Attribute>, StoreError> {
    let mut sql = format!("SELECT {ATTR_COLS} FROM attributes WHERE entity_id = ?");
    let mut sql_params: Vec<SqlValue> = vec![SqlValue::Integer(entity_id.as_i64())];
    push_filter(filter, &mut sql, &mut sql_params);
    push_view(view, &mut sql, &mut sql_params);
    sql.push_str(" ORDER BY key, number, attr_id");
    query_attrs(conn, &sql, sql_params)
}

fn referencers(
    conn: &Connection,
    target: EntityId,
    filter: &AttrFilter,
    view: View,
) -> Result<Vec<Attribute>, StoreError> {
    let mut sql = format!("SELECT {ATTR_COLS} FROM attributes WHERE relation_id = ?");
    let mut sql_params: Vec<SqlValue> = vec![SqlValue::Integer(target.as_i64())];
    push_filter(filter, &mut sql, &mut sql_params);
    push_view(view, &mut sql, &mut sql_params);
    sql.push_str(" ORDER BY entity_id, attr_id");
    query_attrs(conn, &sql, sql_params)
}

fn claims(
    conn: &Connection,
    key: &str,
    value: &AttrValue,
    view: View,
) -> Result<Vec<Attribute>, StoreError> {
    let mut sql = format!("SELECT {ATTR_COLS} FROM attributes WHERE is_claim > 0 AND key = ?");
    let mut sql_params: Vec<SqlValue> = vec![SqlValue::Text(key.to_string())];
    push_value_predicate(value, &mut sql, &mut sql_params);
    push_view(view, &mut sql, &mut sql_params);
    sql.push_str(" ORDER BY entity_id, attr_id");
    query_attrs(conn, &sql, sql_params)
}

fn claims_for_key(conn: &Connection, key: &str, view: View) -> Result<Vec<Attribute>, StoreError> {
    let mut sql = format!("SELECT {ATTR_COLS} FROM attributes WHERE is_claim > 0 AND key = ?");
    let mut sql_params: Vec<SqlValue> = vec![SqlValue::Text(key.to_string())];
    push_view(view, &mut sql, &mut sql_params);
    sql.push_str(" ORDER BY entity_id, attr_id");
    query_attrs(conn, &sql, sql_params)
}
