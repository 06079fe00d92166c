use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::schema::SCHEMA;
use super::{AuditLogFilter, Store};
use crate::error::{Error, Result};
use crate::types::*;

const COLLECTION_COLUMNS: &str = "id, user_id, name, deleted_at, created_at, updated_at";

const MEMBER_COLUMNS: &str = "id, collection_id, user_id, role, created_at, updated_at";

const SAMPLE_COLUMNS: &str = "id, user_id, title, material_type, deleted_at, created_at, updated_at";

const LINK_SELECT: &str = "SELECT cs.collection_id, cs.sample_id, cs.position, cs.added_at,
            s.id, s.user_id, s.title, s.material_type, s.deleted_at
     FROM collection_samples cs
     JOIN samples s ON s.id = cs.sample_id";

const INVITE_COLUMNS: &str = "id, collection_id, inviter_id, invitee_user_id, invitee_email, \
     invitee_username, role, token, status, expires_at, created_at, updated_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

/// Fixed-width so that timestamps order correctly as strings in SQL.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn opt_datetime(value: Option<String>) -> Option<DateTime<Utc>> {
    value.map(|s| parse_datetime(&s))
}

fn invalid_column(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, message.into())
}

fn role_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<CollectionRole> {
    let value: String = row.get(idx)?;
    CollectionRole::parse(&value).ok_or_else(|| invalid_column(idx, format!("unknown role '{value}'")))
}

fn status_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<InviteStatus> {
    let value: String = row.get(idx)?;
    InviteStatus::parse(&value)
        .ok_or_else(|| invalid_column(idx, format!("unknown invite status '{value}'")))
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        is_admin: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        updated_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn row_to_token(row: &Row<'_>) -> rusqlite::Result<Token> {
    Ok(Token {
        id: row.get(0)?,
        token_hash: row.get(1)?,
        token_lookup: row.get(2)?,
        user_id: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        expires_at: opt_datetime(row.get(5)?),
        last_used_at: opt_datetime(row.get(6)?),
    })
}

fn row_to_collection(row: &Row<'_>) -> rusqlite::Result<Collection> {
    Ok(Collection {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        lifecycle: Lifecycle::from(opt_datetime(row.get(3)?)),
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        updated_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn row_to_member(row: &Row<'_>) -> rusqlite::Result<CollectionMember> {
    Ok(CollectionMember {
        id: row.get(0)?,
        collection_id: row.get(1)?,
        user_id: row.get(2)?,
        role: role_column(row, 3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        updated_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn row_to_sample(row: &Row<'_>) -> rusqlite::Result<Sample> {
    Ok(Sample {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        material_type: row.get(3)?,
        lifecycle: Lifecycle::from(opt_datetime(row.get(4)?)),
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        updated_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

fn row_to_link(row: &Row<'_>) -> rusqlite::Result<CollectionSample> {
    Ok(CollectionSample {
        collection_id: row.get(0)?,
        sample_id: row.get(1)?,
        position: row.get(2)?,
        added_at: parse_datetime(&row.get::<_, String>(3)?),
        sample: SampleSummary {
            id: row.get(4)?,
            user_id: row.get(5)?,
            title: row.get(6)?,
            material_type: row.get(7)?,
            is_deleted: row.get::<_, Option<String>>(8)?.is_some(),
        },
    })
}

fn row_to_invite(row: &Row<'_>) -> rusqlite::Result<Invite> {
    Ok(Invite {
        id: row.get(0)?,
        collection_id: row.get(1)?,
        inviter_id: row.get(2)?,
        invitee_user_id: row.get(3)?,
        invitee_email: row.get(4)?,
        invitee_username: row.get(5)?,
        role: role_column(row, 6)?,
        token: row.get(7)?,
        status: status_column(row, 8)?,
        expires_at: parse_datetime(&row.get::<_, String>(9)?),
        created_at: parse_datetime(&row.get::<_, String>(10)?),
        updated_at: parse_datetime(&row.get::<_, String>(11)?),
    })
}

fn row_to_audit_log(row: &Row<'_>) -> rusqlite::Result<AuditLogEntry> {
    let action: String = row.get(2)?;
    let metadata = match row.get::<_, Option<String>>(6)? {
        Some(raw) => Some(
            serde_json::from_str(&raw)
                .map_err(|e| invalid_column(6, format!("invalid audit metadata: {e}")))?,
        ),
        None => None,
    };

    Ok(AuditLogEntry {
        id: row.get(0)?,
        actor_id: row.get(1)?,
        action: AuditAction::parse(&action)
            .ok_or_else(|| invalid_column(2, format!("unknown audit action '{action}'")))?,
        collection_id: row.get(3)?,
        target_user_id: row.get(4)?,
        invite_id: row.get(5)?,
        metadata,
        created_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

fn query_membership(
    conn: &Connection,
    collection_id: &str,
    user_id: &str,
) -> Result<Option<CollectionMember>> {
    conn.query_row(
        &format!(
            "SELECT {MEMBER_COLUMNS} FROM collection_members
             WHERE collection_id = ?1 AND user_id = ?2"
        ),
        params![collection_id, user_id],
        row_to_member,
    )
    .optional()
    .map_err(Error::from)
}

fn ensure_membership_in(conn: &Connection, member: &CollectionMember) -> Result<CollectionMember> {
    conn.execute(
        &format!(
            "INSERT INTO collection_members ({MEMBER_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (collection_id, user_id) DO NOTHING"
        ),
        params![
            member.id,
            member.collection_id,
            member.user_id,
            member.role.as_str(),
            format_datetime(&member.created_at),
            format_datetime(&member.updated_at),
        ],
    )?;

    query_membership(conn, &member.collection_id, &member.user_id)?
        .ok_or(Error::NotFound("Membership"))
}

fn query_link(
    conn: &Connection,
    collection_id: &str,
    sample_id: &str,
) -> Result<Option<CollectionSample>> {
    conn.query_row(
        &format!("{LINK_SELECT} WHERE cs.collection_id = ?1 AND cs.sample_id = ?2"),
        params![collection_id, sample_id],
        row_to_link,
    )
    .optional()
    .map_err(Error::from)
}

fn linked_sample_ids(conn: &Connection, collection_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT sample_id FROM collection_samples WHERE collection_id = ?1 ORDER BY position",
    )?;

    let rows = stmt.query_map(params![collection_id], |row| row.get(0))?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

/// Assigns positions 1..N. Positions are flipped negative first so the
/// per-collection unique index never sees two links at the same position.
fn write_positions_in(conn: &Connection, collection_id: &str, ordered: &[String]) -> Result<()> {
    conn.execute(
        "UPDATE collection_samples SET position = -position WHERE collection_id = ?1",
        params![collection_id],
    )?;

    let mut stmt = conn.prepare(
        "UPDATE collection_samples SET position = ?1 WHERE collection_id = ?2 AND sample_id = ?3",
    )?;
    for (index, sample_id) in ordered.iter().enumerate() {
        stmt.execute(params![index as i64 + 1, collection_id, sample_id])?;
    }
    Ok(())
}

fn query_invite(conn: &Connection, id: &str) -> Result<Option<Invite>> {
    conn.query_row(
        &format!("SELECT {INVITE_COLUMNS} FROM invites WHERE id = ?1"),
        params![id],
        row_to_invite,
    )
    .optional()
    .map_err(Error::from)
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO users (id, email, name, is_admin, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.id,
                user.email,
                user.name,
                user.is_admin,
                format_datetime(&user.created_at),
                format_datetime(&user.updated_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(Error::conflict("User already exists")),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, email, name, is_admin, created_at, updated_at FROM users WHERE id = ?1",
            params![id],
            row_to_user,
        )
        .optional()
        .map_err(Error::from)
    }

    fn has_admin_user(&self) -> Result<bool> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE is_admin = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // Token operations

    fn create_token(&self, token: &Token) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO tokens (id, token_hash, token_lookup, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                token.id,
                token.token_hash,
                token.token_lookup,
                token.user_id,
                format_datetime(&token.created_at),
                token.expires_at.as_ref().map(format_datetime),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(Error::TokenCollision),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, token_hash, token_lookup, user_id, created_at, expires_at, last_used_at
             FROM tokens WHERE token_lookup = ?1",
            params![lookup],
            row_to_token,
        )
        .optional()
        .map_err(Error::from)
    }

    fn update_token_last_used(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE tokens SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(())
    }

    // Collection operations

    fn create_collection_with_owner(
        &self,
        collection: &Collection,
        owner: &CollectionMember,
    ) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            &format!(
                "INSERT INTO collections ({COLLECTION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
            ),
            params![
                collection.id,
                collection.user_id,
                collection.name,
                collection.lifecycle.deleted_at().as_ref().map(format_datetime),
                format_datetime(&collection.created_at),
                format_datetime(&collection.updated_at),
            ],
        )?;

        tx.execute(
            &format!("INSERT INTO collection_members ({MEMBER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
            params![
                owner.id,
                owner.collection_id,
                owner.user_id,
                owner.role.as_str(),
                format_datetime(&owner.created_at),
                format_datetime(&owner.updated_at),
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn get_collection(&self, id: &str) -> Result<Option<Collection>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {COLLECTION_COLUMNS} FROM collections WHERE id = ?1"),
            params![id],
            row_to_collection,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_member_collections(&self, user_id: &str) -> Result<Vec<Collection>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT c.id, c.user_id, c.name, c.deleted_at, c.created_at, c.updated_at
             FROM collections c
             JOIN collection_members m ON m.collection_id = c.id
             WHERE m.user_id = ?1 AND c.deleted_at IS NULL
             ORDER BY c.updated_at DESC",
        )?;

        let rows = stmt.query_map(params![user_id], row_to_collection)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_collection(&self, collection: &Collection) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE collections SET name = ?1, updated_at = ?2 WHERE id = ?3 AND deleted_at IS NULL",
            params![
                collection.name,
                format_datetime(&collection.updated_at),
                collection.id
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound("Collection"));
        }
        Ok(())
    }

    fn soft_delete_collection(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE collections SET deleted_at = ?1, updated_at = ?1
             WHERE id = ?2 AND deleted_at IS NULL",
            params![format_datetime(&at), id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound("Collection"));
        }
        Ok(())
    }

    // Membership operations

    fn get_membership(
        &self,
        collection_id: &str,
        user_id: &str,
    ) -> Result<Option<CollectionMember>> {
        query_membership(&self.conn(), collection_id, user_id)
    }

    fn get_membership_by_id(&self, id: &str) -> Result<Option<CollectionMember>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {MEMBER_COLUMNS} FROM collection_members WHERE id = ?1"),
            params![id],
            row_to_member,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_members(&self, collection_id: &str) -> Result<Vec<MemberWithUser>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT m.id, m.collection_id, m.user_id, m.role, m.created_at, m.updated_at,
                    u.email, u.name
             FROM collection_members m
             JOIN users u ON u.id = m.user_id
             WHERE m.collection_id = ?1
             ORDER BY CASE m.role WHEN 'OWNER' THEN 0 ELSE 1 END, m.created_at, m.id",
        )?;

        let rows = stmt.query_map(params![collection_id], |row| {
            let member = row_to_member(row)?;
            Ok(MemberWithUser {
                user: UserSummary {
                    id: member.user_id.clone(),
                    email: row.get(6)?,
                    name: row.get(7)?,
                },
                member,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn create_membership(&self, member: &CollectionMember) -> Result<()> {
        let result = self.conn().execute(
            &format!("INSERT INTO collection_members ({MEMBER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
            params![
                member.id,
                member.collection_id,
                member.user_id,
                member.role.as_str(),
                format_datetime(&member.created_at),
                format_datetime(&member.updated_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(Error::conflict("User is already a member of this collection"))
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn ensure_membership(&self, member: &CollectionMember) -> Result<CollectionMember> {
        ensure_membership_in(&self.conn(), member)
    }

    fn update_membership_role(&self, id: &str, role: CollectionRole) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE collection_members SET role = ?1, updated_at = ?2 WHERE id = ?3",
            params![role.as_str(), format_datetime(&Utc::now()), id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound("Membership"));
        }
        Ok(())
    }

    fn delete_membership(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM collection_members WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Sample operations

    fn create_sample(&self, sample: &Sample) -> Result<()> {
        self.conn().execute(
            &format!("INSERT INTO samples ({SAMPLE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![
                sample.id,
                sample.user_id,
                sample.title,
                sample.material_type,
                sample.lifecycle.deleted_at().as_ref().map(format_datetime),
                format_datetime(&sample.created_at),
                format_datetime(&sample.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_sample(&self, id: &str) -> Result<Option<Sample>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {SAMPLE_COLUMNS} FROM samples WHERE id = ?1"),
            params![id],
            row_to_sample,
        )
        .optional()
        .map_err(Error::from)
    }

    fn soft_delete_sample(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE samples SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
            params![format_datetime(&at), id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound("Sample"));
        }
        Ok(())
    }

    // Collection-sample link operations

    fn get_collection_sample(
        &self,
        collection_id: &str,
        sample_id: &str,
    ) -> Result<Option<CollectionSample>> {
        query_link(&self.conn(), collection_id, sample_id)
    }

    fn list_collection_samples(&self, collection_id: &str) -> Result<Vec<CollectionSample>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare(&format!("{LINK_SELECT} WHERE cs.collection_id = ?1 ORDER BY cs.position"))?;

        let rows = stmt.query_map(params![collection_id], row_to_link)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn add_collection_sample(
        &self,
        collection_id: &str,
        sample_id: &str,
        added_at: DateTime<Utc>,
    ) -> Result<CollectionSample> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let position: i64 = tx.query_row(
            "SELECT COALESCE(MAX(position), 0) + 1 FROM collection_samples WHERE collection_id = ?1",
            params![collection_id],
            |row| row.get(0),
        )?;

        let result = tx.execute(
            "INSERT INTO collection_samples (collection_id, sample_id, position, added_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![collection_id, sample_id, position, format_datetime(&added_at)],
        );

        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(Error::conflict("Sample already exists in collection"));
            }
            Err(e) => return Err(Error::from(e)),
        }

        let link = query_link(&tx, collection_id, sample_id)?.ok_or(Error::NotFound("Sample"))?;
        tx.commit()?;
        Ok(link)
    }

    fn remove_collection_sample(&self, collection_id: &str, sample_id: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let rows = tx.execute(
            "DELETE FROM collection_samples WHERE collection_id = ?1 AND sample_id = ?2",
            params![collection_id, sample_id],
        )?;
        if rows == 0 {
            return Ok(false);
        }

        let remaining = linked_sample_ids(&tx, collection_id)?;
        write_positions_in(&tx, collection_id, &remaining)?;

        tx.commit()?;
        Ok(true)
    }

    fn write_sample_positions(&self, collection_id: &str, ordered: &[String]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let current: HashSet<String> = linked_sample_ids(&tx, collection_id)?.into_iter().collect();
        let requested: HashSet<&String> = ordered.iter().collect();
        if current.len() != ordered.len()
            || requested.len() != ordered.len()
            || !ordered.iter().all(|id| current.contains(id))
        {
            return Err(Error::conflict("Collection samples changed during reorder"));
        }

        write_positions_in(&tx, collection_id, ordered)?;

        tx.commit()?;
        Ok(())
    }

    fn is_member_of_sample_collection(
        &self,
        user_id: &str,
        sample_id: &str,
        collection_id: Option<&str>,
    ) -> Result<bool> {
        let conn = self.conn();
        let exists: bool = conn.query_row(
            "SELECT EXISTS (
                SELECT 1 FROM collection_samples cs
                JOIN collection_members m ON m.collection_id = cs.collection_id
                JOIN collections c ON c.id = cs.collection_id
                WHERE cs.sample_id = ?1
                  AND m.user_id = ?2
                  AND c.deleted_at IS NULL
                  AND (?3 IS NULL OR cs.collection_id = ?3)
             )",
            params![sample_id, user_id, collection_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    // Invite operations

    fn create_invite(&self, invite: &Invite) -> Result<()> {
        let result = self.conn().execute(
            &format!(
                "INSERT INTO invites ({INVITE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                invite.id,
                invite.collection_id,
                invite.inviter_id,
                invite.invitee_user_id,
                invite.invitee_email,
                invite.invitee_username,
                invite.role.as_str(),
                invite.token,
                invite.status.as_str(),
                format_datetime(&invite.expires_at),
                format_datetime(&invite.created_at),
                format_datetime(&invite.updated_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(Error::TokenCollision),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_invite(&self, id: &str) -> Result<Option<Invite>> {
        query_invite(&self.conn(), id)
    }

    fn get_invite_by_token(&self, token: &str) -> Result<Option<Invite>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {INVITE_COLUMNS} FROM invites WHERE token = ?1"),
            params![token],
            row_to_invite,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_invite_details(&self, id: &str) -> Result<Option<InviteDetails>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT i.id, i.collection_id, i.inviter_id, i.invitee_user_id, i.invitee_email,
                    i.invitee_username, i.role, i.token, i.status, i.expires_at, i.created_at,
                    i.updated_at,
                    c.name,
                    inviter.email, inviter.name,
                    invitee.id, invitee.email, invitee.name
             FROM invites i
             JOIN collections c ON c.id = i.collection_id
             JOIN users inviter ON inviter.id = i.inviter_id
             LEFT JOIN users invitee ON invitee.id = i.invitee_user_id
             WHERE i.id = ?1",
            params![id],
            |row| {
                let invite = row_to_invite(row)?;
                let invitee = match row.get::<_, Option<String>>(15)? {
                    Some(invitee_id) => Some(UserSummary {
                        id: invitee_id,
                        email: row.get(16)?,
                        name: row.get(17)?,
                    }),
                    None => None,
                };
                Ok(InviteDetails {
                    collection: CollectionSummary {
                        id: invite.collection_id.clone(),
                        name: row.get(12)?,
                    },
                    inviter: UserSummary {
                        id: invite.inviter_id.clone(),
                        email: row.get(13)?,
                        name: row.get(14)?,
                    },
                    invitee,
                    invite,
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn count_recent_invites_by_inviter(
        &self,
        inviter_id: &str,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM invites WHERE inviter_id = ?1 AND created_at >= ?2",
            params![inviter_id, format_datetime(&since)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn transition_invite(
        &self,
        id: &str,
        to: InviteStatus,
        binding: Option<&InviteeBinding>,
        at: DateTime<Utc>,
    ) -> Result<Option<Invite>> {
        let conn = self.conn();
        let rows = conn.execute(
            "UPDATE invites SET
                status = ?1,
                invitee_user_id = COALESCE(invitee_user_id, ?2),
                invitee_email = COALESCE(invitee_email, ?3),
                invitee_username = COALESCE(invitee_username, ?4),
                updated_at = ?5
             WHERE id = ?6 AND status = 'PENDING'
               AND (?1 = 'EXPIRED' OR expires_at >= ?5)",
            params![
                to.as_str(),
                binding.map(|b| b.user_id.as_str()),
                binding.and_then(|b| b.email.as_deref()),
                binding.and_then(|b| b.username.as_deref()),
                format_datetime(&at),
                id,
            ],
        )?;

        if rows == 0 {
            return Ok(None);
        }
        query_invite(&conn, id)
    }

    fn accept_invite(
        &self,
        id: &str,
        binding: &InviteeBinding,
        member: &CollectionMember,
        now: DateTime<Utc>,
    ) -> Result<Option<Invite>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let rows = tx.execute(
            "UPDATE invites SET
                status = 'ACCEPTED',
                invitee_user_id = COALESCE(invitee_user_id, ?1),
                invitee_email = COALESCE(invitee_email, ?2),
                invitee_username = COALESCE(invitee_username, ?3),
                updated_at = ?4
             WHERE id = ?5 AND status = 'PENDING' AND expires_at >= ?4",
            params![
                binding.user_id,
                binding.email,
                binding.username,
                format_datetime(&now),
                id,
            ],
        )?;

        if rows == 0 {
            return Ok(None);
        }

        ensure_membership_in(&tx, member)?;
        let invite = query_invite(&tx, id)?;

        tx.commit()?;
        Ok(invite)
    }

    fn expire_pending_invites(&self, now: DateTime<Utc>) -> Result<Vec<Invite>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now_str = format_datetime(&now);

        let mut expired = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {INVITE_COLUMNS} FROM invites
                 WHERE status = 'PENDING' AND expires_at < ?1
                 ORDER BY expires_at"
            ))?;
            let rows = stmt.query_map(params![now_str], row_to_invite)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        if expired.is_empty() {
            return Ok(expired);
        }

        tx.execute(
            "UPDATE invites SET status = 'EXPIRED', updated_at = ?1
             WHERE status = 'PENDING' AND expires_at < ?1",
            params![now_str],
        )?;
        tx.commit()?;

        for invite in &mut expired {
            invite.status = InviteStatus::Expired;
            invite.updated_at = now;
        }
        Ok(expired)
    }

    // Audit operations

    fn append_audit_log(&self, entry: &AuditLogEntry) -> Result<()> {
        let metadata = entry
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| Error::Internal(format!("failed to encode audit metadata: {e}")))?;

        self.conn().execute(
            "INSERT INTO audit_logs
                (id, actor_id, action, collection_id, target_user_id, invite_id, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.id,
                entry.actor_id,
                entry.action.as_str(),
                entry.collection_id,
                entry.target_user_id,
                entry.invite_id,
                metadata,
                format_datetime(&entry.created_at),
            ],
        )?;
        Ok(())
    }

    fn list_audit_logs(&self, filter: &AuditLogFilter) -> Result<Vec<AuditLogEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, actor_id, action, collection_id, target_user_id, invite_id, metadata, created_at
             FROM audit_logs
             WHERE (?1 IS NULL OR collection_id = ?1) AND (?2 IS NULL OR invite_id = ?2)
             ORDER BY created_at, rowid",
        )?;

        let rows = stmt.query_map(
            params![filter.collection_id, filter.invite_id],
            row_to_audit_log,
        )?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn setup() -> (TempDir, SqliteStore) {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        (temp, store)
    }

    fn user(store: &SqliteStore, id: &str) {
        store
            .create_user(&User {
                id: id.to_string(),
                email: Some(format!("{id}@example.com")),
                name: Some(id.to_string()),
                is_admin: false,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .unwrap();
    }

    fn member(id: &str, collection_id: &str, user_id: &str, role: CollectionRole) -> CollectionMember {
        CollectionMember {
            id: id.to_string(),
            collection_id: collection_id.to_string(),
            user_id: user_id.to_string(),
            role,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn collection(store: &SqliteStore, id: &str, owner: &str) {
        let now = Utc::now();
        store
            .create_collection_with_owner(
                &Collection {
                    id: id.to_string(),
                    user_id: owner.to_string(),
                    name: format!("{id} name"),
                    lifecycle: Lifecycle::Active,
                    created_at: now,
                    updated_at: now,
                },
                &member(&format!("{id}-owner"), id, owner, CollectionRole::Owner),
            )
            .unwrap();
    }

    fn sample(store: &SqliteStore, id: &str, owner: &str) {
        let now = Utc::now();
        store
            .create_sample(&Sample {
                id: id.to_string(),
                user_id: owner.to_string(),
                title: format!("{id} title"),
                material_type: "tile".to_string(),
                lifecycle: Lifecycle::Active,
                created_at: now,
                updated_at: now,
            })
            .unwrap();
    }

    fn invite(id: &str, collection_id: &str, inviter: &str, token: &str) -> Invite {
        let now = Utc::now();
        Invite {
            id: id.to_string(),
            collection_id: collection_id.to_string(),
            inviter_id: inviter.to_string(),
            invitee_user_id: None,
            invitee_email: None,
            invitee_username: None,
            role: CollectionRole::ViewOnly,
            token: token.to_string(),
            status: InviteStatus::Pending,
            expires_at: now + Duration::days(7),
            created_at: now,
            updated_at: now,
        }
    }

    fn positions(store: &SqliteStore, collection_id: &str) -> Vec<(String, i64)> {
        store
            .list_collection_samples(collection_id)
            .unwrap()
            .into_iter()
            .map(|link| (link.sample_id, link.position))
            .collect()
    }

    #[test]
    fn test_initialize_creates_tables() {
        let (_temp, store) = setup();

        let conn = store.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "users",
            "tokens",
            "collections",
            "collection_members",
            "samples",
            "collection_samples",
            "invites",
            "audit_logs",
        ] {
            assert!(tables.contains(&table.to_string()), "missing table {table}");
        }
    }

    #[test]
    fn test_collection_and_owner_commit_together() {
        let (_temp, store) = setup();
        user(&store, "alice");

        collection(&store, "col-1", "alice");
        let owner = store.get_membership("col-1", "alice").unwrap().unwrap();
        assert_eq!(owner.role, CollectionRole::Owner);

        // Owner row references a missing user, so the whole unit must roll back.
        let now = Utc::now();
        let result = store.create_collection_with_owner(
            &Collection {
                id: "col-2".to_string(),
                user_id: "alice".to_string(),
                name: "Broken".to_string(),
                lifecycle: Lifecycle::Active,
                created_at: now,
                updated_at: now,
            },
            &member("col-2-owner", "col-2", "ghost", CollectionRole::Owner),
        );
        assert!(result.is_err());
        assert!(store.get_collection("col-2").unwrap().is_none());
    }

    #[test]
    fn test_soft_delete_collection() {
        let (_temp, store) = setup();
        user(&store, "alice");
        collection(&store, "col-1", "alice");

        store.soft_delete_collection("col-1", Utc::now()).unwrap();

        let fetched = store.get_collection("col-1").unwrap().unwrap();
        assert!(!fetched.lifecycle.is_active());
        assert!(store.list_member_collections("alice").unwrap().is_empty());

        let again = store.soft_delete_collection("col-1", Utc::now());
        assert!(matches!(again, Err(Error::NotFound("Collection"))));
    }

    #[test]
    fn test_membership_uniqueness() {
        let (_temp, store) = setup();
        user(&store, "alice");
        user(&store, "bob");
        collection(&store, "col-1", "alice");

        store
            .create_membership(&member("m-1", "col-1", "bob", CollectionRole::Editor))
            .unwrap();
        let duplicate =
            store.create_membership(&member("m-2", "col-1", "bob", CollectionRole::ViewOnly));
        assert!(matches!(duplicate, Err(Error::Conflict(_))));

        let ensured = store
            .ensure_membership(&member("m-3", "col-1", "bob", CollectionRole::ViewOnly))
            .unwrap();
        assert_eq!(ensured.id, "m-1");
        assert_eq!(ensured.role, CollectionRole::Editor);
    }

    #[test]
    fn test_list_members_owner_first() {
        let (_temp, store) = setup();
        user(&store, "alice");
        user(&store, "bob");
        collection(&store, "col-1", "alice");
        store
            .create_membership(&member("m-1", "col-1", "bob", CollectionRole::ViewOnly))
            .unwrap();

        let members = store.list_members("col-1").unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].member.role, CollectionRole::Owner);
        assert_eq!(members[1].user.email.as_deref(), Some("bob@example.com"));
    }

    #[test]
    fn test_sample_positions_stay_contiguous() {
        let (_temp, store) = setup();
        user(&store, "alice");
        collection(&store, "col-1", "alice");
        for id in ["s1", "s2", "s3", "s4"] {
            sample(&store, id, "alice");
            store.add_collection_sample("col-1", id, Utc::now()).unwrap();
        }

        assert!(store.remove_collection_sample("col-1", "s2").unwrap());
        assert_eq!(
            positions(&store, "col-1"),
            vec![
                ("s1".to_string(), 1),
                ("s3".to_string(), 2),
                ("s4".to_string(), 3)
            ]
        );

        assert!(!store.remove_collection_sample("col-1", "s2").unwrap());

        sample(&store, "s5", "alice");
        let link = store.add_collection_sample("col-1", "s5", Utc::now()).unwrap();
        assert_eq!(link.position, 4);
    }

    #[test]
    fn test_duplicate_link_conflicts() {
        let (_temp, store) = setup();
        user(&store, "alice");
        collection(&store, "col-1", "alice");
        sample(&store, "s1", "alice");

        store.add_collection_sample("col-1", "s1", Utc::now()).unwrap();
        let again = store.add_collection_sample("col-1", "s1", Utc::now());
        assert!(matches!(again, Err(Error::Conflict(_))));
    }

    #[test]
    fn test_write_sample_positions_rejects_stale_set() {
        let (_temp, store) = setup();
        user(&store, "alice");
        collection(&store, "col-1", "alice");
        for id in ["s1", "s2"] {
            sample(&store, id, "alice");
            store.add_collection_sample("col-1", id, Utc::now()).unwrap();
        }

        let stale = store.write_sample_positions("col-1", &["s2".to_string()]);
        assert!(matches!(stale, Err(Error::Conflict(_))));

        store
            .write_sample_positions("col-1", &["s2".to_string(), "s1".to_string()])
            .unwrap();
        assert_eq!(
            positions(&store, "col-1"),
            vec![("s2".to_string(), 1), ("s1".to_string(), 2)]
        );
    }

    #[test]
    fn test_is_member_of_sample_collection() {
        let (_temp, store) = setup();
        user(&store, "alice");
        user(&store, "bob");
        collection(&store, "col-1", "alice");
        collection(&store, "col-2", "bob");
        sample(&store, "s1", "alice");
        store.add_collection_sample("col-1", "s1", Utc::now()).unwrap();
        store
            .create_membership(&member("m-1", "col-1", "bob", CollectionRole::ViewOnly))
            .unwrap();

        assert!(store.is_member_of_sample_collection("bob", "s1", None).unwrap());
        assert!(
            store
                .is_member_of_sample_collection("bob", "s1", Some("col-1"))
                .unwrap()
        );
        assert!(
            !store
                .is_member_of_sample_collection("bob", "s1", Some("col-2"))
                .unwrap()
        );
    }

    #[test]
    fn test_invite_token_collision() {
        let (_temp, store) = setup();
        user(&store, "alice");
        collection(&store, "col-1", "alice");

        store.create_invite(&invite("inv-1", "col-1", "alice", "inv_same")).unwrap();
        let result = store.create_invite(&invite("inv-2", "col-1", "alice", "inv_same"));
        assert!(matches!(result, Err(Error::TokenCollision)));
    }

    #[test]
    fn test_transition_only_from_pending() {
        let (_temp, store) = setup();
        user(&store, "alice");
        user(&store, "bob");
        collection(&store, "col-1", "alice");
        store.create_invite(&invite("inv-1", "col-1", "alice", "inv_a")).unwrap();

        let binding = InviteeBinding {
            user_id: "bob".to_string(),
            email: None,
            username: None,
        };
        let rejected = store
            .transition_invite("inv-1", InviteStatus::Rejected, Some(&binding), Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(rejected.status, InviteStatus::Rejected);
        assert_eq!(rejected.invitee_user_id.as_deref(), Some("bob"));

        let expired = store
            .transition_invite("inv-1", InviteStatus::Expired, None, Utc::now())
            .unwrap();
        assert!(expired.is_none());
    }

    #[test]
    fn test_reject_refused_past_deadline() {
        let (_temp, store) = setup();
        user(&store, "alice");
        user(&store, "bob");
        collection(&store, "col-1", "alice");
        let mut overdue = invite("inv-1", "col-1", "alice", "inv_a");
        overdue.expires_at = Utc::now() - Duration::seconds(1);
        store.create_invite(&overdue).unwrap();

        let binding = InviteeBinding {
            user_id: "bob".to_string(),
            email: None,
            username: None,
        };
        let rejected = store
            .transition_invite("inv-1", InviteStatus::Rejected, Some(&binding), Utc::now())
            .unwrap();
        assert!(rejected.is_none());

        let expired = store
            .transition_invite("inv-1", InviteStatus::Expired, None, Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(expired.status, InviteStatus::Expired);
        assert_eq!(expired.invitee_user_id, None);
    }

    #[test]
    fn test_accept_invite_materializes_membership_once() {
        let (_temp, store) = setup();
        user(&store, "alice");
        user(&store, "bob");
        collection(&store, "col-1", "alice");
        store.create_invite(&invite("inv-1", "col-1", "alice", "inv_a")).unwrap();

        let binding = InviteeBinding {
            user_id: "bob".to_string(),
            email: Some("bob@example.com".to_string()),
            username: Some("Bob".to_string()),
        };
        let new_member = member("m-1", "col-1", "bob", CollectionRole::ViewOnly);

        let accepted = store
            .accept_invite("inv-1", &binding, &new_member, Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(accepted.status, InviteStatus::Accepted);
        assert_eq!(accepted.invitee_email.as_deref(), Some("bob@example.com"));
        assert!(store.get_membership("col-1", "bob").unwrap().is_some());

        let second = store
            .accept_invite("inv-1", &binding, &new_member, Utc::now())
            .unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn test_accept_invite_refuses_past_due() {
        let (_temp, store) = setup();
        user(&store, "alice");
        user(&store, "bob");
        collection(&store, "col-1", "alice");
        let mut stale = invite("inv-1", "col-1", "alice", "inv_a");
        stale.expires_at = Utc::now() - Duration::minutes(1);
        store.create_invite(&stale).unwrap();

        let binding = InviteeBinding {
            user_id: "bob".to_string(),
            ..Default::default()
        };
        let result = store
            .accept_invite(
                "inv-1",
                &binding,
                &member("m-1", "col-1", "bob", CollectionRole::ViewOnly),
                Utc::now(),
            )
            .unwrap();
        assert!(result.is_none());
        assert!(store.get_membership("col-1", "bob").unwrap().is_none());
    }

    #[test]
    fn test_expire_pending_invites() {
        let (_temp, store) = setup();
        user(&store, "alice");
        collection(&store, "col-1", "alice");

        let mut old = invite("inv-old", "col-1", "alice", "inv_old");
        old.expires_at = Utc::now() - Duration::hours(1);
        store.create_invite(&old).unwrap();
        store.create_invite(&invite("inv-new", "col-1", "alice", "inv_new")).unwrap();

        let expired = store.expire_pending_invites(Utc::now()).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, "inv-old");
        assert_eq!(
            store.get_invite("inv-old").unwrap().unwrap().status,
            InviteStatus::Expired
        );
        assert_eq!(
            store.get_invite("inv-new").unwrap().unwrap().status,
            InviteStatus::Pending
        );

        assert!(store.expire_pending_invites(Utc::now()).unwrap().is_empty());
    }

    #[test]
    fn test_audit_log_round_trip_with_filter() {
        let (_temp, store) = setup();

        for (id, invite_id) in [("a-1", "inv-1"), ("a-2", "inv-2")] {
            store
                .append_audit_log(&AuditLogEntry {
                    id: id.to_string(),
                    actor_id: "alice".to_string(),
                    action: AuditAction::InviteCreated,
                    collection_id: Some("col-1".to_string()),
                    target_user_id: None,
                    invite_id: Some(invite_id.to_string()),
                    metadata: Some(serde_json::json!({ "role": "VIEW_ONLY" })),
                    created_at: Utc::now(),
                })
                .unwrap();
        }

        let filtered = store
            .list_audit_logs(&AuditLogFilter {
                invite_id: Some("inv-2".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "a-2");
        assert_eq!(filtered[0].metadata.as_ref().unwrap()["role"], "VIEW_ONLY");

        let all = store.list_audit_logs(&AuditLogFilter::default()).unwrap();
        assert_eq!(all.len(), 2);
    }
}
