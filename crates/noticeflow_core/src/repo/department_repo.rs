//! Department directory repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist the department forest (parent-id column) and contact metadata.
//! - Apply parent changes atomically with their cycle check.
//!
//! # Invariants
//! - Parent validation and the parent write share one `IMMEDIATE`
//!   transaction, so two concurrent moves cannot jointly form a cycle.
//! - Listing is deterministic: `name COLLATE NOCASE ASC, uuid ASC`.
//! - Departments are never deleted; deactivation flips `is_active`.

use crate::model::activity::NewActivity;
use crate::model::department::{
    Department, DepartmentContact, DepartmentId, DepartmentTree, OfficeType, Province,
};
use crate::repo::activity_repo::append_activity;
use crate::repo::{
    bool_to_int, ensure_connection_ready, is_unique_violation, parse_flag, parse_uuid, RepoError,
    RepoResult,
};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

const DEPARTMENT_SELECT_SQL: &str = "SELECT
    uuid,
    name,
    office_type,
    parent_uuid,
    contact_first_name,
    contact_last_name,
    email,
    phone_number,
    fax,
    province,
    district,
    address,
    photo_url,
    is_active,
    created_at,
    updated_at
FROM departments";

/// Repository interface for the department directory.
pub trait DepartmentRepository {
    /// Inserts one department; its parent, if any, must be active.
    fn create_department(&self, department: &Department, activity: &NewActivity) -> RepoResult<()>;
    /// Loads one department by id, active or not.
    fn get_department(&self, id: DepartmentId) -> RepoResult<Option<Department>>;
    /// Lists departments sorted by name.
    fn list_departments(&self, include_inactive: bool) -> RepoResult<Vec<Department>>;
    /// Lists direct children of one department.
    fn list_children(
        &self,
        parent_uuid: DepartmentId,
        include_inactive: bool,
    ) -> RepoResult<Vec<Department>>;
    /// Loads the full forest, inactive nodes included.
    fn load_tree(&self) -> RepoResult<DepartmentTree>;
    /// Re-parents one department after an in-transaction cycle check.
    fn assign_parent(
        &self,
        id: DepartmentId,
        parent_uuid: Option<DepartmentId>,
        now_ms: i64,
        activity: &NewActivity,
    ) -> RepoResult<()>;
    /// Replaces contact metadata.
    fn update_contact(
        &self,
        id: DepartmentId,
        contact: &DepartmentContact,
        now_ms: i64,
        activity: &NewActivity,
    ) -> RepoResult<()>;
    /// Soft-deactivates one department. Returns `false` when already inactive.
    fn deactivate(&self, id: DepartmentId, now_ms: i64, activity: &NewActivity)
        -> RepoResult<bool>;
}

/// SQLite-backed department repository.
pub struct SqliteDepartmentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDepartmentRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(
            conn,
            "departments",
            &[
                "uuid",
                "name",
                "office_type",
                "parent_uuid",
                "is_active",
                "created_at",
                "updated_at",
            ],
        )?;
        Ok(Self { conn })
    }
}

impl DepartmentRepository for SqliteDepartmentRepository<'_> {
    fn create_department(
        &self,
        department: &Department,
        activity: &NewActivity,
    ) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if let Some(parent_uuid) = department.parent_uuid {
            ensure_active_department(&tx, parent_uuid)?;
        }

        let contact = &department.contact;
        let inserted = tx.execute(
            "INSERT INTO departments (
                uuid,
                name,
                office_type,
                parent_uuid,
                contact_first_name,
                contact_last_name,
                email,
                phone_number,
                fax,
                province,
                district,
                address,
                photo_url,
                is_active,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16);",
            params![
                department.uuid.to_string(),
                department.name.as_str(),
                department.office_type.as_str(),
                department.parent_uuid.map(|value| value.to_string()),
                contact.first_name.as_deref(),
                contact.last_name.as_deref(),
                contact.email.as_deref(),
                contact.phone_number.as_deref(),
                contact.fax.as_deref(),
                contact.province.map(Province::as_str),
                contact.district.as_deref(),
                contact.address.as_deref(),
                contact.photo_url.as_deref(),
                bool_to_int(department.is_active),
                department.created_at,
                department.updated_at,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(RepoError::DuplicateDepartmentName(department.name.clone()));
            }
            Err(err) => return Err(err.into()),
        }

        append_activity(&tx, activity)?;
        tx.commit()?;
        Ok(())
    }

    fn get_department(&self, id: DepartmentId) -> RepoResult<Option<Department>> {
        load_department(self.conn, id)
    }

    fn list_departments(&self, include_inactive: bool) -> RepoResult<Vec<Department>> {
        let mut stmt = self.conn.prepare(&format!(
            "{DEPARTMENT_SELECT_SQL}
             WHERE (?1 = 1 OR is_active = 1)
             ORDER BY name COLLATE NOCASE ASC, uuid ASC;"
        ))?;
        let mut rows = stmt.query([bool_to_int(include_inactive)])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_department_row(row)?);
        }
        Ok(items)
    }

    fn list_children(
        &self,
        parent_uuid: DepartmentId,
        include_inactive: bool,
    ) -> RepoResult<Vec<Department>> {
        if load_department(self.conn, parent_uuid)?.is_none() {
            return Err(RepoError::DepartmentNotFound(parent_uuid));
        }
        let mut stmt = self.conn.prepare(&format!(
            "{DEPARTMENT_SELECT_SQL}
             WHERE parent_uuid = ?1
               AND (?2 = 1 OR is_active = 1)
             ORDER BY name COLLATE NOCASE ASC, uuid ASC;"
        ))?;
        let mut rows = stmt.query(params![
            parent_uuid.to_string(),
            bool_to_int(include_inactive)
        ])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_department_row(row)?);
        }
        Ok(items)
    }

    fn load_tree(&self) -> RepoResult<DepartmentTree> {
        load_tree(self.conn)
    }

    fn assign_parent(
        &self,
        id: DepartmentId,
        parent_uuid: Option<DepartmentId>,
        now_ms: i64,
        activity: &NewActivity,
    ) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let tree = load_tree(&tx)?;
        if tree.get(id).is_none() {
            return Err(RepoError::DepartmentNotFound(id));
        }
        if let Some(parent_uuid) = parent_uuid {
            if !tree.get(parent_uuid).is_some_and(|parent| parent.is_active) {
                return Err(RepoError::DepartmentNotFound(parent_uuid));
            }
            if tree.would_create_cycle(id, parent_uuid) {
                return Err(RepoError::Cycle {
                    department_uuid: id,
                    parent_uuid,
                });
            }
        }

        tx.execute(
            "UPDATE departments
             SET parent_uuid = ?2,
                 updated_at = ?3
             WHERE uuid = ?1;",
            params![
                id.to_string(),
                parent_uuid.map(|value| value.to_string()),
                now_ms
            ],
        )?;
        append_activity(&tx, activity)?;
        tx.commit()?;
        Ok(())
    }

    fn update_contact(
        &self,
        id: DepartmentId,
        contact: &DepartmentContact,
        now_ms: i64,
        activity: &NewActivity,
    ) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE departments
             SET contact_first_name = ?2,
                 contact_last_name = ?3,
                 email = ?4,
                 phone_number = ?5,
                 fax = ?6,
                 province = ?7,
                 district = ?8,
                 address = ?9,
                 photo_url = ?10,
                 updated_at = ?11
             WHERE uuid = ?1;",
            params![
                id.to_string(),
                contact.first_name.as_deref(),
                contact.last_name.as_deref(),
                contact.email.as_deref(),
                contact.phone_number.as_deref(),
                contact.fax.as_deref(),
                contact.province.map(Province::as_str),
                contact.district.as_deref(),
                contact.address.as_deref(),
                contact.photo_url.as_deref(),
                now_ms,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::DepartmentNotFound(id));
        }
        append_activity(&tx, activity)?;
        tx.commit()?;
        Ok(())
    }

    fn deactivate(
        &self,
        id: DepartmentId,
        now_ms: i64,
        activity: &NewActivity,
    ) -> RepoResult<bool> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if load_department(&tx, id)?.is_none() {
            return Err(RepoError::DepartmentNotFound(id));
        }
        let changed = tx.execute(
            "UPDATE departments
             SET is_active = 0,
                 updated_at = ?2
             WHERE uuid = ?1
               AND is_active = 1;",
            params![id.to_string(), now_ms],
        )?;
        if changed == 1 {
            append_activity(&tx, activity)?;
        }
        tx.commit()?;
        Ok(changed == 1)
    }
}

fn load_department(conn: &Connection, id: DepartmentId) -> RepoResult<Option<Department>> {
    let mut stmt = conn.prepare(&format!("{DEPARTMENT_SELECT_SQL} WHERE uuid = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_department_row(row)?));
    }
    Ok(None)
}

fn load_tree(conn: &Connection) -> RepoResult<DepartmentTree> {
    let mut stmt = conn.prepare(&format!("{DEPARTMENT_SELECT_SQL};"))?;
    let mut rows = stmt.query([])?;
    let mut departments = Vec::new();
    while let Some(row) = rows.next()? {
        departments.push(parse_department_row(row)?);
    }
    Ok(DepartmentTree::from_departments(departments))
}

fn ensure_active_department(conn: &Connection, id: DepartmentId) -> RepoResult<()> {
    let active: Option<i64> = conn
        .query_row(
            "SELECT is_active FROM departments WHERE uuid = ?1;",
            [id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    match active {
        Some(1) => Ok(()),
        _ => Err(RepoError::DepartmentNotFound(id)),
    }
}

fn parse_department_row(row: &Row<'_>) -> RepoResult<Department> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = parse_uuid(&uuid_text, "departments.uuid")?;
    let parent_uuid = row
        .get::<_, Option<String>>("parent_uuid")?
        .map(|value| parse_uuid(&value, "departments.parent_uuid"))
        .transpose()?;

    let office_type_text: String = row.get("office_type")?;
    let office_type = OfficeType::parse(&office_type_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid office type `{office_type_text}` in departments.office_type"
        ))
    })?;

    let province = match row.get::<_, Option<String>>("province")? {
        Some(value) => Some(Province::parse(&value).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid province `{value}` in departments.province"
            ))
        })?),
        None => None,
    };

    Ok(Department {
        uuid,
        name: row.get("name")?,
        office_type,
        parent_uuid,
        contact: DepartmentContact {
            first_name: row.get("contact_first_name")?,
            last_name: row.get("contact_last_name")?,
            email: row.get("email")?,
            phone_number: row.get("phone_number")?,
            fax: row.get("fax")?,
            province,
            district: row.get("district")?,
            address: row.get("address")?,
            photo_url: row.get("photo_url")?,
        },
        is_active: parse_flag(row.get("is_active")?, "departments.is_active")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
