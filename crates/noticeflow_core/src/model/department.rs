//! Department directory model.
//!
//! # Responsibility
//! - Define department records and their contact metadata.
//! - Provide an id-indexed arena (`DepartmentTree`) for subtree expansion and
//!   cycle checks.
//!
//! # Invariants
//! - The parent relation is a forest: no self-parenting, no cycles.
//! - Departments are deactivated, never removed.

use crate::model::{non_blank, ValidationError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use uuid::Uuid;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));
static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://[^\s/$.?#][^\s]*$").expect("valid url regex"));

/// Stable department identifier.
pub type DepartmentId = Uuid;

/// Office classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfficeType {
    Directorate,
    Province,
    ProvinceDivision,
    Division,
    Other,
}

impl OfficeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Directorate => "directorate",
            Self::Province => "province",
            Self::ProvinceDivision => "province_division",
            Self::Division => "division",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "directorate" => Some(Self::Directorate),
            "province" => Some(Self::Province),
            "province_division" => Some(Self::ProvinceDivision),
            "division" => Some(Self::Division),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Province an office is located in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Province {
    Koshi,
    Madhesh,
    Bagmati,
    Gandaki,
    Lumbini,
    Karnali,
    Sudurpashchim,
}

impl Province {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Koshi => "koshi",
            Self::Madhesh => "madhesh",
            Self::Bagmati => "bagmati",
            Self::Gandaki => "gandaki",
            Self::Lumbini => "lumbini",
            Self::Karnali => "karnali",
            Self::Sudurpashchim => "sudurpashchim",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "koshi" => Some(Self::Koshi),
            "madhesh" => Some(Self::Madhesh),
            "bagmati" => Some(Self::Bagmati),
            "gandaki" => Some(Self::Gandaki),
            "lumbini" => Some(Self::Lumbini),
            "karnali" => Some(Self::Karnali),
            "sudurpashchim" => Some(Self::Sudurpashchim),
            _ => None,
        }
    }
}

/// Contact metadata. Not behaviorally significant beyond format checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentContact {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub fax: Option<String>,
    pub province: Option<Province>,
    pub district: Option<String>,
    pub address: Option<String>,
    pub photo_url: Option<String>,
}

impl DepartmentContact {
    /// Trims every text field, drops blanks and checks email/photo formats.
    pub fn normalized(self) -> Result<Self, ValidationError> {
        let contact = Self {
            first_name: non_blank(self.first_name),
            last_name: non_blank(self.last_name),
            email: non_blank(self.email),
            phone_number: non_blank(self.phone_number),
            fax: non_blank(self.fax),
            province: self.province,
            district: non_blank(self.district),
            address: non_blank(self.address),
            photo_url: non_blank(self.photo_url),
        };

        if let Some(email) = contact.email.as_deref() {
            if !EMAIL_RE.is_match(email) {
                return Err(ValidationError::new(
                    "email",
                    format!("`{email}` is not an email address"),
                ));
            }
        }
        if let Some(photo_url) = contact.photo_url.as_deref() {
            if !URL_RE.is_match(photo_url) {
                return Err(ValidationError::new(
                    "photo_url",
                    format!("`{photo_url}` is not an http(s) URL"),
                ));
            }
        }
        Ok(contact)
    }
}

/// Department read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Department {
    pub uuid: DepartmentId,
    pub name: String,
    pub office_type: OfficeType,
    /// `None` means a root office.
    pub parent_uuid: Option<DepartmentId>,
    pub contact: DepartmentContact,
    /// Soft-deactivation marker.
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Input for department creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDepartment {
    pub name: String,
    pub office_type: OfficeType,
    pub parent_uuid: Option<DepartmentId>,
    pub contact: DepartmentContact,
}

impl NewDepartment {
    pub fn new(name: impl Into<String>, office_type: OfficeType) -> Self {
        Self {
            name: name.into(),
            office_type,
            parent_uuid: None,
            contact: DepartmentContact::default(),
        }
    }

    pub fn under(mut self, parent_uuid: DepartmentId) -> Self {
        self.parent_uuid = Some(parent_uuid);
        self
    }

    /// Builds the record to persist, rejecting blank names and malformed contact data.
    pub fn into_department(self, now_ms: i64) -> Result<Department, ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::new("name", "must not be blank"));
        }
        Ok(Department {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            office_type: self.office_type,
            parent_uuid: self.parent_uuid,
            contact: self.contact.normalized()?,
            is_active: true,
            created_at: now_ms,
            updated_at: now_ms,
        })
    }
}

/// Id-indexed arena of departments with a derived child index.
#[derive(Debug, Clone, Default)]
pub struct DepartmentTree {
    nodes: HashMap<DepartmentId, Department>,
    children: HashMap<DepartmentId, Vec<DepartmentId>>,
}

impl DepartmentTree {
    pub fn from_departments(departments: impl IntoIterator<Item = Department>) -> Self {
        let mut nodes = HashMap::new();
        let mut children: HashMap<DepartmentId, Vec<DepartmentId>> = HashMap::new();
        for department in departments {
            if let Some(parent_uuid) = department.parent_uuid {
                children
                    .entry(parent_uuid)
                    .or_default()
                    .push(department.uuid);
            }
            nodes.insert(department.uuid, department);
        }
        for child_ids in children.values_mut() {
            child_ids.sort();
        }
        Self { nodes, children }
    }

    pub fn get(&self, id: DepartmentId) -> Option<&Department> {
        self.nodes.get(&id)
    }

    pub fn children_of(&self, id: DepartmentId) -> &[DepartmentId] {
        self.children.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Returns `root` plus every descendant, breadth-first.
    ///
    /// Includes inactive nodes; callers filter as needed.
    pub fn subtree(&self, root: DepartmentId) -> Vec<DepartmentId> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([root]);
        let mut ordered = Vec::new();
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            ordered.push(current);
            queue.extend(self.children_of(current).iter().copied());
        }
        ordered
    }

    /// Expands each id to its inclusive subtree, keeping only active offices.
    ///
    /// Inactive intermediate offices are walked through, so their active
    /// descendants are still reached.
    ///
    /// # Errors
    /// Returns the first input id that is unknown or inactive.
    pub fn resolve(
        &self,
        ids: &BTreeSet<DepartmentId>,
    ) -> Result<BTreeSet<DepartmentId>, DepartmentId> {
        let mut resolved = BTreeSet::new();
        for &id in ids {
            match self.nodes.get(&id) {
                Some(department) if department.is_active => {}
                _ => return Err(id),
            }
            if resolved.contains(&id) {
                continue;
            }
            for member in self.subtree(id) {
                if self.nodes.get(&member).is_some_and(|node| node.is_active) {
                    resolved.insert(member);
                }
            }
        }
        Ok(resolved)
    }

    /// Returns whether `candidate` lies strictly below `ancestor`.
    pub fn is_descendant(&self, candidate: DepartmentId, ancestor: DepartmentId) -> bool {
        let mut visited = HashSet::new();
        let mut cursor = self.nodes.get(&candidate).and_then(|node| node.parent_uuid);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            if !visited.insert(current) {
                return false;
            }
            cursor = self.nodes.get(&current).and_then(|node| node.parent_uuid);
        }
        false
    }

    /// Returns whether re-parenting `department` under `parent` breaks the forest.
    pub fn would_create_cycle(&self, department: DepartmentId, parent: DepartmentId) -> bool {
        department == parent || self.is_descendant(parent, department)
    }
}
