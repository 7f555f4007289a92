//! Entity descriptors and audit shapes.
//!
//! A descriptor declares how one business entity takes part in sync: the
//! table it lives in on the server, the table name mobile clients use, the
//! audit columns it carries, and in which directions it flows.

use deltasync_store::Filter;

/// Audit column names.
pub mod columns {
    /// Record id.
    pub const ID: &str = "id";
    /// Soft-delete flag (standard shape).
    pub const IS_DELETED: &str = "is_deleted";
    /// Soft-delete time (standard shape).
    pub const DELETED_AT: &str = "deleted_at";
    /// First durable server-side store (standard shape).
    pub const SERVER_CREATED_AT: &str = "server_created_at";
    /// Last mutation (standard shape).
    pub const LAST_MODIFIED: &str = "last_modified";
    /// First store (create-only shape).
    pub const CREATED_AT: &str = "created_at";
    /// Last mutation (create-only shape).
    pub const UPDATED_AT: &str = "updated_at";

    /// Every column the server stamps from its clock.
    pub const STAMPS: &[&str] = &[
        SERVER_CREATED_AT,
        LAST_MODIFIED,
        DELETED_AT,
        CREATED_AT,
        UPDATED_AT,
    ];
}

/// The audit columns an entity carries, which determine its delta rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditShape {
    /// `server_created_at`, `last_modified`, `is_deleted`, `deleted_at`.
    Standard,
    /// `created_at`, `updated_at`; records are superseded, never deleted.
    CreateOnly,
}

impl AuditShape {
    /// Records first stored after `cursor`.
    pub fn created_filter(&self, cursor: i64) -> Filter {
        match self {
            AuditShape::Standard => Filter::new()
                .flag(columns::IS_DELETED, false)
                .gt(columns::SERVER_CREATED_AT, cursor),
            AuditShape::CreateOnly => Filter::new().gt(columns::CREATED_AT, cursor),
        }
    }

    /// Records modified after `cursor` that already existed at `cursor`.
    ///
    /// The `<= cursor` creation bound keeps this disjoint from
    /// [`created_filter`](Self::created_filter).
    pub fn updated_filter(&self, cursor: i64) -> Filter {
        match self {
            AuditShape::Standard => Filter::new()
                .flag(columns::IS_DELETED, false)
                .gt(columns::LAST_MODIFIED, cursor)
                .le(columns::SERVER_CREATED_AT, cursor),
            AuditShape::CreateOnly => Filter::new()
                .le(columns::CREATED_AT, cursor)
                .gt(columns::UPDATED_AT, cursor),
        }
    }

    /// Records soft-deleted after `cursor`; `None` if the shape has no
    /// deletion semantics.
    pub fn deleted_filter(&self, cursor: i64) -> Option<Filter> {
        match self {
            AuditShape::Standard => Some(
                Filter::new()
                    .flag(columns::IS_DELETED, true)
                    .gt(columns::DELETED_AT, cursor),
            ),
            AuditShape::CreateOnly => None,
        }
    }

    /// Returns true if records of this shape can be deleted.
    pub fn supports_delete(&self) -> bool {
        matches!(self, AuditShape::Standard)
    }
}

/// Static declaration of one syncable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// Table name on the server.
    pub server_table: &'static str,
    /// Table name used by mobile clients on the wire.
    pub mobile_table: &'static str,
    /// Audit columns carried by the entity.
    pub shape: AuditShape,
    /// Included in pull responses (server to client).
    pub push_to_client: bool,
    /// Accepted in push requests (client to server).
    pub pull_from_client: bool,
}

impl EntityDescriptor {
    /// A standard-shape entity synced in both directions.
    pub const fn standard(server_table: &'static str, mobile_table: &'static str) -> Self {
        Self {
            server_table,
            mobile_table,
            shape: AuditShape::Standard,
            push_to_client: true,
            pull_from_client: true,
        }
    }

    /// A create-only entity synced in both directions.
    pub const fn create_only(server_table: &'static str, mobile_table: &'static str) -> Self {
        Self {
            server_table,
            mobile_table,
            shape: AuditShape::CreateOnly,
            push_to_client: true,
            pull_from_client: true,
        }
    }

    /// Marks the entity push-only: sent to clients, never accepted from them.
    pub const fn push_only(mut self) -> Self {
        self.push_to_client = true;
        self.pull_from_client = false;
        self
    }
}

/// The entity catalog the server registers by default.
pub const DEFAULT_ENTITIES: &[EntityDescriptor] = &[
    EntityDescriptor::standard("patients", "patients"),
    EntityDescriptor::standard("patient_additional_attributes", "patient_additional_attributes"),
    EntityDescriptor::standard("events", "events"),
    EntityDescriptor::standard("visits", "visits"),
    EntityDescriptor::standard("appointments", "appointments"),
    EntityDescriptor::standard("prescriptions", "prescriptions"),
    EntityDescriptor::standard("clinics", "clinics").push_only(),
    EntityDescriptor::standard("users", "users").push_only(),
    EntityDescriptor::standard("patient_registration_forms", "registration_forms").push_only(),
    EntityDescriptor::standard("event_forms", "event_forms").push_only(),
    EntityDescriptor::create_only("string_ids", "string_ids"),
    EntityDescriptor::create_only("string_content", "string_content"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use deltasync_store::Document;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn bucket(shape: AuditShape, d: &Document, cursor: i64) -> Vec<&'static str> {
        let mut hits = Vec::new();
        if shape.created_filter(cursor).matches(d) {
            hits.push("created");
        }
        if shape.updated_filter(cursor).matches(d) {
            hits.push("updated");
        }
        if shape.deleted_filter(cursor).is_some_and(|f| f.matches(d)) {
            hits.push("deleted");
        }
        hits
    }

    #[test]
    fn standard_rules() {
        let live = doc(json!({
            "id": "e", "is_deleted": false, "server_created_at": 100, "last_modified": 200
        }));
        assert_eq!(bucket(AuditShape::Standard, &live, 50), vec!["created"]);
        assert_eq!(bucket(AuditShape::Standard, &live, 150), vec!["updated"]);
        assert!(bucket(AuditShape::Standard, &live, 250).is_empty());

        let gone = doc(json!({
            "id": "e", "is_deleted": true, "deleted_at": 300,
            "server_created_at": 100, "last_modified": 300
        }));
        assert_eq!(bucket(AuditShape::Standard, &gone, 50), vec!["deleted"]);
        assert_eq!(bucket(AuditShape::Standard, &gone, 250), vec!["deleted"]);
        assert!(bucket(AuditShape::Standard, &gone, 350).is_empty());
    }

    #[test]
    fn create_only_rules() {
        let d = doc(json!({"id": "s", "created_at": 100, "updated_at": 200}));
        assert_eq!(bucket(AuditShape::CreateOnly, &d, 50), vec!["created"]);
        assert_eq!(bucket(AuditShape::CreateOnly, &d, 100), vec!["updated"]);
        assert_eq!(bucket(AuditShape::CreateOnly, &d, 150), vec!["updated"]);
        assert!(bucket(AuditShape::CreateOnly, &d, 200).is_empty());
        assert!(AuditShape::CreateOnly.deleted_filter(0).is_none());
        assert!(!AuditShape::CreateOnly.supports_delete());
        assert!(AuditShape::Standard.supports_delete());
    }

    #[test]
    fn catalog_names_are_unique() {
        let mut server: Vec<_> = DEFAULT_ENTITIES.iter().map(|d| d.server_table).collect();
        let mut mobile: Vec<_> = DEFAULT_ENTITIES.iter().map(|d| d.mobile_table).collect();
        server.sort_unstable();
        server.dedup();
        mobile.sort_unstable();
        mobile.dedup();
        assert_eq!(server.len(), DEFAULT_ENTITIES.len());
        assert_eq!(mobile.len(), DEFAULT_ENTITIES.len());
    }

    #[test]
    fn push_only_entities() {
        let forms = DEFAULT_ENTITIES
            .iter()
            .find(|d| d.server_table == "patient_registration_forms")
            .unwrap();
        assert_eq!(forms.mobile_table, "registration_forms");
        assert!(forms.push_to_client);
        assert!(!forms.pull_from_client);

        let create_only: Vec<_> = DEFAULT_ENTITIES
            .iter()
            .filter(|d| d.shape == AuditShape::CreateOnly)
            .map(|d| d.server_table)
            .collect();
        assert_eq!(create_only, vec!["string_ids", "string_content"]);
    }
}
