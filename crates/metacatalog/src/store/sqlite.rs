//! SQLite backend.

use std::path::Path;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};

use super::*;
use crate::{CatalogError, PropertyId, SchemaVersion};

const CREATE_TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS cat_schema (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE COLLATE NOCASE,
        alias TEXT NOT NULL UNIQUE COLLATE NOCASE,
        version_read INTEGER NOT NULL,
        version_write INTEGER NOT NULL,
        version_minor INTEGER NOT NULL,
        original_major INTEGER,
        original_minor INTEGER,
        display_label TEXT,
        description TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cat_schema_reference (
        schema_id INTEGER NOT NULL REFERENCES cat_schema(id) ON DELETE CASCADE,
        referenced_schema_id INTEGER NOT NULL REFERENCES cat_schema(id),
        ordinal INTEGER NOT NULL,
        PRIMARY KEY (schema_id, referenced_schema_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cat_class (
        id INTEGER PRIMARY KEY,
        schema_id INTEGER NOT NULL REFERENCES cat_schema(id) ON DELETE CASCADE,
        name TEXT NOT NULL COLLATE NOCASE,
        display_label TEXT,
        description TEXT,
        class_type INTEGER NOT NULL,
        modifier INTEGER NOT NULL,
        applies_to INTEGER,
        strength INTEGER,
        strength_direction INTEGER,
        UNIQUE (schema_id, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cat_class_base (
        class_id INTEGER NOT NULL REFERENCES cat_class(id) ON DELETE CASCADE,
        base_class_id INTEGER NOT NULL REFERENCES cat_class(id),
        ordinal INTEGER NOT NULL,
        PRIMARY KEY (class_id, base_class_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cat_property (
        id INTEGER PRIMARY KEY,
        class_id INTEGER NOT NULL REFERENCES cat_class(id) ON DELETE CASCADE,
        ordinal INTEGER NOT NULL,
        name TEXT NOT NULL COLLATE NOCASE,
        display_label TEXT,
        description TEXT,
        is_readonly INTEGER NOT NULL,
        priority INTEGER NOT NULL,
        kind INTEGER NOT NULL,
        primitive_type INTEGER,
        enumeration_id INTEGER,
        struct_class_id INTEGER,
        extended_type_name TEXT,
        kind_of_quantity_id INTEGER,
        category_id INTEGER,
        array_min INTEGER,
        array_max INTEGER,
        navigation_relationship_id INTEGER,
        navigation_direction INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cat_relationship_constraint (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        relationship_class_id INTEGER NOT NULL REFERENCES cat_class(id) ON DELETE CASCADE,
        end_kind INTEGER NOT NULL,
        multiplicity_lower INTEGER NOT NULL,
        multiplicity_upper INTEGER,
        is_polymorphic INTEGER NOT NULL,
        role_label TEXT,
        abstract_constraint_class_id INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cat_relationship_constraint_class (
        constraint_id INTEGER NOT NULL REFERENCES cat_relationship_constraint(id) ON DELETE CASCADE,
        class_id INTEGER NOT NULL,
        ordinal INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cat_custom_attribute (
        class_id INTEGER NOT NULL,
        container_id INTEGER NOT NULL,
        container_type INTEGER NOT NULL,
        ordinal INTEGER NOT NULL,
        instance TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cat_enumeration (
        id INTEGER PRIMARY KEY,
        schema_id INTEGER NOT NULL REFERENCES cat_schema(id) ON DELETE CASCADE,
        name TEXT NOT NULL COLLATE NOCASE,
        display_label TEXT,
        description TEXT,
        backing_type INTEGER NOT NULL,
        is_strict INTEGER NOT NULL,
        enum_values TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cat_kind_of_quantity (
        id INTEGER PRIMARY KEY,
        schema_id INTEGER NOT NULL REFERENCES cat_schema(id) ON DELETE CASCADE,
        name TEXT NOT NULL COLLATE NOCASE,
        display_label TEXT,
        description TEXT,
        persistence_unit TEXT NOT NULL,
        presentation_formats TEXT,
        relative_error REAL NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cat_property_category (
        id INTEGER PRIMARY KEY,
        schema_id INTEGER NOT NULL REFERENCES cat_schema(id) ON DELETE CASCADE,
        name TEXT NOT NULL COLLATE NOCASE,
        display_label TEXT,
        description TEXT,
        priority INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cat_unit_system (
        id INTEGER PRIMARY KEY,
        schema_id INTEGER NOT NULL REFERENCES cat_schema(id) ON DELETE CASCADE,
        name TEXT NOT NULL COLLATE NOCASE,
        display_label TEXT,
        description TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cat_phenomenon (
        id INTEGER PRIMARY KEY,
        schema_id INTEGER NOT NULL REFERENCES cat_schema(id) ON DELETE CASCADE,
        name TEXT NOT NULL COLLATE NOCASE,
        display_label TEXT,
        description TEXT,
        definition TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cat_unit (
        id INTEGER PRIMARY KEY,
        schema_id INTEGER NOT NULL REFERENCES cat_schema(id) ON DELETE CASCADE,
        name TEXT NOT NULL COLLATE NOCASE,
        display_label TEXT,
        description TEXT,
        phenomenon_id INTEGER,
        unit_system_id INTEGER,
        definition TEXT,
        numerator REAL,
        denominator REAL,
        unit_offset REAL,
        is_constant INTEGER NOT NULL,
        inverting_unit_id INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cat_format (
        id INTEGER PRIMARY KEY,
        schema_id INTEGER NOT NULL REFERENCES cat_schema(id) ON DELETE CASCADE,
        name TEXT NOT NULL COLLATE NOCASE,
        display_label TEXT,
        description TEXT,
        numeric_spec TEXT NOT NULL,
        composite_spacer TEXT,
        composite_include_zero INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cat_format_composite_unit (
        format_id INTEGER NOT NULL REFERENCES cat_format(id) ON DELETE CASCADE,
        ordinal INTEGER NOT NULL,
        unit_id INTEGER NOT NULL,
        label TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cat_id_sequence (
        singleton INTEGER PRIMARY KEY CHECK (singleton = 0),
        next_id INTEGER NOT NULL
    )
    "#,
    "INSERT OR IGNORE INTO cat_id_sequence (singleton, next_id) VALUES (0, 1)",
    "CREATE INDEX IF NOT EXISTS idx_cat_class_schema ON cat_class(schema_id)",
    "CREATE INDEX IF NOT EXISTS idx_cat_property_class ON cat_property(class_id)",
    "CREATE INDEX IF NOT EXISTS idx_cat_class_base_base ON cat_class_base(base_class_id)",
    "CREATE INDEX IF NOT EXISTS idx_cat_custom_attribute_container ON cat_custom_attribute(container_id, container_type)",
];

const SCHEMA_COLUMNS: &str = "id, name, alias, version_read, version_write, version_minor, \
    original_major, original_minor, display_label, description";

fn id(value: u64) -> i64 {
    value as i64
}

fn read_id(row: &Row, index: usize) -> rusqlite::Result<u64> {
    row.get::<_, i64>(index).map(|v| v as u64)
}

fn read_opt_id(row: &Row, index: usize) -> rusqlite::Result<Option<u64>> {
    row.get::<_, Option<i64>>(index).map(|v| v.map(|v| v as u64))
}

fn map_schema(row: &Row) -> rusqlite::Result<SchemaRow> {
    let original_major: Option<u32> = row.get(6)?;
    let original_minor: Option<u32> = row.get(7)?;
    Ok(SchemaRow {
        id: SchemaId(read_id(row, 0)?),
        name: row.get(1)?,
        alias: row.get(2)?,
        version: SchemaVersion::new(row.get(3)?, row.get(4)?, row.get(5)?),
        original_version: original_major.zip(original_minor),
        display_label: row.get(8)?,
        description: row.get(9)?,
    })
}

fn map_class(row: &Row) -> rusqlite::Result<ClassRow> {
    Ok(ClassRow {
        id: ClassId(read_id(row, 0)?),
        schema_id: SchemaId(read_id(row, 1)?),
        name: row.get(2)?,
        display_label: row.get(3)?,
        description: row.get(4)?,
        class_type: row.get(5)?,
        modifier: row.get(6)?,
        applies_to: row.get(7)?,
        strength: row.get(8)?,
        strength_direction: row.get(9)?,
    })
}

fn map_property(row: &Row) -> rusqlite::Result<PropertyRow> {
    Ok(PropertyRow {
        id: PropertyId(read_id(row, 0)?),
        class_id: ClassId(read_id(row, 1)?),
        ordinal: row.get(2)?,
        name: row.get(3)?,
        display_label: row.get(4)?,
        description: row.get(5)?,
        is_readonly: row.get(6)?,
        priority: row.get(7)?,
        kind: row.get(8)?,
        primitive_type: row.get(9)?,
        enumeration_id: read_opt_id(row, 10)?.map(EnumerationId),
        struct_class_id: read_opt_id(row, 11)?.map(ClassId),
        extended_type_name: row.get(12)?,
        kind_of_quantity_id: read_opt_id(row, 13)?.map(KindOfQuantityId),
        category_id: read_opt_id(row, 14)?.map(PropertyCategoryId),
        array_min: row.get(15)?,
        array_max: row.get(16)?,
        navigation_relationship_id: read_opt_id(row, 17)?.map(ClassId),
        navigation_direction: row.get(18)?,
    })
}

/// Catalog store on top of a SQLite database file.
///
/// # Example
///
/// ```no_run
/// use metacatalog::{SchemaManager, SqliteStore};
///
/// let store = SqliteStore::open("catalog.db").unwrap();
/// let manager = SchemaManager::new(store);
/// let schemas = manager.get_schemas(false).unwrap();
/// ```
pub struct SqliteStore {
    conn: Connection,
    identity: StoreIdentity,
    readonly: bool,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("identity", &self.identity)
            .field("readonly", &self.readonly)
            .finish()
    }
}

impl SqliteStore {
    /// Open or create a catalog at `path`. Use `:memory:` for a transient one.
    pub fn open(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        let store = Self {
            conn,
            identity: StoreIdentity::new(format!("sqlite:{}", path.display())),
            readonly: false,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Open an existing catalog without write access.
    pub fn open_readonly(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self {
            conn,
            identity: StoreIdentity::new(format!("sqlite:{}", path.display())),
            readonly: true,
        })
    }

    pub fn in_memory() -> CatalogResult<Self> {
        Self::open(":memory:")
    }

    fn initialize(&self) -> CatalogResult<()> {
        for sql in CREATE_TABLES {
            self.conn.execute(sql, [])?;
        }
        Ok(())
    }

    fn query_ids(&self, sql: &str, key: u64) -> CatalogResult<Vec<u64>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let ids = stmt
            .query_map(params![id(key)], |row| read_id(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn query_id_by_name(&self, sql: &str, schema_id: SchemaId, name: &str) -> CatalogResult<Option<u64>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let found = stmt
            .query_row(params![id(schema_id.0), name], |row| read_id(row, 0))
            .optional()?;
        Ok(found)
    }

    fn exists(&self, sql: &str, key: Option<u64>) -> CatalogResult<bool> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let found = match key {
            Some(key) => stmt.exists(params![id(key)])?,
            None => stmt.exists([])?,
        };
        Ok(found)
    }
}

impl CatalogStore for SqliteStore {
    fn schema_row(&self, schema_id: SchemaId) -> CatalogResult<Option<SchemaRow>> {
        let sql = format!("SELECT {} FROM cat_schema WHERE id = ?1", SCHEMA_COLUMNS);
        let mut stmt = self.conn.prepare_cached(&sql)?;
        Ok(stmt.query_row(params![id(schema_id.0)], map_schema).optional()?)
    }

    fn schema_id(&self, name: &str, mode: SchemaLookupMode) -> CatalogResult<Option<SchemaId>> {
        let lookup = |sql: &str| -> CatalogResult<Option<SchemaId>> {
            let mut stmt = self.conn.prepare_cached(sql)?;
            let found = stmt
                .query_row(params![name], |row| read_id(row, 0))
                .optional()?;
            Ok(found.map(SchemaId))
        };
        let by_name = "SELECT id FROM cat_schema WHERE name = ?1 COLLATE NOCASE";
        let by_alias = "SELECT id FROM cat_schema WHERE alias = ?1 COLLATE NOCASE";
        match mode {
            SchemaLookupMode::ByName => lookup(by_name),
            SchemaLookupMode::ByAlias => lookup(by_alias),
            SchemaLookupMode::AutoDetect => match lookup(by_name)? {
                Some(found) => Ok(Some(found)),
                None => lookup(by_alias),
            },
        }
    }

    fn schema_ids(&self) -> CatalogResult<Vec<SchemaId>> {
        let mut stmt = self.conn.prepare_cached("SELECT id FROM cat_schema ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| read_id(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids.into_iter().map(SchemaId).collect())
    }

    fn schema_reference_ids(&self, schema_id: SchemaId) -> CatalogResult<Vec<SchemaId>> {
        let ids = self.query_ids(
            "SELECT referenced_schema_id FROM cat_schema_reference WHERE schema_id = ?1 ORDER BY ordinal",
            schema_id.0,
        )?;
        Ok(ids.into_iter().map(SchemaId).collect())
    }

    fn schema_child_count(&self, schema_id: SchemaId) -> CatalogResult<u64> {
        let mut stmt = self.conn.prepare_cached(
            r#"
            SELECT (SELECT COUNT(*) FROM cat_class WHERE schema_id = ?1)
                 + (SELECT COUNT(*) FROM cat_enumeration WHERE schema_id = ?1)
                 + (SELECT COUNT(*) FROM cat_kind_of_quantity WHERE schema_id = ?1)
                 + (SELECT COUNT(*) FROM cat_property_category WHERE schema_id = ?1)
                 + (SELECT COUNT(*) FROM cat_unit_system WHERE schema_id = ?1)
                 + (SELECT COUNT(*) FROM cat_phenomenon WHERE schema_id = ?1)
                 + (SELECT COUNT(*) FROM cat_unit WHERE schema_id = ?1)
                 + (SELECT COUNT(*) FROM cat_format WHERE schema_id = ?1)
            "#,
        )?;
        let count: i64 = stmt.query_row(params![id(schema_id.0)], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn schema_has_units(&self, schema_id: SchemaId) -> CatalogResult<bool> {
        self.exists(
            r#"
            SELECT 1 FROM cat_unit_system WHERE schema_id = ?1
            UNION ALL SELECT 1 FROM cat_phenomenon WHERE schema_id = ?1
            UNION ALL SELECT 1 FROM cat_unit WHERE schema_id = ?1
            UNION ALL SELECT 1 FROM cat_format WHERE schema_id = ?1
            LIMIT 1
            "#,
            Some(schema_id.0),
        )
    }

    fn class_row(&self, class_id: ClassId) -> CatalogResult<Option<ClassRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, schema_id, name, display_label, description, class_type, modifier, \
             applies_to, strength, strength_direction FROM cat_class WHERE id = ?1",
        )?;
        Ok(stmt.query_row(params![id(class_id.0)], map_class).optional()?)
    }

    fn class_id(&self, schema_id: SchemaId, name: &str) -> CatalogResult<Option<ClassId>> {
        Ok(self
            .query_id_by_name(
                "SELECT id FROM cat_class WHERE schema_id = ?1 AND name = ?2 COLLATE NOCASE",
                schema_id,
                name,
            )?
            .map(ClassId))
    }

    fn class_ids(&self, schema_id: SchemaId) -> CatalogResult<Vec<ClassId>> {
        let ids = self.query_ids(
            "SELECT id FROM cat_class WHERE schema_id = ?1 ORDER BY id",
            schema_id.0,
        )?;
        Ok(ids.into_iter().map(ClassId).collect())
    }

    fn base_class_ids(&self, class_id: ClassId) -> CatalogResult<Vec<ClassId>> {
        let ids = self.query_ids(
            "SELECT base_class_id FROM cat_class_base WHERE class_id = ?1 ORDER BY ordinal",
            class_id.0,
        )?;
        Ok(ids.into_iter().map(ClassId).collect())
    }

    fn derived_class_ids(&self, class_id: ClassId) -> CatalogResult<Vec<ClassId>> {
        let ids = self.query_ids(
            "SELECT class_id FROM cat_class_base WHERE base_class_id = ?1 ORDER BY class_id",
            class_id.0,
        )?;
        Ok(ids.into_iter().map(ClassId).collect())
    }

    fn property_rows(&self, class_id: ClassId) -> CatalogResult<Vec<PropertyRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, class_id, ordinal, name, display_label, description, is_readonly, \
             priority, kind, primitive_type, enumeration_id, struct_class_id, \
             extended_type_name, kind_of_quantity_id, category_id, array_min, array_max, \
             navigation_relationship_id, navigation_direction \
             FROM cat_property WHERE class_id = ?1 ORDER BY ordinal",
        )?;
        let rows = stmt
            .query_map(params![id(class_id.0)], map_property)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn relationship_constraint_rows(&self, class_id: ClassId) -> CatalogResult<Vec<ConstraintRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, end_kind, multiplicity_lower, multiplicity_upper, is_polymorphic, \
             role_label, abstract_constraint_class_id \
             FROM cat_relationship_constraint WHERE relationship_class_id = ?1 ORDER BY end_kind",
        )?;
        let headers = stmt
            .query_map(params![id(class_id.0)], |row| {
                Ok((
                    read_id(row, 0)?,
                    ConstraintRow {
                        relationship_class_id: class_id,
                        end: row.get(1)?,
                        multiplicity_lower: row.get(2)?,
                        multiplicity_upper: row.get(3)?,
                        is_polymorphic: row.get(4)?,
                        role_label: row.get(5)?,
                        abstract_constraint_class_id: read_opt_id(row, 6)?.map(ClassId),
                        constraint_class_ids: Vec::new(),
                    },
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut rows = Vec::with_capacity(headers.len());
        for (constraint_id, mut row) in headers {
            row.constraint_class_ids = self
                .query_ids(
                    "SELECT class_id FROM cat_relationship_constraint_class \
                     WHERE constraint_id = ?1 ORDER BY ordinal",
                    constraint_id,
                )?
                .into_iter()
                .map(ClassId)
                .collect();
            rows.push(row);
        }
        Ok(rows)
    }

    fn custom_attribute_rows(
        &self,
        container_id: u64,
        container_type: ContainerType,
    ) -> CatalogResult<Vec<CustomAttributeRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT class_id, container_id, container_type, ordinal, instance \
             FROM cat_custom_attribute WHERE container_id = ?1 AND container_type = ?2 \
             ORDER BY ordinal",
        )?;
        let rows = stmt
            .query_map(params![id(container_id), container_type.as_i32()], |row| {
                Ok(CustomAttributeRow {
                    class_id: ClassId(read_id(row, 0)?),
                    container_id: read_id(row, 1)?,
                    container_type: row.get(2)?,
                    ordinal: row.get(3)?,
                    instance: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn enumeration_row(&self, enum_id: EnumerationId) -> CatalogResult<Option<EnumerationRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, schema_id, name, display_label, description, backing_type, is_strict, \
             enum_values FROM cat_enumeration WHERE id = ?1",
        )?;
        let row = stmt
            .query_row(params![id(enum_id.0)], |row| {
                Ok(EnumerationRow {
                    id: EnumerationId(read_id(row, 0)?),
                    schema_id: SchemaId(read_id(row, 1)?),
                    name: row.get(2)?,
                    display_label: row.get(3)?,
                    description: row.get(4)?,
                    backing_type: row.get(5)?,
                    is_strict: row.get(6)?,
                    enum_values: row.get(7)?,
                })
            })
            .optional()?;
        Ok(row)
    }

    fn enumeration_id(
        &self,
        schema_id: SchemaId,
        name: &str,
    ) -> CatalogResult<Option<EnumerationId>> {
        Ok(self
            .query_id_by_name(
                "SELECT id FROM cat_enumeration WHERE schema_id = ?1 AND name = ?2 COLLATE NOCASE",
                schema_id,
                name,
            )?
            .map(EnumerationId))
    }

    fn enumeration_ids(&self, schema_id: SchemaId) -> CatalogResult<Vec<EnumerationId>> {
        let ids = self.query_ids(
            "SELECT id FROM cat_enumeration WHERE schema_id = ?1 ORDER BY id",
            schema_id.0,
        )?;
        Ok(ids.into_iter().map(EnumerationId).collect())
    }

    fn kind_of_quantity_row(
        &self,
        koq_id: KindOfQuantityId,
    ) -> CatalogResult<Option<KindOfQuantityRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, schema_id, name, display_label, description, persistence_unit, \
             presentation_formats, relative_error FROM cat_kind_of_quantity WHERE id = ?1",
        )?;
        let row = stmt
            .query_row(params![id(koq_id.0)], |row| {
                Ok(KindOfQuantityRow {
                    id: KindOfQuantityId(read_id(row, 0)?),
                    schema_id: SchemaId(read_id(row, 1)?),
                    name: row.get(2)?,
                    display_label: row.get(3)?,
                    description: row.get(4)?,
                    persistence_unit: row.get(5)?,
                    presentation_formats: row.get(6)?,
                    relative_error: row.get(7)?,
                })
            })
            .optional()?;
        Ok(row)
    }

    fn kind_of_quantity_id(
        &self,
        schema_id: SchemaId,
        name: &str,
    ) -> CatalogResult<Option<KindOfQuantityId>> {
        Ok(self
            .query_id_by_name(
                "SELECT id FROM cat_kind_of_quantity WHERE schema_id = ?1 AND name = ?2 COLLATE NOCASE",
                schema_id,
                name,
            )?
            .map(KindOfQuantityId))
    }

    fn kind_of_quantity_ids(&self, schema_id: SchemaId) -> CatalogResult<Vec<KindOfQuantityId>> {
        let ids = self.query_ids(
            "SELECT id FROM cat_kind_of_quantity WHERE schema_id = ?1 ORDER BY id",
            schema_id.0,
        )?;
        Ok(ids.into_iter().map(KindOfQuantityId).collect())
    }

    fn property_category_row(
        &self,
        category_id: PropertyCategoryId,
    ) -> CatalogResult<Option<PropertyCategoryRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, schema_id, name, display_label, description, priority \
             FROM cat_property_category WHERE id = ?1",
        )?;
        let row = stmt
            .query_row(params![id(category_id.0)], |row| {
                Ok(PropertyCategoryRow {
                    id: PropertyCategoryId(read_id(row, 0)?),
                    schema_id: SchemaId(read_id(row, 1)?),
                    name: row.get(2)?,
                    display_label: row.get(3)?,
                    description: row.get(4)?,
                    priority: row.get(5)?,
                })
            })
            .optional()?;
        Ok(row)
    }

    fn property_category_id(
        &self,
        schema_id: SchemaId,
        name: &str,
    ) -> CatalogResult<Option<PropertyCategoryId>> {
        Ok(self
            .query_id_by_name(
                "SELECT id FROM cat_property_category WHERE schema_id = ?1 AND name = ?2 COLLATE NOCASE",
                schema_id,
                name,
            )?
            .map(PropertyCategoryId))
    }

    fn property_category_ids(
        &self,
        schema_id: SchemaId,
    ) -> CatalogResult<Vec<PropertyCategoryId>> {
        let ids = self.query_ids(
            "SELECT id FROM cat_property_category WHERE schema_id = ?1 ORDER BY id",
            schema_id.0,
        )?;
        Ok(ids.into_iter().map(PropertyCategoryId).collect())
    }

    fn unit_system_rows(&self) -> CatalogResult<Vec<UnitSystemRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, schema_id, name, display_label, description FROM cat_unit_system ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(UnitSystemRow {
                    id: UnitSystemId(read_id(row, 0)?),
                    schema_id: SchemaId(read_id(row, 1)?),
                    name: row.get(2)?,
                    display_label: row.get(3)?,
                    description: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn phenomenon_rows(&self) -> CatalogResult<Vec<PhenomenonRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, schema_id, name, display_label, description, definition \
             FROM cat_phenomenon ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(PhenomenonRow {
                    id: PhenomenonId(read_id(row, 0)?),
                    schema_id: SchemaId(read_id(row, 1)?),
                    name: row.get(2)?,
                    display_label: row.get(3)?,
                    description: row.get(4)?,
                    definition: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn unit_rows(&self) -> CatalogResult<Vec<UnitRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, schema_id, name, display_label, description, phenomenon_id, \
             unit_system_id, definition, numerator, denominator, unit_offset, is_constant, \
             inverting_unit_id FROM cat_unit ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(UnitRow {
                    id: UnitId(read_id(row, 0)?),
                    schema_id: SchemaId(read_id(row, 1)?),
                    name: row.get(2)?,
                    display_label: row.get(3)?,
                    description: row.get(4)?,
                    phenomenon_id: read_opt_id(row, 5)?.map(PhenomenonId),
                    unit_system_id: read_opt_id(row, 6)?.map(UnitSystemId),
                    definition: row.get(7)?,
                    numerator: row.get(8)?,
                    denominator: row.get(9)?,
                    offset: row.get(10)?,
                    is_constant: row.get(11)?,
                    inverting_unit_id: read_opt_id(row, 12)?.map(UnitId),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn format_rows(&self) -> CatalogResult<Vec<FormatRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, schema_id, name, display_label, description, numeric_spec, \
             composite_spacer, composite_include_zero FROM cat_format ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(FormatRow {
                    id: FormatId(read_id(row, 0)?),
                    schema_id: SchemaId(read_id(row, 1)?),
                    name: row.get(2)?,
                    display_label: row.get(3)?,
                    description: row.get(4)?,
                    numeric_spec: row.get(5)?,
                    composite_spacer: row.get(6)?,
                    composite_include_zero: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn format_composite_unit_rows(
        &self,
        format_id: FormatId,
    ) -> CatalogResult<Vec<FormatCompositeUnitRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT format_id, ordinal, unit_id, label FROM cat_format_composite_unit \
             WHERE format_id = ?1 ORDER BY ordinal",
        )?;
        let rows = stmt
            .query_map(params![id(format_id.0)], |row| {
                Ok(FormatCompositeUnitRow {
                    format_id: FormatId(read_id(row, 0)?),
                    ordinal: row.get(1)?,
                    unit_id: UnitId(read_id(row, 2)?),
                    label: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn unit_system_id(
        &self,
        schema_id: SchemaId,
        name: &str,
    ) -> CatalogResult<Option<UnitSystemId>> {
        Ok(self
            .query_id_by_name(
                "SELECT id FROM cat_unit_system WHERE schema_id = ?1 AND name = ?2 COLLATE NOCASE",
                schema_id,
                name,
            )?
            .map(UnitSystemId))
    }

    fn phenomenon_id(&self, schema_id: SchemaId, name: &str) -> CatalogResult<Option<PhenomenonId>> {
        Ok(self
            .query_id_by_name(
                "SELECT id FROM cat_phenomenon WHERE schema_id = ?1 AND name = ?2 COLLATE NOCASE",
                schema_id,
                name,
            )?
            .map(PhenomenonId))
    }

    fn unit_id(&self, schema_id: SchemaId, name: &str) -> CatalogResult<Option<UnitId>> {
        Ok(self
            .query_id_by_name(
                "SELECT id FROM cat_unit WHERE schema_id = ?1 AND name = ?2 COLLATE NOCASE",
                schema_id,
                name,
            )?
            .map(UnitId))
    }

    fn format_id(&self, schema_id: SchemaId, name: &str) -> CatalogResult<Option<FormatId>> {
        Ok(self
            .query_id_by_name(
                "SELECT id FROM cat_format WHERE schema_id = ?1 AND name = ?2 COLLATE NOCASE",
                schema_id,
                name,
            )?
            .map(FormatId))
    }

    fn has_unit_tables(&self) -> CatalogResult<bool> {
        self.exists(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'cat_unit'",
            None,
        )
    }

    fn any_kind_of_quantity(&self) -> CatalogResult<bool> {
        self.exists("SELECT 1 FROM cat_kind_of_quantity LIMIT 1", None)
    }

    fn is_readonly(&self) -> bool {
        self.readonly
    }

    fn identity(&self) -> StoreIdentity {
        self.identity.clone()
    }
}

impl CatalogWriter for SqliteStore {
    fn allocate_id(&mut self) -> CatalogResult<u64> {
        if self.readonly {
            return Err(CatalogError::policy("store is read-only"));
        }
        let tx = self.conn.transaction()?;
        let next: i64 = tx.query_row(
            "SELECT next_id FROM cat_id_sequence WHERE singleton = 0",
            [],
            |row| row.get(0),
        )?;
        tx.execute(
            "UPDATE cat_id_sequence SET next_id = ?1 WHERE singleton = 0",
            params![next + 1],
        )?;
        tx.commit()?;
        Ok(next as u64)
    }

    fn insert_schema(&mut self, rows: SchemaRows) -> CatalogResult<()> {
        if self.readonly {
            return Err(CatalogError::policy("store is read-only"));
        }
        let tx = self.conn.transaction()?;
        let schema_id = id(rows.schema.id.0);
        let schema = &rows.schema;
        tx.execute(
            &format!(
                "INSERT INTO cat_schema ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                SCHEMA_COLUMNS
            ),
            params![
                schema_id,
                schema.name,
                schema.alias,
                schema.version.read,
                schema.version.write,
                schema.version.minor,
                schema.original_version.map(|v| v.0),
                schema.original_version.map(|v| v.1),
                schema.display_label,
                schema.description,
            ],
        )?;
        for (ordinal, reference) in rows.references.iter().enumerate() {
            tx.execute(
                "INSERT INTO cat_schema_reference (schema_id, referenced_schema_id, ordinal) \
                 VALUES (?1, ?2, ?3)",
                params![schema_id, id(reference.0), ordinal as i64],
            )?;
        }
        for class in &rows.classes {
            tx.execute(
                "INSERT INTO cat_class (id, schema_id, name, display_label, description, \
                 class_type, modifier, applies_to, strength, strength_direction) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    id(class.id.0),
                    id(class.schema_id.0),
                    class.name,
                    class.display_label,
                    class.description,
                    class.class_type,
                    class.modifier,
                    class.applies_to,
                    class.strength,
                    class.strength_direction,
                ],
            )?;
        }
        for (class_id, bases) in &rows.base_classes {
            for (ordinal, base) in bases.iter().enumerate() {
                tx.execute(
                    "INSERT INTO cat_class_base (class_id, base_class_id, ordinal) VALUES (?1, ?2, ?3)",
                    params![id(class_id.0), id(base.0), ordinal as i64],
                )?;
            }
        }
        for p in &rows.properties {
            tx.execute(
                "INSERT INTO cat_property (id, class_id, ordinal, name, display_label, \
                 description, is_readonly, priority, kind, primitive_type, enumeration_id, \
                 struct_class_id, extended_type_name, kind_of_quantity_id, category_id, \
                 array_min, array_max, navigation_relationship_id, navigation_direction) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, \
                 ?16, ?17, ?18, ?19)",
                params![
                    id(p.id.0),
                    id(p.class_id.0),
                    p.ordinal,
                    p.name,
                    p.display_label,
                    p.description,
                    p.is_readonly,
                    p.priority,
                    p.kind,
                    p.primitive_type,
                    p.enumeration_id.map(|v| id(v.0)),
                    p.struct_class_id.map(|v| id(v.0)),
                    p.extended_type_name,
                    p.kind_of_quantity_id.map(|v| id(v.0)),
                    p.category_id.map(|v| id(v.0)),
                    p.array_min,
                    p.array_max,
                    p.navigation_relationship_id.map(|v| id(v.0)),
                    p.navigation_direction,
                ],
            )?;
        }
        for c in &rows.constraints {
            tx.execute(
                "INSERT INTO cat_relationship_constraint (relationship_class_id, end_kind, \
                 multiplicity_lower, multiplicity_upper, is_polymorphic, role_label, \
                 abstract_constraint_class_id) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id(c.relationship_class_id.0),
                    c.end,
                    c.multiplicity_lower,
                    c.multiplicity_upper,
                    c.is_polymorphic,
                    c.role_label,
                    c.abstract_constraint_class_id.map(|v| id(v.0)),
                ],
            )?;
            let constraint_id = tx.last_insert_rowid();
            for (ordinal, class_id) in c.constraint_class_ids.iter().enumerate() {
                tx.execute(
                    "INSERT INTO cat_relationship_constraint_class (constraint_id, class_id, \
                     ordinal) VALUES (?1, ?2, ?3)",
                    params![constraint_id, id(class_id.0), ordinal as i64],
                )?;
            }
        }
        for ca in &rows.custom_attributes {
            tx.execute(
                "INSERT INTO cat_custom_attribute (class_id, container_id, container_type, \
                 ordinal, instance) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id(ca.class_id.0),
                    id(ca.container_id),
                    ca.container_type,
                    ca.ordinal,
                    ca.instance,
                ],
            )?;
        }
        for e in &rows.enumerations {
            tx.execute(
                "INSERT INTO cat_enumeration (id, schema_id, name, display_label, description, \
                 backing_type, is_strict, enum_values) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id(e.id.0),
                    id(e.schema_id.0),
                    e.name,
                    e.display_label,
                    e.description,
                    e.backing_type,
                    e.is_strict,
                    e.enum_values,
                ],
            )?;
        }
        for k in &rows.kinds_of_quantity {
            tx.execute(
                "INSERT INTO cat_kind_of_quantity (id, schema_id, name, display_label, \
                 description, persistence_unit, presentation_formats, relative_error) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id(k.id.0),
                    id(k.schema_id.0),
                    k.name,
                    k.display_label,
                    k.description,
                    k.persistence_unit,
                    k.presentation_formats,
                    k.relative_error,
                ],
            )?;
        }
        for c in &rows.property_categories {
            tx.execute(
                "INSERT INTO cat_property_category (id, schema_id, name, display_label, \
                 description, priority) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id(c.id.0),
                    id(c.schema_id.0),
                    c.name,
                    c.display_label,
                    c.description,
                    c.priority,
                ],
            )?;
        }
        for u in &rows.unit_systems {
            tx.execute(
                "INSERT INTO cat_unit_system (id, schema_id, name, display_label, description) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id(u.id.0), id(u.schema_id.0), u.name, u.display_label, u.description],
            )?;
        }
        for p in &rows.phenomena {
            tx.execute(
                "INSERT INTO cat_phenomenon (id, schema_id, name, display_label, description, \
                 definition) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id(p.id.0),
                    id(p.schema_id.0),
                    p.name,
                    p.display_label,
                    p.description,
                    p.definition,
                ],
            )?;
        }
        for u in &rows.units {
            tx.execute(
                "INSERT INTO cat_unit (id, schema_id, name, display_label, description, \
                 phenomenon_id, unit_system_id, definition, numerator, denominator, unit_offset, \
                 is_constant, inverting_unit_id) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    id(u.id.0),
                    id(u.schema_id.0),
                    u.name,
                    u.display_label,
                    u.description,
                    u.phenomenon_id.map(|v| id(v.0)),
                    u.unit_system_id.map(|v| id(v.0)),
                    u.definition,
                    u.numerator,
                    u.denominator,
                    u.offset,
                    u.is_constant,
                    u.inverting_unit_id.map(|v| id(v.0)),
                ],
            )?;
        }
        for f in &rows.formats {
            tx.execute(
                "INSERT INTO cat_format (id, schema_id, name, display_label, description, \
                 numeric_spec, composite_spacer, composite_include_zero) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id(f.id.0),
                    id(f.schema_id.0),
                    f.name,
                    f.display_label,
                    f.description,
                    f.numeric_spec,
                    f.composite_spacer,
                    f.composite_include_zero,
                ],
            )?;
        }
        for c in &rows.format_composite_units {
            tx.execute(
                "INSERT INTO cat_format_composite_unit (format_id, ordinal, unit_id, label) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![id(c.format_id.0), c.ordinal, id(c.unit_id.0), c.label],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn regenerate_views(&mut self) -> CatalogResult<()> {
        if self.readonly {
            return Err(CatalogError::policy("store is read-only"));
        }
        self.conn.execute_batch(
            r#"
            DROP VIEW IF EXISTS cat_class_view;
            CREATE VIEW cat_class_view AS
                SELECT c.id AS class_id, s.name AS schema_name, s.alias AS schema_alias,
                       c.name AS class_name, c.class_type AS class_type
                FROM cat_class c JOIN cat_schema s ON s.id = c.schema_id;
            "#,
        )?;
        Ok(())
    }
}
