//! Static row structure of an entity's backing relation.

/// One column of a structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    /// Declared PostgreSQL type (`text`, `int4`, `uuid`, ...)
    pub sql_type: String,
}

/// Table name, ordered fields and primary key of a relation
///
/// # Example
///
/// ```
/// use tether::Structure;
///
/// let structure = Structure::new("dummy_person")
///     .field("name", "text")
///     .field("dummy_person_mother_name", "text")
///     .primary_key(["name"]);
///
/// assert!(structure.is_primary_key("name"));
/// assert_eq!(structure.field_type("dummy_person_mother_name"), Some("text"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Structure {
    relation: String,
    fields: Vec<FieldDef>,
    primary_key: Vec<String>,
}

impl Structure {
    pub fn new(relation: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            fields: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    /// Append a field; re-declaring a name replaces its type in place
    pub fn field(mut self, name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        let name = name.into();
        let sql_type = sql_type.into();
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(existing) => existing.sql_type = sql_type,
            None => self.fields.push(FieldDef { name, sql_type }),
        }
        self
    }

    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn relation(&self) -> &str {
        &self.relation
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn primary_key_fields(&self) -> &[String] {
        &self.primary_key
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn field_type(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.sql_type.as_str())
    }

    pub fn is_primary_key(&self, name: &str) -> bool {
        self.primary_key.iter().any(|c| c == name)
    }
}

/// True for the text family of PostgreSQL types
pub(crate) fn is_text_type(sql_type: &str) -> bool {
    matches!(
        sql_type.to_ascii_lowercase().as_str(),
        "text" | "varchar" | "character varying" | "char" | "bpchar" | "character" | "citext" | "name"
    )
}
