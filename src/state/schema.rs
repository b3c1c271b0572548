/// Column mapping for the catalog tables
///
/// Each table is declared once as a `TableDef`. The catalog renders its DDL
/// and SELECT projections from these definitions, so column names, types and
/// nullability live in exactly one place.

/// SQLite storage class of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Real,
    Text,
}

impl SqlType {
    pub fn as_sql(self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Text => "TEXT",
        }
    }
}

/// Foreign key target of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub table: &'static str,
    pub column: &'static str,
    pub on_delete_cascade: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub sql_type: SqlType,
    pub nullable: bool,
    pub primary_key: bool,
    pub references: Option<ForeignKey>,
    /// Literal SQL default expression
    pub default: Option<&'static str>,
}

impl ColumnDef {
    const fn optional(name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            sql_type,
            nullable: true,
            primary_key: false,
            references: None,
            default: None,
        }
    }

    const fn required(name: &'static str, sql_type: SqlType) -> Self {
        Self {
            nullable: false,
            ..Self::optional(name, sql_type)
        }
    }

    const fn primary_key(name: &'static str) -> Self {
        Self {
            primary_key: true,
            ..Self::required(name, SqlType::Integer)
        }
    }

    fn definition(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.sql_type.as_sql());
        if self.primary_key {
            sql.push_str(" PRIMARY KEY AUTOINCREMENT");
        } else if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        sql
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
}

impl TableDef {
    /// `CREATE TABLE IF NOT EXISTS` statement for this table.
    /// Tables are STRICT so SQLite rejects values of the wrong storage class.
    pub fn create_sql(&self) -> String {
        let mut parts: Vec<String> = self.columns.iter().map(ColumnDef::definition).collect();

        for column in self.columns {
            if let Some(fk) = column.references {
                let mut clause = format!(
                    "FOREIGN KEY({}) REFERENCES {}({})",
                    column.name, fk.table, fk.column
                );
                if fk.on_delete_cascade {
                    clause.push_str(" ON DELETE CASCADE");
                }
                parts.push(clause);
            }
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n) STRICT",
            self.name,
            parts.join(",\n    ")
        )
    }

    /// Comma-separated column names in declaration order
    pub fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| c.name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}

pub const SLIDE: TableDef = TableDef {
    name: "slide",
    columns: &[
        ColumnDef::primary_key("id"),
        ColumnDef::required("file_name", SqlType::Text),
        ColumnDef {
            default: Some("1"),
            ..ColumnDef::required("active", SqlType::Integer)
        },
        ColumnDef::required("created", SqlType::Integer),
    ],
};

/// Scene/channel extractions written by the CZI to TIFF conversion.
/// `file_size` is in bytes.
pub const SLIDE_CZI_TO_TIF: TableDef = TableDef {
    name: "slide_czi_to_tif",
    columns: &[
        ColumnDef::primary_key("id"),
        ColumnDef {
            references: Some(ForeignKey {
                table: "slide",
                column: "id",
                on_delete_cascade: true,
            }),
            ..ColumnDef::required("slide_id", SqlType::Integer)
        },
        ColumnDef::optional("scene_number", SqlType::Integer),
        ColumnDef::optional("channel", SqlType::Integer),
        ColumnDef::optional("width", SqlType::Integer),
        ColumnDef::optional("height", SqlType::Integer),
        ColumnDef::optional("file_name", SqlType::Text),
        ColumnDef::optional("file_size", SqlType::Real),
        ColumnDef::optional("comments", SqlType::Text),
        ColumnDef {
            default: Some("1"),
            ..ColumnDef::required("active", SqlType::Integer)
        },
        ColumnDef::required("created", SqlType::Integer),
    ],
};

/// Index backing the slide -> scenes lookup
pub const SLIDE_CZI_TO_TIF_SLIDE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_slide_czi_to_tif_slide_id ON slide_czi_to_tif(slide_id)";
