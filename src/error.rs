use rusqlite::ffi;
use thiserror::Error;

/// Extended result code for a STRICT-table datatype failure.
/// Not exported by every libsqlite3-sys binding.
const SQLITE_CONSTRAINT_DATATYPE: i32 = 3091;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("No row in {table} with id {id}")]
    NotFound { table: &'static str, id: i64 },

    #[error("Slide {slide_id} does not exist")]
    ReferentialIntegrity { slide_id: i64 },

    #[error("Incompatible value for column {column}: {detail}")]
    TypeConstraint { column: String, detail: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

impl CatalogError {
    /// Classify a failed write against `slide_czi_to_tif`.
    ///
    /// Foreign-key and datatype constraint failures become their own variants;
    /// anything else is passed through as a database error.
    pub(crate) fn from_write(err: rusqlite::Error, slide_id: i64) -> Self {
        if let rusqlite::Error::SqliteFailure(code, msg) = &err {
            if code.extended_code == ffi::SQLITE_CONSTRAINT_FOREIGNKEY {
                return CatalogError::ReferentialIntegrity { slide_id };
            }
            if code.extended_code == SQLITE_CONSTRAINT_DATATYPE {
                // "cannot store TEXT value in INTEGER column slide_czi_to_tif.width"
                return CatalogError::TypeConstraint {
                    column: msg
                        .as_deref()
                        .and_then(|m| m.rsplit(' ').next())
                        .unwrap_or("?")
                        .to_string(),
                    detail: msg.clone().unwrap_or_else(|| "datatype mismatch".into()),
                };
            }
        }
        CatalogError::from_read(err)
    }

    /// Classify a failed read, turning column conversion failures into
    /// `TypeConstraint`.
    pub(crate) fn from_read(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::InvalidColumnType(_, column, ty) => CatalogError::TypeConstraint {
                column,
                detail: format!("stored as {}", ty),
            },
            rusqlite::Error::FromSqlConversionFailure(idx, ty, e) => {
                CatalogError::TypeConstraint {
                    column: format!("#{}", idx),
                    detail: format!("cannot convert {}: {}", ty, e),
                }
            }
            rusqlite::Error::IntegralValueOutOfRange(idx, value) => {
                CatalogError::TypeConstraint {
                    column: format!("#{}", idx),
                    detail: format!("{} out of range", value),
                }
            }
            other => CatalogError::Database(other),
        }
    }
}
