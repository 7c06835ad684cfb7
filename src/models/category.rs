use serde::{Deserialize, Serialize};
use std::fmt;

/// A category as delivered by the remote endpoint.
///
/// Has no persistence identity until it is committed to the store by a
/// cache replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub high_res_image_url: String,
    pub low_res_image_url: String,
    pub path: String,
}

impl Category {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            high_res_image_url: String::new(),
            low_res_image_url: String::new(),
            path: String::new(),
        }
    }

    pub fn with_images(mut self, high_res: impl Into<String>, low_res: impl Into<String>) -> Self {
        self.high_res_image_url = high_res.into();
        self.low_res_image_url = low_res.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }
}

/// A category row as persisted in the local cache.
///
/// Default iteration order of the table is ascending `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CategoryRecord {
    pub id: i64,
    pub name: String,
    pub high_res_image_url: String,
    pub low_res_image_url: String,
    pub path: String,
}

impl From<Category> for CategoryRecord {
    fn from(c: Category) -> Self {
        Self {
            id: c.id,
            name: c.name,
            high_res_image_url: c.high_res_image_url,
            low_res_image_url: c.low_res_image_url,
            path: c.path,
        }
    }
}

impl fmt::Display for CategoryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.id, self.name)?;
        if !self.path.is_empty() {
            write!(f, " ({})", self.path)?;
        }
        Ok(())
    }
}
