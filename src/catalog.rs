use {
    serde::{Deserialize, Deserializer},
    std::{fs, io, path::Path},
};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("unable to read catalog: {0}")]
    Io(#[from] io::Error),

    #[error("unable to parse catalog: {0}")]
    Json(#[from] serde_json::Error),
}

/// One purchasable application.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct CatalogEntry {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,

    #[serde(default)]
    pub package_name: Option<String>,

    pub name: String,

    #[serde(default)]
    pub download_url: Option<String>,
}

impl CatalogEntry {
    /// The download URL, unless it is missing or blank.
    pub fn download_url(&self) -> Option<&str> {
        self.download_url.as_deref().filter(|url| !url.is_empty())
    }
}

// Catalog files in the wild carry both `"id": "42"` and `"id": 42`.
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Integer(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Integer(number) => number.to_string(),
    })
}

/// Ordered, read-only list of applications, loaded once before serving.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path)?;

        Ok(Self::from_entries(serde_json::from_str(&raw)?))
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry whose id or package name equals `product_id`.
    ///
    /// Both keys are checked per entry, so an earlier entry matching on its
    /// package name wins over a later one matching on its id. Duplicated keys
    /// are not rejected; the first one simply shadows the rest.
    pub fn find(&self, product_id: &str) -> Option<&CatalogEntry> {
        if product_id.is_empty() {
            return None;
        }

        self.entries.iter().find(|entry| {
            entry.id == product_id || entry.package_name.as_deref() == Some(product_id)
        })
    }
}
