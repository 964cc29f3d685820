use std::fmt;

/// Object key of an artifact: `<prefix/>?<database>/<filename>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

pub fn normalize_prefix(prefix: &str) -> Option<String> {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl ObjectKey {
    pub fn new(prefix: Option<&str>, database: &str, filename: &str) -> Self {
        ObjectKey(format!("{}{}", Self::database_prefix(prefix, database), filename))
    }

    /// Listing prefix shared by every artifact of `database`, with a trailing slash.
    pub fn database_prefix(prefix: Option<&str>, database: &str) -> String {
        let database = database.trim_matches('/');
        match prefix.and_then(normalize_prefix) {
            Some(prefix) => format!("{}/{}/", prefix, database),
            None => format!("{}/", database),
        }
    }

    /// Artifact name of `key` within a database prefix; nested keys are not artifacts.
    pub fn artifact_name<'a>(database_prefix: &str, key: &'a str) -> Option<&'a str> {
        let name = key.strip_prefix(database_prefix)?;
        if name.is_empty() || name.contains('/') {
            None
        } else {
            Some(name)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
