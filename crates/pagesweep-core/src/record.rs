//! Data model: collection and page identities, raw payloads, parsed records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifies one logical paginated data set (e.g. a province id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionKey(String);

impl CollectionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CollectionKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// (collection, page number). Page numbers start at 1.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    collection: CollectionKey,
    page: u32,
}

impl PageKey {
    /// Returns `None` for page 0.
    pub fn new(collection: CollectionKey, page: u32) -> Option<Self> {
        (page >= 1).then_some(Self { collection, page })
    }

    /// The first page of a collection.
    pub fn first(collection: CollectionKey) -> Self {
        Self {
            collection,
            page: 1,
        }
    }

    pub fn collection(&self) -> &CollectionKey {
        &self.collection
    }

    pub fn page(&self) -> u32 {
        self.page
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.collection, self.page)
    }
}

/// Raw page payload as returned by the transport. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage(Arc<str>);

impl RawPage {
    pub fn new(body: impl Into<Arc<str>>) -> Self {
        Self(body.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RawPage {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for RawPage {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// One parsed row of a page.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Record {
    /// Source-provided ordinal ("STT" column); kept verbatim.
    pub ordinal: String,
    pub date: String,
    pub image: Option<String>,
    pub name: String,
    pub link: Option<String>,
    pub document: Option<String>,
}

impl Record {
    /// A record is kept only when it has a non-blank name.
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

/// Whether an aggregation saw every page it attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Completeness {
    Complete,
    /// At least one page after the first was abandoned on a transport error.
    Partial,
}

/// Ordered records for one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationResult {
    pub key: CollectionKey,
    pub records: Arc<[Record]>,
    pub completeness: Completeness,
}

impl AggregationResult {
    pub fn empty(key: CollectionKey) -> Self {
        Self {
            key,
            records: Arc::from(Vec::new()),
            completeness: Completeness::Complete,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_complete(&self) -> bool {
        self.completeness == Completeness::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_zero_rejected() {
        assert!(PageKey::new(CollectionKey::new("1"), 0).is_none());
        let key = PageKey::new(CollectionKey::new("1"), 3).unwrap();
        assert_eq!(key.page(), 3);
        assert_eq!(key.to_string(), "1#3");
    }

    #[test]
    fn blank_name_is_invalid() {
        let mut r = Record {
            name: "   ".into(),
            ..Record::default()
        };
        assert!(!r.is_valid());
        r.name = "Bệnh viện A".into();
        assert!(r.is_valid());
    }

    #[test]
    fn record_json_uses_null_for_missing_links() {
        let r = Record {
            ordinal: "1".into(),
            name: "A".into(),
            link: Some("https://a.example".into()),
            ..Record::default()
        };
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["name"], "A");
        assert_eq!(v["link"], "https://a.example");
        assert!(v["document"].is_null());
        assert_eq!(serde_json::to_value(Completeness::Partial).unwrap(), "partial");
    }
}
