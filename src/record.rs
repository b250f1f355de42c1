/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The record model (spec §3, §4.A, §6.1): the wire-shaped
//! `BookmarkItemRecord` sum used to decode/encode server payloads, and the
//! canonical `MirrorItem` value record the tree builder and merger actually
//! work with.

use crate::error::*;
use crate::guid::Guid;
use crate::types::{normalize_root_guid, NodeKind, ServerTimestamp};
use serde::{Deserialize, Deserializer};
use serde_derive::*;

/// Rejects a URI field that isn't a well-formed absolute URL, rather than
/// carrying garbage through the merge. Malformed URIs are dropped (logged,
/// not fatal) instead of failing the whole record: a bad `bmkUri` shouldn't
/// block syncing the bookmark's title or position.
fn validate_url(raw: Option<String>) -> Option<String> {
    raw.and_then(|s| match url::Url::parse(&s) {
        Ok(_) => Some(s),
        Err(e) => {
            log::warn!("dropping malformed URL {:?}: {}", s, e);
            None
        }
    })
}

/// All possible fields that can appear in a bookmark record on the wire.
/// Deserialised once into this untagged struct, then dispatched by `type`
/// into a specific variant of `BookmarkItemRecord`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBookmarkItem {
    #[serde(rename = "id")]
    guid: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "parentid")]
    parent_guid: Option<String>,
    has_dupe: Option<bool>,
    parent_name: Option<String>,

    // For bookmarks, queries, folders, and livemarks.
    title: Option<String>,
    description: Option<String>,

    // For bookmarks and queries.
    #[serde(rename = "bmkUri")]
    url: Option<String>,

    // For bookmarks only.
    keyword: Option<String>,
    tags: Option<Vec<String>>,

    // For queries only.
    folder_name: Option<String>,
    #[serde(rename = "queryId")]
    query_id: Option<String>,

    // For folders only.
    children: Option<Vec<String>>,

    // For livemarks only.
    #[serde(rename = "feedUri")]
    feed_uri: Option<String>,
    #[serde(rename = "siteUri")]
    site_uri: Option<String>,

    // For separators only.
    #[serde(rename = "pos")]
    position: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookmarkRecord {
    pub guid: Guid,
    pub parent_guid: Option<Guid>,
    pub has_dupe: bool,
    pub parent_name: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub keyword: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRecord {
    pub guid: Guid,
    pub parent_guid: Option<Guid>,
    pub has_dupe: bool,
    pub parent_name: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub folder_name: Option<String>,
    pub query_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FolderRecord {
    pub guid: Guid,
    pub parent_guid: Option<Guid>,
    pub has_dupe: bool,
    pub parent_name: Option<String>,
    pub title: Option<String>,
    pub children: Vec<Guid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LivemarkRecord {
    pub guid: Guid,
    pub parent_guid: Option<Guid>,
    pub has_dupe: bool,
    pub parent_name: Option<String>,
    pub title: Option<String>,
    pub feed_uri: Option<String>,
    pub site_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeparatorRecord {
    pub guid: Guid,
    pub parent_guid: Option<Guid>,
    pub has_dupe: bool,
    pub parent_name: Option<String>,
    // Not used on newer clients, but can be used to detect parent-child
    // position disagreements. Older clients use this for deduping.
    pub position: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BookmarkItemRecord {
    Tombstone(Guid),
    Bookmark(BookmarkRecord),
    Query(QueryRecord),
    Folder(FolderRecord),
    Livemark(LivemarkRecord),
    Separator(SeparatorRecord),
}

impl BookmarkItemRecord {
    pub fn guid(&self) -> &Guid {
        match self {
            BookmarkItemRecord::Tombstone(guid) => guid,
            BookmarkItemRecord::Bookmark(b) => &b.guid,
            BookmarkItemRecord::Query(q) => &q.guid,
            BookmarkItemRecord::Folder(f) => &f.guid,
            BookmarkItemRecord::Livemark(l) => &l.guid,
            BookmarkItemRecord::Separator(s) => &s.guid,
        }
    }

    pub fn from_json(data: &str) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_str(data)?;
        if raw
            .get("deleted")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
        {
            let guid = raw
                .get("id")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default();
            return Ok(BookmarkItemRecord::Tombstone(normalize_root_guid(guid)));
        }
        serde_json::from_value(raw).map_err(Into::into)
    }
}

impl<'de> Deserialize<'de> for BookmarkItemRecord {
    fn deserialize<D>(d: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawBookmarkItem::deserialize(d)?;
        let guid = normalize_root_guid(&raw.guid);
        let parent_guid = raw.parent_guid.as_deref().map(normalize_root_guid);
        let has_dupe = raw.has_dupe.unwrap_or(false);
        Ok(match raw.kind.as_str() {
            "bookmark" => BookmarkItemRecord::Bookmark(BookmarkRecord {
                guid,
                parent_guid,
                has_dupe,
                parent_name: raw.parent_name,
                title: raw.title,
                description: raw.description,
                url: validate_url(raw.url),
                keyword: raw.keyword,
                tags: raw.tags.unwrap_or_default(),
            }),
            "query" => BookmarkItemRecord::Query(QueryRecord {
                guid,
                parent_guid,
                has_dupe,
                parent_name: raw.parent_name,
                title: raw.title,
                url: validate_url(raw.url),
                folder_name: raw.folder_name,
                query_id: raw.query_id,
            }),
            "folder" => BookmarkItemRecord::Folder(FolderRecord {
                guid,
                parent_guid,
                has_dupe,
                parent_name: raw.parent_name,
                title: raw.title,
                children: raw
                    .children
                    .unwrap_or_default()
                    .iter()
                    .map(|c| normalize_root_guid(c))
                    .collect(),
            }),
            "livemark" => BookmarkItemRecord::Livemark(LivemarkRecord {
                guid,
                parent_guid,
                has_dupe,
                parent_name: raw.parent_name,
                title: raw.title,
                feed_uri: validate_url(raw.feed_uri),
                site_uri: validate_url(raw.site_uri),
            }),
            "separator" => BookmarkItemRecord::Separator(SeparatorRecord {
                guid,
                parent_guid,
                has_dupe,
                parent_name: raw.parent_name,
                position: raw.position,
            }),
            other => {
                return Err(serde::de::Error::custom(format!(
                    "unsupported bookmark record type {:?}",
                    other
                )))
            }
        })
    }
}

/// The canonical per-node value record (spec §3 "Mirror item"). This is what
/// the tree builder and merger actually compare and carry around; wire
/// records (above) are normalised into this shape on ingress.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorItem {
    pub guid: Guid,
    pub kind: NodeKind,
    pub server_modified: Option<ServerTimestamp>,
    pub is_deleted: bool,
    pub has_dupe: bool,
    pub parent_id: Option<Guid>,
    pub parent_name: Option<String>,
    pub feed_uri: Option<String>,
    pub site_uri: Option<String>,
    pub pos: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub bookmark_uri: Option<String>,
    pub tags: Vec<String>,
    pub keyword: Option<String>,
    pub folder_name: Option<String>,
    pub query_id: Option<String>,
    /// Ordered child GUIDs; only meaningful for folders.
    pub children: Vec<Guid>,

    // Internal metadata: excluded from `sameAs`.
    pub favicon_id: Option<i64>,
    pub local_modified: Option<crate::types::Timestamp>,
    pub sync_status: Option<crate::types::SyncStatus>,
}

impl MirrorItem {
    pub fn new_folder(guid: Guid, title: Option<String>, children: Vec<Guid>) -> Self {
        MirrorItem {
            guid,
            kind: NodeKind::Folder,
            server_modified: None,
            is_deleted: false,
            has_dupe: false,
            parent_id: None,
            parent_name: None,
            feed_uri: None,
            site_uri: None,
            pos: None,
            title,
            description: None,
            bookmark_uri: None,
            tags: Vec::new(),
            keyword: None,
            folder_name: None,
            query_id: None,
            children,
            favicon_id: None,
            local_modified: None,
            sync_status: None,
        }
    }

    /// A minimal record representing an outgoing tombstone (spec §6:
    /// `{ id, deleted: true, type }` on the wire). `kind` is meaningless for
    /// a tombstone and carried only because the struct has nowhere else to
    /// put "no type".
    pub fn tombstone(guid: Guid) -> Self {
        MirrorItem {
            guid,
            kind: NodeKind::Bookmark,
            server_modified: None,
            is_deleted: true,
            has_dupe: false,
            parent_id: None,
            parent_name: None,
            feed_uri: None,
            site_uri: None,
            pos: None,
            title: None,
            description: None,
            bookmark_uri: None,
            tags: Vec::new(),
            keyword: None,
            folder_name: None,
            query_id: None,
            children: Vec::new(),
            favicon_id: None,
            local_modified: None,
            sync_status: None,
        }
    }

    pub fn new_bookmark(guid: Guid, title: Option<String>, url: Option<String>) -> Self {
        MirrorItem {
            guid,
            kind: NodeKind::Bookmark,
            server_modified: None,
            is_deleted: false,
            has_dupe: false,
            parent_id: None,
            parent_name: None,
            feed_uri: None,
            site_uri: None,
            pos: None,
            title,
            description: None,
            bookmark_uri: url,
            tags: Vec::new(),
            keyword: None,
            folder_name: None,
            query_id: None,
            children: Vec::new(),
            favicon_id: None,
            local_modified: None,
            sync_status: None,
        }
    }

    /// Semantic equality (spec §3): every value field matches AND child-GUID
    /// lists match element-wise. Ignores the GUID itself and internal
    /// metadata (`favicon_id`, `local_modified`, `sync_status`). This is the
    /// comparison used for duplicate-folder detection.
    pub fn same_as(&self, other: &MirrorItem) -> bool {
        self.kind == other.kind
            && self.is_deleted == other.is_deleted
            && self.has_dupe == other.has_dupe
            && self.parent_id == other.parent_id
            && self.parent_name == other.parent_name
            && self.feed_uri == other.feed_uri
            && self.site_uri == other.site_uri
            && self.pos == other.pos
            && self.title == other.title
            && self.description == other.description
            && self.bookmark_uri == other.bookmark_uri
            && self.tags == other.tags
            && self.keyword == other.keyword
            && self.folder_name == other.folder_name
            && self.query_id == other.query_id
            && self.children == other.children
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_bookmark() {
        let json = r#"{
            "id": "bookmarkguid",
            "type": "bookmark",
            "parentid": "menu",
            "title": "Example",
            "bmkUri": "https://example.com",
            "tags": ["a", "b"]
        }"#;
        let rec = BookmarkItemRecord::from_json(json).unwrap();
        match rec {
            BookmarkItemRecord::Bookmark(b) => {
                assert_eq!(b.guid, "bookmarkguid");
                assert_eq!(b.parent_guid.unwrap(), "menu________");
                assert_eq!(b.title.as_deref(), Some("Example"));
                assert_eq!(b.tags, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_decode_tombstone() {
        let json = r#"{"id": "deadbeef0000", "deleted": true}"#;
        let rec = BookmarkItemRecord::from_json(json).unwrap();
        assert_eq!(rec, BookmarkItemRecord::Tombstone(Guid::from("deadbeef0000")));
    }

    #[test]
    fn test_decode_folder_normalizes_children() {
        let json = r#"{
            "id": "root________",
            "type": "folder",
            "children": ["menu", "toolbar", "unfiled", "mobile"]
        }"#;
        let rec = BookmarkItemRecord::from_json(json).unwrap();
        match rec {
            BookmarkItemRecord::Folder(f) => {
                assert_eq!(
                    f.children,
                    vec![
                        Guid::from("menu________"),
                        Guid::from("toolbar_____"),
                        Guid::from("unfiled_____"),
                        Guid::from("mobile______"),
                    ]
                );
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn test_same_as_ignores_guid_and_metadata() {
        let mut a = MirrorItem::new_folder(Guid::from("aaaaaaaaaaaa"), Some("Empty".into()), vec![]);
        let mut b = MirrorItem::new_folder(Guid::from("bbbbbbbbbbbb"), Some("Empty".into()), vec![]);
        a.favicon_id = Some(1);
        b.favicon_id = Some(2);
        assert!(a.same_as(&b));

        b.title = Some("Different".into());
        assert!(!a.same_as(&b));
    }

    #[test]
    fn test_tombstone_is_marked_deleted() {
        let t = MirrorItem::tombstone(Guid::from("aaaaaaaaaaaa"));
        assert!(t.is_deleted);
        assert!(t.title.is_none());
    }

    #[test]
    fn test_malformed_bookmark_url_is_dropped_not_fatal() {
        let json = r#"{
            "id": "bookmarkguid",
            "type": "bookmark",
            "title": "Example",
            "bmkUri": "not a url"
        }"#;
        let rec = BookmarkItemRecord::from_json(json).unwrap();
        match rec {
            BookmarkItemRecord::Bookmark(b) => {
                assert_eq!(b.title.as_deref(), Some("Example"));
                assert!(b.url.is_none());
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }
}
