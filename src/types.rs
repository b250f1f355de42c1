/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Scalar types shared across the merger: timestamps, node kinds, sync
//! status, and the canonical root GUIDs (spec §3).

use crate::guid::Guid;
use lazy_static::lazy_static;
use serde::de::{self, Deserialize, Deserializer, Visitor};
use serde::ser::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Typesafe way to manage server timestamps without accidentally mixing them
/// up with local ones. Millisecond precision; serialised on the wire as
/// fractional seconds, matching this codebase's `sync15::ServerTimestamp`.
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Default)]
pub struct ServerTimestamp(pub i64);

impl From<i64> for ServerTimestamp {
    #[inline]
    fn from(ts: i64) -> Self {
        ServerTimestamp(ts)
    }
}

impl ServerTimestamp {
    /// Returns `None` if `other` is later than `self` (a `Duration` can't
    /// represent negative timespans).
    #[inline]
    pub fn duration_since(self, other: ServerTimestamp) -> Option<Duration> {
        let delta = self.0 - other.0;
        if delta < 0 {
            None
        } else {
            Some(Duration::from_millis(delta as u64))
        }
    }

    #[inline]
    pub fn as_millis(self) -> i64 {
        self.0
    }
}

impl Serialize for ServerTimestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(self.0 as f64 / 1000.0)
    }
}

impl<'de> Deserialize<'de> for ServerTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TimestampVisitor;

        impl<'de> Visitor<'de> for TimestampVisitor {
            type Value = ServerTimestamp;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a 64 bit float number value")
            }

            fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(ServerTimestamp((value * 1000.0).round() as i64))
            }
        }

        deserializer.deserialize_f64(TimestampVisitor)
    }
}

/// Local wall-clock milliseconds, recorded on LOCAL rows at the time of
/// change (spec §6).
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Eq, Ord, Default, Hash)]
pub struct Timestamp(pub i64);

impl Timestamp {
    #[inline]
    pub fn duration_since(self, other: Timestamp) -> Option<Duration> {
        let delta = self.0 - other.0;
        if delta < 0 {
            None
        } else {
            Some(Duration::from_millis(delta as u64))
        }
    }
}

/// `sync_status` column values for LOCAL rows (spec §6).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SyncStatus {
    Synced,
    New,
    Changed,
}

/// The bookmark node type sum (spec §3).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Bookmark,
    Folder,
    Separator,
    DynamicContainer,
    Livemark,
    Query,
}

impl NodeKind {
    /// Only `Folder` (and the legacy `DynamicContainer`) nodes may have
    /// children; everything else is a leaf for tree-building purposes.
    pub fn is_folder(self) -> bool {
        matches!(self, NodeKind::Folder | NodeKind::DynamicContainer)
    }
}

/// Special GUIDs associated with bookmark roots. It's guaranteed that the
/// roots always have these GUIDs (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Hash)]
pub enum RootGuid {
    Root,
    Menu,
    Toolbar,
    Unfiled,
    Mobile,
    /// Never persisted or transmitted; may appear in internal tree views
    /// representing the device-level ancestor of the four synced roots.
    Desktop,
}

lazy_static! {
    static ref ROOT_GUIDS: [(RootGuid, &'static str); 6] = [
        (RootGuid::Root, "root________"),
        (RootGuid::Menu, "menu________"),
        (RootGuid::Toolbar, "toolbar_____"),
        (RootGuid::Unfiled, "unfiled_____"),
        (RootGuid::Mobile, "mobile______"),
        (RootGuid::Desktop, "desktop_____"),
    ];
}

impl RootGuid {
    pub fn as_str(self) -> &'static str {
        ROOT_GUIDS.iter().find(|(r, _)| *r == self).unwrap().1
    }

    pub fn as_guid(self) -> Guid {
        Guid::from(self.as_str())
    }

    pub fn from_guid(guid: &Guid) -> Option<Self> {
        ROOT_GUIDS
            .iter()
            .find(|(_, s)| guid == *s)
            .map(|(r, _)| *r)
    }

    /// The root's four canonical children, in canonical order (spec §3).
    pub fn user_roots() -> [RootGuid; 4] {
        [
            RootGuid::Menu,
            RootGuid::Toolbar,
            RootGuid::Unfiled,
            RootGuid::Mobile,
        ]
    }

    /// Historical short names (`places`, `root`, `mobile`, `menu`,
    /// `toolbar`, `unfiled`) used by older clients/records, mapped to the
    /// canonical 12-char GUID form. `root` and `places` both map to `Root`.
    fn from_short_name(name: &str) -> Option<Self> {
        Some(match name {
            "places" | "root" => RootGuid::Root,
            "menu" => RootGuid::Menu,
            "toolbar" => RootGuid::Toolbar,
            "unfiled" => RootGuid::Unfiled,
            "mobile" => RootGuid::Mobile,
            _ => return None,
        })
    }
}

/// Normalises a `guid` or `parentID` field on ingress: historical short
/// names become the canonical extended GUID; anything else passes through
/// unchanged. Applied to every incoming record kind (spec §4.A).
pub fn normalize_root_guid(raw: &str) -> Guid {
    match RootGuid::from_short_name(raw) {
        Some(root) => root.as_guid(),
        None => Guid::from(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_timestamp_duration_since() {
        let t0 = ServerTimestamp(10_300_150);
        let t1 = ServerTimestamp(10_100_050);
        assert!(t1.duration_since(t0).is_none());
        assert!(t0.duration_since(t1).is_some());
    }

    #[test]
    fn test_server_timestamp_serde() {
        let ts = ServerTimestamp(123_456);
        let ser = serde_json::to_string(&ts).unwrap();
        assert_eq!("123.456".to_string(), ser);
        let de: ServerTimestamp = serde_json::from_str(&ser).unwrap();
        assert_eq!(ts, de);
    }

    #[test]
    fn test_root_guid_round_trip() {
        for root in &[
            RootGuid::Root,
            RootGuid::Menu,
            RootGuid::Toolbar,
            RootGuid::Unfiled,
            RootGuid::Mobile,
        ] {
            let guid = root.as_guid();
            assert_eq!(RootGuid::from_guid(&guid), Some(*root));
        }
    }

    #[test]
    fn test_normalize_short_names() {
        assert_eq!(normalize_root_guid("places"), RootGuid::Root.as_guid());
        assert_eq!(normalize_root_guid("root"), RootGuid::Root.as_guid());
        assert_eq!(normalize_root_guid("mobile"), RootGuid::Mobile.as_guid());
        assert_eq!(normalize_root_guid("toolbar"), RootGuid::Toolbar.as_guid());
        assert_eq!(
            normalize_root_guid("abcdabcdabcd"),
            Guid::from("abcdabcdabcd")
        );
    }

    #[test]
    fn test_user_roots_canonical_order() {
        let roots = RootGuid::user_roots();
        assert_eq!(
            roots.iter().map(|r| r.as_str()).collect::<Vec<_>>(),
            vec!["menu________", "toolbar_____", "unfiled_____", "mobile______"]
        );
    }
}
