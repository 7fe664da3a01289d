// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-sink accept/reject filtering.

use hadock::record::channel_name;
use hadock::Record;
use serde::Deserialize;

/// Accept/reject filter applied by every sink before acting.
///
/// The filter subject is the record channel name or its origin, selected
/// by `type`. Empty accept and reject lists accept everything; otherwise
/// a record passes when the subject is accept-listed, or when the accept
/// list is empty and the subject is not reject-listed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Control {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub accept: Vec<String>,
    #[serde(default)]
    pub reject: Vec<String>,
}

impl Control {
    pub fn accepts(&self, rec: &Record) -> bool {
        let subject = match self.kind.as_str() {
            "" | "channel" => channel_name(rec.channel()).to_string(),
            "origin" | "source" => rec.origin(),
            _ => return false,
        };
        if self.accept.is_empty() && self.reject.is_empty() {
            return true;
        }
        if !self.accept.is_empty() {
            return self.accept.iter().any(|v| *v == subject);
        }
        !self.reject.iter().any(|v| *v == subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hadock::record::{Sdh, SdhV2, VmuHeader};

    fn table(source: u8) -> Record {
        Record::Table {
            vmu: VmuHeader {
                channel: 3,
                source,
                sequence: 0,
                coarse: 0,
                fine: 0,
            },
            sdh: Sdh::V2(SdhV2::default()),
            body: Vec::new(),
            valid: true,
        }
    }

    #[test]
    fn test_empty_filter_accepts_all() {
        let c = Control::default();
        assert!(c.accepts(&table(0x2f)));
    }

    #[test]
    fn test_origin_accept_list() {
        let c = Control {
            kind: "origin".into(),
            accept: vec!["2f".into()],
            reject: Vec::new(),
        };
        assert!(c.accepts(&table(0x2f)));
        assert!(!c.accepts(&table(0x30)));
    }

    #[test]
    fn test_origin_reject_list() {
        let c = Control {
            kind: "origin".into(),
            accept: Vec::new(),
            reject: vec!["30".into()],
        };
        assert!(c.accepts(&table(0x2f)));
        assert!(!c.accepts(&table(0x30)));
    }

    #[test]
    fn test_accept_list_overrides_reject() {
        // With a non-empty accept list, only membership there counts.
        let c = Control {
            kind: "origin".into(),
            accept: vec!["2f".into()],
            reject: vec!["2f".into()],
        };
        assert!(c.accepts(&table(0x2f)));
        assert!(!c.accepts(&table(0x31)));
    }

    #[test]
    fn test_channel_filter() {
        let c = Control {
            kind: "channel".into(),
            accept: vec!["science".into()],
            reject: Vec::new(),
        };
        assert!(c.accepts(&table(0)));
    }

    #[test]
    fn test_unknown_kind_rejects() {
        let c = Control {
            kind: "mystery".into(),
            accept: Vec::new(),
            reject: Vec::new(),
        };
        assert!(!c.accepts(&table(0)));
    }
}
