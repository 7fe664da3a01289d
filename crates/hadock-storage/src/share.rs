// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Link mirrors: parallel directory trees pointing at primary artifacts.

use crate::planner::{DirPlanner, Epoch};
use crate::{ShareOptions, StoreError};
use hadock::Record;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkKind {
    #[default]
    Hard,
    Soft,
}

impl LinkKind {
    pub fn parse(s: &str) -> Self {
        match s {
            "soft" | "symbolic" => Self::Soft,
            _ => Self::Hard,
        }
    }
}

/// One mirror tree. After a primary write succeeds the artifact is
/// linked here under the mirror's own planned path.
pub struct Share {
    planner: DirPlanner,
    kind: LinkKind,
}

impl Share {
    pub fn new(opts: &ShareOptions, granularity: u64) -> Result<Self, StoreError> {
        let levels = if opts.levels.is_empty() {
            vec!["classic".to_string(), "acq".to_string()]
        } else {
            opts.levels.clone()
        };
        let planner = DirPlanner::new(
            opts.location.clone(),
            levels,
            Epoch::parse(&opts.epoch),
            granularity,
        )?;
        Ok(Self {
            planner,
            kind: LinkKind::parse(&opts.link),
        })
    }

    /// Link `primary` into the mirror tree. A pre-existing name is
    /// removed first, as is `counterpart` when given.
    pub fn link(
        &self,
        primary: &Path,
        counterpart: Option<&str>,
        instance: u8,
        rec: &Record,
    ) -> Result<(), StoreError> {
        let Some(name) = primary.file_name() else {
            return Ok(());
        };
        let dir = self.planner.prepare(instance, rec)?;
        let target = dir.join(name);
        let _ = fs::remove_file(&target);
        if let Some(c) = counterpart {
            let _ = fs::remove_file(dir.join(c));
        }
        match self.kind {
            LinkKind::Hard => fs::hard_link(primary, &target)?,
            LinkKind::Soft => symlink(primary, &target)?,
        }
        Ok(())
    }
}

#[cfg(unix)]
fn symlink(primary: &Path, target: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(primary, target)
}

#[cfg(not(unix))]
fn symlink(primary: &Path, target: &Path) -> std::io::Result<()> {
    std::fs::hard_link(primary, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hadock::record::{Sdh, SdhV2, VmuHeader};

    fn table() -> Record {
        Record::Table {
            vmu: VmuHeader {
                channel: 3,
                source: 0x2f,
                sequence: 4,
                coarse: 100,
                fine: 0,
            },
            sdh: Sdh::V2(SdhV2::default()),
            body: Vec::new(),
            valid: true,
        }
    }

    #[test]
    fn test_hard_link_mirror() {
        let primary_dir = tempfile::tempdir().expect("tempdir");
        let mirror_dir = tempfile::tempdir().expect("tempdir");

        let primary = primary_dir.path().join("2f_4_100_0");
        fs::write(&primary, b"data").expect("write primary");

        let opts = ShareOptions {
            location: mirror_dir.path().display().to_string(),
            levels: vec!["source".to_string()],
            epoch: String::new(),
            link: "hard".to_string(),
        };
        let share = Share::new(&opts, 0).expect("share");
        share
            .link(&primary, None, 255, &table())
            .expect("link");

        let linked = mirror_dir.path().join("2f").join("2f_4_100_0");
        assert_eq!(fs::read(&linked).expect("read link"), b"data");

        // Linking again replaces the existing name.
        share.link(&primary, None, 255, &table()).expect("relink");
        assert!(linked.exists());
    }

    #[test]
    fn test_counterpart_removed() {
        let primary_dir = tempfile::tempdir().expect("tempdir");
        let mirror_dir = tempfile::tempdir().expect("tempdir");

        let primary = primary_dir.path().join("2f_4_100_0");
        fs::write(&primary, b"good").expect("write primary");

        let opts = ShareOptions {
            location: mirror_dir.path().display().to_string(),
            levels: vec!["source".to_string()],
            epoch: String::new(),
            link: String::new(),
        };
        let share = Share::new(&opts, 0).expect("share");

        let dir = mirror_dir.path().join("2f");
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join("2f_4_100_0.bad"), b"stale").expect("write stale");

        share
            .link(&primary, Some("2f_4_100_0.bad"), 255, &table())
            .expect("link");
        assert!(!dir.join("2f_4_100_0.bad").exists());
        assert!(dir.join("2f_4_100_0").exists());
    }
}
