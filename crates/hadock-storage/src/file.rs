// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One file per record, with link mirrors and XML sidecars.

use crate::meta;
use crate::planner::{DirPlanner, Epoch};
use crate::share::Share;
use crate::{Control, Options, Storage, StoreError};
use hadock::Record;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const BAD: &str = ".bad";
pub const XML: &str = ".xml";

/// Encoding of stored record files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    Raw,
    #[default]
    Full,
}

impl Format {
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "raw" => Ok(Self::Raw),
            "" | "full" => Ok(Self::Full),
            other => Err(StoreError::UnknownFormat(other.to_string())),
        }
    }
}

/// File-per-record sink.
pub struct FileStore {
    control: Control,
    data: DirPlanner,
    shares: Vec<Share>,
    format: Format,
    keep_bad: bool,
}

impl FileStore {
    pub fn new(opts: &Options) -> Result<Self, StoreError> {
        let data = DirPlanner::new(
            opts.location.clone(),
            opts.levels.clone(),
            Epoch::parse(&opts.epoch),
            opts.interval,
        )?;
        let shares = opts
            .shares
            .iter()
            .map(|s| Share::new(s, opts.interval))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            control: opts.control.clone(),
            data,
            shares,
            format: Format::parse(&opts.format)?,
            keep_bad: opts.keep_bad,
        })
    }

    /// Artifact name and stale counterpart name of a record.
    fn names(&self, rec: &Record) -> (String, Option<String>) {
        let base = rec.filename();
        if rec.is_valid() {
            let counterpart = (!self.keep_bad).then(|| format!("{}{}", base, BAD));
            (base, counterpart)
        } else {
            let name = format!("{}{}", base, BAD);
            let counterpart = (!self.keep_bad).then_some(base);
            (name, counterpart)
        }
    }

    fn write_artifact(
        &self,
        dir: &Path,
        name: &str,
        counterpart: Option<&str>,
        bytes: &[u8],
        instance: u8,
        rec: &Record,
    ) -> Result<PathBuf, StoreError> {
        if let Some(c) = counterpart {
            let _ = fs::remove_file(dir.join(c));
        }
        let path = dir.join(name);
        write_atomic(&path, bytes)?;
        for share in &self.shares {
            share.link(&path, counterpart, instance, rec)?;
        }
        Ok(path)
    }
}

impl Storage for FileStore {
    fn store(&self, instance: u8, rec: &Record) -> Result<(), StoreError> {
        if !self.control.accepts(rec) {
            return Ok(());
        }
        let mut buf = Vec::with_capacity(rec.body().len() + 64);
        match self.format {
            Format::Raw => rec.export_raw(&mut buf)?,
            Format::Full => rec.export(&mut buf)?,
        }

        let dir = self.data.prepare(instance, rec)?;
        let (name, counterpart) = self.names(rec);
        self.write_artifact(&dir, &name, counterpart.as_deref(), &buf, instance, rec)?;

        if let Some(doc) = meta::image_metadata(rec) {
            let xml_name = format!("{}{}", name, XML);
            let xml_counterpart = counterpart.map(|c| format!("{}{}", c, XML));
            self.write_artifact(
                &dir,
                &xml_name,
                xml_counterpart.as_deref(),
                doc.as_bytes(),
                instance,
                rec,
            )?;
        }
        Ok(())
    }
}

/// Write through a temporary name in the same directory, then rename
/// into place.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hadock::record::{Idh, IdhV1, IdhV2, Sdh, SdhV2, VmuHeader, PROP_REALTIME};

    fn image(valid: bool) -> Record {
        Record::Image {
            vmu: VmuHeader {
                channel: 1,
                source: 0x2f,
                sequence: 42,
                coarse: 1000,
                fine: 5,
            },
            idh: Idh::V2(IdhV2 {
                properties: PROP_REALTIME,
                id: u32::from_be_bytes(*b"Y800"),
                ..IdhV2::default()
            }),
            body: vec![7; 16],
            valid,
        }
    }

    fn table() -> Record {
        Record::Table {
            vmu: VmuHeader {
                channel: 3,
                source: 0x30,
                sequence: 1,
                coarse: 1000,
                fine: 0,
            },
            sdh: Sdh::V2(SdhV2::default()),
            body: vec![1, 2, 3],
            valid: true,
        }
    }

    fn store_at(dir: &Path, shares: Vec<crate::ShareOptions>) -> FileStore {
        FileStore::new(&Options {
            scheme: "file".into(),
            location: dir.display().to_string(),
            levels: vec!["source".into()],
            format: "full".into(),
            shares,
            ..Options::default()
        })
        .expect("file store")
    }

    #[test]
    fn test_store_writes_file_and_sidecar() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fs_store = store_at(dir.path(), Vec::new());

        fs_store.store(255, &image(true)).expect("store");

        let base = dir.path().join("2f");
        assert!(base.join("2f_42_1000_5").is_file());
        let xml = fs::read_to_string(base.join("2f_42_1000_5.xml")).expect("sidecar");
        assert!(xml.contains("<fcc>Y800</fcc>"));
    }

    #[test]
    fn test_table_has_no_sidecar() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fs_store = store_at(dir.path(), Vec::new());

        fs_store.store(255, &table()).expect("store");

        let base = dir.path().join("30");
        assert!(base.join("30_1_1000_0").is_file());
        assert!(!base.join("30_1_1000_0.xml").exists());
    }

    #[test]
    fn test_bad_record_gets_suffix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fs_store = store_at(dir.path(), Vec::new());

        fs_store.store(255, &image(false)).expect("store");

        let base = dir.path().join("2f");
        assert!(base.join("2f_42_1000_5.bad").is_file());
        assert!(!base.join("2f_42_1000_5").exists());
    }

    #[test]
    fn test_good_write_removes_bad_counterpart() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fs_store = store_at(dir.path(), Vec::new());

        fs_store.store(255, &image(false)).expect("store bad");
        fs_store.store(255, &image(true)).expect("store good");

        let base = dir.path().join("2f");
        assert!(base.join("2f_42_1000_5").is_file());
        assert!(!base.join("2f_42_1000_5.bad").exists());
        assert!(!base.join("2f_42_1000_5.bad.xml").exists());
    }

    #[test]
    fn test_share_mirror_receives_link() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mirror = tempfile::tempdir().expect("tempdir");
        let fs_store = store_at(
            dir.path(),
            vec![crate::ShareOptions {
                location: mirror.path().display().to_string(),
                levels: vec!["source".into()],
                epoch: String::new(),
                link: "hard".into(),
            }],
        );

        fs_store.store(255, &image(true)).expect("store");

        let mirrored = mirror.path().join("2f").join("2f_42_1000_5");
        assert!(mirrored.is_file());
        let mirrored_xml = mirror.path().join("2f").join("2f_42_1000_5.xml");
        assert!(mirrored_xml.is_file());
    }

    #[test]
    fn test_raw_format() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fs_store = FileStore::new(&Options {
            scheme: "file".into(),
            location: dir.path().display().to_string(),
            levels: vec!["source".into()],
            format: "raw".into(),
            ..Options::default()
        })
        .expect("file store");

        fs_store.store(255, &image(true)).expect("store");

        let data = fs::read(dir.path().join("2f").join("2f_42_1000_5")).expect("read");
        assert_eq!(&data[..4], b"Y800");
    }

    #[test]
    fn test_raw_format_v1_image_is_bare_body() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fs_store = FileStore::new(&Options {
            scheme: "file".into(),
            location: dir.path().display().to_string(),
            levels: vec!["source".into()],
            format: "raw".into(),
            ..Options::default()
        })
        .expect("file store");

        let rec = Record::Image {
            vmu: VmuHeader {
                channel: 1,
                source: 0x2f,
                sequence: 5,
                coarse: 1000,
                fine: 0,
            },
            idh: Idh::V1(IdhV1::default()),
            body: vec![9; 8],
            valid: true,
        };
        fs_store.store(255, &rec).expect("store");

        let data = fs::read(dir.path().join("2f").join("2f_5_1000_0")).expect("read");
        assert_eq!(data, vec![9; 8]);

        // The v1 sidecar is still written, without an FCC tag.
        let xml = fs::read_to_string(dir.path().join("2f").join("2f_5_1000_0.xml"))
            .expect("sidecar");
        assert!(!xml.contains("<fcc>"));
    }

    #[test]
    fn test_control_filter_skips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fs_store = FileStore::new(&Options {
            scheme: "file".into(),
            location: dir.path().display().to_string(),
            levels: vec!["source".into()],
            control: Control {
                kind: "origin".into(),
                accept: vec!["ff".into()],
                reject: Vec::new(),
            },
            ..Options::default()
        })
        .expect("file store");

        fs_store.store(255, &image(true)).expect("store");
        assert!(!dir.path().join("2f").exists());
    }
}
