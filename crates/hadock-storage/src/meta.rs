// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! XML metadata sidecars for image records.

use chrono::SecondsFormat;
use hadock::Record;

/// Render the `<metadata>` sidecar document of an image record. Returns
/// `None` for tables.
pub(crate) fn image_metadata(rec: &Record) -> Option<String> {
    let Record::Image { vmu, idh, .. } = rec else {
        return None;
    };
    let px = idh.pixels();
    let roi = idh.region();
    let scale = idh.scaling();

    let mut doc = String::with_capacity(512);
    doc.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    doc.push_str(&format!(
        "<metadata mark=\"{}\" vmu=\"{}\">\n",
        idh.version(),
        vmu.timestamp().to_rfc3339_opts(SecondsFormat::Millis, true)
    ));
    doc.push_str("\t<idh>\n");
    // v1 headers carry no FCC; the tag is omitted.
    if let Some(fcc) = rec.fcc() {
        doc.push_str(&format!(
            "\t\t<fcc>{}</fcc>\n",
            escape(&String::from_utf8_lossy(&fcc))
        ));
    }
    doc.push_str(&format!("\t\t<sequence>{}</sequence>\n", rec.sequence()));
    doc.push_str(&format!(
        "\t\t<acquisition>{}</acquisition>\n",
        idh.acquisition()
            .to_utc()
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    ));
    doc.push_str(&format!(
        "\t\t<pixels x=\"{}\" y=\"{}\"/>\n",
        px.x, px.y
    ));
    doc.push_str(&format!(
        "\t\t<region x=\"{}\" y=\"{}\" w=\"{}\" h=\"{}\"/>\n",
        roi.x, roi.y, roi.w, roi.h
    ));
    doc.push_str(&format!("\t\t<dropping>{}</dropping>\n", idh.dropping()));
    doc.push_str(&format!(
        "\t\t<scaling x=\"{}\" y=\"{}\"/>\n",
        scale.x, scale.y
    ));
    doc.push_str(&format!("\t\t<ratio>{}</ratio>\n", idh.ratio()));
    if let Some(upi) = rec.upi() {
        doc.push_str(&format!("\t\t<upi>{}</upi>\n", escape(&upi)));
    }
    doc.push_str("\t</idh>\n");
    doc.push_str("</metadata>\n");
    Some(doc)
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use hadock::record::{Geometry, Idh, IdhV1, IdhV2, Sdh, SdhV2, VmuHeader};

    #[test]
    fn test_table_has_no_metadata() {
        let rec = Record::Table {
            vmu: VmuHeader::default(),
            sdh: Sdh::V2(SdhV2::default()),
            body: Vec::new(),
            valid: true,
        };
        assert!(image_metadata(&rec).is_none());
    }

    #[test]
    fn test_image_metadata_fields() {
        let mut info = [0u8; 32];
        info[..3].copy_from_slice(b"A&B");
        let rec = Record::Image {
            vmu: VmuHeader {
                channel: 1,
                source: 1,
                sequence: 9,
                coarse: 0,
                fine: 0,
            },
            idh: Idh::V2(IdhV2 {
                id: u32::from_be_bytes(*b"JPEG"),
                pixels: Geometry { x: 320, y: 200 },
                info,
                ..IdhV2::default()
            }),
            body: Vec::new(),
            valid: true,
        };

        let doc = image_metadata(&rec).expect("metadata");
        assert!(doc.contains("mark=\"2\""));
        assert!(doc.contains("<fcc>JPEG</fcc>"));
        assert!(doc.contains("<sequence>9</sequence>"));
        assert!(doc.contains("<pixels x=\"320\" y=\"200\"/>"));
        assert!(doc.contains("<upi>A&amp;B</upi>"));
    }

    #[test]
    fn test_v1_image_metadata_has_no_fcc() {
        let rec = Record::Image {
            vmu: VmuHeader {
                channel: 1,
                source: 1,
                sequence: 3,
                coarse: 0,
                fine: 0,
            },
            idh: Idh::V1(IdhV1 {
                pixels: Geometry { x: 64, y: 64 },
                ..IdhV1::default()
            }),
            body: Vec::new(),
            valid: true,
        };

        let doc = image_metadata(&rec).expect("metadata");
        assert!(doc.contains("mark=\"1\""));
        assert!(!doc.contains("<fcc>"));
        assert!(doc.contains("<pixels x=\"64\" y=\"64\"/>"));
    }
}
