// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! VMU payload decoding into typed records.
//!
//! Every HADOCK payload starts with a 15-byte VMU header (little-endian):
//!
//! ```text
//! channel u8 | source u8 | spare u16 | sequence u32 |
//! coarse u32 | fine u8 | spare u16
//! ```
//!
//! The channel selects the record variant (video channels carry images,
//! the science channel carries tables) and the VMU protocol version from
//! the frame selects the secondary header layout that follows: SDHv1/v2
//! for tables, IDHv1/v2 for images. The remaining bytes are the body.
//!
//! Records are named deterministically: `<origin>_<sequence>_<coarse>_<fine>`
//! where the origin is the source byte in lower-case hex.

use crate::checksum;
use crate::frame::PREAMBLE;
use crate::time::{self, Time5};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};
use std::io::{self, Cursor, Read, Write};
use thiserror::Error;

pub const VMU_HEADER_LEN: usize = 15;
pub const SDH_V1_LEN: usize = 8;
pub const SDH_V2_LEN: usize = 56;
pub const IDH_V1_LEN: usize = 72;
pub const IDH_V2_LEN: usize = 76;

/// VMU protocol versions carried in the frame version word.
pub const VMU_PROTOCOL_1: u8 = 1;
pub const VMU_PROTOCOL_2: u8 = 2;

/// Realtime/playback bit of the secondary-header properties field.
pub const PROP_REALTIME: u16 = 0x0001;

/// VMU downlink channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Channel {
    Video1 = 1,
    Video2 = 2,
    Science = 3,
}

impl Channel {
    pub fn from_u8(c: u8) -> Option<Self> {
        match c {
            1 => Some(Self::Video1),
            2 => Some(Self::Video2),
            3 => Some(Self::Science),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Video1 => "video1",
            Self::Video2 => "video2",
            Self::Science => "science",
        }
    }
}

/// Display name of a raw channel byte.
pub fn channel_name(c: u8) -> &'static str {
    Channel::from_u8(c).map_or("unknown", Channel::name)
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unsupported VMU protocol version {0}")]
    UnknownVersion(u8),
    #[error("unknown VMU channel {0}")]
    UnknownChannel(u8),
    #[error("truncated VMU packet: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// The 15-byte header prefixing every VMU payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VmuHeader {
    pub channel: u8,
    pub source: u8,
    pub sequence: u32,
    pub coarse: u32,
    pub fine: u8,
}

impl VmuHeader {
    pub fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        let channel = r.read_u8()?;
        let source = r.read_u8()?;
        r.read_u16::<LittleEndian>()?;
        let sequence = r.read_u32::<LittleEndian>()?;
        let coarse = r.read_u32::<LittleEndian>()?;
        let fine = r.read_u8()?;
        r.read_u16::<LittleEndian>()?;
        Ok(Self {
            channel,
            source,
            sequence,
            coarse,
            fine,
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u8(self.channel)?;
        w.write_u8(self.source)?;
        w.write_u16::<LittleEndian>(0)?;
        w.write_u32::<LittleEndian>(self.sequence)?;
        w.write_u32::<LittleEndian>(self.coarse)?;
        w.write_u8(self.fine)?;
        w.write_u16::<LittleEndian>(0)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        time::to_utc(self.coarse, self.fine)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Geometry {
    pub x: u16,
    pub y: u16,
}

impl Geometry {
    fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(Self {
            x: r.read_u16::<LittleEndian>()?,
            y: r.read_u16::<LittleEndian>()?,
        })
    }

    fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u16::<LittleEndian>(self.x)?;
        w.write_u16::<LittleEndian>(self.y)
    }
}

/// Region of interest of an image acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    pub x: u16,
    pub y: u16,
    pub w: u16,
    pub h: u16,
}

impl Region {
    fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(Self {
            x: r.read_u16::<LittleEndian>()?,
            y: r.read_u16::<LittleEndian>()?,
            w: r.read_u16::<LittleEndian>()?,
            h: r.read_u16::<LittleEndian>()?,
        })
    }

    fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u16::<LittleEndian>(self.x)?;
        w.write_u16::<LittleEndian>(self.y)?;
        w.write_u16::<LittleEndian>(self.w)?;
        w.write_u16::<LittleEndian>(self.h)
    }
}

/// Science data header, v1 layout (8 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SdhV1 {
    pub properties: u8,
    pub originator: u8,
    pub acquisition: Time5,
}

impl SdhV1 {
    pub fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        let properties = r.read_u8()?;
        let originator = r.read_u8()?;
        let acquisition = Time5::read(r)?;
        r.read_u8()?;
        Ok(Self {
            properties,
            originator,
            acquisition,
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u8(self.properties)?;
        w.write_u8(self.originator)?;
        self.acquisition.write(w)?;
        w.write_u8(0)
    }
}

/// Science data header, v2 layout (56 bytes). The `id` field carries the
/// payload FCC as four big-endian ASCII bytes; `info` is the 32-byte UPI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdhV2 {
    pub properties: u16,
    pub sequence: u32,
    pub originator: u32,
    pub acquisition: Time5,
    pub auxiliary: Time5,
    pub id: u32,
    pub info: [u8; 32],
}

impl Default for SdhV2 {
    fn default() -> Self {
        Self {
            properties: 0,
            sequence: 0,
            originator: 0,
            acquisition: Time5::default(),
            auxiliary: Time5::default(),
            id: 0,
            info: [0; 32],
        }
    }
}

impl SdhV2 {
    pub fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        let properties = r.read_u16::<LittleEndian>()?;
        let sequence = r.read_u32::<LittleEndian>()?;
        let originator = r.read_u32::<LittleEndian>()?;
        let acquisition = Time5::read(r)?;
        let auxiliary = Time5::read(r)?;
        let id = r.read_u32::<LittleEndian>()?;
        let mut info = [0u8; 32];
        r.read_exact(&mut info)?;
        Ok(Self {
            properties,
            sequence,
            originator,
            acquisition,
            auxiliary,
            id,
            info,
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u16::<LittleEndian>(self.properties)?;
        w.write_u32::<LittleEndian>(self.sequence)?;
        w.write_u32::<LittleEndian>(self.originator)?;
        self.acquisition.write(w)?;
        self.auxiliary.write(w)?;
        w.write_u32::<LittleEndian>(self.id)?;
        w.write_all(&self.info)
    }
}

/// Tagged science header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sdh {
    V1(SdhV1),
    V2(SdhV2),
}

impl Sdh {
    pub fn version(&self) -> u8 {
        match self {
            Self::V1(_) => VMU_PROTOCOL_1,
            Self::V2(_) => VMU_PROTOCOL_2,
        }
    }

    pub fn properties(&self) -> u16 {
        match self {
            Self::V1(s) => u16::from(s.properties),
            Self::V2(s) => s.properties,
        }
    }

    pub fn acquisition(&self) -> Time5 {
        match self {
            Self::V1(s) => s.acquisition,
            Self::V2(s) => s.acquisition,
        }
    }

    pub fn info(&self) -> Option<&[u8; 32]> {
        match self {
            Self::V1(_) => None,
            Self::V2(s) => Some(&s.info),
        }
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match self {
            Self::V1(s) => s.write(w),
            Self::V2(s) => s.write(w),
        }
    }

    /// Promote to the v2 layout, used by the HRDL container format.
    pub fn to_v2(&self) -> SdhV2 {
        match self {
            Self::V2(s) => *s,
            Self::V1(s) => SdhV2 {
                properties: u16::from(s.properties),
                originator: u32::from(s.originator),
                acquisition: s.acquisition,
                ..SdhV2::default()
            },
        }
    }
}

/// Image data header, v1 layout (72 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdhV1 {
    pub properties: u16,
    pub sequence: u32,
    pub originator: u8,
    pub acquisition: Time5,
    pub auxiliary: u32,
    pub id: u32,
    pub kind: u8,
    pub pixels: Geometry,
    pub region: Region,
    pub dropping: u16,
    pub scaling: Geometry,
    pub ratio: u8,
    pub info: [u8; 32],
}

impl Default for IdhV1 {
    fn default() -> Self {
        Self {
            properties: 0,
            sequence: 0,
            originator: 0,
            acquisition: Time5::default(),
            auxiliary: 0,
            id: 0,
            kind: 0,
            pixels: Geometry::default(),
            region: Region::default(),
            dropping: 0,
            scaling: Geometry::default(),
            ratio: 0,
            info: [0; 32],
        }
    }
}

impl IdhV1 {
    pub fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        let properties = r.read_u16::<LittleEndian>()?;
        let sequence = r.read_u32::<LittleEndian>()?;
        let originator = r.read_u8()?;
        let acquisition = Time5::read(r)?;
        let auxiliary = r.read_u32::<LittleEndian>()?;
        let id = r.read_u32::<LittleEndian>()?;
        let kind = r.read_u8()?;
        let pixels = Geometry::read(r)?;
        let region = Region::read(r)?;
        let dropping = r.read_u16::<LittleEndian>()?;
        let scaling = Geometry::read(r)?;
        let ratio = r.read_u8()?;
        let mut info = [0u8; 32];
        r.read_exact(&mut info)?;
        Ok(Self {
            properties,
            sequence,
            originator,
            acquisition,
            auxiliary,
            id,
            kind,
            pixels,
            region,
            dropping,
            scaling,
            ratio,
            info,
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u16::<LittleEndian>(self.properties)?;
        w.write_u32::<LittleEndian>(self.sequence)?;
        w.write_u8(self.originator)?;
        self.acquisition.write(w)?;
        w.write_u32::<LittleEndian>(self.auxiliary)?;
        w.write_u32::<LittleEndian>(self.id)?;
        w.write_u8(self.kind)?;
        self.pixels.write(w)?;
        self.region.write(w)?;
        w.write_u16::<LittleEndian>(self.dropping)?;
        self.scaling.write(w)?;
        w.write_u8(self.ratio)?;
        w.write_all(&self.info)
    }
}

/// Image data header, v2 layout (76 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdhV2 {
    pub properties: u16,
    pub sequence: u32,
    pub originator: u32,
    pub acquisition: Time5,
    pub auxiliary: Time5,
    pub id: u32,
    pub kind: u8,
    pub pixels: Geometry,
    pub region: Region,
    pub dropping: u16,
    pub scaling: Geometry,
    pub ratio: u8,
    pub info: [u8; 32],
}

impl Default for IdhV2 {
    fn default() -> Self {
        Self {
            properties: 0,
            sequence: 0,
            originator: 0,
            acquisition: Time5::default(),
            auxiliary: Time5::default(),
            id: 0,
            kind: 0,
            pixels: Geometry::default(),
            region: Region::default(),
            dropping: 0,
            scaling: Geometry::default(),
            ratio: 0,
            info: [0; 32],
        }
    }
}

impl IdhV2 {
    pub fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        let properties = r.read_u16::<LittleEndian>()?;
        let sequence = r.read_u32::<LittleEndian>()?;
        let originator = r.read_u32::<LittleEndian>()?;
        let acquisition = Time5::read(r)?;
        let auxiliary = Time5::read(r)?;
        let id = r.read_u32::<LittleEndian>()?;
        let kind = r.read_u8()?;
        let pixels = Geometry::read(r)?;
        let region = Region::read(r)?;
        let dropping = r.read_u16::<LittleEndian>()?;
        let scaling = Geometry::read(r)?;
        let ratio = r.read_u8()?;
        let mut info = [0u8; 32];
        r.read_exact(&mut info)?;
        Ok(Self {
            properties,
            sequence,
            originator,
            acquisition,
            auxiliary,
            id,
            kind,
            pixels,
            region,
            dropping,
            scaling,
            ratio,
            info,
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u16::<LittleEndian>(self.properties)?;
        w.write_u32::<LittleEndian>(self.sequence)?;
        w.write_u32::<LittleEndian>(self.originator)?;
        self.acquisition.write(w)?;
        self.auxiliary.write(w)?;
        w.write_u32::<LittleEndian>(self.id)?;
        w.write_u8(self.kind)?;
        self.pixels.write(w)?;
        self.region.write(w)?;
        w.write_u16::<LittleEndian>(self.dropping)?;
        self.scaling.write(w)?;
        w.write_u8(self.ratio)?;
        w.write_all(&self.info)
    }
}

/// Tagged image header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idh {
    V1(IdhV1),
    V2(IdhV2),
}

impl Idh {
    pub fn version(&self) -> u8 {
        match self {
            Self::V1(_) => VMU_PROTOCOL_1,
            Self::V2(_) => VMU_PROTOCOL_2,
        }
    }

    pub fn properties(&self) -> u16 {
        match self {
            Self::V1(i) => i.properties,
            Self::V2(i) => i.properties,
        }
    }

    pub fn acquisition(&self) -> Time5 {
        match self {
            Self::V1(i) => i.acquisition,
            Self::V2(i) => i.acquisition,
        }
    }

    pub fn pixels(&self) -> Geometry {
        match self {
            Self::V1(i) => i.pixels,
            Self::V2(i) => i.pixels,
        }
    }

    pub fn region(&self) -> Region {
        match self {
            Self::V1(i) => i.region,
            Self::V2(i) => i.region,
        }
    }

    pub fn dropping(&self) -> u16 {
        match self {
            Self::V1(i) => i.dropping,
            Self::V2(i) => i.dropping,
        }
    }

    pub fn scaling(&self) -> Geometry {
        match self {
            Self::V1(i) => i.scaling,
            Self::V2(i) => i.scaling,
        }
    }

    pub fn ratio(&self) -> u8 {
        match self {
            Self::V1(i) => i.ratio,
            Self::V2(i) => i.ratio,
        }
    }

    pub fn info(&self) -> &[u8; 32] {
        match self {
            Self::V1(i) => &i.info,
            Self::V2(i) => &i.info,
        }
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match self {
            Self::V1(i) => i.write(w),
            Self::V2(i) => i.write(w),
        }
    }

    /// Promote to the v2 layout, used by the HRDL container format.
    pub fn to_v2(&self) -> IdhV2 {
        match self {
            Self::V2(i) => *i,
            Self::V1(i) => IdhV2 {
                properties: i.properties,
                sequence: i.sequence,
                originator: u32::from(i.originator),
                acquisition: i.acquisition,
                auxiliary: Time5::new(i.auxiliary, 0),
                id: i.id,
                kind: i.kind,
                pixels: i.pixels,
                region: i.region,
                dropping: i.dropping,
                scaling: i.scaling,
                ratio: i.ratio,
                info: i.info,
            },
        }
    }
}

/// A decoded VMU record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Image {
        vmu: VmuHeader,
        idh: Idh,
        body: Vec<u8>,
        valid: bool,
    },
    Table {
        vmu: VmuHeader,
        sdh: Sdh,
        body: Vec<u8>,
        valid: bool,
    },
}

impl Record {
    /// Decode a VMU payload. `version` is the VMU protocol nibble of the
    /// frame version word; `valid` carries the frame checksum verdict.
    pub fn decode(version: u8, payload: &[u8], valid: bool) -> Result<Self, DecodeError> {
        if version != VMU_PROTOCOL_1 && version != VMU_PROTOCOL_2 {
            return Err(DecodeError::UnknownVersion(version));
        }
        if payload.len() < VMU_HEADER_LEN {
            return Err(DecodeError::Truncated {
                need: VMU_HEADER_LEN,
                have: payload.len(),
            });
        }
        let mut r = Cursor::new(payload);
        let vmu = VmuHeader::read(&mut r)?;
        let channel =
            Channel::from_u8(vmu.channel).ok_or(DecodeError::UnknownChannel(vmu.channel))?;

        let need = VMU_HEADER_LEN
            + match (channel, version) {
                (Channel::Science, VMU_PROTOCOL_1) => SDH_V1_LEN,
                (Channel::Science, _) => SDH_V2_LEN,
                (_, VMU_PROTOCOL_1) => IDH_V1_LEN,
                (_, _) => IDH_V2_LEN,
            };
        if payload.len() < need {
            return Err(DecodeError::Truncated {
                need,
                have: payload.len(),
            });
        }

        let rec = match channel {
            Channel::Science => {
                let sdh = if version == VMU_PROTOCOL_1 {
                    Sdh::V1(SdhV1::read(&mut r)?)
                } else {
                    Sdh::V2(SdhV2::read(&mut r)?)
                };
                Record::Table {
                    vmu,
                    sdh,
                    body: payload[r.position() as usize..].to_vec(),
                    valid,
                }
            }
            Channel::Video1 | Channel::Video2 => {
                let idh = if version == VMU_PROTOCOL_1 {
                    Idh::V1(IdhV1::read(&mut r)?)
                } else {
                    Idh::V2(IdhV2::read(&mut r)?)
                };
                Record::Image {
                    vmu,
                    idh,
                    body: payload[r.position() as usize..].to_vec(),
                    valid,
                }
            }
        };
        Ok(rec)
    }

    pub fn vmu(&self) -> &VmuHeader {
        match self {
            Self::Image { vmu, .. } | Self::Table { vmu, .. } => vmu,
        }
    }

    pub fn body(&self) -> &[u8] {
        match self {
            Self::Image { body, .. } | Self::Table { body, .. } => body,
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Self::Image { valid, .. } | Self::Table { valid, .. } => *valid,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Image { .. })
    }

    pub fn is_table(&self) -> bool {
        matches!(self, Self::Table { .. })
    }

    /// VMU protocol version of the secondary header.
    pub fn version(&self) -> u8 {
        match self {
            Self::Image { idh, .. } => idh.version(),
            Self::Table { sdh, .. } => sdh.version(),
        }
    }

    pub fn channel(&self) -> u8 {
        self.vmu().channel
    }

    pub fn sequence(&self) -> u32 {
        self.vmu().sequence
    }

    /// Originating producer as lower-case hex of the VMU source byte.
    pub fn origin(&self) -> String {
        format!("{:02x}", self.vmu().source)
    }

    /// VMU generation timestamp.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.vmu().timestamp()
    }

    /// Acquisition timestamp of the secondary header.
    pub fn acq_timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Image { idh, .. } => idh.acquisition().to_utc(),
            Self::Table { sdh, .. } => sdh.acquisition().to_utc(),
        }
    }

    pub fn is_realtime(&self) -> bool {
        let props = match self {
            Self::Image { idh, .. } => idh.properties(),
            Self::Table { sdh, .. } => sdh.properties(),
        };
        props & PROP_REALTIME != 0
    }

    /// Stored artifact name, pure over the record identity.
    pub fn filename(&self) -> String {
        let vmu = self.vmu();
        format!(
            "{}_{}_{}_{}",
            self.origin(),
            vmu.sequence,
            vmu.coarse,
            vmu.fine
        )
    }

    /// User packet info, trimmed of NUL padding. `None` for headers that
    /// carry no annotation.
    pub fn upi(&self) -> Option<String> {
        let info: &[u8] = match self {
            Self::Image { idh, .. } => idh.info(),
            Self::Table { sdh, .. } => sdh.info()?,
        };
        let trimmed: Vec<u8> = info.iter().copied().filter(|&b| b != 0).collect();
        if trimmed.is_empty() {
            return None;
        }
        Some(String::from_utf8_lossy(&trimmed).into_owned())
    }

    /// Four-character payload code. v1 headers carry none.
    pub fn fcc(&self) -> Option<[u8; 4]> {
        match self {
            Self::Image { idh: Idh::V2(i), .. } => Some(i.id.to_be_bytes()),
            Self::Table { sdh: Sdh::V2(s), .. } => Some(s.id.to_be_bytes()),
            _ => None,
        }
    }

    /// Raw export: FCC, sequence, acquisition and image geometry ahead of
    /// the body, all big-endian. v1 records carry no FCC and export the
    /// bare body.
    pub fn export_raw<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match self {
            Self::Table { sdh, body, .. } => match sdh {
                Sdh::V1(_) => w.write_all(body),
                Sdh::V2(s) => {
                    w.write_u32::<BigEndian>(s.id)?;
                    w.write_u32::<BigEndian>(self.sequence())?;
                    w.write_i64::<BigEndian>(s.acquisition.unix())?;
                    w.write_all(body)
                }
            },
            Self::Image { idh, body, .. } => match idh {
                Idh::V1(_) => w.write_all(body),
                Idh::V2(i) => {
                    w.write_u32::<BigEndian>(i.id)?;
                    w.write_u32::<BigEndian>(self.sequence())?;
                    w.write_i64::<BigEndian>(i.acquisition.unix())?;
                    w.write_u16::<BigEndian>(i.pixels.x)?;
                    w.write_u16::<BigEndian>(i.pixels.y)?;
                    w.write_all(body)
                }
            },
        }
    }

    /// Full export: the packet exactly as received, VMU header included.
    pub fn export<W: Write>(&self, w: &mut W) -> io::Result<()> {
        self.vmu().write(w)?;
        match self {
            Self::Image { idh, .. } => idh.write(w)?,
            Self::Table { sdh, .. } => sdh.write(w)?,
        }
        w.write_all(self.body())
    }

    /// HRDL wire image: sync word, LE length, VMU header, v2 secondary
    /// header and body, closed by the LE byte sum over everything after
    /// the length field. v1 headers are promoted to their v2 layout. The
    /// BE sync against LE length mirrors the ground segment format and
    /// must stay bit-exact.
    pub fn export_hrdl<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let mut buf = Vec::with_capacity(VMU_HEADER_LEN + IDH_V2_LEN + self.body().len());
        self.vmu().write(&mut buf)?;
        match self {
            Self::Image { idh, .. } => idh.to_v2().write(&mut buf)?,
            Self::Table { sdh, .. } => sdh.to_v2().write(&mut buf)?,
        }
        buf.extend_from_slice(self.body());
        let sum = checksum::hrdl_sum(&buf);

        w.write_u32::<BigEndian>(PREAMBLE)?;
        w.write_u32::<LittleEndian>((buf.len() + 4) as u32)?;
        w.write_all(&buf)?;
        w.write_u32::<LittleEndian>(sum)
    }
}
