//! Constant Pool
//!
//! Read-only: this crate never needs to add entries to the pool (the
//! instruction cloner only ever duplicates instructions and labels, which
//! carry no constant-pool references beyond ones the clone already shares
//! with its original), so there's no writer half. Every tag is still parsed
//! far enough to know its own length, since the pool is a flat array and a
//! single misjudged entry size desynchronizes everything after it.

use anyhow::{bail, Context, Result};

use super::cursor::Cursor;

#[derive(Debug, Clone)]
pub enum PoolEntry {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class { name_index: u16 },
    String { string_index: u16 },
    Fieldref { class_index: u16, name_and_type_index: u16 },
    Methodref { class_index: u16, name_and_type_index: u16 },
    InterfaceMethodref { class_index: u16, name_and_type_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    MethodHandle { reference_kind: u8, reference_index: u16 },
    MethodType { descriptor_index: u16 },
    Dynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
    InvokeDynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
    Module { name_index: u16 },
    Package { name_index: u16 },
    /// The second slot of a `Long`/`Double` entry per JVMS §4.4.5 — the
    /// pool is indexed 1-based and those two tags burn two slots each.
    Tombstone,
}

#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    /// Index 0 is never used (constant pool indices are 1-based); kept as
    /// a `Tombstone` placeholder so `entries[i]` lines up with JVMS indices.
    entries: Vec<PoolEntry>,
    /// The pool's bytes exactly as read, reused verbatim on write since this
    /// crate never adds or rewrites an entry.
    raw: Vec<u8>,
}

impl ConstantPool {
    pub fn read(cur: &mut Cursor, count: u16) -> Result<Self> {
        let start = cur.pos();
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(PoolEntry::Tombstone);
        let mut i = 1u16;
        while i < count {
            let tag = cur.u8().with_context(|| format!("reading constant pool tag #{i}"))?;
            let entry = match tag {
                1 => {
                    let len = cur.u16()?;
                    let raw = cur.bytes(len as usize)?;
                    PoolEntry::Utf8(decode_modified_utf8(raw)?)
                }
                3 => PoolEntry::Integer(cur.i32()?),
                4 => PoolEntry::Float(f32::from_bits(cur.u32()?)),
                5 => PoolEntry::Long(cur.u64()? as i64),
                6 => PoolEntry::Double(f64::from_bits(cur.u64()?)),
                7 => PoolEntry::Class { name_index: cur.u16()? },
                8 => PoolEntry::String { string_index: cur.u16()? },
                9 => PoolEntry::Fieldref { class_index: cur.u16()?, name_and_type_index: cur.u16()? },
                10 => PoolEntry::Methodref { class_index: cur.u16()?, name_and_type_index: cur.u16()? },
                11 => PoolEntry::InterfaceMethodref { class_index: cur.u16()?, name_and_type_index: cur.u16()? },
                12 => PoolEntry::NameAndType { name_index: cur.u16()?, descriptor_index: cur.u16()? },
                15 => PoolEntry::MethodHandle { reference_kind: cur.u8()?, reference_index: cur.u16()? },
                16 => PoolEntry::MethodType { descriptor_index: cur.u16()? },
                17 => PoolEntry::Dynamic {
                    bootstrap_method_attr_index: cur.u16()?,
                    name_and_type_index: cur.u16()?,
                },
                18 => PoolEntry::InvokeDynamic {
                    bootstrap_method_attr_index: cur.u16()?,
                    name_and_type_index: cur.u16()?,
                },
                19 => PoolEntry::Module { name_index: cur.u16()? },
                20 => PoolEntry::Package { name_index: cur.u16()? },
                other => bail!("unknown constant pool tag {other} at entry #{i}"),
            };
            let takes_two_slots = matches!(entry, PoolEntry::Long(_) | PoolEntry::Double(_));
            entries.push(entry);
            i += 1;
            if takes_two_slots {
                entries.push(PoolEntry::Tombstone);
                i += 1;
            }
        }
        let raw = cur.slice_since(start).to_vec();
        Ok(ConstantPool { entries, raw })
    }

    /// The pool's on-disk encoding, byte for byte.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// The constant pool index of the `Utf8` entry holding exactly `name`,
    /// if present — used to locate the `Code` attribute name without
    /// depending on its conventional index.
    pub fn index_of_utf8(&self, name: &str) -> Option<u16> {
        self.entries.iter().enumerate().find_map(|(i, e)| match e {
            PoolEntry::Utf8(s) if s == name => Some(i as u16),
            _ => None,
        })
    }

    pub fn get(&self, index: u16) -> Result<&PoolEntry> {
        self.entries
            .get(index as usize)
            .filter(|e| !matches!(e, PoolEntry::Tombstone))
            .with_context(|| format!("constant pool index {index} is out of range or unusable"))
    }

    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            PoolEntry::Utf8(s) => Ok(s.as_str()),
            other => bail!("constant pool index {index} is not Utf8 (found {other:?})"),
        }
    }

    pub fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            PoolEntry::Class { name_index } => self.utf8(*name_index),
            other => bail!("constant pool index {index} is not a Class entry (found {other:?})"),
        }
    }

    /// Number of logical slots, including the unused index 0 and the
    /// tombstone following every `Long`/`Double` — this is the `count`
    /// field the class file header carries, not `entries.len() - 1`.
    pub fn slot_count(&self) -> u16 {
        self.entries.len() as u16
    }
}

/// The class file format's "modified UTF-8" differs from standard UTF-8 only
/// in how it encodes the null character and supplementary-plane characters;
/// for method bodies made of ASCII identifiers and descriptors this never
/// matters in practice, but a real encoder can't assume that, so it decodes
/// properly rather than assuming standard UTF-8.
fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i];
        if b0 & 0x80 == 0 {
            out.push(b0 as char);
            i += 1;
        } else if b0 & 0xE0 == 0xC0 {
            let b1 = *bytes.get(i + 1).context("truncated 2-byte modified UTF-8 sequence")?;
            let cp = (((b0 & 0x1F) as u32) << 6) | ((b1 & 0x3F) as u32);
            out.push(char::from_u32(cp).unwrap_or('\u{FFFD}'));
            i += 2;
        } else if b0 & 0xF0 == 0xE0 {
            let b1 = *bytes.get(i + 1).context("truncated 3-byte modified UTF-8 sequence")?;
            let b2 = *bytes.get(i + 2).context("truncated 3-byte modified UTF-8 sequence")?;
            let cp = (((b0 & 0x0F) as u32) << 12) | (((b1 & 0x3F) as u32) << 6) | ((b2 & 0x3F) as u32);
            out.push(char::from_u32(cp).unwrap_or('\u{FFFD}'));
            i += 3;
        } else {
            bail!("invalid modified UTF-8 lead byte 0x{b0:02X}");
        }
    }
    Ok(out)
}
