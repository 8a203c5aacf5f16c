//! Class File Container
//!
//! Parses just enough of a `.class` file to reach every method's `Code`
//! attribute: the constant pool, the class-level header fields, and the
//! method table. Field info and every attribute this crate doesn't rewrite
//! (`SourceFile`, `LineNumberTable`, `StackMapTable`, ...) are kept as raw
//! bytes and written back unchanged, so a round trip through a method this
//! crate never touches is byte-for-byte identical.

use anyhow::{bail, Context, Result};

use super::code::{decode_code, encode_code, DecodedCode};
use super::cursor::{Cursor, Writer};
use super::pool::ConstantPool;

const MAGIC: u32 = 0xCAFEBABE;

pub struct Attribute {
    pub name_index: u16,
    pub info: Vec<u8>,
}

impl Attribute {
    fn read(cur: &mut Cursor) -> Result<Self> {
        let name_index = cur.u16()?;
        let len = cur.u32()?;
        let info = cur.bytes(len as usize)?.to_vec();
        Ok(Attribute { name_index, info })
    }

    fn write(&self, w: &mut Writer) {
        w.u16(self.name_index);
        w.u32(self.info.len() as u32);
        w.bytes(&self.info);
    }
}

pub struct Method {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    /// Field table, kept entirely raw — this crate never inspects or
    /// rewrites a field.
    raw_fields: Vec<u8>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(data);
        let magic = cur.u32()?;
        if magic != MAGIC {
            bail!("not a class file: bad magic 0x{magic:08X}");
        }
        let minor_version = cur.u16()?;
        let major_version = cur.u16()?;
        let pool_count = cur.u16()?;
        let constant_pool = ConstantPool::read(&mut cur, pool_count).context("reading constant pool")?;

        let access_flags = cur.u16()?;
        let this_class = cur.u16()?;
        let super_class = cur.u16()?;

        let interfaces_count = cur.u16()?;
        let mut interfaces = Vec::with_capacity(interfaces_count as usize);
        for _ in 0..interfaces_count {
            interfaces.push(cur.u16()?);
        }

        let fields_start = cur.pos();
        let fields_count = cur.u16()?;
        for _ in 0..fields_count {
            skip_member(&mut cur)?;
        }
        let raw_fields = data[fields_start..cur.pos()].to_vec();

        let methods_count = cur.u16()?;
        let mut methods = Vec::with_capacity(methods_count as usize);
        for _ in 0..methods_count {
            let access_flags = cur.u16()?;
            let name_index = cur.u16()?;
            let descriptor_index = cur.u16()?;
            let attr_count = cur.u16()?;
            let mut attributes = Vec::with_capacity(attr_count as usize);
            for _ in 0..attr_count {
                attributes.push(Attribute::read(&mut cur)?);
            }
            methods.push(Method { access_flags, name_index, descriptor_index, attributes });
        }

        let class_attr_count = cur.u16()?;
        let mut attributes = Vec::with_capacity(class_attr_count as usize);
        for _ in 0..class_attr_count {
            attributes.push(Attribute::read(&mut cur)?);
        }

        Ok(ClassFile {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            raw_fields,
            methods,
            attributes,
        })
    }

    pub fn write(&self) -> Vec<u8> {
        let mut w = Writer::default();
        w.u32(MAGIC);
        w.u16(self.minor_version);
        w.u16(self.major_version);
        w.u16(self.constant_pool.slot_count());
        // The pool is never mutated by this crate (see `pool.rs`), so its
        // original bytes are reused verbatim rather than re-serialized.
        w.bytes(self.constant_pool.raw_bytes());
        w.u16(self.access_flags);
        w.u16(self.this_class);
        w.u16(self.super_class);
        w.u16(self.interfaces.len() as u16);
        for i in &self.interfaces {
            w.u16(*i);
        }
        w.bytes(&self.raw_fields);
        w.u16(self.methods.len() as u16);
        for m in &self.methods {
            w.u16(m.access_flags);
            w.u16(m.name_index);
            w.u16(m.descriptor_index);
            w.u16(m.attributes.len() as u16);
            for a in &m.attributes {
                a.write(&mut w);
            }
        }
        w.u16(self.attributes.len() as u16);
        for a in &self.attributes {
            a.write(&mut w);
        }
        w.buf
    }

    pub fn method_name(&self, m: &Method) -> Result<String> {
        self.constant_pool.utf8(m.name_index).map(str::to_string)
    }

    pub fn this_class_name(&self) -> Result<&str> {
        self.constant_pool.class_name(self.this_class)
    }

    fn code_attribute_name_index(&self) -> Option<u16> {
        self.constant_pool.index_of_utf8("Code")
    }
}

/// Skips a field_info/method_info-shaped record without interpreting it —
/// used only to find where the (untouched) field table ends.
fn skip_member(cur: &mut Cursor) -> Result<()> {
    let _access_flags = cur.u16()?;
    let _name_index = cur.u16()?;
    let _descriptor_index = cur.u16()?;
    let attr_count = cur.u16()?;
    for _ in 0..attr_count {
        let _name_index = cur.u16()?;
        let len = cur.u32()?;
        cur.bytes(len as usize)?;
    }
    Ok(())
}

/// The decoded `Code` attribute of one method, plus the attribute's own
/// pool-name index so it can be written back under the same name.
pub struct CodeAttribute {
    pub name_index: u16,
    pub decoded: DecodedCode,
    pub raw_exceptions: Vec<(u16, u16, u16, u16)>,
    /// Every attribute nested inside `Code` (`LineNumberTable`,
    /// `StackMapTable`, ...) other than the bytecode and exception table
    /// itself — carried through unchanged, since this crate doesn't
    /// recompute stack map frames or line numbers (see module docs).
    pub sub_attributes: Vec<Attribute>,
    attr_index: usize,
}

impl ClassFile {
    /// The constant pool index of this class's `Code` attribute name, if the
    /// pool has one — every method with a body shares the same index.
    pub fn code_attribute_name(&self) -> Option<u16> {
        self.code_attribute_name_index()
    }
}

/// Finds and decodes `method`'s `Code` attribute, if it has one (a `native`
/// or `abstract` method has none). Takes `code_name` rather than a
/// `&ClassFile` so callers can hold this alongside a `&mut Method` from the
/// same class without a borrow conflict.
pub fn decode_method_code(method: &Method, code_name: Option<u16>) -> Result<Option<CodeAttribute>> {
    for (i, attr) in method.attributes.iter().enumerate() {
        if Some(attr.name_index) == code_name {
            let mut cur = Cursor::new(&attr.info);
            let max_stack = cur.u16()?;
            let max_locals = cur.u16()?;
            let code_length = cur.u32()?;
            let code = cur.bytes(code_length as usize)?.to_vec();
            let exc_count = cur.u16()?;
            let mut raw_exceptions = Vec::with_capacity(exc_count as usize);
            for _ in 0..exc_count {
                let start = cur.u16()?;
                let end = cur.u16()?;
                let handler = cur.u16()?;
                let catch_type = cur.u16()?;
                raw_exceptions.push((start, end, handler, catch_type));
            }
            let sub_count = cur.u16()?;
            let mut sub_attributes = Vec::with_capacity(sub_count as usize);
            for _ in 0..sub_count {
                sub_attributes.push(Attribute::read(&mut cur)?);
            }
            let decoded = decode_code(&code, max_stack, max_locals, &raw_exceptions).context("decoding Code attribute")?;
            return Ok(Some(CodeAttribute {
                name_index: attr.name_index,
                decoded,
                raw_exceptions,
                sub_attributes,
                attr_index: i,
            }));
        }
    }
    Ok(None)
}

/// Replaces `method`'s `Code` attribute with a freshly encoded one built
/// from `instructions`/`try_catch`, reusing `original`'s `max_stack`,
/// `max_locals`, and sub-attributes unchanged.
pub fn replace_method_code(
    method: &mut Method,
    original: &CodeAttribute,
    instructions: &[loopsplit_core::bytecode::instr::Instruction],
    try_catch: &[loopsplit_core::bytecode::instr::TryCatchEntry],
) -> Result<()> {
    let (code, exceptions) = encode_code(instructions, try_catch)?;

    let mut info = Writer::default();
    info.u16(original.decoded.max_stack);
    info.u16(original.decoded.max_locals);
    info.u32(code.len() as u32);
    info.bytes(&code);
    info.u16(exceptions.len() as u16);
    for (start, end, handler, catch_type) in exceptions {
        info.u16(start);
        info.u16(end);
        info.u16(handler);
        info.u16(catch_type);
    }
    info.u16(original.sub_attributes.len() as u16);
    for a in &original.sub_attributes {
        a.write(&mut info);
    }

    method.attributes[original.attr_index] = Attribute { name_index: original.name_index, info: info.buf };
    Ok(())
}
