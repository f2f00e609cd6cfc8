//! Binary layout of the columnar array container.
//!
//! A container holds one node per table. Each node declares a fixed-width
//! field list and stores its rows as one row-major record block guarded by
//! a CRC32 checksum.
//!
//! Format:
//! ```text
//! [magic: "SNDA"][version: 1 byte][node_count: 4 bytes LE]
//! node*:
//!   [name_len: 2 LE][name: UTF-8]
//!   [field_count: 2 LE]
//!   field*: [name_len: 2 LE][name: UTF-8][tag: 1][width: 4 LE]
//!   [row_count: 8 LE][crc32(block): 4 LE]
//!   [block: row_count * row_width bytes]
//! ```
//!
//! Integers and floats are little-endian. Text is UTF-8 padded with NUL
//! bytes to the field width; trailing NULs are stripped on decode.

use std::ops::Range;

use crc32fast::Hasher;

use crate::schema::ColumnType;
use crate::value::Value;

/// Magic bytes identifying an array container.
pub const MAGIC: [u8; 4] = *b"SNDA";

/// Current container version.
pub const FORMAT_VERSION: u8 = 1;

/// Upper bound for a single text/bytes field.
pub const MAX_FIELD_WIDTH: u32 = 64 * 1024;

/// Upper bound on the row count of a node without fields. Such a node has
/// an empty record block, so the file length cannot bound it.
pub const MAX_FIELDLESS_ROWS: u64 = 1 << 16;

/// Physical type of a fixed-width field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Little-endian `i32`.
    I32,
    /// Little-endian `i64`.
    I64,
    /// Little-endian `f64`.
    F64,
    /// UTF-8 text, NUL padded to the given width.
    Text(u32),
    /// Opaque bytes of exactly the given width.
    Bytes(u32),
}

impl FieldKind {
    const fn tag(self) -> u8 {
        match self {
            Self::I32 => 1,
            Self::I64 => 2,
            Self::F64 => 3,
            Self::Text(_) => 4,
            Self::Bytes(_) => 5,
        }
    }

    fn from_tag(tag: u8, width: u32) -> Option<Self> {
        let kind = match tag {
            1 => Self::I32,
            2 => Self::I64,
            3 => Self::F64,
            4 => Self::Text(width),
            5 => Self::Bytes(width),
            _ => return None,
        };
        (width > 0 && kind.width() == width as usize).then_some(kind)
    }

    /// Width in bytes of one cell.
    pub const fn width(self) -> usize {
        match self {
            Self::I32 => 4,
            Self::I64 | Self::F64 => 8,
            Self::Text(w) | Self::Bytes(w) => w as usize,
        }
    }

    /// Logical type the field decodes to.
    pub const fn column_type(self) -> ColumnType {
        match self {
            Self::I32 | Self::I64 => ColumnType::Int,
            Self::F64 => ColumnType::Float,
            Self::Text(_) => ColumnType::Text,
            Self::Bytes(_) => ColumnType::Blob,
        }
    }
}

/// A named fixed-width field.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct FieldLayout {
    pub name: String,
    pub kind: FieldKind,
}

/// The declared shape of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct NodeLayout {
    pub name: String,
    pub fields: Vec<FieldLayout>,
}

impl NodeLayout {
    /// Bytes per row.
    pub fn row_width(&self) -> usize {
        self.fields.iter().map(|f| f.kind.width()).sum()
    }
}

/// Directory entry for a node inside a decoded container.
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct NodeEntry {
    pub layout: NodeLayout,
    pub row_count: u64,
    pub crc: u32,
    pub block: Range<usize>,
}

fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

fn put_name(out: &mut Vec<u8>, name: &str) -> Result<(), String> {
    let len = u16::try_from(name.len()).map_err(|_| format!("name '{name}' is too long"))?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(name.as_bytes());
    Ok(())
}

/// Writes the container header.
pub fn encode_header(node_count: usize) -> Result<Vec<u8>, String> {
    let count = u32::try_from(node_count).map_err(|_| "too many nodes".to_string())?;
    let mut out = Vec::with_capacity(9);
    out.extend_from_slice(&MAGIC);
    out.push(FORMAT_VERSION);
    out.extend_from_slice(&count.to_le_bytes());
    Ok(out)
}

fn encode_cell(out: &mut Vec<u8>, field: &FieldLayout, value: &Value) -> Result<(), String> {
    let mismatch = || {
        format!(
            "field '{}' ({:?}) cannot store {} value {value}",
            field.name,
            field.kind,
            value.type_name()
        )
    };
    match field.kind {
        FieldKind::I32 => {
            let v = value.as_int().ok_or_else(mismatch)?;
            let v = i32::try_from(v).map_err(|_| mismatch())?;
            out.extend_from_slice(&v.to_le_bytes());
        }
        FieldKind::I64 => {
            let v = value.as_int().ok_or_else(mismatch)?;
            out.extend_from_slice(&v.to_le_bytes());
        }
        FieldKind::F64 => {
            let v = value.as_float().ok_or_else(mismatch)?;
            out.extend_from_slice(&v.to_le_bytes());
        }
        FieldKind::Text(width) | FieldKind::Bytes(width) => {
            let bytes = match (field.kind, value) {
                (FieldKind::Text(_), Value::Text(s)) => s.as_bytes(),
                (FieldKind::Bytes(_), Value::Blob(b)) => b.as_slice(),
                _ => return Err(mismatch()),
            };
            let width = width as usize;
            if bytes.len() > width {
                return Err(format!(
                    "field '{}' value of {} bytes exceeds width {width}",
                    field.name,
                    bytes.len()
                ));
            }
            out.extend_from_slice(bytes);
            out.resize(out.len() + (width - bytes.len()), 0);
        }
    }
    Ok(())
}

/// Encodes one node: layout, row count, checksum and record block.
pub fn encode_node(layout: &NodeLayout, rows: &[Vec<Value>]) -> Result<Vec<u8>, String> {
    let field_count =
        u16::try_from(layout.fields.len()).map_err(|_| format!("node '{}' has too many fields", layout.name))?;
    if layout.fields.is_empty() && rows.len() as u64 > MAX_FIELDLESS_ROWS {
        return Err(format!(
            "node '{}' has no fields and {} rows (at most {MAX_FIELDLESS_ROWS})",
            layout.name,
            rows.len()
        ));
    }

    let mut block = Vec::with_capacity(layout.row_width() * rows.len());
    for (idx, row) in rows.iter().enumerate() {
        if row.len() != layout.fields.len() {
            return Err(format!(
                "node '{}' row {idx} has {} values for {} fields",
                layout.name,
                row.len(),
                layout.fields.len()
            ));
        }
        for (field, value) in layout.fields.iter().zip(row) {
            encode_cell(&mut block, field, value)?;
        }
    }

    let mut out = Vec::with_capacity(block.len() + 64);
    put_name(&mut out, &layout.name)?;
    out.extend_from_slice(&field_count.to_le_bytes());
    for field in &layout.fields {
        if field.kind.width() == 0 || field.kind.width() > MAX_FIELD_WIDTH as usize {
            return Err(format!("field '{}' width must be 1..={MAX_FIELD_WIDTH}", field.name));
        }
        put_name(&mut out, &field.name)?;
        out.push(field.kind.tag());
        #[allow(clippy::cast_possible_truncation)]
        out.extend_from_slice(&(field.kind.width() as u32).to_le_bytes());
    }
    out.extend_from_slice(&(rows.len() as u64).to_le_bytes());
    out.extend_from_slice(&checksum(&block).to_le_bytes());
    out.extend_from_slice(&block);
    Ok(out)
}

/// Bounds-checked little-endian reader over a byte slice.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], String> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| format!("truncated while reading {what} at offset {}", self.pos))?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self, what: &str) -> Result<[u8; N], String> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N, what)?);
        Ok(buf)
    }

    fn u8(&mut self, what: &str) -> Result<u8, String> {
        Ok(self.array::<1>(what)?[0])
    }

    fn u16(&mut self, what: &str) -> Result<u16, String> {
        Ok(u16::from_le_bytes(self.array(what)?))
    }

    fn u32(&mut self, what: &str) -> Result<u32, String> {
        Ok(u32::from_le_bytes(self.array(what)?))
    }

    fn u64(&mut self, what: &str) -> Result<u64, String> {
        Ok(u64::from_le_bytes(self.array(what)?))
    }

    fn name(&mut self, what: &str) -> Result<String, String> {
        let len = self.u16(what)? as usize;
        let raw = self.take(len, what)?;
        String::from_utf8(raw.to_vec()).map_err(|_| format!("{what} is not valid UTF-8"))
    }
}

/// Parses the header and node directory of a container.
///
/// Record blocks are located but not decoded; see [`decode_rows`].
pub fn decode_directory(bytes: &[u8]) -> Result<Vec<NodeEntry>, String> {
    let mut r = Reader { bytes, pos: 0 };

    let magic: [u8; 4] = r.array("magic")?;
    if magic != MAGIC {
        return Err(format!("invalid magic bytes: expected {MAGIC:?}, got {magic:?}"));
    }
    let version = r.u8("version")?;
    if version != FORMAT_VERSION {
        return Err(format!("unsupported container version: {version} (expected {FORMAT_VERSION})"));
    }

    let node_count = r.u32("node count")?;
    let mut nodes = Vec::new();
    for _ in 0..node_count {
        let name = r.name("node name")?;
        let field_count = r.u16("field count")?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let field_name = r.name("field name")?;
            let tag = r.u8("field tag")?;
            let width = r.u32("field width")?;
            if width > MAX_FIELD_WIDTH {
                return Err(format!("field '{name}.{field_name}' width {width} exceeds maximum"));
            }
            let kind = FieldKind::from_tag(tag, width)
                .ok_or_else(|| format!("field '{name}.{field_name}' has invalid type tag {tag}/{width}"))?;
            fields.push(FieldLayout {
                name: field_name,
                kind,
            });
        }
        let layout = NodeLayout { name, fields };

        let row_count = r.u64("row count")?;
        let crc = r.u32("checksum")?;
        if layout.fields.is_empty() && row_count > MAX_FIELDLESS_ROWS {
            return Err(format!(
                "node '{}' has no fields but claims {row_count} rows (at most {MAX_FIELDLESS_ROWS})",
                layout.name
            ));
        }
        let block_len = usize::try_from(row_count)
            .ok()
            .and_then(|rows| rows.checked_mul(layout.row_width()))
            .ok_or_else(|| format!("node '{}' record block size overflows", layout.name))?;
        let start = r.pos;
        r.take(block_len, "record block")?;

        if nodes.iter().any(|n: &NodeEntry| n.layout.name == layout.name) {
            return Err(format!("duplicate node '{}'", layout.name));
        }
        nodes.push(NodeEntry {
            layout,
            row_count,
            crc,
            block: start..start + block_len,
        });
    }

    if r.pos != bytes.len() {
        return Err(format!("{} trailing bytes after last node", bytes.len() - r.pos));
    }
    Ok(nodes)
}

fn decode_cell(kind: FieldKind, raw: &[u8]) -> Result<Value, String> {
    let value = match kind {
        FieldKind::I32 => {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(raw);
            Value::Int(i64::from(i32::from_le_bytes(buf)))
        }
        FieldKind::I64 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(raw);
            Value::Int(i64::from_le_bytes(buf))
        }
        FieldKind::F64 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(raw);
            Value::Float(f64::from_le_bytes(buf))
        }
        FieldKind::Text(_) => {
            let end = raw.iter().rposition(|b| *b != 0).map_or(0, |p| p + 1);
            let text = std::str::from_utf8(&raw[..end]).map_err(|_| "text cell is not valid UTF-8".to_string())?;
            Value::Text(text.to_string())
        }
        FieldKind::Bytes(_) => Value::Blob(raw.to_vec()),
    };
    Ok(value)
}

/// Verifies and decodes the record block of one node, row-major.
pub fn decode_rows(bytes: &[u8], entry: &NodeEntry) -> Result<Vec<Vec<Value>>, String> {
    let block = bytes
        .get(entry.block.clone())
        .ok_or_else(|| format!("node '{}' record block out of range", entry.layout.name))?;

    let computed = checksum(block);
    if computed != entry.crc {
        return Err(format!(
            "CRC mismatch in node '{}': stored={:08x}, computed={computed:08x} (data corrupted)",
            entry.layout.name, entry.crc
        ));
    }

    let width = entry.layout.row_width();
    let mut rows = Vec::with_capacity(block.len().checked_div(width).unwrap_or(0));
    if width == 0 {
        // A field-less node still records how many rows it holds.
        for _ in 0..entry.row_count {
            rows.push(Vec::new());
        }
        return Ok(rows);
    }
    for raw_row in block.chunks_exact(width) {
        let mut row = Vec::with_capacity(entry.layout.fields.len());
        let mut offset = 0;
        for field in &entry.layout.fields {
            let w = field.kind.width();
            let cell = decode_cell(field.kind, &raw_row[offset..offset + w])
                .map_err(|e| format!("node '{}' field '{}': {e}", entry.layout.name, field.name))?;
            row.push(cell);
            offset += w;
        }
        rows.push(row);
    }
    Ok(rows)
}
