//! Minimal bencode walking for `.torrent` metainfo: enough to hash the
//! raw `info` dictionary span and lift out the name and file listing.
//!
//! This is deliberately not a general bencode codec. The transport engine
//! owns full metainfo handling; the controller only needs the content
//! identity and the metadata a spec carries up front.

use sha1::{Digest, Sha1};

use crate::error::SpecError;
use crate::model::InfoHash;
use riptide_events::ResolvedFile;

/// Metadata lifted out of a bencoded metainfo payload.
pub(crate) struct MetainfoSummary {
    pub(crate) info_hash: InfoHash,
    pub(crate) name: Option<String>,
    pub(crate) files: Vec<ResolvedFile>,
    pub(crate) total_bytes: u64,
}

#[derive(Debug)]
enum Value {
    Int(i64),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Dict(Vec<(Vec<u8>, Value)>),
}

/// Parse a metainfo payload and summarise it.
pub(crate) fn parse(data: &[u8]) -> Result<MetainfoSummary, SpecError> {
    let (info, info_span) = locate_info(data)?;
    let digest = Sha1::digest(&data[info_span.0..info_span.1]);
    let info_hash = InfoHash::from_bytes(digest.into());

    let Value::Dict(entries) = info else {
        return Err(malformed("info is not a dictionary"));
    };

    let name = match dict_get(&entries, b"name") {
        Some(Value::Bytes(bytes)) => Some(String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    };

    let (files, total_bytes) = match dict_get(&entries, b"files") {
        Some(Value::List(items)) => multi_file_listing(items)?,
        Some(_) => return Err(malformed("files is not a list")),
        None => single_file_listing(&entries, name.as_deref())?,
    };

    Ok(MetainfoSummary {
        info_hash,
        name,
        files,
        total_bytes,
    })
}

/// Walk the top-level dictionary and return the parsed `info` value along
/// with the byte span its bencoding occupies.
fn locate_info(data: &[u8]) -> Result<(Value, (usize, usize)), SpecError> {
    if data.first() != Some(&b'd') {
        return Err(malformed("top-level value is not a dictionary"));
    }
    let mut pos = 1;
    let mut info = None;
    while data.get(pos) != Some(&b'e') {
        let (key, value_start) = match parse_value(data, pos)? {
            (Value::Bytes(key), next) => (key, next),
            _ => return Err(malformed("dictionary key is not a byte string")),
        };
        let (value, value_end) = parse_value(data, value_start)?;
        if key == b"info" {
            info = Some((value, (value_start, value_end)));
        }
        pos = value_end;
    }
    if pos + 1 != data.len() {
        return Err(malformed("trailing data after the top-level dictionary"));
    }
    info.ok_or_else(|| malformed("missing info dictionary"))
}

fn multi_file_listing(items: &[Value]) -> Result<(Vec<ResolvedFile>, u64), SpecError> {
    let mut files = Vec::with_capacity(items.len());
    let mut total: u64 = 0;
    for item in items {
        let Value::Dict(entry) = item else {
            return Err(malformed("file entry is not a dictionary"));
        };
        let size_bytes = entry_length(entry)?;
        let Some(Value::List(segments)) = dict_get(entry, b"path") else {
            return Err(malformed("file entry is missing its path"));
        };
        let mut parts = Vec::with_capacity(segments.len());
        for segment in segments {
            match segment {
                Value::Bytes(bytes) => parts.push(String::from_utf8_lossy(bytes).into_owned()),
                _ => return Err(malformed("path segment is not a byte string")),
            }
        }
        if parts.is_empty() {
            return Err(malformed("file entry has an empty path"));
        }
        total = total
            .checked_add(size_bytes)
            .ok_or_else(|| malformed("file sizes overflow"))?;
        files.push(ResolvedFile {
            path: parts.join("/"),
            size_bytes,
        });
    }
    Ok((files, total))
}

fn single_file_listing(
    entries: &[(Vec<u8>, Value)],
    name: Option<&str>,
) -> Result<(Vec<ResolvedFile>, u64), SpecError> {
    let size_bytes = entry_length(entries)?;
    let path = name.unwrap_or("data").to_string();
    Ok((vec![ResolvedFile { path, size_bytes }], size_bytes))
}

fn entry_length(entries: &[(Vec<u8>, Value)]) -> Result<u64, SpecError> {
    match dict_get(entries, b"length") {
        Some(Value::Int(length)) => {
            u64::try_from(*length).map_err(|_| malformed("negative file length"))
        }
        _ => Err(malformed("missing file length")),
    }
}

fn dict_get<'a>(entries: &'a [(Vec<u8>, Value)], key: &[u8]) -> Option<&'a Value> {
    entries
        .iter()
        .find(|(entry_key, _)| entry_key == key)
        .map(|(_, value)| value)
}

fn parse_value(data: &[u8], pos: usize) -> Result<(Value, usize), SpecError> {
    match data.get(pos) {
        Some(b'i') => parse_int(data, pos + 1),
        Some(b'l') => {
            let mut items = Vec::new();
            let mut cursor = pos + 1;
            while data.get(cursor) != Some(&b'e') {
                let (item, next) = parse_value(data, cursor)?;
                items.push(item);
                cursor = next;
            }
            if cursor >= data.len() {
                return Err(malformed("unterminated list"));
            }
            Ok((Value::List(items), cursor + 1))
        }
        Some(b'd') => {
            let mut entries = Vec::new();
            let mut cursor = pos + 1;
            while data.get(cursor) != Some(&b'e') {
                let (key, next) = match parse_value(data, cursor)? {
                    (Value::Bytes(key), next) => (key, next),
                    _ => return Err(malformed("dictionary key is not a byte string")),
                };
                let (value, next) = parse_value(data, next)?;
                entries.push((key, value));
                cursor = next;
            }
            if cursor >= data.len() {
                return Err(malformed("unterminated dictionary"));
            }
            Ok((Value::Dict(entries), cursor + 1))
        }
        Some(b'0'..=b'9') => parse_bytes(data, pos),
        Some(_) => Err(malformed("unexpected prefix byte")),
        None => Err(malformed("unexpected end of input")),
    }
}

fn parse_int(data: &[u8], pos: usize) -> Result<(Value, usize), SpecError> {
    let end = data[pos..]
        .iter()
        .position(|byte| *byte == b'e')
        .map(|offset| pos + offset)
        .ok_or_else(|| malformed("unterminated integer"))?;
    let text = std::str::from_utf8(&data[pos..end]).map_err(|_| malformed("invalid integer"))?;
    let value: i64 = text.parse().map_err(|_| malformed("invalid integer"))?;
    Ok((Value::Int(value), end + 1))
}

fn parse_bytes(data: &[u8], pos: usize) -> Result<(Value, usize), SpecError> {
    let colon = data[pos..]
        .iter()
        .position(|byte| *byte == b':')
        .map(|offset| pos + offset)
        .ok_or_else(|| malformed("unterminated byte string length"))?;
    let text =
        std::str::from_utf8(&data[pos..colon]).map_err(|_| malformed("invalid string length"))?;
    let length: usize = text.parse().map_err(|_| malformed("invalid string length"))?;
    let start = colon + 1;
    let end = start
        .checked_add(length)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| malformed("byte string exceeds the payload"))?;
    Ok((Value::Bytes(data[start..end].to_vec()), end))
}

const fn malformed(reason: &'static str) -> SpecError {
    SpecError::Metainfo { reason }
}
