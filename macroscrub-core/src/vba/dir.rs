//! Record-level parsing of the decompressed `VBA/dir` stream

use encoding_rs::Encoding;
use thiserror::Error;

const PROJECTCODEPAGE: u16 = 0x0003;
const PROJECTNAME: u16 = 0x0004;
const MODULENAME: u16 = 0x0019;
const MODULESTREAMNAME: u16 = 0x001A;
const MODULETYPE: u16 = 0x0021;
const MODULETEXTOFFSET: u16 = 0x0031;

/// One module entry recovered from the dir stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEntry {
    pub name: String,
    pub stream_name: String,
    /// Raw module type id when the record carried one
    pub type_id: Option<u16>,
    /// Offset of the compressed source inside the module stream
    pub text_offset: Option<usize>,
}

/// Subset of the dir stream needed to recover module source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirInfo {
    pub project_name: Option<String>,
    pub modules: Vec<ModuleEntry>,
}

#[derive(Debug, Error)]
pub enum DirError {
    #[error("dir stream is truncated")]
    Truncated,
    #[error("dir record {id:#06x} claims {len} bytes beyond the stream end")]
    BadRecordLength { id: u16, len: usize },
}

/// Scan the record stream for a PROJECTCODEPAGE record without decoding
/// anything else.
pub fn detect_codepage(decompressed: &[u8]) -> Option<u16> {
    let mut records = RecordIter {
        data: decompressed,
        pos: 0,
    };
    records.find_map(|record| {
        let (id, data) = record.ok()?;
        (id == PROJECTCODEPAGE && data.len() >= 2)
            .then(|| u16::from_le_bytes([data[0], data[1]]))
    })
}

/// Parse the records we need: project name plus the module list with stream
/// names, type ids and text offsets. Unknown records are skipped.
pub fn parse(decompressed: &[u8], encoding: &'static Encoding) -> Result<DirInfo, DirError> {
    let mut project_name = None;
    let mut modules: Vec<ModuleEntry> = Vec::new();
    let mut current: Option<ModuleEntry> = None;

    let records = RecordIter {
        data: decompressed,
        pos: 0,
    };
    for record in records {
        let (id, data) = record?;
        match id {
            PROJECTNAME => project_name = Some(decode(data, encoding)),
            MODULENAME => {
                if let Some(module) = current.take() {
                    modules.push(module);
                }
                current = Some(ModuleEntry {
                    name: decode(data, encoding),
                    stream_name: String::new(),
                    type_id: None,
                    text_offset: None,
                });
            }
            MODULESTREAMNAME => {
                if let Some(module) = current.as_mut() {
                    // Some producers append a reserved u16 after the name.
                    module.stream_name = decode(trim_reserved_u16(data), encoding);
                }
            }
            MODULETYPE => {
                if let Some(module) = current.as_mut() {
                    if data.len() >= 2 {
                        module.type_id = Some(u16::from_le_bytes([data[0], data[1]]));
                    }
                }
            }
            MODULETEXTOFFSET => {
                if let Some(module) = current.as_mut() {
                    if data.len() >= 4 {
                        let offset =
                            u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
                        module.text_offset = Some(offset);
                    }
                }
            }
            _ => {}
        }
    }

    if let Some(module) = current.take() {
        modules.push(module);
    }

    // A missing stream name defaults to the module name.
    for module in &mut modules {
        if module.stream_name.is_empty() {
            module.stream_name = module.name.clone();
        }
    }

    Ok(DirInfo {
        project_name,
        modules,
    })
}

struct RecordIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for RecordIter<'a> {
    type Item = Result<(u16, &'a [u8]), DirError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }
        if self.pos + 6 > self.data.len() {
            self.pos = self.data.len();
            return Some(Err(DirError::Truncated));
        }

        let id = u16::from_le_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        let len = u32::from_le_bytes([
            self.data[self.pos + 2],
            self.data[self.pos + 3],
            self.data[self.pos + 4],
            self.data[self.pos + 5],
        ]) as usize;
        self.pos += 6;

        if self.pos + len > self.data.len() {
            self.pos = self.data.len();
            return Some(Err(DirError::BadRecordLength { id, len }));
        }
        let data = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Some(Ok((id, data)))
    }
}

fn trim_reserved_u16(bytes: &[u8]) -> &[u8] {
    if bytes.len() >= 2 && bytes[bytes.len() - 2..] == [0x00, 0x00] {
        &bytes[..bytes.len() - 2]
    } else {
        bytes
    }
}

fn decode(bytes: &[u8], encoding: &'static Encoding) -> String {
    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

/// Serialize one record; fixture/test helper mirroring the parser's layout.
pub fn push_record(out: &mut Vec<u8>, id: u16, data: &[u8]) {
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
}
