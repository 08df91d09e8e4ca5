//! OLE compound traversal of the VBA project binary

use super::compression::{self, OvbaError};
use super::dir::{self, DirError};
use encoding_rs::{
    BIG5, EUC_KR, Encoding, GBK, SHIFT_JIS, UTF_8, WINDOWS_874, WINDOWS_1250, WINDOWS_1251,
    WINDOWS_1252, WINDOWS_1253, WINDOWS_1254, WINDOWS_1255, WINDOWS_1256, WINDOWS_1257,
    WINDOWS_1258,
};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use thiserror::Error;

/// One code unit recovered from the project binary, before any kind or
/// name inference is applied.
#[derive(Debug, Clone)]
pub(crate) struct ParsedModule {
    /// Module name with the extension implied by its recorded type
    pub filename: String,
    /// Path of the source stream inside the compound file
    pub stream_path: String,
    pub code: String,
}

#[derive(Debug, Error)]
pub(crate) enum ProjectError {
    #[error("not an OLE compound file: {0}")]
    Compound(std::io::Error),
    #[error("project has no VBA/dir stream")]
    MissingDirStream,
    #[error("failed to read stream {path}: {source}")]
    Stream {
        path: String,
        source: std::io::Error,
    },
    #[error("compressed container error in {path}: {source}")]
    Container { path: String, source: OvbaError },
    #[error(transparent)]
    Dir(#[from] DirError),
}

/// Parse a `vbaProject.bin` image into its modules.
///
/// Permissive where possible: metadata that is missing falls back to
/// defaults, and only structural failures (no dir stream, undecodable
/// containers) surface as errors.
pub(crate) fn parse_project(data: &[u8]) -> Result<Vec<ParsedModule>, ProjectError> {
    let mut ole =
        cfb::CompoundFile::open(Cursor::new(data)).map_err(ProjectError::Compound)?;

    let dir_container = read_stream(&mut ole, "VBA/dir")?.ok_or(ProjectError::MissingDirStream)?;
    let dir_bytes = compression::decompress(&dir_container).map_err(|source| {
        ProjectError::Container {
            path: "VBA/dir".to_string(),
            source,
        }
    })?;

    let encoding = dir::detect_codepage(&dir_bytes)
        .map(encoding_for_codepage)
        .unwrap_or(WINDOWS_1252);
    let info = dir::parse(&dir_bytes, encoding)?;

    // The PROJECT stream classifies modules by kind; used when the dir
    // stream carried no usable type record.
    let kind_lines = match read_stream(&mut ole, "PROJECT")? {
        Some(bytes) => parse_project_stream_kinds(&decode(&bytes, encoding)),
        None => HashMap::new(),
    };

    let mut modules = Vec::new();
    for entry in &info.modules {
        let stream_path = format!("VBA/{}", entry.stream_name);
        let Some(stream) = read_stream(&mut ole, &stream_path)? else {
            continue;
        };

        let offset = entry.text_offset.unwrap_or(0).min(stream.len());
        let source = compression::decompress(&stream[offset..]).map_err(|source| {
            ProjectError::Container {
                path: stream_path.clone(),
                source,
            }
        })?;

        let extension = entry
            .type_id
            .and_then(extension_for_type)
            .or_else(|| kind_lines.get(entry.name.as_str()).copied());
        let filename = match extension {
            Some(ext) => format!("{}{}", entry.name, ext),
            None => entry.name.clone(),
        };

        modules.push(ParsedModule {
            filename,
            stream_path,
            code: decode(&source, encoding),
        });
    }

    Ok(modules)
}

fn read_stream<R: Read + std::io::Seek>(
    ole: &mut cfb::CompoundFile<R>,
    path: &str,
) -> Result<Option<Vec<u8>>, ProjectError> {
    if !ole.is_stream(path) {
        return Ok(None);
    }
    let mut stream = ole.open_stream(path).map_err(|source| ProjectError::Stream {
        path: path.to_string(),
        source,
    })?;
    let mut data = Vec::new();
    stream
        .read_to_end(&mut data)
        .map_err(|source| ProjectError::Stream {
            path: path.to_string(),
            source,
        })?;
    Ok(Some(data))
}

/// Map `Module=` / `Class=` / `Document=` / `BaseClass=` lines of the
/// PROJECT stream to the extension each kind exports with.
fn parse_project_stream_kinds(text: &str) -> HashMap<String, &'static str> {
    let mut kinds = HashMap::new();
    for line in text.lines().map(str::trim) {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        // Document lines carry a trailing `/&H...` version suffix.
        let name = value.trim_matches('"').split('/').next().unwrap_or(value);
        let ext = match key {
            "Module" => ".bas",
            "Class" | "Document" => ".cls",
            "BaseClass" => ".frm",
            _ => continue,
        };
        kinds.insert(name.to_string(), ext);
    }
    kinds
}

fn extension_for_type(type_id: u16) -> Option<&'static str> {
    match type_id {
        0x0000 => Some(".bas"),
        0x0001 | 0x0002 => Some(".cls"),
        0x0003 => Some(".frm"),
        _ => None,
    }
}

fn encoding_for_codepage(codepage: u16) -> &'static Encoding {
    match codepage {
        874 => WINDOWS_874,
        932 => SHIFT_JIS,
        936 => GBK,
        949 => EUC_KR,
        950 => BIG5,
        1250 => WINDOWS_1250,
        1251 => WINDOWS_1251,
        1253 => WINDOWS_1253,
        1254 => WINDOWS_1254,
        1255 => WINDOWS_1255,
        1256 => WINDOWS_1256,
        1257 => WINDOWS_1257,
        1258 => WINDOWS_1258,
        65001 => UTF_8,
        _ => WINDOWS_1252,
    }
}

fn decode(bytes: &[u8], encoding: &'static Encoding) -> String {
    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vba::dir::push_record;
    use std::io::Write;

    fn build_project_bin(modules: &[(&str, u16, &str)]) -> Vec<u8> {
        let mut dir_bytes = Vec::new();
        push_record(&mut dir_bytes, 0x0003, &1252u16.to_le_bytes());
        push_record(&mut dir_bytes, 0x0004, b"VBAProject");
        for (name, type_id, _) in modules {
            push_record(&mut dir_bytes, 0x0019, name.as_bytes());
            let mut stream_name = name.as_bytes().to_vec();
            stream_name.extend_from_slice(&0u16.to_le_bytes());
            push_record(&mut dir_bytes, 0x001A, &stream_name);
            push_record(&mut dir_bytes, 0x0021, &type_id.to_le_bytes());
            push_record(&mut dir_bytes, 0x0031, &0u32.to_le_bytes());
        }

        let cursor = Cursor::new(Vec::new());
        let mut ole = cfb::CompoundFile::create(cursor).unwrap();
        {
            let mut s = ole.create_stream("PROJECT").unwrap();
            s.write_all(b"ID=\"{0}\"\r\nName=\"VBAProject\"\r\n").unwrap();
        }
        ole.create_storage("VBA").unwrap();
        {
            let mut s = ole.create_stream("VBA/dir").unwrap();
            s.write_all(&compression::compress(&dir_bytes)).unwrap();
        }
        for (name, _, code) in modules {
            let mut s = ole.create_stream(&format!("VBA/{name}")).unwrap();
            s.write_all(&compression::compress(code.as_bytes())).unwrap();
        }
        ole.into_inner().into_inner()
    }

    #[test]
    fn recovers_module_source() {
        let bin = build_project_bin(&[
            ("Module1", 0x0000, "Sub Hello()\r\nEnd Sub\r\n"),
            ("Hoja1", 0x0002, "Private Sub Worksheet_Change()\r\nEnd Sub\r\n"),
        ]);
        let modules = parse_project(&bin).unwrap();
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0].filename, "Module1.bas");
        assert_eq!(modules[0].stream_path, "VBA/Module1");
        assert!(modules[0].code.contains("Sub Hello"));
        assert_eq!(modules[1].filename, "Hoja1.cls");
    }

    #[test]
    fn kind_falls_back_to_project_stream_lines() {
        let kinds = parse_project_stream_kinds(
            "Module=Module1\r\nClass=Customer\r\nDocument=ThisWorkbook/&H00000000\r\nBaseClass=UserForm1\r\n",
        );
        assert_eq!(kinds.get("Module1"), Some(&".bas"));
        assert_eq!(kinds.get("Customer"), Some(&".cls"));
        assert_eq!(kinds.get("ThisWorkbook"), Some(&".cls"));
        assert_eq!(kinds.get("UserForm1"), Some(&".frm"));
    }

    #[test]
    fn garbage_is_not_a_compound_file() {
        assert!(matches!(
            parse_project(b"not an ole file"),
            Err(ProjectError::Compound(_))
        ));
    }
}
