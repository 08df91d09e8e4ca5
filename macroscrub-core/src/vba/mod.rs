//! Macro extraction from the VBA project binary stream

pub mod compression;
pub mod dir;
mod project;

use crate::container::{WorkingTree, locate};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Well-known filename of the VBA project stream inside the container.
pub const PROJECT_STREAM_NAME: &str = "vbaproject.bin";

/// Keywords marking a code unit as attached to a workbook or worksheet
/// object. `hoja` covers workbooks produced by Spanish-locale hosts.
const DOCUMENT_KEYWORDS: [&str; 3] = ["thisworkbook", "sheet", "hoja"];

/// VBA code-unit category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    Standard,
    Class,
    Document,
    Form,
}

impl ModuleKind {
    /// Extension used when exporting a module of this kind
    pub fn extension(&self) -> &'static str {
        match self {
            ModuleKind::Form => ".frm",
            ModuleKind::Class | ModuleKind::Document => ".cls",
            ModuleKind::Standard => ".bas",
        }
    }
}

impl std::fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ModuleKind::Standard => "standard",
            ModuleKind::Class => "class",
            ModuleKind::Document => "document",
            ModuleKind::Form => "form",
        };
        write!(f, "{label}")
    }
}

/// One VBA code unit extracted from the project stream
#[derive(Debug, Clone, Serialize)]
pub struct MacroModule {
    /// Original name from the binary stream, extension included
    pub filename: String,
    /// Stream path inside the compound file
    pub stream_path: String,
    /// Inferred name, never empty
    pub module_name: String,
    pub kind: ModuleKind,
    /// Raw source text
    pub code: String,
    /// Set when the module was exported to disk
    pub export_path: Option<PathBuf>,
}

/// Result of one extraction pass. Absence of macros and parse failures are
/// both valid outcomes, reported through `warnings`.
#[derive(Debug, Default, Clone, Serialize)]
pub struct MacroScan {
    pub modules: Vec<MacroModule>,
    pub warnings: Vec<String>,
}

/// Locate the VBA project stream anywhere under the tree. First match wins.
pub fn find_project_stream(tree: &WorkingTree) -> Option<PathBuf> {
    locate::find_file_ci(tree.root(), PROJECT_STREAM_NAME)
}

/// Extract every code module from the VBA project stream.
///
/// Never fails: a missing stream or an unparseable binary yields an empty
/// scan with a warning, since workbooks without macros are a common case.
pub fn extract_macros(tree: &WorkingTree, export_dir: Option<&Path>) -> MacroScan {
    let mut scan = MacroScan::default();

    let Some(path) = find_project_stream(tree) else {
        scan.warnings
            .push("no VBA project stream found in the container".to_string());
        return scan;
    };

    let data = match fs::read(&path) {
        Ok(data) => data,
        Err(e) => {
            scan.warnings
                .push(format!("could not read {}: {e}", path.display()));
            return scan;
        }
    };

    let parsed = match project::parse_project(&data) {
        Ok(parsed) => parsed,
        Err(e) => {
            scan.warnings
                .push(format!("could not parse the VBA project binary: {e}"));
            return scan;
        }
    };

    for unit in parsed {
        let module_name = infer_module_name(&unit.filename, &unit.stream_path);
        let kind = infer_kind(&unit.filename, &unit.stream_path);
        let mut module = MacroModule {
            filename: unit.filename,
            stream_path: unit.stream_path,
            module_name,
            kind,
            code: unit.code,
            export_path: None,
        };
        if let Some(dir) = export_dir {
            match export_module(&module, dir) {
                Ok(path) => module.export_path = Some(path),
                Err(e) => scan
                    .warnings
                    .push(format!("could not export {}: {e}", module.module_name)),
            }
        }
        scan.modules.push(module);
    }

    scan
}

/// Infer a module name: strip a recognized extension from the filename,
/// fall back to the last stream path segment, then to `Module`.
pub fn infer_module_name(filename: &str, stream_path: &str) -> String {
    let mut name = filename.to_string();
    for ext in [".bas", ".cls", ".frm"] {
        let Some(start) = name.len().checked_sub(ext.len()) else {
            continue;
        };
        if name.is_char_boundary(start) && name[start..].eq_ignore_ascii_case(ext) {
            name.truncate(start);
            break;
        }
    }
    if name.is_empty() {
        name = stream_path
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
    }
    if name.is_empty() {
        name = "Module".to_string();
    }
    name
}

/// Infer the module kind from its filename and stream path.
///
/// Precedence: form markers, then document keywords (so `Sheet1.cls` lands
/// as a document module, not a class), then the class extension, then
/// standard.
pub fn infer_kind(filename: &str, stream_path: &str) -> ModuleKind {
    let name = filename.to_lowercase();
    let stream = stream_path.to_lowercase();

    if name.ends_with(".frm") || name.contains("userform") {
        return ModuleKind::Form;
    }
    if DOCUMENT_KEYWORDS
        .iter()
        .any(|k| name.contains(k) || stream.contains(k))
    {
        return ModuleKind::Document;
    }
    if name.ends_with(".cls") {
        return ModuleKind::Class;
    }
    ModuleKind::Standard
}

/// Replace every character that is not alphanumeric, underscore or hyphen.
fn sanitize_module_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Write one module to `export_dir` with a sanitized filename, the
/// extension implied by its kind and CRLF line endings.
fn export_module(module: &MacroModule, export_dir: &Path) -> std::io::Result<PathBuf> {
    fs::create_dir_all(export_dir)?;

    let mut filename = sanitize_module_name(&module.module_name);
    let extension = module.kind.extension();
    if !filename.to_lowercase().ends_with(extension) {
        filename.push_str(extension);
    }

    let path = export_dir.join(filename);
    fs::write(&path, crlf_normalize(&module.code))?;
    Ok(path)
}

/// Normalize line endings to CRLF so the exported text opens cleanly in
/// the host editor.
fn crlf_normalize(code: &str) -> String {
    code.replace("\r\n", "\n").replace('\n', "\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_kind_wins_over_class_extension() {
        assert_eq!(infer_kind("Sheet1.cls", "VBA/Hoja1"), ModuleKind::Document);
        assert_eq!(infer_kind("Modulo.cls", "VBA/Hoja1"), ModuleKind::Document);
        assert_eq!(infer_kind("ThisWorkbook.cls", "VBA/ThisWorkbook"), ModuleKind::Document);
    }

    #[test]
    fn form_class_and_standard_kinds() {
        assert_eq!(infer_kind("UserForm1.frm", "VBA/UserForm1"), ModuleKind::Form);
        assert_eq!(infer_kind("MyDialog.frm", "VBA/MyDialog"), ModuleKind::Form);
        assert_eq!(infer_kind("Customer.cls", "VBA/Customer"), ModuleKind::Class);
        assert_eq!(infer_kind("Module1.bas", "VBA/Module1"), ModuleKind::Standard);
        assert_eq!(infer_kind("Module1", "VBA/Module1"), ModuleKind::Standard);
    }

    #[test]
    fn userform_marker_beats_extension() {
        assert_eq!(infer_kind("UserFormHelper.cls", "VBA/x"), ModuleKind::Form);
    }

    #[test]
    fn module_name_inference_falls_back() {
        assert_eq!(infer_module_name("Module1.bas", "VBA/Module1"), "Module1");
        assert_eq!(infer_module_name("Customer.CLS", "VBA/Customer"), "Customer");
        assert_eq!(infer_module_name("", "VBA/Stream9"), "Stream9");
        assert_eq!(infer_module_name("", ""), "Module");
    }

    #[test]
    fn sanitizes_export_names() {
        assert_eq!(sanitize_module_name("Mod 1/évil?"), "Mod_1_évil_");
        assert_eq!(sanitize_module_name("ok_name-2"), "ok_name-2");
    }

    #[test]
    fn export_appends_extension_and_crlf() {
        let dir = tempfile::tempdir().unwrap();
        let module = MacroModule {
            filename: "Module1.bas".to_string(),
            stream_path: "VBA/Module1".to_string(),
            module_name: "Module1".to_string(),
            kind: ModuleKind::Standard,
            code: "Sub A()\nEnd Sub\n".to_string(),
            export_path: None,
        };
        let path = export_module(&module, dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "Module1.bas");
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, "Sub A()\r\nEnd Sub\r\n");
    }

    #[test]
    fn missing_project_stream_yields_empty_scan() {
        let dir = tempfile::tempdir().unwrap();
        let tree = crate::container::unpack(dir.path()).unwrap();
        let scan = extract_macros(&tree, None);
        assert!(scan.modules.is_empty());
        assert_eq!(scan.warnings.len(), 1);
    }

    #[test]
    fn corrupt_project_stream_is_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let xl = dir.path().join("xl");
        fs::create_dir_all(&xl).unwrap();
        fs::write(xl.join("vbaProject.bin"), b"garbage").unwrap();

        let tree = crate::container::unpack(dir.path()).unwrap();
        let scan = extract_macros(&tree, None);
        assert!(scan.modules.is_empty());
        assert!(scan.warnings[0].contains("could not parse"));
    }
}
