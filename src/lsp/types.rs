//! Path/URI conversion and location normalization for LSP operations.

use std::path::{Path, PathBuf};

use lsp_types::{GotoDefinitionResponse, Location, Url};
use serde_json::{Value, json};

use crate::error::LspError;
use crate::lsp::LspResult;

/// A navigation target normalized for editor consumption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// Absolute, percent-decoded filesystem path.
    pub path: PathBuf,
    /// 1-based line number.
    pub line: u32,
    /// Column number. Definition results report 1-based columns; reference
    /// results keep the server's 0-based column. Each operation documents
    /// its convention.
    pub column: u32,
    /// The raw URI exactly as the server sent it.
    pub uri: String,
}

/// Converts a filesystem path to a `file://` URI.
///
/// Relative paths are resolved against the current directory; the path
/// does not have to exist.
pub fn path_to_uri(path: &Path) -> LspResult<Url> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| LspError::InvalidPath(format!("failed to get current directory: {e}")))?
            .join(path)
    };

    Url::from_file_path(&absolute)
        .map_err(|()| LspError::InvalidPath(absolute.display().to_string()))
}

/// Builds the `textDocument`/`position` parameter object shared by the
/// position-based requests. `line` and `character` are 0-based, as the
/// protocol counts them.
pub fn position_params(uri: &Url, line: u32, character: u32) -> Value {
    json!({
        "textDocument": { "uri": uri },
        "position": { "line": line, "character": character },
    })
}

enum ColumnBase {
    Zero,
    One,
}

/// Normalizes a `textDocument/definition` result.
///
/// The protocol documents an array of locations, but some servers answer
/// with a bare location object, and servers with link support answer with
/// location links; all three shapes are accepted. Columns are 1-based.
pub fn definition_locations(response: Value) -> LspResult<Vec<SourceLocation>> {
    if response.is_null() {
        return Ok(Vec::new());
    }

    let response: GotoDefinitionResponse = serde_json::from_value(response)
        .map_err(|e| LspError::ParseError(format!("definition response: {e}")))?;

    let locations = match response {
        GotoDefinitionResponse::Scalar(location) => vec![location],
        GotoDefinitionResponse::Array(locations) => locations,
        GotoDefinitionResponse::Link(links) => links
            .into_iter()
            .map(|link| Location {
                uri: link.target_uri,
                range: link.target_range,
            })
            .collect(),
    };

    locations
        .iter()
        .map(|location| to_source_location(location, &ColumnBase::One))
        .collect()
}

/// Normalizes a `textDocument/references` result.
///
/// A bare location object is accepted alongside the documented array.
/// Columns keep the server's 0-based numbering.
pub fn reference_locations(response: Value) -> LspResult<Vec<SourceLocation>> {
    let locations: Vec<Location> = match response {
        Value::Null => Vec::new(),
        value @ Value::Array(_) => serde_json::from_value(value)
            .map_err(|e| LspError::ParseError(format!("references response: {e}")))?,
        value @ Value::Object(_) => vec![
            serde_json::from_value(value)
                .map_err(|e| LspError::ParseError(format!("references response: {e}")))?,
        ],
        other => {
            return Err(LspError::ParseError(format!(
                "references response has unexpected shape: {other}"
            )));
        }
    };

    locations
        .iter()
        .map(|location| to_source_location(location, &ColumnBase::Zero))
        .collect()
}

fn to_source_location(location: &Location, base: &ColumnBase) -> LspResult<SourceLocation> {
    let path = location
        .uri
        .to_file_path()
        .map_err(|()| LspError::ParseError(format!("not a file URI: {}", location.uri)))?;

    let start = location.range.start;
    Ok(SourceLocation {
        path,
        line: start.line + 1,
        column: match base {
            ColumnBase::One => start.character + 1,
            ColumnBase::Zero => start.character,
        },
        uri: location.uri.to_string(),
    })
}
