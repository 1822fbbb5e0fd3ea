use tracing::debug;

use super::types::{CoverImage, ParsedDocument, TextUnit, COVER_CONTENT_TYPE};
use crate::error::AssemblyError;
use crate::utils::temp::random_id;

/// Package ordered units and cover bytes into a `ParsedDocument`.
///
/// Unit order is kept as given; readers sort by ordinal before calling.
pub fn assemble(units: Vec<TextUnit>, cover: Vec<u8>) -> Result<ParsedDocument, AssemblyError> {
    if units.is_empty() {
        return Err(AssemblyError::EmptyDocument);
    }
    if cover.is_empty() {
        return Err(AssemblyError::MissingCover);
    }

    let cover = CoverImage {
        filename: format!("{}.jpeg", random_id()),
        content_type: COVER_CONTENT_TYPE,
        data: cover,
    };
    debug!(units = units.len(), cover_bytes = cover.data.len(), cover = %cover.filename, "Assembled document");

    Ok(ParsedDocument { units, cover })
}
