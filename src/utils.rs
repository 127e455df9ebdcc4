use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde_json::Value;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{CONVERSATIONS_MEMBER, ConvertError};
use crate::importer::Record;

/// Configuration required to run a conversion.
/// This decouples the logic from how the arguments were parsed (CLI/Config file).
#[derive(Clone, Debug)]
pub struct ConvertConfig {
    pub export_path: PathBuf,
    pub db_path: PathBuf,
    pub quiet: bool,
}

/// Row counts written by one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConvertStats {
    pub conversations: usize,
    pub messages: usize,
    pub artifacts: usize,
}

/// Read an export from disk: either a raw `conversations.json` document or
/// the ZIP archive Claude.ai hands out, which contains it.
pub fn load_export(path: &Path) -> Result<Vec<Record>> {
    let bytes =
        fs::read(path).wrap_err_with(|| format!("Failed to read export: {}", path.display()))?;
    Ok(parse_export(bytes)?)
}

/// Parses export bytes, unpacking the archive if needed.
///
/// Archives are recognised by their leading signature. Input that is not
/// valid JSON gets a second chance as an archive, which covers ZIPs with
/// data prepended (self-extracting stubs).
pub fn parse_export(bytes: Vec<u8>) -> Result<Vec<Record>, ConvertError> {
    if infer::archive::is_zip(&bytes) {
        return parse_conversations(&zip_member(bytes)?);
    }
    match parse_conversations(&bytes) {
        Err(ConvertError::InvalidInput) => parse_conversations(&zip_member(bytes)?),
        parsed => parsed,
    }
}

/// Reads the conversations member out of a ZIP archive.
pub fn zip_member(bytes: Vec<u8>) -> Result<Vec<u8>, ConvertError> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|_| ConvertError::InvalidInput)?;
    let mut member = match archive.by_name(CONVERSATIONS_MEMBER) {
        Ok(member) => member,
        Err(ZipError::FileNotFound) => {
            return Err(ConvertError::MissingMember {
                name: CONVERSATIONS_MEMBER.to_string(),
            });
        }
        Err(_) => return Err(ConvertError::InvalidInput),
    };

    // No capacity hint: the declared size comes from the archive itself.
    let mut json = Vec::new();
    member
        .read_to_end(&mut json)
        .map_err(|_| ConvertError::InvalidInput)?;
    Ok(json)
}

/// Parses the conversation list. The root must be an array of objects.
pub fn parse_conversations(json: &[u8]) -> Result<Vec<Record>, ConvertError> {
    let root: Value = serde_json::from_slice(json).map_err(|_| ConvertError::InvalidInput)?;
    let Value::Array(items) = root else {
        return Err(ConvertError::NotAConversationList);
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => Ok(map),
            _ => Err(ConvertError::NotAConversationList),
        })
        .collect()
}
