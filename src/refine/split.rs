//! Splitting raw publisher responses into per-paper fragments.
//!
//! Batched responses (arXiv Atom feeds, Springer Nature JSON record lists)
//! are cut into one fragment per paper, in the order the response lists
//! them. Publishers that are requested one paper at a time pass their body
//! through untouched.

use crate::models::Domain;
use quick_xml::Reader;
use quick_xml::events::Event;
use quick_xml::name::QName;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SplitError {
    #[error("malformed XML response: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed JSON response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response has no `records` array")]
    MissingRecords,
}

/// Split one raw response into the fragments for the papers it covers.
pub fn split(domain: Domain, raw: &str) -> Result<Vec<String>, SplitError> {
    match domain {
        Domain::Arxiv => split_atom_entries(raw),
        Domain::Springer | Domain::Nature => split_records(raw),
        Domain::Ieee | Domain::Elsevier => Ok(vec![raw.to_string()]),
    }
}

/// Cut every top-level `<entry>` element out of an Atom document verbatim.
pub fn split_atom_entries(raw: &str) -> Result<Vec<String>, SplitError> {
    let mut reader = Reader::from_str(raw);
    let mut fragments = Vec::new();

    loop {
        let start = reader.buffer_position() as usize;
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"entry" => {
                let name = e.name().as_ref().to_vec();
                reader.read_to_end(QName(&name))?;
                let end = reader.buffer_position() as usize;
                fragments.push(raw[start..end].to_string());
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(fragments)
}

/// Serialize every element of the top-level `records` array on its own.
pub fn split_records(raw: &str) -> Result<Vec<String>, SplitError> {
    let mut value: Value = serde_json::from_str(raw)?;
    let records = match value.get_mut("records").map(Value::take) {
        Some(Value::Array(records)) => records,
        _ => return Err(SplitError::MissingRecords),
    };
    records
        .iter()
        .map(|record| serde_json::to_string(record).map_err(SplitError::from))
        .collect()
}
