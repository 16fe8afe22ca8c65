//! CSV ingestion: stream parsing and batch coordination

pub mod coordinator;

use crate::models::RawRecord;
use redi_common::{Error, Result};

/// Parse an uploaded CSV body into its headers and raw records.
///
/// Headers are kept verbatim; per-cell values are kept verbatim too
/// (trimming happens during decomposition so pending candidates preserve
/// the original row).
pub fn parse_csv(body: &[u8]) -> Result<(Vec<String>, Vec<RawRecord>)> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(body);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| Error::InvalidInput(format!("Failed to read CSV headers: {}", e)))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    if headers.is_empty() {
        return Err(Error::InvalidInput("CSV file has no header row".to_string()));
    }

    let mut records = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            Error::InvalidInput(format!("Failed to parse CSV row {}: {}", index + 1, e))
        })?;
        let pairs = headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| (header.clone(), value.to_string()))
            .collect();
        records.push(RawRecord::from_pairs(pairs));
    }

    Ok((headers, records))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_headers_and_rows() {
        let body = b"APN,First Name\n123,Jane\n456,John\n";
        let (headers, records) = parse_csv(body).unwrap();
        assert_eq!(headers, vec!["APN", "First Name"]);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("APN"), Some("123"));
        assert_eq!(records[1].get("First Name"), Some("John"));
    }

    #[test]
    fn short_rows_tolerated() {
        let body = b"APN,First Name,Last Name\n123,Jane\n";
        let (_, records) = parse_csv(body).unwrap();
        assert_eq!(records[0].get("Last Name"), None);
    }

    #[test]
    fn empty_body_rejected() {
        assert!(parse_csv(b"").is_err() || parse_csv(b"").unwrap().1.is_empty());
    }
}
