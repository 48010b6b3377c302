use crate::error::{Result, TrafficError};
use crate::row::{Field, RawRecord};

/// Parse delimited text with a header row into raw records.
///
/// The header decides the column layout; unknown columns are ignored. A
/// header lacking a required column fails the whole source. Fields may be
/// double-quoted, in which case they can contain the delimiter and `""`
/// stands for a literal quote. Records span exactly one line.
pub fn parse_delimited(text: &str, delimiter: char) -> Result<Vec<RawRecord>> {
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());

    let header = lines
        .next()
        .ok_or_else(|| TrafficError::Source("empty source, no header".to_string()))?;
    let header = header.trim_start_matches('\u{feff}');
    let layout: Vec<Option<Field>> = split_fields(header, delimiter)
        .iter()
        .map(|name| Field::from_column(name.trim()))
        .collect();

    let missing: Vec<&str> = Field::REQUIRED
        .iter()
        .filter(|field| !layout.contains(&Some(**field)))
        .map(|field| field.column())
        .collect();
    if !missing.is_empty() {
        return Err(TrafficError::Source(format!(
            "header lacks required columns: {}",
            missing.join(", ")
        )));
    }

    Ok(lines
        .map(|line| {
            let mut record = RawRecord::new();
            for (field, value) in layout.iter().zip(split_fields(line, delimiter)) {
                if let Some(field) = field {
                    record.set(*field, value.trim());
                }
            }
            record
        })
        .collect())
}

fn split_fields(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            c if c == delimiter && !quoted => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "IdSession,IdPSX,IdSubscriber,StartSession,EndSession,Duartion,UpTx,DownTx\n\
        1,7,42,01.01.2024 00:01:00,,300,100,200\n\
        2,7,43,01.01.2024 00:02:00,01.01.2024 00:05:00,180,5,6\n";

    #[test]
    fn test_parse_comma() {
        let records = parse_delimited(CSV, ',').unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get(Field::SubscriberId), Some("42"));
        assert_eq!(records[0].get(Field::EndSession), Some(""));
        assert_eq!(records[1].get(Field::EndSession), Some("01.01.2024 00:05:00"));
        assert_eq!(records[1].get(Field::Duration), Some("180"));
    }

    #[test]
    fn test_parse_pipe_with_reordered_columns() {
        let text = "UpTx|DownTx|IdSubscriber|IdPSX|StartSession|EndSession|Extra\n\
            10|20|\"5\"|9|02.01.2024 10:00:00||x\n\n";
        let records = parse_delimited(text, '|').unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get(Field::UpBytes), Some("10"));
        assert_eq!(records[0].get(Field::SubscriberId), Some("5"));
        assert_eq!(records[0].get(Field::NodeId), Some("9"));
    }

    #[test]
    fn test_short_line_leaves_fields_missing() {
        let text = "IdPSX,IdSubscriber,StartSession,EndSession,UpTx,DownTx\n7,42\n";
        let records = parse_delimited(text, ',').unwrap();
        assert_eq!(records[0].get(Field::SubscriberId), Some("42"));
        assert_eq!(records[0].get(Field::UpBytes), None);
    }

    #[test]
    fn test_quoted_delimiter_keeps_columns_aligned() {
        let text = "IdSession,IdPSX,IdSubscriber,StartSession,EndSession,UpTx,DownTx\n\
            \"a,b\",7,42,01.01.2024 00:01:00,,100,200\n";
        let records = parse_delimited(text, ',').unwrap();
        assert_eq!(records[0].get(Field::NodeId), Some("7"));
        assert_eq!(records[0].get(Field::SubscriberId), Some("42"));
        assert_eq!(records[0].get(Field::UpBytes), Some("100"));
        assert_eq!(records[0].get(Field::DownBytes), Some("200"));
    }

    #[test]
    fn test_split_fields() {
        assert_eq!(split_fields("a|\"b|c\"|d", '|'), vec!["a", "b|c", "d"]);
        assert_eq!(split_fields("\"say \"\"hi\"\"\",,", ','), vec!["say \"hi\"", "", ""]);
        assert_eq!(split_fields("", ','), vec![""]);
    }

    #[test]
    fn test_missing_columns_fail_source() {
        let err = parse_delimited("IdPSX,IdSubscriber\n7,42\n", ',').unwrap_err();
        assert!(err.to_string().contains("UpTx"));
        assert!(parse_delimited("", ',').is_err());
    }
}
