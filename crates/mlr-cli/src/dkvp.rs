//! A minimal DKVP (`key=value,key=value`) reader/writer — just enough to
//! drive `mlr` end to end over stdin/stdout. Other format codecs (CSV,
//! TSV, JSON, …) aren't implemented.

use std::io::{BufRead, Write};

use mlr_core::Record;

/// Parses one DKVP line into a [`Record`]. A field with no `=` is stored
/// under its 1-based positional index as the key, matching the reference
/// tool's handling of bare tokens.
pub fn parse_line(line: &str) -> Record {
    let mut rec = Record::new();
    for (i, field) in line.split(',').enumerate() {
        if field.is_empty() {
            continue;
        }
        match field.split_once('=') {
            Some((k, v)) => rec.put(k, v),
            None => rec.put((i + 1).to_string(), field),
        }
    }
    rec
}

/// Reads every line from `r` as a DKVP record stream.
pub fn read_all(r: impl BufRead) -> std::io::Result<Vec<Record>> {
    let mut out = Vec::new();
    for line in r.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        out.push(parse_line(&line));
    }
    Ok(out)
}

/// Renders one [`Record`] as a DKVP line (no trailing newline).
pub fn format_line(rec: &Record) -> String {
    rec.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(",")
}

/// Writes every record to `w`, one DKVP line per record.
pub fn write_all(mut w: impl Write, records: &[Record]) -> std::io::Result<()> {
    for rec in records {
        writeln!(w, "{}", format_line(rec))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_ordered_fields() {
        let rec = parse_line("a=1,b=2");
        assert_eq!(rec.field_names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(format_line(&rec), "a=1,b=2");
    }

    #[test]
    fn skips_blank_trailing_field() {
        let rec = parse_line("a=1,");
        assert_eq!(rec.field_names().collect::<Vec<_>>(), vec!["a"]);
    }
}
