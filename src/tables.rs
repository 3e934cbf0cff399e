//! The one place file-format detection lives: a thin `TableSource`/`WorkbookWriter`
//! boundary, with CSV fully specified and XLSX handled only down to logical sheet
//! contents (rows of string cells) — binary workbook layout is explicitly out of scope.

use crate::error::AppError;
use std::io::{Cursor, Read, Write};

/// A table as read from an uploaded file: header cells plus string-only data rows, with
/// no further type interpretation — the value parsers own that.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn get(&self, row: &[String], header: &str) -> Option<String> {
        self.headers
            .iter()
            .position(|h| h == header)
            .and_then(|i| row.get(i))
            .cloned()
    }
}

/// A workbook ready to be written out: an ordered list of named sheets.
#[derive(Debug, Clone, Default)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, headers: Vec<String>) -> Self {
        Self {
            name: name.into(),
            headers,
            rows: Vec::new(),
        }
    }
}

/// Reads a raw table out of file bytes, given only a filename (used to pick the
/// format). This is the "format detection" boundary the spec names as an external
/// collaborator concern.
pub fn read_table(filename: &str, bytes: &[u8]) -> Result<RawTable, AppError> {
    let lower = filename.to_lowercase();
    if lower.ends_with(".xlsx") || lower.ends_with(".xls") {
        read_xlsx(bytes)
    } else {
        read_csv(bytes)
    }
}

/// CSV reading: detect a UTF-8 BOM first, fall back to Latin-1 when the bytes are not
/// valid UTF-8, then sniff the delimiter (semicolon first, matching the reference's own
/// "try semicolon before comma" convention, then comma).
pub fn read_csv(bytes: &[u8]) -> Result<RawTable, AppError> {
    let text = decode_text(bytes);
    let delimiter = if text.lines().next().unwrap_or("").contains(';') {
        b';'
    } else {
        b','
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(crate::normalize::clean_column_name)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|c| c.to_string()).collect());
    }

    Ok(RawTable { headers, rows })
}

fn decode_text(bytes: &[u8]) -> String {
    let stripped = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match std::str::from_utf8(stripped) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1254.decode(stripped);
            decoded.into_owned()
        }
    }
}

/// Writes a `RawTable`-shaped set of rows out as CSV, UTF-8 BOM-prefixed the way the
/// teacher's own `export_to_csv` does for Excel compatibility.
pub fn write_csv(headers: &[String], rows: &[Vec<String>]) -> Result<Vec<u8>, AppError> {
    let mut out = vec![0xEF, 0xBB, 0xBF];
    let mut writer = csv::WriterBuilder::new().delimiter(b';').from_writer(&mut out);
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush().map_err(std::io::Error::from)?;
    drop(writer);
    Ok(out)
}

// ---------------------------------------------------------------------------
// XLSX: logical sheet contents only (shared strings + sheet XML inside a zip container).
// No styling, formulas, merged cells, or column widths are read or written.
// ---------------------------------------------------------------------------

fn read_xlsx(bytes: &[u8]) -> Result<RawTable, AppError> {
    let sheets = read_xlsx_sheets(bytes)?;
    let first = sheets
        .into_iter()
        .next()
        .ok_or_else(|| AppError::InputFormat("xlsx dosyasinda sayfa bulunamadi".to_string()))?;
    let mut rows_iter = first.rows.into_iter();
    let headers = rows_iter
        .next()
        .map(|r| r.into_iter().map(|c| crate::normalize::clean_column_name(&c)).collect())
        .unwrap_or_default();
    Ok(RawTable {
        headers,
        rows: rows_iter.collect(),
    })
}

/// Reads every sheet of an xlsx archive into plain string rows, resolving shared strings
/// and inline strings, ignoring numeric formatting (numbers come back as their literal
/// cell text).
pub fn read_xlsx_sheets(bytes: &[u8]) -> Result<Vec<Sheet>, AppError> {
    let reader = Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(reader)?;

    let shared_strings = read_shared_strings(&mut archive)?;

    let mut sheet_paths: Vec<String> = (0..archive.len())
        .filter_map(|i| {
            let name = archive.by_index(i).ok()?.name().to_string();
            if name.starts_with("xl/worksheets/sheet") && name.ends_with(".xml") {
                Some(name)
            } else {
                None
            }
        })
        .collect();
    sheet_paths.sort();

    let mut sheets = Vec::new();
    for (n, path) in sheet_paths.iter().enumerate() {
        let mut file = archive.by_name(path)?;
        let mut xml = String::new();
        file.read_to_string(&mut xml)?;
        let rows = parse_sheet_xml(&xml, &shared_strings)?;
        sheets.push(Sheet {
            name: format!("Sheet{}", n + 1),
            headers: Vec::new(),
            rows,
        });
    }
    Ok(sheets)
}

fn read_shared_strings(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
) -> Result<Vec<String>, AppError> {
    let mut file = match archive.by_name("xl/sharedStrings.xml") {
        Ok(f) => f,
        Err(_) => return Ok(Vec::new()),
    };
    let mut xml = String::new();
    file.read_to_string(&mut xml)?;

    use quick_xml::events::Event;
    use quick_xml::reader::Reader;

    let mut reader = Reader::from_str(&xml);
    reader.config_mut().trim_text(false);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| AppError::InputFormat(format!("xlsx paylasilan metin okunamadi: {e}")))?;
        match event {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_text = true,
            Event::End(e) if e.local_name().as_ref() == b"t" => in_text = false,
            Event::End(e) if e.local_name().as_ref() == b"si" => {
                strings.push(std::mem::take(&mut current));
            }
            Event::Text(t) if in_text => {
                current.push_str(&t.unescape().unwrap_or_default());
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn parse_sheet_xml(xml: &str, shared: &[String]) -> Result<Vec<Vec<String>>, AppError> {
    use quick_xml::events::{BytesStart, Event};
    use quick_xml::reader::Reader;

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut current_row: Vec<String> = Vec::new();
    let mut current_col: usize = 0;
    let mut cell_type: Option<String> = None;
    let mut in_value = false;
    let mut value_buf = String::new();
    let mut buf = Vec::new();

    fn attr(e: &BytesStart, name: &str) -> Option<String> {
        e.attributes().flatten().find_map(|a| {
            if a.key.as_ref() == name.as_bytes() {
                Some(String::from_utf8_lossy(&a.value).to_string())
            } else {
                None
            }
        })
    }

    fn col_index(cell_ref: &str) -> usize {
        let mut idx = 0usize;
        for c in cell_ref.chars() {
            if c.is_ascii_alphabetic() {
                idx = idx * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
            } else {
                break;
            }
        }
        idx.saturating_sub(1)
    }

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| AppError::InputFormat(format!("xlsx sayfasi okunamadi: {e}")))?;
        match event {
            Event::Start(e) if e.local_name().as_ref() == b"row" => {
                current_row = Vec::new();
            }
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                cell_type = attr(&e, "t");
                current_col = attr(&e, "r")
                    .map(|r| col_index(&r))
                    .unwrap_or(current_row.len());
                while current_row.len() <= current_col {
                    current_row.push(String::new());
                }
            }
            Event::Start(e) if e.local_name().as_ref() == b"v" => {
                in_value = true;
                value_buf.clear();
            }
            Event::End(e) if e.local_name().as_ref() == b"v" => {
                in_value = false;
                let resolved = if cell_type.as_deref() == Some("s") {
                    value_buf
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| shared.get(i).cloned())
                        .unwrap_or_default()
                } else {
                    value_buf.clone()
                };
                if current_col < current_row.len() {
                    current_row[current_col] = resolved;
                }
            }
            Event::Text(t) if in_value => {
                value_buf.push_str(&t.unescape().unwrap_or_default());
            }
            Event::End(e) if e.local_name().as_ref() == b"row" => {
                rows.push(std::mem::take(&mut current_row));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(rows)
}

/// Writes a `Workbook` as a minimal, valid `.xlsx` archive: one worksheet XML part per
/// sheet, a shared `sharedStrings.xml`, and the handful of fixed relationship/content-
/// type parts every xlsx reader needs — no styles, column widths, or formulas.
pub fn write_xlsx(workbook: &Workbook) -> Result<Vec<u8>, AppError> {
    let mut shared_strings: Vec<String> = Vec::new();
    let mut string_index = std::collections::HashMap::new();
    let mut intern = |s: &str| -> usize {
        if let Some(&i) = string_index.get(s) {
            return i;
        }
        let i = shared_strings.len();
        shared_strings.push(s.to_string());
        string_index.insert(s.to_string(), i);
        i
    };

    let mut sheet_xmls = Vec::new();
    for sheet in &workbook.sheets {
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
        );
        let mut write_row = |row_num: usize, cells: &[String], xml: &mut String| {
            xml.push_str(&format!(r#"<row r="{}">"#, row_num));
            for (c, cell) in cells.iter().enumerate() {
                let col = column_letter(c);
                let idx = intern(cell);
                xml.push_str(&format!(
                    r#"<c r="{col}{row_num}" t="s"><v>{idx}</v></c>"#
                ));
            }
            xml.push_str("</row>");
        };
        write_row(1, &sheet.headers, &mut xml);
        for (i, row) in sheet.rows.iter().enumerate() {
            write_row(i + 2, row, &mut xml);
        }
        xml.push_str("</sheetData></worksheet>");
        sheet_xmls.push(xml);
    }

    let mut shared_xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="0" uniqueCount="0">"#,
    );
    for s in &shared_strings {
        shared_xml.push_str(&format!("<si><t xml:space=\"preserve\">{}</t></si>", xml_escape(s)));
    }
    shared_xml.push_str("</sst>");

    let content_types = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>{}</Types>"#,
        (0..workbook.sheets.len())
            .map(|i| format!(
                r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
                i + 1
            ))
            .collect::<String>()
    );

    let root_rels = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

    let workbook_xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>{}</sheets></workbook>"#,
        workbook
            .sheets
            .iter()
            .enumerate()
            .map(|(i, s)| format!(
                r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
                xml_escape(&s.name),
                i + 1,
                i + 1
            ))
            .collect::<String>()
    );

    let workbook_rels = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{}<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/></Relationships>"#,
        (0..workbook.sheets.len())
            .map(|i| format!(
                r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.xml"/>"#,
                i + 1,
                i + 1
            ))
            .collect::<String>(),
        workbook.sheets.len() + 1
    );

    let mut buf = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        let options = zip::write::FileOptions::<()>::default()
            .compression_method(zip::CompressionMethod::Deflated);

        zip.start_file("[Content_Types].xml", options)?;
        zip.write_all(content_types.as_bytes())?;

        zip.start_file("_rels/.rels", options)?;
        zip.write_all(root_rels.as_bytes())?;

        zip.start_file("xl/workbook.xml", options)?;
        zip.write_all(workbook_xml.as_bytes())?;

        zip.start_file("xl/_rels/workbook.xml.rels", options)?;
        zip.write_all(workbook_rels.as_bytes())?;

        zip.start_file("xl/sharedStrings.xml", options)?;
        zip.write_all(shared_xml.as_bytes())?;

        for (i, xml) in sheet_xmls.iter().enumerate() {
            zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)?;
            zip.write_all(xml.as_bytes())?;
        }

        zip.finish()?;
    }
    Ok(buf.into_inner())
}

fn column_letter(mut idx: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (idx % 26) as u8) as char);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    letters.iter().rev().collect()
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_roundtrip_preserves_cells() {
        let headers = vec!["Sku".to_string(), "Ad".to_string()];
        let rows = vec![vec!["A-1".to_string(), "Matkap".to_string()]];
        let bytes = write_csv(&headers, &rows).unwrap();
        let table = read_csv(&bytes).unwrap();
        assert_eq!(table.headers, vec!["sku", "ad"]);
        assert_eq!(table.rows, rows);
    }

    #[test]
    fn csv_sniffs_semicolon_delimiter() {
        let bytes = "Sku;Ad\nA-1;Matkap\n".as_bytes();
        let table = read_csv(bytes).unwrap();
        assert_eq!(table.rows[0], vec!["A-1", "Matkap"]);
    }

    #[test]
    fn xlsx_roundtrip_preserves_rows() {
        let mut wb = Workbook::default();
        let mut sheet = Sheet::new("Data", vec!["Sku".to_string(), "Ad".to_string()]);
        sheet.rows.push(vec!["A-1".to_string(), "Matkap Ucu".to_string()]);
        wb.sheets.push(sheet);

        let bytes = write_xlsx(&wb).unwrap();
        let table = read_xlsx(&bytes).unwrap();
        assert_eq!(table.headers, vec!["sku", "ad"]);
        assert_eq!(table.rows, vec![vec!["A-1".to_string(), "Matkap Ucu".to_string()]]);
    }
}
