//! Minimal single-sheet `.xlsx` writer.
//!
//! A workbook is a zip of SpreadsheetML parts. Strings are written inline and
//! formulas carry a cached value so viewers that do not recalculate still show
//! something; `fullCalcOnLoad` asks spreadsheet apps to recalculate on open.

use std::io::Write;
use zip::write::SimpleFileOptions;

pub const XLSX_MIME_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

/// One cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    /// Formula without the leading `=`, with its cached result (`None` = empty string)
    Formula { formula: String, cached: Option<f64> },
}

/// Spreadsheet column letters for a zero-based index (`0` -> `A`, `26` -> `AA`).
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // Control characters other than tab/newline are not allowed in XML 1.0.
            c if (c as u32) < 0x20 && c != '\t' && c != '\n' && c != '\r' => {}
            c => out.push(c),
        }
    }
    out
}

fn number(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        "0".to_string()
    }
}

fn cell_xml(reference: &str, cell: &Cell) -> String {
    match cell {
        Cell::Text(text) => format!(
            r#"<c r="{}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
            reference,
            escape_xml(text)
        ),
        Cell::Number(value) => format!(r#"<c r="{}"><v>{}</v></c>"#, reference, number(*value)),
        Cell::Formula {
            formula,
            cached: Some(value),
        } => format!(
            r#"<c r="{}"><f>{}</f><v>{}</v></c>"#,
            reference,
            escape_xml(formula),
            number(*value)
        ),
        Cell::Formula {
            formula,
            cached: None,
        } => format!(
            r#"<c r="{}" t="str"><f>{}</f><v></v></c>"#,
            reference,
            escape_xml(formula)
        ),
    }
}

fn sheet_xml(rows: &[Vec<Cell>]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, row) in rows.iter().enumerate() {
        let row_number = r + 1;
        xml.push_str(&format!(r#"<row r="{}">"#, row_number));
        for (c, cell) in row.iter().enumerate() {
            let reference = format!("{}{}", column_letter(c), row_number);
            xml.push_str(&cell_xml(&reference, cell));
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

fn workbook_xml(sheet_name: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets><calcPr fullCalcOnLoad="1"/></workbook>"#,
        escape_xml(sheet_name)
    )
}

/// Write `rows` as a single-sheet workbook.
pub fn write_workbook(sheet_name: &str, rows: &[Vec<Cell>]) -> Result<Vec<u8>, std::io::Error> {
    let mut buffer = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buffer));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        let parts: [(&str, String); 5] = [
            ("[Content_Types].xml", CONTENT_TYPES.to_string()),
            ("_rels/.rels", ROOT_RELS.to_string()),
            ("xl/workbook.xml", workbook_xml(sheet_name)),
            ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.to_string()),
            ("xl/worksheets/sheet1.xml", sheet_xml(rows)),
        ];
        for (name, contents) in parts {
            zip.start_file(name, options)?;
            zip.write_all(contents.as_bytes())?;
        }
        zip.finish()?;
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn read_part(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut contents = String::new();
        file.read_to_string(&mut contents).unwrap();
        contents
    }

    #[test]
    fn column_letters() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(10), "K");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(27), "AB");
        assert_eq!(column_letter(701), "ZZ");
        assert_eq!(column_letter(702), "AAA");
    }

    #[test]
    fn workbook_contains_all_parts() {
        let bytes = write_workbook("Sheet1", &[vec![Cell::Text("a".into())]]).unwrap();
        let archive = zip::ZipArchive::new(std::io::Cursor::new(&bytes[..])).unwrap();
        let mut names: Vec<_> = archive.file_names().map(|s| s.to_string()).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "[Content_Types].xml",
                "_rels/.rels",
                "xl/_rels/workbook.xml.rels",
                "xl/workbook.xml",
                "xl/worksheets/sheet1.xml",
            ]
        );
    }

    #[test]
    fn cells_are_addressed_and_escaped() {
        let rows = vec![
            vec![Cell::Text("Name".into()), Cell::Text("Views".into())],
            vec![Cell::Text("Tom & Jerry <3".into()), Cell::Number(1500.5)],
        ];
        let sheet = read_part(&write_workbook("Sheet1", &rows).unwrap(), "xl/worksheets/sheet1.xml");

        assert!(sheet.contains(r#"<c r="A1" t="inlineStr"><is><t xml:space="preserve">Name</t></is></c>"#));
        assert!(sheet.contains("Tom &amp; Jerry &lt;3"));
        assert!(sheet.contains(r#"<c r="B2"><v>1500.5</v></c>"#));
    }

    #[test]
    fn formulas_keep_cached_values() {
        let rows = vec![vec![
            Cell::Formula {
                formula: r#"IF(K2=0,"",K2/(D2/1000))"#.into(),
                cached: None,
            },
            Cell::Formula {
                formula: "1+1".into(),
                cached: Some(2.0),
            },
        ]];
        let sheet = read_part(&write_workbook("Sheet1", &rows).unwrap(), "xl/worksheets/sheet1.xml");

        assert!(sheet.contains(
            r#"<c r="A1" t="str"><f>IF(K2=0,&quot;&quot;,K2/(D2/1000))</f><v></v></c>"#
        ));
        assert!(sheet.contains(r#"<c r="B1"><f>1+1</f><v>2</v></c>"#));
    }

    #[test]
    fn control_characters_are_dropped() {
        assert_eq!(escape_xml("a\u{0}b\tc"), "ab\tc");
    }
}
