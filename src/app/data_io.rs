use std::io::{Cursor, Write};

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use super::error::Result;
use super::types::{DataFormat, RECORD_COLUMNS, ResultBatch};

pub const EXPORT_FILE_NAME: &str = "seo_analysis.xlsx";
pub const EXPORT_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// A ready-to-save download.
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub file_name: &'static str,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

/// Export input as posted by the results page: `{"data": [...]}` or a bare list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExportPayload {
    Wrapped {
        #[serde(default)]
        data: Vec<Map<String, Value>>,
    },
    Bare(Vec<Map<String, Value>>),
}

pub fn parse_export_payload(json: &str) -> serde_json::Result<Vec<Map<String, Value>>> {
    let payload: ExportPayload = serde_json::from_str(json)?;
    Ok(match payload {
        ExportPayload::Wrapped { data } => data,
        ExportPayload::Bare(records) => records,
    })
}

/// Union of keys, in the order they are first seen.
fn columns_of(records: &[Map<String, Value>]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

/// Serializes flat records into a single-sheet workbook. Record shape is not
/// checked: missing keys become blank cells.
pub fn export_records(records: &[Map<String, Value>]) -> Result<ExportFile> {
    let columns = columns_of(records);
    let sheet = sheet_xml(&columns, records);

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let parts: [(&str, &str); 5] = [
        ("[Content_Types].xml", CONTENT_TYPES_XML),
        ("_rels/.rels", ROOT_RELS_XML),
        ("xl/workbook.xml", WORKBOOK_XML),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS_XML),
        ("xl/worksheets/sheet1.xml", sheet.as_str()),
    ];
    for (name, body) in parts {
        zip.start_file(name, options)?;
        zip.write_all(body.as_bytes())?;
    }
    let bytes = zip.finish()?.into_inner();

    Ok(ExportFile {
        file_name: EXPORT_FILE_NAME,
        mime: EXPORT_MIME,
        bytes,
    })
}

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets></workbook>"#;

const WORKBOOK_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

fn sheet_xml(columns: &[String], records: &[Map<String, Value>]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );

    let header = columns.iter().map(|c| Value::String(c.clone()));
    push_row(&mut xml, 1, header);
    for (i, record) in records.iter().enumerate() {
        let cells = columns
            .iter()
            .map(|c| record.get(c).cloned().unwrap_or(Value::Null));
        push_row(&mut xml, i + 2, cells);
    }

    xml.push_str("</sheetData></worksheet>");
    xml
}

fn push_row(xml: &mut String, row: usize, cells: impl Iterator<Item = Value>) {
    xml.push_str(&format!("<row r=\"{row}\">"));
    for (col, value) in cells.enumerate() {
        let reference = format!("{}{row}", column_letters(col));
        match value {
            Value::Null => {}
            Value::Bool(b) => {
                xml.push_str(&format!("<c r=\"{reference}\" t=\"b\"><v>{}</v></c>", u8::from(b)))
            }
            Value::Number(n) => xml.push_str(&format!("<c r=\"{reference}\"><v>{n}</v></c>")),
            Value::String(s) => push_inline_string(xml, &reference, &s),
            nested => push_inline_string(xml, &reference, &nested.to_string()),
        }
    }
    xml.push_str("</row>");
}

fn push_inline_string(xml: &mut String, reference: &str, text: &str) {
    xml.push_str(&format!(
        "<c r=\"{reference}\" t=\"inlineStr\"><is><t xml:space=\"preserve\">{}</t></is></c>",
        escape_xml(text)
    ));
}

/// Zero-based column index to spreadsheet letters: 0 -> A, 26 -> AA.
fn column_letters(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // XML 1.0 forbids most control characters outright.
            '\t' | '\n' | '\r' => out.push(ch),
            c if (c as u32) < 0x20 => {}
            c => out.push(c),
        }
    }
    out
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Standalone results page. An empty batch renders as "no results", not an error.
pub fn render_html(query: &str, batch: &ResultBatch) -> String {
    let mut html = String::new();
    html.push_str("<!doctype html>\n<html lang=\"ru\"><head><meta charset=\"utf-8\">");
    html.push_str(&format!("<title>SEO: {}</title>", escape_html(query)));
    html.push_str(
        "<style>table{border-collapse:collapse}td,th{border:1px solid #ccc;padding:4px 8px;text-align:left}</style>",
    );
    html.push_str("</head><body>\n");
    html.push_str(&format!(
        "<h1>{}</h1>\n<p>{} pages analyzed</p>\n",
        escape_html(query),
        batch.len()
    ));

    if batch.is_empty() {
        html.push_str("<p class=\"empty\">No results</p>\n");
    } else {
        html.push_str("<table>\n<thead><tr>");
        for column in RECORD_COLUMNS {
            html.push_str(&format!("<th>{}</th>", escape_html(column)));
        }
        html.push_str("</tr></thead>\n<tbody>\n");
        for record in batch.records() {
            html.push_str("<tr>");
            let [url, rest @ ..] = record.cells();
            let url = escape_html(&url);
            html.push_str(&format!("<td><a href=\"{url}\">{url}</a></td>"));
            for cell in rest {
                html.push_str(&format!("<td>{}</td>", escape_html(&cell)));
            }
            html.push_str("</tr>\n");
        }
        html.push_str("</tbody>\n</table>\n");
    }

    html.push_str("</body></html>\n");
    html
}

pub fn render_csv(batch: &ResultBatch) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(RECORD_COLUMNS)?;
    for record in batch.records() {
        writer.write_record(record.cells())?;
    }
    writer
        .into_inner()
        .map_err(|err| err.into_error().into())
}

pub fn render_json(batch: &ResultBatch) -> Result<Vec<u8>> {
    let mut out = serde_json::to_vec_pretty(&batch.to_flat_records())?;
    out.push(b'\n');
    Ok(out)
}

/// Report bytes for `format`.
pub fn render_report(query: &str, batch: &ResultBatch, format: DataFormat) -> Result<Vec<u8>> {
    match format {
        DataFormat::Html => Ok(render_html(query, batch).into_bytes()),
        DataFormat::Csv => render_csv(batch),
        DataFormat::Json => render_json(batch),
        DataFormat::Xlsx => Ok(export_records(&batch.to_flat_records())?.bytes),
    }
}

pub fn detect_data_format(path: &str, fallback: DataFormat) -> DataFormat {
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(".html") || lower.ends_with(".htm") {
        DataFormat::Html
    } else if lower.ends_with(".json") {
        DataFormat::Json
    } else if lower.ends_with(".csv") {
        DataFormat::Csv
    } else if lower.ends_with(".xlsx") {
        DataFormat::Xlsx
    } else {
        fallback
    }
}

pub fn default_output_path(query: &str, format: DataFormat) -> String {
    let mut slug = String::new();
    for ch in query.trim().chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_');
    let slug = if slug.is_empty() { "serp" } else { slug };
    let ts = Utc::now().format("%Y%m%d_%H%M%S");
    format!("{slug}_{ts}.{}", format.extension())
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use serde_json::json;

    use super::*;
    use crate::app::types::{SENTINEL, SeoRecord};

    fn sample_batch() -> ResultBatch {
        [
            SeoRecord {
                url: "https://example.com/a-b-c".into(),
                title: "Example <b>&</b>".into(),
                description: SENTINEL.into(),
                h1: SENTINEL.into(),
                robots_txt: true,
                sitemap_xml: false,
                canonical: false,
                open_graph: false,
                readable_url: true,
                https: true,
            },
            SeoRecord {
                url: "http://plain.example/".into(),
                title: "Plain".into(),
                description: "Plain, \"quoted\" description".into(),
                h1: "Heading".into(),
                robots_txt: false,
                sitemap_xml: true,
                canonical: true,
                open_graph: true,
                readable_url: false,
                https: false,
            },
        ]
        .into_iter()
        .collect()
    }

    fn read_part(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut part = archive.by_name(name).unwrap();
        let mut out = String::new();
        part.read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn column_letters_roll_over() {
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(9), "J");
        assert_eq!(column_letters(25), "Z");
        assert_eq!(column_letters(26), "AA");
        assert_eq!(column_letters(27), "AB");
        assert_eq!(column_letters(701), "ZZ");
        assert_eq!(column_letters(702), "AAA");
    }

    #[test]
    fn export_writes_a_workbook_with_union_of_columns() {
        let records = parse_export_payload(
            &json!({
                "data": [
                    {"URL": "https://a.example/", "Score": 7, "Ok": true},
                    {"URL": "https://b.example/", "Note": "x < y & z", "Nested": {"k": [1, 2]}}
                ]
            })
            .to_string(),
        )
        .unwrap();

        let file = export_records(&records).unwrap();

        assert_eq!(file.file_name, "seo_analysis.xlsx");
        assert_eq!(file.mime, EXPORT_MIME);
        assert!(file.bytes.starts_with(b"PK"));

        let sheet = read_part(&file.bytes, "xl/worksheets/sheet1.xml");
        let header_order = ["URL", "Score", "Ok", "Note", "Nested"]
            .iter()
            .map(|c| sheet.find(&format!(">{c}</t>")).unwrap())
            .collect::<Vec<_>>();
        assert!(header_order.windows(2).all(|w| w[0] < w[1]));
        assert!(sheet.contains("<c r=\"B2\"><v>7</v></c>"));
        assert!(sheet.contains("<c r=\"C2\" t=\"b\"><v>1</v></c>"));
        assert!(!sheet.contains("r=\"D2\""));
        assert!(sheet.contains("x &lt; y &amp; z"));
        assert!(sheet.contains("{&quot;k&quot;:[1,2]}"));
        assert!(read_part(&file.bytes, "[Content_Types].xml").contains("/xl/worksheets/sheet1.xml"));
        assert!(read_part(&file.bytes, "xl/workbook.xml").contains("Sheet1"));
    }

    #[test]
    fn export_accepts_bare_lists_and_empty_input() {
        let records = parse_export_payload(r#"[{"a": 1}]"#).unwrap();
        assert_eq!(records.len(), 1);
        assert!(parse_export_payload(r#"{}"#).unwrap().is_empty());
        assert!(parse_export_payload("nope").is_err());

        let file = export_records(&[]).unwrap();
        let sheet = read_part(&file.bytes, "xl/worksheets/sheet1.xml");
        assert!(sheet.contains("<row r=\"1\"></row>"));
    }

    #[test]
    fn batch_export_uses_glyph_columns() {
        let file = export_records(&sample_batch().to_flat_records()).unwrap();
        let sheet = read_part(&file.bytes, "xl/worksheets/sheet1.xml");
        assert!(sheet.contains(">ЧПУ</t>"));
        assert!(sheet.contains(">✓</t>"));
        assert!(sheet.contains(">—</t>"));
        assert!(sheet.contains("Example &lt;b&gt;&amp;&lt;/b&gt;"));
    }

    #[test]
    fn html_report_escapes_and_renders_every_record() {
        let html = render_html("диван <script>", &sample_batch());
        assert!(html.contains("<h1>диван &lt;script&gt;</h1>"));
        assert!(html.contains("<th>Open Graph</th>"));
        assert!(html.contains("<a href=\"https://example.com/a-b-c\">"));
        assert!(html.contains("Example &lt;b&gt;&amp;&lt;/b&gt;"));
        assert_eq!(html.matches("<tr>").count(), 3);
        assert!(!html.contains("No results"));
    }

    #[test]
    fn empty_batch_renders_no_results() {
        let html = render_html("q", &ResultBatch::default());
        assert!(html.contains("No results"));
        assert!(!html.contains("<table>"));
    }

    #[test]
    fn csv_report_has_header_and_quoted_cells() {
        let csv = String::from_utf8(render_csv(&sample_batch()).unwrap()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("URL,Title,Description,H1,Robots.txt,Sitemap.xml,Canonical,Open Graph,ЧПУ,SSL")
        );
        assert!(csv.contains("\"Plain, \"\"quoted\"\" description\""));
        assert_eq!(csv.lines().count(), 3);
    }

    #[test]
    fn json_report_is_a_list_of_flat_records() {
        let json: Value = serde_json::from_slice(&render_json(&sample_batch()).unwrap()).unwrap();
        let rows = json.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["SSL"], "✓");
        assert_eq!(rows[1]["Canonical"], "✓");
    }

    #[test]
    fn output_paths_follow_format() {
        assert_eq!(detect_data_format("r.XLSX", DataFormat::Html), DataFormat::Xlsx);
        assert_eq!(detect_data_format("r.csv", DataFormat::Html), DataFormat::Csv);
        assert_eq!(detect_data_format("r.htm", DataFormat::Json), DataFormat::Html);
        assert_eq!(detect_data_format("report", DataFormat::Json), DataFormat::Json);

        let path = default_output_path("  Купить диван!  Москва ", DataFormat::Csv);
        assert!(path.starts_with("купить_диван_москва_"), "{path}");
        assert!(path.ends_with(".csv"));
        assert!(default_output_path("!!!", DataFormat::Html).starts_with("serp_"));
    }
}
