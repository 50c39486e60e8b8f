//! Work list loading
//!
//! Accepts a CSV file with a header row (`url`, `URL` or `link`, and an
//! optional `category` column) or a JSON array of rows. JSON rows shaped
//! `{ "name", "url" }` describe category listing pages.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

use crate::domain::{WorkKind, WorkUnit};

const URL_COLUMNS: [&str; 2] = ["url", "link"];
const CATEGORY_COLUMN: &str = "category";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkListFormat {
    Csv,
    Json,
}

impl WorkListFormat {
    /// `.json` files and content starting with `[` are JSON; anything else is CSV
    pub fn detect(path: &Path, content: &str) -> Self {
        let is_json_ext = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json_ext || content.trim_start().starts_with('[') {
            Self::Json
        } else {
            Self::Csv
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonRow {
    #[serde(alias = "URL", alias = "link")]
    url: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    kind: Option<WorkKind>,
}

impl JsonRow {
    fn into_unit(self) -> WorkUnit {
        let url = self.url.trim().to_string();
        let listing = self.kind == Some(WorkKind::Listing) || (self.name.is_some() && self.kind.is_none());
        if listing {
            let name = self.name.or(self.category).unwrap_or_default();
            WorkUnit::listing(url, name.trim())
        } else {
            WorkUnit::product(url, self.category.map(|c| c.trim().to_string()))
        }
    }
}

/// Read, parse and cap the work list; an empty list is an error
pub async fn load_work_units(path: &Path, max_items: usize) -> Result<Vec<WorkUnit>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read work list {:?}", path))?;

    let format = WorkListFormat::detect(path, &content);
    let mut units = parse_work_units(&content, format)
        .with_context(|| format!("Invalid work list {:?}", path))?;

    if max_items > 0 && units.len() > max_items {
        warn!("Work list has {} rows, keeping the first {}", units.len(), max_items);
        units.truncate(max_items);
    }

    if units.is_empty() {
        bail!("No work units found in {:?}", path);
    }

    info!("Loaded {} work units from {:?} ({:?})", units.len(), path, format);
    Ok(units)
}

pub fn parse_work_units(content: &str, format: WorkListFormat) -> Result<Vec<WorkUnit>> {
    match format {
        WorkListFormat::Csv => parse_csv(content),
        WorkListFormat::Json => parse_json(content),
    }
}

fn parse_json(content: &str) -> Result<Vec<WorkUnit>> {
    let rows: Vec<JsonRow> = serde_json::from_str(content).context("Work list is not a JSON array of rows")?;
    Ok(rows
        .into_iter()
        .filter(|row| !row.url.trim().is_empty())
        .map(JsonRow::into_unit)
        .collect())
}

fn parse_csv(content: &str) -> Result<Vec<WorkUnit>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader.headers().context("Failed to read CSV header")?.clone();
    let column = |names: &[&str]| {
        headers
            .iter()
            .position(|h| names.iter().any(|name| h.eq_ignore_ascii_case(name)))
    };

    let url_index = column(&URL_COLUMNS[..]).ok_or_else(|| anyhow!("CSV header has no url column"))?;
    let category_index = column(&[CATEGORY_COLUMN][..]);

    let mut units = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Malformed CSV row {}", line + 2))?;
        let url = record.get(url_index).unwrap_or_default();
        if url.is_empty() {
            continue;
        }
        let category = category_index
            .and_then(|i| record.get(i))
            .map(str::to_string);
        units.push(WorkUnit::product(url, category));
    }
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_with_category_comments_and_blanks() {
        let csv = "category,URL\n\
                   # seasonal picks\n\
                   Home , https://www.temu.com/lamp-p-601.html \n\
                   ,https://temu.to/k/abc\n\
                   Toys,\n";
        let units = parse_work_units(csv, WorkListFormat::Csv).unwrap();

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].source_url, "https://www.temu.com/lamp-p-601.html");
        assert_eq!(units[0].category.as_deref(), Some("Home"));
        assert_eq!(units[1].category, None);
        assert_eq!(units[1].kind, WorkKind::Product);
    }

    #[test]
    fn test_csv_link_column_without_category() {
        let units = parse_work_units("link\nhttps://temu.to/k/x\n", WorkListFormat::Csv).unwrap();
        assert_eq!(units, vec![WorkUnit::product("https://temu.to/k/x", None)]);
    }

    #[test]
    fn test_csv_without_url_column_is_an_error() {
        assert!(parse_work_units("name,price\nx,1\n", WorkListFormat::Csv).is_err());
    }

    #[test]
    fn test_json_products_and_listings() {
        let json = r#"[
            { "url": "https://www.temu.com/goods.html?goods_id=1", "category": "Kitchen" },
            { "name": "Home", "url": "https://www.temu.com/channel/home.html" },
            { "url": "  " }
        ]"#;
        let units = parse_work_units(json, WorkListFormat::Json).unwrap();

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].kind, WorkKind::Product);
        assert_eq!(units[0].category.as_deref(), Some("Kitchen"));
        assert_eq!(units[1], WorkUnit::listing("https://www.temu.com/channel/home.html", "Home"));
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(WorkListFormat::detect(Path::new("links.json"), ""), WorkListFormat::Json);
        assert_eq!(WorkListFormat::detect(Path::new("links.txt"), " [ ]"), WorkListFormat::Json);
        assert_eq!(WorkListFormat::detect(Path::new("links.csv"), "url\n"), WorkListFormat::Csv);
    }

    #[tokio::test]
    async fn test_load_caps_and_rejects_empty_lists() {
        let dir = tempfile::tempdir().unwrap();

        let path = dir.path().join("links.csv");
        let rows: String = (0..5)
            .map(|i| format!("https://www.temu.com/goods.html?goods_id={}\n", i))
            .collect();
        std::fs::write(&path, format!("url\n{}", rows)).unwrap();
        assert_eq!(load_work_units(&path, 3).await.unwrap().len(), 3);

        let empty = dir.path().join("empty.csv");
        std::fs::write(&empty, "url\n# nothing yet\n").unwrap();
        assert!(load_work_units(&empty, 200).await.is_err());
    }
}
