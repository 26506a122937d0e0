//! Google Search Console CSV ingestion.
//!
//! Expected header: `query,page,country,device,date,impressions,clicks,ctr,position`.
//! Only `query`, `date`, `impressions` and `clicks` are required.

use std::io::Read;
use std::path::Path;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use topiclens_db::NewGscRow;

use crate::{CollectError, UPSERT_CHUNK};

const DRY_RUN_SAMPLES: usize = 5;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CsvRow {
    query: Option<String>,
    page: Option<String>,
    country: Option<String>,
    device: Option<String>,
    date: Option<String>,
    impressions: Option<String>,
    clicks: Option<String>,
    ctr: Option<String>,
    position: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GscIngestStats {
    pub rows_processed: usize,
    pub rows_inserted: usize,
    pub rows_skipped: usize,
    pub errors: Vec<String>,
}

fn required(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn parse_count(value: &str) -> Option<i64> {
    value.replace(',', "").parse().ok()
}

/// Accepts `0.035` and `3.5%`.
fn parse_ctr(value: &str) -> Option<f64> {
    let value = value.trim();
    match value.strip_suffix('%') {
        Some(percent) => percent.trim().parse::<f64>().ok().map(|p| p / 100.0),
        None => value.parse().ok(),
    }
}

#[allow(clippy::cast_precision_loss)]
fn derived_ctr(clicks: i64, impressions: i64) -> f64 {
    if impressions > 0 {
        clicks as f64 / impressions as f64
    } else {
        0.0
    }
}

/// First day of the month of a `YYYY-MM-DD` date.
#[must_use]
pub fn month_start(date: &str) -> Option<NaiveDate> {
    let day = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;
    day.with_day(1)
}

fn to_row(raw: &CsvRow) -> Result<NewGscRow, String> {
    let query = required(raw.query.as_ref()).ok_or("missing query")?;
    let date = required(raw.date.as_ref()).ok_or("missing date")?;
    let impressions = required(raw.impressions.as_ref()).ok_or("missing impressions")?;
    let clicks = required(raw.clicks.as_ref()).ok_or("missing clicks")?;

    let date_month = month_start(date).ok_or_else(|| format!("invalid date '{date}'"))?;
    let impressions =
        parse_count(impressions).ok_or_else(|| format!("invalid impressions '{impressions}'"))?;
    let clicks = parse_count(clicks).ok_or_else(|| format!("invalid clicks '{clicks}'"))?;

    let ctr = raw
        .ctr
        .as_deref()
        .and_then(parse_ctr)
        .unwrap_or_else(|| derived_ctr(clicks, impressions));

    let text = |v: &Option<String>| v.as_deref().map(str::trim).unwrap_or_default().to_string();

    Ok(NewGscRow {
        query: query.to_string(),
        page: text(&raw.page),
        country: text(&raw.country),
        device: text(&raw.device),
        date_month,
        impressions,
        clicks,
        ctr,
        position: raw.position.as_deref().and_then(|p| p.trim().parse().ok()),
    })
}

/// Parse an export. Rows that are missing a required field or carry an
/// unparseable value are skipped with a warning.
///
/// # Errors
///
/// Returns [`CollectError::Csv`] if the header cannot be read.
pub fn parse_gsc_csv<R: Read>(reader: R) -> Result<(Vec<NewGscRow>, GscIngestStats), CollectError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .flexible(true)
        .from_reader(reader);
    csv_reader.headers()?;

    let mut stats = GscIngestStats::default();
    let mut rows = Vec::new();

    for (index, record) in csv_reader.deserialize::<CsvRow>().enumerate() {
        stats.rows_processed += 1;
        let line = index + 2;

        let raw = match record {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(line, error = %err, "unreadable GSC row, skipping");
                stats.errors.push(format!("line {line}: {err}"));
                stats.rows_skipped += 1;
                continue;
            }
        };

        match to_row(&raw) {
            Ok(row) => rows.push(row),
            Err(reason) => {
                tracing::warn!(line, reason = %reason, "invalid GSC row, skipping");
                stats.rows_skipped += 1;
            }
        }
    }

    Ok((rows, stats))
}

/// Ingest a Search Console export from `path`.
///
/// # Errors
///
/// Returns [`CollectError::GscFileMissing`] if `path` does not exist,
/// [`CollectError::Csv`] if it cannot be read, and [`CollectError::Db`] if an
/// upsert fails.
pub async fn ingest_gsc_csv(
    pool: &PgPool,
    path: &Path,
    dry_run: bool,
) -> Result<GscIngestStats, CollectError> {
    if !path.is_file() {
        return Err(CollectError::GscFileMissing(path.display().to_string()));
    }

    tracing::info!(path = %path.display(), "ingesting GSC CSV");
    let file = std::fs::File::open(path)
        .map_err(|e| CollectError::Csv(csv::Error::from(e)))?;
    let (rows, mut stats) = parse_gsc_csv(file)?;

    if dry_run {
        for row in rows.iter().take(DRY_RUN_SAMPLES) {
            tracing::info!(
                dry_run = true,
                query = %row.query,
                month = %row.date_month,
                impressions = row.impressions,
                clicks = row.clicks,
                "GSC row"
            );
        }
    } else {
        for chunk in rows.chunks(UPSERT_CHUNK) {
            let written = topiclens_db::upsert_gsc_rows(pool, chunk).await?;
            stats.rows_inserted += usize::try_from(written).unwrap_or(usize::MAX);
        }
    }

    tracing::info!(
        processed = stats.rows_processed,
        inserted = stats.rows_inserted,
        skipped = stats.rows_skipped,
        "GSC ingestion complete"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "query,page,country,device,date,impressions,clicks,ctr,position\n\
        fridge organization,https://example.com/a,usa,DESKTOP,2024-03-14,1200,36,3%,4.2\n\
        spring salad,https://example.com/b,usa,MOBILE,2024-04-02,800,8,0.01,\n\
        ,https://example.com/c,usa,MOBILE,2024-04-02,10,1,0.1,3\n\
        bad date,https://example.com/d,usa,MOBILE,04/02/2024,10,1,0.1,3\n\
        no clicks,https://example.com/e,usa,MOBILE,2024-04-02,10,,0.1,3\n";

    #[test]
    fn parses_valid_rows_and_skips_invalid() {
        let (rows, stats) = parse_gsc_csv(CSV.as_bytes()).unwrap();

        assert_eq!(stats.rows_processed, 5);
        assert_eq!(stats.rows_skipped, 3);
        assert_eq!(rows.len(), 2);

        let first = &rows[0];
        assert_eq!(first.query, "fridge organization");
        assert_eq!(first.date_month, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(first.impressions, 1200);
        assert!((first.ctr - 0.03).abs() < 1e-9);
        assert_eq!(first.position, Some(4.2));

        assert_eq!(rows[1].position, None);
        assert_eq!(rows[1].device, "MOBILE");
    }

    #[test]
    fn missing_optional_columns_get_defaults() {
        let csv = "query,date,impressions,clicks\nherb storage,2024-05-20,50,5\n";
        let (rows, _) = parse_gsc_csv(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].page, "");
        assert!((rows[0].ctr - 0.1).abs() < 1e-9);
    }

    #[test]
    fn month_start_handles_bad_input() {
        assert_eq!(
            month_start("2024-02-29"),
            NaiveDate::from_ymd_opt(2024, 2, 1)
        );
        assert_eq!(month_start("2024-02-30"), None);
        assert_eq!(month_start("yesterday"), None);
    }

    #[test]
    fn ctr_accepts_fraction_and_percent() {
        assert_eq!(parse_ctr("0.25"), Some(0.25));
        assert_eq!(parse_ctr("25%"), Some(0.25));
        assert_eq!(parse_ctr("n/a"), None);
    }
}
