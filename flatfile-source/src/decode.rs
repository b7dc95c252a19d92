// Copyright (c) James Kassemi, SC, US. All rights reserved.
use crate::errors::BulkFetchError;
use aggregations::ContractRow;
use async_compression::tokio::bufread::GzipDecoder;
use csv_async::AsyncReaderBuilder;
use futures::StreamExt;
use tokio::io::BufReader;

fn column(headers: &csv_async::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name))
}

/// Counts are integral in practice; tolerate a decimal rendering and treat
/// blanks as zero.
fn parse_count(raw: Option<&str>) -> u64 {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return 0;
    }
    raw.parse::<u64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0).map(|v| v as u64))
        .unwrap_or(0)
}

/// Decompresses a gzip day-aggregate CSV and extracts `ticker`, `volume` and
/// `transactions`. Columns are located by header name. A file with no data
/// rows is malformed.
pub async fn parse_day_aggregates(compressed: &[u8]) -> Result<Vec<ContractRow>, BulkFetchError> {
    let decoder = GzipDecoder::new(BufReader::new(compressed));
    let mut csv_reader = AsyncReaderBuilder::new().create_reader(decoder);
    let headers = csv_reader.headers().await?.clone();
    let ticker_col = column(&headers, "ticker")
        .ok_or_else(|| BulkFetchError::Parse("missing ticker column".to_string()))?;
    let volume_col = column(&headers, "volume")
        .ok_or_else(|| BulkFetchError::Parse("missing volume column".to_string()))?;
    let transactions_col = column(&headers, "transactions");

    let mut rows = Vec::new();
    let mut records = csv_reader.records();
    while let Some(record) = records.next().await {
        let record = record?;
        let Some(ticker) = record.get(ticker_col) else {
            continue;
        };
        rows.push(ContractRow::new(
            ticker.trim(),
            parse_count(record.get(volume_col)),
            parse_count(transactions_col.and_then(|col| record.get(col))),
        ));
    }
    if rows.is_empty() {
        return Err(BulkFetchError::Parse("no data rows".to_string()));
    }
    Ok(rows)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use async_compression::tokio::write::GzipEncoder;
    use tokio::io::AsyncWriteExt;

    pub async fn gzip(text: &str) -> Vec<u8> {
        let mut encoder = GzipEncoder::new(Vec::new());
        encoder.write_all(text.as_bytes()).await.unwrap();
        encoder.shutdown().await.unwrap();
        encoder.into_inner()
    }

    pub const SAMPLE: &str = "ticker,volume,open,close,high,low,window_start,transactions\n\
O:AAA250117C00050000,100,1.0,1.1,1.2,0.9,1734670800000000000,10\n\
O:AAA250117P00045000,50,1.0,1.1,1.2,0.9,1734670800000000000,5\n\
O:BBB250117C00020000,10,1.0,1.1,1.2,0.9,1734670800000000000,2\n";
}

#[cfg(test)]
mod tests {
    use super::fixtures::{SAMPLE, gzip};
    use super::*;

    #[tokio::test]
    async fn parses_rows_by_header_name() {
        let rows = parse_day_aggregates(&gzip(SAMPLE).await).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], ContractRow::new("O:AAA250117C00050000", 100, 10));
        assert_eq!(rows[2].transactions, 2);
    }

    #[tokio::test]
    async fn reordered_columns_and_missing_transactions() {
        let text = "volume,ticker\n7,O:CCC250117C00020000\n2.0,O:CCC250117P00020000\n";
        let rows = parse_day_aggregates(&gzip(text).await).await.unwrap();
        assert_eq!(rows[0], ContractRow::new("O:CCC250117C00020000", 7, 0));
        assert_eq!(rows[1].volume, 2);
    }

    #[tokio::test]
    async fn header_only_file_is_malformed() {
        let err = parse_day_aggregates(&gzip("ticker,volume\n").await).await.unwrap_err();
        assert!(matches!(err, BulkFetchError::Parse(_)));
    }

    #[tokio::test]
    async fn missing_ticker_column_is_malformed() {
        let err = parse_day_aggregates(&gzip("symbol,volume\nX,1\n").await).await.unwrap_err();
        assert!(matches!(err, BulkFetchError::Parse(_)));
    }

    #[tokio::test]
    async fn non_gzip_payload_is_rejected() {
        assert!(parse_day_aggregates(b"ticker,volume\nX,1\n").await.is_err());
    }

    #[test]
    fn counts_tolerate_blanks_and_decimals() {
        assert_eq!(parse_count(Some("")), 0);
        assert_eq!(parse_count(None), 0);
        assert_eq!(parse_count(Some(" 12 ")), 12);
        assert_eq!(parse_count(Some("3.0")), 3);
        assert_eq!(parse_count(Some("-1")), 0);
    }
}
