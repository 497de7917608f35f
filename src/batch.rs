//! CSV reader for batch uploads

use crate::error::{ScoringError, ScoringResult};
use crate::types::transaction::is_component_name;
use crate::types::TransactionInput;
use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::debug;

/// Columns a batch file must carry, in upload naming
pub const REQUIRED_COLUMNS: [&str; 4] = ["Amount", "Payment_Method", "Merchant_Category", "Location"];

/// Header positions of the known columns
#[derive(Debug, Default)]
struct ColumnIndex {
    amount: Option<usize>,
    payment_method: Option<usize>,
    merchant_category: Option<usize>,
    location: Option<usize>,
    time: Option<usize>,
    /// `V<n>` columns, by name
    components: Vec<(String, usize)>,
}

impl ColumnIndex {
    /// Match headers case-insensitively, treating spaces and dashes as `_`
    fn from_headers(headers: &StringRecord) -> ScoringResult<Self> {
        let mut index = ColumnIndex::default();
        for (pos, header) in headers.iter().enumerate() {
            let slot = match normalize(header).as_str() {
                "amount" => &mut index.amount,
                "payment_method" => &mut index.payment_method,
                "merchant_category" => &mut index.merchant_category,
                "location" => &mut index.location,
                "time" | "timestamp" => &mut index.time,
                other => {
                    let name = other.to_ascii_uppercase();
                    if is_component_name(&name)
                        && !index.components.iter().any(|(n, _)| *n == name)
                    {
                        index.components.push((name, pos));
                    }
                    continue;
                }
            };
            // First occurrence wins
            slot.get_or_insert(pos);
        }

        let present = [
            index.amount,
            index.payment_method,
            index.merchant_category,
            index.location,
        ];
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .zip(present)
            .filter(|(_, pos)| pos.is_none())
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(ScoringError::validation(format!(
                "missing required column(s): {}",
                missing.join(", ")
            )));
        }

        Ok(index)
    }

    fn row(&self, record: &StringRecord) -> ScoringResult<TransactionInput> {
        let cell = |pos: Option<usize>| -> Option<String> {
            pos.and_then(|p| record.get(p))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let amount = match cell(self.amount) {
            Some(raw) => Some(raw.parse::<f64>().map_err(|_| {
                ScoringError::validation(format!("Amount: '{}' is not a number", raw))
            })?),
            None => None,
        };

        let mut input = TransactionInput {
            amount,
            payment_method: cell(self.payment_method),
            merchant_category: cell(self.merchant_category),
            location: cell(self.location),
            time: cell(self.time),
            ..TransactionInput::default()
        };
        for (name, pos) in &self.components {
            if let Some(raw) = cell(Some(*pos)) {
                let value = raw.parse::<f64>().map_err(|_| {
                    ScoringError::validation(format!("{}: '{}' is not a number", name, raw))
                })?;
                input.components.insert(name.clone(), value);
            }
        }

        Ok(input)
    }
}

fn normalize(header: &str) -> String {
    header
        .trim()
        .trim_start_matches('\u{feff}')
        .to_ascii_lowercase()
        .replace([' ', '-'], "_")
}

/// Parse a CSV body into one entry per data row.
///
/// The outer error rejects the whole file (bad encoding or missing
/// columns) before any row is produced. Inner errors belong to single rows
/// and are carried through so the batch can flag them and continue.
pub fn read_transactions(body: &[u8]) -> ScoringResult<Vec<ScoringResult<TransactionInput>>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    if std::str::from_utf8(body).is_err() {
        return Err(ScoringError::validation("upload is not valid UTF-8 text"));
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::Headers)
        .from_reader(body);

    let headers = reader
        .headers()
        .map_err(|e| ScoringError::validation(format!("unreadable CSV header: {}", e)))?
        .clone();
    let index = ColumnIndex::from_headers(&headers)?;

    let rows: Vec<_> = reader
        .records()
        .map(|record| match record {
            Ok(record) => index.row(&record),
            Err(e) => Err(ScoringError::validation(format!("malformed CSV row: {}", e))),
        })
        .collect();

    debug!(
        rows = rows.len(),
        has_time = index.time.is_some(),
        "Parsed CSV upload"
    );
    Ok(rows)
}
