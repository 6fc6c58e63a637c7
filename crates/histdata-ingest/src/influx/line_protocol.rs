//! Row transformation into line protocol
//!
//! One CSV row becomes exactly one line:
//!
//! ```text
//! EURUSD,source=Dukascopy,platform=ABC,timeframe=M1 bidquote=1.10,askquote=1.11,volume=100 1690000000000
//! ```
//!
//! Line protocol separates measurement/tags, fields and timestamp with spaces,
//! so every value has its spaces removed before it is written.

use serde::Deserialize;
use std::borrow::Cow;

/// Columns every input CSV must carry
pub const REQUIRED_COLUMNS: [&str; 8] = [
    "Instrument",
    "Source",
    "Platform",
    "Timeframe",
    "bidQuote",
    "askQuote",
    "Volume",
    "msSinceEpochUTC",
];

/// One quote row, bound to the CSV header by column name
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuoteRow {
    #[serde(rename = "Instrument")]
    pub instrument: String,
    #[serde(rename = "Source")]
    pub source: String,
    #[serde(rename = "Platform")]
    pub platform: String,
    #[serde(rename = "Timeframe")]
    pub timeframe: String,
    #[serde(rename = "bidQuote")]
    pub bid_quote: String,
    #[serde(rename = "askQuote")]
    pub ask_quote: String,
    #[serde(rename = "Volume")]
    pub volume: String,
    #[serde(rename = "msSinceEpochUTC")]
    pub ms_since_epoch_utc: String,
}

fn strip_spaces(value: &str) -> Cow<'_, str> {
    if value.contains(' ') {
        Cow::Owned(value.replace(' ', ""))
    } else {
        Cow::Borrowed(value)
    }
}

impl QuoteRow {
    /// Render the row as a single line protocol entry
    pub fn to_line(&self) -> String {
        let parts = [
            strip_spaces(&self.instrument),
            strip_spaces(&self.source),
            strip_spaces(&self.platform),
            strip_spaces(&self.timeframe),
            strip_spaces(&self.bid_quote),
            strip_spaces(&self.ask_quote),
            strip_spaces(&self.volume),
            strip_spaces(&self.ms_since_epoch_utc),
        ];
        let [instrument, source, platform, timeframe, bid, ask, volume, timestamp] = parts;

        let mut line = String::with_capacity(
            instrument.len() + source.len() + platform.len() + timeframe.len() + bid.len()
                + ask.len() + volume.len() + timestamp.len() + 64,
        );
        line.push_str(&instrument);
        line.push_str(",source=");
        line.push_str(&source);
        line.push_str(",platform=");
        line.push_str(&platform);
        line.push_str(",timeframe=");
        line.push_str(&timeframe);
        line.push_str(" bidquote=");
        line.push_str(&bid);
        line.push_str(",askquote=");
        line.push_str(&ask);
        line.push_str(",volume=");
        line.push_str(&volume);
        line.push(' ');
        line.push_str(&timestamp);
        line
    }
}

/// Required columns absent from a header row
pub fn missing_columns(headers: &csv::StringRecord) -> Vec<&'static str> {
    REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|required| !headers.iter().any(|h| h == *required))
        .collect()
}
