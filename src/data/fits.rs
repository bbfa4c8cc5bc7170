//! FITS primary-array decoding with deferred data access.
//!
//! Only the header is parsed up front. The data area stays a borrowed slice
//! (typically a memory map) and a column is converted to `f64` when it is
//! asked for.

use byteorder::{BigEndian, ByteOrder};
use chrono::{NaiveDate, NaiveDateTime};

use super::model::TimeSeries;

pub const BLOCK_SIZE: usize = 2880;
pub const CARD_SIZE: usize = 80;

/// Number of leading header values that describe the source rather than a
/// column.
const SOURCE_VALUES: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum FitsError {
    #[error("header ended before the END card")]
    NoEnd,
    #[error("first card is not SIMPLE = T")]
    NotSimple,
    #[error("missing or invalid keyword {0}")]
    Keyword(&'static str),
    #[error("unsupported BITPIX {0}")]
    Bitpix(i64),
    #[error("expected a 2-dimensional primary array, NAXIS = {0}")]
    Dimensions(i64),
    #[error("header of {header} bytes does not fill its last block, file has {len}")]
    PartialBlock { header: usize, len: usize },
    #[error("NAXIS1 x NAXIS2 x BITPIX overflows the address space")]
    Oversized,
    #[error("data area holds {actual} bytes, header describes {expected}")]
    Truncated { expected: usize, actual: usize },
    #[error("{labels} column labels for {columns} columns")]
    ColumnCount { labels: usize, columns: usize },
    #[error("unreadable DATE-OBS '{0}'")]
    DateObs(String),
}

// ---------------------------------------------------------------------------
// Header cards
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Logical(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl HeaderValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HeaderValue::Integer(i) => Some(*i),
            HeaderValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Integer(i) => Some(*i as f64),
            HeaderValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl std::fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeaderValue::Logical(true) => write!(f, "True"),
            HeaderValue::Logical(false) => write!(f, "False"),
            HeaderValue::Integer(i) => write!(f, "{i}"),
            HeaderValue::Float(v) => write!(f, "{v}"),
            HeaderValue::Text(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub keyword: String,
    pub value: HeaderValue,
}

/// Parse the value field of a card (columns 11-80).
fn parse_value(field: &str) -> HeaderValue {
    let field = field.trim_start();
    if let Some(rest) = field.strip_prefix('\'') {
        let mut text = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    text.push('\'');
                    continue;
                }
                break;
            }
            text.push(c);
        }
        return HeaderValue::Text(text.trim_end().to_string());
    }

    let raw = field.split('/').next().unwrap_or("").trim();
    match raw {
        "T" => HeaderValue::Logical(true),
        "F" => HeaderValue::Logical(false),
        _ => {
            if let Ok(i) = raw.parse::<i64>() {
                HeaderValue::Integer(i)
            } else if let Ok(f) = raw.replace(['D', 'd'], "E").parse::<f64>() {
                HeaderValue::Float(f)
            } else {
                HeaderValue::Text(raw.to_string())
            }
        }
    }
}

/// Read cards up to END. Returns the cards with a value and the header length
/// in bytes (a whole number of blocks).
fn parse_header(bytes: &[u8]) -> Result<(Vec<Card>, usize), FitsError> {
    let mut cards = Vec::new();
    for (index, raw) in bytes.chunks_exact(CARD_SIZE).enumerate() {
        let keyword = String::from_utf8_lossy(&raw[..8]).trim_end().to_string();

        if keyword == "END" {
            let used = (index + 1) * CARD_SIZE;
            let header_len = used.div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
            return Ok((cards, header_len));
        }
        // Commentary cards (COMMENT, HISTORY, blank) carry no value indicator.
        if &raw[8..10] == b"= " {
            cards.push(Card {
                keyword,
                value: parse_value(&String::from_utf8_lossy(&raw[10..])),
            });
        }
    }
    Err(FitsError::NoEnd)
}

// ---------------------------------------------------------------------------
// FitsFile – header plus lazily decoded primary array
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bitpix {
    U8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl Bitpix {
    fn from_header(value: i64) -> Result<Self, FitsError> {
        Ok(match value {
            8 => Bitpix::U8,
            16 => Bitpix::I16,
            32 => Bitpix::I32,
            64 => Bitpix::I64,
            -32 => Bitpix::F32,
            -64 => Bitpix::F64,
            other => return Err(FitsError::Bitpix(other)),
        })
    }

    fn width(self) -> usize {
        match self {
            Bitpix::U8 => 1,
            Bitpix::I16 => 2,
            Bitpix::I32 | Bitpix::F32 => 4,
            Bitpix::I64 | Bitpix::F64 => 8,
        }
    }

    fn read(self, raw: &[u8]) -> f64 {
        match self {
            Bitpix::U8 => raw[0] as f64,
            Bitpix::I16 => BigEndian::read_i16(raw) as f64,
            Bitpix::I32 => BigEndian::read_i32(raw) as f64,
            Bitpix::I64 => BigEndian::read_i64(raw) as f64,
            Bitpix::F32 => BigEndian::read_f32(raw) as f64,
            Bitpix::F64 => BigEndian::read_f64(raw),
        }
    }
}

/// A primary HDU whose data area is borrowed, not copied.
#[derive(Debug, Clone)]
pub struct FitsFile<'a> {
    cards: Vec<Card>,
    data: &'a [u8],
    bitpix: Bitpix,
    columns: usize,
    rows: usize,
    bscale: f64,
    bzero: f64,
}

impl<'a> FitsFile<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, FitsError> {
        let (cards, header_len) = parse_header(bytes)?;

        match cards.first() {
            Some(Card {
                keyword,
                value: HeaderValue::Logical(true),
            }) if keyword == "SIMPLE" => {}
            _ => return Err(FitsError::NotSimple),
        }

        let int = |key: &'static str| {
            cards
                .iter()
                .find(|c| c.keyword == key)
                .and_then(|c| c.value.as_i64())
                .ok_or(FitsError::Keyword(key))
        };
        let float_or = |key: &str, default: f64| {
            cards
                .iter()
                .find(|c| c.keyword == key)
                .and_then(|c| c.value.as_f64())
                .unwrap_or(default)
        };

        let bitpix = Bitpix::from_header(int("BITPIX")?)?;
        let naxis = int("NAXIS")?;
        if naxis != 2 {
            return Err(FitsError::Dimensions(naxis));
        }
        let columns = usize::try_from(int("NAXIS1")?).map_err(|_| FitsError::Keyword("NAXIS1"))?;
        let rows = usize::try_from(int("NAXIS2")?).map_err(|_| FitsError::Keyword("NAXIS2"))?;

        if header_len > bytes.len() {
            return Err(FitsError::PartialBlock {
                header: header_len,
                len: bytes.len(),
            });
        }
        let expected = columns
            .checked_mul(rows)
            .and_then(|n| n.checked_mul(bitpix.width()))
            .ok_or(FitsError::Oversized)?;
        let data = header_len
            .checked_add(expected)
            .and_then(|end| bytes.get(header_len..end))
            .ok_or(FitsError::Truncated {
                expected,
                actual: bytes.len() - header_len,
            })?;

        Ok(Self {
            bscale: float_or("BSCALE", 1.0),
            bzero: float_or("BZERO", 0.0),
            data,
            cards,
            bitpix,
            columns,
            rows,
        })
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn value(&self, keyword: &str) -> Option<&HeaderValue> {
        self.cards
            .iter()
            .find(|c| c.keyword == keyword)
            .map(|c| &c.value)
    }

    /// NAXIS1.
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// NAXIS2.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Physical value (BSCALE/BZERO applied) at `row`, `column`.
    pub fn value_at(&self, row: usize, column: usize) -> Option<f64> {
        if row >= self.rows || column >= self.columns {
            return None;
        }
        let width = self.bitpix.width();
        let start = (row * self.columns + column) * width;
        let raw = self.bitpix.read(&self.data[start..start + width]);
        Some(self.bzero + self.bscale * raw)
    }

    /// Materialize one column.
    pub fn column(&self, column: usize) -> Vec<f64> {
        (0..self.rows)
            .filter_map(|row| self.value_at(row, column))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// FitsTable – one-second amplitude/phase table
// ---------------------------------------------------------------------------

/// A table file: the leading header values name the source, every later
/// header value labels one column, rows are one second apart from DATE-OBS.
#[derive(Debug, Clone)]
pub struct FitsTable<'a> {
    pub file: FitsFile<'a>,
    pub source: Vec<String>,
    pub labels: Vec<String>,
    pub start: NaiveDateTime,
}

impl<'a> FitsTable<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, FitsError> {
        let file = FitsFile::parse(bytes)?;

        let values: Vec<String> = file.cards().iter().map(|c| c.value.to_string()).collect();
        let split = SOURCE_VALUES.min(values.len());
        let source = values[..split].to_vec();
        let labels = values[split..].to_vec();
        if labels.len() != file.columns() {
            return Err(FitsError::ColumnCount {
                labels: labels.len(),
                columns: file.columns(),
            });
        }

        let date_obs = match file.value("DATE-OBS") {
            Some(HeaderValue::Text(s)) => s.clone(),
            _ => return Err(FitsError::Keyword("DATE-OBS")),
        };
        let start = parse_date_obs(&date_obs).ok_or(FitsError::DateObs(date_obs))?;

        Ok(Self {
            file,
            source,
            labels,
            start,
        })
    }

    /// The column with this label as a one-second series.
    pub fn series(&self, column: usize) -> TimeSeries {
        TimeSeries::regular(self.start, 1.0, &self.file.column(column))
    }

    /// Indices of columns whose label contains `needle`.
    pub fn columns_matching(&self, needle: &str) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, label)| label.contains(needle))
            .map(|(i, _)| i)
            .collect()
    }

    /// Source value counted from the end (`1` is the last one).
    pub fn source_from_end(&self, n: usize) -> &str {
        self.source
            .len()
            .checked_sub(n)
            .and_then(|i| self.source.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }
}

fn parse_date_obs(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synth::{fits_table, TableHeader};

    const LABELS: [&str; 4] = ["UT", "NAA Amp", "NAA Phase", "NPM Amp"];

    fn sample() -> Vec<u8> {
        let header = TableHeader {
            date_obs: "2012-03-04T05:06:07",
            transmitter: "NAA",
            station: "ati",
            labels: &LABELS,
        };
        let rows: Vec<Vec<f64>> = (0..10)
            .map(|r| vec![r as f64, 10.0 + r as f64, -5.0 * r as f64, 0.5])
            .collect();
        fits_table(&header, &rows)
    }

    #[test]
    fn header_values() {
        assert_eq!(parse_value("                   T / simple"), HeaderValue::Logical(true));
        assert_eq!(parse_value("                 -64"), HeaderValue::Integer(-64));
        assert_eq!(parse_value("              1.5D2"), HeaderValue::Float(150.0));
        assert_eq!(
            parse_value("'O''Higgins'         / station"),
            HeaderValue::Text("O'Higgins".into())
        );
    }

    #[test]
    fn table_layout() -> anyhow::Result<()> {
        let bytes = sample();
        let table = FitsTable::parse(&bytes)?;
        assert_eq!(table.file.rows(), 10);
        assert_eq!(table.file.columns(), 4);
        assert_eq!(table.labels, LABELS);
        assert_eq!(table.source_from_end(1), "ati");
        assert_eq!(table.source_from_end(2), "NAA");
        assert_eq!(table.columns_matching("Amp"), vec![1, 3]);
        assert_eq!(table.columns_matching("Phase"), vec![2]);
        assert_eq!(table.file.column(2)[3], -15.0);
        assert_eq!(table.file.value_at(10, 0), None);

        let ts = table.series(1);
        assert_eq!(ts.len(), 10);
        assert_eq!(ts.points[0].0.to_string(), "2012-03-04 05:06:07");
        Ok(())
    }

    fn header(cards: &[&str]) -> Vec<u8> {
        cards
            .iter()
            .flat_map(|card| format!("{card:<80}").into_bytes())
            .collect()
    }

    #[test]
    fn scaled_integers() -> anyhow::Result<()> {
        let mut bytes = header(&[
            "SIMPLE  =                    T",
            "BITPIX  =                   16",
            "NAXIS   =                    2",
            "NAXIS1  =                    1",
            "NAXIS2  =                    2",
            "BSCALE  =                  0.5",
            "BZERO   =                 10.0",
            "END",
        ]);
        bytes.resize(BLOCK_SIZE, b' ');
        bytes.extend_from_slice(&4i16.to_be_bytes());
        bytes.extend_from_slice(&(-2i16).to_be_bytes());

        let file = FitsFile::parse(&bytes)?;
        assert_eq!(file.column(0), vec![12.0, 9.0]);
        Ok(())
    }

    #[test]
    fn truncated_data_is_rejected() {
        let mut bytes = sample();
        bytes.truncate(BLOCK_SIZE + 16);
        assert!(matches!(
            FitsTable::parse(&bytes),
            Err(FitsError::Truncated { .. })
        ));
    }

    #[test]
    fn missing_end() {
        let bytes = vec![b' '; BLOCK_SIZE];
        assert!(matches!(FitsFile::parse(&bytes), Err(FitsError::NoEnd)));
    }

    #[test]
    fn unpadded_header() {
        let bytes = header(&[
            "SIMPLE  =                    T",
            "BITPIX  =                    8",
            "NAXIS   =                    2",
            "NAXIS1  =                    0",
            "NAXIS2  =                    0",
            "END",
        ]);
        assert_eq!(bytes.len(), 480);
        assert!(matches!(
            FitsFile::parse(&bytes),
            Err(FitsError::PartialBlock {
                header: BLOCK_SIZE,
                len: 480
            })
        ));
    }

    #[test]
    fn oversized_axes() {
        let mut bytes = header(&[
            "SIMPLE  =                    T",
            "BITPIX  =                  -64",
            "NAXIS   =                    2",
            "NAXIS1  =  4611686018427387904",
            "NAXIS2  =                    2",
            "END",
        ]);
        bytes.resize(BLOCK_SIZE, b' ');
        assert!(matches!(FitsFile::parse(&bytes), Err(FitsError::Oversized)));

        let mut bytes = header(&[
            "SIMPLE  =                    T",
            "BITPIX  =                  -64",
            "NAXIS   =                    2",
            "NAXIS1  =   576460752303423488",
            "NAXIS2  =                    1",
            "END",
        ]);
        bytes.resize(BLOCK_SIZE, b' ');
        assert!(matches!(FitsFile::parse(&bytes), Err(FitsError::Truncated { .. })));
    }

    #[test]
    fn date_only() {
        let t = parse_date_obs("2012-03-04").expect("date");
        assert_eq!(t.to_string(), "2012-03-04 00:00:00");
    }
}
