//! Writers for synthetic captures in the receivers' container formats.
//!
//! Used by the `generate_sample` binary and by the tests; they produce the
//! smallest valid files the decoders accept, nothing more.

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
use chrono::{Datelike, NaiveDateTime, Timelike};

use super::fits::{BLOCK_SIZE, CARD_SIZE};

// ---------------------------------------------------------------------------
// MAT level 5
// ---------------------------------------------------------------------------

const MI_INT8: u32 = 1;
const MI_UINT8: u32 = 2;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_DOUBLE: u32 = 9;
const MI_MATRIX: u32 = 14;

const MX_DOUBLE_CLASS: u32 = 6;
const MX_UINT8_CLASS: u32 = 9;

#[derive(Debug, Clone, PartialEq)]
pub enum MatArray {
    Double(Vec<f64>),
    UInt8(Vec<u8>),
}

impl MatArray {
    fn len(&self) -> usize {
        match self {
            MatArray::Double(v) => v.len(),
            MatArray::UInt8(v) => v.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatVariable {
    pub name: String,
    pub rows: usize,
    pub cols: usize,
    pub data: MatArray,
}

impl MatVariable {
    pub fn scalar(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            rows: 1,
            cols: 1,
            data: MatArray::Double(vec![value]),
        }
    }

    /// An `n x 1` column vector, the shape receivers store samples in.
    pub fn column(name: &str, data: MatArray) -> Self {
        Self {
            name: name.to_string(),
            rows: data.len(),
            cols: 1,
            data,
        }
    }

    /// A `1 x n` row of character codes.
    pub fn text(name: &str, text: &str) -> Self {
        let data = MatArray::UInt8(text.bytes().collect());
        Self {
            name: name.to_string(),
            rows: 1,
            cols: data.len(),
            data,
        }
    }
}

/// Serialize variables as a little-endian level 5 MAT file.
pub fn mat_level5(vars: &[MatVariable]) -> Vec<u8> {
    let mut out = Vec::new();

    let mut text = b"MATLAB 5.0 MAT-file, Platform: vlf-graph synthetic".to_vec();
    text.resize(116, b' ');
    out.extend_from_slice(&text);
    out.extend_from_slice(&[0u8; 8]);
    out.extend_from_slice(&0x0100u16.to_le_bytes());
    out.extend_from_slice(b"IM");

    for var in vars {
        let body = matrix_body(var);
        push_tag(&mut out, MI_MATRIX, body.len());
        out.extend_from_slice(&body);
    }
    out
}

fn matrix_body(var: &MatVariable) -> Vec<u8> {
    let mut body = Vec::new();

    let class = match var.data {
        MatArray::Double(_) => MX_DOUBLE_CLASS,
        MatArray::UInt8(_) => MX_UINT8_CLASS,
    };
    push_tag(&mut body, MI_UINT32, 8);
    body.extend_from_slice(&class.to_le_bytes());
    body.extend_from_slice(&0u32.to_le_bytes());

    push_tag(&mut body, MI_INT32, 8);
    body.extend_from_slice(&(var.rows as i32).to_le_bytes());
    body.extend_from_slice(&(var.cols as i32).to_le_bytes());

    push_element(&mut body, MI_INT8, var.name.as_bytes());

    match &var.data {
        MatArray::Double(values) => {
            let mut raw = Vec::with_capacity(values.len() * 8);
            for &v in values {
                // Writing into a Vec cannot fail.
                let _ = raw.write_f64::<LittleEndian>(v);
            }
            push_element(&mut body, MI_DOUBLE, &raw);
        }
        MatArray::UInt8(values) => push_element(&mut body, MI_UINT8, values),
    }
    body
}

fn push_tag(out: &mut Vec<u8>, data_type: u32, len: usize) {
    out.extend_from_slice(&data_type.to_le_bytes());
    out.extend_from_slice(&(len as u32).to_le_bytes());
}

/// Tag, payload, then zero padding to the next 8-byte boundary.
fn push_element(out: &mut Vec<u8>, data_type: u32, payload: &[u8]) {
    push_tag(out, data_type, payload.len());
    out.extend_from_slice(payload);
    let pad = (8 - payload.len() % 8) % 8;
    out.extend(std::iter::repeat(0u8).take(pad));
}

/// Serialize variables as a level 4 MAT file in byte order `B`. Everything
/// is stored as doubles; text variables are flagged as text.
pub fn mat_level4<B: ByteOrder>(vars: &[MatVariable]) -> Vec<u8> {
    let order = if B::read_u16(&[0, 1]) == 1 { 1000 } else { 0 };
    let mut out = Vec::new();
    for var in vars {
        let (kind, values): (i32, Vec<f64>) = match &var.data {
            MatArray::Double(v) => (0, v.clone()),
            MatArray::UInt8(v) => (1, v.iter().map(|&b| b as f64).collect()),
        };
        let mut name = var.name.as_bytes().to_vec();
        name.push(0);

        // Writing into a Vec cannot fail.
        for field in [
            order + kind,
            var.rows as i32,
            var.cols as i32,
            0,
            name.len() as i32,
        ] {
            let _ = out.write_i32::<B>(field);
        }
        out.extend_from_slice(&name);
        for v in values {
            let _ = out.write_f64::<B>(v);
        }
    }
    out
}

/// The variable set a receiver writes for one capture.
pub fn receiver_variables(
    start: NaiveDateTime,
    sampling_frequency: f64,
    channel: i64,
    station_name: &str,
    samples: &[f64],
) -> Vec<MatVariable> {
    vec![
        MatVariable::scalar("Fs", sampling_frequency),
        MatVariable::column("data", MatArray::Double(samples.to_vec())),
        MatVariable::scalar("adc_channel_number", channel as f64),
        MatVariable::scalar("start_year", start.year() as f64),
        MatVariable::scalar("start_month", start.month() as f64),
        MatVariable::scalar("start_day", start.day() as f64),
        MatVariable::scalar("start_hour", start.hour() as f64),
        MatVariable::scalar("start_minute", start.minute() as f64),
        MatVariable::scalar("start_second", start.second() as f64),
        MatVariable::text("station_name", station_name),
    ]
}

pub fn receiver_mat(
    start: NaiveDateTime,
    sampling_frequency: f64,
    channel: i64,
    station_name: &str,
    samples: &[f64],
) -> Vec<u8> {
    mat_level5(&receiver_variables(
        start,
        sampling_frequency,
        channel,
        station_name,
        samples,
    ))
}

// ---------------------------------------------------------------------------
// FITS primary array
// ---------------------------------------------------------------------------

/// Header values of a one-second table file.
#[derive(Debug, Clone)]
pub struct TableHeader<'a> {
    pub date_obs: &'a str,
    pub transmitter: &'a str,
    pub station: &'a str,
    pub labels: &'a [&'a str],
}

/// Write a primary HDU holding `rows` as a BITPIX -64 image.
///
/// The first eight header values are SIMPLE, BITPIX, NAXIS, NAXIS1, NAXIS2,
/// DATE-OBS, TRANSMIT and STATION; column labels follow as `COLn` cards.
pub fn fits_table(header: &TableHeader<'_>, rows: &[Vec<f64>]) -> Vec<u8> {
    let mut cards = vec![
        value_card("SIMPLE", "T"),
        value_card("BITPIX", "-64"),
        value_card("NAXIS", "2"),
        value_card("NAXIS1", &header.labels.len().to_string()),
        value_card("NAXIS2", &rows.len().to_string()),
        string_card("DATE-OBS", header.date_obs),
        string_card("TRANSMIT", header.transmitter),
        string_card("STATION", header.station),
        format!("{:<8}{}", "COMMENT", "  synthetic capture written by vlf-graph"),
    ];
    for (i, label) in header.labels.iter().enumerate() {
        cards.push(string_card(&format!("COL{}", i + 1), label));
    }
    cards.push("END".to_string());

    let mut out = Vec::new();
    for card in &cards {
        let mut raw = card.as_bytes().to_vec();
        raw.resize(CARD_SIZE, b' ');
        out.extend_from_slice(&raw);
    }
    pad_block(&mut out, b' ');

    for row in rows {
        for &value in row {
            let _ = out.write_f64::<BigEndian>(value);
        }
    }
    pad_block(&mut out, 0);
    out
}

fn value_card(key: &str, value: &str) -> String {
    format!("{key:<8}= {value:>20}")
}

fn string_card(key: &str, value: &str) -> String {
    let quoted = format!("'{:<8}'", value.replace('\'', "''"));
    format!("{key:<8}= {quoted}")
}

fn pad_block(out: &mut Vec<u8>, fill: u8) {
    let rem = out.len() % BLOCK_SIZE;
    if rem != 0 {
        out.resize(out.len() + BLOCK_SIZE - rem, fill);
    }
}
