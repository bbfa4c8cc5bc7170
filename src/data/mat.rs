//! MAT container decoding.
//!
//! Level 5 files (v6, v7) are read with `matfile`, level 4 files with the
//! small reader below. Anything that does not parse that way, or parses
//! without a `data` variable, is retried as the HDF5 layout used by MAT 7.3.
//! Both attempts always run before a file is declared corrupt.

use std::io::Cursor;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use log::debug;
use matfile::NumericData;

use super::model::{DecodedDataset, FieldValue, MatFields};

/// HDF5 format signature, found at offset 0 or any power of two ≥ 512.
const HDF5_SIGNATURE: &[u8; 8] = b"\x89HDF\r\n\x1a\n";

/// Variables every receiver capture carries.
const REQUIRED: [&str; 10] = [
    "Fs",
    "data",
    "adc_channel_number",
    "start_year",
    "start_month",
    "start_day",
    "start_hour",
    "start_minute",
    "start_second",
    "station_name",
];

#[derive(Debug, thiserror::Error)]
pub enum MatError {
    #[error("classic layout: {classic}; hierarchical layout: {hierarchical}")]
    NoLayout {
        classic: String,
        hierarchical: String,
    },
    #[error(
        "MAT 7.3 (HDF5) container at byte {0}, but HDF5 support is not compiled in \
         (build with `--features hdf5`)"
    )]
    Hdf5Disabled(usize),
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("field 'data' holds no samples")]
    NoSamples,
    #[error("invalid sampling frequency {0}")]
    SamplingFrequency(f64),
    #[error("invalid capture start {0}")]
    CaptureStart(String),
}

/// Which of the two layouts produced the fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Classic,
    Hierarchical,
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Decode a receiver capture.
pub fn decode(bytes: &[u8]) -> Result<DecodedDataset, MatError> {
    let (_, fields) = decode_fields(bytes)?;
    dataset_from_fields(&fields)
}

/// Decode every numeric variable, trying the classic layout first.
pub fn decode_fields(bytes: &[u8]) -> Result<(Layout, MatFields), MatError> {
    let classic = match decode_classic(bytes) {
        Ok(fields) => return Ok((Layout::Classic, fields)),
        Err(err) => err,
    };
    debug!("classic MAT decode failed ({classic}), trying hierarchical layout");

    match decode_hierarchical(bytes) {
        Ok(fields) => Ok((Layout::Hierarchical, fields)),
        Err(hierarchical) => match find_superblock(bytes) {
            Some(offset) if !cfg!(feature = "hdf5") => Err(MatError::Hdf5Disabled(offset)),
            _ => Err(MatError::NoLayout {
                classic,
                hierarchical,
            }),
        },
    }
}

/// Offset of the HDF5 superblock, if the buffer holds one.
pub fn find_superblock(bytes: &[u8]) -> Option<usize> {
    let mut offset = 0usize;
    loop {
        let end = offset.checked_add(HDF5_SIGNATURE.len())?;
        if end > bytes.len() {
            return None;
        }
        if &bytes[offset..end] == HDF5_SIGNATURE {
            return Some(offset);
        }
        offset = if offset == 0 { 512 } else { offset * 2 };
    }
}

// ---------------------------------------------------------------------------
// Classic layouts (level 5, level 4)
// ---------------------------------------------------------------------------

/// Level 5 files carry a 128-byte text header ending in an `IM`/`MI` byte
/// order mark; level 4 files start directly with a variable header.
fn is_level5(bytes: &[u8]) -> bool {
    matches!(bytes.get(126..128), Some(b"IM") | Some(b"MI"))
}

fn decode_classic(bytes: &[u8]) -> Result<MatFields, String> {
    let fields = if is_level5(bytes) {
        decode_level5(bytes)?
    } else {
        decode_level4(bytes)?
    };

    match fields.get("data") {
        Some(data) if !data.is_empty() => Ok(fields),
        _ => Err("no 'data' variable".to_string()),
    }
}

fn decode_level5(bytes: &[u8]) -> Result<MatFields, String> {
    let mat = matfile::MatFile::parse(Cursor::new(bytes)).map_err(|e| {
        debug!("matfile: {e:?}");
        "unreadable level 5 MAT file".to_string()
    })?;

    Ok(mat
        .arrays()
        .iter()
        .map(|array| {
            let value = FieldValue::new(array.size().clone(), widen(array.data()));
            (array.name().to_string(), value)
        })
        .collect())
}

/// type, rows, columns, imaginary flag, name length; `i32` each.
const LEVEL4_HEADER: usize = 20;

fn decode_level4(bytes: &[u8]) -> Result<MatFields, String> {
    let mut fields = MatFields::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let rest = &bytes[offset..];
        let head = rest
            .get(..LEVEL4_HEADER)
            .ok_or_else(|| format!("level 4 header cut short at byte {offset}"))?;

        let little = LittleEndian::read_i32(head);
        let (name, value, used) = if (0..1000).contains(&little) {
            level4_variable::<LittleEndian>(rest)?
        } else if (1000..2000).contains(&BigEndian::read_i32(head)) {
            level4_variable::<BigEndian>(rest)?
        } else {
            return Err(format!("no level 4 variable header at byte {offset}"));
        };
        fields.entry(name).or_insert(value);
        offset += used;
    }

    if fields.is_empty() {
        return Err("empty file".to_string());
    }
    Ok(fields)
}

/// One variable: header, NUL-terminated name, real part, optional imaginary
/// part. Returns the bytes consumed.
fn level4_variable<B: ByteOrder>(raw: &[u8]) -> Result<(String, FieldValue, usize), String> {
    let int = |i: usize| B::read_i32(&raw[i * 4..i * 4 + 4]);
    let mopt = int(0) % 1000;
    let (order, precision, kind) = (mopt / 100, mopt / 10 % 10, mopt % 10);
    if order != 0 || kind == 2 || precision > 5 {
        return Err(format!("unsupported level 4 matrix type {}", int(0)));
    }

    let dim = |i: usize| usize::try_from(int(i)).map_err(|_| format!("negative size {}", int(i)));
    let (rows, cols, name_len) = (dim(1)?, dim(2)?, dim(4)?);
    let parts = if int(3) != 0 { 2 } else { 1 };
    let width = [8, 4, 4, 2, 2, 1][precision as usize];

    let part_len = rows
        .checked_mul(cols)
        .and_then(|n| n.checked_mul(width))
        .ok_or("level 4 dimensions overflow")?;
    let end = part_len
        .checked_mul(parts)
        .and_then(|n| n.checked_add(LEVEL4_HEADER + name_len))
        .ok_or("level 4 dimensions overflow")?;
    let body = raw
        .get(LEVEL4_HEADER..end)
        .ok_or("level 4 variable cut short")?;

    let name = String::from_utf8_lossy(&body[..name_len])
        .trim_end_matches('\0')
        .to_string();
    let values = body[name_len..name_len + part_len]
        .chunks_exact(width)
        .map(|c| match precision {
            0 => B::read_f64(c),
            1 => B::read_f32(c) as f64,
            2 => B::read_i32(c) as f64,
            3 => B::read_i16(c) as f64,
            4 => B::read_u16(c) as f64,
            _ => c[0] as f64,
        })
        .collect();
    Ok((name, FieldValue::new(vec![rows, cols], values), end))
}

/// Widen any numeric class to `f64`, dropping imaginary parts.
fn widen(data: &NumericData) -> Vec<f64> {
    fn cast<T: Copy + Into<f64>>(values: &[T]) -> Vec<f64> {
        values.iter().map(|&v| v.into()).collect()
    }
    match data {
        NumericData::Int8 { real, .. } => cast(real),
        NumericData::UInt8 { real, .. } => cast(real),
        NumericData::Int16 { real, .. } => cast(real),
        NumericData::UInt16 { real, .. } => cast(real),
        NumericData::Int32 { real, .. } => cast(real),
        NumericData::UInt32 { real, .. } => cast(real),
        NumericData::Int64 { real, .. } => real.iter().map(|&v| v as f64).collect(),
        NumericData::UInt64 { real, .. } => real.iter().map(|&v| v as f64).collect(),
        NumericData::Single { real, .. } => cast(real),
        NumericData::Double { real, .. } => real.clone(),
    }
}

// ---------------------------------------------------------------------------
// Hierarchical (HDF5 / MAT 7.3) layout
// ---------------------------------------------------------------------------

fn decode_hierarchical(bytes: &[u8]) -> Result<MatFields, String> {
    let offset = find_superblock(bytes).ok_or("no HDF5 superblock signature")?;
    debug!("HDF5 superblock at offset {offset}");
    let fields = read_hierarchical(bytes)?;

    match fields.get("data") {
        Some(data) if !data.is_empty() => Ok(fields),
        _ => Err("no 'data' field in any group".to_string()),
    }
}

#[cfg(feature = "hdf5")]
fn read_hierarchical(bytes: &[u8]) -> Result<MatFields, String> {
    use std::io::Write;

    // The HDF5 library only opens files by name.
    let mut tmp = tempfile::NamedTempFile::new().map_err(|e| e.to_string())?;
    tmp.write_all(bytes).map_err(|e| e.to_string())?;
    tmp.flush().map_err(|e| e.to_string())?;

    let file = hdf5::File::open(tmp.path()).map_err(|e| e.to_string())?;
    let root = file
        .group("data")
        .or_else(|_| file.group("/"))
        .map_err(|e| e.to_string())?;

    let mut fields = MatFields::new();
    collect_group(&root, &mut fields).map_err(|e| e.to_string())?;
    if let Ok(top) = file.group("/") {
        collect_group(&top, &mut fields).map_err(|e| e.to_string())?;
    }
    Ok(fields)
}

/// Flatten datasets of a group and its subgroups; the first occurrence of a
/// name wins.
#[cfg(feature = "hdf5")]
fn collect_group(group: &hdf5::Group, fields: &mut MatFields) -> hdf5::Result<()> {
    for dataset in group.datasets()? {
        let path = dataset.name();
        let name = path.rsplit('/').next().unwrap_or(&path).to_string();
        if fields.contains_key(&name) {
            continue;
        }
        match dataset.read_raw::<f64>() {
            Ok(values) => {
                fields.insert(name, FieldValue::new(dataset.shape(), values));
            }
            Err(err) => debug!("skipping non-numeric dataset {path}: {err}"),
        }
    }
    for child in group.groups()? {
        if child.name().rsplit('/').next() == Some("#refs#") {
            continue;
        }
        collect_group(&child, fields)?;
    }
    Ok(())
}

#[cfg(not(feature = "hdf5"))]
fn read_hierarchical(_bytes: &[u8]) -> Result<MatFields, String> {
    Err("built without HDF5 support (enable the `hdf5` feature)".to_string())
}

// ---------------------------------------------------------------------------
// Fields → dataset
// ---------------------------------------------------------------------------

/// Check the required variables and assemble the dataset.
pub fn dataset_from_fields(fields: &MatFields) -> Result<DecodedDataset, MatError> {
    for name in REQUIRED {
        if fields.get(name).map_or(true, FieldValue::is_empty) {
            return Err(MatError::MissingField(name));
        }
    }
    let scalar = |name: &'static str| {
        fields
            .get(name)
            .and_then(FieldValue::scalar)
            .ok_or(MatError::MissingField(name))
    };

    let sampling_frequency = scalar("Fs")?;
    if !(sampling_frequency.is_finite() && sampling_frequency > 0.0) {
        return Err(MatError::SamplingFrequency(sampling_frequency));
    }

    let samples = fields
        .get("data")
        .map(|f| f.values.clone())
        .ok_or(MatError::MissingField("data"))?;
    if samples.is_empty() {
        return Err(MatError::NoSamples);
    }

    let start = capture_start(
        scalar("start_year")?,
        scalar("start_month")?,
        scalar("start_day")?,
        scalar("start_hour")?,
        scalar("start_minute")?,
        scalar("start_second")?,
    )?;

    let station_name = fields
        .get("station_name")
        .map(FieldValue::as_text)
        .unwrap_or_default();

    Ok(DecodedDataset {
        sampling_frequency,
        samples,
        start,
        channel: scalar("adc_channel_number")? as i64,
        station_name,
    })
}

fn capture_start(
    year: f64,
    month: f64,
    day: f64,
    hour: f64,
    minute: f64,
    second: f64,
) -> Result<NaiveDateTime, MatError> {
    let describe = || format!("{year}-{month}-{day} {hour}:{minute}:{second}");
    if [year, month, day, hour, minute, second]
        .iter()
        .any(|v| !v.is_finite() || *v < 0.0)
    {
        return Err(MatError::CaptureStart(describe()));
    }

    let whole = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .and_then(|d| d.and_hms_opt(hour as u32, minute as u32, second.trunc() as u32))
        .ok_or_else(|| MatError::CaptureStart(describe()))?;
    let fraction = Duration::nanoseconds((second.fract() * 1e9).round() as i64);
    Ok(whole + fraction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synth::{self, MatArray, MatVariable};
    use chrono::Timelike;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2006, 4, 6)
            .and_then(|d| d.and_hms_opt(13, 45, 36))
            .expect("valid date")
    }

    #[test]
    fn classic_layout_decodes() -> anyhow::Result<()> {
        let samples: Vec<f64> = (0..120).map(|i| i as f64 * 0.5).collect();
        let bytes = synth::receiver_mat(start(), 1.0, 1, "Tatuoca", &samples);

        let (layout, fields) = decode_fields(&bytes)?;
        assert_eq!(layout, Layout::Classic);
        assert!(fields.contains_key("station_name"));

        let ds = dataset_from_fields(&fields)?;
        assert_eq!(ds.samples, samples);
        assert_eq!(ds.sampling_frequency, 1.0);
        assert_eq!(ds.start, start());
        assert_eq!(ds.channel, 1);
        assert_eq!(ds.station_name, "Tatuoca");
        Ok(())
    }

    #[test]
    fn level4_decodes_in_both_byte_orders() -> anyhow::Result<()> {
        let samples: Vec<f64> = (0..40).map(|i| (i as f64).sqrt()).collect();
        let vars = synth::receiver_variables(start(), 1.0, 1, "Tatuoca", &samples);

        for bytes in [
            synth::mat_level4::<LittleEndian>(&vars),
            synth::mat_level4::<BigEndian>(&vars),
        ] {
            let (layout, fields) = decode_fields(&bytes)?;
            assert_eq!(layout, Layout::Classic);
            assert_eq!(fields["data"].dims, vec![40, 1]);

            let ds = dataset_from_fields(&fields)?;
            assert_eq!(ds.samples, samples);
            assert_eq!(ds.start, start());
            assert_eq!(ds.channel, 1);
            assert_eq!(ds.station_name, "Tatuoca");
        }
        Ok(())
    }

    #[test]
    fn level4_cut_short() {
        let vars = synth::receiver_variables(start(), 1.0, 0, "X", &[1.0, 2.0, 3.0]);
        let mut bytes = synth::mat_level4::<LittleEndian>(&vars);
        bytes.truncate(bytes.len() - 3);
        let err = decode_fields(&bytes).unwrap_err();
        assert!(err.to_string().contains("cut short"), "{err}");
    }

    #[test]
    fn level5_errors_stay_readable() {
        // Byte order mark present, descriptive text zeroed.
        let mut bytes = synth::receiver_mat(start(), 1.0, 0, "X", &[1.0]);
        bytes[..4].fill(0);
        let message = decode_fields(&bytes).unwrap_err().to_string();
        assert!(message.contains("unreadable level 5 MAT file"), "{message}");
        assert!(!message.contains("ParseError"), "{message}");
    }

    #[test]
    fn missing_field_is_reported() {
        let vars = vec![
            MatVariable::scalar("Fs", 1.0),
            MatVariable::column("data", MatArray::Double(vec![1.0, 2.0])),
        ];
        let bytes = synth::mat_level5(&vars);
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, MatError::MissingField("adc_channel_number")));
    }

    #[test]
    fn invalid_date_is_rejected() {
        let mut vars = synth::receiver_variables(start(), 1.0, 0, "X", &[1.0]);
        for v in vars.iter_mut() {
            if v.name == "start_month" {
                *v = MatVariable::scalar("start_month", 13.0);
            }
        }
        let err = decode(&synth::mat_level5(&vars)).unwrap_err();
        assert!(matches!(err, MatError::CaptureStart(_)));
    }

    #[test]
    fn fractional_seconds_survive() -> anyhow::Result<()> {
        let t = capture_start(2010.0, 1.0, 2.0, 3.0, 4.0, 5.25)?;
        assert_eq!(t.second(), 5);
        assert_eq!(t.nanosecond(), 250_000_000);
        Ok(())
    }

    #[test]
    fn garbage_fails_both_layouts() {
        let err = decode_fields(b"definitely not a matrix container").unwrap_err();
        match err {
            MatError::NoLayout {
                classic,
                hierarchical,
            } => {
                assert!(!classic.is_empty());
                assert!(hierarchical.contains("superblock"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn broken_newer_layout_is_corrupt() {
        // MAT 7.3 shape: text header, user block, HDF5 signature, then junk.
        let mut bytes = vec![b' '; 512];
        bytes[..19].copy_from_slice(b"MATLAB 7.3 MAT-file");
        bytes.extend_from_slice(HDF5_SIGNATURE);
        bytes.extend_from_slice(&[0xAB; 64]);

        assert_eq!(find_superblock(&bytes), Some(512));
        let err = decode_fields(&bytes).unwrap_err();
        if cfg!(feature = "hdf5") {
            assert!(matches!(err, MatError::NoLayout { .. }), "{err}");
        } else {
            assert!(matches!(err, MatError::Hdf5Disabled(512)), "{err}");
            assert!(err.to_string().contains("--features hdf5"));
        }
    }

    #[test]
    fn superblock_search_steps_by_powers_of_two() {
        let mut bytes = vec![0u8; 2048 + 8];
        bytes[2048..].copy_from_slice(HDF5_SIGNATURE);
        assert_eq!(find_superblock(&bytes), Some(2048));

        let mut misplaced = vec![0u8; 1600];
        misplaced[700..708].copy_from_slice(HDF5_SIGNATURE);
        assert_eq!(find_superblock(&misplaced), None);
    }

    #[cfg(feature = "hdf5")]
    #[test]
    fn hierarchical_fallback_reads_data() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("capture.mat");
        {
            let file = hdf5::File::create(&path)?;
            let group = file.create_group("data")?;
            let samples: Vec<f64> = (0..50).map(|i| i as f64).collect();
            group
                .new_dataset_builder()
                .with_data(&samples[..])
                .create("data")?;
            group
                .new_dataset_builder()
                .with_data(&[1.0f64][..])
                .create("Fs")?;
        }
        let bytes = std::fs::read(&path)?;

        let (layout, fields) = decode_fields(&bytes)?;
        assert_eq!(layout, Layout::Hierarchical);
        let data = fields.get("data").expect("data field");
        assert_eq!(data.values.len(), 50);
        assert_eq!(fields.get("Fs").and_then(FieldValue::scalar), Some(1.0));
        Ok(())
    }
}
