//! Recording class and subtype encoded in receiver filenames.
//!
//! Narrowband: `B1060406134536NPM_003A.mat` (26 characters)
//! ```text
//!  B1 060406134536 NPM _003 A .mat
//!  │  │            │        └ subtype, offset 21
//!  │  │            └ transmitter callsign, [14, 17)
//!  │  └ YYMMDDhhmmss
//!  └ station id
//! ```
//! Broadband: `BA060406134536_002.mat` (22 characters).

use std::fmt;

use crate::error::GraphError;

const NARROWBAND_LEN: usize = 26;
const BROADBAND_LEN: usize = 22;
const CALLSIGN: std::ops::Range<usize> = 14..17;
const STATION_ID: std::ops::Range<usize> = 0..2;
const SUBTYPE_OFFSET: usize = 21;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subtype {
    Amplitude,
    Phase,
}

impl fmt::Display for Subtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subtype::Amplitude => f.write_str("amplitude"),
            Subtype::Phase => f.write_str("phase"),
        }
    }
}

/// What kind of chart a capture turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingKind {
    Narrowband { subtype: Subtype },
    Broadband,
}

impl fmt::Display for RecordingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingKind::Narrowband { subtype } => write!(f, "narrowband {}", subtype),
            RecordingKind::Broadband => f.write_str("broadband"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameMetadata {
    pub kind: RecordingKind,
    pub callsign: String,
    pub station_id: String,
}

/// The trailing path segment.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Derive the recording kind from the filename alone.
///
/// A known length with an unknown subtype character is reported as
/// [`GraphError::UnsupportedVariant`]; any other length as
/// [`GraphError::UnrecognizedFormat`].
pub fn parse(path: &str) -> Result<FilenameMetadata, GraphError> {
    let name = file_name(path);
    let chars: Vec<char> = name.chars().collect();
    let slice = |r: std::ops::Range<usize>| chars[r].iter().collect::<String>();

    let kind = match chars.len() {
        NARROWBAND_LEN => {
            let subtype = match chars[SUBTYPE_OFFSET] {
                'A' => Subtype::Amplitude,
                'B' => Subtype::Phase,
                other => {
                    return Err(GraphError::UnsupportedVariant(format!(
                        "narrowband subtype '{other}' in {name}"
                    )))
                }
            };
            RecordingKind::Narrowband { subtype }
        }
        BROADBAND_LEN => RecordingKind::Broadband,
        len => {
            return Err(GraphError::UnrecognizedFormat(format!(
                "filename {name} has {len} characters, expected {NARROWBAND_LEN} or {BROADBAND_LEN}"
            )))
        }
    };

    Ok(FilenameMetadata {
        kind,
        callsign: slice(CALLSIGN),
        station_id: slice(STATION_ID),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Status;

    #[test]
    fn narrowband_amplitude() -> anyhow::Result<()> {
        let meta = parse("2006/04/06/narrowband/B1/B1060406134536NPM_003A.mat")?;
        assert_eq!(
            meta.kind,
            RecordingKind::Narrowband {
                subtype: Subtype::Amplitude
            }
        );
        assert_eq!(meta.callsign, "NPM");
        assert_eq!(meta.station_id, "B1");
        Ok(())
    }

    #[test]
    fn narrowband_phase() -> anyhow::Result<()> {
        let meta = parse("B1060406134536NAA_003B.mat")?;
        assert_eq!(
            meta.kind,
            RecordingKind::Narrowband {
                subtype: Subtype::Phase
            }
        );
        assert_eq!(meta.callsign, "NAA");
        Ok(())
    }

    #[test]
    fn broadband() -> anyhow::Result<()> {
        let meta = parse("2006/04/06/broadband/BA/BA060406134536_002.mat")?;
        assert_eq!(meta.kind, RecordingKind::Broadband);
        Ok(())
    }

    #[test]
    fn kinds_display_in_lower_case() {
        let amplitude = RecordingKind::Narrowband {
            subtype: Subtype::Amplitude,
        };
        let phase = RecordingKind::Narrowband {
            subtype: Subtype::Phase,
        };
        assert_eq!(amplitude.to_string(), "narrowband amplitude");
        assert_eq!(phase.to_string(), "narrowband phase");
        assert_eq!(RecordingKind::Broadband.to_string(), "broadband");
    }

    #[test]
    fn other_subtypes_are_unsupported() {
        for c in ['C', 'D', 'F', 'a', 'b', 'Z', '0'] {
            let name = format!("B1060406134536NPM_003{c}.mat");
            let err = parse(&name).unwrap_err();
            assert_eq!(err.status(), Status::UnsupportedVariant, "{name}");
        }
    }

    #[test]
    fn other_lengths_are_unrecognized() {
        for len in (0..40).filter(|l| *l != 22 && *l != 26) {
            let name: String = "X".repeat(len);
            let err = parse(&format!("dir/{name}")).unwrap_err();
            assert_eq!(err.status(), Status::UnrecognizedFormat, "length {len}");
        }
    }

    #[test]
    fn only_trailing_segment_counts() -> anyhow::Result<()> {
        // 26 characters in the directory part, 22 in the file name.
        let meta = parse("B1060406134536NPM_003A.mat/BA060406134536_002.mat")?;
        assert_eq!(meta.kind, RecordingKind::Broadband);
        Ok(())
    }
}
