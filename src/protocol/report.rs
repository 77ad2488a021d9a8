//! Classification of printer response lines.
//!
//! Marlin answers in free-form text. Only a handful of report shapes matter
//! for mesh leveling; everything else is firmware chatter and is ignored.
//!
//! ```text
//! ok
//! echo:busy: processing
//! X:<f> Y:<f> Z:<f> E:<f> Count X: <i> Y:<i> Z:<i>
//! Num X,Y: <i>,<i>
//! Z search height: <f>
//! ok T:<f> /<f> B:<f> /<f> B@:<f> @:<f>
//! ```

use std::str::FromStr;

use crate::error::{Error, Result};

/// Acknowledgement literal.
pub const RESPONSE_OK: &str = "ok";

/// Busy keep-alive literal.
pub const RESPONSE_BUSY: &str = "echo:busy: processing";

const MESH_GRID_PREFIX: &str = "Num X,Y: ";
const MESH_Z_PREFIX: &str = "Z search height: ";
const TEMPERATURE_PREFIX: &str = "ok T:";
const POSITION_PREFIX: &str = "X:";

/// A classified response line.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    /// Command acknowledged.
    Ack,
    /// Printer is still working on the last command.
    Busy,
    /// Position report (`M114`). Coordinates are kept as reported.
    Position { x: String, y: String, z: String },
    /// Mesh grid size (`G29 S0`).
    MeshGrid { count_x: u32, count_y: u32 },
    /// Mesh Z search height (`G29 S0`).
    MeshStartHeight { z: f64 },
    /// Temperature report (`M105`).
    Temperature { bed: f64 },
    /// Anything outside the known vocabulary.
    Unrecognized,
}

/// Classifies a single response line (terminator already stripped).
///
/// # Errors
///
/// Returns [`Error::MalformedReport`] if the line has a known shape but a
/// field inside it does not parse.
pub fn classify(line: &str) -> Result<Report> {
    if line == RESPONSE_OK {
        return Ok(Report::Ack);
    }
    if line == RESPONSE_BUSY {
        return Ok(Report::Busy);
    }
    if let Some(rest) = line.strip_prefix(MESH_GRID_PREFIX) {
        if let Some((x, y)) = rest.split_once(',') {
            return Ok(Report::MeshGrid {
                count_x: field(line, "mesh X count", x)?,
                count_y: field(line, "mesh Y count", y)?,
            });
        }
    }
    if let Some(rest) = line.strip_prefix(MESH_Z_PREFIX) {
        return Ok(Report::MeshStartHeight {
            z: number(line, "Z search height", rest)?,
        });
    }
    if let Some(rest) = line.strip_prefix(TEMPERATURE_PREFIX) {
        if let Some(bed) = temperature_bed(rest) {
            return Ok(Report::Temperature {
                bed: number(line, "bed temperature", bed)?,
            });
        }
    }
    if let Some(rest) = line.strip_prefix(POSITION_PREFIX) {
        if let Some((x, y, z)) = position_axes(rest) {
            // Coordinates are forwarded as text but must still look numeric.
            number(line, "X position", x)?;
            number(line, "Y position", y)?;
            number(line, "Z position", z)?;
            return Ok(Report::Position {
                x: x.to_owned(),
                y: y.to_owned(),
                z: z.to_owned(),
            });
        }
    }
    Ok(Report::Unrecognized)
}

/// Splits `<x> Y:<y> Z:<z> E:<e> Count X:<cx> Y:<cy> Z:<cz>` at its anchors.
fn position_axes(rest: &str) -> Option<(&str, &str, &str)> {
    let (x, rest) = rest.split_once(" Y:")?;
    let (y, rest) = rest.split_once(" Z:")?;
    let (z, rest) = rest.split_once(" E:")?;
    let (_e, counts) = rest.split_once(" Count X:")?;
    let (_count_x, rest) = counts.split_once(" Y:")?;
    let (_count_y, _count_z) = rest.split_once(" Z:")?;
    Some((x, y, z))
}

/// Returns the bed field of `<t> /<t> B:<b> /<b> B@:<p> @:<p>`.
fn temperature_bed(rest: &str) -> Option<&str> {
    let (_hotend, rest) = rest.split_once(" /")?;
    let (_hotend_target, rest) = rest.split_once(" B:")?;
    let (bed, rest) = rest.split_once(" /")?;
    let (_bed_target, rest) = rest.split_once(" B@:")?;
    rest.split_once(" @:")?;
    Some(bed)
}

/// Parses one numeric field, reporting the whole line on failure.
fn field<T>(line: &str, name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e| Error::MalformedReport {
        line: line.to_owned(),
        reason: format!("{name} {raw:?}: {e}"),
    })
}

/// Parses a finite decimal field.
fn number(line: &str, name: &str, raw: &str) -> Result<f64> {
    let value: f64 = field(line, name, raw)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(Error::MalformedReport {
            line: line.to_owned(),
            reason: format!("{name} {raw:?} is not finite"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_literals() {
        assert_eq!(classify("ok").unwrap(), Report::Ack);
        assert_eq!(classify("echo:busy: processing").unwrap(), Report::Busy);
        assert_eq!(classify("OK").unwrap(), Report::Unrecognized);
        assert_eq!(classify("ok ").unwrap(), Report::Unrecognized);
    }

    #[test]
    fn test_classify_position_passes_text_through() {
        let report = classify("X:10.00 Y:-5.50 Z:0.300 E:0.00 Count X: 800 Y:-440 Z:120").unwrap();
        assert_eq!(
            report,
            Report::Position {
                x: "10.00".into(),
                y: "-5.50".into(),
                z: "0.300".into(),
            }
        );
    }

    #[test]
    fn test_classify_position_substrings() {
        for (x, y, z) in [
            ("0.00", "0.00", "0.00"),
            ("117.50", "3.25", "15.000"),
            ("1", "22.5", "333.125"),
        ] {
            let line = format!("X:{x} Y:{y} Z:{z} E:0.00 Count X:0 Y:0 Z:0");
            let Report::Position {
                x: got_x,
                y: got_y,
                z: got_z,
            } = classify(&line).unwrap()
            else {
                panic!("not a position report: {line}");
            };
            assert_eq!((got_x.as_str(), got_y.as_str(), got_z.as_str()), (x, y, z));
        }
    }

    #[test]
    fn test_classify_position_malformed() {
        let err = classify("X:abc Y:0.00 Z:0.00 E:0.00 Count X: 0 Y:0 Z:0").unwrap_err();
        assert!(matches!(err, Error::MalformedReport { .. }));
    }

    #[test]
    fn test_classify_position_missing_counts_is_unrecognized() {
        assert_eq!(
            classify("X:0.00 Y:0.00 Z:0.00 E:0.00").unwrap(),
            Report::Unrecognized
        );
    }

    #[test]
    fn test_classify_mesh_grid() {
        for (cx, cy) in [(1, 1), (3, 3), (4, 2), (7, 9)] {
            let report = classify(&format!("Num X,Y: {cx},{cy}")).unwrap();
            assert_eq!(
                report,
                Report::MeshGrid {
                    count_x: cx,
                    count_y: cy
                }
            );
        }
        assert_eq!(
            classify("Num X,Y: 0,0").unwrap(),
            Report::MeshGrid {
                count_x: 0,
                count_y: 0
            }
        );
    }

    #[test]
    fn test_classify_mesh_grid_malformed() {
        assert!(matches!(
            classify("Num X,Y: 3,x"),
            Err(Error::MalformedReport { .. })
        ));
        assert!(matches!(
            classify("Num X,Y: -1,3"),
            Err(Error::MalformedReport { .. })
        ));
        assert_eq!(classify("Num X,Y: 3").unwrap(), Report::Unrecognized);
    }

    #[test]
    fn test_classify_mesh_start_height() {
        assert_eq!(
            classify("Z search height: 0.35").unwrap(),
            Report::MeshStartHeight { z: 0.35 }
        );
        assert!(matches!(
            classify("Z search height: high"),
            Err(Error::MalformedReport { .. })
        ));
    }

    #[test]
    fn test_classify_temperature() {
        let report =
            classify("ok T:201.3 /210.0 B:59.8 /60.0 B@:127 @:64").unwrap();
        assert_eq!(report, Report::Temperature { bed: 59.8 });
    }

    #[test]
    fn test_classify_temperature_malformed() {
        assert!(matches!(
            classify("ok T:21.0 /0.0 B:?? /0.0 B@:0 @:0"),
            Err(Error::MalformedReport { .. })
        ));
        assert_eq!(classify("ok T:21.0 /0.0").unwrap(), Report::Unrecognized);
    }

    #[test]
    fn test_classify_rejects_non_finite_numbers() {
        for value in ["NaN", "inf", "-inf", "infinity"] {
            let lines = [
                format!("Z search height: {value}"),
                format!("ok T:21.0 /0.0 B:{value} /0.0 B@:0 @:0"),
                format!("X:0.00 Y:0.00 Z:{value} E:0.00 Count X:0 Y:0 Z:0"),
            ];
            for line in lines {
                assert!(
                    matches!(classify(&line), Err(Error::MalformedReport { .. })),
                    "{line}"
                );
            }
        }
    }

    #[test]
    fn test_classify_chatter() {
        for line in [
            "start",
            "echo:Marlin 1.1.0-RC6",
            "echo:SD card ok",
            "Mesh bed leveling not active.",
            "",
        ] {
            assert_eq!(classify(line).unwrap(), Report::Unrecognized, "{line}");
        }
    }
}
