//! JSON exchange format for Gaussian records.
//!
//! A document is a plain array:
//!
//! ```json
//! [{"index": 0, "mean_x": 12.5, "mean_y": 3.0, "sigma_x": 2.0, "sigma_y": 1.5, "sigma_xy": 0.4, "weight": 0.8}]
//! ```
//!
//! `sigma_xy` may be omitted (treated as 0).

use crate::core::GaussianRecord;
use crate::error::Result;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

pub fn parse_records(json: &str) -> Result<Vec<GaussianRecord>> {
    Ok(serde_json::from_str(json)?)
}

pub fn records_to_json(records: &[GaussianRecord]) -> Result<String> {
    Ok(serde_json::to_string_pretty(records)?)
}

pub fn load_records(path: &Path) -> Result<Vec<GaussianRecord>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

pub fn save_records(path: &Path, records: &[GaussianRecord]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, records)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FitError;

    #[test]
    fn test_parse_optional_cross_term() {
        let records = parse_records(
            r#"[
                {"index": 0, "mean_x": 1, "mean_y": 2, "sigma_x": 3, "sigma_y": 4, "weight": 0.5},
                {"index": 2, "mean_x": 0, "mean_y": 0, "sigma_x": 1, "sigma_y": 1, "sigma_xy": -0.3, "weight": 1}
            ]"#,
        )
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sigma_xy, None);
        assert_eq!(records[1].sigma_xy, Some(-0.3));
        assert_eq!(records[1].index, 2);
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        assert!(matches!(
            parse_records(r#"[{"index": 0}]"#),
            Err(FitError::Json(_))
        ));
    }

    #[test]
    fn test_save_then_load_file() {
        let path = std::env::temp_dir().join(format!("splat2d_records_{}.json", std::process::id()));
        let records = vec![GaussianRecord {
            index: 0,
            mean_x: 1.5,
            mean_y: 2.5,
            sigma_x: 3.0,
            sigma_y: 0.5,
            sigma_xy: Some(0.25),
            weight: 0.75,
        }];
        save_records(&path, &records).unwrap();
        let loaded = load_records(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, records);
    }
}
