use crate::error::{PipelineError, PipelineResult};
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};

/// Pretty-print `value` with a four-space indent. The whole document is
/// rendered in memory first so a serialization error never leaves a
/// truncated file behind.
pub fn to_json_bytes<T: Serialize>(value: &T) -> PipelineResult<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> PipelineResult<()> {
    let bytes = to_json_bytes(value)?;
    std::fs::write(path, bytes).map_err(|e| PipelineError::io(path, e))?;
    Ok(())
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().cloned().take(max_rows).collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_uses_four_space_indent() {
        let bytes = to_json_bytes(&json!({ "a": [1] })).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "{\n    \"a\": [\n        1\n    ]\n}"
        );
    }

    #[test]
    fn write_json_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_json(&path, &json!({ "ok": true })).unwrap();
        let back: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back["ok"], json!(true));
    }
}
