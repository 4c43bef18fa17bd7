
use anyhow::Context;
use std::io::{BufReader, BufWriter, Read, Write};
use std::fs::File;
use std::path::Path;

/// True if the path should be read or written through gzip
pub fn is_gzip_path(filename: &Path) -> bool {
    filename.extension().unwrap_or_default() == "gz"
}

/// Loads a JSON file into some type, transparently decompressing `.gz` paths
/// # Arguments
/// * `filename` - the file path to open and parse
/// # Errors
/// * if the file does not open properly
/// * if the deserialization throws errors
pub fn load_json<T: serde::de::DeserializeOwned>(filename: &Path) -> anyhow::Result<T> {
    let file = File::open(filename)
        .with_context(|| format!("Error while opening {filename:?}:"))?;
    let fp: Box<dyn Read> = if is_gzip_path(filename) {
        Box::new(flate2::read::MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    let result: T = serde_json::from_reader(BufReader::new(fp))
        .with_context(|| format!("Error while deserializing {filename:?}:"))?;
    Ok(result)
}

/// Saves a serializable value as pretty JSON, gzipped when the path ends with `.gz`
/// # Arguments
/// * `data` - the data in memory
/// * `out_filename` - user provided path to write to
/// # Errors
/// * if opening or writing to the file throw errors
/// * if JSON serialization throws errors
pub fn save_json<T: serde::Serialize>(data: &T, out_filename: &Path) -> anyhow::Result<()> {
    let file = File::create(out_filename)
        .with_context(|| format!("Error while creating {out_filename:?}:"))?;
    if is_gzip_path(out_filename) {
        let mut encoder = flate2::write::GzEncoder::new(BufWriter::new(file), flate2::Compression::best());
        serde_json::to_writer_pretty(&mut encoder, data)
            .with_context(|| format!("Error while serializing {out_filename:?}:"))?;
        let mut writer = encoder.finish()
            .with_context(|| format!("Error while finishing gzip stream for {out_filename:?}:"))?;
        writer.flush()
            .with_context(|| format!("Error while flushing output to {out_filename:?}:"))?;
    } else {
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, data)
            .with_context(|| format!("Error while serializing {out_filename:?}:"))?;
        writer.flush()
            .with_context(|| format!("Error while flushing output to {out_filename:?}:"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_plain_and_gzip() {
        let mut data: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        data.insert("T_VAF".to_string(), vec![0.5, 0.25]);

        let dir = tempfile::tempdir().unwrap();
        for name in ["settings.json", "settings.json.gz"] {
            let filename = dir.path().join(name);
            save_json(&data, &filename).unwrap();
            let loaded: BTreeMap<String, Vec<f64>> = load_json(&filename).unwrap();
            assert_eq!(loaded, data);
        }

        // the gzip file really is compressed
        let raw = std::fs::read(dir.path().join("settings.json.gz")).unwrap();
        assert_eq!(&raw[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn test_missing_file() {
        let result: anyhow::Result<BTreeMap<String, f64>> = load_json(Path::new("test_data/does_not_exist.json"));
        assert!(result.is_err());
        assert!(is_gzip_path(Path::new("model.json.gz")));
        assert!(!is_gzip_path(Path::new("model.json")));
    }
}
