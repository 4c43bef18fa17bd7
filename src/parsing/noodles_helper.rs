
use anyhow::Context;
use indexmap::IndexMap;
use log::{debug, warn};
use noodles::bed::io::reader::Builder as BedBuilder;
use noodles::bed::{io::Reader as BedReader, Record as BedRecord};
use noodles::core::region::Interval;
use noodles::vcf;
use noodles::vcf::variant::record_buf;
use noodles_util::variant::io::reader::Builder as VcfBuilder;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Wrapper function that handles both gzip compressed and uncompressed BED files
/// # Arguments
/// * `filename` - path to the .bed(.gz) file to open
pub fn open_bed_file(filename: &Path) -> anyhow::Result<BedReader<3, BufReader<Box<dyn std::io::Read>>>> {
    let is_compressed = filename.extension().is_some_and(|e| e == "gz");
    let buf_reader: Box<dyn std::io::Read> = if is_compressed {
        #[allow(clippy::default_constructed_unit_structs)]
        let bgzf_reader = noodles::bgzf::io::reader::Builder::default()
            .build_from_path(filename)
            .with_context(|| format!("Error while loading {filename:?}:"))?;
        Box::new(bgzf_reader)
    } else {
        Box::new(std::fs::File::open(filename)
            .with_context(|| format!("Error while opening {filename:?}:"))?)
    };

    #[allow(clippy::default_constructed_unit_structs)]
    let bed_reader = BedBuilder::<3>::default()
        .build_from_reader(buf_reader);
    Ok(bed_reader)
}

/// A pre-loaded BED file with intervals grouped by chromosome in file order
pub struct LoadedBed {
    /// Map from chromosome to the sorted intervals
    chrom_lookup: IndexMap<String, Vec<Interval>>
}

impl LoadedBed {
    /// Loads an entire BED file into memory, sorting intervals within each chromosome.
    /// # Arguments
    /// * `filename` - path to the .bed(.gz) file to open
    pub fn preload_bed_file(filename: &Path) -> anyhow::Result<Self> {
        debug!("Pre-loading {filename:?}...");
        let mut bed_handle = open_bed_file(filename)?;

        let mut record = BedRecord::<3>::default();
        let mut chrom_lookup: IndexMap<String, Vec<Interval>> = Default::default();
        while bed_handle.read_record(&mut record)? > 0 {
            let chrom = record.reference_sequence_name().to_string();
            let start = record.feature_start()
                .with_context(|| format!("Error while parsing start for record: {record:?}"))?;
            let end = record.feature_end()
                .unwrap_or(Err(std::io::Error::other("Missing end")))
                .with_context(|| format!("Error while parsing end for record: {record:?}"))?;
            chrom_lookup.entry(chrom).or_default()
                .push(Interval::from(start..=end));
        }

        for interval_set in chrom_lookup.values_mut() {
            interval_set.sort_by_key(|i| (i.start(), i.end()));
        }

        Ok(Self {
            chrom_lookup
        })
    }

    // getters
    pub fn chrom_lookup(&self) -> &IndexMap<String, Vec<Interval>> {
        &self.chrom_lookup
    }
}

/// Streaming reader over a plain or bgzipped VCF that yields owned records
pub struct VcfStream {
    /// Source path, used in error messages
    path: PathBuf,
    header: vcf::Header,
    reader: noodles_util::variant::io::Reader<Box<dyn BufRead>>
}

impl VcfStream {
    /// Opens a VCF and reads the header
    /// # Arguments
    /// * `vcf_fn` - the VCF filename to open; compression is detected automatically
    pub fn open(vcf_fn: &Path) -> anyhow::Result<Self> {
        let mut reader = VcfBuilder::default()
            .build_from_path(vcf_fn)
            .with_context(|| format!("Error while opening {vcf_fn:?}:"))?;
        let header = reader.read_header()
            .with_context(|| format!("Error while reading header of {vcf_fn:?}:"))?;
        Ok(Self {
            path: vcf_fn.to_path_buf(),
            header,
            reader
        })
    }

    /// Visits every record in file order.
    /// Any unreadable record is an error that names the file and record number.
    /// # Arguments
    /// * `visit` - called with the 1-based record number and the parsed record
    pub fn for_each_record<F>(&mut self, mut visit: F) -> anyhow::Result<()>
    where
        F: FnMut(usize, &vcf::variant::RecordBuf) -> anyhow::Result<()>
    {
        let path = &self.path;
        let header = &self.header;
        for (i, result) in self.reader.records(header).enumerate() {
            let record_number = i + 1;
            let record = result
                .with_context(|| format!("Error while reading record #{record_number} of {path:?}:"))?;
            let record_buf = vcf::variant::RecordBuf::try_from_variant_record(header, record.as_ref())
                .with_context(|| format!("Error while parsing record #{record_number} of {path:?}:"))?;
            visit(record_number, &record_buf)
                .with_context(|| format!("Error in record #{record_number} of {path:?}:"))?;
        }
        Ok(())
    }

    // getters
    pub fn header(&self) -> &vcf::Header {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Column indices of the tumor and normal samples in a VCF
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SampleColumns {
    pub tumor: Option<usize>,
    pub normal: Option<usize>
}

/// Locates the tumor and normal columns in a caller VCF.
/// Exact names win, then a case-insensitive "tumor"/"normal" substring, then position.
/// Positionally, a single sample is the tumor and two samples are read as (normal, tumor).
/// # Arguments
/// * `header` - the caller VCF header
/// * `tumor_name` - expected tumor sample name
/// * `normal_name` - expected normal sample name, None for single-sample runs
pub fn resolve_sample_columns(header: &vcf::Header, tumor_name: &str, normal_name: Option<&str>) -> SampleColumns {
    let names = header.sample_names();
    let by_substring = |needle: &str| names.iter()
        .position(|n| n.to_ascii_lowercase().contains(needle));

    let mut tumor = names.get_index_of(tumor_name)
        .or_else(|| by_substring("tumor"));
    let mut normal = match normal_name {
        Some(n) => names.get_index_of(n).or_else(|| by_substring("normal")),
        None => None
    };

    if tumor.is_none() && !names.is_empty() {
        tumor = match (names.len(), normal_name.is_some()) {
            (1, _) => Some(0),
            (_, true) => Some(1),
            (_, false) => Some(0)
        };
        warn!("Tumor sample {tumor_name:?} not found in {:?}, using column {:?}", names, tumor);
    }
    if normal_name.is_some() && normal.is_none() && names.len() >= 2 {
        normal = Some(0);
    }
    if normal == tumor {
        normal = None;
    }

    SampleColumns { tumor, normal }
}

/// Returns an INFO value as a number list; scalars become one-element lists and flags become 1.
/// Unparseable strings become None entries.
pub fn info_numbers(record: &vcf::variant::RecordBuf, key: &str) -> Option<Vec<Option<f64>>> {
    use record_buf::info::field::value::Array;
    use record_buf::info::field::Value;

    let value = record.info().get(key).flatten()?;
    let numbers = match value {
        Value::Integer(v) => vec![Some(*v as f64)],
        Value::Float(v) => vec![Some(widen(*v))],
        Value::Flag => vec![Some(1.0)],
        Value::Character(c) => vec![c.to_digit(10).map(|d| d as f64)],
        Value::String(s) => vec![parse_number(s)],
        Value::Array(Array::Integer(values)) => values.iter().map(|v| v.map(|x| x as f64)).collect(),
        Value::Array(Array::Float(values)) => values.iter().map(|v| v.map(widen)).collect(),
        Value::Array(Array::Character(values)) => values.iter()
            .map(|v| v.and_then(|c| c.to_digit(10)).map(|d| d as f64))
            .collect(),
        Value::Array(Array::String(values)) => values.iter()
            .map(|v| v.as_deref().and_then(parse_number))
            .collect()
    };
    Some(numbers)
}

/// First number of an INFO field
pub fn info_number(record: &vcf::variant::RecordBuf, key: &str) -> Option<f64> {
    info_numbers(record, key)?.into_iter().next().flatten()
}

/// Returns true if the INFO key is present at all
pub fn has_info(record: &vcf::variant::RecordBuf, key: &str) -> bool {
    record.info().get(key).is_some()
}

/// Returns a FORMAT value for a sample as a number list; scalars become one-element lists.
/// Percent strings such as VarScan's `45.2%` are converted to fractions.
pub fn sample_numbers(record: &vcf::variant::RecordBuf, sample_index: usize, key: &str) -> Option<Vec<Option<f64>>> {
    use record_buf::samples::sample::value::Array;
    use record_buf::samples::sample::Value;

    let sample = record.samples().get_index(sample_index)?;
    let value = sample.get(key).flatten()?;
    let numbers = match value {
        Value::Integer(v) => vec![Some(*v as f64)],
        Value::Float(v) => vec![Some(widen(*v))],
        Value::Character(c) => vec![c.to_digit(10).map(|d| d as f64)],
        Value::String(s) => vec![parse_number(s)],
        Value::Genotype(_) => return None,
        Value::Array(Array::Integer(values)) => values.iter().map(|v| v.map(|x| x as f64)).collect(),
        Value::Array(Array::Float(values)) => values.iter().map(|v| v.map(widen)).collect(),
        Value::Array(Array::Character(values)) => values.iter()
            .map(|v| v.and_then(|c| c.to_digit(10)).map(|d| d as f64))
            .collect(),
        Value::Array(Array::String(values)) => values.iter()
            .map(|v| v.as_deref().and_then(parse_number))
            .collect()
    };
    Some(numbers)
}

/// Widens an f32 through its shortest decimal form so `0.45f32` becomes `0.45f64`
pub fn widen(value: f32) -> f64 {
    value.to_string().parse::<f64>().unwrap_or(value as f64)
}

/// Parses a loosely formatted number; `45.2%` becomes 0.452
fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if let Some(percent) = trimmed.strip_suffix('%') {
        percent.trim().parse::<f64>().ok().map(|p| p / 100.0)
    } else {
        trimmed.parse::<f64>().ok()
    }
}

/// Returns the FILTER values of a record; an empty list means the column was missing
pub fn filter_values(record: &vcf::variant::RecordBuf) -> Vec<&str> {
    record.filters().as_ref().iter().map(|f| f.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("12.5"), Some(12.5));
        assert_eq!(parse_number("45%"), Some(0.45));
        assert_eq!(parse_number(" 7 "), Some(7.0));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(widen(0.45), 0.45);
    }

    #[test]
    fn test_vcf_stream() {
        let vcf_fn = PathBuf::from("test_data/callers/paired/mutect2.vcf");
        let mut stream = VcfStream::open(&vcf_fn).unwrap();
        let columns = resolve_sample_columns(stream.header(), "TUMOR", Some("NORMAL"));
        assert_eq!(columns, SampleColumns { tumor: Some(1), normal: Some(0) });

        let mut positions = vec![];
        let mut tlods = vec![];
        stream.for_each_record(|_i, record| {
            positions.push(record.variant_start().unwrap().get());
            tlods.push(info_number(record, "TLOD"));
            Ok(())
        }).unwrap();
        assert_eq!(positions, vec![11, 15, 41, 57, 61, 10]);
        assert_eq!(tlods[0], Some(25.5));
    }

    #[test]
    fn test_sample_fallbacks() {
        let vcf_fn = PathBuf::from("test_data/callers/paired/varscan.snv.vcf");
        let stream = VcfStream::open(&vcf_fn).unwrap();
        // samples are named after their BAM files here, resolved by substring
        let columns = resolve_sample_columns(stream.header(), "sampleT", Some("sampleN"));
        assert_eq!(columns, SampleColumns { tumor: Some(1), normal: Some(0) });
    }
}
