
use anyhow::{anyhow, bail, Context};
use indexmap::IndexMap;
use log::debug;
use std::path::{Path, PathBuf};

/// Contig names and lengths from a FASTA index, in file order.
/// File order is the sort order for every output.
#[derive(Clone, Debug, Default)]
pub struct ContigIndex {
    contigs: IndexMap<String, u64>
}

impl ContigIndex {
    /// Loads a `.fai` file; only the first two columns (name, length) are used.
    /// # Arguments
    /// * `fai_fn` - path to the FASTA index
    /// # Errors
    /// * if the file cannot be opened or a row is malformed
    /// * if a contig name appears twice
    pub fn from_fai(fai_fn: &Path) -> anyhow::Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .from_path(fai_fn)
            .with_context(|| format!("Error while opening {fai_fn:?}:"))?;

        let mut contigs: IndexMap<String, u64> = Default::default();
        for result in csv_reader.records() {
            let row = result.with_context(|| format!("Error while reading {fai_fn:?}"))?;
            let name = row.get(0).ok_or(anyhow!("Missing contig name on row: {row:?}"))?;
            let length: u64 = row.get(1)
                .ok_or(anyhow!("Missing contig length on row: {row:?}"))?
                .parse()
                .with_context(|| format!("Error while parsing contig length on row: {row:?}"))?;
            if contigs.insert(name.to_string(), length).is_some() {
                bail!("Duplicate contig found in {fai_fn:?}: {name}");
            }
        }
        debug!("Loaded {} contigs from {fai_fn:?}", contigs.len());

        Ok(Self { contigs })
    }

    /// Builds an index directly, mostly for tests
    pub fn from_contigs(contigs: &[(&str, u64)]) -> Self {
        Self {
            contigs: contigs.iter().map(|(n, l)| (n.to_string(), *l)).collect()
        }
    }

    /// Sort rank of a contig, None if it is not in the index
    pub fn rank(&self, chrom: &str) -> Option<usize> {
        self.contigs.get_index_of(chrom)
    }

    pub fn length(&self, chrom: &str) -> Option<u64> {
        self.contigs.get(chrom).copied()
    }

    /// Iterates (name, length) in file order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &u64)> {
        self.contigs.iter()
    }

    pub fn len(&self) -> usize {
        self.contigs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contigs.is_empty()
    }
}

/// Returns the conventional `.fai` path for a FASTA, `ref.fa` -> `ref.fa.fai`
pub fn fai_path(reference_fn: &Path) -> PathBuf {
    let mut fai = reference_fn.as_os_str().to_owned();
    fai.push(".fai");
    PathBuf::from(fai)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_fai() {
        let fai_fn = PathBuf::from("test_data/reference/mini.fa.fai");
        let index = ContigIndex::from_fai(&fai_fn).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.rank("chr1"), Some(0));
        assert_eq!(index.rank("chr2"), Some(1));
        assert_eq!(index.rank("chrM"), None);
        assert_eq!(index.length("chr2"), Some(60));
    }

    #[test]
    fn test_fai_path() {
        assert_eq!(fai_path(Path::new("/ref/genome.fa")), PathBuf::from("/ref/genome.fa.fai"));
    }
}
