use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::domain::utils::s3_uri::{S3Uri, join_key};
use crate::error::{Error, Result};

/// Forward and reverse read file names of one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPair {
    pub r1: String,
    pub r2: String,
}

/// CSV header each pipeline expects. Unknown pipelines get the nf-core default.
pub fn samplesheet_header(workflow: &str) -> &'static [&'static str] {
    match workflow {
        "ampliseq" => &["sampleID", "forwardReads", "reverseReads"],
        "rnaseq" => &["sample", "fastq_1", "fastq_2", "strandedness"],
        _ => &["sample", "fastq_1", "fastq_2"],
    }
}

/// Splits `<sample>_R1.fastq.gz` / `<sample>_2.fastq.gz` into sample and read number.
fn parse_read_file(file_name: &str) -> Option<(&str, u8)> {
    let stem = file_name.strip_suffix(".fastq.gz")?;
    let (sample, read) = stem.rsplit_once('_')?;
    if sample.is_empty() {
        return None;
    }
    match read {
        "R1" | "1" => Some((sample, 1)),
        "R2" | "2" => Some((sample, 2)),
        _ => None,
    }
}

/// Pairs the `*.fastq.gz` files of a directory by sample.
///
/// Accepts `_R1/_R2` and `_1/_2` suffixes; samples missing a mate are left out.
/// When both naming styles exist for a sample, `_R1/_R2` wins.
pub fn find_pairs(samples_dir: &Path) -> Result<BTreeMap<String, ReadPair>> {
    let mut files: Vec<String> = Vec::new();
    for entry in fs::read_dir(samples_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            files.push(name.to_string());
        }
    }
    Ok(pair_read_files(&files))
}

pub fn pair_read_files(files: &[String]) -> BTreeMap<String, ReadPair> {
    let mut mates: BTreeMap<String, (Option<String>, Option<String>)> = BTreeMap::new();
    let mut sorted: Vec<&String> = files.iter().collect();
    // `_R` names are applied last so they win over `_1/_2` names of the same sample.
    sorted.sort_by_key(|f| f.contains("_R"));

    for file in sorted {
        if let Some((sample, read)) = parse_read_file(file) {
            let slot = mates.entry(sample.to_string()).or_default();
            match read {
                1 => slot.0 = Some(file.clone()),
                _ => slot.1 = Some(file.clone()),
            }
        }
    }

    mates
        .into_iter()
        .filter_map(|(sample, (r1, r2))| Some((sample, ReadPair { r1: r1?, r2: r2? })))
        .collect()
}

/// Renders the samplesheet of one workflow with reads addressed as
/// `s3://<bucket>/<run_id>/<file>`, rows sorted by sample.
pub fn render_samplesheet(workflow: &str, pairs: &BTreeMap<String, ReadPair>, bucket: &str, run_id: &str) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(samplesheet_header(workflow))?;

    for (sample, pair) in pairs {
        let r1 = S3Uri::new(bucket, join_key(&[run_id, &pair.r1])).to_string();
        let r2 = S3Uri::new(bucket, join_key(&[run_id, &pair.r2])).to_string();
        if workflow == "rnaseq" {
            writer.write_record([sample.as_str(), r1.as_str(), r2.as_str(), "auto"])?;
        } else {
            writer.write_record([sample.as_str(), r1.as_str(), r2.as_str()])?;
        }
    }

    let bytes = writer.into_inner().map_err(|e| Error::IoError(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| Error::SubmissionError(format!("samplesheet is not UTF-8: {}", e)))
}

/// A read location named in a samplesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadLocation {
    /// Key inside the bucket the samplesheet lives in.
    Key(String),
    /// Object in some other bucket; cannot be probed through this store.
    Foreign(S3Uri),
}

fn looks_like_read(cell: &str) -> bool {
    cell.starts_with("s3://")
        || [".fastq.gz", ".fq.gz", ".fastq", ".fq"].iter().any(|ext| cell.ends_with(ext))
}

/// Every read referenced by a samplesheet, in row order.
///
/// The first column (sample id) and non-path columns such as `strandedness`
/// are ignored.
pub fn read_locations(samplesheet: &[u8], bucket: &str) -> Result<Vec<ReadLocation>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).flexible(true).from_reader(samplesheet);
    let mut locations = Vec::new();

    for record in reader.records() {
        let record = record?;
        for cell in record.iter().skip(1).map(str::trim).filter(|c| !c.is_empty() && looks_like_read(c)) {
            let location = match S3Uri::parse(cell) {
                Some(uri) if uri.bucket == bucket => ReadLocation::Key(uri.key),
                Some(uri) => ReadLocation::Foreign(uri),
                None => ReadLocation::Key(cell.trim_start_matches('/').to_string()),
            };
            locations.push(location);
        }
    }
    Ok(locations)
}
