//! Encoding detection and canonical-form conversion.
//!
//! Detection inspects a bounded byte sample from the start of the file and
//! never fails on arbitrary binary content; the only fatal condition is an
//! unopenable file. Conversion normalizes a source to UTF-8, substituting
//! U+FFFD for undecodable sequences, and degrades to the original path on
//! I/O failure so downstream stages can continue best-effort.

use std::{
    fs::{self, File},
    io::{self, BufWriter, Read},
    path::{Path, PathBuf},
};

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use encoding_rs_io::DecodeReaderBytesBuilder;
use log::{info, warn};

use crate::{descriptor::FileDescriptor, errors::PipelineError};

pub const DEFAULT_SAMPLE_SIZE: usize = 1024;

/// Confidence below this threshold logs a warning; detection still proceeds
/// with the detected label in best-effort mode.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct EncodingDetection {
    pub label: String,
    pub confidence: f64,
}

/// Detects the encoding of `path` from a sample of at most `sample_size`
/// bytes. Returns the default label with confidence 0.0 when the sample
/// carries no signal (empty file).
pub fn detect(path: &Path, sample_size: usize) -> Result<EncodingDetection, PipelineError> {
    let mut file = File::open(path).map_err(|source| PipelineError::FileAccess {
        path: path.to_path_buf(),
        source,
    })?;
    let mut sample = vec![0u8; sample_size.max(1)];
    let read = read_sample(&mut file, &mut sample).map_err(|source| PipelineError::FileAccess {
        path: path.to_path_buf(),
        source,
    })?;
    sample.truncate(read);

    let detection = classify_sample(&sample);
    if detection.confidence < LOW_CONFIDENCE_THRESHOLD {
        warn!(
            "Low-confidence encoding detection for {:?}: {} ({:.2}); continuing best-effort",
            path, detection.label, detection.confidence
        );
    }
    Ok(detection)
}

fn read_sample(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match file.read(&mut buf[total..])? {
            0 => break,
            n => total += n,
        }
    }
    Ok(total)
}

/// Sample classification order: BOM, UTF-8 validity, windows-1252 fallback.
/// Pure ASCII is labelled UTF-8 at full confidence since every ASCII byte
/// is valid UTF-8 regardless of the producer's intent.
pub fn classify_sample(sample: &[u8]) -> EncodingDetection {
    if sample.is_empty() {
        return EncodingDetection {
            label: UTF_8.name().to_string(),
            confidence: 0.0,
        };
    }
    if let Some((encoding, _bom_len)) = Encoding::for_bom(sample) {
        return EncodingDetection {
            label: encoding.name().to_string(),
            confidence: 1.0,
        };
    }
    match std::str::from_utf8(sample) {
        Ok(text) => {
            let confidence = if text.is_ascii() { 1.0 } else { 0.95 };
            EncodingDetection {
                label: UTF_8.name().to_string(),
                confidence,
            }
        }
        // error_len() == None means the sample merely truncated a multi-byte
        // sequence at its end, which is still consistent with UTF-8.
        Err(err) if err.error_len().is_none() && err.valid_up_to() > 0 => EncodingDetection {
            label: UTF_8.name().to_string(),
            confidence: 0.9,
        },
        Err(_) => EncodingDetection {
            label: WINDOWS_1252.name().to_string(),
            confidence: windows_1252_confidence(sample),
        },
    }
}

fn windows_1252_confidence(sample: &[u8]) -> f64 {
    // Control bytes outside the usual text repertoire argue against any
    // single-byte text encoding; scale confidence down by their share.
    let suspect = sample
        .iter()
        .filter(|b| matches!(b, 0x00..=0x08 | 0x0B | 0x0C | 0x0E..=0x1F))
        .count();
    let ratio = suspect as f64 / sample.len() as f64;
    (0.7 * (1.0 - ratio)).clamp(0.0, 1.0)
}

/// True when `label` resolves to canonical UTF-8, including aliases and the
/// BOM-carrying variant (`Encoding::for_label` folds both).
pub fn is_canonical(label: &str) -> bool {
    Encoding::for_label(label.trim().as_bytes())
        .map(|encoding| encoding == UTF_8)
        .unwrap_or(false)
}

/// Converts the descriptor's source file to UTF-8 at its derived converted
/// path. No-op (original path returned, no file written) when the detected
/// encoding is already canonical. On conversion I/O failure the error is
/// reported and the original path is returned so the caller can proceed
/// best-effort against the unconverted file.
pub fn convert_to_utf8(descriptor: &FileDescriptor) -> PathBuf {
    if is_canonical(descriptor.encoding_label()) {
        info!(
            "{:?} is already UTF-8; skipping conversion",
            descriptor.path()
        );
        return descriptor.path().to_path_buf();
    }
    let target = descriptor.converted_path().to_path_buf();
    match write_converted(descriptor, &target) {
        Ok(bytes) => {
            info!(
                "Converted {:?} ({}) -> {:?} ({} bytes)",
                descriptor.path(),
                descriptor.encoding_label(),
                target,
                bytes
            );
            target
        }
        Err(err) => {
            warn!(
                "{}; falling back to reading {:?} unconverted",
                PipelineError::Conversion {
                    path: descriptor.path().to_path_buf(),
                    source: err,
                },
                descriptor.path()
            );
            // Best effort: do not leave a truncated artifact behind.
            let _ = fs::remove_file(&target);
            descriptor.path().to_path_buf()
        }
    }
}

fn write_converted(descriptor: &FileDescriptor, target: &Path) -> io::Result<u64> {
    let encoding = Encoding::for_label(descriptor.encoding_label().as_bytes())
        .unwrap_or(WINDOWS_1252);
    let source = File::open(descriptor.path())?;
    let mut decoder = DecodeReaderBytesBuilder::new()
        .encoding(Some(encoding))
        .build(source);
    let mut writer = BufWriter::new(File::create(target)?);
    let bytes = io::copy(&mut decoder, &mut writer)?;
    io::Write::flush(&mut writer)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_sample_handles_empty_input() {
        let detection = classify_sample(b"");
        assert_eq!(detection.label, "UTF-8");
        assert_eq!(detection.confidence, 0.0);
    }

    #[test]
    fn classify_sample_recognizes_bom() {
        let detection = classify_sample(b"\xEF\xBB\xBFname,age\n");
        assert_eq!(detection.label, "UTF-8");
        assert_eq!(detection.confidence, 1.0);

        let utf16 = classify_sample(b"\xFF\xFEn\x00a\x00");
        assert_eq!(utf16.label, "UTF-16LE");
    }

    #[test]
    fn classify_sample_distinguishes_ascii_and_multibyte_utf8() {
        assert_eq!(classify_sample(b"name,age\n1,2\n").confidence, 1.0);
        let multibyte = classify_sample("cañón,río\n".as_bytes());
        assert_eq!(multibyte.label, "UTF-8");
        assert!(multibyte.confidence >= 0.9);
    }

    #[test]
    fn classify_sample_falls_back_to_windows_1252() {
        // 0xF1 followed by an ASCII byte is invalid UTF-8 but a fine Latin
        // small letter n with tilde in windows-1252.
        let detection = classify_sample(b"ma\xF1ana,1\n");
        assert_eq!(detection.label, "windows-1252");
        assert!(detection.confidence > 0.5);
    }

    #[test]
    fn classify_sample_tolerates_truncated_multibyte_tail() {
        let mut sample = b"name,caf".to_vec();
        sample.push(0xC3); // first byte of a two-byte sequence, cut short
        let detection = classify_sample(&sample);
        assert_eq!(detection.label, "UTF-8");
    }

    #[test]
    fn is_canonical_accepts_aliases() {
        assert!(is_canonical("utf-8"));
        assert!(is_canonical("UTF-8"));
        assert!(is_canonical("unicode-1-1-utf-8"));
        assert!(!is_canonical("windows-1252"));
        assert!(!is_canonical("garbage-label"));
    }
}
