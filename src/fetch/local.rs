use crate::parse::RelayDescriptorParser;
use crate::utils::split_documents;
use anyhow::{Context, Result as AnyhowResult};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// Parses every descriptor found below `root`, such as a Tor data directory's
/// `cached-*` files or a descriptor archive.
///
/// Files are read in path order. Files holding several concatenated descriptors are
/// split first. Unreadable files and directories are logged and skipped.
///
/// # Arguments
///
/// * `root` - A file or a directory to walk recursively.
/// * `parser` - The parser to hand each document to.
///
/// # Returns
///
/// The number of documents handed to the parser.
pub fn import_directory(root: &Path, parser: &mut RelayDescriptorParser) -> usize {
    let mut files = Vec::new();
    collect_files(root, &mut files);
    files.sort();

    let mut documents = 0;
    for file in &files {
        let raw = match fs::read(file).with_context(|| format!("Failed to read {}", file.display())) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Skipping file: {:#}", e);
                continue;
            }
        };
        for document in split_documents(&raw) {
            parser.parse(document);
            documents += 1;
        }
        debug!("Read {}", file.display());
    }
    info!(
        "Imported {} document(s) from {} file(s) below {}",
        documents,
        files.len(),
        root.display()
    );
    documents
}

fn collect_files(path: &Path, files: &mut Vec<PathBuf>) {
    if path.is_file() {
        files.push(path.to_path_buf());
        return;
    }
    match read_dir(path) {
        Ok(entries) => {
            for entry in entries {
                collect_files(&entry, files);
            }
        }
        Err(e) => warn!("Skipping directory: {:#}", e),
    }
}

fn read_dir(path: &Path) -> AnyhowResult<Vec<PathBuf>> {
    let entries = fs::read_dir(path).with_context(|| format!("Failed to list {}", path.display()))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to list {}", path.display()))?;
        paths.push(entry.path());
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::testdata::{CONSENSUS, EXTRA_INFO, SERVER_DESCRIPTOR};
    use crate::parse::{DocumentKind, ParserConfig};

    #[test]
    fn test_import_cache_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cached-consensus"), CONSENSUS).unwrap();
        let descriptors = format!("@downloaded-at 2024-01-01 00:05:00\n{}", SERVER_DESCRIPTOR);
        fs::write(dir.path().join("cached-descriptors"), descriptors).unwrap();
        let nested = dir.path().join("2024").join("01");
        fs::create_dir_all(&nested).unwrap();
        let extra_infos = format!("{}{}", EXTRA_INFO, EXTRA_INFO.replace("relayA", "relayC"));
        fs::write(nested.join("extra-infos"), extra_infos).unwrap();

        let mut parser = RelayDescriptorParser::new(ParserConfig::default());
        assert_eq!(import_directory(dir.path(), &mut parser), 4);
        let counts = parser.parsed_counts();
        assert_eq!(counts[&DocumentKind::Consensus], 1);
        assert_eq!(counts[&DocumentKind::ServerDescriptor], 1);
        assert_eq!(counts[&DocumentKind::ExtraInfoDescriptor], 2);
    }

    #[test]
    fn test_missing_directory_imports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut parser = RelayDescriptorParser::new(ParserConfig::default());
        assert_eq!(import_directory(&dir.path().join("absent"), &mut parser), 0);
    }
}
