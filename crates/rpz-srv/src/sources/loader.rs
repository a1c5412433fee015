//! Load source lists from configuration and disk.
//!
//! Text files hold one name per line with `#` comments. CSV files (by
//! extension) carry the name in the first column after a header line.
//! Trie lists read a serialized `fst` set when the file ends in `.fst`,
//! otherwise they are built from a text file.

use rpz_core::{ListType, SourceFormat, TaggedName};
use std::path::Path;
use tracing::{info, warn};

use super::{canonical_name, NameList, SourceRegistry, TrieNames};
use crate::config::{DataSource, ListConfig, ServerConfig};
use crate::SrvError;

/// Read canonical names from a text or CSV file, skipping invalid lines.
pub fn read_names(path: &Path) -> crate::Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| SrvError::SourceFile {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let is_csv = has_extension(path, "csv");

    let mut names = Vec::new();
    let mut skipped = 0usize;
    let lines = content.lines().skip(usize::from(is_csv));
    for line in lines {
        let line = line.split('#').next().unwrap_or_default();
        let field = if is_csv {
            line.split(',').next().unwrap_or_default().trim_matches('"')
        } else {
            line
        };
        if field.trim().is_empty() {
            continue;
        }
        match canonical_name(field) {
            Some(name) => names.push(name),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(path = %path.display(), skipped, "ignored invalid names");
    }
    Ok(names)
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Load one file-backed list.
pub fn load_file_list(config: &ListConfig, now: i64) -> crate::Result<NameList> {
    let path = config.path.as_deref().ok_or_else(|| {
        SrvError::Config(format!("list {} has no path", config.name))
    })?;

    let list = match config.format {
        SourceFormat::Dawg if has_extension(path, "fst") => {
            let bytes = std::fs::read(path).map_err(|e| SrvError::SourceFile {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            NameList::new_trie(&config.name, config.list_type, TrieNames::from_bytes(bytes)?)
        }
        SourceFormat::Dawg => {
            let trie = TrieNames::from_names(read_names(path)?)?;
            NameList::new_trie(&config.name, config.list_type, trie)
        }
        SourceFormat::Map => {
            let entries = read_names(path)?.into_iter().map(|name| TaggedName {
                added_at: now,
                ..TaggedName::bare(name, &config.name)
            });
            NameList::with_entries(&config.name, config.list_type, DataSource::File, entries)
        }
    };
    Ok(list.describe(config.description.clone()))
}

/// Build the registry for every file and feed list in the config.
///
/// Transfer-backed lists are created by the coordinator on their first
/// successful pull.
pub fn build_registry(config: &ServerConfig, now: i64) -> crate::Result<SourceRegistry> {
    let mut registry = SourceRegistry::new(config.reaper_interval_secs);
    for list in &config.lists {
        let built = match list.datasource {
            DataSource::File => load_file_list(list, now)?,
            DataSource::Feed => NameList::new_map(&list.name, list.list_type, DataSource::Feed)
                .describe(list.description.clone()),
            DataSource::Xfr => continue,
        };
        info!(
            list = %list.name,
            list_type = %list.list_type,
            names = built.len(),
            "loaded source list"
        );
        registry.add_list(built)?;
    }
    Ok(registry)
}

/// Categories holding lists that can be enumerated, for logging at startup.
pub fn enumerable_counts(registry: &SourceRegistry) -> [(ListType, usize); 3] {
    ListType::ALL.map(|lt| {
        (
            lt,
            registry
                .lists_of(lt)
                .filter(|l| l.is_mutable())
                .map(NameList::len)
                .sum(),
        )
    })
}
