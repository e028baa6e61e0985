//! Region Enumeration
//!
//! Regions come from exactly one authoritative source: an inline list in the
//! pipeline configuration, an explicit JSON file, or the per-country
//! provinces list under `Raw_Spatial_Data/custom_study_area/`.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

use super::model::Region;

/// Directory holding per-country province lists.
pub const CUSTOM_STUDY_AREA_DIR: &str = "Raw_Spatial_Data/custom_study_area";

/// Where the set of regions to process is read from.
///
/// Exactly one field must be set.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RegionSource {
    /// Inline list of region names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<Vec<String>>,

    /// Path to a JSON array of region names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// Country whose `<country>_provinces_list.json` provides the regions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl RegionSource {
    /// Creates a source backed by an inline list.
    pub fn from_list<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            list: Some(names.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Creates a source backed by the provinces list of `country`.
    pub fn from_country(country: impl Into<String>) -> Self {
        Self {
            country: Some(country.into()),
            ..Self::default()
        }
    }

    /// Creates a source backed by a JSON file.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(path.into()),
            ..Self::default()
        }
    }

    /// Checks that exactly one source is configured.
    pub fn validate(&self) -> Result<()> {
        let configured = [
            self.list.is_some(),
            self.file.is_some(),
            self.country.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();

        match configured {
            1 => Ok(()),
            0 => Err(PipelineError::InvalidConfig(
                "regions: one of 'list', 'file' or 'country' is required".to_string(),
            )),
            _ => Err(PipelineError::InvalidConfig(
                "regions: 'list', 'file' and 'country' are mutually exclusive; \
                 choose the authoritative source"
                    .to_string(),
            )),
        }
    }
}

/// Returns the provinces list path for `country`.
pub fn provinces_list_path(country: &str) -> PathBuf {
    Path::new(CUSTOM_STUDY_AREA_DIR).join(format!("{}_provinces_list.json", country))
}

/// Resolves `source` into the ordered list of regions.
///
/// Relative file paths are resolved against `root`. Duplicates are dropped
/// keeping the first occurrence. An empty result is an error, so a bad side
/// input stops the run before any stage executes.
pub fn load_regions(source: &RegionSource, root: &Path) -> Result<Vec<Region>> {
    source.validate()?;

    let names = match (&source.list, &source.file, &source.country) {
        (Some(list), _, _) => {
            debug!("Using inline region list ({} entries)", list.len());
            list.clone()
        }
        (None, Some(file), _) => read_region_file(&root.join(file))?,
        (None, None, Some(country)) => read_region_file(&root.join(provinces_list_path(country)))?,
        (None, None, None) => Vec::new(),
    };

    let mut seen = HashSet::new();
    let mut regions = Vec::with_capacity(names.len());
    for name in names {
        check_region_name(&name)?;
        if !seen.insert(name.clone()) {
            warn!("Duplicate region '{}' ignored", name);
            continue;
        }
        regions.push(Region::new(name));
    }

    if regions.is_empty() {
        return Err(PipelineError::InvalidConfig(
            "region list is empty".to_string(),
        ));
    }

    info!("Regions: {}", regions.len());
    Ok(regions)
}

/// Rejects names that cannot be a single directory under `data/`.
fn check_region_name(name: &str) -> Result<()> {
    let reason = if name.trim().is_empty() {
        Some("is empty")
    } else if name.contains('/') || name.contains('\\') {
        Some("contains a path separator")
    } else if name == "." || name == ".." {
        Some("is a relative path component")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(PipelineError::InvalidConfig(format!(
            "region name '{}' {}",
            name, reason
        ))),
        None => Ok(()),
    }
}

fn read_region_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|source| PipelineError::RegionsRead {
        path: path.to_path_buf(),
        source,
    })?;

    let names: Vec<String> =
        serde_json::from_str(&content).map_err(|source| PipelineError::RegionsParse {
            path: path.to_path_buf(),
            source,
        })?;

    info!("Loaded {} regions from {}", names.len(), path.display());
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_inline_list() {
        let temp_dir = tempdir().unwrap();
        let source = RegionSource::from_list(["Beijing", "Tianjin"]);

        let regions = load_regions(&source, temp_dir.path()).unwrap();
        assert_eq!(regions, vec![Region::new("Beijing"), Region::new("Tianjin")]);
    }

    #[test]
    fn test_country_provinces_file() {
        let temp_dir = tempdir().unwrap();
        let dir = temp_dir.path().join(CUSTOM_STUDY_AREA_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("China_provinces_list.json"), r#"["Beijing", "Hebei"]"#).unwrap();

        let regions = load_regions(&RegionSource::from_country("China"), temp_dir.path()).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[1].as_str(), "Hebei");
    }

    #[test]
    fn test_provinces_list_path() {
        assert_eq!(
            provinces_list_path("China"),
            PathBuf::from("Raw_Spatial_Data/custom_study_area/China_provinces_list.json")
        );
    }

    #[test]
    fn test_missing_file_fails() {
        let temp_dir = tempdir().unwrap();
        let result = load_regions(&RegionSource::from_file("nope.json"), temp_dir.path());
        assert!(matches!(result, Err(PipelineError::RegionsRead { .. })));
    }

    #[test]
    fn test_malformed_file_fails() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("regions.json"), r#"{"Beijing": 1}"#).unwrap();

        let result = load_regions(&RegionSource::from_file("regions.json"), temp_dir.path());
        assert!(matches!(result, Err(PipelineError::RegionsParse { .. })));
    }

    #[test]
    fn test_conflicting_sources_rejected() {
        let source = RegionSource {
            list: Some(vec!["Beijing".to_string()]),
            country: Some("China".to_string()),
            file: None,
        };
        assert!(matches!(source.validate(), Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_no_source_rejected() {
        assert!(RegionSource::default().validate().is_err());
    }

    #[test]
    fn test_empty_list_rejected() {
        let temp_dir = tempdir().unwrap();
        let source = RegionSource::from_list(Vec::<String>::new());
        assert!(load_regions(&source, temp_dir.path()).is_err());
    }

    #[test]
    fn test_empty_region_name_rejected() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("regions.json"), r#"["Beijing", ""]"#).unwrap();

        let result = load_regions(&RegionSource::from_file("regions.json"), temp_dir.path());
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_path_like_region_names_rejected() {
        let temp_dir = tempdir().unwrap();
        for name in ["/etc", "a/b", "..", r"C:\data"] {
            let source = RegionSource::from_list([name]);
            let result = load_regions(&source, temp_dir.path());
            assert!(
                matches!(result, Err(PipelineError::InvalidConfig(_))),
                "{} accepted",
                name
            );
        }
    }

    #[test]
    fn test_duplicates_dropped() {
        let temp_dir = tempdir().unwrap();
        let source = RegionSource::from_list(["Beijing", "Tianjin", "Beijing"]);

        let regions = load_regions(&source, temp_dir.path()).unwrap();
        assert_eq!(regions, vec![Region::new("Beijing"), Region::new("Tianjin")]);
    }
}
