use super::schedule::PrayerTimes;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde_derive::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// The last fetched prayer times, kept on disk between runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cache {
    pub prayer_time_data: PrayerTimes,
    pub last_fetch_date: NaiveDate,
}

impl Cache {
    /// Returns `None` if there is no cache file yet.
    pub fn load(path: &Path) -> Result<Option<Cache>> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err).with_context(|| format!("Failed to read {}", path.display())),
        };
        let cache = serde_json::from_str(&contents)
            .with_context(|| format!("Corrupt prayer times cache {}", path.display()))?;
        Ok(Some(cache))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
    }
}

/// `~/.prayer_time_data.json`
pub fn default_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".prayer_time_data.json"))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::widgets::prayer::schedule::PrayerKey;

    fn cache() -> Cache {
        Cache {
            prayer_time_data: PrayerTimes {
                city: "Jakarta".into(),
                times: [(PrayerKey::Fajr, "04:20".to_owned()), (PrayerKey::FirstThird, "21:50".to_owned())]
                    .into_iter()
                    .collect(),
            },
            last_fetch_date: NaiveDate::from_ymd_opt(2026, 10, 15).unwrap(),
        }
    }

    #[test]
    fn survives_a_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prayer.json");

        cache().save(&path).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("\"firstthird\": \"21:50\""));
        assert!(contents.contains("\"last_fetch_date\": \"2026-10-15\""));

        assert_eq!(Cache::load(&path).unwrap(), Some(cache()));
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Cache::load(&dir.path().join("absent.json")).unwrap(), None);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"{\"prayer_time_data\": 42").unwrap();
        assert!(Cache::load(file.path()).is_err());
    }
}
